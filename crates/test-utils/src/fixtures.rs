use vidtax_core::{Annotation, Record, RecordId, TaxonomyNode, TaxonomyTree, Usage};

pub fn record(id: &str, title: &str, transcript: &str) -> Record {
    Record::new(RecordId::from(id), title).with_transcript(transcript)
}

/// A successful annotation carrying only topic paths.
pub fn annotation(id: &str, paths: &[&str]) -> Annotation {
    Annotation {
        record_id: RecordId::from(id),
        description: format!("description of {id}"),
        named_entities: Vec::new(),
        intention: "entertain".to_string(),
        hierarchical_topics: paths.iter().map(|p| p.to_string()).collect(),
        usage: Usage::default(),
        error: None,
        raw_response: None,
    }
}

/// Parse a tree from its artifact JSON shape.
///
/// Panics on malformed input; for literals in tests only.
pub fn tree(json: serde_json::Value) -> TaxonomyTree {
    serde_json::from_value(json).expect("taxonomy literal")
}

/// Parse a node from its artifact JSON shape.
pub fn node(json: serde_json::Value) -> TaxonomyNode {
    serde_json::from_value(json).expect("taxonomy node literal")
}
