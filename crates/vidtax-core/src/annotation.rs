use serde::{Deserialize, Serialize};

use crate::{HierarchicalPath, MAX_TOPIC_PATHS, RecordId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Token and cost accounting for one external call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub elapsed_secs: f64,
}

impl Usage {
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.cost_usd += other.cost_usd;
        self.elapsed_secs += other.elapsed_secs;
    }
}

/// Derived metadata for one record.
///
/// An annotation with `error` set is a terminal failure: it is committed to
/// the checkpoint like a success and carries no topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(alias = "yt_id")]
    pub record_id: RecordId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub named_entities: Vec<NamedEntity>,
    #[serde(default)]
    pub intention: String,
    #[serde(default)]
    pub hierarchical_topics: Vec<String>,
    #[serde(flatten)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl Annotation {
    /// Error-tagged annotation for a record whose generator output could not be used.
    pub fn failed(
        record_id: RecordId,
        error: impl Into<String>,
        raw_response: Option<String>,
        usage: Usage,
    ) -> Self {
        Self {
            record_id,
            description: String::new(),
            named_entities: Vec::new(),
            intention: String::new(),
            hierarchical_topics: Vec::new(),
            usage,
            error: Some(error.into()),
            raw_response,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Parsed topic paths, at most [`MAX_TOPIC_PATHS`]; malformed strings are skipped.
    pub fn paths(&self) -> impl Iterator<Item = HierarchicalPath> + '_ {
        self.hierarchical_topics
            .iter()
            .take(MAX_TOPIC_PATHS)
            .filter_map(|raw| HierarchicalPath::parse(raw))
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.named_entities.iter().map(|e| e.name.clone()).collect()
    }
}
