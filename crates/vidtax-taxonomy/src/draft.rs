//! Draft Tree Builder.

use tracing::{debug, instrument};
use vidtax_core::{Annotation, TaxonomyTree};

/// Aggregate every topic path of every annotation into one tree.
///
/// Pure and order-independent: children live in sorted maps, and
/// re-inserting an existing chain changes nothing. Childless nodes come out
/// as leaves.
#[instrument(skip_all)]
pub fn build_draft<'a, I>(annotations: I) -> TaxonomyTree
where
    I: IntoIterator<Item = &'a Annotation>,
{
    let mut tree = TaxonomyTree::new();
    let mut paths = 0usize;
    for annotation in annotations {
        for path in annotation.paths() {
            tree.insert_path(&path);
            paths += 1;
        }
    }
    tree.normalize();
    debug!(paths, categories = tree.len(), nodes = tree.node_count(), "draft built");
    tree
}

#[cfg(test)]
mod tests {
    use vidtax_core::{RecordId, TaxonomyNode, Usage};

    use super::*;

    fn annotated(id: &str, paths: &[&str]) -> Annotation {
        let mut a = Annotation::failed(RecordId::from(id), "", None, Usage::default());
        a.error = None;
        a.hierarchical_topics = paths.iter().map(|p| p.to_string()).collect();
        a
    }

    #[test]
    fn repeated_paths_collapse_into_one_chain() {
        let annotations = vec![
            annotated("a", &["Gaming > Esports"]),
            annotated("b", &["Gaming > Esports"]),
            annotated("c", &["Music > Pop"]),
        ];
        let tree = build_draft(&annotations);
        let keys: Vec<&String> = tree.categories().collect();
        assert_eq!(keys, ["Gaming", "Music"]);
        let gaming = tree.get("Gaming").unwrap().children().unwrap();
        assert_eq!(gaming.len(), 1);
        assert_eq!(gaming["Esports"], TaxonomyNode::Leaf);
        assert!(tree.get("Music").unwrap().children().unwrap()["Pop"].is_leaf());
    }

    #[test]
    fn input_order_does_not_change_the_tree() {
        let mut annotations = vec![
            annotated("a", &["tech > hardware > gpus", "gaming > pc"]),
            annotated("b", &["tech > hardware"]),
            annotated("c", &["gaming > pc > builds", "music"]),
            annotated("d", &[]),
        ];
        let forward = build_draft(&annotations);
        annotations.reverse();
        let backward = build_draft(&annotations);
        annotations.swap(0, 2);
        let shuffled = build_draft(&annotations);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
        assert!(forward.get("music").unwrap().is_leaf());
    }

    #[test]
    fn error_annotations_contribute_nothing() {
        let failed = Annotation::failed(RecordId::from("x"), "JSON parsing failed", None, Usage::default());
        let tree = build_draft([&failed]);
        assert!(tree.is_empty());
    }
}
