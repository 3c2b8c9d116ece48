//! Shared data model for the vidtax pipeline.
//!
//! Every stage exchanges these types through persisted JSON artifacts, so the
//! serde representations here are part of the on-disk format.
pub mod annotation;
pub mod outcome;
pub mod path;
pub mod record;
pub mod taxonomy;

pub use annotation::{Annotation, NamedEntity, Usage};
pub use outcome::{OutcomeTally, UnitOutcome};
pub use path::{HierarchicalPath, PATH_SEPARATOR, normalize_path_key, normalize_segment};
pub use record::{Record, RecordId};
pub use taxonomy::{TaxonomyNode, TaxonomyTree};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Maximum number of hierarchical topic paths kept per annotation.
pub const MAX_TOPIC_PATHS: usize = 3;

/// Maximum number of canonical top-level categories the refiner keeps.
pub const MAX_CANONICAL_CATEGORIES: usize = 10;

/// Annotator checkpoint: one annotation per record id.
pub type AnnotationLedger = BTreeMap<RecordId, Annotation>;

/// Video mapper checkpoint: record id to its resolved node ids, in first-seen order.
pub type Assignments = BTreeMap<RecordId, Vec<NodeId>>;

/// Vector indexer checkpoint: record ids whose points were acknowledged by the store.
pub type IndexCheckpoint = BTreeSet<RecordId>;

pub use ids::{NodeId, point_id_for};

mod ids {
    use uuid::Uuid;

    use super::*;

    /// Stable identifier of a taxonomy node, derived from its root-to-node path.
    ///
    /// Construction lives with the id assigner; this type only carries the value.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct NodeId(String);

    impl NodeId {
        pub fn new(id: impl Into<String>) -> Self {
            Self(id.into())
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl std::fmt::Display for NodeId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// Deterministic vector point id for a record.
    ///
    /// UUIDv5 under the URL namespace, so re-indexing a record overwrites its
    /// point instead of duplicating it.
    pub fn point_id_for(record_id: &RecordId) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, record_id.as_str().as_bytes())
    }
}
