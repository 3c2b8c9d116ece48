//! Taxonomy construction: draft aggregation, two-pass refinement, id
//! assignment and the path index, plus an owned handle on the current tree.
pub mod draft;
pub mod error;
pub mod ids;
pub mod refine;
pub mod store;

pub use draft::build_draft;
pub use error::TaxonomyError;
pub use ids::{IdentifiedNode, IdentifiedTree, PathIndex, assign_ids, node_id_for};
pub use refine::{
    CategoryOutcome, DeepMerge, MergeStrategy, RefineSettings, RefineStats, Refiner, ShallowMerge,
    SubtreeMerge, aggregate_subtrees, consolidate_top_level, fuzzy_matches, refine_category,
};
pub use store::TaxonomyStore;
