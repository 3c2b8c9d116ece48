//! Taxonomy Refiner.
//!
//! Pass 1 reduces the draft's top-level names to a bounded canonical list.
//! Pass 2 aggregates, for each canonical category, every draft subtree whose
//! name fuzzy-matches it, asks the refinement service to reorganize that
//! subtree, and commits the result to the canonical checkpoint before the
//! next category starts.

mod fuzzy;
mod merge;

pub use fuzzy::fuzzy_matches;
pub use merge::{DeepMerge, MergeStrategy, ShallowMerge, SubtreeMerge};

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use vidtax_core::{
    MAX_CANONICAL_CATEGORIES, OutcomeTally, TaxonomyNode, TaxonomyTree, UnitOutcome, Usage,
    normalize_segment, taxonomy::Children,
};
use vidtax_error::{ErrorPolicy, ResultExt, TracingPolicy, WarningError};
use vidtax_io::{CheckpointStore, IoError};
use vidtax_llm::{CategoryConsolidator, LlmError, SubtreeRefiner};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineSettings {
    pub max_categories: usize,
    /// Commit the unrefined subtree when the service answer is unusable.
    /// When false such categories are left for the next run.
    pub accept_degraded: bool,
    pub merge: MergeStrategy,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            max_categories: MAX_CANONICAL_CATEGORIES,
            accept_degraded: true,
            merge: MergeStrategy::Shallow,
        }
    }
}

/// Totals for one refiner run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefineStats {
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Seconds spent waiting on the model.
    pub total_time: f64,
    /// Categories committed verbatim because refinement was unusable.
    pub degraded: usize,
    /// Categories already present in the checkpoint.
    pub skipped: usize,
    pub outcomes: OutcomeTally,
    /// The consolidated category list this run worked from.
    pub categories: Vec<String>,
}

impl RefineStats {
    fn add_usage(&mut self, usage: &Usage) {
        self.total_tokens += usage.total_tokens;
        self.total_cost += usage.cost_usd;
        self.total_time += usage.elapsed_secs;
    }
}

/// How one category's refinement ended.
#[derive(Debug, Clone)]
pub enum CategoryOutcome {
    /// The service answer passed validation.
    Refined(TaxonomyNode),
    /// Nothing to refine; the aggregated subtree is a bare leaf.
    Unchanged(TaxonomyNode),
    /// Unusable answer; carries the aggregated subtree and the reason.
    Degraded { fallback: TaxonomyNode, reason: String },
    /// Transient service failure.
    Failed(LlmError),
}

/// Pass 1. Falls back to the draft's own top-level names when the service
/// fails or returns nothing usable.
#[instrument(skip_all, fields(draft_categories = draft.len()))]
pub async fn consolidate_top_level(
    draft: &TaxonomyTree,
    consolidator: &dyn CategoryConsolidator,
    max_categories: usize,
) -> (Vec<String>, Usage) {
    let original: Vec<String> = draft.categories().cloned().collect();
    if original.is_empty() {
        return (original, Usage::default());
    }
    match consolidator.consolidate(&original).await {
        Ok(reply) => {
            let mut seen = HashSet::new();
            let canonical: Vec<String> = reply
                .value
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty() && seen.insert(normalize_segment(name)))
                .take(max_categories)
                .collect();
            if canonical.is_empty() {
                warn!("consolidation returned no categories, using draft list");
                (original, reply.usage)
            } else {
                info!(canonical = ?canonical, "top-level categories consolidated");
                (canonical, reply.usage)
            }
        }
        Err(e) => {
            warn!(error = %e.diagnostic(), "consolidation failed, using draft list");
            (original, e.usage().unwrap_or_default())
        }
    }
}

/// Everything in `draft` that belongs under `canonical`.
///
/// A single match is returned as-is; several are combined with `merge`. No
/// match yields a leaf.
pub fn aggregate_subtrees(
    canonical: &str,
    draft: &TaxonomyTree,
    merge: &dyn SubtreeMerge,
) -> TaxonomyNode {
    let matches: Vec<(&String, &TaxonomyNode)> = draft
        .iter()
        .filter(|(name, _)| fuzzy_matches(name, canonical))
        .collect();
    match matches.as_slice() {
        [] => TaxonomyNode::Leaf,
        [(_, only)] => (*only).clone(),
        many => {
            debug!(
                canonical,
                sources = ?many.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
                "aggregating draft subtrees"
            );
            let mut merged = Children::new();
            for (_, node) in many {
                if let TaxonomyNode::Branch(children) = node {
                    merge.merge_into(&mut merged, children);
                }
            }
            let mut node = TaxonomyNode::Branch(merged);
            node.normalize();
            node
        }
    }
}

/// Checks that `refined` only reorganizes `input`: no names that were not
/// there before, and every input leaf still present.
fn validate_refinement(input: &TaxonomyNode, refined: &TaxonomyNode) -> Result<(), String> {
    let mut input_names = Vec::new();
    input.collect_names(&mut input_names);
    let input_names: HashSet<String> = input_names.into_iter().collect();

    let mut refined_names = Vec::new();
    refined.collect_names(&mut refined_names);
    let refined_names: HashSet<String> = refined_names.into_iter().collect();

    let mut invented: Vec<&String> = refined_names.difference(&input_names).collect();
    if !invented.is_empty() {
        invented.sort();
        return Err(format!("introduced topics absent from input: {invented:?}"));
    }

    let mut leaves = Vec::new();
    input.collect_leaf_names(&mut leaves);
    let mut dropped: Vec<&String> = leaves.iter().filter(|l| !refined_names.contains(*l)).collect();
    if !dropped.is_empty() {
        dropped.sort();
        dropped.dedup();
        return Err(format!("dropped leaf topics: {dropped:?}"));
    }
    Ok(())
}

/// Models often echo the category as a wrapping key; peel it off unless the
/// input itself has a child of that name.
fn unwrap_category(category: &str, input: &TaxonomyNode, refined: TaxonomyNode) -> TaxonomyNode {
    let wanted = normalize_segment(category);
    let input_has_it = input
        .children()
        .is_some_and(|c| c.keys().any(|k| normalize_segment(k) == wanted));
    if input_has_it {
        return refined;
    }
    match refined {
        TaxonomyNode::Branch(mut children) if children.len() == 1 => {
            let key = children.keys().next().cloned().unwrap_or_default();
            let wrapped = normalize_segment(&key) == wanted
                && children.get(&key).is_some_and(|n| !n.is_leaf());
            if wrapped {
                children.remove(&key).unwrap_or_default()
            } else {
                TaxonomyNode::Branch(children)
            }
        }
        other => other,
    }
}

/// Pass 2 for one category. Returns the outcome and the accounting of any call made.
#[instrument(skip_all, fields(category = %category))]
pub async fn refine_category(
    category: &str,
    aggregated: &TaxonomyNode,
    refiner: &dyn SubtreeRefiner,
) -> (CategoryOutcome, Usage) {
    if aggregated.is_leaf() {
        debug!("nothing to refine");
        return (CategoryOutcome::Unchanged(TaxonomyNode::Leaf), Usage::default());
    }
    match refiner.refine(category, aggregated).await {
        Ok(reply) => {
            let refined = unwrap_category(category, aggregated, reply.value);
            match validate_refinement(aggregated, &refined) {
                Ok(()) => (CategoryOutcome::Refined(refined), reply.usage),
                Err(reason) => (
                    CategoryOutcome::Degraded {
                        fallback: aggregated.clone(),
                        reason,
                    },
                    reply.usage,
                ),
            }
        }
        Err(e) if e.is_retryable() => {
            let usage = e.usage().unwrap_or_default();
            (CategoryOutcome::Failed(e), usage)
        }
        Err(e) => {
            let usage = e.usage().unwrap_or_default();
            (
                CategoryOutcome::Degraded {
                    fallback: aggregated.clone(),
                    reason: e.to_string(),
                },
                usage,
            )
        }
    }
}

/// Drives both passes against the canonical checkpoint.
#[derive(Clone)]
pub struct Refiner {
    consolidator: Arc<dyn CategoryConsolidator>,
    refiner: Arc<dyn SubtreeRefiner>,
    settings: RefineSettings,
}

impl Refiner {
    pub fn new(
        consolidator: Arc<dyn CategoryConsolidator>,
        refiner: Arc<dyn SubtreeRefiner>,
        settings: RefineSettings,
    ) -> Self {
        Self {
            consolidator,
            refiner,
            settings,
        }
    }

    /// Refine every canonical category not yet in `checkpoint`, flushing the
    /// whole canonical tree after each committed category.
    #[instrument(skip_all, name = "refiner")]
    pub async fn run(
        &self,
        draft: &TaxonomyTree,
        checkpoint: &mut CheckpointStore<TaxonomyTree>,
    ) -> RefineStats {
        let mut stats = RefineStats::default();
        let (categories, usage) =
            consolidate_top_level(draft, self.consolidator.as_ref(), self.settings.max_categories)
                .await;
        stats.add_usage(&usage);
        stats.categories = categories.clone();
        let merge = self.settings.merge.merger();

        for category in &categories {
            if checkpoint.state().contains_category(category) {
                debug!(category = %category, "already refined");
                stats.skipped += 1;
                continue;
            }
            let aggregated = aggregate_subtrees(category, draft, merge);
            let (outcome, usage) =
                refine_category(category, &aggregated, self.refiner.as_ref()).await;
            stats.add_usage(&usage);

            let (node, unit) = match outcome {
                CategoryOutcome::Refined(node) | CategoryOutcome::Unchanged(node) => {
                    (Some(node), UnitOutcome::Done)
                }
                CategoryOutcome::Degraded { fallback, reason } => {
                    warn!(category = %category, %reason, "refinement degraded");
                    if self.settings.accept_degraded {
                        stats.degraded += 1;
                        (Some(fallback), UnitOutcome::Done)
                    } else {
                        (None, UnitOutcome::FailedRetryable)
                    }
                }
                CategoryOutcome::Failed(e) => {
                    warn!(category = %category, error = %e.diagnostic(), "refinement failed, will retry next run");
                    (None, UnitOutcome::FailedRetryable)
                }
            };
            stats.outcomes.record(unit);

            if let Some(node) = node {
                let (_, flushed) = checkpoint.commit(|tree| tree.insert(category.clone(), node));
                let _ = flushed
                    .map_err(IoError::into_checkpoint_warning)
                    .log_and_continue(&TracingPolicy);
                info!(category = %category, "category committed");
            }
        }

        if stats.degraded > 0 {
            TracingPolicy.emit(&vidtax_error::Error::from(WarningError::Degraded {
                stage: "refiner",
                item: format!("{} categories", stats.degraded),
                reason: "committed without refinement".to_string(),
            }));
        }
        info!(
            tokens = stats.total_tokens,
            cost = stats.total_cost,
            llm_secs = stats.total_time,
            degraded = stats.degraded,
            skipped = stats.skipped,
            "refinement finished"
        );
        stats
    }
}
