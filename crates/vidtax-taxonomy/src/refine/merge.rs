//! Strategies for combining several draft subtrees under one canonical category.

use serde::{Deserialize, Serialize};
use vidtax_core::{TaxonomyNode, taxonomy::Children};

pub trait SubtreeMerge: Send + Sync {
    /// Merge `source` into `target` in place.
    fn merge_into(&self, target: &mut Children, source: &Children);
}

/// One level deep: a child present on both sides gets its own children
/// unioned, and deeper collisions are overwritten by `source`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowMerge;

impl SubtreeMerge for ShallowMerge {
    fn merge_into(&self, target: &mut Children, source: &Children) {
        for (name, incoming) in source {
            match (target.get_mut(name), incoming) {
                (None, _) => {
                    target.insert(name.clone(), incoming.clone());
                }
                (Some(existing), TaxonomyNode::Branch(grandchildren)) => {
                    let slot = existing.children_mut();
                    for (k, v) in grandchildren {
                        slot.insert(k.clone(), v.clone());
                    }
                }
                (Some(_), TaxonomyNode::Leaf) => {}
            }
        }
    }
}

/// Recursive union; nothing below the top level is lost.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepMerge;

impl SubtreeMerge for DeepMerge {
    fn merge_into(&self, target: &mut Children, source: &Children) {
        for (name, incoming) in source {
            match (target.get_mut(name), incoming) {
                (None, _) => {
                    target.insert(name.clone(), incoming.clone());
                }
                (Some(existing), TaxonomyNode::Branch(grandchildren)) => {
                    self.merge_into(existing.children_mut(), grandchildren);
                }
                (Some(_), TaxonomyNode::Leaf) => {}
            }
        }
    }
}

/// Config-selectable merge strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    Shallow,
    Deep,
}

impl MergeStrategy {
    pub fn merger(self) -> &'static dyn SubtreeMerge {
        match self {
            MergeStrategy::Shallow => &ShallowMerge,
            MergeStrategy::Deep => &DeepMerge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn children(json: &str) -> Children {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn shallow_unions_one_level_and_overwrites_deeper() {
        let mut target = children(r#"{"esports": {"moba": {"dota": null}}, "chess": null}"#);
        let source = children(r#"{"esports": {"moba": {"lol": null}, "fps": null}, "speedruns": null}"#);
        ShallowMerge.merge_into(&mut target, &source);
        assert_eq!(
            target,
            children(
                r#"{"esports": {"moba": {"lol": null}, "fps": null}, "chess": null, "speedruns": null}"#
            )
        );
    }

    #[test]
    fn deep_keeps_everything() {
        let mut target = children(r#"{"esports": {"moba": {"dota": null}}}"#);
        let source = children(r#"{"esports": {"moba": {"lol": null}, "fps": null}}"#);
        DeepMerge.merge_into(&mut target, &source);
        assert_eq!(
            target,
            children(r#"{"esports": {"moba": {"dota": null, "lol": null}, "fps": null}}"#)
        );
    }

    #[test]
    fn leaf_meeting_branch_becomes_branch() {
        for merger in [MergeStrategy::Shallow.merger(), MergeStrategy::Deep.merger()] {
            let mut target = children(r#"{"esports": null}"#);
            merger.merge_into(&mut target, &children(r#"{"esports": {"dota": null}}"#));
            assert_eq!(target, children(r#"{"esports": {"dota": null}}"#));

            merger.merge_into(&mut target, &children(r#"{"esports": null}"#));
            assert_eq!(target, children(r#"{"esports": {"dota": null}}"#));
        }
    }
}
