//! Owning tree representation of a taxonomy.
//!
//! On disk a leaf is `null` and a branch is an object of child name to node,
//! the same shape the draft and canonical artifacts have always used.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{HierarchicalPath, normalize_segment};

pub type Children = BTreeMap<String, TaxonomyNode>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaxonomyNode {
    Branch(Children),
    #[default]
    Leaf,
}

impl TaxonomyNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, TaxonomyNode::Leaf)
    }

    pub fn children(&self) -> Option<&Children> {
        match self {
            TaxonomyNode::Branch(children) => Some(children),
            TaxonomyNode::Leaf => None,
        }
    }

    /// Children of this node, turning a leaf into an empty branch first.
    pub fn children_mut(&mut self) -> &mut Children {
        if self.is_leaf() {
            *self = TaxonomyNode::Branch(Children::new());
        }
        match self {
            TaxonomyNode::Branch(children) => children,
            TaxonomyNode::Leaf => unreachable!("leaf was replaced by a branch above"),
        }
    }

    /// Collapse every childless branch into a leaf, bottom-up.
    pub fn normalize(&mut self) {
        if let TaxonomyNode::Branch(children) = self {
            for child in children.values_mut() {
                child.normalize();
            }
            if children.is_empty() {
                *self = TaxonomyNode::Leaf;
            }
        }
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children()
            .map(|c| c.values().map(|n| 1 + n.descendant_count()).sum())
            .unwrap_or(0)
    }

    /// Normalized names of every node below this one.
    pub fn collect_names(&self, out: &mut Vec<String>) {
        if let Some(children) = self.children() {
            for (name, child) in children {
                out.push(normalize_segment(name));
                child.collect_names(out);
            }
        }
    }

    /// Normalized names of every leaf below this one.
    pub fn collect_leaf_names(&self, out: &mut Vec<String>) {
        if let Some(children) = self.children() {
            for (name, child) in children {
                if child.is_leaf() {
                    out.push(normalize_segment(name));
                } else {
                    child.collect_leaf_names(out);
                }
            }
        }
    }
}

/// Root mapping from top-level category name to node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonomyTree {
    roots: Children,
}

impl TaxonomyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_roots(roots: Children) -> Self {
        let mut tree = Self { roots };
        tree.normalize();
        tree
    }

    /// Insert the segment chain of `path`, creating intermediate nodes as needed.
    /// Returns `true` when at least one node was created.
    pub fn insert_path(&mut self, path: &HierarchicalPath) -> bool {
        let mut created = false;
        let mut level = &mut self.roots;
        let (last, init) = match path.segments().split_last() {
            Some(split) => split,
            None => return false,
        };
        for segment in init {
            if !level.contains_key(segment) {
                created = true;
            }
            level = level
                .entry(segment.clone())
                .or_insert(TaxonomyNode::Leaf)
                .children_mut();
        }
        if !level.contains_key(last) {
            level.insert(last.clone(), TaxonomyNode::Leaf);
            created = true;
        }
        created
    }

    pub fn normalize(&mut self) {
        for node in self.roots.values_mut() {
            node.normalize();
        }
    }

    pub fn get(&self, name: &str) -> Option<&TaxonomyNode> {
        self.roots.get(name)
    }

    /// Case-insensitive lookup of a top-level category.
    pub fn contains_category(&self, name: &str) -> bool {
        let wanted = normalize_segment(name);
        self.roots.keys().any(|k| normalize_segment(k) == wanted)
    }

    pub fn insert(&mut self, name: impl Into<String>, node: TaxonomyNode) {
        self.roots.insert(name.into(), node);
    }

    pub fn categories(&self) -> impl Iterator<Item = &String> {
        self.roots.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TaxonomyNode)> {
        self.roots.iter()
    }

    pub fn roots(&self) -> &Children {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.roots.values().map(|n| 1 + n.descendant_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> HierarchicalPath {
        HierarchicalPath::parse(raw).unwrap()
    }

    #[test]
    fn leaf_and_branch_round_trip_as_null_and_object() {
        let mut tree = TaxonomyTree::new();
        tree.insert_path(&path("Gaming > Esports"));
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"{"Gaming":{"Esports":null}}"#);
        let back: TaxonomyTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn reinserting_a_chain_is_a_no_op() {
        let mut tree = TaxonomyTree::new();
        assert!(tree.insert_path(&path("Gaming > Esports")));
        let snapshot = tree.clone();
        assert!(!tree.insert_path(&path("Gaming > Esports")));
        assert_eq!(tree, snapshot);
    }

    #[test]
    fn leaf_grows_into_branch() {
        let mut tree = TaxonomyTree::new();
        tree.insert_path(&path("Gaming"));
        tree.insert_path(&path("Gaming > Esports"));
        let gaming = tree.get("Gaming").unwrap();
        assert!(gaming.children().unwrap()["Esports"].is_leaf());
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn empty_objects_normalize_to_leaves() {
        let mut tree: TaxonomyTree =
            serde_json::from_str(r#"{"music":{"pop":{},"rock":{"indie":{}}}}"#).unwrap();
        tree.normalize();
        let music = tree.get("music").unwrap().children().unwrap();
        assert!(music["pop"].is_leaf());
        assert!(music["rock"].children().unwrap()["indie"].is_leaf());
    }

    #[test]
    fn names_are_collected_normalized() {
        let tree = TaxonomyTree::from_roots(
            serde_json::from_str(r#"{"g":{"Esports":{"Apex  Legends":null},"Chess":null}}"#)
                .unwrap(),
        );
        let mut names = Vec::new();
        tree.get("g").unwrap().collect_names(&mut names);
        assert_eq!(names, vec!["chess", "esports", "apex legends"]);
        let mut leaves = Vec::new();
        tree.get("g").unwrap().collect_leaf_names(&mut leaves);
        assert_eq!(leaves, vec!["chess", "apex legends"]);
    }
}
