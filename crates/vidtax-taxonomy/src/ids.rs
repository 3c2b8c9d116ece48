//! ID Assigner / Path Indexer.
//!
//! A node's id depends only on its root-to-node path, so ids survive re-runs
//! even when sibling categories come and go.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use vidtax_core::{
    HierarchicalPath, NodeId, PATH_SEPARATOR, TaxonomyNode, TaxonomyTree, normalize_path_key,
    normalize_segment, taxonomy::Children,
};

use crate::refine::{DeepMerge, SubtreeMerge};

const SEGMENT_JOINER: char = '-';
const WHITESPACE_JOINER: char = '_';

/// Normalize one segment for use inside an id.
///
/// `%`, `-` and `_` are percent-escaped so the joiners stay unambiguous.
fn escape_segment(segment: &str) -> String {
    let normalized = normalize_segment(segment);
    let mut out = String::with_capacity(normalized.len());
    for c in normalized.chars() {
        match c {
            '%' => out.push_str("%25"),
            '-' => out.push_str("%2d"),
            '_' => out.push_str("%5f"),
            ' ' => out.push(WHITESPACE_JOINER),
            c => out.push(c),
        }
    }
    out
}

/// Id for the path made of `segments`, e.g. `gaming-esports-apex_legends`.
pub fn node_id_for<S: AsRef<str>>(segments: &[S]) -> NodeId {
    NodeId::new(
        segments
            .iter()
            .map(|s| escape_segment(s.as_ref()))
            .join(&SEGMENT_JOINER.to_string()),
    )
}

/// A taxonomy node carrying its id. Serialized as `{"__id__": ..., <children>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedNode {
    #[serde(rename = "__id__")]
    pub id: NodeId,
    #[serde(flatten)]
    pub children: BTreeMap<String, IdentifiedNode>,
}

impl IdentifiedNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

pub type IdentifiedTree = BTreeMap<String, IdentifiedNode>;

/// Sibling names that normalize equally are one node; fold them together,
/// keeping the first display name.
fn fold_case_duplicates(children: &Children) -> Vec<(String, TaxonomyNode)> {
    let mut folded: Vec<(String, TaxonomyNode)> = Vec::with_capacity(children.len());
    let mut by_key: BTreeMap<String, usize> = BTreeMap::new();
    for (name, node) in children {
        let key = normalize_segment(name);
        match by_key.get(&key) {
            Some(&i) => {
                warn!(kept = %folded[i].0, folded = %name, "sibling names differ only in case or spacing");
                let target = &mut folded[i].1;
                if let TaxonomyNode::Branch(src) = node {
                    DeepMerge.merge_into(target.children_mut(), src);
                }
            }
            None => {
                by_key.insert(key, folded.len());
                folded.push((name.clone(), node.clone()));
            }
        }
    }
    folded
}

fn identify(children: &Children, prefix: &mut Vec<String>) -> BTreeMap<String, IdentifiedNode> {
    let mut out = BTreeMap::new();
    for (name, node) in fold_case_duplicates(children) {
        prefix.push(name.clone());
        let grandchildren = match &node {
            TaxonomyNode::Branch(c) => identify(c, prefix),
            TaxonomyNode::Leaf => BTreeMap::new(),
        };
        out.insert(
            name,
            IdentifiedNode {
                id: node_id_for(prefix.as_slice()),
                children: grandchildren,
            },
        );
        prefix.pop();
    }
    out
}

/// Copy of `tree` with an id on every node.
#[instrument(skip_all)]
pub fn assign_ids(tree: &TaxonomyTree) -> IdentifiedTree {
    identify(tree.roots(), &mut Vec::new())
}

/// Index key segments for one node name.
///
/// A name holding `>` is split the way a raw lookup path would be, so
/// `"c>d"` is keyed as `c > d` and stays reachable.
fn key_segments(name: &str) -> Vec<String> {
    match HierarchicalPath::parse(name) {
        Some(path) => path.segments().iter().map(|s| normalize_segment(s)).collect(),
        None => vec![normalize_segment(name)],
    }
}

/// Normalized display path to node id, one entry per node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathIndex {
    entries: BTreeMap<String, NodeId>,
}

impl PathIndex {
    pub fn build(tree: &TaxonomyTree) -> Self {
        Self::from_identified(&assign_ids(tree))
    }

    pub fn from_identified(tree: &IdentifiedTree) -> Self {
        fn walk(
            nodes: &BTreeMap<String, IdentifiedNode>,
            prefix: &mut Vec<String>,
            entries: &mut BTreeMap<String, NodeId>,
        ) {
            for (name, node) in nodes {
                let depth = prefix.len();
                prefix.extend(key_segments(name));
                match entries.entry(prefix.join(PATH_SEPARATOR)) {
                    Entry::Vacant(slot) => {
                        slot.insert(node.id.clone());
                    }
                    Entry::Occupied(slot) => {
                        warn!(key = %slot.key(), kept = %slot.get(), dropped = %node.id, "path key collision");
                    }
                }
                if !node.is_leaf() {
                    walk(&node.children, prefix, entries);
                }
                prefix.truncate(depth);
            }
        }

        let mut entries = BTreeMap::new();
        walk(tree, &mut Vec::new(), &mut entries);
        Self { entries }
    }

    /// Look up a raw path string, normalizing it first.
    pub fn resolve(&self, raw_path: &str) -> Option<&NodeId> {
        normalize_path_key(raw_path).and_then(|key| self.entries.get(&key))
    }

    pub fn get(&self, normalized_key: &str) -> Option<&NodeId> {
        self.entries.get(normalized_key)
    }

    pub fn contains_id(&self, id: &NodeId) -> bool {
        self.entries.values().any(|v| v == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeId)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
