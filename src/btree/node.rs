use std::cmp::Ordering;

use crate::file::PageId;
use crate::record::{RecordId, Value};

use super::key::compare_keys;

/// Internal node: separator keys and child page ids.
///
/// - children.len() == keys.len() + 1
/// - every key in children[i] is <= keys[i], every key in children[i + 1]
///   is >= keys[i]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub keys: Vec<Value>,
    pub children: Vec<PageId>,
}

impl InternalNode {
    pub fn new(keys: Vec<Value>, children: Vec<PageId>) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Self { keys, children }
    }

    /// Child to descend into when inserting: the first separator greater
    /// than the key, so equal keys go right
    pub fn insert_child_index(&self, key: &Value) -> usize {
        self.keys
            .partition_point(|k| compare_keys(k, key) != Ordering::Greater)
    }

    /// Child to descend into when searching: the first separator at or above
    /// the key, so the leftmost leaf that may hold it is reached
    pub fn search_child_index(&self, key: &Value) -> usize {
        self.keys
            .partition_point(|k| compare_keys(k, key) == Ordering::Less)
    }

    /// Record that children[index] split, with `right` holding keys >= `key`
    pub fn insert_child(&mut self, index: usize, key: Value, right: PageId) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, right);
    }

    /// Split an overfull node. The middle key moves up and is returned with
    /// the new right sibling; this node keeps the lower half.
    pub fn split(&mut self) -> (Value, InternalNode) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let separator = self.keys.remove(mid);
        (separator, InternalNode::new(right_keys, right_children))
    }
}

/// Leaf node: sorted (key, record id) entries, linked to the next leaf
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafNode {
    pub keys: Vec<Value>,
    pub values: Vec<RecordId>,
    pub next: Option<PageId>,
}

impl LeafNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(keys: Vec<Value>, values: Vec<RecordId>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        Self {
            keys,
            values,
            next: None,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert keeping keys sorted; a duplicate goes after existing equal keys
    pub fn insert(&mut self, key: Value, value: RecordId) {
        let pos = self
            .keys
            .partition_point(|k| compare_keys(k, &key) != Ordering::Greater);
        self.keys.insert(pos, key);
        self.values.insert(pos, value);
    }

    /// Position of the first key >= `key`
    pub fn lower_bound(&self, key: &Value) -> usize {
        self.keys
            .partition_point(|k| compare_keys(k, key) == Ordering::Less)
    }

    pub fn remove(&mut self, index: usize) -> (Value, RecordId) {
        (self.keys.remove(index), self.values.remove(index))
    }

    /// Split an overfull leaf. The upper half, including the middle entry,
    /// moves to the returned sibling, which inherits this leaf's `next`.
    /// The caller links this leaf to the sibling once it has a page.
    pub fn split(&mut self) -> LeafNode {
        let mid = self.keys.len() / 2;
        LeafNode {
            keys: self.keys.split_off(mid),
            values: self.values.split_off(mid),
            next: self.next,
        }
    }
}

/// Node enum for the two node kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BPlusNode {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl BPlusNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, BPlusNode::Leaf(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, BPlusNode::Internal(_))
    }

    pub fn key_count(&self) -> usize {
        match self {
            BPlusNode::Internal(node) => node.keys.len(),
            BPlusNode::Leaf(node) => node.keys.len(),
        }
    }
}
