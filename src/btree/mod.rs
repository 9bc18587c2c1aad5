//! Disk-backed B+ tree for secondary indexes
//!
//! Maps column values to record ids. It supports:
//! - Duplicate keys (for non-unique indexes)
//! - Range queries (via linked leaf nodes)
//! - Any `Value` as key, ordered by [`compare_keys`]
//!
//! Nodes live one per page in the tree's own page file and are read and
//! written through the shared buffer cache. Page 0 holds the tree metadata.

mod error;
mod key;
mod node;
mod serialization;

pub use error::{BTreeError, BTreeResult};
pub use key::compare_keys;
pub use node::{BPlusNode, InternalNode, LeafNode};
pub use serialization::{MAGIC_NUMBER, TreeMetadata, VERSION};

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::file::{BufferCache, PAGE_SIZE, Page, PageId, TableId};
use crate::record::{RecordId, Value};
use serialization::{deserialize_metadata, deserialize_node, serialize_metadata, serialize_node};

/// Maximum keys per node before it splits
pub const ORDER: usize = 4;

/// Largest encoded key the tree accepts: an internal node with `ORDER` such
/// keys (marker, two counts, `ORDER + 1` children) still fits in a page
pub const MAX_KEY_SIZE: usize = (PAGE_SIZE - 9 - 4 * (ORDER + 1)) / ORDER;

const META_PAGE: PageId = 0;

/// B+ tree of order [`ORDER`]
///
/// - A leaf holds at most `ORDER` entries; one more triggers a split
/// - An internal node holds at most `ORDER` separator keys
/// - Deletion removes entries in place and never merges or redistributes
pub struct BPlusTree {
    file: TableId,
    cache: Arc<BufferCache>,
    order: usize,
    /// Root page (None if tree is empty)
    root: Option<PageId>,
    entry_count: u64,
}

impl BPlusTree {
    /// Create an empty tree in a new page file
    pub fn create(cache: Arc<BufferCache>, file: TableId) -> BTreeResult<Self> {
        let pages = cache.store().file_size_in_pages(file)?;
        if pages != 0 {
            return Err(BTreeError::InvalidMetaPage {
                file,
                reason: format!("file already has {} pages", pages),
            });
        }
        cache.store().allocate_page(file)?;

        let tree = Self {
            file,
            cache,
            order: ORDER,
            root: None,
            entry_count: 0,
        };
        tree.write_metadata()?;
        debug!(file, "created b+ tree");
        Ok(tree)
    }

    /// Open an existing tree from its meta page
    pub fn open(cache: Arc<BufferCache>, file: TableId) -> BTreeResult<Self> {
        let page = cache.fetch(file, META_PAGE)?;
        let metadata = deserialize_metadata(file, &page)?;
        if metadata.order != ORDER {
            return Err(BTreeError::InvalidMetaPage {
                file,
                reason: format!("order {} (expected {})", metadata.order, ORDER),
            });
        }

        Ok(Self {
            file,
            cache,
            order: metadata.order,
            root: metadata.root,
            entry_count: metadata.entry_count,
        })
    }

    /// Id of the page file holding this tree
    pub fn file(&self) -> TableId {
        self.file
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Get number of entries in the tree
    pub fn len(&self) -> usize {
        self.entry_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        self.root
    }

    /// Get tree height (1 for single leaf, 2+ for internal nodes)
    pub fn height(&self) -> BTreeResult<usize> {
        let Some(mut current) = self.root else {
            return Ok(0);
        };
        let mut height = 1;
        while let BPlusNode::Internal(node) = self.read_node(current)? {
            current = node.children[0];
            height += 1;
        }
        Ok(height)
    }

    // ========== Insert Operations ==========

    /// Insert a key-value pair into the tree
    pub fn insert(&mut self, key: Value, rid: RecordId) -> BTreeResult<()> {
        Self::check_key(&key)?;
        let Some(root) = self.root else {
            // Create first leaf as root
            let mut leaf = LeafNode::new();
            leaf.insert(key, rid);
            self.root = Some(self.allocate_node(&BPlusNode::Leaf(leaf))?);
            self.entry_count = 1;
            return self.write_metadata();
        };

        // Descend, remembering each parent and the child taken
        let mut path: Vec<(PageId, InternalNode, usize)> = Vec::new();
        let mut page_id = root;
        let mut leaf = loop {
            match self.read_node(page_id)? {
                BPlusNode::Internal(node) => {
                    let child_idx = node.insert_child_index(&key);
                    let child = node.children[child_idx];
                    path.push((page_id, node, child_idx));
                    page_id = child;
                }
                BPlusNode::Leaf(leaf) => break leaf,
            }
        };

        leaf.insert(key, rid);
        if leaf.len() > self.order {
            self.split_leaf(page_id, leaf, path)?;
        } else {
            self.write_node(page_id, &BPlusNode::Leaf(leaf))?;
        }

        self.entry_count += 1;
        self.write_metadata()
    }

    /// Fail with `KeyTooLarge` if `key` could not be stored
    pub fn check_key(key: &Value) -> BTreeResult<()> {
        let size = key.encoded_len();
        if size > MAX_KEY_SIZE {
            return Err(BTreeError::KeyTooLarge {
                size,
                max: MAX_KEY_SIZE,
            });
        }
        Ok(())
    }

    /// Split an overflowing leaf node
    fn split_leaf(
        &mut self,
        page_id: PageId,
        mut leaf: LeafNode,
        path: Vec<(PageId, InternalNode, usize)>,
    ) -> BTreeResult<()> {
        let right = leaf.split();
        let separator = right.keys[0].clone();

        // `next` does not change the encoded size
        self.check_fits(page_id, &BPlusNode::Leaf(leaf.clone()))?;
        let right_id = self.allocate_node(&BPlusNode::Leaf(right))?;
        leaf.next = Some(right_id);
        self.write_node(page_id, &BPlusNode::Leaf(leaf))?;
        debug!(file = self.file, left = page_id, right = right_id, "split leaf");

        self.insert_into_parent(path, page_id, separator, right_id)
    }

    /// Hook a new right sibling into the parents, splitting them as needed
    fn insert_into_parent(
        &mut self,
        mut path: Vec<(PageId, InternalNode, usize)>,
        mut left_id: PageId,
        mut separator: Value,
        mut right_id: PageId,
    ) -> BTreeResult<()> {
        while let Some((parent_id, mut parent, child_idx)) = path.pop() {
            parent.insert_child(child_idx, separator, right_id);
            if parent.keys.len() <= self.order {
                return self.write_node(parent_id, &BPlusNode::Internal(parent));
            }

            let (middle, sibling) = parent.split();
            self.check_fits(parent_id, &BPlusNode::Internal(parent.clone()))?;
            let sibling_id = self.allocate_node(&BPlusNode::Internal(sibling))?;
            self.write_node(parent_id, &BPlusNode::Internal(parent))?;
            debug!(file = self.file, left = parent_id, right = sibling_id, "split internal node");

            left_id = parent_id;
            separator = middle;
            right_id = sibling_id;
        }

        // Split the root - create new root
        let new_root = InternalNode::new(vec![separator], vec![left_id, right_id]);
        let root_id = self.allocate_node(&BPlusNode::Internal(new_root))?;
        self.root = Some(root_id);
        debug!(file = self.file, root = root_id, "tree grew a level");
        Ok(())
    }

    // ========== Search Operations ==========

    /// All record ids stored under `key`, in leaf order
    pub fn search(&self, key: &Value) -> BTreeResult<Vec<RecordId>> {
        self.range_search(key, key)
    }

    /// All record ids whose key lies in `[min, max]`, in key order. Follows
    /// the leaf chain, so ranges spanning several leaves are complete.
    pub fn range_search(&self, min: &Value, max: &Value) -> BTreeResult<Vec<RecordId>> {
        Ok(self
            .range_entries(min, max)?
            .into_iter()
            .map(|(_, rid)| rid)
            .collect())
    }

    /// Like `range_search`, also returning the keys
    pub fn range_entries(&self, min: &Value, max: &Value) -> BTreeResult<Vec<(Value, RecordId)>> {
        let mut results = Vec::new();
        if compare_keys(min, max) == Ordering::Greater {
            return Ok(results);
        }
        let Some((_, mut leaf)) = self.find_leaf(min)? else {
            return Ok(results);
        };

        let mut start = leaf.lower_bound(min);
        loop {
            for i in start..leaf.len() {
                if compare_keys(&leaf.keys[i], max) == Ordering::Greater {
                    return Ok(results);
                }
                if compare_keys(&leaf.keys[i], min) != Ordering::Less {
                    results.push((leaf.keys[i].clone(), leaf.values[i]));
                }
            }
            match leaf.next {
                Some(next) => {
                    leaf = self.read_leaf(next)?;
                    start = 0;
                }
                None => return Ok(results),
            }
        }
    }

    /// Every entry in key order
    pub fn entries(&self) -> BTreeResult<Vec<(Value, RecordId)>> {
        let Some(mut current) = self.root else {
            return Ok(Vec::new());
        };
        let mut leaf = loop {
            match self.read_node(current)? {
                BPlusNode::Internal(node) => current = node.children[0],
                BPlusNode::Leaf(leaf) => break leaf,
            }
        };

        let mut results = Vec::with_capacity(self.len());
        loop {
            results.extend(leaf.keys.iter().cloned().zip(leaf.values.iter().copied()));
            match leaf.next {
                Some(next) => leaf = self.read_leaf(next)?,
                None => return Ok(results),
            }
        }
    }

    /// Descend to the leftmost leaf that may hold `key`
    fn find_leaf(&self, key: &Value) -> BTreeResult<Option<(PageId, LeafNode)>> {
        let Some(mut current) = self.root else {
            return Ok(None);
        };
        loop {
            match self.read_node(current)? {
                BPlusNode::Internal(node) => {
                    current = node.children[node.search_child_index(key)];
                }
                BPlusNode::Leaf(leaf) => return Ok(Some((current, leaf))),
            }
        }
    }

    // ========== Delete Operations ==========

    /// Remove the first entry with this key. Returns false if there is none.
    pub fn delete(&mut self, key: &Value) -> BTreeResult<bool> {
        self.remove_first(key, |_| true)
    }

    /// Remove the entry pairing `key` with `rid`
    pub fn delete_entry(&mut self, key: &Value, rid: RecordId) -> BTreeResult<bool> {
        self.remove_first(key, |candidate| candidate == rid)
    }

    fn remove_first<F>(&mut self, key: &Value, matches: F) -> BTreeResult<bool>
    where
        F: Fn(RecordId) -> bool,
    {
        let Some((mut page_id, mut leaf)) = self.find_leaf(key)? else {
            return Ok(false);
        };

        let mut start = leaf.lower_bound(key);
        loop {
            let mut found = None;
            for i in start..leaf.len() {
                match compare_keys(&leaf.keys[i], key) {
                    Ordering::Less => continue,
                    Ordering::Greater => return Ok(false),
                    Ordering::Equal if matches(leaf.values[i]) => {
                        found = Some(i);
                        break;
                    }
                    Ordering::Equal => continue,
                }
            }

            if let Some(i) = found {
                leaf.remove(i);
                self.write_node(page_id, &BPlusNode::Leaf(leaf))?;
                self.entry_count = self.entry_count.saturating_sub(1);
                self.collapse_root()?;
                self.write_metadata()?;
                return Ok(true);
            }

            match leaf.next {
                Some(next) => {
                    page_id = next;
                    leaf = self.read_leaf(next)?;
                    start = 0;
                }
                None => return Ok(false),
            }
        }
    }

    /// Replace an internal root that is down to a single child by that child
    fn collapse_root(&mut self) -> BTreeResult<()> {
        while let Some(root) = self.root {
            match self.read_node(root)? {
                BPlusNode::Internal(node) if node.children.len() == 1 => {
                    self.root = Some(node.children[0]);
                    debug!(file = self.file, root = node.children[0], "collapsed root");
                }
                _ => break,
            }
        }
        Ok(())
    }

    // ========== Page I/O ==========

    fn read_node(&self, page_id: PageId) -> BTreeResult<BPlusNode> {
        let page = self.cache.fetch(self.file, page_id)?;
        deserialize_node(&page)
    }

    fn read_leaf(&self, page_id: PageId) -> BTreeResult<LeafNode> {
        match self.read_node(page_id)? {
            BPlusNode::Leaf(leaf) => Ok(leaf),
            BPlusNode::Internal(_) => Err(BTreeError::Corruption {
                page_id,
                reason: "leaf chain points at an internal node".to_string(),
            }),
        }
    }

    fn write_node(&self, page_id: PageId, node: &BPlusNode) -> BTreeResult<()> {
        let mut page = Page::zeroed(self.file, page_id);
        serialize_node(node, &mut page)?;
        self.cache.write_back(&page)?;
        Ok(())
    }

    /// Give `node` a new page. It is encoded first, so a node that does not
    /// fit leaves no page behind.
    fn allocate_node(&self, node: &BPlusNode) -> BTreeResult<PageId> {
        let next = self.cache.store().file_size_in_pages(self.file)?;
        self.check_fits(next, node)?;
        let page_id = self.cache.store().allocate_page(self.file)?;
        self.write_node(page_id, node)?;
        Ok(page_id)
    }

    fn check_fits(&self, page_id: PageId, node: &BPlusNode) -> BTreeResult<()> {
        serialize_node(node, &mut Page::zeroed(self.file, page_id))
    }

    fn write_metadata(&self) -> BTreeResult<()> {
        let metadata = TreeMetadata {
            order: self.order,
            root: self.root,
            entry_count: self.entry_count,
        };
        let mut page = Page::zeroed(self.file, META_PAGE);
        serialize_metadata(&metadata, &mut page);
        self.cache.write_back(&page)?;
        Ok(())
    }
}
