//! A single secondary index: its JSON descriptor and the tree behind it

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::btree::BPlusTree;
use crate::file::{BufferCache, TableId};
use crate::record::{HeapFile, Record, RecordId, Value};

use super::error::IndexResult;

/// What an index covers and where its pages live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub table_id: TableId,
    pub table: String,
    pub column: String,
    pub column_index: usize,
    /// Page file holding the tree
    pub file_id: TableId,
}

impl IndexDescriptor {
    /// Descriptor path for an index name inside the indexes directory
    pub fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.json", name.to_lowercase()))
    }

    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(dir, &self.name), content)?;
        Ok(())
    }

    pub fn load(path: &Path) -> IndexResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// An open index
pub struct IndexFile {
    descriptor: IndexDescriptor,
    tree: BPlusTree,
}

impl IndexFile {
    /// Create an empty index in a fresh page file
    pub fn create(cache: Arc<BufferCache>, descriptor: IndexDescriptor) -> IndexResult<Self> {
        let tree = BPlusTree::create(cache, descriptor.file_id)?;
        Ok(Self { descriptor, tree })
    }

    /// Open an index whose tree was written before
    pub fn open(cache: Arc<BufferCache>, descriptor: IndexDescriptor) -> IndexResult<Self> {
        let tree = BPlusTree::open(cache, descriptor.file_id)?;
        Ok(Self { descriptor, tree })
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn table_id(&self) -> TableId {
        self.descriptor.table_id
    }

    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Indexed value of a row. Missing columns index as NULL.
    pub fn key_of(&self, record: &Record) -> Value {
        record
            .get(self.descriptor.column_index)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Index every live row of the heap. Returns the number of entries added.
    pub fn build_from(&mut self, heap: &HeapFile) -> IndexResult<usize> {
        let mut count = 0;
        for item in heap.scan_with_ids()? {
            let (rid, record) = item?;
            let key = self.key_of(&record);
            self.tree.insert(key, rid)?;
            count += 1;
        }
        Ok(count)
    }

    /// Fail if the row's key is too large for this index
    pub fn check_key(&self, record: &Record) -> IndexResult<()> {
        BPlusTree::check_key(&self.key_of(record))?;
        Ok(())
    }

    pub fn insert(&mut self, record: &Record, rid: RecordId) -> IndexResult<()> {
        let key = self.key_of(record);
        self.tree.insert(key, rid)?;
        Ok(())
    }

    /// Remove the entry for a row. Returns false if it was not indexed.
    pub fn remove(&mut self, record: &Record, rid: RecordId) -> IndexResult<bool> {
        let key = self.key_of(record);
        Ok(self.tree.delete_entry(&key, rid)?)
    }

    pub fn search(&self, key: &Value) -> IndexResult<Vec<RecordId>> {
        Ok(self.tree.search(key)?)
    }

    pub fn range_search(&self, min: &Value, max: &Value) -> IndexResult<Vec<RecordId>> {
        Ok(self.tree.range_search(min, max)?)
    }
}
