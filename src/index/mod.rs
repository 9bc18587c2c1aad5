//! Index management module
//!
//! Every index is a B+ tree on one column of one table. Its nodes live in a
//! page file of their own and its descriptor is kept as JSON under
//! `<data_dir>/indexes/`, so indexes are reopened instead of rebuilt.

mod error;
mod index_file;
#[cfg(test)]
mod tests;

pub use error::{IndexError, IndexResult};
pub use index_file::{IndexDescriptor, IndexFile};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{Catalog, TableMetadata};
use crate::file::{BufferCache, TableId};
use crate::record::{HeapFile, Record, RecordId, RecordUpdate, Value};

const INDEX_DIR: &str = "indexes";

/// High-level index manager
pub struct IndexManager {
    /// Directory holding index descriptors
    dir: PathBuf,
    cache: Arc<BufferCache>,
    /// Open indexes keyed by lowercase name
    open_indexes: HashMap<String, IndexFile>,
}

impl IndexManager {
    /// Create a manager for a data directory. No index is opened yet.
    pub fn new(data_dir: &Path, cache: Arc<BufferCache>) -> IndexResult<Self> {
        let dir = data_dir.join(INDEX_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cache,
            open_indexes: HashMap::new(),
        })
    }

    /// Create a manager and reopen every index recorded on disk
    pub fn open(
        data_dir: &Path,
        cache: Arc<BufferCache>,
        catalog: &Catalog,
    ) -> IndexResult<Self> {
        let mut manager = Self::new(data_dir, cache)?;
        manager.open_existing(catalog)?;
        Ok(manager)
    }

    /// Reopen the indexes described in the indexes directory. Descriptors of
    /// tables that are gone are skipped. Returns the number opened.
    pub fn open_existing(&mut self, catalog: &Catalog) -> IndexResult<usize> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut opened = 0;
        for path in paths {
            let mut descriptor = IndexDescriptor::load(&path)?;
            let table = match catalog.table_by_id(descriptor.table_id) {
                Some(table) if table.name.eq_ignore_ascii_case(&descriptor.table) => table,
                _ => {
                    warn!(
                        index = %descriptor.name,
                        table = %descriptor.table,
                        "skipping index of missing table"
                    );
                    continue;
                }
            };
            descriptor.column_index = table.column_index(&descriptor.column)?;

            let key = descriptor.name.to_lowercase();
            let index = IndexFile::open(self.cache.clone(), descriptor)?;
            self.open_indexes.insert(key, index);
            opened += 1;
        }

        if opened > 0 {
            info!(count = opened, "opened indexes");
        }
        Ok(opened)
    }

    /// Create an index on `table.column` in page file `file_id` and fill it
    /// from the rows already in the heap
    pub fn create_index(
        &mut self,
        name: &str,
        table: &TableMetadata,
        column: &str,
        file_id: TableId,
        heap: &HeapFile,
    ) -> IndexResult<&IndexFile> {
        let key = name.to_lowercase();
        if self.open_indexes.contains_key(&key) || IndexDescriptor::path(&self.dir, name).exists()
        {
            return Err(IndexError::IndexAlreadyExists(name.to_string()));
        }
        let column_index = table.column_index(column)?;

        let descriptor = IndexDescriptor {
            name: name.to_string(),
            table_id: table.id,
            table: table.name.clone(),
            column: column.to_string(),
            column_index,
            file_id,
        };
        let mut index = IndexFile::create(self.cache.clone(), descriptor)?;
        let entries = match index.build_from(heap) {
            Ok(entries) => entries,
            Err(e) => {
                self.discard_file(file_id);
                return Err(e);
            }
        };
        index.descriptor().save(&self.dir)?;

        info!(
            index = %name,
            table = %table.name,
            column = %column,
            entries,
            "created index"
        );
        Ok(self.open_indexes.entry(key).or_insert(index))
    }

    /// Drop an index, deleting its pages and descriptor
    pub fn drop_index(&mut self, name: &str) -> IndexResult<IndexDescriptor> {
        let index = self
            .open_indexes
            .remove(&name.to_lowercase())
            .ok_or_else(|| IndexError::UnknownIndex(name.to_string()))?;
        let descriptor = index.descriptor().clone();

        self.cache.invalidate_table(descriptor.file_id);
        self.cache.store().delete_table(descriptor.file_id)?;
        let path = IndexDescriptor::path(&self.dir, &descriptor.name);
        if path.exists() {
            fs::remove_file(path)?;
        }

        info!(index = %descriptor.name, table = %descriptor.table, "dropped index");
        Ok(descriptor)
    }

    /// Drop every index on a table. Returns the dropped names.
    pub fn drop_table_indexes(&mut self, table_id: TableId) -> IndexResult<Vec<String>> {
        let mut names: Vec<String> = self
            .indexes_for_table(table_id)
            .iter()
            .map(|index| index.name().to_string())
            .collect();
        names.sort();
        for name in &names {
            self.drop_index(name)?;
        }
        Ok(names)
    }

    pub fn get(&self, name: &str) -> IndexResult<&IndexFile> {
        self.open_indexes
            .get(&name.to_lowercase())
            .ok_or_else(|| IndexError::UnknownIndex(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.open_indexes.contains_key(&name.to_lowercase())
    }

    /// Names of all open indexes, sorted
    pub fn index_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.open_indexes.values().map(|i| i.name()).collect();
        names.sort_unstable();
        names
    }

    pub fn indexes_for_table(&self, table_id: TableId) -> Vec<&IndexFile> {
        self.open_indexes
            .values()
            .filter(|index| index.table_id() == table_id)
            .collect()
    }

    /// Record ids stored under `key`
    pub fn search(&self, name: &str, key: &Value) -> IndexResult<Vec<RecordId>> {
        self.get(name)?.search(key)
    }

    /// Record ids with keys in `[min, max]`, in key order
    pub fn range_search(&self, name: &str, min: &Value, max: &Value) -> IndexResult<Vec<RecordId>> {
        self.get(name)?.range_search(min, max)
    }

    /// Check that every index on the table can store the row's key, before
    /// the row is written anywhere
    pub fn check_keys(&self, table_id: TableId, record: &Record) -> IndexResult<()> {
        for index in self.indexes_for_table(table_id) {
            index.check_key(record)?;
        }
        Ok(())
    }

    /// Add a freshly inserted row to every index on its table
    pub fn on_insert(&mut self, table_id: TableId, rid: RecordId, record: &Record) -> IndexResult<()> {
        for index in self.table_indexes_mut(table_id) {
            index.insert(record, rid)?;
        }
        Ok(())
    }

    /// Remove a deleted row from every index on its table
    pub fn on_delete(&mut self, table_id: TableId, rid: RecordId, record: &Record) -> IndexResult<()> {
        for index in self.table_indexes_mut(table_id) {
            index.remove(record, rid)?;
        }
        Ok(())
    }

    /// Move the entries of rewritten rows to their new keys and locations
    pub fn on_update(&mut self, table_id: TableId, updates: &[RecordUpdate]) -> IndexResult<()> {
        for update in updates {
            self.on_delete(table_id, update.old_rid, &update.old)?;
            self.on_insert(table_id, update.new_rid, &update.new)?;
        }
        Ok(())
    }

    fn table_indexes_mut(&mut self, table_id: TableId) -> impl Iterator<Item = &mut IndexFile> {
        self.open_indexes
            .values_mut()
            .filter(move |index| index.table_id() == table_id)
    }

    fn discard_file(&self, file_id: TableId) {
        self.cache.invalidate_table(file_id);
        if let Err(e) = self.cache.store().delete_table(file_id) {
            warn!(file = file_id, error = %e, "failed to remove index file");
        }
    }
}
