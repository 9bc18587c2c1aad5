//! Storage engine facade
//!
//! `Database` ties the page store, buffer cache, catalog, heap files and
//! indexes of one data directory together. Heap mutations made through it
//! keep every index on the table up to date.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogError, TableMetadata};
use crate::config::{ConfigError, StorageConfig};
use crate::file::{BufferCache, CacheStats, FileError, PageStore};
use crate::index::{IndexDescriptor, IndexError, IndexManager};
use crate::record::{Column, HeapFile, Record, RecordError, RecordId, Schema, Value};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

pub struct Database {
    config: StorageConfig,
    cache: Arc<BufferCache>,
    catalog: Catalog,
    indexes: IndexManager,
}

impl Database {
    /// Open (or initialize) the data directory named by the config
    pub fn open(config: StorageConfig) -> DatabaseResult<Self> {
        config.validate()?;

        let store = Arc::new(PageStore::open(&config.data_dir)?);
        let cache = Arc::new(BufferCache::new(
            store,
            config.cache_capacity,
            config.eviction_policy,
        ));
        let catalog = Catalog::open(&config.data_dir)?;
        let indexes = IndexManager::open(&config.data_dir, cache.clone(), &catalog)?;

        info!(
            data_dir = %config.data_dir.display(),
            tables = catalog.tables().len(),
            cache_capacity = config.cache_capacity,
            policy = ?config.eviction_policy,
            "opened database"
        );
        Ok(Self {
            config,
            cache,
            catalog,
            indexes,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    // ========== Tables ==========

    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> DatabaseResult<TableMetadata> {
        let schema = Schema::new(columns)?;
        Ok(self.catalog.create_table(name, schema)?)
    }

    /// Drop a table with its indexes and pages
    pub fn drop_table(&mut self, name: &str) -> DatabaseResult<()> {
        let table_id = self.catalog.get_table(name)?.id;

        self.indexes.drop_table_indexes(table_id)?;
        self.cache.invalidate_table(table_id);
        self.cache.store().delete_table(table_id)?;
        self.catalog.drop_table(name)?;
        Ok(())
    }

    pub fn table(&self, name: &str) -> DatabaseResult<&TableMetadata> {
        Ok(self.catalog.get_table(name)?)
    }

    /// Heap file of a table
    pub fn heap(&self, name: &str) -> DatabaseResult<HeapFile> {
        let table = self.catalog.get_table(name)?;
        Ok(HeapFile::new(
            table.id,
            table.schema.clone(),
            self.cache.clone(),
        ))
    }

    // ========== Rows ==========

    pub fn insert(&mut self, table: &str, values: Vec<Value>) -> DatabaseResult<RecordId> {
        let heap = self.heap(table)?;
        let record = Record::new(values);
        self.indexes.check_keys(heap.table(), &record)?;

        let rid = heap.insert(&record)?;
        if let Err(e) = self.indexes.on_insert(heap.table(), rid, &record) {
            self.undo_insert(&heap, rid, &record);
            return Err(e.into());
        }
        Ok(rid)
    }

    /// Take back a row whose index entries could not all be added
    fn undo_insert(&mut self, heap: &HeapFile, rid: RecordId, record: &Record) {
        let undone = self
            .indexes
            .on_delete(heap.table(), rid, record)
            .map_err(DatabaseError::from)
            .and_then(|_| heap.delete_at(rid).map_err(DatabaseError::from));
        if let Err(e) = undone {
            warn!(
                table = heap.table(),
                page_id = rid.page_id,
                slot_id = rid.slot_id,
                error = %e,
                "failed to undo insert"
            );
        }
    }

    /// All live rows in storage order
    pub fn scan(&self, table: &str) -> DatabaseResult<Vec<Record>> {
        let heap = self.heap(table)?;
        Ok(heap.scan()?.collect::<Result<_, _>>()?)
    }

    /// All live rows with their ids, in storage order
    pub fn scan_with_ids(&self, table: &str) -> DatabaseResult<Vec<(RecordId, Record)>> {
        let heap = self.heap(table)?;
        Ok(heap.scan_with_ids()?.collect::<Result<_, _>>()?)
    }

    pub fn get(&self, table: &str, rid: RecordId) -> DatabaseResult<Option<Record>> {
        Ok(self.heap(table)?.get(rid)?)
    }

    /// Delete matching rows. Returns the number deleted.
    pub fn delete_where<F>(&mut self, table: &str, predicate: F) -> DatabaseResult<usize>
    where
        F: FnMut(&Record) -> bool,
    {
        let heap = self.heap(table)?;
        let removed = heap.delete_matching(predicate)?;
        for (rid, record) in &removed {
            self.indexes.on_delete(heap.table(), *rid, record)?;
        }
        Ok(removed.len())
    }

    /// Rewrite matching rows with `transform`. Rewritten rows may move, and
    /// their index entries move with them. Returns the number rewritten.
    pub fn update_where<P, T>(
        &mut self,
        table: &str,
        mut predicate: P,
        mut transform: T,
    ) -> DatabaseResult<usize>
    where
        P: FnMut(&Record) -> bool,
        T: FnMut(&Record) -> Record,
    {
        let heap = self.heap(table)?;

        // Nothing is rewritten unless every new key fits its indexes
        let mut planned = Vec::new();
        for item in heap.scan_with_ids()? {
            let (rid, record) = item?;
            if predicate(&record) {
                let new = transform(&record);
                self.indexes.check_keys(heap.table(), &new)?;
                planned.push((rid, record, new));
            }
        }
        let updates = heap.apply_updates(planned)?;
        self.indexes.on_update(heap.table(), &updates)?;
        Ok(updates.len())
    }

    // ========== Indexes ==========

    /// Index `table.column`, filling the index from the existing rows
    pub fn create_index(&mut self, index: &str, table: &str, column: &str) -> DatabaseResult<()> {
        if self.indexes.contains(index) {
            return Err(IndexError::IndexAlreadyExists(index.to_string()).into());
        }
        let metadata = self.catalog.get_table(table)?.clone();
        metadata.column_index(column)?;

        let heap = self.heap(table)?;
        let file_id = self.catalog.allocate_file_id()?;
        self.indexes
            .create_index(index, &metadata, column, file_id, &heap)?;
        Ok(())
    }

    pub fn drop_index(&mut self, index: &str) -> DatabaseResult<IndexDescriptor> {
        Ok(self.indexes.drop_index(index)?)
    }

    /// Ids of rows whose indexed value equals `key`
    pub fn index_lookup(&self, index: &str, key: &Value) -> DatabaseResult<Vec<RecordId>> {
        Ok(self.indexes.search(index, key)?)
    }

    /// Ids of rows whose indexed value lies in `[min, max]`, in key order
    pub fn index_range(&self, index: &str, min: &Value, max: &Value) -> DatabaseResult<Vec<RecordId>> {
        Ok(self.indexes.range_search(index, min, max)?)
    }

    // ========== Cache ==========

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Write every dirty page and sync all open files
    pub fn flush(&self) -> DatabaseResult<()> {
        self.cache.flush_all()?;
        self.cache.store().sync_all()?;
        Ok(())
    }
}
