pub mod btree;
pub mod catalog;
pub mod config;
pub mod database;
pub mod file;
pub mod index;
pub mod record;

pub use btree::{BPlusTree, BTreeError, BTreeResult};
pub use catalog::{Catalog, CatalogError, TableMetadata};
pub use config::{ConfigError, StorageConfig};
pub use database::{Database, DatabaseError, DatabaseResult};
pub use file::{
    BufferCache, CacheStats, DEFAULT_CACHE_CAPACITY, EvictionPolicy, FileError, PAGE_SIZE, Page,
    PageStore,
};
pub use index::{IndexDescriptor, IndexError, IndexManager};
pub use record::{
    Column, ColumnType, HeapFile, Record, RecordError, RecordId, RecordResult, Schema, Value,
};
