mod buffer_cache;
mod error;
mod page;
mod page_store;

pub use buffer_cache::{BufferCache, CacheStats, EvictionPolicy, PageKey};
pub use error::{FileError, FileResult};
pub use page::Page;
pub use page_store::PageStore;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Number of pages held by the buffer cache unless configured otherwise
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Page number within one table file
pub type PageId = u32;

/// Catalog-assigned id; one backing file (`table_<id>.dat`) per id
pub type TableId = u32;
