use std::io;
use thiserror::Error;

use super::{PageId, TableId};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt table file {table}: length {len} is not a multiple of the page size")]
    CorruptFile { table: TableId, len: u64 },

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Buffer cache is full: all {capacity} frames are checked out")]
    CacheFull { capacity: usize },

    #[error("Page {page_id} of table {table} is not checked out")]
    PageNotCheckedOut { table: TableId, page_id: PageId },
}

pub type FileResult<T> = Result<T, FileError>;
