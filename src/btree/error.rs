use thiserror::Error;

use crate::file::{FileError, PageId, TableId};

/// Errors that can occur during B+ tree operations
#[derive(Debug, Error)]
pub enum BTreeError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Corrupted node at page {page_id}: {reason}")]
    Corruption { page_id: PageId, reason: String },

    #[error("Node at page {page_id} needs {size} bytes, more than a page holds")]
    NodeOverflow { page_id: PageId, size: usize },

    #[error("Key of {size} bytes exceeds the {max} byte index key limit")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Invalid index meta page in file {file}: {reason}")]
    InvalidMetaPage { file: TableId, reason: String },
}

pub type BTreeResult<T> = Result<T, BTreeError>;
