use crate::file::{FileError, PageId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Corrupt page {page_id}: {reason}")]
    PageCorruption { page_id: PageId, reason: String },

    /// Malformed record bytes, before the page they came from is known
    #[error("Malformed record bytes: {0}")]
    Decode(String),

    #[error("Record of {size} bytes exceeds the {max} bytes a page can hold")]
    InsertCapacityExceeded { size: usize, max: usize },

    #[error("Table is full: record ids address at most {max_pages} pages")]
    TableFull { max_pages: PageId },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
}

impl RecordError {
    /// Attach a page id to a decoding failure
    pub(crate) fn at_page(self, page_id: PageId) -> Self {
        match self {
            RecordError::Decode(reason) => RecordError::PageCorruption { page_id, reason },
            other => other,
        }
    }
}

pub type RecordResult<T> = Result<T, RecordError>;
