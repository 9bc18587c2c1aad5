use std::fmt;

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageId, TableId};

/// An owned copy of one fixed-size page, tagged with where it lives on disk.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    table: TableId,
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Create an all-zero page
    pub fn zeroed(table: TableId, page_id: PageId) -> Self {
        Self {
            table,
            page_id,
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Create a page from a raw buffer, which must be exactly `PAGE_SIZE` bytes
    pub fn from_bytes(table: TableId, page_id: PageId, bytes: &[u8]) -> FileResult<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut page = Self::zeroed(table, page_id);
        page.data.copy_from_slice(bytes);
        Ok(page)
    }

    pub(crate) fn from_frame(table: TableId, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Self {
        Self {
            table,
            page_id,
            data: Box::new(*data),
        }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    /// Byte offset of this page in its table file
    pub fn file_offset(&self) -> u64 {
        self.page_id as u64 * PAGE_SIZE as u64
    }

    /// Read a little-endian i32 at a fixed offset
    pub fn read_i32(&self, offset: usize) -> i32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        i32::from_le_bytes(bytes)
    }

    /// Write a little-endian i32 at a fixed offset
    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("table", &self.table)
            .field("page_id", &self.page_id)
            .finish_non_exhaustive()
    }
}
