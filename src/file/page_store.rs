use std::collections::hash_map::Entry;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::error::{FileError, FileResult};
use super::page::Page;
use super::{PAGE_SIZE, PageId, TableId};

/// Reads and writes fixed-size pages of per-table files (`table_<id>.dat`).
///
/// Page `k` of a table lives at byte offset `k * PAGE_SIZE`. Open handles
/// are cached per table; every operation runs under a single lock so that
/// seek+read and seek+write pairs are atomic with respect to each other.
pub struct PageStore {
    dir: PathBuf,
    open_files: Mutex<AHashMap<TableId, File>>,
}

impl PageStore {
    /// Open a page store rooted at `dir`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> FileResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            open_files: Mutex::new(AHashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the backing file for a table
    pub fn table_path(&self, table: TableId) -> PathBuf {
        self.dir.join(format!("table_{}.dat", table))
    }

    /// Whether the backing file for a table exists on disk
    pub fn exists(&self, table: TableId) -> bool {
        self.open_files.lock().contains_key(&table) || self.table_path(table).exists()
    }

    fn file_for<'a>(
        &self,
        files: &'a mut AHashMap<TableId, File>,
        table: TableId,
    ) -> FileResult<&'a mut File> {
        match files.entry(table) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(self.table_path(table))?;
                Ok(entry.insert(file))
            }
        }
    }

    /// Read a page. Bytes beyond the end of the file read as zero, so a page
    /// that was never written comes back as an all-zero page.
    pub fn read_page(&self, table: TableId, page_id: PageId) -> FileResult<Page> {
        let mut page = Page::zeroed(table, page_id);
        let mut files = self.open_files.lock();

        if !files.contains_key(&table) && !self.table_path(table).exists() {
            return Ok(page);
        }
        let file = self.file_for(&mut files, table)?;

        let offset = page.file_offset();
        let len = file.metadata()?.len();
        if offset >= len {
            return Ok(page);
        }

        file.seek(SeekFrom::Start(offset))?;
        let available = ((len - offset) as usize).min(PAGE_SIZE);
        file.read_exact(&mut page.data_mut()[..available])?;
        Ok(page)
    }

    /// Write a page at its offset, extending the file if necessary
    pub fn write_page(&self, page: &Page) -> FileResult<()> {
        let mut files = self.open_files.lock();
        let file = self.file_for(&mut files, page.table())?;

        let offset = page.file_offset();
        let required_size = offset + PAGE_SIZE as u64;
        if file.metadata()?.len() < required_size {
            file.set_len(required_size)?;
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.data())?;
        Ok(())
    }

    /// Append a zero page to the table file and return its page id
    pub fn allocate_page(&self, table: TableId) -> FileResult<PageId> {
        let mut files = self.open_files.lock();
        let file = self.file_for(&mut files, table)?;

        let page_id = Self::page_count_of(file, table)?;
        let page = Page::zeroed(table, page_id);
        file.seek(SeekFrom::Start(page.file_offset()))?;
        file.write_all(page.data())?;

        debug!(table, page_id, "allocated page");
        Ok(page_id)
    }

    /// Number of whole pages in the table file; a missing file has zero pages.
    /// A trailing partial page means the file is corrupt.
    pub fn file_size_in_pages(&self, table: TableId) -> FileResult<PageId> {
        let mut files = self.open_files.lock();
        if !files.contains_key(&table) && !self.table_path(table).exists() {
            return Ok(0);
        }
        let file = self.file_for(&mut files, table)?;
        Self::page_count_of(file, table)
    }

    fn page_count_of(file: &File, table: TableId) -> FileResult<PageId> {
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(FileError::CorruptFile { table, len });
        }
        Ok((len / PAGE_SIZE as u64) as PageId)
    }

    /// Close and remove the backing file of a table
    pub fn delete_table(&self, table: TableId) -> FileResult<()> {
        let mut files = self.open_files.lock();
        files.remove(&table);

        let path = self.table_path(table);
        if path.exists() {
            std::fs::remove_file(&path)?;
            debug!(table, path = %path.display(), "deleted table file");
        }
        Ok(())
    }

    /// Sync one table file to disk
    pub fn sync(&self, table: TableId) -> FileResult<()> {
        let files = self.open_files.lock();
        if let Some(file) = files.get(&table) {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Sync all open files to disk
    pub fn sync_all(&self) -> FileResult<()> {
        let files = self.open_files.lock();
        for file in files.values() {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Get the number of currently open files
    pub fn open_file_count(&self) -> usize {
        self.open_files.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_store() -> (TempDir, PageStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = PageStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_table_path_naming() {
        let (temp_dir, store) = setup_test_store();
        assert_eq!(store.table_path(7), temp_dir.path().join("table_7.dat"));
    }

    #[test]
    fn test_read_write_page() {
        let (_temp_dir, store) = setup_test_store();

        let mut page = Page::zeroed(1, 0);
        page.data_mut()[0] = 42;
        page.data_mut()[100] = 99;
        page.data_mut()[PAGE_SIZE - 1] = 255;
        store.write_page(&page).unwrap();

        let read = store.read_page(1, 0).unwrap();
        assert_eq!(read, page);
    }

    #[test]
    fn test_write_multiple_pages() {
        let (_temp_dir, store) = setup_test_store();

        for page_id in 0..10 {
            let mut page = Page::zeroed(1, page_id);
            page.data_mut()[0] = page_id as u8;
            store.write_page(&page).unwrap();
        }

        for page_id in 0..10 {
            let page = store.read_page(1, page_id).unwrap();
            assert_eq!(page.data()[0], page_id as u8);
        }
        assert_eq!(store.file_size_in_pages(1).unwrap(), 10);
    }

    #[test]
    fn test_read_beyond_end_is_zero() {
        let (_temp_dir, store) = setup_test_store();

        // Missing file
        assert!(store.read_page(3, 0).unwrap().is_zeroed());
        assert!(!store.table_path(3).exists());

        // Existing file, page past the end
        store.write_page(&Page::zeroed(3, 0)).unwrap();
        assert!(store.read_page(3, 100).unwrap().is_zeroed());
    }

    #[test]
    fn test_write_extends_file_with_gap() {
        let (_temp_dir, store) = setup_test_store();

        let mut page = Page::zeroed(1, 5);
        page.data_mut()[0] = 1;
        store.write_page(&page).unwrap();

        assert_eq!(store.file_size_in_pages(1).unwrap(), 6);
        assert!(store.read_page(1, 2).unwrap().is_zeroed());
        assert_eq!(store.read_page(1, 5).unwrap().data()[0], 1);
    }

    #[test]
    fn test_allocate_page_appends() {
        let (_temp_dir, store) = setup_test_store();

        assert_eq!(store.file_size_in_pages(2).unwrap(), 0);
        assert_eq!(store.allocate_page(2).unwrap(), 0);
        assert_eq!(store.allocate_page(2).unwrap(), 1);
        assert_eq!(store.allocate_page(2).unwrap(), 2);
        assert_eq!(store.file_size_in_pages(2).unwrap(), 3);
        assert!(store.read_page(2, 1).unwrap().is_zeroed());
    }

    #[test]
    fn test_partial_page_is_corrupt() {
        let (_temp_dir, store) = setup_test_store();

        std::fs::write(store.table_path(4), vec![0u8; PAGE_SIZE + 10]).unwrap();
        let result = store.file_size_in_pages(4);
        assert!(matches!(result, Err(FileError::CorruptFile { table: 4, .. })));
    }

    #[test]
    fn test_delete_table() {
        let (_temp_dir, store) = setup_test_store();

        store.allocate_page(1).unwrap();
        assert!(store.exists(1));
        assert_eq!(store.open_file_count(), 1);

        store.delete_table(1).unwrap();
        assert!(!store.exists(1));
        assert_eq!(store.open_file_count(), 0);
        assert_eq!(store.file_size_in_pages(1).unwrap(), 0);

        // Deleting a table without a file is not an error
        store.delete_table(9).unwrap();
    }

    #[test]
    fn test_tables_are_isolated() {
        let (_temp_dir, store) = setup_test_store();

        let mut a = Page::zeroed(1, 0);
        a.data_mut()[0] = 11;
        let mut b = Page::zeroed(2, 0);
        b.data_mut()[0] = 22;
        store.write_page(&a).unwrap();
        store.write_page(&b).unwrap();

        assert_eq!(store.read_page(1, 0).unwrap().data()[0], 11);
        assert_eq!(store.read_page(2, 0).unwrap().data()[0], 22);
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let store = PageStore::open(temp_dir.path()).unwrap();
            let mut page = Page::zeroed(1, 1);
            page.write_i32(0, 1234);
            store.write_page(&page).unwrap();
            store.sync_all().unwrap();
        }

        let store = PageStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.read_page(1, 1).unwrap().read_i32(0), 1234);
    }
}
