use std::sync::Arc;

use tracing::debug;

use super::error::{RecordError, RecordResult};
use super::page::{HeapPage, MAX_RECORD_SIZE};
use super::record::{MAX_PAGES, Record, RecordId, SlotId};
use super::schema::Schema;
use crate::file::{BufferCache, Page, PageId, TableId};

/// A record rewritten by an update: removed at `old_rid`, reinserted at `new_rid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub old_rid: RecordId,
    pub new_rid: RecordId,
    pub old: Record,
    pub new: Record,
}

/// Unordered collection of records stored in the slotted pages of one
/// table file. All page access goes through the buffer cache; modified pages
/// are written through with `write_back`.
pub struct HeapFile {
    table: TableId,
    schema: Schema,
    cache: Arc<BufferCache>,
}

impl HeapFile {
    pub fn new(table: TableId, schema: Schema, cache: Arc<BufferCache>) -> Self {
        Self {
            table,
            schema,
            cache,
        }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of pages in the table file
    pub fn page_count(&self) -> RecordResult<PageId> {
        Ok(self.cache.store().file_size_in_pages(self.table)?)
    }

    /// Insert a record into the first page with room, growing the file by
    /// one page if none has any
    pub fn insert(&self, record: &Record) -> RecordResult<RecordId> {
        let bytes = record.encode(&self.schema)?;
        self.insert_bytes(&bytes)
    }

    fn insert_bytes(&self, bytes: &[u8]) -> RecordResult<RecordId> {
        let too_large = || RecordError::InsertCapacityExceeded {
            size: bytes.len(),
            max: MAX_RECORD_SIZE,
        };
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(too_large());
        }

        let page_count = self.page_count()?;
        for page_id in 0..page_count {
            if let Some(rid) = self.try_insert_at(page_id, bytes)? {
                return Ok(rid);
            }
        }
        if page_count >= MAX_PAGES {
            return Err(RecordError::TableFull {
                max_pages: MAX_PAGES,
            });
        }

        let page_id = self.cache.store().allocate_page(self.table)?;
        debug!(table = self.table, page_id, "heap file grew");
        self.try_insert_at(page_id, bytes)?.ok_or_else(too_large)
    }

    fn try_insert_at(&self, page_id: PageId, bytes: &[u8]) -> RecordResult<Option<RecordId>> {
        if page_id >= MAX_PAGES {
            return Err(RecordError::TableFull {
                max_pages: MAX_PAGES,
            });
        }
        let mut page = self.cache.checkout(self.table, page_id)?;
        let inserted =
            HeapPage::open(page_id, page.data_mut()).and_then(|mut heap_page| heap_page.insert(bytes));

        match inserted {
            Ok(Some(slot_id)) => {
                self.cache.write_back(&page)?;
                Ok(Some(RecordId::new(page_id, slot_id)))
            }
            Ok(None) => {
                self.cache.release(self.table, page_id)?;
                Ok(None)
            }
            Err(e) => {
                self.cache.release(self.table, page_id)?;
                Err(e)
            }
        }
    }

    /// Lazily iterate all live records in page then slot order. Pages added
    /// after the call are not visited.
    pub fn scan(&self) -> RecordResult<impl Iterator<Item = RecordResult<Record>> + '_> {
        Ok(self
            .scan_with_ids()?
            .map(|item| item.map(|(_, record)| record)))
    }

    /// Like `scan`, also yielding each record's id
    pub fn scan_with_ids(&self) -> RecordResult<HeapScan<'_>> {
        Ok(HeapScan {
            heap: self,
            page_count: self.page_count()?,
            page_id: 0,
            slot_id: 0,
            current: None,
            done: false,
        })
    }

    /// Read one record; `None` if the slot is empty or past the end
    pub fn get(&self, rid: RecordId) -> RecordResult<Option<Record>> {
        if rid.page_id >= self.page_count()? {
            return Ok(None);
        }
        let page = self.cache.fetch(self.table, rid.page_id)?;
        let heap_page = HeapPage::open(rid.page_id, page.data())?;
        match heap_page.record_bytes(rid.slot_id)? {
            Some(bytes) => Ok(Some(self.decode(rid.page_id, bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete every record matching the predicate. Returns the number removed.
    pub fn delete<F>(&self, predicate: F) -> RecordResult<usize>
    where
        F: FnMut(&Record) -> bool,
    {
        Ok(self.delete_matching(predicate)?.len())
    }

    /// Delete every record matching the predicate, returning what was removed
    pub fn delete_matching<F>(&self, mut predicate: F) -> RecordResult<Vec<(RecordId, Record)>>
    where
        F: FnMut(&Record) -> bool,
    {
        let mut removed = Vec::new();
        for page_id in 0..self.page_count()? {
            let mut page = self.cache.checkout(self.table, page_id)?;
            match self.tombstone_matching(&mut page, &mut predicate, &mut removed) {
                Ok(true) => self.cache.write_back(&page)?,
                Ok(false) => self.cache.release(self.table, page_id)?,
                Err(e) => {
                    self.cache.release(self.table, page_id)?;
                    return Err(e);
                }
            }
        }
        if !removed.is_empty() {
            debug!(table = self.table, count = removed.len(), "deleted records");
        }
        Ok(removed)
    }

    fn tombstone_matching<F>(
        &self,
        page: &mut Page,
        predicate: &mut F,
        removed: &mut Vec<(RecordId, Record)>,
    ) -> RecordResult<bool>
    where
        F: FnMut(&Record) -> bool,
    {
        let page_id = page.page_id();
        let mut heap_page = HeapPage::open(page_id, page.data_mut())?;
        let mut changed = false;

        for slot_id in 0..heap_page.slot_count() {
            let record = match heap_page.record_bytes(slot_id)? {
                Some(bytes) => self.decode(page_id, bytes)?,
                None => continue,
            };
            if predicate(&record) {
                heap_page.tombstone(slot_id)?;
                removed.push((RecordId::new(page_id, slot_id), record));
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Delete the record at `rid`, returning it if it was live
    pub fn delete_at(&self, rid: RecordId) -> RecordResult<Option<Record>> {
        if rid.page_id >= self.page_count()? {
            return Ok(None);
        }
        let mut page = self.cache.checkout(self.table, rid.page_id)?;
        match self.tombstone_slot(&mut page, rid.slot_id) {
            Ok(Some(record)) => {
                self.cache.write_back(&page)?;
                Ok(Some(record))
            }
            Ok(None) => {
                self.cache.release(self.table, rid.page_id)?;
                Ok(None)
            }
            Err(e) => {
                self.cache.release(self.table, rid.page_id)?;
                Err(e)
            }
        }
    }

    fn tombstone_slot(&self, page: &mut Page, slot_id: SlotId) -> RecordResult<Option<Record>> {
        let page_id = page.page_id();
        let mut heap_page = HeapPage::open(page_id, page.data_mut())?;
        let record = match heap_page.record_bytes(slot_id)? {
            Some(bytes) => self.decode(page_id, bytes)?,
            None => return Ok(None),
        };
        heap_page.tombstone(slot_id)?;
        Ok(Some(record))
    }

    /// Replace every matching record with `transform(record)`. Returns the
    /// number of records rewritten.
    pub fn update<P, T>(&self, predicate: P, transform: T) -> RecordResult<usize>
    where
        P: FnMut(&Record) -> bool,
        T: FnMut(&Record) -> Record,
    {
        Ok(self.update_matching(predicate, transform)?.len())
    }

    /// Replace every matching record with `transform(record)` by deleting it
    /// and inserting the new version, which may land in another slot.
    ///
    /// Matches are collected before anything is changed, so a rewritten
    /// record is never visited twice.
    pub fn update_matching<P, T>(
        &self,
        mut predicate: P,
        mut transform: T,
    ) -> RecordResult<Vec<RecordUpdate>>
    where
        P: FnMut(&Record) -> bool,
        T: FnMut(&Record) -> Record,
    {
        let mut planned = Vec::new();
        for item in self.scan_with_ids()? {
            let (rid, record) = item?;
            if predicate(&record) {
                let new = transform(&record);
                planned.push((rid, record, new));
            }
        }
        self.apply_updates(planned)
    }

    /// Rewrite each `(rid, old, new)`: tombstone `rid`, then insert `new`.
    /// New versions are checked against the schema before any old one is
    /// removed.
    pub fn apply_updates(
        &self,
        planned: Vec<(RecordId, Record, Record)>,
    ) -> RecordResult<Vec<RecordUpdate>> {
        let mut encoded = Vec::with_capacity(planned.len());
        for (rid, old, new) in planned {
            let bytes = new.encode(&self.schema)?;
            if bytes.len() > MAX_RECORD_SIZE {
                return Err(RecordError::InsertCapacityExceeded {
                    size: bytes.len(),
                    max: MAX_RECORD_SIZE,
                });
            }
            encoded.push((rid, old, new, bytes));
        }

        for (rid, _, _, _) in &encoded {
            self.delete_at(*rid)?;
        }

        let mut updates = Vec::with_capacity(encoded.len());
        for (old_rid, old, new, bytes) in encoded {
            let new_rid = self.insert_bytes(&bytes)?;
            updates.push(RecordUpdate {
                old_rid,
                new_rid,
                old,
                new,
            });
        }
        if !updates.is_empty() {
            debug!(table = self.table, count = updates.len(), "updated records");
        }
        Ok(updates)
    }

    fn decode(&self, page_id: PageId, bytes: &[u8]) -> RecordResult<Record> {
        Record::decode(bytes, &self.schema).map_err(|e| e.at_page(page_id))
    }

    /// Next live record of `page` at or after `*slot_id`
    fn next_in_page(
        &self,
        page: &Page,
        slot_id: &mut SlotId,
    ) -> RecordResult<Option<(RecordId, Record)>> {
        let heap_page = HeapPage::open(page.page_id(), page.data())?;
        while *slot_id < heap_page.slot_count() {
            let slot = *slot_id;
            *slot_id += 1;
            if let Some(bytes) = heap_page.record_bytes(slot)? {
                let record = self.decode(page.page_id(), bytes)?;
                return Ok(Some((RecordId::new(page.page_id(), slot), record)));
            }
        }
        Ok(None)
    }
}

/// Streaming heap scan (yields records one-by-one, a page at a time)
pub struct HeapScan<'a> {
    heap: &'a HeapFile,
    page_count: PageId,
    page_id: PageId,
    slot_id: SlotId,
    current: Option<Page>,
    done: bool,
}

impl Iterator for HeapScan<'_> {
    type Item = RecordResult<(RecordId, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.current.is_none() {
                if self.page_id >= self.page_count {
                    self.done = true;
                    return None;
                }
                match self.heap.cache.fetch(self.heap.table, self.page_id) {
                    Ok(page) => self.current = Some(page),
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err.into()));
                    }
                }
            }
            let page = self.current.as_ref()?;

            match self.heap.next_in_page(page, &mut self.slot_id) {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => {
                    self.current = None;
                    self.page_id += 1;
                    self.slot_id = 0;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
