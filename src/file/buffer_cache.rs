use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{FileError, FileResult};
use super::page::Page;
use super::page_store::PageStore;
use super::{PAGE_SIZE, PageId, TableId};

/// A key identifying a page in the buffer cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub table: TableId,
    pub page_id: PageId,
}

impl PageKey {
    pub fn new(table: TableId, page_id: PageId) -> Self {
        Self { table, page_id }
    }
}

/// Which resident page is dropped when the cache is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed page goes first
    #[default]
    Lru,
    /// Oldest inserted page goes first; lookups do not change the order
    Fifo,
}

/// Snapshot of the cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

type FrameId = usize;

/// One slot of the frame arena. Freed frames keep their buffer for reuse.
struct Frame {
    key: PageKey,
    data: Box<[u8; PAGE_SIZE]>,
    dirty: bool,
    pin_count: u32,
}

/// Maps resident pages to frames and tracks their eviction order
enum Residency {
    Lru(LruCache<PageKey, FrameId>),
    Fifo {
        slots: AHashMap<PageKey, FrameId>,
        order: VecDeque<PageKey>,
    },
}

impl Residency {
    fn new(policy: EvictionPolicy) -> Self {
        match policy {
            // Capacity is enforced by the cache so that pinned frames can be skipped
            EvictionPolicy::Lru => Residency::Lru(LruCache::unbounded()),
            EvictionPolicy::Fifo => Residency::Fifo {
                slots: AHashMap::new(),
                order: VecDeque::new(),
            },
        }
    }

    /// Look up a page, counting it as an access
    fn lookup(&mut self, key: &PageKey) -> Option<FrameId> {
        match self {
            Residency::Lru(cache) => cache.get(key).copied(),
            Residency::Fifo { slots, .. } => slots.get(key).copied(),
        }
    }

    /// Look up a page without touching the eviction order
    fn peek(&self, key: &PageKey) -> Option<FrameId> {
        match self {
            Residency::Lru(cache) => cache.peek(key).copied(),
            Residency::Fifo { slots, .. } => slots.get(key).copied(),
        }
    }

    fn insert(&mut self, key: PageKey, frame_id: FrameId) {
        match self {
            Residency::Lru(cache) => {
                cache.put(key, frame_id);
            }
            Residency::Fifo { slots, order } => {
                if slots.insert(key, frame_id).is_none() {
                    order.push_back(key);
                }
            }
        }
    }

    fn remove(&mut self, key: &PageKey) -> Option<FrameId> {
        match self {
            Residency::Lru(cache) => cache.pop(key),
            Residency::Fifo { slots, order } => {
                let frame_id = slots.remove(key)?;
                order.retain(|k| k != key);
                Some(frame_id)
            }
        }
    }

    /// First unpinned page in eviction order
    fn victim(&self, frames: &[Frame]) -> Option<(PageKey, FrameId)> {
        let unpinned = |frame_id: FrameId| frames[frame_id].pin_count == 0;
        match self {
            // `iter` runs from most to least recently used
            Residency::Lru(cache) => cache
                .iter()
                .rev()
                .find(|&(_, &frame_id)| unpinned(frame_id))
                .map(|(key, &frame_id)| (*key, frame_id)),
            Residency::Fifo { slots, order } => order
                .iter()
                .filter_map(|key| slots.get(key).map(|&frame_id| (*key, frame_id)))
                .find(|&(_, frame_id)| unpinned(frame_id)),
        }
    }

    fn entries(&self) -> Vec<(PageKey, FrameId)> {
        match self {
            Residency::Lru(cache) => cache.iter().map(|(key, &id)| (*key, id)).collect(),
            Residency::Fifo { slots, .. } => slots.iter().map(|(key, &id)| (*key, id)).collect(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Residency::Lru(cache) => cache.len(),
            Residency::Fifo { slots, .. } => slots.len(),
        }
    }

    fn clear(&mut self) {
        match self {
            Residency::Lru(cache) => cache.clear(),
            Residency::Fifo { slots, order } => {
                slots.clear();
                order.clear();
            }
        }
    }
}

struct CacheInner {
    residency: Residency,
    frames: Vec<Frame>,
    free_frames: Vec<FrameId>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheInner {
    fn unpin(&mut self, frame_id: FrameId) {
        let frame = &mut self.frames[frame_id];
        frame.pin_count = frame.pin_count.saturating_sub(1);
    }

    fn page_of(&self, frame_id: FrameId) -> Page {
        let frame = &self.frames[frame_id];
        Page::from_frame(frame.key.table, frame.key.page_id, &frame.data)
    }
}

/// Bounded cache of pages in front of a [`PageStore`].
///
/// `get`/`put` are plain lookups and insertions. `fetch` loads through to the
/// store on a miss. Pages that are about to be modified are taken with
/// `checkout`, which pins the frame until it is handed back with
/// `write_back` (write-through), `checkin_dirty` (written when evicted or
/// flushed) or `release` (unchanged). Pinned frames are never evicted.
pub struct BufferCache {
    store: Arc<PageStore>,
    policy: EvictionPolicy,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl BufferCache {
    /// Create a new buffer cache holding at most `capacity` pages
    pub fn new(store: Arc<PageStore>, capacity: usize, policy: EvictionPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            policy,
            capacity,
            inner: Mutex::new(CacheInner {
                residency: Residency::new(policy),
                frames: Vec::with_capacity(capacity),
                free_frames: Vec::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Get the page store behind this cache
    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a cached page. Counts a hit or a miss and, under LRU, marks
    /// the page as most recently used.
    pub fn get(&self, table: TableId, page_id: PageId) -> Option<Page> {
        let key = PageKey::new(table, page_id);
        let mut inner = self.inner.lock();
        match inner.residency.lookup(&key) {
            Some(frame_id) => {
                inner.hits += 1;
                Some(inner.page_of(frame_id))
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite a cached page, evicting if the cache is full
    pub fn put(&self, page: &Page) -> FileResult<()> {
        let key = PageKey::new(page.table(), page.page_id());
        let mut inner = self.inner.lock();
        let dirty = inner
            .residency
            .peek(&key)
            .is_some_and(|frame_id| inner.frames[frame_id].dirty);
        self.install(&mut inner, key, page.data(), dirty)?;
        Ok(())
    }

    /// Get a page, reading it from the store on a miss
    pub fn fetch(&self, table: TableId, page_id: PageId) -> FileResult<Page> {
        self.load(table, page_id, false)
    }

    /// Get a page for modification. The frame stays pinned until the page is
    /// handed back with `write_back`, `checkin_dirty` or `release`.
    pub fn checkout(&self, table: TableId, page_id: PageId) -> FileResult<Page> {
        self.load(table, page_id, true)
    }

    /// Write a modified page through to the store, refresh the cached copy
    /// and unpin it
    pub fn write_back(&self, page: &Page) -> FileResult<()> {
        let key = PageKey::new(page.table(), page.page_id());
        if let Err(e) = self.store.write_page(page) {
            // The checkout ends either way; the cached copy keeps the old bytes.
            let mut inner = self.inner.lock();
            if let Some(frame_id) = inner.residency.peek(&key) {
                inner.unpin(frame_id);
            }
            return Err(e);
        }

        let mut inner = self.inner.lock();
        match self.install(&mut inner, key, page.data(), false) {
            Ok(frame_id) => inner.unpin(frame_id),
            // Already durable; it just does not stay cached.
            Err(FileError::CacheFull { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Store a modified page in the cache only; it reaches the store when it
    /// is evicted or flushed
    pub fn checkin_dirty(&self, page: &Page) -> FileResult<()> {
        let key = PageKey::new(page.table(), page.page_id());
        let mut inner = self.inner.lock();
        match self.install(&mut inner, key, page.data(), true) {
            Ok(frame_id) => inner.unpin(frame_id),
            Err(FileError::CacheFull { .. }) => self.store.write_page(page)?,
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Unpin a checked-out page without changing it
    pub fn release(&self, table: TableId, page_id: PageId) -> FileResult<()> {
        let key = PageKey::new(table, page_id);
        let mut inner = self.inner.lock();
        match inner.residency.peek(&key) {
            Some(frame_id) if inner.frames[frame_id].pin_count > 0 => {
                inner.unpin(frame_id);
                Ok(())
            }
            _ => Err(FileError::PageNotCheckedOut { table, page_id }),
        }
    }

    /// Write all dirty pages of one table to the store
    pub fn flush_table(&self, table: TableId) -> FileResult<()> {
        self.flush_where(|key| key.table == table)?;
        self.store.sync(table)
    }

    /// Write all dirty pages to the store and sync the files
    pub fn flush_all(&self) -> FileResult<()> {
        self.flush_where(|_| true)?;
        self.store.sync_all()
    }

    fn flush_where<F: Fn(&PageKey) -> bool>(&self, selected: F) -> FileResult<()> {
        let mut inner = self.inner.lock();
        let mut flushed = 0usize;
        for (key, frame_id) in inner.residency.entries() {
            if !selected(&key) || !inner.frames[frame_id].dirty {
                continue;
            }
            self.store.write_page(&inner.page_of(frame_id))?;
            inner.frames[frame_id].dirty = false;
            flushed += 1;
        }
        if flushed > 0 {
            debug!(flushed, "flushed dirty pages");
        }
        Ok(())
    }

    /// Drop every cached page of a table without writing anything back.
    /// Used when the table file itself goes away.
    pub fn invalidate_table(&self, table: TableId) -> usize {
        let mut inner = self.inner.lock();
        let mut dropped = 0;
        for (key, _) in inner.residency.entries() {
            if key.table != table {
                continue;
            }
            if let Some(frame_id) = inner.residency.remove(&key) {
                let frame = &mut inner.frames[frame_id];
                frame.dirty = false;
                frame.pin_count = 0;
                inner.free_frames.push(frame_id);
                dropped += 1;
            }
        }
        debug!(table, dropped, "invalidated cached pages");
        dropped
    }

    /// Drop all cached pages without writing anything back
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.residency.clear();
        let frame_count = inner.frames.len();
        for frame in inner.frames.iter_mut() {
            frame.dirty = false;
            frame.pin_count = 0;
        }
        inner.free_frames = (0..frame_count).collect();
    }

    /// Check if a page is cached, without counting an access
    pub fn contains(&self, table: TableId, page_id: PageId) -> bool {
        self.inner
            .lock()
            .residency
            .peek(&PageKey::new(table, page_id))
            .is_some()
    }

    /// Get the number of pages currently cached
    pub fn len(&self) -> usize {
        self.inner.lock().residency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of dirty pages in the cache
    pub fn dirty_page_count(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .residency
            .entries()
            .into_iter()
            .filter(|&(_, frame_id)| inner.frames[frame_id].dirty)
            .count()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.residency.len(),
            capacity: self.capacity,
        }
    }

    pub fn reset_stats(&self) {
        let mut inner = self.inner.lock();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    fn load(&self, table: TableId, page_id: PageId, pin: bool) -> FileResult<Page> {
        let key = PageKey::new(table, page_id);
        let mut inner = self.inner.lock();

        let frame_id = match inner.residency.lookup(&key) {
            Some(frame_id) => {
                inner.hits += 1;
                frame_id
            }
            None => {
                inner.misses += 1;
                let page = self.store.read_page(table, page_id)?;
                self.install(&mut inner, key, page.data(), false)?
            }
        };

        if pin {
            inner.frames[frame_id].pin_count += 1;
        }
        Ok(inner.page_of(frame_id))
    }

    /// Place page contents in a frame, evicting first if the page is not
    /// resident and the cache is full
    fn install(
        &self,
        inner: &mut CacheInner,
        key: PageKey,
        data: &[u8; PAGE_SIZE],
        dirty: bool,
    ) -> FileResult<FrameId> {
        if let Some(frame_id) = inner.residency.lookup(&key) {
            let frame = &mut inner.frames[frame_id];
            frame.data.copy_from_slice(data);
            frame.dirty = dirty;
            return Ok(frame_id);
        }

        while inner.residency.len() >= self.capacity {
            self.evict_one(inner)?;
        }

        let frame_id = match inner.free_frames.pop() {
            Some(frame_id) => {
                let frame = &mut inner.frames[frame_id];
                frame.key = key;
                frame.data.copy_from_slice(data);
                frame.dirty = dirty;
                frame.pin_count = 0;
                frame_id
            }
            None => {
                inner.frames.push(Frame {
                    key,
                    data: Box::new(*data),
                    dirty,
                    pin_count: 0,
                });
                inner.frames.len() - 1
            }
        };
        inner.residency.insert(key, frame_id);
        Ok(frame_id)
    }

    fn evict_one(&self, inner: &mut CacheInner) -> FileResult<()> {
        let (key, frame_id) = inner
            .residency
            .victim(&inner.frames)
            .ok_or(FileError::CacheFull {
                capacity: self.capacity,
            })?;

        // Flush if dirty before evicting
        let dirty = inner.frames[frame_id].dirty;
        if dirty {
            self.store.write_page(&inner.page_of(frame_id))?;
            inner.frames[frame_id].dirty = false;
        }

        inner.residency.remove(&key);
        inner.free_frames.push(frame_id);
        inner.evictions += 1;
        debug!(table = key.table, page_id = key.page_id, dirty, "evicted page");
        Ok(())
    }
}

impl Drop for BufferCache {
    fn drop(&mut self) {
        // Flush all dirty pages when the cache is dropped
        if let Err(e) = self.flush_all() {
            warn!(error = %e, "failed to flush buffer cache on drop");
        }
    }
}
