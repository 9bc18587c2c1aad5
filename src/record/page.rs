use super::error::{RecordError, RecordResult};
use super::record::SlotId;
use crate::file::{PAGE_SIZE, PageId};

/// Bytes taken by the page header (slot count + free pointer)
pub const HEADER_SIZE: usize = 8;

/// Bytes taken by one slot directory entry
pub const SLOT_SIZE: usize = 4;

/// Slot directory value of a deleted record
pub const TOMBSTONE: i32 = -1;

/// Largest encoded record that fits on an empty page
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

const MAX_SLOTS: usize = (PAGE_SIZE - HEADER_SIZE) / SLOT_SIZE;

/// Header at the start of every heap page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapPageHeader {
    pub slot_count: u16,
    /// Offset where the most recently written record begins. Records grow
    /// down from the end of the page towards the slot directory.
    pub free_pointer: u16,
}

impl HeapPageHeader {
    fn empty() -> Self {
        Self {
            slot_count: 0,
            free_pointer: PAGE_SIZE as u16,
        }
    }

    fn directory_end(&self) -> usize {
        HEADER_SIZE + self.slot_count as usize * SLOT_SIZE
    }
}

/// Slotted-page view over a page buffer, without copying it.
///
/// Layout: `[slot_count i32][free_pointer i32][slot i32]*` at the front,
/// record bytes packed against the end. A slot holds the record's byte
/// offset or `TOMBSTONE`. An all-zero page reads as an empty page.
pub struct HeapPage<B> {
    page_id: PageId,
    buffer: B,
    header: HeapPageHeader,
}

impl<B: AsRef<[u8]>> HeapPage<B> {
    /// Wrap a page buffer, validating its header
    pub fn open(page_id: PageId, buffer: B) -> RecordResult<Self> {
        let data = buffer.as_ref();
        if data.len() != PAGE_SIZE {
            return Err(corruption(
                page_id,
                format!("buffer is {} bytes, expected {}", data.len(), PAGE_SIZE),
            ));
        }

        let slot_count = read_i32_at(data, 0);
        let free_pointer = read_i32_at(data, 4);

        let header = if slot_count == 0 && free_pointer == 0 {
            HeapPageHeader::empty()
        } else {
            if slot_count < 0 || slot_count as usize > MAX_SLOTS {
                return Err(corruption(page_id, format!("slot count {}", slot_count)));
            }
            let header = HeapPageHeader {
                slot_count: slot_count as u16,
                free_pointer: 0,
            };
            let directory_end = header.directory_end();
            if free_pointer < directory_end as i32 || free_pointer > PAGE_SIZE as i32 {
                return Err(corruption(
                    page_id,
                    format!(
                        "free pointer {} outside [{}, {}]",
                        free_pointer, directory_end, PAGE_SIZE
                    ),
                ));
            }
            HeapPageHeader {
                free_pointer: free_pointer as u16,
                ..header
            }
        };

        Ok(Self {
            page_id,
            buffer,
            header,
        })
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn header(&self) -> HeapPageHeader {
        self.header
    }

    pub fn slot_count(&self) -> SlotId {
        self.header.slot_count
    }

    /// Contiguous bytes between the slot directory and the record area
    pub fn free_space(&self) -> usize {
        self.header.free_pointer as usize - self.header.directory_end()
    }

    fn slot_entry(&self, slot: SlotId) -> i32 {
        read_i32_at(self.buffer.as_ref(), HEADER_SIZE + slot as usize * SLOT_SIZE)
    }

    /// Byte offset of a live record, or `None` for tombstones and slots past
    /// the directory
    pub fn record_offset(&self, slot: SlotId) -> RecordResult<Option<usize>> {
        if slot >= self.header.slot_count {
            return Ok(None);
        }
        let offset = self.slot_entry(slot);
        if offset == TOMBSTONE {
            return Ok(None);
        }
        if offset < self.header.free_pointer as i32 || offset >= PAGE_SIZE as i32 {
            return Err(corruption(
                self.page_id,
                format!("slot {} points at offset {}", slot, offset),
            ));
        }
        Ok(Some(offset as usize))
    }

    /// Bytes from the start of a live record to the end of the page
    pub fn record_bytes(&self, slot: SlotId) -> RecordResult<Option<&[u8]>> {
        Ok(self
            .record_offset(slot)?
            .map(|offset| &self.buffer.as_ref()[offset..]))
    }

    pub fn is_live(&self, slot: SlotId) -> RecordResult<bool> {
        Ok(self.record_offset(slot)?.is_some())
    }

    /// Number of live (non-tombstoned) slots
    pub fn live_count(&self) -> usize {
        (0..self.header.slot_count)
            .filter(|&slot| self.slot_entry(slot) != TOMBSTONE)
            .count()
    }

    /// Lowest tombstoned slot
    pub fn first_tombstone(&self) -> Option<SlotId> {
        (0..self.header.slot_count).find(|&slot| self.slot_entry(slot) == TOMBSTONE)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<B> {
    /// Store record bytes, preferring the lowest tombstoned slot when the
    /// free region can hold them. Returns `None` if the page has no room.
    pub fn insert(&mut self, bytes: &[u8]) -> RecordResult<Option<SlotId>> {
        let need = bytes.len();
        let free = self.free_space();

        let slot = match self.first_tombstone() {
            Some(slot) if free >= need => slot,
            _ if free >= need + SLOT_SIZE && (self.header.slot_count as usize) < MAX_SLOTS => {
                let slot = self.header.slot_count;
                self.header.slot_count += 1;
                slot
            }
            _ => return Ok(None),
        };

        let offset = self.header.free_pointer as usize - need;
        let data = self.buffer.as_mut();
        data[offset..offset + need].copy_from_slice(bytes);
        write_i32_at(data, HEADER_SIZE + slot as usize * SLOT_SIZE, offset as i32);
        self.header.free_pointer = offset as u16;
        self.write_header();

        Ok(Some(slot))
    }

    /// Mark a slot deleted. Returns false if it was not live.
    pub fn tombstone(&mut self, slot: SlotId) -> RecordResult<bool> {
        if self.record_offset(slot)?.is_none() {
            return Ok(false);
        }
        let data = self.buffer.as_mut();
        write_i32_at(data, HEADER_SIZE + slot as usize * SLOT_SIZE, TOMBSTONE);
        Ok(true)
    }

    fn write_header(&mut self) {
        let header = self.header;
        let data = self.buffer.as_mut();
        write_i32_at(data, 0, header.slot_count as i32);
        write_i32_at(data, 4, header.free_pointer as i32);
    }
}

fn corruption(page_id: PageId, reason: String) -> RecordError {
    RecordError::PageCorruption { page_id, reason }
}

fn read_i32_at(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_i32_at(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    #[test]
    fn test_zero_page_is_empty() {
        let buffer = blank();
        let page = HeapPage::open(0, &buffer[..]).unwrap();
        assert_eq!(page.slot_count(), 0);
        assert_eq!(page.header().free_pointer as usize, PAGE_SIZE);
        assert_eq!(page.free_space(), PAGE_SIZE - HEADER_SIZE);
        assert_eq!(page.record_bytes(0).unwrap(), None);
    }

    #[test]
    fn test_insert_packs_from_the_end() {
        let mut buffer = blank();
        let mut page = HeapPage::open(0, &mut buffer[..]).unwrap();

        assert_eq!(page.insert(&[1; 10]).unwrap(), Some(0));
        assert_eq!(page.insert(&[2; 20]).unwrap(), Some(1));
        assert_eq!(page.record_offset(0).unwrap(), Some(PAGE_SIZE - 10));
        assert_eq!(page.record_offset(1).unwrap(), Some(PAGE_SIZE - 30));
        assert_eq!(page.free_space(), PAGE_SIZE - 30 - HEADER_SIZE - 2 * SLOT_SIZE);

        // Header is written in place
        assert_eq!(read_i32_at(&buffer, 0), 2);
        assert_eq!(read_i32_at(&buffer, 4), (PAGE_SIZE - 30) as i32);
        assert_eq!(&buffer[PAGE_SIZE - 10..], &[1; 10]);
    }

    #[test]
    fn test_tombstone_and_reuse_lowest_slot() {
        let mut buffer = blank();
        let mut page = HeapPage::open(0, &mut buffer[..]).unwrap();
        for i in 0..4u8 {
            page.insert(&[i; 8]).unwrap();
        }

        assert!(page.tombstone(2).unwrap());
        assert!(page.tombstone(1).unwrap());
        assert!(!page.tombstone(1).unwrap());
        assert_eq!(page.live_count(), 2);
        assert_eq!(page.first_tombstone(), Some(1));

        // Lowest tombstone comes back first and the directory does not grow
        assert_eq!(page.insert(&[9; 8]).unwrap(), Some(1));
        assert_eq!(page.insert(&[9; 8]).unwrap(), Some(2));
        assert_eq!(page.slot_count(), 4);
        assert_eq!(page.insert(&[9; 8]).unwrap(), Some(4));
    }

    #[test]
    fn test_page_full() {
        let mut buffer = blank();
        let mut page = HeapPage::open(0, &mut buffer[..]).unwrap();

        assert_eq!(page.insert(&vec![7; MAX_RECORD_SIZE]).unwrap(), Some(0));
        assert_eq!(page.free_space(), 0);
        assert_eq!(page.insert(&[1]).unwrap(), None);

        // A tombstone alone does not make room
        page.tombstone(0).unwrap();
        assert_eq!(page.insert(&[1]).unwrap(), None);
    }

    #[test]
    fn test_record_too_large_for_empty_page() {
        let mut buffer = blank();
        let mut page = HeapPage::open(0, &mut buffer[..]).unwrap();
        assert_eq!(page.insert(&vec![0; MAX_RECORD_SIZE + 1]).unwrap(), None);
    }

    #[test]
    fn test_reopen_sees_same_contents() {
        let mut buffer = blank();
        {
            let mut page = HeapPage::open(5, &mut buffer[..]).unwrap();
            page.insert(b"hello").unwrap();
        }
        let page = HeapPage::open(5, &buffer[..]).unwrap();
        assert_eq!(page.slot_count(), 1);
        assert_eq!(&page.record_bytes(0).unwrap().unwrap()[..5], b"hello");
    }

    #[test]
    fn test_corrupt_headers() {
        let mut buffer = blank();
        write_i32_at(&mut buffer, 0, -3);
        write_i32_at(&mut buffer, 4, 100);
        assert!(matches!(
            HeapPage::open(2, &buffer[..]),
            Err(RecordError::PageCorruption { page_id: 2, .. })
        ));

        let mut buffer = blank();
        write_i32_at(&mut buffer, 0, 1);
        write_i32_at(&mut buffer, 4, PAGE_SIZE as i32 + 1);
        assert!(HeapPage::open(2, &buffer[..]).is_err());

        // Free pointer inside the slot directory
        let mut buffer = blank();
        write_i32_at(&mut buffer, 0, 4);
        write_i32_at(&mut buffer, 4, 12);
        assert!(HeapPage::open(2, &buffer[..]).is_err());
    }

    #[test]
    fn test_corrupt_slot_offset() {
        let mut buffer = blank();
        write_i32_at(&mut buffer, 0, 1);
        write_i32_at(&mut buffer, 4, 4000);
        write_i32_at(&mut buffer, HEADER_SIZE, 50);

        let page = HeapPage::open(1, &buffer[..]).unwrap();
        assert!(matches!(
            page.record_bytes(0),
            Err(RecordError::PageCorruption { page_id: 1, .. })
        ));
    }
}
