mod error;
mod heap_file;
mod page;
mod record;
mod schema;
mod value;

pub use error::{RecordError, RecordResult};
pub use heap_file::{HeapFile, HeapScan, RecordUpdate};
pub use page::{HEADER_SIZE, HeapPage, HeapPageHeader, MAX_RECORD_SIZE, SLOT_SIZE, TOMBSTONE};
pub use record::{MAX_PAGES, Record, RecordId, SlotId};
pub use schema::{Column, Schema};
pub use value::{ColumnType, Value};

pub(crate) use value::{get_i32, get_u8, put_i32};
