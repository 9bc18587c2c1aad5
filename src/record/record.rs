use super::error::{RecordError, RecordResult};
use super::schema::Schema;
use super::value::{Value, get_i32, put_i32};
use crate::file::PageId;

/// Slot identifier within a page
pub type SlotId = u16;

const SLOT_BITS: u32 = 12;
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;

/// Pages a table can have while every record id still packs into 32 bits
pub const MAX_PAGES: PageId = 1 << (32 - SLOT_BITS);

/// Physical identifier for a record (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }

    /// Pack into 32 bits as `page_id << 12 | slot_id`. A page holds at most
    /// 1022 slots, so the slot always fits in 12 bits.
    pub fn pack(&self) -> u32 {
        (self.page_id << SLOT_BITS) | (self.slot_id as u32 & SLOT_MASK)
    }

    pub fn unpack(packed: u32) -> Self {
        Self {
            page_id: packed >> SLOT_BITS,
            slot_id: (packed & SLOT_MASK) as SlotId,
        }
    }
}

/// A single record (row) with typed values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Create a new record
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get the number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if record is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by index
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get all values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Set a value by index
    pub fn set(&mut self, idx: usize, value: Value) {
        if idx < self.values.len() {
            self.values[idx] = value;
        }
    }

    /// Size of the encoded record in bytes
    pub fn encoded_len(&self) -> usize {
        4 + self.values.iter().map(Value::encoded_len).sum::<usize>()
    }

    /// Encode as a column count followed by the tagged values, after checking
    /// the values against the schema
    pub fn encode(&self, schema: &Schema) -> RecordResult<Vec<u8>> {
        schema.validate(&self.values)?;

        let mut out = Vec::with_capacity(self.encoded_len());
        put_i32(&mut out, self.values.len() as i32);
        for value in &self.values {
            value.encode_into(&mut out);
        }
        Ok(out)
    }

    /// Decode a record from the start of `bytes`. Trailing bytes are ignored.
    pub fn decode(bytes: &[u8], schema: &Schema) -> RecordResult<Self> {
        let mut pos = 0;
        let count = get_i32(bytes, &mut pos)?;
        if count < 0 || count as usize != schema.column_count() {
            return Err(RecordError::Decode(format!(
                "column count {} does not match schema ({})",
                count,
                schema.column_count()
            )));
        }

        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(Value::decode(bytes, &mut pos)?);
        }
        Ok(Self { values })
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;

    fn sample_schema() -> Schema {
        Schema::new(vec![Column::int("id"), Column::text("name")]).unwrap()
    }

    #[test]
    fn test_record_id_packing() {
        let rid = RecordId::new(3, 17);
        assert_eq!(rid.pack(), (3 << 12) | 17);
        assert_eq!(RecordId::unpack(rid.pack()), rid);
        assert_eq!(RecordId::unpack(0), RecordId::new(0, 0));

        let last = RecordId::new(MAX_PAGES - 1, 1021);
        assert_eq!(RecordId::unpack(last.pack()), last);
    }

    #[test]
    fn test_encode_layout() {
        let schema = sample_schema();
        let record = Record::new(vec![Value::Int(1), Value::from("a")]);
        let bytes = record.encode(&schema).unwrap();

        assert_eq!(&bytes[0..4], &2i32.to_le_bytes());
        assert_eq!(bytes.len(), record.encoded_len());
        assert_eq!(Record::decode(&bytes, &schema).unwrap(), record);
    }

    #[test]
    fn test_encode_rejects_type_mismatch() {
        let schema = sample_schema();
        let record = Record::new(vec![Value::from("x"), Value::from("a")]);
        assert!(matches!(
            record.encode(&schema),
            Err(RecordError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_with_nulls_and_trailing_bytes() {
        let schema = sample_schema();
        let record = Record::new(vec![Value::Null, Value::from("")]);
        let mut bytes = record.encode(&schema).unwrap();
        bytes.extend_from_slice(&[0xAA; 16]);

        assert_eq!(Record::decode(&bytes, &schema).unwrap(), record);
    }

    #[test]
    fn test_decode_wrong_column_count() {
        let schema = sample_schema();
        let mut bytes = Vec::new();
        put_i32(&mut bytes, 5);
        assert!(matches!(
            Record::decode(&bytes, &schema),
            Err(RecordError::Decode(_))
        ));
    }

    #[test]
    fn test_set_and_get() {
        let mut record = Record::new(vec![Value::Int(1), Value::Null]);
        record.set(1, Value::from("b"));
        record.set(9, Value::Int(0));
        assert_eq!(record.get(1), Some(&Value::from("b")));
        assert_eq!(record.len(), 2);
    }
}
