use serde::{Deserialize, Serialize};

use super::error::{RecordError, RecordResult};
use super::value::{ColumnType, Value};

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Int)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }
}

/// Ordered list of columns of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Create a new schema. Column names must be unique (case-insensitive).
    pub fn new(columns: Vec<Column>) -> RecordResult<Self> {
        if columns.is_empty() {
            return Err(RecordError::SchemaMismatch(
                "a table needs at least one column".to_string(),
            ));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(RecordError::SchemaMismatch(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    /// Find a column's position by name (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check that values match this schema in count and type. NULL is
    /// accepted in every column.
    pub fn validate(&self, values: &[Value]) -> RecordResult<()> {
        if values.len() != self.columns.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "expected {} values, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        for (column, value) in self.columns.iter().zip(values) {
            if let Some(actual) = value.column_type()
                && actual != column.column_type
            {
                return Err(RecordError::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.column_type.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }
}
