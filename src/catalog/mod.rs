use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::file::TableId;
use crate::record::Schema;

const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Table {0} not found")]
    UnknownTable(String),

    #[error("Column {column} not found in table {table}")]
    UnknownColumn { table: String, column: String },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: TableId,
    pub name: String,
    pub schema: Schema,
}

impl TableMetadata {
    /// Position of a column in the schema
    pub fn column_index(&self, column: &str) -> CatalogResult<usize> {
        self.schema
            .column_index(column)
            .ok_or_else(|| CatalogError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatabaseMetadata {
    /// Next id handed out to a table or index file
    next_id: TableId,
    /// Tables keyed by lowercase name
    tables: HashMap<String, TableMetadata>,
}

impl Default for DatabaseMetadata {
    fn default() -> Self {
        Self {
            next_id: 1,
            tables: HashMap::new(),
        }
    }
}

/// Table metadata, persisted as `catalog.json` in the data directory.
/// Table names are case-insensitive.
pub struct Catalog {
    path: PathBuf,
    metadata: DatabaseMetadata,
}

impl Catalog {
    /// Load the catalog of a data directory, starting empty if there is none
    pub fn open(data_dir: &Path) -> CatalogResult<Self> {
        let path = data_dir.join(CATALOG_FILE);
        let metadata = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            DatabaseMetadata::default()
        };
        Ok(Self { path, metadata })
    }

    fn save(&self) -> CatalogResult<()> {
        let content = serde_json::to_string_pretty(&self.metadata)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Register a new table and assign it an id
    pub fn create_table(&mut self, name: &str, schema: Schema) -> CatalogResult<TableMetadata> {
        let key = name.to_lowercase();
        if self.metadata.tables.contains_key(&key) {
            return Err(CatalogError::TableAlreadyExists(name.to_string()));
        }

        let table = TableMetadata {
            id: self.next_id(),
            name: name.to_string(),
            schema,
        };
        self.metadata.tables.insert(key, table.clone());
        self.save()?;

        info!(table = %table.name, id = table.id, "created table");
        Ok(table)
    }

    pub fn get_table(&self, name: &str) -> CatalogResult<&TableMetadata> {
        self.metadata
            .tables
            .get(&name.to_lowercase())
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
    }

    pub fn table_by_id(&self, id: TableId) -> Option<&TableMetadata> {
        self.metadata.tables.values().find(|t| t.id == id)
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.metadata.tables.contains_key(&name.to_lowercase())
    }

    /// Remove a table from the catalog, returning its metadata
    pub fn drop_table(&mut self, name: &str) -> CatalogResult<TableMetadata> {
        let table = self
            .metadata
            .tables
            .remove(&name.to_lowercase())
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))?;
        self.save()?;

        info!(table = %table.name, id = table.id, "dropped table");
        Ok(table)
    }

    /// All tables, ordered by id
    pub fn tables(&self) -> Vec<&TableMetadata> {
        let mut tables: Vec<_> = self.metadata.tables.values().collect();
        tables.sort_by_key(|t| t.id);
        tables
    }

    /// Reserve an id for a new page file (index files share the table id
    /// space so every file has a distinct `table_<id>.dat` name)
    pub fn allocate_file_id(&mut self) -> CatalogResult<TableId> {
        let id = self.next_id();
        self.save()?;
        Ok(id)
    }

    fn next_id(&mut self) -> TableId {
        let id = self.metadata.next_id;
        self.metadata.next_id += 1;
        id
    }
}
