//! Integration tests for the index layer

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::catalog::{Catalog, TableMetadata};
    use crate::file::{BufferCache, EvictionPolicy, PageStore};
    use crate::index::{IndexError, IndexManager};
    use crate::record::{Column, HeapFile, Record, RecordId, Schema, Value};
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
        cache: Arc<BufferCache>,
        catalog: Catalog,
        table: TableMetadata,
        heap: HeapFile,
    }

    fn setup() -> Fixture {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PageStore::open(temp_dir.path()).unwrap());
        let cache = Arc::new(BufferCache::new(store, 16, EvictionPolicy::Lru));
        let mut catalog = Catalog::open(temp_dir.path()).unwrap();
        let schema = Schema::new(vec![Column::int("id"), Column::text("name")]).unwrap();
        let table = catalog.create_table("students", schema.clone()).unwrap();
        let heap = HeapFile::new(table.id, schema, cache.clone());
        Fixture {
            temp_dir,
            cache,
            catalog,
            table,
            heap,
        }
    }

    fn row(id: i32, name: &str) -> Record {
        Record::new(vec![Value::Int(id), Value::from(name)])
    }

    #[test]
    fn test_index_manager_basic() {
        let mut fx = setup();
        let rid1 = fx.heap.insert(&row(1, "ann")).unwrap();
        let rid2 = fx.heap.insert(&row(2, "bob")).unwrap();

        let mut manager = IndexManager::new(fx.temp_dir.path(), fx.cache.clone()).unwrap();
        let file_id = fx.catalog.allocate_file_id().unwrap();
        let index = manager
            .create_index("students_id", &fx.table, "id", file_id, &fx.heap)
            .unwrap();
        assert_eq!(index.len(), 2);

        assert_eq!(manager.search("students_id", &Value::Int(1)).unwrap(), vec![rid1]);
        assert_eq!(manager.search("STUDENTS_ID", &Value::Int(2)).unwrap(), vec![rid2]);
        assert!(manager.search("students_id", &Value::Int(3)).unwrap().is_empty());

        let descriptor = fx.temp_dir.path().join("indexes").join("students_id.json");
        assert!(descriptor.exists());

        // Drop index
        manager.drop_index("students_id").unwrap();
        assert!(!descriptor.exists());
        assert!(!fx.cache.store().exists(file_id));
        assert!(matches!(
            manager.search("students_id", &Value::Int(1)),
            Err(IndexError::UnknownIndex(_))
        ));
    }

    #[test]
    fn test_create_index_errors() {
        let mut fx = setup();
        let mut manager = IndexManager::new(fx.temp_dir.path(), fx.cache.clone()).unwrap();

        let file_id = fx.catalog.allocate_file_id().unwrap();
        manager
            .create_index("by_id", &fx.table, "id", file_id, &fx.heap)
            .unwrap();

        let other = fx.catalog.allocate_file_id().unwrap();
        assert!(matches!(
            manager.create_index("BY_ID", &fx.table, "name", other, &fx.heap),
            Err(IndexError::IndexAlreadyExists(_))
        ));
        assert!(matches!(
            manager.create_index("by_age", &fx.table, "age", other, &fx.heap),
            Err(IndexError::Catalog(_))
        ));
        assert!(matches!(
            manager.drop_index("missing"),
            Err(IndexError::UnknownIndex(_))
        ));
    }

    #[test]
    fn test_maintenance_hooks() {
        let mut fx = setup();
        let mut manager = IndexManager::new(fx.temp_dir.path(), fx.cache.clone()).unwrap();
        let file_id = fx.catalog.allocate_file_id().unwrap();
        manager
            .create_index("by_name", &fx.table, "name", file_id, &fx.heap)
            .unwrap();

        let record = row(7, "cat");
        let rid = fx.heap.insert(&record).unwrap();
        manager.on_insert(fx.table.id, rid, &record).unwrap();
        assert_eq!(manager.search("by_name", &Value::from("cat")).unwrap(), vec![rid]);

        // Hooks for other tables leave the index alone
        manager.on_insert(fx.table.id + 100, RecordId::new(9, 9), &record).unwrap();
        assert_eq!(manager.get("by_name").unwrap().len(), 1);

        let updates = fx
            .heap
            .update_matching(|r| r == &record, |_| row(7, "dog"))
            .unwrap();
        manager.on_update(fx.table.id, &updates).unwrap();
        assert!(manager.search("by_name", &Value::from("cat")).unwrap().is_empty());
        let moved = manager.search("by_name", &Value::from("dog")).unwrap();
        assert_eq!(moved, vec![updates[0].new_rid]);

        manager
            .on_delete(fx.table.id, updates[0].new_rid, &updates[0].new)
            .unwrap();
        assert!(manager.get("by_name").unwrap().is_empty());
    }

    #[test]
    fn test_range_search_across_leaves() {
        let mut fx = setup();
        let mut expected = Vec::new();
        for i in 0..40 {
            let rid = fx.heap.insert(&row(i, "x")).unwrap();
            if (10..=30).contains(&i) {
                expected.push(rid);
            }
        }

        let mut manager = IndexManager::new(fx.temp_dir.path(), fx.cache.clone()).unwrap();
        let file_id = fx.catalog.allocate_file_id().unwrap();
        manager
            .create_index("by_id", &fx.table, "id", file_id, &fx.heap)
            .unwrap();

        let found = manager
            .range_search("by_id", &Value::Int(10), &Value::Int(30))
            .unwrap();
        assert_eq!(found, expected);
        assert!(manager.get("by_id").unwrap().tree().height().unwrap() > 1);
    }

    #[test]
    fn test_persistence() {
        let mut fx = setup();
        for i in 0..20 {
            fx.heap.insert(&row(i, "x")).unwrap();
        }

        // First session: create and fill
        {
            let mut manager = IndexManager::new(fx.temp_dir.path(), fx.cache.clone()).unwrap();
            let file_id = fx.catalog.allocate_file_id().unwrap();
            manager
                .create_index("by_id", &fx.table, "id", file_id, &fx.heap)
                .unwrap();
        }
        fx.cache.flush_all().unwrap();
        fx.cache.clear();

        // Second session: reopen from the descriptor
        let manager = IndexManager::open(fx.temp_dir.path(), fx.cache.clone(), &fx.catalog).unwrap();
        assert_eq!(manager.index_names(), vec!["by_id"]);
        let index = manager.get("by_id").unwrap();
        assert_eq!(index.len(), 20);
        assert_eq!(manager.search("by_id", &Value::Int(13)).unwrap().len(), 1);
    }

    #[test]
    fn test_skips_index_of_dropped_table() {
        let mut fx = setup();
        {
            let mut manager = IndexManager::new(fx.temp_dir.path(), fx.cache.clone()).unwrap();
            let file_id = fx.catalog.allocate_file_id().unwrap();
            manager
                .create_index("by_id", &fx.table, "id", file_id, &fx.heap)
                .unwrap();
        }
        fx.catalog.drop_table("students").unwrap();

        let manager = IndexManager::open(fx.temp_dir.path(), fx.cache.clone(), &fx.catalog).unwrap();
        assert!(!manager.contains("by_id"));
    }

    #[test]
    fn test_drop_table_indexes() {
        let mut fx = setup();
        let mut manager = IndexManager::new(fx.temp_dir.path(), fx.cache.clone()).unwrap();
        for (name, column) in [("by_id", "id"), ("by_name", "name")] {
            let file_id = fx.catalog.allocate_file_id().unwrap();
            manager
                .create_index(name, &fx.table, column, file_id, &fx.heap)
                .unwrap();
        }
        assert_eq!(manager.indexes_for_table(fx.table.id).len(), 2);

        let dropped = manager.drop_table_indexes(fx.table.id).unwrap();
        assert_eq!(dropped, vec!["by_id", "by_name"]);
        assert!(manager.index_names().is_empty());
    }
}
