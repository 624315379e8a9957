use ctxstore_core::db::open_db_in_memory;
use ctxstore_core::{
    ChangeSet, FetchRequest, MemoryRecordStore, Predicate, RecordStore, SortDescriptor,
    SqliteRecordStore, StoreError, StoredRecord,
};
use uuid::Uuid;

fn backends() -> Vec<Box<dyn RecordStore>> {
    vec![
        Box::new(MemoryRecordStore::new()),
        Box::new(SqliteRecordStore::open_in_memory().unwrap()),
    ]
}

fn user(name: &str) -> StoredRecord {
    StoredRecord::with_new_id("User").with("name", name)
}

fn names(records: &[StoredRecord]) -> Vec<String> {
    records.iter().filter_map(|r| r.text("name")).collect()
}

#[test]
fn query_without_matches_returns_empty() {
    for store in backends() {
        let result = store.query(&FetchRequest::new("User")).unwrap();
        assert!(result.is_empty(), "backend {}", store.backend_name());
    }
}

#[test]
fn insert_or_replace_is_idempotent() {
    for store in backends() {
        let record = user("John");
        store.insert_or_replace(record.clone()).unwrap();
        store.insert_or_replace(record.clone()).unwrap();

        let loaded = store.query(&FetchRequest::new("User")).unwrap();
        assert_eq!(loaded, vec![record], "backend {}", store.backend_name());
    }
}

#[test]
fn deleting_absent_record_is_a_noop() {
    for store in backends() {
        store.delete("User", Uuid::new_v4()).unwrap();
        assert_eq!(store.count("User").unwrap(), 0);
    }
}

#[test]
fn commit_applies_upserts_and_deletes_together() {
    for store in backends() {
        let a = user("A");
        let b = user("B");
        let c = user("C");
        for record in [&a, &b, &c] {
            store.insert_or_replace(record.clone()).unwrap();
        }

        let mut batch = ChangeSet::new();
        batch.delete("User", b.id);
        batch.upsert(StoredRecord::new("User", c.id).with("name", "C2"));
        store.commit(&batch).unwrap();

        let sorted = store
            .query(
                &FetchRequest::new("User").with_sort(Some(vec![SortDescriptor::ascending("name")])),
            )
            .unwrap();
        assert_eq!(names(&sorted), vec!["A", "C2"], "backend {}", store.backend_name());
    }
}

#[test]
fn predicate_and_sort_are_evaluated_by_backend() {
    for store in backends() {
        for (name, age) in [("John", 31_i64), ("Bill", 25), ("Fenix", 47)] {
            store
                .insert_or_replace(user(name).with("age", age))
                .unwrap();
        }

        let request = FetchRequest::new("User")
            .with_predicate(Some(Predicate::gt("age", 30_i64)))
            .with_sort(Some(vec![SortDescriptor::descending("age")]));
        let result = store.query(&request).unwrap();

        assert_eq!(names(&result), vec!["Fenix", "John"], "backend {}", store.backend_name());
    }
}

#[test]
fn unsupported_query_shapes_fail_with_invalid_query() {
    for store in backends() {
        let request = FetchRequest::new("User").with_predicate(Some(Predicate::and(Vec::new())));
        let err = store.query(&request).unwrap_err();
        assert!(
            matches!(err, StoreError::InvalidQuery(_)),
            "backend {} returned {err}",
            store.backend_name()
        );
    }
}

#[test]
fn sqlite_file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.sqlite3");
    let record = user("Durable").with("score", 9.5_f64);

    {
        let store = SqliteRecordStore::open(&path).unwrap();
        store.insert_or_replace(record.clone()).unwrap();
    }

    let reopened = SqliteRecordStore::open(&path).unwrap();
    let loaded = reopened.query(&FetchRequest::new("User")).unwrap();
    assert_eq!(loaded, vec![record]);
}

#[test]
fn non_finite_reals_are_rejected_before_any_write() {
    for store in backends() {
        let kept = user("Kept").with("score", 1.5_f64);
        store.insert_or_replace(kept.clone()).unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut batch = ChangeSet::new();
            batch.delete("User", kept.id);
            batch.upsert(user("Broken").with("score", bad));
            let err = store.commit(&batch).unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidData(_)),
                "backend {} returned {err}",
                store.backend_name()
            );
        }

        let loaded = store.query(&FetchRequest::new("User")).unwrap();
        assert_eq!(loaded, vec![kept], "backend {}", store.backend_name());
    }
}

#[test]
fn sqlite_batch_failing_midway_leaves_committed_state_unchanged() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_vetoed BEFORE INSERT ON records
         WHEN NEW.entity = 'Vetoed'
         BEGIN
             SELECT RAISE(ABORT, 'vetoed entity');
         END;",
    )
    .unwrap();
    let store = SqliteRecordStore::from_connection(conn);

    let a = user("A");
    let b = user("B");
    for record in [&a, &b] {
        store.insert_or_replace(record.clone()).unwrap();
    }

    // Deletes run first, then upserts in key order: "User" rows before "Vetoed".
    let mut batch = ChangeSet::new();
    batch.delete("User", a.id);
    batch.upsert(StoredRecord::new("User", b.id).with("name", "B2"));
    batch.upsert(user("C"));
    batch.upsert(StoredRecord::with_new_id("Vetoed").with("name", "X"));

    let err = store.commit(&batch).unwrap_err();
    assert!(matches!(err, StoreError::PersistenceFailure { .. }), "{err}");

    let sorted = store
        .query(&FetchRequest::new("User").with_sort(Some(vec![SortDescriptor::ascending("name")])))
        .unwrap();
    assert_eq!(sorted, vec![a, b]);
    assert_eq!(store.count("Vetoed").unwrap(), 0);
}
