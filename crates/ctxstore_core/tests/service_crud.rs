use ctxstore_core::{
    ChangeSet, Context, ContextStack, FetchRequest, MemoryRecordStore, Predicate, RecordService,
    RecordStore, Representable, ServiceError, SortDescriptor, StoreBackend, StoreConfiguration,
    StoreError, StoreResult, StoredRecord,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: Option<Uuid>,
    name: Option<String>,
    age: Option<i64>,
}

impl User {
    fn new(name: &str) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            name: Some(name.to_string()),
            age: None,
        }
    }
}

impl Representable for User {
    const ENTITY: &'static str = "User";

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn from_stored(record: &StoredRecord) -> Self {
        Self {
            id: Some(record.id),
            name: record.text("name"),
            age: record.integer("age"),
        }
    }

    fn to_stored(&self, target: &mut Context) -> StoredRecord {
        let mut record = target.record_for(Self::ENTITY, self.id);
        record.set_opt("name", self.name.clone());
        record.set_opt("age", self.age);
        record
    }
}

/// Memory store whose commits can be switched to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryRecordStore,
    fail_commits: AtomicBool,
}

impl RecordStore for FlakyStore {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    fn query(&self, request: &FetchRequest) -> StoreResult<Vec<StoredRecord>> {
        self.inner.query(request)
    }

    fn commit(&self, batch: &ChangeSet) -> StoreResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::persistence("commit", "disk full"));
        }
        self.inner.commit(batch)
    }

    fn count(&self, entity: &str) -> StoreResult<usize> {
        self.inner.count(entity)
    }
}

fn memory_service() -> RecordService {
    RecordService::open(&StoreConfiguration::default()).unwrap()
}

fn flaky_service() -> (RecordService, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::default());
    let stack = ContextStack::with_store(store.clone()).unwrap();
    (RecordService::new(Arc::new(stack)), store)
}

fn all_users(service: &RecordService) -> Vec<User> {
    service.fetch_models::<User>(None, None).unwrap()
}

#[test]
fn insert_then_fetch_returns_record_once() {
    let service = memory_service();
    let user = User::new("Ihor");

    let id = service.insert_model(&user).unwrap();
    assert_eq!(Some(id), user.id);

    let users = all_users(&service);
    assert_eq!(users.iter().filter(|u| u.id == user.id).count(), 1);
    assert_eq!(users, vec![user]);
}

#[test]
fn insert_without_id_assigns_one() {
    let service = memory_service();
    let anonymous = User {
        id: None,
        name: Some("Nobody".to_string()),
        age: None,
    };

    let id = service.insert_model(&anonymous).unwrap();
    let users = all_users(&service);
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, Some(id));
}

#[test]
fn john_bill_fenix_scenario() {
    let service = memory_service();
    let john = User::new("John");
    let bill = User::new("Bill");
    let fenix = User::new("Fenix");
    for user in [&john, &bill, &fenix] {
        service.insert_model(user).unwrap();
    }
    assert_eq!(all_users(&service).len(), 3);

    service.delete_model(&john).unwrap();

    let remaining = all_users(&service);
    assert_eq!(remaining.len(), 2);
    assert!(!remaining.iter().any(|u| u.id == john.id));
}

#[test]
fn deleting_middle_record_leaves_the_others() {
    let service = memory_service();
    let a = User::new("A");
    let b = User::new("B");
    let c = User::new("C");
    for user in [&a, &b, &c] {
        service.insert_model(user).unwrap();
    }

    service.delete_model(&b).unwrap();

    let sorted = service
        .fetch_models::<User>(None, Some(vec![SortDescriptor::ascending("name")]))
        .unwrap();
    assert_eq!(sorted, vec![a, c]);
}

#[test]
fn deleting_absent_record_is_not_an_error() {
    let service = memory_service();
    service.delete_record(User::ENTITY, Uuid::new_v4()).unwrap();
    service
        .delete_model(&User {
            id: None,
            name: None,
            age: None,
        })
        .unwrap();
    assert!(all_users(&service).is_empty());
}

#[test]
fn mapping_round_trip_preserves_populated_fields() {
    let service = memory_service();
    let user = User {
        id: Some(Uuid::new_v4()),
        name: Some("Roundtrip".to_string()),
        age: Some(29),
    };
    service.insert_model(&user).unwrap();

    let loaded = service
        .fetch_models::<User>(Some(Predicate::eq("id", user.id.unwrap())), None)
        .unwrap();
    assert_eq!(loaded, vec![user]);
}

#[test]
fn missing_stored_fields_map_to_none() {
    let service = memory_service();
    let id = service
        .insert_record(StoredRecord::with_new_id(User::ENTITY).with("age", "not a number"))
        .unwrap();

    let users = all_users(&service);
    assert_eq!(
        users,
        vec![User {
            id: Some(id),
            name: None,
            age: None,
        }]
    );
}

#[test]
fn raw_record_api_round_trips_through_store() {
    let service = memory_service();
    let record = StoredRecord::with_new_id("Team").with("name", "Core");
    service.insert_record(record.clone()).unwrap();

    let fetched = service.fetch_records("Team", None, None).unwrap();
    assert_eq!(fetched, vec![record.clone()]);

    service.delete_record("Team", record.id).unwrap();
    assert!(service.fetch_records("Team", None, None).unwrap().is_empty());
}

#[test]
fn custom_fetch_request_pages_results() {
    let service = memory_service();
    for name in ["a", "b", "c", "d"] {
        service.insert_model(&User::new(name)).unwrap();
    }

    let request = FetchRequest::new(User::ENTITY)
        .with_sort(Some(vec![SortDescriptor::ascending("name")]))
        .with_offset(1)
        .with_limit(2);
    let page = service.fetch_models_with::<User>(request).unwrap();
    let names: Vec<String> = page.into_iter().filter_map(|u| u.name).collect();
    assert_eq!(names, vec!["b", "c"]);
}

#[test]
fn invalid_query_surfaces_fetch_failed() {
    let service = memory_service();
    service.insert_model(&User::new("John")).unwrap();

    let err = service
        .fetch_models::<User>(Some(Predicate::contains("", "x")), None)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::FetchFailed(StoreError::InvalidQuery(_))
    ));

    let mismatch = service
        .fetch_models_with::<User>(FetchRequest::new("Team"))
        .unwrap_err();
    assert!(matches!(mismatch, ServiceError::FetchFailed(_)));
}

#[test]
fn failed_insert_surfaces_save_failed_and_keeps_store_unchanged() {
    let (service, store) = flaky_service();
    let kept = User::new("Kept");
    service.insert_model(&kept).unwrap();

    store.fail_commits.store(true, Ordering::SeqCst);
    let err = service.insert_model(&User::new("Lost")).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::SaveFailed(StoreError::PersistenceFailure { .. })
    ));
    assert!(std::error::Error::source(&err).is_some());

    store.fail_commits.store(false, Ordering::SeqCst);
    assert_eq!(all_users(&service), vec![kept]);

    // The failed write is not replayed by the next successful one.
    service.insert_model(&User::new("Next")).unwrap();
    assert_eq!(store.count(User::ENTITY).unwrap(), 2);
}

#[test]
fn failed_delete_surfaces_delete_failed() {
    let (service, store) = flaky_service();
    let user = User::new("Stays");
    service.insert_model(&user).unwrap();

    store.fail_commits.store(true, Ordering::SeqCst);
    let err = service.delete_model(&user).unwrap_err();
    assert!(matches!(err, ServiceError::DeleteFailed(_)));

    store.fail_commits.store(false, Ordering::SeqCst);
    assert_eq!(all_users(&service), vec![user]);
}

#[test]
fn save_commits_read_context_edits() {
    let service = memory_service();
    let user = User::new("Draft");
    service.insert_model(&user).unwrap();

    let mut fetched = service
        .fetch_records(User::ENTITY, None, None)
        .unwrap()
        .remove(0);
    fetched.set("name", "Published");
    service.edit_record(fetched).unwrap();

    // Edits are invisible until saved.
    assert_eq!(all_users(&service)[0].name.as_deref(), Some("Draft"));

    service.save().unwrap();
    assert_eq!(all_users(&service)[0].name.as_deref(), Some("Published"));
    assert!(service
        .pending_edit(User::ENTITY, user.id.unwrap())
        .unwrap()
        .is_none());
}

#[test]
fn save_without_edits_is_a_noop() {
    let service = memory_service();
    service.save().unwrap();
}

#[test]
fn failed_save_retains_edits_for_retry() {
    let (service, store) = flaky_service();
    let user = User::new("Retry");
    service.insert_model(&user).unwrap();

    let edited = StoredRecord::new(User::ENTITY, user.id.unwrap()).with("name", "Edited");
    service.edit_record(edited).unwrap();

    store.fail_commits.store(true, Ordering::SeqCst);
    assert!(matches!(service.save(), Err(ServiceError::SaveFailed(_))));
    assert!(service
        .pending_edit(User::ENTITY, user.id.unwrap())
        .unwrap()
        .is_some());

    store.fail_commits.store(false, Ordering::SeqCst);
    service.save().unwrap();
    assert_eq!(all_users(&service)[0].name.as_deref(), Some("Edited"));
}

#[test]
fn mutation_commit_merges_into_pending_read_edit() {
    let service = memory_service();
    let user = User {
        age: Some(20),
        ..User::new("Original")
    };
    service.insert_model(&user).unwrap();
    let id = user.id.unwrap();

    let local = StoredRecord::new(User::ENTITY, id)
        .with("name", "Local name")
        .with("nickname", "loco");
    service.edit_record(local).unwrap();

    service
        .insert_record(StoredRecord::new(User::ENTITY, id).with("name", "Committed name"))
        .unwrap();

    let pending = service.pending_edit(User::ENTITY, id).unwrap().unwrap();
    assert_eq!(pending.text("name").as_deref(), Some("Committed name"));
    assert_eq!(pending.text("nickname").as_deref(), Some("loco"));
}

#[test]
fn mutation_delete_discards_pending_read_edit() {
    let service = memory_service();
    let user = User::new("Doomed");
    service.insert_model(&user).unwrap();
    let id = user.id.unwrap();

    service
        .edit_record(StoredRecord::new(User::ENTITY, id).with("name", "Edited"))
        .unwrap();
    service.delete_model(&user).unwrap();

    assert!(service.pending_edit(User::ENTITY, id).unwrap().is_none());
    service.save().unwrap();
    assert!(all_users(&service).is_empty());
}

#[test]
fn sqlite_file_service_persists_between_opens() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfiguration::sqlite_file("TestModel", dir.path());
    let user = User::new("Persisted");

    {
        let service = RecordService::open(&config).unwrap();
        service.insert_model(&user).unwrap();
        service.shutdown();
    }

    let reopened = RecordService::open(&config).unwrap();
    assert_eq!(all_users(&reopened), vec![user]);
}

#[test]
fn sqlite_in_memory_configuration_works() {
    let config = StoreConfiguration::in_memory("TestModel", StoreBackend::Sqlite);
    let service = RecordService::open(&config).unwrap();
    service.insert_model(&User::new("Ihor")).unwrap();
    assert_eq!(all_users(&service).len(), 1);
}

#[test]
fn invalid_configuration_surfaces_load_failed() {
    let config = StoreConfiguration::sqlite_file("TestModel", "relative/dir");
    let err = RecordService::open(&config).err().unwrap();
    assert!(matches!(err, ServiceError::LoadFailed(_)));
}

#[test]
fn operations_after_shutdown_are_unavailable() {
    let service = memory_service();
    service.shutdown();

    assert!(matches!(
        service.fetch_models::<User>(None, None),
        Err(ServiceError::Unavailable(_))
    ));
    assert!(matches!(
        service.insert_model(&User::new("Late")),
        Err(ServiceError::Unavailable(_))
    ));
}

#[test]
fn shutdown_returns_while_a_queue_handle_is_held() {
    let service = memory_service();
    let held = service.stack().read_queue().handle().unwrap();

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let stopping = service.clone();
    std::thread::spawn(move || {
        stopping.shutdown();
        let _ = done_tx.send(());
    });
    done_rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("shutdown should not wait for held handles");

    assert!(held.perform_and_wait(|ctx: &mut Context| ctx.kind()).is_err());
    assert!(matches!(
        service.fetch_records(User::ENTITY, None, None),
        Err(ServiceError::Unavailable(_))
    ));
}

#[test]
fn unstorable_real_is_rejected_and_entity_stays_readable() {
    let config = StoreConfiguration::in_memory("TestModel", StoreBackend::Sqlite);
    let service = RecordService::open(&config).unwrap();
    service.insert_model(&User::new("ok")).unwrap();

    let err = service
        .insert_record(StoredRecord::with_new_id(User::ENTITY).with("score", f64::NAN))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::SaveFailed(StoreError::InvalidData(_))
    ));

    assert_eq!(all_users(&service).len(), 1);
}
