use std::sync::Arc;
use std::time::Duration;

use studyhub_core::config::Config;
use studyhub_core::models::{Course, ScheduleEntry};
use studyhub_core::storage::{
    AdapterKind, Environment, ExtensionArea, LocalArea, ObjectDatabase,
};
use studyhub_core::{CoordinatorHandle, HybridStorage, Store, SyncCoordinator, SyncEvent, Task};
use tempfile::TempDir;
use tokio::sync::Mutex;

fn config_for(adapters: &[AdapterKind]) -> Config {
    Config {
        adapters: adapters.to_vec(),
        ..Config::default()
    }
}

async fn open_context(env: &Environment, config: &Config) -> CoordinatorHandle {
    let storage = Arc::new(HybridStorage::open(env, config).unwrap());
    let mut handle = SyncCoordinator::start(storage, Arc::new(Mutex::new(Store::new())));
    handle.ready().await;
    handle.flush().await;
    handle
}

async fn add_task(handle: &CoordinatorHandle, title: &str) {
    let store = handle.store();
    let mut store = store.lock().await;
    let course = store.state().courses[0].id;
    store.add(Task::new(course, title));
}

async fn task_titles(handle: &CoordinatorHandle) -> Vec<String> {
    let store = handle.store();
    let store = store.lock().await;
    store.state().tasks.iter().map(|t| t.title.clone()).collect()
}

#[tokio::test]
async fn test_remote_changes_are_not_persisted_again() {
    let env = Environment::builder()
        .extension_area(Arc::new(ExtensionArea::unlimited()))
        .build();
    let config = config_for(&[AdapterKind::Extension]);

    let popup = open_context(&env, &config).await;
    let panel = open_context(&env.spawn_context(), &config).await;
    popup.flush().await;

    let popup_writes = popup.storage().write_count();
    let panel_writes = panel.storage().write_count();

    for title in ["Essay", "Lab report", "Reading"] {
        add_task(&popup, title).await;
    }
    popup.flush().await;
    panel.flush().await;

    assert_eq!(popup.storage().write_count(), popup_writes + 3);
    assert_eq!(panel.storage().write_count(), panel_writes);
    assert_eq!(
        task_titles(&panel).await,
        vec!["Essay", "Lab report", "Reading"]
    );

    popup.shutdown().await;
    panel.shutdown().await;
}

#[tokio::test]
async fn test_changes_flow_both_ways_over_local_area() {
    let env = Environment::builder()
        .local_area(Arc::new(LocalArea::in_memory(1024 * 1024)))
        .build();
    let config = config_for(&[AdapterKind::Local]);

    let left = open_context(&env, &config).await;
    let right = open_context(&env.spawn_context(), &config).await;
    left.flush().await;

    add_task(&left, "From left").await;
    left.flush().await;
    right.flush().await;
    assert_eq!(task_titles(&right).await, vec!["From left"]);

    {
        let store = right.store();
        let mut store = store.lock().await;
        let chem = store.add(Course::new("Chemistry"));
        store.add_schedule_entry(ScheduleEntry::new(chem, "Lab", "Friday", "13:00", "16:00"));
    }
    right.flush().await;
    left.flush().await;

    let store = left.store();
    let store = store.lock().await;
    assert_eq!(store.state().tasks.len(), 1);
    let chem = store.state().course_by_title("Chemistry").unwrap().id;
    assert_eq!(store.state().schedule[0].course, chem);
    drop(store);

    left.shutdown().await;
    right.shutdown().await;
}

#[tokio::test]
async fn test_memory_adapter_signals_other_contexts() {
    let env = Environment::builder()
        .local_area(Arc::new(LocalArea::in_memory(1024 * 1024)))
        .build();
    let config = config_for(&[AdapterKind::Memory]);

    let first = open_context(&env, &config).await;
    let second = open_context(&env.spawn_context(), &config).await;
    first.flush().await;

    add_task(&first, "Signalled").await;
    first.flush().await;
    second.flush().await;

    assert_eq!(task_titles(&second).await, vec!["Signalled"]);
    assert_eq!(second.storage().write_count(), 1);

    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn test_object_store_contexts_converge() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(ObjectDatabase::at(temp_dir.path().join("studyhub.db")));
    let env = Environment::builder()
        .object_database(db)
        .local_area(Arc::new(LocalArea::in_memory(1024 * 1024)))
        .signal_ttl(Duration::from_millis(20))
        .build();
    let config = config_for(&[AdapterKind::ObjectStore]);

    let writer = open_context(&env, &config).await;
    let mut reader = open_context(&env.spawn_context(), &config).await;

    add_task(&writer, "Persisted in SQLite").await;
    writer.flush().await;

    // The object store re-reads on the blocking pool, so wait for the import
    let applied = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = reader.events().recv().await;
            match event {
                Some(SyncEvent::RemoteApplied) => {
                    if task_titles(&reader).await == vec!["Persisted in SQLite"] {
                        return true;
                    }
                }
                Some(_) => {}
                None => return false,
            }
        }
    })
    .await;
    assert_eq!(applied, Ok(true));

    // Signals expire from the local area
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(env
        .local_area()
        .unwrap()
        .get(studyhub_core::storage::SYNC_SIGNAL_KEY)
        .is_none());

    writer.shutdown().await;
    reader.shutdown().await;
}

#[tokio::test]
async fn test_file_export_and_import_between_installations() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("backup.json");
    let config = config_for(&[AdapterKind::Memory]);

    let source = open_context(&Environment::builder().build(), &config).await;
    add_task(&source, "Backed up").await;
    source.export_file(&path).await.unwrap();
    source.shutdown().await;

    let target = open_context(&Environment::builder().build(), &config).await;
    let before = target.storage().write_count();
    assert!(target.import_file(&path).await);
    target.flush().await;

    assert_eq!(task_titles(&target).await, vec!["Backed up"]);
    assert_eq!(target.storage().write_count(), before + 1);

    assert!(!target.import_file(&temp_dir.path().join("missing.json")).await);
    std::fs::write(&path, "{\"not\": \"a payload\"}").unwrap();
    assert!(!target.import_file(&path).await);
    assert_eq!(task_titles(&target).await, vec!["Backed up"]);

    target.shutdown().await;
}
