//! Offline snapshots and configuration-driven setup

use assert_fs::prelude::*;
use ot_core::map::{MapOp, MapSystem};
use ot_core::text::{TextOp, TextSystem};
use ot_sync::{
    ManagerSnapshot, MemoryServer, OfflineStore, StateManager, SyncConfig, SyncError, SyncStatus,
};
use ot_test_helpers::prelude::*;
use predicates::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn test_snapshot_restore_resumes_sync() {
    suppress_logs();
    let temp = temp_dir();
    let server = text_server("abc");
    let store = snapshot_store(&temp, "doc-1");

    {
        let alice = text_client(&server, "alice");
        alice.checkout().await.unwrap();
        alice.add([TextOp::insert(3, "d")]);
        alice.sync().await.unwrap();
        alice.add([TextOp::insert(0, ">")]);

        store.save(&alice.snapshot().unwrap()).unwrap();
        alice.close();
    }
    temp.child("snapshots/doc-1.json")
        .assert(predicate::path::exists());

    // someone else edits while alice is offline
    let bob = text_client(&server, "bob");
    bob.checkout().await.unwrap();
    bob.add([TextOp::delete(1, "bc")]);
    bob.sync().await.unwrap();

    let resumed = text_client(&server, "alice");
    let snapshot: ManagerSnapshot<String, TextOp> = store.load().unwrap().unwrap();
    assert_eq!(snapshot.unsynced(), 1);
    resumed.restore(snapshot).unwrap();
    assert_eq!(resumed.status(), SyncStatus::Ready);
    assert_eq!(resumed.get_state(), ">abcd");

    resumed.sync().await.unwrap();
    bob.pull().await.unwrap();
    assert_eq!(resumed.get_state(), ">ad");
    assert!(converged(&[resumed.get_state(), bob.get_state()]));
    assert_eq!(server.operations().len(), 4);
}

#[tokio::test]
async fn test_snapshot_requires_checkout() {
    let server = text_server("");
    let client = text_client(&server, "alice");
    assert!(matches!(client.snapshot(), Err(SyncError::NotCheckedOut)));
}

#[tokio::test]
async fn test_manager_from_config_file() {
    let temp = temp_dir();
    let path = write_config(
        &temp,
        r#"
        client_id = "alice"
        retry_delay_ms = 0
        max_retries = 3
        snapshot_dir = "snapshots"
        "#,
    );

    let config = SyncConfig::from_toml(path).unwrap();
    config.validate().unwrap();

    let server = Arc::new(MemoryServer::<TextOp>::new());
    let manager = StateManager::new(TextSystem, server.clone(), String::new())
        .with_config(&config)
        .unwrap();
    assert_eq!(manager.client_id(), "alice");

    manager.checkout().await.unwrap();
    manager.add([TextOp::insert(0, "hi")]);
    manager.sync().await.unwrap();

    let store = OfflineStore::from_config(&config, "notes");
    assert_eq!(store.path(), std::path::Path::new("snapshots").join("notes.json"));
    assert_eq!(server.operations(), vec![TextOp::insert(0, "hi")]);
}

#[test]
fn test_manager_rejects_invalid_config() {
    let temp = temp_dir();
    let path = write_config(&temp, "client_id = \"alice\"\nmax_retries = 0\n");
    let config = SyncConfig::from_toml(path).unwrap();

    let server = Arc::new(MemoryServer::<TextOp>::new());
    let result = StateManager::new(TextSystem, server, String::new()).with_config(&config);
    assert!(matches!(result, Err(SyncError::ConfigError(_))));
}

#[tokio::test]
async fn test_map_registers_converge_through_server() {
    type Registers = MapSystem<String, u32>;
    let server = Arc::new(MemoryServer::<MapOp<String, u32>>::new());
    let alice = client(Registers::new(), server.clone(), BTreeMap::new(), "alice");
    let bob = client(Registers::new(), server.clone(), BTreeMap::new(), "bob");
    alice.checkout().await.unwrap();
    bob.checkout().await.unwrap();

    alice.add([MapOp::put("volume".to_string(), 3)]);
    bob.add([MapOp::put("volume".to_string(), 7)]);
    alice.sync().await.unwrap();
    bob.sync().await.unwrap();
    alice.pull().await.unwrap();

    assert_eq!(alice.get_state().get("volume"), Some(&7));
    assert!(converged(&[alice.get_state(), bob.get_state()]));
}
