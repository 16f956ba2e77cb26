//! Temporary directories for snapshot and configuration tests

use assert_fs::prelude::*;
use assert_fs::TempDir;
use ot_sync::OfflineStore;
use std::path::PathBuf;

/// Create a temporary directory for testing
///
/// The directory will be automatically cleaned up when the `TempDir` is dropped.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Snapshot store for `resource` under `<temp>/snapshots`
pub fn snapshot_store(temp: &TempDir, resource: &str) -> OfflineStore {
    OfflineStore::new(temp.child("snapshots").path(), resource)
}

/// Write `content` to `<temp>/sync.toml` and return its path
pub fn write_config(temp: &TempDir, content: &str) -> PathBuf {
    let file = temp.child("sync.toml");
    file.write_str(content).expect("Failed to write config file");
    file.path().to_path_buf()
}
