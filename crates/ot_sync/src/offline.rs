//! Offline persistence of manager state

use crate::SyncConfig;
use ot_common::Revision;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a manager needs to resume without a checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSnapshot<St, Op> {
    pub revision: Revision,
    /// State at `revision`
    pub base: St,
    pub inflight: Vec<Op>,
    pub pending: Vec<Op>,
}

impl<St, Op> ManagerSnapshot<St, Op> {
    /// Local operations not known to be committed
    pub fn unsynced(&self) -> usize {
        self.inflight.len() + self.pending.len()
    }
}

/// Stores the snapshot of one resource as JSON under a directory
#[derive(Debug, Clone)]
pub struct OfflineStore {
    dir: PathBuf,
    resource: String,
}

impl OfflineStore {
    pub fn new(dir: impl Into<PathBuf>, resource: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            resource: resource.into(),
        }
    }

    pub fn from_config(config: &SyncConfig, resource: impl Into<String>) -> Self {
        Self::new(config.snapshot_dir.clone(), resource)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.resource))
    }

    /// Write the snapshot, replacing any previous one
    pub fn save<St, Op>(&self, snapshot: &ManagerSnapshot<St, Op>) -> crate::Result<()>
    where
        St: Serialize,
        Op: Serialize,
    {
        fs::create_dir_all(&self.dir)?;

        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            path = %path.display(),
            revision = %snapshot.revision,
            unsynced = snapshot.unsynced(),
            "saved snapshot"
        );
        Ok(())
    }

    /// The stored snapshot, if any
    pub fn load<St, Op>(&self) -> crate::Result<Option<ManagerSnapshot<St, Op>>>
    where
        St: DeserializeOwned,
        Op: DeserializeOwned,
    {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let snapshot: ManagerSnapshot<St, Op> = serde_json::from_slice(&fs::read(&path)?)?;
        tracing::info!(
            path = %path.display(),
            revision = %snapshot.revision,
            unsynced = snapshot.unsynced(),
            "loaded snapshot"
        );
        Ok(Some(snapshot))
    }

    pub fn clear(&self) -> crate::Result<()> {
        remove_if_exists(&self.path())
    }
}

fn remove_if_exists(path: &Path) -> crate::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => Ok(other?),
    }
}
