//! # OT Sync Engine
//!
//! Client-side synchronization of operation-based state against a single
//! ordering authority.
//!
//! ## Architecture
//!
//! - **State manager**: optimistic local edits, a pending queue and one
//!   in-flight batch per resource
//! - **Transport**: pluggable [`Transport`] adapter (pull / push)
//! - **Reconciliation**: conflicts are rebased with the resource's
//!   [`ot_core::OtSystem`]
//! - **Retries**: injectable [`RetryPolicy`], fixed delay by default
//! - **Offline support**: [`ManagerSnapshot`] persisted by [`OfflineStore`]
//!
//! ## Usage
//!
//! ```rust
//! use ot_core::text::{TextOp, TextSystem};
//! use ot_sync::{MemoryServer, StateManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ot_sync::Result<()> {
//!     let server = Arc::new(MemoryServer::<TextOp>::new());
//!     let manager = StateManager::new(TextSystem, server.clone(), String::new());
//!
//!     manager.checkout().await?;
//!     manager.add([TextOp::insert(0, "hello")]);
//!     manager.sync().await?;
//!
//!     assert_eq!(manager.get_state(), "hello");
//!     assert_eq!(server.operations().len(), 1);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod listeners;
pub mod manager;
pub mod memory;
pub mod offline;
pub mod retry;
pub mod transport;

pub use config::SyncConfig;
pub use listeners::{ChangeListener, ListenerId};
pub use manager::{StateManager, SyncStatus};
pub use memory::MemoryServer;
pub use offline::{ManagerSnapshot, OfflineStore};
pub use retry::{FixedDelay, RetryPolicy};
pub use transport::{Pulled, PushOutcome, Transport, TransportError};

pub use ot_common::Revision;

/// Common result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during sync operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// An operation could not be applied or transformed; never retried
    #[error(transparent)]
    InvalidOperation(#[from] ot_common::OtError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized: {0}")]
    Auth(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Gave up after {attempts} failed attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Resource has not been checked out")]
    NotCheckedOut,

    #[error("Another checkout or sync is in progress")]
    Busy,

    #[error("Synchronization halted until re-authentication")]
    Halted,

    #[error("State manager is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] anyhow::Error),
}

impl SyncError {
    /// Errors after which the manager stops synchronizing
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_) | SyncError::Halted | SyncError::Closed | SyncError::Protocol(_)
        )
    }
}

impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Network(reason) => SyncError::Network(reason),
            TransportError::Auth(reason) => SyncError::Auth(reason),
            TransportError::Protocol(reason) => SyncError::Protocol(reason),
        }
    }
}
