//! Shared test utilities for the OT sync engine test suites
//!
//! This crate provides common testing utilities to eliminate duplicated
//! client setup and fault injection across test suites.
//!
//! # Modules
//!
//! - [`clients`]: State managers wired to a shared in-memory server
//! - [`transport`]: Fault-injecting transport wrapper
//! - [`workspace`]: Temporary directories for snapshots and config files
//! - [`logging`]: Test logging configuration
//! - [`assertions`]: Domain-specific predicates
//!
//! # Example
//!
//! ```rust
//! use ot_test_helpers::prelude::*;
//! use ot_core::text::TextOp;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let server = text_server("abc");
//! let client = text_client(&server, "alice");
//! client.checkout().await.unwrap();
//! client.add([TextOp::insert(3, "d")]);
//! client.sync().await.unwrap();
//! assert_eq!(client.get_state(), "abcd");
//! # }
//! ```

pub mod assertions;
pub mod clients;
pub mod logging;
pub mod transport;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::clients::{
        client, room_client, room_server, text_client, text_server, RoomClient, RoomServer,
        TextClient, TextServer,
    };
    pub use crate::logging::{init_test_logging, suppress_logs};
    pub use crate::transport::FlakyTransport;
    pub use crate::workspace::{snapshot_store, temp_dir, write_config};
}
