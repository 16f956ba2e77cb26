//! Clients sharing one in-memory ordering authority
//!
//! Every client built here retries immediately, so tests never wait on the
//! default retry delay.

use ot_core::rooms::{RoomOp, RoomSystem};
use ot_core::text::{TextOp, TextSystem};
use ot_core::OtSystem;
use ot_sync::{FixedDelay, MemoryServer, StateManager, Transport};
use std::sync::Arc;

pub type TextServer = Arc<MemoryServer<TextOp>>;
pub type TextClient = StateManager<TextSystem, TextServer>;
pub type RoomServer = Arc<MemoryServer<RoomOp>>;
pub type RoomClient = StateManager<RoomSystem, RoomServer>;

/// Manager named `name` over any system and transport, retrying immediately
pub fn client<S, T>(system: S, transport: T, initial: S::State, name: &str) -> StateManager<S, T>
where
    S: OtSystem + Send + Sync + 'static,
    S::State: Clone + Send + 'static,
    S::Op: Send + Sync + 'static,
    T: Transport<S::Op>,
{
    StateManager::new(system, transport, initial)
        .with_client_id(name)
        .with_retry_policy(FixedDelay::immediate())
}

/// Server whose history is a single insert of `content` (none when empty)
pub fn text_server(content: &str) -> TextServer {
    let history = if content.is_empty() {
        Vec::new()
    } else {
        vec![TextOp::insert(0, content)]
    };
    Arc::new(MemoryServer::with_history(history))
}

pub fn text_client(server: &TextServer, name: &str) -> TextClient {
    client(TextSystem, Arc::clone(server), String::new(), name)
}

pub fn room_server() -> RoomServer {
    Arc::new(MemoryServer::new())
}

pub fn room_client(server: &RoomServer, name: &str) -> RoomClient {
    client(RoomSystem, Arc::clone(server), Default::default(), name)
}
