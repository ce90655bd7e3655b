//! Real-time relay: connections, rooms and event fan-out.
//!
//! All bookkeeping lives in one [`Relay`] value that every socket task holds a clone of. The
//! registry and the room index sit behind a single lock so updates spanning both (setup binds an
//! identity *and* joins the personal room, disconnect clears both) are never observed half done.

mod error;
mod event;
mod fanout;
mod presence;
mod registry;
mod rooms;
mod ws;

use std::{collections::HashSet, sync::Arc};

use axum::{routing::get, Router};
use tokio::sync::RwLock;
use tracing::info;

pub use error::RelayError;
pub use event::{ClientEvent, MessageEnvelope, ServerEvent, SetupPayload};
pub use registry::{ConnectionId, ConnectionRegistry, Outbox, UserId};
pub use rooms::{RoomId, RoomIndex};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::relay_ws))
}

#[derive(Default)]
struct RelayState {
    registry: ConnectionRegistry,
    rooms: RoomIndex,
}

#[derive(Clone, Default)]
pub struct Relay {
    state: Arc<RwLock<RelayState>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection. Events for it are queued on `outbox`.
    pub async fn connect(&self, connection: ConnectionId, outbox: Outbox) {
        let mut state = self.state.write().await;
        state.registry.register(connection, outbox);
        info!(%connection, connections = state.registry.len(), "connection opened");
    }

    pub async fn members_of(&self, room: &RoomId) -> HashSet<ConnectionId> {
        self.state.read().await.rooms.members_of(room)
    }

    pub async fn rooms_of(&self, connection: ConnectionId) -> HashSet<RoomId> {
        self.state.read().await.rooms.rooms_of(connection)
    }

    pub async fn connections_for(&self, user: &UserId) -> HashSet<ConnectionId> {
        self.state
            .read()
            .await
            .registry
            .lookup_connections_for_identity(user)
    }

    pub async fn identity_of(&self, connection: ConnectionId) -> Option<UserId> {
        self.state
            .read()
            .await
            .registry
            .identity_of(connection)
            .cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.registry.len()
    }
}
