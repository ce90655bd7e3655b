use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RelayError, ServerEvent};

/// Outbound queue of a single connection, drained by its socket writer.
pub type Outbox = mpsc::Sender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Identity a client claims during setup. Not validated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct ConnectionEntry {
    identity: Option<UserId>,
    outbox: Outbox,
}

/// Live connections and the identities bound to them.
///
/// `identities` is the reverse index used for user-addressed delivery; an identity maps to a set
/// because the same user may be connected from several places at once.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    identities: HashMap<UserId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn register(&mut self, connection: ConnectionId, outbox: Outbox) {
        self.connections.insert(
            connection,
            ConnectionEntry {
                identity: None,
                outbox,
            },
        );
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    /// Binds `user` to `connection`. The first binding wins; later calls leave it untouched.
    pub fn bind_identity(
        &mut self,
        connection: ConnectionId,
        user: UserId,
    ) -> Result<(), RelayError> {
        let entry = self
            .connections
            .get_mut(&connection)
            .ok_or(RelayError::UnknownConnection(connection))?;

        if let Some(bound) = &entry.identity {
            return Err(RelayError::AlreadyBound {
                connection,
                bound: bound.clone(),
            });
        }

        self.identities
            .entry(user.clone())
            .or_default()
            .insert(connection);
        entry.identity = Some(user);
        Ok(())
    }

    pub fn identity_of(&self, connection: ConnectionId) -> Option<&UserId> {
        self.connections.get(&connection)?.identity.as_ref()
    }

    pub fn lookup_connections_for_identity(&self, user: &UserId) -> HashSet<ConnectionId> {
        self.identities.get(user).cloned().unwrap_or_default()
    }

    /// Removes the connection and its identity binding. Returns `false` if it was already gone.
    pub fn deregister(&mut self, connection: ConnectionId) -> bool {
        let Some(entry) = self.connections.remove(&connection) else {
            return false;
        };

        if let Some(user) = entry.identity {
            if let Some(sessions) = self.identities.get_mut(&user) {
                sessions.remove(&connection);
                if sessions.is_empty() {
                    self.identities.remove(&user);
                }
            }
        }
        true
    }

    /// Queues `event` for `connection` without waiting. Returns whether it was queued.
    pub fn deliver(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let Some(entry) = self.connections.get(&connection) else {
            return false;
        };

        match entry.outbox.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(%connection, event = event.name(), "outbound queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(%connection, event = event.name(), "outbound queue closed");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(registry: &mut ConnectionRegistry) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let id = ConnectionId::new();
        registry.register(id, tx);
        (id, rx)
    }

    #[test]
    fn bind_identity_rejects_second_binding() {
        let mut registry = ConnectionRegistry::default();
        let (conn, _rx) = registered(&mut registry);

        registry.bind_identity(conn, "u1".into()).unwrap();
        let err = registry.bind_identity(conn, "u2".into()).unwrap_err();

        assert_eq!(
            err,
            RelayError::AlreadyBound {
                connection: conn,
                bound: "u1".into()
            }
        );
        assert_eq!(registry.identity_of(conn), Some(&UserId::from("u1")));
        assert!(registry.lookup_connections_for_identity(&"u2".into()).is_empty());
    }

    #[test]
    fn bind_identity_requires_registration() {
        let mut registry = ConnectionRegistry::default();
        let stranger = ConnectionId::new();
        assert_eq!(
            registry.bind_identity(stranger, "u1".into()),
            Err(RelayError::UnknownConnection(stranger))
        );
    }

    #[test]
    fn identity_can_hold_several_connections() {
        let mut registry = ConnectionRegistry::default();
        let (c1, _rx1) = registered(&mut registry);
        let (c2, _rx2) = registered(&mut registry);
        registry.bind_identity(c1, "u1".into()).unwrap();
        registry.bind_identity(c2, "u1".into()).unwrap();

        let sessions = registry.lookup_connections_for_identity(&"u1".into());
        assert_eq!(sessions, HashSet::from([c1, c2]));

        registry.deregister(c1);
        let sessions = registry.lookup_connections_for_identity(&"u1".into());
        assert_eq!(sessions, HashSet::from([c2]));
    }

    #[test]
    fn deregister_is_idempotent() {
        let mut registry = ConnectionRegistry::default();
        let (conn, _rx) = registered(&mut registry);
        registry.bind_identity(conn, "u1".into()).unwrap();

        assert!(registry.deregister(conn));
        assert!(!registry.deregister(conn));
        assert!(registry.is_empty());
        assert!(registry.lookup_connections_for_identity(&"u1".into()).is_empty());
    }

    #[test]
    fn deliver_drops_when_queue_is_full() {
        let mut registry = ConnectionRegistry::default();
        let (tx, mut rx) = mpsc::channel(1);
        let conn = ConnectionId::new();
        registry.register(conn, tx);

        assert!(registry.deliver(conn, ServerEvent::Connected));
        assert!(!registry.deliver(conn, ServerEvent::Connected));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Connected);
        assert!(rx.try_recv().is_err());
    }
}
