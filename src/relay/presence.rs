use tracing::info;

use super::{ConnectionId, Relay, RelayError, RoomId, ServerEvent, UserId};

impl Relay {
    /// Binds `user` to the connection, joins the user's personal room and acknowledges with
    /// `connected`. A connection binds once; repeated setups are rejected and change nothing.
    pub async fn setup(&self, connection: ConnectionId, user: UserId) -> Result<(), RelayError> {
        let mut state = self.state.write().await;

        state.registry.bind_identity(connection, user.clone())?;
        state.rooms.join(RoomId::from(&user), connection);
        state.registry.deliver(connection, ServerEvent::Connected);

        info!(%connection, %user, "connection bound");
        Ok(())
    }

    /// Forgets the connection everywhere. Safe to call more than once.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.write().await;

        let user = state.registry.identity_of(connection).cloned();
        let rooms = state.rooms.leave_all(connection);
        if state.registry.deregister(connection) {
            info!(
                %connection,
                user = user.as_ref().map(UserId::as_str),
                rooms,
                connections = state.registry.len(),
                "connection closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{drain, open, open_as};
    use super::*;

    #[tokio::test]
    async fn setup_joins_personal_room_and_acks() {
        let relay = Relay::new();
        let (conn, mut rx) = open(&relay).await;

        relay.setup(conn, "u1".into()).await.unwrap();

        assert_eq!(drain(&mut rx), vec![ServerEvent::Connected]);
        assert_eq!(relay.identity_of(conn).await, Some("u1".into()));
        assert!(relay.members_of(&"u1".into()).await.contains(&conn));
    }

    #[tokio::test]
    async fn second_setup_keeps_first_binding() {
        let relay = Relay::new();
        let (conn, mut rx) = open_as(&relay, "u1").await;

        let err = relay.setup(conn, "u2".into()).await.unwrap_err();

        assert!(matches!(err, RelayError::AlreadyBound { .. }));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(relay.identity_of(conn).await, Some("u1".into()));
        assert!(relay.members_of(&"u2".into()).await.is_empty());
    }

    #[tokio::test]
    async fn setup_on_closed_connection_is_rejected() {
        let relay = Relay::new();
        let (conn, _rx) = open(&relay).await;
        relay.disconnect(conn).await;

        let err = relay.setup(conn, "u1".into()).await.unwrap_err();

        assert_eq!(err, RelayError::UnknownConnection(conn));
        assert!(relay.members_of(&"u1".into()).await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_clears_every_index() {
        let relay = Relay::new();
        let (conn, _rx) = open_as(&relay, "u1").await;
        relay.join_chat(conn, "room1".into()).await.unwrap();
        relay.join_chat(conn, "room2".into()).await.unwrap();

        relay.disconnect(conn).await;
        relay.disconnect(conn).await;

        assert_eq!(relay.connection_count().await, 0);
        assert!(relay.rooms_of(conn).await.is_empty());
        for room in ["u1", "room1", "room2"] {
            assert!(!relay.members_of(&room.into()).await.contains(&conn));
        }
        assert!(relay.connections_for(&"u1".into()).await.is_empty());
    }
}
