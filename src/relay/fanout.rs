use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info};

use super::{ClientEvent, ConnectionId, MessageEnvelope, Relay, RelayError, RoomId, ServerEvent};

impl Relay {
    /// Routes one inbound event from `connection`.
    pub async fn dispatch(
        &self,
        connection: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), RelayError> {
        match event {
            ClientEvent::Setup(payload) => self.setup(connection, payload.id).await,
            ClientEvent::JoinChat(room) => self.join_chat(connection, room).await,
            ClientEvent::LeaveChat(room) => self.leave_chat(connection, &room).await,
            ClientEvent::Typing(room) => {
                self.typing(connection, &room).await;
                Ok(())
            }
            ClientEvent::StopTyping(room) => {
                self.stop_typing(connection, &room).await;
                Ok(())
            }
            ClientEvent::NewMessage(payload) => self.new_message(payload).await.map(|_| ()),
        }
    }

    pub async fn join_chat(&self, connection: ConnectionId, room: RoomId) -> Result<(), RelayError> {
        let mut state = self.state.write().await;
        if !state.registry.contains(connection) {
            return Err(RelayError::UnknownConnection(connection));
        }

        info!(%connection, %room, "user joined room");
        state.rooms.join(room, connection);
        Ok(())
    }

    pub async fn leave_chat(
        &self,
        connection: ConnectionId,
        room: &RoomId,
    ) -> Result<(), RelayError> {
        let mut state = self.state.write().await;
        if state.rooms.leave(room, connection) {
            info!(%connection, %room, "user left room");
        }
        Ok(())
    }

    /// Tells every other member of `room` that the sender started typing.
    pub async fn typing(&self, sender: ConnectionId, room: &RoomId) -> usize {
        self.broadcast_to_room(sender, room, ServerEvent::Typing(room.clone()))
            .await
    }

    pub async fn stop_typing(&self, sender: ConnectionId, room: &RoomId) -> usize {
        self.broadcast_to_room(sender, room, ServerEvent::StopTyping(room.clone()))
            .await
    }

    /// Sends `message received` to every connection of every chat member except the sender.
    /// Returns the number of connections the event was queued for.
    pub async fn new_message(&self, payload: Value) -> Result<usize, RelayError> {
        let envelope = MessageEnvelope::try_from(payload)?;

        let state = self.state.read().await;
        let recipients: HashSet<ConnectionId> = envelope
            .addressees()
            .flat_map(|user| state.registry.lookup_connections_for_identity(user))
            .collect();

        let delivered = recipients
            .into_iter()
            .filter(|recipient| {
                state.registry.deliver(
                    *recipient,
                    ServerEvent::MessageReceived(envelope.payload.clone()),
                )
            })
            .count();

        debug!(sender = %envelope.sender, recipients = delivered, "relayed new message");
        Ok(delivered)
    }

    async fn broadcast_to_room(
        &self,
        sender: ConnectionId,
        room: &RoomId,
        event: ServerEvent,
    ) -> usize {
        let state = self.state.read().await;
        let delivered = state
            .rooms
            .members(room)
            .filter(|member| *member != sender)
            .filter(|member| state.registry.deliver(*member, event.clone()))
            .count();

        debug!(%sender, %room, event = event.name(), recipients = delivered, "relayed to room");
        delivered
    }
}
