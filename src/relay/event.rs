use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{RelayError, RoomId, UserId};
use crate::GetField;

/// Events a client emits. On the wire: `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "setup")]
    Setup(SetupPayload),
    #[serde(rename = "join chat")]
    JoinChat(RoomId),
    #[serde(rename = "leave chat")]
    LeaveChat(RoomId),
    #[serde(rename = "typing")]
    Typing(RoomId),
    #[serde(rename = "stop typing")]
    StopTyping(RoomId),
    /// Kept as raw JSON so recipients get exactly what the sender emitted.
    #[serde(rename = "new message")]
    NewMessage(Value),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::JoinChat(_) => "join chat",
            Self::LeaveChat(_) => "leave chat",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop typing",
            Self::NewMessage(_) => "new message",
        }
    }
}

/// The user object sent with `setup`. Anything besides `_id` is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPayload {
    #[serde(rename = "_id")]
    pub id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "typing")]
    Typing(RoomId),
    #[serde(rename = "stop typing")]
    StopTyping(RoomId),
    #[serde(rename = "message received")]
    MessageReceived(Value),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop typing",
            Self::MessageReceived(_) => "message received",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Routing view of a `new message` payload: who sent it and which chat members it addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    pub sender: UserId,
    pub recipients: Vec<UserId>,
    pub payload: Value,
}

impl MessageEnvelope {
    /// Chat members other than the sender, in listed order.
    pub fn addressees(&self) -> impl Iterator<Item = &UserId> {
        self.recipients.iter().filter(|user| **user != self.sender)
    }
}

impl TryFrom<Value> for MessageEnvelope {
    type Error = RelayError;

    fn try_from(payload: Value) -> Result<Self, Self::Error> {
        let users = payload.get_obj_field("chat")?.get_array_field("users")?;
        let recipients = users.iter().map(user_id_of).collect::<Result<Vec<_>, _>>()?;
        let sender = payload.get_obj_field("sender")?.get_str_field("_id")?;

        Ok(Self {
            sender: sender.into(),
            recipients,
            payload,
        })
    }
}

// chat members arrive either populated (`{"_id": ..}`) or as bare ids
fn user_id_of(user: &Value) -> Result<UserId, RelayError> {
    match user {
        Value::String(id) => Ok(id.as_str().into()),
        other => Ok(other.get_str_field("_id")?.into()),
    }
}
