use thiserror::Error;

use super::{ConnectionId, UserId};

/// Failures while processing a single inbound event. None of these end the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("connection {connection} is already bound to {bound}")]
    AlreadyBound {
        connection: ConnectionId,
        bound: UserId,
    },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

impl From<String> for RelayError {
    fn from(err: String) -> Self {
        Self::MalformedPayload(err)
    }
}
