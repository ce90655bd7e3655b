use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Config;

use super::{ClientEvent, ConnectionId, Relay};

#[debug_handler(state = crate::AppState)]
pub async fn relay_ws(
    State(relay): State<Relay>,
    State(config): State<Config>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| handle_socket(stream, relay, config.outbound_buffer))
}

async fn handle_socket(stream: WebSocket, relay: Relay, outbound_buffer: usize) {
    let connection = ConnectionId::new();
    let (outbox, mut inbox) = mpsc::channel(outbound_buffer);
    relay.connect(connection, outbox).await;

    let (mut sender, mut receiver) = stream.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(err) => {
                    warn!(%connection, event = event.name(), error = %err, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // one task reads the socket, so a connection's events are handled in arrival order
    let mut recv_task = {
        let relay = relay.clone();
        tokio::spawn(async move {
            while let Some(frame) = receiver.next().await {
                match frame {
                    Ok(Message::Text(text)) => handle_frame(&relay, connection, text.as_str()).await,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        debug!(%connection, error = %err, "socket error");
                        break;
                    }
                }
            }
        })
    };

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };

    relay.disconnect(connection).await;
}

async fn handle_frame(relay: &Relay, connection: ConnectionId, text: &str) {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(%connection, error = %err, "dropping inbound frame");
            return;
        }
    };

    let name = event.name();
    if let Err(err) = relay.dispatch(connection, event).await {
        warn!(%connection, event = name, error = %err, "event rejected");
    }
}
