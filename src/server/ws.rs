//! WebSocket endpoint for live job status.
//!
//! On connect the observer receives a full `jobs` snapshot, then every hub
//! event as it happens. Client frames are ignored apart from close; the
//! socket is a one-way feed.

use axum::extract::State;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use crate::events::WsEvent;
use crate::server::AppState;

pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    // Claim the connection slot before upgrading so a flood of connects is
    // rejected with a plain 503 instead of half-open sockets.
    let Some(stream) = state.hub.subscribe() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "too many observers").into_response();
    };

    upgrade
        .on_upgrade(move |socket| serve_socket(socket, state, Box::pin(stream)))
        .into_response()
}

async fn serve_socket<S>(mut socket: WebSocket, state: AppState, mut events: S)
where
    S: futures::Stream<Item = WsEvent> + Send + Unpin,
{
    // Seed the observer with the current registry so its view is
    // self-consistent without replaying history.
    let snapshot = WsEvent::Jobs {
        jobs: state.store.jobs().await,
    };
    if send_event(&mut socket, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pings are answered by axum; everything else ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("observer disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &WsEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).unwrap_or_default();
    socket.send(Message::Text(Utf8Bytes::from(json))).await
}
