//! WebSocket transport
//!
//! One task per connection owns both halves of the socket in a single
//! `select!` loop: inbound frames go to the [`EventRouter`], frames queued on
//! the connection's outbound channel go to the socket, and an optional idle
//! deadline evicts clients whose transport died without a close frame.
//!
//! A connection is CONNECTING until the upgrade completes, OPEN for the
//! lifetime of the loop, and CLOSED once the loop exits; the close-path
//! cleanup runs exactly once, whichever side ended the conversation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Config;
use crate::envelope::UserId;
use crate::registry::{ConnectionHandle, Outbound, Registry, next_conn_id};
use crate::router::EventRouter;

/// How often the idle deadline is checked
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Shared state handed to every connection
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub router: Arc<EventRouter>,
    pub config: Arc<Config>,
}

/// Serve the presence socket until the listener fails
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let app = axum::Router::new()
        .route(&state.config.ws_path, get(ws_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(state.config.bind_addr).await?;
    info!(
        addr = %state.config.bind_addr,
        path = %state.config.ws_path,
        "presence socket listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection from upgrade to close
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = next_conn_id();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.send_queue_capacity);
    let handle = ConnectionHandle::new(conn_id, tx);

    debug!(conn_id, "connection open");

    let (mut sink, mut stream) = socket.split();
    let mut identity: Option<UserId> = None;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    last_seen = Instant::now();
                    state.router.dispatch(&handle, &mut identity, text.as_bytes()).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    last_seen = Instant::now();
                    state.router.dispatch(&handle, &mut identity, &data).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    last_seen = Instant::now();
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!(conn_id, error = %err, "socket error");
                    break;
                }
            },

            outbound = rx.recv() => match outbound {
                Some(Outbound::Event(payload)) => {
                    let text = String::from_utf8_lossy(&payload).into_owned();
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // eviction by the reconnect guard or the idle timer, or the
                // handle side is simply gone
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },

            _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {
                if let Some(timeout) = state.config.idle_timeout
                    && last_seen.elapsed() > timeout
                {
                    info!(conn_id, "idle timeout, closing connection");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    // removes the registry entry and broadcasts offline only if this
    // connection is still the one on record for its identity
    state.router.handle_close(&handle, identity);
    debug!(conn_id, "connection closed");
}
