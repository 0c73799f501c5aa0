//! Per-socket lifecycle: a writer task draining the connection's queue and
//! a reader task feeding frames to the hub.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::connection::ConnectionHandle;
use crate::hub::HubEvent;

/// Drive one upgraded socket until either side gives up or `shutdown`
/// fires.
///
/// On exit the connection handle reports closed, so the next janitor sweep
/// evicts whatever identity still points at it.
pub async fn run_session(
    socket: WebSocket,
    hub: mpsc::Sender<HubEvent>,
    send_queue: usize,
    heartbeat: Duration,
    shutdown: CancellationToken,
) {
    let (connection, mut rx) = ConnectionHandle::channel(send_queue);
    let conn_id = connection.id();
    info!(%conn_id, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let close_requested = connection.close_requested();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                () = close_requested.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                () = shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(text) => {
                        if ws_tx.send(Message::Text(String::from(&*text).into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    trace!(%conn_id, "sent ping");
                }
            }
        }
    });

    let reader_conn = Arc::clone(&connection);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                Message::Text(text) => text.as_str().to_owned(),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!(conn_id = %reader_conn.id(), "dropping non-utf8 binary frame");
                        continue;
                    }
                },
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            let event = HubEvent::Message {
                connection: Arc::clone(&reader_conn),
                text,
            };
            if hub.send(event).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => {},
        _ = &mut reader => {},
    }
    connection.close();
    writer.abort();
    reader.abort();

    info!(%conn_id, dropped = connection.drop_count(), "client disconnected");
}
