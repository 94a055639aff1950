//! Session Runtime (C7, §4.7): one task pair per connected WebSocket.
//! Grounded on `services/server/src/ws_forwarder.rs`'s handler shape, but
//! split into independent reader and writer tasks joined by a bounded
//! egress channel, which the teacher's single combined `tokio::select!` loop
//! does not need (its forwarder only ever pushes commands one way).

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use hub_protocol::{BROADCAST_RECIPIENT, Frame, MessageStatus, SYSTEM_SENDER, error_codes};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{EGRESS_QUEUE_CAPACITY, MAX_FRAME_BYTES, PING_INTERVAL, READ_DEADLINE, WRITE_DEADLINE};
use crate::delivery::{DeliveryEngine, DeliveryMode};
use crate::rate_limit::RateLimiter;
use crate::registry::{Registry, SessionHandle};
use crate::response_channel::ResponseChannels;
use crate::store::{NewMessage, Store};

/// Shared handles a session needs; owned by `AppState` and cloned (cheaply,
/// via `Arc`) into each connection's task.
pub struct SessionDeps {
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub delivery: Arc<DeliveryEngine>,
    pub response_channels: Arc<ResponseChannels>,
}

/// Drives one authenticated connection until it closes, errors, or is
/// displaced by a newer session for the same user (§4.6, §4.7).
pub async fn run(socket: WebSocket, deps: Arc<SessionDeps>, user_id: String) {
    let (tx, rx) = mpsc::channel::<String>(EGRESS_QUEUE_CAPACITY);
    let cancel = CancellationToken::new();

    deps.registry.register(
        &user_id,
        SessionHandle {
            egress: tx.clone(),
            cancel: cancel.clone(),
        },
    );

    let session_id = match deps.store.start_session(&user_id) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(user_id, error = %e, "failed to record session start");
            None
        }
    };

    match deps.store.lookup_user(&user_id) {
        Ok(Some(row)) => deps.delivery.retrieve_undelivered_for(&user_id, &row.created_at),
        Ok(None) | Err(_) => {
            tracing::warn!(user_id, "registration time unavailable, falling back to direct-only replay");
            deps.delivery.retrieve_undelivered_direct_only_for(&user_id);
        }
    }

    let (write, read) = socket.split();
    let writer = tokio::spawn(run_writer(write, rx, cancel.clone()));

    run_reader(read, &deps, &user_id, &tx, &cancel).await;

    cancel.cancel();
    let _ = writer.await;
    deps.registry.unregister(&user_id, &tx);
    deps.rate_limiter.forget(&user_id);
    if let Some(session_id) = session_id {
        if let Err(e) = deps.store.end_session(&session_id) {
            tracing::warn!(user_id, error = %e, "failed to record session end");
        }
    }
    tracing::info!(user_id, "session closed");
}

async fn run_reader(
    mut read: futures_util::stream::SplitStream<WebSocket>,
    deps: &Arc<SessionDeps>,
    user_id: &str,
    tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = tokio::time::timeout(READ_DEADLINE, read.next()) => next,
        };
        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                tracing::debug!(user_id, error = %e, "websocket read error, closing session");
                break;
            }
            Ok(None) => break,
            Err(_elapsed) => {
                tracing::debug!(user_id, "read deadline exceeded, closing session");
                break;
            }
        };

        match message {
            Message::Text(text) => handle_incoming_text(deps, user_id, tx, &text).await,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

async fn handle_incoming_text(deps: &Arc<SessionDeps>, user_id: &str, tx: &mpsc::Sender<String>, text: &str) {
    if text.len() > MAX_FRAME_BYTES {
        tracing::warn!(user_id, len = text.len(), "oversized frame dropped");
        send_system_notice(tx, error_codes::PROTOCOL_ERROR, "frame too large").await;
        return;
    }

    let mut frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "malformed frame dropped");
            send_system_notice(tx, error_codes::PROTOCOL_ERROR, "malformed frame").await;
            return;
        }
    };

    if !deps.rate_limiter.allow(user_id) {
        send_rate_limit_notice(tx, user_id).await;
        return;
    }

    frame.from = user_id.to_owned();
    if frame.timestamp.is_empty() || frame.timestamp == "0" {
        frame.timestamp = String::new();
    }
    frame.is_broadcast = frame.to == BROADCAST_RECIPIENT;
    frame.status = MessageStatus::Pending.as_str().to_owned();

    if frame.is_forward_message && deps.response_channels.deliver(user_id, frame.clone()) {
        return;
    }

    let insert = deps.store.insert_message(NewMessage {
        from_user: frame.from.clone(),
        to_user: frame.to.clone(),
        timestamp: frame.timestamp.clone(),
        content: frame.content.clone(),
        is_broadcast: frame.is_broadcast,
        signature: frame.signature.clone(),
        is_forward_message: false,
    });

    let id = match insert {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "failed to store incoming frame");
            send_system_notice(tx, error_codes::STORAGE_ERROR, "failed to store message").await;
            return;
        }
    };

    match deps.store.get_message(id) {
        Ok(Some(row)) => deps.delivery.deliver(&row, DeliveryMode::Live, ""),
        Ok(None) => tracing::warn!(user_id, message_id = id, "inserted message vanished before delivery"),
        Err(e) => tracing::warn!(user_id, message_id = id, error = %e, "failed to reload stored message"),
    }
}

async fn send_system_notice(tx: &mpsc::Sender<String>, code: &str, message: &str) {
    let frame = Frame {
        id: 0,
        from: SYSTEM_SENDER.to_owned(),
        to: String::new(),
        timestamp: String::new(),
        content: format!("{code}: {message}"),
        status: MessageStatus::Error.as_str().to_owned(),
        is_broadcast: false,
        signature: None,
        is_forward_message: false,
    };
    if let Ok(payload) = serde_json::to_string(&frame) {
        let _ = tx.try_send(payload);
    }
}

/// The one system notice whose wording and recipient are spec-mandated
/// verbatim (§4.7): `{from=system, to=userID, content="Rate limit exceeded.
/// Please slow down.", status=error}`.
async fn send_rate_limit_notice(tx: &mpsc::Sender<String>, user_id: &str) {
    let frame = Frame {
        id: 0,
        from: SYSTEM_SENDER.to_owned(),
        to: user_id.to_owned(),
        timestamp: String::new(),
        content: "Rate limit exceeded. Please slow down.".to_owned(),
        status: MessageStatus::Error.as_str().to_owned(),
        is_broadcast: false,
        signature: None,
        is_forward_message: false,
    };
    if let Ok(payload) = serde_json::to_string(&frame) {
        let _ = tx.try_send(payload);
    }
}

async fn run_writer(
    mut write: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await; // first tick fires immediately; consume it up front

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(Some(CloseFrame {
                    code: 1000,
                    reason: "session replaced or closed".into(),
                }))).await;
                break;
            }
            _ = ping.tick() => {
                if send_with_deadline(&mut write, Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            payload = rx.recv() => {
                match payload {
                    Some(payload) => {
                        if send_with_deadline(&mut write, Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

async fn send_with_deadline(
    write: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    message: Message,
) -> Result<(), ()> {
    match tokio::time::timeout(WRITE_DEADLINE, write.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(()),
    }
}
