//! The WebSocket ingress handler.
//!
//! One task per connection reads frames, validates them, hands accepted
//! messages to the producer and enqueues the ack on the session's write
//! queue. All outbound traffic, acks included, goes through the write
//! serializer; this task never touches the socket's write half directly.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream, StreamExt};
use futures::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use weft_core::{Ack, ChatFrame, ErrorFrame, QueueMessage, RoomId};
use weft_session::{Session, SessionSink, SinkError};

use crate::state::GatewayState;

/// The socket write half, owned by the session for its lifetime.
///
/// The mutex is uncontended: the write serializer guarantees one writer
/// at a time; it exists only to give the async write interior mutability.
struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl SessionSink for WsSink {
    async fn send_text(&self, frame: String) -> Result<(), SinkError> {
        let mut sink = self.inner.lock().await;
        sink.send(Message::Text(frame.into()))
            .await
            .map_err(|e| SinkError(e.to_string()))
    }
}

/// Drive one connection until it closes.
pub(crate) async fn run_session(
    state: Arc<GatewayState>,
    room: RoomId,
    peer: SocketAddr,
    socket: WebSocket,
) {
    let (write_half, read_half) = socket.split();
    let session = Arc::new(Session::new(
        room,
        peer.to_string(),
        state.session_queue_capacity,
        Box::new(WsSink {
            inner: Mutex::new(write_half),
        }),
    ));
    state.registry.add(Arc::clone(&session));
    info!(session = %session.id(), room = %room, peer = %peer, "session connected");

    read_loop(&state, &session, read_half).await;

    // Whatever ended the read side ends the session: prune the registry
    // and discard anything still queued for the socket.
    session.close();
    state.serializer.discard_session(&session);
    info!(session = %session.id(), room = %room, "session closed");
}

async fn read_loop(
    state: &GatewayState,
    session: &Arc<Session>,
    mut read_half: SplitStream<WebSocket>,
) {
    while let Some(received) = read_half.next().await {
        match received {
            Ok(Message::Text(text)) => {
                process_frame(state, session, text.as_str()).await;
            },
            Ok(Message::Close(_)) => {
                debug!(session = %session.id(), "client sent close");
                return;
            },
            // Ping/pong are answered by the protocol layer; binary frames
            // are not part of the protocol and are ignored.
            Ok(_) => {},
            Err(e) => {
                debug!(session = %session.id(), error = %e, "read error");
                return;
            },
        }
    }
}

/// Handle one inbound text frame end to end.
///
/// Public so harnesses can drive the full ingress contract without a
/// socket; the WebSocket read loop is just a thin shell around this.
pub async fn process_frame(state: &GatewayState, session: &Arc<Session>, text: &str) {
    state.metrics.messages_received.hit();

    let frame: ChatFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(session = %session.id(), error = %e, "malformed frame");
            state.metrics.messages_failed.hit();
            send_error(state, session, ErrorFrame::new("malformed JSON"));
            return;
        },
    };

    if let Err(rejection) = frame.validate() {
        debug!(session = %session.id(), reason = %rejection.reason, "frame rejected");
        state.metrics.messages_failed.hit();
        send_error(state, session, ErrorFrame::new(rejection.reason));
        return;
    }

    session.set_user_id(&frame.user_id);
    let message = QueueMessage::from_frame(
        &frame,
        session.room(),
        state.node_id.clone(),
        session.peer(),
    );

    // Acceptance means "accepted by this node for ordered delivery": the
    // ack does not wait for fanout, only for the producer.
    match state.producer.publish(&message).await {
        Ok(()) => {
            state.metrics.messages_published.hit();
            let ack = Ack::new(message.message_id, message.timestamp.clone(), frame);
            match serde_json::to_string(&ack) {
                Ok(payload) => {
                    if state.serializer.send(session, payload).is_queued() {
                        state.metrics.acks_sent.hit();
                    } else {
                        state.metrics.acks_failed.hit();
                    }
                },
                Err(e) => {
                    warn!(session = %session.id(), error = %e, "unserializable ack");
                    state.metrics.acks_failed.hit();
                },
            }
        },
        Err(e) => {
            warn!(session = %session.id(), error = %e, "publish failed");
            state.metrics.messages_failed.hit();
            send_error(state, session, ErrorFrame::stamped("failed to enqueue message"));
        },
    }
}

fn send_error(state: &GatewayState, session: &Arc<Session>, error: ErrorFrame) {
    match serde_json::to_string(&error) {
        Ok(payload) => {
            let _ = state.serializer.send(session, payload);
        },
        Err(e) => warn!(session = %session.id(), error = %e, "unserializable error frame"),
    }
}
