//! WebSocket subscriber transport

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use trafficflow_core::prelude::*;

use crate::state::AppState;

/// Client requests; each one replaces the connection's previous subscription
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    SubscribeRoute { route_id: RouteId },
    SubscribeSegments { segment_ids: Vec<SegmentId> },
    Unsubscribe,
}

/// Bridges the broadcaster's non-blocking sends onto a bounded channel
/// drained by the socket task
struct ChannelTransport {
    tx: mpsc::Sender<Notification>,
}

impl SubscriberTransport for ChannelTransport {
    fn try_send(&self, notification: &Notification) -> SendOutcome {
        match self.tx.try_send(notification.clone()) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => SendOutcome::Full,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(mut socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::channel(state.websocket_queue);
    let transport = Arc::new(ChannelTransport { tx });
    let mut shutdown = state.shutdown.clone();
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(request) => {
                        if let Some(previous) = subscription.take() {
                            state.broadcaster.unsubscribe(&previous);
                        }
                        let interest = match request {
                            ClientMessage::SubscribeRoute { route_id } => {
                                Some(Interest::Route(route_id))
                            }
                            ClientMessage::SubscribeSegments { segment_ids } => {
                                Some(Interest::Segments(segment_ids.into_iter().collect()))
                            }
                            ClientMessage::Unsubscribe => None,
                        };
                        subscription = interest.map(|interest| {
                            state.broadcaster.subscribe(transport.clone(), interest)
                        });
                        json!({
                            "type": "ack",
                            "subscribed": subscription.is_some(),
                        })
                    }
                    Err(err) => {
                        debug!("Rejecting WebSocket message: {err}");
                        json!({ "type": "error", "error": err.to_string() })
                    }
                };
                if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                    break;
                }
            }
            Some(notification) = rx.recv() => {
                let payload = match serde_json::to_string(&notification) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!("Failed to encode notification: {err}");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    if let Some(subscription) = subscription {
        state.broadcaster.unsubscribe(&subscription);
    }
    debug!("WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification {
            sequence: 1,
            segment_id: SegmentId::from("s1"),
            state: SegmentState::free_flow(50.0),
        }
    }

    #[test]
    fn full_and_closed_channels_are_reported() {
        let (tx, mut rx) = mpsc::channel(1);
        let transport = ChannelTransport { tx };

        assert_eq!(transport.try_send(&notification()), SendOutcome::Delivered);
        assert_eq!(transport.try_send(&notification()), SendOutcome::Full);
        assert!(rx.try_recv().is_ok());

        drop(rx);
        assert!(!transport.is_connected());
        assert_eq!(transport.try_send(&notification()), SendOutcome::Closed);
    }

    #[test]
    fn client_messages_decode() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe_segments","segment_ids":["a","b"]}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::SubscribeSegments { segment_ids } if segment_ids.len() == 2));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe_route","route_id":"route-3"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SubscribeRoute { route_id } if route_id.0 == "route-3"));
    }
}
