//! Push strategy: graphql-ws subscription over a websocket
//!
//! One long-lived connection per execution. The handshake is
//! `connection_init -> connection_ack -> subscribe`, after which every
//! `next` frame carries one progress payload. Connection-level errors that
//! are not an intentional close surface as a single transport failure;
//! reconnecting is not this layer's job.

use futures::stream::StreamExt;
use futures::SinkExt;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info};

use super::{Subscription, SubscriptionSender, Transport, TransportFailure, TransportItem};
use crate::client::{subscriptions, ws_url, ProgressPayload};
use crate::tracker::ExecutionHandle;

/// Decoded graphql-ws frame
#[derive(Debug, Clone, PartialEq)]
pub enum WsFrame {
    Ack,
    Ping,
    Next(ProgressPayload),
    Error(String),
    Complete,
    Other,
}

/// Decode one text frame of the graphql-ws protocol
pub fn parse_frame(text: &str) -> Result<WsFrame, TransportFailure> {
    let json: Value =
        serde_json::from_str(text).map_err(|e| TransportFailure::Parse(e.to_string()))?;

    let frame = match json.get("type").and_then(Value::as_str) {
        Some("connection_ack") => WsFrame::Ack,
        Some("ping") => WsFrame::Ping,
        Some("next") => {
            let payload = json.get("payload").cloned().unwrap_or(Value::Null);
            if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
                let messages: Vec<_> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect();
                if !errors.is_empty() {
                    return Ok(WsFrame::Error(messages.join(", ")));
                }
            }
            let data = payload
                .get("data")
                .and_then(|d| d.get("executionProgress"))
                .cloned()
                .ok_or_else(|| TransportFailure::Parse("missing executionProgress".to_string()))?;
            let progress: ProgressPayload =
                serde_json::from_value(data).map_err(|e| TransportFailure::Parse(e.to_string()))?;
            WsFrame::Next(progress)
        }
        Some("error") => WsFrame::Error(
            json.get("payload")
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        ),
        Some("complete") => WsFrame::Complete,
        _ => WsFrame::Other,
    };
    Ok(frame)
}

pub struct PushTransport {
    ws_url: String,
}

impl PushTransport {
    pub fn new(server_url: &str) -> Self {
        Self {
            ws_url: ws_url(server_url),
        }
    }

    /// Connect to an explicit websocket endpoint
    pub fn with_ws_url(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }
}

impl Transport for PushTransport {
    fn open(&self, handle: &ExecutionHandle) -> Subscription {
        let ws_url = self.ws_url.clone();
        let handle = handle.clone();

        Subscription::spawn(move |sender| async move {
            match subscribe(&ws_url, &handle, &sender).await {
                Ok(()) => debug!(execution_id = %handle, "Push subscription finished"),
                Err(failure) => {
                    if sender.is_owner() {
                        info!(execution_id = %handle, error = %failure, "Push subscription failed");
                    }
                    sender.send(TransportItem::Failed(failure)).await;
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "push"
    }
}

fn connection_error(e: impl std::fmt::Display) -> TransportFailure {
    TransportFailure::Connection(e.to_string())
}

async fn subscribe(
    ws_url: &str,
    handle: &ExecutionHandle,
    sender: &SubscriptionSender,
) -> Result<(), TransportFailure> {
    let (ws_stream, _) = connect_async(ws_url).await.map_err(connection_error)?;
    let (mut write, mut read) = ws_stream.split();
    debug!(execution_id = %handle, url = ws_url, "Connected to progress stream");

    let init_msg = json!({
        "type": "connection_init",
        "payload": {}
    });
    write
        .send(Message::Text(init_msg.to_string()))
        .await
        .map_err(connection_error)?;

    let subscription_id = uuid::Uuid::new_v4().to_string();
    let mut subscribed = false;

    while let Some(message) = read.next().await {
        if !sender.is_owner() {
            return Ok(());
        }

        let text = match message.map_err(connection_error)? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(TransportFailure::Closed),
            _ => continue,
        };

        match parse_frame(&text)? {
            WsFrame::Ack if !subscribed => {
                let subscribe_msg = json!({
                    "id": subscription_id,
                    "type": "subscribe",
                    "payload": {
                        "query": subscriptions::execution_progress(),
                        "variables": { "executionId": handle.as_str() }
                    }
                });
                write
                    .send(Message::Text(subscribe_msg.to_string()))
                    .await
                    .map_err(connection_error)?;
                subscribed = true;
            }
            WsFrame::Ping => {
                let pong = json!({ "type": "pong" });
                write
                    .send(Message::Text(pong.to_string()))
                    .await
                    .map_err(connection_error)?;
            }
            WsFrame::Next(progress) => {
                let terminal = progress.status.is_terminal();
                if !sender.send(TransportItem::Event(progress)).await || terminal {
                    let _ = write.close().await;
                    return Ok(());
                }
            }
            WsFrame::Error(message) => return Err(TransportFailure::Protocol(message)),
            WsFrame::Complete => return Err(TransportFailure::Closed),
            WsFrame::Ack | WsFrame::Other => {}
        }
    }

    Err(TransportFailure::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ExecutionStatus;

    #[test]
    fn test_parse_handshake_frames() {
        assert_eq!(parse_frame(r#"{"type":"connection_ack"}"#).unwrap(), WsFrame::Ack);
        assert_eq!(parse_frame(r#"{"type":"ping"}"#).unwrap(), WsFrame::Ping);
        assert_eq!(parse_frame(r#"{"id":"1","type":"complete"}"#).unwrap(), WsFrame::Complete);
        assert_eq!(parse_frame(r#"{"type":"ka"}"#).unwrap(), WsFrame::Other);
    }

    #[test]
    fn test_parse_next_frame() {
        let text = r#"{"id":"1","type":"next","payload":{"data":{"executionProgress":{
            "status":"running",
            "steps":[{"name":"s1","status":"running","progress":{"current":1,"total":4}}]
        }}}}"#;
        match parse_frame(text).unwrap() {
            WsFrame::Next(progress) => {
                assert_eq!(progress.status, ExecutionStatus::Running);
                assert_eq!(progress.steps[0].name, "s1");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_next_with_errors() {
        let text = r#"{"id":"1","type":"next","payload":{"errors":[{"message":"execution not found"}]}}"#;
        assert_eq!(
            parse_frame(text).unwrap(),
            WsFrame::Error("execution not found".to_string())
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_frame("not json"), Err(TransportFailure::Parse(_))));
        assert!(matches!(
            parse_frame(r#"{"type":"next","payload":{"data":{}}}"#),
            Err(TransportFailure::Parse(_))
        ));
    }
}
