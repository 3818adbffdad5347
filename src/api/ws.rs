// src/api/ws.rs — Duplex WebSocket endpoint
//
// The socket is split: a reader task feeds user messages to the supervisor and
// cancels the task when the client goes away; a writer task drains outbound
// frames. The supervisor only sees an mpsc receiver and a content sink.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::types::ServerMessage;
use crate::api::ApiState;
use crate::core::{ContentFragment, ContentSink};
use crate::core::relay::SinkClosed;

const INBOUND_BUFFER: usize = 16;
const OUTBOUND_BUFFER: usize = 64;

/// Forwards content fragments as `text` frames.
pub struct FrameSink {
    tx: mpsc::Sender<ServerMessage>,
}

impl FrameSink {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ContentSink for FrameSink {
    async fn send(&mut self, fragment: ContentFragment) -> Result<(), SinkClosed> {
        self.tx
            .send(ServerMessage::from(fragment))
            .await
            .map_err(|_| SinkClosed)
    }
}

/// GET /ws/:task_id — Upgrade to a bidirectional agent session.
pub async fn ws_agent(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, task_id))
}

async fn handle_socket(socket: WebSocket, state: ApiState, task_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let cancel = CancellationToken::new();
    let (in_tx, mut in_rx) = mpsc::channel::<String>(INBOUND_BUFFER);
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if in_tx.send(text.as_str().to_string()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        reader_cancel.cancel();
    });

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("Failed to encode frame: {e}");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                writer_cancel.cancel();
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let description = format!("WebSocket session for task {task_id}");
    let mut sink = FrameSink::new(out_tx.clone());
    let report = state
        .supervisor
        .run_duplex(&task_id, Some(&description), &mut in_rx, &mut sink, cancel.clone())
        .await;

    // Session is already ended; the error frame is best effort
    if let Err(e) = report.into_result() {
        let _ = out_tx
            .send(ServerMessage::Error {
                content: e.to_string(),
            })
            .await;
    }

    drop(sink);
    drop(out_tx);
    let _ = writer.await;
    reader.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_sink_wraps_fragments() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = FrameSink::new(tx);
        sink.send(ContentFragment {
            agent: "a".into(),
            content: "c".into(),
        })
        .await
        .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Text {
                content: "c".into(),
                agent: "a".into()
            }
        );
    }

    #[tokio::test]
    async fn test_frame_sink_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = FrameSink::new(tx);
        let result = sink
            .send(ContentFragment {
                agent: "a".into(),
                content: "c".into(),
            })
            .await;
        assert_eq!(result, Err(SinkClosed));
    }
}
