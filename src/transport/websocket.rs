use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};

use super::{CaptionTransport, TransportError, TransportFrame, TransportLink};

const DEFAULT_FRAME_BUFFER: usize = 128;

/// tokio-tungstenite によるWebSocketトランスポート
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    frame_buffer: usize,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self {
            frame_buffer: DEFAULT_FRAME_BUFFER,
        }
    }
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaptionTransport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<TransportLink, TransportError> {
        let (ws, _response) =
            connect_async(endpoint)
                .await
                .map_err(|e| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                })?;
        info!(%endpoint, "websocket connected");

        let (frame_tx, frame_rx) = mpsc::channel(self.frame_buffer);
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(pump_frames(ws, frame_tx, close_rx));
        Ok(TransportLink::new(frame_rx, close_tx))
    }
}

/// 受信メッセージをフレームへ変換して転送。クローズ要求時は Close を送って終了
async fn pump_frames<S>(
    ws: WebSocketStream<S>,
    frame_tx: mpsc::Sender<TransportFrame>,
    mut close_rx: oneshot::Receiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_sender, mut ws_receiver) = ws.split();

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                debug!("closing websocket on request");
                if let Err(e) = ws_sender.send(Message::Close(None)).await {
                    debug!(error = %e, "websocket close frame not sent");
                }
                break;
            }
            message = ws_receiver.next() => {
                let frame = match message {
                    Some(Ok(Message::Text(text))) => TransportFrame::Text(text),
                    Some(Ok(Message::Binary(bytes))) => TransportFrame::Binary(bytes),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "websocket closed by peer");
                        break;
                    }
                    // ping/pong はライブラリ側で応答済み
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket error");
                        let _ = frame_tx.send(TransportFrame::Error(e.to_string())).await;
                        break;
                    }
                    None => break,
                };
                if frame_tx.send(frame).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!("websocket pump finished");
}
