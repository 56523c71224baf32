use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{CaptionTransport, TransportError, TransportFrame, TransportLink};

/// プロセス内で完結するトランスポート（テスト・デモ用）
///
/// `connect` のたびに新しい `InMemoryPeer` を払い出し、作成時に返した受信側へ届ける。
/// ピア側からフレームを送り、ピアを破棄すると接続が閉じたことになる。
#[derive(Debug)]
pub struct InMemoryTransport {
    peers: mpsc::UnboundedSender<InMemoryPeer>,
    refuse: AtomicBool,
    attempts: Mutex<Vec<String>>,
}

impl InMemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InMemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let transport = Self {
            peers,
            refuse: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
        };
        (transport, rx)
    }

    /// `true` の間は接続を拒否する
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// これまでの接続試行（拒否を含む）の数
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().map(|a| a.len()).unwrap_or_default()
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CaptionTransport for InMemoryTransport {
    async fn connect(&self, endpoint: &str) -> Result<TransportLink, TransportError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(endpoint.to_string());
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Refused {
                endpoint: endpoint.to_string(),
            });
        }

        let (frame_tx, frame_rx) = mpsc::channel(128);
        let (close_tx, close_rx) = oneshot::channel();
        let peer = InMemoryPeer {
            endpoint: endpoint.to_string(),
            frames: frame_tx,
            close_rx,
        };
        self.peers.send(peer).map_err(|_| TransportError::Closed)?;
        Ok(TransportLink::new(frame_rx, close_tx))
    }
}

/// 接続の相手側（サーバ役）
#[derive(Debug)]
pub struct InMemoryPeer {
    endpoint: String,
    frames: mpsc::Sender<TransportFrame>,
    close_rx: oneshot::Receiver<()>,
}

impl InMemoryPeer {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn send(&self, frame: TransportFrame) -> Result<(), TransportError> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(TransportFrame::Text(text.into())).await
    }

    /// クライアント側がクローズを要求する（またはリンクを破棄する）まで待機
    pub async fn closed_by_client(self) {
        let _ = self.close_rx.await;
    }

    /// サーバ側から切断する
    pub fn disconnect(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_frames_reach_link() {
        let (transport, mut peers) = InMemoryTransport::new();
        let mut link = transport.connect("ws://memory/events").await.unwrap();
        let peer = peers.recv().await.expect("peer");
        assert_eq!(peer.endpoint(), "ws://memory/events");

        peer.send_text("hello").await.unwrap();
        assert_eq!(link.next_frame().await, Some(TransportFrame::Text("hello".into())));

        peer.disconnect();
        assert_eq!(link.next_frame().await, None);
    }

    #[tokio::test]
    async fn refused_attempts_are_counted() {
        let (transport, _peers) = InMemoryTransport::new();
        transport.refuse_connections(true);
        assert!(transport.connect("ws://memory/a").await.is_err());
        transport.refuse_connections(false);
        assert!(transport.connect("ws://memory/b").await.is_ok());
        assert_eq!(transport.attempts(), vec!["ws://memory/a", "ws://memory/b"]);
    }
}
