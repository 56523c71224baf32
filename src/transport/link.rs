use tokio::sync::{mpsc, oneshot};

/// 受信したフレーム1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    Binary(Vec<u8>),
    /// トランスポートのエラー（この後ストリームは終了する想定）
    Error(String),
}

/// 接続1本分のハンドル
///
/// `next_frame` が `None` を返したら接続は閉じている。
/// `close` もしくは破棄で相手側にクローズを要求する。
#[derive(Debug)]
pub struct TransportLink {
    frames: mpsc::Receiver<TransportFrame>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl TransportLink {
    pub fn new(frames: mpsc::Receiver<TransportFrame>, close_tx: oneshot::Sender<()>) -> Self {
        Self {
            frames,
            close_tx: Some(close_tx),
        }
    }

    pub async fn next_frame(&mut self) -> Option<TransportFrame> {
        self.frames.recv().await
    }

    /// 複数回呼んでも安全
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_notifies_peer_once() {
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let (close_tx, close_rx) = oneshot::channel();
        let mut link = TransportLink::new(frame_rx, close_tx);

        frame_tx
            .send(TransportFrame::Text("{}".into()))
            .await
            .unwrap();
        assert_eq!(link.next_frame().await, Some(TransportFrame::Text("{}".into())));

        link.close();
        link.close();
        assert!(close_rx.await.is_ok());

        drop(frame_tx);
        assert_eq!(link.next_frame().await, None);
    }
}
