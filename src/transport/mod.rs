//! キャプションストリームのトランスポート層
//!
//! `CaptionTransport` は接続1本分の `TransportLink` を開くだけの最小インタフェース。
//! 受信フレームの解釈や再接続は `connection` モジュール側で行う。
mod error;
mod in_memory;
mod link;
mod websocket;

use async_trait::async_trait;

pub use error::TransportError;
pub use in_memory::{InMemoryPeer, InMemoryTransport};
pub use link::{TransportFrame, TransportLink};
pub use websocket::WebSocketTransport;

#[async_trait]
pub trait CaptionTransport: Send + Sync {
    /// エンドポイントへ接続し、受信フレームのストリームを返す
    async fn connect(&self, endpoint: &str) -> Result<TransportLink, TransportError>;
}
