//! ライブ接続の管理（接続/受信/再接続/終了）
//!
//! 状態遷移は `Disconnected → Connected ⇄ Reconnecting`。
//!
//! - 接続成功: 試行回数を0に戻し、`Connected` と info アラートを1件送る
//! - 受信: JSONとして解釈できなければ warning アラート1件（接続状態は変えない）、
//!   正規化できないイベントは黙って捨てる
//! - トランスポートエラー: warning アラート1件（状態遷移はその後のクローズで行う）
//! - クローズ: `Reconnecting` に遷移し `min(10s, attempt * 2s)` 後に再接続
//!
//! 1セッションにつき同時に存在する接続試行・再接続タイマは最大1つ。
mod backoff;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::aggregator::ConnectionState;
use crate::events::{normalize, CanonicalEvent, SystemAlert};
use crate::producer::{
    ProducerHandle, ProducerKind, ShutdownSignal, SignalProducer, SignalSink,
};
use crate::transport::{CaptionTransport, TransportFrame, TransportLink};

pub use backoff::ReconnectPolicy;

pub const CONNECTED_MESSAGE: &str = "Connected to realtime stream.";
pub const MALFORMED_MESSAGE: &str = "Received malformed payload from realtime stream.";

/// 受信フレーム1件の解釈結果
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Event(CanonicalEvent),
    /// JSONとして解釈できない
    Malformed,
    /// JSONだが既知のイベントではない
    Unrecognized,
    TransportError(String),
}

/// フレームをデコードして正規化
pub fn interpret_frame(frame: TransportFrame) -> FrameOutcome {
    let parsed = match &frame {
        TransportFrame::Text(text) => serde_json::from_str::<Value>(text).ok(),
        TransportFrame::Binary(bytes) => serde_json::from_slice::<Value>(bytes).ok(),
        TransportFrame::Error(message) => return FrameOutcome::TransportError(message.clone()),
    };
    match parsed {
        None => FrameOutcome::Malformed,
        Some(value) => normalize(&value)
            .map(FrameOutcome::Event)
            .unwrap_or(FrameOutcome::Unrecognized),
    }
}

pub struct ConnectionManager {
    endpoint: String,
    transport: Arc<dyn CaptionTransport>,
    policy: ReconnectPolicy,
    active: Option<ProducerHandle>,
}

impl ConnectionManager {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn CaptionTransport>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            policy,
            active: None,
        }
    }
}

impl SignalProducer for ConnectionManager {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Live
    }

    fn start(&mut self, sink: SignalSink) {
        if self.is_running() {
            return;
        }
        let worker = LiveWorker {
            endpoint: self.endpoint.clone(),
            transport: self.transport.clone(),
            policy: self.policy,
            sink,
        };
        self.active = Some(ProducerHandle::spawn(move |shutdown| worker.run(shutdown)));
    }

    fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop();
            info!(endpoint = %self.endpoint, "connection manager stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LiveWorker {
    endpoint: String,
    transport: Arc<dyn CaptionTransport>,
    policy: ReconnectPolicy,
    sink: SignalSink,
}

impl LiveWorker {
    async fn run(self, mut shutdown: ShutdownSignal) {
        let generation = self.sink.generation();
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                _ = shutdown.triggered() => break,
                result = self.transport.connect(&self.endpoint) => result,
            };

            match connected {
                Ok(mut link) => {
                    attempt = 0;
                    info!(endpoint = %self.endpoint, generation, "caption stream connected");
                    self.sink.connection(ConnectionState::Connected);
                    self.sink.alert(SystemAlert::info(CONNECTED_MESSAGE));

                    let stopped = self.receive(&mut link, &mut shutdown).await;
                    link.close();
                    if stopped {
                        break;
                    }
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "caption stream connect failed");
                    self.sink
                        .alert(SystemAlert::warning(format!("Realtime transport error: {e}")));
                }
            }

            if shutdown.is_triggered() {
                break;
            }

            attempt = attempt.saturating_add(1);
            let delay = self.policy.delay(attempt);
            self.sink.connection(ConnectionState::Reconnecting);
            info!(
                endpoint = %self.endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "caption stream closed, reconnect scheduled"
            );

            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(endpoint = %self.endpoint, generation, "live worker finished");
    }

    /// 接続が閉じるまで受信を続ける。停止要求で抜けた場合は `true`
    async fn receive(&self, link: &mut TransportLink, shutdown: &mut ShutdownSignal) -> bool {
        loop {
            let frame = tokio::select! {
                _ = shutdown.triggered() => return true,
                frame = link.next_frame() => frame,
            };
            let Some(frame) = frame else {
                return false;
            };

            match interpret_frame(frame) {
                FrameOutcome::Event(event) => {
                    trace!(endpoint = %self.endpoint, event = event.name(), "event received");
                    if !self.sink.event(event) {
                        return true;
                    }
                }
                FrameOutcome::Malformed => {
                    warn!(endpoint = %self.endpoint, "malformed payload dropped");
                    self.sink.alert(SystemAlert::warning(MALFORMED_MESSAGE));
                }
                FrameOutcome::Unrecognized => {
                    debug!(endpoint = %self.endpoint, "unrecognized event dropped");
                }
                FrameOutcome::TransportError(message) => {
                    warn!(endpoint = %self.endpoint, error = %message, "transport error");
                    self.sink.alert(SystemAlert::warning(format!(
                        "Realtime transport error: {message}"
                    )));
                }
            }
        }
    }
}
