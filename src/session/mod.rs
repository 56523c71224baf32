//! セッション制御
//!
//! `SessionController` はセッションランタイム（tokio タスク）を1つ起動し、
//! `StateAggregator` をそのタスクに専有させる。状態の変更はすべて
//! ランタイム上で直列に行われ、外部には `Arc<StateSnapshot>` だけを公開する。
//!
//! - 呼び出し側の操作（開始/一時停止/履歴クリア）はコマンドとして送り、反映完了を待つ
//! - 生成側（ライブ接続/デモシミュレータ）のシグナルは世代番号で検査し、
//!   現在の世代かつセッション有効時のみ反映する
//! - コントローラを破棄するとランタイムと生成側も停止する
mod error;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::aggregator::{StateAggregator, StateSnapshot};
use crate::config::ConfigSet;
use crate::connection::{ConnectionManager, ReconnectPolicy};
use crate::events::SystemAlert;
use crate::producer::{ProducerSignal, SignalProducer, SignalSink, TaggedSignal};
use crate::simulator::DemoSimulator;
use crate::transport::{CaptionTransport, WebSocketTransport};

pub use error::SessionError;

pub const NO_ENDPOINT_MESSAGE: &str = "No realtime endpoint configured.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Pause,
    ClearTranscript,
}

struct Request {
    command: Command,
    ack: oneshot::Sender<()>,
}

pub struct SessionController {
    commands: mpsc::UnboundedSender<Request>,
    snapshots: watch::Receiver<Arc<StateSnapshot>>,
    task: JoinHandle<()>,
}

impl SessionController {
    /// WebSocket トランスポートでコントローラを起動（tokio ランタイム内で呼ぶこと）
    pub fn new(config: ConfigSet) -> Result<Self, SessionError> {
        Self::with_transport(config, Arc::new(WebSocketTransport::new()))
    }

    pub fn with_transport(
        config: ConfigSet,
        transport: Arc<dyn CaptionTransport>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let runtime = SessionRuntime::new(config, transport, signal_tx);
        let snapshots = runtime.subscribe();
        let task = tokio::spawn(runtime.run(command_rx, signal_rx));

        Ok(Self {
            commands,
            snapshots,
            task,
        })
    }

    /// セッション開始。既に有効なら何もしない
    pub async fn start_session(&self) -> Result<(), SessionError> {
        self.request(Command::Start).await
    }

    /// 生成側を停止し、途中結果と接続状態を戻す（履歴/アラートは保持）
    pub async fn pause_session(&self) -> Result<(), SessionError> {
        self.request(Command::Pause).await
    }

    pub async fn clear_transcript(&self) -> Result<(), SessionError> {
        self.request(Command::ClearTranscript).await
    }

    /// 最新のスナップショット
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// 変更通知を受け取る受信側
    pub fn subscribe(&self) -> watch::Receiver<Arc<StateSnapshot>> {
        self.snapshots.clone()
    }

    /// 条件を満たすスナップショットが公開されるまで待機
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<Arc<StateSnapshot>, SessionError>
    where
        F: FnMut(&StateSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| SessionError::RuntimeStopped)?;
        Ok(snapshot.clone())
    }

    /// ランタイムを止めて終了を待つ
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!(error = %e, "session runtime ended abnormally");
        }
    }

    async fn request(&self, command: Command) -> Result<(), SessionError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Request { command, ack })
            .map_err(|_| SessionError::RuntimeStopped)?;
        done.await.map_err(|_| SessionError::RuntimeStopped)
    }
}

struct SessionRuntime {
    config: ConfigSet,
    transport: Arc<dyn CaptionTransport>,
    aggregator: StateAggregator,
    producer: Option<Box<dyn SignalProducer>>,
    generation: u64,
    signal_tx: mpsc::UnboundedSender<TaggedSignal>,
    snapshots: watch::Sender<Arc<StateSnapshot>>,
}

impl SessionRuntime {
    fn new(
        config: ConfigSet,
        transport: Arc<dyn CaptionTransport>,
        signal_tx: mpsc::UnboundedSender<TaggedSignal>,
    ) -> Self {
        let aggregator = StateAggregator::from_config(&config.session);
        let (snapshots, _) = watch::channel(Arc::new(aggregator.snapshot()));
        Self {
            config,
            transport,
            aggregator,
            producer: None,
            generation: 0,
            signal_tx,
            snapshots,
        }
    }

    fn subscribe(&self) -> watch::Receiver<Arc<StateSnapshot>> {
        self.snapshots.subscribe()
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Request>,
        mut signals: mpsc::UnboundedReceiver<TaggedSignal>,
    ) {
        loop {
            tokio::select! {
                biased;
                request = commands.recv() => {
                    let Some(Request { command, ack }) = request else {
                        break;
                    };
                    self.execute(command);
                    self.publish();
                    let _ = ack.send(());
                }
                Some(tagged) = signals.recv() => {
                    if self.apply(tagged) {
                        self.publish();
                    }
                }
            }
        }

        self.stop_producer();
        debug!(generation = self.generation, "session runtime finished");
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Pause => self.pause(),
            Command::ClearTranscript => {
                self.aggregator.clear_transcript();
                info!("transcript cleared");
            }
        }
    }

    fn start(&mut self) {
        if self.aggregator.session_active() {
            debug!(generation = self.generation, "session already active");
            return;
        }

        self.generation += 1;
        self.aggregator.begin_session();

        match self.select_producer() {
            Some(mut producer) => {
                producer.start(SignalSink::new(self.generation, self.signal_tx.clone()));
                info!(
                    generation = self.generation,
                    producer = ?producer.kind(),
                    "session started"
                );
                self.producer = Some(producer);
            }
            None => {
                warn!(generation = self.generation, "session started without realtime endpoint");
                self.aggregator
                    .push_alert(SystemAlert::warning(NO_ENDPOINT_MESSAGE));
            }
        }
    }

    fn select_producer(&self) -> Option<Box<dyn SignalProducer>> {
        let session = &self.config.session;
        if session.demo_mode {
            return Some(self.simulator());
        }
        match self.config.stream.endpoint() {
            Some(endpoint) => Some(Box::new(ConnectionManager::new(
                endpoint,
                self.transport.clone(),
                ReconnectPolicy::from(&self.config.stream.reconnect),
            ))),
            None if session.fallback_to_demo => Some(self.simulator()),
            None => None,
        }
    }

    fn simulator(&self) -> Box<dyn SignalProducer> {
        Box::new(DemoSimulator::new(self.config.simulator.clone()))
    }

    fn pause(&mut self) {
        self.stop_producer();
        // 停止前に送られたシグナルを無効化
        self.generation += 1;
        self.aggregator.end_session();
        info!(generation = self.generation, "session paused");
    }

    fn stop_producer(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
    }

    /// 反映した場合は `true`
    fn apply(&mut self, tagged: TaggedSignal) -> bool {
        if tagged.generation != self.generation || !self.aggregator.session_active() {
            trace!(
                generation = tagged.generation,
                current = self.generation,
                "stale producer signal dropped"
            );
            return false;
        }

        match tagged.signal {
            ProducerSignal::Event(event) => self.aggregator.handle(event),
            ProducerSignal::Connection(state) => {
                debug!(generation = self.generation, ?state, "connection state changed");
                self.aggregator.set_connection_state(state);
            }
            ProducerSignal::ResetPartial => self.aggregator.clear_partial(),
        }
        true
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(Arc::new(self.aggregator.snapshot()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ConnectionState;
    use crate::events::{CanonicalEvent, CaptionPayload};
    use crate::transport::InMemoryTransport;

    fn runtime(config: ConfigSet) -> SessionRuntime {
        let (transport, _peers) = InMemoryTransport::new();
        let (signal_tx, _signal_rx) = mpsc::unbounded_channel();
        SessionRuntime::new(config, Arc::new(transport), signal_tx)
    }

    fn partial(generation: u64) -> TaggedSignal {
        TaggedSignal {
            generation,
            signal: ProducerSignal::Event(CanonicalEvent::CaptionPartial(CaptionPayload::new(
                "Hel...",
                "2024-01-01T00:00:00Z",
                0.6,
            ))),
        }
    }

    #[tokio::test]
    async fn signals_from_previous_generation_are_ignored() {
        let mut runtime = runtime(ConfigSet::default());
        runtime.execute(Command::Start);
        let first = runtime.generation;
        runtime.execute(Command::Pause);
        runtime.execute(Command::Start);

        assert!(!runtime.apply(partial(first)));
        assert!(runtime.aggregator.snapshot().partial_caption.is_none());
        assert!(runtime.apply(partial(runtime.generation)));
        assert!(runtime.aggregator.snapshot().is_processing);
        runtime.stop_producer();
    }

    #[tokio::test]
    async fn signals_while_paused_are_ignored() {
        let mut runtime = runtime(ConfigSet::default());
        runtime.execute(Command::Start);
        runtime.execute(Command::Pause);
        let late = TaggedSignal {
            generation: runtime.generation,
            signal: ProducerSignal::Connection(ConnectionState::Connected),
        };
        assert!(!runtime.apply(late));
        assert_eq!(
            runtime.aggregator.connection_state(),
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn missing_endpoint_without_fallback_alerts_once() {
        let mut config = ConfigSet::default();
        config.session.fallback_to_demo = false;
        let mut runtime = runtime(config);

        runtime.execute(Command::Start);
        runtime.execute(Command::Start);

        let snapshot = runtime.aggregator.snapshot();
        assert!(snapshot.session_active);
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert_eq!(snapshot.alerts.len(), 1);
        assert_eq!(snapshot.alerts[0].message, NO_ENDPOINT_MESSAGE);
        assert!(runtime.producer.is_none());
    }

    #[tokio::test]
    async fn demo_mode_overrides_configured_endpoint() {
        let mut config = ConfigSet::default();
        config.stream.endpoint = Some("ws://127.0.0.1:9/ws/events".into());
        config.session.demo_mode = true;
        let mut runtime = runtime(config);

        runtime.execute(Command::Start);
        let kind = runtime.producer.as_ref().map(|p| p.kind());
        assert_eq!(kind, Some(crate::producer::ProducerKind::Demo));
        runtime.stop_producer();
    }
}
