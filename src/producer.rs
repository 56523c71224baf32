//! イベント生成側（ライブ接続/デモシミュレータ）とセッションランタイムの接点
//!
//! - 生成側は `SignalSink` 経由で `ProducerSignal` を送るだけで、状態には触れない
//! - 各シグナルには生成側の起動時に払い出された世代番号が付く。
//!   ランタイムは現在の世代以外を捨てるので、停止後に届いた遅延コールバックは無効になる
//! - 停止要求は `ShutdownSignal` で伝える（再接続待ちやティック待ちを即座に中断）
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::aggregator::ConnectionState;
use crate::events::{CanonicalEvent, SystemAlert};

/// 生成側からランタイムへ渡す1件分の出力
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerSignal {
    Event(CanonicalEvent),
    Connection(ConnectionState),
    /// 途中キャプションの破棄（手が検出されなくなった等）
    ResetPartial,
}

/// 世代番号付きのシグナル
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedSignal {
    pub generation: u64,
    pub signal: ProducerSignal,
}

#[derive(Debug, Clone)]
pub struct SignalSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedSignal>,
}

impl SignalSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedSignal>) -> Self {
        Self { generation, tx }
    }

    /// 単体テスト等で使う受信側付きのシンク
    pub fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<TaggedSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(generation, tx), rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 受信側が居なくなっていれば `false`
    pub fn send(&self, signal: ProducerSignal) -> bool {
        self.tx
            .send(TaggedSignal {
                generation: self.generation,
                signal,
            })
            .is_ok()
    }

    pub fn event(&self, event: CanonicalEvent) -> bool {
        self.send(ProducerSignal::Event(event))
    }

    pub fn alert(&self, alert: SystemAlert) -> bool {
        self.event(CanonicalEvent::SystemAlert(alert))
    }

    pub fn connection(&self, state: ConnectionState) -> bool {
        self.send(ProducerSignal::Connection(state))
    }
}

/// 停止要求の受信側
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// 停止要求（または送信側の破棄）まで待機
    pub async fn triggered(&mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
    Live,
    Demo,
}

/// 起動済みタスクのハンドル。破棄時にも停止要求を出す
#[derive(Debug)]
pub struct ProducerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProducerHandle {
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(run(ShutdownSignal(rx)));
        Self { shutdown, task }
    }

    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// ライブ接続とデモシミュレータ共通のインタフェース
pub trait SignalProducer: Send {
    fn kind(&self) -> ProducerKind;

    /// 起動済みなら何もしない
    fn start(&mut self, sink: SignalSink);

    /// 複数回呼んでも安全
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}
