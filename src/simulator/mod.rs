//! デモシミュレータ
//!
//! ライブ接続が無い場合の代替イベント生成器。トランスポートを使わずに
//! 一定間隔（既定 1300ms）で正規化済みイベントを生成し、ライブ接続と同じ
//! `SignalSink` 経路でランタイムへ渡します。
//!
//! 1ティックの流れ:
//! 1. 手の検出有無を抽選
//! 2. 必ず `system.metrics` を送る
//! 3. 未検出: 途中キャプションを破棄し warning アラート（フレーズは進めない）
//! 4. 検出: フレーズ前半の途中キャプション → 次のティックで確定キャプション → 次のフレーズへ
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::aggregator::ConnectionState;
use crate::config::{ConfidenceRange, IntRange, SimulatorConfig};
use crate::events::{now_timestamp, CanonicalEvent, CaptionPayload, SystemAlert, SystemMetrics};
use crate::producer::{
    ProducerHandle, ProducerKind, ProducerSignal, ShutdownSignal, SignalProducer, SignalSink,
};

pub const NO_HANDS_MESSAGE: &str = "No hands detected.";
pub const DEMO_STARTED_MESSAGE: &str = "Demo mode: simulated caption stream.";
pub const ELLIPSIS: &str = "...";

const DEMO_SOURCE_MODE: &str = "demo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Partial,
    Final,
}

/// ティックごとの出力を決める純粋な状態機械（乱数は注入）
#[derive(Debug)]
pub struct DemoScript {
    config: SimulatorConfig,
    phrases: Vec<String>,
    rng: StdRng,
    cursor: usize,
    phase: Phase,
}

impl DemoScript {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: SimulatorConfig, rng: StdRng) -> Self {
        let phrases = config
            .phrases
            .iter()
            .map(|phrase| phrase.trim())
            .filter(|phrase| !phrase.is_empty())
            .map(String::from)
            .collect();
        Self {
            config,
            phrases,
            rng,
            cursor: 0,
            phase: Phase::Partial,
        }
    }

    /// 現在のフレーズ位置
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn tick(&mut self) -> Vec<ProducerSignal> {
        let hands_detected = self.rng.random_bool(self.config.hands_probability);
        let metrics = SystemMetrics {
            fps: self.sample_int(self.config.fps),
            latency_ms: self.sample_int(self.config.latency_ms),
            hands_detected,
            queue_depth: self.sample_int(self.config.queue_depth),
        };
        let mut signals = vec![ProducerSignal::Event(CanonicalEvent::SystemMetrics(metrics))];

        if !hands_detected {
            signals.push(ProducerSignal::ResetPartial);
            signals.push(ProducerSignal::Event(CanonicalEvent::SystemAlert(
                SystemAlert::warning(NO_HANDS_MESSAGE),
            )));
            return signals;
        }

        let Some(phrase) = self.phrases.get(self.cursor).cloned() else {
            return signals;
        };
        let caption = match self.phase {
            Phase::Partial => {
                let confidence = self.sample_confidence(self.config.partial_confidence);
                self.phase = Phase::Final;
                CanonicalEvent::CaptionPartial(self.caption(
                    partial_text(&phrase, self.config.partial_ratio),
                    confidence,
                ))
            }
            Phase::Final => {
                let confidence = self.sample_confidence(self.config.final_confidence);
                // 途中結果と同じウィンドウIDを付けてからフレーズを進める
                let caption = self.caption(phrase, confidence);
                self.phase = Phase::Partial;
                self.cursor = (self.cursor + 1) % self.phrases.len();
                CanonicalEvent::CaptionFinal(caption)
            }
        };
        signals.push(ProducerSignal::Event(caption));
        signals
    }

    fn caption(&self, text: String, confidence: f32) -> CaptionPayload {
        let mut caption = CaptionPayload::new(text, now_timestamp(), f64::from(confidence));
        caption.window_id = Some(self.cursor as u64);
        caption.source_mode = Some(DEMO_SOURCE_MODE.to_string());
        caption
    }

    fn sample_int(&mut self, range: IntRange) -> u32 {
        self.rng.random_range(range.min..range.max)
    }

    fn sample_confidence(&mut self, range: ConfidenceRange) -> f32 {
        self.rng.random_range(range.min..range.max)
    }
}

/// フレーズ先頭から `ratio` 分の文字を取り、末尾に省略記号を付ける
pub fn partial_text(phrase: &str, ratio: f64) -> String {
    let total = phrase.chars().count();
    let take = ((total as f64) * ratio).round().max(1.0) as usize;
    let head: String = phrase.chars().take(take.min(total)).collect();
    format!("{}{}", head.trim_end(), ELLIPSIS)
}

pub struct DemoSimulator {
    config: SimulatorConfig,
    active: Option<ProducerHandle>,
}

impl DemoSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }
}

impl SignalProducer for DemoSimulator {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Demo
    }

    fn start(&mut self, sink: SignalSink) {
        if self.is_running() {
            return;
        }
        let config = self.config.clone();
        self.active = Some(ProducerHandle::spawn(move |shutdown| {
            run_simulation(config, sink, shutdown)
        }));
    }

    fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop();
            info!("demo simulator stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DemoSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_simulation(config: SimulatorConfig, sink: SignalSink, mut shutdown: ShutdownSignal) {
    let period = config.tick();
    let generation = sink.generation();
    let mut script = DemoScript::new(config);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(generation, tick_ms = period.as_millis() as u64, "demo simulator started");
    sink.connection(ConnectionState::Connected);
    sink.alert(SystemAlert::info(DEMO_STARTED_MESSAGE));

    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            _ = ticker.tick() => {
                for signal in script.tick() {
                    if !sink.send(signal) {
                        debug!(generation, "signal sink closed");
                        return;
                    }
                }
            }
        }
    }

    debug!(generation, "demo simulator finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(hands_probability: f64) -> DemoScript {
        let config = SimulatorConfig {
            hands_probability,
            phrases: vec!["Hello world".into(), "Good morning".into()],
            ..Default::default()
        };
        DemoScript::with_rng(config, StdRng::seed_from_u64(42))
    }

    fn caption_of(signals: &[ProducerSignal]) -> Option<&CanonicalEvent> {
        signals.iter().find_map(|signal| match signal {
            ProducerSignal::Event(
                event @ (CanonicalEvent::CaptionPartial(_) | CanonicalEvent::CaptionFinal(_)),
            ) => Some(event),
            _ => None,
        })
    }

    #[test]
    fn partial_text_takes_leading_share() {
        assert_eq!(partial_text("Hello world", 0.6), "Hello...");
        assert_eq!(partial_text("Hi", 0.6), "H...");
        assert_eq!(partial_text("A", 0.1), "A...");
    }

    #[test]
    fn phrases_alternate_partial_then_final_and_cycle() {
        let mut script = script(1.0);

        let first = script.tick();
        assert!(matches!(first[0], ProducerSignal::Event(CanonicalEvent::SystemMetrics(m)) if m.hands_detected));
        let partial_window = match caption_of(&first) {
            Some(CanonicalEvent::CaptionPartial(c)) => {
                assert_eq!(c.text, "Hello...");
                assert!((0.55..0.85).contains(&c.confidence));
                c.window_id
            }
            other => panic!("expected partial, got {other:?}"),
        };

        match caption_of(&script.tick()) {
            Some(CanonicalEvent::CaptionFinal(c)) => {
                assert_eq!(c.text, "Hello world");
                assert!((0.6..0.95).contains(&c.confidence));
                assert_eq!(c.window_id, partial_window);
            }
            other => panic!("expected final, got {other:?}"),
        }
        assert_eq!(script.cursor(), 1);

        script.tick();
        script.tick();
        assert_eq!(script.cursor(), 0, "phrase list is cyclic");
    }

    #[test]
    fn partial_and_final_share_window_id_across_wraparound() {
        let mut script = script(1.0);
        let mut windows = Vec::new();
        for _ in 0..6 {
            let signals = script.tick();
            match caption_of(&signals) {
                Some(CanonicalEvent::CaptionPartial(c)) | Some(CanonicalEvent::CaptionFinal(c)) => {
                    windows.push(c.window_id)
                }
                other => panic!("expected caption, got {other:?}"),
            }
        }
        assert_eq!(
            windows,
            vec![Some(0), Some(0), Some(1), Some(1), Some(0), Some(0)]
        );
    }

    #[test]
    fn no_hands_resets_partial_without_advancing() {
        let mut script = script(0.0);
        for _ in 0..5 {
            let signals = script.tick();
            assert_eq!(signals.len(), 3);
            assert_eq!(signals[1], ProducerSignal::ResetPartial);
            match &signals[2] {
                ProducerSignal::Event(CanonicalEvent::SystemAlert(alert)) => {
                    assert_eq!(alert.message, NO_HANDS_MESSAGE);
                }
                other => panic!("expected alert, got {other:?}"),
            }
        }
        assert_eq!(script.cursor(), 0);
    }

    #[test]
    fn metrics_stay_within_reference_ranges() {
        let mut script = script(0.92);
        for _ in 0..200 {
            let signals = script.tick();
            let ProducerSignal::Event(CanonicalEvent::SystemMetrics(metrics)) = &signals[0] else {
                panic!("metrics must lead every tick");
            };
            assert!((11..16).contains(&metrics.fps));
            assert!((1200..2300).contains(&metrics.latency_ms));
            assert!(metrics.queue_depth < 3);
        }
    }

    #[test]
    fn seeded_scripts_are_reproducible() {
        let texts = |mut s: DemoScript| -> Vec<String> {
            (0..20)
                .flat_map(|_| s.tick())
                .filter_map(|signal| match signal {
                    ProducerSignal::Event(CanonicalEvent::SystemMetrics(m)) => {
                        Some(format!("{}/{}", m.fps, m.latency_ms))
                    }
                    _ => None,
                })
                .collect()
        };
        assert_eq!(texts(script(0.5)), texts(script(0.5)));
    }
}
