//! UI 向けの集約状態
//!
//! `StateAggregator` は正規化済みイベントを受け取り、現在のキャプション・途中結果・
//! 履歴・メトリクス・アラートを保持します。外部には `StateSnapshot`
//! （不変のコピー）だけを公開します。
//!
//! - 履歴とアラートは新しい順、上限超過時は古いものから黙って捨てる
//! - 一時停止では履歴/アラートを消さない（消すのは `clear_transcript` のみ）
use std::collections::VecDeque;

use serde::{Serialize, Serializer};

use crate::config::SessionConfig;
use crate::events::{
    AlertLevel, CanonicalEvent, CaptionPayload, ConfidenceLevel, SystemAlert, SystemMetrics,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    #[default]
    Disconnected,
}

/// 取り込み時にIDと信頼度レベルを付与したキャプション
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionEntry {
    pub id: String,
    pub text: String,
    pub timestamp: String,
    pub confidence: f32,
    pub confidence_level: ConfidenceLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u64>,
    pub uncertain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_mode: Option<String>,
}

impl From<CaptionPayload> for CaptionEntry {
    fn from(payload: CaptionPayload) -> Self {
        let confidence_level = payload.confidence_level();
        Self {
            id: next_id(),
            text: payload.text,
            timestamp: payload.timestamp,
            confidence: payload.confidence,
            confidence_level,
            window_id: payload.window_id,
            uncertain: payload.uncertain,
            source_mode: payload.source_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEntry {
    pub id: String,
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: String,
}

impl From<SystemAlert> for AlertEntry {
    fn from(alert: SystemAlert) -> Self {
        Self {
            id: next_id(),
            level: alert.level,
            message: alert.message,
            timestamp: alert.timestamp,
        }
    }
}

/// 外部に公開する不変スナップショット
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub connection_state: ConnectionState,
    pub current_caption: Option<CaptionEntry>,
    pub partial_caption: Option<CaptionEntry>,
    pub transcript: Vec<CaptionEntry>,
    #[serde(serialize_with = "serialize_metrics")]
    pub metrics: SystemMetrics,
    pub alerts: Vec<AlertEntry>,
    pub is_processing: bool,
    pub session_active: bool,
}

/// スナップショット上のメトリクス表現（イベントのペイロードはワイヤ名のまま）
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsView {
    fps: u32,
    latency_ms: u32,
    hands_detected: bool,
    queue_depth: u32,
}

fn serialize_metrics<S>(metrics: &SystemMetrics, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    MetricsView {
        fps: metrics.fps,
        latency_ms: metrics.latency_ms,
        hands_detected: metrics.hands_detected,
        queue_depth: metrics.queue_depth,
    }
    .serialize(serializer)
}

#[derive(Debug, Clone)]
pub struct StateAggregator {
    current_caption: Option<CaptionEntry>,
    partial_caption: Option<CaptionEntry>,
    transcript: VecDeque<CaptionEntry>,
    alerts: VecDeque<AlertEntry>,
    metrics: SystemMetrics,
    is_processing: bool,
    connection_state: ConnectionState,
    session_active: bool,
    transcript_limit: usize,
    alert_limit: usize,
}

impl Default for StateAggregator {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl StateAggregator {
    pub fn new(transcript_limit: usize, alert_limit: usize) -> Self {
        Self {
            current_caption: None,
            partial_caption: None,
            transcript: VecDeque::with_capacity(transcript_limit),
            alerts: VecDeque::with_capacity(alert_limit),
            metrics: SystemMetrics::default(),
            is_processing: false,
            connection_state: ConnectionState::Disconnected,
            session_active: false,
            transcript_limit: transcript_limit.max(1),
            alert_limit: alert_limit.max(1),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.transcript_limit, config.alert_limit)
    }

    /// イベント1件を状態に反映
    pub fn handle(&mut self, event: CanonicalEvent) {
        match event {
            CanonicalEvent::CaptionPartial(payload) => {
                self.partial_caption = Some(CaptionEntry::from(payload));
                self.is_processing = true;
            }
            CanonicalEvent::CaptionFinal(payload) => {
                let entry = CaptionEntry::from(payload);
                self.partial_caption = None;
                self.transcript.push_front(entry.clone());
                self.transcript.truncate(self.transcript_limit);
                self.current_caption = Some(entry);
                self.is_processing = false;
            }
            CanonicalEvent::SystemMetrics(metrics) => {
                self.metrics = metrics;
            }
            CanonicalEvent::SystemAlert(alert) => self.push_alert(alert),
        }
    }

    pub fn push_alert(&mut self, alert: SystemAlert) {
        self.alerts.push_front(AlertEntry::from(alert));
        self.alerts.truncate(self.alert_limit);
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
    }

    /// 途中結果を破棄して処理中フラグを下ろす
    pub fn clear_partial(&mut self) {
        self.partial_caption = None;
        self.is_processing = false;
    }

    pub fn begin_session(&mut self) {
        self.session_active = true;
    }

    /// 一時停止: 一時的な状態だけを戻し、履歴とアラートは残す
    pub fn end_session(&mut self) {
        self.session_active = false;
        self.connection_state = ConnectionState::Disconnected;
        self.clear_partial();
    }

    /// 履歴と現在/途中キャプションを消去（接続状態とアラートはそのまま）
    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
        self.current_caption = None;
        self.clear_partial();
    }

    pub fn session_active(&self) -> bool {
        self.session_active
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            connection_state: self.connection_state,
            current_caption: self.current_caption.clone(),
            partial_caption: self.partial_caption.clone(),
            transcript: self.transcript.iter().cloned().collect(),
            metrics: self.metrics,
            alerts: self.alerts.iter().cloned().collect(),
            is_processing: self.is_processing,
            session_active: self.session_active,
        }
    }
}

fn next_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption(text: &str, confidence: f64) -> CaptionPayload {
        CaptionPayload::new(text, "2024-01-01T00:00:00Z", confidence)
    }

    #[test]
    fn partial_then_final_settles_caption_state() {
        let mut state = StateAggregator::default();
        state.handle(CanonicalEvent::CaptionPartial(caption("Hel...", 0.6)));
        let snap = state.snapshot();
        assert!(snap.is_processing);
        assert_eq!(snap.partial_caption.as_ref().map(|c| c.text.as_str()), Some("Hel..."));
        assert!(snap.current_caption.is_none());

        state.handle(CanonicalEvent::CaptionFinal(caption("Hello", 0.9)));
        let snap = state.snapshot();
        assert!(snap.partial_caption.is_none());
        assert!(!snap.is_processing);
        let current = snap.current_caption.expect("current caption");
        assert_eq!(current.text, "Hello");
        assert_eq!(current.confidence_level, ConfidenceLevel::High);
        assert_eq!(snap.transcript.first(), Some(&current));
    }

    #[test]
    fn metrics_between_partial_and_final_do_not_touch_captions() {
        let mut state = StateAggregator::default();
        state.handle(CanonicalEvent::CaptionPartial(caption("Wh...", 0.5)));
        state.handle(CanonicalEvent::SystemMetrics(SystemMetrics {
            fps: 12,
            latency_ms: 900,
            hands_detected: true,
            queue_depth: 1,
        }));
        let snap = state.snapshot();
        assert!(snap.is_processing);
        assert!(snap.partial_caption.is_some());
        assert_eq!(snap.metrics.fps, 12);
    }

    #[test]
    fn transcript_and_alerts_are_bounded_newest_first() {
        let mut state = StateAggregator::new(200, 20);
        for i in 0..250 {
            state.handle(CanonicalEvent::CaptionFinal(caption(&format!("line {i}"), 0.8)));
            state.push_alert(SystemAlert::info(format!("alert {i}")));
        }
        let snap = state.snapshot();
        assert_eq!(snap.transcript.len(), 200);
        assert_eq!(snap.alerts.len(), 20);
        assert_eq!(snap.transcript[0].text, "line 249");
        assert_eq!(snap.transcript[199].text, "line 50");
        assert_eq!(snap.alerts[0].message, "alert 249");
    }

    #[test]
    fn end_session_keeps_history() {
        let mut state = StateAggregator::default();
        state.begin_session();
        state.set_connection_state(ConnectionState::Connected);
        state.handle(CanonicalEvent::CaptionFinal(caption("kept", 0.7)));
        state.push_alert(SystemAlert::warning("kept alert"));
        state.handle(CanonicalEvent::CaptionPartial(caption("drop...", 0.7)));

        state.end_session();
        let snap = state.snapshot();
        assert!(!snap.session_active);
        assert_eq!(snap.connection_state, ConnectionState::Disconnected);
        assert!(snap.partial_caption.is_none());
        assert!(!snap.is_processing);
        assert_eq!(snap.transcript.len(), 1);
        assert_eq!(snap.alerts.len(), 1);
        assert_eq!(snap.current_caption.map(|c| c.text), Some("kept".to_string()));
    }

    #[test]
    fn clear_transcript_keeps_alerts_and_connection() {
        let mut state = StateAggregator::default();
        state.set_connection_state(ConnectionState::Reconnecting);
        state.handle(CanonicalEvent::CaptionFinal(caption("gone", 0.7)));
        state.handle(CanonicalEvent::CaptionPartial(caption("go...", 0.7)));
        state.push_alert(SystemAlert::info("stays"));

        state.clear_transcript();
        let snap = state.snapshot();
        assert!(snap.transcript.is_empty());
        assert!(snap.current_caption.is_none());
        assert!(snap.partial_caption.is_none());
        assert!(!snap.is_processing);
        assert_eq!(snap.alerts.len(), 1);
        assert_eq!(snap.connection_state, ConnectionState::Reconnecting);
    }

    #[test]
    fn entry_ids_are_unique() {
        let a = CaptionEntry::from(caption("a", 0.1));
        let b = CaptionEntry::from(caption("a", 0.1));
        assert_ne!(a.id, b.id);
        assert_eq!(a.confidence_level, ConfidenceLevel::Low);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(StateAggregator::default().snapshot()).unwrap();
        assert_eq!(json["connectionState"], "disconnected");
        assert_eq!(json["isProcessing"], false);
        assert_eq!(json["metrics"]["queueDepth"], 0);
        assert_eq!(json["metrics"]["latencyMs"], 0);
        assert_eq!(json["metrics"]["handsDetected"], false);
        assert!(json["metrics"].get("queue_depth").is_none());
    }
}
