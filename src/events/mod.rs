//! 正規化済みイベント（キャプション/メトリクス/アラート）
//!
//! - `CanonicalEvent` はワイヤ形式に依存しない1通知分のイベント
//! - 未型付けのJSONからの変換は `normalizer` だけが担当する
pub mod normalizer;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

pub use normalizer::normalize;

/// 信頼度の境界値（low < 0.45 <= medium < 0.75 <= high）
pub const MEDIUM_CONFIDENCE_THRESHOLD: f32 = 0.45;
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum CanonicalEvent {
    #[serde(rename = "caption.partial")]
    CaptionPartial(CaptionPayload),
    #[serde(rename = "caption.final")]
    CaptionFinal(CaptionPayload),
    #[serde(rename = "system.metrics")]
    SystemMetrics(SystemMetrics),
    #[serde(rename = "system.alert")]
    SystemAlert(SystemAlert),
}

impl CanonicalEvent {
    /// ワイヤ上のイベント名
    pub fn name(&self) -> &'static str {
        match self {
            Self::CaptionPartial(_) => "caption.partial",
            Self::CaptionFinal(_) => "caption.final",
            Self::SystemMetrics(_) => "system.metrics",
            Self::SystemAlert(_) => "system.alert",
        }
    }
}

/// 途中/確定キャプション共通のペイロード
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionPayload {
    pub text: String,
    pub timestamp: String,
    /// 常に [0, 1] にクランプ済み
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u64>,
    pub uncertain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_mode: Option<String>,
}

impl CaptionPayload {
    pub fn new(text: impl Into<String>, timestamp: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            timestamp: timestamp.into(),
            confidence: clamp_confidence(confidence),
            window_id: None,
            uncertain: false,
            source_mode: None,
        }
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_confidence(self.confidence)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemMetrics {
    pub fps: u32,
    pub latency_ms: u32,
    pub hands_detected: bool,
    pub queue_depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

impl AlertLevel {
    /// 自由記述の severity を対応付ける（error/warning 以外はすべて info）
    pub fn from_severity(severity: &str) -> Self {
        match severity.trim().to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemAlert {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: String,
}

impl SystemAlert {
    /// 現在時刻付きのアラート
    pub fn now(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: now_timestamp(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::now(AlertLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::now(AlertLevel::Warning, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence < MEDIUM_CONFIDENCE_THRESHOLD {
            Self::Low
        } else if confidence < HIGH_CONFIDENCE_THRESHOLD {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// 非有限値は 0、それ以外は [0, 1] にクランプ
pub fn clamp_confidence(value: f64) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

/// RFC 3339（UTC, ミリ秒）の現在時刻
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
