//! ワイヤ上のJSONを `CanonicalEvent` に正規化する
//!
//! 受け付けるエンベロープは2種類（バックエンドのバージョン差異を吸収）:
//!
//! - `{ "type": "...", "payload": {...} }`
//! - `{ "event": "...", "timestamp": "...", "payload": {...} }`
//!
//! どちらにも一致しない入力や未知のイベント名は `None`（黙って破棄）。
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    now_timestamp, AlertLevel, CanonicalEvent, CaptionPayload, SystemAlert, SystemMetrics,
};

const DEFAULT_COMPONENT: &str = "system";
const DEFAULT_REASON: &str = "unknown";

/// メトリクスのうちキュー長を合算するステージ
const QUEUE_STAGES: [&str; 3] = ["landmark", "windowing", "translation"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireEnvelope {
    Typed {
        #[serde(rename = "type")]
        kind: String,
        payload: Map<String, Value>,
    },
    Named {
        event: String,
        #[serde(default)]
        timestamp: Option<Value>,
        payload: Map<String, Value>,
    },
}

impl WireEnvelope {
    fn into_parts(self) -> (String, Option<String>, Map<String, Value>) {
        match self {
            Self::Typed { kind, payload } => (kind, None, payload),
            Self::Named {
                event,
                timestamp,
                payload,
            } => {
                let timestamp = timestamp
                    .as_ref()
                    .and_then(Value::as_str)
                    .filter(|ts| !ts.is_empty())
                    .map(String::from);
                (event, timestamp, payload)
            }
        }
    }
}

/// 任意のデコード済みペイロードを正規化（タイムスタンプ欠落時は現在時刻）
pub fn normalize(raw: &Value) -> Option<CanonicalEvent> {
    normalize_with_clock(raw, now_timestamp)
}

/// `normalize` の時計差し替え版
pub fn normalize_with_clock<F>(raw: &Value, now: F) -> Option<CanonicalEvent>
where
    F: FnOnce() -> String,
{
    if !raw.is_object() {
        return None;
    }
    let envelope = WireEnvelope::deserialize(raw).ok()?;
    let (name, envelope_ts, payload) = envelope.into_parts();

    match name.as_str() {
        "caption.partial" => Some(CanonicalEvent::CaptionPartial(caption(
            &payload,
            envelope_ts,
            now,
        ))),
        "caption.final" => Some(CanonicalEvent::CaptionFinal(caption(
            &payload,
            envelope_ts,
            now,
        ))),
        "system.metrics" => Some(CanonicalEvent::SystemMetrics(metrics(&payload))),
        "system.alert" => Some(CanonicalEvent::SystemAlert(alert(&payload, envelope_ts, now))),
        _ => None,
    }
}

fn caption<F>(payload: &Map<String, Value>, envelope_ts: Option<String>, now: F) -> CaptionPayload
where
    F: FnOnce() -> String,
{
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default();
    // created_at はバックエンドの翻訳結果が付与する生成時刻
    let timestamp = string_field(payload, "created_at")
        .or_else(|| string_field(payload, "timestamp"))
        .map(String::from)
        .or(envelope_ts)
        .unwrap_or_else(now);
    let confidence = number(payload.get("confidence")).unwrap_or(0.0);

    let mut caption = CaptionPayload::new(text, timestamp, confidence);
    caption.window_id = number(payload.get("window_id"))
        .filter(|id| *id >= 0.0)
        .map(|id| id.round() as u64);
    caption.uncertain = payload
        .get("uncertain")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    caption.source_mode = string_field(payload, "source_mode").map(String::from);
    caption
}

fn alert<F>(payload: &Map<String, Value>, envelope_ts: Option<String>, now: F) -> SystemAlert
where
    F: FnOnce() -> String,
{
    let level = payload
        .get("severity")
        .and_then(Value::as_str)
        .map(AlertLevel::from_severity)
        .unwrap_or(AlertLevel::Info);
    let component = string_field(payload, "component").unwrap_or(DEFAULT_COMPONENT);
    let reason = string_field(payload, "reason").unwrap_or(DEFAULT_REASON);
    let timestamp = string_field(payload, "timestamp")
        .map(String::from)
        .or(envelope_ts)
        .unwrap_or_else(now);

    SystemAlert {
        level,
        message: format!("{component}: {reason}"),
        timestamp,
    }
}

/// パイプラインの各ステージ（ingest/landmark/windowing/translation）から集約
///
/// ステージオブジェクトが1つも無い場合は正規形のフラットなペイロードとして読む。
fn metrics(payload: &Map<String, Value>) -> SystemMetrics {
    let ingest = stage(payload, "ingest");
    let landmark = stage(payload, "landmark");
    let translation = stage(payload, "translation");

    let has_stages = ["ingest", "landmark", "windowing", "translation"]
        .iter()
        .any(|name| stage(payload, name).is_some());
    if !has_stages {
        return flat_metrics(payload);
    }

    let fps = ingest
        .and_then(|s| number(s.get("effective_fps")))
        .unwrap_or(0.0);
    let latency = translation
        .and_then(|s| number(s.get("last_processing_ms")))
        .or_else(|| landmark.and_then(|s| number(s.get("last_processing_ms"))))
        .unwrap_or(0.0);
    let queue: f64 = QUEUE_STAGES
        .iter()
        .filter_map(|name| stage(payload, name))
        .map(|s| number(s.get("queue_size")).unwrap_or(0.0).max(0.0))
        .sum();

    SystemMetrics {
        fps: non_negative(fps),
        latency_ms: non_negative(latency),
        hands_detected: landmark.map(hands_detected).unwrap_or(false),
        queue_depth: non_negative(queue),
    }
}

/// 直近フレームのフラグを優先し、無ければ healthy かつ累計検出数 > 0
fn hands_detected(landmark: &Map<String, Value>) -> bool {
    if let Some(flag) = landmark.get("hands_detected").and_then(Value::as_bool) {
        return flag;
    }
    let healthy = landmark
        .get("healthy")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let frames_with_hands = number(landmark.get("frames_with_hands")).unwrap_or(0.0);
    healthy && frames_with_hands > 0.0
}

fn flat_metrics(payload: &Map<String, Value>) -> SystemMetrics {
    let field = |key: &str| non_negative(number(payload.get(key)).unwrap_or(0.0));
    SystemMetrics {
        fps: field("fps"),
        latency_ms: field("latency_ms"),
        hands_detected: payload
            .get("hands_detected")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        queue_depth: field("queue_depth"),
    }
}

fn stage<'a>(payload: &'a Map<String, Value>, name: &str) -> Option<&'a Map<String, Value>> {
    payload.get(name).and_then(Value::as_object)
}

fn string_field<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// 数値または数値文字列を有限の f64 として取り出す
fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn non_negative(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}
