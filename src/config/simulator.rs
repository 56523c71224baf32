//! デモシミュレータ設定
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// 手が検出される確率
    #[serde(default = "default_hands_probability")]
    pub hands_probability: f64,
    #[serde(default = "default_fps")]
    pub fps: IntRange,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: IntRange,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: IntRange,
    #[serde(default = "default_partial_confidence")]
    pub partial_confidence: ConfidenceRange,
    #[serde(default = "default_final_confidence")]
    pub final_confidence: ConfidenceRange,
    /// 途中結果として見せるフレーズの割合
    #[serde(default = "default_partial_ratio")]
    pub partial_ratio: f64,
    /// 指定時は再現可能な乱数列になる
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_phrases")]
    pub phrases: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            hands_probability: default_hands_probability(),
            fps: default_fps(),
            latency_ms: default_latency_ms(),
            queue_depth: default_queue_depth(),
            partial_confidence: default_partial_confidence(),
            final_confidence: default_final_confidence(),
            partial_ratio: default_partial_ratio(),
            seed: None,
            phrases: default_phrases(),
        }
    }
}

impl SimulatorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::invalid("simulator.tick_ms", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.hands_probability) {
            return Err(ConfigError::invalid(
                "simulator.hands_probability",
                "must be within [0, 1]",
            ));
        }
        if !(self.partial_ratio > 0.0 && self.partial_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "simulator.partial_ratio",
                "must be within (0, 1]",
            ));
        }
        self.fps.validate("simulator.fps")?;
        self.latency_ms.validate("simulator.latency_ms")?;
        self.queue_depth.validate("simulator.queue_depth")?;
        self.partial_confidence.validate("simulator.partial_confidence")?;
        self.final_confidence.validate("simulator.final_confidence")?;
        if self.phrases.iter().all(|phrase| phrase.trim().is_empty()) {
            return Err(ConfigError::invalid("simulator.phrases", "must not be empty"));
        }
        Ok(())
    }
}

/// 半開区間 `[min, max)` の整数レンジ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IntRange {
    pub min: u32,
    pub max: u32,
}

impl IntRange {
    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.min >= self.max {
            return Err(ConfigError::invalid(field, "min must be smaller than max"));
        }
        Ok(())
    }
}

/// 半開区間 `[min, max)` の信頼度レンジ（0..=1 の範囲内）
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConfidenceRange {
    pub min: f32,
    pub max: f32,
}

impl ConfidenceRange {
    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if !(0.0 <= self.min && self.min < self.max && self.max <= 1.0) {
            return Err(ConfigError::invalid(field, "expected 0 <= min < max <= 1"));
        }
        Ok(())
    }
}

fn default_tick_ms() -> u64 {
    1_300
}

fn default_hands_probability() -> f64 {
    0.92
}

fn default_fps() -> IntRange {
    IntRange { min: 11, max: 16 }
}

fn default_latency_ms() -> IntRange {
    IntRange {
        min: 1_200,
        max: 2_300,
    }
}

fn default_queue_depth() -> IntRange {
    IntRange { min: 0, max: 3 }
}

fn default_partial_confidence() -> ConfidenceRange {
    ConfidenceRange {
        min: 0.55,
        max: 0.85,
    }
}

fn default_final_confidence() -> ConfidenceRange {
    ConfidenceRange {
        min: 0.6,
        max: 0.95,
    }
}

fn default_partial_ratio() -> f64 {
    0.6
}

fn default_phrases() -> Vec<String> {
    [
        "Hello, nice to meet you.",
        "Where is the nearest train station?",
        "Thank you for waiting.",
        "Can you please repeat that more slowly?",
        "I would like a cup of coffee.",
        "See you again tomorrow.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
