//! 翻訳バックエンドへのストリーム接続設定
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamConfig {
    /// WebSocketエンドポイント（例: ws://127.0.0.1:8000/ws/events）
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl StreamConfig {
    /// 有効なエンドポイント（空白のみは未設定扱い）
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = self.endpoint() {
            if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
                return Err(ConfigError::invalid(
                    "stream.endpoint",
                    format!("expected ws:// or wss:// url, got {endpoint}"),
                ));
            }
        }
        self.reconnect.validate()
    }
}

/// 再接続バックオフ: `min(max_ms, attempt * step_ms)`
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            step_ms: default_step_ms(),
            max_ms: default_max_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.step_ms == 0 {
            return Err(ConfigError::invalid("stream.reconnect.step_ms", "must be positive"));
        }
        if self.max_ms < self.step_ms {
            return Err(ConfigError::invalid(
                "stream.reconnect.max_ms",
                "must not be smaller than step_ms",
            ));
        }
        Ok(())
    }
}

fn default_step_ms() -> u64 {
    2_000
}

fn default_max_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_endpoint_counts_as_unset() {
        let config = StreamConfig {
            endpoint: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn http_endpoint_is_rejected() {
        let config = StreamConfig {
            endpoint: Some("http://localhost:8000/ws/events".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reconnect_defaults_apply_when_omitted() {
        let config: StreamConfig =
            serde_yaml::from_str("endpoint: ws://localhost:8000/ws/events\n").unwrap();
        assert_eq!(config.reconnect.step_ms, 2_000);
        assert_eq!(config.reconnect.max_ms, 10_000);
        assert_eq!(config.endpoint(), Some("ws://localhost:8000/ws/events"));
    }
}
