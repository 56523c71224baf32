use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// エンドポイントの有無に関係なくデモシミュレータを使う
    #[serde(default)]
    pub demo_mode: bool,
    /// エンドポイント未設定時にシミュレータへフォールバックするか
    #[serde(default = "default_true")]
    pub fallback_to_demo: bool,
    #[serde(default = "default_transcript_limit")]
    pub transcript_limit: usize,
    #[serde(default = "default_alert_limit")]
    pub alert_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            demo_mode: false,
            fallback_to_demo: true,
            transcript_limit: default_transcript_limit(),
            alert_limit: default_alert_limit(),
        }
    }
}

impl SessionConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.transcript_limit == 0 {
            return Err(ConfigError::invalid("session.transcript_limit", "must be positive"));
        }
        if self.alert_limit == 0 {
            return Err(ConfigError::invalid("session.alert_limit", "must be positive"));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_transcript_limit() -> usize {
    200
}

fn default_alert_limit() -> usize {
    20
}
