use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("session runtime has stopped")]
    RuntimeStopped,
}
