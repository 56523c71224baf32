//! 設定モジュール（YAML 読み込み）
//!
//! `ConfigSet` は設定ディレクトリ配下の複数YAMLファイルを読み込み、
//! キャプションストリームクライアントの実行に必要な値を型安全に提供します。
mod error;
mod session;
mod simulator;
mod stream;

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

pub use error::ConfigError;
pub use session::*;
pub use simulator::*;
pub use stream::*;

/// 設定ディレクトリを指す環境変数名
pub const CONFIG_DIR_ENV: &str = "CAPTION_REALTIME_CONFIG_DIR";

/// 接続先エンドポイントを上書きする環境変数名（空文字なら未設定扱い）
pub const ENDPOINT_ENV: &str = "CAPTION_REALTIME_ENDPOINT";

/// すべての設定をひとまとめにした構造体
#[derive(Debug, Clone)]
pub struct ConfigSet {
    pub stream: StreamConfig,
    pub session: SessionConfig,
    pub simulator: SimulatorConfig,
    root: PathBuf,
}

impl Default for ConfigSet {
    /// 組み込みの参照値（エンドポイント未設定 = デモシミュレータ）
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            session: SessionConfig::default(),
            simulator: SimulatorConfig::default(),
            root: PathBuf::new(),
        }
    }
}

impl ConfigSet {
    /// ルートディレクトリから各YAMLを読み込み
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot(root));
        }

        let stream = load_yaml(root.join("stream.yaml"))?;
        let session = load_yaml(root.join("session.yaml"))?;
        let simulator = load_yaml(root.join("simulator.yaml"))?;

        let config = Self {
            stream,
            session,
            simulator,
            root,
        };
        config.validate()?;
        Ok(config)
    }

    /// 環境変数（未設定時は `config/`）から設定を読み込み
    ///
    /// `CAPTION_REALTIME_ENDPOINT` が設定されていればエンドポイントを上書きする。
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var(CONFIG_DIR_ENV).unwrap_or_else(|_| "config".to_string());
        let mut config = Self::load_from_dir(dir)?;
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            config.stream.endpoint = Some(endpoint);
            config.validate()?;
        }
        Ok(config)
    }

    /// 設定ルートのパス（デバッグ等に利用）
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 値の整合性チェック
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        self.session.validate()?;
        self.simulator.validate()?;
        Ok(())
    }
}

/// YAMLファイルを読み込み、型 `T` へデシリアライズ
fn load_yaml<T>(path: PathBuf) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let data = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse { path, source })
}
