use std::fs;
use std::path::{Path, PathBuf};

use caption_realtime_client::config::{ConfigError, ConfigSet, CONFIG_DIR_ENV, ENDPOINT_ENV};

const CONFIG_FILES: [&str; 3] = ["stream.yaml", "session.yaml", "simulator.yaml"];

fn copy_default_config_to(dest: &Path) {
    fs::create_dir_all(dest).expect("create temp config dir");
    let src = PathBuf::from("config");
    for name in CONFIG_FILES {
        let from = src.join(name);
        let to = dest.join(name);
        fs::copy(&from, &to).unwrap_or_else(|e| panic!("copy {:?} -> {:?}: {}", from, to, e));
    }
}

fn temp_config_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("caption_cfg_{}", uuid::Uuid::new_v4()));
    copy_default_config_to(&dir);
    dir
}

#[test]
fn bundled_config_matches_reference_values() {
    let cfg = ConfigSet::load_from_dir("config").expect("load bundled config");
    assert_eq!(cfg.stream.endpoint(), Some("ws://127.0.0.1:8000/ws/events"));
    assert_eq!(cfg.stream.reconnect.step_ms, 2_000);
    assert_eq!(cfg.stream.reconnect.max_ms, 10_000);
    assert_eq!(cfg.simulator.tick_ms, 1_300);
    assert_eq!(cfg.simulator.phrases.len(), 6);
    assert_eq!(cfg.session.transcript_limit, 200);
    assert_eq!(cfg.session.alert_limit, 20);
    assert!(cfg.session.fallback_to_demo);
}

#[test]
fn loads_config_and_endpoint_from_env() {
    let tmp = temp_config_dir();
    std::env::set_var(CONFIG_DIR_ENV, &tmp);
    std::env::set_var(ENDPOINT_ENV, "wss://captions.example.com/ws/events");

    let cfg = ConfigSet::load_from_env().expect("load config from env");
    assert_eq!(cfg.root(), tmp.as_path());
    assert_eq!(
        cfg.stream.endpoint(),
        Some("wss://captions.example.com/ws/events")
    );

    std::env::set_var(ENDPOINT_ENV, "   ");
    let cfg = ConfigSet::load_from_env().expect("blank endpoint is allowed");
    assert_eq!(cfg.stream.endpoint(), None);

    std::env::set_var(ENDPOINT_ENV, "http://captions.example.com");
    let err = ConfigSet::load_from_env().unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "stream.endpoint", .. }));

    std::env::remove_var(ENDPOINT_ENV);
    std::env::remove_var(CONFIG_DIR_ENV);
    let _ = fs::remove_dir_all(tmp);
}

#[test]
fn missing_file_is_an_io_error() {
    let tmp = temp_config_dir();
    fs::remove_file(tmp.join("simulator.yaml")).unwrap();
    let err = ConfigSet::load_from_dir(&tmp).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    let _ = fs::remove_dir_all(tmp);
}

#[test]
fn invalid_values_are_rejected() {
    let tmp = temp_config_dir();
    fs::write(tmp.join("stream.yaml"), "reconnect:\n  step_ms: 0\n  max_ms: 10\n").unwrap();
    let err = ConfigSet::load_from_dir(&tmp).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));

    fs::write(tmp.join("stream.yaml"), "reconnect: [1, 2]\n").unwrap();
    let err = ConfigSet::load_from_dir(&tmp).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    let _ = fs::remove_dir_all(tmp);
}
