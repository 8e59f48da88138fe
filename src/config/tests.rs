use super::settings::Settings;
use super::load_config_from;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.max_connections, 1000);
    assert_eq!(settings.server.handshake_timeout_ms, 10_000);
    assert!(!settings.relay.echo_to_sender);
    assert!(settings.relay.send_welcome);
    assert_eq!(settings.relay.send_timeout_ms, 5000);
    assert_eq!(settings.relay.outbound_buffer, 64);
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("absent");

    let cfg = temp_env::with_vars_unset(["RELAY_SERVER__PORT", "RELAY_RELAY__ECHO_TO_SENDER"], || {
        load_config_from(path.to_str().unwrap()).expect("load_config failed")
    });
    assert_eq!(cfg.server.port, 8080);
    assert!(!cfg.relay.echo_to_sender);
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("relay.toml");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000
        handshake_timeout_ms = 750

        [relay]
        echo_to_sender = true
        send_timeout_ms = 250
    "#;
    fs::write(&path, toml).expect("write config file");

    let cfg = load_config_from(path.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.server.max_connections, 1000);
    assert_eq!(cfg.server.handshake_timeout_ms, 750);
    assert!(cfg.relay.echo_to_sender);
    assert_eq!(cfg.relay.send_timeout_ms, 250);
    assert!(cfg.relay.send_welcome);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("relay.toml");
    fs::write(&path, "[server]\nport = 9000\n").expect("write config file");

    let cfg = temp_env::with_vars(
        [
            ("RELAY_SERVER__PORT", Some("9100")),
            ("RELAY_RELAY__SEND_WELCOME", Some("false")),
            ("RELAY_LOG__LEVEL", Some("debug")),
        ],
        || load_config_from(path.to_str().unwrap()).expect("load_config failed"),
    );
    assert_eq!(cfg.server.port, 9100);
    assert!(!cfg.relay.send_welcome);
    assert_eq!(cfg.log.level, "debug");
}
