use super::*;

// Env overrides are process-global; these tests only assert on fields that
// have no ROLODEX_* override.

#[test]
fn test_read_config_missing_file_returns_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let config = read_config(Some(&path)).unwrap();
    assert_eq!(config.gemini.model, "gemini-2.0-flash");
    assert_eq!(config.channel, "telegram");
}

#[test]
fn test_read_config_minimal_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"gateway": {"port": 9090}}"#).unwrap();
    let config = read_config(Some(&path)).unwrap();
    assert_eq!(config.gateway.port, 9090);
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert_eq!(config.conversation.batch_window_secs, 5);
}

#[test]
fn test_read_config_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{not json").unwrap();
    let err = read_config(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config JSON"));
}

#[test]
fn test_read_config_rejects_bad_structure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"channel": "pigeon"}"#).unwrap();
    assert!(read_config(Some(&path)).is_err());
}

#[test]
fn test_load_config_full_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "channel": "sms",
            "twilio": {"accountSid": "AC1", "authToken": "tok", "phoneNumber": "+15550001111"},
            "gemini": {"apiKey": "key"},
            "sweep": {"schedule": "0 9 * * *"}
        }"#,
    )
    .unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.twilio.phone_number, "+15550001111");
    assert_eq!(config.sweep.schedule.as_deref(), Some("0 9 * * *"));
}

#[cfg(unix)]
#[test]
fn test_permissive_config_still_loads() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{}").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
    assert!(read_config(Some(&path)).is_ok());
}
