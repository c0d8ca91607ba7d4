//! Loading session configuration from disk.

use std::io::Write;
use wxbridge_core::prelude::*;

#[test]
fn load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    writeln!(
        file,
        "fallback: disabled\nadapter:\n  asset_root: /srv/pkg\n  fuel_per_call: 100000"
    )
    .expect("Failed to write config");

    let config = SessionConfig::from_yaml_file(file.path()).expect("Failed to load config");
    assert_eq!(config.fallback, FallbackPolicy::Disabled);
    assert_eq!(config.adapter.fuel_per_call, Some(100_000));
    assert_eq!(
        config.adapter.resolve("/zigwasm.wasm"),
        std::path::PathBuf::from("/srv/pkg/zigwasm.wasm")
    );
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let err = SessionConfig::from_yaml_file(dir.path().join("absent.yaml")).unwrap_err();
    assert_eq!(err.code(), "E602");
    assert!(err.is_retriable());
}

#[test]
fn malformed_file_reports_path() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "load_timeout_ms: soon").expect("Failed to write config");

    let err = SessionConfig::from_yaml_file(file.path()).unwrap_err();
    assert_eq!(err.code(), "E601");
    assert!(err.to_string().contains(&file.path().display().to_string()));
}
