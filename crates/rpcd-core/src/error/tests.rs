//! Unit tests for registry and shell error types.

use std::sync::Arc;

use rstest::rstest;

use super::*;

#[rstest]
#[case::missing(
    RegistryError::MissingDirectory { path: "/srv/rpc".into() },
    "/srv/rpc"
)]
#[case::no_handlers(
    RegistryError::NoHandlers { path: "/srv/empty".into() },
    "/srv/empty"
)]
#[case::init(
    RegistryError::InitFailed { module: "echo".into(), path: "/srv/rpc/echo.so".into() },
    "/srv/rpc/echo.so"
)]
fn registry_errors_name_the_path(#[case] error: RegistryError, #[case] expected: &str) {
    let message = error.to_string();
    assert!(message.contains(expected), "expected {expected} in {message}");
}

#[test]
fn api_tag_mismatch_renders_hex_tags() {
    let error = LoadError::ApiTagMismatch {
        stem: "legacy".into(),
        found: 0x1337_0002,
        expected: 0x1337_0003,
    };
    let message = error.to_string();
    assert!(message.contains("0x13370002"), "got {message}");
    assert!(message.contains("0x13370003"), "got {message}");
}

#[test]
fn spawn_error_keeps_os_context() {
    let error = ShellError::Spawn {
        program: "/srv/rpc/missing.sh".into(),
        source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
    };
    assert!(error.to_string().contains("missing.sh"));
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn timeout_reports_budget() {
    let error = ShellError::Timeout {
        program: "/srv/rpc/slow.sh".into(),
        timeout_ms: 1500,
    };
    assert!(error.to_string().contains("1500ms"));
}
