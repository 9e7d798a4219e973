//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.filter.is_none());
    assert!(config.logger_sink.is_none());
}

#[test]
fn test_logging_initializes_once() {
    // Only one global subscriber per process
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());

    tracing::warn!(target: "core_auth", "emitted after init");
}

#[test]
fn test_invalid_filter_is_rejected() {
    let config = LoggingConfig::default().with_filter("core_auth=loudest");
    assert!(init_logging(config).is_err());
}

#[test]
fn test_pii_redaction_tokens() {
    for field in [
        "access_token",
        "refresh_token",
        "id_token",
        "code",
        "code_verifier",
        "Authorization",
    ] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]", "{}", field);
    }
}

#[test]
fn test_pii_redaction_emails() {
    let redacted = redact_if_sensitive("customer", "buyer@example.com");

    // Should start with first char
    assert!(redacted.starts_with('b'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_pii_redaction_normal_values() {
    assert_eq!(redact_if_sensitive("status", "400"), "400");
    assert_eq!(redact_if_sensitive("expires_in", "3600"), "3600");
    assert_eq!(redact_if_sensitive("state", "logged in"), "logged in");
}
