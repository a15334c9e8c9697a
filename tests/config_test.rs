//! Tests for host configuration loading.
#![cfg(feature = "cli")]

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use muninn::MuninnError;
use muninn::config::Config;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_match_cache_defaults() {
    let config = Config::default();
    let cache = config.cache.to_cache_config();

    assert_eq!(cache.max_entries, 50);
    assert_eq!(cache.ttl, Duration::from_secs(86_400));
    assert_eq!(cache.min_interval, Duration::from_millis(2000));
    assert_eq!(cache.max_wait, Duration::from_millis(30_000));
    assert_eq!(cache.namespace, "gemini");
    assert_eq!(config.gemini.model, "gemini-2.0-flash");
    assert_eq!(config.gemini.timeout_secs, 30);
    assert_eq!(config.sweep.interval(), Some(Duration::from_secs(3600)));
}

#[test]
fn partial_file_keeps_other_defaults() {
    let file = write_config(
        r#"
[cache]
max_entries = 10
min_interval_ms = 250

[gemini]
prompt_template = "Where is {text}?"
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();
    let cache = config.cache.to_cache_config();
    assert_eq!(cache.max_entries, 10);
    assert_eq!(cache.min_interval, Duration::from_millis(250));
    assert_eq!(cache.ttl, Duration::from_secs(86_400));
    assert_eq!(config.gemini.prompt_template.as_deref(), Some("Where is {text}?"));
    assert_eq!(config.retry.max_attempts, 3);
}

#[test]
fn retry_section_builds_retry_config() {
    let file = write_config(
        r#"
[retry]
max_attempts = 5
initial_delay_ms = 100
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    let retry = config.retry.to_retry_config();
    assert_eq!(retry.max_attempts, 5);
    assert_eq!(retry.initial_delay, Duration::from_millis(100));
}

#[test]
fn zero_sweep_interval_disables_sweeper() {
    let file = write_config("[sweep]\ninterval_secs = 0\n");
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.sweep.interval(), None);
}

#[test]
fn explicit_missing_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/muninn.toml"))).unwrap_err();
    assert!(matches!(err, MuninnError::Configuration(ref m) if m.contains("not found")));
}

#[test]
fn malformed_file_is_an_error() {
    let file = write_config("[cache]\nmax_entries = \"many\"\n");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, MuninnError::Configuration(ref m) if m.contains("parse")));
}
