//! Integration tests for logging bootstrap

use core_runtime::logging::{init_logging, LogEntry, LogFormat, LogLevel, LogSink, LoggingConfig};
use core_runtime::Error;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl LogSink for RecordingSink {
    fn log(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }
}

#[test]
fn test_default_config() {
    let config = LoggingConfig::default();
    assert_eq!(config.level, LogLevel::Info);
    assert!(config.filter.is_none());
    assert!(config.log_sink.is_none());
    assert!(config.display_target);
}

// Global subscriber state is per process, so init and re-init live in one test.
#[test]
fn test_init_once_then_reject() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_log_sink(sink.clone());

    init_logging(config).expect("first initialization succeeds");

    tracing::info!(target: "core_playback::player", pairs = 512, "delivered samples");
    {
        let entries = sink.entries.lock();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "delivered samples");
        assert_eq!(entries[0].fields.get("pairs").map(String::as_str), Some("512"));
    }

    // Events from crates outside the workspace are filtered below warn.
    tracing::info!(target: "symphonia_core::probe", "probing");
    assert_eq!(sink.entries.lock().len(), 1);

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}
