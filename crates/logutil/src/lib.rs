//! Utilities for logging.
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Output format for the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    /// Human readable, includes file and line numbers.
    #[default]
    Full,
    /// Single line per event.
    Compact,
    /// Newline delimited json.
    Json,
}

/// Build the env filter used by all subscribers.
///
/// `RUST_LOG` takes precedence over the provided default level.
fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

/// Configure the global logger.
///
/// Does nothing if a global subscriber has already been set.
pub fn configure_global_logger(default_level: Level, mode: LoggingMode) {
    let builder = SubscriberBuilder::default().with_env_filter(env_filter(default_level));

    let _ = match mode {
        LoggingMode::Full => builder
            .with_file(true)
            .with_line_number(true)
            .try_init(),
        LoggingMode::Compact => builder.compact().try_init(),
        LoggingMode::Json => builder.json().try_init(),
    };
}

/// Logger for tests. Output is captured by the test harness.
pub fn init_test() {
    let _ = SubscriberBuilder::default()
        .with_test_writer()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
