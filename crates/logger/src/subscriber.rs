use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format selected through `RUST_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "" | "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

/// Install the global subscriber at INFO, overridable through `RUST_LOG`.
pub fn init_tracing() {
    init_tracing_with_level(LevelFilter::INFO);
}

/// Install the global subscriber with `level` as the default directive.
///
/// Calling this twice is harmless: the second registration is rejected and
/// reported on stderr instead of panicking.
pub fn init_tracing_with_level(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let requested = var("RUST_LOG_FORMAT").unwrap_or_default();
    let format = LogFormat::from_env_value(&requested);

    let log_layer = match format.unwrap_or(LogFormat::Compact) {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    if let Err(error) = tracing_subscriber::registry().with(log_layer).try_init() {
        eprintln!("tracing subscriber already installed: {error}");
        return;
    }

    if format.is_none() {
        warn!("Unknown RUST_LOG_FORMAT `{requested}`, falling back to compact output");
    }
}
