use std::env::var;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() {
    initialize_tracing(LevelFilter::INFO);
}

/// Initialize tracing with the given default level. `RUST_LOG` still wins
/// when it is set.
pub fn init_with_level(level: &str) {
    initialize_tracing(parse_level(level));
}

/// Parse a level name, falling back to `INFO` for anything unrecognised.
pub fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::INFO)
}

fn initialize_tracing(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_filter(env_filter)
            .boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_target(false).with_filter(env_filter).boxed(),
    };

    // A second call (tests, embedded use) keeps the first subscriber.
    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        ::tracing::debug!("tracing subscriber already installed");
    }
}
