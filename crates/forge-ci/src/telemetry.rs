//! Tracing initialisation for the forge binary.
//!
//! Logs go to stderr; stdout is reserved for function results so
//! `forge --json call ...` can be piped.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter from `directives` (`RUST_LOG` syntax); `level` applies when they are empty.
fn filter(level: Level, directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(directives)
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `json`, each event is one
/// JSON object carrying the enclosing function span. Only the first call takes
/// effect.
pub fn init_tracing(json: bool, level: Level) {
    let text = (!json).then(|| fmt::layer().with_target(false).with_writer(io::stderr));
    let structured = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(false)
            .with_writer(io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter(level, &std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default()))
        .with(text)
        .with(structured)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        tracing::info!("still logging");
    }

    #[test]
    fn level_applies_without_directives() {
        let rendered = filter(Level::WARN, "").to_string();
        assert_eq!(rendered, "warn");
    }

    #[test]
    fn directives_replace_level() {
        let rendered = filter(Level::WARN, "forge_ci=trace").to_string();
        assert_eq!(rendered, "forge_ci=trace");
    }
}
