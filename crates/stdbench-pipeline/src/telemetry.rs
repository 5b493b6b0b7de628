//! Tracing initialisation for the stdbench binary.
//!
//! Child process output is forwarded through `tracing`, so the subscriber
//! installed here is also where benchmark and compiler output ends up.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the subscriber that receives pipeline events and the stdout and
/// stderr lines of every cmake and benchmark process.
///
/// With `json` each event, including forwarded child output, becomes one
/// JSON object per line. `RUST_LOG` overrides `level`. Later calls are
/// ignored so tests and the binary can both call it.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging");
    }
}
