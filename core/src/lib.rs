pub mod config;
pub mod error;
pub mod metadata;
pub mod model;
pub mod similarity;

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter and `HYBRIDGRAPH_LOG_FORMAT=json` switches to JSON lines.
pub fn try_init_tracing() -> Result<(), TryInitError> {
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("HYBRIDGRAPH_LOG_FORMAT")
        .is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter_layer);
    if json {
        registry
            .with(fmt::layer().json().with_target(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    }
}

/// Like [`try_init_tracing`], but a subscriber that is already installed is left in place.
pub fn init_tracing() {
    let _ = try_init_tracing();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        assert!(try_init_tracing().is_err());
    }
}
