//! Tracing subscriber setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Initializes the global subscriber. `RUST_LOG` overrides the default
/// filter; noisy dependency crates are capped at warn.
pub fn init(verbose: bool) {
    let default_directives = if verbose {
        "crosslist=debug,sqlx=warn,fantoccini=warn,hyper=warn"
    } else {
        "crosslist=info,sqlx=warn,fantoccini=warn,hyper=warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
