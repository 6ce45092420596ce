//! Log output setup for the binary.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directives, overridden by `RUST_LOG` when set.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "scale_bridge=debug,info"
    } else {
        "scale_bridge=info"
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
