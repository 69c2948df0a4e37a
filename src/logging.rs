use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing on stderr. Stdout is reserved for command output.
///
/// - Default level: INFO, DEBUG with `verbose`; `RUST_LOG` overrides both
/// - `json`: one JSON object per event instead of the compact text format
pub fn init(verbose: bool, json: bool) {
    let default_directive = if verbose {
        "info,connect_lib=debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);

    // try_init: a second initialization (tests, embedding) is not an error.
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbose)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(json, "Tracing initialized");
    }
}
