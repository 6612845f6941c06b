//! Logging and tracing configuration
//!
//! Console progress is printed by [`crate::ui::Console`]; tracing carries the
//! diagnostic stream on stderr so it never interleaves with report paths or
//! the step timeline on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate (DEBUG with `--debug`), WARN for
/// dependencies.
pub fn init_cli(debug: bool) {
    let default_filter = if debug {
        "infratest=debug,warn"
    } else {
        "infratest=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(debug)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
