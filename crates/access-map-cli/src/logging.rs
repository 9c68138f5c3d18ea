use tracing_subscriber::prelude::*;

/// Initialize logging to stderr, keeping stdout for JSON output
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "info,access_map_lib=debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::debug!("Logging initialized");
}
