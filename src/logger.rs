use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// Diagnostics go to stderr, stdout is reserved for the operator dialogue
pub fn init_logging() {
    let level = if cfg!(debug_assertions) { "trace" } else { "info" };

    let mut defaulted = false;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => {
            defaulted = true;
            EnvFilter::new(level)
        }
    };

    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    // Logged once the subscriber exists, otherwise the line is lost
    if defaulted {
        info!("\"RUST_LOG\" variable not set, defaulting to {level}");
    }
}
