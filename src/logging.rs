use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Level used when `RUST_LOG` is not set.
pub const DEFAULT_LEVEL: &str = "info";

/// Build the filter: `RUST_LOG` if set, otherwise `level`, with hyper's
/// connection chatter turned down.
pub fn filter(level: &str) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    match "hyper=warn".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Install the global subscriber for a service binary.
///
/// Calling it twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init(level: &str) {
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
    let _ = tracing_subscriber::registry()
        .with(filter(level))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(is_terminal),
        )
        .try_init();
}
