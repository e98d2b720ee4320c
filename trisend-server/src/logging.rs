//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
///
/// The protocol crates are noisy at `debug`, so they stay at `warn` unless
/// asked for explicitly.
fn default_filter(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    format!("{level},russh=warn,russh_sftp=warn,sqlx=warn")
}

/// Install the global fmt subscriber
///
/// `RUST_LOG` overrides the level chosen by `--debug`. Calling this twice
/// is harmless; the second call leaves the first subscriber in place.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
