// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

/// Installs the process-wide tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used. Calling this
/// more than once keeps the first subscriber.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
