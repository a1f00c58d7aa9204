//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use mssmon::logging::*;
//!
//! info!(mdu = %id, "status subscription started");
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `level` is used:
///
/// ```bash
/// RUST_LOG=mssmon::connection=debug mssmon monitor
/// ```
pub fn init_tracing(level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
	// A second call (tests, embedding apps) keeps the first subscriber
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// vim: ts=4
