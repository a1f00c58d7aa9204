//! # mssmon - Unit Monitoring Client
//!
//! mssmon keeps a persistent, authenticated session with an mss_msg
//! monitoring server. It tracks the monitored units, keeps their live
//! status current and turns alert pushes into notifications.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mssmon::config::Config;
//! use mssmon::session::{RunState, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let session = SessionBuilder::from_config(&config)?.start();
//!     session.login("acme", "alice", "secret")?;
//!     session.wait_for_state(|s| s == RunState::Running).await;
//!
//!     session.status_start(Arc::new(|mdu: &str, status: Option<&mssmon::Document>| {
//!         println!("{}: {:?}", mdu, status);
//!     }))?;
//!     Ok(())
//! }
//! ```

pub mod callbacks;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod credentials;
pub mod delivery;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod notify;
pub mod protocol;
pub mod registry;
pub mod session;

// Re-export commonly used types and functions
pub use config::Config;
pub use error::{ConfigError, ConnectionError, MonitorError, SessionError, StoreError};
pub use protocol::{Command, Document, Message};
pub use session::{EventQuery, RunState, SessionBuilder, SessionHandle};

// vim: ts=4
