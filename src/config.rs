//! Configuration for mssmon
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, anything else is read as JSON5)
//! 3. Environment variables (MSSMON_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::MAX_PAYLOAD;

/// Upper bound accepted for `maxPayload`
pub const PAYLOAD_LIMIT: u32 = 64 * 1024 * 1024;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// DIRECTORY & ENDPOINT
	// ========================================================================
	/// URL of the client directory JSON; empty disables the fetch
	pub directory_url: String,

	/// Server used when the directory has no entry for the client
	pub default_server: String,

	pub default_port: u16,

	/// Directory fetch attempts at startup
	pub directory_fetch_attempts: u32,

	pub directory_retry_delay_ms: u64,

	/// Client id used when none is stored
	pub client_id: Option<String>,

	// ========================================================================
	// PROTOCOL TIMING
	// ========================================================================
	/// Bound on every command/ack exchange
	pub command_timeout_ms: u64,

	pub keepalive_interval_secs: u64,

	/// Delay before a login retry after the connection dropped
	pub reconnect_delay_secs: u64,

	/// Largest payload accepted from the server
	pub max_payload: u32,

	/// Bytes requested per read-file command
	pub file_chunk_size: u32,

	/// Pause before retrying an interrupted socket read
	pub read_backoff_ms: u64,

	// ========================================================================
	// NOTIFICATIONS & HISTORY
	// ========================================================================
	pub notifications_enabled: bool,

	/// Event types that may notify; `None` allows all
	pub notification_filter: Option<Vec<u32>>,

	/// Window for history queries
	pub history_days: u32,

	// ========================================================================
	// RUNTIME
	// ========================================================================
	pub credentials_path: PathBuf,

	/// Version stamp stored after a successful login
	pub app_version: String,

	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			directory_url: String::new(),
			default_server: String::new(),
			default_port: 0,
			directory_fetch_attempts: 11,
			directory_retry_delay_ms: 500,
			client_id: None,

			command_timeout_ms: 30_000,
			keepalive_interval_secs: 600,
			reconnect_delay_secs: 5,
			max_payload: MAX_PAYLOAD,
			file_chunk_size: 1_000_000,
			read_backoff_ms: 10,

			notifications_enabled: true,
			notification_filter: None,
			history_days: 7,

			credentials_path: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".mssmon").join("credentials.json"))
				.unwrap_or_else(|| PathBuf::from(".mssmon/credentials.json")),
			app_version: env!("CARGO_PKG_VERSION").to_string(),
			log_level: "info".to_string(),
		}
	}
}

impl Config {
	/// Defaults, then `path` if given, then the process environment
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => Config::default(),
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	/// Parse a config file over the defaults
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let display = path.display().to_string();
		let text = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: display.clone(), source })?;

		let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);
		if is_toml {
			toml::from_str(&text).map_err(|e| ConfigError::Parse { path: display, message: e.to_string() })
		} else {
			json5::from_str(&text).map_err(|e| ConfigError::Parse { path: display, message: e.to_string() })
		}
	}

	/// Apply `MSSMON_*` overrides read through `lookup`
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(v) = lookup("MSSMON_DIRECTORY_URL") {
			self.directory_url = v;
		}
		if let Some(v) = lookup("MSSMON_CLIENT_ID") {
			self.client_id = Some(v);
		}
		if let Some(v) = lookup("MSSMON_LOG_LEVEL") {
			self.log_level = v;
		}
		if let Some(v) = lookup("MSSMON_KEEPALIVE_SECS") {
			self.keepalive_interval_secs = parse_number("MSSMON_KEEPALIVE_SECS", &v)?;
		}
		if let Some(v) = lookup("MSSMON_COMMAND_TIMEOUT_MS") {
			self.command_timeout_ms = parse_number("MSSMON_COMMAND_TIMEOUT_MS", &v)?;
		}
		if let Some(v) = lookup("MSSMON_CREDENTIALS_PATH") {
			self.credentials_path = PathBuf::from(v);
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let invalid = |message: &str| Err(ConfigError::Invalid { message: message.to_string() });

		if self.command_timeout_ms == 0 {
			return invalid("commandTimeoutMs must be positive");
		}
		if self.keepalive_interval_secs == 0 {
			return invalid("keepaliveIntervalSecs must be positive");
		}
		if self.reconnect_delay_secs == 0 {
			return invalid("reconnectDelaySecs must be positive");
		}
		if self.max_payload == 0 {
			return invalid("maxPayload must be positive");
		}
		if self.file_chunk_size == 0 {
			return invalid("fileChunkSize must be positive");
		}
		if self.max_payload > PAYLOAD_LIMIT {
			return invalid("maxPayload exceeds 64 MiB");
		}
		if self.file_chunk_size > self.max_payload {
			return invalid("fileChunkSize exceeds maxPayload");
		}
		Ok(())
	}

	pub fn command_timeout(&self) -> Duration {
		Duration::from_millis(self.command_timeout_ms)
	}

	pub fn keepalive_interval(&self) -> Duration {
		Duration::from_secs(self.keepalive_interval_secs)
	}

	pub fn reconnect_delay(&self) -> Duration {
		Duration::from_secs(self.reconnect_delay_secs)
	}

	pub fn directory_retry_delay(&self) -> Duration {
		Duration::from_millis(self.directory_retry_delay_ms)
	}
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
	value
		.trim()
		.parse()
		.map_err(|_| ConfigError::Invalid { message: format!("{} is not a number: {}", key, value) })
}


// vim: ts=4
