//! Client directory
//!
//! A small JSON document, fetched over HTTP, that maps client ids to the
//! server a client should log in to:
//!
//! ```json
//! { "clients": { "acme": { "server": "10.0.0.5", "port": 40008,
//!                          "clientid": "ACME-1", "fileservice": "https://..." } } }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Where the directory document comes from
#[async_trait]
pub trait DirectorySource: Send + Sync {
	/// Fetch the raw directory body
	async fn fetch(&self) -> Result<String, SessionError>;
}

/// Directory served over HTTP(S)
pub struct HttpDirectory {
	client: reqwest::Client,
	url: String,
}

impl HttpDirectory {
	pub fn new(url: &str, timeout: Duration) -> Result<Self, SessionError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| SessionError::Directory { message: e.to_string() })?;
		Ok(HttpDirectory { client, url: url.to_string() })
	}
}

#[async_trait]
impl DirectorySource for HttpDirectory {
	async fn fetch(&self) -> Result<String, SessionError> {
		let response = self
			.client
			.get(&self.url)
			.send()
			.await
			.and_then(|r| r.error_for_status())
			.map_err(|e| SessionError::Directory { message: e.to_string() })?;
		response.text().await.map_err(|e| SessionError::Directory { message: e.to_string() })
	}
}

/// Fixed directory body, or none at all
pub struct StaticDirectory(pub Option<String>);

#[async_trait]
impl DirectorySource for StaticDirectory {
	async fn fetch(&self) -> Result<String, SessionError> {
		self.0
			.clone()
			.ok_or_else(|| SessionError::Directory { message: "no directory configured".to_string() })
	}
}

/// Parsed directory document
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
	root: Value,
}

impl Default for Directory {
	fn default() -> Self {
		Directory { root: Value::Object(Default::default()) }
	}
}

/// Server endpoint for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	pub server: String,
	pub port: u16,
	/// Client id sent on the wire; may differ from the directory key
	pub client_id: String,
	pub fileservice: Option<String>,
}

impl Directory {
	/// Accepts only a JSON object
	pub fn parse(text: &str) -> Option<Self> {
		match serde_json::from_str::<Value>(text) {
			Ok(root @ Value::Object(_)) => Some(Directory { root }),
			_ => None,
		}
	}

	pub fn to_json(&self) -> String {
		self.root.to_string()
	}

	pub fn client_ids(&self) -> Vec<String> {
		match self.root.get("clients") {
			Some(Value::Object(clients)) => clients.keys().cloned().collect(),
			_ => Vec::new(),
		}
	}

	/// Endpoint for `client_id`, falling back to the defaults when the
	/// directory has no entry for it
	pub fn resolve(&self, client_id: &str, default_server: &str, default_port: u16) -> Endpoint {
		let entry = match self.root.get("clients").and_then(|c| c.get(client_id)) {
			Some(entry @ Value::Object(_)) => entry,
			_ => {
				debug!(client = client_id, "no directory entry, using defaults");
				return Endpoint {
					server: default_server.to_string(),
					port: default_port,
					client_id: client_id.to_string(),
					fileservice: None,
				};
			}
		};

		let wire_id = text(entry, "clientid");
		Endpoint {
			server: text(entry, "server"),
			port: port(entry.get("port")),
			client_id: if wire_id.is_empty() { client_id.to_string() } else { wire_id },
			fileservice: Some(text(entry, "fileservice")).filter(|s| !s.is_empty()),
		}
	}
}

fn text(entry: &Value, key: &str) -> String {
	match entry.get(key) {
		Some(Value::String(s)) => s.clone(),
		Some(Value::Number(n)) => n.to_string(),
		_ => String::new(),
	}
}

fn port(value: Option<&Value>) -> u16 {
	let n = match value {
		Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
		Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
		_ => 0,
	};
	if n > u16::MAX as u64 {
		0
	} else {
		n as u16
	}
}

/// Fetch the directory, retrying up to `attempts` times with `delay`
/// between failures
pub async fn fetch_directory(source: &dyn DirectorySource, attempts: u32, delay: Duration) -> Option<Directory> {
	for attempt in 1..=attempts.max(1) {
		match source.fetch().await {
			Ok(body) => match Directory::parse(&body) {
				Some(directory) => {
					info!(attempt, clients = directory.client_ids().len(), "directory fetched");
					return Some(directory);
				}
				None => debug!(attempt, "directory body is not a JSON object"),
			},
			Err(e) => debug!(attempt, "directory fetch failed: {}", e),
		}
		if attempt < attempts {
			tokio::time::sleep(delay).await;
		}
	}
	warn!(attempts, "giving up on directory fetch");
	None
}


// vim: ts=4
