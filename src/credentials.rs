//! Credential persistence
//!
//! Stores the last successful login (client id, username, password), the
//! app version that performed it and the last directory document fetched.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Persisted login state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Credentials {
	pub client_id: String,
	pub username: String,
	pub password: String,

	/// App version of the last successful login
	pub version_stamp: Option<String>,

	/// Last directory body that parsed
	pub directory: Option<String>,
}

impl Credentials {
	pub fn new(client_id: &str, username: &str, password: &str) -> Self {
		Credentials {
			client_id: client_id.to_string(),
			username: username.to_string(),
			password: password.to_string(),
			..Default::default()
		}
	}

	/// Enough to attempt a login
	pub fn is_complete(&self) -> bool {
		!self.client_id.trim().is_empty() && !self.username.trim().is_empty()
	}

	/// Forget the user but keep the client id and cached directory
	pub fn clear_user(&mut self) {
		self.username.clear();
		self.password.clear();
	}
}

/// Storage backend for [`Credentials`]
#[async_trait]
pub trait CredentialStore: Send + Sync {
	/// Stored credentials, or defaults when nothing was saved yet
	async fn load(&self) -> Result<Credentials, StoreError>;

	async fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;
}

/// JSON file on disk
pub struct FileCredentialStore {
	path: PathBuf,
}

impl FileCredentialStore {
	pub fn new(path: PathBuf) -> Self {
		FileCredentialStore { path }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
	async fn load(&self) -> Result<Credentials, StoreError> {
		if !self.path.exists() {
			return Ok(Credentials::default());
		}

		let contents = tokio::fs::read_to_string(&self.path)
			.await
			.map_err(|e| StoreError::LoadFailed { source: Box::new(e) })?;

		serde_json::from_str(&contents).map_err(|e| StoreError::Corrupted {
			message: format!("Failed to parse credentials JSON: {}", e),
		})
	}

	async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			if !parent.exists() {
				tokio::fs::create_dir_all(parent)
					.await
					.map_err(|e| StoreError::SaveFailed { source: Box::new(e) })?;
			}
		}

		let json = serde_json::to_string_pretty(credentials)
			.map_err(|e| StoreError::SaveFailed { source: Box::new(e) })?;

		tokio::fs::write(&self.path, json)
			.await
			.map_err(|e| StoreError::SaveFailed { source: Box::new(e) })
	}
}

/// In-process store, for tests and one-shot commands
#[derive(Default)]
pub struct MemoryCredentialStore {
	inner: Mutex<Credentials>,
}

impl MemoryCredentialStore {
	pub fn new(credentials: Credentials) -> Self {
		MemoryCredentialStore { inner: Mutex::new(credentials) }
	}

	pub fn current(&self) -> Credentials {
		self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
	}
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
	async fn load(&self) -> Result<Credentials, StoreError> {
		Ok(self.current())
	}

	async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
		*self.inner.lock().unwrap_or_else(|p| p.into_inner()) = credentials.clone();
		Ok(())
	}
}


// vim: ts=4
