//! Error types for mssmon operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::protocol::{Command, ProtocolError, Reason};

/// Top-level error of the command line front end
#[derive(Debug)]
pub enum MonitorError {
	/// Session error (nested)
	Session(SessionError),

	/// Configuration error (nested)
	Config(ConfigError),

	/// I/O error
	Io(io::Error),

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for MonitorError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MonitorError::Session(e) => write!(f, "Session error: {}", e),
			MonitorError::Config(e) => write!(f, "Configuration error: {}", e),
			MonitorError::Io(e) => write!(f, "I/O error: {}", e),
			MonitorError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for MonitorError {}

impl From<io::Error> for MonitorError {
	fn from(e: io::Error) -> Self {
		MonitorError::Io(e)
	}
}

impl From<String> for MonitorError {
	fn from(e: String) -> Self {
		MonitorError::Other { message: e }
	}
}

impl From<&str> for MonitorError {
	fn from(e: &str) -> Self {
		MonitorError::Other { message: e.to_string() }
	}
}

impl From<SessionError> for MonitorError {
	fn from(e: SessionError) -> Self {
		MonitorError::Session(e)
	}
}

impl From<ConfigError> for MonitorError {
	fn from(e: ConfigError) -> Self {
		MonitorError::Config(e)
	}
}


/// Connection-specific errors
#[derive(Debug)]
pub enum ConnectionError {
	/// TCP connect failed
	ConnectFailed { address: String, source: io::Error },

	/// Operation on a connection that is not (or no longer) open
	NotConnected,

	/// Framing or checksum failure
	Protocol(ProtocolError),

	/// I/O error on an open socket
	Io(io::Error),
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::ConnectFailed { address, source } => {
				write!(f, "Failed to connect to {}: {}", address, source)
			}
			ConnectionError::NotConnected => write!(f, "Not connected"),
			ConnectionError::Protocol(e) => write!(f, "{}", e),
			ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
	fn from(e: io::Error) -> Self {
		ConnectionError::Io(e)
	}
}

impl From<ProtocolError> for ConnectionError {
	fn from(e: ProtocolError) -> Self {
		match e {
			ProtocolError::Io(io) => ConnectionError::Io(io),
			other => ConnectionError::Protocol(other),
		}
	}
}

/// Login stage at which the handshake stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
	Request,
	Password,
}

impl fmt::Display for LoginStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LoginStage::Request => write!(f, "login request"),
			LoginStage::Password => write!(f, "login password"),
		}
	}
}

/// Session and command errors
#[derive(Debug)]
pub enum SessionError {
	/// Username, client id or password not set
	MissingCredentials,

	/// Directory has no usable host/port for the client
	MissingEndpoint { client_id: String },

	/// Directory could not be fetched or parsed
	Directory { message: String },

	/// Transport failure (nested)
	Connection(ConnectionError),

	/// Server rejected (or never answered) a login step
	LoginRejected { stage: LoginStage, reason: Option<Reason> },

	/// A command was NACKed or timed out
	CommandFailed { command: Command, reason: Option<Reason> },

	/// Session actor is gone
	Stopped,
}

impl fmt::Display for SessionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SessionError::MissingCredentials => write!(f, "Client id or username not set"),
			SessionError::MissingEndpoint { client_id } => {
				write!(f, "No server endpoint for client '{}'", client_id)
			}
			SessionError::Directory { message } => write!(f, "Directory error: {}", message),
			SessionError::Connection(e) => write!(f, "{}", e),
			SessionError::LoginRejected { stage, reason } => match reason {
				Some(reason) => write!(f, "Login failed at {}: {:?}", stage, reason),
				None => write!(f, "Login failed at {}", stage),
			},
			SessionError::CommandFailed { command, reason } => match reason {
				Some(reason) => write!(f, "Command {:?} failed: {:?}", command, reason),
				None => write!(f, "Command {:?} failed", command),
			},
			SessionError::Stopped => write!(f, "Session stopped"),
		}
	}
}

impl Error for SessionError {}

impl From<ConnectionError> for SessionError {
	fn from(e: ConnectionError) -> Self {
		SessionError::Connection(e)
	}
}

/// Persistence errors
#[derive(Debug)]
pub enum StoreError {
	/// Failed to read the stored file
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to write the stored file
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// Stored file exists but cannot be parsed
	Corrupted { message: String },
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::LoadFailed { source } => write!(f, "Failed to load: {}", source),
			StoreError::SaveFailed { source } => write!(f, "Failed to save: {}", source),
			StoreError::Corrupted { message } => write!(f, "Stored data corrupted: {}", message),
		}
	}
}

impl Error for StoreError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Read { path: String, source: io::Error },

	/// Config file could not be parsed
	Parse { path: String, message: String },

	/// A value is out of range
	Invalid { message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => write!(f, "Cannot read {}: {}", path, source),
			ConfigError::Parse { path, message } => write!(f, "Cannot parse {}: {}", path, message),
			ConfigError::Invalid { message } => write!(f, "Invalid configuration: {}", message),
		}
	}
}

impl Error for ConfigError {}


// vim: ts=4
