//! Session run state

use std::fmt;

/// Connectivity and login progress, ordered from least to most healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunState {
	Stopped,
	Starting,
	NoNetwork,
	/// Parked until credentials arrive through a login request
	AwaitingUserLogin,
	Connecting,
	LoginSucceeded,
	Running,
}

impl RunState {
	/// Text for the persistent status notification
	pub fn status_text(self) -> &'static str {
		match self {
			RunState::Stopped => "Monitor service stopped",
			RunState::Starting => "Monitor service starting",
			RunState::NoNetwork => "No network",
			RunState::LoginSucceeded | RunState::Running => "Monitor service connected",
			RunState::AwaitingUserLogin | RunState::Connecting => "Monitor service disconnected",
		}
	}

	/// States in which a network-available signal restarts initialization
	pub fn is_reconnectable(self) -> bool {
		RunState::Starting <= self && self <= RunState::Connecting
	}

	pub fn is_connected(self) -> bool {
		self >= RunState::LoginSucceeded
	}
}

impl Default for RunState {
	fn default() -> Self {
		RunState::Stopped
	}
}

impl fmt::Display for RunState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			RunState::Stopped => "stopped",
			RunState::Starting => "starting",
			RunState::NoNetwork => "no-network",
			RunState::AwaitingUserLogin => "awaiting-user-login",
			RunState::Connecting => "connecting",
			RunState::LoginSucceeded => "login-succeeded",
			RunState::Running => "running",
		};
		f.write_str(name)
	}
}


// vim: ts=4
