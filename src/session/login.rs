//! Challenge-response login
//!
//! 1. `LOGIN_REQUEST {mclient: {cid, uid}}`; the reply carries `challenge`,
//!    `salt` and the user `type`.
//! 2. `LOGIN_PASSWORD {mclient: {cid, uid, digest}}` where
//!    `digest = md5hex(challenge ++ md5hex(user ":" salt ":" password))`.

use std::sync::Arc;

use md5::{Digest, Md5};
use tracing::{debug, info, warn};

use crate::connection::{CommandListener, Connection, ConnectionOptions};
use crate::correlator::command_message;
use crate::directory::Endpoint;
use crate::error::{LoginStage, SessionError};
use crate::protocol::{Command, Document, Message};

/// Two-stage MD5 proof of password knowledge, as lowercase hex
pub fn compute_digest(username: &str, salt: &str, password: &str, challenge: &str) -> String {
	let inner = hex::encode(Md5::digest(format!("{}:{}:{}", username, salt, password).as_bytes()));
	hex::encode(Md5::digest(format!("{}{}", challenge, inner).as_bytes()))
}

/// An authenticated connection
pub struct LoggedIn {
	pub connection: Connection,
	pub user_type: String,
}

/// Connect to `endpoint` and run the handshake
///
/// The socket is closed again on any failure.
pub async fn login(
	endpoint: &Endpoint,
	username: &str,
	password: &str,
	options: ConnectionOptions,
	listener: Arc<dyn CommandListener>,
) -> Result<LoggedIn, SessionError> {
	if username.trim().is_empty() {
		return Err(SessionError::MissingCredentials);
	}
	if endpoint.server.is_empty() || endpoint.port == 0 {
		return Err(SessionError::MissingEndpoint { client_id: endpoint.client_id.clone() });
	}

	let connection = Connection::connect(&endpoint.server, endpoint.port, options, listener).await?;
	match handshake(&connection, &endpoint.client_id, username, password).await {
		Ok(user_type) => {
			info!(server = %connection.address(), user = username, %user_type, "logged in");
			Ok(LoggedIn { connection, user_type })
		}
		Err(e) => {
			warn!(server = %connection.address(), user = username, "login failed: {}", e);
			connection.close().await;
			Err(e)
		}
	}
}

async fn handshake(
	connection: &Connection,
	client_id: &str,
	username: &str,
	password: &str,
) -> Result<String, SessionError> {
	let request = Document::object()
		.with("mclient", Document::object().with("cid", client_id).with("uid", username));
	let reply = step(connection, LoginStage::Request, Command::LoginRequest, &request).await?.document();

	let challenge = reply.get_string("mclient/challenge");
	let salt = reply.get_string("mclient/salt");
	debug!(client = client_id, user = username, "got login challenge");

	let digest = compute_digest(username, &salt, password, &challenge);
	let proof = Document::object().with(
		"mclient",
		Document::object().with("cid", client_id).with("uid", username).with("digest", digest),
	);
	step(connection, LoginStage::Password, Command::LoginPassword, &proof).await?;

	Ok(reply.get_string("mclient/type"))
}

async fn step(
	connection: &Connection,
	stage: LoginStage,
	command: Command,
	payload: &Document,
) -> Result<Message, SessionError> {
	connection.call(command_message(command, Some(payload))).await.map_err(|e| match e {
		SessionError::CommandFailed { reason, .. } => SessionError::LoginRejected { stage, reason },
		other => other,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connection::read_frame;
	use crate::protocol::{AckCode, Reason};
	use tokio::io::AsyncWriteExt;
	use tokio::net::TcpListener;

	#[test]
	fn test_digest_golden() {
		assert_eq!(
			hex::encode(Md5::digest(b"alice:s1:pw")),
			"5dd79c6f1d722ab645b9d6bb013c05d5"
		);
		assert_eq!(compute_digest("alice", "s1", "pw", "abc123"), "5457b5fb1aff6d9b32d42d2fd85ffc7b");
	}

	struct Ignore;

	impl CommandListener for Ignore {
		fn on_command(&self, _: &Message) -> Option<Message> {
			None
		}
		fn on_connection_lost(&self) {}
	}

	/// Accept one client and answer the two login steps
	async fn serve_login(listener: TcpListener, accept_digest: bool) -> Vec<Document> {
		let (mut socket, _) = listener.accept().await.unwrap();
		let options = ConnectionOptions::default();
		let mut seen = Vec::new();

		let request = read_frame(&mut socket, &options).await.unwrap();
		assert_eq!(request.command(), Command::LoginRequest);
		seen.push(request.document());
		let challenge = Document::object().with(
			"mclient",
			Document::object().with("challenge", "abc123").with("salt", "s1").with("type", "admin"),
		);
		let reply = Message::reply(Command::LoginRequest, AckCode::Success, Reason::None, challenge.to_xml().into_bytes());
		socket.write_all(&reply.encode()).await.unwrap();

		let proof = read_frame(&mut socket, &options).await.unwrap();
		assert_eq!(proof.command(), Command::LoginPassword);
		seen.push(proof.document());
		let ack = if accept_digest { AckCode::Success } else { AckCode::Fail };
		let reason = if accept_digest { Reason::None } else { Reason::AuthFail };
		socket.write_all(&Message::reply(Command::LoginPassword, ack, reason, Vec::new()).encode()).await.unwrap();
		seen
	}

	fn endpoint(port: u16) -> Endpoint {
		Endpoint { server: "127.0.0.1".to_string(), port, client_id: "ACME-1".to_string(), fileservice: None }
	}

	#[tokio::test]
	async fn test_login_handshake() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let server = tokio::spawn(serve_login(listener, true));

		let logged_in = login(&endpoint(port), "alice", "pw", ConnectionOptions::default(), Arc::new(Ignore))
			.await
			.unwrap();
		assert_eq!(logged_in.user_type, "admin");

		let seen = server.await.unwrap();
		assert_eq!(seen[0].get_string("mclient/cid"), "ACME-1");
		assert_eq!(seen[0].get_string("mclient/uid"), "alice");
		assert_eq!(seen[1].get_string("mclient/digest"), "5457b5fb1aff6d9b32d42d2fd85ffc7b");
		logged_in.connection.close().await;
	}

	#[tokio::test]
	async fn test_login_rejected() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let server = tokio::spawn(serve_login(listener, false));

		let result = login(&endpoint(port), "alice", "bad", ConnectionOptions::default(), Arc::new(Ignore)).await;
		assert!(matches!(
			result,
			Err(SessionError::LoginRejected { stage: LoginStage::Password, reason: Some(Reason::AuthFail) })
		));
		server.await.unwrap();
	}

	#[tokio::test]
	async fn test_missing_inputs_fail_fast() {
		let result = login(&endpoint(1), " ", "pw", ConnectionOptions::default(), Arc::new(Ignore)).await;
		assert!(matches!(result, Err(SessionError::MissingCredentials)));
		let result = login(&endpoint(0), "alice", "pw", ConnectionOptions::default(), Arc::new(Ignore)).await;
		assert!(matches!(result, Err(SessionError::MissingEndpoint { .. })));
	}
}

// vim: ts=4
