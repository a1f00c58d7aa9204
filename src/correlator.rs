//! Command/ack correlation
//!
//! Only one command is in flight per connection, so a reply is matched to
//! its command by command code alone. [`Connection::call`] reports a NACK
//! with the server's reason code; [`Connection::send_command`] collapses
//! every failure mode (NACK, timeout, closed socket) to `None`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::SessionError;
use crate::protocol::{Command, Document, Message, Reason};

/// Replies delivered by the receive loop, in arrival order
pub struct AckQueue {
	rx: mpsc::UnboundedReceiver<Message>,
}

impl AckQueue {
	pub fn new(rx: mpsc::UnboundedReceiver<Message>) -> Self {
		AckQueue { rx }
	}

	/// Discard every queued reply, returning how many there were
	pub fn drain(&mut self) -> usize {
		let mut dropped = 0;
		while let Ok(stale) = self.rx.try_recv() {
			debug!(command = ?stale.command(), "dropping stale ack");
			dropped += 1;
		}
		dropped
	}

	/// Wait for the reply to `command`, skipping replies to anything else.
	/// A NACK gives the server's reason; a timeout or a closed connection
	/// gives no reason at all.
	pub async fn wait_for(&mut self, command: Command, timeout: Duration) -> Result<Message, Option<Reason>> {
		let deadline = Instant::now() + timeout;
		loop {
			match tokio::time::timeout_at(deadline, self.rx.recv()).await {
				Ok(Some(reply)) if reply.command() == command => {
					if reply.is_success() {
						return Ok(reply);
					}
					debug!(?command, ack = ?reply.ack(), reason = ?reply.reason(), "command failed");
					return Err(Some(reply.reason()));
				}
				Ok(Some(other)) => {
					debug!(expected = ?command, got = ?other.command(), "ignoring unrelated ack");
				}
				Ok(None) => {
					debug!(?command, "connection closed while waiting for ack");
					return Err(None);
				}
				Err(_) => {
					warn!(?command, "timed out waiting for ack");
					return Err(None);
				}
			}
		}
	}
}

impl Connection {
	/// Send a request frame and wait for its success reply
	pub async fn call(&self, message: Message) -> Result<Message, SessionError> {
		let command = message.command();
		let mut acks = self.acks.lock().await;
		acks.drain();

		if let Err(e) = self.send_frame(&message).await {
			debug!(?command, "send failed: {}", e);
			return Err(SessionError::CommandFailed { command, reason: None });
		}
		acks.wait_for(command, self.options.command_timeout)
			.await
			.map_err(|reason| SessionError::CommandFailed { command, reason })
	}

	/// Like [`Connection::call`], without the failure detail
	pub async fn request(&self, message: Message) -> Option<Message> {
		self.call(message).await.ok()
	}

	/// Send `command` with an optional document payload
	pub async fn send_command(&self, command: Command, payload: Option<&Document>) -> Option<Message> {
		self.request(command_message(command, payload)).await
	}
}

pub(crate) fn command_message(command: Command, payload: Option<&Document>) -> Message {
	match payload {
		Some(doc) => Message::with_document(command, doc),
		None => Message::new(command),
	}
}


// vim: ts=4
