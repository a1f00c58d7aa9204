//! Remote file reads
//!
//! Files are streamed over an authenticated connection of their own:
//! open-file, then read-file with the offset in `qword` and the requested
//! length in `dword` until a short reply, then close-file.

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::protocol::{Command, Document, Message};

/// Read `path` in `chunk_size` pieces. Whatever arrived before a failure
/// is returned; an unopenable file gives an empty buffer.
pub async fn read_remote_file(connection: &Connection, path: &str, chunk_size: u32) -> Vec<u8> {
	let mut data = Vec::new();
	if chunk_size == 0 {
		warn!(path, "chunk size of zero, nothing read");
		return data;
	}

	let open = Document::object().with("mclient", Document::object().with("filename", path));
	if connection.send_command(Command::OpenFile, Some(&open)).await.is_none() {
		warn!(path, "cannot open remote file");
		return data;
	}

	loop {
		let mut request = Message::new(Command::ReadFile);
		request.set_qword(data.len() as u64);
		request.set_dword(chunk_size);

		let reply = match connection.request(request).await {
			Some(reply) => reply,
			None => {
				warn!(path, offset = data.len(), "read failed");
				break;
			}
		};
		let received = reply.payload().len();
		data.extend_from_slice(reply.payload());
		if received < chunk_size as usize {
			break;
		}
	}

	if connection.send_command(Command::CloseFile, None).await.is_none() {
		debug!(path, "close-file not acknowledged");
	}
	debug!(path, bytes = data.len(), "remote file read");
	data
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connection::{read_frame, CommandListener, ConnectionOptions};
	use crate::protocol::{AckCode, Reason};
	use std::sync::Arc;
	use tokio::io::AsyncWriteExt;
	use tokio::net::TcpListener;

	struct Ignore;

	impl CommandListener for Ignore {
		fn on_command(&self, _: &Message) -> Option<Message> {
			None
		}
		fn on_connection_lost(&self) {}
	}

	/// Serve `content` and return the (offset, length) pairs requested
	async fn serve_file(listener: TcpListener, content: Vec<u8>) -> (Vec<(u64, u32)>, bool) {
		let (mut socket, _) = listener.accept().await.unwrap();
		let options = ConnectionOptions::default();
		let mut reads = Vec::new();
		let mut closed = false;
		while let Ok(frame) = read_frame(&mut socket, &options).await {
			let payload = match frame.command() {
				Command::OpenFile => {
					assert_eq!(frame.document().get_string("mclient/filename"), "/bg/cam1.jpg");
					Vec::new()
				}
				Command::ReadFile => {
					reads.push((frame.qword(), frame.dword()));
					let start = (frame.qword() as usize).min(content.len());
					let end = (start + frame.dword() as usize).min(content.len());
					content[start..end].to_vec()
				}
				Command::CloseFile => {
					closed = true;
					Vec::new()
				}
				other => panic!("unexpected {:?}", other),
			};
			let reply = Message::reply(frame.command(), AckCode::Success, Reason::None, payload);
			socket.write_all(&reply.encode()).await.unwrap();
		}
		(reads, closed)
	}

	#[tokio::test]
	async fn test_chunked_read() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let content: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
		let server = tokio::spawn(serve_file(listener, content.clone()));

		let conn = Connection::connect("127.0.0.1", port, ConnectionOptions::default(), Arc::new(Ignore))
			.await
			.unwrap();
		let data = read_remote_file(&conn, "/bg/cam1.jpg", 100).await;
		conn.close().await;

		assert_eq!(data, content);
		let (reads, closed) = server.await.unwrap();
		assert_eq!(reads, vec![(0, 100), (100, 100), (200, 100)]);
		assert!(closed);
	}

	#[tokio::test]
	async fn test_exact_multiple_ends_with_empty_read() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let server = tokio::spawn(serve_file(listener, vec![7u8; 20]));

		let conn = Connection::connect("127.0.0.1", port, ConnectionOptions::default(), Arc::new(Ignore))
			.await
			.unwrap();
		let data = read_remote_file(&conn, "/bg/cam1.jpg", 10).await;
		conn.close().await;

		assert_eq!(data.len(), 20);
		let (reads, _) = server.await.unwrap();
		assert_eq!(reads.len(), 3);
	}

	#[tokio::test]
	async fn test_zero_chunk_size_sends_nothing() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let server = tokio::spawn(serve_file(listener, vec![7u8; 20]));

		let conn = Connection::connect("127.0.0.1", port, ConnectionOptions::default(), Arc::new(Ignore))
			.await
			.unwrap();
		let data = tokio::time::timeout(std::time::Duration::from_secs(5), read_remote_file(&conn, "/bg/cam1.jpg", 0))
			.await
			.unwrap();
		conn.close().await;

		assert!(data.is_empty());
		let (reads, closed) = server.await.unwrap();
		assert!(reads.is_empty());
		assert!(!closed);
	}
}

// vim: ts=4
