/// Command/ack matching on a bare connection
mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use common::read_message;
use mssmon::connection::{CommandListener, Connection, ConnectionOptions};
use mssmon::protocol::{AckCode, Command, Message, Reason};
use mssmon::SessionError;

struct Quiet;

impl CommandListener for Quiet {
	fn on_command(&self, _: &Message) -> Option<Message> {
		None
	}

	fn on_connection_lost(&self) {}
}

fn ack(command: Command, ack: AckCode, payload: &[u8]) -> Vec<u8> {
	Message::reply(command, ack, Reason::None, payload.to_vec()).encode()
}

/// Accept one client and answer its first request with `frames`
async fn scripted(frames: Vec<Vec<u8>>) -> (u16, tokio::task::JoinHandle<Option<Message>>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	let server = tokio::spawn(async move {
		let (mut socket, _) = listener.accept().await.unwrap();
		let request = read_message(&mut socket).await;
		for frame in frames {
			socket.write_all(&frame).await.unwrap();
		}
		// Hold the socket until the client is done
		let _ = read_message(&mut socket).await;
		request
	});
	(port, server)
}

async fn connect(port: u16) -> Connection {
	let options = ConnectionOptions { command_timeout: Duration::from_millis(300), ..ConnectionOptions::default() };
	Connection::connect("127.0.0.1", port, options, Arc::new(Quiet)).await.unwrap()
}

#[tokio::test]
async fn test_unrelated_ack_is_skipped() {
	let (port, server) = scripted(vec![
		ack(Command::GetUnitList, AckCode::Success, b"stale"),
		ack(Command::Keepalive, AckCode::Success, b"fresh"),
	])
	.await;
	let conn = connect(port).await;

	let reply = conn.send_command(Command::Keepalive, None).await.unwrap();
	assert_eq!(reply.payload(), b"fresh");

	conn.close().await;
	let request = server.await.unwrap().unwrap();
	assert_eq!(request.command(), Command::Keepalive);
	assert!(request.is_request());
}

#[tokio::test]
async fn test_fail_ack_is_none() {
	let (port, server) = scripted(vec![ack(Command::GetCameraInfo, AckCode::Fail, b"")]).await;
	let conn = connect(port).await;
	assert!(conn.send_command(Command::GetCameraInfo, None).await.is_none());
	assert!(conn.is_open());
	conn.close().await;
	server.await.unwrap();
}

#[tokio::test]
async fn test_call_reports_nack_reason() {
	let nack = Message::reply(Command::GetCameraInfo, AckCode::Fail, Reason::NoData, Vec::new()).encode();
	let (port, server) = scripted(vec![nack]).await;
	let conn = connect(port).await;
	let result = conn.call(Message::new(Command::GetCameraInfo)).await;
	assert!(matches!(
		result,
		Err(SessionError::CommandFailed { command: Command::GetCameraInfo, reason: Some(Reason::NoData) })
	));
	conn.close().await;
	server.await.unwrap();
}

#[tokio::test]
async fn test_silence_times_out() {
	let (port, server) = scripted(Vec::new()).await;
	let conn = connect(port).await;
	let reply = tokio::time::timeout(Duration::from_secs(5), conn.send_command(Command::Keepalive, None))
		.await
		.unwrap();
	assert!(reply.is_none());
	conn.close().await;
	server.await.unwrap();
}

#[tokio::test]
async fn test_closed_connection_fails_fast() {
	let (port, server) = scripted(Vec::new()).await;
	let conn = connect(port).await;
	conn.close().await;
	assert!(!conn.is_open());
	assert!(conn.send_command(Command::Keepalive, None).await.is_none());
	server.await.unwrap();
}

// vim: ts=4
