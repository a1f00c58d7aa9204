//! One TCP connection to an mss_msg server
//!
//! The socket is split in two. The read half belongs to a background
//! receive loop that frames inbound messages, answers server requests
//! through a [`CommandListener`] and queues replies for the correlator.
//! The write half sits behind a lock shared by command senders and the
//! loop's auto-replies, so frames never interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::correlator::AckQueue;
use crate::error::ConnectionError;
use crate::protocol::{AckCode, Header, Message, ProtocolError, Reason, HEADER_LEN, MAX_PAYLOAD};

/// Handler for frames the server sends on its own initiative
pub trait CommandListener: Send + Sync {
	/// Produce the reply for an inbound request. `None` declines it; the
	/// connection then answers with a plain failure.
	fn on_command(&self, message: &Message) -> Option<Message>;

	/// The receive loop stopped because the socket failed or closed
	fn on_connection_lost(&self);
}

/// Tunables for a connection
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
	/// Largest payload accepted from the peer
	pub max_payload: u32,
	/// Pause before retrying an interrupted read
	pub read_backoff: Duration,
	/// Bound on TCP connect and on every ack wait
	pub command_timeout: Duration,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		ConnectionOptions {
			max_payload: MAX_PAYLOAD,
			read_backoff: Duration::from_millis(10),
			command_timeout: Duration::from_secs(30),
		}
	}
}

impl From<&Config> for ConnectionOptions {
	fn from(config: &Config) -> Self {
		ConnectionOptions {
			max_payload: config.max_payload,
			read_backoff: Duration::from_millis(config.read_backoff_ms),
			command_timeout: Duration::from_millis(config.command_timeout_ms),
		}
	}
}

type Writer = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// An open connection and its receive loop
pub struct Connection {
	address: String,
	pub(crate) options: ConnectionOptions,
	writer: Writer,
	open: Arc<AtomicBool>,
	pub(crate) acks: Mutex<AckQueue>,
	receiver: StdMutex<Option<JoinHandle<()>>>,
}

impl Connection {
	/// Connect to `host:port` and start the receive loop
	pub async fn connect(
		host: &str,
		port: u16,
		options: ConnectionOptions,
		listener: Arc<dyn CommandListener>,
	) -> Result<Self, ConnectionError> {
		let address = format!("{}:{}", host, port);
		debug!(%address, "connecting");

		let stream = match tokio::time::timeout(options.command_timeout, TcpStream::connect(&address)).await {
			Ok(Ok(stream)) => stream,
			Ok(Err(source)) => return Err(ConnectionError::ConnectFailed { address, source }),
			Err(_) => {
				return Err(ConnectionError::ConnectFailed {
					address,
					source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
				})
			}
		};
		if let Err(e) = stream.set_nodelay(true) {
			debug!("cannot set TCP_NODELAY: {}", e);
		}

		let (reader, writer) = stream.into_split();
		let writer: Writer = Arc::new(Mutex::new(Some(writer)));
		let open = Arc::new(AtomicBool::new(true));
		let (ack_tx, ack_rx) = mpsc::unbounded_channel();

		let task = ReceiveLoop {
			reader,
			writer: writer.clone(),
			open: open.clone(),
			acks: ack_tx,
			listener,
			options: options.clone(),
			address: address.clone(),
		};
		let handle = tokio::spawn(task.run());

		info!(%address, "connected");
		Ok(Connection {
			address,
			options,
			writer,
			open,
			acks: Mutex::new(AckQueue::new(ack_rx)),
			receiver: StdMutex::new(Some(handle)),
		})
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	pub fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}

	/// Write one frame. Any I/O error closes the socket.
	pub async fn send_frame(&self, message: &Message) -> Result<(), ConnectionError> {
		write_frame(&self.writer, &self.open, message).await
	}

	/// Close the socket and stop the receive loop. Safe to call repeatedly.
	pub async fn close(&self) {
		let was_open = self.open.swap(false, Ordering::SeqCst);

		let handle = self.receiver.lock().unwrap_or_else(|p| p.into_inner()).take();
		if let Some(handle) = handle {
			handle.abort();
		}
		if let Some(mut writer) = self.writer.lock().await.take() {
			let _ = writer.shutdown().await;
		}
		// A waiter holding the queue sees the channel close instead
		if let Ok(mut acks) = self.acks.try_lock() {
			acks.drain();
		}

		if was_open {
			info!(address = %self.address, "connection closed");
		}
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		self.open.store(false, Ordering::SeqCst);
		if let Some(handle) = self.receiver.get_mut().unwrap_or_else(|p| p.into_inner()).take() {
			handle.abort();
		}
	}
}

async fn write_frame(writer: &Writer, open: &AtomicBool, message: &Message) -> Result<(), ConnectionError> {
	let bytes = message.encode();
	let mut guard = writer.lock().await;
	let stream = guard.as_mut().ok_or(ConnectionError::NotConnected)?;

	if let Err(e) = stream.write_all(&bytes).await {
		warn!(command = ?message.command(), "write failed: {}", e);
		open.store(false, Ordering::SeqCst);
		if let Some(mut stream) = guard.take() {
			let _ = stream.shutdown().await;
		}
		return Err(e.into());
	}
	Ok(())
}

/// Fill `buf` completely, pausing briefly on interrupted reads.
/// End of stream before the buffer is full is an error.
async fn read_full<R>(reader: &mut R, buf: &mut [u8], backoff: Duration) -> Result<(), ProtocolError>
where
	R: AsyncRead + Unpin,
{
	let mut filled = 0;
	while filled < buf.len() {
		match reader.read(&mut buf[filled..]).await {
			Ok(0) => {
				return Err(ProtocolError::Io(std::io::Error::new(
					std::io::ErrorKind::UnexpectedEof,
					format!("connection closed after {} of {} bytes", filled, buf.len()),
				)))
			}
			Ok(n) => filled += n,
			Err(e)
				if e.kind() == std::io::ErrorKind::Interrupted
					|| e.kind() == std::io::ErrorKind::WouldBlock =>
			{
				tokio::time::sleep(backoff).await;
			}
			Err(e) => return Err(e.into()),
		}
	}
	Ok(())
}

/// Read and validate one frame
pub(crate) async fn read_frame<R>(reader: &mut R, options: &ConnectionOptions) -> Result<Message, ProtocolError>
where
	R: AsyncRead + Unpin,
{
	let mut head = [0u8; HEADER_LEN];
	read_full(reader, &mut head, options.read_backoff).await?;
	let header = Header::decode(&head)?;
	let size = header.payload_size(options.max_payload)?;

	let mut payload = vec![0u8; size];
	if size > 0 {
		read_full(reader, &mut payload, options.read_backoff).await?;
	}
	Message::from_parts(header, payload)
}

struct ReceiveLoop {
	reader: OwnedReadHalf,
	writer: Writer,
	open: Arc<AtomicBool>,
	acks: mpsc::UnboundedSender<Message>,
	listener: Arc<dyn CommandListener>,
	options: ConnectionOptions,
	address: String,
}

impl ReceiveLoop {
	async fn run(mut self) {
		let result = self.pump().await;
		match result {
			Err(ConnectionError::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
				info!(address = %self.address, "server closed the connection")
			}
			Err(ref e) => warn!(address = %self.address, "receive loop stopped: {}", e),
			Ok(()) => {}
		}

		self.open.store(false, Ordering::SeqCst);
		if let Some(mut writer) = self.writer.lock().await.take() {
			let _ = writer.shutdown().await;
		}
		self.listener.on_connection_lost();
	}

	async fn pump(&mut self) -> Result<(), ConnectionError> {
		loop {
			let message = read_frame(&mut self.reader, &self.options).await?;

			if message.is_request() {
				let reply = match self.listener.on_command(&message) {
					Some(reply) => reply,
					None => message.clone().into_reply(AckCode::Fail, Reason::None, false),
				};
				debug!(command = ?message.command(), ack = ?reply.ack(), "answering server request");
				write_frame(&self.writer, &self.open, &reply).await?;
			} else if self.acks.send(message).is_err() {
				// Connection handle dropped; nobody can wait for acks anymore
				return Ok(());
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::{Command, Document};

	#[tokio::test]
	async fn test_read_frame_from_split_writes() {
		let msg = Message::with_document(Command::StatusData, &Document::object().with("a", 1));
		let bytes = msg.encode();
		let (mut client, mut server) = tokio::io::duplex(8);
		let writer = tokio::spawn(async move {
			for chunk in bytes.chunks(5) {
				server.write_all(chunk).await.unwrap();
			}
			server
		});
		let got = read_frame(&mut client, &ConnectionOptions::default()).await.unwrap();
		writer.await.unwrap();
		assert_eq!(got.command(), Command::StatusData);
		assert_eq!(got.document().get_int("a"), 1);
	}

	#[tokio::test]
	async fn test_read_frame_rejects_oversized_payload() {
		let options = ConnectionOptions { max_payload: 4, ..ConnectionOptions::default() };
		let msg = Message::with_payload(Command::StatusData, vec![0u8; 5]);
		let bytes = msg.encode();
		let mut reader: &[u8] = &bytes;
		assert!(matches!(
			read_frame(&mut reader, &options).await,
			Err(ProtocolError::PayloadTooLarge { size: 5, max: 4 })
		));
	}

	#[tokio::test]
	async fn test_read_frame_eof() {
		let bytes = Message::new(Command::Keepalive).encode();
		let mut reader: &[u8] = &bytes[..20];
		match read_frame(&mut reader, &ConnectionOptions::default()).await {
			Err(ProtocolError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_connect_refused() {
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		struct Quiet;
		impl CommandListener for Quiet {
			fn on_command(&self, _: &Message) -> Option<Message> {
				None
			}
			fn on_connection_lost(&self) {}
		}

		let result = Connection::connect("127.0.0.1", port, ConnectionOptions::default(), Arc::new(Quiet)).await;
		assert!(matches!(result, Err(ConnectionError::ConnectFailed { .. })));
	}
}

// vim: ts=4
