//! Scripted mss_msg server for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use mssmon::protocol::{AckCode, Command, Document, Header, Message, Reason, HEADER_LEN};
use mssmon::session::login::compute_digest;

pub const CHALLENGE: &str = "abc123";
pub const SALT: &str = "s1";

/// Server behaviour knobs
#[derive(Clone)]
pub struct Script {
	pub password: String,
	pub units: Vec<&'static str>,
	pub file: Vec<u8>,
	/// Commands read but never answered
	pub mute: Vec<Command>,
}

impl Default for Script {
	fn default() -> Self {
		Script { password: "pw".to_string(), units: vec!["m1", "m2"], file: Vec::new(), mute: Vec::new() }
	}
}

type Writer = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

struct Shared {
	script: Script,
	requests: Mutex<Vec<(Command, Document)>>,
	replies: Mutex<Vec<Message>>,
	connections: AtomicUsize,
	latest: Mutex<Option<Writer>>,
	kick: Notify,
}

pub struct MockServer {
	pub port: u16,
	shared: Arc<Shared>,
}

impl MockServer {
	pub async fn start(script: Script) -> MockServer {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let shared = Arc::new(Shared {
			script,
			requests: Mutex::new(Vec::new()),
			replies: Mutex::new(Vec::new()),
			connections: AtomicUsize::new(0),
			latest: Mutex::new(None),
			kick: Notify::new(),
		});

		let accept_shared = shared.clone();
		tokio::spawn(async move {
			while let Ok((socket, _)) = listener.accept().await {
				accept_shared.connections.fetch_add(1, Ordering::SeqCst);
				tokio::spawn(serve(socket, accept_shared.clone()));
			}
		});
		MockServer { port, shared }
	}

	pub fn connections(&self) -> usize {
		self.shared.connections.load(Ordering::SeqCst)
	}

	/// Commands received so far, in order
	pub fn requests(&self) -> Vec<(Command, Document)> {
		self.shared.requests.lock().unwrap().clone()
	}

	pub fn count(&self, command: Command) -> usize {
		self.requests().iter().filter(|(c, _)| *c == command).count()
	}

	/// Client answers to frames pushed with [`MockServer::push`]
	pub fn replies(&self) -> Vec<Message> {
		self.shared.replies.lock().unwrap().clone()
	}

	/// Send an unsolicited frame on the latest connection
	pub async fn push(&self, message: Message) {
		self.push_raw(&message.encode()).await;
	}

	/// Write raw bytes on the latest connection
	pub async fn push_raw(&self, bytes: &[u8]) {
		let writer = self.shared.latest.lock().unwrap().clone().expect("no client connected");
		writer.lock().await.write_all(bytes).await.unwrap();
	}

	/// Drop every open client connection
	pub fn kick(&self) {
		self.shared.kick.notify_waiters();
	}

	/// Poll `check` until it holds or five seconds pass
	pub async fn wait_until<F>(&self, mut check: F)
	where
		F: FnMut(&MockServer) -> bool,
	{
		let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
		while !check(self) {
			assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	}
}

/// Read one frame; `None` on EOF or a bad frame
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Option<Message> {
	let mut head = [0u8; HEADER_LEN];
	reader.read_exact(&mut head).await.ok()?;
	let header = Header::decode(&head).ok()?;
	let mut payload = vec![0u8; header.payload_len as usize];
	reader.read_exact(&mut payload).await.ok()?;
	Message::from_parts(header, payload).ok()
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually<F>(mut check: F)
where
	F: FnMut() -> bool,
{
	let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
	while !check() {
		assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
}

async fn serve(socket: TcpStream, shared: Arc<Shared>) {
	let (mut reader, writer) = socket.into_split();
	let writer: Writer = Arc::new(tokio::sync::Mutex::new(writer));
	*shared.latest.lock().unwrap() = Some(writer.clone());

	loop {
		let message = tokio::select! {
			message = read_message(&mut reader) => message,
			_ = shared.kick.notified() => None,
		};
		let message = match message {
			Some(message) => message,
			None => break,
		};
		if !message.is_request() {
			shared.replies.lock().unwrap().push(message);
			continue;
		}

		shared.requests.lock().unwrap().push((message.command(), message.document()));
		if shared.script.mute.contains(&message.command()) {
			continue;
		}
		let reply = respond(&shared.script, &message);
		if writer.lock().await.write_all(&reply.encode()).await.is_err() {
			break;
		}
	}

	let _ = writer.lock().await.shutdown().await;
	let mut latest = shared.latest.lock().unwrap();
	if latest.as_ref().map(|w| Arc::ptr_eq(w, &writer)).unwrap_or(false) {
		*latest = None;
	}
}

fn ok(command: Command, doc: Option<Document>) -> Message {
	let payload = doc.map(|d| d.to_xml().into_bytes()).unwrap_or_default();
	Message::reply(command, AckCode::Success, Reason::None, payload)
}

fn respond(script: &Script, request: &Message) -> Message {
	let doc = request.document();
	let command = request.command();
	match command {
		Command::LoginRequest => ok(
			command,
			Some(Document::object().with(
				"mclient",
				Document::object().with("challenge", CHALLENGE).with("salt", SALT).with("type", "admin"),
			)),
		),
		Command::LoginPassword => {
			let user = doc.get_string("mclient/uid");
			let expected = compute_digest(&user, SALT, &script.password, CHALLENGE);
			if doc.get_string("mclient/digest") == expected {
				ok(command, None)
			} else {
				Message::reply(command, AckCode::Fail, Reason::AuthFail, Vec::new())
			}
		}
		Command::GetUnitList => {
			let items: Vec<Document> = script
				.units
				.iter()
				.map(|id| Document::object().with("mdu", *id).with("unit", "Unit 7").with("loc", "Oak House"))
				.collect();
			ok(command, Some(Document::object().with("mclient", Document::object().with("item", items))))
		}
		Command::StatusStart => ok(
			command,
			Some(Document::object().with("mclient", Document::object().with("mdup", Document::object().with("unitsub", 1)))),
		),
		Command::GetAlerts | Command::GetEvents => {
			let mdu = doc.get_string("mclient/mdu");
			let alert = Document::object().with("mdu", mdu.as_str()).with("type", 1);
			let event = Document::object().with("mdu", mdu.as_str()).with("type", 6);
			ok(
				command,
				Some(Document::object().with("mclient", Document::object().with("ai", vec![alert]).with("ei", vec![event]))),
			)
		}
		Command::GetCameraInfo => {
			let cameras = vec![Document::object().with("id", 1), Document::object().with("id", 2)];
			ok(
				command,
				Some(Document::object().with("mclient", Document::object().with("cameras", Document::object().with("ci", cameras)))),
			)
		}
		Command::ReadFile => {
			let start = (request.qword() as usize).min(script.file.len());
			let end = (start + request.dword() as usize).min(script.file.len());
			Message::reply(command, AckCode::Success, Reason::None, script.file[start..end].to_vec())
		}
		_ => ok(command, None),
	}
}

// vim: ts=4
