//! Session: login, keepalive, unit list and subscriptions
//!
//! One tokio task (the session actor) owns the main connection, the
//! credentials and every command sent on that connection. Everything else
//! talks to it through a [`SessionHandle`], which queues typed requests.
//! Commands are therefore strictly one at a time per connection.
//!
//! Shutdown and logout do not wait in that queue behind a command the
//! server never answers: the handle closes the main connection directly,
//! which fails the pending command at once.
//!
//! # Example
//!
//! ```ignore
//! use mssmon::config::Config;
//! use mssmon::session::SessionBuilder;
//!
//! let config = Config::load(None)?;
//! let session = SessionBuilder::from_config(&config)?.start();
//! session.login("acme", "alice", "secret")?;
//! session.wait_for_state(|s| s == RunState::Running).await;
//! ```

pub mod file;
pub mod login;
pub mod state;

pub use state::RunState;

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callbacks::{EventListCallback, ListKind, NoObserver, PoseCallback, SessionObserver, StatusCallback};
use crate::config::Config;
use crate::connection::{Connection, ConnectionOptions};
use crate::credentials::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
use crate::delivery::Delivery;
use crate::directory::{fetch_directory, Directory, DirectorySource, Endpoint, HttpDirectory};
use crate::dispatcher::Dispatcher;
use crate::error::SessionError;
use crate::notify::{NotificationFilter, Notifier};
use crate::protocol::{Command, Document, Message};
use crate::registry::{SubscriptionStatus, UnitRegistry, UnitSnapshot};

const ONE_DAY_SECS: i64 = 24 * 3600;

/// Host network reachability
pub trait NetworkMonitor: Send + Sync {
	fn is_available(&self) -> bool;
}

impl<F> NetworkMonitor for F
where
	F: Fn() -> bool + Send + Sync,
{
	fn is_available(&self) -> bool {
		self()
	}
}

/// Network monitor for hosts that are always connected
pub struct AlwaysOnline;

impl NetworkMonitor for AlwaysOnline {
	fn is_available(&self) -> bool {
		true
	}
}

/// Timing and endpoint settings of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
	pub connection: ConnectionOptions,
	pub keepalive_interval: Duration,
	pub reconnect_delay: Duration,
	pub directory_fetch_attempts: u32,
	pub directory_retry_delay: Duration,
	pub default_server: String,
	pub default_port: u16,
	/// Client id used when none is stored
	pub client_id: Option<String>,
	pub file_chunk_size: u32,
	pub history_days: u32,
	pub app_version: String,
	pub notification_filter: NotificationFilter,
}

impl From<&Config> for SessionOptions {
	fn from(config: &Config) -> Self {
		SessionOptions {
			connection: ConnectionOptions::from(config),
			keepalive_interval: config.keepalive_interval(),
			reconnect_delay: config.reconnect_delay(),
			directory_fetch_attempts: config.directory_fetch_attempts,
			directory_retry_delay: config.directory_retry_delay(),
			default_server: config.default_server.clone(),
			default_port: config.default_port,
			client_id: config.client_id.clone(),
			file_chunk_size: config.file_chunk_size,
			history_days: config.history_days,
			app_version: config.app_version.clone(),
			notification_filter: NotificationFilter::from_config(config),
		}
	}
}

impl Default for SessionOptions {
	fn default() -> Self {
		SessionOptions::from(&Config::default())
	}
}

/// Alert or event history request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
	pub kind: ListKind,
	pub units: Vec<String>,
	/// Unix seconds
	pub start: i64,
	pub end: i64,
}

impl EventQuery {
	/// The last `days` days, with the window ending one day ahead of now
	pub fn last_days(kind: ListKind, units: Vec<String>, days: u32) -> Self {
		let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);
		EventQuery { kind, units, start: now - ONE_DAY_SECS * days as i64, end: now + ONE_DAY_SECS }
	}

	fn command(&self) -> Command {
		match self.kind {
			ListKind::Alerts => Command::GetAlerts,
			ListKind::Events => Command::GetEvents,
		}
	}
}

enum Request {
	Login { credentials: Option<Credentials> },
	Logout { done: Option<oneshot::Sender<()>> },
	KeepAlive,
	GetUnitList,
	EventStart,
	StatusStart { callback: Option<Arc<dyn StatusCallback>> },
	StatusStop,
	LiveStart { mdu: String, camera: i64, callback: Arc<dyn PoseCallback> },
	LiveStop { mdu: String, camera: i64 },
	GetEvents { query: EventQuery, callback: Arc<dyn EventListCallback> },
	GetCameraInfo { mdu: String, reply: oneshot::Sender<Vec<Document>> },
	ReadFile { path: String, reply: oneshot::Sender<Vec<u8>> },
	NetworkAvailable,
	NetworkLost,
	Shutdown { done: oneshot::Sender<()> },
}

/// The main connection, shared with handles so they can cut it off
#[derive(Default)]
struct Link {
	current: Mutex<Option<Arc<Connection>>>,
}

impl Link {
	fn get(&self) -> Option<Arc<Connection>> {
		self.current.lock().unwrap_or_else(|p| p.into_inner()).clone()
	}

	fn replace(&self, connection: Option<Arc<Connection>>) -> Option<Arc<Connection>> {
		std::mem::replace(&mut *self.current.lock().unwrap_or_else(|p| p.into_inner()), connection)
	}

	fn is_open(&self) -> bool {
		self.get().map(|c| c.is_open()).unwrap_or(false)
	}

	/// Close the socket under whatever command is in flight
	async fn cut(&self) {
		if let Some(connection) = self.get() {
			connection.close().await;
		}
	}
}

/// Resolves once a stop was requested (or every handle is gone)
async fn stopped(stop: &mut watch::Receiver<bool>) {
	let _ = stop.wait_for(|stop| *stop).await;
}

/// Builder for a session
pub struct SessionBuilder {
	options: SessionOptions,
	store: Arc<dyn CredentialStore>,
	directory: Option<Arc<dyn DirectorySource>>,
	network: Arc<dyn NetworkMonitor>,
	observer: Arc<dyn SessionObserver>,
	notifier: Option<Arc<dyn Notifier>>,
	registry: UnitRegistry,
}

impl SessionBuilder {
	pub fn new(options: SessionOptions) -> Self {
		SessionBuilder {
			options,
			store: Arc::new(MemoryCredentialStore::default()),
			directory: None,
			network: Arc::new(AlwaysOnline),
			observer: Arc::new(NoObserver),
			notifier: None,
			registry: UnitRegistry::new(),
		}
	}

	/// Session persisting to the configured credential file and fetching
	/// the configured directory
	pub fn from_config(config: &Config) -> Result<Self, SessionError> {
		let mut builder = SessionBuilder::new(SessionOptions::from(config))
			.credential_store(Arc::new(FileCredentialStore::new(config.credentials_path.clone())));
		if !config.directory_url.is_empty() {
			let source = HttpDirectory::new(&config.directory_url, config.command_timeout())?;
			builder = builder.directory_source(Arc::new(source));
		}
		Ok(builder)
	}

	pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
		self.store = store;
		self
	}

	pub fn directory_source(mut self, source: Arc<dyn DirectorySource>) -> Self {
		self.directory = Some(source);
		self
	}

	pub fn network_monitor(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
		self.network = network;
		self
	}

	pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
		self.observer = observer;
		self
	}

	pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
		self.notifier = Some(notifier);
		self
	}

	/// Spawn the session actor. Must be called inside a tokio runtime.
	pub fn start(self) -> SessionHandle {
		let (tx, rx) = mpsc::unbounded_channel();
		let (state_tx, state_rx) = watch::channel(RunState::Stopped);
		let (stop_tx, stop_rx) = watch::channel(false);
		let link = Arc::new(Link::default());
		let delivery = Delivery::start();
		let user_type = Arc::new(Mutex::new(String::new()));

		let lost_tx = tx.downgrade();
		let mut dispatcher = Dispatcher::new(self.registry.clone(), delivery.clone()).on_lost(move || {
			if let Some(tx) = lost_tx.upgrade() {
				let _ = tx.send(Request::KeepAlive);
			}
		});
		if let Some(notifier) = self.notifier {
			dispatcher = dispatcher.with_notifier(notifier, self.options.notification_filter.clone());
		}

		let actor = SessionActor {
			tx: tx.downgrade(),
			options: self.options,
			registry: self.registry.clone(),
			delivery: delivery.clone(),
			dispatcher,
			store: self.store,
			directory_source: self.directory,
			network: self.network,
			observer: self.observer,
			state: state_tx,
			user_type: user_type.clone(),
			link: link.clone(),
			credentials: Credentials::default(),
			directory: Directory::default(),
			parked: false,
			keepalive_timer: None,
			retry_timer: None,
		};
		tokio::spawn(actor.run(rx, stop_rx));

		SessionHandle {
			tx,
			state: state_rx,
			stop: Arc::new(stop_tx),
			link,
			registry: self.registry,
			delivery,
			user_type,
		}
	}
}

/// Cloneable front end of a running session
#[derive(Clone)]
pub struct SessionHandle {
	tx: UnboundedSender<Request>,
	state: watch::Receiver<RunState>,
	stop: Arc<watch::Sender<bool>>,
	link: Arc<Link>,
	registry: UnitRegistry,
	delivery: Delivery,
	user_type: Arc<Mutex<String>>,
}

impl SessionHandle {
	fn send(&self, request: Request) -> Result<(), SessionError> {
		self.tx.send(request).map_err(|_| SessionError::Stopped)
	}

	pub fn state(&self) -> RunState {
		*self.state.borrow()
	}

	/// Receiver that sees every published state
	pub fn watch_state(&self) -> watch::Receiver<RunState> {
		self.state.clone()
	}

	/// Wait until the published state satisfies `accept`
	pub async fn wait_for_state<F>(&self, mut accept: F) -> RunState
	where
		F: FnMut(RunState) -> bool,
	{
		let mut rx = self.state.clone();
		loop {
			let state = *rx.borrow_and_update();
			if accept(state) {
				return state;
			}
			if rx.changed().await.is_err() {
				return *rx.borrow();
			}
		}
	}

	pub fn registry(&self) -> &UnitRegistry {
		&self.registry
	}

	pub fn units(&self) -> Vec<UnitSnapshot> {
		self.registry.snapshot_all()
	}

	/// User type reported by the last login
	pub fn user_type(&self) -> String {
		self.user_type.lock().unwrap_or_else(|p| p.into_inner()).clone()
	}

	/// Wait until every callback posted so far has run
	pub async fn flush_callbacks(&self) {
		self.delivery.flush().await
	}

	/// Log in with new credentials
	pub fn login(&self, client_id: &str, username: &str, password: &str) -> Result<(), SessionError> {
		let credentials = Credentials::new(client_id, username, password);
		self.send(Request::Login { credentials: Some(credentials) })
	}

	/// Retry the login with the stored credentials
	pub fn relogin(&self) -> Result<(), SessionError> {
		self.send(Request::Login { credentials: None })
	}

	/// Log out, forget the user and every unit
	pub async fn logout(&self) -> Result<(), SessionError> {
		let (done, wait) = oneshot::channel();
		self.send(Request::Logout { done: Some(done) })?;
		self.link.cut().await;
		wait.await.map_err(|_| SessionError::Stopped)
	}

	/// Probe the connection now (also what an external scheduler calls)
	pub fn keepalive(&self) -> Result<(), SessionError> {
		self.send(Request::KeepAlive)
	}

	pub fn refresh_units(&self) -> Result<(), SessionError> {
		self.send(Request::GetUnitList)
	}

	/// Re-issue the status subscription that carries alerts
	pub fn event_start(&self) -> Result<(), SessionError> {
		self.send(Request::EventStart)
	}

	/// Deliver status updates of every unit to `callback`
	pub fn status_start(&self, callback: Arc<dyn StatusCallback>) -> Result<(), SessionError> {
		self.send(Request::StatusStart { callback: Some(callback) })
	}

	/// Mute status callbacks. The server keeps pushing.
	pub fn status_stop(&self) -> Result<(), SessionError> {
		self.send(Request::StatusStop)
	}

	pub fn live_start(&self, mdu: &str, camera: i64, callback: Arc<dyn PoseCallback>) -> Result<(), SessionError> {
		self.send(Request::LiveStart { mdu: mdu.to_string(), camera, callback })
	}

	pub fn live_stop(&self, mdu: &str, camera: i64) -> Result<(), SessionError> {
		self.send(Request::LiveStop { mdu: mdu.to_string(), camera })
	}

	pub fn get_events(&self, query: EventQuery, callback: Arc<dyn EventListCallback>) -> Result<(), SessionError> {
		self.send(Request::GetEvents { query, callback })
	}

	/// Camera list of a unit; empty on failure
	pub async fn get_camera_info(&self, mdu: &str) -> Result<Vec<Document>, SessionError> {
		let (reply, wait) = oneshot::channel();
		self.send(Request::GetCameraInfo { mdu: mdu.to_string(), reply })?;
		wait.await.map_err(|_| SessionError::Stopped)
	}

	/// Read a remote file over a separate connection; empty on failure
	pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, SessionError> {
		let (reply, wait) = oneshot::channel();
		self.send(Request::ReadFile { path: path.to_string(), reply })?;
		wait.await.map_err(|_| SessionError::Stopped)
	}

	/// Network monitor callback: a network became available
	pub fn network_available(&self) -> Result<(), SessionError> {
		self.send(Request::NetworkAvailable)
	}

	/// Network monitor callback: a network went away
	pub fn network_lost(&self) -> Result<(), SessionError> {
		self.send(Request::NetworkLost)
	}

	/// Stop the session and wait for the actor to finish. A command in
	/// flight is abandoned and requests still queued are dropped.
	pub async fn shutdown(&self) -> Result<(), SessionError> {
		let (done, wait) = oneshot::channel();
		self.send(Request::Shutdown { done })?;
		self.stop.send_replace(true);
		self.link.cut().await;
		wait.await.map_err(|_| SessionError::Stopped)
	}
}

struct SessionActor {
	tx: WeakUnboundedSender<Request>,
	options: SessionOptions,
	registry: UnitRegistry,
	delivery: Delivery,
	dispatcher: Dispatcher,
	store: Arc<dyn CredentialStore>,
	directory_source: Option<Arc<dyn DirectorySource>>,
	network: Arc<dyn NetworkMonitor>,
	observer: Arc<dyn SessionObserver>,
	state: watch::Sender<RunState>,
	user_type: Arc<Mutex<String>>,

	link: Arc<Link>,
	credentials: Credentials,
	directory: Directory,
	/// Waiting for the user: no automatic login retries
	parked: bool,
	keepalive_timer: Option<JoinHandle<()>>,
	retry_timer: Option<JoinHandle<()>>,
}

impl SessionActor {
	async fn run(mut self, mut rx: UnboundedReceiver<Request>, mut stop: watch::Receiver<bool>) {
		self.set_state(RunState::Starting);
		tokio::select! {
			_ = self.start_up() => {}
			_ = stopped(&mut stop) => {}
		}

		let mut done = None;
		while let Some(request) = rx.recv().await {
			if let Request::Shutdown { done: reply } = request {
				done = Some(reply);
				break;
			}
			if *stop.borrow() {
				continue;
			}
			tokio::select! {
				_ = self.handle(request) => {}
				_ = stopped(&mut stop) => debug!("request abandoned for shutdown"),
			}
		}

		self.cancel_timers();
		self.close_connection().await;
		self.set_state(RunState::Stopped);
		self.delivery.flush().await;
		info!("session stopped");
		if let Some(done) = done {
			let _ = done.send(());
		}
	}

	async fn start_up(&mut self) {
		self.load_credentials().await;
		self.init().await;
	}

	async fn handle(&mut self, request: Request) {
		match request {
			Request::Login { credentials } => self.login(credentials).await,
			Request::Logout { done } => {
				self.logout().await;
				if let Some(done) = done {
					let _ = done.send(());
				}
			}
			Request::KeepAlive => self.keepalive().await,
			Request::GetUnitList => self.refresh_units().await,
			Request::EventStart => self.status_start(false).await,
			Request::StatusStart { callback } => {
				self.registry.set_status_callback(callback);
				self.status_start(true).await
			}
			Request::StatusStop => self.status_stop(),
			Request::LiveStart { mdu, camera, callback } => self.live_start(&mdu, camera, callback).await,
			Request::LiveStop { mdu, camera } => self.live_stop(&mdu, camera).await,
			Request::GetEvents { query, callback } => self.get_events(query, callback).await,
			Request::GetCameraInfo { mdu, reply } => {
				let cameras = self.camera_info(&mdu).await;
				let _ = reply.send(cameras);
			}
			Request::ReadFile { path, reply } => self.read_file(path, reply),
			Request::NetworkAvailable => {
				if self.current_state().is_reconnectable() {
					self.init().await
				}
			}
			Request::NetworkLost => self.keepalive().await,
			Request::Shutdown { .. } => {}
		}
	}

	// ========================================================================
	// STATE & PLUMBING
	// ========================================================================

	fn current_state(&self) -> RunState {
		*self.state.borrow()
	}

	fn set_state(&mut self, state: RunState) {
		let previous = self.current_state();
		if previous == state {
			return;
		}
		info!(from = %previous, to = %state, "session state changed");
		self.state.send_replace(state);
		let observer = self.observer.clone();
		self.delivery.post(move || observer.on_state(state));
	}

	fn fail(&self, message: &'static str) {
		let observer = self.observer.clone();
		self.delivery.post(move || observer.on_failure(message));
	}

	fn is_running(&self) -> bool {
		self.current_state() == RunState::Running && self.link.is_open()
	}

	async fn command(&self, command: Command, payload: Option<&Document>) -> Option<Message> {
		let connection = self.link.get()?;
		connection.send_command(command, payload).await
	}

	fn schedule(&self, delay: Duration, make: fn() -> Request) -> JoinHandle<()> {
		let tx = self.tx.clone();
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			if let Some(tx) = tx.upgrade() {
				let _ = tx.send(make());
			}
		})
	}

	fn schedule_keepalive(&mut self) {
		if let Some(timer) = self.keepalive_timer.take() {
			timer.abort();
		}
		self.keepalive_timer = Some(self.schedule(self.options.keepalive_interval, || Request::KeepAlive));
	}

	fn schedule_login(&mut self, delay: Duration) {
		self.cancel_retry();
		debug!(?delay, "login retry scheduled");
		self.retry_timer = Some(self.schedule(delay, || Request::Login { credentials: None }));
	}

	fn cancel_retry(&mut self) {
		if let Some(timer) = self.retry_timer.take() {
			timer.abort();
		}
	}

	fn cancel_timers(&mut self) {
		self.cancel_retry();
		if let Some(timer) = self.keepalive_timer.take() {
			timer.abort();
		}
	}

	async fn close_connection(&mut self) {
		if let Some(connection) = self.link.replace(None) {
			connection.close().await;
		}
	}

	fn endpoint(&self) -> Endpoint {
		self.directory.resolve(&self.credentials.client_id, &self.options.default_server, self.options.default_port)
	}

	// ========================================================================
	// CREDENTIALS
	// ========================================================================

	async fn load_credentials(&mut self) {
		let mut credentials = match self.store.load().await {
			Ok(credentials) => credentials,
			Err(e) => {
				warn!("cannot load stored credentials: {}", e);
				Credentials::default()
			}
		};

		if credentials.client_id.is_empty() {
			if let Some(ref client_id) = self.options.client_id {
				credentials.client_id = client_id.clone();
			}
		}
		if let Some(ref cached) = credentials.directory {
			if let Some(directory) = Directory::parse(cached) {
				self.directory = directory;
			}
		}

		// A new app version asks the user to log in again
		let stamp_matches = credentials.version_stamp.as_deref() == Some(self.options.app_version.as_str());
		if !credentials.username.is_empty() && !stamp_matches {
			info!(stored = ?credentials.version_stamp, current = %self.options.app_version, "app version changed, login required");
			credentials.username.clear();
		}

		self.credentials = credentials;
		self.persist().await;
	}

	async fn persist(&self) {
		if let Err(e) = self.store.save(&self.credentials).await {
			warn!("cannot save credentials: {}", e);
		}
	}

	// ========================================================================
	// CONNECT, LOGIN, LOGOUT
	// ========================================================================

	async fn init(&mut self) {
		if self.is_running() {
			return;
		}
		if !self.network.is_available() {
			info!("no network");
			self.set_state(RunState::NoNetwork);
			return;
		}
		self.set_state(RunState::Connecting);

		if let Some(source) = self.directory_source.clone() {
			let attempts = self.options.directory_fetch_attempts;
			let delay = self.options.directory_retry_delay;
			if let Some(directory) = fetch_directory(source.as_ref(), attempts, delay).await {
				self.credentials.directory = Some(directory.to_json());
				self.directory = directory;
				self.persist().await;
			}
		}

		self.login(None).await;
	}

	async fn login(&mut self, credentials: Option<Credentials>) {
		let explicit = credentials.is_some();
		if self.is_running() && !explicit {
			return;
		}
		self.cancel_retry();
		self.close_connection().await;

		if let Some(new) = credentials {
			self.credentials.client_id = new.client_id;
			self.credentials.username = new.username;
			self.credentials.password = new.password;
			self.parked = false;
		}
		if !self.credentials.is_complete() {
			debug!("no stored login, waiting for user");
			self.parked = true;
			self.set_state(RunState::AwaitingUserLogin);
			return;
		}
		if !self.network.is_available() {
			self.set_state(RunState::NoNetwork);
			return;
		}

		self.set_state(RunState::Connecting);
		let endpoint = self.endpoint();
		info!(client = %endpoint.client_id, server = %endpoint.server, port = endpoint.port, "logging in");
		let result = login::login(
			&endpoint,
			&self.credentials.username,
			&self.credentials.password,
			self.options.connection.clone(),
			Arc::new(self.dispatcher.clone()),
		)
		.await;

		match result {
			Ok(logged_in) => {
				self.link.replace(Some(Arc::new(logged_in.connection)));
				*self.user_type.lock().unwrap_or_else(|p| p.into_inner()) = logged_in.user_type;
				self.parked = false;
				self.set_state(RunState::LoginSucceeded);

				self.credentials.version_stamp = Some(self.options.app_version.clone());
				self.persist().await;

				self.schedule_keepalive();
				self.refresh_units().await;
			}
			Err(e) => {
				// Transport failures are retried by the keepalive cycle;
				// anything else waits for the user
				self.parked = !matches!(e, SessionError::Connection(_));
				warn!(parked = self.parked, "login failed: {}", e);
				self.set_state(RunState::AwaitingUserLogin);
				self.fail("Connection to server failed");
			}
		}
	}

	async fn logout(&mut self) {
		if self.current_state() == RunState::Stopped {
			return;
		}
		info!(user = %self.credentials.username, "logging out");
		self.cancel_retry();
		self.close_connection().await;
		self.credentials.clear_user();
		self.registry.clear();
		self.user_type.lock().unwrap_or_else(|p| p.into_inner()).clear();
		self.parked = true;
		self.set_state(RunState::AwaitingUserLogin);
		self.persist().await;
	}

	// ========================================================================
	// KEEPALIVE
	// ========================================================================

	async fn keepalive(&mut self) {
		if self.command(Command::Keepalive, None).await.is_some() {
			debug!("keepalive ok");
		} else {
			self.connection_failed().await;
		}
		self.schedule_keepalive();
	}

	async fn connection_failed(&mut self) {
		self.close_connection().await;

		if !self.network.is_available() {
			self.set_state(RunState::NoNetwork);
			let cleared = self.registry.clear_status_payloads();
			if let Some(callback) = self.registry.status_callback() {
				for mdu in cleared {
					let callback = callback.clone();
					self.delivery.post(move || callback.on_status(&mdu, None));
				}
			}
			return;
		}

		if self.parked || !self.credentials.is_complete() {
			debug!("connection down, waiting for user login");
			self.set_state(RunState::AwaitingUserLogin);
			return;
		}

		warn!(delay = ?self.options.reconnect_delay, "connection lost, reconnecting");
		self.set_state(RunState::Connecting);
		self.schedule_login(self.options.reconnect_delay);
	}

	// ========================================================================
	// UNITS & SUBSCRIPTIONS
	// ========================================================================

	async fn refresh_units(&mut self) {
		let reply = match self.command(Command::GetUnitList, None).await {
			Some(reply) => reply,
			None => {
				warn!("unit list request failed");
				if let Some(tx) = self.tx.upgrade() {
					let _ = tx.send(Request::KeepAlive);
				}
				return;
			}
		};

		let mut count = 0;
		for item in reply.document().get_array("mclient/item") {
			let id = item.get_string("mdu");
			if id.is_empty() {
				continue;
			}
			if self.registry.upsert_unit_info(&id, item) {
				debug!(mdu = %id, "new unit");
			}
			count += 1;
		}
		info!(units = count, "unit list refreshed");

		self.set_state(RunState::Running);
		// Status pushes double as the alert channel
		self.status_start(false).await;
	}

	/// Subscribe every unit to status pushes. `explicit` marks the units
	/// running so the status callback fires for their pushes.
	async fn status_start(&mut self, explicit: bool) {
		for id in self.registry.ids() {
			if !self.link.is_open() {
				debug!("connection closed, status start stopped");
				break;
			}
			let request = Document::object().with("mclient", Document::object().with("mdu", id.as_str()));
			match self.command(Command::StatusStart, Some(&request)).await {
				Some(reply) => {
					if explicit {
						self.registry.set_subscription(&id, SubscriptionStatus::Running);
					}
					self.registry.set_live_status(&id, reply.document().get("mclient/mdup").cloned());
				}
				None => {
					debug!(mdu = %id, "status start failed");
					self.registry.set_subscription(&id, SubscriptionStatus::Failed);
					self.registry.set_live_status(&id, None);
				}
			}
		}

		if let Some(callback) = self.registry.status_callback() {
			for unit in self.registry.snapshot_all() {
				let callback = callback.clone();
				self.delivery.post(move || callback.on_status(&unit.id, unit.status_payload.as_ref()));
			}
		}
	}

	/// Local only: the server is never told to stop
	fn status_stop(&mut self) {
		self.registry.set_status_callback(None);
		self.registry.set_all_subscriptions(SubscriptionStatus::Stopped);
	}

	async fn live_start(&mut self, mdu: &str, camera: i64, callback: Arc<dyn PoseCallback>) {
		if !self.registry.contains(mdu) {
			debug!(mdu, "live view for unknown unit ignored");
			return;
		}
		self.registry.clear_pose_subscription(mdu, camera);

		let request = Document::object().with("mclient", Document::object().with("mdu", mdu).with("camera", camera));
		if self.command(Command::LiveViewStart, Some(&request)).await.is_some() {
			self.registry.set_pose_subscription(mdu, camera, true, Some(callback));
			info!(mdu, camera, "live view started");
		} else {
			warn!(mdu, camera, "live view start failed");
		}
	}

	async fn live_stop(&mut self, mdu: &str, camera: i64) {
		if !self.registry.clear_pose_subscription(mdu, camera) {
			return;
		}
		let request = Document::object().with("mclient", Document::object().with("mdu", mdu).with("camera", camera));
		if self.command(Command::LiveViewStop, Some(&request)).await.is_none() {
			debug!(mdu, camera, "live view stop not acknowledged");
		}
	}

	// ========================================================================
	// QUERIES
	// ========================================================================

	async fn get_events(&mut self, query: EventQuery, callback: Arc<dyn EventListCallback>) {
		let command = query.command();
		for mdu in query.units.iter() {
			if !self.link.is_open() {
				debug!("connection closed, history query stopped");
				break;
			}
			let request = Document::object().with(
				"mclient",
				Document::object()
					.with("mdu", mdu.as_str())
					.with("start", query.start)
					.with("end", query.end),
			);
			let reply = match self.command(command, Some(&request)).await {
				Some(reply) => reply.document(),
				None => continue,
			};
			let alerts = reply.get_array("mclient/ai");
			let events = reply.get_array("mclient/ei");
			let callback = callback.clone();
			let mdu = mdu.clone();
			self.delivery.post(move || {
				callback.on_list(&mdu, ListKind::Alerts, &alerts);
				callback.on_list(&mdu, ListKind::Events, &events);
			});
		}
		self.delivery.post(move || callback.on_complete());
	}

	async fn camera_info(&mut self, mdu: &str) -> Vec<Document> {
		if !self.registry.contains(mdu) {
			return Vec::new();
		}
		let request = Document::object().with("mclient", Document::object().with("mdu", mdu));
		match self.command(Command::GetCameraInfo, Some(&request)).await {
			Some(reply) => reply.document().get_array("mclient/cameras/ci"),
			None => Vec::new(),
		}
	}

	/// File reads run on their own connection, off the actor
	fn read_file(&mut self, path: String, reply: oneshot::Sender<Vec<u8>>) {
		let endpoint = self.endpoint();
		let username = self.credentials.username.clone();
		let password = self.credentials.password.clone();
		let options = self.options.connection.clone();
		let chunk_size = self.options.file_chunk_size;
		let listener = Arc::new(self.dispatcher.detached());

		tokio::spawn(async move {
			let data = match login::login(&endpoint, &username, &password, options, listener).await {
				Ok(side) => {
					let data = file::read_remote_file(&side.connection, &path, chunk_size).await;
					side.connection.close().await;
					data
				}
				Err(e) => {
					warn!(%path, "cannot open file connection: {}", e);
					Vec::new()
				}
			};
			let _ = reply.send(data);
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_event_query_window() {
		let q = EventQuery::last_days(ListKind::Events, vec!["m1".to_string()], 7);
		assert_eq!(q.end - q.start, 8 * ONE_DAY_SECS);
		assert_eq!(q.command(), Command::GetEvents);
		let q = EventQuery { kind: ListKind::Alerts, ..q };
		assert_eq!(q.command(), Command::GetAlerts);
	}

	#[test]
	fn test_options_from_config() {
		let config = Config { keepalive_interval_secs: 42, client_id: Some("acme".to_string()), ..Config::default() };
		let options = SessionOptions::from(&config);
		assert_eq!(options.keepalive_interval, Duration::from_secs(42));
		assert_eq!(options.client_id.as_deref(), Some("acme"));
		assert_eq!(options.connection.command_timeout, Duration::from_secs(30));
	}

	#[tokio::test]
	async fn test_parks_without_credentials() {
		let session = SessionBuilder::new(SessionOptions::default()).start();
		let state = tokio::time::timeout(
			Duration::from_secs(5),
			session.wait_for_state(|s| s == RunState::AwaitingUserLogin),
		)
		.await
		.unwrap();
		assert_eq!(state, RunState::AwaitingUserLogin);
		session.shutdown().await.unwrap();
		assert_eq!(session.state(), RunState::Stopped);
	}

	#[tokio::test]
	async fn test_no_network() {
		let session = SessionBuilder::new(SessionOptions::default())
			.network_monitor(Arc::new(|| false))
			.start();
		let state = tokio::time::timeout(Duration::from_secs(5), session.wait_for_state(|s| s == RunState::NoNetwork))
			.await
			.unwrap();
		assert_eq!(state, RunState::NoNetwork);
		assert!(session.get_camera_info("m1").await.unwrap().is_empty());
		session.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_version_change_clears_user() {
		let mut stored = Credentials::new("acme", "alice", "pw");
		stored.version_stamp = Some("0.0.1".to_string());
		let store = Arc::new(MemoryCredentialStore::new(stored));
		let session = SessionBuilder::new(SessionOptions::default()).credential_store(store.clone()).start();
		tokio::time::timeout(Duration::from_secs(5), session.wait_for_state(|s| s == RunState::AwaitingUserLogin))
			.await
			.unwrap();
		let current = store.current();
		assert_eq!(current.username, "");
		assert_eq!(current.client_id, "acme");
		session.shutdown().await.unwrap();
	}
}

// vim: ts=4
