//! Routing of server-pushed frames
//!
//! The [`Dispatcher`] is the [`CommandListener`] of the session's main
//! connection. It updates the registry on the receive loop and posts
//! user callbacks to the delivery thread. Every push is acknowledged.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::CommandListener;
use crate::delivery::Delivery;
use crate::notify::{alert_notification, NotificationFilter, Notifier};
use crate::protocol::{AckCode, Command, Document, Message, Reason};
use crate::registry::UnitRegistry;

type LostFn = dyn Fn() + Send + Sync;

/// Push handler shared by a connection's receive loop
#[derive(Clone)]
pub struct Dispatcher {
	registry: UnitRegistry,
	delivery: Delivery,
	notifier: Option<Arc<dyn Notifier>>,
	filter: NotificationFilter,
	on_lost: Option<Arc<LostFn>>,
}

impl Dispatcher {
	pub fn new(registry: UnitRegistry, delivery: Delivery) -> Self {
		Dispatcher { registry, delivery, notifier: None, filter: NotificationFilter::default(), on_lost: None }
	}

	pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, filter: NotificationFilter) -> Self {
		self.notifier = Some(notifier);
		self.filter = filter;
		self
	}

	/// Called from the receive loop when the connection drops
	pub fn on_lost<F>(mut self, f: F) -> Self
	where
		F: Fn() + Send + Sync + 'static,
	{
		self.on_lost = Some(Arc::new(f));
		self
	}

	/// Same routing, without a connection-lost hook
	pub fn detached(&self) -> Self {
		Dispatcher { on_lost: None, ..self.clone() }
	}

	fn pose(&self, doc: &Document) {
		let mdu = doc.get_string("mclient/mdu");
		let camera = doc.get_int("mclient/mdup/cam");
		if let Some(callback) = self.registry.pose_callback(&mdu, camera) {
			let poses = doc.get_array("mclient/mdup/poses/pose");
			self.delivery.post(move || callback.on_pose(&mdu, camera, &poses));
		}
	}

	fn status(&self, doc: &Document) {
		let mdu = doc.get_string("mclient/mdu");
		let payload = doc.get("mclient/mdup").cloned();
		if let Some(callback) = self.registry.apply_status_push(&mdu, payload.clone()) {
			self.delivery.post(move || callback.on_status(&mdu, payload.as_ref()));
		}
	}

	fn event(&self, doc: &Document) {
		let mdu = doc.get_string("mclient/mdu");
		if !self.registry.set_event(&mdu, doc.get("mclient/mdup").cloned()) {
			debug!(%mdu, "event for unknown unit");
		}
	}

	fn alert(&self, doc: &Document) {
		let alert = match doc.get("mclient/ai") {
			Some(ai @ Document::Object(_)) => ai.clone(),
			_ => {
				debug!("alert without item");
				return;
			}
		};
		let mdu = alert.get_string("mdu");
		self.registry.set_alert(&mdu, alert.clone());

		if let Some(ref notifier) = self.notifier {
			if let Some(notification) = alert_notification(&alert, &self.registry, &self.filter) {
				let notifier = notifier.clone();
				self.delivery.post(move || notifier.notify(&notification));
			}
		}
	}
}

impl CommandListener for Dispatcher {
	fn on_command(&self, message: &Message) -> Option<Message> {
		let command = message.command();
		let handled = match command {
			Command::PoseData => {
				self.pose(&message.document());
				true
			}
			Command::StatusData => {
				self.status(&message.document());
				true
			}
			Command::EventData => {
				self.event(&message.document());
				true
			}
			Command::NotifyAlert => {
				self.alert(&message.document());
				true
			}
			Command::Keepalive => {
				return Some(message.clone().into_reply(AckCode::Success, Reason::None, true));
			}
			_ => false,
		};

		if handled {
			Some(message.clone().into_reply(AckCode::Success, Reason::None, false))
		} else {
			warn!(?command, "unknown server command");
			Some(message.clone().into_reply(AckCode::Fail, Reason::UnknownCommand, false))
		}
	}

	fn on_connection_lost(&self) {
		if let Some(ref on_lost) = self.on_lost {
			on_lost();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::{PoseCallback, StatusCallback};
	use crate::notify::Notification;
	use crate::registry::SubscriptionStatus;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;

	fn setup() -> (UnitRegistry, Delivery, Dispatcher) {
		let registry = UnitRegistry::new();
		registry.upsert_unit_info("m1", Document::object().with("unit", "U1").with("loc", "L1"));
		let delivery = Delivery::start();
		let dispatcher = Dispatcher::new(registry.clone(), delivery.clone());
		(registry, delivery, dispatcher)
	}

	fn push(command: Command, doc: Document) -> Message {
		Message::with_document(command, &doc)
	}

	#[tokio::test]
	async fn test_unknown_command_is_nacked() {
		let (_, _, dispatcher) = setup();
		let reply = dispatcher.on_command(&Message::with_payload(Command::Other(77), b"x".to_vec())).unwrap();
		assert_eq!(reply.ack(), AckCode::Fail);
		assert_eq!(reply.reason(), Reason::UnknownCommand);
		assert_eq!(reply.command(), Command::Other(77));
		assert!(reply.payload().is_empty());
	}

	#[tokio::test]
	async fn test_keepalive_echo_keeps_payload() {
		let (_, _, dispatcher) = setup();
		let reply = dispatcher.on_command(&Message::with_payload(Command::Keepalive, b"ping".to_vec())).unwrap();
		assert!(reply.is_success());
		assert_eq!(reply.payload(), b"ping");
	}

	#[tokio::test]
	async fn test_status_push() {
		let (registry, delivery, dispatcher) = setup();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		let cb: Arc<dyn StatusCallback> = Arc::new(move |mdu: &str, status: Option<&Document>| {
			sink.lock().unwrap().push((mdu.to_string(), status.map(|s| s.get_int("status"))));
		});
		registry.set_status_callback(Some(cb));

		let doc = Document::object().with(
			"mclient",
			Document::object().with("mdu", "m1").with("mdup", Document::object().with("status", 6)),
		);
		// Not running yet: stored, not delivered
		let reply = dispatcher.on_command(&push(Command::StatusData, doc.clone())).unwrap();
		assert!(reply.is_success());
		assert!(reply.payload().is_empty());
		registry.set_subscription("m1", SubscriptionStatus::Running);
		dispatcher.on_command(&push(Command::StatusData, doc));

		let cleared = Document::object().with("mclient", Document::object().with("mdu", "m1"));
		dispatcher.on_command(&push(Command::StatusData, cleared));

		delivery.flush().await;
		assert_eq!(
			*seen.lock().unwrap(),
			vec![("m1".to_string(), Some(6)), ("m1".to_string(), None)]
		);
		assert_eq!(registry.snapshot("m1").unwrap().status_payload, None);
	}

	#[tokio::test]
	async fn test_pose_push_only_for_running_camera() {
		let (registry, delivery, dispatcher) = setup();
		let frames = Arc::new(AtomicUsize::new(0));
		let counter = frames.clone();
		let cb: Arc<dyn PoseCallback> = Arc::new(move |_: &str, camera: i64, poses: &[Document]| {
			assert_eq!(camera, 1);
			counter.fetch_add(poses.len(), Ordering::SeqCst);
		});
		registry.set_pose_subscription("m1", 1, true, Some(cb));

		let frame = |cam: i64| {
			Document::object().with(
				"mclient",
				Document::object().with("mdu", "m1").with(
					"mdup",
					Document::object().with("cam", cam).with(
						"poses",
						Document::object().with(
							"pose",
							vec![Document::object().with("x", 1), Document::object().with("x", 2)],
						),
					),
				),
			)
		};
		dispatcher.on_command(&push(Command::PoseData, frame(1)));
		dispatcher.on_command(&push(Command::PoseData, frame(2)));
		delivery.flush().await;
		assert_eq!(frames.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_alert_notifies_and_stores() {
		let (registry, delivery, dispatcher) = setup();
		let seen = Arc::new(Mutex::new(Vec::<Notification>::new()));
		let sink = seen.clone();
		let dispatcher = dispatcher.with_notifier(
			Arc::new(move |n: &Notification| sink.lock().unwrap().push(n.clone())),
			NotificationFilter::default(),
		);

		let ai = Document::object().with("mdu", "m1").with("room", "Bath").with("type", 18);
		let doc = Document::object().with("mclient", Document::object().with("ai", ai));
		assert!(dispatcher.on_command(&push(Command::NotifyAlert, doc)).unwrap().is_success());
		delivery.flush().await;

		let seen = seen.lock().unwrap();
		assert_eq!(seen.len(), 1);
		assert_eq!(seen[0].text, "in Bath, U1, L1");
		let stored = registry.snapshot("m1").unwrap().alert_payload.unwrap();
		assert_eq!(stored.get_int("type"), 18);
		assert_eq!(stored.get_string("room"), "Bath");
	}

	#[tokio::test]
	async fn test_connection_lost_hook() {
		let (_, _, dispatcher) = setup();
		let lost = Arc::new(AtomicUsize::new(0));
		let counter = lost.clone();
		let dispatcher = dispatcher.on_lost(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		dispatcher.on_connection_lost();
		dispatcher.detached().on_connection_lost();
		assert_eq!(lost.load(Ordering::SeqCst), 1);
	}
}

// vim: ts=4
