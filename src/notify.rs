//! Alert notifications
//!
//! Alert pushes are turned into a [`Notification`] and handed to a
//! [`Notifier`] when the event type passes the user's filter.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::config::Config;
use crate::protocol::{Document, EventType};
use crate::registry::UnitRegistry;

/// A local notification request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
	pub event: EventType,
	pub mdu: String,
	pub title: String,
	pub text: String,
}

/// Receiver of notification requests (the OS notification layer)
pub trait Notifier: Send + Sync {
	fn notify(&self, notification: &Notification);
}

impl<F> Notifier for F
where
	F: Fn(&Notification) + Send + Sync,
{
	fn notify(&self, notification: &Notification) {
		self(notification)
	}
}

/// Notifier that writes to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
	fn notify(&self, notification: &Notification) {
		info!(mdu = %notification.mdu, event = notification.event.code(), "{}: {}", notification.title, notification.text);
	}
}

/// Which event types may raise a notification
#[derive(Debug, Clone)]
pub struct NotificationFilter {
	enabled: bool,
	allow: Option<HashSet<u32>>,
}

impl NotificationFilter {
	/// `allow` of `None` lets every event type through
	pub fn new(enabled: bool, allow: Option<Vec<u32>>) -> Self {
		NotificationFilter { enabled, allow: allow.map(|codes| codes.into_iter().collect()) }
	}

	pub fn from_config(config: &Config) -> Self {
		Self::new(config.notifications_enabled, config.notification_filter.clone())
	}

	pub fn allows(&self, event: EventType) -> bool {
		if !self.enabled {
			return false;
		}
		match self.allow {
			Some(ref allow) => allow.contains(&event.code()),
			None => true,
		}
	}
}

impl Default for NotificationFilter {
	fn default() -> Self {
		Self::new(true, None)
	}
}

/// Build the notification for an alert item (`mclient/ai`)
///
/// Returns `None` for unknown event types or when the filter rejects it.
pub fn alert_notification(
	alert: &Document,
	registry: &UnitRegistry,
	filter: &NotificationFilter,
) -> Option<Notification> {
	let code = alert.get_int("type");
	let event = match EventType::from_code(code) {
		Some(event) => event,
		None => {
			debug!(code, "alert with unknown event type dropped");
			return None;
		}
	};
	if !filter.allows(event) {
		debug!(event = event.code(), "alert filtered");
		return None;
	}

	let mdu = alert.get_string("mdu");
	let room = alert.get_string("room");
	let (unit, loc) = registry
		.snapshot(&mdu)
		.map(|s| (s.unit_label(), s.location()))
		.unwrap_or_default();

	Some(Notification {
		event,
		title: event.name().to_string(),
		text: format!("in {}, {}, {}", room, unit, loc),
		mdu,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::codes::EVENT_UNIT_DISCONNECTED;

	fn registry() -> UnitRegistry {
		let registry = UnitRegistry::new();
		registry.upsert_unit_info(
			"m1",
			Document::object().with("unit", "Unit 7").with("loc", "Oak House"),
		);
		registry
	}

	fn alert(kind: i64) -> Document {
		Document::object().with("mdu", "m1").with("room", "Bedroom").with("type", kind)
	}

	#[test]
	fn test_alert_text() {
		let n = alert_notification(&alert(1), &registry(), &NotificationFilter::default()).unwrap();
		assert_eq!(n.title, "On floor");
		assert_eq!(n.text, "in Bedroom, Unit 7, Oak House");
		assert_eq!(n.mdu, "m1");
	}

	#[test]
	fn test_disconnect_maps_to_event_zero() {
		let n = alert_notification(
			&alert(EVENT_UNIT_DISCONNECTED),
			&registry(),
			&NotificationFilter::default(),
		)
		.unwrap();
		assert_eq!(n.event.code(), 0);
	}

	#[test]
	fn test_unknown_type_dropped() {
		assert!(alert_notification(&alert(99), &registry(), &NotificationFilter::default()).is_none());
	}

	#[test]
	fn test_filter() {
		let filter = NotificationFilter::new(true, Some(vec![5, 6]));
		assert!(alert_notification(&alert(1), &registry(), &filter).is_none());
		assert!(alert_notification(&alert(6), &registry(), &filter).is_some());

		let off = NotificationFilter::new(false, None);
		assert!(alert_notification(&alert(6), &registry(), &off).is_none());
	}

	#[test]
	fn test_unknown_unit_gets_empty_labels() {
		let mut doc = alert(2);
		doc.insert("mdu", "other");
		let n = alert_notification(&doc, &registry(), &NotificationFilter::default()).unwrap();
		assert_eq!(n.text, "in Bedroom, , ");
	}
}

// vim: ts=4
