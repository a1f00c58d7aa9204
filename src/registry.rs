//! Unit registry
//!
//! Latest known state of every monitored unit (MDU), keyed by unit id.
//! One coarse lock guards the whole map: the receive loop, the session
//! actor and readers all go through it. Readers get [`UnitSnapshot`]
//! copies so they never hold the lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::callbacks::{PoseCallback, StatusCallback};
use crate::protocol::Document;

/// Status subscription state of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
	NotStarted,
	Running,
	Failed,
	Stopped,
}

/// Live pose view for one camera
#[derive(Clone)]
pub struct PoseSubscription {
	pub running: bool,
	pub callback: Option<Arc<dyn PoseCallback>>,
}

struct UnitRecord {
	info: Document,
	status: SubscriptionStatus,
	status_payload: Option<Document>,
	poses: BTreeMap<i64, PoseSubscription>,
	event_payload: Option<Document>,
	alert_payload: Option<Document>,
}

impl UnitRecord {
	fn new(info: Document) -> Self {
		UnitRecord {
			info,
			status: SubscriptionStatus::NotStarted,
			status_payload: None,
			poses: BTreeMap::new(),
			event_payload: None,
			alert_payload: None,
		}
	}

	fn snapshot(&self, id: &str) -> UnitSnapshot {
		UnitSnapshot {
			id: id.to_string(),
			info: self.info.clone(),
			status: self.status,
			status_payload: self.status_payload.clone(),
			live_cameras: self.poses.iter().filter(|(_, p)| p.running).map(|(c, _)| *c).collect(),
			event_payload: self.event_payload.clone(),
			alert_payload: self.alert_payload.clone(),
		}
	}
}

/// Point-in-time copy of one unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSnapshot {
	pub id: String,
	/// Directory entry for the unit, as returned by the unit list
	pub info: Document,
	pub status: SubscriptionStatus,
	pub status_payload: Option<Document>,
	/// Cameras with a running live view
	pub live_cameras: Vec<i64>,
	pub event_payload: Option<Document>,
	pub alert_payload: Option<Document>,
}

impl UnitSnapshot {
	pub fn location(&self) -> String {
		self.info.get_string("loc")
	}

	pub fn unit_label(&self) -> String {
		self.info.get_string("unit")
	}
}

#[derive(Default)]
struct Inner {
	units: BTreeMap<String, UnitRecord>,
	status_callback: Option<Arc<dyn StatusCallback>>,
}

/// Shared registry of monitored units
#[derive(Clone, Default)]
pub struct UnitRegistry {
	inner: Arc<Mutex<Inner>>,
}

impl UnitRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Insert a unit or replace its info block, keeping live state.
	/// Returns true if the unit was not known before.
	pub fn upsert_unit_info(&self, id: &str, info: Document) -> bool {
		let mut inner = self.lock();
		match inner.units.get_mut(id) {
			Some(record) => {
				record.info = info;
				false
			}
			None => {
				inner.units.insert(id.to_string(), UnitRecord::new(info));
				true
			}
		}
	}

	/// Store (or clear) the latest status payload. Unknown units are ignored.
	pub fn set_live_status(&self, id: &str, payload: Option<Document>) -> bool {
		match self.lock().units.get_mut(id) {
			Some(record) => {
				record.status_payload = payload;
				true
			}
			None => false,
		}
	}

	/// Set the status subscription state of one unit
	pub fn set_subscription(&self, id: &str, status: SubscriptionStatus) -> bool {
		match self.lock().units.get_mut(id) {
			Some(record) => {
				record.status = status;
				true
			}
			None => false,
		}
	}

	/// Set the status subscription state of every unit
	pub fn set_all_subscriptions(&self, status: SubscriptionStatus) {
		for record in self.lock().units.values_mut() {
			record.status = status;
		}
	}

	/// Apply a pushed status payload. Returns the status callback to notify
	/// when the unit's subscription is running.
	pub fn apply_status_push(
		&self,
		id: &str,
		payload: Option<Document>,
	) -> Option<Arc<dyn StatusCallback>> {
		let mut inner = self.lock();
		let record = inner.units.get_mut(id)?;
		record.status_payload = payload;
		if record.status == SubscriptionStatus::Running {
			inner.status_callback.clone()
		} else {
			None
		}
	}

	/// Drop every unit's status payload, returning the affected unit ids
	pub fn clear_status_payloads(&self) -> Vec<String> {
		let mut inner = self.lock();
		inner
			.units
			.iter_mut()
			.map(|(id, record)| {
				record.status_payload = None;
				id.clone()
			})
			.collect()
	}

	pub fn set_status_callback(&self, callback: Option<Arc<dyn StatusCallback>>) {
		self.lock().status_callback = callback;
	}

	pub fn status_callback(&self) -> Option<Arc<dyn StatusCallback>> {
		self.lock().status_callback.clone()
	}

	/// Record a live pose view for `camera`. Unknown units are ignored.
	pub fn set_pose_subscription(
		&self,
		id: &str,
		camera: i64,
		running: bool,
		callback: Option<Arc<dyn PoseCallback>>,
	) -> bool {
		match self.lock().units.get_mut(id) {
			Some(record) => {
				record.poses.insert(camera, PoseSubscription { running, callback });
				true
			}
			None => false,
		}
	}

	/// Remove the pose view for `camera`, returning whether it was running
	pub fn clear_pose_subscription(&self, id: &str, camera: i64) -> bool {
		self.lock()
			.units
			.get_mut(id)
			.and_then(|record| record.poses.remove(&camera))
			.map(|p| p.running)
			.unwrap_or(false)
	}

	/// Callback of a running pose view, if any
	pub fn pose_callback(&self, id: &str, camera: i64) -> Option<Arc<dyn PoseCallback>> {
		let inner = self.lock();
		let subscription = inner.units.get(id)?.poses.get(&camera)?;
		if subscription.running {
			subscription.callback.clone()
		} else {
			None
		}
	}

	/// Store the most recent alert payload for a unit
	pub fn set_alert(&self, id: &str, payload: Document) -> bool {
		match self.lock().units.get_mut(id) {
			Some(record) => {
				record.alert_payload = Some(payload);
				true
			}
			None => false,
		}
	}

	/// Store the most recent event payload for a unit
	pub fn set_event(&self, id: &str, payload: Option<Document>) -> bool {
		match self.lock().units.get_mut(id) {
			Some(record) => {
				record.event_payload = payload;
				true
			}
			None => false,
		}
	}

	pub fn contains(&self, id: &str) -> bool {
		self.lock().units.contains_key(id)
	}

	/// Unit ids in sorted order
	pub fn ids(&self) -> Vec<String> {
		self.lock().units.keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.lock().units.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().units.is_empty()
	}

	pub fn snapshot(&self, id: &str) -> Option<UnitSnapshot> {
		self.lock().units.get(id).map(|record| record.snapshot(id))
	}

	pub fn snapshot_all(&self) -> Vec<UnitSnapshot> {
		self.lock().units.iter().map(|(id, record)| record.snapshot(id)).collect()
	}

	/// Forget every unit and the status callback
	pub fn clear(&self) {
		let mut inner = self.lock();
		inner.units.clear();
		inner.status_callback = None;
	}
}


// vim: ts=4
