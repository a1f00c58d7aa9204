//! Callback traits for pushed data and session events
//!
//! All callbacks run on the delivery context (see [`crate::delivery`]),
//! never on the socket receive loop. Single-method callbacks are
//! implemented for matching closures, so `Arc::new(|mdu: &str, _| ...)`
//! can be passed wherever a callback is expected.

use crate::protocol::Document;
use crate::session::RunState;

// Type aliases to reduce complexity
type StateFn = dyn Fn(RunState) + Send + Sync;
type FailureFn = dyn Fn(&str) + Send + Sync;

/// Live status updates for monitored units
pub trait StatusCallback: Send + Sync {
	/// Called with the unit id and its latest status payload (`None` when cleared)
	fn on_status(&self, mdu: &str, status: Option<&Document>);
}

impl<F> StatusCallback for F
where
	F: Fn(&str, Option<&Document>) + Send + Sync,
{
	fn on_status(&self, mdu: &str, status: Option<&Document>) {
		self(mdu, status)
	}
}

/// Pose frames for one live camera
pub trait PoseCallback: Send + Sync {
	fn on_pose(&self, mdu: &str, camera: i64, poses: &[Document]);
}

impl<F> PoseCallback for F
where
	F: Fn(&str, i64, &[Document]) + Send + Sync,
{
	fn on_pose(&self, mdu: &str, camera: i64, poses: &[Document]) {
		self(mdu, camera, poses)
	}
}

/// Which sub-list of a history reply is being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
	/// `mclient/ai` entries
	Alerts,
	/// `mclient/ei` entries
	Events,
}

/// Receiver for alert/event history queries
pub trait EventListCallback: Send + Sync {
	/// Called once per unit and sub-list
	fn on_list(&self, mdu: &str, kind: ListKind, items: &[Document]);

	/// Called after every requested unit has been queried
	fn on_complete(&self) {}
}

/// Session-level notifications for the presentation layer
pub trait SessionObserver: Send + Sync {
	/// Called on every run-state change
	fn on_state(&self, _state: RunState) {}

	/// Called with a one-shot, user-facing failure message
	fn on_failure(&self, _message: &str) {}
}

/// Default observer that does nothing
pub struct NoObserver;

impl SessionObserver for NoObserver {}

/// Builder for observers using function closures
pub struct ObserverBuilder {
	state: Option<Box<StateFn>>,
	failure: Option<Box<FailureFn>>,
}

impl ObserverBuilder {
	/// Create a new observer builder
	pub fn new() -> Self {
		ObserverBuilder { state: None, failure: None }
	}

	/// Set state-change callback
	pub fn on_state<F>(mut self, callback: F) -> Self
	where
		F: Fn(RunState) + Send + Sync + 'static,
	{
		self.state = Some(Box::new(callback));
		self
	}

	/// Set failure callback
	pub fn on_failure<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str) + Send + Sync + 'static,
	{
		self.failure = Some(Box::new(callback));
		self
	}

	/// Build the observer
	pub fn build(self) -> Box<dyn SessionObserver> {
		Box::new(CompositeObserver { state: self.state, failure: self.failure })
	}
}

impl Default for ObserverBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct CompositeObserver {
	state: Option<Box<StateFn>>,
	failure: Option<Box<FailureFn>>,
}

impl SessionObserver for CompositeObserver {
	fn on_state(&self, state: RunState) {
		if let Some(ref callback) = self.state {
			callback(state);
		}
	}

	fn on_failure(&self, message: &str) {
		if let Some(ref callback) = self.failure {
			callback(message);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	#[test]
	fn test_closure_callbacks() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		let cb: Arc<dyn StatusCallback> = Arc::new(move |mdu: &str, status: Option<&Document>| {
			sink.lock().unwrap().push((mdu.to_string(), status.is_some()));
		});
		cb.on_status("m1", None);
		cb.on_status("m2", Some(&Document::object()));
		assert_eq!(
			*seen.lock().unwrap(),
			vec![("m1".to_string(), false), ("m2".to_string(), true)]
		);
	}

	#[test]
	fn test_observer_builder() {
		let states = Arc::new(Mutex::new(Vec::new()));
		let sink = states.clone();
		let observer = ObserverBuilder::new().on_state(move |s| sink.lock().unwrap().push(s)).build();
		observer.on_state(RunState::Connecting);
		observer.on_failure("ignored");
		assert_eq!(*states.lock().unwrap(), vec![RunState::Connecting]);
	}
}

// vim: ts=4
