//! Single-threaded callback delivery
//!
//! Registry mutation happens on the receive loop and the session actor;
//! user-facing callbacks are posted here and run one at a time, in posting
//! order, on a dedicated thread.

use std::sync::mpsc;
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for posting callbacks to the delivery thread
///
/// Cloning is cheap. The thread exits once every handle is dropped.
#[derive(Clone)]
pub struct Delivery {
	tx: mpsc::Sender<Job>,
}

impl Delivery {
	/// Start the delivery thread
	pub fn start() -> Self {
		let (tx, rx) = mpsc::channel::<Job>();
		let spawned = thread::Builder::new().name("mssmon-delivery".to_string()).spawn(move || {
			while let Ok(job) = rx.recv() {
				job();
			}
			debug!("delivery thread finished");
		});
		if let Err(e) = spawned {
			warn!("cannot start delivery thread: {}", e);
		}
		Delivery { tx }
	}

	/// Queue `job` behind every previously posted job
	pub fn post<F>(&self, job: F)
	where
		F: FnOnce() + Send + 'static,
	{
		if self.tx.send(Box::new(job)).is_err() {
			warn!("delivery thread gone, dropping callback");
		}
	}

	/// Wait until everything posted so far has run
	pub async fn flush(&self) {
		let (done_tx, done_rx) = oneshot::channel();
		self.post(move || {
			let _ = done_tx.send(());
		});
		let _ = done_rx.await;
	}
}


// vim: ts=4
