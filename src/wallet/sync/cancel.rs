//! Cooperative cancellation for path scans.

use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};
use tokio::sync::Notify;

/// Cloneable halt flag checked between scan steps.
///
/// Cancelling never interrupts an in-flight provider call; the scan observes the flag at the next
/// path boundary and stops there.
#[derive(Clone, Debug)]
pub struct CancelToken {
	cancelled: Arc<AtomicBool>,
	notify: Arc<Notify>,
}

impl CancelToken {
	pub fn new() -> Self {
		Self {
			cancelled: Arc::new(AtomicBool::new(false)),
			notify: Arc::new(Notify::new()),
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::Acquire)
	}

	/// Request cancellation and wake any waiters.
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::Release);
		self.notify.notify_waiters();
	}

	/// Clear the flag so the next scan runs.
	pub fn reset(&self) {
		self.cancelled.store(false, Ordering::Release);
	}

	/// Wait until cancellation is requested.
	pub async fn cancelled(&self) {
		let notified = self.notify.notified();
		tokio::pin!(notified);
		// Register before reading the flag so a concurrent `cancel` cannot slip between the two.
		notified.as_mut().enable();
		if self.is_cancelled() {
			return;
		}
		notified.await;
	}
}

impl Default for CancelToken {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn clones_share_the_flag() {
		let token = CancelToken::new();
		let other = token.clone();
		assert!(!other.is_cancelled());

		token.cancel();
		assert!(other.is_cancelled());

		other.reset();
		assert!(!token.is_cancelled());
	}

	#[tokio::test]
	async fn waiters_wake_on_cancel() {
		let token = CancelToken::new();
		let waiter = token.clone();
		let handle = tokio::spawn(async move { waiter.cancelled().await });

		tokio::time::sleep(Duration::from_millis(10)).await;
		token.cancel();
		tokio::time::timeout(Duration::from_secs(1), handle)
			.await
			.unwrap()
			.unwrap();
	}

	#[tokio::test]
	async fn waiting_on_a_cancelled_token_returns_at_once() {
		let token = CancelToken::new();
		token.cancel();
		tokio::time::timeout(Duration::from_secs(1), token.cancelled())
			.await
			.unwrap();
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn racing_cancel_never_strands_a_waiter() {
		for _ in 0..200 {
			let token = CancelToken::new();
			let canceller = token.clone();
			let cancel = tokio::spawn(async move { canceller.cancel() });
			tokio::time::timeout(Duration::from_secs(1), token.cancelled())
				.await
				.unwrap();
			cancel.await.unwrap();
		}
	}
}
