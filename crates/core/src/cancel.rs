// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Cancellation token: replaces global signal-flag state with a value
//! passed into every blocking call (database sessions, file I/O, queue
//! receives) so each aborts cleanly once a signal handler fires it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
	inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
	fired: AtomicBool,
	notify: Notify,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// Idempotent: firing an already-fired token is a no-op.
	pub fn cancel(&self) {
		if !self.inner.fired.swap(true, Ordering::SeqCst) {
			self.inner.notify.notify_waiters();
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.inner.fired.load(Ordering::SeqCst)
	}

	/// Resolves once `cancel()` has been called. Safe to await repeatedly
	/// and from multiple tasks.
	pub async fn cancelled(&self) {
		if self.is_cancelled() {
			return;
		}
		let notified = self.inner.notify.notified();
		if self.is_cancelled() {
			return;
		}
		notified.await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn cancelled_resolves_immediately_once_fired() {
		let token = CancellationToken::new();
		assert!(!token.is_cancelled());
		token.cancel();
		assert!(token.is_cancelled());
		token.cancelled().await;
	}

	#[tokio::test]
	async fn cancel_wakes_a_pending_waiter() {
		let token = CancellationToken::new();
		let waiter = token.clone();
		let handle = tokio::spawn(async move {
			waiter.cancelled().await;
		});
		tokio::task::yield_now().await;
		token.cancel();
		handle.await.unwrap();
	}

	#[test]
	fn cancel_is_idempotent() {
		let token = CancellationToken::new();
		token.cancel();
		token.cancel();
		assert!(token.is_cancelled());
	}
}
