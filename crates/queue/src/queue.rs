// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! A bounded, single-producer/multiple-consumer FIFO over
//! `crossbeam-channel`, standing in for a process-shared OS IPC queue:
//! same external contract (FIFO, one producer, many consumers, bounded
//! buffer, blocking receive, close-from-producer), realized with channels
//! shared between worker tasks of a single process instead of workers
//! that are separate OS processes.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use pgferry_core::CancellationToken;

/// How often a blocking receive re-checks the cancellation token while the
/// queue is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("queue is closed")]
	Closed,
}

/// The producing half. Usually the supervisor's sole handle, but cloneable
/// for the one case that needs it: every table-copy worker enqueues
/// onto the shared index queue as its table's last partition finishes, so
/// that queue has one producer per worker. `blocking_receive` only returns
/// `None` once every clone (the supervisor's own handle included) has been
/// dropped via [`Producer::close`].
#[derive(Clone)]
pub struct Producer<T> {
	tx: Sender<T>,
}

impl<T> Producer<T> {
	/// Blocks if the kernel-equivalent (channel) buffer is full — the
	/// backpressure behavior requires of producers.
	pub fn send(&self, item: T) -> Result<(), Error> {
		self.tx.send(item).map_err(|_| Error::Closed)
	}

	/// Non-blocking variant used by callers that want to detect backpressure
	/// without stalling (e.g. to interleave producing with polling worker
	/// exit status).
	#[allow(clippy::result_large_err)]
	pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
		self.tx.try_send(item)
	}

	/// Consumes the producer, dropping its sender handle. Once every clone
	/// of the sender is dropped, `blocking_receive` drains the channel and
	/// then returns `None` forever, exactly like the FIFO's kernel-buffer
	/// `close()` semantics.
	pub fn close(self) {
		drop(self);
	}
}

/// The worker pool's half: many consumers, clonable, backed by the same
/// underlying channel.
#[derive(Clone)]
pub struct Consumer<T> {
	rx: Receiver<T>,
}

impl<T> Consumer<T> {
	/// Blocks the calling thread until a job is available, the queue is
	/// closed and drained (`None`), or `token` fires (`None`). Intended to
	/// run inside a `tokio::task::spawn_blocking` closure, matching a
	/// synchronous, blocking worker model.
	pub fn blocking_receive(&self, token: &CancellationToken) -> Option<T> {
		loop {
			if token.is_cancelled() {
				return None;
			}
			match self.rx.recv_timeout(POLL_INTERVAL) {
				Ok(item) => return Some(item),
				Err(RecvTimeoutError::Timeout) => continue,
				Err(RecvTimeoutError::Disconnected) => return None,
			}
		}
	}

	/// Non-blocking poll, used by tests and by the supervisor's own status
	/// checks.
	pub fn try_receive(&self) -> Option<T> {
		self.rx.try_recv().ok()
	}
}

/// Builds one FIFO with a bounded buffer of `capacity` slots.
pub fn job_queue<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
	let (tx, rx) = bounded(capacity);
	(Producer { tx }, Consumer { rx })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fifo_ordering_is_preserved() {
		let (producer, consumer) = job_queue::<i32>(8);
		for i in 0..5 {
			producer.send(i).unwrap();
		}
		let token = CancellationToken::new();
		let received: Vec<i32> = (0..5).map(|_| consumer.blocking_receive(&token).unwrap()).collect();
		assert_eq!(received, vec![0, 1, 2, 3, 4]);
	}

	#[test]
	fn closing_the_producer_drains_then_returns_none() {
		let (producer, consumer) = job_queue::<i32>(8);
		producer.send(1).unwrap();
		producer.close();

		let token = CancellationToken::new();
		assert_eq!(consumer.blocking_receive(&token), Some(1));
		assert_eq!(consumer.blocking_receive(&token), None);
	}

	#[test]
	fn cancellation_token_wakes_a_blocked_consumer() {
		let (_producer, consumer) = job_queue::<i32>(1);
		let token = CancellationToken::new();
		let cancel_token = token.clone();

		let handle = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(50));
			cancel_token.cancel();
		});

		let result = consumer.blocking_receive(&token);
		assert_eq!(result, None);
		handle.join().unwrap();
	}

	#[test]
	fn many_consumers_share_one_fifo_without_duplicate_delivery() {
		let (producer, consumer) = job_queue::<i32>(16);
		for i in 0..20 {
			producer.send(i).unwrap();
		}
		producer.close();

		let token = CancellationToken::new();
		let c1 = consumer.clone();
		let c2 = consumer.clone();

		let t1 = std::thread::spawn(move || {
			let mut items = Vec::new();
			while let Some(item) = c1.blocking_receive(&token) {
				items.push(item);
			}
			items
		});
		let token2 = CancellationToken::new();
		let t2 = std::thread::spawn(move || {
			let mut items = Vec::new();
			while let Some(item) = c2.blocking_receive(&token2) {
				items.push(item);
			}
			items
		});

		let mut all = t1.join().unwrap();
		all.extend(t2.join().unwrap());
		all.sort();
		assert_eq!(all, (0..20).collect::<Vec<_>>());
	}
}
