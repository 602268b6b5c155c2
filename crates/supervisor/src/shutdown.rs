// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Signal handling: SIGTERM or a first SIGINT starts a
//! *graceful* shutdown (drain queues, let in-flight jobs finish, fsync
//! journals, write a stop marker); SIGQUIT or a second SIGINT escalates to
//! *fast* shutdown (cancel running statements, exit). Implemented with two
//! [`pgferry_core::CancellationToken`]s threaded into every blocking call
//! rather than global signal-flag state.

use pgferry_core::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
	Graceful,
	Fast,
}

/// Owns the two cancellation tokens a run reacts to and the background task
/// that listens for signals and fires them in order.
pub struct ShutdownController {
	graceful: CancellationToken,
	fast: CancellationToken,
	listener: Option<tokio::task::JoinHandle<()>>,
}

impl ShutdownController {
	/// Tokens only, no signal handlers installed — used by tests and by
	/// callers that drive shutdown through some other trigger (e.g. an
	/// endpos being reached).
	pub fn tokens_only() -> Self {
		Self { graceful: CancellationToken::new(), fast: CancellationToken::new(), listener: None }
	}

	/// Tokens plus a background task installing OS signal handlers.
	#[cfg(unix)]
	pub fn install() -> std::io::Result<Self> {
		let graceful = CancellationToken::new();
		let fast = CancellationToken::new();

		let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
		let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
		let mut sigquit = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::quit())?;

		let graceful_for_task = graceful.clone();
		let fast_for_task = fast.clone();
		let listener = tokio::spawn(async move {
			let mut sigint_count = 0u32;
			loop {
				tokio::select! {
					_ = sigterm.recv() => {
						info!("received SIGTERM; starting graceful shutdown");
						graceful_for_task.cancel();
					}
					_ = sigint.recv() => {
						sigint_count += 1;
						if sigint_count == 1 {
							info!("received SIGINT; starting graceful shutdown");
							graceful_for_task.cancel();
						} else {
							warn!("received second SIGINT; escalating to fast shutdown");
							fast_for_task.cancel();
						}
					}
					_ = sigquit.recv() => {
						warn!("received SIGQUIT; fast shutdown");
						fast_for_task.cancel();
					}
				}
				if fast_for_task.is_cancelled() {
					break;
				}
			}
		});

		Ok(Self { graceful, fast, listener: Some(listener) })
	}

	/// The token that fires on the first stop signal: workers should stop
	/// accepting *new* work but finish whatever they're mid-flight on.
	pub fn graceful_token(&self) -> CancellationToken {
		self.graceful.clone()
	}

	/// The token that fires on the escalated stop signal: workers should
	/// abandon in-flight work as soon as they next check it.
	pub fn fast_token(&self) -> CancellationToken {
		self.fast.clone()
	}

	pub fn mode(&self) -> Option<ShutdownMode> {
		if self.fast.is_cancelled() {
			Some(ShutdownMode::Fast)
		} else if self.graceful.is_cancelled() {
			Some(ShutdownMode::Graceful)
		} else {
			None
		}
	}
}

impl Drop for ShutdownController {
	fn drop(&mut self) {
		if let Some(listener) = self.listener.take() {
			listener.abort();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_controller_has_no_mode() {
		let controller = ShutdownController::tokens_only();
		assert_eq!(controller.mode(), None);
	}

	#[test]
	fn graceful_then_fast_escalates() {
		let controller = ShutdownController::tokens_only();
		controller.graceful_token().cancel();
		assert_eq!(controller.mode(), Some(ShutdownMode::Graceful));
		controller.fast_token().cancel();
		assert_eq!(controller.mode(), Some(ShutdownMode::Fast));
	}
}
