//! Single-shot, cancel-and-reset timers.
//!
//! A node's event loop owns exactly one `Timer` for elections and one for heartbeats, and never
//! has both active at once (`§4.4`). Resetting bumps a generation counter; callers that key work
//! off "the fire I'm waiting on" can compare the generation they started with against the one a
//! fire reports and drop anything stale. The single-task event loop never actually manages to
//! race a stale fire against a reset (there's nowhere for the old future to keep running once
//! `reset` replaces its deadline), but the discipline is kept so that moving timer delivery off
//! onto a separate task later — say, to coalesce heartbeats across many consensus groups — stays
//! correct by construction rather than by accident.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};

pub struct Timer {
	sleep: Pin<Box<Sleep>>,
	generation: u64,
	active: bool,
}

/// Far enough out that a disabled timer's branch in a `select!` never wins on its own, even
/// though the branch itself is still gated on `is_active()`.
const DISABLED_HORIZON: Duration = Duration::from_secs(3600);

impl Timer {
	pub fn disabled() -> Self {
		Timer { sleep: Box::pin(sleep(DISABLED_HORIZON)), generation: 0, active: false }
	}

	pub fn is_active(&self) -> bool {
		self.active
	}

	/// Cancels any outstanding fire and arms the timer to fire after `duration`. Returns the new
	/// generation.
	pub fn reset(&mut self, duration: Duration) -> u64 {
		self.generation += 1;
		self.active = true;
		self.sleep.as_mut().reset(Instant::now() + duration);
		self.generation
	}

	pub fn disable(&mut self) {
		self.active = false;
	}

	/// Resolves when the timer fires, yielding the generation it fired at. Only meaningful to
	/// poll (e.g. in a `select!` branch) while `is_active()`.
	pub async fn fired(&mut self) -> u64 {
		self.sleep.as_mut().await;
		self.generation
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn fires_after_duration() {
		let mut t = Timer::disabled();
		assert!(!t.is_active());
		let gen = t.reset(Duration::from_millis(10));
		assert!(t.is_active());
		let fired_gen = t.fired().await;
		assert_eq!(fired_gen, gen);
	}

	#[tokio::test(start_paused = true)]
	async fn reset_bumps_generation() {
		let mut t = Timer::disabled();
		let g1 = t.reset(Duration::from_secs(10));
		let g2 = t.reset(Duration::from_millis(10));
		assert_ne!(g1, g2);
		let fired_gen = t.fired().await;
		assert_eq!(fired_gen, g2);
	}
}
