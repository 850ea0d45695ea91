//! Bounded retry policy for one resource URL.

use std::time::Duration;

use crate::error::LoadError;

/// Retry limits shared by every resource a coordinator loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Attempts allowed before the failure becomes permanent.
	pub max_attempts: u32,
	/// Pause between a failed attempt and the next insertion.
	pub delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			delay: Duration::ZERO,
		}
	}
}

/// Failure bookkeeping for one resource URL.
///
/// Lives as long as the URL's load state. New callers never reset it; only a
/// successful load does.
#[derive(Debug, Clone)]
pub struct RetryGovernor {
	attempt_count: u32,
	last_error: Option<LoadError>,
	max_attempts: u32,
}

impl RetryGovernor {
	pub fn new(max_attempts: u32) -> Self {
		Self {
			attempt_count: 0,
			last_error: None,
			max_attempts,
		}
	}

	/// Returns true while another attempt is allowed.
	pub fn should_retry(&self) -> bool {
		self.attempt_count < self.max_attempts
	}

	/// Counts one failed attempt. Saturates at the cap.
	pub fn record_failure(&mut self, error: LoadError) {
		self.attempt_count = (self.attempt_count + 1).min(self.max_attempts);
		self.last_error = Some(error);
	}

	/// Clears the failure history after a successful load.
	pub fn record_success(&mut self) {
		self.attempt_count = 0;
		self.last_error = None;
	}

	pub fn attempt_count(&self) -> u32 {
		self.attempt_count
	}

	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	pub fn last_error(&self) -> Option<&LoadError> {
		self.last_error.as_ref()
	}
}
