//! Singleton load coordinator.
//!
//! Owns one slot per executable URL and guarantees at most one load in
//! flight per slot. Every caller that asks while a load is running joins the
//! same [`SharedLoadHandle`]; the terminal outcome is kept in the slot so later
//! callers resolve without new work.
//!
//! # Slot lifecycle
//!
//! | from | event | to |
//! |---|---|---|
//! | `Idle` | request, runtime already published | `Succeeded` |
//! | `Idle` | request | `Loading` (tag attached or inserted) |
//! | `Loading` | script load event, runtime published | `Succeeded` |
//! | `Loading` | script error (or load without runtime) | `Failed(n)` |
//! | `Failed(n)` | `n < max` | `Loading` (failed tag removed, new tag inserted) |
//! | `Failed(n)` | `n == max` | stays, handle rejected with [`LoadError::Exhausted`] |
//! | `Loading` | driver torn down | `Failed(n)`, handle rejected with [`LoadError::Abandoned`] |
//! | `Failed(n)` | request, `n < max` | `Loading` |
//!
//! All transitions happen inside one short critical section of the slot map.
//! The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::descriptor::ResourceLocation;
use crate::error::LoadError;
use crate::host::{Host, ResourceTag, TagKind};
use crate::retry::{RetryGovernor, RetryPolicy};
use crate::runtime::RuntimeObject;
use crate::scanner::AttachmentScanner;
use crate::spawn::{sleep, spawn};

/// Terminal result of a shared load.
pub type LoadOutcome = Result<RuntimeObject, LoadError>;

/// Load state of one resource URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
	/// Never requested.
	Idle,
	/// A tag is in flight, or a retry is pending.
	Loading,
	/// The runtime object is available. Terminal.
	Succeeded,
	/// The last attempt failed; carries the number of failed attempts.
	Failed(u32),
}

/// Awaitable view of the current load of one URL.
///
/// Cloning is cheap; all clones observe the same outcome.
#[derive(Debug, Clone)]
pub struct SharedLoadHandle {
	url: Arc<str>,
	rx: watch::Receiver<Option<LoadOutcome>>,
}

impl SharedLoadHandle {
	/// Executable URL this handle tracks.
	pub fn url(&self) -> &str {
		&self.url
	}

	/// Returns the outcome if the load already settled.
	pub fn outcome(&self) -> Option<LoadOutcome> {
		self.rx.borrow().clone()
	}

	/// Waits for the load to settle.
	pub async fn wait(&self) -> LoadOutcome {
		let mut rx = self.rx.clone();
		let settled = rx.wait_for(Option::is_some).await.map(|outcome| outcome.clone());
		match settled {
			Ok(Some(outcome)) => outcome,
			Ok(None) | Err(_) => Err(LoadError::Abandoned { url: self.url.to_string() }),
		}
	}
}

struct Slot {
	state: LoadState,
	governor: RetryGovernor,
	tx: watch::Sender<Option<LoadOutcome>>,
	/// Script tag currently being listened to.
	script: Option<ResourceTag>,
	/// Bumped whenever a new load cycle starts so stale drivers can tell.
	generation: u64,
}

impl Slot {
	fn new(max_attempts: u32) -> Self {
		let (tx, _) = watch::channel(None);
		Self {
			state: LoadState::Idle,
			governor: RetryGovernor::new(max_attempts),
			tx,
			script: None,
			generation: 0,
		}
	}

	fn handle(&self, url: &str) -> SharedLoadHandle {
		SharedLoadHandle {
			url: Arc::from(url),
			rx: self.tx.subscribe(),
		}
	}

	fn succeed(&mut self, runtime: RuntimeObject) {
		self.state = LoadState::Succeeded;
		self.governor.record_success();
		self.script = None;
		self.tx.send_replace(Some(Ok(runtime)));
	}

	fn is_current(&self, generation: u64) -> bool {
		self.generation == generation && self.state == LoadState::Loading
	}
}

enum Step {
	Done,
	Retry,
}

/// Process-wide owner of every resource URL's load state.
pub struct Coordinator {
	host: Arc<dyn Host>,
	global: String,
	policy: RetryPolicy,
	slots: Mutex<HashMap<String, Slot>>,
}

impl Coordinator {
	/// Creates a coordinator over `host`, expecting the runtime under `global`.
	pub fn new(host: Arc<dyn Host>, global: impl Into<String>, policy: RetryPolicy) -> Self {
		Self {
			host,
			global: global.into(),
			policy,
			slots: Mutex::new(HashMap::new()),
		}
	}

	/// Starts or joins the load of `location`.
	///
	/// Never blocks. When a new load starts, the stylesheet is ensured, the
	/// script tag is attached or inserted, and a background task waits for its
	/// completion event.
	pub fn request_load(self: &Arc<Self>, location: &ResourceLocation) -> SharedLoadHandle {
		let url = location.executable_url.as_str();
		let mut slots = self.slots.lock();
		let slot = slots
			.entry(url.to_string())
			.or_insert_with(|| Slot::new(self.policy.max_attempts));

		match slot.state {
			LoadState::Succeeded => {
				debug!(url = %url, "runtime already loaded");
				return slot.handle(url);
			}
			LoadState::Loading => {
				debug!(url = %url, "joining in-flight load");
				return slot.handle(url);
			}
			LoadState::Failed(attempts) if !slot.governor.should_retry() => {
				debug!(url = %url, attempts, "resource permanently failed");
				return slot.handle(url);
			}
			LoadState::Idle | LoadState::Failed(_) => {}
		}

		if slot.tx.borrow().is_some() {
			// Previous cycle was abandoned; its rejection must not leak into this one.
			let (tx, _) = watch::channel(None);
			slot.tx = tx;
		}
		let handle = slot.handle(url);

		let scanner = self.scanner();
		if let Some(runtime) = scanner.runtime() {
			info!(url = %url, global = %self.global, "runtime already present, skipping insertion");
			slot.succeed(runtime);
			return handle;
		}

		if scanner.find_existing_stylesheet(&location.style_url).is_none() {
			self.host.insert_tag(TagKind::Stylesheet, &location.style_url);
		}
		let tag = self.attach_or_insert(&scanner, url);

		slot.state = LoadState::Loading;
		slot.generation += 1;
		slot.script = Some(tag.clone());
		let guard = DriveGuard {
			coordinator: Arc::clone(self),
			url: url.to_string(),
			generation: slot.generation,
			armed: true,
		};
		drop(slots);

		spawn("sdkload.drive", Arc::clone(self).drive(tag, guard));
		handle
	}

	/// Current state of `url`.
	pub fn state(&self, url: &str) -> LoadState {
		self.slots.lock().get(url).map_or(LoadState::Idle, |s| s.state)
	}

	/// Failed attempts recorded for `url` since its last success.
	pub fn attempts(&self, url: &str) -> u32 {
		self.slots.lock().get(url).map_or(0, |s| s.governor.attempt_count())
	}

	/// Most recent attempt failure for `url`.
	pub fn last_error(&self, url: &str) -> Option<LoadError> {
		self.slots.lock().get(url).and_then(|s| s.governor.last_error().cloned())
	}

	pub fn policy(&self) -> RetryPolicy {
		self.policy
	}

	/// Name the runtime object is published under.
	pub fn global(&self) -> &str {
		&self.global
	}

	pub fn host(&self) -> &Arc<dyn Host> {
		&self.host
	}

	fn scanner(&self) -> AttachmentScanner<'_> {
		AttachmentScanner::new(self.host.as_ref(), &self.global)
	}

	fn attach_or_insert(&self, scanner: &AttachmentScanner<'_>, url: &str) -> ResourceTag {
		match scanner.find_existing_script(url) {
			Some(tag) => {
				info!(url = %url, tag = tag.id(), "attaching to existing script");
				tag
			}
			None => {
				info!(url = %url, "inserting script");
				self.host.insert_tag(TagKind::Script, url)
			}
		}
	}

	async fn drive(self: Arc<Self>, mut tag: ResourceTag, mut guard: DriveGuard) {
		loop {
			let event = tag.completion().await;
			match self.settle_attempt(&guard.url, guard.generation, &tag, event) {
				Step::Done => break,
				Step::Retry => {
					sleep(self.policy.delay).await;
					match self.reinsert(&guard.url, guard.generation) {
						Some(next) => tag = next,
						None => break,
					}
				}
			}
		}
		guard.armed = false;
	}

	fn settle_attempt(&self, url: &str, generation: u64, tag: &ResourceTag, event: Result<(), String>) -> Step {
		let mut slots = self.slots.lock();
		let Some(slot) = slots.get_mut(url) else {
			return Step::Done;
		};
		if !slot.is_current(generation) {
			return Step::Done;
		}

		let failure = match event {
			Ok(()) => match self.scanner().runtime() {
				Some(runtime) => {
					info!(url = %url, failed_attempts = slot.governor.attempt_count(), "runtime loaded");
					slot.succeed(runtime);
					return Step::Done;
				}
				None => LoadError::RuntimeMissing {
					url: url.to_string(),
					global: self.global.clone(),
				},
			},
			Err(reason) => LoadError::Script {
				url: url.to_string(),
				reason,
			},
		};

		self.host.remove_tag(tag);
		slot.script = None;
		slot.governor.record_failure(failure.clone());
		let attempts = slot.governor.attempt_count();
		slot.state = LoadState::Failed(attempts);

		if slot.governor.should_retry() {
			warn!(url = %url, attempt = attempts, max_attempts = slot.governor.max_attempts(), error = %failure, "load attempt failed, retrying");
			slot.state = LoadState::Loading;
			return Step::Retry;
		}

		error!(url = %url, attempts, error = %failure, "giving up on resource");
		slot.tx.send_replace(Some(Err(LoadError::Exhausted {
			url: url.to_string(),
			attempts,
			last: Box::new(failure),
		})));
		Step::Done
	}

	fn reinsert(&self, url: &str, generation: u64) -> Option<ResourceTag> {
		let mut slots = self.slots.lock();
		let slot = slots.get_mut(url)?;
		if !slot.is_current(generation) {
			return None;
		}

		let scanner = self.scanner();
		if let Some(runtime) = scanner.runtime() {
			info!(url = %url, "runtime appeared while retrying");
			slot.succeed(runtime);
			return None;
		}
		let tag = self.attach_or_insert(&scanner, url);
		slot.script = Some(tag.clone());
		Some(tag)
	}

	fn abandon(&self, url: &str, generation: u64) {
		let mut slots = self.slots.lock();
		let Some(slot) = slots.get_mut(url) else {
			return;
		};
		if !slot.is_current(generation) {
			return;
		}
		let attempts = slot.governor.attempt_count();
		warn!(url = %url, attempts, "load driver dropped before completion");
		slot.state = LoadState::Failed(attempts);
		slot.script = None;
		slot.tx.send_replace(Some(Err(LoadError::Abandoned { url: url.to_string() })));
	}
}

/// Rejects waiters and frees the slot if the driver is dropped early.
struct DriveGuard {
	coordinator: Arc<Coordinator>,
	url: String,
	generation: u64,
	armed: bool,
}

impl Drop for DriveGuard {
	fn drop(&mut self) {
		if self.armed {
			self.coordinator.abandon(&self.url, self.generation);
		}
	}
}
