//! Per-invocation readiness tracking.
//!
//! Each [`Invocation`] owns a caller binding: the latest callback, a
//! readiness value, and the runtime once loaded. The binding settles at most
//! once; after that its readiness never changes and its callback never runs
//! again.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::coordinator::{LoadOutcome, SharedLoadHandle};
use crate::descriptor::ResourceLocation;
use crate::error::LoadError;
use crate::runtime::RuntimeObject;
use crate::spawn::spawn;

/// Callback invoked with the runtime object once it is ready.
pub type Callback = Box<dyn FnMut(&RuntimeObject) + Send>;

/// Observable readiness of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
	/// Waiting for the shared load.
	NotReady,
	/// The runtime is loaded and the callback has run.
	Ready,
	/// The resource failed permanently, or the load this invocation joined
	/// was abandoned.
	Errored(LoadError),
}

impl Readiness {
	pub fn is_ready(&self) -> bool {
		matches!(self, Self::Ready)
	}

	pub fn is_settled(&self) -> bool {
		!matches!(self, Self::NotReady)
	}
}

pub(crate) struct CallerBinding {
	callback: Mutex<Option<Callback>>,
	settled: AtomicBool,
	runtime: OnceLock<RuntimeObject>,
	readiness: watch::Sender<Readiness>,
}

impl CallerBinding {
	pub(crate) fn new(callback: Callback) -> Self {
		let (readiness, _) = watch::channel(Readiness::NotReady);
		Self {
			callback: Mutex::new(Some(callback)),
			settled: AtomicBool::new(false),
			runtime: OnceLock::new(),
			readiness,
		}
	}

	fn replace_callback(&self, callback: Callback) {
		let mut slot = self.callback.lock();
		if slot.is_some() {
			*slot = Some(callback);
		}
	}

	/// Applies the shared outcome. Only the first call has any effect.
	pub(crate) fn settle(&self, url: &str, outcome: LoadOutcome) {
		if self.settled.swap(true, Ordering::AcqRel) {
			return;
		}
		match outcome {
			Ok(runtime) => {
				let _ = self.runtime.set(runtime.clone());
				// Taken out of the cell so a callback touching its own invocation cannot deadlock.
				let callback = self.callback.lock().take();
				if let Some(mut callback) = callback
					&& catch_unwind(AssertUnwindSafe(|| callback(&runtime))).is_err()
				{
					error!(url = %url, "ready callback panicked");
				}
				self.readiness.send_replace(Readiness::Ready);
			}
			Err(err) => {
				warn!(url = %url, error = %err, "runtime unavailable");
				self.callback.lock().take();
				self.readiness.send_replace(Readiness::Errored(err));
			}
		}
	}

	/// Stops forwarding to this binding without changing its readiness.
	fn detach(&self) {
		self.settled.store(true, Ordering::Release);
		self.callback.lock().take();
	}
}

/// One caller's use of the loader.
///
/// Dropping it stops forwarding the outcome to its callback; the shared load
/// keeps running for everyone else.
pub struct Invocation {
	binding: Arc<CallerBinding>,
	location: ResourceLocation,
	cancel: CancellationToken,
}

impl Invocation {
	/// Subscribes `binding` to `handle`.
	///
	/// Settles synchronously when the outcome is already known, otherwise
	/// spawns a forwarder that settles the binding when the load does.
	pub(crate) fn attach(binding: CallerBinding, location: ResourceLocation, handle: SharedLoadHandle) -> Self {
		let binding = Arc::new(binding);
		let cancel = CancellationToken::new();

		if let Some(outcome) = handle.outcome() {
			binding.settle(handle.url(), outcome);
		} else {
			let binding = Arc::clone(&binding);
			let cancel = cancel.clone();
			spawn("sdkload.forward", async move {
				tokio::select! {
					_ = cancel.cancelled() => {
						debug!(url = %handle.url(), "invocation dropped before load settled");
					}
					outcome = handle.wait() => binding.settle(handle.url(), outcome),
				}
			});
		}

		Self { binding, location, cancel }
	}

	/// Returns true once the runtime is loaded.
	pub fn is_loaded(&self) -> bool {
		self.readiness().is_ready()
	}

	/// Returns the failure this invocation settled with.
	///
	/// Set when the resource gave up ([`LoadError::Exhausted`]). Also set to
	/// [`LoadError::Abandoned`] if the task driving the joined load was torn
	/// down; that is terminal for this invocation only, and the next
	/// [`crate::Loader::initialize`] restarts the load.
	pub fn error(&self) -> Option<LoadError> {
		match &*self.binding.readiness.borrow() {
			Readiness::Errored(err) => Some(err.clone()),
			_ => None,
		}
	}

	pub fn readiness(&self) -> Readiness {
		self.binding.readiness.borrow().clone()
	}

	/// Watches readiness changes.
	pub fn subscribe(&self) -> watch::Receiver<Readiness> {
		self.binding.readiness.subscribe()
	}

	/// Replaces the callback run on readiness.
	///
	/// Does not start a new load. Ignored once the invocation has settled.
	pub fn set_callback<F>(&self, callback: F)
	where
		F: FnMut(&RuntimeObject) + Send + 'static,
	{
		self.binding.replace_callback(Box::new(callback));
	}

	/// Waits until the invocation settles.
	pub async fn ready(&self) -> Result<RuntimeObject, LoadError> {
		let mut rx = self.subscribe();
		let settled = rx.wait_for(Readiness::is_settled).await.map(|r| r.clone());
		match settled {
			Ok(Readiness::Errored(err)) => Err(err),
			Ok(_) | Err(_) => self.binding.runtime.get().cloned().ok_or_else(|| LoadError::Abandoned {
				url: self.location.executable_url.clone(),
			}),
		}
	}

	/// Runs `f` against the runtime if it is loaded.
	///
	/// Before readiness this is a no-op returning `None`.
	pub fn with_runtime<R>(&self, f: impl FnOnce(&RuntimeObject) -> R) -> Option<R> {
		match self.binding.runtime.get() {
			Some(runtime) => Some(f(runtime)),
			None => {
				debug!(url = %self.location.executable_url, "runtime used before ready, ignoring");
				None
			}
		}
	}

	/// Resource this invocation asked for.
	pub fn location(&self) -> &ResourceLocation {
		&self.location
	}
}

impl std::fmt::Debug for Invocation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Invocation")
			.field("url", &self.location.executable_url)
			.field("readiness", &*self.binding.readiness.borrow())
			.finish()
	}
}

impl Drop for Invocation {
	fn drop(&mut self) {
		self.binding.detach();
		self.cancel.cancel();
	}
}
