//! Task placement for loader background work.
//!
//! Drivers and forwarders run on the caller's runtime when there is one. The
//! loader keeps a small runtime of its own for callers outside tokio and for
//! retry timers, since an embedder's runtime may be built without a time
//! driver.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

fn loader_runtime() -> &'static Runtime {
	static RUNTIME: OnceLock<Runtime> = OnceLock::new();
	RUNTIME.get_or_init(|| {
		Builder::new_multi_thread()
			.worker_threads(1)
			.thread_name("sdkload-bg")
			.enable_all()
			.build()
			.expect("failed to build sdkload background runtime")
	})
}

/// Spawns a loader task on the caller's runtime, falling back to the
/// loader's own runtime when called from synchronous code.
pub(crate) fn spawn<F>(task: &'static str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let handle = Handle::try_current().unwrap_or_else(|_| loader_runtime().handle().clone());
	trace!(task, "sdkload.spawn");
	handle.spawn(fut)
}

/// Waits `delay` on the loader runtime's timer.
///
/// Safe to await from any runtime, including one without `enable_time`.
pub(crate) async fn sleep(delay: Duration) {
	if delay.is_zero() {
		return;
	}
	if let Err(err) = loader_runtime().spawn(tokio::time::sleep(delay)).await {
		warn!(error = %err, "retry delay interrupted");
	}
}
