//! Inbound entry point.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LoaderConfig;
use crate::coordinator::Coordinator;
use crate::descriptor::{ResourceLocation, SourceConfig, SourceSelection};
use crate::host::Host;
use crate::notifier::{CallerBinding, Invocation};
use crate::runtime::RuntimeObject;

/// Per-invocation resource selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitOptions {
	pub source: SourceSelection,
	/// Pins a specific release instead of the latest assets.
	pub build: Option<String>,
}

impl InitOptions {
	pub fn alternate() -> Self {
		Self {
			source: SourceSelection::Alternate,
			build: None,
		}
	}

	pub fn with_build(mut self, build: impl Into<String>) -> Self {
		self.build = Some(build.into());
		self
	}
}

/// Front door handed to UI code.
///
/// Cheap to clone; clones share the coordinator and therefore its load state.
#[derive(Clone)]
pub struct Loader {
	coordinator: Arc<Coordinator>,
	sources: SourceConfig,
}

impl Loader {
	/// Builds a loader over `host`.
	///
	/// `config` is expected to be validated already; see [`LoaderConfig::validate`].
	pub fn new(host: Arc<dyn Host>, config: &LoaderConfig) -> Self {
		Self {
			coordinator: Arc::new(Coordinator::new(host, config.runtime_global.clone(), config.retry_policy())),
			sources: config.sources.clone(),
		}
	}

	/// Requests the runtime and binds `callback` to its readiness.
	///
	/// The callback runs at most once, with the runtime object, when the
	/// shared load succeeds. If the runtime is already available it runs
	/// before this returns.
	pub fn initialize<F>(&self, callback: F, options: InitOptions) -> Invocation
	where
		F: FnMut(&RuntimeObject) + Send + 'static,
	{
		let location = self.locate(&options);
		debug!(url = %location.executable_url, source = options.source.as_str(), "initialize");
		let handle = self.coordinator.request_load(&location);
		Invocation::attach(CallerBinding::new(Box::new(callback)), location, handle)
	}

	/// Computes the resource location `options` would load.
	pub fn locate(&self, options: &InitOptions) -> ResourceLocation {
		ResourceLocation::resolve(&self.sources, options.source, options.build.as_deref())
	}

	pub fn coordinator(&self) -> &Arc<Coordinator> {
		&self.coordinator
	}
}

impl std::fmt::Debug for Loader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Loader")
			.field("global", &self.coordinator.global())
			.field("sources", &self.sources)
			.finish_non_exhaustive()
	}
}
