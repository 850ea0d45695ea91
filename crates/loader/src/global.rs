//! Process-wide loader instance.
//!
//! Installed once at startup; every part of the process that asks for the
//! runtime through it shares the same load state.

use std::sync::{Arc, OnceLock};

use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::loader::{InitOptions, Loader};
use crate::notifier::Invocation;
use crate::runtime::RuntimeObject;

static GLOBAL: OnceLock<Loader> = OnceLock::new();

/// Validates `config` and installs the process-wide loader.
///
/// # Errors
///
/// Returns [`Error::Config`] for an invalid config and
/// [`Error::AlreadyInstalled`] if a loader is already installed.
pub fn install(host: Arc<dyn Host>, config: &LoaderConfig) -> Result<&'static Loader> {
	config.validate()?;
	let mut installed = false;
	let loader = GLOBAL.get_or_init(|| {
		installed = true;
		Loader::new(host, config)
	});
	if !installed {
		return Err(Error::AlreadyInstalled);
	}
	tracing::info!(global = %config.runtime_global, "installed process-wide loader");
	Ok(loader)
}

/// Returns the process-wide loader, if installed.
pub fn loader() -> Option<&'static Loader> {
	GLOBAL.get()
}

/// [`Loader::initialize`] on the process-wide loader.
///
/// # Errors
///
/// Returns [`Error::NotInstalled`] before [`install`].
pub fn initialize<F>(callback: F, options: InitOptions) -> Result<Invocation>
where
	F: FnMut(&RuntimeObject) + Send + 'static,
{
	let loader = loader().ok_or(Error::NotInstalled)?;
	Ok(loader.initialize(callback, options))
}
