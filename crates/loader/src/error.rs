//! Error types.
//!
//! [`LoadError`] is what invocations observe. It is cloned into every joiner of
//! a shared load, so it carries owned strings rather than source errors.

use std::path::PathBuf;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Crate-level errors raised outside the load path itself.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Configuration could not be read or is invalid.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// [`crate::global::install`] was called more than once.
	#[error("process-wide loader is already installed")]
	AlreadyInstalled,
	/// [`crate::global::initialize`] was called before [`crate::global::install`].
	#[error("process-wide loader is not installed")]
	NotInstalled,
}

/// Failure outcome of a shared load, fanned out to every joined caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
	/// The executable resource reported an error event.
	#[error("script {url} failed to load: {reason}")]
	Script { url: String, reason: String },
	/// The executable resource loaded but never published the runtime object.
	#[error("script {url} loaded but runtime object `{global}` is missing")]
	RuntimeMissing { url: String, global: String },
	/// Every allowed attempt failed; the resource stays failed for the process lifetime.
	#[error("gave up loading {url} after {attempts} attempts: {last}")]
	Exhausted {
		url: String,
		attempts: u32,
		last: Box<LoadError>,
	},
	/// The task driving the load was torn down before the load settled.
	#[error("load of {url} was abandoned before completion")]
	Abandoned { url: String },
}

impl LoadError {
	/// Returns true for the terminal failure reported once retries run out.
	pub fn is_exhausted(&self) -> bool {
		matches!(self, Self::Exhausted { .. })
	}
}

/// Errors produced while reading or validating a [`crate::LoaderConfig`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
	/// The config file could not be read.
	#[error("failed to read config {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	/// The config text is not valid TOML for [`crate::LoaderConfig`].
	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),
	/// A delivery base is not an absolute http(s) URL.
	#[error("invalid {field} base `{value}`: {reason}")]
	InvalidBase {
		field: &'static str,
		value: String,
		reason: String,
	},
	/// `max_attempts` must allow at least one attempt.
	#[error("max_attempts must be at least 1")]
	ZeroAttempts,
	/// The runtime global name is empty.
	#[error("runtime_global must not be empty")]
	EmptyRuntimeGlobal,
}
