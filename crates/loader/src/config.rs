//! Loader configuration.
//!
//! Read from TOML. Every field is optional:
//!
//! ```toml
//! max_attempts = 3
//! retry_delay_ms = 0
//! runtime_global = "VendorRuntime"
//!
//! [sources]
//! primary = "https://primary-host"
//! alternate = "https://alt-host"
//! api_version = "2.0"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::descriptor::SourceConfig;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Top-level loader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
	/// Attempts per resource before the failure becomes permanent.
	pub max_attempts: u32,
	/// Pause between a failed attempt and the retry, in milliseconds.
	pub retry_delay_ms: u64,
	/// Name the loaded script publishes its runtime object under.
	pub runtime_global: String,
	/// Delivery points.
	pub sources: SourceConfig,
}

impl Default for LoaderConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			retry_delay_ms: 0,
			runtime_global: "VendorRuntime".into(),
			sources: SourceConfig::default(),
		}
	}
}

impl LoaderConfig {
	/// Parses and validates TOML text.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&text)
	}

	/// Checks invariants serde cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(ConfigError::ZeroAttempts);
		}
		if self.runtime_global.trim().is_empty() {
			return Err(ConfigError::EmptyRuntimeGlobal);
		}
		validate_base("primary", &self.sources.primary)?;
		validate_base("alternate", &self.sources.alternate)?;
		Ok(())
	}

	/// Retry limits derived from this config.
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_attempts: self.max_attempts,
			delay: Duration::from_millis(self.retry_delay_ms),
		}
	}
}

fn validate_base(field: &'static str, value: &str) -> Result<(), ConfigError> {
	let invalid = |reason: String| ConfigError::InvalidBase {
		field,
		value: value.to_string(),
		reason,
	};
	let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
	if !matches!(url.scheme(), "http" | "https") {
		return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
	}
	if url.host_str().is_none() {
		return Err(invalid("missing host".into()));
	}
	if url.query().is_some() || url.fragment().is_some() {
		return Err(invalid("query and fragment are not allowed".into()));
	}
	Ok(())
}
