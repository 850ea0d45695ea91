//! Resource location building.
//!
//! Maps a source selection and optional build identifier to the executable
//! and style URLs. Pure string formatting: identifiers are not escaped or
//! validated, and construction cannot fail.

use serde::{Deserialize, Serialize};

/// Which delivery point to load from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSelection {
	#[default]
	Primary,
	Alternate,
}

impl SourceSelection {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Primary => "primary",
			Self::Alternate => "alternate",
		}
	}
}

/// Delivery bases and the runtime API version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
	/// Base URL of the primary delivery point.
	pub primary: String,
	/// Base URL of the alternate delivery point.
	pub alternate: String,
	/// API version segment used in every path.
	pub api_version: String,
}

impl Default for SourceConfig {
	fn default() -> Self {
		Self {
			primary: "https://primary-host".into(),
			alternate: "https://alt-host".into(),
			api_version: "2.0".into(),
		}
	}
}

impl SourceConfig {
	fn base(&self, source: SourceSelection) -> &str {
		let base = match source {
			SourceSelection::Primary => &self.primary,
			SourceSelection::Alternate => &self.alternate,
		};
		base.trim_end_matches('/')
	}
}

/// The pair of URLs that make up one loadable runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocation {
	pub executable_url: String,
	pub style_url: String,
}

impl ResourceLocation {
	/// Computes the location for `source` and an optional `build` identifier.
	///
	/// With a build identifier both URLs point into the versioned release path,
	/// otherwise at the minified "latest" assets.
	pub fn resolve(sources: &SourceConfig, source: SourceSelection, build: Option<&str>) -> Self {
		let base = sources.base(source);
		let version = &sources.api_version;
		match build {
			Some(build) => Self {
				executable_url: format!("{base}/releases/{version}/{build}/asset.js"),
				style_url: format!("{base}/releases/{version}/{build}/asset.css"),
			},
			None => Self {
				executable_url: format!("{base}/{version}/asset.min.js"),
				style_url: format!("{base}/{version}/asset.min.css"),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case(SourceSelection::Primary, None, "https://primary-host/2.0/asset.min.js", "https://primary-host/2.0/asset.min.css")]
	#[case(
		SourceSelection::Primary,
		Some("build-7"),
		"https://primary-host/releases/2.0/build-7/asset.js",
		"https://primary-host/releases/2.0/build-7/asset.css"
	)]
	#[case(SourceSelection::Alternate, None, "https://alt-host/2.0/asset.min.js", "https://alt-host/2.0/asset.min.css")]
	#[case(
		SourceSelection::Alternate,
		Some("build-42"),
		"https://alt-host/releases/2.0/build-42/asset.js",
		"https://alt-host/releases/2.0/build-42/asset.css"
	)]
	fn resolves_default_layout(#[case] source: SourceSelection, #[case] build: Option<&str>, #[case] js: &str, #[case] css: &str) {
		let loc = ResourceLocation::resolve(&SourceConfig::default(), source, build);
		assert_eq!(loc.executable_url, js);
		assert_eq!(loc.style_url, css);
	}

	#[test]
	fn identical_inputs_yield_identical_urls() {
		let sources = SourceConfig::default();
		let a = ResourceLocation::resolve(&sources, SourceSelection::Alternate, Some("b"));
		let b = ResourceLocation::resolve(&sources, SourceSelection::Alternate, Some("b"));
		assert_eq!(a, b);
	}

	#[test]
	fn build_identifier_passes_through_verbatim() {
		let loc = ResourceLocation::resolve(&SourceConfig::default(), SourceSelection::Primary, Some("odd id/?#"));
		assert_eq!(loc.executable_url, "https://primary-host/releases/2.0/odd id/?#/asset.js");
	}

	#[test]
	fn trailing_slash_on_base_is_ignored() {
		let sources = SourceConfig {
			primary: "https://cdn.example/sdk/".into(),
			..SourceConfig::default()
		};
		let loc = ResourceLocation::resolve(&sources, SourceSelection::Primary, None);
		assert_eq!(loc.executable_url, "https://cdn.example/sdk/2.0/asset.min.js");
	}
}
