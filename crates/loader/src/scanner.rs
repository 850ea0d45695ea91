//! Read-only probes over the host document.
//!
//! Lets the coordinator decide between resolving immediately, attaching to a
//! tag someone else inserted, or inserting its own.

use crate::host::{Host, ResourceTag, TagKind};
use crate::runtime::RuntimeObject;

/// Borrowed view of a host for one scan.
#[derive(Clone, Copy)]
pub struct AttachmentScanner<'a> {
	host: &'a dyn Host,
	global: &'a str,
}

impl<'a> AttachmentScanner<'a> {
	pub fn new(host: &'a dyn Host, global: &'a str) -> Self {
		Self { host, global }
	}

	/// Returns true if the runtime object is already published.
	pub fn is_runtime_ready(&self) -> bool {
		self.runtime().is_some()
	}

	/// Returns the published runtime object, if any.
	pub fn runtime(&self) -> Option<RuntimeObject> {
		self.host.runtime(self.global)
	}

	/// Returns a script tag for exactly `url`, whoever inserted it.
	pub fn find_existing_script(&self, url: &str) -> Option<ResourceTag> {
		self.host.find_tag(TagKind::Script, url)
	}

	/// Returns a stylesheet tag for exactly `url`, whoever inserted it.
	pub fn find_existing_stylesheet(&self, url: &str) -> Option<ResourceTag> {
		self.host.find_tag(TagKind::Stylesheet, url)
	}
}
