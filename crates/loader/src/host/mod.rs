//! Host environment contract.
//!
//! The host is the shared document the runtime is loaded into. It owns the
//! resource tags and the global slot the runtime object is published under.
//! Tags carry their own completion status; the host fires the load or error
//! event on a tag and the loader observes it through [`ResourceTag::completion`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::runtime::RuntimeObject;

pub mod memory;

/// Kind of resource a tag loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
	/// Executable script.
	Script,
	/// Stylesheet link.
	Stylesheet,
}

/// Completion status of a resource tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagStatus {
	/// Inserted, no event fired yet.
	Pending,
	/// The load event fired.
	Loaded,
	/// The error event fired.
	Failed(String),
}

/// A resource tag present in the host document.
///
/// Cloning yields another handle to the same tag.
#[derive(Clone)]
pub struct ResourceTag {
	inner: Arc<TagInner>,
}

struct TagInner {
	id: u64,
	kind: TagKind,
	url: String,
	status: watch::Sender<TagStatus>,
}

static NEXT_TAG_ID: AtomicU64 = AtomicU64::new(1);

impl ResourceTag {
	/// Creates a pending tag for `url`.
	pub fn new(kind: TagKind, url: impl Into<String>) -> Self {
		let (status, _) = watch::channel(TagStatus::Pending);
		Self {
			inner: Arc::new(TagInner {
				id: NEXT_TAG_ID.fetch_add(1, Ordering::Relaxed),
				kind,
				url: url.into(),
				status,
			}),
		}
	}

	/// Process-unique tag identifier.
	pub fn id(&self) -> u64 {
		self.inner.id
	}

	pub fn kind(&self) -> TagKind {
		self.inner.kind
	}

	pub fn url(&self) -> &str {
		&self.inner.url
	}

	/// Current completion status.
	pub fn status(&self) -> TagStatus {
		self.inner.status.borrow().clone()
	}

	/// Fires the load event. Later events are ignored.
	pub fn mark_loaded(&self) {
		self.settle(TagStatus::Loaded);
	}

	/// Fires the error event. Later events are ignored.
	pub fn mark_failed(&self, reason: impl Into<String>) {
		self.settle(TagStatus::Failed(reason.into()));
	}

	fn settle(&self, status: TagStatus) {
		self.inner.status.send_if_modified(|current| {
			if *current != TagStatus::Pending {
				return false;
			}
			*current = status;
			true
		});
	}

	/// Waits for the tag's load or error event.
	///
	/// Resolves immediately if the event already fired.
	pub async fn completion(&self) -> Result<(), String> {
		let mut rx = self.inner.status.subscribe();
		let status = match rx.wait_for(|s| *s != TagStatus::Pending).await {
			Ok(status) => status.clone(),
			// The sender lives inside this tag, so it cannot close while we hold `self`.
			Err(_) => return Err("resource tag closed".into()),
		};
		match status {
			TagStatus::Failed(reason) => Err(reason),
			TagStatus::Loaded | TagStatus::Pending => Ok(()),
		}
	}

	/// Returns true if both handles refer to the same tag.
	pub fn same_tag(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl fmt::Debug for ResourceTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResourceTag")
			.field("id", &self.inner.id)
			.field("kind", &self.inner.kind)
			.field("url", &self.inner.url)
			.field("status", &*self.inner.status.borrow())
			.finish()
	}
}

/// The shared environment resources are inserted into.
///
/// Implementations must be cheap and synchronous; the coordinator calls them
/// while holding its state lock.
pub trait Host: Send + Sync {
	/// Returns the runtime object published under `global`, if any.
	fn runtime(&self, global: &str) -> Option<RuntimeObject>;

	/// Returns a tag of `kind` whose URL is exactly `url`.
	fn find_tag(&self, kind: TagKind, url: &str) -> Option<ResourceTag>;

	/// Inserts a new tag and starts fetching it.
	fn insert_tag(&self, kind: TagKind, url: &str) -> ResourceTag;

	/// Removes `tag` from the document. Unknown tags are ignored.
	fn remove_tag(&self, tag: &ResourceTag);
}
