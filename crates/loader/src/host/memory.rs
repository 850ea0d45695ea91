//! In-memory host document.
//!
//! Keeps tags in insertion order and a table of published globals. Nothing
//! is fetched: scripts stay pending until the embedder fires their events,
//! either by hand or through an installed [`Responder`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Host, ResourceTag, TagKind};
use crate::runtime::RuntimeObject;

/// Decides the fate of a freshly inserted script.
///
/// Called synchronously from [`Host::insert_tag`]. Returning `None` leaves the
/// tag pending.
pub type Responder = Arc<dyn Fn(&ScriptRequest) -> Option<ScriptResponse> + Send + Sync>;

/// Details of one script insertion passed to a [`Responder`].
#[derive(Debug, Clone)]
pub struct ScriptRequest {
	pub url: String,
	/// 1-based count of script insertions for this URL, including this one.
	pub attempt: usize,
}

/// Outcome a [`Responder`] applies to a script tag.
#[derive(Debug, Clone)]
pub enum ScriptResponse {
	/// Publish `runtime` under `global`, then fire the load event.
	Load { global: String, runtime: RuntimeObject },
	/// Fire the load event without publishing anything.
	LoadEmpty,
	/// Fire the error event.
	Fail(String),
}

#[derive(Default)]
struct DocumentState {
	tags: Vec<ResourceTag>,
	globals: HashMap<String, RuntimeObject>,
	script_insertions: HashMap<String, usize>,
	stylesheet_insertions: HashMap<String, usize>,
	responder: Option<Responder>,
}

/// A [`Host`] backed by plain in-memory state.
pub struct MemoryDocument {
	state: Mutex<DocumentState>,
	inserted: watch::Sender<usize>,
}

impl Default for MemoryDocument {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryDocument {
	/// Creates an empty document.
	pub fn new() -> Self {
		let (inserted, _) = watch::channel(0);
		Self {
			state: Mutex::new(DocumentState::default()),
			inserted,
		}
	}

	/// Creates a document whose script insertions are answered by `responder`.
	pub fn with_responder(responder: Responder) -> Self {
		let doc = Self::new();
		doc.state.lock().responder = Some(responder);
		doc
	}

	/// Publishes a runtime object under `global`.
	pub fn publish(&self, global: &str, runtime: RuntimeObject) {
		self.state.lock().globals.insert(global.to_string(), runtime);
	}

	/// Adds a script tag as an unrelated actor would. Not counted as an insertion.
	pub fn add_foreign_script(&self, url: &str) -> ResourceTag {
		let tag = ResourceTag::new(TagKind::Script, url);
		self.state.lock().tags.push(tag.clone());
		tag
	}

	/// Publishes `runtime` and fires the load event on the live script for `url`.
	///
	/// Returns false if no script for `url` is present.
	pub fn finish_script(&self, url: &str, global: &str, runtime: RuntimeObject) -> bool {
		let Some(tag) = self.find_tag(TagKind::Script, url) else {
			return false;
		};
		self.publish(global, runtime);
		tag.mark_loaded();
		true
	}

	/// Fires the error event on the live script for `url`.
	///
	/// Returns false if no script for `url` is present.
	pub fn fail_script(&self, url: &str, reason: &str) -> bool {
		let Some(tag) = self.find_tag(TagKind::Script, url) else {
			return false;
		};
		tag.mark_failed(reason);
		true
	}

	/// Number of tags of `kind` currently present for `url`.
	pub fn count_tags(&self, kind: TagKind, url: &str) -> usize {
		self.state.lock().tags.iter().filter(|t| t.kind() == kind && t.url() == url).count()
	}

	/// Scripts inserted through [`Host::insert_tag`] for `url` over the document's lifetime.
	pub fn script_insertions(&self, url: &str) -> usize {
		self.state.lock().script_insertions.get(url).copied().unwrap_or(0)
	}

	/// Stylesheets inserted through [`Host::insert_tag`] for `url` over the document's lifetime.
	pub fn stylesheet_insertions(&self, url: &str) -> usize {
		self.state.lock().stylesheet_insertions.get(url).copied().unwrap_or(0)
	}

	/// Waits until at least `n` tags have been inserted in total.
	pub async fn wait_for_insertions(&self, n: usize) {
		let mut rx = self.inserted.subscribe();
		let _ = rx.wait_for(|count| *count >= n).await;
	}
}

impl Host for MemoryDocument {
	fn runtime(&self, global: &str) -> Option<RuntimeObject> {
		self.state.lock().globals.get(global).cloned()
	}

	fn find_tag(&self, kind: TagKind, url: &str) -> Option<ResourceTag> {
		self.state
			.lock()
			.tags
			.iter()
			.find(|t| t.kind() == kind && t.url() == url)
			.cloned()
	}

	fn insert_tag(&self, kind: TagKind, url: &str) -> ResourceTag {
		let tag = ResourceTag::new(kind, url);
		let (responder, attempt) = {
			let mut state = self.state.lock();
			state.tags.push(tag.clone());
			let counter = match kind {
				TagKind::Script => &mut state.script_insertions,
				TagKind::Stylesheet => &mut state.stylesheet_insertions,
			};
			let count = counter.entry(url.to_string()).or_insert(0);
			*count += 1;
			let attempt = *count;
			(state.responder.clone(), attempt)
		};
		self.inserted.send_modify(|n| *n += 1);

		if kind == TagKind::Stylesheet {
			tag.mark_loaded();
			return tag;
		}
		let request = ScriptRequest { url: url.to_string(), attempt };
		match responder.and_then(|r| r(&request)) {
			Some(ScriptResponse::Load { global, runtime }) => {
				self.publish(&global, runtime);
				tag.mark_loaded();
			}
			Some(ScriptResponse::LoadEmpty) => tag.mark_loaded(),
			Some(ScriptResponse::Fail(reason)) => tag.mark_failed(reason),
			None => {}
		}
		tag
	}

	fn remove_tag(&self, tag: &ResourceTag) {
		self.state.lock().tags.retain(|t| !t.same_tag(tag));
	}
}
