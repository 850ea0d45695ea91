//! End-to-end behaviour of `Loader::initialize` against an in-memory document.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sdkload_loader::host::memory::{ScriptRequest, ScriptResponse};
use sdkload_loader::{
	Host, InitOptions, LoadError, LoadState, Loader, LoaderConfig, MemoryDocument, Readiness, ResourceTag,
	RuntimeObject, TagKind,
};

const PRIMARY_LATEST: &str = "https://primary-host/2.0/asset.min.js";

struct MockSdk {
	name: &'static str,
}

/// Host whose runtime lookup panics while `broken` is set.
struct FlakyHost {
	doc: MemoryDocument,
	broken: AtomicBool,
}

impl Host for FlakyHost {
	fn runtime(&self, global: &str) -> Option<RuntimeObject> {
		assert!(!self.broken.load(Ordering::SeqCst), "runtime lookup failed");
		self.doc.runtime(global)
	}

	fn find_tag(&self, kind: TagKind, url: &str) -> Option<ResourceTag> {
		self.doc.find_tag(kind, url)
	}

	fn insert_tag(&self, kind: TagKind, url: &str) -> ResourceTag {
		self.doc.insert_tag(kind, url)
	}

	fn remove_tag(&self, tag: &ResourceTag) {
		self.doc.remove_tag(tag)
	}
}

fn setup() -> (Arc<MemoryDocument>, Loader, LoaderConfig) {
	let doc = Arc::new(MemoryDocument::new());
	let config = LoaderConfig::default();
	let loader = Loader::new(doc.clone(), &config);
	(doc, loader, config)
}

fn counting_callback() -> (Arc<AtomicUsize>, impl FnMut(&RuntimeObject) + Send + 'static) {
	let count = Arc::new(AtomicUsize::new(0));
	let inner = count.clone();
	(count, move |_: &RuntimeObject| {
		inner.fetch_add(1, Ordering::SeqCst);
	})
}

#[tokio::test]
async fn concurrent_invocations_insert_once_and_share_runtime() {
	let (doc, loader, config) = setup();
	let seen: Arc<Mutex<Vec<RuntimeObject>>> = Arc::default();

	let invocations: Vec<_> = (0..8)
		.map(|_| {
			let seen = seen.clone();
			loader.initialize(move |rt| seen.lock().push(rt.clone()), InitOptions::default())
		})
		.collect();
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 1);

	let runtime = RuntimeObject::new(MockSdk { name: "sdk" });
	assert!(doc.finish_script(PRIMARY_LATEST, &config.runtime_global, runtime.clone()));
	for invocation in &invocations {
		invocation.ready().await.unwrap();
	}

	let seen = seen.lock();
	assert_eq!(seen.len(), 8);
	assert!(seen.iter().all(|rt| rt.ptr_eq(&runtime)));
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 1);
}

#[tokio::test]
async fn later_invocation_resolves_before_initialize_returns() {
	let (doc, loader, config) = setup();
	let first = loader.initialize(|_| {}, InitOptions::default());
	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));
	first.ready().await.unwrap();

	let (count, callback) = counting_callback();
	let late = loader.initialize(callback, InitOptions::default());
	assert!(late.is_loaded());
	assert_eq!(count.load(Ordering::SeqCst), 1);
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 1);
}

#[tokio::test]
async fn every_attempt_failing_surfaces_permanent_error() {
	let doc = Arc::new(MemoryDocument::with_responder(Arc::new(|req: &ScriptRequest| {
		Some(ScriptResponse::Fail(format!("HTTP 503 on try {}", req.attempt)))
	})));
	let loader = Loader::new(doc.clone(), &LoaderConfig::default());

	let (count, callback) = counting_callback();
	let invocation = loader.initialize(callback, InitOptions::default());
	let err = invocation.ready().await.unwrap_err();
	assert!(err.is_exhausted());
	assert_eq!(invocation.error(), Some(err.clone()));
	assert!(!invocation.is_loaded());
	assert_eq!(count.load(Ordering::SeqCst), 0);
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 3);

	let fourth = loader.initialize(|_| {}, InitOptions::default());
	assert_eq!(fourth.readiness(), Readiness::Errored(err));
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 3);
	assert_eq!(loader.coordinator().state(PRIMARY_LATEST), LoadState::Failed(3));
}

#[tokio::test]
async fn attaches_to_script_inserted_by_unrelated_actor() {
	let (doc, loader, config) = setup();
	let foreign = doc.add_foreign_script(PRIMARY_LATEST);

	let (count, callback) = counting_callback();
	let invocation = loader.initialize(callback, InitOptions::default());
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 0);

	doc.publish(&config.runtime_global, RuntimeObject::new(()));
	foreign.mark_loaded();
	invocation.ready().await.unwrap();
	assert_eq!(count.load(Ordering::SeqCst), 1);
	assert_eq!(doc.count_tags(TagKind::Script, PRIMARY_LATEST), 1);
}

#[tokio::test]
async fn newest_callback_runs_on_resolution() {
	let (doc, loader, config) = setup();
	let (original, original_cb) = counting_callback();
	let (replacement, replacement_cb) = counting_callback();

	let invocation = loader.initialize(original_cb, InitOptions::default());
	invocation.set_callback(replacement_cb);
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 1);

	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));
	invocation.ready().await.unwrap();
	assert_eq!(original.load(Ordering::SeqCst), 0);
	assert_eq!(replacement.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn callback_set_after_resolution_never_runs() {
	let (doc, loader, config) = setup();
	let (first, first_cb) = counting_callback();
	let invocation = loader.initialize(first_cb, InitOptions::default());
	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));
	invocation.ready().await.unwrap();

	let (late, late_cb) = counting_callback();
	invocation.set_callback(late_cb);
	tokio::task::yield_now().await;

	assert!(invocation.is_loaded());
	assert_eq!(first.load(Ordering::SeqCst), 1);
	assert_eq!(late.load(Ordering::SeqCst), 0);
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 1);
}

#[tokio::test]
async fn alternate_build_resolves_versioned_urls_and_fires_once() {
	let (doc, loader, config) = setup();
	let names: Arc<Mutex<Vec<&'static str>>> = Arc::default();
	let sink = names.clone();

	let invocation = loader.initialize(
		move |rt| {
			if let Some(sdk) = rt.downcast_ref::<MockSdk>() {
				sink.lock().push(sdk.name);
			}
		},
		InitOptions::alternate().with_build("build-42"),
	);
	let location = invocation.location().clone();
	assert_eq!(location.executable_url, "https://alt-host/releases/2.0/build-42/asset.js");
	assert_eq!(location.style_url, "https://alt-host/releases/2.0/build-42/asset.css");
	assert_eq!(doc.count_tags(TagKind::Stylesheet, &location.style_url), 1);

	doc.finish_script(&location.executable_url, &config.runtime_global, RuntimeObject::new(MockSdk { name: "mock" }));
	invocation.ready().await.unwrap();
	invocation.ready().await.unwrap();

	assert!(invocation.is_loaded());
	assert_eq!(*names.lock(), vec!["mock"]);
}

#[tokio::test]
async fn same_tick_primary_invocations_leave_one_script_tag() {
	let (doc, loader, _) = setup();
	let _a = loader.initialize(|_| {}, InitOptions::default());
	let _b = loader.initialize(|_| {}, InitOptions::default());
	assert_eq!(doc.count_tags(TagKind::Script, PRIMARY_LATEST), 1);
}

#[tokio::test]
async fn dropped_invocation_never_fires_while_others_resolve() {
	let (doc, loader, config) = setup();
	let (dropped_count, dropped_cb) = counting_callback();
	let (kept_count, kept_cb) = counting_callback();

	let dropped = loader.initialize(dropped_cb, InitOptions::default());
	let kept = loader.initialize(kept_cb, InitOptions::default());
	drop(dropped);

	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));
	kept.ready().await.unwrap();
	tokio::task::yield_now().await;

	assert_eq!(kept_count.load(Ordering::SeqCst), 1);
	assert_eq!(dropped_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panicking_callback_still_marks_ready() {
	let (doc, loader, config) = setup();
	let invocation = loader.initialize(|_| panic!("consumer bug"), InitOptions::default());
	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));
	invocation.ready().await.unwrap();
	assert!(invocation.is_loaded());
}

#[tokio::test]
async fn runtime_access_before_ready_is_a_no_op() {
	let (doc, loader, config) = setup();
	let invocation = loader.initialize(|_| {}, InitOptions::default());
	assert_eq!(invocation.with_runtime(|_| "used"), None);

	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(MockSdk { name: "sdk" }));
	invocation.ready().await.unwrap();
	let name = invocation.with_runtime(|rt| rt.downcast_ref::<MockSdk>().map(|s| s.name));
	assert_eq!(name, Some(Some("sdk")));
}

#[tokio::test]
async fn readiness_subscribers_see_single_transition() {
	let (doc, loader, config) = setup();
	let invocation = loader.initialize(|_| {}, InitOptions::default());
	let mut rx = invocation.subscribe();
	assert_eq!(*rx.borrow_and_update(), Readiness::NotReady);

	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));
	rx.changed().await.unwrap();
	assert_eq!(*rx.borrow_and_update(), Readiness::Ready);
	assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn distinct_builds_load_independently() {
	let (doc, loader, config) = setup();
	let latest = loader.initialize(|_| {}, InitOptions::default());
	let pinned = loader.initialize(|_| {}, InitOptions::default().with_build("b1"));
	let pinned_url = pinned.location().executable_url.clone();

	doc.fail_script(&pinned_url, "offline");
	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));
	latest.ready().await.unwrap();

	// The runtime is now published, so the pinned build's retry resolves without reinserting.
	pinned.ready().await.unwrap();
	assert_eq!(doc.script_insertions(&pinned_url), 1);
	assert_eq!(loader.coordinator().state(&pinned_url), LoadState::Succeeded);
}

#[test]
fn initialize_outside_runtime_still_loads() {
	let (doc, loader, config) = setup();
	let (tx, rx) = std::sync::mpsc::channel();
	let invocation = loader.initialize(
		move |_| {
			let _ = tx.send(());
		},
		InitOptions::default(),
	);
	doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));
	rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
	assert_eq!(loader.coordinator().state(PRIMARY_LATEST), LoadState::Succeeded);
	assert!(invocation.error().is_none());
}

#[test]
fn retry_delay_works_on_runtime_without_timer() {
	let config = LoaderConfig {
		retry_delay_ms: 10,
		..LoaderConfig::default()
	};
	let global = config.runtime_global.clone();
	let doc = Arc::new(MemoryDocument::with_responder(Arc::new(move |req: &ScriptRequest| {
		Some(if req.attempt == 1 {
			ScriptResponse::Fail("connection reset".into())
		} else {
			ScriptResponse::Load {
				global: global.clone(),
				runtime: RuntimeObject::new(()),
			}
		})
	})));
	let loader = Loader::new(doc.clone(), &config);

	let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
	let outcome = rt.block_on(async {
		let invocation = loader.initialize(|_| {}, InitOptions::default());
		invocation.ready().await
	});

	assert!(outcome.is_ok(), "{outcome:?}");
	assert_eq!(doc.script_insertions(PRIMARY_LATEST), 2);
	assert_eq!(loader.coordinator().state(PRIMARY_LATEST), LoadState::Succeeded);
}

#[tokio::test]
async fn abandoned_load_errors_invocation_but_next_caller_restarts() {
	let host = Arc::new(FlakyHost {
		doc: MemoryDocument::new(),
		broken: AtomicBool::new(false),
	});
	let config = LoaderConfig::default();
	let loader = Loader::new(host.clone(), &config);

	let first = loader.initialize(|_| {}, InitOptions::default());
	host.broken.store(true, Ordering::SeqCst);
	host.doc.finish_script(PRIMARY_LATEST, &config.runtime_global, RuntimeObject::new(()));

	let err = first.ready().await.unwrap_err();
	assert!(matches!(err, LoadError::Abandoned { .. }), "{err}");
	assert_eq!(first.error(), Some(err));
	assert_eq!(loader.coordinator().state(PRIMARY_LATEST), LoadState::Failed(0));

	host.broken.store(false, Ordering::SeqCst);
	let second = loader.initialize(|_| {}, InitOptions::default());
	assert!(second.is_loaded());
	assert!(second.error().is_none());
	assert_eq!(host.doc.script_insertions(PRIMARY_LATEST), 1);
}
