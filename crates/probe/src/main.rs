//! Loader probe.
//!
//! Drives the loader against an in-memory document to show how concurrent
//! callers share one load and how transient failures are retried.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Parser, ValueEnum};
use sdkload_loader::host::memory::{Responder, ScriptRequest, ScriptResponse};
use sdkload_loader::{InitOptions, Loader, LoaderConfig, MemoryDocument, RuntimeObject, SourceSelection};
use tracing::{info, warn};

/// Probe command line arguments.
#[derive(Parser, Debug)]
#[command(name = "sdkload-probe")]
#[command(about = "Simulate concurrent runtime loads against an in-memory document")]
struct Args {
	/// Loader config file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Delivery point to load from
	#[arg(long, value_enum, default_value_t = Source::Primary)]
	source: Source,

	/// Pin a release build
	#[arg(long, value_name = "ID")]
	build: Option<String>,

	/// Concurrent invocations
	#[arg(long, default_value_t = 4)]
	callers: usize,

	/// Script insertions that fail before one succeeds
	#[arg(long, default_value_t = 0)]
	fail: usize,

	/// Override the configured attempt cap
	#[arg(long)]
	max_attempts: Option<u32>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Source {
	Primary,
	Alternate,
}

impl From<Source> for SourceSelection {
	fn from(source: Source) -> Self {
		match source {
			Source::Primary => SourceSelection::Primary,
			Source::Alternate => SourceSelection::Alternate,
		}
	}
}

/// Stand-in for the vendor runtime.
#[derive(Debug)]
struct ProbeRuntime;

/// Fails the first `fail` script insertions, then publishes a [`ProbeRuntime`].
///
/// Every simulated failure is counted in `failures`; the coordinator forgets
/// them once a load succeeds.
fn scripted_responder(fail: usize, global: String, failures: Arc<AtomicUsize>) -> Responder {
	Arc::new(move |req: &ScriptRequest| {
		if req.attempt <= fail {
			failures.fetch_add(1, Ordering::SeqCst);
			Some(ScriptResponse::Fail(format!("simulated failure {}/{fail}", req.attempt)))
		} else {
			Some(ScriptResponse::Load {
				global: global.clone(),
				runtime: RuntimeObject::new(ProbeRuntime),
			})
		}
	})
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.finish();

	tracing::subscriber::set_global_default(subscriber)?;

	let mut config = match &args.config {
		Some(path) => LoaderConfig::load(path)?,
		None => LoaderConfig::default(),
	};
	if let Some(max_attempts) = args.max_attempts {
		config.max_attempts = max_attempts;
	}
	config.validate()?;

	let fail = args.fail;
	let failures = Arc::new(AtomicUsize::new(0));
	let doc = Arc::new(MemoryDocument::with_responder(scripted_responder(
		fail,
		config.runtime_global.clone(),
		failures.clone(),
	)));

	let loader = Loader::new(doc.clone(), &config);
	let options = InitOptions {
		source: args.source.into(),
		build: args.build,
	};
	let location = loader.locate(&options);
	info!(url = %location.executable_url, callers = args.callers, fail, "probing");

	let fired = Arc::new(AtomicUsize::new(0));
	let invocations: Vec<_> = (0..args.callers)
		.map(|_| {
			let fired = fired.clone();
			loader.initialize(
				move |_| {
					fired.fetch_add(1, Ordering::SeqCst);
				},
				options.clone(),
			)
		})
		.collect();

	let mut ready = 0;
	for (i, invocation) in invocations.iter().enumerate() {
		match invocation.ready().await {
			Ok(_) => ready += 1,
			Err(err) => warn!(caller = i, error = %err, "caller failed"),
		}
	}

	let coordinator = loader.coordinator();
	let url = &location.executable_url;
	println!("url:          {url}");
	println!("state:        {:?}", coordinator.state(url));
	println!("ready:        {ready}/{}", args.callers);
	println!("callbacks:    {}", fired.load(Ordering::SeqCst));
	println!("failed loads: {}", failures.load(Ordering::SeqCst));
	println!("insertions:   {}", doc.script_insertions(url));
	println!("stylesheets:  {}", doc.stylesheet_insertions(&location.style_url));
	if let Some(err) = coordinator.last_error(url) {
		println!("last error:   {err}");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(attempt: usize) -> ScriptRequest {
		ScriptRequest {
			url: "https://primary-host/2.0/asset.min.js".into(),
			attempt,
		}
	}

	#[test]
	fn responder_fails_first_insertions_then_loads() {
		let failures = Arc::new(AtomicUsize::new(0));
		let responder = scripted_responder(2, "Sdk".into(), failures.clone());

		assert!(matches!(responder(&request(1)), Some(ScriptResponse::Fail(_))));
		assert!(matches!(responder(&request(2)), Some(ScriptResponse::Fail(_))));
		assert!(matches!(responder(&request(3)), Some(ScriptResponse::Load { .. })));
		assert_eq!(failures.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn failure_count_survives_successful_retry() {
		let failures = Arc::new(AtomicUsize::new(0));
		let config = LoaderConfig::default();
		let doc = Arc::new(MemoryDocument::with_responder(scripted_responder(
			2,
			config.runtime_global.clone(),
			failures.clone(),
		)));
		let loader = Loader::new(doc.clone(), &config);

		let invocation = loader.initialize(|_| {}, InitOptions::default());
		invocation.ready().await.unwrap();

		let url = &invocation.location().executable_url;
		assert_eq!(failures.load(Ordering::SeqCst), 2);
		assert_eq!(doc.script_insertions(url), 3);
		assert_eq!(loader.coordinator().attempts(url), 0);
	}
}
