//! Singleflight loader for a third-party runtime delivered as a remote script
//! plus stylesheet.
//!
//! The runtime is fetched at most once per process per resource URL, no
//! matter how many independent callers ask for it. Callers that arrive while
//! a load is in flight join it; callers that arrive after it settled resolve
//! immediately. Failed attempts are retried up to a cap, after which the
//! failure is permanent for the process lifetime.
//!
//! The host document is abstracted behind [`Host`]. [`MemoryDocument`] is an
//! in-memory implementation for tests and diagnostics.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sdkload_loader::{InitOptions, Loader, LoaderConfig, MemoryDocument, RuntimeObject};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let doc = Arc::new(MemoryDocument::new());
//! let config = LoaderConfig::default();
//! let loader = Loader::new(doc.clone(), &config);
//!
//! let invocation = loader.initialize(|_runtime| println!("runtime ready"), InitOptions::default());
//! assert!(!invocation.is_loaded());
//!
//! // The host fires the script's load event once the runtime is published.
//! let url = &invocation.location().executable_url;
//! doc.finish_script(url, &config.runtime_global, RuntimeObject::new("sdk"));
//!
//! invocation.ready().await.unwrap();
//! assert!(invocation.is_loaded());
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod descriptor;
pub mod error;
pub mod global;
pub mod host;
mod loader;
pub mod notifier;
pub mod retry;
pub mod runtime;
pub mod scanner;
mod spawn;

pub use config::LoaderConfig;
pub use coordinator::{Coordinator, LoadOutcome, LoadState, SharedLoadHandle};
pub use descriptor::{ResourceLocation, SourceConfig, SourceSelection};
pub use error::{ConfigError, Error, LoadError, Result};
pub use host::memory::MemoryDocument;
pub use host::{Host, ResourceTag, TagKind, TagStatus};
pub use loader::{InitOptions, Loader};
pub use notifier::{Invocation, Readiness};
pub use retry::{RetryGovernor, RetryPolicy};
pub use runtime::{InstanceOptions, RuntimeObject};
pub use scanner::AttachmentScanner;
