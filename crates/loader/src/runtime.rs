//! Opaque handles to the vendor runtime and its instance options.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// The runtime object a loaded script publishes into the shared environment.
///
/// The loader never inspects it. Embedders downcast to their own binding type.
#[derive(Clone)]
pub struct RuntimeObject {
	inner: Arc<dyn Any + Send + Sync>,
}

impl RuntimeObject {
	/// Wraps a host-specific runtime value.
	pub fn new<T>(value: T) -> Self
	where
		T: Any + Send + Sync,
	{
		Self { inner: Arc::new(value) }
	}

	/// Returns the wrapped value if it is a `T`.
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.inner.downcast_ref::<T>()
	}

	/// Returns true if both handles point at the same runtime value.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl fmt::Debug for RuntimeObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RuntimeObject").finish_non_exhaustive()
	}
}

/// Options handed to the runtime when creating an instance.
///
/// Passed through verbatim. Only the three documented keys are set by
/// [`InstanceOptions::new`]; anything else is the embedder's business.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceOptions(Map<String, Value>);

impl InstanceOptions {
	pub const ACCOUNT_ID: &'static str = "accountId";
	pub const PROFILE: &'static str = "profile";
	pub const SIZE: &'static str = "size";

	/// Creates options carrying the minimal required keys.
	pub fn new(account_id: impl Into<String>, profile: impl Into<String>, size: impl Into<Value>) -> Self {
		let mut map = Map::new();
		map.insert(Self::ACCOUNT_ID.into(), Value::String(account_id.into()));
		map.insert(Self::PROFILE.into(), Value::String(profile.into()));
		map.insert(Self::SIZE.into(), size.into());
		Self(map)
	}

	/// Adds or replaces an arbitrary key.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(key.into(), value.into());
		self
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	/// Borrows the underlying map.
	pub fn as_map(&self) -> &Map<String, Value> {
		&self.0
	}

	/// Consumes the options into a JSON object.
	pub fn into_value(self) -> Value {
		Value::Object(self.0)
	}
}

impl From<Map<String, Value>> for InstanceOptions {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}
