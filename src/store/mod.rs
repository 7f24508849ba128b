//! Key-value persistence used by the HD wallet, the transaction state and the wallet facade.
//!
//! A store hands out scoped sub-stores through [`Store::new_instance`], so every asset, token and
//! HD wallet writes into its own namespace and concurrent initialisation never collides on keys.
//! Values are JSON documents; [`StoreExt`] adds typed access on top.

mod error;
/// File-backed store, one JSON document per namespace
mod file;
/// In-memory store, mostly for tests and ephemeral wallets
mod memory;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Key-value persistence handle.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
	/// Open the store. Calling it on an already opened store is a no-op.
	async fn init(&self) -> Result<(), StoreError>;

	/// Whether `init` has completed and `close` has not been called.
	fn is_ready(&self) -> bool;

	async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

	async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

	async fn close(&self) -> Result<(), StoreError>;

	/// Create a store scoped to `name` that shares the same backend.
	fn new_instance(&self, name: &str) -> Arc<dyn Store>;

	/// Namespace of this instance, empty for the root store.
	fn namespace(&self) -> &str;
}

/// Typed JSON helpers for any [`Store`].
///
/// A stored `null` reads back as `None`, so writing `Value::Null` is how a key is cleared.
#[async_trait::async_trait]
pub trait StoreExt: Store {
	async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned + Send,
	{
		match self.get(key).await? {
			None | Some(Value::Null) => Ok(None),
			Some(value) => Ok(Some(serde_json::from_value(value)?)),
		}
	}

	async fn put_json<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
	where
		T: Serialize + Sync + ?Sized,
	{
		let value = serde_json::to_value(value)?;
		self.put(key, value).await
	}
}

impl<S: Store + ?Sized> StoreExt for S {}

/// Join a parent namespace and a child name the way every backend scopes its keys.
pub(crate) fn scoped_name(parent: &str, name: &str) -> String {
	if parent.is_empty() {
		name.to_string()
	} else {
		format!("{}/{}", parent, name)
	}
}
