use super::{Store, StoreError, scoped_name};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::RwLock;

const CLOSED: u8 = 0;
const READY: u8 = 1;
const FRESH: u8 = 2;

/// In-memory store. Instances created by `new_instance` share the same map and prefix their keys
/// with their namespace.
pub struct MemoryStore {
	entries: Arc<RwLock<HashMap<String, Value>>>,
	namespace: String,
	status: AtomicU8,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self {
			entries: Arc::new(RwLock::new(HashMap::new())),
			namespace: String::new(),
			status: AtomicU8::new(FRESH),
		}
	}

	fn key(&self, key: &str) -> String {
		if self.namespace.is_empty() {
			key.to_string()
		} else {
			format!("{}:{}", self.namespace, key)
		}
	}

	fn check(&self) -> Result<(), StoreError> {
		match self.status.load(Ordering::Acquire) {
			READY => Ok(()),
			CLOSED => Err(StoreError::Closed),
			_ => Err(StoreError::NotReady),
		}
	}

	/// Number of keys stored across every namespace sharing this backend.
	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Store for MemoryStore {
	async fn init(&self) -> Result<(), StoreError> {
		self.status.store(READY, Ordering::Release);
		Ok(())
	}

	fn is_ready(&self) -> bool {
		self.status.load(Ordering::Acquire) == READY
	}

	async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
		self.check()?;
		Ok(self.entries.read().await.get(&self.key(key)).cloned())
	}

	async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
		self.check()?;
		self.entries.write().await.insert(self.key(key), value);
		Ok(())
	}

	async fn close(&self) -> Result<(), StoreError> {
		self.status.store(CLOSED, Ordering::Release);
		Ok(())
	}

	fn new_instance(&self, name: &str) -> Arc<dyn Store> {
		Arc::new(Self {
			entries: self.entries.clone(),
			namespace: scoped_name(&self.namespace, name),
			status: AtomicU8::new(FRESH),
		})
	}

	fn namespace(&self) -> &str {
		&self.namespace
	}
}
