use super::{Store, StoreError, scoped_name};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const CLOSED: u8 = 0;
const READY: u8 = 1;
const FRESH: u8 = 2;

/// On-disk layout of one namespace.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
	namespace: String,
	updated_at: Option<String>,
	entries: BTreeMap<String, Value>,
}

/// File-based store. Every namespace lives in its own JSON document inside `data_dir`, which is
/// loaded on `init` and replaced after every `put`. A replacement is written to a `.tmp` sibling
/// and renamed over the document, so a crash mid-write leaves the previous document intact.
pub struct FileStore {
	data_dir: PathBuf,
	namespace: String,
	entries: Mutex<BTreeMap<String, Value>>,
	status: AtomicU8,
}

impl FileStore {
	pub fn new(data_dir: impl Into<PathBuf>) -> Self {
		Self::scoped(data_dir.into(), String::new())
	}

	fn scoped(data_dir: PathBuf, namespace: String) -> Self {
		Self {
			data_dir,
			namespace,
			entries: Mutex::new(BTreeMap::new()),
			status: AtomicU8::new(FRESH),
		}
	}

	/// Path of the document backing this namespace.
	pub fn document_path(&self) -> PathBuf {
		Self::document_filename(&self.data_dir, &self.namespace)
	}

	fn document_filename(data_dir: &Path, namespace: &str) -> PathBuf {
		let name = if namespace.is_empty() {
			"root".to_string()
		} else {
			hex::encode(namespace)
		};
		data_dir.join(format!("store_{}.json", name))
	}

	fn temp_path(&self) -> PathBuf {
		self.document_path().with_extension("json.tmp")
	}

	fn check(&self) -> Result<(), StoreError> {
		match self.status.load(Ordering::Acquire) {
			READY => Ok(()),
			CLOSED => Err(StoreError::Closed),
			_ => Err(StoreError::NotReady),
		}
	}

	async fn write_document(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
		let document = StoreDocument {
			namespace: self.namespace.clone(),
			updated_at: Some(chrono::Utc::now().to_rfc3339()),
			entries: entries.clone(),
		};
		let content = serde_json::to_string_pretty(&document)?;

		let temp_path = self.temp_path();
		let mut file = tokio::fs::File::create(&temp_path).await?;
		file.write_all(content.as_bytes()).await?;
		file.sync_all().await?;
		drop(file);

		if let Err(e) = tokio::fs::rename(&temp_path, self.document_path()).await {
			let _ = tokio::fs::remove_file(&temp_path).await;
			return Err(e.into());
		}
		Ok(())
	}
}

#[async_trait::async_trait]
impl Store for FileStore {
	async fn init(&self) -> Result<(), StoreError> {
		if self.is_ready() {
			return Ok(());
		}
		tokio::fs::create_dir_all(&self.data_dir).await?;

		let path = self.document_path();
		let temp_path = self.temp_path();
		if tokio::fs::try_exists(&temp_path).await? {
			warn!("Discarding unfinished write {:?}", temp_path);
			tokio::fs::remove_file(&temp_path).await?;
		}

		let mut entries = self.entries.lock().await;
		if tokio::fs::try_exists(&path).await? {
			let content = tokio::fs::read_to_string(&path).await?;
			let document: StoreDocument = serde_json::from_str(&content)?;
			info!(
				"Loaded {} keys for namespace '{}' from {:?}",
				document.entries.len(),
				self.namespace,
				path
			);
			*entries = document.entries;
		} else {
			debug!("No store document at {:?}, starting empty", path);
		}

		self.status.store(READY, Ordering::Release);
		Ok(())
	}

	fn is_ready(&self) -> bool {
		self.status.load(Ordering::Acquire) == READY
	}

	async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
		self.check()?;
		Ok(self.entries.lock().await.get(key).cloned())
	}

	async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
		self.check()?;
		let mut entries = self.entries.lock().await;
		entries.insert(key.to_string(), value);
		self.write_document(&entries).await
	}

	async fn close(&self) -> Result<(), StoreError> {
		self.status.store(CLOSED, Ordering::Release);
		Ok(())
	}

	fn new_instance(&self, name: &str) -> Arc<dyn Store> {
		Arc::new(Self::scoped(
			self.data_dir.clone(),
			scoped_name(&self.namespace, name),
		))
	}

	fn namespace(&self) -> &str {
		&self.namespace
	}
}
