//! Registry of named wallets.
//!
//! [`WalletManager`] keeps a `wallets` list in its own store, mapping every registered wallet name
//! to a [`WalletEntry`], and the exported [`WalletSnapshot`] of each wallet under
//! `wallet-<name>`. Wallets are rebuilt from their snapshot by a [`WalletLoader`], which decides
//! the store and the pay modules every asset runs on.

use crate::store::{Store, StoreExt};
use crate::wallet::facade::{Wallet, WalletSnapshot};
use crate::wallet::WalletError;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const WALLETS: &str = "wallets";

fn snapshot_key(name: &str) -> String {
	format!("wallet-{}", name)
}

/// Builds an uninitialised [`Wallet`] from its exported description.
#[async_trait::async_trait]
pub trait WalletLoader: Send + Sync {
	async fn load(&self, snapshot: &WalletSnapshot) -> Result<Wallet, WalletError>;
}

/// Registration record of one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
	pub name: String,
	pub assets: Vec<String>,
	/// RFC3339 registration time.
	pub added_at: String,
}

impl WalletEntry {
	fn for_snapshot(snapshot: &WalletSnapshot) -> Self {
		Self {
			name: snapshot.name.clone(),
			assets: snapshot
				.assets
				.iter()
				.map(|asset| asset.name.clone())
				.collect(),
			added_at: chrono::Utc::now().to_rfc3339(),
		}
	}
}

pub struct WalletManager {
	store: Arc<dyn Store>,
	loader: Arc<dyn WalletLoader>,
	loaded: Mutex<HashMap<String, Arc<Wallet>>>,
}

impl WalletManager {
	pub fn new(store: Arc<dyn Store>, loader: Arc<dyn WalletLoader>) -> Self {
		Self {
			store,
			loader,
			loaded: Mutex::new(HashMap::new()),
		}
	}

	pub async fn init(&self) -> Result<(), WalletError> {
		if !self.store.is_ready() {
			self.store.init().await?;
		}
		Ok(())
	}

	/// Registered wallets by name.
	pub async fn get_wallet_list(&self) -> Result<BTreeMap<String, WalletEntry>, WalletError> {
		Ok(self.store.get_json(WALLETS).await?.unwrap_or_default())
	}

	async fn update_wallet_list(
		&self,
		list: &BTreeMap<String, WalletEntry>,
	) -> Result<(), WalletError> {
		self.store.put_json(WALLETS, list).await?;
		Ok(())
	}

	/// A wallet loaded in this manager.
	pub async fn get_wallet(&self, name: &str) -> Option<Arc<Wallet>> {
		self.loaded.lock().await.get(name).cloned()
	}

	/// Register `snapshot` so the wallet can be loaded later.
	pub async fn add_wallet(&self, snapshot: &WalletSnapshot) -> Result<WalletEntry, WalletError> {
		if snapshot.name.is_empty() {
			return Err(WalletError::Config("Wallet name is required".into()));
		}
		let mut list = self.get_wallet_list().await?;
		if list.contains_key(&snapshot.name) {
			return Err(WalletError::DuplicateWallet(snapshot.name.clone()));
		}

		let entry = WalletEntry::for_snapshot(snapshot);
		self.store
			.put_json(&snapshot_key(&snapshot.name), snapshot)
			.await?;
		list.insert(snapshot.name.clone(), entry.clone());
		self.update_wallet_list(&list).await?;
		debug!("Registered wallet {}", snapshot.name);
		Ok(entry)
	}

	/// Forget a registered wallet, destroying it when it is loaded.
	pub async fn remove_wallet(&self, name: &str) -> Result<(), WalletError> {
		let mut list = self.get_wallet_list().await?;
		if list.remove(name).is_none() {
			return Err(WalletError::UnknownWallet(name.to_string()));
		}
		self.update_wallet_list(&list).await?;
		self.store.put(&snapshot_key(name), Value::Null).await?;

		let loaded = self.loaded.lock().await.remove(name);
		if let Some(wallet) = loaded {
			wallet.destroy().await?;
		}
		info!("Removed wallet {}", name);
		Ok(())
	}

	/// Build a new wallet, register it and keep it loaded. Returns its export.
	pub async fn create_wallet(&self, snapshot: WalletSnapshot) -> Result<WalletSnapshot, WalletError> {
		let mut loaded = self.loaded.lock().await;
		if loaded.contains_key(&snapshot.name)
			|| self.get_wallet_list().await?.contains_key(&snapshot.name)
		{
			return Err(WalletError::DuplicateWallet(snapshot.name));
		}

		let wallet = self.start(&snapshot).await?;
		let export = wallet.export_wallet().await?;
		if let Err(e) = self.add_wallet(&export).await {
			wallet.destroy().await?;
			return Err(e);
		}
		loaded.insert(export.name.clone(), wallet);
		info!("Created wallet {}", export.name);
		Ok(export)
	}

	/// Load a registered wallet from its snapshot, or return it when already loaded.
	pub async fn load_wallet(&self, name: &str) -> Result<Arc<Wallet>, WalletError> {
		let mut loaded = self.loaded.lock().await;
		if let Some(wallet) = loaded.get(name) {
			return Ok(wallet.clone());
		}
		if !self.get_wallet_list().await?.contains_key(name) {
			return Err(WalletError::UnknownWallet(name.to_string()));
		}

		let snapshot: WalletSnapshot = self
			.store
			.get_json(&snapshot_key(name))
			.await?
			.ok_or_else(|| {
				WalletError::Protocol(format!("wallet {} is registered without a snapshot", name))
			})?;
		let wallet = self.start(&snapshot).await?;
		loaded.insert(name.to_string(), wallet.clone());
		info!("Loaded wallet {}", name);
		Ok(wallet)
	}

	/// Load every registered wallet, in name order.
	pub async fn load_all(&self) -> Result<Vec<Arc<Wallet>>, WalletError> {
		let mut wallets = Vec::new();
		for name in self.get_wallet_list().await?.into_keys() {
			wallets.push(self.load_wallet(&name).await?);
		}
		Ok(wallets)
	}

	async fn start(&self, snapshot: &WalletSnapshot) -> Result<Arc<Wallet>, WalletError> {
		let wallet = self.loader.load(snapshot).await?;
		if wallet.name() != snapshot.name {
			return Err(WalletError::Protocol(format!(
				"loader built wallet {} for {}",
				wallet.name(),
				snapshot.name
			)));
		}
		wallet.initialize().await?;
		Ok(Arc::new(wallet))
	}

	/// Destroy every loaded wallet and close the registry store.
	pub async fn close(&self) -> Result<(), WalletError> {
		let loaded: Vec<_> = self.loaded.lock().await.drain().collect();
		for (name, wallet) in loaded {
			if let Err(e) = wallet.destroy().await {
				warn!("Failed to destroy wallet {}: {}", name, e);
			}
		}
		self.store.close().await?;
		Ok(())
	}
}
