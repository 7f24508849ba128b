//! Multi-asset wallet.
//!
//! [`Wallet`] owns the seed and the root store, initialises every configured pay module against
//! them and keeps the ones that came up in an [`AssetList`]. Events of the assets are relayed onto
//! the wallet bus tagged with the asset name.

use crate::store::Store;
use crate::wallet::pay::{AssetContext, SyncOptions, WalletPay};
use crate::wallet::sync::{EventBus, WalletEvent};
use crate::wallet::{AssetList, Balance, WalletError, WalletSeed};

use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct WalletConfig {
	pub name: String,
	pub store: Arc<dyn Store>,
	pub seed: WalletSeed,
}

/// Options of [`Wallet::sync_history`].
#[derive(Debug, Clone, Default)]
pub struct SyncHistoryOptions {
	/// Only sync this asset.
	pub asset: Option<String>,
	/// Also sync every token of each synced asset.
	pub all: bool,
	pub reset: bool,
}

/// Exported description of a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
	pub name: String,
	pub seed: Value,
	pub assets: Vec<AssetSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSnapshot {
	pub name: String,
	pub network: String,
	pub tokens: Vec<String>,
}

pub struct Wallet {
	name: String,
	store: Arc<dyn Store>,
	seed: RwLock<Option<WalletSeed>>,
	configured: Mutex<Vec<Arc<dyn WalletPay>>>,
	assets: RwLock<AssetList<Arc<dyn WalletPay>>>,
	events: EventBus,
	relays: Mutex<Vec<JoinHandle<()>>>,
	destroyed: AtomicBool,
}

impl Wallet {
	/// Fails on an empty name or a null seed.
	pub fn new(config: WalletConfig, assets: Vec<Arc<dyn WalletPay>>) -> Result<Self, WalletError> {
		if config.name.is_empty() {
			return Err(WalletError::Config("Wallet name is required".into()));
		}
		if config.seed.0.is_null() {
			return Err(WalletError::Config("Seed not provided".into()));
		}
		Ok(Self {
			name: config.name,
			store: config.store,
			seed: RwLock::new(Some(config.seed)),
			configured: Mutex::new(assets),
			assets: RwLock::new(AssetList::new()),
			events: EventBus::default(),
			relays: Mutex::new(Vec::new()),
			destroyed: AtomicBool::new(false),
		})
	}

	fn ensure_alive(&self) -> Result<(), WalletError> {
		if self.destroyed.load(Ordering::Acquire) {
			return Err(WalletError::Destroyed);
		}
		Ok(())
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
		self.events.subscribe()
	}

	pub async fn seed(&self) -> Result<WalletSeed, WalletError> {
		self.ensure_alive()?;
		self.seed.read().await.clone().ok_or(WalletError::Destroyed)
	}

	/// Initialise every configured asset concurrently.
	///
	/// An asset that fails to initialise is logged and left out; the others still come up.
	/// Emits [`WalletEvent::Ready`] once every asset has been attempted.
	pub async fn initialize(&self) -> Result<(), WalletError> {
		self.ensure_alive()?;
		if !self.store.is_ready() {
			self.store.init().await?;
		}

		let ctx = AssetContext {
			store: self.store.clone(),
			seed: self.seed().await?,
		};
		let pending = std::mem::take(&mut *self.configured.lock().await);
		info!(
			"Initialising wallet {} with {} assets",
			self.name,
			pending.len()
		);

		let results = join_all(pending.iter().map(|pay| pay.initialize(Some(&ctx)))).await;
		for (pay, result) in pending.into_iter().zip(results) {
			if let Err(e) = result {
				error!("Failed to initialise asset {}: {}", pay.asset_name(), e);
				continue;
			}
			if let Err(e) = self.add_asset(pay.clone()).await {
				error!("Failed to register asset {}: {}", pay.asset_name(), e);
				self.discard(pay.as_ref()).await;
			}
		}

		self.events.emit(WalletEvent::Ready);
		Ok(())
	}

	/// Tear down an initialised asset that could not be registered.
	async fn discard(&self, pay: &dyn WalletPay) {
		if let Err(e) = pay.destroy().await {
			warn!("Failed to tear down asset {}: {}", pay.asset_name(), e);
		}
		// Assets close the store they were handed, which is the wallet's.
		if !self.store.is_ready() {
			if let Err(e) = self.store.init().await {
				error!("Failed to reopen the store of wallet {}: {}", self.name, e);
			}
		}
	}

	/// Register an initialised asset and relay its events.
	pub async fn add_asset(&self, pay: Arc<dyn WalletPay>) -> Result<(), WalletError> {
		self.ensure_alive()?;
		let name = pay.asset_name().to_string();
		self.assets.write().await.set(&name, pay.clone())?;

		let relay = spawn_relay(name.clone(), pay.events().subscribe(), self.events.clone());
		self.relays.lock().await.push(relay);
		debug!("Asset {} added to wallet {}", name, self.name);
		Ok(())
	}

	pub async fn pay(&self, asset: &str) -> Result<Arc<dyn WalletPay>, WalletError> {
		self.ensure_alive()?;
		self.assets
			.read()
			.await
			.get(asset)
			.cloned()
			.ok_or_else(|| WalletError::UnknownAsset(asset.to_string()))
	}

	pub async fn asset_names(&self) -> Result<Vec<String>, WalletError> {
		self.ensure_alive()?;
		Ok(self.assets.read().await.keys().to_vec())
	}

	async fn asset_handles(&self) -> Vec<Arc<dyn WalletPay>> {
		self.assets.read().await.values().cloned().collect()
	}

	/// Crawl history of one asset or of all of them, and optionally of their tokens.
	///
	/// Emits [`WalletEvent::AssetSynced`] after each asset or token sync.
	pub async fn sync_history(&self, opts: SyncHistoryOptions) -> Result<(), WalletError> {
		self.ensure_alive()?;
		let targets = match &opts.asset {
			Some(name) => vec![self.pay(name).await?],
			None => self.asset_handles().await,
		};

		for pay in targets {
			let asset = pay.asset_name().to_string();
			pay.sync_transactions(SyncOptions {
				reset: opts.reset,
				..SyncOptions::default()
			})
			.await?;
			self.events.emit(WalletEvent::AssetSynced {
				asset: asset.clone(),
				token: None,
			});

			if !opts.all {
				continue;
			}
			for token in pay.core().token_names().await {
				pay.sync_transactions(SyncOptions {
					reset: opts.reset,
					token: Some(token.clone()),
					cancel: None,
				})
				.await?;
				self.events.emit(WalletEvent::AssetSynced {
					asset: asset.clone(),
					token: Some(token),
				});
			}
		}
		Ok(())
	}

	/// Native balance of every asset, in registration order.
	pub async fn get_balances(&self) -> Result<Vec<(String, Balance)>, WalletError> {
		self.ensure_alive()?;
		let assets = self.asset_handles().await;
		let balances = try_join_all(assets.iter().map(|pay| pay.get_balance(None, None))).await?;
		Ok(assets
			.iter()
			.map(|pay| pay.asset_name().to_string())
			.zip(balances)
			.collect())
	}

	pub async fn export_wallet(&self) -> Result<WalletSnapshot, WalletError> {
		let seed = self.seed().await?;
		let mut assets = Vec::new();
		for pay in self.asset_handles().await {
			assets.push(AssetSnapshot {
				name: pay.asset_name().to_string(),
				network: pay.network().to_string(),
				tokens: pay.core().token_names().await,
			});
		}
		Ok(WalletSnapshot {
			name: self.name.clone(),
			seed: seed.to_json(),
			assets,
		})
	}

	/// Destroy every asset, drop the seed and close the store.
	///
	/// The wallet is unusable afterwards. Asset teardown errors are returned as they occur and
	/// leave the remaining assets untouched.
	pub async fn destroy(&self) -> Result<(), WalletError> {
		if self.destroyed.swap(true, Ordering::AcqRel) {
			return Err(WalletError::Destroyed);
		}
		for relay in self.relays.lock().await.drain(..) {
			relay.abort();
		}

		let assets = std::mem::take(&mut *self.assets.write().await);
		for pay in assets.values() {
			pay.destroy().await?;
		}

		self.seed.write().await.take();
		self.store.close().await?;
		info!("Wallet {} destroyed", self.name);
		Ok(())
	}
}

fn spawn_relay(
	asset: String,
	mut events: broadcast::Receiver<WalletEvent>,
	bus: EventBus,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match events.recv().await {
				Ok(event @ (WalletEvent::NewTx { .. } | WalletEvent::NewBlock { .. })) => {
					bus.emit(event.tagged(&asset));
				}
				Ok(_) => {}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!("Relay of {} skipped {} events", asset, skipped);
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	})
}
