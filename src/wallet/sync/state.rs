//! Balance and transaction history bookkeeping of one asset.
//!
//! The default [`StateDb`] keeps everything in a store namespace:
//! `balances` maps addresses to base-unit amounts, `tx_index` lists the block heights with history,
//! and `tx:<height>` holds the entries of one block. Writing the same
//! transaction twice replaces the stored entry, so re-scanning a path is harmless.

use crate::hd::HdWallet;
use crate::store::{Store, StoreExt};
use crate::wallet::{Amount, TxEntry, WalletError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const BALANCES: &str = "balances";
const TX_INDEX: &str = "tx_index";

/// Block heights holding history.
///
/// Heights are listed individually, so reading a sparse history never walks the empty blocks
/// between `earliest` and `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIndex {
	pub earliest: u64,
	pub latest: u64,
	#[serde(default)]
	pub heights: BTreeSet<u64>,
}

impl TxIndex {
	fn new(height: u64) -> Self {
		Self {
			earliest: height,
			latest: height,
			heights: BTreeSet::from([height]),
		}
	}

	fn include(mut self, height: u64) -> Self {
		self.earliest = self.earliest.min(height);
		self.latest = self.latest.max(height);
		self.heights.insert(height);
		self
	}

	/// Heights with history, ascending.
	pub fn heights(&self) -> impl Iterator<Item = u64> + '_ {
		self.heights.iter().copied()
	}
}

/// Per-address balances of an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressBalances(BTreeMap<String, Amount>);

impl AddressBalances {
	pub fn get(&self, address: &str) -> Option<Amount> {
		self.0.get(address).copied()
	}

	pub fn set(&mut self, address: &str, amount: Amount) {
		self.0.insert(address.to_string(), amount);
	}

	pub fn total(&self) -> Amount {
		self.0.values().copied().sum()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Balance and history store of one asset.
#[async_trait::async_trait]
pub trait State: Send + Sync {
	async fn init(&self) -> Result<(), WalletError>;

	/// HD wallet whose addresses this state tracks.
	fn hd_wallet(&self) -> Option<Arc<HdWallet>>;

	async fn get_balances(&self) -> Result<AddressBalances, WalletError>;

	async fn set_balance(&self, address: &str, amount: Amount) -> Result<(), WalletError>;

	/// Record `entry` in the bucket of its block height.
	async fn store_tx_history(&self, entry: &TxEntry) -> Result<(), WalletError>;

	async fn get_tx_history(&self, height: u64) -> Result<Vec<TxEntry>, WalletError>;

	async fn get_tx_index(&self) -> Result<Option<TxIndex>, WalletError>;

	/// Drop every balance and history entry.
	async fn reset(&self) -> Result<(), WalletError>;

	async fn close(&self) -> Result<(), WalletError>;
}

/// Store-backed [`State`].
pub struct StateDb {
	store: Arc<dyn Store>,
	hd_wallet: Option<Arc<HdWallet>>,
	write_lock: Mutex<()>,
}

impl StateDb {
	pub fn new(store: Arc<dyn Store>, hd_wallet: Option<Arc<HdWallet>>) -> Self {
		Self {
			store,
			hd_wallet,
			write_lock: Mutex::new(()),
		}
	}
}

fn bucket_key(height: u64) -> String {
	format!("tx:{}", height)
}

#[async_trait::async_trait]
impl State for StateDb {
	async fn init(&self) -> Result<(), WalletError> {
		if !self.store.is_ready() {
			self.store.init().await?;
		}
		Ok(())
	}

	fn hd_wallet(&self) -> Option<Arc<HdWallet>> {
		self.hd_wallet.clone()
	}

	async fn get_balances(&self) -> Result<AddressBalances, WalletError> {
		Ok(self.store.get_json(BALANCES).await?.unwrap_or_default())
	}

	async fn set_balance(&self, address: &str, amount: Amount) -> Result<(), WalletError> {
		let _guard = self.write_lock.lock().await;
		let mut balances = self.get_balances().await?;
		balances.set(address, amount);
		self.store.put_json(BALANCES, &balances).await?;
		Ok(())
	}

	async fn store_tx_history(&self, entry: &TxEntry) -> Result<(), WalletError> {
		if !entry.is_valid() {
			warn!("Skipping invalid transaction entry {:?}", entry.txid);
			return Ok(());
		}

		let _guard = self.write_lock.lock().await;
		let key = bucket_key(entry.height);
		let mut bucket: Vec<TxEntry> = self.store.get_json(&key).await?.unwrap_or_default();
		match bucket.iter_mut().find(|stored| stored.txid == entry.txid) {
			Some(stored) => *stored = entry.clone(),
			None => bucket.push(entry.clone()),
		}
		self.store.put_json(&key, &bucket).await?;

		let index = match self.get_tx_index().await? {
			Some(index) => index.include(entry.height),
			None => TxIndex::new(entry.height),
		};
		self.store.put_json(TX_INDEX, &index).await?;
		debug!("Stored tx {} at height {}", entry.txid, entry.height);
		Ok(())
	}

	async fn get_tx_history(&self, height: u64) -> Result<Vec<TxEntry>, WalletError> {
		Ok(self
			.store
			.get_json(&bucket_key(height))
			.await?
			.unwrap_or_default())
	}

	async fn get_tx_index(&self) -> Result<Option<TxIndex>, WalletError> {
		Ok(self.store.get_json(TX_INDEX).await?)
	}

	async fn reset(&self) -> Result<(), WalletError> {
		let _guard = self.write_lock.lock().await;
		if let Some(index) = self.get_tx_index().await? {
			for height in index.heights() {
				self.store.put(&bucket_key(height), Value::Null).await?;
			}
		}
		self.store.put(TX_INDEX, Value::Null).await?;
		self.store.put(BALANCES, Value::Null).await?;
		Ok(())
	}

	async fn close(&self) -> Result<(), WalletError> {
		self.store.close().await?;
		Ok(())
	}
}
