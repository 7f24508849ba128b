#![allow(dead_code)]

use wallet_state_sync::hd::{HdPath, SyncSignal};
use wallet_state_sync::provider::{AccountActivity, Provider, ProviderEvent, ProviderTx};
use wallet_state_sync::wallet::pay::{Token, TokenContext};
use wallet_state_sync::wallet::sync::{CancelToken, State, StateDb};
use wallet_state_sync::wallet::{
	AddressDetail, Amount, Balance, KeyManager, TxDirection, TxEntry, WalletError, WalletSeed,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::broadcast;

/// Address the stub key manager derives for `path`.
pub fn address_for(path: &str) -> String {
	format!("addr-{}", path)
}

pub fn tx(hash: &str, from: &str, to: &str, value: u128, height: u64) -> ProviderTx {
	ProviderTx {
		hash: hash.to_string(),
		from: from.to_string(),
		to: to.to_string(),
		value: Amount(value),
		block_number: height,
	}
}

/// In-memory provider with scripted histories and a pushable event stream.
pub struct MockProvider {
	history: Mutex<HashMap<String, Vec<ProviderTx>>>,
	balances: Mutex<HashMap<String, Amount>>,
	subscriptions: Mutex<Vec<(String, Vec<String>)>>,
	queried: Mutex<Vec<String>>,
	sender: broadcast::Sender<ProviderEvent>,
	connected: AtomicBool,
	stopped: AtomicBool,
	inits: AtomicUsize,
}

impl MockProvider {
	pub fn new() -> Self {
		let (sender, _) = broadcast::channel(64);
		Self {
			history: Mutex::new(HashMap::new()),
			balances: Mutex::new(HashMap::new()),
			subscriptions: Mutex::new(Vec::new()),
			queried: Mutex::new(Vec::new()),
			sender,
			connected: AtomicBool::new(false),
			stopped: AtomicBool::new(false),
			inits: AtomicUsize::new(0),
		}
	}

	/// Give `address` a history and the balance those transfers add up to.
	pub fn with_history(self, address: &str, txs: Vec<ProviderTx>) -> Self {
		let received: u128 = txs
			.iter()
			.filter(|tx| tx.to == address)
			.map(|tx| tx.value.0)
			.sum();
		self.set_balance(address, received);
		self.history
			.lock()
			.unwrap()
			.insert(address.to_string(), txs);
		self
	}

	pub fn set_balance(&self, address: &str, amount: u128) {
		self.balances
			.lock()
			.unwrap()
			.insert(address.to_string(), Amount(amount));
	}

	pub fn push(&self, event: ProviderEvent) {
		let _ = self.sender.send(event);
	}

	pub fn listeners(&self) -> usize {
		self.sender.receiver_count()
	}

	pub fn subscriptions(&self) -> Vec<(String, Vec<String>)> {
		self.subscriptions.lock().unwrap().clone()
	}

	pub fn queried(&self) -> Vec<String> {
		self.queried.lock().unwrap().clone()
	}

	pub fn is_stopped(&self) -> bool {
		self.stopped.load(Ordering::SeqCst)
	}

	pub fn inits(&self) -> usize {
		self.inits.load(Ordering::SeqCst)
	}
}

#[async_trait::async_trait]
impl Provider for MockProvider {
	async fn init(&self) -> Result<(), WalletError> {
		self.inits.fetch_add(1, Ordering::SeqCst);
		self.connected.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn connect(&self) -> Result<(), WalletError> {
		self.connected.store(true, Ordering::SeqCst);
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	async fn subscribe_to_account(
		&self,
		address: &str,
		token_contracts: &[String],
	) -> Result<(), WalletError> {
		self.subscriptions
			.lock()
			.unwrap()
			.push((address.to_string(), token_contracts.to_vec()));
		Ok(())
	}

	async fn get_transactions_by_address(
		&self,
		address: &str,
	) -> Result<Vec<ProviderTx>, WalletError> {
		self.queried.lock().unwrap().push(address.to_string());
		Ok(self
			.history
			.lock()
			.unwrap()
			.get(address)
			.cloned()
			.unwrap_or_default())
	}

	async fn get_address_balance(&self, address: &str) -> Result<Amount, WalletError> {
		Ok(self
			.balances
			.lock()
			.unwrap()
			.get(address)
			.copied()
			.unwrap_or(Amount::ZERO))
	}

	async fn get_fee_estimate(&self) -> Result<Amount, WalletError> {
		Ok(Amount(12))
	}

	fn events(&self) -> broadcast::Receiver<ProviderEvent> {
		self.sender.subscribe()
	}

	async fn stop(&self) -> Result<(), WalletError> {
		self.stopped.store(true, Ordering::SeqCst);
		self.connected.store(false, Ordering::SeqCst);
		Ok(())
	}
}

/// Derives `addr-<path>` for every path once a seed is set.
#[derive(Default)]
pub struct StubKeyManager {
	seed: Mutex<Option<WalletSeed>>,
}

impl StubKeyManager {
	pub fn seed(&self) -> Option<WalletSeed> {
		self.seed.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl KeyManager for StubKeyManager {
	async fn set_seed(&self, seed: &WalletSeed) -> Result<(), WalletError> {
		*self.seed.lock().unwrap() = Some(seed.clone());
		Ok(())
	}

	async fn addr_from_path(&self, path: &HdPath) -> Result<AddressDetail, WalletError> {
		if self.seed.lock().unwrap().is_none() {
			return Err(WalletError::KeyManager("seed is not set".into()));
		}
		Ok(AddressDetail::new(address_for(&path.to_string()), path.clone()))
	}
}

/// Token with its own state. Addresses listed in `active` have token history.
pub struct MockToken {
	name: String,
	contract: String,
	active: Vec<String>,
	state: OnceLock<Arc<StateDb>>,
	synced: Mutex<Vec<String>>,
	cancel_on: Option<(usize, CancelToken)>,
	destroyed: AtomicBool,
}

impl MockToken {
	pub fn new(name: &str, contract: &str, active: &[&str]) -> Self {
		Self {
			name: name.to_string(),
			contract: contract.to_string(),
			active: active.iter().map(|address| address.to_string()).collect(),
			state: OnceLock::new(),
			synced: Mutex::new(Vec::new()),
			cancel_on: None,
			destroyed: AtomicBool::new(false),
		}
	}

	/// Cancel `cancel` while scanning the `call`-th path.
	pub fn cancel_on_call(mut self, call: usize, cancel: CancelToken) -> Self {
		self.cancel_on = Some((call, cancel));
		self
	}

	pub fn synced(&self) -> Vec<String> {
		self.synced.lock().unwrap().clone()
	}

	pub fn is_destroyed(&self) -> bool {
		self.destroyed.load(Ordering::SeqCst)
	}

	fn state_db(&self) -> Result<Arc<StateDb>, WalletError> {
		self.state
			.get()
			.cloned()
			.ok_or_else(|| WalletError::Protocol(format!("token {} not initialised", self.name)))
	}
}

#[async_trait::async_trait]
impl Token for MockToken {
	fn name(&self) -> &str {
		&self.name
	}

	fn contract(&self) -> Option<&str> {
		Some(&self.contract)
	}

	async fn init(&self, ctx: &TokenContext) -> Result<(), WalletError> {
		let hd_wallet = ctx.hd_wallet_for(&self.name)?;
		hd_wallet.init().await?;
		let state = StateDb::new(
			ctx.store.new_instance(&format!("token-{}", self.name)),
			Some(hd_wallet),
		);
		state.init().await?;
		let _ = self.state.set(Arc::new(state));
		Ok(())
	}

	async fn get_balance(&self, address: Option<&str>) -> Result<Balance, WalletError> {
		let balances = self.state_db()?.get_balances().await?;
		let amount = match address {
			Some(address) => balances.get(address).unwrap_or(Amount::ZERO),
			None => balances.total(),
		};
		Ok(Balance::confirmed(amount))
	}

	async fn sync_path(&self, addr: &AddressDetail) -> Result<SyncSignal, WalletError> {
		let calls = {
			let mut synced = self.synced.lock().unwrap();
			synced.push(addr.address.clone());
			synced.len()
		};
		if let Some((call, cancel)) = &self.cancel_on {
			if *call == calls {
				cancel.cancel();
			}
		}
		if self.active.contains(&addr.address) {
			Ok(SyncSignal::HasTx)
		} else {
			Ok(SyncSignal::NoTx)
		}
	}

	async fn get_state(&self) -> Result<Arc<dyn State>, WalletError> {
		Ok(self.state_db()?)
	}

	async fn update_tx_event(&self, activity: &AccountActivity) -> Result<TxEntry, WalletError> {
		let tx = activity
			.tx
			.as_ref()
			.ok_or_else(|| WalletError::Provider("token activity without transfer".into()))?;
		let entry = TxEntry {
			txid: tx.hash.clone(),
			from_address: vec![tx.from.clone()],
			to_address: vec![tx.to.clone()],
			amount: tx.value,
			fee: None,
			fee_rate: None,
			height: tx.block_number,
			direction: TxDirection::for_address(&activity.address, &tx.from, &tx.to),
			currency: self.name.clone(),
		};
		let state = self.state_db()?;
		state.store_tx_history(&entry).await?;
		let current = state
			.get_balances()
			.await?
			.get(&activity.address)
			.unwrap_or(Amount::ZERO);
		state
			.set_balance(&activity.address, current + tx.value)
			.await?;
		Ok(entry)
	}

	async fn destroy(&self) -> Result<(), WalletError> {
		self.destroyed.store(true, Ordering::SeqCst);
		Ok(())
	}
}
