//! Chain-agnostic pay module.
//!
//! [`WalletPayGeneric`] wires a provider, a key manager, an HD wallet and a state together and
//! implements address issuance, balances, history and the crawl that rebuilds history from the
//! chain. Chain specific modules plug in through [`ChainDefaults`], which supplies whatever was not
//! injected through the builder.

use super::base::{AssetContext, PayCore, SyncOptions, WalletPay, WalletPayConfig};
use super::plugin::Plugin;
use super::token::{Token, TokenCall, TokenContext};
use crate::hd::{AddrType, HdPath, HdWallet, HdWalletConfig, ScanOutcome, SyncSignal};
use crate::provider::{
	AccountActivity, ConnectionManager, ConnectionStatus, Provider, ProviderEvent, ProviderTx,
};
use crate::store::Store;
use crate::wallet::sync::{
	CancelToken, EventBus, State, StateDb, SyncProgressTracker, SyncStats, WalletEvent,
};
use crate::wallet::{
	AddressDetail, Amount, AssetList, Balance, Currency, KeyManager, TxDirection, TxEntry,
	WalletError, WalletSeed,
};

use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Chain specific collaborators of [`WalletPayGeneric`].
#[async_trait::async_trait]
pub trait ChainDefaults: Send + Sync {
	fn currency(&self) -> Currency;

	async fn default_provider(&self) -> Result<Arc<dyn Provider>, WalletError> {
		Err(WalletError::NotImplemented("default_provider"))
	}

	async fn default_key_manager(&self) -> Result<Arc<dyn KeyManager>, WalletError> {
		Err(WalletError::NotImplemented("default_key_manager"))
	}

	/// BIP44 wallet in the `hdwallet-<currency>` namespace.
	fn default_hd_wallet(&self, store: &Arc<dyn Store>) -> Result<HdWallet, WalletError> {
		let currency = self.currency();
		let name = currency.name.to_lowercase();
		if name.is_empty() {
			return Err(WalletError::Config("Currency name is required".into()));
		}
		if currency.coin_type.is_empty() {
			return Err(WalletError::Config("Currency coin type is required".into()));
		}
		HdWallet::new(
			store.new_instance(&format!("hdwallet-{}", name)),
			HdWalletConfig::new(format!("{}'", currency.coin_type), "44'"),
		)
	}

	/// Store-backed state in the `state-<currency>` namespace.
	fn default_state(
		&self,
		store: &Arc<dyn Store>,
		hd_wallet: Arc<HdWallet>,
	) -> Result<Arc<dyn State>, WalletError> {
		let name = self.currency().name.to_lowercase();
		if name.is_empty() {
			return Err(WalletError::Config("Currency name is required".into()));
		}
		Ok(Arc::new(StateDb::new(
			store.new_instance(&format!("state-{}", name)),
			Some(hd_wallet),
		)))
	}

	/// Balance of one address. Only `confirmed` is known to this layer; chains with a mempool
	/// view override this to fill in `pending` and `mempool`.
	async fn address_balance(
		&self,
		provider: &dyn Provider,
		address: &str,
	) -> Result<Balance, WalletError> {
		Ok(Balance::confirmed(provider.get_address_balance(address).await?))
	}
}

/// [`ChainDefaults`] that only knows its currency. Every collaborator must be injected.
pub struct StandardChain {
	currency: Currency,
}

impl StandardChain {
	pub fn new(currency: Currency) -> Self {
		Self { currency }
	}
}

impl ChainDefaults for StandardChain {
	fn currency(&self) -> Currency {
		self.currency.clone()
	}
}

/// Turns provider data into state updates and events. Shared by the crawl and the task listening
/// to pushed account activity.
#[derive(Clone)]
struct Ingestor {
	currency: Currency,
	chain: Arc<dyn ChainDefaults>,
	provider: Arc<dyn Provider>,
	state: Arc<dyn State>,
	tokens: Arc<RwLock<AssetList<Arc<dyn Token>>>>,
	events: EventBus,
}

impl Ingestor {
	async fn store_tx(
		&self,
		tx: &ProviderTx,
		watched: &str,
		state: &dyn State,
	) -> Result<TxEntry, WalletError> {
		let entry = TxEntry {
			txid: tx.hash.clone(),
			from_address: vec![tx.from.clone()],
			to_address: vec![tx.to.clone()],
			amount: tx.value,
			fee: None,
			fee_rate: None,
			height: tx.block_number,
			direction: TxDirection::for_address(watched, &tx.from, &tx.to),
			currency: self.currency.name.clone(),
		};
		state.store_tx_history(&entry).await?;
		Ok(entry)
	}

	async fn set_addr_balance(&self, address: &str, state: &dyn State) -> Result<(), WalletError> {
		let balance = self
			.chain
			.address_balance(self.provider.as_ref(), address)
			.await?;
		state.set_balance(address, balance.confirmed).await
	}

	/// Query the history of `addr` and record it. Returns the number of transactions found.
	async fn scan_address(
		&self,
		addr: &AddressDetail,
		hd_wallet: &HdWallet,
		state: &dyn State,
	) -> Result<usize, WalletError> {
		let txs = self
			.provider
			.get_transactions_by_address(&addr.address)
			.await?;
		if txs.is_empty() {
			return Ok(0);
		}

		hd_wallet.add_address(addr).await?;
		for tx in &txs {
			self.store_tx(tx, &addr.address, state).await?;
		}
		self.set_addr_balance(&addr.address, state).await?;
		Ok(txs.len())
	}

	async fn on_activity(&self, activity: &AccountActivity) -> Result<(), WalletError> {
		if let Some(contract) = &activity.token {
			let tokens: Vec<Arc<dyn Token>> = self.tokens.read().await.values().cloned().collect();
			for token in tokens {
				let matches = token
					.contract()
					.is_some_and(|known| known.eq_ignore_ascii_case(contract));
				if !matches {
					continue;
				}
				let tx = token.update_tx_event(activity).await?;
				self.events.emit(WalletEvent::NewTx {
					asset: None,
					token: Some(token.name().to_string()),
					address: activity.address.clone(),
					height: activity.height,
					tx: Some(tx),
				});
			}
			return Ok(());
		}

		let tx = match &activity.tx {
			Some(tx) => Some(
				self.store_tx(tx, &activity.address, self.state.as_ref())
					.await?,
			),
			None => None,
		};
		self.set_addr_balance(&activity.address, self.state.as_ref())
			.await?;
		self.events.emit(WalletEvent::NewTx {
			asset: None,
			token: None,
			address: activity.address.clone(),
			height: activity.height.or(tx.as_ref().map(|tx| tx.height)),
			tx,
		});
		Ok(())
	}

	fn spawn_listener(self, mut events: broadcast::Receiver<ProviderEvent>) -> Listener {
		let shutdown = CancelToken::new();
		let stop = shutdown.clone();
		let handle = tokio::spawn(async move {
			loop {
				let received = tokio::select! {
					biased;
					_ = stop.cancelled() => break,
					received = events.recv() => received,
				};
				match received {
					Ok(ProviderEvent::SubscribeAccount(activity)) => {
						if let Err(e) = self.on_activity(&activity).await {
							error!(
								"Failed to process activity on {}: {}",
								activity.address, e
							);
						}
					}
					Ok(ProviderEvent::NewBlock { height }) => {
						self.events.emit(WalletEvent::NewBlock {
							asset: None,
							height,
						});
					}
					Ok(ProviderEvent::Error { message }) => {
						warn!("Provider subscription error: {}", message);
					}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!("Provider listener skipped {} events", skipped);
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
			debug!("Provider listener stopped");
		});
		Listener { shutdown, handle }
	}
}

/// Task relaying provider events, stopped between events through `shutdown`.
struct Listener {
	shutdown: CancelToken,
	handle: JoinHandle<()>,
}

impl Listener {
	async fn stop(self) {
		self.shutdown.cancel();
		if let Err(e) = self.handle.await {
			warn!("Provider listener ended abnormally: {}", e);
		}
	}
}

/// Generic pay module built on an HD wallet and a chain data provider.
pub struct WalletPayGeneric {
	core: PayCore,
	chain: Arc<dyn ChainDefaults>,
	provider: OnceLock<Arc<dyn Provider>>,
	key_manager: OnceLock<Arc<dyn KeyManager>>,
	hd_wallet: OnceLock<Arc<HdWallet>>,
	state: OnceLock<Arc<dyn State>>,
	halt: CancelToken,
	ready: AtomicBool,
	listener: Mutex<Option<Listener>>,
}

/// Builder of [`WalletPayGeneric`]. Anything left unset comes from [`ChainDefaults`] on
/// initialisation.
pub struct WalletPayGenericBuilder {
	config: WalletPayConfig,
	chain: Arc<dyn ChainDefaults>,
	store: Option<Arc<dyn Store>>,
	seed: Option<WalletSeed>,
	provider: Option<Arc<dyn Provider>>,
	key_manager: Option<Arc<dyn KeyManager>>,
	hd_wallet: Option<Arc<HdWallet>>,
	state: Option<Arc<dyn State>>,
	tokens: Vec<Arc<dyn Token>>,
}

impl WalletPayGenericBuilder {
	pub fn store(mut self, store: Arc<dyn Store>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn seed(mut self, seed: WalletSeed) -> Self {
		self.seed = Some(seed);
		self
	}

	pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
		self.provider = Some(provider);
		self
	}

	pub fn key_manager(mut self, key_manager: Arc<dyn KeyManager>) -> Self {
		self.key_manager = Some(key_manager);
		self
	}

	pub fn hd_wallet(mut self, hd_wallet: Arc<HdWallet>) -> Self {
		self.hd_wallet = Some(hd_wallet);
		self
	}

	pub fn state(mut self, state: Arc<dyn State>) -> Self {
		self.state = Some(state);
		self
	}

	pub fn token(mut self, token: Arc<dyn Token>) -> Self {
		self.tokens.push(token);
		self
	}

	/// Fails on a missing asset name or network, or on duplicate token names.
	pub fn build(self) -> Result<WalletPayGeneric, WalletError> {
		let mut core = PayCore::new(self.config)?;
		if let Some(store) = self.store {
			core = core.with_store(store);
		}
		if let Some(seed) = self.seed {
			core = core.with_seed(seed);
		}
		for token in self.tokens {
			core = core.with_token(token)?;
		}

		let pay = WalletPayGeneric {
			core,
			chain: self.chain,
			provider: OnceLock::new(),
			key_manager: OnceLock::new(),
			hd_wallet: OnceLock::new(),
			state: OnceLock::new(),
			halt: CancelToken::new(),
			ready: AtomicBool::new(false),
			listener: Mutex::new(None),
		};
		if let Some(provider) = self.provider {
			let _ = pay.provider.set(provider);
		}
		if let Some(key_manager) = self.key_manager {
			let _ = pay.key_manager.set(key_manager);
		}
		if let Some(hd_wallet) = self.hd_wallet {
			let _ = pay.hd_wallet.set(hd_wallet);
		}
		if let Some(state) = self.state {
			let _ = pay.state.set(state);
		}
		Ok(pay)
	}
}

fn missing(what: &str) -> WalletError {
	WalletError::Protocol(format!("{} is not set, initialize the asset first", what))
}

impl WalletPayGeneric {
	pub fn builder(config: WalletPayConfig, chain: Arc<dyn ChainDefaults>) -> WalletPayGenericBuilder {
		WalletPayGenericBuilder {
			config,
			chain,
			store: None,
			seed: None,
			provider: None,
			key_manager: None,
			hd_wallet: None,
			state: None,
			tokens: Vec::new(),
		}
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Acquire)
	}

	pub fn provider(&self) -> Result<Arc<dyn Provider>, WalletError> {
		self.provider.get().cloned().ok_or_else(|| missing("provider"))
	}

	pub fn key_manager(&self) -> Result<Arc<dyn KeyManager>, WalletError> {
		self.key_manager
			.get()
			.cloned()
			.ok_or_else(|| missing("key manager"))
	}

	pub fn hd_wallet(&self) -> Result<Arc<HdWallet>, WalletError> {
		self.hd_wallet.get().cloned().ok_or_else(|| missing("HD wallet"))
	}

	pub fn state(&self) -> Result<Arc<dyn State>, WalletError> {
		self.state.get().cloned().ok_or_else(|| missing("state"))
	}

	/// Connection manager of the provider, when it keeps a live connection.
	pub fn connection(&self) -> Option<Arc<ConnectionManager>> {
		self.provider.get().and_then(|provider| provider.connection())
	}

	pub fn is_connected(&self) -> bool {
		self.provider
			.get()
			.is_some_and(|provider| provider.is_connected())
	}

	pub fn get_connection_status(&self) -> ConnectionStatus {
		match self.connection() {
			Some(connection) => connection.get_connection_status(),
			None if self.is_connected() => ConnectionStatus::Connected,
			None => ConnectionStatus::Disconnected,
		}
	}

	pub async fn reconnect(&self) -> Result<(), WalletError> {
		match self.connection() {
			Some(connection) => connection.reconnect().await,
			None => self.provider()?.connect().await,
		}
	}

	fn ingestor(&self) -> Result<Ingestor, WalletError> {
		Ok(Ingestor {
			currency: self.chain.currency(),
			chain: self.chain.clone(),
			provider: self.provider()?,
			state: self.state()?,
			tokens: self.core.token_list(),
			events: self.core.events().clone(),
		})
	}

	fn token_context(&self) -> Result<TokenContext, WalletError> {
		Ok(TokenContext {
			asset_name: self.core.asset_name().to_string(),
			currency: self.chain.currency().name.to_lowercase(),
			store: self.core.store()?,
			provider: self.provider()?,
			hd_config: self.hd_wallet()?.config().clone(),
			events: self.core.events().clone(),
		})
	}

	/// HD wallet a sync of `token` (or of the native asset) walks.
	fn scan_wallet(
		&self,
		token: Option<&str>,
		state: &dyn State,
	) -> Result<Arc<HdWallet>, WalletError> {
		let native = self.hd_wallet()?;
		match (token, state.hd_wallet()) {
			(None, Some(hd_wallet)) => Ok(hd_wallet),
			(None, None) => Ok(native),
			(Some(_), Some(hd_wallet)) if !Arc::ptr_eq(&hd_wallet, &native) => Ok(hd_wallet),
			(Some(name), _) => Err(WalletError::Protocol(format!(
				"token {} has no HD wallet of its own",
				name
			))),
		}
	}

	async fn state_for(&self, token: Option<&str>) -> Result<Arc<dyn State>, WalletError> {
		match token {
			Some(name) => self
				.core
				.call_token(TokenCall::GetState, Some(name))
				.await?
				.into_one()?
				.into_state(),
			None => self.state(),
		}
	}

	/// Scan one address: record its history and answer whether it has any.
	pub async fn sync_address_path(
		&self,
		addr: &AddressDetail,
		addr_type: AddrType,
		state: &dyn State,
	) -> Result<SyncSignal, WalletError> {
		let hd_wallet = state.hd_wallet().map_or_else(|| self.hd_wallet(), Ok)?;
		let found = self
			.ingestor()?
			.scan_address(addr, &hd_wallet, state)
			.await?;
		Ok(self.signal_for(addr, addr_type, found))
	}

	fn signal_for(&self, addr: &AddressDetail, addr_type: AddrType, found: usize) -> SyncSignal {
		if found > 0 {
			return SyncSignal::HasTx;
		}
		if let Some(path) = addr.path.clone() {
			self.core.events().emit(WalletEvent::SyncedPath {
				addr_type,
				path,
				address: addr.address.clone(),
				has_tx: false,
			});
		}
		SyncSignal::NoTx
	}

	async fn subscribe_last_addresses(&self) -> Result<(), WalletError> {
		let provider = self.provider()?;
		let addresses = self.hd_wallet()?.get_all_address().await?;
		let contracts = self.core.token_contracts().await;
		let watch = self.core.config().max_addrs_watch;
		let recent = &addresses[addresses.len().saturating_sub(watch)..];

		try_join_all(
			recent
				.iter()
				.map(|address| provider.subscribe_to_account(address, &contracts)),
		)
		.await?;
		debug!(
			"Watching {} recent addresses of {}",
			recent.len(),
			self.core.asset_name()
		);
		Ok(())
	}

	async fn finish_init(&self) -> Result<(), WalletError> {
		self.state()?.init().await?;
		self.hd_wallet()?.init().await?;

		let ctx = self.token_context()?;
		self.core.call_token(TokenCall::Init(&ctx), None).await?;

		let provider = self.provider()?;
		let listener = self.ingestor()?.spawn_listener(provider.events());
		let previous = self.listener.lock().await.replace(listener);
		if let Some(previous) = previous {
			previous.stop().await;
		}
		self.subscribe_last_addresses().await
	}
}

#[async_trait::async_trait]
impl WalletPay for WalletPayGeneric {
	fn core(&self) -> &PayCore {
		&self.core
	}

	async fn initialize(&self, ctx: Option<&AssetContext>) -> Result<(), WalletError> {
		if self.provider.get().is_none() {
			let provider = self.chain.default_provider().await?;
			provider.init().await?;
			let _ = self.provider.set(provider);
		}
		if let Some(connection) = self.connection() {
			if self.core.plugin(Plugin::name(connection.as_ref())).await.is_none() {
				self.core.load_plugin(connection).await?;
			}
		}

		if self.key_manager.get().is_none() {
			let key_manager = self.chain.default_key_manager().await?;
			let _ = self.key_manager.set(key_manager);
		}

		let seed = match self.core.attach(ctx)? {
			Some(seed) => Some(seed),
			None => self.core.seed().cloned(),
		};
		if let Some(seed) = seed {
			self.key_manager()?.set_seed(&seed).await?;
		}

		let store = self.core.store()?;
		if self.hd_wallet.get().is_none() {
			let hd_wallet = self
				.chain
				.default_hd_wallet(&store)?
				.with_events(self.core.events().clone());
			let _ = self.hd_wallet.set(Arc::new(hd_wallet));
		}
		if self.state.get().is_none() {
			let state = self.chain.default_state(&store, self.hd_wallet()?)?;
			let _ = self.state.set(state);
		}

		self.finish_init().await?;
		self.ready.store(true, Ordering::Release);
		info!(
			"Asset {} ready on {}",
			self.core.asset_name(),
			self.core.network()
		);
		Ok(())
	}

	async fn get_new_address(&self) -> Result<AddressDetail, WalletError> {
		let key_manager = self.key_manager()?;
		let addr = self
			.hd_wallet()?
			.get_new_address(move |path| async move { key_manager.addr_from_path(&path).await })
			.await?;

		let contracts = self.core.token_contracts().await;
		if let Err(e) = self
			.provider()?
			.subscribe_to_account(&addr.address, &contracts)
			.await
		{
			warn!("Failed to watch new address {}: {}", addr.address, e);
		}
		Ok(addr)
	}

	/// Crawl the HD paths and rebuild balances and history.
	///
	/// Callers must not run two syncs of the same asset concurrently.
	async fn sync_transactions(&self, opts: SyncOptions) -> Result<SyncStats, WalletError> {
		let state = self.state_for(opts.token.as_deref()).await?;
		let hd_wallet = self.scan_wallet(opts.token.as_deref(), state.as_ref())?;
		if opts.reset {
			info!("Resetting sync state of {}", self.core.asset_name());
			hd_wallet.reset_sync_state().await?;
			state.reset().await?;
		}

		let key_manager = self.key_manager()?;
		let ingestor = self.ingestor()?;
		let tracker = Mutex::new(SyncProgressTracker::new(self.core.asset_name()));
		info!("Starting sync of {}", self.core.asset_name());

		let this = self;
		let state_ref = state.as_ref();
		let hd_ref = hd_wallet.as_ref();
		let key_manager = key_manager.as_ref();
		let ingestor = &ingestor;
		let tracker_ref = &tracker;
		let token = opts.token.as_deref();
		let extra_cancel = opts.cancel.as_ref();

		let scan = hd_wallet
			.each_account(None, &self.halt, move |sync_state| async move {
				if extra_cancel.is_some_and(CancelToken::is_cancelled) {
					return Ok(SyncSignal::Stop);
				}
				let path = sync_state
					.path
					.clone()
					.ok_or_else(|| WalletError::Protocol("scan state has no path".into()))?;
				tracker_ref
					.lock()
					.await
					.record_path(sync_state.addr_type, &path);

				let addr = key_manager.addr_from_path(&path).await?;
				let signal = match token {
					Some(name) => this
						.core
						.call_token(TokenCall::SyncPath(&addr), Some(name))
						.await?
						.into_one()?
						.into_signal()?,
					None => {
						let found = ingestor.scan_address(&addr, hd_ref, state_ref).await?;
						if found > 0 {
							tracker_ref.lock().await.record_activity(found);
						}
						this.signal_for(&addr, sync_state.addr_type, found)
					}
				};

				if signal == SyncSignal::HasTx {
					this.core.events().emit(WalletEvent::SyncedPath {
						addr_type: sync_state.addr_type,
						path,
						address: addr.address.clone(),
						has_tx: true,
					});
				}
				tracker_ref.lock().await.log_progress(false);
				Ok(signal)
			})
			.await;

		let halted = self.halt.is_cancelled()
			|| opts.cancel.as_ref().is_some_and(CancelToken::is_cancelled);
		self.halt.reset();
		let outcome = scan?;

		let mut tracker = tracker.into_inner();
		if outcome == ScanOutcome::Stopped || halted {
			tracker.mark_halted();
		}
		tracker.log_progress(true);
		if let Err(e) = tracker.validate_completion() {
			warn!("Sync of {} finished with issues: {}", self.core.asset_name(), e);
		}

		let stats = tracker.get_stats();
		info!("Sync of {} finished: {}", self.core.asset_name(), stats.summary());
		self.core.events().emit(WalletEvent::SyncEnd {
			asset: self.core.asset_name().to_string(),
			halted: stats.halted,
		});
		Ok(stats)
	}

	async fn pause_sync(&self) -> Result<(), WalletError> {
		self.halt.cancel();
		Ok(())
	}

	async fn resume_sync(&self) -> Result<(), WalletError> {
		self.halt.reset();
		Ok(())
	}

	async fn get_transactions(
		&self,
		token: Option<&str>,
		on_block: &mut (dyn FnMut(Vec<TxEntry>) + Send),
	) -> Result<(), WalletError> {
		let state = self.state_for(token).await?;
		let Some(index) = state.get_tx_index().await? else {
			return Ok(());
		};
		for height in index.heights() {
			let block = state.get_tx_history(height).await?;
			if !block.is_empty() {
				on_block(block);
			}
		}
		Ok(())
	}

	async fn get_balance(
		&self,
		token: Option<&str>,
		address: Option<&str>,
	) -> Result<Balance, WalletError> {
		if let Some(name) = token {
			return self
				.core
				.call_token(TokenCall::GetBalance { address }, Some(name))
				.await?
				.into_one()?
				.into_balance();
		}

		match address {
			None => {
				let balances = self.state()?.get_balances().await?;
				Ok(Balance::confirmed(balances.total()))
			}
			Some(address) => {
				self.chain
					.address_balance(self.provider()?.as_ref(), address)
					.await
			}
		}
	}

	async fn get_fee_estimate(&self) -> Result<Amount, WalletError> {
		self.provider()?.get_fee_estimate().await
	}

	fn parse_path(&self, path: &str) -> Result<HdPath, WalletError> {
		HdPath::parse(path)
	}

	/// Tear down tokens, provider, HD wallet, state and store, in that order.
	async fn destroy(&self) -> Result<(), WalletError> {
		self.ready.store(false, Ordering::Release);
		let listener = self.listener.lock().await.take();
		if let Some(listener) = listener {
			listener.stop().await;
		}
		self.core.call_token(TokenCall::Destroy, None).await?;
		self.provider()?.stop().await?;
		if let Some(connection) = self.connection() {
			connection.destroy();
		}
		self.key_manager()?.close().await?;
		self.hd_wallet()?.close().await?;
		self.state()?.close().await?;
		self.core.store()?.close().await?;
		self.core.shutdown().await;
		info!("Asset {} destroyed", self.core.asset_name());
		Ok(())
	}
}
