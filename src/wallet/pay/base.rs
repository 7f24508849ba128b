use super::plugin::{Plugin, PluginRegistry};
use super::token::{Token, TokenCall, TokenResult};
use crate::hd::HdPath;
use crate::store::Store;
use crate::wallet::sync::{CancelToken, EventBus, SyncStats};
use crate::wallet::{AddressDetail, Amount, AssetList, Balance, TxEntry, WalletError, WalletSeed};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Operations of [`WalletPay`]; plugins may not expose these names.
pub const PAY_OPERATIONS: &[&str] = &[
	"initialize",
	"destroy",
	"get_new_address",
	"sync_transactions",
	"pause_sync",
	"resume_sync",
	"get_transactions",
	"get_balance",
	"send_transaction",
	"is_valid_address",
	"get_fee_estimate",
	"parse_path",
	"call_token",
	"load_plugin",
];

/// Identity and tuning of one pay module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPayConfig {
	pub asset_name: String,
	pub network: String,
	/// Number of most recent addresses re-subscribed on start.
	#[serde(default = "default_max_addrs_watch")]
	pub max_addrs_watch: usize,
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,
}

fn default_max_addrs_watch() -> usize {
	5
}

fn default_event_capacity() -> usize {
	EventBus::DEFAULT_CAPACITY
}

impl WalletPayConfig {
	pub fn new(asset_name: impl Into<String>, network: impl Into<String>) -> Self {
		Self {
			asset_name: asset_name.into(),
			network: network.into(),
			max_addrs_watch: default_max_addrs_watch(),
			event_capacity: default_event_capacity(),
		}
	}

	pub fn validate(&self) -> Result<(), WalletError> {
		if self.asset_name.is_empty() {
			return Err(WalletError::Config("Asset name is required".into()));
		}
		if self.network.is_empty() {
			return Err(WalletError::Config("network is required".into()));
		}
		Ok(())
	}
}

/// What a wallet hands to its assets on initialisation.
#[derive(Clone)]
pub struct AssetContext {
	pub store: Arc<dyn Store>,
	pub seed: WalletSeed,
}

/// Options of `sync_transactions`.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
	/// Forget scan progress and history before scanning.
	pub reset: bool,
	/// Scan for this token instead of the native asset.
	pub token: Option<String>,
	/// Extra halt flag checked between paths.
	pub cancel: Option<CancelToken>,
}

impl SyncOptions {
	pub fn reset() -> Self {
		Self {
			reset: true,
			..Self::default()
		}
	}

	pub fn token(name: impl Into<String>) -> Self {
		Self {
			token: Some(name.into()),
			..Self::default()
		}
	}
}

/// Transfer request of `send_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
	pub to: String,
	pub amount: Amount,
	#[serde(default)]
	pub fee_rate: Option<u64>,
	#[serde(default)]
	pub token: Option<String>,
}

/// State shared by every pay module: identity, events, tokens and plugins.
pub struct PayCore {
	config: WalletPayConfig,
	events: EventBus,
	tokens: Arc<RwLock<AssetList<Arc<dyn Token>>>>,
	plugins: Mutex<PluginRegistry>,
	store: OnceLock<Arc<dyn Store>>,
	seed: OnceLock<WalletSeed>,
}

impl PayCore {
	/// Fails when the asset name or network is missing.
	pub fn new(config: WalletPayConfig) -> Result<Self, WalletError> {
		config.validate()?;
		Ok(Self {
			events: EventBus::new(config.event_capacity),
			config,
			tokens: Arc::new(RwLock::new(AssetList::new())),
			plugins: Mutex::new(PluginRegistry::new()),
			store: OnceLock::new(),
			seed: OnceLock::new(),
		})
	}

	/// Use a local store instead of the wallet's.
	pub fn with_store(self, store: Arc<dyn Store>) -> Self {
		let _ = self.store.set(store);
		self
	}

	pub fn with_seed(self, seed: WalletSeed) -> Self {
		let _ = self.seed.set(seed);
		self
	}

	/// Register `token` at construction time.
	pub fn with_token(self, token: Arc<dyn Token>) -> Result<Self, WalletError> {
		{
			let mut tokens = self.tokens.try_write().map_err(|_| {
				WalletError::Protocol("token list is locked during construction".into())
			})?;
			let name = token.name().to_string();
			if tokens.exists(&name) {
				return Err(WalletError::DuplicateToken(name));
			}
			tokens.set(&name, token)?;
		}
		Ok(self)
	}

	/// Shared handle on the token list, for tasks that outlive a borrow of the core.
	pub(crate) fn token_list(&self) -> Arc<RwLock<AssetList<Arc<dyn Token>>>> {
		self.tokens.clone()
	}

	pub fn config(&self) -> &WalletPayConfig {
		&self.config
	}

	pub fn asset_name(&self) -> &str {
		&self.config.asset_name
	}

	pub fn network(&self) -> &str {
		&self.config.network
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn store(&self) -> Result<Arc<dyn Store>, WalletError> {
		self.store
			.get()
			.cloned()
			.ok_or_else(|| WalletError::Config("store is missing".into()))
	}

	pub fn seed(&self) -> Option<&WalletSeed> {
		self.seed.get()
	}

	/// Adopt the wallet's store and seed where none are configured locally.
	///
	/// Returns the seed the key manager must be bound to, or `None` without a wallet.
	pub fn attach(&self, ctx: Option<&AssetContext>) -> Result<Option<WalletSeed>, WalletError> {
		let Some(ctx) = ctx else {
			return Ok(None);
		};
		let _ = self.store.set(ctx.store.clone());
		let _ = self.seed.set(ctx.seed.clone());
		let seed = self
			.seed
			.get()
			.cloned()
			.ok_or_else(|| WalletError::Config("seed is missing".into()))?;
		Ok(Some(seed))
	}

	pub async fn add_token(&self, token: Arc<dyn Token>) -> Result<(), WalletError> {
		let mut tokens = self.tokens.write().await;
		let name = token.name().to_string();
		if tokens.exists(&name) {
			return Err(WalletError::DuplicateToken(name));
		}
		tokens.set(&name, token)?;
		Ok(())
	}

	pub async fn token_names(&self) -> Vec<String> {
		self.tokens.read().await.keys().to_vec()
	}

	pub async fn tokens(&self) -> Vec<Arc<dyn Token>> {
		self.tokens.read().await.values().cloned().collect()
	}

	pub async fn token(&self, name: &str) -> Result<Arc<dyn Token>, WalletError> {
		self.tokens
			.read()
			.await
			.get(name)
			.cloned()
			.ok_or_else(|| WalletError::UnknownToken(name.to_string()))
	}

	/// Contracts of every token that has one.
	pub async fn token_contracts(&self) -> Vec<String> {
		self.tokens
			.read()
			.await
			.values()
			.filter_map(|token| token.contract().map(str::to_string))
			.collect()
	}

	/// Run `call` on the named token, or on every token concurrently.
	///
	/// Resolves to [`TokenResult::One`] when exactly one token answered.
	pub async fn call_token(
		&self,
		call: TokenCall<'_>,
		token_name: Option<&str>,
	) -> Result<TokenResult, WalletError> {
		let targets = match token_name {
			Some(name) => vec![self.token(name).await?],
			None => self.tokens().await,
		};
		debug!(
			"Calling {} on {} tokens of {}",
			call.name(),
			targets.len(),
			self.asset_name()
		);

		let outputs = try_join_all(targets.iter().map(|token| call.invoke(token.as_ref()))).await?;
		Ok(TokenResult::from_outputs(outputs))
	}

	/// Attach `plugin`, forwarding its events onto this module's bus.
	pub async fn load_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<(), WalletError> {
		self.plugins
			.lock()
			.await
			.register(plugin, PAY_OPERATIONS, &self.events)
	}

	pub async fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
		self.plugins.lock().await.get(name)
	}

	/// Stop plugin relays.
	pub async fn shutdown(&self) {
		self.plugins.lock().await.shutdown();
	}
}

/// Per-asset payment module.
///
/// Implementors provide [`WalletPay::core`]; every operation they do not override fails with
/// [`WalletError::NotImplemented`].
#[async_trait::async_trait]
pub trait WalletPay: Send + Sync {
	fn core(&self) -> &PayCore;

	fn asset_name(&self) -> &str {
		self.core().asset_name()
	}

	fn network(&self) -> &str {
		self.core().network()
	}

	fn events(&self) -> &EventBus {
		self.core().events()
	}

	/// Bind to the wallet in `ctx`. Without a wallet this only prepares standalone use.
	async fn initialize(&self, ctx: Option<&AssetContext>) -> Result<(), WalletError> {
		self.core().attach(ctx)?;
		Ok(())
	}

	async fn get_new_address(&self) -> Result<AddressDetail, WalletError> {
		Err(WalletError::NotImplemented("get_new_address"))
	}

	async fn sync_transactions(&self, _opts: SyncOptions) -> Result<SyncStats, WalletError> {
		Err(WalletError::NotImplemented("sync_transactions"))
	}

	async fn pause_sync(&self) -> Result<(), WalletError> {
		Err(WalletError::NotImplemented("pause_sync"))
	}

	async fn resume_sync(&self) -> Result<(), WalletError> {
		Err(WalletError::NotImplemented("resume_sync"))
	}

	/// Call `on_block` with the entries of every block holding history, oldest first.
	async fn get_transactions(
		&self,
		_token: Option<&str>,
		_on_block: &mut (dyn FnMut(Vec<TxEntry>) + Send),
	) -> Result<(), WalletError> {
		Err(WalletError::NotImplemented("get_transactions"))
	}

	async fn get_balance(
		&self,
		_token: Option<&str>,
		_address: Option<&str>,
	) -> Result<Balance, WalletError> {
		Err(WalletError::NotImplemented("get_balance"))
	}

	async fn send_transaction(&self, _opts: SendOptions) -> Result<TxEntry, WalletError> {
		Err(WalletError::NotImplemented("send_transaction"))
	}

	async fn is_valid_address(&self, _address: &str) -> Result<bool, WalletError> {
		Err(WalletError::NotImplemented("is_valid_address"))
	}

	async fn get_fee_estimate(&self) -> Result<Amount, WalletError> {
		Err(WalletError::NotImplemented("get_fee_estimate"))
	}

	fn parse_path(&self, _path: &str) -> Result<HdPath, WalletError> {
		Err(WalletError::NotImplemented("parse_path"))
	}

	async fn call_token(
		&self,
		call: TokenCall<'_>,
		token_name: Option<&str>,
	) -> Result<TokenResult, WalletError> {
		self.core().call_token(call, token_name).await
	}

	async fn destroy(&self) -> Result<(), WalletError> {
		self.core().shutdown().await;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemoryStore;
	use crate::wallet::pay::TokenOutput;
	use serde_json::json;

	struct Bare {
		core: PayCore,
	}

	impl WalletPay for Bare {
		fn core(&self) -> &PayCore {
			&self.core
		}
	}

	struct Fixed {
		name: &'static str,
		confirmed: u128,
	}

	#[async_trait::async_trait]
	impl Token for Fixed {
		fn name(&self) -> &str {
			self.name
		}

		async fn get_balance(&self, _address: Option<&str>) -> Result<Balance, WalletError> {
			Ok(Balance::confirmed(Amount(self.confirmed)))
		}
	}

	fn core() -> PayCore {
		PayCore::new(WalletPayConfig::new("btc", "regtest")).unwrap()
	}

	#[test]
	fn requires_asset_name_and_network() {
		assert!(matches!(
			PayCore::new(WalletPayConfig::new("", "regtest")),
			Err(WalletError::Config(_))
		));
		assert!(matches!(
			PayCore::new(WalletPayConfig::new("btc", "")),
			Err(WalletError::Config(_))
		));
	}

	#[tokio::test]
	async fn base_operations_are_not_implemented() {
		let pay = Bare { core: core() };
		assert!(matches!(
			pay.get_new_address().await,
			Err(WalletError::NotImplemented("get_new_address"))
		));
		assert!(matches!(
			pay.sync_transactions(SyncOptions::default()).await,
			Err(WalletError::NotImplemented(_))
		));
		assert!(matches!(pay.get_balance(None, None).await, Err(WalletError::NotImplemented(_))));
		assert!(matches!(pay.get_fee_estimate().await, Err(WalletError::NotImplemented(_))));
		assert!(matches!(pay.is_valid_address("x").await, Err(WalletError::NotImplemented(_))));
		assert!(matches!(pay.pause_sync().await, Err(WalletError::NotImplemented(_))));
		assert!(matches!(pay.parse_path("m/44'/0'/0'/0/0"), Err(WalletError::NotImplemented(_))));
		assert!(matches!(
			pay.send_transaction(SendOptions {
				to: "x".into(),
				amount: Amount(1),
				fee_rate: None,
				token: None,
			})
			.await,
			Err(WalletError::NotImplemented(_))
		));
	}

	#[tokio::test]
	async fn initialize_without_wallet_is_a_no_op() {
		let pay = Bare { core: core() };
		pay.initialize(None).await.unwrap();
		assert!(pay.core().store().is_err());

		let ctx = AssetContext {
			store: Arc::new(MemoryStore::new()),
			seed: WalletSeed(json!({ "mnemonic": "abandon" })),
		};
		pay.initialize(Some(&ctx)).await.unwrap();
		assert!(pay.core().store().is_ok());
		assert_eq!(pay.core().seed(), Some(&ctx.seed));
	}

	#[tokio::test]
	async fn call_token_unwraps_single_results() {
		let pay = Bare { core: core() };
		for (name, confirmed) in [("usdt", 1), ("usdc", 2), ("dai", 3)] {
			pay.core()
				.add_token(Arc::new(Fixed { name, confirmed }))
				.await
				.unwrap();
		}

		let all = pay
			.call_token(TokenCall::GetBalance { address: None }, None)
			.await
			.unwrap();
		assert!(matches!(&all, TokenResult::Many(outputs) if outputs.len() == 3));

		let one = pay
			.call_token(TokenCall::GetBalance { address: None }, Some("usdc"))
			.await
			.unwrap();
		let balance = one.into_one().unwrap().into_balance().unwrap();
		assert_eq!(balance.confirmed, Amount(2));

		assert!(matches!(
			pay.call_token(TokenCall::GetState, Some("usdc")).await,
			Err(WalletError::NotImplemented("get_state"))
		));
		assert!(matches!(
			pay.call_token(TokenCall::GetBalance { address: None }, Some("nope")).await,
			Err(WalletError::UnknownToken(_))
		));
		assert!(matches!(
			pay.call_token(TokenCall::Destroy, Some("dai")).await,
			Ok(TokenResult::One(TokenOutput::Done))
		));
	}

	#[tokio::test]
	async fn duplicate_tokens_are_rejected() {
		let pay = Bare { core: core() };
		pay.core()
			.add_token(Arc::new(Fixed { name: "usdt", confirmed: 0 }))
			.await
			.unwrap();
		assert!(matches!(
			pay.core()
				.add_token(Arc::new(Fixed { name: "usdt", confirmed: 0 }))
				.await,
			Err(WalletError::DuplicateToken(_))
		));
		assert_eq!(pay.core().token_names().await, vec!["usdt".to_string()]);
	}
}
