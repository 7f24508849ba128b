//! Path bookkeeping and the resumable account scan.
//!
//! [`HdWallet`] persists every piece of its state in its store namespace:
//!
//! - `current_external_path` / `current_internal_path`: the next unused path of each chain
//! - `account_index`: known accounts, in scan order
//! - `address_index` and `addr:<address>`: discovered addresses and their detail records
//! - `sync_state_external` / `sync_state_internal`: scan progress of each branch
//! - `current_sync_addr_type`: the branch an interrupted scan resumes on
//!
//! [`HdWallet::each_account`] walks the external branch of every account, then the internal branch,
//! asking a caller-supplied callback for a [`SyncSignal`] at every path. State is written after
//! every step so an interrupted scan resumes at the path it stopped on.

use super::path::check_hardened;
use super::sync_state::{DEFAULT_GAP_LIMIT, DEFAULT_MAX_DEPTH};
use super::{AddrType, HdPath, SyncState};
use crate::store::{Store, StoreExt};
use crate::wallet::sync::{CancelToken, EventBus, WalletEvent};
use crate::wallet::{AddressDetail, WalletError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CURRENT_EXTERNAL_PATH: &str = "current_external_path";
const CURRENT_INTERNAL_PATH: &str = "current_internal_path";
const ACCOUNT_INDEX: &str = "account_index";
const ADDRESS_INDEX: &str = "address_index";
const CURRENT_SYNC_ADDR_TYPE: &str = "current_sync_addr_type";

/// HD wallet configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdWalletConfig {
	/// Hardened coin type segment, e.g. `0'`.
	pub coin_type: String,
	/// Hardened purpose segment, e.g. `84'`.
	pub purpose: String,
	#[serde(default = "default_gap_limit")]
	pub gap_limit: u32,
	#[serde(default = "default_max_depth")]
	pub max_depth: u32,
}

fn default_gap_limit() -> u32 {
	DEFAULT_GAP_LIMIT
}

fn default_max_depth() -> u32 {
	DEFAULT_MAX_DEPTH
}

impl HdWalletConfig {
	pub fn new(coin_type: impl Into<String>, purpose: impl Into<String>) -> Self {
		Self {
			coin_type: coin_type.into(),
			purpose: purpose.into(),
			gap_limit: DEFAULT_GAP_LIMIT,
			max_depth: DEFAULT_MAX_DEPTH,
		}
	}

	pub fn gap_limit(mut self, gap_limit: u32) -> Self {
		self.gap_limit = gap_limit;
		self
	}

	pub fn max_depth(mut self, max_depth: u32) -> Self {
		self.max_depth = max_depth;
		self
	}
}

impl Default for HdWalletConfig {
	fn default() -> Self {
		Self::new("0'", "44'")
	}
}

/// Answer of a scan callback for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSignal {
	/// The address has history: extend the gap window and record the path as used.
	HasTx,
	/// The address is unused.
	NoTx,
	/// Suspend the scan. The next scan resumes at the same path.
	Stop,
}

/// How a call to [`HdWallet::each_account`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
	Completed,
	Stopped,
}

enum BranchOutcome {
	Exhausted,
	Stopped,
}

/// Account known to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
	pub purpose: String,
	pub account: String,
}

impl AccountRef {
	pub fn matches(&self, path: &HdPath) -> bool {
		self.purpose == path.purpose && self.account == path.account
	}

	/// `path` moved onto this account.
	pub fn overlay(&self, path: &HdPath) -> HdPath {
		path.with_purpose(&self.purpose).with_account(&self.account)
	}
}

pub struct HdWallet {
	store: Arc<dyn Store>,
	config: HdWalletConfig,
	events: EventBus,
}

impl HdWallet {
	/// Fails when the coin type or purpose is missing its hardened marker.
	pub fn new(store: Arc<dyn Store>, config: HdWalletConfig) -> Result<Self, WalletError> {
		check_hardened(&config.coin_type)?;
		check_hardened(&config.purpose)?;
		if config.gap_limit == 0 {
			return Err(WalletError::Config("gap_limit must be positive".into()));
		}
		Ok(Self {
			store,
			config,
			events: EventBus::default(),
		})
	}

	/// Emit scan events on `events` instead of a private bus.
	pub fn with_events(mut self, events: EventBus) -> Self {
		self.events = events;
		self
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn config(&self) -> &HdWalletConfig {
		&self.config
	}

	/// Open the store and seed the bookkeeping on first use.
	pub async fn init(&self) -> Result<(), WalletError> {
		if !self.store.is_ready() {
			self.store.init().await?;
		}
		if self.store.get(CURRENT_INTERNAL_PATH).await?.is_some() {
			return Ok(());
		}

		let external = self.initial_path(AddrType::External);
		let internal = self.initial_path(AddrType::Internal);
		self.store.put_json(CURRENT_EXTERNAL_PATH, &external).await?;
		self.store.put_json(CURRENT_INTERNAL_PATH, &internal).await?;
		self.store
			.put_json(
				ACCOUNT_INDEX,
				&vec![AccountRef {
					purpose: external.purpose.clone(),
					account: external.account.clone(),
				}],
			)
			.await?;
		self.store
			.put_json(ADDRESS_INDEX, &Vec::<String>::new())
			.await?;
		info!(
			"Initialised HD wallet at {} / {}",
			external, internal
		);
		Ok(())
	}

	pub async fn close(&self) -> Result<(), WalletError> {
		self.store.close().await?;
		Ok(())
	}

	/// First path of `addr_type` on account `0'`.
	pub fn initial_path(&self, addr_type: AddrType) -> HdPath {
		HdPath::new(
			&self.config.purpose,
			&self.config.coin_type,
			"0'",
			addr_type.change(),
			0,
		)
	}

	fn fresh_state(&self, addr_type: AddrType, path: HdPath) -> SyncState {
		SyncState::new(addr_type, Some(path)).with_limits(self.config.gap_limit, self.config.max_depth)
	}

	/// Persisted scan state of `addr_type`, or a fresh one at the initial path.
	pub async fn get_sync_state(&self, addr_type: AddrType) -> Result<SyncState, WalletError> {
		match self.store.get_json::<SyncState>(addr_type.state_key()).await? {
			Some(state) => Ok(state.with_limits(self.config.gap_limit, self.config.max_depth)),
			None => Ok(self.fresh_state(addr_type, self.initial_path(addr_type))),
		}
	}

	async fn store_sync_state(&self, state: &SyncState) -> Result<(), WalletError> {
		self.store
			.put_json(state.addr_type.state_key(), state)
			.await?;
		Ok(())
	}

	async fn reset_branch(&self, addr_type: AddrType) -> Result<SyncState, WalletError> {
		let state = self.fresh_state(addr_type, self.initial_path(addr_type));
		self.store_sync_state(&state).await?;
		Ok(state)
	}

	/// Reset both branches to their initial paths and forget the resume branch.
	///
	/// Returns the fresh external state.
	pub async fn reset_sync_state(&self) -> Result<SyncState, WalletError> {
		let external = self.reset_branch(AddrType::External).await?;
		self.reset_branch(AddrType::Internal).await?;
		self.store.put(CURRENT_SYNC_ADDR_TYPE, Value::Null).await?;
		Ok(external)
	}

	pub async fn current_sync_addr_type(&self) -> Result<Option<AddrType>, WalletError> {
		Ok(self.store.get_json(CURRENT_SYNC_ADDR_TYPE).await?)
	}

	/// Scan every account, external branch first, then the internal one.
	///
	/// `addr_type` forces the starting branch; otherwise the scan resumes on the branch it was
	/// interrupted on. `callback` receives a copy of the branch state for every path and answers
	/// with a [`SyncSignal`]. Cancelling `cancel` acts like the callback answering `Stop` at the
	/// next path. Callback errors abort the scan and leave the state of the last completed step
	/// persisted.
	///
	/// Callers must not run two scans on the same wallet concurrently.
	pub async fn each_account<F, Fut>(
		&self,
		addr_type: Option<AddrType>,
		cancel: &CancelToken,
		mut callback: F,
	) -> Result<ScanOutcome, WalletError>
	where
		F: FnMut(SyncState) -> Fut + Send,
		Fut: Future<Output = Result<SyncSignal, WalletError>> + Send,
	{
		let mut addr_type = match addr_type {
			Some(addr_type) => addr_type,
			None => self
				.current_sync_addr_type()
				.await?
				.unwrap_or(AddrType::External),
		};
		let accounts = self.get_account_index().await?;

		loop {
			self.store
				.put_json(CURRENT_SYNC_ADDR_TYPE, &addr_type)
				.await?;
			debug!(
				"Scanning {} branch of {} accounts",
				addr_type,
				accounts.len()
			);

			let branch = self
				.scan_branch(addr_type, &accounts, cancel, &mut callback)
				.await?;
			if let ScanOutcome::Stopped = branch {
				return Ok(ScanOutcome::Stopped);
			}

			match addr_type {
				AddrType::External => addr_type = AddrType::Internal,
				AddrType::Internal => break,
			}
		}

		self.store.put(CURRENT_SYNC_ADDR_TYPE, Value::Null).await?;
		Ok(ScanOutcome::Completed)
	}

	async fn scan_branch<F, Fut>(
		&self,
		addr_type: AddrType,
		accounts: &[AccountRef],
		cancel: &CancelToken,
		callback: &mut F,
	) -> Result<ScanOutcome, WalletError>
	where
		F: FnMut(SyncState) -> Fut + Send,
		Fut: Future<Output = Result<SyncSignal, WalletError>> + Send,
	{
		let mut state = self.get_sync_state(addr_type).await?;
		let resume_at = state
			.path
			.as_ref()
			.and_then(|path| accounts.iter().position(|account| account.matches(path)))
			.unwrap_or(0);

		for account in accounts.iter().skip(resume_at) {
			let resumable = state
				.path
				.as_ref()
				.is_some_and(|path| account.matches(path));
			if !resumable {
				state = self.fresh_state(addr_type, account.overlay(&self.initial_path(addr_type)));
			}

			match self.process_path(&mut state, cancel, callback).await? {
				BranchOutcome::Stopped => return Ok(ScanOutcome::Stopped),
				BranchOutcome::Exhausted => {}
			}
			// The branch state was reset; the next account starts from its own initial path.
			state.path = None;
		}

		Ok(ScanOutcome::Completed)
	}

	async fn process_path<F, Fut>(
		&self,
		state: &mut SyncState,
		cancel: &CancelToken,
		callback: &mut F,
	) -> Result<BranchOutcome, WalletError>
	where
		F: FnMut(SyncState) -> Fut + Send,
		Fut: Future<Output = Result<SyncSignal, WalletError>> + Send,
	{
		for _ in 0..state.max_depth() {
			let signal = if cancel.is_cancelled() {
				SyncSignal::Stop
			} else {
				callback(state.clone()).await?
			};

			match signal {
				SyncSignal::Stop => {
					self.store_sync_state(state).await?;
					info!(
						"Scan stopped on {} branch at {:?}",
						state.addr_type,
						state.path.as_ref().map(HdPath::to_string)
					);
					return Ok(BranchOutcome::Stopped);
				}
				SyncSignal::HasTx => {
					state.bump(true)?;
					if let Some(path) = state.path.as_ref() {
						self.advance_last_path(path).await?;
					}
				}
				SyncSignal::NoTx => state.bump(false)?,
			}
			self.store_sync_state(state).await?;

			if state.is_gap_limit() {
				info!(
					"Gap limit of {} reached on {} branch, resetting",
					state.gap_limit(),
					state.addr_type
				);
				self.reset_branch(state.addr_type).await?;
				self.events.emit(WalletEvent::ResetSync {
					addr_type: state.addr_type,
				});
				return Ok(BranchOutcome::Exhausted);
			}
		}

		warn!(
			"Scan of {} branch hit max depth {}",
			state.addr_type,
			state.max_depth()
		);
		Ok(BranchOutcome::Exhausted)
	}

	/// Record `path` as the next unused path unless the chain is already past it.
	async fn advance_last_path(&self, path: &HdPath) -> Result<(), WalletError> {
		let current = if path.is_internal() {
			self.get_last_int_path().await?
		} else {
			self.get_last_ext_path().await?
		};
		let behind = current.is_some_and(|current| {
			current.purpose == path.purpose
				&& current.account == path.account
				&& current.index >= path.index
		});
		if !behind {
			self.update_last_path(path).await?;
		}
		Ok(())
	}

	/// Store `path` as the current path of its chain, picked by the change segment.
	pub async fn update_last_path(&self, path: &HdPath) -> Result<(), WalletError> {
		let key = if path.is_internal() {
			CURRENT_INTERNAL_PATH
		} else {
			CURRENT_EXTERNAL_PATH
		};
		self.store.put_json(key, path).await?;
		Ok(())
	}

	pub async fn get_last_ext_path(&self) -> Result<Option<HdPath>, WalletError> {
		Ok(self.store.get_json(CURRENT_EXTERNAL_PATH).await?)
	}

	pub async fn get_last_int_path(&self) -> Result<Option<HdPath>, WalletError> {
		Ok(self.store.get_json(CURRENT_INTERNAL_PATH).await?)
	}

	pub async fn get_account_index(&self) -> Result<Vec<AccountRef>, WalletError> {
		Ok(self
			.store
			.get_json(ACCOUNT_INDEX)
			.await?
			.unwrap_or_default())
	}

	/// Append the account following the last known one and return it.
	pub async fn add_account(&self) -> Result<AccountRef, WalletError> {
		let mut accounts = self.get_account_index().await?;
		let last = match accounts.last() {
			Some(last) => last.overlay(&self.initial_path(AddrType::External)),
			None => self.initial_path(AddrType::External),
		};
		let next = last.bump_account()?;
		let account = AccountRef {
			purpose: next.purpose,
			account: next.account,
		};
		accounts.push(account.clone());
		self.store.put_json(ACCOUNT_INDEX, &accounts).await?;
		Ok(account)
	}

	pub async fn get_all_address(&self) -> Result<Vec<String>, WalletError> {
		Ok(self
			.store
			.get_json(ADDRESS_INDEX)
			.await?
			.unwrap_or_default())
	}

	pub async fn get_address(&self, address: &str) -> Result<Option<AddressDetail>, WalletError> {
		Ok(self.store.get_json(&address_key(address)).await?)
	}

	/// Track `addr` in the address index and store its detail record.
	pub async fn add_address(&self, addr: &AddressDetail) -> Result<(), WalletError> {
		let mut addresses = self.get_all_address().await?;
		if !addresses.iter().any(|known| known == &addr.address) {
			addresses.push(addr.address.clone());
			self.store.put_json(ADDRESS_INDEX, &addresses).await?;
		}
		self.store.put_json(&address_key(&addr.address), addr).await?;
		Ok(())
	}

	/// Derive the address at the current external path and advance that path by one.
	///
	/// `derive` must return the address with its path set.
	pub async fn get_new_address<F, Fut>(&self, derive: F) -> Result<AddressDetail, WalletError>
	where
		F: FnOnce(HdPath) -> Fut + Send,
		Fut: Future<Output = Result<AddressDetail, WalletError>> + Send,
	{
		let path = self
			.get_last_ext_path()
			.await?
			.ok_or_else(|| WalletError::Protocol("HD wallet is not initialised".into()))?;
		let addr = derive(path).await?;
		let addr_path = addr.path.as_ref().ok_or_else(|| {
			WalletError::Protocol(format!("derived address {} has no path", addr.address))
		})?;

		self.update_last_path(&addr_path.bump_index()?).await?;
		self.add_address(&addr).await?;
		debug!("Issued address {} at {}", addr.address, addr_path);
		Ok(addr)
	}
}

fn address_key(address: &str) -> String {
	format!("addr:{}", address)
}
