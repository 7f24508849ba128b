//! Token sub-ledgers hosted by a pay module.
//!
//! Tokens implement a fixed set of operations. Callers pick one with a [`TokenCall`] and dispatch
//! it by token name, or to every token at once, through [`super::PayCore::call_token`].

use crate::hd::{HdWallet, HdWalletConfig, SyncSignal};
use crate::provider::{AccountActivity, Provider};
use crate::store::Store;
use crate::wallet::sync::{EventBus, State};
use crate::wallet::{AddressDetail, Balance, TxEntry, WalletError};

use std::sync::Arc;

/// Collaborators handed to tokens on initialisation.
#[derive(Clone)]
pub struct TokenContext {
	pub asset_name: String,
	/// Lowercase currency name of the hosting asset.
	pub currency: String,
	pub store: Arc<dyn Store>,
	pub provider: Arc<dyn Provider>,
	/// Derivation settings of the hosting asset's HD wallet.
	pub hd_config: HdWalletConfig,
	pub events: EventBus,
}

impl TokenContext {
	/// HD wallet tracking the scan progress of `token` in the `hdwallet-<currency>-<token>`
	/// namespace. It derives the same paths as the asset's wallet but never shares its scan state.
	pub fn hd_wallet_for(&self, token: &str) -> Result<Arc<HdWallet>, WalletError> {
		let namespace = format!("hdwallet-{}-{}", self.currency, token.to_lowercase());
		let hd_wallet = HdWallet::new(self.store.new_instance(&namespace), self.hd_config.clone())?
			.with_events(self.events.clone());
		Ok(Arc::new(hd_wallet))
	}
}

#[async_trait::async_trait]
pub trait Token: Send + Sync {
	fn name(&self) -> &str;

	/// Contract address watched for this token, if any.
	fn contract(&self) -> Option<&str> {
		None
	}

	async fn init(&self, _ctx: &TokenContext) -> Result<(), WalletError> {
		Ok(())
	}

	async fn get_balance(&self, _address: Option<&str>) -> Result<Balance, WalletError> {
		Err(WalletError::NotImplemented("get_balance"))
	}

	/// Scan one address for token history, answering like an HD scan callback.
	async fn sync_path(&self, _addr: &AddressDetail) -> Result<SyncSignal, WalletError> {
		Err(WalletError::NotImplemented("sync_path"))
	}

	/// State holding this token's balances and history. Token syncs scan the HD wallet this state
	/// is bound to, which must be the token's own (see [`TokenContext::hd_wallet_for`]).
	async fn get_state(&self) -> Result<Arc<dyn State>, WalletError> {
		Err(WalletError::NotImplemented("get_state"))
	}

	/// Record pushed provider activity and return the resulting entry.
	async fn update_tx_event(&self, _activity: &AccountActivity) -> Result<TxEntry, WalletError> {
		Err(WalletError::NotImplemented("update_tx_event"))
	}

	async fn destroy(&self) -> Result<(), WalletError> {
		Ok(())
	}
}

/// Operation dispatched to tokens by `call_token`.
#[derive(Clone, Copy)]
pub enum TokenCall<'a> {
	Init(&'a TokenContext),
	GetBalance { address: Option<&'a str> },
	SyncPath(&'a AddressDetail),
	GetState,
	UpdateTxEvent(&'a AccountActivity),
	Destroy,
}

impl TokenCall<'_> {
	pub fn name(&self) -> &'static str {
		match self {
			TokenCall::Init(_) => "init",
			TokenCall::GetBalance { .. } => "get_balance",
			TokenCall::SyncPath(_) => "sync_path",
			TokenCall::GetState => "get_state",
			TokenCall::UpdateTxEvent(_) => "update_tx_event",
			TokenCall::Destroy => "destroy",
		}
	}

	pub(crate) async fn invoke(self, token: &dyn Token) -> Result<TokenOutput, WalletError> {
		Ok(match self {
			TokenCall::Init(ctx) => {
				token.init(ctx).await?;
				TokenOutput::Done
			}
			TokenCall::GetBalance { address } => TokenOutput::Balance(token.get_balance(address).await?),
			TokenCall::SyncPath(addr) => TokenOutput::Signal(token.sync_path(addr).await?),
			TokenCall::GetState => TokenOutput::State(token.get_state().await?),
			TokenCall::UpdateTxEvent(activity) => TokenOutput::Tx(token.update_tx_event(activity).await?),
			TokenCall::Destroy => {
				token.destroy().await?;
				TokenOutput::Done
			}
		})
	}
}

/// Result of one token operation.
#[derive(Clone)]
pub enum TokenOutput {
	Done,
	Balance(Balance),
	Signal(SyncSignal),
	State(Arc<dyn State>),
	Tx(TxEntry),
}

impl TokenOutput {
	fn unexpected(&self, wanted: &str) -> WalletError {
		let got = match self {
			TokenOutput::Done => "nothing",
			TokenOutput::Balance(_) => "a balance",
			TokenOutput::Signal(_) => "a signal",
			TokenOutput::State(_) => "a state",
			TokenOutput::Tx(_) => "a transaction",
		};
		WalletError::Protocol(format!("token returned {} instead of {}", got, wanted))
	}

	pub fn into_balance(self) -> Result<Balance, WalletError> {
		match self {
			TokenOutput::Balance(balance) => Ok(balance),
			other => Err(other.unexpected("a balance")),
		}
	}

	pub fn into_signal(self) -> Result<SyncSignal, WalletError> {
		match self {
			TokenOutput::Signal(signal) => Ok(signal),
			other => Err(other.unexpected("a signal")),
		}
	}

	pub fn into_state(self) -> Result<Arc<dyn State>, WalletError> {
		match self {
			TokenOutput::State(state) => Ok(state),
			other => Err(other.unexpected("a state")),
		}
	}

	pub fn into_tx(self) -> Result<TxEntry, WalletError> {
		match self {
			TokenOutput::Tx(tx) => Ok(tx),
			other => Err(other.unexpected("a transaction")),
		}
	}
}

/// Results of `call_token`: unwrapped when exactly one token answered.
#[derive(Clone)]
pub enum TokenResult {
	One(TokenOutput),
	Many(Vec<TokenOutput>),
}

impl TokenResult {
	pub(crate) fn from_outputs(mut outputs: Vec<TokenOutput>) -> Self {
		if outputs.len() == 1 {
			if let Some(output) = outputs.pop() {
				return TokenResult::One(output);
			}
		}
		TokenResult::Many(outputs)
	}

	/// The single output, failing when several tokens answered.
	pub fn into_one(self) -> Result<TokenOutput, WalletError> {
		match self {
			TokenResult::One(output) => Ok(output),
			TokenResult::Many(outputs) => Err(WalletError::Protocol(format!(
				"expected one token result, got {}",
				outputs.len()
			))),
		}
	}

	pub fn into_vec(self) -> Vec<TokenOutput> {
		match self {
			TokenResult::One(output) => vec![output],
			TokenResult::Many(outputs) => outputs,
		}
	}

	pub fn len(&self) -> usize {
		match self {
			TokenResult::One(_) => 1,
			TokenResult::Many(outputs) => outputs.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
