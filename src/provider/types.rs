//! Types exchanged with chain data providers

use crate::wallet::Amount;

use serde::{Deserialize, Serialize};

/// A transfer as reported by a provider for a watched address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTx {
	/// The transaction hash.
	pub hash: String,
	/// Sending address.
	pub from: String,
	/// Receiving address.
	pub to: String,
	/// Transferred amount in base units.
	pub value: Amount,
	/// Height of the block including the transaction.
	#[serde(rename = "blockNumber")]
	pub block_number: u64,
}

/// Activity on a watched address, pushed by the provider after `subscribe_to_account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountActivity {
	/// Watched address the activity belongs to.
	pub address: String,
	/// Token contract when the activity concerns a token transfer.
	#[serde(default)]
	pub token: Option<String>,
	/// Block height of the activity, when known.
	#[serde(default)]
	pub height: Option<u64>,
	/// The transfer itself. `None` when the provider only signals a balance change.
	#[serde(default)]
	pub tx: Option<ProviderTx>,
}

/// Notifications pushed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProviderEvent {
	/// Activity on a subscribed account
	SubscribeAccount(AccountActivity),
	/// A new block was observed
	NewBlock { height: u64 },
	/// The subscription reported an error
	Error { message: String },
}
