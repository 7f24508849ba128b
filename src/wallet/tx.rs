use crate::wallet::Amount;

use serde::{Deserialize, Serialize};

/// Direction of a transaction relative to the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
	Incoming,
	Outgoing,
	Internal,
}

impl TxDirection {
	/// Direction of a transfer seen from `watched`.
	pub fn for_address(watched: &str, from: &str, to: &str) -> Self {
		let to_us = to.eq_ignore_ascii_case(watched);
		let from_us = from.eq_ignore_ascii_case(watched);
		match (from_us, to_us) {
			(true, true) => TxDirection::Internal,
			(false, true) => TxDirection::Incoming,
			_ => TxDirection::Outgoing,
		}
	}
}

/// One entry of the transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEntry {
	pub txid: String,
	pub from_address: Vec<String>,
	pub to_address: Vec<String>,
	pub amount: Amount,
	#[serde(default)]
	pub fee: Option<Amount>,
	#[serde(default)]
	pub fee_rate: Option<u64>,
	pub height: u64,
	pub direction: TxDirection,
	pub currency: String,
}

impl TxEntry {
	/// A usable entry has a txid, both address lists and a non-zero amount.
	pub fn is_valid(&self) -> bool {
		!self.txid.is_empty()
			&& !self.from_address.is_empty()
			&& !self.to_address.is_empty()
			&& !self.amount.is_zero()
	}

	pub fn is_incoming(&self) -> bool {
		self.direction == TxDirection::Incoming
	}

	pub fn is_outgoing(&self) -> bool {
		self.direction == TxDirection::Outgoing
	}

	pub fn is_internal(&self) -> bool {
		self.direction == TxDirection::Internal
	}
}
