use crate::utils::{format_token_amount, parse_token_amount};
use crate::wallet::WalletError;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// Amount in base units (satoshi, wei, ...).
///
/// Serialized as a decimal string since wei amounts overflow JSON numbers. Plain integers are
/// still accepted when reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub u128);

impl Amount {
	pub const ZERO: Amount = Amount(0);

	pub fn is_zero(&self) -> bool {
		self.0 == 0
	}
}

impl Add for Amount {
	type Output = Amount;

	fn add(self, rhs: Self) -> Self::Output {
		Amount(self.0.saturating_add(rhs.0))
	}
}

impl Sum for Amount {
	fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
		iter.fold(Amount::ZERO, Add::add)
	}
}

impl From<u128> for Amount {
	fn from(value: u128) -> Self {
		Amount(value)
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Amount {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(&self.0)
	}
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
	type Value = Amount;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("a non-negative integer or a decimal string")
	}

	fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
		Ok(Amount(value.into()))
	}

	fn visit_u128<E: de::Error>(self, value: u128) -> Result<Amount, E> {
		Ok(Amount(value))
	}

	fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
		u128::try_from(value)
			.map(Amount)
			.map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
	}

	fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
		value
			.parse::<u128>()
			.map(Amount)
			.map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
	}
}

impl<'de> Deserialize<'de> for Amount {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(AmountVisitor)
	}
}

/// Unit description of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
	/// Main unit name, e.g. `BTC`.
	pub name: String,
	/// Base unit name, e.g. `SATS`.
	pub base_name: String,
	pub decimals: u32,
	/// Hardened BIP44 coin type without the marker, e.g. `0`.
	pub coin_type: String,
}

impl Currency {
	pub fn new(name: &str, base_name: &str, decimals: u32, coin_type: &str) -> Self {
		Self {
			name: name.to_string(),
			base_name: base_name.to_string(),
			decimals,
			coin_type: coin_type.to_string(),
		}
	}

	pub fn bitcoin() -> Self {
		Self::new("BTC", "SATS", 8, "0")
	}

	pub fn ethereum() -> Self {
		Self::new("ETH", "WEI", 18, "60")
	}

	pub fn to_main_unit(&self, amount: Amount) -> String {
		format_token_amount(amount.0, self.decimals)
	}

	pub fn to_base_unit(&self, value: &str) -> Result<Amount, WalletError> {
		parse_token_amount(value, self.decimals)
			.map(Amount)
			.ok_or_else(|| WalletError::Config(format!("invalid {} amount '{}'", self.name, value)))
	}

	pub fn format(&self, amount: Amount) -> String {
		format!("{} {}", self.to_main_unit(amount), self.name)
	}
}

/// Balance of an address, an asset or a token.
///
/// `consolidated` is always `confirmed + pending + mempool`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
	pub confirmed: Amount,
	pub pending: Amount,
	pub mempool: Amount,
	pub consolidated: Amount,
}

impl Balance {
	pub fn new(confirmed: Amount, pending: Amount, mempool: Amount) -> Self {
		Self {
			confirmed,
			pending,
			mempool,
			consolidated: confirmed + pending + mempool,
		}
	}

	pub fn confirmed(amount: Amount) -> Self {
		Self::new(amount, Amount::ZERO, Amount::ZERO)
	}
}
