//! BIP44-style derivation paths: `m / purpose' / coin_type' / account' / change / index`.
//!
//! Paths are persisted and exchanged as strings. [`HdPath`] is the parsed value; every helper in
//! this module is a pure transform that returns a new path.

use crate::wallet::WalletError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker terminating a hardened segment.
pub const HARDENED: char = '\'';

/// Largest index of a non-hardened segment.
pub const MAX_INDEX: u32 = (1 << 31) - 1;

/// A parsed six segment HD path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HdPath {
	pub purpose: String,
	pub coin_type: String,
	pub account: String,
	pub change: u32,
	pub index: u32,
}

impl HdPath {
	pub fn new(purpose: &str, coin_type: &str, account: &str, change: u32, index: u32) -> Self {
		Self {
			purpose: purpose.to_string(),
			coin_type: coin_type.to_string(),
			account: account.to_string(),
			change,
			index,
		}
	}

	pub fn parse(path: &str) -> Result<Self, WalletError> {
		let parts: Vec<&str> = path.split('/').collect();
		if parts.len() != 6 {
			return Err(WalletError::InvalidPath(path.to_string()));
		}
		let segment = |part: &str| {
			part.parse::<u32>()
				.ok()
				.filter(|value| *value <= MAX_INDEX)
				.ok_or_else(|| WalletError::InvalidPath(path.to_string()))
		};
		let change = segment(parts[4])?;
		let index = segment(parts[5])?;

		Ok(Self {
			purpose: parts[1].to_string(),
			coin_type: parts[2].to_string(),
			account: parts[3].to_string(),
			change,
			index,
		})
	}

	/// Serialize back to `m/purpose/coin_type/account/change/index`.
	pub fn merge(&self) -> String {
		self.to_string()
	}

	/// Change paths (`change != 0`) belong to the internal chain.
	pub fn is_internal(&self) -> bool {
		self.change != 0
	}

	pub fn with_index(&self, index: u32) -> Self {
		Self {
			index,
			..self.clone()
		}
	}

	/// The next index on the same chain. Fails past [`MAX_INDEX`].
	pub fn bump_index(&self) -> Result<Self, WalletError> {
		self.index
			.checked_add(1)
			.filter(|index| *index <= MAX_INDEX)
			.map(|index| self.with_index(index))
			.ok_or_else(|| WalletError::InvalidPath(self.to_string()))
	}

	pub fn with_purpose(&self, purpose: &str) -> Self {
		Self {
			purpose: purpose.to_string(),
			..self.clone()
		}
	}

	/// Replace the account segment, hardening it when the marker is missing.
	pub fn with_account(&self, account: &str) -> Self {
		let account = if account.ends_with(HARDENED) {
			account.to_string()
		} else {
			format!("{}{}", account, HARDENED)
		};
		Self {
			account,
			..self.clone()
		}
	}

	pub fn bump_account(&self) -> Result<Self, WalletError> {
		let current = self
			.account
			.trim_end_matches(HARDENED)
			.parse::<u32>()
			.map_err(|_| WalletError::InvalidPath(self.to_string()))?;
		let next = current
			.checked_add(1)
			.filter(|account| *account <= MAX_INDEX)
			.ok_or_else(|| WalletError::InvalidPath(self.to_string()))?;
		Ok(self.with_account(&next.to_string()))
	}

	/// Move onto the internal chain at `index`.
	pub fn with_change_index(&self, index: u32) -> Self {
		Self {
			change: 1,
			index,
			..self.clone()
		}
	}
}

impl fmt::Display for HdPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"m/{}/{}/{}/{}/{}",
			self.purpose, self.coin_type, self.account, self.change, self.index
		)
	}
}

impl FromStr for HdPath {
	type Err = WalletError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl TryFrom<String> for HdPath {
	type Error = WalletError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}

impl From<HdPath> for String {
	fn from(path: HdPath) -> Self {
		path.to_string()
	}
}

/// Check that a purpose or coin type segment is present and hardened, e.g. `84'`.
pub fn check_hardened(segment: &str) -> Result<(), WalletError> {
	if segment.len() < 2 || !segment.ends_with(HARDENED) {
		return Err(WalletError::Config(format!(
			"coinType and purpose are required and must be hardened like 84', got '{}'",
			segment
		)));
	}
	Ok(())
}

/// Parse `path`, apply `f` and serialize the result.
fn transform(path: &str, f: impl FnOnce(HdPath) -> HdPath) -> Result<String, WalletError> {
	Ok(f(HdPath::parse(path)?).merge())
}

pub fn bump_index(path: &str) -> Result<String, WalletError> {
	Ok(HdPath::parse(path)?.bump_index()?.merge())
}

pub fn bump_account(path: &str) -> Result<String, WalletError> {
	Ok(HdPath::parse(path)?.bump_account()?.merge())
}

pub fn set_account(path: &str, account: &str) -> Result<String, WalletError> {
	transform(path, |p| p.with_account(account))
}

pub fn set_purpose(path: &str, purpose: &str) -> Result<String, WalletError> {
	transform(path, |p| p.with_purpose(purpose))
}

pub fn set_change_index(path: &str, index: u32) -> Result<String, WalletError> {
	transform(path, |p| p.with_change_index(index))
}
