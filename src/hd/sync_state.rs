use super::HdPath;
use crate::wallet::WalletError;

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_GAP_LIMIT: u32 = 20;
pub const DEFAULT_MAX_DEPTH: u32 = 100_000;

/// Address chain of an account: receiving (`change = 0`) or change (`change = 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddrType {
	External,
	Internal,
}

impl AddrType {
	pub fn change(self) -> u32 {
		match self {
			AddrType::External => 0,
			AddrType::Internal => 1,
		}
	}

	/// Store key holding the persisted scan state of this branch.
	pub fn state_key(self) -> &'static str {
		match self {
			AddrType::External => "sync_state_external",
			AddrType::Internal => "sync_state_internal",
		}
	}
}

impl fmt::Display for AddrType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AddrType::External => write!(f, "external"),
			AddrType::Internal => write!(f, "internal"),
		}
	}
}

/// Scan progress along one branch of one account.
///
/// `gap` counts scanned addresses, `gap_end` is the count past which the branch is exhausted.
/// A hit moves `gap_end` to `gap + gap_limit`, so it never shrinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
	pub gap: u32,
	pub gap_end: u32,
	pub path: Option<HdPath>,
	pub addr_type: AddrType,
	#[serde(skip, default = "default_gap_limit")]
	gap_limit: u32,
	#[serde(skip, default = "default_max_depth")]
	max_depth: u32,
}

fn default_gap_limit() -> u32 {
	DEFAULT_GAP_LIMIT
}

fn default_max_depth() -> u32 {
	DEFAULT_MAX_DEPTH
}

impl SyncState {
	pub fn new(addr_type: AddrType, path: Option<HdPath>) -> Self {
		Self {
			gap: 0,
			gap_end: DEFAULT_GAP_LIMIT,
			path,
			addr_type,
			gap_limit: DEFAULT_GAP_LIMIT,
			max_depth: DEFAULT_MAX_DEPTH,
		}
	}

	/// Apply the configured limits. A fresh state also takes `gap_limit` as its window.
	pub fn with_limits(mut self, gap_limit: u32, max_depth: u32) -> Self {
		if self.gap == 0 {
			self.gap_end = gap_limit;
		}
		self.gap_limit = gap_limit;
		self.max_depth = max_depth;
		self
	}

	pub fn gap_limit(&self) -> u32 {
		self.gap_limit
	}

	pub fn max_depth(&self) -> u32 {
		self.max_depth
	}

	/// Advance to the next index. A hit extends the window by `gap_limit`.
	///
	/// Fails when the path has no next index; the counters saturate.
	pub fn bump(&mut self, found_tx: bool) -> Result<(), WalletError> {
		if let Some(path) = self.path.as_mut() {
			*path = path.bump_index()?;
		}
		self.gap = self.gap.saturating_add(1);
		if found_tx {
			self.gap_end = self.gap.saturating_add(self.gap_limit);
		}
		Ok(())
	}

	pub fn is_gap_limit(&self) -> bool {
		self.gap > self.gap_end
	}
}
