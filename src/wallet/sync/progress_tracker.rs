//! Progress tracking for path scans.
//!
//! This module provides the `SyncProgressTracker`, which follows one `sync_transactions` run. It
//! counts scanned paths, paths with history and stored transactions, checks that every branch is
//! walked in increasing index order, and logs progress at regular intervals.

use crate::hd::{AddrType, HdPath};

use std::collections::HashMap;
use tracing::{info, warn};

const LOG_INTERVAL: usize = 100;

/// Progress of one scan run.
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	/// Asset being scanned, for log lines
	asset: String,
	paths_scanned: usize,
	paths_with_activity: usize,
	transactions_stored: usize,
	/// Last index seen per branch and account
	last_index: HashMap<(AddrType, String, String), u32>,
	/// Paths that did not move forward within their branch
	out_of_order: Vec<HdPath>,
	last_path: Option<HdPath>,
	halted: bool,
	last_logged: usize,
}

impl SyncProgressTracker {
	pub fn new(asset: impl Into<String>) -> Self {
		Self {
			asset: asset.into(),
			paths_scanned: 0,
			paths_with_activity: 0,
			transactions_stored: 0,
			last_index: HashMap::new(),
			out_of_order: Vec::new(),
			last_path: None,
			halted: false,
			last_logged: 0,
		}
	}

	/// Record that `path` of `addr_type` is being scanned.
	pub fn record_path(&mut self, addr_type: AddrType, path: &HdPath) {
		let key = (addr_type, path.purpose.clone(), path.account.clone());
		if let Some(previous) = self.last_index.insert(key, path.index) {
			if path.index <= previous {
				self.out_of_order.push(path.clone());
			}
		}
		self.paths_scanned += 1;
		self.last_path = Some(path.clone());
	}

	/// Record that the last scanned path had `transactions` entries.
	pub fn record_activity(&mut self, transactions: usize) {
		self.paths_with_activity += 1;
		self.transactions_stored += transactions;
	}

	pub fn mark_halted(&mut self) {
		self.halted = true;
	}

	/// Log progress every `LOG_INTERVAL` paths or when forced.
	pub fn log_progress(&mut self, force: bool) {
		let since_last_log = self.paths_scanned.saturating_sub(self.last_logged);
		if force || since_last_log >= LOG_INTERVAL {
			info!(
				"Sync progress for {}: {} paths scanned, {} with activity, {} transactions",
				self.asset, self.paths_scanned, self.paths_with_activity, self.transactions_stored
			);
			self.last_logged = self.paths_scanned;
		}
	}

	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			paths_scanned: self.paths_scanned,
			paths_with_activity: self.paths_with_activity,
			transactions_stored: self.transactions_stored,
			halted: self.halted,
			last_path: self.last_path.clone(),
			out_of_order: self.out_of_order.len(),
		}
	}

	/// Warn about paths that were not visited in increasing order.
	pub fn validate_completion(&self) -> Result<(), String> {
		if self.out_of_order.is_empty() {
			return Ok(());
		}
		for path in &self.out_of_order {
			warn!("Path {} was scanned out of order", path);
		}
		Err(format!(
			"{} paths scanned out of order",
			self.out_of_order.len()
		))
	}
}

/// Statistics about one scan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
	pub paths_scanned: usize,
	pub paths_with_activity: usize,
	pub transactions_stored: usize,
	pub halted: bool,
	pub last_path: Option<HdPath>,
	pub out_of_order: usize,
}

impl SyncStats {
	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		format!(
			"{} paths scanned, {} with activity, {} transactions{}{}",
			self.paths_scanned,
			self.paths_with_activity,
			self.transactions_stored,
			match &self.last_path {
				Some(path) => format!(", last path {}", path),
				None => String::new(),
			},
			if self.halted { " (halted)" } else { "" }
		)
	}
}
