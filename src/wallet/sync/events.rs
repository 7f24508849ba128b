//! Event system for wallets, assets and the HD scan.
//!
//! Every emitter owns an [`EventBus`], a thin wrapper over a `tokio` broadcast channel. Assets emit
//! on their own bus; the wallet facade relays the events it cares about onto its bus with the asset
//! name attached, so subscribers only ever need one receiver.

use crate::hd::{AddrType, HdPath};
use crate::provider::StatusChange;
use crate::wallet::TxEntry;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by the wallet, its assets and the HD scan.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
	/// Every configured asset has been attempted.
	Ready,
	/// Activity was observed on a watched address.
	NewTx {
		asset: Option<String>,
		token: Option<String>,
		address: String,
		height: Option<u64>,
		tx: Option<TxEntry>,
	},
	NewBlock {
		asset: Option<String>,
		height: u64,
	},
	/// One unit of `sync_history` finished.
	AssetSynced {
		asset: String,
		token: Option<String>,
	},
	SyncEnd {
		asset: String,
		halted: bool,
	},
	/// A path was scanned.
	SyncedPath {
		addr_type: AddrType,
		path: HdPath,
		address: String,
		has_tx: bool,
	},
	/// A branch exhausted its gap window and was reset.
	ResetSync {
		addr_type: AddrType,
	},
	/// Reconnecting gave up after the configured number of attempts.
	Timeout,
	Status(StatusChange),
	/// Event re-published from a plugin.
	Plugin {
		plugin: String,
		name: String,
		payload: Value,
	},
}

impl WalletEvent {
	/// Attach the asset name to events that carry one.
	pub fn tagged(self, asset_name: &str) -> Self {
		match self {
			WalletEvent::NewTx {
				token,
				address,
				height,
				tx,
				..
			} => WalletEvent::NewTx {
				asset: Some(asset_name.to_string()),
				token,
				address,
				height,
				tx,
			},
			WalletEvent::NewBlock { height, .. } => WalletEvent::NewBlock {
				asset: Some(asset_name.to_string()),
				height,
			},
			other => other,
		}
	}

	/// Short event name as exposed to subscribers, e.g. `new-tx`.
	pub fn name(&self) -> &str {
		match self {
			WalletEvent::Ready => "ready",
			WalletEvent::NewTx { .. } => "new-tx",
			WalletEvent::NewBlock { .. } => "new-block",
			WalletEvent::AssetSynced { .. } => "asset-synced",
			WalletEvent::SyncEnd { .. } => "sync-end",
			WalletEvent::SyncedPath { .. } => "synced-path",
			WalletEvent::ResetSync { .. } => "reset-sync",
			WalletEvent::Timeout => "timeout",
			WalletEvent::Status(_) => "status",
			WalletEvent::Plugin { name, .. } => name,
		}
	}
}

/// Broadcast fan-out for [`WalletEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
	sender: broadcast::Sender<WalletEvent>,
}

impl EventBus {
	pub const DEFAULT_CAPACITY: usize = 256;

	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	/// Publish an event. Having no subscribers is not an error.
	pub fn emit(&self, event: WalletEvent) {
		if self.sender.send(event).is_err() {
			debug!("Event dropped, no subscribers");
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
		self.sender.subscribe()
	}

	pub fn receiver_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(Self::DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn emit_without_subscribers_is_silent() {
		let bus = EventBus::default();
		bus.emit(WalletEvent::Ready);

		let mut rx = bus.subscribe();
		bus.emit(WalletEvent::NewBlock {
			asset: None,
			height: 7,
		});
		assert_eq!(
			rx.recv().await.unwrap(),
			WalletEvent::NewBlock {
				asset: None,
				height: 7
			}
		);
	}

	#[test]
	fn tagging_only_touches_relayed_events() {
		let tagged = WalletEvent::NewBlock {
			asset: None,
			height: 1,
		}
		.tagged("btc");
		assert_eq!(
			tagged,
			WalletEvent::NewBlock {
				asset: Some("btc".into()),
				height: 1
			}
		);
		assert_eq!(WalletEvent::Ready.tagged("btc"), WalletEvent::Ready);
		assert_eq!(tagged.name(), "new-block");
	}
}
