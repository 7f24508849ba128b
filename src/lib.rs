//! Wallet state sync
//!
//! Multi-asset wallet orchestration over hierarchical-deterministic address paths:
//!
//! - [`hd`]: derivation paths, per-branch scan state and the resumable, gap-limited account scan.
//! - [`wallet::pay`]: the per-asset payment interface, its shared core and the generic
//!   implementation that crawls address history through a [`provider::Provider`].
//! - [`wallet::Wallet`]: the facade owning the seed and the store, aggregating assets and relaying
//!   their events.
//! - [`wallet::WalletManager`]: a registry of named wallets, rebuilt from their exports.
//! - [`store`]: key-value persistence with scoped namespaces.

pub mod hd;
pub mod provider;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod wallet;

pub use hd::{AddrType, HdPath, HdWallet, HdWalletConfig, SyncSignal, SyncState};
pub use store::{FileStore, MemoryStore, Store, StoreError, StoreExt};
pub use wallet::pay::{WalletPay, WalletPayConfig, WalletPayGeneric};
pub use wallet::sync::{CancelToken, EventBus, WalletEvent};
pub use wallet::{Wallet, WalletConfig, WalletError, WalletManager};
