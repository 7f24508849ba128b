//! Per-asset payment modules.
//!
//! [`WalletPay`] is the interface every asset implements. [`PayCore`] carries what all of them
//! share, and [`WalletPayGeneric`] implements the operations for any chain reachable through a
//! [`crate::provider::Provider`] and a [`crate::wallet::KeyManager`].

/// Base trait and shared core
pub mod base;
/// Chain-agnostic implementation
pub mod generic;
/// Plugin registry and event relays
pub mod plugin;
/// Token sub-ledgers
pub mod token;

pub use base::{
	AssetContext, PAY_OPERATIONS, PayCore, SendOptions, SyncOptions, WalletPay, WalletPayConfig,
};
pub use generic::{ChainDefaults, StandardChain, WalletPayGeneric, WalletPayGenericBuilder};
pub use plugin::{Plugin, PluginEvent, PluginRegistry};
pub use token::{Token, TokenCall, TokenContext, TokenOutput, TokenResult};
