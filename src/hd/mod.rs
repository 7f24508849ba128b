//! Hierarchical-deterministic path handling and the gap-limited scan engine.

/// Derivation path value type and its transforms
pub mod path;
/// Per-branch scan progress
pub mod sync_state;
/// Path bookkeeping and the account scan
pub mod wallet;

pub use path::HdPath;
pub use sync_state::{AddrType, SyncState};
pub use wallet::{AccountRef, HdWallet, HdWalletConfig, ScanOutcome, SyncSignal};
