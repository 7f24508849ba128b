//! Wallet Synchronization Module
//!
//! Building blocks shared by the pay modules while they crawl address history:
//!
//! - `events`: the event enum and broadcast bus every wallet component emits on.
//! - `state`: per-asset balance and transaction history bookkeeping.
//! - `progress_tracker`: counts and ordering checks for one scan run.
//! - `cancel`: the cooperative halt flag checked between scan steps.
//!
//! The scan itself is driven by [`crate::hd::HdWallet::each_account`]; the pay modules supply the
//! per-path callback that queries the provider and records what it finds.

/// Cooperative cancellation
pub mod cancel;
/// Event types and broadcast bus
pub mod events;
/// Tracks scan progress and statistics
pub mod progress_tracker;
/// Balance and history bookkeeping
pub mod state;

pub use cancel::CancelToken;
pub use events::{EventBus, WalletEvent};
pub use progress_tracker::{SyncProgressTracker, SyncStats};
pub use state::{AddressBalances, State, StateDb, TxIndex};
