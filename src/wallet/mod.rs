pub mod asset_list;
pub mod currency;
pub mod facade;
pub mod key_manager;
pub mod manager;
pub mod pay;
pub mod sync;
pub mod tx;
pub mod types;

pub use asset_list::AssetList;
pub use currency::{Amount, Balance, Currency};
pub use facade::{AssetSnapshot, SyncHistoryOptions, Wallet, WalletConfig, WalletSnapshot};
pub use key_manager::{AddressDetail, KeyManager, WalletSeed};
pub use manager::{WalletEntry, WalletLoader, WalletManager};
pub use tx::{TxDirection, TxEntry};
pub use types::*;
