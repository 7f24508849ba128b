use crate::hd::HdPath;
use crate::wallet::WalletError;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wallet seed material. Opaque to this crate beyond being exportable as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletSeed(pub Value);

impl WalletSeed {
	pub fn to_json(&self) -> Value {
		self.0.clone()
	}
}

/// Address material derived from an HD path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDetail {
	pub address: String,
	pub path: Option<HdPath>,
	#[serde(default)]
	pub public_key: Option<String>,
	#[serde(default, skip_serializing)]
	pub private_key: Option<String>,
}

impl AddressDetail {
	pub fn new(address: impl Into<String>, path: HdPath) -> Self {
		Self {
			address: address.into(),
			path: Some(path),
			public_key: None,
			private_key: None,
		}
	}
}

/// Derives addresses from the wallet seed.
#[async_trait::async_trait]
pub trait KeyManager: Send + Sync {
	/// Bind the key manager to `seed`. Must be called before deriving.
	async fn set_seed(&self, seed: &WalletSeed) -> Result<(), WalletError>;

	async fn addr_from_path(&self, path: &HdPath) -> Result<AddressDetail, WalletError>;

	async fn close(&self) -> Result<(), WalletError> {
		Ok(())
	}
}
