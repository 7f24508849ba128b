use crate::store::StoreError;

/// Errors surfaced by the wallet, its pay modules and the HD sync engine.
///
/// Configuration and protocol errors signal programming mistakes and are never retried.
/// Provider and store errors are transient from the caller's point of view; this crate does not
/// retry them itself.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Invalid HD path: {0}")]
	InvalidPath(String),

	#[error("Protocol violation: {0}")]
	Protocol(String),

	#[error("Method not implemented: {0}")]
	NotImplemented(&'static str),

	#[error("Asset already exists: {0}")]
	DuplicateAsset(String),

	#[error("Asset does not exist: {0}")]
	UnknownAsset(String),

	#[error("Wallet already exists with name {0}")]
	DuplicateWallet(String),

	#[error("Wallet with name {0} not found")]
	UnknownWallet(String),

	#[error("Token already exists: {0}")]
	DuplicateToken(String),

	#[error("Token with name {0} does not exist")]
	UnknownToken(String),

	#[error("Plugin error: {0}")]
	Plugin(String),

	#[error("Provider error: {0}")]
	Provider(String),

	#[error("Key manager error: {0}")]
	KeyManager(String),

	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Wallet has been destroyed")]
	Destroyed,
}
