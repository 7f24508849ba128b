//! Chain data provider integration
//!
//! Pay modules never talk to a node directly. They go through a [`Provider`], which answers
//! history and balance queries for addresses, watches subscribed accounts and pushes
//! [`ProviderEvent`]s. Providers that keep a live connection expose a [`ConnectionManager`] that
//! handles reconnection with exponential backoff.

/// Connection status tracking and reconnect scheduling
mod connection;
/// Type definitions for provider data
mod types;

pub use connection::{
	ConnectionManager, ConnectionStatus, Connector, ReconnectConfig, RetryConfig, StatusChange,
	retryable,
};
pub use types::*;

use crate::wallet::{Amount, WalletError};

use std::sync::Arc;
use tokio::sync::broadcast;

/// Chain data source of one asset.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
	async fn init(&self) -> Result<(), WalletError>;

	async fn connect(&self) -> Result<(), WalletError>;

	fn is_connected(&self) -> bool;

	/// Watch `address` and the given token contracts for new activity.
	async fn subscribe_to_account(
		&self,
		address: &str,
		token_contracts: &[String],
	) -> Result<(), WalletError>;

	/// Full transfer history of `address`.
	async fn get_transactions_by_address(
		&self,
		address: &str,
	) -> Result<Vec<ProviderTx>, WalletError>;

	async fn get_address_balance(&self, address: &str) -> Result<Amount, WalletError>;

	async fn get_token_balance(
		&self,
		_address: &str,
		_contract: &str,
	) -> Result<Amount, WalletError> {
		Err(WalletError::NotImplemented("get_token_balance"))
	}

	/// Fee per unit of transaction size or gas, in base units.
	async fn get_fee_estimate(&self) -> Result<Amount, WalletError>;

	/// Receiver for account activity and block notifications.
	fn events(&self) -> broadcast::Receiver<ProviderEvent>;

	async fn stop(&self) -> Result<(), WalletError>;

	/// Connection manager of providers that keep a live connection.
	fn connection(&self) -> Option<Arc<ConnectionManager>> {
		None
	}
}
