//! Connection status tracking for providers that keep a live connection.
//!
//! [`ConnectionManager`] mirrors the status of a connection and reconnects through a
//! [`Connector`] when it drops. Reconnect attempts are spaced `min(initial * 2^attempts, max)`
//! apart. Once `max_attempts` is reached the manager publishes a `timeout` event and stops
//! trying. [`retryable`] retries single operations with exponential backoff.

use crate::wallet::WalletError;
use crate::wallet::pay::{Plugin, PluginEvent};

use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Status of a provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
	Disconnected,
	Connecting,
	Connected,
	Disconnecting,
	Error,
	Destroyed,
}

impl ConnectionStatus {
	pub fn code(self) -> u8 {
		match self {
			ConnectionStatus::Disconnected => 0,
			ConnectionStatus::Connecting => 1,
			ConnectionStatus::Connected => 2,
			ConnectionStatus::Disconnecting => 3,
			ConnectionStatus::Error => 4,
			ConnectionStatus::Destroyed => 5,
		}
	}
}

impl fmt::Display for ConnectionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ConnectionStatus::Disconnected => "DISCONNECTED",
			ConnectionStatus::Connecting => "CONNECTING",
			ConnectionStatus::Connected => "CONNECTED",
			ConnectionStatus::Disconnecting => "DISCONNECTING",
			ConnectionStatus::Error => "ERROR",
			ConnectionStatus::Destroyed => "DESTROYED",
		};
		write!(f, "{}", name)
	}
}

/// Published on every status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
	pub prev: ConnectionStatus,
	pub new: ConnectionStatus,
	/// Milliseconds since the Unix epoch.
	pub timestamp: i64,
}

/// Reconnect schedule of a [`ConnectionManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
	pub max_attempts: u32,
	pub initial_delay: Duration,
	pub max_delay: Duration,
}

impl Default for ReconnectConfig {
	fn default() -> Self {
		Self {
			max_attempts: 1000,
			initial_delay: Duration::from_millis(2000),
			max_delay: Duration::from_millis(30_000),
		}
	}
}

impl ReconnectConfig {
	/// Delay before the reconnect following `attempts` failed ones.
	pub fn delay_for(&self, attempts: u32) -> Duration {
		let factor = 2u32.saturating_pow(attempts);
		self.initial_delay.saturating_mul(factor).min(self.max_delay)
	}
}

/// Retry policy of [`retryable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub backoff_factor: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_millis(3000),
			backoff_factor: 2.0,
		}
	}
}

/// Opens the underlying connection.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
	async fn connect(&self) -> Result<(), WalletError>;

	async fn disconnect(&self) -> Result<(), WalletError> {
		Ok(())
	}
}

struct ConnectionState {
	status: ConnectionStatus,
	attempts: u32,
	timer: Option<JoinHandle<()>>,
}

/// Tracks a connection and reconnects it with exponential backoff.
pub struct ConnectionManager {
	name: String,
	config: ReconnectConfig,
	connector: Arc<dyn Connector>,
	state: Mutex<ConnectionState>,
	events: broadcast::Sender<PluginEvent>,
}

impl ConnectionManager {
	const EXPOSED: &'static [&'static str] =
		&["is_connected", "connect", "reconnect", "get_connection_status"];

	pub fn new(connector: Arc<dyn Connector>, config: ReconnectConfig) -> Arc<Self> {
		Self::with_name("connection", connector, config)
	}

	pub fn with_name(
		name: impl Into<String>,
		connector: Arc<dyn Connector>,
		config: ReconnectConfig,
	) -> Arc<Self> {
		let (events, _) = broadcast::channel(64);
		Arc::new(Self {
			name: name.into(),
			config,
			connector,
			state: Mutex::new(ConnectionState {
				status: ConnectionStatus::Disconnected,
				attempts: 0,
				timer: None,
			}),
			events,
		})
	}

	fn state(&self) -> MutexGuard<'_, ConnectionState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn emit(&self, name: &str, payload: serde_json::Value) {
		if self.events.send(PluginEvent::new(name, payload)).is_err() {
			debug!("{} event {} has no listeners", self.name, name);
		}
	}

	pub fn get_connection_status(&self) -> ConnectionStatus {
		self.state().status
	}

	pub fn is_connected(&self) -> bool {
		self.get_connection_status() == ConnectionStatus::Connected
	}

	/// Failed reconnect attempts since the last successful connection.
	pub fn reconnect_attempts(&self) -> u32 {
		self.state().attempts
	}

	/// Move to `status`. Losing the connection schedules a reconnect; `Destroyed` is terminal.
	pub fn set_status(self: &Arc<Self>, status: ConnectionStatus) {
		let prev = {
			let mut state = self.state();
			if state.status == ConnectionStatus::Destroyed {
				return;
			}
			std::mem::replace(&mut state.status, status)
		};
		if prev == status {
			return;
		}

		self.emit_status(prev, status);
		match status {
			ConnectionStatus::Connecting | ConnectionStatus::Destroyed => {}
			ConnectionStatus::Connected => self.reset_reconnection_state(),
			ConnectionStatus::Disconnected
			| ConnectionStatus::Disconnecting
			| ConnectionStatus::Error => self.handle_disconnection(),
		}
	}

	fn emit_status(&self, prev: ConnectionStatus, new: ConnectionStatus) {
		let change = StatusChange {
			prev,
			new,
			timestamp: chrono::Utc::now().timestamp_millis(),
		};
		debug!("{} status {} -> {}", self.name, prev, new);
		match serde_json::to_value(&change) {
			Ok(payload) => self.emit("status", payload),
			Err(e) => warn!("Failed to encode status change: {}", e),
		}
	}

	pub async fn connect(self: &Arc<Self>) -> Result<(), WalletError> {
		self.set_status(ConnectionStatus::Connecting);
		match self.connector.connect().await {
			Ok(()) => {
				self.set_status(ConnectionStatus::Connected);
				Ok(())
			}
			Err(e) => {
				self.set_status(ConnectionStatus::Error);
				Err(e)
			}
		}
	}

	pub async fn reconnect(self: &Arc<Self>) -> Result<(), WalletError> {
		self.set_status(ConnectionStatus::Disconnecting);
		self.connector.disconnect().await?;
		self.connect().await
	}

	/// Stop reconnecting for good.
	pub fn destroy(&self) {
		let prev = {
			let mut state = self.state();
			if let Some(timer) = state.timer.take() {
				timer.abort();
			}
			std::mem::replace(&mut state.status, ConnectionStatus::Destroyed)
		};
		if prev != ConnectionStatus::Destroyed {
			self.emit_status(prev, ConnectionStatus::Destroyed);
		}
	}

	fn handle_disconnection(self: &Arc<Self>) {
		let attempts = self.state().attempts;
		if attempts < self.config.max_attempts {
			self.schedule_reconnection();
		} else {
			warn!(
				"{} gave up reconnecting after {} attempts",
				self.name, attempts
			);
			self.emit(
				"timeout",
				json!({
					"attempts": attempts,
					"timestamp": chrono::Utc::now().timestamp_millis(),
				}),
			);
		}
	}

	fn schedule_reconnection(self: &Arc<Self>) {
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			warn!("{} cannot schedule a reconnect outside a runtime", self.name);
			return;
		};

		let mut state = self.state();
		if state.status == ConnectionStatus::Destroyed {
			return;
		}
		if let Some(timer) = state.timer.take() {
			timer.abort();
		}

		let delay = self.config.delay_for(state.attempts);
		let manager = Arc::clone(self);
		state.timer = Some(runtime.spawn(async move {
			tokio::time::sleep(delay).await;
			manager.attempt_reconnect(delay).await;
		}));
	}

	async fn attempt_reconnect(self: Arc<Self>, delay: Duration) {
		let attempt = {
			let mut state = self.state();
			// This task is the timer; dropping the handle does not abort it.
			state.timer = None;
			if state.status == ConnectionStatus::Destroyed {
				return;
			}
			state.attempts += 1;
			state.attempts
		};

		info!(
			"{} reconnecting, attempt {} after {:?}",
			self.name, attempt, delay
		);
		self.emit(
			"reconnecting",
			json!({
				"attempt": attempt,
				"delay_ms": delay.as_millis() as u64,
				"timestamp": chrono::Utc::now().timestamp_millis(),
			}),
		);

		self.set_status(ConnectionStatus::Connecting);
		match self.connector.connect().await {
			Ok(()) => self.set_status(ConnectionStatus::Connected),
			Err(e) => {
				warn!("{} reconnect attempt {} failed: {}", self.name, attempt, e);
				self.set_status(ConnectionStatus::Error);
			}
		}
	}

	fn reset_reconnection_state(&self) {
		let mut state = self.state();
		if let Some(timer) = state.timer.take() {
			timer.abort();
		}
		state.attempts = 0;
	}
}

impl Plugin for ConnectionManager {
	fn name(&self) -> &str {
		&self.name
	}

	fn exposed(&self) -> &[&'static str] {
		Self::EXPOSED
	}

	fn events(&self) -> broadcast::Receiver<PluginEvent> {
		self.events.subscribe()
	}
}

/// Run `operation` until it succeeds, retrying up to `config.max_retries` times with a delay of
/// `base_delay * backoff_factor^retry`.
pub async fn retryable<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, WalletError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: fmt::Display,
{
	let policy = ExponentialBackoffBuilder::new()
		.with_initial_interval(config.base_delay)
		.with_multiplier(config.backoff_factor)
		.with_randomization_factor(0.0)
		.with_max_interval(Duration::from_secs(24 * 60 * 60))
		.with_max_elapsed_time(None)
		.build();

	let max_retries = config.max_retries;
	let mut attempt = 0u32;
	backoff::future::retry(policy, || {
		attempt += 1;
		let current = attempt;
		let pending = operation();
		async move {
			pending.await.map_err(|e| {
				if current > max_retries {
					backoff::Error::permanent(e)
				} else {
					debug!("Retry attempt {} failed: {}", current, e);
					backoff::Error::transient(e)
				}
			})
		}
	})
	.await
	.map_err(|e| WalletError::Provider(format!("Failed after {} retries: {}", max_retries, e)))
}
