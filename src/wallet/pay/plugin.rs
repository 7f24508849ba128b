//! Plugins attached to a pay module.
//!
//! A plugin is a sub-component with its own event stream and a declared list of operations the
//! host forwards to it. Registration checks those names against the host's own operations and
//! every other plugin, then relays the plugin's events onto the host bus.

use crate::provider::StatusChange;
use crate::wallet::WalletError;
use crate::wallet::sync::{EventBus, WalletEvent};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Event published by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
	pub name: String,
	#[serde(default)]
	pub payload: Value,
}

impl PluginEvent {
	pub fn new(name: impl Into<String>, payload: Value) -> Self {
		Self {
			name: name.into(),
			payload,
		}
	}
}

pub trait Plugin: Send + Sync {
	fn name(&self) -> &str;

	/// Operations the host forwards to this plugin.
	fn exposed(&self) -> &[&'static str];

	fn events(&self) -> broadcast::Receiver<PluginEvent>;
}

/// Plugins of one host, with their event relays.
#[derive(Default)]
pub struct PluginRegistry {
	plugins: Vec<Arc<dyn Plugin>>,
	exposed: HashSet<&'static str>,
	relays: Vec<JoinHandle<()>>,
}

impl PluginRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register `plugin` and start relaying its events onto `bus`.
	///
	/// Fails when a plugin of the same name exists or when one of its exposed operations collides
	/// with `host_operations` or with another plugin.
	pub fn register(
		&mut self,
		plugin: Arc<dyn Plugin>,
		host_operations: &[&str],
		bus: &EventBus,
	) -> Result<(), WalletError> {
		let name = plugin.name().to_string();
		if self.plugins.iter().any(|known| known.name() == name) {
			return Err(WalletError::Plugin(format!("plugin {} exists", name)));
		}
		for operation in plugin.exposed() {
			if host_operations.contains(operation) || self.exposed.contains(operation) {
				return Err(WalletError::Plugin(format!(
					"module: {} cant expose {}. Already exists",
					name, operation
				)));
			}
		}

		self.exposed.extend(plugin.exposed().iter().copied());
		self.relays
			.push(spawn_relay(name.clone(), plugin.events(), bus.clone()));
		self.plugins.push(plugin);
		debug!("Loaded plugin {}", name);
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
		self.plugins
			.iter()
			.find(|plugin| plugin.name() == name)
			.cloned()
	}

	/// Whether some plugin exposes `operation`.
	pub fn exposes(&self, operation: &str) -> bool {
		self.exposed.contains(operation)
	}

	pub fn len(&self) -> usize {
		self.plugins.len()
	}

	pub fn is_empty(&self) -> bool {
		self.plugins.is_empty()
	}

	/// Stop every relay.
	pub fn shutdown(&mut self) {
		for relay in self.relays.drain(..) {
			relay.abort();
		}
	}
}

impl Drop for PluginRegistry {
	fn drop(&mut self) {
		self.shutdown();
	}
}

fn spawn_relay(
	plugin: String,
	mut events: broadcast::Receiver<PluginEvent>,
	bus: EventBus,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match events.recv().await {
				Ok(event) => {
					match event.name.as_str() {
						"timeout" => bus.emit(WalletEvent::Timeout),
						"status" => {
							if let Ok(change) =
								serde_json::from_value::<StatusChange>(event.payload.clone())
							{
								bus.emit(WalletEvent::Status(change));
							}
						}
						_ => {}
					}
					bus.emit(WalletEvent::Plugin {
						name: format!("plugin:{}:{}", plugin, event.name),
						plugin: plugin.clone(),
						payload: event.payload,
					});
				}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!("Plugin {} relay skipped {} events", plugin, skipped);
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	})
}
