//! Tracing subscriber setup for binaries and tests embedding the wallet.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_level`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(default_level: Level) -> bool {
	let filter = EnvFilter::builder()
		.with_default_directive(default_level.into())
		.from_env_lossy();

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.try_init()
		.is_ok()
}
