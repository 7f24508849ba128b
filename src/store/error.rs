/// Errors returned by a key-value store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Store has not been initialised")]
	NotReady,

	#[error("Store is closed")]
	Closed,

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Backend error: {0}")]
	Backend(String),
}
