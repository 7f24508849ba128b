use crate::wallet::WalletError;

use std::collections::HashMap;
use std::future::Future;

/// Ordered named container. Keys are unique and iteration follows insertion order.
#[derive(Debug, Clone)]
pub struct AssetList<T> {
	keys: Vec<String>,
	items: HashMap<String, T>,
	size: usize,
}

impl<T> AssetList<T> {
	pub fn new() -> Self {
		Self {
			keys: Vec::new(),
			items: HashMap::new(),
			size: 0,
		}
	}

	/// Insert `value` under `key`. Fails if the key is already present.
	pub fn set(&mut self, key: &str, value: T) -> Result<&T, WalletError> {
		if self.exists(key) {
			return Err(WalletError::DuplicateAsset(key.to_string()));
		}
		self.size += 1;
		self.keys.push(key.to_string());
		Ok(self.items.entry(key.to_string()).or_insert(value))
	}

	pub fn exists(&self, key: &str) -> bool {
		self.items.contains_key(key)
	}

	pub fn get(&self, key: &str) -> Option<&T> {
		self.items.get(key)
	}

	pub fn keys(&self) -> &[String] {
		&self.keys
	}

	pub fn size(&self) -> usize {
		self.size
	}

	pub fn len(&self) -> usize {
		self.size
	}

	pub fn is_empty(&self) -> bool {
		self.size == 0
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
		self.keys
			.iter()
			.filter_map(|key| self.items.get(key).map(|item| (key.as_str(), item)))
	}

	pub fn values(&self) -> impl Iterator<Item = &T> {
		self.iter().map(|(_, item)| item)
	}

	/// Await `f` on every item in order, stopping at the first error.
	pub async fn each<'a, F, Fut, E>(&'a self, mut f: F) -> Result<(), E>
	where
		F: FnMut(&'a str, &'a T) -> Fut,
		Fut: Future<Output = Result<(), E>>,
	{
		for (key, item) in self.iter() {
			f(key, item).await?;
		}
		Ok(())
	}
}

impl<T> Default for AssetList<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<'a, T> IntoIterator for &'a AssetList<T> {
	type Item = &'a T;
	type IntoIter = Box<dyn Iterator<Item = &'a T> + 'a>;

	fn into_iter(self) -> Self::IntoIter {
		Box::new(self.values())
	}
}
