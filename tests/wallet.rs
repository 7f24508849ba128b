mod common;

use common::{MockProvider, MockToken, StubKeyManager, address_for, tx};
use wallet_state_sync::provider::{AccountActivity, ProviderEvent};
use wallet_state_sync::store::{MemoryStore, Store};
use wallet_state_sync::wallet::pay::{
	StandardChain, WalletPay, WalletPayConfig, WalletPayGeneric,
};
use wallet_state_sync::wallet::sync::WalletEvent;
use wallet_state_sync::wallet::{
	Amount, Currency, SyncHistoryOptions, Wallet, WalletConfig, WalletError, WalletSeed,
};

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Asset {
	provider: Arc<MockProvider>,
	pay: Arc<WalletPayGeneric>,
}

fn asset(name: &str, currency: Currency, provider: MockProvider, tokens: Vec<Arc<MockToken>>) -> Asset {
	let provider = Arc::new(provider);
	let mut builder = WalletPayGeneric::builder(
		WalletPayConfig::new(name, "regtest"),
		Arc::new(StandardChain::new(currency)),
	)
	.provider(provider.clone())
	.key_manager(Arc::new(StubKeyManager::default()));
	for token in tokens {
		builder = builder.token(token);
	}
	Asset {
		provider,
		pay: Arc::new(builder.build().unwrap()),
	}
}

fn wallet(store: Arc<dyn Store>, assets: &[&Asset]) -> Wallet {
	Wallet::new(
		WalletConfig {
			name: "savings".into(),
			store,
			seed: WalletSeed(json!({ "mnemonic": "test test test" })),
		},
		assets
			.iter()
			.map(|asset| asset.pay.clone() as Arc<dyn WalletPay>)
			.collect(),
	)
	.unwrap()
}

fn btc_address(index: u32) -> String {
	address_for(&format!("m/44'/0'/0'/0/{}", index))
}

fn eth_address(index: u32) -> String {
	address_for(&format!("m/44'/60'/0'/0/{}", index))
}

#[tokio::test]
async fn assets_share_the_wallet_store_in_separate_namespaces() {
	let store = Arc::new(MemoryStore::new());
	let btc = asset("btc", Currency::bitcoin(), MockProvider::new(), vec![]);
	let eth = asset("eth", Currency::ethereum(), MockProvider::new(), vec![]);
	let wallet = wallet(store.clone(), &[&btc, &eth]);
	wallet.initialize().await.unwrap();

	assert_eq!(wallet.asset_names().await.unwrap(), vec!["btc", "eth"]);

	let btc_addr = wallet.pay("btc").await.unwrap().get_new_address().await.unwrap();
	let eth_addr = wallet.pay("eth").await.unwrap().get_new_address().await.unwrap();
	assert_eq!(btc_addr.address, btc_address(0));
	assert_eq!(eth_addr.address, eth_address(0));

	let btc_keys = store.new_instance("hdwallet-btc");
	btc_keys.init().await.unwrap();
	assert_eq!(
		btc_keys.get("address_index").await.unwrap(),
		Some(json!([btc_address(0)]))
	);
}

#[tokio::test]
async fn sync_history_covers_assets_and_tokens() {
	let usdt = Arc::new(MockToken::new("usdt", "0xUSDT", &[]));
	let btc = asset(
		"btc",
		Currency::bitcoin(),
		MockProvider::new().with_history(&btc_address(0), vec![tx("a", "x", &btc_address(0), 8, 1)]),
		vec![],
	);
	let eth = asset(
		"eth",
		Currency::ethereum(),
		MockProvider::new().with_history(&eth_address(1), vec![tx("b", "x", &eth_address(1), 3, 2)]),
		vec![usdt.clone()],
	);
	let wallet = wallet(Arc::new(MemoryStore::new()), &[&btc, &eth]);
	wallet.initialize().await.unwrap();
	let mut events = wallet.subscribe();

	wallet
		.sync_history(SyncHistoryOptions {
			all: true,
			..SyncHistoryOptions::default()
		})
		.await
		.unwrap();

	let mut synced = Vec::new();
	while let Ok(event) = events.try_recv() {
		if let WalletEvent::AssetSynced { asset, token } = event {
			synced.push((asset, token));
		}
	}
	assert_eq!(
		synced,
		vec![
			("btc".to_string(), None),
			("eth".to_string(), None),
			("eth".to_string(), Some("usdt".to_string())),
		]
	);
	assert!(!usdt.synced().is_empty());

	let balances = wallet.get_balances().await.unwrap();
	assert_eq!(
		balances
			.iter()
			.map(|(name, balance)| (name.as_str(), balance.confirmed))
			.collect::<Vec<_>>(),
		vec![("btc", Amount(8)), ("eth", Amount(3))]
	);

	wallet
		.sync_history(SyncHistoryOptions {
			asset: Some("btc".into()),
			..SyncHistoryOptions::default()
		})
		.await
		.unwrap();
	assert!(matches!(
		wallet
			.sync_history(SyncHistoryOptions {
				asset: Some("sol".into()),
				..SyncHistoryOptions::default()
			})
			.await,
		Err(WalletError::UnknownAsset(_))
	));
}

#[tokio::test]
async fn asset_activity_is_relayed_with_the_asset_name() {
	let btc = asset("btc", Currency::bitcoin(), MockProvider::new(), vec![]);
	let wallet = wallet(Arc::new(MemoryStore::new()), &[&btc]);
	wallet.initialize().await.unwrap();
	let mut events = wallet.subscribe();

	btc.provider.push(ProviderEvent::SubscribeAccount(AccountActivity {
		address: btc_address(0),
		token: None,
		height: Some(3),
		tx: Some(tx("a", "x", &btc_address(0), 1, 3)),
	}));

	let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
		.await
		.unwrap()
		.unwrap();
	assert!(matches!(
		event,
		WalletEvent::NewTx { asset: Some(ref name), .. } if name == "btc"
	));
}

#[tokio::test]
async fn export_describes_assets_and_tokens() {
	let usdt = Arc::new(MockToken::new("usdt", "0xUSDT", &[]));
	let eth = asset("eth", Currency::ethereum(), MockProvider::new(), vec![usdt]);
	let wallet = wallet(Arc::new(MemoryStore::new()), &[&eth]);
	wallet.initialize().await.unwrap();

	let snapshot = serde_json::to_value(wallet.export_wallet().await.unwrap()).unwrap();
	assert_eq!(
		snapshot,
		json!({
			"name": "savings",
			"seed": { "mnemonic": "test test test" },
			"assets": [{ "name": "eth", "network": "regtest", "tokens": ["usdt"] }],
		})
	);
}

#[tokio::test]
async fn destroy_tears_down_assets_and_the_store() {
	let store = Arc::new(MemoryStore::new());
	let btc = asset("btc", Currency::bitcoin(), MockProvider::new(), vec![]);
	let wallet = wallet(store.clone(), &[&btc]);
	wallet.initialize().await.unwrap();

	wallet.destroy().await.unwrap();

	assert!(btc.provider.is_stopped());
	assert!(!btc.pay.is_ready());
	assert!(!store.is_ready());
	assert!(matches!(wallet.export_wallet().await, Err(WalletError::Destroyed)));
	assert!(matches!(wallet.asset_names().await, Err(WalletError::Destroyed)));
}
