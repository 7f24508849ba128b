use wallet_state_sync::hd::{AddrType, HdPath, HdWallet, HdWalletConfig, ScanOutcome, SyncSignal};
use wallet_state_sync::store::{MemoryStore, Store};
use wallet_state_sync::wallet::sync::{CancelToken, WalletEvent};
use wallet_state_sync::wallet::{AddressDetail, WalletError};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

async fn wallet_with(gap_limit: u32) -> HdWallet {
	let hd = HdWallet::new(
		Arc::new(MemoryStore::new()),
		HdWalletConfig::new("0'", "84'").gap_limit(gap_limit),
	)
	.unwrap();
	hd.init().await.unwrap();
	hd
}

#[tokio::test]
async fn fresh_wallet_starts_at_account_zero() {
	let hd = wallet_with(20).await;

	assert_eq!(
		hd.get_last_ext_path().await.unwrap().unwrap().to_string(),
		"m/84'/0'/0'/0/0"
	);
	assert_eq!(
		hd.get_last_int_path().await.unwrap().unwrap().to_string(),
		"m/84'/0'/0'/1/0"
	);
	let accounts = hd.get_account_index().await.unwrap();
	assert_eq!(accounts.len(), 1);
	assert_eq!(accounts[0].account, "0'");
	assert!(hd.get_all_address().await.unwrap().is_empty());
}

#[tokio::test]
async fn new_address_advances_the_external_path() {
	let hd = wallet_with(20).await;

	let addr = hd
		.get_new_address(|path| async move { Ok(AddressDetail::new("newaddr123", path)) })
		.await
		.unwrap();

	assert_eq!(addr.address, "newaddr123");
	assert_eq!(
		hd.get_last_ext_path().await.unwrap().unwrap().to_string(),
		"m/84'/0'/0'/0/1"
	);
	assert_eq!(hd.get_all_address().await.unwrap(), vec!["newaddr123"]);
	assert_eq!(
		hd.get_address("newaddr123").await.unwrap().unwrap().path,
		Some(HdPath::parse("m/84'/0'/0'/0/0").unwrap())
	);
}

#[tokio::test]
async fn stop_on_tenth_path_after_nine_hits() {
	let hd = wallet_with(20).await;
	let seen = Mutex::new(Vec::new());

	let outcome = hd
		.each_account(Some(AddrType::External), &CancelToken::new(), |state| {
			let mut seen = seen.lock().unwrap();
			seen.push(state.path.unwrap().to_string());
			let signal = if seen.len() == 10 {
				SyncSignal::Stop
			} else {
				SyncSignal::HasTx
			};
			async move { Ok::<_, WalletError>(signal) }
		})
		.await
		.unwrap();

	assert_eq!(outcome, ScanOutcome::Stopped);
	let expected: Vec<String> = (0..10).map(|i| format!("m/84'/0'/0'/0/{}", i)).collect();
	assert_eq!(*seen.lock().unwrap(), expected);
	assert_eq!(
		hd.get_last_ext_path().await.unwrap().unwrap().to_string(),
		"m/84'/0'/0'/0/9"
	);
}

#[tokio::test]
async fn hit_on_second_call_moves_last_external_path() {
	let hd = wallet_with(20).await;
	let calls = AtomicUsize::new(0);

	hd.each_account(Some(AddrType::External), &CancelToken::new(), |_| {
		let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
		let signal = match call {
			2 => SyncSignal::HasTx,
			3 => SyncSignal::Stop,
			_ => SyncSignal::NoTx,
		};
		async move { Ok::<_, WalletError>(signal) }
	})
	.await
	.unwrap();

	assert!(
		hd.get_last_ext_path()
			.await
			.unwrap()
			.unwrap()
			.to_string()
			.ends_with("/0/2")
	);
}

#[tokio::test]
async fn stopped_scan_resumes_at_the_same_path() {
	let hd = wallet_with(20).await;
	let calls = AtomicUsize::new(0);

	let outcome = hd
		.each_account(None, &CancelToken::new(), |state| {
			calls.fetch_add(1, Ordering::SeqCst);
			assert_eq!(state.path.unwrap().to_string(), "m/84'/0'/0'/0/0");
			async { Ok::<_, WalletError>(SyncSignal::Stop) }
		})
		.await
		.unwrap();
	assert_eq!(outcome, ScanOutcome::Stopped);
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let resumed = Mutex::new(None);
	hd.each_account(None, &CancelToken::new(), |state| {
		resumed.lock().unwrap().get_or_insert(state.path.unwrap().to_string());
		async { Ok::<_, WalletError>(SyncSignal::Stop) }
	})
	.await
	.unwrap();
	assert_eq!(resumed.lock().unwrap().as_deref(), Some("m/84'/0'/0'/0/0"));
}

#[tokio::test]
async fn gap_limit_resets_each_branch() {
	let hd = wallet_with(3).await;
	let mut events = hd.events().subscribe();
	let seen = Mutex::new(Vec::new());

	let outcome = hd
		.each_account(None, &CancelToken::new(), |state| {
			seen.lock()
				.unwrap()
				.push((state.addr_type, state.path.unwrap().index));
			async { Ok::<_, WalletError>(SyncSignal::NoTx) }
		})
		.await
		.unwrap();
	assert_eq!(outcome, ScanOutcome::Completed);

	// A window of 3 is exhausted on the 4th unused address of each branch.
	let seen = seen.into_inner().unwrap();
	assert_eq!(
		seen,
		vec![
			(AddrType::External, 0),
			(AddrType::External, 1),
			(AddrType::External, 2),
			(AddrType::External, 3),
			(AddrType::Internal, 0),
			(AddrType::Internal, 1),
			(AddrType::Internal, 2),
			(AddrType::Internal, 3),
		]
	);

	assert_eq!(
		events.recv().await.unwrap(),
		WalletEvent::ResetSync {
			addr_type: AddrType::External
		}
	);
	assert_eq!(
		events.recv().await.unwrap(),
		WalletEvent::ResetSync {
			addr_type: AddrType::Internal
		}
	);

	let external = hd.get_sync_state(AddrType::External).await.unwrap();
	assert_eq!(external.gap, 0);
	assert_eq!(external.path, Some(hd.initial_path(AddrType::External)));
	assert_eq!(hd.current_sync_addr_type().await.unwrap(), None);
}

#[tokio::test]
async fn hits_extend_the_window() {
	let hd = wallet_with(2).await;
	let calls = AtomicUsize::new(0);

	hd.each_account(Some(AddrType::External), &CancelToken::new(), |state| {
		calls.fetch_add(1, Ordering::SeqCst);
		let index = state.path.map(|path| path.index);
		let signal = match (state.addr_type, index) {
			(AddrType::External, Some(1)) => SyncSignal::HasTx,
			_ => SyncSignal::NoTx,
		};
		async move { Ok::<_, WalletError>(signal) }
	})
	.await
	.unwrap();

	// External runs 3 paths past the hit at index 1, internal exhausts after 3.
	assert_eq!(calls.load(Ordering::SeqCst), 5 + 3);
	assert_eq!(hd.get_last_ext_path().await.unwrap().unwrap().index, 2);
}

#[tokio::test]
async fn max_depth_ends_a_branch_that_never_runs_dry() {
	let hd = HdWallet::new(
		Arc::new(MemoryStore::new()),
		HdWalletConfig::new("0'", "84'").max_depth(5),
	)
	.unwrap();
	hd.init().await.unwrap();
	let seen = Mutex::new(Vec::new());
	let cancel = CancelToken::new();

	let scan = hd.each_account(None, &cancel, |state| {
		seen.lock()
			.unwrap()
			.push((state.addr_type, state.path.unwrap().index));
		async { Ok::<_, WalletError>(SyncSignal::HasTx) }
	});
	let outcome = tokio::time::timeout(Duration::from_secs(5), scan)
		.await
		.expect("scan kept going past max depth")
		.unwrap();

	assert_eq!(outcome, ScanOutcome::Completed);
	let expected: Vec<(AddrType, u32)> = (0..5)
		.map(|index| (AddrType::External, index))
		.chain((0..5).map(|index| (AddrType::Internal, index)))
		.collect();
	assert_eq!(seen.into_inner().unwrap(), expected);
	assert_eq!(hd.get_last_ext_path().await.unwrap().unwrap().index, 5);
	assert_eq!(hd.get_last_int_path().await.unwrap().unwrap().index, 5);
	assert_eq!(hd.current_sync_addr_type().await.unwrap(), None);
}

#[tokio::test]
async fn internal_branch_follows_and_tracks_change_paths() {
	let hd = wallet_with(20).await;
	let branches = Mutex::new(Vec::new());

	hd.each_account(None, &CancelToken::new(), |state| {
		let mut branches = branches.lock().unwrap();
		if branches.last() != Some(&state.addr_type) {
			branches.push(state.addr_type);
		}
		let path = state.path.unwrap();
		let signal = match (state.addr_type, path.index) {
			(AddrType::Internal, 0) => SyncSignal::HasTx,
			(AddrType::Internal, 1) => SyncSignal::Stop,
			_ => SyncSignal::NoTx,
		};
		async move { Ok::<_, WalletError>(signal) }
	})
	.await
	.unwrap();

	assert_eq!(
		*branches.lock().unwrap(),
		vec![AddrType::External, AddrType::Internal]
	);
	assert_eq!(
		hd.get_last_int_path().await.unwrap().unwrap().to_string(),
		"m/84'/0'/0'/1/1"
	);
	assert_eq!(
		hd.current_sync_addr_type().await.unwrap(),
		Some(AddrType::Internal)
	);

	// The next scan picks up on the internal branch.
	let first = Mutex::new(None);
	hd.each_account(None, &CancelToken::new(), |state| {
		first.lock().unwrap().get_or_insert(state.addr_type);
		async { Ok::<_, WalletError>(SyncSignal::Stop) }
	})
	.await
	.unwrap();
	assert_eq!(*first.lock().unwrap(), Some(AddrType::Internal));
}

#[tokio::test]
async fn accounts_are_scanned_in_order() {
	let hd = wallet_with(1).await;
	let account = hd.add_account().await.unwrap();
	assert_eq!(account.account, "1'");

	let seen = Mutex::new(Vec::new());
	hd.each_account(Some(AddrType::External), &CancelToken::new(), |state| {
		let path = state.path.unwrap();
		if state.addr_type == AddrType::External {
			seen.lock().unwrap().push(path.to_string());
		}
		async { Ok::<_, WalletError>(SyncSignal::NoTx) }
	})
	.await
	.unwrap();

	assert_eq!(
		*seen.lock().unwrap(),
		vec![
			"m/84'/0'/0'/0/0",
			"m/84'/0'/0'/0/1",
			"m/84'/0'/1'/0/0",
			"m/84'/0'/1'/0/1",
		]
	);
}

#[tokio::test]
async fn callback_errors_abort_the_scan() {
	let hd = wallet_with(20).await;
	let result = hd
		.each_account(None, &CancelToken::new(), |_| async {
			Err::<SyncSignal, _>(WalletError::Provider("node unreachable".into()))
		})
		.await;
	assert!(matches!(result, Err(WalletError::Provider(_))));

	let state = hd.get_sync_state(AddrType::External).await.unwrap();
	assert_eq!(state.path.unwrap().index, 0);
}

#[tokio::test]
async fn state_survives_a_new_handle_on_the_same_store() {
	let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
	let config = HdWalletConfig::new("0'", "84'");
	let hd = HdWallet::new(store.clone(), config.clone()).unwrap();
	hd.init().await.unwrap();

	let calls = AtomicUsize::new(0);
	hd.each_account(None, &CancelToken::new(), |_| {
		let call = calls.fetch_add(1, Ordering::SeqCst);
		let signal = if call == 4 {
			SyncSignal::Stop
		} else {
			SyncSignal::NoTx
		};
		async move { Ok::<_, WalletError>(signal) }
	})
	.await
	.unwrap();

	let reopened = HdWallet::new(store, config).unwrap();
	reopened.init().await.unwrap();
	let state = reopened.get_sync_state(AddrType::External).await.unwrap();
	assert_eq!(state.path.unwrap().index, 4);
	assert_eq!(state.gap, 4);
}
