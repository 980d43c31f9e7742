/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2024 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Tracked-transaction lifecycle: polling, recovery and the persisted
//! record.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use ethers_core::types::U256;

use dappstore::{
    contract::{DApp, DAppId, TxHash},
    metadata::DAppMetadata,
    service::DAppData,
    system::Subscription,
    txstatus::{
        DAppDataSource, FileStatusStore, MemoryStatusStore, PollOutcome, PollPolicy,
        StatusSource, StatusStore, TransactionStatus, TransactionTracker, TransactionWatcher,
        TxPhase, UiEvent, STATUS_FAILED, STATUS_PENDING, STATUS_SUCCESS,
    },
    Error, Result,
};

/// Replays a scripted sequence of status reads. The last entry repeats.
struct ScriptedStatus {
    script: Mutex<VecDeque<Result<u64>>>,
    reads: AtomicUsize,
}

impl ScriptedStatus {
    fn new(script: Vec<Result<u64>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), reads: AtomicUsize::new(0) })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for ScriptedStatus {
    async fn status(&self, _tx: &TxHash) -> Result<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            return script.pop_front().unwrap()
        }

        match script.front() {
            Some(Ok(code)) => Ok(*code),
            Some(Err(_)) => Err(Error::StatusRead("node unreachable".to_string())),
            None => Ok(STATUS_PENDING),
        }
    }
}

/// Starts another transaction while the status read is in flight, then
/// reports `code`.
struct Replacing {
    tracker: Arc<TransactionTracker>,
    code: u64,
}

#[async_trait]
impl StatusSource for Replacing {
    async fn status(&self, _tx: &TxHash) -> Result<u64> {
        self.tracker.start("Bar", "bar.png", "Another dapp").await?;
        Ok(self.code)
    }
}

/// Serves listing data, or fails every fetch when `listing` is `None`.
struct Listings {
    listing: Option<DAppData>,
    fetches: AtomicUsize,
}

impl Listings {
    fn new(listing: Option<DAppData>) -> Arc<Self> {
        Arc::new(Self { listing, fetches: AtomicUsize::new(0) })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DAppDataSource for Listings {
    async fn dapp_data(&self, id: &DAppId) -> Result<DAppData> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.listing {
            Some(data) => Ok(data.clone()),
            None => Err(Error::NotFound(id.to_string())),
        }
    }
}

const ID: DAppId = DAppId([0x42; 32]);

fn tx() -> TxHash {
    TxHash::repeat_byte(0x5e)
}

fn listing() -> DAppData {
    DAppData {
        dapp: DApp {
            developer: Default::default(),
            id: ID,
            metadata: [1; 32],
            balance: 100_000,
            rate: 950_996,
            available: 95_099_600_000,
            votes_minted: U256::from(171_672),
            votes_cast: U256::zero(),
            effective_balance: 100_000,
        },
        metadata: DAppMetadata { name: "Foo".to_string(), ..Default::default() },
    }
}

fn fast() -> PollPolicy {
    PollPolicy { interval: Duration::from_millis(5), max_attempts: None }
}

fn drain(sub: &Subscription<UiEvent>) -> Vec<UiEvent> {
    let mut events = vec![];
    while let Some(event) = sub.try_receive() {
        events.push(event);
    }
    events
}

fn merges(events: &[UiEvent]) -> usize {
    events.iter().filter(|e| matches!(e, UiEvent::DAppUpdated { .. })).count()
}

/// Tracker with a broadcast transaction attached, as after a write.
async fn tracking(store: Arc<dyn StatusStore>) -> Arc<TransactionTracker> {
    let tracker = TransactionTracker::recover(store).await;
    tracker.start("Foo", "img.png", "A dapp").await.unwrap();
    tracker.receive_transaction_info(ID, tx()).await.unwrap();
    tracker
}

#[test]
fn success_merges_once() {
    smol::block_on(async {
        let tracker = tracking(Arc::new(MemoryStatusStore::default())).await;
        let sub = tracker.publisher().subscribe().await;
        let source = ScriptedStatus::new(vec![Ok(STATUS_SUCCESS)]);
        let data = Listings::new(Some(listing()));
        let watcher = TransactionWatcher::new(tracker.clone(), source.clone(), data, fast());

        assert_eq!(watcher.check_status(&tx()).await.unwrap(), PollOutcome::Published);

        let events = drain(&sub);
        assert_eq!(merges(&events), 1);
        assert!(events.contains(&UiEvent::DAppUpdated {
            id: ID,
            metadata: listing().metadata,
            snt_value: 950_996,
        }));

        let state = tracker.state().await;
        assert_eq!(state.phase, TxPhase::Published);
        assert!(state.published && !state.progress && !state.failed);
    });
}

#[test]
fn pending_rechecks_exactly_once_per_read() {
    smol::block_on(async {
        let tracker = tracking(Arc::new(MemoryStatusStore::default())).await;
        let source = ScriptedStatus::new(vec![Ok(STATUS_PENDING)]);
        let data = Listings::new(Some(listing()));
        let watcher =
            TransactionWatcher::new(tracker.clone(), source.clone(), data.clone(), fast());

        let outcome = watcher.check_status(&tx()).await.unwrap();
        assert_eq!(outcome, PollOutcome::Recheck(Duration::from_millis(5)));
        assert_eq!(source.reads(), 1);
        assert_eq!(data.fetches(), 0);
        assert_eq!(tracker.state().await.phase, TxPhase::Polling);

        // Two pending reads, then success: three reads in total
        let source = ScriptedStatus::new(vec![
            Ok(STATUS_PENDING),
            Ok(STATUS_PENDING),
            Ok(STATUS_SUCCESS),
        ]);
        let watcher =
            TransactionWatcher::new(tracker.clone(), source.clone(), data.clone(), fast());
        assert_eq!(watcher.watch(&tx()).await.unwrap(), TxPhase::Published);
        assert_eq!(source.reads(), 3);
        assert_eq!(data.fetches(), 1);
    });
}

#[test]
fn failure_stops_polling() {
    smol::block_on(async {
        let tracker = tracking(Arc::new(MemoryStatusStore::default())).await;
        let sub = tracker.publisher().subscribe().await;
        let source = ScriptedStatus::new(vec![Ok(STATUS_FAILED), Ok(STATUS_SUCCESS)]);
        let data = Listings::new(Some(listing()));
        let watcher =
            TransactionWatcher::new(tracker.clone(), source.clone(), data.clone(), fast());

        assert_eq!(watcher.watch(&tx()).await.unwrap(), TxPhase::Failed);
        assert_eq!(source.reads(), 1);
        assert_eq!(data.fetches(), 0);
        assert_eq!(merges(&drain(&sub)), 0);

        let state = tracker.state().await;
        assert!(state.failed && !state.published && !state.progress);
    });
}

#[test]
fn read_errors_count_as_pending() {
    smol::block_on(async {
        let tracker = tracking(Arc::new(MemoryStatusStore::default())).await;
        let source = ScriptedStatus::new(vec![
            Err(Error::StatusRead("timeout".to_string())),
            Ok(STATUS_SUCCESS),
        ]);
        let data = Listings::new(Some(listing()));
        let watcher = TransactionWatcher::new(tracker.clone(), source.clone(), data, fast());

        let outcome = watcher.check_status(&tx()).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Recheck(_)));
        assert_eq!(tracker.state().await.phase, TxPhase::Polling);

        assert_eq!(watcher.watch(&tx()).await.unwrap(), TxPhase::Published);
    });
}

#[test]
fn fetch_failure_raises_an_alert() {
    smol::block_on(async {
        let tracker = tracking(Arc::new(MemoryStatusStore::default())).await;
        let sub = tracker.publisher().subscribe().await;
        let source = ScriptedStatus::new(vec![Ok(STATUS_SUCCESS)]);
        let watcher = TransactionWatcher::new(tracker.clone(), source, Listings::new(None), fast());

        assert_eq!(watcher.watch(&tx()).await.unwrap(), TxPhase::Published);

        let events = drain(&sub);
        assert_eq!(merges(&events), 0);
        assert!(events.iter().any(|e| matches!(e, UiEvent::Alert { reload: true, .. })));
    });
}

#[test]
fn bounded_policy_leaves_the_record_polling() {
    smol::block_on(async {
        let tracker = tracking(Arc::new(MemoryStatusStore::default())).await;
        let source = ScriptedStatus::new(vec![Ok(STATUS_PENDING)]);
        let policy = PollPolicy { interval: Duration::from_millis(1), max_attempts: Some(3) };
        let watcher =
            TransactionWatcher::new(tracker.clone(), source.clone(), Listings::new(None), policy);

        assert_eq!(watcher.watch(&tx()).await.unwrap(), TxPhase::Polling);
        assert_eq!(source.reads(), 3);
        assert!(tracker.state().await.progress);
    });
}

#[test]
fn replaced_transaction_is_not_polled() {
    smol::block_on(async {
        let tracker = tracking(Arc::new(MemoryStatusStore::default())).await;
        tracker.start("Bar", "", "").await.unwrap();

        let source = ScriptedStatus::new(vec![Ok(STATUS_SUCCESS)]);
        let watcher =
            TransactionWatcher::new(tracker.clone(), source.clone(), Listings::new(None), fast());

        assert_eq!(watcher.watch(&tx()).await.unwrap(), TxPhase::InProgress);
        assert_eq!(source.reads(), 0);
    });
}

#[test]
fn status_read_racing_a_new_transaction_is_dropped() {
    smol::block_on(async {
        for code in [STATUS_SUCCESS, STATUS_FAILED, STATUS_PENDING] {
            let tracker = tracking(Arc::new(MemoryStatusStore::default())).await;
            let sub = tracker.publisher().subscribe().await;
            let source = Arc::new(Replacing { tracker: tracker.clone(), code });
            let data = Listings::new(Some(listing()));
            let watcher = TransactionWatcher::new(tracker.clone(), source, data.clone(), fast());

            let outcome = watcher.check_status(&tx()).await.unwrap();
            assert_eq!(outcome, PollOutcome::Superseded, "code {code}");

            let state = tracker.state().await;
            assert_eq!(state.dapp_name, "Bar");
            assert_eq!(state.phase, TxPhase::InProgress);
            assert!(state.progress && !state.published && !state.failed);

            let events = drain(&sub);
            assert_eq!(merges(&events), 0);
            assert!(!events.iter().any(|e| matches!(e, UiEvent::Alert { .. })));
            assert_eq!(data.fetches(), 0);

            let tracker2 = tracking(Arc::new(MemoryStatusStore::default())).await;
            let source = Arc::new(Replacing { tracker: tracker2.clone(), code });
            let watcher = TransactionWatcher::new(tracker2, source, data.clone(), fast());
            assert_eq!(watcher.watch(&tx()).await.unwrap(), TxPhase::InProgress);
        }
    });
}

#[test]
fn reload_resumes_polling() {
    smol::block_on(async {
        let store = Arc::new(MemoryStatusStore::default());
        let tracker = tracking(store.clone()).await;
        tracker.change_status(STATUS_PENDING).await.unwrap();
        drop(tracker);

        let recovered = TransactionTracker::recover(store.clone()).await;
        let state = recovered.state().await;
        assert_eq!(state.phase, TxPhase::Polling);
        assert_eq!(state.dapp_name, "Foo");
        assert_eq!(state.dapp_desc, "A dapp");
        assert_eq!(state.dapp_id, ID.to_string());
        assert!(state.tracks(&tx()));

        let source = ScriptedStatus::new(vec![Ok(STATUS_SUCCESS)]);
        let data = Listings::new(Some(listing()));
        let watcher = TransactionWatcher::new(recovered.clone(), source, data.clone(), fast());
        assert_eq!(watcher.watch(&tx()).await.unwrap(), TxPhase::Published);
        assert_eq!(data.fetches(), 1);
    });
}

#[test]
fn hide_is_idempotent_and_not_persisted() {
    smol::block_on(async {
        let store = Arc::new(MemoryStatusStore::default());
        let tracker = tracking(store.clone()).await;
        tracker.change_status(STATUS_SUCCESS).await.unwrap();
        let saves = store.saves();
        let persisted = store.blob().await;

        let once = tracker.hide().await.unwrap();
        let twice = tracker.hide().await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.phase, TxPhase::Idle);
        assert!(once.dapp_name.is_empty());

        assert_eq!(store.saves(), saves);
        assert_eq!(store.blob().await, persisted);
    });
}

#[test]
fn legacy_record_is_migrated() {
    smol::block_on(async {
        let blob = r#"{"dappTransactionHash":"0xabc","dappName":"Foo","dappImg":"img.png",
            "progress":true,"published":false,"failed":false}"#;
        let store = Arc::new(MemoryStatusStore::with_blob(blob));

        let tracker = TransactionTracker::recover(store.clone()).await;
        let state = tracker.state().await;
        assert_eq!(state.phase, TxPhase::Polling);
        assert_eq!(state.dapp_name, "Foo");
        assert!(state.dapp_id.is_empty() && state.dapp_desc.is_empty());

        // The next save writes the current schema
        tracker.change_status(STATUS_PENDING).await.unwrap();
        assert!(store.blob().await.unwrap().contains("\"version\":1"));
    });
}

#[test]
fn malformed_record_starts_empty() {
    smol::block_on(async {
        let blob = r#"{"version":1,"progress":true,"published":true,"failed":false}"#;
        let store = Arc::new(MemoryStatusStore::with_blob(blob));
        let tracker = TransactionTracker::recover(store).await;
        assert_eq!(tracker.state().await, TransactionStatus::default());

        let tracker =
            TransactionTracker::recover(Arc::new(MemoryStatusStore::with_blob("not json"))).await;
        assert_eq!(tracker.state().await.phase, TxPhase::Idle);
    });
}

#[test]
fn file_store_survives_restart() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("dappstore-status-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir)?;

    smol::block_on(async {
        let store = Arc::new(FileStatusStore::new(&dir));
        assert!(store.load().await?.is_none());

        let tracker = tracking(store.clone()).await;
        tracker.change_status(STATUS_FAILED).await?;

        let recovered = TransactionTracker::recover(Arc::new(FileStatusStore::new(&dir))).await;
        assert_eq!(recovered.state().await, tracker.state().await);
        Ok::<_, Error>(())
    })?;

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
