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

//! Lifecycle of the single store transaction the client tracks at a time.
//!
//! All mutation goes through [`reduce`], driven by [`TransactionTracker`],
//! which persists each new state and announces it to subscribers. Starting
//! a new transaction while one is still pending replaces it; there is only
//! one slot.

use std::{fmt, sync::Arc};

use log::{debug, warn};
use smol::lock::Mutex;

use crate::{
    contract::{DAppId, TxHash},
    metadata::DAppMetadata,
    system::{Publisher, PublisherPtr},
    Result,
};

/// Persistence port and the versioned on-disk schema
pub mod persist;
pub use persist::{FileStatusStore, MemoryStatusStore, StatusStore};

/// Status polling
pub mod watcher;
pub use watcher::{DAppDataSource, PollOutcome, PollPolicy, StatusSource, TransactionWatcher};

/// Status code of a reverted transaction
pub const STATUS_FAILED: u64 = 0;
/// Status code of a mined, successful transaction
pub const STATUS_SUCCESS: u64 = 1;
/// Status code of a transaction not mined yet
pub const STATUS_PENDING: u64 = 2;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TxPhase {
    #[default]
    Idle,
    /// Broadcast sent, no status read yet
    InProgress,
    /// Status read at least once and still pending
    Polling,
    Published,
    Failed,
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::InProgress => "in progress",
            Self::Polling => "polling",
            Self::Published => "published",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// The tracked transaction. At most one of `progress`, `published` and
/// `failed` is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionStatus {
    pub dapp_transaction_hash: String,
    pub dapp_id: String,
    pub dapp_name: String,
    pub dapp_img: String,
    pub dapp_desc: String,
    pub progress: bool,
    pub published: bool,
    pub failed: bool,
    /// Not persisted. Rebuilt from the flags on recovery.
    pub phase: TxPhase,
}

impl TransactionStatus {
    /// Whether `tx` is the transaction this record tracks
    pub fn tracks(&self, tx: &TxHash) -> bool {
        !self.dapp_transaction_hash.is_empty() &&
            self.dapp_transaction_hash.eq_ignore_ascii_case(&format!("{tx:#x}"))
    }
}

/// State transitions of the tracked transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxAction {
    Hide,
    StartProgress { dapp_name: String, dapp_img: String, dapp_desc: String },
    ReceiveTransactionInfo { id: DAppId, tx: TxHash },
    /// A status code read from the chain
    ChangeStatus(u64),
}

/// Pure transition function of the tracker.
pub fn reduce(state: &TransactionStatus, action: &TxAction) -> TransactionStatus {
    match action {
        // Terminal flags survive until the next start
        TxAction::Hide => TransactionStatus {
            dapp_name: String::new(),
            dapp_img: String::new(),
            progress: false,
            phase: TxPhase::Idle,
            ..state.clone()
        },

        TxAction::StartProgress { dapp_name, dapp_img, dapp_desc } => TransactionStatus {
            dapp_name: dapp_name.clone(),
            dapp_img: dapp_img.clone(),
            dapp_desc: dapp_desc.clone(),
            progress: true,
            phase: TxPhase::InProgress,
            ..Default::default()
        },

        TxAction::ReceiveTransactionInfo { id, tx } => TransactionStatus {
            dapp_id: id.to_string(),
            dapp_transaction_hash: format!("{tx:#x}"),
            ..state.clone()
        },

        TxAction::ChangeStatus(code) => {
            let phase = match *code {
                STATUS_FAILED => TxPhase::Failed,
                STATUS_SUCCESS => TxPhase::Published,
                _ => TxPhase::Polling,
            };

            TransactionStatus {
                progress: phase == TxPhase::Polling,
                published: phase == TxPhase::Published,
                failed: phase == TxPhase::Failed,
                phase,
                ..state.clone()
            }
        }
    }
}

/// What the presentation layer is told about.
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    StatusChanged(TransactionStatus),
    /// Fresh authoritative data of a listing, to merge into the UI state
    DAppUpdated { id: DAppId, metadata: DAppMetadata, snt_value: u64 },
    /// User-facing alert, optionally offering a reload
    Alert { message: String, reload: bool },
}

pub type TransactionTrackerPtr = Arc<TransactionTracker>;

/// Owner of the single tracked-transaction slot.
pub struct TransactionTracker {
    state: Mutex<TransactionStatus>,
    store: Arc<dyn StatusStore>,
    publisher: PublisherPtr<UiEvent>,
}

impl TransactionTracker {
    /// Restore the last persisted state, or start empty. A persisted state
    /// that fails to load is discarded.
    pub async fn recover(store: Arc<dyn StatusStore>) -> TransactionTrackerPtr {
        let state = match store.load().await {
            Ok(Some(state)) => {
                debug!(target: "dappstore::txstatus", "Recovered state: {}", state.phase);
                state
            }
            Ok(None) => TransactionStatus::default(),
            Err(e) => {
                warn!(target: "dappstore::txstatus", "Discarding persisted transaction state: {e}");
                TransactionStatus::default()
            }
        };

        Arc::new(Self { state: Mutex::new(state), store, publisher: Publisher::new() })
    }

    pub fn publisher(&self) -> PublisherPtr<UiEvent> {
        self.publisher.clone()
    }

    pub async fn state(&self) -> TransactionStatus {
        self.state.lock().await.clone()
    }

    /// Apply `action`, persist the new state unless it only hides the
    /// notification, and notify subscribers.
    pub async fn dispatch(&self, action: TxAction) -> Result<TransactionStatus> {
        let next = {
            let mut state = self.state.lock().await;
            self.commit(&mut state, &action).await?
        };

        self.publisher.notify(UiEvent::StatusChanged(next.clone())).await;
        Ok(next)
    }

    /// Apply status `code` only while `tx` is still the tracked transaction.
    /// The check and the update happen under one lock. Returns `None`, with
    /// nothing changed, once the tracker has moved on.
    pub async fn change_status_for(
        &self,
        tx: &TxHash,
        code: u64,
    ) -> Result<Option<TransactionStatus>> {
        let next = {
            let mut state = self.state.lock().await;
            if !state.tracks(tx) {
                debug!(target: "dappstore::txstatus", "Dropping status {code} of {tx:#x}");
                return Ok(None)
            }

            self.commit(&mut state, &TxAction::ChangeStatus(code)).await?
        };

        self.publisher.notify(UiEvent::StatusChanged(next.clone())).await;
        Ok(Some(next))
    }

    async fn commit(
        &self,
        state: &mut TransactionStatus,
        action: &TxAction,
    ) -> Result<TransactionStatus> {
        let next = reduce(state, action);
        debug!(
            target: "dappstore::txstatus",
            "{action:?}: {} -> {}", state.phase, next.phase,
        );

        if *action != TxAction::Hide {
            self.store.save(&next).await?;
        }

        *state = next.clone();
        Ok(next)
    }

    pub async fn start(
        &self,
        dapp_name: &str,
        dapp_img: &str,
        dapp_desc: &str,
    ) -> Result<TransactionStatus> {
        self.dispatch(TxAction::StartProgress {
            dapp_name: dapp_name.to_string(),
            dapp_img: dapp_img.to_string(),
            dapp_desc: dapp_desc.to_string(),
        })
        .await
    }

    pub async fn receive_transaction_info(
        &self,
        id: DAppId,
        tx: TxHash,
    ) -> Result<TransactionStatus> {
        self.dispatch(TxAction::ReceiveTransactionInfo { id, tx }).await
    }

    pub async fn change_status(&self, code: u64) -> Result<TransactionStatus> {
        self.dispatch(TxAction::ChangeStatus(code)).await
    }

    pub async fn hide(&self) -> Result<TransactionStatus> {
        self.dispatch(TxAction::Hide).await
    }

    pub(crate) async fn notify(&self, event: UiEvent) {
        self.publisher.notify(event).await
    }
}
