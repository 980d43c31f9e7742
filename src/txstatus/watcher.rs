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

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use smol::Timer;

use super::{
    TransactionTrackerPtr, TxPhase, UiEvent, STATUS_FAILED, STATUS_PENDING, STATUS_SUCCESS,
};
use crate::{
    contract::{DAppId, TxHash},
    service::DAppData,
    Result,
};

/// Source of transaction status codes: 0 failed, 1 success, 2 pending.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self, tx: &TxHash) -> Result<u64>;
}

/// Source of authoritative listing data once a transaction is published.
#[async_trait]
pub trait DAppDataSource: Send + Sync {
    async fn dapp_data(&self, id: &DAppId) -> Result<DAppData>;
}

/// How a pending transaction is re-checked.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed delay between two status reads
    pub interval: Duration,
    /// Status reads before giving up, `None` to poll until resolved
    pub max_attempts: Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_millis(2000), max_attempts: None }
    }
}

/// Result of a single status check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Published,
    Failed,
    /// Still pending, check again after the delay
    Recheck(Duration),
    /// Another transaction took the slot while the status was read. The
    /// result was dropped.
    Superseded,
}

/// Drives the tracked transaction to resolution by polling its status.
pub struct TransactionWatcher {
    tracker: TransactionTrackerPtr,
    source: Arc<dyn StatusSource>,
    data: Arc<dyn DAppDataSource>,
    policy: PollPolicy,
}

impl TransactionWatcher {
    pub fn new(
        tracker: TransactionTrackerPtr,
        source: Arc<dyn StatusSource>,
        data: Arc<dyn DAppDataSource>,
        policy: PollPolicy,
    ) -> Self {
        Self { tracker, source, data, policy }
    }

    /// Read the status of `tx` once and apply it to the tracker.
    ///
    /// A failed read counts as pending. On success the listing's fresh data
    /// is published to the UI, or an alert offering a reload if it cannot
    /// be fetched. Nothing is applied if `tx` stopped being tracked before
    /// the read returned.
    pub async fn check_status(&self, tx: &TxHash) -> Result<PollOutcome> {
        let code = match self.source.status(tx).await {
            Ok(code) => code,
            Err(e) => {
                warn!(
                    target: "dappstore::txstatus",
                    "Status read of {tx:#x} failed, assuming pending: {e}",
                );
                STATUS_PENDING
            }
        };

        debug!(target: "dappstore::txstatus", "Status of {tx:#x}: {code}");
        let Some(state) = self.tracker.change_status_for(tx, code).await? else {
            return Ok(PollOutcome::Superseded)
        };

        match code {
            STATUS_FAILED => {
                info!(target: "dappstore::txstatus", "Transaction {tx:#x} failed");
                Ok(PollOutcome::Failed)
            }

            STATUS_SUCCESS => {
                info!(target: "dappstore::txstatus", "Transaction {tx:#x} published");
                self.merge_dapp_data(&state.dapp_id).await;
                Ok(PollOutcome::Published)
            }

            _ => Ok(PollOutcome::Recheck(self.policy.interval)),
        }
    }

    async fn merge_dapp_data(&self, dapp_id: &str) {
        let data = match DAppId::from_str(dapp_id) {
            Ok(id) => self.data.dapp_data(&id).await,
            Err(e) => Err(e),
        };

        let event = match data {
            Ok(data) => UiEvent::DAppUpdated {
                id: data.dapp.id,
                snt_value: data.dapp.rate,
                metadata: data.metadata,
            },
            Err(e) => {
                error!(target: "dappstore::txstatus", "Fetching data of {dapp_id} failed: {e}");
                UiEvent::Alert { message: e.to_string(), reload: true }
            }
        };

        self.tracker.notify(event).await;
    }

    /// Poll `tx` until it resolves, the attempts run out, or the tracker
    /// moves on to another transaction. Returns the phase polling ended in.
    pub async fn watch(&self, tx: &TxHash) -> Result<TxPhase> {
        let mut attempts = 0u64;

        loop {
            let state = self.tracker.state().await;
            if !state.tracks(tx) {
                debug!(target: "dappstore::txstatus", "{tx:#x} is no longer tracked");
                return Ok(state.phase)
            }

            attempts += 1;
            let delay = match self.check_status(tx).await? {
                PollOutcome::Published => return Ok(TxPhase::Published),
                PollOutcome::Failed => return Ok(TxPhase::Failed),
                PollOutcome::Recheck(delay) => delay,
                PollOutcome::Superseded => {
                    debug!(target: "dappstore::txstatus", "{tx:#x} was replaced mid-read");
                    return Ok(self.tracker.state().await.phase)
                }
            };

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    info!(
                        target: "dappstore::txstatus",
                        "Giving up on {tx:#x} after {attempts} status reads, still pending",
                    );
                    return Ok(TxPhase::Polling)
                }
            }

            Timer::after(delay).await;
        }
    }
}
