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

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use log::debug;
use smol::lock::Mutex;
use tinyjson::JsonValue;

use super::{TransactionStatus, TxPhase};
use crate::{
    util::file::{load_file, save_file},
    Error, Result,
};

/// Current schema version of the persisted record
pub const STATUS_SCHEMA_VERSION: u64 = 1;

/// Name of the persisted record inside the datastore directory
pub const STATUS_FILE: &str = "transaction_status.json";

/// Load/save port for the tracked-transaction record.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// `Ok(None)` when nothing was persisted yet.
    async fn load(&self) -> Result<Option<TransactionStatus>>;

    async fn save(&self, status: &TransactionStatus) -> Result<()>;
}

impl From<&TransactionStatus> for JsonValue {
    fn from(status: &TransactionStatus) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("version".to_string(), JsonValue::Number(STATUS_SCHEMA_VERSION as f64)),
            (
                "dappTransactionHash".to_string(),
                JsonValue::String(status.dapp_transaction_hash.clone()),
            ),
            ("dappId".to_string(), JsonValue::String(status.dapp_id.clone())),
            ("dappName".to_string(), JsonValue::String(status.dapp_name.clone())),
            ("dappImg".to_string(), JsonValue::String(status.dapp_img.clone())),
            ("dappDesc".to_string(), JsonValue::String(status.dapp_desc.clone())),
            ("progress".to_string(), JsonValue::Boolean(status.progress)),
            ("published".to_string(), JsonValue::Boolean(status.published)),
            ("failed".to_string(), JsonValue::Boolean(status.failed)),
        ]))
    }
}

impl TryFrom<&JsonValue> for TransactionStatus {
    type Error = Error;

    /// Decode a persisted record. Records without a `version` predate the
    /// versioned schema and may lack `dappId` and `dappDesc`.
    fn try_from(value: &JsonValue) -> Result<Self> {
        let Some(map) = value.get::<HashMap<String, JsonValue>>() else {
            return Err(Error::MalformedStatus("not a JSON object".to_string()))
        };

        let legacy = match map.get("version") {
            None => true,
            Some(JsonValue::Number(v)) if *v == STATUS_SCHEMA_VERSION as f64 => false,
            Some(JsonValue::Number(v)) if *v >= 0.0 && v.fract() == 0.0 => {
                return Err(Error::UnsupportedStatusVersion(*v as u64))
            }
            Some(v) => return Err(Error::MalformedStatus(format!("bad version {v:?}"))),
        };

        let string = |key: &str, optional: bool| -> Result<String> {
            match map.get(key) {
                Some(JsonValue::String(s)) => Ok(s.clone()),
                None if optional => Ok(String::new()),
                Some(_) => Err(Error::MalformedStatus(format!("{key} is not a string"))),
                None => Err(Error::MalformedStatus(format!("{key} is missing"))),
            }
        };

        let flag = |key: &str| -> Result<bool> {
            match map.get(key) {
                Some(JsonValue::Boolean(b)) => Ok(*b),
                Some(_) => Err(Error::MalformedStatus(format!("{key} is not a boolean"))),
                None => Err(Error::MalformedStatus(format!("{key} is missing"))),
            }
        };

        let mut status = TransactionStatus {
            dapp_transaction_hash: string("dappTransactionHash", false)?,
            dapp_id: string("dappId", legacy)?,
            dapp_name: string("dappName", false)?,
            dapp_img: string("dappImg", false)?,
            dapp_desc: string("dappDesc", legacy)?,
            progress: flag("progress")?,
            published: flag("published")?,
            failed: flag("failed")?,
            phase: TxPhase::Idle,
        };

        status.phase = match (status.progress, status.published, status.failed) {
            (false, false, false) => TxPhase::Idle,
            (true, false, false) if status.dapp_transaction_hash.is_empty() => {
                TxPhase::InProgress
            }
            (true, false, false) => TxPhase::Polling,
            (false, true, false) => TxPhase::Published,
            (false, false, true) => TxPhase::Failed,
            _ => return Err(Error::MalformedStatus("more than one status flag set".to_string())),
        };

        Ok(status)
    }
}

/// Decode a persisted blob.
pub fn decode_status(blob: &str) -> Result<TransactionStatus> {
    let json: JsonValue = blob.parse()?;
    TransactionStatus::try_from(&json)
}

/// Encode a record for persistence.
pub fn encode_status(status: &TransactionStatus) -> Result<String> {
    Ok(JsonValue::from(status).stringify()?)
}

/// Record persisted as a JSON file in a datastore directory.
pub struct FileStatusStore {
    path: PathBuf,
}

impl FileStatusStore {
    pub fn new(datastore: &Path) -> Self {
        Self { path: datastore.join(STATUS_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn load(&self) -> Result<Option<TransactionStatus>> {
        if !self.path.exists() {
            return Ok(None)
        }

        let blob = load_file(&self.path)?;
        decode_status(&blob).map(Some)
    }

    async fn save(&self, status: &TransactionStatus) -> Result<()> {
        debug!(target: "dappstore::txstatus", "Persisting to {:?}", self.path);
        save_file(&self.path, &encode_status(status)?)
    }
}

/// Record persisted as a raw blob in memory.
#[derive(Default)]
pub struct MemoryStatusStore {
    blob: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl MemoryStatusStore {
    /// Start from an already persisted blob
    pub fn with_blob(blob: &str) -> Self {
        Self { blob: Mutex::new(Some(blob.to_string())), saves: AtomicUsize::new(0) }
    }

    pub async fn blob(&self) -> Option<String> {
        self.blob.lock().await.clone()
    }

    /// Number of `save` calls so far
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn load(&self) -> Result<Option<TransactionStatus>> {
        match self.blob.lock().await.as_deref() {
            Some(blob) => decode_status(blob).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, status: &TransactionStatus) -> Result<()> {
        *self.blob.lock().await = Some(encode_status(status)?);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
