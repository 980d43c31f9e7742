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

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use smol::lock::Mutex;

use super::{
    cid::{bytes32_to_cid, cid_to_bytes32, raw_pointer},
    MetadataStore,
};
use crate::{Error, Result};

/// Content store keeping blobs in memory, addressed by the sha2-256 of
/// their bytes. Pointers are valid CIDv0s, so it is interchangeable with
/// the IPFS store for testing and offline use.
pub struct MemoryStore {
    gateway: String,
    blobs: Mutex<HashMap<[u8; 32], Vec<u8>>>,
}

impl MemoryStore {
    pub fn new(gateway: &str) -> Self {
        Self {
            gateway: gateway.trim_end_matches('/').to_string(),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    async fn put(&self, data: &[u8]) -> [u8; 32] {
        let pointer = raw_pointer(data);
        self.blobs.lock().await.insert(pointer, data.to_vec());
        pointer
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn upload_image(&self, image: &[u8]) -> Result<String> {
        let pointer = self.put(image).await;
        Ok(bytes32_to_cid(&pointer))
    }

    async fn upload_metadata(&self, json: &str) -> Result<[u8; 32]> {
        let pointer = self.put(json.as_bytes()).await;
        debug!(target: "dappstore::metadata", "Stored metadata {}", bytes32_to_cid(&pointer));
        Ok(pointer)
    }

    async fn retrieve_metadata(&self, pointer: &[u8; 32]) -> Result<String> {
        let blobs = self.blobs.lock().await;
        let Some(data) = blobs.get(pointer) else {
            return Err(Error::StoreRequest(format!("{} not found", bytes32_to_cid(pointer))))
        };

        String::from_utf8(data.clone())
            .map_err(|_| Error::StoreRequest("metadata is not valid UTF-8".to_string()))
    }

    async fn retrieve_image_url(&self, image: &str) -> Result<String> {
        let pointer = cid_to_bytes32(image)?;
        if !self.blobs.lock().await.contains_key(&pointer) {
            return Err(Error::StoreRequest(format!("{image} not found")))
        }

        Ok(format!("{}/ipfs/{image}", self.gateway))
    }
}
