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
use log::{debug, error};
use rand::{distributions::Alphanumeric, Rng};
use tinyjson::JsonValue;
use url::Url;

use super::{
    cid::{bytes32_to_cid, cid_to_bytes32},
    MetadataStore,
};
use crate::{Error, Result};

/// Content store talking to an IPFS node's HTTP API (`/api/v0`).
pub struct IpfsStore {
    api: Url,
    gateway: Url,
    client: surf::Client,
}

impl IpfsStore {
    /// `api` is the node's API root, `gateway` the public HTTP gateway
    /// used to build image URLs.
    pub fn new(api: Url, gateway: Url) -> Self {
        Self { api, gateway, client: surf::Client::new() }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.api.join(path)?)
    }

    /// `POST /api/v0/add` with a single-file multipart body. Returns the
    /// CIDv0 of the stored content.
    async fn add(&self, data: &[u8]) -> Result<String> {
        let boundary: String =
            rand::thread_rng().sample_iter(&Alphanumeric).take(24).map(char::from).collect();

        let mut body = Vec::with_capacity(data.len() + 256);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let mut endpoint = self.endpoint("api/v0/add")?;
        endpoint.query_pairs_mut().append_pair("pin", "true").append_pair("cid-version", "0");

        let mut rep = match self
            .client
            .post(endpoint.as_str())
            .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
            .body(surf::Body::from_bytes(body))
            .send()
            .await
        {
            Ok(v) => v,
            Err(e) => {
                let e = format!("Failed sending IPFS add request: {e}");
                error!(target: "dappstore::metadata", "{e}");
                return Err(Error::StoreRequest(e))
            }
        };

        if !rep.status().is_success() {
            return Err(Error::StoreRequest(format!("IPFS add returned {}", rep.status())))
        }

        let rep: JsonValue = match rep.body_string().await {
            Ok(v) => v.parse()?,
            Err(e) => return Err(Error::StoreRequest(format!("Failed reading IPFS reply: {e}"))),
        };

        let hash = rep
            .get::<HashMap<String, JsonValue>>()
            .and_then(|map| map.get("Hash"))
            .and_then(|v| v.get::<String>());

        match hash {
            Some(h) => Ok(h.clone()),
            None => Err(Error::StoreRequest("IPFS add reply has no Hash".to_string())),
        }
    }

    /// `POST /api/v0/cat?arg=<cid>`
    async fn cat(&self, cid: &str) -> Result<Vec<u8>> {
        let mut endpoint = self.endpoint("api/v0/cat")?;
        endpoint.query_pairs_mut().append_pair("arg", cid);

        let mut rep = match self.client.post(endpoint.as_str()).send().await {
            Ok(v) => v,
            Err(e) => {
                let e = format!("Failed sending IPFS cat request: {e}");
                error!(target: "dappstore::metadata", "{e}");
                return Err(Error::StoreRequest(e))
            }
        };

        if !rep.status().is_success() {
            return Err(Error::StoreRequest(format!("IPFS cat {cid} returned {}", rep.status())))
        }

        rep.body_bytes()
            .await
            .map_err(|e| Error::StoreRequest(format!("Failed reading IPFS reply: {e}")))
    }
}

#[async_trait]
impl MetadataStore for IpfsStore {
    async fn upload_image(&self, image: &[u8]) -> Result<String> {
        let cid = self.add(image).await?;
        debug!(target: "dappstore::metadata", "Uploaded image {cid}");
        Ok(cid)
    }

    async fn upload_metadata(&self, json: &str) -> Result<[u8; 32]> {
        let cid = self.add(json.as_bytes()).await?;
        debug!(target: "dappstore::metadata", "Uploaded metadata {cid}");
        cid_to_bytes32(&cid)
    }

    async fn retrieve_metadata(&self, pointer: &[u8; 32]) -> Result<String> {
        let cid = bytes32_to_cid(pointer);
        let data = self.cat(&cid).await?;
        String::from_utf8(data)
            .map_err(|_| Error::StoreRequest(format!("{cid} is not valid UTF-8")))
    }

    async fn retrieve_image_url(&self, image: &str) -> Result<String> {
        // Reject anything that is not a content identifier
        cid_to_bytes32(image)?;
        Ok(self.gateway.join(&format!("ipfs/{image}"))?.to_string())
    }
}
