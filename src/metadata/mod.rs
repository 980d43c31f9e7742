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

use std::{collections::HashMap, str::FromStr};

use async_trait::async_trait;
use tinyjson::JsonValue;

use crate::{contract::DAppId, Error, Result};

/// CIDv0 <-> bytes32 pointer conversion
pub mod cid;

/// In-memory content store
pub mod memory;
pub use memory::MemoryStore;

/// IPFS HTTP API content store
#[cfg(feature = "ipfs-http")]
pub mod ipfs;

/// Off-chain description of a listing.
///
/// Before creation `image` holds the image payload itself. Once uploaded it
/// is replaced by the image's content identifier, and after retrieval
/// through [`MetadataStore::retrieve_image_url`] by a fetchable URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DAppMetadata {
    pub name: String,
    pub url: String,
    pub description: String,
    pub image: String,
    pub category: String,
    pub date_added: String,
    /// Curated slot within the category, absent on most listings
    pub category_position: Option<u64>,
}

impl DAppMetadata {
    /// Serialize with a fixed key order. Listing ids are hashes of this
    /// string, so the order and escaping must never change.
    /// `categoryPosition` is written last, and only when set.
    pub fn to_canonical_json(&self) -> Result<String> {
        let fields = [
            ("name", &self.name),
            ("url", &self.url),
            ("description", &self.description),
            ("image", &self.image),
            ("category", &self.category),
            ("dateAdded", &self.date_added),
        ];

        let mut out = String::from("{");
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&JsonValue::String(key.to_string()).stringify()?);
            out.push(':');
            out.push_str(&JsonValue::String(value.to_string()).stringify()?);
        }
        if let Some(position) = self.category_position {
            out.push_str(&format!(",\"categoryPosition\":{position}"));
        }
        out.push('}');

        Ok(out)
    }

    /// Content-hash identifier of this metadata
    pub fn id(&self) -> Result<DAppId> {
        Ok(DAppId::from_metadata_json(&self.to_canonical_json()?))
    }
}

impl TryFrom<&JsonValue> for DAppMetadata {
    type Error = Error;

    fn try_from(value: &JsonValue) -> Result<Self> {
        let Some(map) = value.get::<HashMap<String, JsonValue>>() else {
            return Err(Error::ParseFailed("metadata is not a JSON object"))
        };

        // Only name and image are needed to render a listing
        let field = |key: &str, required: bool| -> Result<String> {
            match map.get(key) {
                Some(JsonValue::String(s)) => Ok(s.clone()),
                Some(_) => Err(Error::ParseFailed("metadata field is not a string")),
                None if required => Err(Error::ParseFailed("metadata field missing")),
                None => Ok(String::new()),
            }
        };

        let category_position = match map.get("categoryPosition") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u64),
            Some(_) => return Err(Error::ParseFailed("categoryPosition is not a position")),
        };

        Ok(Self {
            name: field("name", true)?,
            url: field("url", false)?,
            description: field("description", false)?,
            image: field("image", true)?,
            category: field("category", false)?,
            date_added: field("dateAdded", false)?,
            category_position,
        })
    }
}

impl FromStr for DAppMetadata {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let json: JsonValue = s.parse()?;
        Self::try_from(&json)
    }
}

/// Content-addressed store for listing metadata and images.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store an image and return its content identifier.
    async fn upload_image(&self, image: &[u8]) -> Result<String>;

    /// Store a metadata JSON blob and return its on-chain pointer.
    async fn upload_metadata(&self, json: &str) -> Result<[u8; 32]>;

    /// Fetch the metadata JSON behind an on-chain pointer, byte-identical
    /// to what was uploaded.
    async fn retrieve_metadata(&self, pointer: &[u8; 32]) -> Result<String>;

    /// Resolve an image content identifier into a fetchable URL.
    async fn retrieve_image_url(&self, image: &str) -> Result<String>;
}
