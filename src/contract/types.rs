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

use std::{fmt, str::FromStr};

use ethers_core::{
    types::{Address, H256, U256},
    utils::keccak256,
};

use crate::{Error, Result};

/// Hash of a broadcast transaction
pub type TxHash = H256;

/// Render an address or hash as full lowercase `0x` hex.
pub fn to_hex_string<T: fmt::LowerHex>(value: &T) -> String {
    format!("{value:#x}")
}

/// Identifier of a listing. It is the keccak256 of the canonical JSON
/// of the listing metadata at creation time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DAppId(pub [u8; 32]);

impl DAppId {
    /// Derive the listing identifier from its canonical metadata JSON.
    pub fn from_metadata_json(json: &str) -> Self {
        Self(keccak256(json.as_bytes()))
    }

    pub fn inner(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for DAppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for DAppId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let Ok(id) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            return Err(Error::ParseFailed("DApp id must be 32 bytes"))
        };

        Ok(Self(id))
    }
}

/// On-chain listing record, as returned by `dapps(index)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DApp {
    pub developer: Address,
    pub id: DAppId,
    /// bytes32 pointer to the metadata blob in the content store
    pub metadata: [u8; 32],
    pub balance: u64,
    pub rate: u64,
    pub available: u64,
    /// Full uint256 range; these grow exponentially with the balance
    pub votes_minted: U256,
    pub votes_cast: U256,
    pub effective_balance: u64,
}

/// Result of `downvoteCost(id)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DownvoteCost {
    /// Effective balance reduction (`b`)
    pub balance_down_by: u64,
    /// Votes consumed by the downvote (`vR`)
    pub votes_required: U256,
    /// Token amount the downvote costs (`c`)
    pub cost: u64,
}
