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

use std::sync::Arc;

use async_trait::async_trait;
use ethers_core::types::Address;
use log::debug;

use crate::{Error, Result};

/// Discover contract method encoding and return-data decoding
pub mod abi;
pub use abi::DiscoverCall;

mod types;
pub use types::{to_hex_string, DApp, DAppId, DownvoteCost, TxHash};

/// JSON-RPC backed gateway implementation
#[cfg(feature = "eth-rpc")]
pub mod eth;

/// Raw access to the Discover contract.
///
/// `read` performs a call against the latest block and returns the raw
/// ABI-encoded output. `send` broadcasts a state-changing call from
/// `from` and returns as soon as the node accepted it, without waiting
/// for inclusion.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Address of the deployed Discover contract
    fn address(&self) -> Address;

    async fn read(&self, call: &DiscoverCall) -> Result<Vec<u8>>;

    async fn send(&self, call: &DiscoverCall, from: Address) -> Result<TxHash>;
}

/// The staking token's single-transaction approve-and-invoke facility.
#[async_trait]
pub trait ApproveAndCall: Send + Sync {
    /// Approve `spender` for `amount` tokens and invoke it with `call_data`,
    /// all from `from`.
    async fn approve_and_call(
        &self,
        spender: Address,
        amount: u64,
        call_data: Vec<u8>,
        from: Address,
    ) -> Result<TxHash>;
}

/// Typed view over a [`ContractGateway`].
#[derive(Clone)]
pub struct DiscoverContract {
    gateway: Arc<dyn ContractGateway>,
}

impl DiscoverContract {
    pub fn new(gateway: Arc<dyn ContractGateway>) -> Self {
        Self { gateway }
    }

    pub fn address(&self) -> Address {
        self.gateway.address()
    }

    async fn read_uint(&self, call: DiscoverCall) -> Result<u64> {
        debug!(target: "dappstore::contract", "Reading {}", call.name());
        let data = self.gateway.read(&call).await?;
        abi::decode_uint(call.name(), &data)
    }

    /// Read the listing stored at `index`.
    pub async fn dapps(&self, index: u64) -> Result<DApp> {
        debug!(target: "dappstore::contract", "Reading dapps({index})");
        let data = self.gateway.read(&DiscoverCall::Dapps(index)).await?;
        abi::decode_dapp(&data)
    }

    /// Resolve `id` to its index and read the listing there.
    ///
    /// A reverted contract call is reported as [`Error::NotFound`]. Decode
    /// errors are returned as they are. A record whose id differs from the
    /// requested one is [`Error::NotFound`] when the id is unknown to the
    /// contract, and [`Error::DataIntegrity`] otherwise.
    pub async fn dapp_by_id(&self, id: &DAppId) -> Result<DApp> {
        let read = async {
            let index = self.id2index(id).await?;
            self.dapps(index).await
        };

        let dapp = match read.await {
            Ok(dapp) => dapp,
            Err(e @ Error::ContractCall(..)) => {
                debug!(target: "dappstore::contract", "Lookup of {id} failed: {e}");
                return Err(Error::NotFound(id.to_string()))
            }
            Err(e) => return Err(e),
        };

        if dapp.id != *id {
            if !self.existing_ids(id).await? {
                return Err(Error::NotFound(id.to_string()))
            }

            return Err(Error::DataIntegrity {
                requested: id.to_string(),
                returned: dapp.id.to_string(),
            })
        }

        Ok(dapp)
    }

    pub async fn id2index(&self, id: &DAppId) -> Result<u64> {
        self.read_uint(DiscoverCall::Id2Index(*id)).await
    }

    pub async fn existing_ids(&self, id: &DAppId) -> Result<bool> {
        let call = DiscoverCall::ExistingIds(*id);
        debug!(target: "dappstore::contract", "Reading existingIDs({id})");
        let data = self.gateway.read(&call).await?;
        abi::decode_bool(call.name(), &data)
    }

    pub async fn safe_max(&self) -> Result<u64> {
        self.read_uint(DiscoverCall::SafeMax).await
    }

    pub async fn max(&self) -> Result<u64> {
        self.read_uint(DiscoverCall::Max).await
    }

    pub async fn decimals(&self) -> Result<u64> {
        self.read_uint(DiscoverCall::Decimals).await
    }

    pub async fn upvote_effect(&self, id: &DAppId, amount: u64) -> Result<u64> {
        self.read_uint(DiscoverCall::UpvoteEffect(*id, amount)).await
    }

    pub async fn downvote_cost(&self, id: &DAppId) -> Result<DownvoteCost> {
        debug!(target: "dappstore::contract", "Reading downvoteCost({id})");
        let data = self.gateway.read(&DiscoverCall::DownvoteCost(*id)).await?;
        abi::decode_downvote_cost(&data)
    }

    /// Broadcast a state-changing call directly, without token approval.
    pub async fn send(&self, call: &DiscoverCall, from: Address) -> Result<TxHash> {
        debug!(
            target: "dappstore::contract",
            "Sending {} from {}", call.name(), to_hex_string(&from),
        );
        self.gateway.send(call, from).await
    }
}
