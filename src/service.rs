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
use log::{debug, info};

use crate::{
    contract::{ApproveAndCall, DApp, DAppId, DiscoverCall, DiscoverContract, DownvoteCost, TxHash},
    economics,
    metadata::{DAppMetadata, MetadataStore},
    txstatus::DAppDataSource,
    validator::DiscoverValidator,
    Error, Result,
};

/// A listing together with its resolved metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DAppData {
    pub dapp: DApp,
    /// Metadata with `image` resolved to a fetchable URL
    pub metadata: DAppMetadata,
}

/// Broadcast creation transaction and the id of the new listing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CreatedDApp {
    pub tx: TxHash,
    pub id: DAppId,
}

/// Read and write flows of the DApp store.
///
/// Writes validate first, then encode and broadcast. Value-bearing writes
/// go through the token's `approveAndCall`, the others are sent directly.
/// Nothing is retried: resubmitting a transaction is left to the caller.
pub struct DiscoverService {
    contract: DiscoverContract,
    token: Arc<dyn ApproveAndCall>,
    store: Arc<dyn MetadataStore>,
    validator: DiscoverValidator,
    account: Address,
}

impl DiscoverService {
    pub fn new(
        contract: DiscoverContract,
        token: Arc<dyn ApproveAndCall>,
        store: Arc<dyn MetadataStore>,
        account: Address,
    ) -> Self {
        let validator = DiscoverValidator::new(contract.clone());
        Self { contract, token, store, validator, account }
    }

    // ==========
    // View calls
    // ==========

    /// Fetch a listing, checking the contract returned the requested one.
    ///
    /// When the record at the resolved index carries another id, the result
    /// is [`Error::NotFound`] if `existingIDs(id)` is false and
    /// [`Error::DataIntegrity`] if it is true.
    pub async fn get_dapp_by_id(&self, id: &DAppId) -> Result<DApp> {
        debug!(target: "dappstore::service", "get_dapp_by_id({id})");
        self.contract.dapp_by_id(id).await
    }

    /// Fetch a listing and resolve its metadata. If only the metadata
    /// fails, [`Error::MetadataFetch`] carries the on-chain record.
    pub async fn get_dapp_data_by_id(&self, id: &DAppId) -> Result<DAppData> {
        debug!(target: "dappstore::service", "get_dapp_data_by_id({id})");
        let dapp = self.get_dapp_by_id(id).await?;

        match self.resolve_metadata(&dapp.metadata).await {
            Ok(metadata) => Ok(DAppData { dapp, metadata }),
            Err(e) => Err(Error::MetadataFetch { dapp: Box::new(dapp), reason: e.to_string() }),
        }
    }

    async fn resolve_metadata(&self, pointer: &[u8; 32]) -> Result<DAppMetadata> {
        let json = self.store.retrieve_metadata(pointer).await?;
        let mut metadata: DAppMetadata = json.parse()?;
        metadata.image = self.store.retrieve_image_url(&metadata.image).await?;
        Ok(metadata)
    }

    pub async fn is_dapp_exists(&self, id: &DAppId) -> Result<bool> {
        debug!(target: "dappstore::service", "is_dapp_exists({id})");
        self.contract.existing_ids(id).await
    }

    pub async fn safe_max(&self) -> Result<u64> {
        self.contract.safe_max().await
    }

    /// Contract preview of the votes an upvote of `amount` would mint.
    pub async fn up_vote_effect(&self, id: &DAppId, amount: u64) -> Result<u64> {
        debug!(target: "dappstore::service", "up_vote_effect({id}, {amount})");
        self.validator.validate_up_vote_effect(id, amount).await?;
        self.contract.upvote_effect(id, amount).await
    }

    pub async fn down_vote_cost(&self, id: &DAppId) -> Result<DownvoteCost> {
        debug!(target: "dappstore::service", "down_vote_cost({id})");
        let dapp = self.get_dapp_by_id(id).await?;
        self.contract.downvote_cost(&dapp.id).await
    }

    /// Projected record of a listing created with `amount`.
    pub async fn preview_create(&self, metadata: &DAppMetadata, amount: u64) -> Result<DApp> {
        let id = metadata.id()?;
        let max = self.contract.max().await?;
        let decimals = self.contract.decimals().await?;

        let mut dapp = economics::project_creation(id, amount, max, decimals)?;
        dapp.developer = self.account;
        Ok(dapp)
    }

    /// Projected record of `id` after an upvote of `amount`.
    pub async fn preview_upvote(&self, id: &DAppId, amount: u64) -> Result<DApp> {
        let dapp = self.get_dapp_by_id(id).await?;
        let max = self.contract.max().await?;
        let decimals = self.contract.decimals().await?;
        economics::project_upvote(&dapp, amount, max, decimals)
    }

    /// Projected record of `id` after a downvote at the current cost.
    pub async fn preview_downvote(&self, id: &DAppId) -> Result<DApp> {
        let dapp = self.get_dapp_by_id(id).await?;
        let cost = self.contract.downvote_cost(id).await?;
        economics::apply_downvote(&dapp, &cost)
    }

    // =================
    // Transaction calls
    // =================

    /// Create a listing staking `amount`. The id is the hash of the
    /// metadata as given, with `image` still holding the image itself.
    pub async fn create_dapp(&self, amount: u64, metadata: &DAppMetadata) -> Result<CreatedDApp> {
        let id = metadata.id()?;
        debug!(target: "dappstore::service", "create_dapp({id}, {amount})");

        self.validator.validate_dapp_creation(&id, amount).await?;

        let mut uploaded = metadata.clone();
        uploaded.image = self
            .store
            .upload_image(metadata.image.as_bytes())
            .await
            .map_err(|e| Error::Upload { what: "image", reason: e.to_string() })?;

        let pointer = self
            .store
            .upload_metadata(&uploaded.to_canonical_json()?)
            .await
            .map_err(|e| Error::Upload { what: "metadata", reason: e.to_string() })?;

        let call = DiscoverCall::CreateDApp(id, amount, pointer);
        let tx = self.approve_and_call("createDApp", amount, &call).await?;

        Ok(CreatedDApp { tx, id })
    }

    pub async fn up_vote(&self, id: &DAppId, amount: u64) -> Result<TxHash> {
        debug!(target: "dappstore::service", "up_vote({id}, {amount})");
        self.validator.validate_up_voting(id, amount).await?;
        self.approve_and_call("upvote", amount, &DiscoverCall::Upvote(*id, amount)).await
    }

    pub async fn down_vote(&self, id: &DAppId, amount: u64) -> Result<TxHash> {
        debug!(target: "dappstore::service", "down_vote({id}, {amount})");
        self.validator.validate_down_voting(id, amount).await?;
        self.approve_and_call("downvote", amount, &DiscoverCall::Downvote(*id, amount)).await
    }

    pub async fn withdraw(&self, id: &DAppId, amount: u64) -> Result<TxHash> {
        debug!(target: "dappstore::service", "withdraw({id}, {amount})");
        self.validator.validate_withdrawing(id, amount, &self.account).await?;

        let call = DiscoverCall::Withdraw(*id, amount);
        let tx = self
            .contract
            .send(&call, self.account)
            .await
            .map_err(|e| broadcast_error("Transfer on withdraw", e))?;

        info!(target: "dappstore::service", "Withdraw of {amount} from {id}: {tx:#x}");
        Ok(tx)
    }

    /// Replace the metadata of `id`. The new metadata is uploaded first and
    /// its pointer is what gets stored on-chain.
    pub async fn set_metadata(&self, id: &DAppId, metadata: &DAppMetadata) -> Result<TxHash> {
        debug!(target: "dappstore::service", "set_metadata({id})");
        self.validator.validate_metadata_set(id, &self.account).await?;

        let pointer = self
            .store
            .upload_metadata(&metadata.to_canonical_json()?)
            .await
            .map_err(|e| Error::Upload { what: "metadata", reason: e.to_string() })?;

        let call = DiscoverCall::SetMetadata(*id, pointer);
        let tx = self
            .contract
            .send(&call, self.account)
            .await
            .map_err(|e| broadcast_error("Uploading metadata", e))?;

        info!(target: "dappstore::service", "Metadata update of {id}: {tx:#x}");
        Ok(tx)
    }

    async fn approve_and_call(
        &self,
        op: &'static str,
        amount: u64,
        call: &DiscoverCall,
    ) -> Result<TxHash> {
        let tx = self
            .token
            .approve_and_call(self.contract.address(), amount, call.encode(), self.account)
            .await
            .map_err(|e| broadcast_error(op, e))?;

        info!(target: "dappstore::service", "Broadcast {op} with {amount}: {tx:#x}");
        Ok(tx)
    }
}

/// Re-label a failed broadcast with the operation it was part of.
fn broadcast_error(op: &'static str, err: Error) -> Error {
    let reason = match err {
        Error::Broadcast { reason, .. } => reason,
        e => e.to_string(),
    };

    Error::Broadcast { op, reason }
}

#[async_trait]
impl DAppDataSource for DiscoverService {
    async fn dapp_data(&self, id: &DAppId) -> Result<DAppData> {
        self.get_dapp_data_by_id(id).await
    }
}
