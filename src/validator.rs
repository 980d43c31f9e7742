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

use ethers_core::types::Address;
use log::debug;

use crate::{
    contract::{to_hex_string, DApp, DAppId, DiscoverContract},
    Result, ValidationError,
};

/// Pre-flight checks for every state-changing Discover operation.
///
/// Nothing is cached: each check reads the chain again, since stakes move
/// between calls. Amount checks that need no chain state run first, so
/// they fail without any network traffic.
#[derive(Clone)]
pub struct DiscoverValidator {
    contract: DiscoverContract,
}

impl DiscoverValidator {
    pub fn new(contract: DiscoverContract) -> Self {
        Self { contract }
    }

    fn check_amount(amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into())
        }

        Ok(())
    }

    async fn check_ceiling(&self, projected: Option<u64>) -> Result<()> {
        let ceiling = self.contract.safe_max().await?;

        // An overflowing projection is over any ceiling
        let projected = projected.unwrap_or(u64::MAX);
        if projected > ceiling {
            return Err(ValidationError::CeilingExceeded { projected, ceiling }.into())
        }

        Ok(())
    }

    fn check_developer(dapp: &DApp, caller: &Address) -> Result<()> {
        if dapp.developer != *caller {
            return Err(ValidationError::Unauthorized {
                caller: to_hex_string(caller),
                developer: to_hex_string(&dapp.developer),
            }
            .into())
        }

        Ok(())
    }

    pub async fn validate_dapp_creation(&self, id: &DAppId, amount: u64) -> Result<()> {
        debug!(target: "dappstore::validator", "Validating creation of {id} with {amount}");
        Self::check_amount(amount)?;

        if self.contract.existing_ids(id).await? {
            return Err(ValidationError::DuplicateId(id.to_string()).into())
        }

        self.check_ceiling(Some(amount)).await
    }

    /// Checks for previewing an upvote: the listing exists and the stake
    /// after the upvote stays under the ceiling.
    pub async fn validate_up_vote_effect(&self, id: &DAppId, amount: u64) -> Result<DApp> {
        let dapp = self.contract.dapp_by_id(id).await?;
        self.check_ceiling(dapp.balance.checked_add(amount)).await?;
        Ok(dapp)
    }

    pub async fn validate_up_voting(&self, id: &DAppId, amount: u64) -> Result<()> {
        debug!(target: "dappstore::validator", "Validating upvote of {id} with {amount}");
        Self::check_amount(amount)?;
        self.validate_up_vote_effect(id, amount).await?;
        Ok(())
    }

    /// A downvote must pay exactly the contract's current cost, and that
    /// cost must be covered by the listing's available tokens.
    pub async fn validate_down_voting(&self, id: &DAppId, amount: u64) -> Result<()> {
        debug!(target: "dappstore::validator", "Validating downvote of {id} with {amount}");
        Self::check_amount(amount)?;

        let dapp = self.contract.dapp_by_id(id).await?;
        let cost = self.contract.downvote_cost(id).await?;

        if amount != cost.cost {
            return Err(
                ValidationError::IncorrectDownvoteAmount { expected: cost.cost, got: amount }.into()
            )
        }

        if cost.cost > dapp.available {
            return Err(ValidationError::ExceedsAvailable {
                amount: cost.cost,
                available: dapp.available,
            }
            .into())
        }

        Ok(())
    }

    pub async fn validate_withdrawing(
        &self,
        id: &DAppId,
        amount: u64,
        caller: &Address,
    ) -> Result<()> {
        debug!(target: "dappstore::validator", "Validating withdraw of {amount} from {id}");
        Self::check_amount(amount)?;

        let dapp = self.contract.dapp_by_id(id).await?;
        Self::check_developer(&dapp, caller)?;

        if amount > dapp.available {
            let available = dapp.available;
            return Err(ValidationError::ExceedsAvailable { amount, available }.into())
        }

        Ok(())
    }

    pub async fn validate_metadata_set(&self, id: &DAppId, caller: &Address) -> Result<()> {
        debug!(target: "dappstore::validator", "Validating metadata update of {id}");
        let dapp = self.contract.dapp_by_id(id).await?;
        Self::check_developer(&dapp, caller)
    }
}
