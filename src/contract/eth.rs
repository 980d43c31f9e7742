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
use ethers::prelude::{Address, Bytes, Http, Middleware, Provider, TransactionRequest, U64};
use log::{debug, info};
use url::Url;

use super::{abi, ApproveAndCall, ContractGateway, DiscoverCall, TxHash};
use crate::{
    txstatus::{StatusSource, STATUS_FAILED, STATUS_PENDING, STATUS_SUCCESS},
    Error, Result,
};

/// Connect a JSON-RPC provider to the given node endpoint.
pub fn http_provider(endpoint: &Url) -> Result<Arc<Provider<Http>>> {
    let provider = Provider::<Http>::try_from(endpoint.as_str())
        .map_err(|e| Error::ContractCall("connect", e.to_string()))?;
    Ok(Arc::new(provider))
}

async fn broadcast<M: Middleware>(
    client: &M,
    op: &'static str,
    to: Address,
    from: Address,
    data: Vec<u8>,
) -> Result<TxHash> {
    let tx = TransactionRequest::new().to(to).from(from).data(Bytes::from(data));

    let pending = match client.send_transaction(tx, None).await {
        Ok(p) => p,
        Err(e) => return Err(Error::Broadcast { op, reason: e.to_string() }),
    };

    let hash = pending.tx_hash();
    info!(target: "dappstore::contract", "Broadcast {op}: {hash:#x}");
    Ok(hash)
}

/// Discover contract gateway backed by an Ethereum node.
///
/// Writes are sent with `eth_sendTransaction`, so `from` must be an
/// account the node (or the middleware stack) can sign for.
pub struct EthGateway<M: Middleware> {
    client: Arc<M>,
    discover: Address,
}

impl<M: Middleware> EthGateway<M> {
    pub fn new(client: Arc<M>, discover: Address) -> Self {
        Self { client, discover }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ContractGateway for EthGateway<M> {
    fn address(&self) -> Address {
        self.discover
    }

    async fn read(&self, call: &DiscoverCall) -> Result<Vec<u8>> {
        let tx = TransactionRequest::new().to(self.discover).data(Bytes::from(call.encode()));

        match self.client.call(&tx.into(), None).await {
            Ok(output) => Ok(output.to_vec()),
            Err(e) => Err(Error::ContractCall(call.name(), e.to_string())),
        }
    }

    async fn send(&self, call: &DiscoverCall, from: Address) -> Result<TxHash> {
        debug!(target: "dappstore::contract", "eth_sendTransaction {}", call.name());
        broadcast(self.client.as_ref(), call.name(), self.discover, from, call.encode()).await
    }
}

#[async_trait]
impl<M: Middleware + 'static> StatusSource for EthGateway<M> {
    /// Maps the receipt to a status code. No receipt yet means the
    /// transaction is still pending.
    async fn status(&self, tx: &TxHash) -> Result<u64> {
        let receipt = match self.client.get_transaction_receipt(*tx).await {
            Ok(r) => r,
            Err(e) => return Err(Error::StatusRead(e.to_string())),
        };

        let Some(receipt) = receipt else { return Ok(STATUS_PENDING) };

        match receipt.status {
            Some(s) if s == U64::from(1) => Ok(STATUS_SUCCESS),
            Some(_) => Ok(STATUS_FAILED),
            // Pre-Byzantium receipts carry no status field
            None => Ok(STATUS_SUCCESS),
        }
    }
}

/// The staking token contract, exposing `approveAndCall`.
pub struct EthToken<M: Middleware> {
    client: Arc<M>,
    token: Address,
}

impl<M: Middleware> EthToken<M> {
    pub fn new(client: Arc<M>, token: Address) -> Self {
        Self { client, token }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ApproveAndCall for EthToken<M> {
    async fn approve_and_call(
        &self,
        spender: Address,
        amount: u64,
        call_data: Vec<u8>,
        from: Address,
    ) -> Result<TxHash> {
        let data = abi::encode_approve_and_call(spender, amount, &call_data);
        broadcast(self.client.as_ref(), "approveAndCall", self.token, from, data).await
    }
}
