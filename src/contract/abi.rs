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

//! Solidity ABI encoding of the Discover contract methods, and decoding
//! of their return data.

use ethers_core::{
    abi::{self, short_signature, ParamType, Token},
    types::{Address, U256},
};

use super::types::{DApp, DAppId, DownvoteCost};
use crate::{Error, Result};

/// A call into the Discover contract, one variant per contract method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoverCall {
    Dapps(u64),
    Id2Index(DAppId),
    ExistingIds(DAppId),
    SafeMax,
    Max,
    Decimals,
    UpvoteEffect(DAppId, u64),
    DownvoteCost(DAppId),
    CreateDApp(DAppId, u64, [u8; 32]),
    Upvote(DAppId, u64),
    Downvote(DAppId, u64),
    Withdraw(DAppId, u64),
    SetMetadata(DAppId, [u8; 32]),
}

impl DiscoverCall {
    /// Solidity method name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dapps(_) => "dapps",
            Self::Id2Index(_) => "id2index",
            Self::ExistingIds(_) => "existingIDs",
            Self::SafeMax => "safeMax",
            Self::Max => "max",
            Self::Decimals => "decimals",
            Self::UpvoteEffect(..) => "upvoteEffect",
            Self::DownvoteCost(_) => "downvoteCost",
            Self::CreateDApp(..) => "createDApp",
            Self::Upvote(..) => "upvote",
            Self::Downvote(..) => "downvote",
            Self::Withdraw(..) => "withdraw",
            Self::SetMetadata(..) => "setMetadata",
        }
    }

    /// Whether the call changes contract state and must be broadcast.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::CreateDApp(..) |
                Self::Upvote(..) |
                Self::Downvote(..) |
                Self::Withdraw(..) |
                Self::SetMetadata(..)
        )
    }

    fn param_types(&self) -> Vec<ParamType> {
        let bytes32 = ParamType::FixedBytes(32);
        let uint = ParamType::Uint(256);

        match self {
            Self::SafeMax | Self::Max | Self::Decimals => vec![],
            Self::Dapps(_) => vec![uint],
            Self::Id2Index(_) | Self::ExistingIds(_) | Self::DownvoteCost(_) => vec![bytes32],
            Self::UpvoteEffect(..) | Self::Upvote(..) | Self::Downvote(..) | Self::Withdraw(..) => {
                vec![bytes32, uint]
            }
            Self::CreateDApp(..) => vec![bytes32.clone(), uint, bytes32],
            Self::SetMetadata(..) => vec![bytes32.clone(), bytes32],
        }
    }

    fn tokens(&self) -> Vec<Token> {
        let id = |id: &DAppId| Token::FixedBytes(id.0.to_vec());
        let uint = |v: &u64| Token::Uint(U256::from(*v));

        match self {
            Self::SafeMax | Self::Max | Self::Decimals => vec![],
            Self::Dapps(index) => vec![uint(index)],
            Self::Id2Index(d) | Self::ExistingIds(d) | Self::DownvoteCost(d) => vec![id(d)],
            Self::UpvoteEffect(d, amount) |
            Self::Upvote(d, amount) |
            Self::Downvote(d, amount) |
            Self::Withdraw(d, amount) => vec![id(d), uint(amount)],
            Self::CreateDApp(d, amount, metadata) => {
                vec![id(d), uint(amount), Token::FixedBytes(metadata.to_vec())]
            }
            Self::SetMetadata(d, metadata) => vec![id(d), Token::FixedBytes(metadata.to_vec())],
        }
    }

    /// 4-byte function selector
    pub fn selector(&self) -> [u8; 4] {
        short_signature(self.name(), &self.param_types())
    }

    /// Full calldata: selector followed by the ABI-encoded arguments.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.selector().to_vec();
        data.extend(abi::encode(&self.tokens()));
        data
    }
}

/// Calldata for the token's `approveAndCall(address,uint256,bytes)`, which
/// approves `spender` for `amount` and invokes it with `call_data` in a
/// single transaction.
pub fn encode_approve_and_call(spender: Address, amount: u64, call_data: &[u8]) -> Vec<u8> {
    let params = [ParamType::Address, ParamType::Uint(256), ParamType::Bytes];
    let mut data = short_signature("approveAndCall", &params).to_vec();
    data.extend(abi::encode(&[
        Token::Address(spender),
        Token::Uint(U256::from(amount)),
        Token::Bytes(call_data.to_vec()),
    ]));
    data
}

fn decode(method: &'static str, types: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    abi::decode(types, data).map_err(|e| Error::AbiDecode(method, e.to_string()))
}

fn token_to_u256(method: &'static str, token: Token) -> Result<U256> {
    let Token::Uint(value) = token else {
        return Err(Error::AbiDecode(method, format!("expected uint, got {token:?}")))
    };

    Ok(value)
}

fn token_to_u64(method: &'static str, token: Token) -> Result<u64> {
    let value = token_to_u256(method, token)?;
    if value > U256::from(u64::MAX) {
        return Err(Error::ValueOverflow(format!("{method} returned {value}")))
    }

    Ok(value.as_u64())
}

fn token_to_bytes32(method: &'static str, token: Token) -> Result<[u8; 32]> {
    let Token::FixedBytes(bytes) = token else {
        return Err(Error::AbiDecode(method, format!("expected bytes32, got {token:?}")))
    };

    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| Error::AbiDecode(method, format!("expected 32 bytes, got {}", bytes.len())))
}

/// Decode a single `uint` return value.
pub fn decode_uint(method: &'static str, data: &[u8]) -> Result<u64> {
    let mut tokens = decode(method, &[ParamType::Uint(256)], data)?;
    token_to_u64(method, tokens.remove(0))
}

/// Decode a single `bool` return value.
pub fn decode_bool(method: &'static str, data: &[u8]) -> Result<bool> {
    let mut tokens = decode(method, &[ParamType::Bool], data)?;
    match tokens.remove(0) {
        Token::Bool(b) => Ok(b),
        t => Err(Error::AbiDecode(method, format!("expected bool, got {t:?}"))),
    }
}

/// Decode the `Data` struct getter output of `dapps(uint)`.
pub fn decode_dapp(data: &[u8]) -> Result<DApp> {
    const METHOD: &str = "dapps";

    let types = [
        ParamType::Address,
        ParamType::FixedBytes(32),
        ParamType::FixedBytes(32),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
    ];

    let mut tokens = decode(METHOD, &types, data)?.into_iter();
    let mut next = || {
        tokens.next().ok_or_else(|| Error::AbiDecode(METHOD, "missing output".to_string()))
    };

    let developer = match next()? {
        Token::Address(a) => a,
        t => return Err(Error::AbiDecode(METHOD, format!("expected address, got {t:?}"))),
    };

    Ok(DApp {
        developer,
        id: DAppId(token_to_bytes32(METHOD, next()?)?),
        metadata: token_to_bytes32(METHOD, next()?)?,
        balance: token_to_u64(METHOD, next()?)?,
        rate: token_to_u64(METHOD, next()?)?,
        available: token_to_u64(METHOD, next()?)?,
        votes_minted: token_to_u256(METHOD, next()?)?,
        votes_cast: token_to_u256(METHOD, next()?)?,
        effective_balance: token_to_u64(METHOD, next()?)?,
    })
}

/// Decode the `(uint b, uint vR, uint c)` output of `downvoteCost(bytes32)`.
pub fn decode_downvote_cost(data: &[u8]) -> Result<DownvoteCost> {
    const METHOD: &str = "downvoteCost";

    let uint = ParamType::Uint(256);
    let mut tokens = decode(METHOD, &[uint.clone(), uint.clone(), uint], data)?.into_iter();
    let mut next = || {
        tokens.next().ok_or_else(|| Error::AbiDecode(METHOD, "missing output".to_string()))
    };

    Ok(DownvoteCost {
        balance_down_by: token_to_u64(METHOD, next()?)?,
        votes_required: token_to_u256(METHOD, next()?)?,
        cost: token_to_u64(METHOD, next()?)?,
    })
}

/// Encode a `DApp` the way the contract getter returns it. Used by
/// gateways that serve records from memory.
pub fn encode_dapp(dapp: &DApp) -> Vec<u8> {
    let uint = |v: u64| Token::Uint(U256::from(v));
    abi::encode(&[
        Token::Address(dapp.developer),
        Token::FixedBytes(dapp.id.0.to_vec()),
        Token::FixedBytes(dapp.metadata.to_vec()),
        uint(dapp.balance),
        uint(dapp.rate),
        uint(dapp.available),
        Token::Uint(dapp.votes_minted),
        Token::Uint(dapp.votes_cast),
        uint(dapp.effective_balance),
    ])
}

/// Encode a `DownvoteCost` the way the contract returns it.
pub fn encode_downvote_cost(cost: &DownvoteCost) -> Vec<u8> {
    abi::encode(&[
        Token::Uint(U256::from(cost.balance_down_by)),
        Token::Uint(cost.votes_required),
        Token::Uint(U256::from(cost.cost)),
    ])
}
