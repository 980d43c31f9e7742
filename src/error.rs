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

use crate::contract::DApp;

/// Main result type used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;

/// General library errors used throughout the codebase.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    // =================
    // Validation errors
    // =================
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Searching DApp {0} does not exist")]
    NotFound(String),

    #[error("Error fetching correct data from contract: requested {requested}, got {returned}")]
    DataIntegrity { requested: String, returned: String },

    // ==============
    // Storage errors
    // ==============
    /// The on-chain record was fetched fine, only its metadata could not be
    /// resolved. The record is carried so the caller can still use it.
    #[error("Error fetching correct data from IPFS: {reason}")]
    MetadataFetch { dapp: Box<DApp>, reason: String },

    #[error("Upload of {what} failed: {reason}")]
    Upload { what: &'static str, reason: String },

    #[error("Content store request failed: {0}")]
    StoreRequest(String),

    #[error("Invalid content pointer: {0}")]
    InvalidPointer(String),

    // =====================
    // Chain-related errors
    // =====================
    #[error("{op} failed. Details: {reason}")]
    Broadcast { op: &'static str, reason: String },

    #[error("Transaction status read failed: {0}")]
    StatusRead(String),

    #[error("Contract call {0} failed: {1}")]
    ContractCall(&'static str, String),

    #[error("ABI decode of {0} failed: {1}")]
    AbiDecode(&'static str, String),

    #[error("Value does not fit in 64 bits: {0}")]
    ValueOverflow(String),

    // ================
    // Economics errors
    // ================
    #[error("Rate is zero, no votes can be minted")]
    ZeroRate,

    #[error("Balance {balance} is above the contract max {max}")]
    BalanceAboveMax { balance: u64, max: u64 },

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    // ==========================
    // Transaction status errors
    // ==========================
    #[error("Persisted transaction status is malformed: {0}")]
    MalformedStatus(String),

    #[error("Unsupported transaction status schema version {0}")]
    UnsupportedStatusVersion(u64),

    // ==============
    // Parse errors
    // ==============
    #[error("Parse failed: {0}")]
    ParseFailed(&'static str),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("JSON generate error: {0}")]
    JsonGenerateError(String),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error("bs58 decode error: {0}")]
    Bs58DecodeError(String),

    #[error(transparent)]
    HexDecodeError(#[from] hex::FromHexError),

    // ====================
    // Miscellaneous errors
    // ====================
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),

    #[error("SetLogger (log crate) failed: {0}")]
    SetLoggerError(String),

    #[error("Publisher was destroyed")]
    PublisherDestroyed,

    #[error("No config file detected")]
    ConfigNotFound,

    #[error("Invalid config file detected: {0}")]
    ConfigInvalid(String),
}

/// Rejections raised before anything is sent to the chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("You must spend some SNT, zero amounts are not accepted")]
    ZeroAmount,

    #[error("You must submit a unique ID, {0} already exists")]
    DuplicateId(String),

    #[error("Projected balance {projected} exceeds the ceiling {ceiling}")]
    CeilingExceeded { projected: u64, ceiling: u64 },

    #[error("Only the developer {developer} can do this, caller is {caller}")]
    Unauthorized { caller: String, developer: String },

    #[error("Incorrect amount: downvoting costs exactly {expected}, got {got}")]
    IncorrectDownvoteAmount { expected: u64, got: u64 },

    #[error("Amount {amount} exceeds the available {available}")]
    ExceedsAvailable { amount: u64, available: u64 },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.kind())
    }
}

impl From<tinyjson::JsonParseError> for Error {
    fn from(err: tinyjson::JsonParseError) -> Self {
        Self::JsonParseError(err.to_string())
    }
}

impl From<tinyjson::JsonGenerateError> for Error {
    fn from(err: tinyjson::JsonGenerateError) -> Self {
        Self::JsonGenerateError(err.to_string())
    }
}

impl From<bs58::decode::Error> for Error {
    fn from(err: bs58::decode::Error) -> Self {
        Self::Bs58DecodeError(err.to_string())
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Self {
        Self::SetLoggerError(err.to_string())
    }
}
