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

//! Client-side mirror of the Discover contract's stake and vote formulas.
//!
//! These are used for previews and pre-flight checks only. The contract
//! stays authoritative, and the downvote cost curve is never computed
//! here: it is always read from the contract.
//!
//! Every rounding step rounds half away from zero, which is what
//! [`f64::round`] does.

use ethers_core::types::U256;

use crate::{
    contract::{DApp, DAppId, DownvoteCost},
    Error, Result,
};

/// Fixed-point scale of `rate`
pub const DECIMALS: u64 = 1_000_000;
/// Total supply of the staking token, in whole tokens
pub const TOTAL_SUPPLY: u64 = 3_470_483_788;
/// Per-listing stake ceiling, in parts per `DECIMALS` of the supply
pub const CEILING: u64 = 588;
/// Share of `max` usable as the effective ceiling, in percent
pub const SAFE_MAX_PERCENT: u64 = 98;

/// `round(total * ceiling / decimals)`
pub fn max_stake(total: u64, ceiling: u64, decimals: u64) -> u64 {
    (total as f64 * ceiling as f64 / decimals as f64).round() as u64
}

/// The ceiling actually enforced for stakes, a safety margin below `max`.
pub fn safe_max(max: u64) -> u64 {
    (max as f64 * SAFE_MAX_PERCENT as f64 / 100.0).round() as u64
}

/// Rate and available tokens for a stake of `balance`.
///
/// `rate = round(decimals - balance * decimals / max)` and
/// `available = balance * rate`.
pub fn rate_and_available(balance: u64, max: u64, decimals: u64) -> Result<(u64, u64)> {
    if max == 0 {
        return Err(Error::ArithmeticOverflow("rate"))
    }

    if balance > max {
        return Err(Error::BalanceAboveMax { balance, max })
    }

    let rate = (decimals as f64 - balance as f64 * decimals as f64 / max as f64).round();
    let rate = rate.clamp(0.0, decimals as f64) as u64;

    let Some(available) = balance.checked_mul(rate) else {
        return Err(Error::ArithmeticOverflow("available"))
    };

    Ok((rate, available))
}

/// `round((available / decimals) ^ (decimals / rate))`
///
/// The result grows exponentially with the stake and is only bounded by
/// the contract's uint256 storage, which it leaves from a stake of about
/// 1,905,575 on. Past that point this returns
/// [`Error::ArithmeticOverflow`].
pub fn votes_minted(available: u64, decimals: u64, rate: u64) -> Result<U256> {
    if rate == 0 {
        return Err(Error::ZeroRate)
    }

    let base = available as f64 / decimals as f64;
    let exp = decimals as f64 / rate as f64;
    let votes = base.powf(exp).round();

    let Some(votes) = f64_to_u256(votes) else {
        return Err(Error::ArithmeticOverflow("votesMinted"))
    };

    Ok(votes)
}

/// Effective balance of a listing with `votes_cast` votes spent against it:
/// `round(balance - ((votes_cast * rate / decimals) * (available / decimals / votes_minted)))`,
/// evaluated in exactly that order and floored at zero.
pub fn effective_balance(
    balance: u64,
    votes_cast: U256,
    rate: u64,
    decimals: u64,
    available: u64,
    votes_minted: U256,
) -> u64 {
    if votes_cast.is_zero() || votes_minted.is_zero() {
        return balance
    }

    let spent = u256_to_f64(votes_cast) * rate as f64 / decimals as f64;
    let per_vote = available as f64 / decimals as f64 / u256_to_f64(votes_minted);
    let effective = (balance as f64 - spent * per_vote).round();

    if effective <= 0.0 {
        return 0
    }

    effective as u64
}

/// Exact conversion of a non-negative integral `f64`. `None` when the
/// value is not finite, negative or wider than 256 bits.
fn f64_to_u256(value: f64) -> Option<U256> {
    if !value.is_finite() || value < 0.0 {
        return None
    }

    // 2^64
    if value < 18_446_744_073_709_551_616.0 {
        return Some(U256::from(value as u64))
    }

    let bits = value.to_bits();
    let shift = ((bits >> 52) & 0x7ff) as usize - 1075;
    let mantissa = (bits & ((1 << 52) - 1)) | (1 << 52);

    if shift + 53 > 256 {
        return None
    }

    Some(U256::from(mantissa) << shift)
}

fn u256_to_f64(value: U256) -> f64 {
    value.0.iter().rev().fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

/// Projected record for a newly created listing staking `amount`.
pub fn project_creation(id: DAppId, amount: u64, max: u64, decimals: u64) -> Result<DApp> {
    let (rate, available) = rate_and_available(amount, max, decimals)?;
    let votes_minted = votes_minted(available, decimals, rate)?;

    Ok(DApp {
        developer: Default::default(),
        id,
        metadata: [0u8; 32],
        balance: amount,
        rate,
        available,
        votes_minted,
        votes_cast: U256::zero(),
        effective_balance: amount,
    })
}

/// Projected record after `amount` more is staked on `dapp`.
pub fn project_upvote(dapp: &DApp, amount: u64, max: u64, decimals: u64) -> Result<DApp> {
    let Some(balance) = dapp.balance.checked_add(amount) else {
        return Err(Error::ArithmeticOverflow("balance"))
    };

    let (rate, available) = rate_and_available(balance, max, decimals)?;
    let votes_minted = votes_minted(available, decimals, rate)?;
    let effective_balance =
        effective_balance(balance, dapp.votes_cast, rate, decimals, available, votes_minted);

    Ok(DApp { balance, rate, available, votes_minted, effective_balance, ..dapp.clone() })
}

/// Projected record after a downvote costing `cost`, as read from the
/// contract. Balance, rate and minted votes do not move.
pub fn apply_downvote(dapp: &DApp, cost: &DownvoteCost) -> Result<DApp> {
    let Some(available) = dapp.available.checked_sub(cost.cost) else {
        return Err(Error::ArithmeticOverflow("available"))
    };

    let Some(votes_cast) = dapp.votes_cast.checked_add(cost.votes_required) else {
        return Err(Error::ArithmeticOverflow("votesCast"))
    };

    Ok(DApp {
        available,
        votes_cast,
        effective_balance: dapp.effective_balance.saturating_sub(cost.balance_down_by),
        ..dapp.clone()
    })
}
