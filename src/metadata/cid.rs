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

//! Conversion between CIDv0 content identifiers (`Qm...`) and the
//! bytes32 pointers stored on-chain. A CIDv0 is the base58 encoding of a
//! sha2-256 multihash: `0x12 0x20` followed by the 32-byte digest. Only
//! the digest is kept on-chain.

use sha2::{Digest, Sha256};

use crate::{Error, Result};

const SHA2_256: u8 = 0x12;
const DIGEST_LEN: u8 = 0x20;

/// Strip a CIDv0 down to its 32-byte digest.
pub fn cid_to_bytes32(cid: &str) -> Result<[u8; 32]> {
    let raw = bs58::decode(cid).into_vec()?;

    if raw.len() != 34 || raw[0] != SHA2_256 || raw[1] != DIGEST_LEN {
        return Err(Error::InvalidPointer(format!("{cid} is not a sha2-256 CIDv0")))
    }

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&raw[2..]);
    Ok(digest)
}

/// Rebuild the CIDv0 string from an on-chain bytes32 pointer.
pub fn bytes32_to_cid(pointer: &[u8; 32]) -> String {
    let mut raw = Vec::with_capacity(34);
    raw.push(SHA2_256);
    raw.push(DIGEST_LEN);
    raw.extend_from_slice(pointer);
    bs58::encode(raw).into_string()
}

/// Pointer of a blob stored as a single raw block. Content stores that
/// chunk or wrap their input will produce different digests, so this is
/// only authoritative for stores that hash the bytes directly.
pub fn raw_pointer(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
