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

pub mod error;
pub use error::{Error, Result, ValidationError};

/// Client-side mirror of the Discover contract vote/stake formulas
pub mod economics;

/// Discover contract types, ABI encoding and gateways
pub mod contract;

/// Content-addressed metadata storage
pub mod metadata;

/// Pre-flight checks for state-changing operations
pub mod validator;

/// Read and write flows against the DApp store
pub mod service;

/// Tracking of the in-flight store transaction
pub mod txstatus;

/// Async primitives
pub mod system;

/// Filesystem and path utilities
pub mod util;

/// Returns a short description of the calling crate, for CLI `about` strings.
#[macro_export]
macro_rules! cli_desc {
    () => {{
        let mut desc = env!("CARGO_PKG_DESCRIPTION").to_string();
        desc.push_str(" ");
        desc.push_str(env!("CARGO_PKG_VERSION"));
        Box::leak(desc.into_boxed_str()) as &'static str
    }};
}
