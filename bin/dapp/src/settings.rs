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

use structopt::StructOpt;
use structopt_toml::{serde::Deserialize, StructOptToml};
use url::Url;

use dappstore::cli_desc;

pub const CONFIG_FILE: &str = "dapp_config.toml";
pub const CONFIG_FILE_CONTENTS: &str = include_str!("../dapp_config.toml");

#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[serde(default)]
#[structopt(name = "dapp", about = cli_desc!())]
pub struct Args {
    #[structopt(short, long)]
    /// Configuration file to use
    pub config: Option<String>,

    #[structopt(short, long, default_value = "http://127.0.0.1:8545")]
    /// Ethereum JSON-RPC endpoint
    pub endpoint: Url,

    #[structopt(long, default_value = "0x0000000000000000000000000000000000000000")]
    /// Address of the Discover contract
    pub discover: String,

    #[structopt(long, default_value = "0x0000000000000000000000000000000000000000")]
    /// Address of the staking token contract
    pub token: String,

    #[structopt(long, default_value = "0x0000000000000000000000000000000000000000")]
    /// Account transactions are sent from
    pub account: String,

    #[structopt(long, default_value = "http://127.0.0.1:5001/")]
    /// IPFS node HTTP API
    pub ipfs_api: Url,

    #[structopt(long, default_value = "https://ipfs.infura.io/")]
    /// IPFS gateway used to build image URLs
    pub ipfs_gateway: Url,

    #[structopt(long, default_value = "~/.local/darkfi/dapp")]
    /// Directory holding the tracked transaction state
    pub datastore: String,

    #[structopt(long, default_value = "2000")]
    /// Delay between two transaction status reads, in milliseconds
    pub poll_interval: u64,

    #[structopt(long, default_value = "0")]
    /// Status reads before giving up on a pending transaction (0 = never)
    pub max_poll_attempts: u64,

    #[structopt(subcommand)]
    /// Sub command to execute
    pub command: Subcmd,

    #[structopt(short, long)]
    /// Set log file to ouput into
    pub log: Option<String>,

    #[structopt(short, parse(from_occurrences))]
    /// Increase verbosity (-vvv supported)
    pub verbose: u8,
}

/// Listing metadata given on the command line
#[derive(Clone, Debug, Deserialize, StructOpt)]
pub struct MetadataArgs {
    #[structopt(long)]
    /// Listing name
    pub name: String,

    #[structopt(long, default_value = "")]
    /// Listing URL
    pub url: String,

    #[structopt(long, default_value = "")]
    /// Short description
    pub description: String,

    #[structopt(long, default_value = "")]
    /// Image payload, e.g. a data URL
    pub image: String,

    #[structopt(long)]
    /// Read the image payload from a file instead
    pub image_file: Option<String>,

    #[structopt(long, default_value = "")]
    /// Listing category
    pub category: String,

    #[structopt(long, default_value = "")]
    /// Date the listing was added
    pub date_added: String,

    #[structopt(long)]
    /// Position within the category
    pub category_position: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, StructOpt)]
pub enum Subcmd {
    /// Show the on-chain record of a listing
    Get {
        /// Listing id (0x-prefixed bytes32)
        id: String,
    },

    /// Show a listing together with its metadata
    Data {
        /// Listing id (0x-prefixed bytes32)
        id: String,
    },

    /// Check whether a listing exists
    Exists {
        /// Listing id (0x-prefixed bytes32)
        id: String,
    },

    /// Show the stake ceiling of a listing
    SafeMax,

    /// Preview the record a new listing would get
    PreviewCreate {
        /// Amount to stake
        amount: u64,

        #[structopt(flatten)]
        metadata: MetadataArgs,
    },

    /// Preview a listing after an upvote
    PreviewUpvote {
        /// Listing id (0x-prefixed bytes32)
        id: String,

        /// Amount to stake
        amount: u64,
    },

    /// Contract preview of the votes an upvote would mint
    UpvoteEffect {
        /// Listing id (0x-prefixed bytes32)
        id: String,

        /// Amount to stake
        amount: u64,
    },

    /// Show the current cost of downvoting a listing
    DownvoteCost {
        /// Listing id (0x-prefixed bytes32)
        id: String,
    },

    /// Create a new listing
    Create {
        /// Amount to stake
        amount: u64,

        #[structopt(flatten)]
        metadata: MetadataArgs,

        #[structopt(long)]
        /// Return after broadcasting, without waiting for the result
        no_watch: bool,
    },

    /// Stake more on a listing
    Upvote {
        /// Listing id (0x-prefixed bytes32)
        id: String,

        /// Amount to stake
        amount: u64,

        #[structopt(long)]
        /// Return after broadcasting, without waiting for the result
        no_watch: bool,
    },

    /// Downvote a listing, paying its current downvote cost
    Downvote {
        /// Listing id (0x-prefixed bytes32)
        id: String,

        /// Amount to pay, defaults to the current cost
        amount: Option<u64>,

        #[structopt(long)]
        /// Return after broadcasting, without waiting for the result
        no_watch: bool,
    },

    /// Withdraw from the available tokens of an owned listing
    Withdraw {
        /// Listing id (0x-prefixed bytes32)
        id: String,

        /// Amount to withdraw
        amount: u64,

        #[structopt(long)]
        /// Return after broadcasting, without waiting for the result
        no_watch: bool,
    },

    /// Replace the metadata of an owned listing
    SetMetadata {
        /// Listing id (0x-prefixed bytes32)
        id: String,

        #[structopt(flatten)]
        metadata: MetadataArgs,

        #[structopt(long)]
        /// Return after broadcasting, without waiting for the result
        no_watch: bool,
    },

    /// Show the tracked transaction
    Status,

    /// Poll the tracked transaction until it resolves
    Watch,

    /// Dismiss the tracked transaction notification
    Hide,
}
