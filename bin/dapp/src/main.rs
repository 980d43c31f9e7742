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

use std::{fs, str::FromStr, sync::Arc, time::Duration};

use ethers::types::{Address, H256};
use futures::{future::Either, pin_mut};
use log::{error, info};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use structopt_toml::StructOptToml;

use dappstore::{
    contract::{
        eth::{http_provider, EthGateway, EthToken},
        to_hex_string, DApp, DAppId, DiscoverContract, TxHash,
    },
    metadata::{ipfs::IpfsStore, DAppMetadata},
    service::DiscoverService,
    system::Subscription,
    txstatus::{
        FileStatusStore, PollPolicy, TransactionTracker, TransactionTrackerPtr,
        TransactionWatcher, TxPhase, UiEvent, STATUS_FAILED,
    },
    util::{
        cli::spawn_config,
        file::{load_data_url, load_file},
        path::{expand_path, get_config_path},
    },
    Error, Result,
};

/// Command-line arguments and configuration
mod settings;
use settings::{Args, MetadataArgs, Subcmd, CONFIG_FILE, CONFIG_FILE_CONTENTS};

fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s).or(Err(Error::ParseFailed("Invalid Ethereum address")))
}

fn parse_id(s: &str) -> Result<DAppId> {
    DAppId::from_str(s)
}

fn build_metadata(args: MetadataArgs) -> Result<DAppMetadata> {
    let image = match args.image_file {
        Some(path) => load_data_url(&expand_path(&path)?)?,
        None => args.image,
    };

    Ok(DAppMetadata {
        name: args.name,
        url: args.url,
        description: args.description,
        image,
        category: args.category,
        date_added: args.date_added,
        category_position: args.category_position,
    })
}

fn print_dapp(dapp: &DApp) {
    println!("id:                {}", dapp.id);
    println!("developer:         {}", to_hex_string(&dapp.developer));
    println!("metadata:          {}", to_hex_string(&H256::from(dapp.metadata)));
    println!("balance:           {}", dapp.balance);
    println!("rate:              {}", dapp.rate);
    println!("available:         {}", dapp.available);
    println!("votes minted:      {}", dapp.votes_minted);
    println!("votes cast:        {}", dapp.votes_cast);
    println!("effective balance: {}", dapp.effective_balance);
}

fn print_event(event: &UiEvent) {
    match event {
        UiEvent::StatusChanged(status) => {
            println!("[{}] {} {}", status.phase, status.dapp_name, status.dapp_transaction_hash)
        }
        UiEvent::DAppUpdated { id, metadata, snt_value } => {
            println!("Updated {} ({id}): {} SNT", metadata.name, snt_value)
        }
        UiEvent::Alert { message, reload } => {
            if *reload {
                println!("Alert: {message} (reload to retry)")
            } else {
                println!("Alert: {message}")
            }
        }
    }
}

/// Client state: the store service and the tracked transaction.
struct Dapp {
    service: Arc<DiscoverService>,
    tracker: TransactionTrackerPtr,
    watcher: TransactionWatcher,
}

impl Dapp {
    async fn new(args: &Args) -> Result<Self> {
        let provider = http_provider(&args.endpoint)?;
        let discover = parse_address(&args.discover)?;
        let token = parse_address(&args.token)?;
        let account = parse_address(&args.account)?;

        let gateway = Arc::new(EthGateway::new(provider.clone(), discover));
        let contract = DiscoverContract::new(gateway.clone());
        let token = Arc::new(EthToken::new(provider, token));
        let store = Arc::new(IpfsStore::new(args.ipfs_api.clone(), args.ipfs_gateway.clone()));

        let service = Arc::new(DiscoverService::new(contract, token, store, account));

        let datastore = expand_path(&args.datastore)?;
        fs::create_dir_all(&datastore)?;
        let tracker = TransactionTracker::recover(Arc::new(FileStatusStore::new(&datastore))).await;

        let policy = PollPolicy {
            interval: Duration::from_millis(args.poll_interval),
            max_attempts: if args.max_poll_attempts == 0 {
                None
            } else {
                Some(args.max_poll_attempts)
            },
        };

        let watcher = TransactionWatcher::new(tracker.clone(), gateway, service.clone(), policy);

        Ok(Self { service, tracker, watcher })
    }

    /// Track a write operation: open the notification, run `op`, attach
    /// the resulting transaction and, if asked, poll it to resolution.
    async fn track<F>(&self, name: &str, img: &str, desc: &str, watch: bool, op: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<(DAppId, TxHash)>>,
    {
        self.tracker.start(name, img, desc).await?;

        let (id, tx) = match op.await {
            Ok(v) => v,
            Err(e) => {
                error!(target: "dapp", "{e}");
                self.tracker.change_status(STATUS_FAILED).await?;
                return Err(e)
            }
        };

        self.tracker.receive_transaction_info(id, tx).await?;
        println!("Transaction: {}", to_hex_string(&tx));

        if !watch {
            return Ok(())
        }

        self.watch(&tx).await
    }

    async fn watch(&self, tx: &TxHash) -> Result<()> {
        let sub = self.tracker.publisher().subscribe().await;

        let phase = {
            let watch = self.watcher.watch(tx);
            let print = print_events(&sub);
            pin_mut!(watch, print);

            match futures::future::select(watch, print).await {
                Either::Left((phase, _)) => phase?,
                Either::Right((e, _)) => return Err(e),
            }
        };

        while let Some(event) = sub.try_receive() {
            print_event(&event);
        }
        sub.unsubscribe().await;

        info!(target: "dapp", "Stopped watching {} in phase {phase}", to_hex_string(tx));
        if phase == TxPhase::Failed {
            return Err(Error::Broadcast { op: "Transaction", reason: "reverted".to_string() })
        }

        Ok(())
    }

    /// Name and image of a listing for the notification, best effort.
    async fn label(&self, id: &DAppId) -> (String, String, String) {
        match self.service.get_dapp_data_by_id(id).await {
            Ok(data) => (data.metadata.name, data.metadata.image, data.metadata.description),
            Err(_) => (id.to_string(), String::new(), String::new()),
        }
    }
}

async fn print_events(sub: &Subscription<UiEvent>) -> Error {
    loop {
        match sub.receive().await {
            Ok(event) => print_event(&event),
            Err(e) => return e,
        }
    }
}

async fn realmain(args: Args) -> Result<()> {
    let dapp = Dapp::new(&args).await?;
    let service = dapp.service.clone();

    match args.command {
        Subcmd::Get { id } => {
            print_dapp(&service.get_dapp_by_id(&parse_id(&id)?).await?);
            Ok(())
        }

        Subcmd::Data { id } => {
            let data = match service.get_dapp_data_by_id(&parse_id(&id)?).await {
                Ok(data) => data,
                Err(Error::MetadataFetch { dapp, reason }) => {
                    print_dapp(&dapp);
                    error!(target: "dapp", "Metadata unavailable: {reason}");
                    return Err(Error::MetadataFetch { dapp, reason })
                }
                Err(e) => return Err(e),
            };

            print_dapp(&data.dapp);
            println!("name:              {}", data.metadata.name);
            println!("url:               {}", data.metadata.url);
            println!("description:       {}", data.metadata.description);
            println!("image:             {}", data.metadata.image);
            println!("category:          {}", data.metadata.category);
            println!("date added:        {}", data.metadata.date_added);
            if let Some(position) = data.metadata.category_position {
                println!("category position: {position}");
            }
            Ok(())
        }

        Subcmd::Exists { id } => {
            println!("{}", service.is_dapp_exists(&parse_id(&id)?).await?);
            Ok(())
        }

        Subcmd::SafeMax => {
            println!("{}", service.safe_max().await?);
            Ok(())
        }

        Subcmd::PreviewCreate { amount, metadata } => {
            let metadata = build_metadata(metadata)?;
            print_dapp(&service.preview_create(&metadata, amount).await?);
            Ok(())
        }

        Subcmd::PreviewUpvote { id, amount } => {
            print_dapp(&service.preview_upvote(&parse_id(&id)?, amount).await?);
            Ok(())
        }

        Subcmd::UpvoteEffect { id, amount } => {
            println!("{}", service.up_vote_effect(&parse_id(&id)?, amount).await?);
            Ok(())
        }

        Subcmd::DownvoteCost { id } => {
            let cost = service.down_vote_cost(&parse_id(&id)?).await?;
            println!("balance down by: {}", cost.balance_down_by);
            println!("votes required:  {}", cost.votes_required);
            println!("cost:            {}", cost.cost);
            Ok(())
        }

        Subcmd::Create { amount, metadata, no_watch } => {
            let metadata = build_metadata(metadata)?;
            let op = async {
                let created = service.create_dapp(amount, &metadata).await?;
                println!("DApp id: {}", created.id);
                Ok::<_, Error>((created.id, created.tx))
            };

            let (name, img, desc) = (&metadata.name, &metadata.image, &metadata.description);
            dapp.track(name, img, desc, !no_watch, op).await
        }

        Subcmd::Upvote { id, amount, no_watch } => {
            let id = parse_id(&id)?;
            let (name, img, desc) = dapp.label(&id).await;
            let op = async { Ok::<_, Error>((id, service.up_vote(&id, amount).await?)) };
            dapp.track(&name, &img, &desc, !no_watch, op).await
        }

        Subcmd::Downvote { id, amount, no_watch } => {
            let id = parse_id(&id)?;
            let amount = match amount {
                Some(a) => a,
                None => service.down_vote_cost(&id).await?.cost,
            };

            let (name, img, desc) = dapp.label(&id).await;
            let op = async { Ok::<_, Error>((id, service.down_vote(&id, amount).await?)) };
            dapp.track(&name, &img, &desc, !no_watch, op).await
        }

        Subcmd::Withdraw { id, amount, no_watch } => {
            let id = parse_id(&id)?;
            let (name, img, desc) = dapp.label(&id).await;
            let op = async { Ok::<_, Error>((id, service.withdraw(&id, amount).await?)) };
            dapp.track(&name, &img, &desc, !no_watch, op).await
        }

        Subcmd::SetMetadata { id, metadata, no_watch } => {
            let id = parse_id(&id)?;
            let metadata = build_metadata(metadata)?;
            let op = async { Ok::<_, Error>((id, service.set_metadata(&id, &metadata).await?)) };

            let (name, img, desc) = (&metadata.name, &metadata.image, &metadata.description);
            dapp.track(name, img, desc, !no_watch, op).await
        }

        Subcmd::Status => {
            let state = dapp.tracker.state().await;
            println!("phase:       {}", state.phase);
            println!("name:        {}", state.dapp_name);
            println!("image:       {}", state.dapp_img);
            println!("description: {}", state.dapp_desc);
            println!("dapp id:     {}", state.dapp_id);
            println!("transaction: {}", state.dapp_transaction_hash);
            Ok(())
        }

        Subcmd::Watch => {
            let state = dapp.tracker.state().await;
            if state.dapp_transaction_hash.is_empty() {
                println!("No transaction is being tracked");
                return Ok(())
            }

            let Ok(tx) = H256::from_str(&state.dapp_transaction_hash) else {
                return Err(Error::ParseFailed("Invalid tracked transaction hash"))
            };

            dapp.watch(&tx).await
        }

        Subcmd::Hide => {
            dapp.tracker.hide().await?;
            Ok(())
        }
    }
}

fn log_config(verbosity: u8) -> (LevelFilter, simplelog::Config) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_location_level(LevelFilter::Off)
        .build();

    (level, config)
}

fn main() -> Result<()> {
    // First pass only to find the config file
    let args = Args::from_args_with_toml("").map_err(|e| Error::ConfigInvalid(e.to_string()))?;
    let cfg_path = get_config_path(args.config, CONFIG_FILE)?;
    spawn_config(&cfg_path, CONFIG_FILE_CONTENTS.as_bytes())?;

    let contents = load_file(&cfg_path)?;
    let args =
        Args::from_args_with_toml(&contents).map_err(|e| Error::ConfigInvalid(e.to_string()))?;

    let (lvl, conf) = log_config(args.verbose);
    match &args.log {
        Some(path) => {
            let file = fs::File::create(expand_path(path)?)?;
            let loggers: Vec<Box<dyn SharedLogger>> = vec![
                TermLogger::new(lvl, conf.clone(), TerminalMode::Mixed, ColorChoice::Auto),
                WriteLogger::new(lvl, conf, file),
            ];
            CombinedLogger::init(loggers)?;
        }
        None => TermLogger::init(lvl, conf, TerminalMode::Mixed, ColorChoice::Auto)?,
    }

    // The JSON-RPC provider runs on tokio
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(realmain(args))
}
