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

//! Store flows against an in-memory Discover contract and content store.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use ethers_core::{
    abi::{encode, Token},
    types::{Address, U256},
};

use dappstore::{
    contract::{
        abi::{encode_dapp, encode_downvote_cost},
        ApproveAndCall, ContractGateway, DApp, DAppId, DiscoverCall, DiscoverContract,
        DownvoteCost, TxHash,
    },
    economics::{rate_and_available, votes_minted, DECIMALS},
    metadata::{
        cid::{bytes32_to_cid, raw_pointer},
        DAppMetadata, MemoryStore, MetadataStore,
    },
    service::DiscoverService,
    Error, Result, ValidationError,
};

const MAX: u64 = 2_040_644;
const SAFE_MAX: u64 = 1_999_831;
const GATEWAY: &str = "https://gateway.example";

/// Contract state served by [`MockChain`].
#[derive(Default)]
struct ChainState {
    dapps: Vec<DApp>,
    /// Overrides of the id -> index mapping. Unknown ids map to 0, like
    /// an unset Solidity mapping.
    id2index: HashMap<DAppId, u64>,
    costs: HashMap<DAppId, DownvoteCost>,
    /// Serve `dapps` replies cut short
    truncated: bool,
}

struct MockChain {
    address: Address,
    state: Mutex<ChainState>,
    reads: AtomicUsize,
    sent: Mutex<Vec<(DiscoverCall, Address)>>,
}

impl MockChain {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            address: Address::repeat_byte(0xd1),
            state: Mutex::new(ChainState::default()),
            reads: AtomicUsize::new(0),
            sent: Mutex::new(vec![]),
        })
    }

    fn push(&self, dapp: DApp) {
        let mut state = self.state.lock().unwrap();
        let index = state.dapps.len() as u64;
        state.id2index.insert(dapp.id, index);
        state.dapps.push(dapp);
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

fn uint(value: u64) -> Vec<u8> {
    encode(&[Token::Uint(U256::from(value))])
}

#[async_trait]
impl ContractGateway for MockChain {
    fn address(&self) -> Address {
        self.address
    }

    async fn read(&self, call: &DiscoverCall) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();

        let data = match call {
            DiscoverCall::Dapps(index) => match state.dapps.get(*index as usize) {
                Some(dapp) if state.truncated => encode_dapp(dapp)[..31].to_vec(),
                Some(dapp) => encode_dapp(dapp),
                None => return Err(Error::ContractCall("dapps", "invalid opcode".to_string())),
            },
            DiscoverCall::Id2Index(id) => uint(state.id2index.get(id).copied().unwrap_or(0)),
            DiscoverCall::ExistingIds(id) => {
                encode(&[Token::Bool(state.dapps.iter().any(|d| d.id == *id))])
            }
            DiscoverCall::SafeMax => uint(SAFE_MAX),
            DiscoverCall::Max => uint(MAX),
            DiscoverCall::Decimals => uint(DECIMALS),
            DiscoverCall::UpvoteEffect(_, amount) => uint(amount * 2),
            DiscoverCall::DownvoteCost(id) => match state.costs.get(id) {
                Some(cost) => encode_downvote_cost(cost),
                None => return Err(Error::ContractCall("downvoteCost", "reverted".to_string())),
            },
            _ => panic!("{} is not a view call", call.name()),
        };

        Ok(data)
    }

    async fn send(&self, call: &DiscoverCall, from: Address) -> Result<TxHash> {
        assert!(call.is_write());
        let mut sent = self.sent.lock().unwrap();
        sent.push((call.clone(), from));
        Ok(TxHash::repeat_byte(sent.len() as u8))
    }
}

#[derive(Clone, Debug)]
struct Approval {
    spender: Address,
    amount: u64,
    call_data: Vec<u8>,
    from: Address,
}

#[derive(Default)]
struct MockToken {
    approvals: Mutex<Vec<Approval>>,
    reject: Option<String>,
}

impl MockToken {
    fn approvals(&self) -> Vec<Approval> {
        self.approvals.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApproveAndCall for MockToken {
    async fn approve_and_call(
        &self,
        spender: Address,
        amount: u64,
        call_data: Vec<u8>,
        from: Address,
    ) -> Result<TxHash> {
        if let Some(reason) = &self.reject {
            return Err(Error::Broadcast { op: "approveAndCall", reason: reason.clone() })
        }

        let mut approvals = self.approvals.lock().unwrap();
        approvals.push(Approval { spender, amount, call_data, from });
        Ok(TxHash::repeat_byte(0xa0 + approvals.len() as u8))
    }
}

struct Harness {
    chain: Arc<MockChain>,
    token: Arc<MockToken>,
    store: Arc<MemoryStore>,
    service: DiscoverService,
    account: Address,
}

fn harness_with(token: MockToken) -> Harness {
    let chain = MockChain::new();
    let token = Arc::new(token);
    let store = Arc::new(MemoryStore::new(GATEWAY));
    let account = Address::repeat_byte(0x11);

    let contract = DiscoverContract::new(chain.clone());
    let service = DiscoverService::new(contract, token.clone(), store.clone(), account);

    Harness { chain, token, store, service, account }
}

fn harness() -> Harness {
    harness_with(MockToken::default())
}

/// A fresh listing as the contract stores it. Stakes that mint past
/// uint256 saturate.
fn listing(seed: u8, developer: Address, balance: u64) -> DApp {
    let (rate, available) = rate_and_available(balance, MAX, DECIMALS).unwrap();
    DApp {
        developer,
        id: DAppId([seed; 32]),
        metadata: [seed; 32],
        balance,
        rate,
        available,
        votes_minted: votes_minted(available, DECIMALS, rate).unwrap_or(U256::MAX),
        votes_cast: U256::zero(),
        effective_balance: balance,
    }
}

fn metadata() -> DAppMetadata {
    DAppMetadata {
        name: "Status".to_string(),
        url: "https://status.im".to_string(),
        description: "Secure messenger".to_string(),
        image: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        category: "SOCIAL_NETWORKS".to_string(),
        date_added: "2019-11-20".to_string(),
        category_position: None,
    }
}

fn validation(result: Result<impl std::fmt::Debug>) -> ValidationError {
    match result {
        Err(Error::Validation(e)) => e,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn zero_amounts_are_rejected_offline() {
    smol::block_on(async {
        let h = harness();
        let id = DAppId([1; 32]);

        let err = validation(h.service.create_dapp(0, &metadata()).await);
        assert_eq!(err, ValidationError::ZeroAmount);
        assert_eq!(validation(h.service.up_vote(&id, 0).await), ValidationError::ZeroAmount);
        assert_eq!(validation(h.service.down_vote(&id, 0).await), ValidationError::ZeroAmount);
        assert_eq!(validation(h.service.withdraw(&id, 0).await), ValidationError::ZeroAmount);

        assert_eq!(h.chain.reads(), 0);
        assert!(h.token.approvals().is_empty());
        assert!(h.store.is_empty().await);
    });
}

#[test]
fn unknown_id_is_not_found() {
    smol::block_on(async {
        let h = harness();
        h.chain.push(listing(1, h.account, 1000));

        // id2index of an unknown id resolves to slot 0, which holds another listing
        let unknown = DAppId([9; 32]);
        assert!(matches!(h.service.get_dapp_by_id(&unknown).await, Err(Error::NotFound(_))));
        assert!(!h.service.is_dapp_exists(&unknown).await.unwrap());

        // Empty contract: the dapps read itself fails
        let h = harness();
        assert!(matches!(h.service.get_dapp_by_id(&unknown).await, Err(Error::NotFound(_))));
    });
}

#[test]
fn mismatched_record_is_an_integrity_error() {
    smol::block_on(async {
        let h = harness();
        let a = listing(1, h.account, 1000);
        let b = listing(2, h.account, 2000);
        h.chain.push(a.clone());
        h.chain.push(b.clone());
        h.chain.state.lock().unwrap().id2index.insert(b.id, 0);

        match h.service.get_dapp_by_id(&b.id).await {
            Err(Error::DataIntegrity { requested, returned }) => {
                assert_eq!(requested, b.id.to_string());
                assert_eq!(returned, a.id.to_string());
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(h.service.get_dapp_by_id(&a.id).await.unwrap(), a);
    });
}

#[test]
fn large_vote_counts_load() {
    smol::block_on(async {
        let h = harness();
        let mut dapp = listing(1, h.account, 1_500_000);
        dapp.votes_cast = U256::from_dec_str("1300000000000000000000").unwrap();
        h.chain.push(dapp.clone());

        assert_eq!(h.service.get_dapp_by_id(&dapp.id).await.unwrap(), dapp);
    });
}

#[test]
fn undecodable_record_is_not_reported_missing() {
    smol::block_on(async {
        let h = harness();
        let dapp = listing(1, h.account, 1000);
        h.chain.push(dapp.clone());
        h.chain.state.lock().unwrap().truncated = true;

        let res = h.service.get_dapp_by_id(&dapp.id).await;
        assert!(matches!(res, Err(Error::AbiDecode("dapps", _))), "{res:?}");
    });
}

#[test]
fn create_uploads_then_approves() {
    smol::block_on(async {
        let h = harness();
        let meta = metadata();

        let created = h.service.create_dapp(100_000, &meta).await.unwrap();
        assert_eq!(created.id, meta.id().unwrap());
        assert_eq!(h.store.len().await, 2);

        let approvals = h.token.approvals();
        assert_eq!(approvals.len(), 1);
        let approval = &approvals[0];
        assert_eq!(approval.spender, h.chain.address);
        assert_eq!(approval.amount, 100_000);
        assert_eq!(approval.from, h.account);

        // createDApp(bytes32 id, uint256 amount, bytes32 metadata)
        let data = &approval.call_data;
        assert_eq!(data[..4], DiscoverCall::CreateDApp(created.id, 0, [0; 32]).selector());
        assert_eq!(data[4..36], created.id.0);
        let pointer: [u8; 32] = data[68..100].try_into().unwrap();

        let stored: DAppMetadata =
            h.store.retrieve_metadata(&pointer).await.unwrap().parse().unwrap();
        assert_eq!(stored.name, meta.name);
        assert_eq!(stored.image, bytes32_to_cid(&raw_pointer(meta.image.as_bytes())));
        assert_eq!(data, &DiscoverCall::CreateDApp(created.id, 100_000, pointer).encode());
    });
}

#[test]
fn create_checks_uniqueness_and_ceiling() {
    smol::block_on(async {
        let h = harness();
        let meta = metadata();

        let err = validation(h.service.create_dapp(SAFE_MAX + 1, &meta).await);
        let projected = SAFE_MAX + 1;
        assert_eq!(err, ValidationError::CeilingExceeded { projected, ceiling: SAFE_MAX });

        let mut existing = listing(3, h.account, 1000);
        existing.id = meta.id().unwrap();
        h.chain.push(existing);

        let err = validation(h.service.create_dapp(1000, &meta).await);
        assert!(matches!(err, ValidationError::DuplicateId(_)));
        assert!(h.token.approvals().is_empty());
        assert!(h.store.is_empty().await);
    });
}

#[test]
fn upvote_stays_under_ceiling() {
    smol::block_on(async {
        let h = harness();
        let dapp = listing(1, h.account, SAFE_MAX - 100);
        h.chain.push(dapp.clone());

        let err = validation(h.service.up_vote(&dapp.id, 101).await);
        let projected = SAFE_MAX + 1;
        assert_eq!(err, ValidationError::CeilingExceeded { projected, ceiling: SAFE_MAX });

        h.service.up_vote(&dapp.id, 100).await.unwrap();
        let approvals = h.token.approvals();
        assert_eq!(approvals[0].call_data, DiscoverCall::Upvote(dapp.id, 100).encode());

        assert_eq!(h.service.up_vote_effect(&dapp.id, 50).await.unwrap(), 100);
    });
}

#[test]
fn downvote_must_pay_the_exact_cost() {
    smol::block_on(async {
        let h = harness();
        let dapp = listing(1, h.account, 100_100);
        let cost =
            DownvoteCost { balance_down_by: 1001, votes_required: U256::from(1719), cost: 961 };
        h.chain.push(dapp.clone());
        h.chain.state.lock().unwrap().costs.insert(dapp.id, cost);

        let err = validation(h.service.down_vote(&dapp.id, 960).await);
        assert_eq!(err, ValidationError::IncorrectDownvoteAmount { expected: 961, got: 960 });

        assert_eq!(h.service.down_vote_cost(&dapp.id).await.unwrap(), cost);
        h.service.down_vote(&dapp.id, 961).await.unwrap();
        let approvals = h.token.approvals();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].amount, 961);
        assert_eq!(approvals[0].call_data, DiscoverCall::Downvote(dapp.id, 961).encode());

        let preview = h.service.preview_downvote(&dapp.id).await.unwrap();
        assert_eq!(preview.votes_cast, U256::from(1719));
        assert_eq!(preview.effective_balance, 99_099);
    });
}

#[test]
fn only_the_developer_withdraws() {
    smol::block_on(async {
        let h = harness();
        let mine = listing(1, h.account, 1000);
        let theirs = listing(2, Address::repeat_byte(0x22), 1000);
        h.chain.push(mine.clone());
        h.chain.push(theirs.clone());

        let err = validation(h.service.withdraw(&theirs.id, 10).await);
        assert!(matches!(err, ValidationError::Unauthorized { .. }));

        let amount = mine.available + 1;
        let err = validation(h.service.withdraw(&mine.id, amount).await);
        assert_eq!(err, ValidationError::ExceedsAvailable { amount, available: mine.available });

        h.service.withdraw(&mine.id, 10).await.unwrap();
        let sent = h.chain.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(DiscoverCall::Withdraw(mine.id, 10), h.account)]);
        assert!(h.token.approvals().is_empty());
    });
}

#[test]
fn set_metadata_stores_the_new_pointer() {
    smol::block_on(async {
        let h = harness();
        let dapp = listing(1, h.account, 1000);
        h.chain.push(dapp.clone());

        let mut meta = metadata();
        meta.description = "Updated".to_string();
        h.service.set_metadata(&dapp.id, &meta).await.unwrap();

        let pointer = raw_pointer(meta.to_canonical_json().unwrap().as_bytes());
        let sent = h.chain.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(DiscoverCall::SetMetadata(dapp.id, pointer), h.account)]);
    });
}

#[test]
fn category_position_is_kept_on_update() {
    smol::block_on(async {
        let h = harness();
        let mut meta = metadata();
        meta.image = h.store.upload_image(b"png bytes").await.unwrap();
        meta.category_position = Some(2);
        let pointer = h.store.upload_metadata(&meta.to_canonical_json().unwrap()).await.unwrap();

        let mut dapp = listing(1, h.account, 1000);
        dapp.metadata = pointer;
        h.chain.push(dapp.clone());

        let mut fetched = h.service.get_dapp_data_by_id(&dapp.id).await.unwrap().metadata;
        assert_eq!(fetched.category_position, Some(2));

        fetched.description = "Updated".to_string();
        h.service.set_metadata(&dapp.id, &fetched).await.unwrap();

        let sent = h.chain.sent.lock().unwrap().clone();
        let DiscoverCall::SetMetadata(_, stored) = sent[0].0 else { panic!("{sent:?}") };
        let json = h.store.retrieve_metadata(&stored).await.unwrap();
        let stored: DAppMetadata = json.parse().unwrap();
        assert_eq!(stored.category_position, Some(2));
        assert_eq!(stored.description, "Updated");
    });
}

#[test]
fn dapp_data_resolves_the_image() {
    smol::block_on(async {
        let h = harness();
        let image = h.store.upload_image(b"png bytes").await.unwrap();
        let mut meta = metadata();
        meta.image = image.clone();
        let pointer = h.store.upload_metadata(&meta.to_canonical_json().unwrap()).await.unwrap();

        let mut dapp = listing(1, h.account, 1000);
        dapp.metadata = pointer;
        h.chain.push(dapp.clone());

        let data = h.service.get_dapp_data_by_id(&dapp.id).await.unwrap();
        assert_eq!(data.dapp, dapp);
        assert_eq!(data.metadata.name, meta.name);
        assert_eq!(data.metadata.image, format!("{GATEWAY}/ipfs/{image}"));
    });
}

#[test]
fn metadata_failure_keeps_the_record() {
    smol::block_on(async {
        let h = harness();
        let dapp = listing(1, h.account, 1000);
        h.chain.push(dapp.clone());

        match h.service.get_dapp_data_by_id(&dapp.id).await {
            Err(Error::MetadataFetch { dapp: record, .. }) => assert_eq!(*record, dapp),
            other => panic!("unexpected {other:?}"),
        }
    });
}

#[test]
fn broadcast_failure_names_the_operation() {
    smol::block_on(async {
        let token = MockToken { reject: Some("nonce too low".to_string()), ..Default::default() };
        let h = harness_with(token);
        let dapp = listing(1, h.account, 1000);
        h.chain.push(dapp.clone());

        match h.service.up_vote(&dapp.id, 10).await {
            Err(Error::Broadcast { op, reason }) => {
                assert_eq!(op, "upvote");
                assert_eq!(reason, "nonce too low");
            }
            other => panic!("unexpected {other:?}"),
        }
    });
}
