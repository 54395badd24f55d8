use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use chain::{
    accounts::encode_account, transaction_signature, AccountData, Commitment, Hash, Keypair,
    SignatureStatus, Transaction,
};
use chrono::TimeZone;
use serde_json::{json, Value};
use shared::protocol::RatingRow;
use tokio::sync::Mutex;

use super::*;

const NOW: i64 = 1_750_000_000;
const DAY: i64 = 86_400;

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(NOW, 0).single().expect("timestamp")
}

fn program_id() -> Pubkey {
    Pubkey::new_from_array([42u8; 32])
}

#[derive(Default)]
struct FakeChain {
    accounts: Mutex<HashMap<Pubkey, AccountData>>,
    balances: Mutex<HashMap<Pubkey, u64>>,
    sent: Mutex<Vec<Transaction>>,
    reject_with: Option<Value>,
    single_reads: AtomicUsize,
    batch_reads: AtomicUsize,
}

impl FakeChain {
    fn rejecting(err: Value) -> Self {
        Self {
            reject_with: Some(err),
            ..Self::default()
        }
    }

    async fn put(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().await.insert(
            address,
            AccountData {
                lamports: 1_000_000,
                owner: program_id(),
                data,
                executable: false,
            },
        );
    }

    async fn sent_instruction_data(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|tx| tx.message.instructions[0].data.clone())
            .collect()
    }
}

fn matches_filter(data: &[u8], filter: &RpcFilter) -> bool {
    match filter {
        RpcFilter::Memcmp { offset, bytes } => data
            .get(*offset..*offset + bytes.len())
            .map_or(false, |window| window == bytes.as_slice()),
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn get_program_accounts(
        &self,
        program: &Pubkey,
        filters: &[RpcFilter],
    ) -> chain::Result<Vec<(Pubkey, AccountData)>> {
        let accounts = self.accounts.lock().await;
        let mut matched: Vec<(Pubkey, AccountData)> = accounts
            .iter()
            .filter(|(_, data)| {
                data.owner == *program && filters.iter().all(|f| matches_filter(&data.data, f))
            })
            .map(|(address, data)| (*address, data.clone()))
            .collect();
        matched.sort_by_key(|(address, _)| *address);
        Ok(matched)
    }

    async fn get_account(&self, address: &Pubkey) -> chain::Result<Option<AccountData>> {
        self.single_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().await.get(address).cloned())
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> chain::Result<Vec<Option<AccountData>>> {
        self.batch_reads.fetch_add(1, Ordering::SeqCst);
        let accounts = self.accounts.lock().await;
        Ok(addresses.iter().map(|a| accounts.get(a).cloned()).collect())
    }

    async fn get_balance(&self, address: &Pubkey) -> chain::Result<Lamports> {
        Ok(Lamports(
            self.balances.lock().await.get(address).copied().unwrap_or(0),
        ))
    }

    async fn get_latest_blockhash(&self) -> chain::Result<Hash> {
        Ok(Hash::new_from_array([3u8; 32]))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> chain::Result<String> {
        self.sent.lock().await.push(transaction.clone());
        Ok(transaction_signature(transaction))
    }

    async fn get_signature_status(
        &self,
        _signature: &str,
    ) -> chain::Result<Option<SignatureStatus>> {
        Ok(Some(SignatureStatus {
            slot: 10,
            err: self.reject_with.clone(),
            confirmation_status: Some(Commitment::Finalized),
        }))
    }
}

#[derive(Default)]
struct FakeStore {
    campaigns: Mutex<Vec<CampaignMetadata>>,
    ratings: Mutex<Vec<RatingRow>>,
    claims: Mutex<Vec<ClaimRecord>>,
    uploads: Mutex<Vec<String>>,
    failing_upload: Option<String>,
    fail_claims: bool,
}

fn store_error() -> StoreError {
    StoreError::Status {
        status: 503,
        body: "unavailable".into(),
    }
}

#[async_trait]
impl MetadataStore for FakeStore {
    async fn campaigns_by_ids(&self, ids: &[String]) -> metadata_store::Result<Vec<CampaignMetadata>> {
        Ok(self
            .campaigns
            .lock()
            .await
            .iter()
            .filter(|row| ids.contains(&row.id))
            .cloned()
            .collect())
    }

    async fn campaign_by_id(&self, id: &str) -> metadata_store::Result<CampaignMetadata> {
        self.campaigns
            .lock()
            .await
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                table: "campaigns",
                column: "id",
                value: id.to_string(),
            })
    }

    async fn campaigns_by_owner(&self, owner: &str) -> metadata_store::Result<Vec<CampaignMetadata>> {
        Ok(self
            .campaigns
            .lock()
            .await
            .iter()
            .filter(|row| row.owner == owner)
            .cloned()
            .collect())
    }

    async fn insert_campaign(&self, row: &CampaignMetadata) -> metadata_store::Result<()> {
        self.campaigns.lock().await.push(row.clone());
        Ok(())
    }

    async fn ratings_for_campaign(&self, campaign_id: &str) -> metadata_store::Result<Vec<RatingRow>> {
        Ok(self
            .ratings
            .lock()
            .await
            .iter()
            .filter(|row| row.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn upsert_claim(&self, claim: &ClaimRecord) -> metadata_store::Result<()> {
        if self.fail_claims {
            return Err(store_error());
        }
        self.claims.lock().await.push(claim.clone());
        Ok(())
    }

    async fn upload_image(
        &self,
        folder: &str,
        file_name: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> metadata_store::Result<String> {
        if self.failing_upload.as_deref() == Some(file_name) {
            return Err(store_error());
        }
        let url = format!("https://cdn.test/{folder}/{file_name}");
        self.uploads.lock().await.push(url.clone());
        Ok(url)
    }
}

struct Harness {
    chain: Arc<FakeChain>,
    store: Arc<FakeStore>,
    client: CrowdfundClient,
    founder: Keypair,
}

impl Harness {
    fn new(chain: FakeChain, store: FakeStore) -> Self {
        let chain = Arc::new(chain);
        let store = Arc::new(store);
        let founder = Keypair::new();
        let client = CrowdfundClient::new(
            chain.clone(),
            store.clone(),
            CrowdfundProgram::new(program_id()),
            founder.pubkey(),
        )
        .with_confirm_policy(ConfirmPolicy {
            attempts: 1,
            delay: std::time::Duration::ZERO,
            ..ConfirmPolicy::default()
        });
        Self {
            chain,
            store,
            client,
            founder,
        }
    }

    fn empty() -> Self {
        Self::new(FakeChain::default(), FakeStore::default())
    }

    /// Seeds a campaign account and, when `with_metadata`, its metadata row.
    async fn campaign(
        &self,
        owner: &Pubkey,
        seed: &str,
        goal: u64,
        raised: u64,
        deadline: i64,
        with_metadata: bool,
    ) -> Pubkey {
        let address = self
            .client
            .program()
            .campaign_address(owner, seed)
            .expect("campaign address");
        let state = CampaignAccount {
            owner: *owner,
            goal,
            amount_raised: raised,
            deadline,
            finalized: false,
        };
        self.chain.put(address, encode_account(&state)).await;
        if with_metadata {
            self.store
                .campaigns
                .lock()
                .await
                .push(metadata_row(&address, owner, seed));
        }
        address
    }

    async fn claim(&self, campaign: &Pubkey, contributor: &Pubkey, amount: u64, refunded: bool) {
        let address = self
            .client
            .program()
            .claim_address(campaign, contributor)
            .expect("claim address");
        self.chain
            .put(
                address,
                encode_account(&ClaimAccount {
                    campaign: *campaign,
                    contributor: *contributor,
                    amount,
                    refunded,
                }),
            )
            .await;
    }
}

fn metadata_row(address: &Pubkey, owner: &Pubkey, seed: &str) -> CampaignMetadata {
    CampaignMetadata {
        id: address.to_string(),
        campaign_id: seed.to_string(),
        owner: owner.to_string(),
        title: format!("Campaign {seed}"),
        short_description: String::new(),
        long_description: String::new(),
        image_url: String::new(),
        image_urls: Vec::new(),
        tiers: vec![
            Tier {
                amount: 1.0,
                title: "Backer".into(),
                description: String::new(),
                nft_reward_count: 1,
            },
            Tier {
                amount: 5.0,
                title: "Patron".into(),
                description: String::new(),
                nft_reward_count: 3,
            },
        ],
        socials: Vec::new(),
        goal_sol: 10.0,
        campaign_length: 10,
        expiration: now() + Duration::days(10),
        days_left: None,
        created_at: None,
    }
}

const SOL: u64 = 1_000_000_000;

#[tokio::test]
async fn explore_joins_chain_and_metadata() {
    let harness = Harness::empty();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let listed = harness
        .campaign(&owner, "listed", 10 * SOL, 4 * SOL, NOW + 5 * DAY, true)
        .await;
    harness
        .campaign(&owner, "orphan", 10 * SOL, 0, NOW + 5 * DAY, false)
        .await;

    let views = harness
        .client
        .explore(&CatalogQuery::default(), now())
        .await
        .expect("explore");
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].address, listed);
    assert_eq!(views[0].progress.percent_funded, 40.0);
    assert_eq!(views[0].progress.days_left, 5);

    assert!(harness.client.archived(now()).await.expect("archived").is_empty());
}

#[tokio::test]
async fn detail_collects_backers_and_ratings() {
    let harness = Harness::empty();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let campaign = harness
        .campaign(&owner, "detail", 10 * SOL, 2 * SOL, NOW + DAY, true)
        .await;
    let other = harness
        .campaign(&owner, "other", 10 * SOL, SOL, NOW + DAY, true)
        .await;
    harness
        .claim(&campaign, &Pubkey::new_from_array([5u8; 32]), SOL, false)
        .await;
    harness
        .claim(&campaign, &Pubkey::new_from_array([6u8; 32]), SOL, false)
        .await;
    harness
        .claim(&other, &Pubkey::new_from_array([5u8; 32]), SOL, false)
        .await;
    harness.store.ratings.lock().await.extend([
        RatingRow {
            id: "1".into(),
            campaign_id: campaign.to_string(),
            comment: "great".into(),
            contributor: "a".into(),
            score: 5,
            created_at: None,
        },
        RatingRow {
            id: "2".into(),
            campaign_id: campaign.to_string(),
            comment: String::new(),
            contributor: "b".into(),
            score: 2,
            created_at: None,
        },
    ]);

    let detail = harness
        .client
        .campaign_detail(&campaign, now())
        .await
        .expect("detail");
    assert_eq!(detail.backers.len(), 2);
    assert!(detail
        .backers
        .iter()
        .all(|claim| claim.account.campaign == campaign));
    assert_eq!(detail.rating_summary.count, 2);
    assert_eq!(detail.rating_summary.average, Some(3.5));
    assert!(detail.tiers.iter().all(|offer| offer.available));
    assert!(detail.campaign.progress.almost_up);
}

#[tokio::test]
async fn detail_without_metadata_is_not_found() {
    let harness = Harness::empty();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let campaign = harness
        .campaign(&owner, "hidden", 10 * SOL, 0, NOW + DAY, false)
        .await;

    let err = harness
        .client
        .campaign_detail(&campaign, now())
        .await
        .expect_err("missing metadata");
    assert!(matches!(err, ClientError::CampaignNotFound(_)));
    assert_eq!(err.notice().code, ErrorCode::NotFound);
}

#[tokio::test]
async fn profile_splits_created_backed_and_refundable() {
    let harness = Harness::empty();
    let wallet = Pubkey::new_from_array([7u8; 32]);
    let stranger = Pubkey::new_from_array([8u8; 32]);

    let mine = harness
        .campaign(&wallet, "mine", 10 * SOL, 0, NOW + DAY, true)
        .await;
    let failed = harness
        .campaign(&stranger, "failed", 10 * SOL, 3 * SOL, NOW - DAY, true)
        .await;
    let running = harness
        .campaign(&stranger, "running", 10 * SOL, 3 * SOL, NOW + DAY, true)
        .await;
    let unlisted = harness
        .campaign(&stranger, "unlisted", 10 * SOL, 3 * SOL, NOW - DAY, false)
        .await;
    harness.claim(&failed, &wallet, SOL, false).await;
    harness.claim(&running, &wallet, SOL, false).await;
    harness.claim(&unlisted, &wallet, SOL, false).await;
    harness.claim(&running, &stranger, SOL, false).await;
    let draft_address = Pubkey::new_from_array([30u8; 32]);
    harness
        .store
        .campaigns
        .lock()
        .await
        .push(metadata_row(&draft_address, &wallet, "draft"));

    let profile = harness.client.profile(&wallet, now()).await.expect("profile");
    assert_eq!(profile.created.len(), 1);
    assert_eq!(profile.created[0].address, mine);
    assert_eq!(profile.unconfirmed.len(), 1);
    assert_eq!(profile.unconfirmed[0].id, draft_address.to_string());

    // Campaign states come from a single batched read.
    assert_eq!(harness.chain.batch_reads.load(Ordering::SeqCst), 1);
    assert_eq!(harness.chain.single_reads.load(Ordering::SeqCst), 0);

    let mut backed: Vec<Pubkey> = profile.backed.iter().map(|b| b.campaign.address).collect();
    backed.sort();
    let mut expected = vec![failed, running];
    expected.sort();
    assert_eq!(backed, expected);

    let refundable: Vec<Pubkey> = profile.refundable().map(|b| b.campaign.address).collect();
    assert_eq!(refundable, vec![failed]);
}

#[tokio::test]
async fn contribute_requires_exact_tier_amount() {
    let harness = Harness::empty();
    let backer = Keypair::new();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let campaign = harness
        .campaign(&owner, "exact", 10 * SOL, 0, NOW + DAY, true)
        .await;

    let err = harness
        .client
        .contribute(&backer, &campaign, 0, Lamports(SOL / 2), now())
        .await
        .expect_err("mismatch");
    assert!(matches!(err, ClientError::AmountMismatch { .. }));
    assert_eq!(err.notice().code, ErrorCode::Validation);

    let err = harness
        .client
        .contribute(&backer, &campaign, 7, Lamports(SOL), now())
        .await
        .expect_err("unknown tier");
    assert!(matches!(err, ClientError::UnknownTier(7)));
    assert!(harness.chain.sent.lock().await.is_empty());
}

#[tokio::test]
async fn contribute_submits_and_records_claim() {
    let harness = Harness::empty();
    let backer = Keypair::new();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let campaign = harness
        .campaign(&owner, "backme", 10 * SOL, 0, NOW + DAY, true)
        .await;

    let signature = harness
        .client
        .contribute(&backer, &campaign, 1, Lamports(5 * SOL), now())
        .await
        .expect("contribute");

    let expected = harness
        .client
        .program()
        .contribute(&campaign, &owner, &backer.pubkey(), Lamports(5 * SOL), 3)
        .expect("ix");
    assert_eq!(harness.chain.sent_instruction_data().await, vec![expected.data]);
    assert_eq!(transaction_signature(&harness.chain.sent.lock().await[0]), signature);

    let claims = harness.store.claims.lock().await;
    assert_eq!(
        claims.as_slice(),
        &[ClaimRecord {
            campaign_id: "backme".into(),
            contributor: backer.pubkey().to_string(),
            amount: 5 * SOL,
            nfts_due: 3,
            refunded: false,
        }]
    );
}

#[tokio::test]
async fn contribute_rejects_tier_that_overshoots_goal() {
    let harness = Harness::empty();
    let backer = Keypair::new();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let campaign = harness
        .campaign(&owner, "full", 10 * SOL, 8 * SOL, NOW + DAY, true)
        .await;

    let err = harness
        .client
        .contribute(&backer, &campaign, 1, Lamports(5 * SOL), now())
        .await
        .expect_err("over goal");
    assert!(matches!(err, ClientError::TierUnavailable(_)));
}

#[tokio::test]
async fn claim_mirror_failure_does_not_fail_contribution() {
    let harness = Harness::new(
        FakeChain::default(),
        FakeStore {
            fail_claims: true,
            ..FakeStore::default()
        },
    );
    let backer = Keypair::new();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let campaign = harness
        .campaign(&owner, "mirror", 10 * SOL, 0, NOW + DAY, true)
        .await;

    harness
        .client
        .contribute(&backer, &campaign, 0, Lamports(SOL), now())
        .await
        .expect("contribution stands");
    assert_eq!(harness.chain.sent.lock().await.len(), 1);
}

fn draft(images: usize) -> CampaignDraft {
    CampaignDraft {
        title: "Pixel Genesis".into(),
        short_description: "Original pixel series".into(),
        long_description: String::new(),
        goal_sol: 12.5,
        duration_days: 14,
        tiers: vec![Tier {
            amount: 0.5,
            title: "Supporter".into(),
            description: String::new(),
            nft_reward_count: 1,
        }],
        socials: Vec::new(),
        images: (0..images)
            .map(|i| ImageUpload {
                file_name: format!("{i}.png"),
                content_type: "image/png".into(),
                bytes: vec![i as u8],
            })
            .collect(),
    }
}

#[tokio::test]
async fn create_campaign_initializes_uploads_and_inserts_metadata() {
    let harness = Harness::new(
        FakeChain::default(),
        FakeStore {
            failing_upload: Some("0.png".into()),
            ..FakeStore::default()
        },
    );
    let creator = Keypair::new();

    let created = harness
        .client
        .create_campaign(&creator, draft(3), now())
        .await
        .expect("create");

    let campaign_id = &created.metadata.campaign_id;
    assert_eq!(campaign_id.len(), 32);
    assert_eq!(
        created.address,
        harness
            .client
            .program()
            .campaign_address(&creator.pubkey(), campaign_id)
            .expect("address")
    );

    let expected = harness
        .client
        .program()
        .initialize(&creator.pubkey(), campaign_id, Lamports(12_500_000_000), 14)
        .expect("ix");
    assert_eq!(harness.chain.sent_instruction_data().await, vec![expected.data]);

    let folder = format!("campaign-{}", created.address);
    assert_eq!(
        created.metadata.image_urls,
        vec![
            format!("https://cdn.test/{folder}/1.png"),
            format!("https://cdn.test/{folder}/2.png"),
        ]
    );
    assert_eq!(created.metadata.image_url, created.metadata.image_urls[0]);
    assert_eq!(created.metadata.expiration, now() + Duration::days(14));
    assert_eq!(created.metadata.campaign_length, 14);
    assert_eq!(created.metadata.id, created.address.to_string());

    let stored = harness.store.campaigns.lock().await;
    assert_eq!(stored.as_slice(), &[created.metadata.clone()]);
}

#[tokio::test]
async fn create_campaign_validates_before_submitting() {
    let harness = Harness::empty();
    let creator = Keypair::new();

    let err = harness
        .client
        .create_campaign(&creator, draft(MAX_CAMPAIGN_IMAGES + 1), now())
        .await
        .expect_err("too many images");
    assert!(matches!(err, ClientError::Validation(_)));

    let mut zero_goal = draft(0);
    zero_goal.goal_sol = 0.0;
    assert!(harness
        .client
        .create_campaign(&creator, zero_goal, now())
        .await
        .is_err());
    assert!(harness.chain.sent.lock().await.is_empty());
}

#[tokio::test]
async fn refund_only_when_eligible() {
    let harness = Harness::empty();
    let backer = Keypair::new();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let failed = harness
        .campaign(&owner, "failed", 10 * SOL, SOL, NOW - DAY, true)
        .await;
    let running = harness
        .campaign(&owner, "running", 10 * SOL, SOL, NOW + DAY, true)
        .await;
    harness.claim(&failed, &backer.pubkey(), SOL, false).await;
    harness.claim(&running, &backer.pubkey(), SOL, false).await;

    let err = harness
        .client
        .claim_refund(&backer, &running, now())
        .await
        .expect_err("still running");
    assert!(matches!(err, ClientError::NotRefundable(_)));

    let stranger = Keypair::new();
    assert!(harness
        .client
        .claim_refund(&stranger, &failed, now())
        .await
        .is_err());

    harness
        .client
        .claim_refund(&backer, &failed, now())
        .await
        .expect("refund");
    let expected = harness
        .client
        .program()
        .claim_refund(&failed, &backer.pubkey())
        .expect("ix");
    assert_eq!(harness.chain.sent_instruction_data().await, vec![expected.data]);
}

#[tokio::test]
async fn finalize_targets_campaign_owner() {
    let harness = Harness::empty();
    let caller = Keypair::new();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let campaign = harness
        .campaign(&owner, "done", 10 * SOL, 10 * SOL, NOW - DAY, true)
        .await;

    harness
        .client
        .finalize(&caller, &campaign)
        .await
        .expect("finalize");
    let sent = harness.chain.sent.lock().await;
    assert!(sent[0].message.account_keys.contains(&owner));
    assert_eq!(sent[0].message.account_keys[0], caller.pubkey());
}

#[tokio::test]
async fn founder_actions_are_gated_on_founder_key() {
    let harness = Harness::empty();
    let vault = harness
        .client
        .program()
        .founder_vault_address()
        .expect("vault");
    harness.chain.balances.lock().await.insert(vault, 3 * SOL);
    assert_eq!(
        harness.client.founder_vault_balance().await.expect("balance"),
        Lamports(3 * SOL)
    );

    let intruder = Keypair::new();
    let err = harness
        .client
        .founder_withdraw(&intruder)
        .await
        .expect_err("not founder");
    assert!(matches!(err, ClientError::NotFounder(_)));
    assert_eq!(err.notice().code, ErrorCode::Wallet);

    harness
        .client
        .founder_withdraw(&harness.founder)
        .await
        .expect("withdraw");
    assert_eq!(harness.chain.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn failed_transaction_surfaces_as_rejected_notice() {
    let harness = Harness::new(
        FakeChain::rejecting(json!({ "InstructionError": [0, { "Custom": 6001 }] })),
        FakeStore::default(),
    );
    let caller = Keypair::new();
    let owner = Pubkey::new_from_array([1u8; 32]);
    let campaign = harness
        .campaign(&owner, "early", 10 * SOL, 0, NOW + DAY, true)
        .await;

    let err = harness
        .client
        .finalize(&caller, &campaign)
        .await
        .expect_err("rejected");
    let notice = err.notice();
    assert_eq!(notice.code, ErrorCode::Rejected);
    assert!(notice.to_string().starts_with("Transaction failed"));
    assert!(notice.message.contains("6001"));
}

#[test]
fn every_chain_error_has_a_notice_code() {
    let code = |err: ChainError| ClientError::from(err).code();
    assert_eq!(code(ChainError::Signing("mismatch".into())), ErrorCode::Wallet);
    assert_eq!(code(ChainError::Keypair("unreadable".into())), ErrorCode::Wallet);
    assert_eq!(code(ChainError::InvalidAddress("x".into())), ErrorCode::Validation);
    assert_eq!(code(ChainError::ConfirmationTimeout("sig".into())), ErrorCode::Network);
    assert_eq!(code(ChainError::InvalidSeeds), ErrorCode::Internal);
    assert_eq!(code(ChainError::Encode("bad".into())), ErrorCode::Internal);
    assert_eq!(
        code(ChainError::AccountData {
            account: "Campaign",
            reason: "short".into(),
        }),
        ErrorCode::Internal
    );

    let decode = ClientError::from(StoreError::Decode {
        table: "campaigns",
        reason: "not an array".into(),
    });
    assert_eq!(decode.code(), ErrorCode::Internal);
}
