use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chain::{
    accounts::{CLAIM_CAMPAIGN_OFFSET, CLAIM_CONTRIBUTOR_OFFSET},
    build_transaction, parse_address, send_and_confirm, CampaignAccount, ChainError, ChainRpc,
    ClaimAccount, ConfirmPolicy, CrowdfundProgram, Instruction, KeyedAccount, ProgramAccount,
    Pubkey, RpcFilter, Signer,
};
use chrono::{DateTime, Duration, Utc};
use futures::TryFutureExt;
use metadata_store::{MetadataStore, StoreError};
use shared::{
    domain::Lamports,
    error::{ErrorCode, UserNotice},
    protocol::{CampaignMetadata, ClaimRecord, Social, Tier},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod catalog;
pub mod reconcile;

pub use catalog::CatalogQuery;
pub use reconcile::{
    BackedCampaign, CampaignDetail, CampaignView, Profile, Progress, RatingSummary, TierOffer,
};

/// Maximum number of images attached to a new campaign.
pub const MAX_CAMPAIGN_IMAGES: usize = 5;
/// Founder key used when the configuration does not name one.
pub const DEFAULT_FOUNDER: &str = "ER95JoXGosUKuSggpW9mNNBSr6D8RrQf6H3WAE9ztuND";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("campaign {0} not found")]
    CampaignNotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("campaign has no tier #{0}")]
    UnknownTier(usize),
    #[error("contribute exactly {expected} for this tier (got {actual})")]
    AmountMismatch { expected: Lamports, actual: Lamports },
    #[error("tier '{0}' is not available")]
    TierUnavailable(String),
    #[error("no refundable contribution to campaign {0}")]
    NotRefundable(String),
    #[error("{0} is not the founder")]
    NotFounder(Pubkey),
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Chain(err) => match err {
                ChainError::Transport(_)
                | ChainError::Rpc { .. }
                | ChainError::Response { .. }
                | ChainError::ConfirmationTimeout(_) => ErrorCode::Network,
                ChainError::AccountNotFound(_) => ErrorCode::NotFound,
                ChainError::Keypair(_) | ChainError::Signing(_) => ErrorCode::Wallet,
                ChainError::TransactionFailed { .. } => ErrorCode::Rejected,
                ChainError::InvalidAddress(_) => ErrorCode::Validation,
                ChainError::InvalidSeeds
                | ChainError::AccountData { .. }
                | ChainError::Encode(_) => ErrorCode::Internal,
            },
            ClientError::Store(err) => match err {
                StoreError::Transport(_) | StoreError::Status { .. } => ErrorCode::Network,
                StoreError::NotFound { .. } => ErrorCode::NotFound,
                StoreError::Decode { .. } | StoreError::InvalidUrl(_) => ErrorCode::Internal,
            },
            ClientError::CampaignNotFound(_) => ErrorCode::NotFound,
            ClientError::Validation(_)
            | ClientError::UnknownTier(_)
            | ClientError::AmountMismatch { .. }
            | ClientError::TierUnavailable(_)
            | ClientError::NotRefundable(_) => ErrorCode::Validation,
            ClientError::NotFounder(_) => ErrorCode::Wallet,
        }
    }

    pub fn notice(&self) -> UserNotice {
        UserNotice::new(self.code(), self.to_string())
    }
}

impl From<&ClientError> for UserNotice {
    fn from(err: &ClientError) -> Self {
        err.notice()
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignDraft {
    pub title: String,
    pub short_description: String,
    pub long_description: String,
    pub goal_sol: f64,
    pub duration_days: u64,
    pub tiers: Vec<Tier>,
    pub socials: Vec<Social>,
    pub images: Vec<ImageUpload>,
}

impl CampaignDraft {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ClientError::Validation("title must not be empty".into()));
        }
        if Lamports::from_sol(self.goal_sol) == Lamports::ZERO {
            return Err(ClientError::Validation("goal must be greater than zero".into()));
        }
        if self.duration_days == 0 {
            return Err(ClientError::Validation(
                "campaign must run for at least one day".into(),
            ));
        }
        if self.images.len() > MAX_CAMPAIGN_IMAGES {
            return Err(ClientError::Validation(format!(
                "at most {MAX_CAMPAIGN_IMAGES} images can be attached"
            )));
        }
        if let Some(tier) = self.tiers.iter().find(|tier| tier.price() == Lamports::ZERO) {
            return Err(ClientError::Validation(format!(
                "tier '{}' must cost more than zero",
                tier.title
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedCampaign {
    pub address: Pubkey,
    pub signature: String,
    pub metadata: CampaignMetadata,
}

/// Reads joined campaign views and submits the program's state transitions.
pub struct CrowdfundClient {
    rpc: Arc<dyn ChainRpc>,
    store: Arc<dyn MetadataStore>,
    program: CrowdfundProgram,
    founder: Pubkey,
    confirm: ConfirmPolicy,
}

impl CrowdfundClient {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        store: Arc<dyn MetadataStore>,
        program: CrowdfundProgram,
        founder: Pubkey,
    ) -> Self {
        Self {
            rpc,
            store,
            program,
            founder,
            confirm: ConfirmPolicy::default(),
        }
    }

    pub fn with_confirm_policy(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn program(&self) -> &CrowdfundProgram {
        &self.program
    }

    pub fn founder(&self) -> Pubkey {
        self.founder
    }

    async fn program_accounts<T: ProgramAccount>(
        &self,
        mut filters: Vec<RpcFilter>,
    ) -> Result<Vec<KeyedAccount<T>>> {
        filters.insert(0, RpcFilter::memcmp(0, T::DISCRIMINATOR));
        let raw = self
            .rpc
            .get_program_accounts(&self.program.program_id(), &filters)
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|(address, data)| match T::from_account_data(&data.data) {
                Ok(account) => Some(KeyedAccount { address, account }),
                Err(err) => {
                    warn!(%address, error = %err, "skipping undecodable account");
                    None
                }
            })
            .collect())
    }

    async fn campaign_accounts(&self) -> Result<Vec<KeyedAccount<CampaignAccount>>> {
        self.program_accounts(Vec::new()).await
    }

    async fn claims_at(&self, offset: usize, key: &Pubkey) -> Result<Vec<KeyedAccount<ClaimAccount>>> {
        self.program_accounts(vec![RpcFilter::memcmp(offset, key)])
            .await
    }

    async fn campaign_account(&self, address: &Pubkey) -> Result<CampaignAccount> {
        let data = self
            .rpc
            .get_account(address)
            .await?
            .ok_or_else(|| ClientError::CampaignNotFound(address.to_string()))?;
        Ok(CampaignAccount::from_account_data(&data.data)?)
    }

    /// Campaign states for the given addresses in one `getMultipleAccounts`
    /// round trip. Missing or undecodable accounts are left out.
    async fn campaign_states(
        &self,
        addresses: &[Pubkey],
    ) -> Result<HashMap<Pubkey, CampaignAccount>> {
        let fetched = self.rpc.get_multiple_accounts(addresses).await?;
        Ok(addresses
            .iter()
            .copied()
            .zip(fetched)
            .filter_map(|(address, account)| {
                let data = account?;
                match CampaignAccount::from_account_data(&data.data) {
                    Ok(state) => Some((address, state)),
                    Err(err) => {
                        warn!(%address, error = %err, "skipping undecodable campaign");
                        None
                    }
                }
            })
            .collect())
    }

    /// Every campaign that has both an on-chain account and a metadata row.
    pub async fn campaigns(&self, now: DateTime<Utc>) -> Result<Vec<CampaignView>> {
        let accounts = self.campaign_accounts().await?;
        let ids: Vec<String> = accounts.iter().map(|keyed| keyed.address.to_string()).collect();
        let rows = self.store.campaigns_by_ids(&ids).await?;
        Ok(reconcile::join_campaigns(accounts, rows, now))
    }

    pub async fn explore(&self, query: &CatalogQuery, now: DateTime<Utc>) -> Result<Vec<CampaignView>> {
        Ok(catalog::explore(self.campaigns(now).await?, query, now))
    }

    pub async fn archived(&self, now: DateTime<Utc>) -> Result<Vec<CampaignView>> {
        Ok(catalog::archived(self.campaigns(now).await?, now))
    }

    pub async fn campaign_detail(&self, address: &Pubkey, now: DateTime<Utc>) -> Result<CampaignDetail> {
        let id = address.to_string();
        let (metadata, state, backers, ratings) = futures::try_join!(
            self.store
                .campaign_by_id(&id)
                .map_err(|err| match err {
                    StoreError::NotFound { .. } => ClientError::CampaignNotFound(id.clone()),
                    other => other.into(),
                }),
            self.campaign_account(address),
            self.claims_at(CLAIM_CAMPAIGN_OFFSET, address),
            self.store.ratings_for_campaign(&id).err_into::<ClientError>(),
        )?;
        let campaign = CampaignView::new(*address, metadata, state, now);
        Ok(CampaignDetail::new(campaign, backers, ratings))
    }

    pub async fn profile(&self, wallet: &Pubkey, now: DateTime<Utc>) -> Result<Profile> {
        let owner = wallet.to_string();
        let (owned_rows, claims) = futures::try_join!(
            self.store.campaigns_by_owner(&owner).err_into::<ClientError>(),
            self.claims_at(CLAIM_CONTRIBUTOR_OFFSET, wallet),
        )?;

        let mut addresses: Vec<Pubkey> = Vec::new();
        let mut seen = HashSet::new();
        let owned: Vec<(Pubkey, CampaignMetadata)> = owned_rows
            .into_iter()
            .filter_map(|row| match parse_address(&row.id) {
                Ok(address) => Some((address, row)),
                Err(_) => {
                    debug!(id = %row.id, "dropping metadata row with invalid address");
                    None
                }
            })
            .collect();
        for address in owned
            .iter()
            .map(|(address, _)| *address)
            .chain(claims.iter().map(|claim| claim.account.campaign))
        {
            if seen.insert(address) {
                addresses.push(address);
            }
        }

        let backed_ids: Vec<String> = claims
            .iter()
            .map(|claim| claim.account.campaign.to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let (states, backed_rows) = futures::try_join!(
            self.campaign_states(&addresses),
            self.store.campaigns_by_ids(&backed_ids).err_into::<ClientError>(),
        )?;
        let mut backed_meta: HashMap<String, CampaignMetadata> = backed_rows
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        let mut created = Vec::new();
        let mut unconfirmed = Vec::new();
        for (address, metadata) in owned {
            match states.get(&address) {
                Some(state) => created.push(CampaignView::new(address, metadata, state.clone(), now)),
                None => {
                    debug!(%address, "owned campaign has no on-chain account");
                    unconfirmed.push(metadata);
                }
            }
        }

        let backed = claims
            .into_iter()
            .filter_map(|claim| {
                let campaign = claim.account.campaign;
                let metadata = backed_meta.remove(&campaign.to_string());
                match (metadata, states.get(&campaign)) {
                    (Some(metadata), Some(state)) => {
                        let view = CampaignView::new(campaign, metadata, state.clone(), now);
                        Some(BackedCampaign::new(view, claim, now))
                    }
                    _ => {
                        debug!(%campaign, "dropping backed campaign without metadata or state");
                        None
                    }
                }
            })
            .collect();

        Ok(Profile {
            wallet: *wallet,
            created,
            unconfirmed,
            backed,
        })
    }

    async fn submit(&self, signer: &dyn Signer, instruction: Instruction) -> Result<String> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction = build_transaction(&[instruction], signer, blockhash)?;
        let signature = send_and_confirm(self.rpc.as_ref(), &transaction, self.confirm).await?;
        info!(%signature, "transaction confirmed");
        Ok(signature)
    }

    /// Initializes the campaign on chain, then stores images and metadata.
    pub async fn create_campaign(
        &self,
        signer: &dyn Signer,
        draft: CampaignDraft,
        now: DateTime<Utc>,
    ) -> Result<CreatedCampaign> {
        draft.validate()?;
        let days = i64::try_from(draft.duration_days)
            .ok()
            .and_then(Duration::try_days)
            .ok_or_else(|| ClientError::Validation("campaign duration is too long".into()))?;
        let expiration = now
            .checked_add_signed(days)
            .ok_or_else(|| ClientError::Validation("campaign duration is too long".into()))?;
        let owner = signer.pubkey();
        let campaign_id = Uuid::new_v4().simple().to_string();
        let address = self.program.campaign_address(&owner, &campaign_id)?;
        let instruction = self.program.initialize(
            &owner,
            &campaign_id,
            Lamports::from_sol(draft.goal_sol),
            draft.duration_days,
        )?;
        let signature = self.submit(signer, instruction).await?;

        let folder = format!("campaign-{address}");
        let mut image_urls = Vec::new();
        for image in draft.images {
            match self
                .store
                .upload_image(&folder, &image.file_name, image.bytes, &image.content_type)
                .await
            {
                Ok(url) => image_urls.push(url),
                Err(err) => {
                    warn!(file = %image.file_name, error = %err, "image upload failed, skipping")
                }
            }
        }

        let metadata = CampaignMetadata {
            id: address.to_string(),
            campaign_id,
            owner: owner.to_string(),
            title: draft.title,
            short_description: draft.short_description,
            long_description: draft.long_description,
            image_url: image_urls.first().cloned().unwrap_or_default(),
            image_urls,
            tiers: draft.tiers,
            socials: draft.socials,
            goal_sol: draft.goal_sol,
            campaign_length: days.num_days(),
            expiration,
            days_left: None,
            created_at: None,
        };
        self.store.insert_campaign(&metadata).await?;
        info!(%address, "campaign created");
        Ok(CreatedCampaign {
            address,
            signature,
            metadata,
        })
    }

    /// Buys tier `tier_index` of a campaign. `amount` must equal the tier price.
    pub async fn contribute(
        &self,
        signer: &dyn Signer,
        campaign: &Pubkey,
        tier_index: usize,
        amount: Lamports,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let id = campaign.to_string();
        let (metadata, state) = futures::try_join!(
            self.store.campaign_by_id(&id).err_into::<ClientError>(),
            self.campaign_account(campaign),
        )?;
        let view = CampaignView::new(*campaign, metadata, state, now);
        let tier = view
            .metadata
            .tiers
            .get(tier_index)
            .ok_or(ClientError::UnknownTier(tier_index))?;
        if amount != tier.price() {
            return Err(ClientError::AmountMismatch {
                expected: tier.price(),
                actual: amount,
            });
        }
        if !view.tier_available(tier) {
            return Err(ClientError::TierUnavailable(tier.title.clone()));
        }

        let contributor = signer.pubkey();
        let instruction = self.program.contribute(
            campaign,
            &view.state.owner,
            &contributor,
            amount,
            tier.nft_reward_count,
        )?;
        let signature = self.submit(signer, instruction).await?;

        let record = ClaimRecord {
            campaign_id: view.metadata.campaign_id.clone(),
            contributor: contributor.to_string(),
            amount: amount.0,
            nfts_due: tier.nft_reward_count,
            refunded: false,
        };
        if let Err(err) = self.store.upsert_claim(&record).await {
            warn!(%campaign, error = %err, "failed to record claim off-chain");
        }
        Ok(signature)
    }

    pub async fn finalize(&self, signer: &dyn Signer, campaign: &Pubkey) -> Result<String> {
        let state = self.campaign_account(campaign).await?;
        let instruction = self
            .program
            .finalize(campaign, &state.owner, &signer.pubkey())?;
        self.submit(signer, instruction).await
    }

    pub async fn claim_refund(
        &self,
        signer: &dyn Signer,
        campaign: &Pubkey,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let contributor = signer.pubkey();
        let claim_address = self.program.claim_address(campaign, &contributor)?;
        let (state, claim) = futures::try_join!(
            self.campaign_account(campaign),
            self.rpc.get_account(&claim_address).err_into::<ClientError>(),
        )?;
        let claim = match claim {
            Some(data) => ClaimAccount::from_account_data(&data.data)?,
            None => return Err(ClientError::NotRefundable(campaign.to_string())),
        };
        if !reconcile::refund_eligible(&state, &claim, now) {
            return Err(ClientError::NotRefundable(campaign.to_string()));
        }
        let instruction = self.program.claim_refund(campaign, &contributor)?;
        self.submit(signer, instruction).await
    }

    pub async fn founder_vault_balance(&self) -> Result<Lamports> {
        let vault = self.program.founder_vault_address()?;
        Ok(self.rpc.get_balance(&vault).await?)
    }

    pub async fn founder_withdraw(&self, signer: &dyn Signer) -> Result<String> {
        let founder = signer.pubkey();
        if founder != self.founder {
            return Err(ClientError::NotFounder(founder));
        }
        let instruction = self.program.founder_withdraw(&founder)?;
        self.submit(signer, instruction).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
