//! Joins on-chain campaign state with metadata rows and derives the fields
//! every view displays. Pure functions of their inputs and `now`.

use std::collections::HashMap;

use chain::{address::base58, CampaignAccount, ClaimAccount, KeyedAccount, Pubkey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{CampaignStatus, Lamports},
    protocol::{CampaignMetadata, RatingRow, Tier},
};
use tracing::debug;

pub const SECONDS_PER_DAY: i64 = 86_400;
/// Campaigns with fewer whole days than this left are flagged as almost up.
pub const ALMOST_UP_DAYS: i64 = 3;

pub fn percent_funded(raised: Lamports, goal: Lamports) -> f64 {
    if goal.0 == 0 {
        return 100.0;
    }
    (raised.0 as f64 / goal.0 as f64).min(1.0) * 100.0
}

pub fn campaign_status(account: &CampaignAccount, now: DateTime<Utc>) -> CampaignStatus {
    if now.timestamp() > account.deadline {
        if account.raised() >= account.goal() {
            CampaignStatus::Funded
        } else {
            CampaignStatus::Failed
        }
    } else {
        CampaignStatus::Ongoing
    }
}

pub fn days_left(deadline: i64, now: DateTime<Utc>) -> i64 {
    let remaining = deadline - now.timestamp();
    if remaining <= 0 {
        return 0;
    }
    (remaining + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

/// Claims can be refunded once a campaign has missed its goal past the deadline.
pub fn refund_eligible(
    campaign: &CampaignAccount,
    claim: &ClaimAccount,
    now: DateTime<Utc>,
) -> bool {
    campaign_status(campaign, now) == CampaignStatus::Failed && !claim.refunded
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub percent_funded: f64,
    pub status: CampaignStatus,
    pub days_left: i64,
    pub almost_up: bool,
}

impl Progress {
    pub fn evaluate(account: &CampaignAccount, now: DateTime<Utc>) -> Self {
        let status = campaign_status(account, now);
        let remaining = account.deadline - now.timestamp();
        let funded = account.raised() >= account.goal();
        Self {
            percent_funded: percent_funded(account.raised(), account.goal()),
            status,
            days_left: days_left(account.deadline, now),
            almost_up: !funded && remaining > 0 && remaining / SECONDS_PER_DAY < ALMOST_UP_DAYS,
        }
    }
}

/// A campaign as displayed: metadata joined with its on-chain account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignView {
    #[serde(with = "base58")]
    pub address: Pubkey,
    pub metadata: CampaignMetadata,
    pub state: CampaignAccount,
    pub progress: Progress,
}

impl CampaignView {
    pub fn new(
        address: Pubkey,
        metadata: CampaignMetadata,
        state: CampaignAccount,
        now: DateTime<Utc>,
    ) -> Self {
        let progress = Progress::evaluate(&state, now);
        Self {
            address,
            metadata,
            state,
            progress,
        }
    }

    /// A tier can be bought while the campaign runs and the purchase does
    /// not push the raised amount past the goal.
    pub fn tier_available(&self, tier: &Tier) -> bool {
        self.progress.status == CampaignStatus::Ongoing
            && self.state.raised().saturating_add(tier.price()) <= self.state.goal()
    }

    pub fn tier_offers(&self) -> Vec<TierOffer> {
        self.metadata
            .tiers
            .iter()
            .map(|tier| TierOffer {
                available: self.tier_available(tier),
                tier: tier.clone(),
            })
            .collect()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.metadata.expiration <= now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierOffer {
    pub tier: Tier,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RatingSummary {
    pub count: usize,
    pub average: Option<f64>,
}

impl RatingSummary {
    pub fn from_rows(rows: &[RatingRow]) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let total: u64 = rows.iter().map(|row| u64::from(row.score)).sum();
        Self {
            count: rows.len(),
            average: Some(total as f64 / rows.len() as f64),
        }
    }
}

/// Pairs each on-chain campaign with the metadata row keyed by its address.
/// Accounts without a row are dropped. Account order is preserved.
pub fn join_campaigns(
    accounts: Vec<KeyedAccount<CampaignAccount>>,
    rows: Vec<CampaignMetadata>,
    now: DateTime<Utc>,
) -> Vec<CampaignView> {
    let mut by_id: HashMap<String, CampaignMetadata> =
        rows.into_iter().map(|row| (row.id.clone(), row)).collect();
    accounts
        .into_iter()
        .filter_map(|keyed| match by_id.remove(&keyed.address.to_string()) {
            Some(metadata) => Some(CampaignView::new(keyed.address, metadata, keyed.account, now)),
            None => {
                debug!(address = %keyed.address, "dropping campaign without metadata");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignDetail {
    pub campaign: CampaignView,
    pub tiers: Vec<TierOffer>,
    pub backers: Vec<KeyedAccount<ClaimAccount>>,
    pub ratings: Vec<RatingRow>,
    pub rating_summary: RatingSummary,
}

impl CampaignDetail {
    pub fn new(
        campaign: CampaignView,
        backers: Vec<KeyedAccount<ClaimAccount>>,
        ratings: Vec<RatingRow>,
    ) -> Self {
        Self {
            tiers: campaign.tier_offers(),
            rating_summary: RatingSummary::from_rows(&ratings),
            campaign,
            backers,
            ratings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackedCampaign {
    pub campaign: CampaignView,
    pub claim: KeyedAccount<ClaimAccount>,
    pub refundable: bool,
}

impl BackedCampaign {
    pub fn new(campaign: CampaignView, claim: KeyedAccount<ClaimAccount>, now: DateTime<Utc>) -> Self {
        let refundable = refund_eligible(&campaign.state, &claim.account, now);
        Self {
            campaign,
            claim,
            refundable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    #[serde(with = "base58")]
    pub wallet: Pubkey,
    pub created: Vec<CampaignView>,
    /// Metadata rows owned by the wallet whose campaign account does not
    /// exist on chain; shown with nothing raised.
    pub unconfirmed: Vec<CampaignMetadata>,
    pub backed: Vec<BackedCampaign>,
}

impl Profile {
    pub fn refundable(&self) -> impl Iterator<Item = &BackedCampaign> {
        self.backed.iter().filter(|backed| backed.refundable)
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
