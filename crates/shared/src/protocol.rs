use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Lamports;

/// Row of the `campaigns` metadata table. `id` is the base58 address of the
/// on-chain campaign account and is the join key against chain state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetadata {
    pub id: String,
    pub campaign_id: String,
    pub owner: String,
    pub title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub socials: Vec<Social>,
    pub goal_sol: f64,
    #[serde(default)]
    pub campaign_length: i64,
    pub expiration: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_left: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CampaignMetadata {
    /// First uploaded image, falling back to the single `image_url` column.
    pub fn cover_image(&self) -> Option<&str> {
        self.image_urls
            .first()
            .map(String::as_str)
            .or(Some(self.image_url.as_str()))
            .filter(|url| !url.is_empty())
    }

    pub fn goal(&self) -> Lamports {
        Lamports::from_sol(self.goal_sol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub amount: f64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "nftRewardCount", default)]
    pub nft_reward_count: u64,
}

impl Tier {
    pub fn price(&self) -> Lamports {
        Lamports::from_sol(self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Social {
    pub url: String,
    pub platform: String,
}

/// Row of the `ratings` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRow {
    pub id: String,
    pub campaign_id: String,
    #[serde(default)]
    pub comment: String,
    pub contributor: String,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Off-chain mirror of a contribution, upserted after a successful
/// `contribute` transaction. Unique on `(campaign_id, contributor)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub campaign_id: String,
    pub contributor: String,
    pub amount: u64,
    pub nfts_due: u64,
    pub refunded: bool,
}
