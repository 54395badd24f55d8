use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::protocol::{CampaignMetadata, ClaimRecord, RatingRow};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const CAMPAIGNS_TABLE: &str = "campaigns";
pub const RATINGS_TABLE: &str = "ratings";
pub const CLAIMS_TABLE: &str = "claims";
pub const IMAGE_BUCKET: &str = "campaign-images";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metadata store transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("metadata store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no {table} row with {column} = {value}")]
    NotFound {
        table: &'static str,
        column: &'static str,
        value: String,
    },
    #[error("metadata store returned an unreadable {table} response: {reason}")]
    Decode { table: &'static str, reason: String },
    #[error("invalid metadata store url: {0}")]
    InvalidUrl(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Off-chain campaign metadata, ratings, claim mirrors and image blobs.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn campaigns_by_ids(&self, ids: &[String]) -> Result<Vec<CampaignMetadata>>;
    async fn campaign_by_id(&self, id: &str) -> Result<CampaignMetadata>;
    async fn campaigns_by_owner(&self, owner: &str) -> Result<Vec<CampaignMetadata>>;
    async fn insert_campaign(&self, row: &CampaignMetadata) -> Result<()>;
    async fn ratings_for_campaign(&self, campaign_id: &str) -> Result<Vec<RatingRow>>;
    async fn upsert_claim(&self, claim: &ClaimRecord) -> Result<()>;
    /// Stores an image under `<folder>/<file_name>` and returns its public URL.
    async fn upload_image(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;
}

/// PostgREST + storage API client.
#[derive(Clone)]
pub struct SupabaseStore {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|err| StoreError::InvalidUrl(format!("{base_url}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            api_key: api_key.into(),
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn table(&self, table: &str) -> Result<Url> {
        self.endpoint(["rest", "v1", table])
    }

    pub fn public_image_url(&self, object_path: &[&str]) -> Result<Url> {
        let mut segments = vec!["storage", "v1", "object", "public", IMAGE_BUCKET];
        segments.extend_from_slice(object_path);
        self.endpoint(segments)
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.headers(self.auth_headers())
    }

    /// Rows that fail to decode are skipped so one malformed record does
    /// not hide the rest of the table.
    async fn select<T: DeserializeOwned>(
        &self,
        table: &'static str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let url = self.table(table)?;
        debug!(%url, ?query, "metadata select");
        let res = self
            .request(self.http.get(url))
            .query(&[("select", "*")])
            .query(query)
            .send()
            .await?;
        let body = check(res).await?.bytes().await?;
        let rows: Vec<Value> = serde_json::from_slice(&body).map_err(|err| StoreError::Decode {
            table,
            reason: err.to_string(),
        })?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(decoded) => Some(decoded),
                Err(err) => {
                    debug!(table, %err, "skipping undecodable row");
                    None
                }
            })
            .collect())
    }
}

async fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Formats a PostgREST `in.(…)` list, quoting each value.
fn in_list(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl MetadataStore for SupabaseStore {
    async fn campaigns_by_ids(&self, ids: &[String]) -> Result<Vec<CampaignMetadata>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(CAMPAIGNS_TABLE, &[("id", in_list(ids))]).await
    }

    async fn campaign_by_id(&self, id: &str) -> Result<CampaignMetadata> {
        let rows: Vec<CampaignMetadata> = self
            .select(
                CAMPAIGNS_TABLE,
                &[("id", format!("eq.{id}")), ("limit", "1".to_string())],
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            table: CAMPAIGNS_TABLE,
            column: "id",
            value: id.to_string(),
        })
    }

    async fn campaigns_by_owner(&self, owner: &str) -> Result<Vec<CampaignMetadata>> {
        self.select(CAMPAIGNS_TABLE, &[("owner", format!("eq.{owner}"))])
            .await
    }

    async fn insert_campaign(&self, row: &CampaignMetadata) -> Result<()> {
        let url = self.table(CAMPAIGNS_TABLE)?;
        let res = self
            .request(self.http.post(url))
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }

    async fn ratings_for_campaign(&self, campaign_id: &str) -> Result<Vec<RatingRow>> {
        self.select(RATINGS_TABLE, &[("campaign_id", format!("eq.{campaign_id}"))])
            .await
    }

    async fn upsert_claim(&self, claim: &ClaimRecord) -> Result<()> {
        let url = self.table(CLAIMS_TABLE)?;
        let res = self
            .request(self.http.post(url))
            .query(&[("on_conflict", "campaign_id,contributor")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(claim)
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }

    async fn upload_image(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = self.endpoint(["storage", "v1", "object", IMAGE_BUCKET, folder, file_name])?;
        debug!(%url, size = bytes.len(), "uploading image");
        let res = self
            .request(self.http.post(url))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        check(res).await?;
        Ok(self.public_image_url(&[folder, file_name])?.to_string())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
