use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shared::domain::Lamports;
use tracing::{debug, warn};

use solana_sdk::{hash::Hash, pubkey::Pubkey, transaction::Transaction};

use crate::{address::base58, transaction::encode_transaction, ChainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    fn rank(self) -> u8 {
        match self {
            Commitment::Processed => 0,
            Commitment::Confirmed => 1,
            Commitment::Finalized => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcFilter {
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl RpcFilter {
    pub fn memcmp(offset: usize, bytes: impl AsRef<[u8]>) -> Self {
        Self::Memcmp {
            offset,
            bytes: bytes.as_ref().to_vec(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            RpcFilter::Memcmp { offset, bytes } => json!({
                "memcmp": { "offset": offset, "bytes": bs58::encode(bytes).into_string() }
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    pub lamports: u64,
    pub owner: Pubkey,
    pub data: Vec<u8>,
    pub executable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<Commitment>,
}

impl SignatureStatus {
    pub fn satisfies(&self, commitment: Commitment) -> bool {
        self.confirmation_status
            .map(|status| status.rank() >= commitment.rank())
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct UiAccount {
    lamports: u64,
    #[serde(with = "base58")]
    owner: Pubkey,
    data: (String, String),
    #[serde(default)]
    executable: bool,
}

impl UiAccount {
    fn decode(self, method: &str) -> Result<AccountData> {
        let data = STANDARD
            .decode(self.data.0.as_bytes())
            .map_err(|err| ChainError::Response {
                method: method.to_string(),
                reason: format!("account data is not base64: {err}"),
            })?;
        Ok(AccountData {
            lamports: self.lamports,
            owner: self.owner,
            data,
            executable: self.executable,
        })
    }
}

#[derive(Debug, Deserialize)]
struct KeyedUiAccount {
    #[serde(with = "base58")]
    pubkey: Pubkey,
    account: UiAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
}

/// The subset of Solana JSON-RPC the client relies on.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[RpcFilter],
    ) -> Result<Vec<(Pubkey, AccountData)>>;
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>>;
    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<Option<AccountData>>>;
    async fn get_balance(&self, address: &Pubkey) -> Result<Lamports>;
    async fn get_latest_blockhash(&self) -> Result<Hash>;
    async fn send_transaction(&self, transaction: &Transaction) -> Result<String>;
    async fn get_signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>>;
}

/// JSON-RPC client bound to a single endpoint.
pub struct RpcClient {
    http: Client,
    url: String,
    commitment: Commitment,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, commitment: Commitment) -> Self {
        Self::with_http(Client::new(), url, commitment)
    }

    pub fn with_http(http: Client, url: impl Into<String>, commitment: Commitment) -> Self {
        Self {
            http,
            url: url.into(),
            commitment,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(url = %self.url, method, id, "rpc request");
        let res: RpcResponse<T> = self
            .http
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = res.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        res.result.ok_or_else(|| ChainError::Response {
            method: method.to_string(),
            reason: "missing result".into(),
        })
    }

    fn account_config(&self) -> Value {
        json!({ "encoding": "base64", "commitment": self.commitment })
    }
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[RpcFilter],
    ) -> Result<Vec<(Pubkey, AccountData)>> {
        let mut config = self.account_config();
        config["filters"] = Value::Array(filters.iter().map(RpcFilter::to_json).collect());
        let accounts: Vec<KeyedUiAccount> = self
            .call("getProgramAccounts", json!([program_id.to_string(), config]))
            .await?;
        accounts
            .into_iter()
            .map(|keyed| Ok((keyed.pubkey, keyed.account.decode("getProgramAccounts")?)))
            .collect()
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>> {
        let res: WithContext<Option<UiAccount>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), self.account_config()]),
            )
            .await?;
        res.value
            .map(|account| account.decode("getAccountInfo"))
            .transpose()
    }

    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<Option<AccountData>>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = addresses.iter().map(Pubkey::to_string).collect();
        let res: WithContext<Vec<Option<UiAccount>>> = self
            .call("getMultipleAccounts", json!([keys, self.account_config()]))
            .await?;
        res.value
            .into_iter()
            .map(|account| {
                account
                    .map(|account| account.decode("getMultipleAccounts"))
                    .transpose()
            })
            .collect()
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<Lamports> {
        let res: WithContext<u64> = self
            .call(
                "getBalance",
                json!([address.to_string(), { "commitment": self.commitment }]),
            )
            .await?;
        Ok(Lamports(res.value))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        let res: WithContext<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment }]),
            )
            .await?;
        res.value
            .blockhash
            .parse()
            .map_err(|err| ChainError::Response {
                method: "getLatestBlockhash".into(),
                reason: format!("invalid blockhash: {err}"),
            })
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<String> {
        self.call(
            "sendTransaction",
            json!([
                encode_transaction(transaction)?,
                { "encoding": "base64", "preflightCommitment": self.commitment }
            ]),
        )
        .await
    }

    async fn get_signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>> {
        let res: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(res.value.into_iter().next().flatten())
    }
}

/// Primary endpoint with a one-shot fallback for reads. A failed read is
/// reissued once against the fallback; there is no retry loop. Transactions
/// are only ever submitted to the primary.
pub struct FallbackRpc {
    primary: RpcClient,
    fallback: Option<RpcClient>,
}

impl FallbackRpc {
    pub fn new(primary: RpcClient, fallback: Option<RpcClient>) -> Self {
        Self { primary, fallback }
    }

    async fn read<'a, T, F, Fut>(&'a self, method: &str, call: F) -> Result<T>
    where
        F: Fn(&'a RpcClient) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match call(&self.primary).await {
            Ok(value) => Ok(value),
            Err(err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(err);
                };
                warn!(
                    method,
                    primary = %self.primary.url(),
                    fallback = %fallback.url(),
                    "primary rpc failed, falling back: {err}"
                );
                call(fallback).await
            }
        }
    }
}

#[async_trait]
impl ChainRpc for FallbackRpc {
    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[RpcFilter],
    ) -> Result<Vec<(Pubkey, AccountData)>> {
        self.read("getProgramAccounts", |rpc| {
            rpc.get_program_accounts(program_id, filters)
        })
        .await
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>> {
        self.read("getAccountInfo", |rpc| rpc.get_account(address))
            .await
    }

    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<Option<AccountData>>> {
        self.read("getMultipleAccounts", |rpc| {
            rpc.get_multiple_accounts(addresses)
        })
        .await
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<Lamports> {
        self.read("getBalance", |rpc| rpc.get_balance(address)).await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.read("getLatestBlockhash", |rpc| rpc.get_latest_blockhash())
            .await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<String> {
        self.primary.send_transaction(transaction).await
    }

    async fn get_signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>> {
        self.read("getSignatureStatuses", |rpc| {
            rpc.get_signature_status(signature)
        })
        .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub commitment: Commitment,
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            commitment: Commitment::Confirmed,
            attempts: 30,
            delay: Duration::from_millis(500),
        }
    }
}

/// Submits a signed transaction and polls its status until it reaches the
/// policy's commitment, fails, or the attempts run out.
pub async fn send_and_confirm(
    rpc: &dyn ChainRpc,
    transaction: &Transaction,
    policy: ConfirmPolicy,
) -> Result<String> {
    let signature = rpc.send_transaction(transaction).await?;
    for attempt in 0..policy.attempts {
        if let Some(status) = rpc.get_signature_status(&signature).await? {
            if let Some(err) = &status.err {
                return Err(ChainError::TransactionFailed {
                    signature,
                    reason: err.to_string(),
                });
            }
            if status.satisfies(policy.commitment) {
                debug!(%signature, attempt, "transaction confirmed");
                return Ok(signature);
            }
        }
        tokio::time::sleep(policy.delay).await;
    }
    Err(ChainError::ConfirmationTimeout(signature))
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
