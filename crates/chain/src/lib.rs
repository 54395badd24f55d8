//! Client-side boundary to the crowdfunding program: addresses, account
//! layouts, instruction builders, transaction assembly and JSON-RPC.

use thiserror::Error;

pub mod accounts;
pub mod address;
pub mod instruction;
pub mod rpc;
pub mod signer;
pub mod transaction;

pub use accounts::{CampaignAccount, ClaimAccount, KeyedAccount, ProgramAccount};
pub use address::{parse_address, program_address};
pub use instruction::{CrowdfundProgram, SYSTEM_PROGRAM_ID};
pub use rpc::{
    send_and_confirm, AccountData, ChainRpc, Commitment, ConfirmPolicy, FallbackRpc, RpcClient,
    RpcFilter, SignatureStatus,
};
pub use signer::read_keypair;
pub use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
pub use transaction::{build_transaction, encode_transaction, transaction_signature};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("seeds do not yield a program address")]
    InvalidSeeds,
    #[error("failed to decode {account} account: {reason}")]
    AccountData {
        account: &'static str,
        reason: String,
    },
    #[error("account {0} not found")]
    AccountNotFound(String),
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected rpc response for {method}: {reason}")]
    Response { method: String, reason: String },
    #[error("invalid keypair: {0}")]
    Keypair(String),
    #[error("failed to sign transaction: {0}")]
    Signing(String),
    #[error("failed to encode transaction: {0}")]
    Encode(String),
    #[error("transaction {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },
    #[error("transaction {0} was not confirmed in time")]
    ConfirmationTimeout(String),
}

pub type Result<T, E = ChainError> = std::result::Result<T, E>;
