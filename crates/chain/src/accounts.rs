use anchor_lang::{
    error::ErrorCode as AnchorErrorCode,
    prelude::{borsh, AnchorDeserialize, AnchorSerialize},
    AccountDeserialize, Discriminator,
};
use shared::domain::Lamports;
use solana_sdk::pubkey::Pubkey;

use crate::{address::base58, ChainError, Result};

pub const DISCRIMINATOR_LEN: usize = 8;
/// Byte offset of `Claim::campaign` inside raw account data.
pub const CLAIM_CAMPAIGN_OFFSET: usize = DISCRIMINATOR_LEN;
/// Byte offset of `Claim::contributor` inside raw account data.
pub const CLAIM_CONTRIBUTOR_OFFSET: usize = DISCRIMINATOR_LEN + 32;

/// An account owned by the crowdfunding program, decoded the way Anchor
/// decodes it. Bytes after the known fields are ignored.
pub trait ProgramAccount: AccountDeserialize + Discriminator {
    const NAME: &'static str;

    fn from_account_data(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        Self::try_deserialize(&mut buf).map_err(|err| ChainError::AccountData {
            account: Self::NAME,
            reason: err.to_string(),
        })
    }
}

macro_rules! program_account {
    ($ty:ty, $name:literal, $discriminator:expr) => {
        impl Discriminator for $ty {
            const DISCRIMINATOR: &'static [u8] = &$discriminator;
        }

        impl AccountDeserialize for $ty {
            fn try_deserialize(buf: &mut &[u8]) -> anchor_lang::Result<Self> {
                if buf.len() < Self::DISCRIMINATOR.len() {
                    return Err(AnchorErrorCode::AccountDiscriminatorNotFound.into());
                }
                if !buf.starts_with(Self::DISCRIMINATOR) {
                    return Err(AnchorErrorCode::AccountDiscriminatorMismatch.into());
                }
                Self::try_deserialize_unchecked(buf)
            }

            fn try_deserialize_unchecked(buf: &mut &[u8]) -> anchor_lang::Result<Self> {
                let mut body = buf.get(Self::DISCRIMINATOR.len()..).unwrap_or_default();
                <Self as AnchorDeserialize>::deserialize(&mut body)
                    .map_err(|_| AnchorErrorCode::AccountDidNotDeserialize.into())
            }
        }

        impl ProgramAccount for $ty {
            const NAME: &'static str = $name;
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, AnchorSerialize, AnchorDeserialize)]
pub struct CampaignAccount {
    #[serde(with = "base58")]
    pub owner: Pubkey,
    pub goal: u64,
    pub amount_raised: u64,
    pub deadline: i64,
    pub finalized: bool,
}

impl CampaignAccount {
    pub fn goal(&self) -> Lamports {
        Lamports(self.goal)
    }

    pub fn raised(&self) -> Lamports {
        Lamports(self.amount_raised)
    }
}

// sha256("account:Campaign")[..8]
program_account!(CampaignAccount, "Campaign", [50, 40, 49, 11, 157, 220, 229, 192]);

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, AnchorSerialize, AnchorDeserialize)]
pub struct ClaimAccount {
    #[serde(with = "base58")]
    pub campaign: Pubkey,
    #[serde(with = "base58")]
    pub contributor: Pubkey,
    pub amount: u64,
    pub refunded: bool,
}

impl ClaimAccount {
    pub fn amount(&self) -> Lamports {
        Lamports(self.amount)
    }
}

// sha256("account:Claim")[..8]
program_account!(ClaimAccount, "Claim", [155, 70, 22, 176, 123, 215, 246, 102]);

/// A decoded account together with the address it was read from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct KeyedAccount<T> {
    #[serde(with = "base58")]
    pub address: Pubkey,
    pub account: T,
}

/// Encodes an account body the way the program stores it. Used to seed
/// fixtures and fakes.
pub fn encode_account<T: ProgramAccount + AnchorSerialize>(account: &T) -> Vec<u8> {
    let mut data = T::DISCRIMINATOR.to_vec();
    // Writing into a Vec cannot fail.
    let _ = AnchorSerialize::serialize(account, &mut data);
    data
}
