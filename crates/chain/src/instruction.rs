use anchor_lang::InstructionData;
use shared::domain::Lamports;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

use crate::{address::program_address, Result};

pub const SYSTEM_PROGRAM_ID: Pubkey = system_program::ID;

pub const CAMPAIGN_SEED: &[u8] = b"campaign";
pub const VAULT_SEED: &[u8] = b"vault";
pub const CLAIM_SEED: &[u8] = b"claim";
pub const FOUNDER_VAULT_SEED: &[u8] = b"founder_vault";

/// Argument payloads of the program's methods. Each carries the
/// `sha256("global:<method>")[..8]` discriminator Anchor dispatches on.
pub mod args {
    use anchor_lang::{
        prelude::{borsh, AnchorSerialize},
        Discriminator, InstructionData,
    };

    #[derive(AnchorSerialize)]
    pub struct Initialize {
        pub campaign_id: String,
        pub goal: u64,
        pub duration_days: u64,
    }

    #[derive(AnchorSerialize)]
    pub struct Contribute {
        pub amount: u64,
        pub nfts_due: u64,
    }

    #[derive(AnchorSerialize)]
    pub struct Finalize;

    #[derive(AnchorSerialize)]
    pub struct ClaimRefund;

    #[derive(AnchorSerialize)]
    pub struct FounderWithdraw;

    impl Discriminator for Initialize {
        const DISCRIMINATOR: &'static [u8] = &[175, 175, 109, 31, 13, 152, 155, 237];
    }
    impl Discriminator for Contribute {
        const DISCRIMINATOR: &'static [u8] = &[82, 33, 68, 131, 32, 0, 205, 95];
    }
    impl Discriminator for Finalize {
        const DISCRIMINATOR: &'static [u8] = &[171, 61, 218, 56, 127, 115, 12, 217];
    }
    impl Discriminator for ClaimRefund {
        const DISCRIMINATOR: &'static [u8] = &[15, 16, 30, 161, 255, 228, 97, 60];
    }
    impl Discriminator for FounderWithdraw {
        const DISCRIMINATOR: &'static [u8] = &[134, 80, 225, 98, 178, 189, 152, 153];
    }

    impl InstructionData for Initialize {}
    impl InstructionData for Contribute {}
    impl InstructionData for Finalize {}
    impl InstructionData for ClaimRefund {}
    impl InstructionData for FounderWithdraw {}
}

/// Address derivation and instruction construction for the crowdfunding
/// program's fixed method set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrowdfundProgram {
    program_id: Pubkey,
}

impl CrowdfundProgram {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn campaign_address(&self, owner: &Pubkey, campaign_id: &str) -> Result<Pubkey> {
        program_address(
            &[CAMPAIGN_SEED, owner.as_ref(), campaign_id.as_bytes()],
            &self.program_id,
        )
    }

    pub fn vault_address(&self, campaign: &Pubkey) -> Result<Pubkey> {
        program_address(&[VAULT_SEED, campaign.as_ref()], &self.program_id)
    }

    pub fn claim_address(&self, campaign: &Pubkey, contributor: &Pubkey) -> Result<Pubkey> {
        program_address(
            &[CLAIM_SEED, campaign.as_ref(), contributor.as_ref()],
            &self.program_id,
        )
    }

    pub fn founder_vault_address(&self) -> Result<Pubkey> {
        program_address(&[FOUNDER_VAULT_SEED], &self.program_id)
    }

    fn instruction(&self, accounts: Vec<AccountMeta>, data: impl InstructionData) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts,
            data: data.data(),
        }
    }

    pub fn initialize(
        &self,
        initializer: &Pubkey,
        campaign_id: &str,
        goal: Lamports,
        duration_days: u64,
    ) -> Result<Instruction> {
        let campaign = self.campaign_address(initializer, campaign_id)?;
        let vault = self.vault_address(&campaign)?;
        Ok(self.instruction(
            vec![
                AccountMeta::new(campaign, false),
                AccountMeta::new(vault, false),
                AccountMeta::new(*initializer, true),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            ],
            args::Initialize {
                campaign_id: campaign_id.to_string(),
                goal: goal.0,
                duration_days,
            },
        ))
    }

    pub fn contribute(
        &self,
        campaign: &Pubkey,
        owner: &Pubkey,
        contributor: &Pubkey,
        amount: Lamports,
        nfts_due: u64,
    ) -> Result<Instruction> {
        let vault = self.vault_address(campaign)?;
        let claim = self.claim_address(campaign, contributor)?;
        let founder_vault = self.founder_vault_address()?;
        Ok(self.instruction(
            vec![
                AccountMeta::new(*campaign, false),
                AccountMeta::new(vault, false),
                AccountMeta::new(*contributor, true),
                AccountMeta::new(claim, false),
                AccountMeta::new(*owner, false),
                AccountMeta::new(founder_vault, false),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            ],
            args::Contribute {
                amount: amount.0,
                nfts_due,
            },
        ))
    }

    pub fn finalize(&self, campaign: &Pubkey, owner: &Pubkey, caller: &Pubkey) -> Result<Instruction> {
        let vault = self.vault_address(campaign)?;
        Ok(self.instruction(
            vec![
                AccountMeta::new(*campaign, false),
                AccountMeta::new(vault, false),
                AccountMeta::new(*owner, false),
                AccountMeta::new(*caller, true),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            ],
            args::Finalize,
        ))
    }

    pub fn claim_refund(&self, campaign: &Pubkey, contributor: &Pubkey) -> Result<Instruction> {
        let vault = self.vault_address(campaign)?;
        let claim = self.claim_address(campaign, contributor)?;
        Ok(self.instruction(
            vec![
                AccountMeta::new(*campaign, false),
                AccountMeta::new(vault, false),
                AccountMeta::new(claim, false),
                AccountMeta::new(*contributor, true),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            ],
            args::ClaimRefund,
        ))
    }

    pub fn founder_withdraw(&self, founder: &Pubkey) -> Result<Instruction> {
        let founder_vault = self.founder_vault_address()?;
        Ok(self.instruction(
            vec![
                AccountMeta::new(founder_vault, false),
                AccountMeta::new(*founder, true),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            ],
            args::FounderWithdraw,
        ))
    }
}

#[cfg(test)]
#[path = "tests/instruction_tests.rs"]
mod tests;
