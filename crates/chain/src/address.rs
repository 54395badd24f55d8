use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;

use crate::{ChainError, Result};

pub fn parse_address(raw: &str) -> Result<Pubkey> {
    Pubkey::from_str(raw.trim()).map_err(|_| ChainError::InvalidAddress(raw.to_string()))
}

/// First off-curve address for `seeds`, searching bumps downwards from 255.
/// Oversized seeds or seed lists fail with [`ChainError::InvalidSeeds`].
pub fn program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Pubkey> {
    Pubkey::try_find_program_address(seeds, program_id)
        .map(|(address, _bump)| address)
        .ok_or(ChainError::InvalidSeeds)
}

/// Base58 string form for serde, used as `#[serde(with = "chain::address::base58")]`.
pub mod base58 {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let raw = <String as Deserialize>::deserialize(deserializer)?;
        super::parse_address(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[path = "tests/address_tests.rs"]
mod tests;
