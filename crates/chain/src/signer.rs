use std::path::Path;

use solana_sdk::signature::{read_keypair_file, Keypair};

use crate::{ChainError, Result};

/// Reads a JSON array keypair file as written by `solana-keygen`.
pub fn read_keypair(path: impl AsRef<Path>) -> Result<Keypair> {
    let path = path.as_ref();
    read_keypair_file(path)
        .map_err(|err| ChainError::Keypair(format!("failed to read '{}': {err}", path.display())))
}
