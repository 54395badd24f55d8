use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::{
    hash::Hash, instruction::Instruction, message::Message, signature::Signer,
    transaction::Transaction,
};

use crate::{ChainError, Result};

/// Compiles `instructions` into a legacy message paid for by `payer` and
/// signs it. Every signer the instructions require must be `payer`.
pub fn build_transaction(
    instructions: &[Instruction],
    payer: &dyn Signer,
    recent_blockhash: Hash,
) -> Result<Transaction> {
    let payer_key = payer.pubkey();
    let message = Message::new_with_blockhash(instructions, Some(&payer_key), &recent_blockhash);
    let mut transaction = Transaction::new_unsigned(message);
    let signers: Vec<&dyn Signer> = vec![payer];
    transaction
        .try_sign(&signers, recent_blockhash)
        .map_err(|err| ChainError::Signing(err.to_string()))?;
    Ok(transaction)
}

/// Base58 fee payer signature, which doubles as the transaction id.
pub fn transaction_signature(transaction: &Transaction) -> String {
    transaction
        .signatures
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Wire bytes as base64, the encoding `sendTransaction` is called with.
pub fn encode_transaction(transaction: &Transaction) -> Result<String> {
    let wire = bincode::serialize(transaction).map_err(|err| ChainError::Encode(err.to_string()))?;
    Ok(STANDARD.encode(wire))
}

#[cfg(test)]
#[path = "tests/transaction_tests.rs"]
mod tests;
