//! Base64 wire form of the backend's unsigned swap transactions and signing
//! of a single required signer's slot.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer as _},
    transaction::VersionedTransaction,
};

use crate::error::Error;

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, Error> {
    Ok(BASE64.decode(payload.trim())?)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes a legacy or versioned transaction. It must carry exactly one
/// signature slot per required signer.
pub fn decode_transaction(payload: &str) -> Result<VersionedTransaction, Error> {
    let bytes = decode_base64(payload)?;
    let transaction: VersionedTransaction = bincode::deserialize(&bytes)?;

    let required = required_signers(&transaction);
    if transaction.signatures.len() != required {
        return Err(Error::InvalidTransaction(format!(
            "{} signature slots for {} required signers",
            transaction.signatures.len(),
            required
        )));
    }
    if transaction.message.static_account_keys().len() < required {
        return Err(Error::InvalidTransaction(format!(
            "{} account keys for {} required signers",
            transaction.message.static_account_keys().len(),
            required
        )));
    }

    Ok(transaction)
}

pub fn encode_transaction(
    transaction: &VersionedTransaction,
) -> Result<String, Error> {
    Ok(encode_base64(&bincode::serialize(transaction)?))
}

fn required_signers(transaction: &VersionedTransaction) -> usize {
    usize::from(transaction.message.header().num_required_signatures)
}

pub fn signer_index(
    transaction: &VersionedTransaction,
    key: &Pubkey,
) -> Option<usize> {
    transaction
        .message
        .static_account_keys()
        .iter()
        .take(required_signers(transaction))
        .position(|account| account == key)
}

/// Writes `keypair`'s signature of the message into its own slot. Other
/// slots are left untouched.
pub fn sign_partial(
    transaction: &mut VersionedTransaction,
    keypair: &Keypair,
) -> Result<(), Error> {
    let key = keypair.pubkey();
    let index = signer_index(transaction, &key)
        .ok_or_else(|| Error::SignerNotFound(key.to_string()))?;

    let signature = keypair.sign_message(&transaction.message.serialize());
    let slot = transaction.signatures.get_mut(index).ok_or_else(|| {
        Error::InvalidTransaction(format!("no signature slot {}", index))
    })?;
    *slot = signature;

    Ok(())
}
