use std::future::Future;

use solana_sdk::{
    pubkey::Pubkey,
    signature::{keypair_from_seed, Keypair, Signer as _},
    transaction::VersionedTransaction,
};

use crate::error::Error;

use super::transaction::sign_partial;

/// Connected wallet able to sign transactions.
pub trait WalletSigner: Send + Sync + 'static {
    fn address(&self) -> &str;

    fn sign_transaction(
        &self,
        transaction: VersionedTransaction,
    ) -> impl Future<Output = Result<VersionedTransaction, Error>> + Send;
}

/// Local trading wallet. Its address is the base58 public key.
pub struct KeypairSigner {
    keypair: Keypair,
    address: String,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        let address = keypair.pubkey().to_string();
        Self { keypair, address }
    }

    /// Builds the keypair from a hex encoded 32-byte seed.
    pub fn from_hex_seed(seed: &str) -> Result<Self, Error> {
        let bytes = hex::decode(seed.trim())?;
        if bytes.len() != 32 {
            return Err(Error::InvalidOption {
                option: format!("wallet seed of {} bytes, expected 32", bytes.len()),
            });
        }

        let keypair = keypair_from_seed(&bytes).map_err(|e| {
            Error::InvalidOption {
                option: format!("wallet seed: {}", e),
            }
        })?;

        Ok(Self::new(keypair))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

impl std::fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("address", &self.address)
            .finish()
    }
}

impl WalletSigner for KeypairSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_transaction(
        &self,
        mut transaction: VersionedTransaction,
    ) -> Result<VersionedTransaction, Error> {
        sign_partial(&mut transaction, &self.keypair)?;
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::transaction::tests::unsigned_transaction;
    use solana_sdk::signature::Signature;

    fn signer() -> KeypairSigner {
        KeypairSigner::from_hex_seed(&"07".repeat(32)).unwrap()
    }

    #[test]
    fn test_address_is_derived_from_seed() {
        let wallet = signer();

        assert_eq!(wallet.address(), wallet.pubkey().to_string());
        assert_eq!(wallet.address(), signer().address());
        assert_ne!(
            wallet.address(),
            KeypairSigner::from_hex_seed(&"08".repeat(32)).unwrap().address()
        );
    }

    #[tokio::test]
    async fn test_signs_own_slot() {
        let signer = signer();
        let other = Pubkey::new_unique();
        let unsigned = unsigned_transaction(&[other, signer.pubkey()], true);

        let signed = signer.sign_transaction(unsigned).await.unwrap();

        assert_eq!(signed.signatures[0], Signature::default());
        assert!(signed.signatures[1]
            .verify(signer.pubkey().as_ref(), &signed.message.serialize()));
    }

    #[tokio::test]
    async fn test_rejects_foreign_transaction() {
        let signer = signer();
        let unsigned = unsigned_transaction(&[Pubkey::new_unique()], false);

        let result = signer.sign_transaction(unsigned).await;
        assert!(
            matches!(result, Err(Error::SignerNotFound(a)) if a == signer.address())
        );
    }

    #[test]
    fn test_rejects_short_seed() {
        assert!(KeypairSigner::from_hex_seed("0707").is_err());
        assert!(KeypairSigner::from_hex_seed("zz").is_err());
    }
}
