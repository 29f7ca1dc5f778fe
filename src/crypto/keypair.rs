//! secp256k1 keypair generation.

use rand::RngCore;
use secp256k1::{PublicKey, SecretKey, SECP256K1};

use super::{Address, CryptoError};

/// A secp256k1 private key together with its derived address.
#[derive(Clone)]
pub struct Keypair {
    /// The private key bytes (32 bytes)
    secret_key: [u8; 32],
    /// The derived address
    address: Address,
}

impl Keypair {
    /// Generates a new random keypair from the thread-local CSPRNG.
    ///
    /// Fails if the RNG cannot be read or, with negligible probability, if
    /// the drawn bytes are not a valid scalar.
    #[inline]
    pub fn generate() -> Result<Self, CryptoError> {
        let mut secret = [0u8; 32];
        rand::thread_rng()
            .try_fill_bytes(&mut secret)
            .map_err(|e| CryptoError::Randomness(e.to_string()))?;
        Self::from_secret_key(secret)
    }

    /// Builds a keypair from an existing secret key.
    pub fn from_secret_key(secret_bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let secret_key = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?;
        Ok(Self::from_secp(&secret_key))
    }

    /// Builds a keypair from a hex-encoded secret key (with or without `0x`).
    pub fn from_hex(secret_hex: &str) -> Result<Self, CryptoError> {
        let body = super::address::strip_hex_prefix(secret_hex.trim());
        let bytes = hex::decode(body).map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSecretKey("expected 32 bytes".into()))?;
        Self::from_secret_key(bytes)
    }

    pub(crate) fn from_secp(secret_key: &SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(SECP256K1, secret_key);
        Self {
            secret_key: secret_key.secret_bytes(),
            address: Address::from_public_key(&public_key),
        }
    }

    /// Returns the private key as a `0x`-prefixed hex string.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.secret_key))
    }

    /// Returns the private key bytes.
    pub fn private_key_bytes(&self) -> &[u8; 32] {
        &self.secret_key
    }

    /// Returns a reference to the derived address.
    #[inline]
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
