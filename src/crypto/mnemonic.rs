//! BIP-39 seed phrases and BIP-32 account derivation.
//!
//! Accounts follow the standard EVM path `m/44'/60'/0'/0/i`. The parent node
//! `m/44'/60'/0'/0` is derived once per phrase; each account index then costs
//! a single non-hardened child derivation.

use bip39::Mnemonic;
use hmac::{Hmac, Mac};
use rand::RngCore;
use secp256k1::{PublicKey, Scalar, SecretKey, SECP256K1};
use sha2::Sha512;

use super::{CryptoError, Keypair};

type HmacSha512 = Hmac<Sha512>;

/// Entropy strength producing a 12-word phrase.
pub const DEFAULT_STRENGTH: usize = 128;

/// Accounts derived per phrase unless configured otherwise.
pub const DEFAULT_DERIVE_COUNT: u32 = 5;

/// Parent path of every derived account.
pub const ACCOUNT_PATH: &str = "m/44'/60'/0'/0";

const HARDENED: u32 = 0x8000_0000;

/// Generates a fresh English mnemonic from `strength_bits` of entropy.
///
/// Valid strengths are 128, 160, 192, 224 and 256 bits (12 to 24 words).
pub fn generate_mnemonic(strength_bits: usize) -> Result<Mnemonic, CryptoError> {
    if !(128..=256).contains(&strength_bits) || strength_bits % 32 != 0 {
        return Err(CryptoError::InvalidStrength(strength_bits));
    }

    let mut buf = [0u8; 32];
    let entropy = &mut buf[..strength_bits / 8];
    rand::thread_rng()
        .try_fill_bytes(entropy)
        .map_err(|e| CryptoError::Randomness(e.to_string()))?;

    Mnemonic::from_entropy(entropy).map_err(|e| CryptoError::Mnemonic(e.to_string()))
}

/// Parses an English mnemonic phrase.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, CryptoError> {
    Mnemonic::parse_normalized(phrase.trim()).map_err(|e| CryptoError::Mnemonic(e.to_string()))
}

/// One account derived from a seed phrase.
#[derive(Debug, Clone)]
pub struct DerivedAccount {
    /// Last path component
    pub index: u32,
    /// Full derivation path, e.g. `m/44'/60'/0'/0/3`
    pub path: String,
    /// Derived keypair
    pub keypair: Keypair,
}

/// Extended private key (BIP-32 node).
#[derive(Clone, Copy)]
struct ExtendedKey {
    secret: SecretKey,
    chain_code: [u8; 32],
}

impl ExtendedKey {
    fn master(seed: &[u8]) -> Result<Self, CryptoError> {
        let (left, right) = hmac_split(b"Bitcoin seed", &[seed])?;
        let secret = SecretKey::from_slice(&left)
            .map_err(|e| CryptoError::Derivation(format!("master key: {}", e)))?;
        Ok(Self {
            secret,
            chain_code: right,
        })
    }

    fn child(&self, index: u32) -> Result<Self, CryptoError> {
        let (left, right) = if index & HARDENED != 0 {
            let secret = self.secret.secret_bytes();
            hmac_split(&self.chain_code, &[&[0u8], &secret, &index.to_be_bytes()])?
        } else {
            let public = PublicKey::from_secret_key(SECP256K1, &self.secret).serialize();
            hmac_split(&self.chain_code, &[&public, &index.to_be_bytes()])?
        };

        let tweak = Scalar::from_be_bytes(left)
            .map_err(|_| CryptoError::Derivation(format!("child {}: tweak out of range", index)))?;
        let secret = self
            .secret
            .add_tweak(&tweak)
            .map_err(|e| CryptoError::Derivation(format!("child {}: {}", index, e)))?;

        Ok(Self {
            secret,
            chain_code: right,
        })
    }
}

fn hmac_split(key: &[u8], parts: &[&[u8]]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let mut mac =
        HmacSha512::new_from_slice(key).map_err(|e| CryptoError::Derivation(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let out = mac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&out[..32]);
    right.copy_from_slice(&out[32..]);
    Ok((left, right))
}

/// The `m/44'/60'/0'/0` node of one seed phrase, ready to hand out accounts.
pub struct SeedWallet {
    parent: ExtendedKey,
}

impl SeedWallet {
    /// Stretches the phrase into a seed and walks down to the account parent node.
    pub fn new(mnemonic: &Mnemonic, passphrase: &str) -> Result<Self, CryptoError> {
        let seed = mnemonic.to_seed_normalized(passphrase);
        let mut node = ExtendedKey::master(&seed)?;
        for index in [44 | HARDENED, 60 | HARDENED, HARDENED, 0] {
            node = node.child(index)?;
        }
        Ok(Self { parent: node })
    }

    /// Derives the account at `m/44'/60'/0'/0/index`.
    pub fn derive(&self, index: u32) -> Result<DerivedAccount, CryptoError> {
        if index & HARDENED != 0 {
            return Err(CryptoError::Derivation(format!(
                "account index {} out of range",
                index
            )));
        }
        let node = self.parent.child(index)?;
        Ok(DerivedAccount {
            index,
            path: format!("{}/{}", ACCOUNT_PATH, index),
            keypair: Keypair::from_secp(&node.secret),
        })
    }
}

/// Derives the first `count` accounts of a phrase, in index order.
pub fn derive_seed_accounts(
    mnemonic: &Mnemonic,
    passphrase: &str,
    count: u32,
) -> Result<Vec<DerivedAccount>, CryptoError> {
    let wallet = SeedWallet::new(mnemonic, passphrase)?;
    (0..count).map(|index| wallet.derive(index)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";

    #[test]
    fn test_known_vector() {
        let mnemonic = parse_mnemonic(ABANDON).unwrap();
        let accounts = derive_seed_accounts(&mnemonic, "", 1).unwrap();

        assert_eq!(accounts[0].path, "m/44'/60'/0'/0/0");
        assert_eq!(
            accounts[0].keypair.address().to_hex(),
            "9858effd232b4033e47d90003d41ec34ecaeda94"
        );
    }

    #[test]
    fn test_accounts_are_ordered_and_distinct() {
        let mnemonic = parse_mnemonic(ABANDON).unwrap();
        let accounts = derive_seed_accounts(&mnemonic, "", DEFAULT_DERIVE_COUNT).unwrap();

        assert_eq!(accounts.len(), 5);
        for (i, account) in accounts.iter().enumerate() {
            assert_eq!(account.index, i as u32);
            assert!(account.path.ends_with(&format!("/{}", i)));
        }
        assert_ne!(accounts[0].keypair.address(), accounts[1].keypair.address());
    }

    #[test]
    fn test_passphrase_changes_accounts() {
        let mnemonic = parse_mnemonic(ABANDON).unwrap();
        let plain = SeedWallet::new(&mnemonic, "").unwrap().derive(0).unwrap();
        let salted = SeedWallet::new(&mnemonic, "TREZOR").unwrap().derive(0).unwrap();
        assert_ne!(plain.keypair.address(), salted.keypair.address());
    }

    #[test]
    fn test_word_counts() {
        assert_eq!(generate_mnemonic(DEFAULT_STRENGTH).unwrap().word_count(), 12);
        assert_eq!(generate_mnemonic(256).unwrap().word_count(), 24);
        assert!(generate_mnemonic(100).is_err());
        assert!(generate_mnemonic(512).is_err());
    }

    #[test]
    fn test_invalid_phrase_rejected() {
        assert!(parse_mnemonic("abandon abandon").is_err());
    }
}
