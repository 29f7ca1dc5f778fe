//! Candidate account sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::crypto::mnemonic::{generate_mnemonic, SeedWallet};
use crate::crypto::{CryptoError, Keypair};

/// Seed-phrase provenance of a derived account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOrigin {
    pub mnemonic: Arc<str>,
    pub passphrase: Arc<str>,
    pub path: String,
    pub index: u32,
}

/// One trial account: an address plus the secret that controls it.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    /// EIP-55 checksummed address with `0x` prefix
    pub address: String,
    /// Raw secp256k1 private key
    pub private_key: [u8; 32],
    /// Present only for seed-phrase accounts
    pub seed: Option<SeedOrigin>,
}

impl Account {
    pub fn from_keypair(keypair: &Keypair) -> Self {
        Self {
            address: keypair.address().to_checksum(),
            private_key: *keypair.private_key_bytes(),
            seed: None,
        }
    }

    /// Returns the private key as a `0x`-prefixed hex string.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.private_key))
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("path", &self.seed.as_ref().map(|s| s.path.as_str()))
            .finish_non_exhaustive()
    }
}

/// Returned by a visitor to continue or end the current burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Result of one call to [`CandidateSource::generate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generated {
    /// A burst was produced (possibly cut short by the visitor)
    Produced,
    /// The source has nothing more to give
    Exhausted,
}

/// Produces trial accounts for workers.
///
/// Each call generates one burst: a single account for raw keys, or the
/// ordered accounts of one seed phrase. Accounts are handed to `visit` in
/// order; when it returns [`Flow::Stop`] no further account of the burst is
/// produced. An error aborts only the current burst.
pub trait CandidateSource: Send + Sync {
    fn generate(&self, visit: &mut dyn FnMut(Account) -> Flow) -> Result<Generated, CryptoError>;
}

/// Independent random private keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrivateKeySource;

impl CandidateSource for PrivateKeySource {
    #[inline]
    fn generate(&self, visit: &mut dyn FnMut(Account) -> Flow) -> Result<Generated, CryptoError> {
        let keypair = Keypair::generate()?;
        visit(Account::from_keypair(&keypair));
        Ok(Generated::Produced)
    }
}

/// Fresh seed phrases, each yielding up to `derive_count` accounts.
#[derive(Debug, Clone)]
pub struct SeedPhraseSource {
    strength_bits: usize,
    derive_count: u32,
    passphrase: Arc<str>,
}

impl SeedPhraseSource {
    pub fn new(strength_bits: usize, derive_count: u32, passphrase: &str) -> Self {
        Self {
            strength_bits,
            derive_count: derive_count.max(1),
            passphrase: Arc::from(passphrase),
        }
    }
}

impl CandidateSource for SeedPhraseSource {
    fn generate(&self, visit: &mut dyn FnMut(Account) -> Flow) -> Result<Generated, CryptoError> {
        let mnemonic = generate_mnemonic(self.strength_bits)?;
        let wallet = SeedWallet::new(&mnemonic, &self.passphrase)?;
        let phrase: Arc<str> = Arc::from(mnemonic.to_string());

        for index in 0..self.derive_count {
            let derived = wallet.derive(index)?;
            let account = Account {
                address: derived.keypair.address().to_checksum(),
                private_key: *derived.keypair.private_key_bytes(),
                seed: Some(SeedOrigin {
                    mnemonic: phrase.clone(),
                    passphrase: self.passphrase.clone(),
                    path: derived.path,
                    index,
                }),
            };
            if visit(account) == Flow::Stop {
                break;
            }
        }

        Ok(Generated::Produced)
    }
}

/// Replays a fixed list of bursts; each burst is handed out exactly once
/// across all workers, then the source reports exhaustion.
#[derive(Debug)]
pub struct ListSource {
    bursts: Vec<Vec<Account>>,
    cursor: AtomicUsize,
}

impl ListSource {
    /// One single-account burst per entry.
    pub fn new(accounts: Vec<Account>) -> Self {
        Self::grouped(accounts.into_iter().map(|a| vec![a]).collect())
    }

    pub fn grouped(bursts: Vec<Vec<Account>>) -> Self {
        Self {
            bursts,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of bursts already handed out.
    pub fn taken(&self) -> usize {
        self.cursor.load(Ordering::Relaxed).min(self.bursts.len())
    }
}

impl CandidateSource for ListSource {
    fn generate(&self, visit: &mut dyn FnMut(Account) -> Flow) -> Result<Generated, CryptoError> {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
        let Some(burst) = self.bursts.get(slot) else {
            return Ok(Generated::Exhausted);
        };
        for account in burst {
            if visit(account.clone()) == Flow::Stop {
                break;
            }
        }
        Ok(Generated::Produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(source: &dyn CandidateSource, stop_after: usize) -> Vec<Account> {
        let mut seen = Vec::new();
        source
            .generate(&mut |account| {
                seen.push(account);
                if seen.len() >= stop_after {
                    Flow::Stop
                } else {
                    Flow::Continue
                }
            })
            .unwrap();
        seen
    }

    #[test]
    fn test_private_source_yields_one() {
        let seen = collect(&PrivateKeySource, usize::MAX);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].address.starts_with("0x"));
        assert_eq!(seen[0].address.len(), 42);
        assert!(seen[0].seed.is_none());
    }

    #[test]
    fn test_seed_source_orders_indices() {
        let source = SeedPhraseSource::new(128, 4, "pass");
        let seen = collect(&source, usize::MAX);
        assert_eq!(seen.len(), 4);
        for (i, account) in seen.iter().enumerate() {
            let origin = account.seed.as_ref().unwrap();
            assert_eq!(origin.index, i as u32);
            assert_eq!(origin.path, format!("m/44'/60'/0'/0/{}", i));
            assert_eq!(&*origin.passphrase, "pass");
            assert_eq!(origin.mnemonic.split_whitespace().count(), 12);
        }
        let first = &seen[0].seed.as_ref().unwrap().mnemonic;
        assert!(seen.iter().all(|a| &a.seed.as_ref().unwrap().mnemonic == first));
    }

    #[test]
    fn test_seed_source_stops_on_request() {
        let source = SeedPhraseSource::new(128, 5, "");
        assert_eq!(collect(&source, 2).len(), 2);
    }

    #[test]
    fn test_seed_source_bad_strength_errors() {
        let source = SeedPhraseSource::new(100, 5, "");
        assert!(source.generate(&mut |_| Flow::Continue).is_err());
    }

    #[test]
    fn test_list_source_exhausts() {
        let account = Account {
            address: "0xabc".into(),
            private_key: [1u8; 32],
            seed: None,
        };
        let source = ListSource::new(vec![account.clone(), account]);
        assert_eq!(collect(&source, usize::MAX).len(), 1);
        assert_eq!(collect(&source, usize::MAX).len(), 1);
        assert_eq!(
            source.generate(&mut |_| Flow::Continue).unwrap(),
            Generated::Exhausted
        );
        assert_eq!(source.taken(), 2);
    }
}
