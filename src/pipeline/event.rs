//! Match events carried from workers to the sink.

use std::time::Duration;

use chrono::{DateTime, Local};

use crate::crypto::{encrypt_to_keystore, CryptoError, Keypair, ScryptParams};
use crate::matcher::MatchResult;
use crate::worker::Account;

/// One examined account with its position in the run.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub account: Account,
    /// 1-based attempt number across all workers
    pub attempt: u64,
    /// Time since the run started
    pub elapsed: Duration,
}

/// A matched candidate, created by a worker and consumed once by the sink.
#[derive(Debug, Clone)]
pub struct FoundEvent {
    pub candidate: Candidate,
    pub result: MatchResult,
    pub captured_at: DateTime<Local>,
    /// Keystore JSON when the run stores secrets encrypted
    pub keystore: Option<String>,
}

impl FoundEvent {
    pub fn new(candidate: Candidate, result: MatchResult) -> Self {
        Self {
            candidate,
            result,
            captured_at: Local::now(),
            keystore: None,
        }
    }

    #[inline]
    pub fn account(&self) -> &Account {
        &self.candidate.account
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.result.is_final
    }
}

/// Encrypts matched keys into keystores on the worker thread.
#[derive(Clone)]
pub struct KeystoreSealer {
    password: String,
    params: ScryptParams,
}

impl KeystoreSealer {
    pub fn new(password: impl Into<String>, params: ScryptParams) -> Self {
        Self {
            password: password.into(),
            params,
        }
    }

    pub fn seal(&self, account: &Account) -> Result<String, CryptoError> {
        let keypair = Keypair::from_secret_key(account.private_key)?;
        encrypt_to_keystore(&keypair, &self.password, self.params)
    }
}

impl std::fmt::Debug for KeystoreSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreSealer")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::decrypt_keystore;
    use crate::matcher::RuleKind;

    #[test]
    fn test_sealer_round_trips_key() {
        let keypair = Keypair::generate().unwrap();
        let account = Account::from_keypair(&keypair);
        let sealer = KeystoreSealer::new("secret", ScryptParams::LIGHT);

        let blob = sealer.seal(&account).unwrap();
        let opened = decrypt_keystore(&blob, "secret").unwrap();
        assert_eq!(opened.private_key_bytes(), &account.private_key);
        assert!(!format!("{:?}", sealer).contains("secret"));
    }

    #[test]
    fn test_event_accessors() {
        let keypair = Keypair::generate().unwrap();
        let event = FoundEvent::new(
            Candidate {
                account: Account::from_keypair(&keypair),
                attempt: 7,
                elapsed: Duration::from_millis(5),
            },
            MatchResult {
                kind: RuleKind::Edges,
                index: 0,
                is_final: true,
            },
        );
        assert!(event.is_final());
        assert!(event.keystore.is_none());
        assert_eq!(event.account().address, keypair.address().to_checksum());
    }
}
