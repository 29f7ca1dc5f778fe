//! Cryptographic operations for EVM accounts.
//!
//! This module provides:
//! - Secure random key generation using secp256k1
//! - Address derivation (Keccak-256) and EIP-55 checksums
//! - BIP-39 seed phrases with BIP-32 account derivation
//! - Keystore V3 encryption and decryption

mod address;
mod keypair;
pub mod keystore;
pub mod mnemonic;

pub use address::{strip_hex_prefix, Address};
pub use keypair::Keypair;
pub use keystore::{decrypt_keystore, encrypt_to_keystore, ScryptParams};
pub use mnemonic::{derive_seed_accounts, generate_mnemonic, DerivedAccount, SeedWallet};

/// Errors raised by key generation, derivation and keystore handling.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Randomness source failed: {0}")]
    Randomness(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid entropy strength: {0} bits")]
    InvalidStrength(usize),

    #[error("Mnemonic error: {0}")]
    Mnemonic(String),

    #[error("Derivation failed: {0}")]
    Derivation(String),

    #[error("Keystore error: {0}")]
    Keystore(String),

    #[error("Wrong keystore password")]
    WrongPassword,
}
