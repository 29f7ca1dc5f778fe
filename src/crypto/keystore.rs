//! Password-encrypted keystore files (Web3 Secret Storage, version 3).

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::address::keccak256;
use super::{Address, CryptoError, Keypair};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// scrypt cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptParams {
    /// log2 of the CPU/memory cost N
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl ScryptParams {
    /// The standard wallet cost: N = 2^18, r = 8, p = 1.
    pub const STANDARD: Self = Self {
        log_n: 18,
        r: 8,
        p: 1,
    };

    /// A cheap setting (N = 2^12) for tests and throwaway keys.
    pub const LIGHT: Self = Self {
        log_n: 12,
        r: 8,
        p: 6,
    };
}

impl Default for ScryptParams {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeystoreFile {
    address: String,
    crypto: CryptoSection,
    id: String,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CryptoSection {
    cipher: String,
    ciphertext: String,
    cipherparams: CipherParams,
    kdf: String,
    kdfparams: KdfParams,
    mac: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CipherParams {
    iv: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct KdfParams {
    dklen: usize,
    n: u64,
    p: u32,
    r: u32,
    salt: String,
}

const DKLEN: usize = 32;

/// Encrypts a private key into a single-line keystore V3 JSON document.
pub fn encrypt_to_keystore(
    keypair: &Keypair,
    password: &str,
    params: ScryptParams,
) -> Result<String, CryptoError> {
    let mut salt = [0u8; 32];
    let mut iv = [0u8; 16];
    let mut rng = rand::thread_rng();
    rng.try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::Randomness(e.to_string()))?;
    rng.try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::Randomness(e.to_string()))?;

    let derived = derive_key(password, &salt, params)?;

    let mut ciphertext = keypair.private_key_bytes().to_vec();
    let mut cipher = Aes128Ctr::new_from_slices(&derived[..16], &iv)
        .map_err(|e| CryptoError::Keystore(e.to_string()))?;
    cipher.apply_keystream(&mut ciphertext);

    let mac = keystore_mac(&derived, &ciphertext);

    let file = KeystoreFile {
        address: keypair.address().to_hex_prefixed(),
        crypto: CryptoSection {
            cipher: "aes-128-ctr".into(),
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParams { iv: hex::encode(iv) },
            kdf: "scrypt".into(),
            kdfparams: KdfParams {
                dklen: DKLEN,
                n: 1u64 << params.log_n,
                p: params.p,
                r: params.r,
                salt: hex::encode(salt),
            },
            mac: hex::encode(mac),
        },
        id: uuid::Uuid::new_v4().to_string(),
        version: 3,
    };

    serde_json::to_string(&file).map_err(|e| CryptoError::Keystore(e.to_string()))
}

/// Decrypts a keystore V3 JSON document and checks the recovered key
/// against the stored address.
pub fn decrypt_keystore(blob: &str, password: &str) -> Result<Keypair, CryptoError> {
    let file: KeystoreFile = serde_json::from_str(blob.trim())
        .map_err(|e| CryptoError::Keystore(format!("invalid keystore json: {}", e)))?;

    if file.version != 3 {
        return Err(CryptoError::Keystore(format!(
            "unsupported keystore version {}",
            file.version
        )));
    }
    let crypto = &file.crypto;
    if crypto.kdf != "scrypt" {
        return Err(CryptoError::Keystore(format!("unsupported kdf {}", crypto.kdf)));
    }
    if crypto.cipher != "aes-128-ctr" {
        return Err(CryptoError::Keystore(format!(
            "unsupported cipher {}",
            crypto.cipher
        )));
    }

    let kdf = &crypto.kdfparams;
    if !kdf.n.is_power_of_two() || kdf.n < 2 || kdf.dklen != DKLEN {
        return Err(CryptoError::Keystore("invalid kdf parameters".into()));
    }
    let params = ScryptParams {
        log_n: kdf.n.trailing_zeros() as u8,
        r: kdf.r,
        p: kdf.p,
    };

    let salt = decode_field("salt", &kdf.salt)?;
    let iv = decode_field("iv", &crypto.cipherparams.iv)?;
    let mut plaintext = decode_field("ciphertext", &crypto.ciphertext)?;
    let expected_mac = decode_field("mac", &crypto.mac)?;

    let derived = derive_key(password, &salt, params)?;
    if keystore_mac(&derived, &plaintext)[..] != expected_mac[..] {
        return Err(CryptoError::WrongPassword);
    }

    let mut cipher = Aes128Ctr::new_from_slices(&derived[..16], &iv)
        .map_err(|e| CryptoError::Keystore(e.to_string()))?;
    cipher.apply_keystream(&mut plaintext);

    let secret: [u8; 32] = plaintext
        .try_into()
        .map_err(|_| CryptoError::Keystore("ciphertext is not 32 bytes".into()))?;
    let keypair = Keypair::from_secret_key(secret)?;

    if !file.address.trim().is_empty() {
        let stored: Address = file.address.parse()?;
        if &stored != keypair.address() {
            return Err(CryptoError::Keystore(format!(
                "address mismatch: stored {}, derived {}",
                stored,
                keypair.address()
            )));
        }
    }

    Ok(keypair)
}

fn derive_key(
    password: &str,
    salt: &[u8],
    params: ScryptParams,
) -> Result<[u8; DKLEN], CryptoError> {
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, DKLEN)
        .map_err(|e| CryptoError::Keystore(e.to_string()))?;
    let mut derived = [0u8; DKLEN];
    scrypt::scrypt(password.as_bytes(), salt, &scrypt_params, &mut derived)
        .map_err(|e| CryptoError::Keystore(e.to_string()))?;
    Ok(derived)
}

fn keystore_mac(derived: &[u8; DKLEN], ciphertext: &[u8]) -> [u8; 32] {
    let mut input = Vec::with_capacity(16 + ciphertext.len());
    input.extend_from_slice(&derived[16..32]);
    input.extend_from_slice(ciphertext);
    keccak256(&input)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(value).map_err(|e| CryptoError::Keystore(format!("{}: {}", name, e)))
}
