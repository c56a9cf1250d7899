//! RSA-OAEP(SHA-256) payload envelope.
//!
//! OAEP bounds a single block at `key_size - 2 * hash_len - 2` bytes, which
//! is far smaller than a gzip-compressed metric batch, so the envelope
//! splits the plaintext into maximal blocks and concatenates the
//! ciphertexts. Decryption walks the ciphertext in key-size strides.

use anyhow::{bail, Context, Result};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::sha2::Sha256;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};

const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// Loads an RSA public key from a PKIX PEM file.
pub fn load_public_key(path: &str) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read public key {path:?}"))?;
    RsaPublicKey::from_public_key_pem(&pem)
        .with_context(|| format!("failed to parse public key {path:?}"))
}

/// Loads an RSA private key from a PKCS#8 PEM file.
pub fn load_private_key(path: &str) -> Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read private key {path:?}"))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .with_context(|| format!("failed to parse private key {path:?}"))
}

/// Encrypts `data` for `public_key`, producing a concatenation of OAEP
/// blocks. The output length is always a multiple of the key size.
pub fn encrypt(public_key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>> {
    let key_size = public_key.size();
    let block_size = key_size.saturating_sub(OAEP_OVERHEAD);
    if block_size == 0 {
        bail!("RSA key too small for OAEP with SHA-256");
    }

    let mut rng = rand::thread_rng();
    let mut out = Vec::with_capacity(data.len().div_ceil(block_size) * key_size);
    for chunk in data.chunks(block_size) {
        let block = public_key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
            .context("failed to encrypt payload block")?;
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Decrypts a concatenation of OAEP blocks produced by [`encrypt`].
pub fn decrypt(private_key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let key_size = private_key.size();
    if data.is_empty() || data.len() % key_size != 0 {
        bail!(
            "encrypted payload length {} is not a multiple of the key size {}",
            data.len(),
            key_size
        );
    }

    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(key_size) {
        let block = private_key
            .decrypt(Oaep::new::<Sha256>(), chunk)
            .context("failed to decrypt payload block")?;
        out.extend_from_slice(&block);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("key generation")
        })
    }

    #[test]
    fn round_trip_small_payload() {
        let private_key = test_key();
        let public_key = RsaPublicKey::from(private_key);
        let plaintext = b"short payload";
        let ciphertext = encrypt(&public_key, plaintext).unwrap();
        assert_eq!(ciphertext.len(), public_key.size());
        assert_eq!(decrypt(private_key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn round_trip_payload_larger_than_one_block() {
        let private_key = test_key();
        let public_key = RsaPublicKey::from(private_key);
        let plaintext: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        let ciphertext = encrypt(&public_key, &plaintext).unwrap();
        assert_eq!(ciphertext.len() % public_key.size(), 0);
        assert!(ciphertext.len() > public_key.size());
        assert_eq!(decrypt(private_key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let private_key = test_key();
        let public_key = RsaPublicKey::from(private_key);
        let ciphertext = encrypt(&public_key, b"payload").unwrap();
        assert!(decrypt(private_key, &ciphertext[..ciphertext.len() - 1]).is_err());
    }
}
