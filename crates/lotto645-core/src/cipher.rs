//! Credential encryption under a server-supplied RSA public key.
//!
//! The login form never carries credentials in clear text: the remote system
//! publishes a fresh modulus/exponent pair per login attempt and expects each
//! credential as hex-encoded PKCS#1 v1.5 ciphertext.

use rand::rngs::OsRng;
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPublicKey};
use serde::Deserialize;
use thiserror::Error;

/// Public key material as published by the key-distribution endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RsaPublicKeyMaterial {
    /// Hex-encoded modulus.
    #[serde(rename = "rsaModulus")]
    pub modulus_hex: String,

    /// Hex-encoded public exponent.
    #[serde(rename = "publicExponent")]
    pub exponent_hex: String,
}

/// Errors from [`encrypt`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    /// The modulus is not a hexadecimal number.
    #[error("malformed RSA modulus")]
    MalformedModulus,

    /// The exponent is not a hexadecimal number that fits in 64 bits.
    #[error("malformed RSA exponent: {0:?}")]
    MalformedExponent(String),

    /// The key was rejected or the padded plaintext does not fit the modulus.
    #[error("RSA encryption failed: {0}")]
    Rsa(String),
}

/// Encrypts `plaintext` with PKCS#1 v1.5 padding and returns lowercase hex.
///
/// Padding is randomized, so two calls with the same input produce different
/// ciphertexts that decrypt to the same plaintext.
///
/// # Errors
///
/// Returns an error if either hex string is malformed, if the key is not a
/// valid RSA public key, or if the plaintext is too long for the modulus.
pub fn encrypt(
    plaintext: &str,
    modulus_hex: &str,
    exponent_hex: &str,
) -> Result<String, EncryptionError> {
    let modulus = BigUint::parse_bytes(modulus_hex.trim().as_bytes(), 16)
        .ok_or(EncryptionError::MalformedModulus)?;
    let exponent = u64::from_str_radix(exponent_hex.trim(), 16)
        .map_err(|_| EncryptionError::MalformedExponent(exponent_hex.to_string()))?;

    let key = RsaPublicKey::new(modulus, BigUint::from(exponent))
        .map_err(|e| EncryptionError::Rsa(e.to_string()))?;
    let ciphertext = key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext.as_bytes())
        .map_err(|e| EncryptionError::Rsa(e.to_string()))?;

    Ok(hex::encode(ciphertext))
}

/// Encrypts `plaintext` with the given key material.
///
/// # Errors
///
/// See [`encrypt`].
pub fn encrypt_with(
    plaintext: &str,
    key: &RsaPublicKeyMaterial,
) -> Result<String, EncryptionError> {
    encrypt(plaintext, &key.modulus_hex, &key.exponent_hex)
}
