// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PKCE (RFC 7636) artifacts: code verifier, S256 challenge and state token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

pub const MIN_VERIFIER_LENGTH: usize = 43;
pub const MAX_VERIFIER_LENGTH: usize = 128;
/// Verifier length used for connection attempts.
pub const DEFAULT_VERIFIER_LENGTH: usize = 64;
pub const DEFAULT_STATE_BYTES: usize = 32;
/// 128 bits: the least entropy a state token may carry.
const MIN_STATE_BYTES: usize = 16;

/// Unreserved URI characters allowed in a code verifier.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Largest multiple of the charset size that fits in a byte. Bytes at or above
/// it are rejected so every character is equally likely.
const REJECTION_LIMIT: u8 = (256 / VERIFIER_CHARSET.len() * VERIFIER_CHARSET.len()) as u8;

pub const CHALLENGE_METHOD: &str = "S256";

/// Verifier plus its S256 challenge. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
    pub method: &'static str,
}

impl PkcePair {
    pub fn from_verifier(code_verifier: String) -> Result<Self> {
        let code_challenge = challenge_from_verifier(&code_verifier)?;
        Ok(Self {
            code_verifier,
            code_challenge,
            method: CHALLENGE_METHOD,
        })
    }
}

/// Generate a verifier and challenge with the default verifier length.
pub fn generate_pair() -> Result<PkcePair> {
    PkcePair::from_verifier(generate_verifier(DEFAULT_VERIFIER_LENGTH)?)
}

/// Generate a uniformly random code verifier of `length` characters.
pub fn generate_verifier(length: usize) -> Result<String> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(AppError::InvalidLength(length));
    }

    let rng = SystemRandom::new();
    let mut verifier = String::with_capacity(length);
    let mut buf = [0u8; 64];

    while verifier.len() < length {
        fill(&rng, &mut buf)?;
        for &byte in buf.iter().filter(|&&b| b < REJECTION_LIMIT) {
            if verifier.len() == length {
                break;
            }
            let idx = usize::from(byte) % VERIFIER_CHARSET.len();
            verifier.push(char::from(VERIFIER_CHARSET[idx]));
        }
    }

    Ok(verifier)
}

/// S256 challenge: `BASE64URL-NOPAD(SHA256(verifier))`.
pub fn challenge_from_verifier(verifier: &str) -> Result<String> {
    if verifier.is_empty() {
        return Err(AppError::InvalidInput(
            "code verifier must not be empty".to_string(),
        ));
    }
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())))
}

/// Random anti-CSRF state token, lowercase hex.
pub fn generate_state(byte_length: usize) -> Result<String> {
    if byte_length < MIN_STATE_BYTES {
        return Err(AppError::InvalidInput(format!(
            "state token needs at least {} random bytes, got {}",
            MIN_STATE_BYTES, byte_length
        )));
    }

    let mut bytes = vec![0u8; byte_length];
    fill(&SystemRandom::new(), &mut bytes)?;
    Ok(hex::encode(bytes))
}

fn fill(rng: &SystemRandom, buf: &mut [u8]) -> Result<()> {
    rng.fill(buf)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG unavailable")))
}
