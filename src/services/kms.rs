// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS service for encrypting/decrypting provider OAuth tokens.
//!
//! Tokens are encrypted directly with a KMS key (no envelope encryption).
//! Every call binds the ciphertext to its owner through additional
//! authenticated data, so a token copied onto another user's document fails
//! to decrypt.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
#[cfg(debug_assertions)]
use sha2::{Digest, Sha256};

/// Length of the AAD digest prefixed to mock ciphertexts.
#[cfg(debug_assertions)]
const MOCK_AAD_DIGEST_LEN: usize = 32;

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Full resource path to the KMS key
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,

    /// GCP KMS client
    client: Option<std::sync::Arc<google_cloud_kms::client::Client>>,
}

impl KmsService {
    /// Create a new KMS service connected to GCP KMS.
    pub async fn new(
        project_id: &str,
        location: &str,
        key_ring: &str,
        key_name: &str,
    ) -> Result<Self, AppError> {
        let key_path = key_path(project_id, location, key_ring, key_name);

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        tracing::info!(key = %key_path, "KMS service initialized");

        Ok(Self {
            key_path,
            client: Some(std::sync::Arc::new(client)),
        })
    }

    /// Create a mock KMS service for offline runs and tests.
    ///
    /// Ciphertexts are base64 of the AAD digest followed by the plaintext:
    /// not secret, but a mismatched AAD still fails like it would in KMS.
    /// Only available in debug/test builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: key_path("mock", "mock", "mock", "mock"),
            client: None,
        }
    }

    /// Encrypt `plaintext` bound to `aad`. Returns base64-encoded ciphertext.
    pub async fn encrypt(&self, plaintext: &str, aad: &[u8]) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::EncryptRequest;

        // Mock mode (Debug builds only)
        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                let mut sealed = Sha256::digest(aad).to_vec();
                sealed.extend_from_slice(plaintext.as_bytes());
                return Ok(BASE64.encode(sealed));
            }
        }

        // Release builds have no mock, so a missing client is an error
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            additional_authenticated_data: aad.to_vec(),
            ..Default::default()
        };

        let response = client
            .encrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        Ok(BASE64.encode(response.ciphertext))
    }

    /// Decrypt base64 ciphertext produced by [`KmsService::encrypt`] with the same `aad`.
    pub async fn decrypt(&self, ciphertext_b64: &str, aad: &[u8]) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::DecryptRequest;

        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Base64 ciphertext decode failed: {}", e))
        })?;

        // Mock mode (Debug builds only)
        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                if ciphertext.len() < MOCK_AAD_DIGEST_LEN
                    || ciphertext[..MOCK_AAD_DIGEST_LEN] != Sha256::digest(aad)[..]
                {
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "KMS decrypt failed (mock): AAD mismatch"
                    )));
                }
                return String::from_utf8(ciphertext[MOCK_AAD_DIGEST_LEN..].to_vec()).map_err(
                    |e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed (mock): {}", e)),
                );
            }
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext,
            additional_authenticated_data: aad.to_vec(),
            ..Default::default()
        };

        let response = client
            .decrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        String::from_utf8(response.plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

fn key_path(project_id: &str, location: &str, key_ring: &str, key_name: &str) -> String {
    format!(
        "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
        project_id, location, key_ring, key_name
    )
}

/// AAD binding a token ciphertext to its owner.
pub fn token_aad(user_id: &str) -> Vec<u8> {
    format!("user_id:{}", user_id).into_bytes()
}
