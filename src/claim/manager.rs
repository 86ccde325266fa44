use crate::claim::error::ClaimError;
use crate::claim::header::{ClaimHeader, HEADER_SIZE, TAG_SIZE};
use crate::claim::payload::StreamClaim;
use crate::claim::{DEFAULT_STREAM_SECRET, unix_now};
use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Key, Nonce};
use anyhow::{Result, anyhow, bail};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};

/// A 256-bit key derived from a configured secret string
#[derive(Clone)]
struct SigningKey {
    kid: u8,
    key: [u8; 32],
}

impl SigningKey {
    /// Surrounding whitespace is not part of the secret
    fn from_secret(secret: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(secret.trim().as_bytes()).into();
        // kid is only a lookup hint, collisions are resolved by trial decryption
        let kid = Sha256::digest(key)[0];
        Self { kid, key }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Issues and verifies stream tokens.
///
/// The current secret signs new tokens. Retired secrets are kept for
/// verification only so that tokens already handed out keep working across
/// a rotation until they expire on their own.
#[derive(Clone, Debug)]
pub struct ClaimManager {
    current: SigningKey,
    retired: Vec<SigningKey>,
}

impl ClaimManager {
    pub fn new(secret: &str) -> Self {
        Self::with_retired(secret, &[] as &[&str])
    }

    pub fn with_retired<S: AsRef<str>>(secret: &str, retired: &[S]) -> Self {
        if is_insecure_secret(secret) {
            warn!(
                "STREAM_SECRET is missing or set to the development default, \
                 stream tokens can be forged by anyone who knows it"
            );
        }

        Self {
            current: SigningKey::from_secret(secret),
            retired: retired
                .iter()
                .map(|s| SigningKey::from_secret(s.as_ref()))
                .collect(),
        }
    }

    /// Mint a token for `resource_id` valid for `ttl_secs` from now
    pub fn issue(&self, resource_id: &str, caller_id: Option<&str>, ttl_secs: u64) -> Result<String> {
        self.issue_at(resource_id, caller_id, ttl_secs, unix_now())
    }

    pub fn issue_at(
        &self,
        resource_id: &str,
        caller_id: Option<&str>,
        ttl_secs: u64,
        now: u64,
    ) -> Result<String> {
        if ttl_secs == 0 {
            bail!("Stream token TTL must be positive");
        }

        let claim = StreamClaim {
            resource_id: resource_id.to_string(),
            caller_id: caller_id.map(str::to_string),
            issued_at: now,
            expires_at: now
                .checked_add(ttl_secs)
                .ok_or_else(|| anyhow!("Stream token TTL overflows"))?,
        };

        self.sign_claim(&claim)
    }

    /// Sign a claim and return the base64url-encoded token
    pub fn sign_claim(&self, claim: &StreamClaim) -> Result<String> {
        let header = ClaimHeader::new(self.current.kid);
        let header_bytes = header.to_bytes();

        let payload_bytes = claim.serialize_to_bytes()?;

        // Header is authenticated as AAD so it cannot be altered either
        let ciphertext = self
            .current
            .cipher()
            .encrypt(
                Nonce::from_slice(&header.nonce),
                aes_gcm::aead::Payload {
                    msg: &payload_bytes,
                    aad: &header_bytes,
                },
            )
            .map_err(|error| anyhow!("Encryption failed: {error}"))?;

        // header || ciphertext (includes tag)
        let mut token_bytes = header_bytes.to_vec();
        token_bytes.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(token_bytes))
    }

    /// Verify a token against the current time.
    ///
    /// Returns `None` for anything that is not a live token signed by one of
    /// our keys. The reason is deliberately not reported to the caller.
    pub fn verify(&self, token: &str) -> Option<StreamClaim> {
        self.verify_at(token, unix_now())
    }

    pub fn verify_at(&self, token: &str, now: u64) -> Option<StreamClaim> {
        self.decode_claim(token)
            .and_then(|claim| {
                if claim.is_expired(now) {
                    Err(ClaimError::TokenExpired)
                } else {
                    Ok(claim)
                }
            })
            .inspect_err(|error| debug!(%error, "Rejected stream token"))
            .ok()
    }

    /// Authenticate and decode a token without looking at its expiry
    fn decode_claim(&self, token: &str) -> Result<StreamClaim, ClaimError> {
        let token_bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| ClaimError::InvalidToken)?;

        if token_bytes.len() < HEADER_SIZE + TAG_SIZE {
            return Err(ClaimError::InvalidToken);
        }

        let header = ClaimHeader::from_bytes(&token_bytes[..HEADER_SIZE])?;
        let header_bytes = header.to_bytes();
        let ciphertext = &token_bytes[HEADER_SIZE..];

        let mut candidates = std::iter::once(&self.current)
            .chain(self.retired.iter())
            .filter(|key| key.kid == header.kid)
            .peekable();

        if candidates.peek().is_none() {
            return Err(ClaimError::KeyNotFound(header.kid));
        }

        let payload_bytes = candidates
            .find_map(|key| {
                key.cipher()
                    .decrypt(
                        Nonce::from_slice(&header.nonce),
                        aes_gcm::aead::Payload {
                            msg: ciphertext,
                            aad: &header_bytes,
                        },
                    )
                    .ok()
            })
            .ok_or(ClaimError::AeadFail)?;

        StreamClaim::deserialize_from_bytes(&payload_bytes)
    }
}

/// Empty or the development default
pub fn is_insecure_secret(secret: &str) -> bool {
    let secret = secret.trim();
    secret.is_empty() || secret == DEFAULT_STREAM_SECRET
}
