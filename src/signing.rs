//! Signed, expiring prompt-session tokens.
//!
//! Wire format: `<base64url(json payload)>.<base64url(HMAC-SHA256(secret, json payload))>`,
//! both halves unpadded. Tokens are split on the last `.`; base64url never
//! emits a `.`, so any token with more than one delimiter fails to decode.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Settings;
use crate::error::ConfigError;
use crate::types::{PromptTokenPayload, DEFAULT_TOKEN_TTL_SECS};

type HmacSha256 = Hmac<Sha256>;

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::counter!(name).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Result of checking a token against the secret and the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Valid(PromptTokenPayload),
    /// Signature verified but `now >= expires_at`.
    Expired(PromptTokenPayload),
    /// Malformed, undecodable, forged or unparsable.
    Invalid,
}

impl TokenState {
    pub fn prompt_id(self) -> Option<String> {
        match self {
            TokenState::Valid(payload) => Some(payload.prompt_id),
            TokenState::Expired(_) | TokenState::Invalid => None,
        }
    }
}

/// Mints and validates prompt tokens. Holds no mutable state.
#[derive(Clone)]
pub struct PromptTokenCodec {
    secret: Vec<u8>,
    ttl_secs: u64,
}

impl fmt::Debug for PromptTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptTokenCodec")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl PromptTokenCodec {
    /// Build a codec with the default 7 day TTL. An empty secret is a configuration error.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ConfigError::MissingCookieSecret);
        }
        Ok(Self {
            secret,
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let secret = settings
            .cookie_secret
            .as_deref()
            .ok_or(ConfigError::MissingCookieSecret)?;
        Ok(Self::new(secret.as_bytes())?.with_ttl(settings.cookie_max_age_secs))
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Mint a token for `prompt_id` using the configured TTL.
    pub fn mint(&self, prompt_id: &str) -> String {
        self.mint_at(prompt_id, self.ttl_secs, now_millis())
    }

    pub fn mint_with_ttl(&self, prompt_id: &str, ttl_secs: u64) -> String {
        self.mint_at(prompt_id, ttl_secs, now_millis())
    }

    pub fn mint_at(&self, prompt_id: &str, ttl_secs: u64, now_ms: u64) -> String {
        let payload = PromptTokenPayload::new(prompt_id, now_ms, ttl_secs);
        // String and integer fields only; serialization cannot fail.
        let serialized = serde_json::to_vec(&payload).expect("prompt token payload serializes");
        let signature = compute_signature(&self.secret, &serialized);
        format!("{}.{}", URL_SAFE_NO_PAD.encode(&serialized), signature)
    }

    /// Returns the prompt id if the token is authentic and unexpired.
    pub fn validate(&self, token: &str) -> Option<String> {
        self.validate_at(token, now_millis())
    }

    pub fn validate_at(&self, token: &str, now_ms: u64) -> Option<String> {
        self.check_at(token, now_ms).prompt_id()
    }

    pub fn check(&self, token: &str) -> TokenState {
        self.check_at(token, now_millis())
    }

    pub fn check_at(&self, token: &str, now_ms: u64) -> TokenState {
        let Some(payload) = self.decode(token) else {
            metric_inc("relay.token.rejected");
            return TokenState::Invalid;
        };
        if payload.is_expired(now_ms) {
            metric_inc("relay.token.expired");
            return TokenState::Expired(payload);
        }
        TokenState::Valid(payload)
    }

    /// Verify the signature and parse the payload, ignoring expiry.
    pub fn decode(&self, token: &str) -> Option<PromptTokenPayload> {
        let (encoded_payload, signature) = token.rsplit_once('.')?;
        if encoded_payload.is_empty() || signature.is_empty() {
            return None;
        }

        let payload_bytes = URL_SAFE_NO_PAD.decode(encoded_payload).ok()?;
        if !verify_signature(&self.secret, &payload_bytes, signature) {
            return None;
        }

        serde_json::from_slice(&payload_bytes).ok()
    }
}

fn keyed_mac(secret: &[u8]) -> HmacSha256 {
    <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC can take key of any size")
}

/// HMAC-SHA256 over `payload`, base64url-encoded without padding.
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = keyed_mac(secret);
    mac.update(payload);
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Constant-time check of a base64url signature. Length mismatch and bad
/// encoding both count as a mismatch.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature_b64: &str) -> bool {
    let Ok(signature) = URL_SAFE_NO_PAD.decode(signature_b64) else {
        return false;
    };

    let mut mac = keyed_mac(secret);
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000_000;

    fn codec() -> PromptTokenCodec {
        PromptTokenCodec::new("test-secret").unwrap()
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(
            PromptTokenCodec::new("").unwrap_err(),
            ConfigError::MissingCookieSecret
        );
    }

    #[test]
    fn minted_token_validates() {
        let token = codec().mint("prompt-123");
        assert_eq!(codec().validate(&token).as_deref(), Some("prompt-123"));
    }

    #[test]
    fn minted_payload_carries_every_field() {
        let codec = codec();
        let token = codec.mint_at("id \"with\" quotes\n", 60, NOW);
        let payload = codec.decode(&token).unwrap();
        assert_eq!(payload.prompt_id, "id \"with\" quotes\n");
        assert_eq!(payload.issued_at, NOW);
        assert_eq!(payload.expires_at, NOW + 60_000);
    }

    #[test]
    fn token_has_single_delimiter() {
        let token = codec().mint_at("abc", 60, NOW);
        assert_eq!(token.matches('.').count(), 1);
    }

    #[test]
    fn expires_after_ttl() {
        let codec = codec();
        let token = codec.mint_at("abc", 1, NOW);
        assert_eq!(codec.validate_at(&token, NOW + 999).as_deref(), Some("abc"));
        assert_eq!(codec.validate_at(&token, NOW + 1_000), None);
        assert!(matches!(codec.check_at(&token, NOW + 5_000), TokenState::Expired(_)));
    }

    #[test]
    fn zero_ttl_is_immediately_expired() {
        let codec = codec();
        let token = codec.mint_at("abc", 0, NOW);
        assert_eq!(codec.validate_at(&token, NOW), None);
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = codec().mint_at("abc", 60, NOW);
        let other = PromptTokenCodec::new("another-secret").unwrap();
        assert_eq!(other.check_at(&token, NOW), TokenState::Invalid);
    }

    #[test]
    fn malformed_inputs_return_none() {
        let codec = codec();
        for token in ["", "no-dot-here", "a.b.c", ".", "abc.", ".abc", "!!!.???"] {
            assert_eq!(codec.validate_at(token, NOW), None, "token {token:?}");
        }
    }

    #[test]
    fn signed_garbage_payload_is_rejected() {
        let codec = codec();
        let body = b"not json";
        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(body),
            compute_signature(b"test-secret", body)
        );
        assert!(codec.decode(&token).is_none());
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let codec = codec();
        let token = codec.mint_at("abc", 60, NOW);
        let truncated = &token[..token.len() - 4];
        assert_eq!(codec.validate_at(truncated, NOW), None);
    }

    #[test]
    fn swapped_payload_is_rejected() {
        let codec = codec();
        let a = codec.mint_at("alice", 60, NOW);
        let b = codec.mint_at("bob", 60, NOW);
        let (payload_a, _) = a.rsplit_once('.').unwrap();
        let (_, sig_b) = b.rsplit_once('.').unwrap();
        assert_eq!(codec.validate_at(&format!("{payload_a}.{sig_b}"), NOW), None);
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", codec());
        assert!(!rendered.contains("test-secret"));
    }

    proptest! {
        #[test]
        fn round_trips_any_prompt_id(prompt_id in ".*", ttl in 1u64..10_000_000) {
            let codec = codec();
            let token = codec.mint_at(&prompt_id, ttl, NOW);
            prop_assert_eq!(codec.validate_at(&token, NOW), Some(prompt_id));
        }

        #[test]
        fn flipped_signature_byte_is_rejected(idx in 0usize..32, bit in 0u8..8) {
            let codec = codec();
            let token = codec.mint_at("abc", 60, NOW);
            let (payload, signature) = token.rsplit_once('.').unwrap();
            let mut raw = URL_SAFE_NO_PAD.decode(signature).unwrap();
            raw[idx] ^= 1 << bit;
            let forged = format!("{payload}.{}", URL_SAFE_NO_PAD.encode(raw));
            prop_assert_eq!(codec.validate_at(&forged, NOW), None);
        }
    }
}
