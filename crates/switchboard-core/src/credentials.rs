//! Credential store: the two issued tokens and the per-variant selection rule.

use crate::error::StoreError;
use crate::shared::{now_ms, BackendVariant};
use crate::store::KvPort;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KEY_PRIMARY: &str = "credentials/primary";
const KEY_SECONDARY: &str = "credentials/secondary";
const KEY_EXPIRES_AT: &str = "credentials/expires_at_ms";

/// Default clock skew tolerated when reading `exp` claims.
const DEFAULT_SKEW_MS: i64 = 30_000;

/// Which of the two issued credentials accompanies a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Identity token; accepted by the direct and agent routes.
    Primary,
    /// Client-bound access token; required by the tool-orchestration gateway.
    Secondary,
}

impl CredentialKind {
    /// Pure function of the variant; the action never matters.
    pub fn for_variant(variant: BackendVariant) -> Self {
        match variant {
            BackendVariant::Gateway => CredentialKind::Secondary,
            BackendVariant::Direct | BackendVariant::Agent => CredentialKind::Primary,
        }
    }
}

/// The two credentials obtained once at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub primary: String,
    pub secondary: String,
    /// Explicit expiry; overrides the tokens' own `exp` claims when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
}

impl CredentialPair {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
            expires_at_ms: None,
        }
    }

    pub fn with_expiry(mut self, expires_at_ms: i64) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }

    pub fn get(&self, kind: CredentialKind) -> &str {
        match kind {
            CredentialKind::Primary => &self.primary,
            CredentialKind::Secondary => &self.secondary,
        }
    }

    /// Earliest known expiry of the pair, if any can be determined.
    pub fn expiry_ms(&self) -> Option<i64> {
        if let Some(at) = self.expires_at_ms {
            return Some(at);
        }
        [token_expiry_ms(&self.primary), token_expiry_ms(&self.secondary)]
            .into_iter()
            .flatten()
            .min()
    }
}

/// Reads the `exp` claim (seconds) of a JWT and returns it in milliseconds.
///
/// No signature check: the identity provider and the downstream gateway verify tokens.
/// Returns `None` for opaque tokens.
pub fn token_expiry_ms(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    exp.as_i64()
        .or_else(|| exp.as_f64().map(|f| f as i64))
        .map(|secs| secs.saturating_mul(1000))
}

/// Persists the credential pair behind a [`KvPort`].
pub struct CredentialStore {
    port: Arc<dyn KvPort>,
    skew_ms: i64,
}

impl CredentialStore {
    pub fn new(port: Arc<dyn KvPort>) -> Self {
        Self {
            port,
            skew_ms: DEFAULT_SKEW_MS,
        }
    }

    pub fn with_skew_ms(mut self, skew_ms: i64) -> Self {
        self.skew_ms = skew_ms.max(0);
        self
    }

    /// Credential for an outgoing call under `variant`. Evaluated per call, never cached,
    /// because the caller may switch variant between calls.
    pub fn get_credential(&self, variant: BackendVariant) -> Result<Option<String>, StoreError> {
        let key = match CredentialKind::for_variant(variant) {
            CredentialKind::Primary => KEY_PRIMARY,
            CredentialKind::Secondary => KEY_SECONDARY,
        };
        Ok(self.port.get(key)?.filter(|t| !t.is_empty()))
    }

    pub fn set_credentials(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        self.port.set(KEY_PRIMARY, &pair.primary)?;
        self.port.set(KEY_SECONDARY, &pair.secondary)?;
        match pair.expires_at_ms {
            Some(at) => self.port.set(KEY_EXPIRES_AT, &at.to_string())?,
            None => self.port.clear(KEY_EXPIRES_AT)?,
        }
        tracing::info!(target: "switchboard::auth", "credentials stored");
        Ok(())
    }

    /// The stored pair, if both halves are present.
    pub fn current(&self) -> Result<Option<CredentialPair>, StoreError> {
        let (Some(primary), Some(secondary)) = (self.port.get(KEY_PRIMARY)?, self.port.get(KEY_SECONDARY)?) else {
            return Ok(None);
        };
        let expires_at_ms = match self.port.get(KEY_EXPIRES_AT)? {
            Some(raw) => Some(raw.parse::<i64>().map_err(|e| StoreError::Corrupt {
                key: KEY_EXPIRES_AT.to_string(),
                message: e.to_string(),
            })?),
            None => None,
        };
        Ok(Some(CredentialPair {
            primary,
            secondary,
            expires_at_ms,
        }))
    }

    /// Clears both credentials unconditionally.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.port.clear(KEY_PRIMARY)?;
        self.port.clear(KEY_SECONDARY)?;
        self.port.clear(KEY_EXPIRES_AT)?;
        tracing::info!(target: "switchboard::auth", "credentials cleared");
        Ok(())
    }

    pub fn is_expired(&self, pair: &CredentialPair) -> bool {
        self.is_expired_at(pair, now_ms())
    }

    /// True when the pair's earliest expiry (less skew) is at or before `now_ms`.
    /// Pairs without a determinable expiry never expire client-side.
    pub fn is_expired_at(&self, pair: &CredentialPair, now_ms: i64) -> bool {
        pair.expiry_ms()
            .map(|exp| exp - self.skew_ms <= now_ms)
            .unwrap_or(false)
    }

    /// Clears the stored pair if it has expired. Returns whether anything was cleared.
    pub fn clear_if_expired(&self) -> Result<bool, StoreError> {
        match self.current()? {
            Some(pair) if self.is_expired(&pair) => {
                tracing::warn!(target: "switchboard::auth", "stored credentials expired");
                self.clear()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryKv;

    /// Unsigned JWT with the given `exp` (seconds).
    pub(crate) fn jwt_with_exp(exp_secs: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","exp":{}}}"#, exp_secs));
        format!("{}.{}.sig", header, claims)
    }

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn gateway_uses_secondary_everyone_else_primary() {
        let store = store();
        store.set_credentials(&CredentialPair::new("id-token", "access-token")).unwrap();
        assert_eq!(store.get_credential(BackendVariant::Gateway).unwrap().as_deref(), Some("access-token"));
        assert_eq!(store.get_credential(BackendVariant::Direct).unwrap().as_deref(), Some("id-token"));
        assert_eq!(store.get_credential(BackendVariant::Agent).unwrap().as_deref(), Some("id-token"));
    }

    #[test]
    fn missing_credentials_yield_none() {
        let store = store();
        assert_eq!(store.get_credential(BackendVariant::Direct).unwrap(), None);
        assert_eq!(store.current().unwrap(), None);
    }

    #[test]
    fn clear_removes_both_halves() {
        let store = store();
        store.set_credentials(&CredentialPair::new("a", "b").with_expiry(42)).unwrap();
        assert_eq!(store.current().unwrap().unwrap().expires_at_ms, Some(42));
        store.clear().unwrap();
        assert_eq!(store.current().unwrap(), None);
        assert_eq!(store.get_credential(BackendVariant::Gateway).unwrap(), None);
    }

    #[test]
    fn exp_claim_is_decoded() {
        assert_eq!(token_expiry_ms(&jwt_with_exp(1_700_000_000)), Some(1_700_000_000_000));
        assert_eq!(token_expiry_ms("opaque-token"), None);
        assert_eq!(token_expiry_ms("a.b"), None);
    }

    #[test]
    fn expiry_uses_earliest_token_and_skew() {
        let store = store().with_skew_ms(1_000);
        let pair = CredentialPair::new(jwt_with_exp(100), jwt_with_exp(50));
        assert!(store.is_expired_at(&pair, 49_000));
        assert!(!store.is_expired_at(&pair, 48_999));
    }

    #[test]
    fn explicit_expiry_overrides_claims_and_opaque_tokens_never_expire() {
        let store = store().with_skew_ms(0);
        let opaque = CredentialPair::new("a", "b");
        assert!(!store.is_expired_at(&opaque, i64::MAX));
        let explicit = CredentialPair::new(jwt_with_exp(10_000), "b").with_expiry(5);
        assert!(store.is_expired_at(&explicit, 5));
    }

    #[test]
    fn clear_if_expired_only_clears_expired_pairs() {
        let store = store();
        store.set_credentials(&CredentialPair::new("a", "b").with_expiry(now_ms() + 3_600_000)).unwrap();
        assert!(!store.clear_if_expired().unwrap());
        store.set_credentials(&CredentialPair::new("a", "b").with_expiry(1)).unwrap();
        assert!(store.clear_if_expired().unwrap());
        assert_eq!(store.current().unwrap(), None);
    }
}
