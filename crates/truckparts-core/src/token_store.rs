//! Durable client-side session storage.
//!
//! Tokens are stored in plaintext under both the current and the legacy keys;
//! the profile is stored as an obfuscated blob (see [`crate::obfuscate`]).
//! Tokens are never logged or displayed in full.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{Session, TokenPair, UserProfile};
use crate::obfuscate::ProfileCipher;
use crate::storage::{LocalStorage, keys};

/// What [`TokenStore::read`] hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAuth {
    pub token: String,
    /// Empty when no refresh token was stored.
    pub refresh: String,
    pub user: UserProfile,
}

impl From<StoredAuth> for Session {
    fn from(auth: StoredAuth) -> Self {
        Session {
            access_token: auth.token,
            refresh_token: auth.refresh,
            user: auth.user,
        }
    }
}

#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn LocalStorage>,
    cipher: ProfileCipher,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self::with_cipher(storage, ProfileCipher::embedded())
    }

    pub fn with_cipher(storage: Arc<dyn LocalStorage>, cipher: ProfileCipher) -> Self {
        Self { storage, cipher }
    }

    /// Persists a full session.
    ///
    /// Profile first, access token last. Over an empty store an interrupted
    /// write leaves no readable session. Over an existing one it can leave the
    /// new profile next to the previous tokens, never new tokens next to the
    /// previous profile.
    ///
    /// # Errors
    /// Returns an error if the profile cannot be sealed or storage rejects a write.
    pub fn store(&self, session: &Session) -> Result<()> {
        let blob = self.cipher.seal_json(&session.user)?;
        self.storage
            .set_item(keys::USER_INFO, &blob)
            .context("Failed to store user profile")?;
        self.write_refresh(&session.refresh_token)?;
        self.write_access(&session.access_token)
    }

    /// Persists a refreshed token pair, leaving the profile untouched.
    /// A pair without a refresh token keeps the stored one.
    ///
    /// # Errors
    /// Returns an error if storage rejects a write.
    pub fn store_tokens(&self, pair: &TokenPair) -> Result<()> {
        if let Some(refresh) = pair.refresh.as_deref().filter(|r| !r.is_empty()) {
            self.write_refresh(refresh)?;
        }
        self.write_access(&pair.access)
    }

    /// Replaces the cached profile of the stored session.
    ///
    /// # Errors
    /// Returns an error if the profile cannot be sealed or written.
    pub fn store_profile(&self, user: &UserProfile) -> Result<()> {
        let blob = self.cipher.seal_json(user)?;
        self.storage
            .set_item(keys::USER_INFO, &blob)
            .context("Failed to store user profile")
    }

    /// Returns the stored session, or `None` when there is no usable one.
    ///
    /// A blob that fails to decrypt is treated exactly like a missing one.
    pub fn read(&self) -> Option<StoredAuth> {
        let token = self.access_token()?;
        let blob = match self.storage.get_item(keys::USER_INFO) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read stored profile: {e:#}");
                return None;
            }
        };

        let user = match self.cipher.open_json::<UserProfile>(&blob) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Error decrypting user info: {e:#}");
                return None;
            }
        };

        Some(StoredAuth {
            token,
            refresh: self.refresh_token().unwrap_or_default(),
            user,
        })
    }

    /// Stored access token, current key first, then the legacy alias.
    pub fn access_token(&self) -> Option<String> {
        self.lookup(&[keys::ACCESS_TOKEN, keys::ACCESS_LEGACY])
    }

    /// Stored refresh token, current key first, then the legacy alias.
    pub fn refresh_token(&self) -> Option<String> {
        self.lookup(&[keys::REFRESH_TOKEN, keys::REFRESH_LEGACY])
    }

    /// Removes every session key. Safe to call with nothing stored.
    pub fn clear(&self) {
        for key in keys::SESSION_KEYS {
            if let Err(e) = self.storage.remove_item(key) {
                tracing::warn!(key, "Failed to clear stored session key: {e:#}");
            }
        }
    }

    fn lookup(&self, candidates: &[&str]) -> Option<String> {
        candidates.iter().find_map(|key| {
            self.storage
                .get_item(key)
                .inspect_err(|e| tracing::warn!(key, "Failed to read storage: {e:#}"))
                .ok()
                .flatten()
                .filter(|v| is_usable_token(v))
        })
    }

    fn write_access(&self, token: &str) -> Result<()> {
        self.storage
            .set_item(keys::ACCESS_TOKEN, token)
            .context("Failed to store access token")?;
        if let Err(e) = self.storage.set_item(keys::ACCESS_LEGACY, token) {
            tracing::debug!("Failed to store legacy access token: {e:#}");
        }
        Ok(())
    }

    fn write_refresh(&self, token: &str) -> Result<()> {
        self.storage
            .set_item(keys::REFRESH_TOKEN, token)
            .context("Failed to store refresh token")?;
        if let Err(e) = self.storage.set_item(keys::REFRESH_LEGACY, token) {
            tracing::debug!("Failed to store legacy refresh token: {e:#}");
        }
        Ok(())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

/// Stringified JS sentinels written by older clients are not tokens.
fn is_usable_token(value: &str) -> bool {
    !value.is_empty() && value != "undefined" && value != "null"
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 16 || !token.is_char_boundary(12) {
        return "***".to_string();
    }
    format!("{}...", &token[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn user() -> UserProfile {
        UserProfile {
            id: 42,
            name: "Ana".to_string(),
            last_name: "Diaz".to_string(),
            phone_number: "+5355555555".to_string(),
            email: Some("ana@example.com".to_string()),
            role: "admin".to_string(),
            is_staff: true,
            is_superuser: false,
            is_active: true,
        }
    }

    fn session() -> Session {
        Session {
            access_token: "A1".to_string(),
            refresh_token: "R1".to_string(),
            user: user(),
        }
    }

    fn store() -> (Arc<MemoryStorage>, TokenStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(Arc::clone(&storage) as Arc<dyn LocalStorage>);
        (storage, store)
    }

    #[test]
    fn test_store_then_read_roundtrips_profile() {
        let (_, store) = store();
        store.store(&session()).unwrap();

        let auth = store.read().unwrap();
        assert_eq!(auth.token, "A1");
        assert_eq!(auth.refresh, "R1");
        assert_eq!(auth.user, user());
        assert_eq!(Session::from(auth), session());
    }

    #[test]
    fn test_store_writes_current_and_legacy_keys() {
        let (storage, store) = store();
        store.store(&session()).unwrap();

        for (key, expected) in [
            (keys::ACCESS_TOKEN, "A1"),
            (keys::ACCESS_LEGACY, "A1"),
            (keys::REFRESH_TOKEN, "R1"),
            (keys::REFRESH_LEGACY, "R1"),
        ] {
            assert_eq!(storage.get_item(key).unwrap().as_deref(), Some(expected));
        }
        let blob = storage.get_item(keys::USER_INFO).unwrap().unwrap();
        assert!(!blob.contains("Ana"));
    }

    #[test]
    fn test_read_after_clear_is_none() {
        let (storage, store) = store();
        store.store(&session()).unwrap();
        storage.set_item("theme", "dark").unwrap();

        store.clear();
        store.clear();

        assert!(store.read().is_none());
        assert_eq!(storage.len(), 1, "unrelated keys survive");
    }

    #[test]
    fn test_read_requires_token_and_profile() {
        let (storage, store) = store();
        assert!(store.read().is_none());

        storage.set_item(keys::ACCESS_TOKEN, "A1").unwrap();
        assert!(store.read().is_none());

        store.store_profile(&user()).unwrap();
        storage.remove_item(keys::ACCESS_TOKEN).unwrap();
        assert!(store.read().is_none());
    }

    #[test]
    fn test_corrupted_profile_reads_as_no_session() {
        let (storage, store) = store();
        store.store(&session()).unwrap();
        storage.set_item(keys::USER_INFO, "garbage").unwrap();

        assert!(store.read().is_none());
    }

    #[test]
    fn test_legacy_keys_are_read() {
        let (storage, store) = store();
        store.store_profile(&user()).unwrap();
        storage.set_item(keys::ACCESS_LEGACY, "OLD").unwrap();
        storage.set_item(keys::REFRESH_LEGACY, "OLDR").unwrap();

        let auth = store.read().unwrap();
        assert_eq!(auth.token, "OLD");
        assert_eq!(auth.refresh, "OLDR");
    }

    #[test]
    fn test_sentinel_tokens_are_ignored() {
        let (storage, store) = store();
        store.store_profile(&user()).unwrap();
        storage.set_item(keys::ACCESS_TOKEN, "undefined").unwrap();
        storage.set_item(keys::ACCESS_LEGACY, "null").unwrap();

        assert!(store.access_token().is_none());
        assert!(store.read().is_none());
    }

    #[test]
    fn test_missing_refresh_defaults_to_empty() {
        let (storage, store) = store();
        store.store_profile(&user()).unwrap();
        storage.set_item(keys::ACCESS_TOKEN, "A1").unwrap();

        assert_eq!(store.read().unwrap().refresh, "");
    }

    #[test]
    fn test_store_tokens_keeps_refresh_when_absent() {
        let (_, store) = store();
        store.store(&session()).unwrap();

        store
            .store_tokens(&TokenPair {
                access: "A2".to_string(),
                refresh: None,
            })
            .unwrap();
        let auth = store.read().unwrap();
        assert_eq!(auth.token, "A2");
        assert_eq!(auth.refresh, "R1");
        assert_eq!(auth.user, user());

        store
            .store_tokens(&TokenPair {
                access: "A3".to_string(),
                refresh: Some("R3".to_string()),
            })
            .unwrap();
        assert_eq!(store.refresh_token().as_deref(), Some("R3"));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("eyJhbGciOiJIUzI1NiJ9.payload"), "eyJhbGciOiJI...");
        assert_eq!(mask_token("short"), "***");
    }
}
