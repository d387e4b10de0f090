//! Wire and domain types for the session layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jwt;

/// The cached identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_active: bool,
}

impl UserProfile {
    /// Whether this user may use the admin console.
    pub fn has_admin_access(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.phone_number.clone()
        } else {
            full.to_string()
        }
    }
}

/// Tokens plus cached profile representing a logged-in client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

impl Session {
    /// Expiry of the access token, derived from its `exp` claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        jwt::expires_at(&self.access_token)
    }

    /// Returns a copy carrying `pair`; a missing refresh token keeps the current one.
    #[must_use]
    pub fn with_tokens(&self, pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access.clone(),
            refresh_token: pair
                .refresh
                .clone()
                .unwrap_or_else(|| self.refresh_token.clone()),
            user: self.user.clone(),
        }
    }
}

/// Canonical token pair, independent of backend field naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: Option<String>,
}

/// Token fields as the backend may send them.
///
/// Older deployments answer `{access, refresh}`, newer ones
/// `{access_token, refresh_token}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTokenResponse {
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl RawTokenResponse {
    /// Normalizes to a [`TokenPair`]. `None` when no access token is present.
    pub fn normalize(self) -> Option<TokenPair> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        let access = non_empty(self.access).or_else(|| non_empty(self.access_token))?;
        let refresh = non_empty(self.refresh).or_else(|| non_empty(self.refresh_token));
        Some(TokenPair { access, refresh })
    }
}

/// Login payload. The admin console signs in by phone, the storefront by username.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LoginCredentials {
    Phone {
        phone_number: String,
        password: String,
    },
    Username {
        username: String,
        password: String,
    },
}

impl LoginCredentials {
    pub fn phone(phone_number: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Phone {
            phone_number: phone_number.into(),
            password: password.into(),
        }
    }

    pub fn username(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Username {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Normalized login response.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub tokens: TokenPair,
    pub user: Option<UserProfile>,
}

/// Registration payload.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
    pub name: String,
    pub last_name: String,
    pub home_address: String,
    pub phone_number: String,
}

impl RegisterData {
    /// Drops a blank email so the backend treats it as absent.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.email.as_deref().is_some_and(|e| e.trim().is_empty()) {
            self.email = None;
        }
        self
    }
}

/// A paginated list response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            id: 1,
            name: "Ana".to_string(),
            last_name: "Diaz".to_string(),
            phone_number: "+5355555555".to_string(),
            email: None,
            role: "client".to_string(),
            is_staff: false,
            is_superuser: false,
            is_active: true,
        }
    }

    #[test]
    fn test_normalize_accepts_both_conventions() {
        let short: RawTokenResponse =
            serde_json::from_value(json!({ "access": "A1", "refresh": "R1" })).unwrap();
        assert_eq!(
            short.normalize(),
            Some(TokenPair {
                access: "A1".to_string(),
                refresh: Some("R1".to_string())
            })
        );

        let long: RawTokenResponse =
            serde_json::from_value(json!({ "access_token": "A2", "refresh_token": "R2" }))
                .unwrap();
        assert_eq!(
            long.normalize(),
            Some(TokenPair {
                access: "A2".to_string(),
                refresh: Some("R2".to_string())
            })
        );
    }

    #[test]
    fn test_normalize_prefers_short_names_and_skips_empty() {
        let raw: RawTokenResponse = serde_json::from_value(
            json!({ "access": "", "access_token": "A3", "refresh": "R3", "refresh_token": "R4" }),
        )
        .unwrap();
        let pair = raw.normalize().unwrap();
        assert_eq!(pair.access, "A3");
        assert_eq!(pair.refresh.as_deref(), Some("R3"));

        let none: RawTokenResponse = serde_json::from_value(json!({ "detail": "x" })).unwrap();
        assert!(none.normalize().is_none());
    }

    #[test]
    fn test_profile_ignores_unknown_fields() {
        let user: UserProfile = serde_json::from_value(json!({
            "id": 9,
            "name": "Luis",
            "last_name": "Perez",
            "phone_number": "+53111",
            "email": "l@example.com",
            "role": "agent",
            "is_staff": true,
            "is_superuser": false,
            "is_active": true,
            "agent_profit": 12.5,
            "date_joined": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(user.email.as_deref(), Some("l@example.com"));
        assert!(user.has_admin_access());
    }

    #[test]
    fn test_with_tokens_keeps_refresh_when_missing() {
        let session = Session {
            access_token: "old".to_string(),
            refresh_token: "R".to_string(),
            user: profile(),
        };
        let updated = session.with_tokens(&TokenPair {
            access: "new".to_string(),
            refresh: None,
        });
        assert_eq!(updated.access_token, "new");
        assert_eq!(updated.refresh_token, "R");
        assert_eq!(updated.user, session.user);
    }

    #[test]
    fn test_login_credentials_serialize_flat() {
        let body = serde_json::to_value(LoginCredentials::phone("+5355555555", "secret1")).unwrap();
        assert_eq!(body, json!({ "phone_number": "+5355555555", "password": "secret1" }));

        let body = serde_json::to_value(LoginCredentials::username("ana", "pw")).unwrap();
        assert_eq!(body, json!({ "username": "ana", "password": "pw" }));
    }

    #[test]
    fn test_register_data_drops_blank_email() {
        let data = RegisterData {
            email: Some("  ".to_string()),
            password: "pw".to_string(),
            name: "Ana".to_string(),
            last_name: "Diaz".to_string(),
            home_address: "Calle 1".to_string(),
            phone_number: "+53".to_string(),
        }
        .normalized();
        let body = serde_json::to_value(&data).unwrap();
        assert!(body.get("email").is_none());
    }

    #[test]
    fn test_display_name_falls_back_to_phone() {
        let mut user = profile();
        assert_eq!(user.display_name(), "Ana Diaz");
        user.name.clear();
        user.last_name.clear();
        assert_eq!(user.display_name(), "+5355555555");
    }
}
