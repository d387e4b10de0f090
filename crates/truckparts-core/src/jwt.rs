//! JWT expiry inspection.
//!
//! Tokens are decoded without signature verification; the backend remains the
//! authority. Everything here is fail-closed: a token whose expiry cannot be
//! determined is treated as expired.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

/// Returns the `exp` claim (seconds since epoch), if the token carries a numeric one.
pub fn expiry_secs(token: &str) -> Option<i64> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    // Some issuers pad the payload; the URL-safe engine here does not accept padding.
    let payload = parts[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let json: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = json.get("exp")?;
    exp.as_i64()
        .or_else(|| exp.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
}

/// Returns the token's expiry as a timestamp.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    expiry_secs(token).and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// True if the token is expired at `now`, or its expiry cannot be determined.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => exp <= now,
        None => {
            tracing::debug!("token has no decodable exp claim; treating as expired");
            true
        }
    }
}

/// True if the token is expired now, or its expiry cannot be determined.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// Builds an unsigned token carrying `claims`. Only meant for tests and fixtures.
pub fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn token_expiring_in(offset: Duration) -> String {
        unsigned_token(&json!({ "exp": (Utc::now() + offset).timestamp(), "user_id": 7 }))
    }

    #[test]
    fn test_past_expiry_is_expired() {
        assert!(is_expired(&token_expiring_in(Duration::minutes(-5))));
        assert!(is_expired(&token_expiring_in(Duration::seconds(-1))));
    }

    #[test]
    fn test_future_expiry_is_not_expired() {
        assert!(!is_expired(&token_expiring_in(Duration::minutes(5))));
        assert!(!is_expired(&token_expiring_in(Duration::days(7))));
    }

    #[test]
    fn test_malformed_tokens_are_expired() {
        for token in ["", "abc", "a.b", "a.b.c.d", "x.!!!.y", "header.e30.sig"] {
            assert!(is_expired(token), "{token:?} should be expired");
        }
    }

    #[test]
    fn test_missing_or_non_numeric_exp_is_expired() {
        assert!(is_expired(&unsigned_token(&json!({ "sub": "1" }))));
        assert!(is_expired(&unsigned_token(&json!({ "exp": "tomorrow" }))));
        assert!(is_expired(&unsigned_token(&json!({ "exp": null }))));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let token = unsigned_token(&json!({ "exp": now.timestamp() }));
        let exp = DateTime::from_timestamp(now.timestamp(), 0).unwrap();

        assert!(is_expired_at(&token, exp));
        assert!(!is_expired_at(&token, exp - Duration::seconds(1)));
    }

    #[test]
    fn test_expires_at_decodes_claim() {
        let token = unsigned_token(&json!({ "exp": 1_900_000_000 }));
        assert_eq!(expiry_secs(&token), Some(1_900_000_000));
        assert_eq!(
            expires_at(&token).unwrap().timestamp(),
            1_900_000_000
        );
    }
}
