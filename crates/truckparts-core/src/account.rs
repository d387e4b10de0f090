//! Account maintenance endpoints: passwords, token checks, availability lookups.

use serde_json::{Value, json};

use crate::error::ApiResult;
use crate::gateway::{Gateway, RequestOptions};

pub const PASSWORD_RESET_PATH: &str = "/auth/password-reset/";
pub const PASSWORD_RESET_CONFIRM_PATH: &str = "/auth/password-reset-confirm/";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password/";
pub const VALIDATE_RESET_TOKEN_PATH: &str = "/auth/validate-reset-token/";
pub const LOGOUT_ALL_PATH: &str = "/auth/logout-all/";
pub const SECURITY_PATH: &str = "/security/";
pub const USERS_PATH: &str = "/api_data/user/";

/// Asks the backend to email a password reset link.
///
/// # Errors
/// Returns the normalized gateway error.
pub async fn request_password_reset(gateway: &Gateway, email: &str) -> ApiResult<()> {
    let _: Value = gateway
        .post(
            PASSWORD_RESET_PATH,
            &json!({ "email": email }),
            RequestOptions::skip_auth(),
        )
        .await?;
    Ok(())
}

/// # Errors
/// Returns the normalized gateway error.
pub async fn confirm_password_reset(gateway: &Gateway, token: &str, new_password: &str) -> ApiResult<()> {
    let _: Value = gateway
        .post(
            PASSWORD_RESET_CONFIRM_PATH,
            &json!({ "token": token, "new_password": new_password }),
            RequestOptions::skip_auth(),
        )
        .await?;
    Ok(())
}

/// Changes the signed-in user's password.
///
/// # Errors
/// Returns the normalized gateway error.
pub async fn change_password(gateway: &Gateway, current_password: &str, new_password: &str) -> ApiResult<()> {
    let _: Value = gateway
        .post(
            CHANGE_PASSWORD_PATH,
            &json!({ "current_password": current_password, "new_password": new_password }),
            RequestOptions::default(),
        )
        .await?;
    Ok(())
}

/// Whether a password reset token is still usable.
///
/// # Errors
/// Returns the normalized gateway error.
pub async fn validate_reset_token(gateway: &Gateway, token: &str) -> ApiResult<bool> {
    let body: Value = gateway
        .post(
            VALIDATE_RESET_TOKEN_PATH,
            &json!({ "token": token }),
            RequestOptions::skip_auth(),
        )
        .await?;
    Ok(valid_flag(&body).unwrap_or(false))
}

/// Revokes every session of the user, then drops the local one.
///
/// # Errors
/// Returns the normalized gateway error; the local session is kept in that case.
pub async fn logout_all_sessions(gateway: &Gateway) -> ApiResult<()> {
    let _: Value = gateway
        .post(LOGOUT_ALL_PATH, &Value::Null, RequestOptions::default())
        .await?;
    gateway.clear_auth_token();
    tracing::info!("all sessions revoked");
    Ok(())
}

/// Asks the backend whether the current access token is accepted.
///
/// A 2xx without an explicit `valid` flag counts as valid.
///
/// # Errors
/// Returns the normalized gateway error.
pub async fn verify_token(gateway: &Gateway) -> ApiResult<bool> {
    let body: Value = gateway.get(SECURITY_PATH, RequestOptions::default()).await?;
    Ok(valid_flag(&body).unwrap_or(true))
}

/// Whether no user is registered with `phone_number`. A failed lookup counts
/// as available.
pub async fn check_phone_availability(gateway: &Gateway, phone_number: &str) -> bool {
    check_availability(gateway, "phone_number", phone_number).await
}

/// Whether no user is registered with `email`. A failed lookup counts as
/// available.
pub async fn check_email_availability(gateway: &Gateway, email: &str) -> bool {
    check_availability(gateway, "email", email).await
}

async fn check_availability(gateway: &Gateway, field: &str, value: &str) -> bool {
    let result: ApiResult<Value> = gateway
        .get_query(USERS_PATH, &[(field, value)], RequestOptions::quiet())
        .await;
    match result {
        Ok(body) => !has_matches(&body),
        Err(e) => {
            tracing::debug!(field, "availability lookup failed, assuming available: {e}");
            true
        }
    }
}

/// Lookups answer with either a bare list or a paginated envelope.
fn has_matches(body: &Value) -> bool {
    match body {
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => {
            if let Some(Value::Array(results)) = map.get("results") {
                !results.is_empty()
            } else {
                map.get("count").and_then(Value::as_u64).unwrap_or(0) > 0
            }
        }
        _ => false,
    }
}

/// `valid` at the top level or inside a `data` envelope.
fn valid_flag(body: &Value) -> Option<bool> {
    body.get("valid")
        .or_else(|| body.get("data").and_then(|d| d.get("valid")))
        .and_then(Value::as_bool)
}
