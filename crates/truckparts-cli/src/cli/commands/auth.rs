//! Auth command handlers.

use std::sync::Arc;

use anyhow::{Result, bail};
use truckparts_core::account;
use truckparts_core::config::{Config, paths};
use truckparts_core::jwt;
use truckparts_core::models::LoginCredentials;
use truckparts_core::session::SessionState;
use truckparts_core::storage::{FileStorage, LocalStorage};
use truckparts_core::token_store::{TokenStore, mask_token};

use super::{read_line, session_controller};

pub async fn login(
    config: &Config,
    phone: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_line("Password: ")?,
    };
    let credentials = match (phone, username) {
        (Some(phone), _) => LoginCredentials::phone(phone, password),
        (None, Some(username)) => LoginCredentials::username(username, password),
        (None, None) => bail!("Pass --phone or --username"),
    };

    let controller = session_controller(config, &config.login_path)?;
    let session = controller.login_with(&credentials).await?;

    println!(
        "✓ Logged in as {} (token: {})",
        session.user.display_name(),
        mask_token(&session.access_token)
    );
    println!("  Session saved to: {}", paths::storage_path().display());
    Ok(())
}

pub async fn logout(config: &Config, all: bool) -> Result<()> {
    let controller = session_controller(config, "/")?;
    if controller.gateway().store().access_token().is_none() {
        println!("Not logged in (no session found).");
        return Ok(());
    }

    if all {
        account::logout_all_sessions(controller.gateway()).await?;
        println!("✓ Logged out from all sessions");
        return Ok(());
    }

    controller.logout().await;
    println!("✓ Logged out");
    println!("  Session removed from: {}", paths::storage_path().display());
    Ok(())
}

/// Reports the stored session without contacting the backend.
pub fn status() -> Result<()> {
    let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::open_default());
    let store = TokenStore::new(storage);

    let Some(stored) = store.read() else {
        println!("Not logged in.");
        return Ok(());
    };

    println!("Logged in as {} ({})", stored.user.display_name(), stored.user.role);
    println!("  Access token:  {}", describe_token(&stored.token));
    if stored.refresh.is_empty() {
        println!("  Refresh token: none");
    } else {
        println!("  Refresh token: {}", describe_token(&stored.refresh));
    }
    println!(
        "  Admin access:  {}",
        if stored.user.has_admin_access() { "yes" } else { "no" }
    );
    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let controller = session_controller(config, "/")?;
    if !matches!(controller.bootstrap().await, SessionState::Authenticated(_)) {
        bail!("Not logged in. Run `truckparts login` first.");
    }

    let user = controller.gateway().current_user().await?;
    println!("{}", user.display_name());
    println!("  Phone: {}", user.phone_number);
    if let Some(email) = user.email.as_deref().filter(|e| !e.is_empty()) {
        println!("  Email: {email}");
    }
    println!("  Role:  {}", user.role);
    Ok(())
}

pub async fn refresh(config: &Config) -> Result<()> {
    let controller = session_controller(config, "/")?;
    let pair = controller.gateway().refresh_tokens().await?;
    println!("✓ Access token refreshed (token: {})", mask_token(&pair.access));
    if let Some(expires_at) = jwt::expires_at(&pair.access) {
        println!("  Expires at: {}", expires_at.to_rfc3339());
    }
    Ok(())
}

fn describe_token(token: &str) -> String {
    let masked = mask_token(token);
    match jwt::expires_at(token) {
        Some(at) if jwt::is_expired(token) => format!("{masked} (expired {})", at.to_rfc3339()),
        Some(at) => format!("{masked} (valid until {})", at.to_rfc3339()),
        None => format!("{masked} (no expiry)"),
    }
}
