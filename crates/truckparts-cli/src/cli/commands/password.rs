//! Password command handlers.

use anyhow::{Result, bail};
use truckparts_core::account;
use truckparts_core::config::Config;
use truckparts_core::session::SessionState;

use super::{read_line, session_controller};

pub async fn change(config: &Config) -> Result<()> {
    let current = read_line("Current password: ")?;
    let new = read_line("New password: ")?;

    let controller = session_controller(config, &config.profile_path)?;
    if !matches!(controller.bootstrap().await, SessionState::Authenticated(_)) {
        bail!("Not logged in. Run `truckparts login` first.");
    }

    account::change_password(controller.gateway(), &current, &new).await?;
    println!("✓ Password changed");
    Ok(())
}

pub async fn reset(config: &Config, email: &str) -> Result<()> {
    let controller = session_controller(config, "/")?;
    account::request_password_reset(controller.gateway(), email).await?;
    println!("✓ If {email} belongs to an account, a reset link is on its way");
    Ok(())
}

pub async fn confirm(config: &Config, token: &str) -> Result<()> {
    let controller = session_controller(config, "/")?;
    let gateway = controller.gateway();
    if !account::validate_reset_token(gateway, token).await? {
        bail!("Reset token is invalid or expired");
    }

    let new = read_line("New password: ")?;
    account::confirm_password_reset(gateway, token, &new).await?;
    println!("✓ Password reset. Run `truckparts login` to sign in.");
    Ok(())
}
