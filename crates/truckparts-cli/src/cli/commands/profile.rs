//! Profile command handlers.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use truckparts_core::config::Config;
use truckparts_core::session::{SessionController, SessionState};

use super::{parse_pairs, print_json, session_controller};

pub async fn show(config: &Config) -> Result<()> {
    let controller = signed_in(config).await?;
    let user = controller.user().context("No cached profile")?;
    print_json(&serde_json::to_value(&user).context("Failed to format profile")?)
}

pub async fn update(config: &Config, fields: &[String]) -> Result<()> {
    let patch = patch_from_pairs(&parse_pairs(fields)?);

    let controller = signed_in(config).await?;
    let user = controller.update_profile(&patch).await?;
    println!("✓ Profile updated for {}", user.display_name());
    Ok(())
}

async fn signed_in(config: &Config) -> Result<SessionController> {
    let controller = session_controller(config, &config.profile_path)?;
    if !matches!(controller.bootstrap().await, SessionState::Authenticated(_)) {
        bail!("Not logged in. Run `truckparts login` first.");
    }
    Ok(controller)
}

/// `true`/`false` become booleans; everything else is sent as a string.
fn patch_from_pairs(pairs: &[(String, String)]) -> Value {
    let map: Map<String, Value> = pairs
        .iter()
        .map(|(key, value)| {
            let value = match value.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => Value::String(other.to_string()),
            };
            (key.clone(), value)
        })
        .collect();
    Value::Object(map)
}
