//! CLI command handlers.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use truckparts_core::config::Config;
use truckparts_core::gateway::Gateway;
use truckparts_core::notify::{Navigator, Notice, NoticeLevel, Notifier};
use truckparts_core::session::SessionController;
use truckparts_core::storage::{FileStorage, LocalStorage};
use truckparts_core::token_store::TokenStore;

pub mod auth;
pub mod config;
pub mod password;
pub mod profile;
pub mod request;

/// Prints notices to stderr.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        let label = match notice.level {
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        eprintln!("{label}: {}: {}", notice.title, notice.description);
    }
}

/// A terminal has no views to leave; redirects only move the tracked route.
struct TerminalNavigator {
    current: Mutex<String>,
}

impl TerminalNavigator {
    fn new(route: &str) -> Self {
        Self {
            current: Mutex::new(route.to_string()),
        }
    }
}

impl Navigator for TerminalNavigator {
    fn current_path(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn hard_redirect(&self, path: &str) {
        tracing::debug!(path, "redirect");
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = path.to_string();
    }
}

/// Builds a controller over the on-disk session store.
///
/// `route` plays the role of the view the user is on; failed refreshes on the
/// profile route do not schedule a redirect.
pub(crate) fn session_controller(config: &Config, route: &str) -> Result<SessionController> {
    let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::open_default());
    let gateway = Gateway::new(
        config,
        TokenStore::new(storage),
        Arc::new(TerminalNotifier),
        Arc::new(TerminalNavigator::new(route)),
    )?;
    Ok(SessionController::new(Arc::new(gateway)))
}

/// Reads one line from stdin, prompting on stderr when interactive.
pub(crate) fn read_line(prompt: &str) -> Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("{prompt}");
        io::stderr().flush()?;
    }

    let mut input = String::new();
    stdin
        .lock()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;
    let value = input.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        bail!("{} cannot be empty", prompt.trim_end_matches([':', ' ']));
    }
    Ok(value)
}

/// Splits repeated `KEY=VALUE` arguments.
pub(crate) fn parse_pairs(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            let (key, value) = arg
                .split_once('=')
                .with_context(|| format!("Expected KEY=VALUE, got '{arg}'"))?;
            let key = key.trim();
            if key.is_empty() {
                bail!("Expected KEY=VALUE, got '{arg}'");
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

pub(crate) fn print_json(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to format response")?
    );
    Ok(())
}
