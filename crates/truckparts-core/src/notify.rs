//! User-facing side effects of the session layer: transient notices and
//! hard navigations. Front ends supply their own implementations.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// A transient, non-blocking notification (toast/banner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            description: description.into(),
        }
    }

    pub(crate) fn access_denied() -> Self {
        Self::error(
            "Access denied",
            "You don't have permission to perform this action",
        )
    }

    pub(crate) fn rate_limited() -> Self {
        Self::warning(
            "Too many requests",
            "Please wait a moment before trying again",
        )
    }

    pub(crate) fn session_expired() -> Self {
        Self::error("Session expired", "Please sign in again")
    }

    pub(crate) fn logout_failed() -> Self {
        Self::warning("Logout error", "The session was closed locally")
    }
}

/// Receives transient notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Navigation surface of the host application.
pub trait Navigator: Send + Sync {
    /// Route the user is currently on.
    fn current_path(&self) -> String;

    /// Leaves the current view, discarding all in-memory state.
    fn hard_redirect(&self, path: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Warning => {
                tracing::warn!(title = %notice.title, "{}", notice.description);
            }
            NoticeLevel::Error => {
                tracing::error!(title = %notice.title, "{}", notice.description);
            }
        }
    }
}

/// Notifier that keeps every notice, for tests and for hosts that render later.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}

/// Navigator with a settable current path that records redirects.
#[derive(Debug)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new(current_path: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(current_path.into()),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn set_current_path(&self, path: impl Into<String>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = path.into();
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for RecordingNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn hard_redirect(&self, path: &str) {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
        self.set_current_path(path);
    }
}
