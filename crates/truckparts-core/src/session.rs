//! Session lifecycle: bootstrap from storage, login, logout, profile updates.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::watch;

use crate::gateway::Gateway;
use crate::jwt;
use crate::models::{LoginCredentials, RawTokenResponse, RegisterData, Session, UserProfile};
use crate::token_store::{StoredAuth, mask_token};

/// Observable authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// Initial state, until [`SessionController::bootstrap`] finishes.
    Validating,
    Authenticated(Session),
    /// The stored access token expired; a refresh is in flight.
    RefreshingInBackground,
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

pub struct SessionController {
    gateway: Arc<Gateway>,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let (state, _) = watch::channel(SessionState::Validating);
        Self { gateway, state }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Authenticated here and holding a token in the gateway. A session the
    /// gateway dropped after a failed refresh no longer counts.
    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Authenticated(_))
            && self.gateway.is_authenticated()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().session().map(|s| s.user.clone())
    }

    pub fn has_admin_access(&self) -> bool {
        self.user().is_some_and(|u| u.has_admin_access())
    }

    /// Restores the stored session, refreshing it when the access token expired.
    ///
    /// Never fails: anything that cannot be recovered ends `Unauthenticated`.
    pub async fn bootstrap(&self) -> SessionState {
        self.set_state(SessionState::Validating);

        let Some(stored) = self.gateway.store().read() else {
            tracing::debug!("no stored session");
            return self.set_state(SessionState::Unauthenticated);
        };

        if !jwt::is_expired(&stored.token) {
            tracing::debug!(token = %mask_token(&stored.token), "restored session");
            self.gateway.set_auth_token(Some(stored.token.clone()));
            return self.set_state(SessionState::Authenticated(stored.into()));
        }

        if stored.refresh.is_empty() || jwt::is_expired(&stored.refresh) {
            tracing::info!("stored session expired");
            self.drop_session();
            return self.set_state(SessionState::Unauthenticated);
        }

        self.set_state(SessionState::RefreshingInBackground);
        self.refresh_stored(stored).await
    }

    async fn refresh_stored(&self, stored: StoredAuth) -> SessionState {
        match self.gateway.refresh_tokens().await {
            Ok(pair) => {
                let session = Session::from(stored).with_tokens(&pair);
                self.set_state(SessionState::Authenticated(session))
            }
            Err(e) => {
                tracing::info!("could not refresh stored session: {e}");
                self.drop_session();
                self.set_state(SessionState::Unauthenticated)
            }
        }
    }

    /// Persists `session` and makes it current.
    ///
    /// # Errors
    /// Returns an error if the session cannot be written to storage.
    pub fn login(&self, session: Session) -> Result<()> {
        self.gateway
            .store()
            .store(&session)
            .context("Failed to save session")?;
        self.gateway
            .set_auth_token(Some(session.access_token.clone()));
        tracing::info!(user = session.user.id, "session started");
        self.set_state(SessionState::Authenticated(session));
        Ok(())
    }

    /// Signs in against the backend, fetching the profile with the new token
    /// when the login response does not include it.
    ///
    /// The previous session stays current, in memory and in storage, until
    /// the new one is complete.
    ///
    /// # Errors
    /// Returns the gateway error (an [`crate::error::ApiError`]) or a storage error.
    pub async fn login_with(&self, credentials: &LoginCredentials) -> Result<Session> {
        let auth = self.gateway.login(credentials).await?;
        let user = match auth.user {
            Some(user) => user,
            None => self.gateway.user_for_token(&auth.tokens.access).await?,
        };

        let session = Session {
            access_token: auth.tokens.access,
            refresh_token: auth.tokens.refresh.unwrap_or_default(),
            user,
        };
        self.login(session.clone())?;
        Ok(session)
    }

    /// Registers a user. When the backend answers with tokens and a user the
    /// new account is signed in right away.
    ///
    /// # Errors
    /// Returns the gateway error or a storage error.
    pub async fn register(&self, data: RegisterData) -> Result<Value> {
        let payload = self.gateway.register(data).await?;

        let tokens = serde_json::from_value::<RawTokenResponse>(payload.clone())
            .ok()
            .and_then(RawTokenResponse::normalize);
        let user = payload
            .get("user")
            .and_then(|u| serde_json::from_value::<UserProfile>(u.clone()).ok());

        if let (Some(tokens), Some(user)) = (tokens, user) {
            self.login(Session {
                access_token: tokens.access,
                refresh_token: tokens.refresh.unwrap_or_default(),
                user,
            })?;
        }

        Ok(payload)
    }

    /// Ends the session everywhere it can and sends the user to the login view.
    pub async fn logout(&self) {
        self.gateway.logout().await;
        self.set_state(SessionState::Unauthenticated);
        self.gateway
            .navigator()
            .hard_redirect(&self.gateway.config().login_path);
    }

    /// Updates the profile on the backend and in the cached session.
    ///
    /// # Errors
    /// Returns the gateway error or a storage error.
    pub async fn update_profile(&self, patch: &Value) -> Result<UserProfile> {
        let user = self.gateway.update_current_user(patch).await?;
        self.gateway
            .store()
            .store_profile(&user)
            .context("Failed to save updated profile")?;

        self.state.send_modify(|state| {
            if let SessionState::Authenticated(session) = state {
                session.user = user.clone();
            }
        });
        Ok(user)
    }

    fn drop_session(&self) {
        self.gateway.clear_auth_token();
        self.gateway
            .navigator()
            .hard_redirect(&self.gateway.config().login_path);
    }

    fn set_state(&self, state: SessionState) -> SessionState {
        self.state.send_replace(state.clone());
        state
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
