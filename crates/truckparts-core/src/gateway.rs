//! Single point of outbound HTTP traffic.
//!
//! Every call goes through [`Gateway`], which attaches the bearer token,
//! classifies failures into [`ApiError`], and owns the 401 policy: one
//! single-flight refresh, then either a retryable error or a dropped session
//! with a delayed redirect to the login entry point.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::{ApiError, ApiErrorKind, ApiResult};
use crate::models::{AuthResponse, LoginCredentials, Paginated, RawTokenResponse, RegisterData, TokenPair, UserProfile};
use crate::notify::{Navigator, Notice, Notifier};
use crate::token_store::{TokenStore, mask_token};

/// Standard User-Agent header for requests.
pub const USER_AGENT: &str = concat!("truckparts/", env!("CARGO_PKG_VERSION"));

pub const LOGIN_PATH: &str = "/auth/";
pub const REFRESH_PATH: &str = "/auth/refresh/";
pub const REGISTER_PATH: &str = "/register/";
pub const LOGOUT_PATH: &str = "/logout/";
pub const CURRENT_USER_PATH: &str = "/user/";

const DEFAULT_PAGE_SIZE: &str = "20";

/// Per-call flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Send without a bearer token; a 401 is returned as-is.
    pub skip_auth: bool,
    /// Normalize errors only: no refresh, notifications or redirects.
    pub skip_error_handling: bool,
}

impl RequestOptions {
    pub const fn skip_auth() -> Self {
        Self {
            skip_auth: true,
            skip_error_handling: false,
        }
    }

    pub const fn quiet() -> Self {
        Self {
            skip_auth: false,
            skip_error_handling: true,
        }
    }
}

pub struct Gateway {
    http: reqwest::Client,
    config: Config,
    base_url: String,
    store: TokenStore,
    auth_token: RwLock<Option<String>>,
    refresh_lock: tokio::sync::Mutex<()>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
}

impl Gateway {
    /// Builds a gateway and loads the stored access token, if any.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        config: &Config,
        store: TokenStore,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        let auth_token = store.access_token();
        if let Some(token) = &auth_token {
            tracing::debug!(token = %mask_token(token), "loaded stored access token");
        }

        Ok(Self {
            http,
            base_url: config.base_url(),
            config: config.clone(),
            store,
            auth_token: RwLock::new(auth_token),
            refresh_lock: tokio::sync::Mutex::new(()),
            notifier,
            navigator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// The in-memory access token.
    pub fn auth_token(&self) -> Option<String> {
        self.auth_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sets the in-memory access token without touching storage.
    pub fn set_auth_token(&self, token: Option<String>) {
        *self
            .auth_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Drops the in-memory token and every stored session key.
    pub fn clear_auth_token(&self) {
        self.set_auth_token(None);
        self.store.clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token().is_some()
    }

    /// Makes `pair` current: in memory and in storage (current and legacy keys).
    pub fn apply_tokens(&self, pair: &TokenPair) {
        self.set_auth_token(Some(pair.access.clone()));
        if let Err(e) = self.store.store_tokens(pair) {
            tracing::warn!("Failed to persist tokens: {e:#}");
            self.notifier.notify(Notice::warning(
                "Session not saved",
                "The session could not be stored on this device",
            ));
        }
    }

    // ------------------------------------------------------------------
    // HTTP verbs
    // ------------------------------------------------------------------

    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, opts: RequestOptions) -> ApiResult<T> {
        self.request_json(Method::GET, path, opts, |r| r).await
    }

    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn post<B, T>(&self, path: &str, body: &B, opts: RequestOptions) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::POST, path, opts, |r| r.json(body))
            .await
    }

    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn put<B, T>(&self, path: &str, body: &B, opts: RequestOptions) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::PUT, path, opts, |r| r.json(body))
            .await
    }

    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn patch<B, T>(&self, path: &str, body: &B, opts: RequestOptions) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::PATCH, path, opts, |r| r.json(body))
            .await
    }

    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str, opts: RequestOptions) -> ApiResult<T> {
        self.request_json(Method::DELETE, path, opts, |r| r).await
    }

    /// GET with query parameters, sent as given.
    ///
    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        opts: RequestOptions,
    ) -> ApiResult<T> {
        self.request_json(Method::GET, path, opts, |r| r.query(query))
            .await
    }

    /// GET a paginated list.
    ///
    /// Params valued `"all"` or empty are dropped; `page=1` and `per_page=20`
    /// are sent unless overridden.
    ///
    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        opts: RequestOptions,
    ) -> ApiResult<Paginated<T>> {
        let query = pagination_query(params);
        self.request_json(Method::GET, path, opts, |r| r.query(&query))
            .await
    }

    /// Uploads `bytes` as the multipart `file` field.
    ///
    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn upload_file<T: DeserializeOwned>(
        &self,
        path: &str,
        file_name: &str,
        bytes: Vec<u8>,
        opts: RequestOptions,
    ) -> ApiResult<T> {
        let file_name = file_name.to_string();
        self.request_json(Method::POST, path, opts, move |r| {
            let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
            r.multipart(reqwest::multipart::Form::new().part("file", part))
        })
        .await
    }

    /// Streams a response body to `dest`. Returns the number of bytes written.
    ///
    /// # Errors
    /// Returns an error if the call fails (wrapping [`ApiError`]) or `dest`
    /// cannot be written.
    pub async fn download_file(&self, path: &str, dest: &Path, opts: RequestOptions) -> Result<u64> {
        let response = self.execute(Method::GET, path, opts, |r| r).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiError::from_transport(&e))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write to {}", dest.display()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed to write to {}", dest.display()))?;

        Ok(written)
    }

    // ------------------------------------------------------------------
    // Auth endpoints
    // ------------------------------------------------------------------

    /// Signs in. Neither memory nor storage is touched: the caller makes the
    /// tokens current once it has the matching profile.
    ///
    /// # Errors
    /// Returns the normalized error, or an invalid-response error when the
    /// backend answers without an access token.
    pub async fn login(&self, credentials: &LoginCredentials) -> ApiResult<AuthResponse> {
        let body: Value = self
            .post(LOGIN_PATH, credentials, RequestOptions::skip_auth())
            .await?;

        let tokens = parse_tokens(&body)
            .ok_or_else(|| ApiError::invalid_response(200, "Login response did not include an access token"))?;
        let user = body
            .get("user")
            .and_then(|u| serde_json::from_value::<UserProfile>(u.clone()).ok());

        tracing::info!(token = %mask_token(&tokens.access), "signed in");
        Ok(AuthResponse { tokens, user })
    }

    /// Registers a user. Returns the created-user payload untouched.
    ///
    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn register(&self, data: RegisterData) -> ApiResult<Value> {
        self.post(REGISTER_PATH, &data.normalized(), RequestOptions::skip_auth())
            .await
    }

    /// Exchanges the stored refresh token for a new pair and makes it current.
    ///
    /// Waits for any refresh already in flight.
    ///
    /// # Errors
    /// Returns a session-expired error when no refresh token is stored, or the
    /// normalized error of the refresh call.
    pub async fn refresh_tokens(&self) -> ApiResult<TokenPair> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Best-effort server-side logout followed by unconditional local cleanup.
    pub async fn logout(&self) {
        if let Some(refresh) = self.store.refresh_token() {
            let result: ApiResult<Value> = self
                .post(
                    LOGOUT_PATH,
                    &json!({ "refresh_token": refresh }),
                    RequestOptions::quiet(),
                )
                .await;
            if let Err(e) = result {
                tracing::warn!(status = ?e.status, "server logout failed: {e}");
                self.notifier.notify(Notice::logout_failed());
            }
        }
        self.clear_auth_token();
    }

    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn current_user(&self) -> ApiResult<UserProfile> {
        self.get(CURRENT_USER_PATH, RequestOptions::default()).await
    }

    /// Profile of the account behind `token`, which need not be the current one.
    ///
    /// Sent without interception: a 401 here never refreshes or drops the
    /// current session.
    ///
    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn user_for_token(&self, token: &str) -> ApiResult<UserProfile> {
        let response = self
            .dispatch(Method::GET, CURRENT_USER_PATH, Some(token), |r| r)
            .await?;
        decode_json(response).await
    }

    /// # Errors
    /// Returns the normalized error for any failed call.
    pub async fn update_current_user(&self, patch: &Value) -> ApiResult<UserProfile> {
        self.patch(CURRENT_USER_PATH, patch, RequestOptions::default())
            .await
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn request_json<T, F>(
        &self,
        method: Method,
        path: &str,
        opts: RequestOptions,
        customize: F,
    ) -> ApiResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let response = self.execute(method, path, opts, customize).await?;
        decode_json(response).await
    }

    /// Sends with interception: 401/403/429 policies run here.
    async fn execute<F>(
        &self,
        method: Method,
        path: &str,
        opts: RequestOptions,
        customize: F,
    ) -> ApiResult<Response>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let sent_token = if opts.skip_auth {
            None
        } else {
            self.auth_token()
        };

        match self
            .dispatch(method, path, sent_token.as_deref(), customize)
            .await
        {
            Ok(response) => Ok(response),
            Err(error) if opts.skip_error_handling => Err(error),
            Err(error) => Err(self.intercept(error, sent_token.as_deref(), opts).await),
        }
    }

    /// Sends without interception. Non-2xx statuses become plain [`ApiError`]s.
    async fn dispatch<F>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        customize: F,
    ) -> ApiResult<Response>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path);
        tracing::debug!(%method, %url, authenticated = token.is_some(), "request");

        let mut request = self.http.request(method, &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = customize(request)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        };
        tracing::debug!(status = status.as_u16(), %url, "request failed");
        Err(ApiError::from_response(status.as_u16(), body))
    }

    async fn intercept(
        &self,
        error: ApiError,
        sent_token: Option<&str>,
        opts: RequestOptions,
    ) -> ApiError {
        match error.status {
            Some(401) if !opts.skip_auth => self.handle_unauthorized(error, sent_token).await,
            Some(403) => {
                self.notifier.notify(Notice::access_denied());
                error
            }
            Some(429) => {
                self.notifier.notify(Notice::rate_limited());
                error
            }
            _ => error,
        }
    }

    async fn handle_unauthorized(&self, error: ApiError, sent_token: Option<&str>) -> ApiError {
        let _guard = self.refresh_lock.lock().await;

        let current = self.auth_token();
        match (sent_token, current.as_deref()) {
            (Some(sent), Some(current)) if sent != current => {
                tracing::debug!("token already refreshed by a concurrent request");
                return error.into_retryable();
            }
            (Some(_), None) => {
                // A concurrent handler already dropped the session.
                return error.into_session_expired();
            }
            _ => {}
        }

        let had_refresh = self.store.refresh_token().is_some();
        match self.refresh_locked().await {
            Ok(_) => error.into_retryable(),
            Err(refresh_error) => {
                tracing::info!("token refresh failed: {refresh_error}");
                if had_refresh {
                    self.notifier.notify(Notice::session_expired());
                }
                self.expire_session();
                error.into_session_expired()
            }
        }
    }

    /// Refresh with `refresh_lock` held by the caller.
    async fn refresh_locked(&self) -> ApiResult<TokenPair> {
        let refresh = self.store.refresh_token().ok_or_else(|| ApiError {
            kind: ApiErrorKind::SessionExpired,
            message: "No refresh token available".to_string(),
            status: None,
            code: Some("NO_REFRESH_TOKEN".to_string()),
            details: None,
            retryable: false,
        })?;

        let response = self
            .dispatch(Method::POST, REFRESH_PATH, None, |r| {
                r.json(&json!({ "refresh": refresh }))
            })
            .await?;
        let body: Value = decode_json(response).await?;

        let pair = parse_tokens(&body).ok_or_else(|| {
            ApiError::invalid_response(200, "Refresh response did not include an access token")
        })?;
        self.apply_tokens(&pair);
        tracing::info!(token = %mask_token(&pair.access), "access token refreshed");

        Ok(pair)
    }

    fn expire_session(&self) {
        self.clear_auth_token();

        let current = self.navigator.current_path();
        if current.contains(&self.config.profile_path) {
            tracing::debug!(%current, "session dropped; staying on profile route");
            return;
        }
        if current.contains(&self.config.login_path) {
            return;
        }

        let navigator = Arc::clone(&self.navigator);
        let target = self.config.login_path.clone();
        let delay = self.config.redirect_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            navigator.hard_redirect(&target);
        });
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

fn parse_tokens(body: &Value) -> Option<TokenPair> {
    serde_json::from_value::<RawTokenResponse>(body.clone())
        .ok()
        .and_then(RawTokenResponse::normalize)
}

fn pagination_query(params: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut query: Vec<(String, String)> = vec![
        ("page".to_string(), "1".to_string()),
        ("per_page".to_string(), DEFAULT_PAGE_SIZE.to_string()),
    ];
    for (key, value) in params {
        let value = value.trim();
        if value.is_empty() || value == "all" || value == "null" {
            continue;
        }
        if let Some(existing) = query.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.to_string();
        } else {
            query.push(((*key).to_string(), value.to_string()));
        }
    }
    query
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::from_transport(&e))?;

    let value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::invalid_response(status, &format!("Invalid JSON: {e}")))?
    };

    serde_json::from_value(value)
        .map_err(|e| ApiError::invalid_response(status, &format!("Unexpected response shape: {e}")))
}
