use anyhow::Context;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use url::Url;

use super::state::SessionState;
use super::store::TokenStore;
use crate::auth::{SessionInfo, TokenPair};
use crate::error::ErrorPayload;
use crate::http_client::endpoint_url;
use crate::models::auth::{LoginRequest, SignupRequest};
use crate::models::Envelope;

/// Errors reported by the session client
#[derive(Error, Debug)]
pub enum SessionError {
    /// Network or decoding failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway or resume API answered with an error status
    #[error("Request failed: {status} - {message}")]
    Status { status: u16, message: String },

    /// No session, or the session was rejected
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Operation not allowed in the current session state
    #[error("Invalid session state: {0:?}")]
    InvalidState(SessionState),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result of one refresh attempt
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Cookies rotated, mirror updated
    Refreshed(SessionInfo),
    /// Another refresh was already in flight
    Skipped,
    /// Session ended
    Failed(SessionError),
}

/// Client-side session owner
///
/// Talks to the resume API for credentials and to the gateway for cookie
/// storage and proxied reads. The cookie jar lives inside the HTTP client,
/// so the raw tokens are never visible here.
pub struct SessionClient {
    http: Client,
    app_url: Url,
    api_endpoint: Url,
    store: TokenStore,
    state: watch::Sender<SessionState>,

    /// Serializes login, signup, refresh and logout
    write_lock: Mutex<()>,

    /// Held for the whole duration of a refresh
    refresh_lock: Mutex<()>,
}

impl SessionClient {
    /// Create a client for the gateway at `app_url` and the resume API at `api_endpoint`
    pub fn new(app_url: Url, api_endpoint: Url) -> anyhow::Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let (state, _) = watch::channel(SessionState::Anonymous);

        Ok(Self {
            http,
            app_url,
            api_endpoint,
            store: TokenStore::new(),
            state,
            write_lock: Mutex::new(()),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch session state changes; `Anonymous` doubles as the logout signal
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn transition(&self, next: SessionState) {
        let current = self.state();
        if !current.can_transition(next) {
            tracing::warn!("Ignoring illegal session transition {:?} -> {:?}", current, next);
            return;
        }
        if current != next {
            tracing::debug!("Session state {:?} -> {:?}", current, next);
        }
        self.state.send_replace(next);
    }

    fn app(&self, segments: &[&str]) -> Result<Url, SessionError> {
        endpoint_url(&self.app_url, segments)
            .ok_or_else(|| SessionError::InvalidUrl(self.app_url.to_string()))
    }

    fn api(&self, segments: &[&str]) -> Result<Url, SessionError> {
        endpoint_url(&self.api_endpoint, segments)
            .ok_or_else(|| SessionError::InvalidUrl(self.api_endpoint.to_string()))
    }

    /// Turn a non-2xx answer into an error carrying the server's message
    async fn check(response: Response) -> Result<Response, SessionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(SessionError::NotAuthenticated);
        }

        let text = response.text().await.unwrap_or_default();
        Err(SessionError::Status {
            status: status.as_u16(),
            message: ErrorPayload::from_upstream(status.as_u16(), &text).message,
        })
    }

    /// Hand a token pair to the gateway, which stores it in the cookies
    async fn persist(&self, pair: &TokenPair) -> Result<SessionInfo, SessionError> {
        let url = self.app(&["api", "auth", "session"])?;
        let response = Self::check(self.http.post(url).json(pair).send().await?).await?;
        let info: SessionInfo = response.json().await?;

        self.store.replace(info.clone()).await;
        Ok(info)
    }

    /// Exchange credentials with the resume API, then store the cookies
    ///
    /// Returns only after the cookie write completed.
    async fn authenticate<B: serde::Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<SessionInfo, SessionError> {
        let _guard = self.write_lock.lock().await;

        let current = self.state();
        if current != SessionState::Anonymous {
            return Err(SessionError::InvalidState(current));
        }
        self.transition(SessionState::Authenticating);

        let result: Result<SessionInfo, SessionError> = async {
            let url = self.api(segments)?;
            let response = Self::check(self.http.post(url).json(body).send().await?).await?;
            let envelope: Envelope<TokenPair> = response.json().await?;
            self.persist(&envelope.result).await
        }
        .await;

        match result {
            Ok(info) => {
                tracing::info!(user_id = info.user_id, "Signed in");
                self.transition(SessionState::Authenticated);
                Ok(info)
            }
            Err(e) => {
                tracing::warn!("Sign in failed: {}", e);
                self.transition(SessionState::Anonymous);
                Err(e)
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionInfo, SessionError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.authenticate(&["users", "login"], &body).await
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<SessionInfo, SessionError> {
        self.authenticate(&["users", "register"], request).await
    }

    /// Rotate the session cookies
    ///
    /// Skipped when another refresh is in flight. A failure ends the session,
    /// both locally and in the gateway's cookies.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Ok(_in_flight) = self.refresh_lock.try_lock() else {
            tracing::debug!("Refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        };
        let _guard = self.write_lock.lock().await;

        if self.state() != SessionState::Authenticated {
            return RefreshOutcome::Failed(SessionError::NotAuthenticated);
        }
        self.transition(SessionState::Refreshing);

        let result = async {
            let url = self.app(&["api", "auth", "refresh"])?;
            let response = Self::check(self.http.post(url).send().await?).await?;
            let info: SessionInfo = response.json().await?;
            Ok::<_, SessionError>(info)
        }
        .await;

        match result {
            Ok(info) => {
                self.store.replace(info.clone()).await;
                self.transition(SessionState::Authenticated);
                tracing::info!(
                    expires_at = %info.expires_at.to_rfc3339(),
                    "Session refreshed"
                );
                RefreshOutcome::Refreshed(info)
            }
            Err(e) => {
                tracing::warn!("Session refresh failed, signing out: {}", e);
                // The gateway only drops the cookies itself on a 401
                if let Err(logout_err) = self.end_gateway_session().await {
                    tracing::warn!("Could not clear session cookies: {}", logout_err);
                }
                self.store.clear().await;
                self.transition(SessionState::Anonymous);
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// End the session
    ///
    /// Local state is cleared even when the gateway cannot be reached.
    pub async fn logout(&self) {
        let _guard = self.write_lock.lock().await;

        if let Err(e) = self.end_gateway_session().await {
            tracing::warn!("Logout request failed, clearing local session anyway: {}", e);
        }

        self.store.clear().await;
        self.transition(SessionState::Anonymous);
        tracing::info!("Signed out");
    }

    /// Ask the gateway to invalidate the session and clear the cookies
    async fn end_gateway_session(&self) -> Result<(), SessionError> {
        let url = self.app(&["api", "auth", "logout"])?;
        Self::check(self.http.post(url).send().await?).await?;
        Ok(())
    }

    /// Hold proxied reads until a pending refresh has rotated the cookies
    async fn wait_for_refresh(&self) {
        drop(self.refresh_lock.lock().await);
    }

    /// Put the client in the signed-in state without talking to any server
    #[cfg(test)]
    pub(crate) async fn sign_in_for_testing(&self, info: SessionInfo) {
        self.store.replace(info).await;
        self.transition(SessionState::Authenticating);
        self.transition(SessionState::Authenticated);
    }

    /// Profile of the signed-in user, through the gateway
    pub async fn account(&self) -> Result<Value, SessionError> {
        self.wait_for_refresh().await;
        let url = self.app(&["api", "account"])?;
        let response = Self::check(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Resume behind a shareable link, through the gateway
    pub async fn shared_resume(&self, shareable_link: &str) -> Result<Value, SessionError> {
        self.wait_for_refresh().await;
        let url = self.app(&["api", "resume", "shared", shareable_link])?;
        let response = Self::check(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }
}
