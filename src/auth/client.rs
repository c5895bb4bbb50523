//! Client for the hosted auth service (GoTrue-style HTTP API).
//!
//! The current session is published on a `watch` channel; the remote store
//! reads its bearer token from there and the application reloads its state
//! whenever the value changes.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::BackendConfig;
use crate::internal_error::{InternalError, InternalResult};
use crate::local_storage::{LocalStorage, SESSION_KEY};

use super::data::*;

pub type SessionReceiver = watch::Receiver<Option<Session>>;

pub struct AuthClient {
    http: Client,
    backend: BackendConfig,
    storage: LocalStorage,
    session_tx: watch::Sender<Option<Session>>,
}

async fn auth_response<T: DeserializeOwned>(response: Response) -> InternalResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AuthError::from_response(status.as_u16(), &body).into())
}

impl AuthClient {
    pub fn new(http: Client, backend: BackendConfig, storage: LocalStorage) -> AuthClient {
        let (session_tx, _) = watch::channel(None);

        AuthClient {
            http,
            backend,
            storage,
            session_tx,
        }
    }

    pub fn subscribe(&self) -> SessionReceiver {
        self.session_tx.subscribe()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session_tx.borrow().clone()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.backend.url, path)
    }

    fn request(&self, builder: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        builder
            .header("apikey", &self.backend.anon_key)
            .bearer_auth(access_token.unwrap_or(self.backend.anon_key.as_str()))
    }

    fn set_session(&self, session: Option<Session>) {
        let persisted = match &session {
            Some(session) => self.storage.write_json(SESSION_KEY, session),
            None => self.storage.remove_item(SESSION_KEY),
        };
        if let Err(e) = persisted {
            warn!(error = %e, "could not persist auth session");
        }

        self.session_tx.send_replace(session);
    }

    async fn fetch_user(&self, access_token: &str) -> InternalResult<AuthUser> {
        let response = self
            .request(self.http.get(self.endpoint("user")), Some(access_token))
            .send()
            .await?;

        auth_response(response).await
    }

    async fn refresh(&self, refresh_token: &str) -> InternalResult<Session> {
        let response = self
            .request(
                self.http
                    .post(self.endpoint("token"))
                    .query(&[("grant_type", "refresh_token")])
                    .json(&json!({ "refresh_token": refresh_token })),
                None,
            )
            .send()
            .await?;

        auth_response(response).await
    }

    /// Validates the session persisted by a previous run and publishes it.
    /// A session the service rejects is refreshed once, then dropped. When
    /// the service cannot be reached the stored session is dropped too.
    pub async fn restore_session(&self) -> Option<Session> {
        let stored: Session = match self.storage.read_json(SESSION_KEY) {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.session_tx.send_replace(None);
                return None;
            }
            Err(e) => {
                warn!(error = %e, "could not read stored session");
                self.session_tx.send_replace(None);
                return None;
            }
        };

        let restored = match self.fetch_user(&stored.access_token).await {
            Ok(user) => Some(Session { user, ..stored }),
            Err(InternalError::Http(e)) => {
                warn!(error = %e, "auth service unreachable, dropping stored session");
                None
            }
            Err(e) => {
                info!(error = %e, "stored session rejected, trying refresh");
                match self.refresh(&stored.refresh_token).await {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!(error = %e, "dropping stored session");
                        None
                    }
                }
            }
        };

        self.set_session(restored.clone());
        restored
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> InternalResult<Session> {
        let response = self
            .request(
                self.http
                    .post(self.endpoint("token"))
                    .query(&[("grant_type", "password")])
                    .json(&json!({
                        "email": credentials.email.trim(),
                        "password": credentials.password,
                    })),
                None,
            )
            .send()
            .await?;

        let session: Session = auth_response(response).await?;
        info!(user_id = %session.user.id, "signed in");
        self.set_session(Some(session.clone()));

        Ok(session)
    }

    pub async fn sign_up(&self, credentials: &Credentials) -> InternalResult<SignUpOutcome> {
        let response = self
            .request(
                self.http.post(self.endpoint("signup")).json(&json!({
                    "email": credentials.email.trim(),
                    "password": credentials.password,
                })),
                None,
            )
            .send()
            .await?;

        let body: serde_json::Value = auth_response(response).await?;

        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value(body)?;
            let user = session.user.clone();
            self.set_session(Some(session));
            return Ok(SignUpOutcome::SignedIn { user });
        }

        // Without a session the body is the user itself, possibly nested.
        let user_value = body.get("user").cloned().unwrap_or(body);
        let user: AuthUser = serde_json::from_value(user_value)?;

        match user.identities {
            Some(identities) if identities.is_empty() => Ok(SignUpOutcome::AlreadyRegistered),
            _ => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    /// Forgets the session locally even when the service call fails; the
    /// failure is still reported.
    pub async fn sign_out(&self) -> InternalResult<()> {
        let session = self.current_session();
        self.set_session(None);

        let Some(session) = session else {
            return Ok(());
        };

        let response = self
            .request(
                self.http.post(self.endpoint("logout")),
                Some(&session.access_token),
            )
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(user_id = %session.user.id, "signed out");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AuthError::from_response(status.as_u16(), &body).into())
    }

    pub async fn reset_password(&self, email: &str, redirect_to: Option<&str>) -> InternalResult<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::MissingEmail.into());
        }

        let mut builder = self
            .http
            .post(self.endpoint("recover"))
            .json(&json!({ "email": email }));
        if let Some(redirect_to) = redirect_to {
            builder = builder.query(&[("redirect_to", redirect_to)]);
        }

        let response = self.request(builder, None).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AuthError::from_response(status.as_u16(), &body).into())
    }
}
