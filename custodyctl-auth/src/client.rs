//! HTTP client for the auth endpoint
//!
//! Speaks the GoTrue REST surface: `/auth/v1/signup` and `/auth/v1/token`
//! with the `password` and `refresh_token` grants. Every request carries the
//! project API key in the `apikey` header.

use async_trait::async_trait;
use chrono::Utc;
use custodyctl_core::validation::is_plausible_email;
use custodyctl_core::{validate_password, AuthSettings, CustodyError, Session};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::watchdog::SessionRefresher;

/// New account details
#[derive(Debug, Clone, Serialize)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Uuid,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session::from_expires_in(
            self.access_token,
            self.refresh_token,
            self.expires_in,
            self.user.id,
            Utc::now(),
        )
    }
}

/// Auth endpoint client
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(settings: AuthSettings) -> Self {
        Self {
            http: Client::new(),
            base_url: settings.url,
            api_key: settings.api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register an account. The password is checked locally first. Returns
    /// the session when the endpoint signs the user in straight away, `None`
    /// when it waits for email confirmation.
    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn sign_up(&self, request: &SignUp) -> Result<Option<Session>> {
        if !is_plausible_email(&request.email) {
            return Err(CustodyError::invalid("email", "not a valid address").into());
        }
        let check = validate_password(&request.password);
        if !check.valid {
            return Err(AuthError::WeakPassword {
                issues: check.issues,
            });
        }

        let body = serde_json::json!({
            "email": request.email,
            "password": request.password,
            "data": { "full_name": request.full_name },
        });
        let response = self
            .http
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let value = read_json(response).await?;

        if value.get("access_token").is_some() {
            let tokens: TokenResponse =
                serde_json::from_value(value).map_err(|e| AuthError::Decode(e.to_string()))?;
            tracing::info!(user_id = %tokens.user.id, "signed up and signed in");
            Ok(Some(tokens.into_session()))
        } else {
            tracing::info!("signed up, confirmation pending");
            Ok(None)
        }
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .token_grant(
                "password",
                &serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        tracing::info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    /// Exchange a refresh token for a new session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        self.token_grant(
            "refresh_token",
            &serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn token_grant(&self, grant_type: &str, body: &Value) -> Result<Session> {
        let response = self
            .http
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;
        let value = read_json(response).await?;
        let tokens: TokenResponse =
            serde_json::from_value(value).map_err(|e| AuthError::Decode(e.to_string()))?;
        Ok(tokens.into_session())
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionRefresher for AuthClient {
    async fn refresh(&self, session: &Session) -> Result<Session> {
        self.token_grant(
            "refresh_token",
            &serde_json::json!({ "refresh_token": session.refresh_token }),
        )
        .await
    }
}

async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(api_error(status.as_u16(), &text));
    }
    serde_json::from_str(&text).map_err(|e| AuthError::Decode(e.to_string()))
}

/// Build an `Api` error from an error body. The endpoint has used several
/// shapes over time (`error`/`error_description`, `error_code`/`msg`,
/// `message`); the first present field wins.
fn api_error(status: u16, body: &str) -> AuthError {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);

    let code = text("error_code").or_else(|| text("error"));
    let message = text("error_description")
        .or_else(|| text("msg"))
        .or_else(|| text("message"))
        .unwrap_or_else(|| body.trim().to_owned());
    AuthError::Api {
        status,
        code,
        message,
    }
}
