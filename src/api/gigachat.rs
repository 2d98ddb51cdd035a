//! GigaChat completion client with a client-credentials token cache.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GigaChatSettings;
use crate::error::{Error, Result};

/// A token is treated as expired this many seconds before its real expiry.
pub const EXPIRY_SKEW_SECS: i64 = 30;

/// Lifetime assumed when the authorization response carries no expiry.
const FALLBACK_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// `expires_at` values above this are epoch milliseconds.
const MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Source of the current time, swappable in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Cached bearer token. Replaced wholesale on every authorization.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// True while more than the skew margin of validity remains.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - TimeDelta::seconds(EXPIRY_SKEW_SECS)
    }
}

#[derive(Deserialize)]
struct AuthResponse {
    access_token: String,
    expires_in: Option<f64>,
    expires_at: Option<f64>,
}

impl AuthResponse {
    /// Expiry from `expires_in`, else `expires_at`, else the fallback lifetime.
    /// Values that are negative, non-finite or out of range are skipped.
    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let from_lifetime = self
            .expires_in
            .and_then(|secs| whole_millis(secs * 1000.0))
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        if let Some(at) = from_lifetime {
            return at;
        }

        let from_absolute = self
            .expires_at
            .map(|at| if at > MILLIS_THRESHOLD { at } else { at * 1000.0 })
            .and_then(whole_millis)
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
        if let Some(at) = from_absolute {
            return at;
        }

        now + TimeDelta::seconds(FALLBACK_LIFETIME_SECS)
    }
}

fn whole_millis(value: f64) -> Option<i64> {
    (value.is_finite() && value >= 0.0 && value < i64::MAX as f64).then_some(value as i64)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

pub struct GigaChatClient {
    settings: GigaChatSettings,
    http: reqwest::Client,
    token: Mutex<Option<Token>>,
    clock: Clock,
}

impl GigaChatClient {
    pub fn new(settings: GigaChatSettings, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()?;

        Ok(Self {
            settings,
            http,
            token: Mutex::new(None),
            clock: Arc::new(Utc::now),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.settings.system_prompt.as_deref()
    }

    /// Return the cached token, authorizing first if it is missing or about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = (self.clock)();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh_at(now)) {
            return Ok(token.access_token.clone());
        }
        let token = self.authorize().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Replace a token the server rejected. If another caller already replaced
    /// it while this one waited for the lock, the newer token is reused.
    async fn reauthorize(&self, rejected: &str) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = (self.clock)();
        if let Some(token) = cached
            .as_ref()
            .filter(|t| t.access_token != rejected && t.is_fresh_at(now))
        {
            return Ok(token.access_token.clone());
        }
        let token = self.authorize().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn authorize(&self) -> Result<Token> {
        let s = &self.settings;
        if s.client_id.is_empty() || s.client_secret.is_empty() {
            return Err(Error::Configuration("GigaChat client credentials".into()));
        }
        if s.auth_url.is_empty() {
            return Err(Error::Configuration("GigaChat authorization URL".into()));
        }

        let auth_key = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", s.client_id, s.client_secret));
        let request_id = Uuid::new_v4().to_string();
        debug!("Authorizing with GigaChat (RqUID {request_id})");

        let response = self
            .http
            .post(&s.auth_url)
            .header(AUTHORIZATION, format!("Basic {auth_key}"))
            .header(ACCEPT, "application/json")
            .header("RqUID", request_id)
            .form(&[("scope", s.scope.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AuthResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("authorization response: {e}")))?;
        let expires_at = parsed.expiry((self.clock)());
        info!("GigaChat token refreshed, expires at {expires_at}");

        Ok(Token {
            access_token: parsed.access_token,
            expires_at,
        })
    }

    /// Send one stateless completion: optional system turn, then the user's text.
    pub async fn send_chat(
        &self,
        text: &str,
        model: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<Value> {
        if self.settings.api_url.is_empty() {
            return Err(Error::Configuration("GigaChat completion URL".into()));
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = system_prompt {
            messages.push(ChatTurn {
                role: "system",
                content: prompt,
            });
        }
        messages.push(ChatTurn {
            role: "user",
            content: text,
        });

        let request = ChatRequest {
            model: model.unwrap_or(&self.settings.model),
            messages,
        };

        self.authorized(Method::POST, &self.settings.api_url, Some(&request))
            .await
    }

    pub async fn list_models(&self) -> Result<Value> {
        if self.settings.models_url.is_empty() {
            return Err(Error::Configuration("GigaChat models URL".into()));
        }
        self.authorized(Method::GET, &self.settings.models_url, None::<&()>)
            .await
    }

    /// Bearer-authorized call. An unauthorized response triggers exactly one
    /// reauthorization and retry; a second rejection is returned as an error.
    async fn authorized<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Value> {
        let token = self.access_token().await?;
        let mut response = self.send_with(method.clone(), url, body, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            info!("GigaChat rejected the token, reauthorizing once");
            let token = self.reauthorize(&token).await?;
            response = self.send_with(method, url, body, &token).await?;
        }

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    async fn send_with<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        token: &str,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

/// Content of the first choice in a completion response.
pub fn completion_text(response: &Value) -> Option<&str> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}

/// Model ids from a models listing.
pub fn model_ids(response: &Value) -> Vec<String> {
    response
        .get("data")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
