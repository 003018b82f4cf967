use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Longest body excerpt written to the log.
const LOG_BODY_LIMIT: usize = 1000;

/// Which REST service a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiTarget {
    /// Chat endpoints (`/dm/...`)
    Serverless,
    /// Main backend (`/chat/friends` and friends)
    Backend,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_url: String,
}

impl ApiConfig {
    fn base(&self, target: ApiTarget) -> &str {
        match target {
            ApiTarget::Serverless => self.base_url.trim_end_matches('/'),
            ApiTarget::Backend => self.api_url.trim_end_matches('/'),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx answer. `body` holds the JSON error payload when there was one.
    #[error("request failed ({status}): {message}")]
    Status {
        status: StatusCode,
        message: String,
        body: Option<Value>,
    },

    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            Self::Decode(_) => None,
        }
    }
}

/// JSON client shared by the chat services of one session.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    config: Arc<ApiConfig>,
    auth_token: Option<String>,
    expired: Arc<watch::Sender<bool>>,
}

impl RestClient {
    pub fn new(config: ApiConfig, auth_token: Option<String>) -> Self {
        let (expired, _) = watch::channel(false);
        Self {
            http: Client::new(),
            config: Arc::new(config),
            auth_token,
            expired: Arc::new(expired),
        }
    }

    /// Flips to `true` once the server rejects the session with 403.
    pub fn session_expired(&self) -> watch::Receiver<bool> {
        self.expired.subscribe()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, target: ApiTarget) -> Result<T, FetchError> {
        let url = self.url(path, target);
        let builder = self.http.get(&url);
        self.send(Method::GET, url, builder, None).await
    }

    pub async fn get_with_query<Q, T>(&self, path: &str, query: &Q, target: ApiTarget) -> Result<T, FetchError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path, target);
        let builder = self.http.get(&url).query(query);
        self.send(Method::GET, url, builder, None).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B, target: ApiTarget) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path, target);
        let payload = serde_json::to_string(body)?;
        let builder = self.http.post(&url).body(payload.clone());
        self.send(Method::POST, url, builder, Some(payload)).await
    }

    fn url(&self, path: &str, target: ApiTarget) -> String {
        format!("{}{}", self.config.base(target), path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        builder: RequestBuilder,
        payload: Option<String>,
    ) -> Result<T, FetchError> {
        debug!(
            "{}: {}{}",
            method,
            url,
            excerpt(&payload.map(|p| format!(" {}", p)).unwrap_or_default())
        );

        let resp = self.with_headers(builder).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let body: Option<Value> = serde_json::from_str(&text).ok();
            warn!("{}: {}: {}", status.as_u16(), url, excerpt(&text));

            if status == StatusCode::FORBIDDEN {
                self.expired.send_replace(true);
            }

            return Err(FetchError::Status {
                status,
                message: status.canonical_reason().unwrap_or("Failed").to_string(),
                body,
            });
        }

        debug!("{}: {}: {}", status.as_u16(), url, excerpt(&text));
        Ok(serde_json::from_str(&text)?)
    }

    fn with_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
        match &self.auth_token {
            Some(token) => builder
                .header("X-CSRFToken", token)
                .header(reqwest::header::REFERER, &self.config.api_url),
            None => builder,
        }
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(LOG_BODY_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_per_target_without_trailing_slash() {
        let config = ApiConfig {
            base_url: "https://dm.example.com/".into(),
            api_url: "https://api.example.com".into(),
        };
        assert_eq!(config.base(ApiTarget::Serverless), "https://dm.example.com");
        assert_eq!(config.base(ApiTarget::Backend), "https://api.example.com");
    }

    #[test]
    fn status_error_exposes_status() {
        let err = FetchError::Status {
            status: StatusCode::BAD_REQUEST,
            message: "Bad Request".into(),
            body: None,
        };
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.to_string(), "request failed (400 Bad Request): Bad Request");
    }

    #[test]
    fn excerpt_is_char_safe() {
        let long = "é".repeat(LOG_BODY_LIMIT + 10);
        assert_eq!(excerpt(&long).chars().count(), LOG_BODY_LIMIT);
    }
}
