// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client for the order chat REST API

use std::{sync::Arc, time::Duration};

use reqwest::{RequestBuilder, Response, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub mod conversations;
mod metadata;
pub mod orders;

pub use conversations::{MessagePage, Pagination};

/// Timeout of a single request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error code used by the backend when a message violates the content policy.
const CONTENT_POLICY_CODE: &str = "content_policy";

/// Errors that can occur when creating an API client.
#[derive(Error, Debug)]
pub enum ApiClientInitError {
    #[error("Invalid URL {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// Errors returned by the REST API calls
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("Rejected by content policy: {0}")]
    PolicyRejected(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found")]
    NotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

impl ApiError {
    /// Whether repeating the same request might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            Self::PolicyRejected(_)
            | Self::Conflict(_)
            | Self::NotFound
            | Self::Unauthorized
            | Self::Decode(_)
            | Self::InvalidEndpoint(_) => false,
        }
    }
}

/// Error body returned by the backend on failed requests
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// ApiClient is a thin wrapper around a [`reqwest::Client`].
///
/// It exposes a single function for each API endpoint. The client is cheap to clone; all clones
/// share the same connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

#[derive(Debug)]
struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl ApiClient {
    /// Creates a client for the API at `base_url` authenticating with the bearer `token`.
    pub fn new(base_url: Url, token: SecretString) -> Result<Self, ApiClientInitError> {
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ApiClientInitError::InvalidUrl(base_url.to_string()));
        }
        // Relative joins replace the last path segment unless the base ends with a slash.
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        info!(%base_url, "Creating API client");
        let http = reqwest::Client::builder()
            .user_agent(metadata::USER_AGENT.as_str())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            inner: Arc::new(ApiClientInner {
                http,
                base_url,
                token,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base_url.join(path)?)
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.authorized(self.inner.http.get(self.endpoint(path)?)))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.authorized(self.inner.http.post(self.endpoint(path)?)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.inner.token.expose_secret())
            .header(header::ACCEPT, "application/json")
    }

    /// Sends the request and decodes the JSON response body.
    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        let response = check_status(request.send().await?).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Sends the request and ignores the response body.
    async fn send_empty(request: RequestBuilder) -> Result<(), ApiError> {
        check_status(request.send().await?).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: ErrorBody = response.json().await.unwrap_or_default();
    debug!(%status, message = %body.message, code = ?body.code, "Request failed");
    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::CONFLICT => ApiError::Conflict(body.message),
        StatusCode::UNPROCESSABLE_ENTITY
            if body.code.as_deref() == Some(CONTENT_POLICY_CODE) =>
        {
            ApiError::PolicyRejected(body.message)
        }
        _ => ApiError::Server {
            status: status.as_u16(),
            message: body.message,
        },
    };
    Err(error)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    pub(crate) fn client(server: &mockito::Server) -> ApiClient {
        let url: Url = server.url().parse().unwrap();
        ApiClient::new(url, SecretString::from("token".to_owned())).unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        let url: Url = "mailto:someone@example.com".parse().unwrap();
        let result = ApiClient::new(url, SecretString::from("token".to_owned()));
        assert!(matches!(result, Err(ApiClientInitError::InvalidUrl(_))));
    }

    #[test]
    fn base_url_keeps_its_path() {
        let url: Url = "https://api.example.com/v2".parse().unwrap();
        let client = ApiClient::new(url, SecretString::from("token".to_owned())).unwrap();
        assert_eq!(
            client.endpoint("conversations/1").unwrap().as_str(),
            "https://api.example.com/v2/conversations/1"
        );
    }

    #[test]
    fn transient_errors() {
        let server_error = |status| ApiError::Server {
            status,
            message: String::new(),
        };
        assert!(server_error(503).is_transient());
        assert!(server_error(429).is_transient());
        assert!(!server_error(400).is_transient());
        assert!(!ApiError::Conflict("closed".to_owned()).is_transient());
        assert!(!ApiError::PolicyRejected("phone number".to_owned()).is_transient());
        assert!(!ApiError::NotFound.is_transient());
    }
}
