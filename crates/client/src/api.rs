//! A module for API Lab server API clients.

use anyhow::{anyhow, bail, Result};
use apilab_api::v1::{
    content::{ContentQuery, ContentResponse},
    paths,
    relay::{RelayRequest, RelayResponse},
    ErrorResponse,
};
use reqwest::{IntoUrl, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Host;

/// Represents an error from the API Lab API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server rejected the request or failed to relay it.
    ///
    /// The status code is the server's own status, not a target's.
    #[error("{message} (status code: {status})")]
    Server {
        /// The status code of the response.
        status: StatusCode,
        /// The error message returned by the server.
        message: String,
    },
    /// Failed to send a request to the API.
    #[error("failed to send API request: {0}")]
    Request(#[from] reqwest::Error),
    /// The API returned JSON that could not be deserialized by the client.
    #[error("failed to deserialize JSON: {message} (status code: {status})")]
    DeserializationFailed {
        /// The status code of the response.
        status: StatusCode,
        /// The deserialization error message.
        message: String,
    },
    /// The API returned an unknown error.
    #[error("the server returned an unknown response (status code: {0})")]
    Unknown(StatusCode),
    /// An API URL could not be constructed.
    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Returns the server's status code for the error, if there was a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Server { status, .. }
            | Self::DeserializationFailed { status, .. }
            | Self::Unknown(status) => Some(*status),
            Self::Request(e) => e.status(),
            Self::InvalidUrl(_) => None,
        }
    }
}

/// Represents an result from the API Lab API client.
pub type ApiResult<T> = Result<T, ApiError>;

async fn deserialize<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    match response.headers().get("content-type") {
        Some(content_type) if content_type == "application/json" => {
            match response.json::<T>().await {
                Ok(e) => Ok(e),
                Err(e) => Err(ApiError::DeserializationFailed {
                    status,
                    message: e.to_string(),
                }),
            }
        }
        _ => Err(ApiError::Unknown(status)),
    }
}

async fn into_result<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        return deserialize::<T>(response).await;
    }

    let ErrorResponse { error } = deserialize::<ErrorResponse>(response).await?;
    Err(ApiError::Server {
        status,
        message: error,
    })
}

/// Represents an API client for communicating with an API Lab server.
pub struct Client {
    url: Url,
    client: reqwest::Client,
}

impl Client {
    /// Creates a new API client with the given URL.
    ///
    /// Plain HTTP is only permitted for loopback servers.
    pub fn new(url: impl IntoUrl) -> Result<Self> {
        let mut url = url.into_url()?;
        match url.scheme() {
            "https" => {}
            "http" => {
                // Only allow HTTP connections to loopback
                match url
                    .host()
                    .ok_or_else(|| anyhow!("expected a host for URL `{url}`"))?
                {
                    Host::Domain(d) => {
                        if d != "localhost" {
                            bail!("an unsecured connection is not permitted to `{d}`");
                        }
                    }
                    Host::Ipv4(ip) => {
                        if !ip.is_loopback() {
                            bail!("an unsecured connection is not permitted to address `{ip}`");
                        }
                    }
                    Host::Ipv6(ip) => {
                        if !ip.is_loopback() {
                            bail!("an unsecured connection is not permitted to address `{ip}`");
                        }
                    }
                }
            }
            _ => bail!("expected a HTTPS scheme for URL `{url}`"),
        }

        // Paths are joined relative to the server URL.
        if !url.path().ends_with('/') {
            let path = format!("{path}/", path = url.path());
            url.set_path(&path);
        }

        Ok(Self {
            url,
            client: reqwest::Client::new(),
        })
    }

    /// Gets the URL of the API client.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.url.join(path)?)
    }

    /// Relays a request through the server.
    ///
    /// A target's error status is returned as a successful [`RelayResponse`];
    /// only relay failures are returned as errors.
    pub async fn relay(&self, request: &RelayRequest) -> ApiResult<RelayResponse> {
        let url = self.endpoint(paths::relay())?;
        tracing::debug!(
            "relaying request to `{target}` via `{url}`",
            target = request.url.as_deref().unwrap_or_default()
        );

        let response = self.client.post(url).json(request).send().await?;
        into_result(response).await
    }

    /// Reads a lesson content file from the server.
    pub async fn content(&self, file: &str) -> ApiResult<ContentResponse> {
        let url = self.endpoint(paths::content())?;
        tracing::debug!("reading content `{file}` from `{url}`");

        let query = ContentQuery {
            file: Some(file.to_string()),
        };
        let response = self.client.get(url).query(&query).send().await?;
        into_result(response).await
    }
}
