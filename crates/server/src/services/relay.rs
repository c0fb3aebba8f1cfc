use crate::policy::target::TargetPolicy;
use apilab_api::v1::relay::{
    BodyEncoding, RelayError, RelayRequest, RelayResponse, DEFAULT_METHOD,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    redirect, Client, Method, Response,
};
use std::{error::Error as StdError, sync::Arc, time::Duration};
use url::Url;

/// The default time allowed for a single relayed request.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(30);

/// The default maximum size, in bytes, of a buffered target response body.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

/// Headers describing the caller's connection or message framing.
///
/// These are never forwarded; the outbound client computes its own.
const CONNECTION_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::HOST,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

/// A relay request that has been validated and normalized.
///
/// Built from a [`RelayRequest`] by value; it is never modified afterwards.
#[derive(Debug)]
pub struct ValidatedRequest {
    url: Url,
    method: Method,
    headers: HeaderMap,
    body: Option<String>,
}

impl ValidatedRequest {
    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The normalized HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The headers sent to the target.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body sent to the target, if any.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl TryFrom<RelayRequest> for ValidatedRequest {
    type Error = RelayError;

    fn try_from(request: RelayRequest) -> Result<Self, Self::Error> {
        let url = parse_target_url(request.url.as_deref())?;
        let method = parse_method(request.method.as_deref())?;

        let mut headers = HeaderMap::new();
        for (name, value) in request.headers.unwrap_or_default() {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| RelayError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(&value).map_err(|e| RelayError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            if CONNECTION_HEADERS.contains(&header_name) {
                tracing::debug!("dropping connection header `{header_name}` from relay request");
                continue;
            }
            headers.append(header_name, header_value);
        }

        let body = if method == Method::GET || method == Method::HEAD {
            None
        } else {
            request.body.map(|body| body.into_text())
        };

        Ok(Self {
            url,
            method,
            headers,
            body,
        })
    }
}

fn parse_target_url(url: Option<&str>) -> Result<Url, RelayError> {
    let url = url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(RelayError::MissingUrl)?;

    let parsed = Url::parse(url).map_err(|e| RelayError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(RelayError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(RelayError::InvalidUrl {
            url: url.to_string(),
            message: "the URL has no host".to_string(),
        });
    }

    Ok(parsed)
}

fn parse_method(method: Option<&str>) -> Result<Method, RelayError> {
    let method = match method.map(str::trim) {
        Some(method) if !method.is_empty() => method.to_ascii_uppercase(),
        _ => DEFAULT_METHOD.to_string(),
    };

    Method::from_bytes(method.as_bytes()).map_err(|_| RelayError::InvalidMethod(method))
}

/// Flattens a header map so that each name maps to its last value.
pub fn flatten_headers(headers: &HeaderMap) -> IndexMap<String, String> {
    let mut flattened = IndexMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        flattened.insert(
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    flattened
}

/// Gets the reason phrase of a response's status line.
///
/// The phrase sent by the target is only recorded when it differs from the
/// canonical one for the status code.
fn status_text(response: &Response) -> String {
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Decodes a response body as text, falling back to base64 for bodies
/// that are not valid UTF-8.
pub fn decode_body(bytes: Vec<u8>) -> (String, Option<BodyEncoding>) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, None),
        Err(e) => (
            STANDARD.encode(e.into_bytes()),
            Some(BodyEncoding::Base64),
        ),
    }
}

fn error_chain(e: &(dyn StdError + 'static)) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}

/// The service that forwards requests to target servers.
///
/// The relay holds no per-request state; every call to [`RelayService::relay`]
/// makes at most one network attempt and is never retried.
#[derive(Clone)]
pub struct RelayService {
    client: Client,
    timeout: Duration,
    max_body_size: u64,
    policy: Option<Arc<dyn TargetPolicy>>,
}

impl std::fmt::Debug for RelayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayService")
            .field("timeout", &self.timeout)
            .field("max_body_size", &self.max_body_size)
            .field("policy", &self.policy.as_ref().map(|_| "dyn TargetPolicy"))
            .finish()
    }
}

impl RelayService {
    /// Creates a new relay service.
    pub fn new(
        timeout: Duration,
        max_body_size: u64,
        policy: Option<Arc<dyn TargetPolicy>>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            timeout,
            max_body_size,
            policy,
        })
    }

    /// The time allowed for a single relayed request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The maximum size of a buffered response body.
    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    /// Relays the request to its target and captures the response.
    ///
    /// A response from the target is always a successful capture, whatever
    /// its status code. Errors are returned only for invalid requests,
    /// policy rejections and transport failures.
    pub async fn relay(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        let request = ValidatedRequest::try_from(request)?;

        if let Some(policy) = &self.policy {
            policy.check(&request.url).map_err(|e| {
                tracing::info!("rejected relay target `{url}`: {e}", url = request.url);
                RelayError::TargetRejected(e.to_string())
            })?;
        }

        let url = request.url.to_string();
        match tokio::time::timeout(self.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "relay to `{url}` timed out after {timeout:?}",
                    timeout = self.timeout
                );
                Err(RelayError::Timeout {
                    url,
                    timeout: self.timeout,
                })
            }
        }
    }

    async fn send(&self, request: ValidatedRequest) -> Result<RelayResponse, RelayError> {
        let url = request.url.to_string();
        tracing::debug!(
            "relaying {method} request to `{url}`",
            method = request.method
        );

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        let status = response.status();
        let status_text = status_text(&response);
        let headers = flatten_headers(response.headers());

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(&url, e))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_body_size {
                tracing::warn!(
                    "response from `{url}` exceeded {limit} bytes",
                    limit = self.max_body_size
                );
                return Err(RelayError::ResponseTooLarge {
                    url,
                    limit: self.max_body_size,
                });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(
            "relayed response from `{url}`: {status} ({len} bytes)",
            len = body.len()
        );

        let (body, body_encoding) = decode_body(body);
        Ok(RelayResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body,
            body_encoding,
        })
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> RelayError {
        let message = error_chain(&e);
        tracing::warn!("relay to `{url}` failed: {message}");

        if e.is_timeout() {
            RelayError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else if e.is_connect() {
            RelayError::Connect {
                url: url.to_string(),
                message,
            }
        } else {
            RelayError::Transport {
                url: url.to_string(),
                message,
            }
        }
    }
}
