#![allow(dead_code)]

use anyhow::Result;
use apilab_server::{Config, Server};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// The relay timeout used by test servers.
pub const TEST_RELAY_TIMEOUT: Duration = Duration::from_millis(500);

/// The maximum relayed body size used by test servers.
pub const TEST_MAX_BODY_SIZE: u64 = 1024;

/// The bytes served by the target's `/binary` route.
pub const BINARY_BODY: [u8; 4] = [0xff, 0xfe, 0x00, 0x01];

pub struct ServerInstance {
    task: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.task.take();
    }
}

/// Creates the configuration most tests run the server with.
pub fn test_config() -> Config {
    Config::new()
        .with_relay_timeout(TEST_RELAY_TIMEOUT)
        .with_max_body_size(TEST_MAX_BODY_SIZE)
}

/// Spawns a server as a background task.
pub async fn spawn_server(config: Config) -> Result<(ServerInstance, SocketAddr)> {
    let shutdown = CancellationToken::new();
    let config = config
        .with_addr(([127, 0, 0, 1], 0))
        .with_shutdown(shutdown.clone().cancelled_owned());

    let mut server = Server::new(config);
    let addr = server.bind()?;

    let task = tokio::spawn(async move {
        server.run().await.unwrap();
    });

    let instance = ServerInstance {
        task: Some(task),
        shutdown,
    };

    Ok((instance, addr))
}

/// A local HTTP server that relay requests are sent to.
pub struct TargetInstance {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    abandoned: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl TargetInstance {
    /// Gets the absolute URL of a path on the target.
    pub fn url(&self, path: &str) -> String {
        format!("http://{addr}{path}", addr = self.addr)
    }

    /// Gets the number of requests the target has received.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Gets the number of `/slow` requests whose connection went away before
    /// they were answered.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` `/slow` requests have been abandoned.
    ///
    /// Returns `false` if that did not happen within `within`.
    pub async fn wait_abandoned(&self, count: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while self.abandoned() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }
}

impl Drop for TargetInstance {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Clone)]
struct TargetState {
    hits: Arc<AtomicUsize>,
    abandoned: Arc<AtomicUsize>,
}

/// Counts a handler as abandoned when it is dropped before completing.
struct AbandonGuard {
    abandoned: Arc<AtomicUsize>,
    completed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl TargetState {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Spawns a target server as a background task.
///
/// The target serves:
///
/// * `/echo`: returns the request body verbatim, the request's `x-test` header,
///   and the received method and body length as `x-received-*` headers
/// * `/status/:code`: responds with the given status code
/// * `/slow`: never responds in time for the relay; a dropped request is
///   counted as abandoned
/// * `/large`: responds with a body larger than [`TEST_MAX_BODY_SIZE`]
/// * `/binary`: responds with [`BINARY_BODY`]
pub async fn spawn_target() -> Result<TargetInstance> {
    let hits = Arc::new(AtomicUsize::new(0));
    let abandoned = Arc::new(AtomicUsize::new(0));
    let state = TargetState {
        hits: hits.clone(),
        abandoned: abandoned.clone(),
    };

    let router = Router::new()
        .route("/echo", any(echo))
        .route("/status/:code", any(status))
        .route("/slow", get(slow))
        .route("/large", get(large))
        .route("/binary", get(binary))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone().cancelled_owned();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .ok();
    });

    Ok(TargetInstance {
        addr,
        hits,
        abandoned,
        shutdown,
    })
}

async fn echo(
    State(state): State<TargetState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state.hit();

    let mut response_headers = HeaderMap::new();
    if let Some(value) = headers.get("x-test") {
        response_headers.insert("x-test", value.clone());
    }
    if let Some(value) = headers.get(header::CONTENT_TYPE) {
        response_headers.insert(header::CONTENT_TYPE, value.clone());
    }
    if let Ok(value) = HeaderValue::from_str(method.as_str()) {
        response_headers.insert("x-received-method", value);
    }
    response_headers.insert("x-received-length", HeaderValue::from(body.len()));

    (response_headers, body)
}

async fn status(State(state): State<TargetState>, Path(code): Path<u16>) -> impl IntoResponse {
    state.hit();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, format!("status {code}"))
}

async fn slow(State(state): State<TargetState>) -> impl IntoResponse {
    state.hit();
    let mut guard = AbandonGuard {
        abandoned: state.abandoned.clone(),
        completed: false,
    };
    tokio::time::sleep(Duration::from_secs(60)).await;
    guard.completed = true;
    "too late"
}

async fn large(State(state): State<TargetState>) -> impl IntoResponse {
    state.hit();
    "a".repeat(TEST_MAX_BODY_SIZE as usize * 8)
}

async fn binary(State(state): State<TargetState>) -> impl IntoResponse {
    state.hit();
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        BINARY_BODY.to_vec(),
    )
}

/// Gets a local address nothing is listening on.
pub fn unused_addr() -> Result<SocketAddr> {
    let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))?;
    Ok(listener.local_addr()?)
}

/// Spawns a target that answers every connection with the given raw status
/// line, for example `HTTP/1.1 200 Custom Phrase`.
pub async fn spawn_raw_target(status_line: &'static str) -> Result<String> {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let response = format!(
                    "{status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok"
                );
                stream.write_all(response.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            });
        }
    });

    Ok(format!("http://{addr}/"))
}
