//! # Monitoring
//!
//! Utilities for running the relay behind a process supervisor or load balancer:
//!
//! * health checks, i.e., `/livez` (server healthy but not serving) and `/readyz` (server
//!   healthy and serving)
//! * a shutdown grace period, i.e., time for a load balancer to notice `/readyz` failing
//!   before in-flight relays are drained

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::ValueEnum;
use tokio::sync::{broadcast::Sender, Mutex};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringKind {
    HealthChecks,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stage {
    NotLive,
    Live,
    Ready,
    ShuttingDown,
    Terminating,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    ShuttingDown,
    Terminating,
}

impl Stage {
    fn reached(self, event: Event) -> bool {
        match event {
            Event::ShuttingDown => matches!(self, Stage::ShuttingDown | Stage::Terminating),
            Event::Terminating => self == Stage::Terminating,
        }
    }
}

struct Lifecycle {
    tx: Sender<Event>,
    stage: Mutex<Stage>,
}

pub struct LifecycleManager {
    lifecycle: Arc<Lifecycle>,
    shutdown_grace_period: Option<Duration>,
}

impl LifecycleManager {
    pub fn new(shutdown_grace_period: Option<Duration>) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel::<Event>(2);
        LifecycleManager {
            lifecycle: Arc::new(Lifecycle {
                tx,
                stage: Mutex::new(Stage::NotLive),
            }),
            shutdown_grace_period,
        }
    }

    pub fn has_graceful_shutdown(&self) -> bool {
        self.shutdown_grace_period.is_some()
    }

    pub async fn set_live(&self) {
        self.advance(Stage::Live).await
    }

    pub async fn set_ready(&self) {
        self.advance(Stage::Ready).await
    }

    async fn advance(&self, next: Stage) {
        let mut stage = self.lifecycle.stage.lock().await;
        if !stage.reached(Event::ShuttingDown) {
            *stage = next;
        }
    }

    /// Initiates the lifecycle shutdown sequence.
    ///
    /// A `ShuttingDown` event will be sent followed by `Terminating` after the optionally
    /// configured shutdown grace period.
    pub async fn shutdown(&self) -> Result<()> {
        let mut stage = self.lifecycle.stage.lock().await;
        if stage.reached(Event::ShuttingDown) {
            return Ok(());
        }

        tracing::debug!("shutting down");
        *stage = Stage::ShuttingDown;
        // A send only fails when nothing is waiting on the lifecycle yet.
        _ = self.lifecycle.tx.send(Event::ShuttingDown);

        if let Some(shutdown_grace_period) = self.shutdown_grace_period {
            tracing::info!("shutting down with grace period {shutdown_grace_period:?}");
            let lifecycle = self.lifecycle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(shutdown_grace_period).await;
                let mut stage = lifecycle.stage.lock().await;
                tracing::info!("terminating");
                *stage = Stage::Terminating;
                _ = lifecycle.tx.send(Event::Terminating);
            });
        } else {
            tracing::info!("shutting down without grace period");
            *stage = Stage::Terminating;
            _ = self.lifecycle.tx.send(Event::Terminating);
        }

        Ok(())
    }

    /// Completes when services should immediately drain clients.
    pub async fn drain_signal(&self) {
        let event = if self.has_graceful_shutdown() {
            Event::Terminating
        } else {
            Event::ShuttingDown
        };
        self.signal(event).await;
    }

    /// Completes when shutdown event occurs or the lifecycle broadcast channel is closed.
    pub async fn shutdown_signal(&self) {
        self.signal(Event::ShuttingDown).await
    }

    /// Completes when termination event occurs or the lifecycle broadcast channel is closed.
    pub async fn terminate_signal(&self) {
        self.signal(Event::Terminating).await
    }

    async fn signal(&self, event: Event) {
        // Subscribe before looking at the stage so an event sent in between is not missed.
        let mut rx = self.lifecycle.tx.subscribe();
        if self.lifecycle.stage.lock().await.reached(event) {
            return;
        }

        loop {
            match rx.recv().await {
                Ok(e) if e == event => return,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }

    pub fn health_checks_router(&self) -> Router {
        Router::new()
            .route("/livez", get(livez))
            .route("/readyz", get(readyz))
            .with_state(self.lifecycle.clone())
    }
}

async fn livez(State(lifecycle): State<Arc<Lifecycle>>) -> impl IntoResponse {
    match *lifecycle.stage.lock().await {
        Stage::Live | Stage::Ready => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn readyz(State(lifecycle): State<Arc<Lifecycle>>) -> impl IntoResponse {
    match *lifecycle.stage.lock().await {
        Stage::Ready => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_without_grace_period_terminates_immediately() {
        let manager = LifecycleManager::new(None);
        manager.set_ready().await;
        manager.shutdown().await.unwrap();

        // Signals that fire after the event has been sent still complete.
        manager.shutdown_signal().await;
        manager.terminate_signal().await;
        manager.drain_signal().await;

        // A shut down server never becomes ready again.
        manager.set_ready().await;
        assert_eq!(*manager.lifecycle.stage.lock().await, Stage::Terminating);
    }

    #[tokio::test]
    async fn grace_period_delays_termination() {
        let manager = LifecycleManager::new(Some(Duration::from_millis(20)));
        manager.set_live().await;
        manager.shutdown().await.unwrap();
        assert_eq!(*manager.lifecycle.stage.lock().await, Stage::ShuttingDown);

        manager.drain_signal().await;
        assert_eq!(*manager.lifecycle.stage.lock().await, Stage::Terminating);
    }
}
