//! # Control Endpoint
//!
//! The background sampler listens on a loopback port so the finalize phase
//! can stop it and wait for its final save before reading the documents.
//!
//! - `POST /finish` signals the sampler to stop and responds only once the
//!   final flush is done. This response is the happens-before edge between
//!   the last write and the reader's load.
//! - `GET /health` answers while the sampler is alive.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, instrument, trace, warn};

/// Body of a `/finish` response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinishResponse {
    pub flushed: bool,
}

#[derive(Clone)]
struct ControlState {
    stop_tx: watch::Sender<bool>,
    flushed_rx: watch::Receiver<bool>,
}

/// A loopback HTTP server controlling one background sampler.
pub struct ControlServer {
    listener: TcpListener,
    state: ControlState,
}

impl ControlServer {
    /// Creates a new `ControlServer` but does not spawn it.
    ///
    /// # Arguments
    ///
    /// * `listener` - A `TcpListener` that has already been bound to an address.
    /// * `stop_tx` - Flipped to `true` when a client asks the sampler to stop.
    /// * `flushed_rx` - Flipped to `true` by the sampler once its final save is done.
    pub fn new(
        listener: TcpListener,
        stop_tx: watch::Sender<bool>,
        flushed_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            state: ControlState {
                stop_tx,
                flushed_rx,
            },
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns a future that serves requests until the sampler has flushed.
    ///
    /// Shutdown is graceful: a `/finish` request waiting on the flush still
    /// gets its response.
    pub fn run(self) -> impl Future<Output = ()> {
        let mut flushed_rx = self.state.flushed_rx.clone();
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/finish", post(finish))
            .with_state(self.state);

        async move {
            let result = axum::serve(self.listener, app)
                .with_graceful_shutdown(async move {
                    match flushed_rx.wait_for(|flushed| *flushed).await {
                        Ok(_) => trace!("Control server observed final flush."),
                        Err(_) => warn!("Sampler dropped its flush signal; shutting down"),
                    }
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Control server error");
            }
            trace!("Control server task finished.");
        }
    }
}

async fn finish(State(state): State<ControlState>) -> (StatusCode, Json<FinishResponse>) {
    info!("Finish requested; stopping sampler.");
    state.stop_tx.send_replace(true);

    let mut flushed_rx = state.flushed_rx.clone();
    let flushed = flushed_rx.wait_for(|flushed| *flushed).await.is_ok();
    if flushed {
        (StatusCode::OK, Json(FinishResponse { flushed: true }))
    } else {
        error!("Sampler exited without reporting its final flush");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(FinishResponse { flushed: false }),
        )
    }
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("control request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sampler answered {status}")]
    Status { status: StatusCode },
    #[error("sampler did not confirm its final flush")]
    NotFlushed,
}

/// Client side of the control endpoint, used by the finalize phase.
#[derive(Debug, Clone)]
pub struct ControlClient {
    base_url: String,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            timeout,
        }
    }

    fn http(&self) -> Result<reqwest::Client, ControlError> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }

    /// Asks the sampler to stop and waits until its final save is done.
    #[instrument(skip(self), fields(url = %self.base_url))]
    pub async fn finish(&self) -> Result<(), ControlError> {
        let response = self
            .http()?
            .post(format!("{}/finish", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Status { status });
        }
        let body: FinishResponse = response.json().await?;
        if !body.flushed {
            return Err(ControlError::NotFlushed);
        }
        info!("Sampler confirmed its final flush.");
        Ok(())
    }

    /// Returns `true` if a sampler answers on the port.
    pub async fn is_alive(&self) -> bool {
        let Ok(client) = self.http() else {
            return false;
        };
        match client.get(format!("{}/health", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
