// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The HTTP server exposing the Prometheus remote API plus the read-only
//! debug surface (`/metrics`, `/health`).

pub mod handler;
pub mod prom_store;

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::{routing, Router};
use common_telemetry::{error, info};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use storage::StorageRef;
use tokio::sync::oneshot::{self, Sender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;

use crate::error::{AddressBindSnafu, AlreadyStartedSnafu, InternalSnafu, Result};

/// How long in-flight handlers get to finish after a graceful stop is
/// requested; afterwards their storage operations are cancelled.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    pub addr: String,

    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Maximum accepted request body size in bytes; remote-write bodies are
    /// snappy-compressed, so the decoded size can be a few times larger.
    pub body_limit: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7781".to_string(),
            timeout: Duration::from_secs(30),
            body_limit: 32 * 1024 * 1024,
        }
    }
}

/// Handler state: the storage and the root lifecycle token whose children
/// are handed to every storage operation.
#[derive(Clone)]
pub struct PromStoreState {
    pub storage: StorageRef,
    pub cancel: CancellationToken,
}

pub struct HttpServer {
    state: PromStoreState,
    options: HttpOptions,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    serve_handle: Mutex<Option<JoinHandle<()>>>,
}

impl HttpServer {
    pub fn new(storage: StorageRef, options: HttpOptions) -> Self {
        Self {
            state: PromStoreState {
                storage,
                cancel: CancellationToken::new(),
            },
            options,
            shutdown_tx: Mutex::new(None),
            serve_handle: Mutex::new(None),
        }
    }

    pub fn make_app(&self) -> Router {
        make_router(self.state.clone())
            .layer(DefaultBodyLimit::max(self.options.body_limit))
            .layer(TimeoutLayer::new(self.options.timeout))
    }

    /// Starts the server and binds on the configured address; returns the
    /// actually bound address (the port may have been 0).
    pub async fn start(&self) -> Result<SocketAddr> {
        let (tx, rx) = oneshot::channel();
        let serve = {
            let mut shutdown_tx = self.shutdown_tx.lock().await;
            ensure!(
                shutdown_tx.is_none(),
                AlreadyStartedSnafu { server: "HTTP" }
            );

            let addr: SocketAddr = self.options.addr.parse().ok().context(InternalSnafu {
                err_msg: format!("invalid HTTP listen address {:?}", self.options.addr),
            })?;
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .context(AddressBindSnafu { addr })?;

            *shutdown_tx = Some(tx);
            axum::serve(listener, self.make_app().into_make_service())
        };
        let listening = serve.local_addr().ok().context(InternalSnafu {
            err_msg: "no local address after bind",
        })?;
        info!("HTTP server is bound to {listening}");

        let handle = tokio::spawn(async move {
            if let Err(e) = serve.with_graceful_shutdown(rx.map(drop)).await {
                error!("Failed to run HTTP server: {e}");
            }
        });
        *self.serve_handle.lock().await = Some(handle);

        Ok(listening)
    }

    /// Gracefully shuts the server down: stop accepting, wait for in-flight
    /// handlers up to [`SHUTDOWN_TIMEOUT`], then cancel whatever is still
    /// running.
    pub async fn shutdown(&self) -> Result<()> {
        let mut shutdown_tx = self.shutdown_tx.lock().await;
        if let Some(tx) = shutdown_tx.take() {
            if tx.send(()).is_err() {
                info!("Receiver dropped, the HTTP server has already exited");
            }
        }

        let handle = self.serve_handle.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                error!(
                    "HTTP server did not drain within {SHUTDOWN_TIMEOUT:?}, cancelling in-flight requests"
                );
            }
        }
        self.state.cancel.cancel();

        info!("Shutdown HTTP server");
        Ok(())
    }
}

/// Builds the bare router; tests drive it directly without a listener.
pub fn make_router(state: PromStoreState) -> Router {
    Router::new()
        .route("/write", routing::post(prom_store::remote_write))
        .route("/read", routing::post(prom_store::remote_read))
        .route("/metrics", routing::get(handler::metrics))
        .route("/health", routing::get(handler::health))
        .with_state(state)
}
