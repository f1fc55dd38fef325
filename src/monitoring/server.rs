// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! The `/metrics` HTTP endpoint, served with axum alongside the daemon.

use crate::monitoring::metrics::Metrics;
use axum::{extract::State, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.encode()
}

/// Serve `/metrics` on `addr` until `shutdown` resolves.
pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>, shutdown: impl std::future::Future<Output = ()> + Send + 'static) {
    let app = Router::new().route("/metrics", get(metrics_handler)).with_state(metrics);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!(%addr, error = %e, "failed to bind metrics listener");
            return;
        }
    };
    info!(%addr, "metrics endpoint listening");
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        warn!(error = %e, "metrics server exited with error");
    }
}
