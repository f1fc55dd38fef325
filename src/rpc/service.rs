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
#![warn(missing_docs)]

//! The control-plane facade: the five methods the core must service over
//! the RPC socket (`status`, `marketplace.browse`, `marketplace.bid`,
//! `marketplace.post`, `shutdown`), each a thin adapter onto the ingress
//! pipeline, the persistent log, and this node's own signing identity.

use crate::core::clock::Clock;
use crate::core::identity::Keypair;
use crate::core::ingress::{Channel, IngressPipeline, Outcome};
use crate::core::record;
use crate::core::record_types::RecordType;
use crate::core::store::PersistentLog;
use crate::networking::gossip::GossipBroadcaster;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// A control-plane method call failed. Distinguishes caller mistakes
/// (bad params) from this node's own failures, so the server can map
/// each to the right JSON-RPC error code.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `params` did not contain what this method requires.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// The request was well-formed but rejected by the protocol engine
    /// (e.g. the composed record failed ingress admission).
    #[error("rejected: {0}")]
    Rejected(String),
    /// Something internal to this node failed while servicing the call.
    #[error("internal: {0}")]
    Internal(String),
}

fn str_field(params: &Value, key: &str) -> Result<String, ServiceError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::InvalidParams(format!("missing string field `{key}`")))
}

fn f64_field(params: &Value, key: &str) -> Result<f64, ServiceError> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ServiceError::InvalidParams(format!("missing numeric field `{key}`")))
}

/// Backs the RPC server: one instance per node, shared across connections.
pub struct RpcService {
    store: Arc<PersistentLog>,
    pipeline: Arc<IngressPipeline>,
    keypair: Arc<Keypair>,
    clock: Arc<dyn Clock>,
    broadcaster: Option<GossipBroadcaster>,
    shutdown_tx: watch::Sender<bool>,
    started_at: u64,
}

impl RpcService {
    /// Construct the service. `started_at` is the node's boot time, read
    /// from `clock` once at startup, for `status`'s uptime field.
    pub fn new(
        store: Arc<PersistentLog>,
        pipeline: Arc<IngressPipeline>,
        keypair: Arc<Keypair>,
        clock: Arc<dyn Clock>,
        broadcaster: Option<GossipBroadcaster>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        let started_at = clock.now_unix();
        Self { store, pipeline, keypair, clock, broadcaster, shutdown_tx, started_at }
    }

    /// Dispatch one method call. Returns `None` for an unrecognized
    /// method so the caller can report `METHOD_NOT_FOUND` rather than
    /// this module needing to know the JSON-RPC error taxonomy.
    pub async fn dispatch(&self, method: &str, params: Value) -> Option<Result<Value, ServiceError>> {
        Some(match method {
            "status" => self.status(),
            "marketplace.browse" => self.browse(&params),
            "marketplace.post" => self.post(&params).await,
            "marketplace.bid" => self.bid(&params).await,
            "shutdown" => self.shutdown(),
            _ => return None,
        })
    }

    fn status(&self) -> Result<Value, ServiceError> {
        let now = self.clock.now_unix();
        Ok(serde_json::json!({
            "agent": self.keypair.public_hex(),
            "protocol_version": record::PROTOCOL_VERSION,
            "record_count": self.store.count(),
            "uptime_secs": now.saturating_sub(self.started_at),
            "ingress": {
                "processed": self.pipeline.counters().snapshot().processed,
                "accepted": self.pipeline.counters().snapshot().accepted,
                "rejected": self.pipeline.counters().snapshot().rejected,
            },
        }))
    }

    fn browse(&self, params: &Value) -> Result<Value, ServiceError> {
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(50).min(1000) as usize;
        let category = params.get("category").and_then(Value::as_str);

        let posted = self
            .store
            .query_by_type(&RecordType::TaskPosted, limit.max(1) * 4)
            .map_err(|e| ServiceError::Internal(format!("store query failed: {e}")))?;

        let matches: Vec<Value> = posted
            .into_iter()
            .filter(|rec| match category {
                Some(want) => rec.data.get("category").and_then(Value::as_str) == Some(want),
                None => true,
            })
            .take(limit)
            .map(|rec| {
                serde_json::json!({
                    "id": rec.id,
                    "poster": rec.agent,
                    "ts": rec.ts,
                    "data": rec.data,
                })
            })
            .collect();

        Ok(serde_json::json!({ "tasks": matches }))
    }

    async fn post(&self, params: &Value) -> Result<Value, ServiceError> {
        let description = str_field(params, "description")?;
        let budget_xmr = f64_field(params, "budgetXmr")?;
        let category = params.get("category").and_then(Value::as_str).unwrap_or("general");
        let requirements: Vec<String> = params
            .get("requirements")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let trust_tier = params.get("trustTier").and_then(Value::as_u64).unwrap_or(1);

        let data = serde_json::json!({
            "description": description,
            "budget": budget_xmr,
            "category": category,
            "requirements": requirements,
            "trust_tier": trust_tier,
        });

        let record = self.sign_and_admit(RecordType::TaskPosted, data, vec![], Channel::Public).await?;
        Ok(serde_json::json!({ "task_id": record.id }))
    }

    async fn bid(&self, params: &Value) -> Result<Value, ServiceError> {
        let task_id = str_field(params, "taskId")?;
        let price_xmr = f64_field(params, "priceXmr")?;

        let data = serde_json::json!({ "task_id": task_id, "price": price_xmr });
        let record = self
            .sign_and_admit(RecordType::TaskBid, data, vec![task_id.clone()], Channel::Private)
            .await?;
        Ok(serde_json::json!({ "bid_id": record.id }))
    }

    async fn sign_and_admit(
        &self,
        record_type: RecordType,
        data: Value,
        refs: Vec<String>,
        channel: Channel,
    ) -> Result<record::ActivityRecord, ServiceError> {
        let record = record::create(&self.keypair, record_type, data, refs)
            .map_err(|e| ServiceError::Internal(format!("record construction failed: {e}")))?;

        match self.pipeline.submit(&record, channel) {
            Outcome::Accepted(accepted) => {
                if channel == Channel::Public {
                    if let Some(broadcaster) = &self.broadcaster {
                        if let Err(e) = broadcaster.broadcast(accepted.clone()).await {
                            warn!(error = %e, "failed to broadcast locally-authored record");
                        }
                    }
                }
                Ok(accepted)
            }
            Outcome::Duplicate(id) => Err(ServiceError::Internal(format!("unexpected duplicate id {id}"))),
            Outcome::Rejected(reason) => Err(ServiceError::Rejected(format!("{reason:?}"))),
        }
    }

    fn shutdown(&self) -> Result<Value, ServiceError> {
        info!("shutdown requested over control-plane socket");
        let _ = self.shutdown_tx.send(true);
        Ok(serde_json::json!({ "shutting_down": true }))
    }
}
