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

//! Ingress pipeline (C4): the single path every inbound record — gossiped
//! or locally authored — passes through before it is durable and before
//! any handler sees it. Never panics on hostile input; every outcome is
//! represented, not thrown.

use crate::core::clock::Clock;
use crate::core::record::{self, ActivityRecord};
use crate::core::store::{PersistentLog, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a record was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Missing/malformed required field, or `v` not recognized.
    Malformed,
    /// `id` did not match the recomputed content address.
    IdMismatch,
    /// Signature did not verify against `agent`.
    InvalidSignature,
    /// `|now - ts|` exceeded the allowed clock drift.
    TimestampDrift,
    /// A private record type arrived on a public channel, or vice versa.
    ChannelMismatch,
    /// The originating agent exceeded its rate limit for this record type.
    RateLimited,
    /// The originating agent is currently blocked by governance action.
    GovernanceBlocked,
    /// The persistent store failed.
    StoreFailure,
}

/// Outcome of running a single record through the pipeline.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Newly accepted and durably stored.
    Accepted(ActivityRecord),
    /// Already present; no-op.
    Duplicate(String),
    /// Rejected before storage.
    Rejected(RejectReason),
}

/// Whether a record arrived over the public gossip channel or a private
/// direct stream; used for the public/private channel-mismatch check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// Broadcast gossip topic.
    Public,
    /// Direct peer-to-peer stream.
    Private,
}

/// Rate-limiting decision point, implemented by the moderation subsystem.
pub trait RateLimitGate: Send + Sync {
    /// `true` if `agent` may submit another record of `record_type` now.
    fn allow(&self, agent: &str, record_type: &str, now: u64) -> bool;
    /// Record that a record of `record_type` from `agent` was admitted.
    fn record(&self, agent: &str, record_type: &str, now: u64);
}

/// Governance block decision point, implemented by the governance subsystem.
pub trait GovernanceGate: Send + Sync {
    /// `true` if `agent` is currently suspended or killed.
    fn is_blocked(&self, agent: &str, now: u64) -> bool;
}

/// A handler invoked for every newly-accepted record, after durable
/// storage. Handlers must not panic; errors are logged and do not roll
/// back the store write.
pub trait Handler: Send + Sync {
    /// Handle one freshly-accepted record.
    fn handle(&self, record: &ActivityRecord);
}

/// Running counters for pipeline outcomes.
#[derive(Default)]
pub struct IngressCounters {
    /// Total records offered to the pipeline.
    pub processed: AtomicU64,
    /// Records accepted and newly stored.
    pub accepted: AtomicU64,
    /// Records rejected (any reason).
    pub rejected: AtomicU64,
    /// Records already present.
    pub duplicates: AtomicU64,
    /// Rejected specifically for invalid signature.
    pub invalid_signature: AtomicU64,
    /// Rejected specifically for timestamp drift.
    pub timestamp_drift: AtomicU64,
}

impl IngressCounters {
    /// Snapshot all counters.
    pub fn snapshot(&self) -> IngressCountersSnapshot {
        IngressCountersSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            invalid_signature: self.invalid_signature.load(Ordering::Relaxed),
            timestamp_drift: self.timestamp_drift.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`IngressCounters`].
#[derive(Clone, Copy, Debug, Default)]
pub struct IngressCountersSnapshot {
    /// See [`IngressCounters::processed`].
    pub processed: u64,
    /// See [`IngressCounters::accepted`].
    pub accepted: u64,
    /// See [`IngressCounters::rejected`].
    pub rejected: u64,
    /// See [`IngressCounters::duplicates`].
    pub duplicates: u64,
    /// See [`IngressCounters::invalid_signature`].
    pub invalid_signature: u64,
    /// See [`IngressCounters::timestamp_drift`].
    pub timestamp_drift: u64,
}

/// The ingress pipeline: validation, dedup, admission control, storage,
/// and dispatch, wired together behind one entry point.
pub struct IngressPipeline {
    store: Arc<PersistentLog>,
    clock: Arc<dyn Clock>,
    rate_limiter: Option<Arc<dyn RateLimitGate>>,
    governance: Option<Arc<dyn GovernanceGate>>,
    handlers: Vec<Arc<dyn Handler>>,
    counters: IngressCounters,
}

impl IngressPipeline {
    /// Construct a pipeline backed by `store`, reading time from `clock`.
    pub fn new(store: Arc<PersistentLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            rate_limiter: None,
            governance: None,
            handlers: Vec::new(),
            counters: IngressCounters::default(),
        }
    }

    /// Install the rate-limiting gate (C11).
    pub fn with_rate_limiter(mut self, gate: Arc<dyn RateLimitGate>) -> Self {
        self.rate_limiter = Some(gate);
        self
    }

    /// Install the governance block gate (C12).
    pub fn with_governance(mut self, gate: Arc<dyn GovernanceGate>) -> Self {
        self.governance = Some(gate);
        self
    }

    /// Register a handler invoked for every newly-accepted record.
    pub fn register_handler(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Read-only access to the running counters.
    pub fn counters(&self) -> &IngressCounters {
        &self.counters
    }

    /// Run one record through the full pipeline: shape, dedup, drift,
    /// signature, rate-limit, governance, store, dispatch.
    pub fn submit(&self, record: &ActivityRecord, channel: Channel) -> Outcome {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        if record.v != record::PROTOCOL_VERSION || record.agent.is_empty() || record.id.is_empty() {
            return self.reject(RejectReason::Malformed);
        }

        let expected_channel = if record.record_type.is_public() {
            Channel::Public
        } else {
            Channel::Private
        };
        if expected_channel != channel {
            return self.reject(RejectReason::ChannelMismatch);
        }

        match self.store.get(&record.id) {
            Ok(Some(_)) => {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                return Outcome::Duplicate(record.id.clone());
            }
            Ok(None) => {}
            Err(StoreError::Corrupt) => {
                // Existing entry unreadable; treat the incoming copy as new.
            }
            Err(_) => return self.reject(RejectReason::StoreFailure),
        }

        let now = self.clock.now_unix();
        let drift = (now as i64) - (record.ts as i64);
        if drift.abs() > record::MAX_CLOCK_DRIFT_SECS {
            self.counters.timestamp_drift.fetch_add(1, Ordering::Relaxed);
            return self.reject(RejectReason::TimestampDrift);
        }

        if !record::id_matches(record) {
            self.counters.invalid_signature.fetch_add(1, Ordering::Relaxed);
            return self.reject(RejectReason::IdMismatch);
        }

        if !record::signature_valid(record) {
            self.counters.invalid_signature.fetch_add(1, Ordering::Relaxed);
            return self.reject(RejectReason::InvalidSignature);
        }

        if let Some(gov) = &self.governance {
            if gov.is_blocked(&record.agent, now) {
                return self.reject(RejectReason::GovernanceBlocked);
            }
        }

        if let Some(limiter) = &self.rate_limiter {
            if !limiter.allow(&record.agent, record.record_type.as_str(), now) {
                return self.reject(RejectReason::RateLimited);
            }
        }

        let inserted = match self.store.insert(record) {
            Ok(v) => v,
            Err(_) => return self.reject(RejectReason::StoreFailure),
        };

        if !inserted {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            return Outcome::Duplicate(record.id.clone());
        }

        if let Some(limiter) = &self.rate_limiter {
            limiter.record(&record.agent, record.record_type.as_str(), now);
        }

        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(id = %record.id, kind = %record.record_type, "accepted");

        for handler in &self.handlers {
            handler.handle(record);
        }

        Outcome::Accepted(record.clone())
    }

    fn reject(&self, reason: RejectReason) -> Outcome {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(?reason, "record rejected");
        Outcome::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::TestClock;
    use crate::core::identity::generate;
    use crate::core::record_types::RecordType;
    use std::sync::Mutex;

    fn pipeline() -> (IngressPipeline, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistentLog::open(dir.path().to_str().unwrap()).unwrap());
        let clock = Arc::new(TestClock::new(1_000_000));
        (IngressPipeline::new(store, clock), dir)
    }

    #[test]
    fn valid_public_record_is_accepted() {
        let (p, _dir) = pipeline();
        let kp = generate().unwrap();
        let mut rec = record::create(&kp, RecordType::TaskPosted, serde_json::json!({"a": 1}), vec![]).unwrap();
        rec.ts = 1_000_000;
        rec.id = record::derive_id(&rec.agent, &rec.record_type, &rec.data, rec.ts, &rec.refs).unwrap();
        rec.sig = hex::encode(crate::core::identity::sign(rec.id.as_bytes(), &kp).unwrap());
        let outcome = p.submit(&rec, Channel::Public);
        assert!(matches!(outcome, Outcome::Accepted(_)));
        assert_eq!(p.counters().snapshot().accepted, 1);
    }

    #[test]
    fn duplicate_is_reported_and_not_recounted() {
        let (p, _dir) = pipeline();
        let kp = generate().unwrap();
        let mut rec = record::create(&kp, RecordType::TaskPosted, serde_json::json!({"a": 1}), vec![]).unwrap();
        rec.ts = 1_000_000;
        rec.id = record::derive_id(&rec.agent, &rec.record_type, &rec.data, rec.ts, &rec.refs).unwrap();
        rec.sig = hex::encode(crate::core::identity::sign(rec.id.as_bytes(), &kp).unwrap());
        assert!(matches!(p.submit(&rec, Channel::Public), Outcome::Accepted(_)));
        assert!(matches!(p.submit(&rec, Channel::Public), Outcome::Duplicate(_)));
        assert_eq!(p.counters().snapshot().accepted, 1);
    }

    #[test]
    fn tampered_data_after_id_derivation_is_rejected_as_id_mismatch() {
        let (p, _dir) = pipeline();
        let kp = generate().unwrap();
        let mut rec = record::create(&kp, RecordType::TaskPosted, serde_json::json!({"a": 1}), vec![]).unwrap();
        rec.ts = 1_000_000;
        rec.id = record::derive_id(&rec.agent, &rec.record_type, &rec.data, rec.ts, &rec.refs).unwrap();
        rec.sig = hex::encode(crate::core::identity::sign(rec.id.as_bytes(), &kp).unwrap());
        // Mutate data without re-deriving id/sig: id no longer matches the content.
        rec.data = serde_json::json!({"a": 2});
        let outcome = p.submit(&rec, Channel::Public);
        assert!(matches!(outcome, Outcome::Rejected(RejectReason::IdMismatch)));
    }

    #[test]
    fn tampered_signature_with_correct_id_is_rejected_as_invalid_signature() {
        let (p, _dir) = pipeline();
        let kp = generate().unwrap();
        let other = generate().unwrap();
        let mut rec = record::create(&kp, RecordType::TaskPosted, serde_json::json!({"a": 1}), vec![]).unwrap();
        rec.ts = 1_000_000;
        rec.id = record::derive_id(&rec.agent, &rec.record_type, &rec.data, rec.ts, &rec.refs).unwrap();
        // Id still matches the content, but the signature is over a different key.
        rec.sig = hex::encode(crate::core::identity::sign(rec.id.as_bytes(), &other).unwrap());
        let outcome = p.submit(&rec, Channel::Public);
        assert!(matches!(outcome, Outcome::Rejected(RejectReason::InvalidSignature)));
    }

    #[test]
    fn private_type_on_public_channel_is_rejected() {
        let (p, _dir) = pipeline();
        let kp = generate().unwrap();
        let mut rec = record::create(&kp, RecordType::TaskBid, serde_json::json!({"a": 1}), vec![]).unwrap();
        rec.ts = 1_000_000;
        rec.id = record::derive_id(&rec.agent, &rec.record_type, &rec.data, rec.ts, &rec.refs).unwrap();
        rec.sig = hex::encode(crate::core::identity::sign(rec.id.as_bytes(), &kp).unwrap());
        let outcome = p.submit(&rec, Channel::Public);
        assert!(matches!(outcome, Outcome::Rejected(RejectReason::ChannelMismatch)));
    }

    struct AlwaysBlock;
    impl RateLimitGate for AlwaysBlock {
        fn allow(&self, _agent: &str, _record_type: &str, _now: u64) -> bool {
            false
        }
        fn record(&self, _agent: &str, _record_type: &str, _now: u64) {}
    }

    #[test]
    fn rate_limited_agent_is_rejected() {
        let (p, _dir) = pipeline();
        let p = p.with_rate_limiter(Arc::new(AlwaysBlock));
        let kp = generate().unwrap();
        let mut rec = record::create(&kp, RecordType::TaskPosted, serde_json::json!({"a": 1}), vec![]).unwrap();
        rec.ts = 1_000_000;
        rec.id = record::derive_id(&rec.agent, &rec.record_type, &rec.data, rec.ts, &rec.refs).unwrap();
        rec.sig = hex::encode(crate::core::identity::sign(rec.id.as_bytes(), &kp).unwrap());
        let outcome = p.submit(&rec, Channel::Public);
        assert!(matches!(outcome, Outcome::Rejected(RejectReason::RateLimited)));
    }

    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }
    impl Handler for RecordingHandler {
        fn handle(&self, record: &ActivityRecord) {
            self.seen.lock().unwrap().push(record.id.clone());
        }
    }

    #[test]
    fn handler_is_invoked_on_accept() {
        let (mut p, _dir) = pipeline();
        let handler = Arc::new(RecordingHandler { seen: Mutex::new(Vec::new()) });
        p.register_handler(handler.clone());
        let kp = generate().unwrap();
        let mut rec = record::create(&kp, RecordType::TaskPosted, serde_json::json!({"a": 1}), vec![]).unwrap();
        rec.ts = 1_000_000;
        rec.id = record::derive_id(&rec.agent, &rec.record_type, &rec.data, rec.ts, &rec.refs).unwrap();
        rec.sig = hex::encode(crate::core::identity::sign(rec.id.as_bytes(), &kp).unwrap());
        p.submit(&rec, Channel::Public);
        assert_eq!(handler.seen.lock().unwrap().len(), 1);
    }
}
