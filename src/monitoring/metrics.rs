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

//! Prometheus metrics for the ingress pipeline, escrow engine, rate
//! limiter, and governance subsystems, served over HTTP at the
//! configured `/metrics` endpoint.

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A prometheus metric failed to construct or register.
    #[error("prometheus")]
    Prom,
}

/// Metrics container, wired into every subsystem that emits counters.
#[derive(Clone)]
pub struct Metrics {
    /// Registry all metrics below are registered against.
    pub registry: Registry,

    /// Gossip peers currently connected.
    pub gossip_peers: IntGauge,
    /// Records offered to the ingress pipeline.
    pub ingress_processed_total: IntCounter,
    /// Records accepted and stored.
    pub ingress_accepted_total: IntCounter,
    /// Records rejected (any reason).
    pub ingress_rejected_total: IntCounter,
    /// Records rejected for invalid signature.
    pub ingress_invalid_signature_total: IntCounter,
    /// Records rejected for timestamp drift.
    pub ingress_timestamp_drift_total: IntCounter,
    /// Records recognized as duplicates.
    pub ingress_duplicate_total: IntCounter,

    /// Admissions rejected by the rate limiter.
    pub rate_limited_total: IntCounter,
    /// Agents auto-flagged for repeated rate-limit violations.
    pub rate_limiter_auto_flagged_total: IntCounter,

    /// Escrows funded.
    pub escrow_funded_total: IntCounter,
    /// Escrows claimed.
    pub escrow_claimed_total: IntCounter,
    /// Escrows refunded.
    pub escrow_refunded_total: IntCounter,
    /// Escrows disputed.
    pub escrow_disputed_total: IntCounter,

    /// Governance actions applied (warn/suspend/kill combined).
    pub governance_actions_total: IntCounter,
    /// Killswitch invocations.
    pub killswitch_invoked_total: IntCounter,

    /// Currently-tracked seen-id cache entries in the gossip adapter.
    pub gossip_seen_cache_size: IntGauge,
}

macro_rules! counter {
    ($name:literal, $help:literal) => {
        IntCounter::new($name, $help).map_err(|_| MetricsError::Prom)?
    };
}

macro_rules! gauge {
    ($name:literal, $help:literal) => {
        IntGauge::new($name, $help).map_err(|_| MetricsError::Prom)?
    };
}

impl Metrics {
    /// Create and register every metric against a fresh [`Registry`].
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let gossip_peers = gauge!("rird_gossip_peers", "Connected gossip peers");
        let ingress_processed_total = counter!("rird_ingress_processed_total", "Records offered to the ingress pipeline");
        let ingress_accepted_total = counter!("rird_ingress_accepted_total", "Records accepted and stored");
        let ingress_rejected_total = counter!("rird_ingress_rejected_total", "Records rejected, any reason");
        let ingress_invalid_signature_total =
            counter!("rird_ingress_invalid_signature_total", "Records rejected for invalid signature");
        let ingress_timestamp_drift_total =
            counter!("rird_ingress_timestamp_drift_total", "Records rejected for timestamp drift");
        let ingress_duplicate_total = counter!("rird_ingress_duplicate_total", "Records recognized as duplicates");

        let rate_limited_total = counter!("rird_rate_limited_total", "Admissions rejected by the rate limiter");
        let rate_limiter_auto_flagged_total =
            counter!("rird_rate_limiter_auto_flagged_total", "Agents auto-flagged for repeated violations");

        let escrow_funded_total = counter!("rird_escrow_funded_total", "Escrows funded");
        let escrow_claimed_total = counter!("rird_escrow_claimed_total", "Escrows claimed");
        let escrow_refunded_total = counter!("rird_escrow_refunded_total", "Escrows refunded");
        let escrow_disputed_total = counter!("rird_escrow_disputed_total", "Escrows disputed");

        let governance_actions_total = counter!("rird_governance_actions_total", "Governance actions applied");
        let killswitch_invoked_total = counter!("rird_killswitch_invoked_total", "Killswitch invocations");

        let gossip_seen_cache_size = gauge!("rird_gossip_seen_cache_size", "Tracked seen-id cache entries");

        for m in [&ingress_processed_total, &ingress_accepted_total, &ingress_rejected_total] {
            registry.register(Box::new(m.clone())).map_err(|_| MetricsError::Prom)?;
        }
        for m in [
            &ingress_invalid_signature_total,
            &ingress_timestamp_drift_total,
            &ingress_duplicate_total,
            &rate_limited_total,
            &rate_limiter_auto_flagged_total,
            &escrow_funded_total,
            &escrow_claimed_total,
            &escrow_refunded_total,
            &escrow_disputed_total,
            &governance_actions_total,
            &killswitch_invoked_total,
        ] {
            registry.register(Box::new(m.clone())).map_err(|_| MetricsError::Prom)?;
        }
        registry.register(Box::new(gossip_peers.clone())).map_err(|_| MetricsError::Prom)?;
        registry.register(Box::new(gossip_seen_cache_size.clone())).map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            gossip_peers,
            ingress_processed_total,
            ingress_accepted_total,
            ingress_rejected_total,
            ingress_invalid_signature_total,
            ingress_timestamp_drift_total,
            ingress_duplicate_total,
            rate_limited_total,
            rate_limiter_auto_flagged_total,
            escrow_funded_total,
            escrow_claimed_total,
            escrow_refunded_total,
            escrow_disputed_total,
            governance_actions_total,
            killswitch_invoked_total,
            gossip_seen_cache_size,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        if encoder.encode(&families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_registers_without_panicking() {
        let m = Metrics::new().unwrap();
        m.ingress_accepted_total.inc();
        let rendered = m.encode();
        assert!(rendered.contains("rird_ingress_accepted_total"));
    }
}
