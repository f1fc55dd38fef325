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

//! Governance & killswitch (C12): an N-of-M keyholder registry that can
//! warn, suspend, or kill an agent by multisig action, plus a single-key
//! emergency killswitch that is independent of the keyholder quorum.

use crate::core::identity;
use crate::core::ingress::GovernanceGate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

const KILLSWITCH_MAX_AGE_SECS: u64 = 24 * 3600;

/// Governance errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GovernanceError {
    /// `threshold` must satisfy `1 <= n <= m`.
    #[error("invalid threshold")]
    InvalidThreshold,
    /// Fewer than `threshold` distinct, active keyholders signed.
    #[error("quorum not met")]
    QuorumNotMet,
    /// A signer in the payload is not a registered, active keyholder.
    #[error("unknown or inactive keyholder")]
    UnknownKeyholder,
    /// One or more signatures failed to verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// The killswitch payload is older than the allowed age.
    #[error("killswitch payload too old")]
    KillswitchTooOld,
    /// The killswitch payload's signature did not verify against the root key.
    #[error("invalid killswitch signature")]
    InvalidKillswitchSignature,
}

/// An N-of-M keyholder registry.
pub struct KeyholderRegistry {
    active: HashSet<String>,
    threshold: u32,
}

impl KeyholderRegistry {
    /// Construct a registry of `keyholders` (hex public keys) requiring
    /// `threshold` valid signatures. `1 <= threshold <= keyholders.len()`.
    pub fn new(keyholders: Vec<String>, threshold: u32) -> Result<Self, GovernanceError> {
        if threshold == 0 || threshold as usize > keyholders.len() {
            return Err(GovernanceError::InvalidThreshold);
        }
        Ok(Self {
            active: keyholders.into_iter().collect(),
            threshold,
        })
    }

    /// Revoke a keyholder (e.g. on compromise). Does not change threshold.
    pub fn revoke(&mut self, keyholder: &str) {
        self.active.remove(keyholder);
    }

    fn is_active(&self, keyholder: &str) -> bool {
        self.active.contains(keyholder)
    }
}

/// A governance action voted on by keyholders.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Non-binding warning.
    Warn {
        /// Target agent.
        target: String,
        /// Free-text reason.
        reason: String,
    },
    /// Temporary suspension.
    Suspend {
        /// Target agent.
        target: String,
        /// Suspension duration, in seconds. `0` means indefinite: the
        /// suspension never auto-lifts on its own.
        duration_secs: u64,
        /// Free-text reason.
        reason: String,
    },
    /// Permanent removal from the network's good standing.
    Kill {
        /// Target agent.
        target: String,
        /// Free-text reason.
        reason: String,
    },
}

impl Action {
    fn target(&self) -> &str {
        match self {
            Action::Warn { target, .. } | Action::Suspend { target, .. } | Action::Kill { target, .. } => target,
        }
    }

    /// Canonical string signed by each keyholder: a stable, order-
    /// independent encoding of the action.
    fn canonical_string(&self) -> String {
        match self {
            Action::Warn { target, reason } => format!("warn|{}|{}", target, reason),
            Action::Suspend { target, duration_secs, reason } => {
                format!("suspend|{}|{}|{}", target, duration_secs, reason)
            }
            Action::Kill { target, reason } => format!("kill|{}|{}", target, reason),
        }
    }
}

/// A multisig action payload: the action plus a signer -> signature map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionPayload {
    /// The proposed action.
    pub action: Action,
    /// Hex public key -> hex signature over [`Action::canonical_string`].
    pub signatures: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
enum Standing {
    Warned,
    /// `None` means the suspension never auto-lifts (`duration_secs == 0`).
    Suspended { until: Option<u64> },
    Killed,
}

/// Applies and tracks the current standing of every agent under
/// governance: active suspensions/kills, superseded by later actions.
pub struct Governance {
    registry: Mutex<KeyholderRegistry>,
    standing: Mutex<HashMap<String, Standing>>,
    killswitch_root: [u8; 32],
    kill_invoked: Mutex<bool>,
    shutdown_handler: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Governance {
    /// Construct governance state with `registry` and the 32-byte
    /// killswitch root public key.
    pub fn new(registry: KeyholderRegistry, killswitch_root: [u8; 32]) -> Self {
        Self {
            registry: Mutex::new(registry),
            standing: Mutex::new(HashMap::new()),
            killswitch_root,
            kill_invoked: Mutex::new(false),
            shutdown_handler: Mutex::new(None),
        }
    }

    /// Register the handler to run the first time the killswitch is
    /// invoked. Only one handler may be registered; a later call replaces
    /// it only if the killswitch has not fired yet.
    pub fn register_shutdown_handler(&self, handler: impl FnOnce() + Send + 'static) {
        let mut slot = self.shutdown_handler.lock().unwrap();
        if !*self.kill_invoked.lock().unwrap() {
            *slot = Some(Box::new(handler));
        }
    }

    /// Verify `payload` has quorum from active keyholders, then apply its
    /// action. A `Kill` supersedes any prior standing; a later `Suspend`
    /// or `Warn` does not downgrade an existing `Kill`.
    pub fn apply(&self, payload: &ActionPayload, now: u64) -> Result<(), GovernanceError> {
        let registry = self.registry.lock().unwrap();
        let message = payload.action.canonical_string();
        let mut valid_signers = 0u32;
        for (signer_hex, sig_hex) in &payload.signatures {
            if !registry.is_active(signer_hex) {
                continue;
            }
            let Ok(signer_bytes) = hex::decode(signer_hex) else { continue };
            let Ok(sig_bytes) = hex::decode(sig_hex) else { continue };
            if identity::verify(&sig_bytes, message.as_bytes(), &signer_bytes) {
                valid_signers += 1;
            }
        }
        if valid_signers < registry.threshold {
            return Err(GovernanceError::QuorumNotMet);
        }
        drop(registry);

        let mut standing = self.standing.lock().unwrap();
        let target = payload.action.target().to_string();
        if matches!(standing.get(&target), Some(Standing::Killed)) {
            return Ok(());
        }
        let new_standing = match &payload.action {
            Action::Warn { .. } => Standing::Warned,
            Action::Suspend { duration_secs, .. } => Standing::Suspended {
                until: if *duration_secs == 0 { None } else { Some(now + duration_secs) },
            },
            Action::Kill { .. } => Standing::Killed,
        };
        standing.insert(target, new_standing);
        Ok(())
    }

    /// Verify and invoke the emergency killswitch: a single-signer,
    /// root-key-signed `{type:"kill", reason, ts}` payload, idempotent.
    pub fn invoke_killswitch(
        &self,
        reason: &str,
        ts: u64,
        signature: &[u8],
        now: u64,
    ) -> Result<(), GovernanceError> {
        if now.saturating_sub(ts) > KILLSWITCH_MAX_AGE_SECS {
            return Err(GovernanceError::KillswitchTooOld);
        }
        let message = format!("kill|{}|{}", reason, ts);
        if !identity::verify(signature, message.as_bytes(), &self.killswitch_root) {
            return Err(GovernanceError::InvalidKillswitchSignature);
        }
        let mut invoked = self.kill_invoked.lock().unwrap();
        let already_invoked = *invoked;
        *invoked = true;
        drop(invoked);

        if !already_invoked {
            if let Some(handler) = self.shutdown_handler.lock().unwrap().take() {
                handler();
            }
        }
        Ok(())
    }

    /// `true` if the emergency killswitch has been invoked.
    pub fn is_killed(&self) -> bool {
        *self.kill_invoked.lock().unwrap()
    }
}

impl GovernanceGate for Governance {
    fn is_blocked(&self, agent: &str, now: u64) -> bool {
        if self.is_killed() {
            return true;
        }
        match self.standing.lock().unwrap().get(agent) {
            Some(Standing::Killed) => true,
            Some(Standing::Suspended { until: None }) => true,
            Some(Standing::Suspended { until: Some(until) }) => now < *until,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{generate, sign};

    fn sign_action(action: &Action, kp: &crate::core::identity::Keypair) -> (String, String) {
        let msg = action.canonical_string();
        let sig = sign(msg.as_bytes(), kp).unwrap();
        (kp.public_hex(), hex::encode(sig))
    }

    #[test]
    fn rejects_below_threshold() {
        let k1 = generate().unwrap();
        let k2 = generate().unwrap();
        let k3 = generate().unwrap();
        let registry = KeyholderRegistry::new(
            vec![k1.public_hex(), k2.public_hex(), k3.public_hex()],
            2,
        )
        .unwrap();
        let gov = Governance::new(registry, [0u8; 32]);

        let action = Action::Suspend { target: "agent-x".into(), duration_secs: 3600, reason: "spam".into() };
        let (pk, sig) = sign_action(&action, &k1);
        let mut signatures = BTreeMap::new();
        signatures.insert(pk, sig);
        let payload = ActionPayload { action, signatures };

        assert_eq!(gov.apply(&payload, 1000), Err(GovernanceError::QuorumNotMet));
        assert!(!gov.is_blocked("agent-x", 1000));
    }

    #[test]
    fn quorum_suspends_agent_for_duration() {
        let k1 = generate().unwrap();
        let k2 = generate().unwrap();
        let registry = KeyholderRegistry::new(vec![k1.public_hex(), k2.public_hex()], 2).unwrap();
        let gov = Governance::new(registry, [0u8; 32]);

        let action = Action::Suspend { target: "agent-x".into(), duration_secs: 1000, reason: "spam".into() };
        let (pk1, sig1) = sign_action(&action, &k1);
        let (pk2, sig2) = sign_action(&action, &k2);
        let mut signatures = BTreeMap::new();
        signatures.insert(pk1, sig1);
        signatures.insert(pk2, sig2);
        let payload = ActionPayload { action, signatures };

        gov.apply(&payload, 1000).unwrap();
        assert!(gov.is_blocked("agent-x", 1500));
        assert!(!gov.is_blocked("agent-x", 2100));
    }

    #[test]
    fn zero_duration_suspend_is_indefinite() {
        let k1 = generate().unwrap();
        let k2 = generate().unwrap();
        let registry = KeyholderRegistry::new(vec![k1.public_hex(), k2.public_hex()], 2).unwrap();
        let gov = Governance::new(registry, [0u8; 32]);

        let action = Action::Suspend { target: "agent-x".into(), duration_secs: 0, reason: "spam".into() };
        let (pk1, sig1) = sign_action(&action, &k1);
        let (pk2, sig2) = sign_action(&action, &k2);
        let mut signatures = BTreeMap::new();
        signatures.insert(pk1, sig1);
        signatures.insert(pk2, sig2);
        gov.apply(&ActionPayload { action, signatures }, 1000).unwrap();

        assert!(gov.is_blocked("agent-x", 1_000));
        assert!(gov.is_blocked("agent-x", u64::MAX));
    }

    #[test]
    fn kill_supersedes_later_suspend() {
        let k1 = generate().unwrap();
        let k2 = generate().unwrap();
        let registry = KeyholderRegistry::new(vec![k1.public_hex(), k2.public_hex()], 2).unwrap();
        let gov = Governance::new(registry, [0u8; 32]);

        let kill = Action::Kill { target: "agent-x".into(), reason: "abuse".into() };
        let (pk1, sig1) = sign_action(&kill, &k1);
        let (pk2, sig2) = sign_action(&kill, &k2);
        let mut sigs = BTreeMap::new();
        sigs.insert(pk1, sig1);
        sigs.insert(pk2, sig2);
        gov.apply(&ActionPayload { action: kill, signatures: sigs }, 1000).unwrap();

        let suspend = Action::Suspend { target: "agent-x".into(), duration_secs: 10, reason: "x".into() };
        let (pk1b, sig1b) = sign_action(&suspend, &k1);
        let (pk2b, sig2b) = sign_action(&suspend, &k2);
        let mut sigs2 = BTreeMap::new();
        sigs2.insert(pk1b, sig1b);
        sigs2.insert(pk2b, sig2b);
        gov.apply(&ActionPayload { action: suspend, signatures: sigs2 }, 1001).unwrap();

        assert!(gov.is_blocked("agent-x", 100_000));
    }

    #[test]
    fn killswitch_requires_root_signature_and_freshness() {
        let root = generate().unwrap();
        let registry = KeyholderRegistry::new(vec![root.public_hex()], 1).unwrap();
        let gov = Governance::new(registry, root.public);

        let reason = "emergency";
        let ts = 1000u64;
        let msg = format!("kill|{}|{}", reason, ts);
        let sig = sign(msg.as_bytes(), &root).unwrap();

        assert!(gov.invoke_killswitch(reason, ts, &sig, 1500).is_ok());
        assert!(gov.is_killed());

        let stale_ts = 0u64;
        let stale_msg = format!("kill|{}|{}", reason, stale_ts);
        let stale_sig = sign(stale_msg.as_bytes(), &root).unwrap();
        assert_eq!(
            gov.invoke_killswitch(reason, stale_ts, &stale_sig, 1_000_000),
            Err(GovernanceError::KillswitchTooOld)
        );
    }

    #[test]
    fn killswitch_is_idempotent() {
        let root = generate().unwrap();
        let registry = KeyholderRegistry::new(vec![root.public_hex()], 1).unwrap();
        let gov = Governance::new(registry, root.public);
        let msg = format!("kill|{}|{}", "r", 1000);
        let sig = sign(msg.as_bytes(), &root).unwrap();
        gov.invoke_killswitch("r", 1000, &sig, 1000).unwrap();
        gov.invoke_killswitch("r", 1000, &sig, 1001).unwrap();
        assert!(gov.is_killed());
    }

    #[test]
    fn registered_shutdown_handler_runs_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        let root = generate().unwrap();
        let registry = KeyholderRegistry::new(vec![root.public_hex()], 1).unwrap();
        let gov = Governance::new(registry, root.public);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_handler = calls.clone();
        gov.register_shutdown_handler(move || {
            calls_for_handler.fetch_add(1, Ordering::SeqCst);
        });

        let msg = format!("kill|{}|{}", "r", 1000);
        let sig = sign(msg.as_bytes(), &root).unwrap();
        gov.invoke_killswitch("r", 1000, &sig, 1000).unwrap();
        gov.invoke_killswitch("r", 1000, &sig, 1001).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
