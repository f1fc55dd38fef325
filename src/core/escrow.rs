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

//! Escrow engine (C7): trust-tiered fund locking between a task's posting
//! and its settlement, with per-tier claim fee splits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Counterparty trust tier, governing lock duration and claim fees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustTier {
    /// Established, high-trust counterparties: no extra lock beyond work.
    Tier1,
    /// Moderate trust: lock spans execution + verification windows.
    Tier2,
    /// Low/unknown trust: 3x execution window plus a verifier panel.
    Tier3,
}

/// Escrow state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowState {
    /// Created, awaiting funding.
    Pending,
    /// Funds deposited, awaiting confirmation.
    Funded,
    /// Funds locked for the tier's hold duration.
    Locked,
    /// Lock has elapsed and verification passed; claimable by the executor.
    Claimable,
    /// Executor has claimed the funds (minus fee).
    Claimed,
    /// Returned to the poster (failure/timeout/dispute resolved against executor).
    Refunded,
    /// Under active dispute; frozen until resolved.
    Disputed,
}

/// Escrow errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EscrowError {
    /// The requested transition is not legal from the escrow's current state.
    #[error("cannot transition from {from:?} via {via}")]
    IllegalTransition {
        /// Prior state.
        from: EscrowState,
        /// Attempted operation.
        via: &'static str,
    },
}

fn verifier_fee_bps(tier: TrustTier) -> u32 {
    match tier {
        TrustTier::Tier1 => 0,
        TrustTier::Tier2 => 100,
        TrustTier::Tier3 => 300,
    }
}

/// Lock duration, in seconds, for `tier` given the task's declared
/// execution and verification timeouts.
pub fn lock_duration_secs(tier: TrustTier, execution_timeout_secs: u64, verification_timeout_secs: u64) -> u64 {
    match tier {
        TrustTier::Tier1 => 0,
        TrustTier::Tier2 => execution_timeout_secs + verification_timeout_secs,
        TrustTier::Tier3 => 3 * execution_timeout_secs,
    }
}

/// Verifier panel size required before a Tier3 escrow may be claimed.
pub fn required_verifiers(tier: TrustTier) -> u32 {
    match tier {
        TrustTier::Tier1 | TrustTier::Tier2 => 1,
        TrustTier::Tier3 => 3,
    }
}

/// The result of a successful claim: `worker_payout + protocol_fee +
/// verifier_fee_total == amount`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// Paid to the executor.
    pub worker_payout: u128,
    /// Paid to the protocol treasury.
    pub protocol_fee: u128,
    /// Total paid across the verifier panel.
    pub verifier_fee_total: u128,
    /// `verifier_fee_total` divided evenly across the panel (0 if empty).
    pub per_verifier_fee: u128,
}

/// A single escrow tied to one task.
#[derive(Clone, Debug)]
pub struct Escrow {
    /// Task id this escrow funds.
    pub task_id: String,
    /// Trust tier governing lock duration and fees.
    pub tier: TrustTier,
    /// Principal amount.
    pub amount: u128,
    /// Current state.
    pub state: EscrowState,
    /// Funding transaction hash, set once funded.
    pub tx_hash: Option<String>,
    /// Unix time the lock expires, once confirmed.
    pub lock_until: Option<u64>,
    /// Verifier panel confirmed for this escrow's claim.
    pub verifiers: Vec<String>,
    /// Flat protocol fee, in basis points of the worker's post-verifier-fee
    /// share. Configured per node; defaults to 0.
    pub protocol_fee_bps: u32,
}

impl Escrow {
    /// Create a pending escrow for `task_id`.
    pub fn new(task_id: String, tier: TrustTier, amount: u128) -> Self {
        Self {
            task_id,
            tier,
            amount,
            state: EscrowState::Pending,
            tx_hash: None,
            lock_until: None,
            verifiers: Vec::new(),
            protocol_fee_bps: 0,
        }
    }

    /// Set the protocol fee (basis points) charged on claim.
    pub fn with_protocol_fee_bps(mut self, bps: u32) -> Self {
        self.protocol_fee_bps = bps;
        self
    }

    fn require_state(&self, expected: EscrowState, via: &'static str) -> Result<(), EscrowError> {
        if self.state != expected {
            return Err(EscrowError::IllegalTransition { from: self.state, via });
        }
        Ok(())
    }

    /// Record the funding deposit's transaction hash. `Pending -> Funded`.
    pub fn fund(&mut self, tx_hash: impl Into<String>) -> Result<(), EscrowError> {
        self.require_state(EscrowState::Pending, "fund")?;
        self.tx_hash = Some(tx_hash.into());
        self.state = EscrowState::Funded;
        Ok(())
    }

    /// Confirm the deposit and begin the tier's lock window. `Funded ->
    /// Locked`.
    pub fn confirm(&mut self, now: u64, execution_timeout_secs: u64, verification_timeout_secs: u64) -> Result<(), EscrowError> {
        self.require_state(EscrowState::Funded, "confirm")?;
        let dur = lock_duration_secs(self.tier, execution_timeout_secs, verification_timeout_secs);
        self.lock_until = Some(now + dur);
        self.state = EscrowState::Locked;
        Ok(())
    }

    /// Record the confirmed verifier panel once verification has passed.
    /// Required before `claim` for Tier3 (whose panel-size requirement this
    /// enforces); optional for Tier1/Tier2, which may `claim` directly from
    /// `Locked`. `Locked -> Claimable`.
    pub fn mark_claimable(&mut self, verifiers: Vec<String>) -> Result<(), EscrowError> {
        self.require_state(EscrowState::Locked, "mark_claimable")?;
        if verifiers.len() < required_verifiers(self.tier) as usize {
            return Err(EscrowError::IllegalTransition { from: self.state, via: "mark_claimable" });
        }
        self.verifiers = verifiers;
        self.state = EscrowState::Claimable;
        Ok(())
    }

    /// Claim the escrow, from `Locked` or `Claimable`. Rejected if `tier >
    /// Tier1` and `now < lock_until`. Tier3 additionally requires the
    /// verifier panel from `mark_claimable` (i.e. must already be
    /// `Claimable`) since its fee split depends on a confirmed panel.
    /// `Locked | Claimable -> Claimed`.
    pub fn claim(&mut self, now: u64) -> Result<ClaimOutcome, EscrowError> {
        match self.state {
            EscrowState::Locked if self.tier == TrustTier::Tier3 => {
                return Err(EscrowError::IllegalTransition { from: self.state, via: "claim" });
            }
            EscrowState::Locked | EscrowState::Claimable => {}
            other => return Err(EscrowError::IllegalTransition { from: other, via: "claim" }),
        }
        if self.tier != TrustTier::Tier1 {
            if let Some(lock_until) = self.lock_until {
                if now < lock_until {
                    return Err(EscrowError::IllegalTransition { from: self.state, via: "claim" });
                }
            }
        }

        let verifier_fee_total = self.amount * verifier_fee_bps(self.tier) as u128 / 10_000;
        let worker_share_raw = self.amount - verifier_fee_total;
        let protocol_fee = worker_share_raw * self.protocol_fee_bps as u128 / 10_000;
        let worker_payout = worker_share_raw - protocol_fee;
        let per_verifier_fee = if self.verifiers.is_empty() {
            0
        } else {
            verifier_fee_total / self.verifiers.len() as u128
        };

        self.state = EscrowState::Claimed;
        Ok(ClaimOutcome { worker_payout, protocol_fee, verifier_fee_total, per_verifier_fee })
    }

    /// Refund the full principal to the poster. Allowed immediately from
    /// `Disputed`, or from `Pending`/`Funded`/`Locked` once `now >=
    /// 2 * lock_until` (a lock that was never started, i.e. still
    /// `Pending`/`Funded`, refunds immediately).
    pub fn refund(&mut self, now: u64) -> Result<u128, EscrowError> {
        match self.state {
            EscrowState::Disputed => {
                self.state = EscrowState::Refunded;
                Ok(self.amount)
            }
            EscrowState::Pending | EscrowState::Funded | EscrowState::Locked => {
                let ready = match self.lock_until {
                    Some(lock_until) => now >= 2 * lock_until,
                    None => true,
                };
                if !ready {
                    return Err(EscrowError::IllegalTransition { from: self.state, via: "refund" });
                }
                self.state = EscrowState::Refunded;
                Ok(self.amount)
            }
            other => Err(EscrowError::IllegalTransition { from: other, via: "refund" }),
        }
    }

    /// Open a dispute, freezing the escrow. Legal only from `Locked` or
    /// `Claimable`.
    pub fn dispute(&mut self) -> Result<(), EscrowError> {
        match self.state {
            EscrowState::Locked | EscrowState::Claimable => {
                self.state = EscrowState::Disputed;
                Ok(())
            }
            other => Err(EscrowError::IllegalTransition { from: other, via: "dispute" }),
        }
    }
}

/// Escrow-manager errors, layered on top of [`EscrowError`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    /// No escrow exists for the requested id.
    #[error("unknown escrow id")]
    NotFound,
    /// The underlying escrow rejected the transition.
    #[error(transparent)]
    Escrow(#[from] EscrowError),
}

/// An in-memory registry of escrows keyed by escrow id, with a secondary
/// index by task id (a task may be refunded and re-escrowed after a
/// failed attempt, so the mapping is one-to-many).
#[derive(Default)]
pub struct EscrowManager {
    escrows: BTreeMap<String, Escrow>,
    by_task: BTreeMap<String, Vec<String>>,
    next_seq: u64,
}

impl EscrowManager {
    /// Construct an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending escrow for `task_id` and return its assigned id.
    pub fn create(&mut self, task_id: String, tier: TrustTier, amount: u128, protocol_fee_bps: u32) -> String {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = format!("escrow:{task_id}:{seq}");
        let escrow = Escrow::new(task_id.clone(), tier, amount).with_protocol_fee_bps(protocol_fee_bps);
        self.escrows.insert(id.clone(), escrow);
        self.by_task.entry(task_id).or_default().push(id.clone());
        id
    }

    /// Look up an escrow by id.
    pub fn get(&self, id: &str) -> Option<&Escrow> {
        self.escrows.get(id)
    }

    /// All escrows ever created for `task_id`, oldest first.
    pub fn list_by_task(&self, task_id: &str) -> Vec<&Escrow> {
        self.by_task
            .get(task_id)
            .map(|ids| ids.iter().filter_map(|id| self.escrows.get(id)).collect())
            .unwrap_or_default()
    }

    fn with_escrow<T>(&mut self, id: &str, f: impl FnOnce(&mut Escrow) -> Result<T, EscrowError>) -> Result<T, ManagerError> {
        let escrow = self.escrows.get_mut(id).ok_or(ManagerError::NotFound)?;
        Ok(f(escrow)?)
    }

    /// Fund the escrow at `id`.
    pub fn fund(&mut self, id: &str, tx_hash: impl Into<String>) -> Result<(), ManagerError> {
        let tx_hash = tx_hash.into();
        self.with_escrow(id, |e| e.fund(tx_hash))
    }

    /// Confirm the escrow at `id`, starting its lock window.
    pub fn confirm(
        &mut self,
        id: &str,
        now: u64,
        execution_timeout_secs: u64,
        verification_timeout_secs: u64,
    ) -> Result<(), ManagerError> {
        self.with_escrow(id, |e| e.confirm(now, execution_timeout_secs, verification_timeout_secs))
    }

    /// Mark the escrow at `id` claimable once verification has passed.
    pub fn mark_claimable(&mut self, id: &str, verifiers: Vec<String>) -> Result<(), ManagerError> {
        self.with_escrow(id, |e| e.mark_claimable(verifiers))
    }

    /// Claim the escrow at `id`.
    pub fn claim(&mut self, id: &str, now: u64) -> Result<ClaimOutcome, ManagerError> {
        self.with_escrow(id, |e| e.claim(now))
    }

    /// Refund the escrow at `id`.
    pub fn refund(&mut self, id: &str, now: u64) -> Result<u128, ManagerError> {
        self.with_escrow(id, |e| e.refund(now))
    }

    /// Open a dispute on the escrow at `id`.
    pub fn dispute(&mut self, id: &str) -> Result<(), ManagerError> {
        self.with_escrow(id, |e| e.dispute())
    }
}
