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

//! Task lifecycle engine (C6): the state machine governing one task's
//! path from `open` through assignment, completion, verification, and
//! settlement, or rejection/failure along the way.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Task lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Posted, accepting bids.
    Open,
    /// A bid has been accepted; work is in progress.
    Assigned,
    /// Executor delivered a result; awaiting verification.
    Completed,
    /// Execution failed or timed out.
    Failed,
    /// Verification passed; escrow may be claimed.
    Verified,
    /// Escrow paid out.
    Settled,
    /// Hidden from discovery after repeated flagging (C11); terminal.
    Hidden,
}

/// Errors raised by invalid lifecycle transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The requested transition is not legal from the task's current state.
    #[error("cannot transition from {from:?} via {via}")]
    IllegalTransition {
        /// The state the task was in.
        from: TaskState,
        /// What the caller attempted.
        via: &'static str,
    },
    /// The bid does not belong to the task or bidder mismatch.
    #[error("bid ownership mismatch")]
    BidOwnership,
    /// No acceptable bid was available to assign.
    #[error("no acceptable bid")]
    NoAcceptableBid,
}

/// A bid against an open task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bid {
    /// Bidder agent id.
    pub bidder: String,
    /// Proposed price.
    pub price: f64,
    /// Bid record id, used for ordering (earlier bid wins ties).
    pub bid_id: String,
    /// When the bid was submitted.
    pub ts: u64,
}

/// One task and its lifecycle state.
#[derive(Clone, Debug)]
pub struct Task {
    /// Task record id (the `task.posted` record's id).
    pub id: String,
    /// Poster agent id.
    pub poster: String,
    /// Current state.
    pub state: TaskState,
    /// Bids received while open, in arrival order.
    pub bids: Vec<Bid>,
    /// The bid accepted at assignment time, if any.
    pub assigned_bid: Option<Bid>,
    /// Result hash delivered by the executor, once completed.
    pub result_hash: Option<String>,
    /// Count of reputable flags raised against this task.
    pub flag_count: u32,
    /// Timestamp of the last state transition.
    pub updated_at: u64,
    /// Poster's declared budget ceiling; a bid above this is unacceptable.
    pub budget: f64,
}

/// Threshold at which a task is force-hidden regardless of state.
pub const HIDE_FLAG_THRESHOLD: u32 = 3;

impl Task {
    /// A freshly-posted, open task.
    pub fn new_open(id: String, poster: String, budget: f64, now: u64) -> Self {
        Self {
            id,
            poster,
            state: TaskState::Open,
            bids: Vec::new(),
            assigned_bid: None,
            result_hash: None,
            flag_count: 0,
            updated_at: now,
            budget,
        }
    }

    fn require_state(&self, expected: TaskState, via: &'static str) -> Result<(), TaskError> {
        if self.state != expected {
            return Err(TaskError::IllegalTransition { from: self.state, via });
        }
        Ok(())
    }

    /// Record an incoming bid. Only legal while `Open`. Duplicate bids
    /// from the same bidder (by `bid_id`) are silently ignored.
    pub fn receive_bid(&mut self, bid: Bid) -> Result<(), TaskError> {
        self.require_state(TaskState::Open, "receive_bid")?;
        if self.bids.iter().any(|b| b.bid_id == bid.bid_id) {
            return Ok(());
        }
        self.bids.push(bid);
        Ok(())
    }

    /// Assign the task to the first acceptable bid in `ts` order (ties
    /// broken lexicographically by bidder agent key). A bid is acceptable
    /// if its bidder is not blocked and its price does not exceed the
    /// task's budget; a bidder is trusted to never submit a bid below its
    /// own minimum, so that constraint is not re-checked here.
    pub fn assign_first_acceptable(
        &mut self,
        now: u64,
        is_blocked: impl Fn(&str) -> bool,
    ) -> Result<&Bid, TaskError> {
        self.require_state(TaskState::Open, "assign")?;
        let mut candidates: Vec<&Bid> = self.bids.iter().collect();
        candidates.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.bidder.cmp(&b.bidder)));
        let winner = candidates
            .into_iter()
            .find(|b| !is_blocked(&b.bidder) && b.price <= self.budget)
            .cloned()
            .ok_or(TaskError::NoAcceptableBid)?;
        self.assigned_bid = Some(winner);
        self.state = TaskState::Assigned;
        self.updated_at = now;
        Ok(self.assigned_bid.as_ref().unwrap())
    }

    /// Record a delivered result. Only the assigned bidder may complete
    /// the task.
    pub fn complete(&mut self, bidder: &str, result_hash: String, now: u64) -> Result<(), TaskError> {
        self.require_state(TaskState::Assigned, "complete")?;
        match &self.assigned_bid {
            Some(b) if b.bidder == bidder => {}
            _ => return Err(TaskError::BidOwnership),
        }
        self.result_hash = Some(result_hash);
        self.state = TaskState::Completed;
        self.updated_at = now;
        Ok(())
    }

    /// Mark the task failed: legal from `Assigned` (execution failure or
    /// timeout) or from `Completed` (verification rejected the result).
    pub fn fail(&mut self, now: u64) -> Result<(), TaskError> {
        match self.state {
            TaskState::Assigned | TaskState::Completed => {
                self.state = TaskState::Failed;
                self.updated_at = now;
                Ok(())
            }
            other => Err(TaskError::IllegalTransition { from: other, via: "fail" }),
        }
    }

    /// Mark the completed result verified.
    pub fn verify_pass(&mut self, now: u64) -> Result<(), TaskError> {
        self.require_state(TaskState::Completed, "verify_pass")?;
        self.state = TaskState::Verified;
        self.updated_at = now;
        Ok(())
    }

    /// Settle a verified task once its escrow has paid out.
    pub fn settle(&mut self, now: u64) -> Result<(), TaskError> {
        self.require_state(TaskState::Verified, "settle")?;
        self.state = TaskState::Settled;
        self.updated_at = now;
        Ok(())
    }

    /// Record a reputable flag against this task; force-hides the task
    /// once [`HIDE_FLAG_THRESHOLD`] is reached, superseding any other state.
    pub fn flag(&mut self, now: u64) {
        self.flag_count += 1;
        if self.flag_count >= HIDE_FLAG_THRESHOLD {
            self.state = TaskState::Hidden;
            self.updated_at = now;
        }
    }
}

/// In-memory index of tasks by id, for the router that dispatches
/// accepted ingress records to the state machine.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Task>,
}

impl TaskRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly-posted task.
    pub fn post(&mut self, id: String, poster: String, budget: f64, now: u64) {
        self.tasks
            .entry(id.clone())
            .or_insert_with(|| Task::new_open(id, poster, budget, now));
    }

    /// Mutable access to a task by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Read-only access to a task by id.
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// `true` if no tasks are tracked.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
