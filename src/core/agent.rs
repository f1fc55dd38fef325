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

//! Bidder & executor (C8): the policy an autonomous agent follows to
//! decide whether and how much to bid, the negotiation state machine
//! that reconciles poster counters, and a bounded-concurrency executor
//! that runs assigned work to completion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

/// A task offer a bidder policy is evaluating.
#[derive(Clone, Debug)]
pub struct TaskOffer {
    /// Task id.
    pub task_id: String,
    /// Poster's declared budget ceiling.
    pub budget: f64,
    /// Declared category.
    pub category: String,
    /// Declared required capabilities.
    pub required_capabilities: Vec<String>,
    /// Unix time the task must be completed by.
    pub deadline: u64,
}

/// A bidder's capacity and pricing posture.
#[derive(Clone, Debug)]
pub struct BidderProfile {
    /// Capabilities this agent can perform.
    pub capabilities: Vec<String>,
    /// Minimum acceptable price regardless of budget.
    pub min_price: f64,
    /// How much to shade the bid below budget (0 = bid full budget, 1 =
    /// shade by the maximum 30%).
    pub aggressiveness: f64,
    /// This agent's current reputation score, 0-5.
    pub reputation: f64,
    /// Currently in-flight task count.
    pub active_tasks: u32,
    /// Max concurrent tasks this agent will take.
    pub max_concurrent: u32,
}

/// A proposed bid, or a decision to skip.
#[derive(Clone, Debug, PartialEq)]
pub struct BidProposal {
    /// Proposed price.
    pub price: f64,
    /// Estimated completion duration, in seconds.
    pub estimated_duration_secs: u64,
    /// Confidence in the estimate, 0-1.
    pub confidence: f64,
}

/// Decide whether to bid on `offer` given `profile` at time `now`.
/// Returns `None` to skip: missing capability, budget below minimum, at
/// capacity, or deadline less than 60 seconds out.
pub fn decide_bid(offer: &TaskOffer, profile: &BidderProfile, now: u64) -> Option<BidProposal> {
    if profile.active_tasks >= profile.max_concurrent {
        return None;
    }
    let required = offer.required_capabilities.len();
    let matched = offer.required_capabilities.iter().filter(|c| profile.capabilities.contains(c)).count();
    if matched != required {
        return None;
    }
    if offer.budget < profile.min_price {
        return None;
    }
    if offer.deadline < now + 60 {
        return None;
    }

    let base = offer.budget * (1.0 - 0.3 * profile.aggressiveness);
    let rep_factor = 0.7 + 0.3 * (profile.reputation / 5.0).min(1.0);
    let price = (base * rep_factor).max(profile.min_price);

    let estimated_duration_secs = 300 * required as u64;
    let match_ratio = if required == 0 { 1.0 } else { matched as f64 / required as f64 };
    let confidence = (0.5 + 0.4 * (profile.reputation / 5.0) + 0.1 * match_ratio).min(1.0);

    Some(BidProposal { price, estimated_duration_secs, confidence })
}

/// Negotiation state between a bidder and a poster over one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationState {
    /// No bid sent yet.
    Idle,
    /// Bid sent, awaiting poster response.
    BidSent,
    /// Poster countered; awaiting our response.
    CounterReceived,
    /// We countered; awaiting poster response.
    CounterSent,
    /// Poster accepted.
    Accepted,
    /// Poster rejected.
    Rejected,
    /// Exceeded the round limit without resolution.
    Expired,
}

/// Maximum negotiation rounds before the negotiation expires.
pub const MAX_NEGOTIATION_ROUNDS: u32 = 5;

/// Negotiation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// An action was attempted from a state that doesn't allow it.
    #[error("illegal negotiation action from {0:?}")]
    IllegalAction(NegotiationState),
}

/// One negotiation's running state.
#[derive(Clone, Debug)]
pub struct Negotiation {
    /// Current state.
    pub state: NegotiationState,
    /// Our last offered price.
    pub our_price: f64,
    /// Poster's last countered price, if any.
    pub counter_price: Option<f64>,
    /// Rounds elapsed.
    pub rounds: u32,
}

impl Negotiation {
    /// Start a negotiation by sending an initial bid at `price`.
    pub fn start(price: f64) -> Self {
        Self { state: NegotiationState::BidSent, our_price: price, counter_price: None, rounds: 1 }
    }

    /// The poster countered at `price`.
    pub fn receive_counter(&mut self, price: f64) -> Result<(), NegotiationError> {
        if !matches!(self.state, NegotiationState::BidSent | NegotiationState::CounterSent) {
            return Err(NegotiationError::IllegalAction(self.state));
        }
        self.rounds += 1;
        if self.rounds > MAX_NEGOTIATION_ROUNDS {
            self.state = NegotiationState::Expired;
            return Ok(());
        }
        self.counter_price = Some(price);
        self.state = NegotiationState::CounterReceived;
        Ok(())
    }

    /// Respond to a received counter with our own midpoint counter.
    pub fn counter_with_midpoint(&mut self) -> Result<f64, NegotiationError> {
        if self.state != NegotiationState::CounterReceived {
            return Err(NegotiationError::IllegalAction(self.state));
        }
        let their_price = self.counter_price.ok_or(NegotiationError::IllegalAction(self.state))?;
        let midpoint = (self.our_price + their_price) / 2.0;
        self.our_price = midpoint;
        self.state = NegotiationState::CounterSent;
        Ok(midpoint)
    }

    /// The poster accepted the last offer on the table.
    pub fn accept(&mut self) -> Result<(), NegotiationError> {
        if !matches!(self.state, NegotiationState::BidSent | NegotiationState::CounterSent | NegotiationState::CounterReceived) {
            return Err(NegotiationError::IllegalAction(self.state));
        }
        self.state = NegotiationState::Accepted;
        Ok(())
    }

    /// The poster rejected outright.
    pub fn reject(&mut self) {
        self.state = NegotiationState::Rejected;
    }

    /// Apply the standing counter-offer policy to a just-received counter:
    /// accept if it meets `min_price`, otherwise counter at the midpoint
    /// provided the midpoint still clears `min_price`, otherwise reject.
    pub fn respond_to_counter(&mut self, min_price: f64) -> Result<NegotiationResponse, NegotiationError> {
        if self.state != NegotiationState::CounterReceived {
            return Err(NegotiationError::IllegalAction(self.state));
        }
        let their_price = self.counter_price.ok_or(NegotiationError::IllegalAction(self.state))?;
        if their_price >= min_price {
            self.accept()?;
            return Ok(NegotiationResponse::Accept(their_price));
        }
        let midpoint = (self.our_price + their_price) / 2.0;
        if midpoint >= min_price {
            let price = self.counter_with_midpoint()?;
            Ok(NegotiationResponse::Counter(price))
        } else {
            self.reject();
            Ok(NegotiationResponse::Reject)
        }
    }
}

/// What a bidder decided to do in response to a poster's counter-offer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NegotiationResponse {
    /// Accept the poster's counter at this price.
    Accept(f64),
    /// Counter back at this price.
    Counter(f64),
    /// Walk away; the counter fell below our minimum with no room to meet.
    Reject,
}

/// Per-task executor state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecState {
    /// Waiting for a free execution slot.
    Queued,
    /// Currently executing.
    Running,
    /// Execution finished with a result.
    Completed,
    /// Result is being delivered (signed `task.completed` record in flight).
    Delivering,
    /// Delivery confirmed stored.
    Delivered,
    /// Execution raised an error.
    Failed,
    /// Execution exceeded its timeout.
    TimedOut,
}

/// The outcome of running one task to completion.
#[derive(Clone, Debug)]
pub struct ExecResult {
    /// Final state: `Completed`, `Failed`, or `TimedOut`.
    pub state: ExecState,
    /// `"blake3:" || hex` hash of the produced output, if `Completed`.
    pub result_hash: Option<String>,
}

/// A bounded-concurrency executor for assigned tasks.
pub struct Executor {
    semaphore: Arc<Semaphore>,
    states: Mutex<HashMap<String, ExecState>>,
    running: AtomicUsize,
}

impl Executor {
    /// Construct an executor with `max_concurrent` execution slots.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            states: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
        }
    }

    /// Number of tasks currently holding an execution slot.
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    /// Current state of `task_id`, if tracked.
    pub async fn state_of(&self, task_id: &str) -> Option<ExecState> {
        self.states.lock().await.get(task_id).copied()
    }

    /// Execute `work` for `task_id`, enforcing `timeout` and bounding
    /// concurrency at the executor's configured limit. `work` must
    /// produce the raw result bytes to be hashed.
    pub async fn execute<F, Fut>(&self, task_id: &str, timeout: Duration, work: F) -> ExecResult
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>, String>>,
    {
        self.set_state(task_id, ExecState::Queued).await;
        let Ok(_permit) = self.semaphore.clone().acquire_owned().await else {
            self.set_state(task_id, ExecState::Failed).await;
            return ExecResult { state: ExecState::Failed, result_hash: None };
        };

        self.running.fetch_add(1, Ordering::Relaxed);
        self.set_state(task_id, ExecState::Running).await;

        let outcome = tokio::time::timeout(timeout, work()).await;
        self.running.fetch_sub(1, Ordering::Relaxed);

        let result = match outcome {
            Ok(Ok(bytes)) => {
                let digest = blake3::hash(&bytes);
                let hash = format!("blake3:{}", hex::encode(&digest.as_bytes()[..16]));
                self.set_state(task_id, ExecState::Completed).await;
                info!(task_id, "task execution completed");
                ExecResult { state: ExecState::Completed, result_hash: Some(hash) }
            }
            Ok(Err(e)) => {
                warn!(task_id, error = %e, "task execution failed");
                self.set_state(task_id, ExecState::Failed).await;
                ExecResult { state: ExecState::Failed, result_hash: None }
            }
            Err(_) => {
                warn!(task_id, "task execution timed out");
                self.set_state(task_id, ExecState::TimedOut).await;
                ExecResult { state: ExecState::TimedOut, result_hash: None }
            }
        };
        result
    }

    async fn set_state(&self, task_id: &str, state: ExecState) {
        self.states.lock().await.insert(task_id.to_string(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> BidderProfile {
        BidderProfile {
            capabilities: vec!["browsing".into(), "summarization".into()],
            min_price: 0.01,
            aggressiveness: 0.0,
            reputation: 5.0,
            active_tasks: 0,
            max_concurrent: 3,
        }
    }

    fn offer_with(budget: f64, required_capabilities: Vec<String>) -> TaskOffer {
        TaskOffer {
            task_id: "t1".into(),
            budget,
            category: "research".into(),
            required_capabilities,
            deadline: 10_000,
        }
    }

    #[test]
    fn skips_when_missing_capability() {
        let offer = offer_with(1.0, vec!["video_editing".into()]);
        assert!(decide_bid(&offer, &profile(), 0).is_none());
    }

    #[test]
    fn skips_when_at_capacity() {
        let mut p = profile();
        p.active_tasks = 3;
        let offer = offer_with(1.0, vec![]);
        assert!(decide_bid(&offer, &p, 0).is_none());
    }

    #[test]
    fn skips_when_deadline_too_close() {
        let offer = TaskOffer { deadline: 40, ..offer_with(1.0, vec![]) };
        assert!(decide_bid(&offer, &profile(), 0).is_none());
    }

    #[test]
    fn bids_shaded_by_aggressiveness_and_reputation() {
        let offer = offer_with(1.0, vec!["browsing".into()]);
        let bid = decide_bid(&offer, &profile(), 0).unwrap();
        // aggressiveness=0 -> base=budget; reputation=5 -> rep_factor=1.0
        assert!((bid.price - 1.0).abs() < 1e-9);
    }

    #[test]
    fn aggressiveness_shades_bid_below_budget() {
        let mut p = profile();
        p.aggressiveness = 1.0;
        p.reputation = 0.0;
        let offer = offer_with(1.0, vec!["browsing".into()]);
        let bid = decide_bid(&offer, &p, 0).unwrap();
        // base = 1.0 * (1 - 0.3) = 0.7; rep_factor = 0.7 -> 0.49
        assert!((bid.price - 0.49).abs() < 1e-9);
    }

    #[test]
    fn price_never_drops_below_minimum() {
        let mut p = profile();
        p.aggressiveness = 1.0;
        p.reputation = 0.0;
        p.min_price = 0.9;
        let offer = offer_with(1.0, vec!["browsing".into()]);
        let bid = decide_bid(&offer, &p, 0).unwrap();
        assert!((bid.price - 0.9).abs() < 1e-9);
    }

    #[test]
    fn negotiation_midpoint_converges() {
        let mut n = Negotiation::start(10.0);
        n.receive_counter(6.0).unwrap();
        let countered = n.counter_with_midpoint().unwrap();
        assert!((countered - 8.0).abs() < 1e-9);
        assert_eq!(n.state, NegotiationState::CounterSent);
    }

    #[test]
    fn respond_to_counter_accepts_when_at_or_above_minimum() {
        let mut n = Negotiation::start(10.0);
        n.receive_counter(9.0).unwrap();
        assert_eq!(n.respond_to_counter(8.0).unwrap(), NegotiationResponse::Accept(9.0));
        assert_eq!(n.state, NegotiationState::Accepted);
    }

    #[test]
    fn respond_to_counter_meets_in_the_middle_when_midpoint_clears_minimum() {
        let mut n = Negotiation::start(10.0);
        n.receive_counter(6.0).unwrap();
        assert_eq!(n.respond_to_counter(7.0).unwrap(), NegotiationResponse::Counter(8.0));
        assert_eq!(n.state, NegotiationState::CounterSent);
    }

    #[test]
    fn respond_to_counter_rejects_when_midpoint_still_below_minimum() {
        let mut n = Negotiation::start(10.0);
        n.receive_counter(2.0).unwrap();
        assert_eq!(n.respond_to_counter(9.0).unwrap(), NegotiationResponse::Reject);
        assert_eq!(n.state, NegotiationState::Rejected);
    }

    #[test]
    fn negotiation_expires_after_max_rounds() {
        let mut n = Negotiation::start(10.0);
        for i in 0..MAX_NEGOTIATION_ROUNDS {
            let _ = i;
            n.receive_counter(9.0).unwrap();
            if n.state == NegotiationState::Expired {
                break;
            }
            n.counter_with_midpoint().unwrap();
        }
        assert_eq!(n.state, NegotiationState::Expired);
    }

    #[tokio::test]
    async fn executor_runs_to_completion_and_hashes_result() {
        let exec = Executor::new(2);
        let result = exec
            .execute("t1", Duration::from_millis(500), || async { Ok(b"output-bytes".to_vec()) })
            .await;
        assert_eq!(result.state, ExecState::Completed);
        assert!(result.result_hash.unwrap().starts_with("blake3:"));
    }

    #[tokio::test]
    async fn executor_reports_timeout() {
        let exec = Executor::new(1);
        let result = exec
            .execute("t1", Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Vec::new())
            })
            .await;
        assert_eq!(result.state, ExecState::TimedOut);
    }

    #[tokio::test]
    async fn executor_reports_failure() {
        let exec = Executor::new(1);
        let result = exec
            .execute("t1", Duration::from_millis(500), || async { Err("boom".to_string()) })
            .await;
        assert_eq!(result.state, ExecState::Failed);
    }
}
