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

//! Verifier (C9): tier-dependent confirmation that a delivered result is
//! acceptable before an escrow becomes claimable.

use crate::core::escrow::TrustTier;
use std::collections::HashMap;
use thiserror::Error;

/// Verification errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// Tier3 quorum did not reach majority before the voting window closed.
    #[error("quorum not reached")]
    QuorumNotReached,
    /// A verifier voted more than once.
    #[error("duplicate vote")]
    DuplicateVote,
}

/// A single verifier's vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vote {
    /// The result is acceptable.
    Pass,
    /// The result is not acceptable.
    Fail,
}

/// Outcome of a verification attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Enough confirming votes arrived; the task may proceed to settlement.
    Passed,
    /// Verification rejected the result.
    Failed,
    /// Still waiting on more votes (Tier3 only, before the window closes).
    Pending,
}

/// Tier1: auto-pass, no verification step. There is nothing to vote on.
pub fn tier1_verdict() -> Verdict {
    Verdict::Passed
}

/// Tier2: a single self-verification record from the poster decides it.
pub fn tier2_verdict(poster_confirms: bool) -> Verdict {
    if poster_confirms {
        Verdict::Passed
    } else {
        Verdict::Failed
    }
}

/// Tier3: a three-member verifier panel votes; majority (>=2 of 3) wins.
/// Tracks votes by verifier id to reject duplicates.
#[derive(Default)]
pub struct Tier3Quorum {
    votes: HashMap<String, Vote>,
    deadline: Option<u64>,
}

impl Tier3Quorum {
    /// A fresh quorum whose voting window closes at `deadline`.
    pub fn new(deadline: u64) -> Self {
        Self { votes: HashMap::new(), deadline: Some(deadline) }
    }

    /// Record `verifier`'s vote. Rejects a second vote from the same
    /// verifier.
    pub fn cast(&mut self, verifier: &str, vote: Vote) -> Result<(), VerifyError> {
        if self.votes.contains_key(verifier) {
            return Err(VerifyError::DuplicateVote);
        }
        self.votes.insert(verifier.to_string(), vote);
        Ok(())
    }

    /// Resolve the quorum's verdict as of `now`. Majority (2 of 3) of
    /// votes decides `Passed`/`Failed` as soon as it's mathematically
    /// settled; otherwise `Pending` until `now >= deadline`, at which
    /// point an unresolved quorum becomes [`VerifyError::QuorumNotReached`].
    pub fn resolve(&self, now: u64) -> Result<Verdict, VerifyError> {
        let passes = self.votes.values().filter(|v| **v == Vote::Pass).count();
        let fails = self.votes.values().filter(|v| **v == Vote::Fail).count();

        if passes >= 2 {
            return Ok(Verdict::Passed);
        }
        if fails >= 2 {
            return Ok(Verdict::Failed);
        }

        let deadline_passed = self.deadline.map(|d| now >= d).unwrap_or(false);
        if deadline_passed {
            Err(VerifyError::QuorumNotReached)
        } else {
            Ok(Verdict::Pending)
        }
    }

    /// Mean of the votes cast so far, scoring `Pass` as 1.0 and `Fail` as
    /// 0.0. `None` if no votes have been cast.
    pub fn mean_score(&self) -> Option<f64> {
        if self.votes.is_empty() {
            return None;
        }
        let total: f64 = self.votes.values().map(|v| if *v == Vote::Pass { 1.0 } else { 0.0 }).sum();
        Some(total / self.votes.len() as f64)
    }
}

/// Resolve the appropriate verdict for `tier`.
pub fn resolve_for_tier(tier: TrustTier, quorum: Option<&Tier3Quorum>, poster_confirms: bool, now: u64) -> Result<Verdict, VerifyError> {
    match tier {
        TrustTier::Tier1 => Ok(tier1_verdict()),
        TrustTier::Tier2 => Ok(tier2_verdict(poster_confirms)),
        TrustTier::Tier3 => quorum.map(|q| q.resolve(now)).unwrap_or(Ok(Verdict::Pending)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier1_always_passes() {
        assert_eq!(tier1_verdict(), Verdict::Passed);
    }

    #[test]
    fn tier2_follows_poster_confirmation() {
        assert_eq!(tier2_verdict(true), Verdict::Passed);
        assert_eq!(tier2_verdict(false), Verdict::Failed);
    }

    #[test]
    fn tier3_majority_pass_resolves_before_deadline() {
        let mut q = Tier3Quorum::new(1000);
        q.cast("v1", Vote::Pass).unwrap();
        q.cast("v2", Vote::Pass).unwrap();
        assert_eq!(q.resolve(500).unwrap(), Verdict::Passed);
    }

    #[test]
    fn tier3_majority_fail_resolves_before_deadline() {
        let mut q = Tier3Quorum::new(1000);
        q.cast("v1", Vote::Fail).unwrap();
        q.cast("v2", Vote::Fail).unwrap();
        q.cast("v3", Vote::Pass).unwrap();
        assert_eq!(q.resolve(500).unwrap(), Verdict::Failed);
    }

    #[test]
    fn tier3_pending_before_deadline_without_majority() {
        let mut q = Tier3Quorum::new(1000);
        q.cast("v1", Vote::Pass).unwrap();
        assert_eq!(q.resolve(500).unwrap(), Verdict::Pending);
    }

    #[test]
    fn tier3_times_out_without_majority() {
        let mut q = Tier3Quorum::new(1000);
        q.cast("v1", Vote::Pass).unwrap();
        assert_eq!(q.resolve(1000).unwrap_err(), VerifyError::QuorumNotReached);
    }

    #[test]
    fn mean_score_reflects_vote_split() {
        let mut q = Tier3Quorum::new(1000);
        assert_eq!(q.mean_score(), None);
        q.cast("v1", Vote::Pass).unwrap();
        q.cast("v2", Vote::Fail).unwrap();
        assert_eq!(q.mean_score(), Some(0.5));
        q.cast("v3", Vote::Pass).unwrap();
        let score = q.mean_score().unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn duplicate_vote_rejected() {
        let mut q = Tier3Quorum::new(1000);
        q.cast("v1", Vote::Pass).unwrap();
        assert_eq!(q.cast("v1", Vote::Fail).unwrap_err(), VerifyError::DuplicateVote);
    }
}
