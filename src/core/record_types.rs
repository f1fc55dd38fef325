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

//! The closed set of activity record kinds, and the tagged-union payload
//! shape that the "any-shaped mapping" `data` field becomes in Rust.
//!
//! Every record kind a wire message can declare is represented here; a
//! record carrying an unrecognized `type` string still round-trips via
//! [`RecordType::Opaque`] so `id` derivation stays forward-compatible with
//! future record kinds this build does not understand.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of record kinds defined by the protocol, plus an
/// opaque escape hatch for unrecognized future kinds.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    /// `agent.online` (public)
    AgentOnline,
    /// `agent.offline` (public)
    AgentOffline,
    /// `task.posted` (public)
    TaskPosted,
    /// `task.assigned` (public)
    TaskAssigned,
    /// `task.completed` (public)
    TaskCompleted,
    /// `task.verified` (public)
    TaskVerified,
    /// `task.settled` (public)
    TaskSettled,
    /// `task.failed` (public)
    TaskFailed,
    /// `reputation.attestation` (public)
    ReputationAttestation,
    /// `spawn.new` (public)
    SpawnNew,
    /// `spawn.dead` (public)
    SpawnDead,
    /// `content.published` (public)
    ContentPublished,
    /// `task.flag` (public)
    TaskFlag,
    /// `governance.warn` (public)
    GovernanceWarn,
    /// `governance.suspend` (public)
    GovernanceSuspend,
    /// `governance.kill` (public)
    GovernanceKill,
    /// `task.bid` (private, direct stream only)
    TaskBid,
    /// `task.counter` (private)
    TaskCounter,
    /// `task.accept` (private)
    TaskAccept,
    /// `task.deliver` (private)
    TaskDeliver,
    /// `escrow.coordinate` (private)
    EscrowCoordinate,
    /// Any record kind not in the closed set above. Preserves the raw
    /// wire string so canonicalization and `id` derivation remain
    /// well-defined for kinds this build predates.
    Opaque(String),
}

impl RecordType {
    /// The exact wire string for this kind, as it appears in `record.type`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AgentOnline => "agent.online",
            Self::AgentOffline => "agent.offline",
            Self::TaskPosted => "task.posted",
            Self::TaskAssigned => "task.assigned",
            Self::TaskCompleted => "task.completed",
            Self::TaskVerified => "task.verified",
            Self::TaskSettled => "task.settled",
            Self::TaskFailed => "task.failed",
            Self::ReputationAttestation => "reputation.attestation",
            Self::SpawnNew => "spawn.new",
            Self::SpawnDead => "spawn.dead",
            Self::ContentPublished => "content.published",
            Self::TaskFlag => "task.flag",
            Self::GovernanceWarn => "governance.warn",
            Self::GovernanceSuspend => "governance.suspend",
            Self::GovernanceKill => "governance.kill",
            Self::TaskBid => "task.bid",
            Self::TaskCounter => "task.counter",
            Self::TaskAccept => "task.accept",
            Self::TaskDeliver => "task.deliver",
            Self::EscrowCoordinate => "escrow.coordinate",
            Self::Opaque(s) => s.as_str(),
        }
    }

    /// Parse a wire string into a `RecordType`, falling back to `Opaque`
    /// for anything outside the closed set.
    pub fn parse(s: &str) -> Self {
        match s {
            "agent.online" => Self::AgentOnline,
            "agent.offline" => Self::AgentOffline,
            "task.posted" => Self::TaskPosted,
            "task.assigned" => Self::TaskAssigned,
            "task.completed" => Self::TaskCompleted,
            "task.verified" => Self::TaskVerified,
            "task.settled" => Self::TaskSettled,
            "task.failed" => Self::TaskFailed,
            "reputation.attestation" => Self::ReputationAttestation,
            "spawn.new" => Self::SpawnNew,
            "spawn.dead" => Self::SpawnDead,
            "content.published" => Self::ContentPublished,
            "task.flag" => Self::TaskFlag,
            "governance.warn" => Self::GovernanceWarn,
            "governance.suspend" => Self::GovernanceSuspend,
            "governance.kill" => Self::GovernanceKill,
            "task.bid" => Self::TaskBid,
            "task.counter" => Self::TaskCounter,
            "task.accept" => Self::TaskAccept,
            "task.deliver" => Self::TaskDeliver,
            "escrow.coordinate" => Self::EscrowCoordinate,
            other => Self::Opaque(other.to_string()),
        }
    }

    /// `true` if this kind is broadcast on the gossip topic; `false` if
    /// it only ever travels over a direct peer stream. Unrecognized
    /// (`Opaque`) kinds are treated as private: a node must not
    /// broadcast what it does not understand.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Self::AgentOnline
                | Self::AgentOffline
                | Self::TaskPosted
                | Self::TaskAssigned
                | Self::TaskCompleted
                | Self::TaskVerified
                | Self::TaskSettled
                | Self::TaskFailed
                | Self::ReputationAttestation
                | Self::SpawnNew
                | Self::SpawnDead
                | Self::ContentPublished
                | Self::TaskFlag
                | Self::GovernanceWarn
                | Self::GovernanceSuspend
                | Self::GovernanceKill
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RecordType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecordType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(RecordType::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_closed_set() {
        for s in [
            "agent.online",
            "task.posted",
            "task.bid",
            "governance.kill",
            "escrow.coordinate",
        ] {
            let t = RecordType::parse(s);
            assert_eq!(t.as_str(), s);
        }
    }

    #[test]
    fn unknown_type_is_opaque_and_private() {
        let t = RecordType::parse("future.thing");
        assert!(matches!(t, RecordType::Opaque(_)));
        assert!(!t.is_public());
    }

    #[test]
    fn public_private_split_matches_spec() {
        assert!(RecordType::TaskPosted.is_public());
        assert!(!RecordType::TaskBid.is_public());
        assert!(!RecordType::EscrowCoordinate.is_public());
    }
}
