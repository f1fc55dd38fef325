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

//! Flagging & rate limiting (C11): a sliding-window admission limiter per
//! `(agent, record type)`, violation tracking that auto-flags repeat
//! offenders, and a flag ledger that auto-hides targets once enough
//! reputable flags accumulate.

use crate::core::ingress::RateLimitGate;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

const VIOLATIONS_WINDOW_SECS: u64 = 24 * 3600;
const VIOLATIONS_AUTO_FLAG_THRESHOLD: u32 = 5;
const REPUTABLE_FLAG_MIN_REPUTATION: f64 = 1.5;
const AUTO_HIDE_FLAG_THRESHOLD: u32 = 3;
const FLAGGER_RATE_WINDOW_SECS: u64 = 3600;
const FLAGGER_RATE_WARN_THRESHOLD: u32 = 10;
const FLAGGER_BLOCK_WARNINGS: u32 = 3;

/// Per-record-type sliding window limits: (window seconds, max admissions
/// per hour). All windows are 3600 s; limits are per the default table.
fn limit_for(record_type: &str) -> (u64, u32) {
    match record_type {
        "task.posted" => (3600, 10),
        "task.bid" => (3600, 50),
        "agent.online" | "agent.offline" => (3600, 1),
        "reputation.attestation" => (3600, 20),
        "task.flag" => (3600, 10),
        "task.completed" | "task.failed" => (3600, 20),
        "content.published" => (3600, 20),
        "spawn.new" | "spawn.dead" => (3600, 20),
        _ => (3600, 20),
    }
}

struct Window {
    timestamps: VecDeque<u64>,
}

impl Window {
    fn new() -> Self {
        Self { timestamps: VecDeque::new() }
    }

    fn prune(&mut self, now: u64, window_secs: u64) {
        while let Some(&front) = self.timestamps.front() {
            if now.saturating_sub(front) > window_secs {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// A sliding-window rate limiter keyed by `(agent, record type)`, plus a
/// per-agent violation counter that auto-flags after repeated rejection.
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, String), Window>>,
    violations: Mutex<HashMap<String, VecDeque<u64>>>,
    auto_flagged: Mutex<HashSet<String>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Construct an empty limiter.
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            violations: Mutex::new(HashMap::new()),
            auto_flagged: Mutex::new(HashSet::new()),
        }
    }

    fn note_violation(&self, agent: &str, now: u64) {
        let mut violations = self.violations.lock().unwrap();
        let entry = violations.entry(agent.to_string()).or_default();
        entry.push_back(now);
        while let Some(&front) = entry.front() {
            if now.saturating_sub(front) > VIOLATIONS_WINDOW_SECS {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() as u32 >= VIOLATIONS_AUTO_FLAG_THRESHOLD {
            self.auto_flagged.lock().unwrap().insert(agent.to_string());
        }
    }

    /// `true` if `agent` has been auto-flagged for repeated rate-limit
    /// violations within the trailing 24h window.
    pub fn is_auto_flagged(&self, agent: &str) -> bool {
        self.auto_flagged.lock().unwrap().contains(agent)
    }
}

impl RateLimitGate for RateLimiter {
    fn allow(&self, agent: &str, record_type: &str, now: u64) -> bool {
        let (window_secs, max) = limit_for(record_type);
        let mut windows = self.windows.lock().unwrap();
        let w = windows
            .entry((agent.to_string(), record_type.to_string()))
            .or_insert_with(Window::new);
        w.prune(now, window_secs);
        let within = (w.timestamps.len() as u32) < max;
        if !within {
            drop(windows);
            self.note_violation(agent, now);
        }
        within
    }

    fn record(&self, agent: &str, record_type: &str, now: u64) {
        let (window_secs, _max) = limit_for(record_type);
        let mut windows = self.windows.lock().unwrap();
        let w = windows
            .entry((agent.to_string(), record_type.to_string()))
            .or_insert_with(Window::new);
        w.prune(now, window_secs);
        w.timestamps.push_back(now);
    }
}

/// One flag raised against a target agent.
#[derive(Clone, Debug)]
struct Flag {
    flagger: String,
    reason: String,
    reputable: bool,
}

/// Aggregate flag statistics.
#[derive(Clone, Debug, Default)]
pub struct FlagStats {
    /// Total flags recorded across all targets.
    pub total_flags: usize,
    /// Flags submitted by a reputable flagger (reputation >= 1.5).
    pub reputable_flags: usize,
    /// Distinct flaggers observed.
    pub unique_flaggers: usize,
    /// Targets currently auto-hidden (>= 3 reputable flags).
    pub hidden: usize,
    /// Flag counts grouped by reason string.
    pub reasons: HashMap<String, usize>,
}

/// Flag ledger: dedups `(target, flagger)` pairs, and auto-hides a target
/// once it accumulates enough flags from reputable flaggers.
pub struct FlagLedger {
    flags: Mutex<HashMap<String, Vec<Flag>>>,
    flagger_rate: Mutex<HashMap<String, VecDeque<u64>>>,
    flagger_warnings: Mutex<HashMap<String, u32>>,
    flagger_blocked: Mutex<HashSet<String>>,
}

impl Default for FlagLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of submitting a flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagOutcome {
    /// Flag recorded.
    Recorded,
    /// Duplicate `(target, flagger)` pair; ignored.
    Duplicate,
    /// This flagger has been blocked from flagging (abuse escalation).
    FlaggerBlocked,
}

impl FlagLedger {
    /// Construct an empty ledger.
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(HashMap::new()),
            flagger_rate: Mutex::new(HashMap::new()),
            flagger_warnings: Mutex::new(HashMap::new()),
            flagger_blocked: Mutex::new(HashSet::new()),
        }
    }

    /// Submit a flag from `flagger` against `target` at time `now`.
    /// `flagger_reputation` is the flagger's current overall reputation
    /// score (0-5); flags from flaggers at or above
    /// [`REPUTABLE_FLAG_MIN_REPUTATION`] count toward auto-hide. Flaggers
    /// submitting more than [`FLAGGER_RATE_WARN_THRESHOLD`] flags within
    /// a trailing hour accrue a warning; three warnings block them.
    pub fn submit(&self, target: &str, flagger: &str, reason: &str, flagger_reputation: f64, now: u64) -> FlagOutcome {
        if self.flagger_blocked.lock().unwrap().contains(flagger) {
            return FlagOutcome::FlaggerBlocked;
        }

        {
            let flags = self.flags.lock().unwrap();
            if let Some(existing) = flags.get(target) {
                if existing.iter().any(|f| f.flagger == flagger) {
                    return FlagOutcome::Duplicate;
                }
            }
        }

        let reputable = flagger_reputation >= REPUTABLE_FLAG_MIN_REPUTATION;
        let mut flags = self.flags.lock().unwrap();
        flags.entry(target.to_string()).or_default().push(Flag {
            flagger: flagger.to_string(),
            reason: reason.to_string(),
            reputable,
        });
        drop(flags);

        let exceeded_rate = {
            let mut rate = self.flagger_rate.lock().unwrap();
            let entry = rate.entry(flagger.to_string()).or_default();
            entry.push_back(now);
            while let Some(&front) = entry.front() {
                if now.saturating_sub(front) > FLAGGER_RATE_WINDOW_SECS {
                    entry.pop_front();
                } else {
                    break;
                }
            }
            entry.len() as u32 > FLAGGER_RATE_WARN_THRESHOLD
        };
        if exceeded_rate {
            let mut warnings = self.flagger_warnings.lock().unwrap();
            let count = warnings.entry(flagger.to_string()).or_insert(0);
            *count += 1;
            if *count >= FLAGGER_BLOCK_WARNINGS {
                self.flagger_blocked.lock().unwrap().insert(flagger.to_string());
                return FlagOutcome::FlaggerBlocked;
            }
        }

        FlagOutcome::Recorded
    }

    /// Total flag count for `target`, reputable or not.
    pub fn raw_count(&self, target: &str) -> usize {
        self.flags.lock().unwrap().get(target).map(|v| v.len()).unwrap_or(0)
    }

    /// Count of flags against `target` submitted by reputable flaggers.
    pub fn reputable_count(&self, target: &str) -> usize {
        self.flags
            .lock()
            .unwrap()
            .get(target)
            .map(|v| v.iter().filter(|f| f.reputable).count())
            .unwrap_or(0)
    }

    /// `true` once `target` has accumulated at least
    /// [`AUTO_HIDE_FLAG_THRESHOLD`] flags from reputable flaggers.
    pub fn should_auto_hide(&self, target: &str) -> bool {
        self.reputable_count(target) as u32 >= AUTO_HIDE_FLAG_THRESHOLD
    }

    /// Aggregate stats: {totalFlags, reputableFlags, uniqueFlaggers,
    /// hidden, reasons breakdown}.
    pub fn stats(&self) -> FlagStats {
        let flags = self.flags.lock().unwrap();
        let mut unique_flaggers = HashSet::new();
        let mut reasons: HashMap<String, usize> = HashMap::new();
        let mut total_flags = 0usize;
        let mut reputable_flags = 0usize;
        let mut hidden = 0usize;
        for (_target, v) in flags.iter() {
            total_flags += v.len();
            let target_reputable = v.iter().filter(|f| f.reputable).count();
            if target_reputable as u32 >= AUTO_HIDE_FLAG_THRESHOLD {
                hidden += 1;
            }
            for f in v {
                unique_flaggers.insert(f.flagger.clone());
                *reasons.entry(f.reason.clone()).or_insert(0) += 1;
                if f.reputable {
                    reputable_flags += 1;
                }
            }
        }
        FlagStats {
            total_flags,
            reputable_flags,
            unique_flaggers: unique_flaggers.len(),
            hidden,
            reasons,
        }
    }
}
