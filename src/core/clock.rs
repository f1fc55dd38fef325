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

//! An injectable clock so time-dependent logic (escrow locks, rate-limit
//! windows, suspension expiry, seen-id cache eviction) is deterministically
//! testable without sleeping real wall-clock time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A source of the current Unix time, in seconds.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_unix(&self) -> u64;
}

/// The real wall clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A manually-advanced clock for deterministic tests.
#[derive(Clone)]
pub struct TestClock {
    now: Arc<AtomicU64>,
}

impl TestClock {
    /// Start the clock at `start`.
    pub fn new(start: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start)) }
    }

    /// Advance the clock by `secs` seconds and return the new value.
    pub fn advance(&self, secs: u64) -> u64 {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }

    /// Set the clock to an absolute value.
    pub fn set(&self, value: u64) {
        self.now.store(value, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_unix(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A shared, cloneable handle to any [`Clock`] implementation.
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_plausible() {
        let now = SystemClock.now_unix();
        assert!(now > 1_700_000_000);
    }

    #[test]
    fn test_clock_advances_deterministically() {
        let c = TestClock::new(1000);
        assert_eq!(c.now_unix(), 1000);
        assert_eq!(c.advance(50), 1050);
        assert_eq!(c.now_unix(), 1050);
        c.set(2000);
        assert_eq!(c.now_unix(), 2000);
    }
}
