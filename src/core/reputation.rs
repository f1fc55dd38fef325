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

//! Reputation (C10): an overall 0-5 score derived locally from an agent's
//! attestation history, task completion record, and recency, without any
//! global consensus on the number.

/// Maximum attestations considered when computing a score; bounds both
/// memory and the cost of recomputation.
pub const ATTESTATION_WINDOW: usize = 1000;

/// One attestation about a completed task, rated along three dimensions.
#[derive(Clone, Copy, Debug)]
pub struct Attestation {
    /// Quality rating, 0.0-5.0.
    pub quality: f64,
    /// Speed rating, 0.0-5.0.
    pub speed: f64,
    /// Communication rating, 0.0-5.0.
    pub communication: f64,
    /// Age of the attestation, in days, at scoring time.
    pub age_days: f64,
}

impl Attestation {
    /// Construct an attestation with matching per-dimension data and
    /// associated attester/subject keys for self-attestation filtering.
    pub fn new(quality: f64, speed: f64, communication: f64, age_days: f64) -> Self {
        Self { quality, speed, communication, age_days }
    }
}

/// An attestation record paired with its attester/subject, as read from
/// the persistent log, before self-attestation filtering.
#[derive(Clone, Debug)]
pub struct RawAttestation {
    /// Who issued the attestation.
    pub attester: String,
    /// Who the attestation is about.
    pub subject: String,
    /// The rating payload.
    pub attestation: Attestation,
}

fn recency_weight(age_days: f64) -> f64 {
    if age_days <= 30.0 {
        1.0
    } else if age_days <= 90.0 {
        0.5
    } else {
        0.25
    }
}

/// `min(log10(assigned + 1) / 3, 1.0)`.
pub fn volume_factor(assigned: usize) -> f64 {
    (((assigned as f64) + 1.0).log10() / 3.0).min(1.0)
}

/// `max(1 - days_since_latest / 90, 0)`. `None` (no attestations) scores 0.
pub fn recency_factor(days_since_latest: Option<f64>) -> f64 {
    match days_since_latest {
        Some(days) => (1.0 - days / 90.0).max(0.0),
        None => 0.0,
    }
}

/// Computed reputation breakdown for one agent.
#[derive(Clone, Debug, PartialEq)]
pub struct ReputationScore {
    /// Overall score, 0.0-5.0. `None` if the agent is blacklisted.
    pub overall: Option<f64>,
    /// `completed / assigned`, filtering both record sets by executor.
    pub completion_rate: f64,
    /// Recency-weighted average rating across quality/speed/communication.
    pub avg_rating: f64,
    /// `min(log10(assigned + 1) / 3, 1.0)`.
    pub volume_factor: f64,
    /// `max(1 - days_since_latest_attestation / 90, 0)`.
    pub recency_factor: f64,
    /// Number of attestations the score was computed over (after
    /// self-attestation exclusion and windowing).
    pub sample_size: usize,
}

/// Compute `subject`'s reputation.
///
/// - `attestations`: attestations targeting `subject`, most recent first;
///   windowed to [`ATTESTATION_WINDOW`] and self-attestations excluded
///   before use.
/// - `assigned`/`completed`: task counts filtered by executor == subject,
///   sourced from the persistent log independent of the attestation set.
/// - `blacklisted`: a local override; scores `overall: None` ("disabled").
pub fn score(
    subject: &str,
    attestations: &[RawAttestation],
    assigned: usize,
    completed: usize,
    blacklisted: bool,
) -> ReputationScore {
    let relevant: Vec<&Attestation> = attestations
        .iter()
        .filter(|a| a.subject == subject && a.attester != subject)
        .take(ATTESTATION_WINDOW)
        .map(|a| &a.attestation)
        .collect();

    let completion_rate = if assigned > 0 { completed as f64 / assigned as f64 } else { 0.0 };
    let volume = volume_factor(assigned);
    let days_since_latest = relevant.iter().map(|a| a.age_days).fold(None, |acc, d| match acc {
        None => Some(d),
        Some(min) => Some(if d < min { d } else { min }),
    });
    let recency = recency_factor(days_since_latest);

    if blacklisted {
        return ReputationScore {
            overall: None,
            completion_rate,
            avg_rating: 0.0,
            volume_factor: volume,
            recency_factor: recency,
            sample_size: relevant.len(),
        };
    }

    let avg_rating = if relevant.is_empty() {
        0.0
    } else {
        let dims: [fn(&Attestation) -> f64; 3] = [|a| a.quality, |a| a.speed, |a| a.communication];
        let per_dim_avg: f64 = dims
            .iter()
            .map(|dim| {
                let mut weight_sum = 0.0;
                let mut weighted_total = 0.0;
                for a in &relevant {
                    let w = recency_weight(a.age_days);
                    weight_sum += w;
                    weighted_total += w * dim(a);
                }
                if weight_sum > 0.0 {
                    weighted_total / weight_sum
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / dims.len() as f64;
        per_dim_avg
    };

    let overall = (5.0 * (0.3 * completion_rate + 0.2 * volume + 0.2 * recency) + 0.3 * avg_rating).clamp(0.0, 5.0);

    ReputationScore {
        overall: Some(overall),
        completion_rate,
        avg_rating,
        volume_factor: volume,
        recency_factor: recency,
        sample_size: relevant.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(subject: &str, attester: &str, q: f64, s: f64, c: f64, age_days: f64) -> RawAttestation {
        RawAttestation {
            attester: attester.to_string(),
            subject: subject.to_string(),
            attestation: Attestation::new(q, s, c, age_days),
        }
    }

    #[test]
    fn no_history_scores_zero_but_not_disabled() {
        let s = score("agent1", &[], 0, 0, false);
        assert_eq!(s.overall, Some(0.0));
    }

    #[test]
    fn blacklisted_is_disabled_regardless_of_history() {
        let attestations = vec![raw("agent1", "a2", 5.0, 5.0, 5.0, 1.0)];
        let s = score("agent1", &attestations, 1, 1, true);
        assert_eq!(s.overall, None);
    }

    #[test]
    fn self_attestation_excluded() {
        let attestations = vec![raw("agent1", "agent1", 5.0, 5.0, 5.0, 1.0)];
        let s = score("agent1", &attestations, 1, 1, false);
        assert_eq!(s.sample_size, 0);
    }

    #[test]
    fn recent_ratings_weigh_more_than_old() {
        let attestations = vec![
            raw("a", "b", 5.0, 5.0, 5.0, 1.0),
            raw("a", "c", 0.0, 0.0, 0.0, 200.0),
        ];
        let s = score("a", &attestations, 2, 2, false);
        assert!(s.avg_rating > 2.5);
    }

    #[test]
    fn completion_rate_from_assigned_and_completed_counts() {
        let s = score("a", &[], 4, 3, false);
        assert!((s.completion_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn zero_assigned_has_zero_completion_rate_no_panic() {
        let s = score("a", &[], 0, 0, false);
        assert_eq!(s.completion_rate, 0.0);
    }

    #[test]
    fn window_caps_sample_size() {
        let attestations: Vec<RawAttestation> =
            (0..1500).map(|i| raw("a", &format!("b{i}"), 5.0, 5.0, 5.0, 1.0)).collect();
        let s = score("a", &attestations, 1500, 1500, false);
        assert_eq!(s.sample_size, ATTESTATION_WINDOW);
    }

    #[test]
    fn overall_never_exceeds_five() {
        let attestations: Vec<RawAttestation> =
            (0..50).map(|i| raw("a", &format!("b{i}"), 5.0, 5.0, 5.0, 1.0)).collect();
        let s = score("a", &attestations, 50, 50, false);
        assert!(s.overall.unwrap() <= 5.0);
    }

    #[test]
    fn recency_factor_decays_to_zero_past_90_days() {
        assert_eq!(recency_factor(Some(200.0)), 0.0);
        assert!((recency_factor(Some(0.0)) - 1.0).abs() < 1e-9);
        assert_eq!(recency_factor(None), 0.0);
    }

    #[test]
    fn volume_factor_caps_at_one() {
        assert!((volume_factor(999) - 1.0).abs() < 1e-6);
        assert_eq!(volume_factor(0), 0.0);
    }
}
