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

//! Safety filter (C5): a hardcoded, non-bypassable P1-P7 pattern gate on
//! task admission. No configuration switch disables this filter; the
//! pattern families below are compiled into the binary.

use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

const MIN_DESCRIPTION_LEN: usize = 10;
const MAX_DESCRIPTION_LEN: usize = 10_000;

/// Severity of a pattern family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// High severity.
    High,
    /// Critical severity.
    Critical,
}

/// A single matched pattern family.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Family code, e.g. "P1".
    pub family: &'static str,
    /// Human-readable family name.
    pub name: &'static str,
    /// Severity.
    pub severity: Severity,
    /// Whether any keyword fired.
    pub keyword_hit: bool,
    /// Whether any regex fired.
    pub regex_hit: bool,
}

/// Result of running the safety filter over a task admission request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafetyResult {
    /// Overall verdict.
    pub safe: bool,
    /// Human-readable violation descriptions (length/category failures and
    /// pattern family names).
    pub violations: Vec<String>,
    /// Highest confidence among all violations, or `0.0` if none.
    pub confidence: f64,
    /// Every pattern family that matched.
    pub pattern_matches: Vec<PatternMatch>,
    /// The category normalized via the alias table, if recognized.
    pub normalized_category: Option<String>,
}

struct PatternFamily {
    code: &'static str,
    name: &'static str,
    severity: Severity,
    keywords: &'static [&'static str],
    regexes: Lazy<RegexSet>,
}

macro_rules! family {
    ($code:literal, $name:literal, $severity:expr, $keywords:expr, $regexes:expr) => {
        PatternFamily {
            code: $code,
            name: $name,
            severity: $severity,
            keywords: $keywords,
            regexes: Lazy::new(|| RegexSet::new($regexes).expect("hardcoded regex set must compile")),
        }
    };
}

static P1_INDIVIDUAL_TARGETING: PatternFamily = family!(
    "P1",
    "individual_targeting",
    Severity::Critical,
    &[
        "dox", "doxx", "home address", "where they live", "stalk", "track this person",
        "find her address", "find his address", "their phone number", "personal address"
    ],
    &[
        r"(?i)find\s+(his|her|their)\s+(home|real)\s+address",
        r"(?i)locate\s+(this|that)\s+person",
        r"(?i)reveal\s+(his|her|their)\s+identity",
    ]
);

static P2_SYSTEM_TARGETING: PatternFamily = family!(
    "P2",
    "system_targeting",
    Severity::Critical,
    &[
        "ddos", "denial of service", "exploit this server", "take down the site",
        "brute force", "penetrate the network", "unauthorized access"
    ],
    &[
        r"(?i)exploit\s+(cve|vulnerability)\s+\S+\s+against",
        r"(?i)gain\s+(unauthorized|root)\s+access",
        r"(?i)take\s+down\s+(the\s+)?(server|site|network)",
    ]
);

static P3_DECEPTIVE_CONTENT: PatternFamily = family!(
    "P3",
    "deceptive_content",
    Severity::High,
    &[
        "deepfake", "fake news article", "impersonate", "pretend to be someone",
        "fabricate a quote", "misleading headline"
    ],
    &[
        r"(?i)impersonat(e|ing)\s+(a\s+)?(real|specific)\s+person",
        r"(?i)write\s+fake\s+news",
    ]
);

static P4_BULK_AUTOMATED_ACTIONS: PatternFamily = family!(
    "P4",
    "bulk_automated_actions",
    Severity::High,
    &[
        "mass follow", "bulk dm", "spam accounts", "create thousands of accounts",
        "automate fake reviews", "astroturf"
    ],
    &[
        r"(?i)create\s+\d{3,}\s+(fake\s+)?accounts",
        r"(?i)mass\s+(message|dm|follow|like)\s+campaign",
    ]
);

static P5_CREDENTIAL_HARVESTING: PatternFamily = family!(
    "P5",
    "credential_harvesting",
    Severity::Critical,
    &[
        "phishing page", "harvest passwords", "steal credentials", "fake login page",
        "capture 2fa codes", "credential stuffing"
    ],
    &[
        r"(?i)(phish|fake)\s+login\s+(page|form)",
        r"(?i)harvest\s+(user\s+)?(passwords|credentials|cookies)",
    ]
);

static P6_ILLEGAL_CONTENT: PatternFamily = family!(
    "P6",
    "illegal_content",
    Severity::Critical,
    &[
        "child exploitation", "csam", "illegal drug sale", "trafficking",
        "how to synthesize", "weapon schematics for"
    ],
    &[
        r"(?i)instructions?\s+to\s+(synthesize|manufacture)\s+(a\s+)?(drug|explosive|weapon)",
    ]
);

static P7_SURVEILLANCE: PatternFamily = family!(
    "P7",
    "surveillance",
    Severity::High,
    &[
        "covert surveillance", "monitor their messages", "spyware", "secretly record",
        "track their location without consent", "intercept their communications"
    ],
    &[
        r"(?i)(secretly|covertly)\s+(monitor|record|track)\s+(him|her|them)",
        r"(?i)install\s+spyware\s+on",
    ]
);

fn families() -> [&'static PatternFamily; 7] {
    [
        &P1_INDIVIDUAL_TARGETING,
        &P2_SYSTEM_TARGETING,
        &P3_DECEPTIVE_CONTENT,
        &P4_BULK_AUTOMATED_ACTIONS,
        &P5_CREDENTIAL_HARVESTING,
        &P6_ILLEGAL_CONTENT,
        &P7_SURVEILLANCE,
    ]
}

fn category_aliases() -> &'static [(&'static str, &'static str)] {
    &[
        ("research", "research"),
        ("monitoring", "monitoring"),
        ("watch", "monitoring"),
        ("content", "content"),
        ("writing", "content"),
        ("code", "code"),
        ("coding", "code"),
        ("development", "code"),
        ("data", "data"),
        ("dataset", "data"),
        ("automation", "automation"),
        ("bot", "automation"),
        ("verification", "verification"),
        ("audit", "verification"),
        ("browsing", "research"),
    ]
}

fn normalize_category(category: &str) -> Option<String> {
    let lower = category.trim().to_lowercase();
    category_aliases()
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canon)| canon.to_string())
}

fn family_hits(family: &PatternFamily, haystacks: &[&str]) -> (bool, bool) {
    let mut keyword_hit = false;
    let mut regex_hit = false;
    for text in haystacks {
        let lower = text.to_lowercase();
        if !keyword_hit && family.keywords.iter().any(|kw| lower.contains(kw)) {
            keyword_hit = true;
        }
        if !regex_hit && family.regexes.is_match(text) {
            regex_hit = true;
        }
        if keyword_hit && regex_hit {
            break;
        }
    }
    (keyword_hit, regex_hit)
}

fn confidence_for(keyword_hit: bool, regex_hit: bool, severity: Severity) -> f64 {
    let mut conf = match (keyword_hit, regex_hit) {
        (true, true) => 0.95,
        (false, true) => 0.85,
        (true, false) => 0.7,
        (false, false) => 0.0,
    };
    if severity == Severity::Critical && conf > 0.0 {
        conf += 0.05;
    }
    conf.min(1.0)
}

/// Task admission request evaluated by the filter.
pub struct AdmissionRequest<'a> {
    /// Free-text task description.
    pub description: &'a str,
    /// Declared category (pre-normalization).
    pub category: &'a str,
    /// Declared requirements list.
    pub requirements: &'a [String],
}

/// Run the P1-P7 gate plus length/category checks over `req`. Always
/// returns a result; never panics on malformed/hostile input.
pub fn evaluate(req: &AdmissionRequest<'_>) -> SafetyResult {
    let mut violations = Vec::new();
    let mut pattern_matches = Vec::new();
    let mut max_confidence: f64 = 0.0;

    let len = req.description.chars().count();
    if len < MIN_DESCRIPTION_LEN || len > MAX_DESCRIPTION_LEN {
        violations.push(format!(
            "description length {} outside [{}, {}]",
            len, MIN_DESCRIPTION_LEN, MAX_DESCRIPTION_LEN
        ));
    }

    let normalized_category = normalize_category(req.category);
    if normalized_category.is_none() {
        violations.push(format!("unrecognized category '{}'", req.category));
    }

    let requirements_joined = req.requirements.join(" ");
    let haystacks = [req.description, requirements_joined.as_str()];

    for family in families() {
        let (keyword_hit, regex_hit) = family_hits(family, &haystacks);
        if keyword_hit || regex_hit {
            let confidence = confidence_for(keyword_hit, regex_hit, family.severity);
            max_confidence = max_confidence.max(confidence);
            violations.push(format!("{} ({})", family.code, family.name));
            pattern_matches.push(PatternMatch {
                family: family.code,
                name: family.name,
                severity: family.severity,
                keyword_hit,
                regex_hit,
            });
        }
    }

    SafetyResult {
        safe: violations.is_empty(),
        violations,
        confidence: max_confidence,
        pattern_matches,
        normalized_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req<'a>(description: &'a str, category: &'a str, requirements: &'a [String]) -> AdmissionRequest<'a> {
        AdmissionRequest { description, category, requirements }
    }

    #[test]
    fn clean_research_task_is_safe() {
        let reqs = vec!["browsing".to_string(), "inference".to_string()];
        let r = evaluate(&req("Summarize the top 10 posts on Hacker News today", "research", &reqs));
        assert!(r.safe);
        assert!(r.violations.is_empty());
    }

    #[test]
    fn p1_keyword_is_unsafe_with_high_confidence() {
        let reqs = vec![];
        let r = evaluate(&req("help me dox someone's home address", "research", &reqs));
        assert!(!r.safe);
        assert!(r.confidence >= 0.7);
        assert!(r.pattern_matches.iter().any(|m| m.family == "P1"));
    }

    #[test]
    fn too_short_description_is_unsafe() {
        let r = evaluate(&req("short", "research", &[]));
        assert!(!r.safe);
    }

    #[test]
    fn unknown_category_is_unsafe() {
        let r = evaluate(&req("A perfectly normal and long enough description here", "nonsense", &[]));
        assert!(!r.safe);
    }

    #[test]
    fn requirements_are_scanned_too() {
        let reqs = vec!["set up a phishing page to harvest passwords".to_string()];
        let r = evaluate(&req("Build a landing page for our newsletter signup flow", "code", &reqs));
        assert!(!r.safe);
        assert!(r.pattern_matches.iter().any(|m| m.family == "P5"));
    }

    #[test]
    fn keyword_and_regex_both_hit_raises_confidence_to_full() {
        let r = evaluate(&req(
            "please secretly monitor them and install spyware on her phone covertly",
            "monitoring",
            &[],
        ));
        assert!(!r.safe);
        let p7 = r.pattern_matches.iter().find(|m| m.family == "P7").unwrap();
        assert!(p7.keyword_hit && p7.regex_hit);
        assert!((r.confidence - 1.0).abs() < f64::EPSILON || r.confidence >= 0.95);
    }
}
