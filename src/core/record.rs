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
#![deny(missing_docs)]

//! Record model (C2): the canonical, content-addressed, signed activity
//! record. `id` is a pure function of `(v, agent, type, data, ts, refs)`;
//! `sig` is an Ed25519 signature over the UTF-8 bytes of `id`, not over
//! the canonical content directly.

use crate::core::identity::{self, Keypair};
use crate::core::record_types::RecordType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum allowed clock drift between a record's `ts` and local time, in
/// seconds, both at creation review and at ingest.
pub const MAX_CLOCK_DRIFT_SECS: i64 = 3600;

/// Record model errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// `data` must be a JSON object (a key-value mapping).
    #[error("data must be an object")]
    DataNotObject,
    /// Canonical encoding failed.
    #[error("canonicalization failed")]
    Canonicalize,
    /// `agent` is not valid hex, or not 32 bytes once decoded.
    #[error("invalid agent key encoding")]
    InvalidAgent,
    /// Signing failed.
    #[error("signing failed")]
    Signing,
}

/// The canonical, content-addressed activity record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Protocol version.
    pub v: u32,
    /// Hex-encoded Ed25519 public key of the signer.
    pub agent: String,
    /// Record kind.
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Type-specific payload.
    pub data: serde_json::Value,
    /// Signer's wall-clock time, in seconds since the Unix epoch.
    pub ts: u64,
    /// Ordered ids of other records this record causally references.
    pub refs: Vec<String>,
    /// Content address: `"blake3:" || hex(BLAKE3(canonical(..))[0..16])`.
    pub id: String,
    /// Hex-encoded Ed25519 signature over the UTF-8 bytes of `id`.
    pub sig: String,
}

/// Build the canonical byte string for `(v, agent, type, data, ts, refs)`.
///
/// Canonicalization relies on `serde_json`'s default (non-`preserve_order`)
/// map representation, which is backed by a `BTreeMap` and so always
/// serializes object keys in lexicographic order, at every nesting level,
/// with no inserted whitespace. Array order is preserved as given.
pub fn canonical_bytes(
    agent: &str,
    record_type: &RecordType,
    data: &serde_json::Value,
    ts: u64,
    refs: &[String],
) -> Result<Vec<u8>, RecordError> {
    if !data.is_object() {
        return Err(RecordError::DataNotObject);
    }
    let envelope = serde_json::json!({
        "v": PROTOCOL_VERSION,
        "agent": agent,
        "type": record_type.as_str(),
        "data": data,
        "ts": ts,
        "refs": refs,
    });
    serde_json::to_vec(&envelope).map_err(|_| RecordError::Canonicalize)
}

/// Derive the content-addressed id for a set of canonical fields.
pub fn derive_id(
    agent: &str,
    record_type: &RecordType,
    data: &serde_json::Value,
    ts: u64,
    refs: &[String],
) -> Result<String, RecordError> {
    let bytes = canonical_bytes(agent, record_type, data, ts, refs)?;
    let digest = blake3::hash(&bytes);
    let truncated = &digest.as_bytes()[..16];
    Ok(format!("blake3:{}", hex::encode(truncated)))
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Create and sign a new record. `ts` is set to the current second.
pub fn create(
    agent_keypair: &Keypair,
    record_type: RecordType,
    data: serde_json::Value,
    refs: Vec<String>,
) -> Result<ActivityRecord, RecordError> {
    if !data.is_object() {
        return Err(RecordError::DataNotObject);
    }
    let agent = agent_keypair.public_hex();
    let ts = now_unix();
    let id = derive_id(&agent, &record_type, &data, ts, &refs)?;
    let sig_bytes = identity::sign(id.as_bytes(), agent_keypair).map_err(|_| RecordError::Signing)?;

    Ok(ActivityRecord {
        v: PROTOCOL_VERSION,
        agent,
        record_type,
        data,
        ts,
        refs,
        id,
        sig: hex::encode(sig_bytes),
    })
}

/// Recompute `record`'s content id from its other fields and compare
/// against the stored `id`. `false` on any malformed input (never panics).
pub fn id_matches(record: &ActivityRecord) -> bool {
    match derive_id(&record.agent, &record.record_type, &record.data, record.ts, &record.refs) {
        Ok(expected_id) => expected_id == record.id,
        Err(_) => false,
    }
}

/// Verify `record.sig` against `record.agent` over the UTF-8 bytes of
/// `record.id` (not the id check itself — see [`id_matches`]).
/// `false` on any malformed input (never panics).
pub fn signature_valid(record: &ActivityRecord) -> bool {
    let Ok(agent_bytes) = hex::decode(&record.agent) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(&record.sig) else {
        return false;
    };
    identity::verify(&sig_bytes, record.id.as_bytes(), &agent_bytes)
}

/// Verify a record: (a) recompute `id` and compare, (b) verify `sig`
/// against `agent`, (c) check `|now - ts| <= 3600`. All three must pass.
/// Never panics on malformed input.
pub fn verify(record: &ActivityRecord) -> bool {
    verify_at(record, now_unix())
}

/// Like [`verify`] but with an injectable "now", for deterministic tests.
pub fn verify_at(record: &ActivityRecord, now: u64) -> bool {
    if record.v != PROTOCOL_VERSION {
        return false;
    }
    if !id_matches(record) {
        return false;
    }
    if !signature_valid(record) {
        return false;
    }

    let drift = (now as i64) - (record.ts as i64);
    drift.abs() <= MAX_CLOCK_DRIFT_SECS
}

/// Serialize a record to canonical-JSON wire bytes.
pub fn serialize(record: &ActivityRecord) -> Result<Vec<u8>, RecordError> {
    serde_json::to_vec(record).map_err(|_| RecordError::Canonicalize)
}

/// Parse wire bytes into a record. Malformed input returns `None` rather
/// than panicking; the ingress pipeline turns that into a "malformed,
/// reject" outcome.
pub fn deserialize(bytes: &[u8]) -> Option<ActivityRecord> {
    serde_json::from_slice(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::generate;

    fn sample_data() -> serde_json::Value {
        serde_json::json!({"description": "summarize HN", "budget": "0.05"})
    }

    #[test]
    fn create_then_verify_passes() {
        let kp = generate().unwrap();
        let rec = create(&kp, RecordType::TaskPosted, sample_data(), vec![]).unwrap();
        assert!(verify(&rec));
    }

    #[test]
    fn tampering_with_data_breaks_verification() {
        let kp = generate().unwrap();
        let mut rec = create(&kp, RecordType::TaskPosted, sample_data(), vec![]).unwrap();
        rec.data = serde_json::json!({"description": "altered", "budget": "0.05"});
        assert!(!verify(&rec));
    }

    #[test]
    fn tampering_with_agent_breaks_verification() {
        let kp = generate().unwrap();
        let other = generate().unwrap();
        let mut rec = create(&kp, RecordType::TaskPosted, sample_data(), vec![]).unwrap();
        rec.agent = other.public_hex();
        assert!(!verify(&rec));
    }

    #[test]
    fn tampering_with_type_breaks_verification() {
        let kp = generate().unwrap();
        let mut rec = create(&kp, RecordType::TaskPosted, sample_data(), vec![]).unwrap();
        rec.record_type = RecordType::TaskFailed;
        assert!(!verify(&rec));
    }

    #[test]
    fn tampering_with_refs_breaks_verification() {
        let kp = generate().unwrap();
        let mut rec = create(&kp, RecordType::TaskPosted, sample_data(), vec!["blake3:aa".into()]).unwrap();
        rec.refs.push("blake3:bb".into());
        assert!(!verify(&rec));
    }

    #[test]
    fn serialize_deserialize_roundtrip() {
        let kp = generate().unwrap();
        let rec = create(&kp, RecordType::TaskPosted, sample_data(), vec![]).unwrap();
        let bytes = serialize(&rec).unwrap();
        let rec2 = deserialize(&bytes).unwrap();
        assert_eq!(rec.id, rec2.id);
        assert_eq!(rec.sig, rec2.sig);
        assert!(verify(&rec2));
    }

    #[test]
    fn id_independent_of_data_key_insertion_order() {
        let kp = generate().unwrap();
        let a = serde_json::json!({"b": 2, "a": 1});
        let b = serde_json::json!({"a": 1, "b": 2});
        let rec_a = create(&kp, RecordType::TaskPosted, a, vec![]).unwrap();
        // Re-derive with the differently-ordered (but equal) map to confirm
        // the id only depends on content, not insertion order.
        let id_b = derive_id(&rec_a.agent, &rec_a.record_type, &b, rec_a.ts, &rec_a.refs).unwrap();
        assert_eq!(rec_a.id, id_b);
    }

    #[test]
    fn clock_drift_outside_window_fails_verification() {
        let kp = generate().unwrap();
        let rec = create(&kp, RecordType::TaskPosted, sample_data(), vec![]).unwrap();
        let far_future = rec.ts + MAX_CLOCK_DRIFT_SECS as u64 + 10;
        assert!(!verify_at(&rec, far_future));
    }

    #[test]
    fn deserialize_malformed_bytes_does_not_panic() {
        assert!(deserialize(b"not json").is_none());
        assert!(deserialize(b"{}").is_none());
    }

    #[test]
    fn id_matches_and_signature_valid_are_independent_checks() {
        let kp = generate().unwrap();
        let other = generate().unwrap();
        let rec = create(&kp, RecordType::TaskPosted, sample_data(), vec![]).unwrap();
        assert!(id_matches(&rec));
        assert!(signature_valid(&rec));

        let mut bad_id = rec.clone();
        bad_id.data = serde_json::json!({"description": "altered", "budget": "0.05"});
        assert!(!id_matches(&bad_id));
        // The signature still verifies against the (now stale) id field.
        assert!(signature_valid(&bad_id));

        let mut bad_sig = rec.clone();
        bad_sig.sig = hex::encode(crate::core::identity::sign(bad_sig.id.as_bytes(), &other).unwrap());
        assert!(id_matches(&bad_sig));
        assert!(!signature_valid(&bad_sig));
    }
}
