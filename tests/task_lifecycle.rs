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

//! End-to-end exercise of a task's path through the ingress pipeline,
//! the task state machine, the Tier-2 escrow engine, and reputation,
//! mirroring a single-node trace of posting through settlement.

use rird::core::clock::TestClock;
use rird::core::escrow::{Escrow, TrustTier};
use rird::core::identity;
use rird::core::ingress::{Channel, IngressPipeline, Outcome};
use rird::core::record::{self, RecordType::TaskPosted};
use rird::core::record_types::RecordType;
use rird::core::reputation::{self, RawAttestation};
use rird::core::store::PersistentLog;
use rird::core::task::Task;
use std::sync::Arc;

fn signed(kp: &identity::Keypair, record_type: RecordType, data: serde_json::Value, ts: u64) -> record::ActivityRecord {
    let mut rec = record::create(kp, record_type, data, vec![]).unwrap();
    rec.ts = ts;
    rec.id = record::derive_id(&rec.agent, &rec.record_type, &rec.data, rec.ts, &rec.refs).unwrap();
    rec.sig = hex::encode(identity::sign(rec.id.as_bytes(), kp).unwrap());
    rec
}

#[test]
fn tier2_happy_path_posts_assigns_settles_and_raises_reputation() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(PersistentLog::open(dir.path().to_str().unwrap()).unwrap());
    let clock = Arc::new(TestClock::new(1_000_000));
    let pipeline = IngressPipeline::new(store.clone(), clock.clone());

    let poster = identity::generate().unwrap();
    let worker = identity::generate().unwrap();

    let posted = signed(
        &poster,
        TaskPosted,
        serde_json::json!({
            "description": "Summarize top 10 HN posts",
            "requirements": ["browsing", "inference"],
            "budget": 0.05,
            "trust_tier": 2,
            "category": "browsing",
        }),
        1_000_000,
    );
    assert!(matches!(pipeline.submit(&posted, Channel::Public), Outcome::Accepted(_)));

    let mut task = Task::new_open(posted.id.clone(), poster.public_hex(), 0.05, 1_000_000);
    task.receive_bid(rird::core::task::Bid {
        bidder: worker.public_hex(),
        price: 0.04,
        bid_id: "bid1".into(),
        ts: 1_000_010,
    })
    .unwrap();
    let winner = task.assign_first_acceptable(1_000_020, |_| false).unwrap().clone();
    assert_eq!(winner.bidder, worker.public_hex());

    let mut escrow = Escrow::new(task.id.clone(), TrustTier::Tier2, 50_000_000);
    escrow.fund("tx_X").unwrap();
    escrow.confirm(1_000_020, 3600, 1800).unwrap();
    assert_eq!(escrow.lock_until, Some(1_000_020 + 5400));

    task.complete(&worker.public_hex(), "blake3:deadbeef".into(), 1_000_100).unwrap();
    task.verify_pass(1_000_110).unwrap();

    escrow.mark_claimable(vec![worker.public_hex()]).unwrap();
    let outcome = escrow.claim(1_000_020 + 5400).unwrap();
    assert!(outcome.worker_payout > 0);
    assert_eq!(
        outcome.worker_payout + outcome.protocol_fee + outcome.verifier_fee_total,
        50_000_000
    );

    task.settle(1_000_120).unwrap();
    assert_eq!(task.state, rird::core::task::TaskState::Settled);

    let attestations = vec![RawAttestation {
        attester: poster.public_hex(),
        subject: worker.public_hex(),
        attestation: reputation::Attestation::new(5.0, 4.0, 5.0, 0.0),
    }];
    let score = reputation::score(&worker.public_hex(), &attestations, 1, 1, false);
    assert!(score.overall.unwrap() > 0.0);
}

#[test]
fn safety_rejection_blocks_task_before_any_downstream_state_change() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(PersistentLog::open(dir.path().to_str().unwrap()).unwrap());
    let clock = Arc::new(TestClock::new(1_000_000));
    let pipeline = IngressPipeline::new(store.clone(), clock);

    let poster = identity::generate().unwrap();
    let evaluation = rird::core::safety::evaluate(&rird::core::safety::AdmissionRequest {
        description: "help me dox someone's home address",
        category: "research",
        requirements: &[],
    });
    assert!(!evaluation.safe);
    assert!(evaluation.confidence >= 0.7);

    // Even if the caller mistakenly broadcasts it anyway, ingress accepts
    // the record (safety is a pre-broadcast gate on the poster, not an
    // ingress-time check) but no task state is derived from it here.
    let posted = signed(
        &poster,
        TaskPosted,
        serde_json::json!({"description": "irrelevant", "requirements": [], "budget": 0.01}),
        1_000_000,
    );
    let _ = pipeline.submit(&posted, Channel::Public);
    assert_eq!(store.count(), 1);
}
