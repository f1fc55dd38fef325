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

//! Persistent log (C3): an append-only, deduplicated, indexed store of
//! activity records, backed by `sled`. Indexed on `type`, `agent`, `ts`,
//! and `(type, agent)`; ordering within a time range is by `ts` descending.

use crate::core::record::{self, ActivityRecord};
use crate::core::record_types::RecordType;
use std::sync::Mutex;
use thiserror::Error;

/// Persistent log errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open the database.
    #[error("db open")]
    DbOpen,
    /// I/O failure against the database.
    #[error("db io")]
    DbIo,
    /// A stored record failed to deserialize (corruption).
    #[error("corrupt record")]
    Corrupt,
}

/// Descending-order key encoding for `ts`: larger `ts` sorts first when
/// iterated in ascending byte order.
fn ts_desc(ts: u64) -> [u8; 8] {
    (u64::MAX - ts).to_be_bytes()
}

fn idx_type_key(record_type: &RecordType, ts: u64, id: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(64);
    k.extend_from_slice(record_type.as_str().as_bytes());
    k.push(0);
    k.extend_from_slice(&ts_desc(ts));
    k.extend_from_slice(id.as_bytes());
    k
}

fn idx_agent_key(agent: &str, ts: u64, id: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(64);
    k.extend_from_slice(agent.as_bytes());
    k.push(0);
    k.extend_from_slice(&ts_desc(ts));
    k.extend_from_slice(id.as_bytes());
    k
}

fn idx_type_agent_key(record_type: &RecordType, agent: &str, ts: u64, id: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(96);
    k.extend_from_slice(record_type.as_str().as_bytes());
    k.push(0);
    k.extend_from_slice(agent.as_bytes());
    k.push(0);
    k.extend_from_slice(&ts_desc(ts));
    k.extend_from_slice(id.as_bytes());
    k
}

fn idx_ts_key(ts: u64, id: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(40);
    k.extend_from_slice(&ts_desc(ts));
    k.extend_from_slice(id.as_bytes());
    k
}

/// Persistent, indexed activity-record log.
pub struct PersistentLog {
    main: sled::Tree,
    idx_type: sled::Tree,
    idx_agent: sled::Tree,
    idx_type_agent: sled::Tree,
    idx_ts: sled::Tree,
    // Serializes writers; sled itself allows concurrent readers regardless.
    write_lock: Mutex<()>,
    db: sled::Db,
}

impl PersistentLog {
    /// Open (or create) the log at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        let main = db.open_tree("activity_records").map_err(|_| StoreError::DbOpen)?;
        let idx_type = db.open_tree("idx_type").map_err(|_| StoreError::DbOpen)?;
        let idx_agent = db.open_tree("idx_agent").map_err(|_| StoreError::DbOpen)?;
        let idx_type_agent = db.open_tree("idx_type_agent").map_err(|_| StoreError::DbOpen)?;
        let idx_ts = db.open_tree("idx_ts").map_err(|_| StoreError::DbOpen)?;
        Ok(Self {
            main,
            idx_type,
            idx_agent,
            idx_type_agent,
            idx_ts,
            write_lock: Mutex::new(()),
            db,
        })
    }

    /// Insert `record`. Idempotent on `id`: a duplicate insert is a no-op
    /// and returns `Ok(false)`. Returns `Ok(true)` if this call actually
    /// stored a new record.
    pub fn insert(&self, record: &ActivityRecord) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::DbIo)?;

        if self.main.contains_key(record.id.as_bytes()).map_err(|_| StoreError::DbIo)? {
            return Ok(false);
        }

        let bytes = record::serialize(record).map_err(|_| StoreError::Corrupt)?;
        self.main
            .insert(record.id.as_bytes(), bytes)
            .map_err(|_| StoreError::DbIo)?;
        self.idx_type
            .insert(idx_type_key(&record.record_type, record.ts, &record.id), record.id.as_bytes())
            .map_err(|_| StoreError::DbIo)?;
        self.idx_agent
            .insert(idx_agent_key(&record.agent, record.ts, &record.id), record.id.as_bytes())
            .map_err(|_| StoreError::DbIo)?;
        self.idx_type_agent
            .insert(
                idx_type_agent_key(&record.record_type, &record.agent, record.ts, &record.id),
                record.id.as_bytes(),
            )
            .map_err(|_| StoreError::DbIo)?;
        self.idx_ts
            .insert(idx_ts_key(record.ts, &record.id), record.id.as_bytes())
            .map_err(|_| StoreError::DbIo)?;

        Ok(true)
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &str) -> Result<Option<ActivityRecord>, StoreError> {
        let Some(ivec) = self.main.get(id.as_bytes()).map_err(|_| StoreError::DbIo)? else {
            return Ok(None);
        };
        record::deserialize(&ivec).map(Some).ok_or(StoreError::Corrupt)
    }

    fn resolve_ids(&self, tree: &sled::Tree, ids: Vec<Vec<u8>>, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        let _ = tree;
        let mut out = Vec::with_capacity(limit.min(ids.len()));
        for id_bytes in ids.into_iter().take(limit) {
            let id = String::from_utf8_lossy(&id_bytes).to_string();
            if let Some(rec) = self.get(&id)? {
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// Most recent (by `ts` descending) records of `record_type`.
    pub fn query_by_type(&self, record_type: &RecordType, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        let prefix = {
            let mut p = record_type.as_str().as_bytes().to_vec();
            p.push(0);
            p
        };
        let ids: Vec<Vec<u8>> = self
            .idx_type
            .scan_prefix(&prefix)
            .values()
            .filter_map(|v| v.ok().map(|iv| iv.to_vec()))
            .collect();
        self.resolve_ids(&self.idx_type, ids, limit)
    }

    /// Most recent records authored by `agent`.
    pub fn query_by_agent(&self, agent: &str, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut prefix = agent.as_bytes().to_vec();
        prefix.push(0);
        let ids: Vec<Vec<u8>> = self
            .idx_agent
            .scan_prefix(&prefix)
            .values()
            .filter_map(|v| v.ok().map(|iv| iv.to_vec()))
            .collect();
        self.resolve_ids(&self.idx_agent, ids, limit)
    }

    /// Most recent records of `record_type` authored by `agent`.
    pub fn query_by_type_and_agent(
        &self,
        record_type: &RecordType,
        agent: &str,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut prefix = record_type.as_str().as_bytes().to_vec();
        prefix.push(0);
        prefix.extend_from_slice(agent.as_bytes());
        prefix.push(0);
        let ids: Vec<Vec<u8>> = self
            .idx_type_agent
            .scan_prefix(&prefix)
            .values()
            .filter_map(|v| v.ok().map(|iv| iv.to_vec()))
            .collect();
        self.resolve_ids(&self.idx_type_agent, ids, limit)
    }

    /// Records with `ts` in `[start, end]`, most recent first.
    pub fn query_by_time_range(&self, start: u64, end: u64, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let lo = ts_desc(end);
        let hi = ts_desc(start);
        let ids: Vec<Vec<u8>> = self
            .idx_ts
            .range(lo.to_vec()..=[hi.to_vec(), vec![0xff; 64]].concat())
            .values()
            .filter_map(|v| v.ok().map(|iv| iv.to_vec()))
            .collect();
        self.resolve_ids(&self.idx_ts, ids, limit)
    }

    /// Total number of distinct records stored.
    pub fn count(&self) -> usize {
        self.main.len()
    }

    /// Flush and close the database.
    pub fn close(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|_| StoreError::DbIo)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::generate;

    fn rec(record_type: RecordType, ts: u64) -> ActivityRecord {
        let kp = generate().unwrap();
        let mut r = record::create(&kp, record_type, serde_json::json!({"x": 1}), vec![]).unwrap();
        r.ts = ts;
        // Re-derive id/sig since we mutated ts after signing.
        let id = record::derive_id(&r.agent, &r.record_type, &r.data, r.ts, &r.refs).unwrap();
        r.id = id;
        r
    }

    #[test]
    fn insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistentLog::open(dir.path().to_str().unwrap()).unwrap();
        let r = rec(RecordType::TaskPosted, 100);
        assert!(log.insert(&r).unwrap());
        assert!(!log.insert(&r).unwrap());
        assert_eq!(log.count(), 1);
    }

    #[test]
    fn query_by_type_orders_by_ts_desc() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistentLog::open(dir.path().to_str().unwrap()).unwrap();
        let r1 = rec(RecordType::TaskPosted, 100);
        let r2 = rec(RecordType::TaskPosted, 200);
        log.insert(&r1).unwrap();
        log.insert(&r2).unwrap();
        let got = log.query_by_type(&RecordType::TaskPosted, 10).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].ts, 200);
        assert_eq!(got[1].ts, 100);
    }

    #[test]
    fn query_by_agent_filters_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistentLog::open(dir.path().to_str().unwrap()).unwrap();
        let r1 = rec(RecordType::TaskPosted, 100);
        let r2 = rec(RecordType::TaskPosted, 200);
        log.insert(&r1).unwrap();
        log.insert(&r2).unwrap();
        let got = log.query_by_agent(&r1.agent, 10).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, r1.id);
    }

    #[test]
    fn query_by_time_range_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistentLog::open(dir.path().to_str().unwrap()).unwrap();
        log.insert(&rec(RecordType::TaskPosted, 50)).unwrap();
        log.insert(&rec(RecordType::TaskPosted, 150)).unwrap();
        log.insert(&rec(RecordType::TaskPosted, 250)).unwrap();
        let got = log.query_by_time_range(100, 200, 10).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ts, 150);
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistentLog::open(dir.path().to_str().unwrap()).unwrap();
        assert!(log.get("blake3:doesnotexist").unwrap().is_none());
    }
}
