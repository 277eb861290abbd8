// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Quota collaborator interface and a simple in-memory implementation.
//!
//! The facade asks the quota service before admitting a write that grows
//! usage. A hard-limit breach denies the operation; a soft-limit breach is a
//! warning only. Usage deltas are reported after the mutation completes and
//! never roll it back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Outcome of a pre-write quota check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaStatus {
    BelowLimit,
    AboveSoftLimit,
    AboveHardLimit,
    /// The service could not answer; callers fail closed.
    Error,
}

/// Per-principal byte quota and current usage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub uid: u32,
    pub soft_limit_bytes: u64,
    pub hard_limit_bytes: u64,
    pub used_bytes: u64,
}

impl QuotaRecord {
    pub fn new(uid: u32, soft_limit_bytes: u64, hard_limit_bytes: u64) -> Self {
        Self {
            uid,
            soft_limit_bytes,
            hard_limit_bytes,
            used_bytes: 0,
        }
    }

    /// Status if `additional_bytes` were added to current usage.
    pub fn status_for(&self, additional_bytes: u64) -> QuotaStatus {
        let projected = self.used_bytes.saturating_add(additional_bytes);
        if projected > self.hard_limit_bytes {
            QuotaStatus::AboveHardLimit
        } else if projected > self.soft_limit_bytes {
            QuotaStatus::AboveSoftLimit
        } else {
            QuotaStatus::BelowLimit
        }
    }
}

/// Quota collaborator. Implementations must not block; the facade calls
/// `check` before mutating and `record_usage` after.
#[cfg_attr(test, mockall::automock)]
pub trait QuotaService: Send + Sync {
    fn check(&self, uid: u32, additional_bytes: u64) -> QuotaStatus;
    fn record_usage(&self, uid: u32, delta_bytes: i64);
}

/// In-memory quota table. Principals without a record are unlimited.
pub struct InMemoryQuotaService {
    records: RwLock<HashMap<u32, QuotaRecord>>,
}

impl InMemoryQuotaService {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_record(&self, record: QuotaRecord) {
        self.records.write().unwrap().insert(record.uid, record);
    }

    pub fn record(&self, uid: u32) -> Option<QuotaRecord> {
        self.records.read().unwrap().get(&uid).cloned()
    }
}

impl Default for InMemoryQuotaService {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaService for InMemoryQuotaService {
    fn check(&self, uid: u32, additional_bytes: u64) -> QuotaStatus {
        match self.records.read().unwrap().get(&uid) {
            Some(record) => record.status_for(additional_bytes),
            None => QuotaStatus::BelowLimit,
        }
    }

    fn record_usage(&self, uid: u32, delta_bytes: i64) {
        let mut records = self.records.write().unwrap();
        if let Some(record) = records.get_mut(&uid) {
            record.used_bytes = if delta_bytes >= 0 {
                record.used_bytes.saturating_add(delta_bytes as u64)
            } else {
                record.used_bytes.saturating_sub(delta_bytes.unsigned_abs())
            };
        }
    }
}
