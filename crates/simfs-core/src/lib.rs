// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! simfs Core: an in-memory virtual filesystem with Unix-style security.
//!
//! The crate models ownership, the twelve permission bits (rwx for owner,
//! group and other, plus SetUID, SetGID and Sticky), per-principal umasks,
//! and scoped privilege elevation for SetUID/SetGID executables. Audit and
//! quota concerns plug in behind collaborator traits.
//!
//! [`VfsCore`] is the entry point. Callers register principals, obtain a
//! per-operation [`SecurityContext`], and pass it to every call; the core
//! holds no ambient caller identity.

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod perms;
pub mod quota;
pub mod special;
pub mod storage;
pub mod types;
pub mod umask;
pub mod vfs;

pub use audit::{AuditError, AuditEvent, AuditEventType, AuditSink, Severity, TracingAuditSink};
pub use config::{FsConfig, SecurityPolicy};
pub use context::SecurityContext;
pub use error::{FsError, FsResult};
pub use quota::{InMemoryQuotaService, QuotaRecord, QuotaService, QuotaStatus};
pub use storage::{InMemoryBackend, StorageBackend};
pub use types::{
    AccessKind, Attributes, ContentId, DirEntry, FileTimes, PermissionBits, Principal,
};
#[cfg(feature = "events")]
pub use types::{EventKind, EventSink, SubscriptionId};
pub use umask::{UmaskManager, DIR_BASE_MODE, FALLBACK_UMASK, FILE_BASE_MODE};
pub use vfs::VfsCore;
