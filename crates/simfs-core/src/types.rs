// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for simfs

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Unix-style permission bits: the nine rwx flags plus SetUID, SetGID and
/// Sticky, canonically encoded as a 12-bit integer (four octal digits).
///
/// Sticky is meaningful only on directories; on plain files it is stored but
/// never enforced. SetUID/SetGID on non-executable files are likewise stored
/// but inert at execution time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionBits(u32);

impl PermissionBits {
    /// All twelve valid bits.
    pub const MASK: u32 = 0o7777;

    /// Decode from the canonical 12-bit encoding.
    pub fn from_bits(bits: u32) -> FsResult<Self> {
        if bits & !Self::MASK != 0 {
            return Err(FsError::InvalidPermissionValue);
        }
        Ok(Self(bits))
    }

    /// Decode, discarding any bits outside the valid range.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::MASK)
    }

    /// The canonical 12-bit encoding.
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn owner_read(self) -> bool {
        self.0 & 0o400 != 0
    }

    pub const fn owner_write(self) -> bool {
        self.0 & 0o200 != 0
    }

    pub const fn owner_exec(self) -> bool {
        self.0 & 0o100 != 0
    }

    pub const fn group_read(self) -> bool {
        self.0 & 0o040 != 0
    }

    pub const fn group_write(self) -> bool {
        self.0 & 0o020 != 0
    }

    pub const fn group_exec(self) -> bool {
        self.0 & 0o010 != 0
    }

    pub const fn other_read(self) -> bool {
        self.0 & 0o004 != 0
    }

    pub const fn other_write(self) -> bool {
        self.0 & 0o002 != 0
    }

    pub const fn other_exec(self) -> bool {
        self.0 & 0o001 != 0
    }

    pub fn set_uid(self) -> bool {
        self.0 & libc::S_ISUID as u32 != 0
    }

    pub fn set_gid(self) -> bool {
        self.0 & libc::S_ISGID as u32 != 0
    }

    pub fn sticky(self) -> bool {
        self.0 & libc::S_ISVTX as u32 != 0
    }

    /// True when any of the three execute bits is set.
    pub const fn any_exec(self) -> bool {
        self.0 & 0o111 != 0
    }

    /// Force the SetGID bit on (used for SetGID directory inheritance).
    pub fn with_set_gid(self) -> Self {
        Self(self.0 | libc::S_ISGID as u32)
    }

    /// Strip SetUID and SetGID (applied when ownership changes).
    pub const fn without_set_id_bits(self) -> Self {
        Self(self.0 & !0o6000)
    }

    /// Apply a umask: `self & !mask`. Only the rwx bits of the mask are
    /// honored; the special bits pass through untouched.
    pub const fn masked(self, umask: u32) -> Self {
        Self(self.0 & !(umask & 0o777))
    }
}

impl std::fmt::Display for PermissionBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// The kind of access a caller requests on a node.
///
/// `Traverse` is the directory-descent form of execute: resolving a path
/// component requires it on every intermediate directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
    Traverse,
}

/// A registered identity: real user, primary group, and group memberships.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: u32,
    pub gid: u32,
    pub groups: Vec<u32>,
}

impl Principal {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            groups: vec![gid],
        }
    }

    pub fn with_groups(uid: u32, gid: u32, groups: Vec<u32>) -> Self {
        Self { uid, gid, groups }
    }
}

/// File timestamps
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FileTimes {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub birthtime: i64,
}

/// Content identifier for the storage backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentId(pub u64);

impl ContentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Public snapshot of a node's metadata
#[derive(Clone, Debug)]
pub struct Attributes {
    pub len: u64,
    pub times: FileTimes,
    pub uid: u32,
    pub gid: u32,
    pub is_dir: bool,
    pub perms: PermissionBits,
}

/// Directory entry information
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub len: u64,
}

/// Event kinds for filesystem change notifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Created { path: String, uid: u32, is_dir: bool },
    Removed { path: String, uid: u32 },
    Renamed { from: String, to: String, uid: u32 },
    Modified { path: String, uid: u32 },
}

/// Event sink trait for receiving filesystem change notifications.
///
/// Implementations must not block; the facade calls sinks inline after a
/// mutation completes.
pub trait EventSink: Send + Sync {
    fn on_event(&self, evt: &EventKind);
}

/// Opaque event subscription identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_bits_round_trip_all_valid_values() {
        for bits in 0..=PermissionBits::MASK {
            let p = PermissionBits::from_bits(bits).expect("valid bits");
            assert_eq!(p.bits(), bits);
            let again = PermissionBits::from_bits(p.bits()).expect("round trip");
            assert_eq!(again, p);
        }
    }

    #[test]
    fn permission_bits_reject_out_of_range() {
        assert!(matches!(
            PermissionBits::from_bits(0o10000),
            Err(FsError::InvalidPermissionValue)
        ));
        assert!(matches!(
            PermissionBits::from_bits(u32::MAX),
            Err(FsError::InvalidPermissionValue)
        ));
    }

    #[test]
    fn from_bits_truncate_discards_high_bits() {
        let p = PermissionBits::from_bits_truncate(0o10644);
        assert_eq!(p.bits(), 0o644);
    }

    #[test]
    fn special_bit_accessors() {
        let p = PermissionBits::from_bits(0o7755).unwrap();
        assert!(p.set_uid());
        assert!(p.set_gid());
        assert!(p.sticky());
        assert!(p.owner_read() && p.owner_write() && p.owner_exec());
        assert!(p.group_read() && !p.group_write() && p.group_exec());
        assert!(p.other_read() && !p.other_write() && p.other_exec());
    }

    #[test]
    fn masked_leaves_special_bits_alone() {
        let p = PermissionBits::from_bits(0o2777).unwrap();
        let masked = p.masked(0o022);
        assert_eq!(masked.bits(), 0o2755);
        assert!(masked.set_gid());
    }

    #[test]
    fn without_set_id_bits_keeps_sticky() {
        let p = PermissionBits::from_bits(0o7755).unwrap();
        let stripped = p.without_set_id_bits();
        assert_eq!(stripped.bits(), 0o1755);
        assert!(stripped.sticky());
    }

    #[test]
    fn display_prints_four_octal_digits() {
        assert_eq!(PermissionBits::from_bits(0o644).unwrap().to_string(), "0644");
        assert_eq!(PermissionBits::from_bits(0o1777).unwrap().to_string(), "1777");
    }
}
