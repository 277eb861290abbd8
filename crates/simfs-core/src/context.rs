// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-operation security context with scoped privilege elevation.
//!
//! A `SecurityContext` is an owned value created for one logical operation
//! and threaded through the call chain. It is deliberately not stored inside
//! the filesystem facade and never shared across concurrent operations, so
//! elevated privilege cannot leak between unrelated requests.

use crate::error::{FsError, FsResult};
use crate::types::Principal;

/// The acting identity for a single operation: real and effective user/group
/// ids, group memberships, and the stack of prior effective ids pushed by
/// SetUID/SetGID elevation.
#[derive(Clone, Debug)]
pub struct SecurityContext {
    real_uid: u32,
    real_gid: u32,
    effective_uid: u32,
    effective_gid: u32,
    groups: Vec<u32>,
    elevation_stack: Vec<(u32, u32)>,
}

impl SecurityContext {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            real_uid: uid,
            real_gid: gid,
            effective_uid: uid,
            effective_gid: gid,
            groups: vec![gid],
            elevation_stack: Vec::new(),
        }
    }

    pub fn from_principal(principal: &Principal) -> Self {
        Self {
            real_uid: principal.uid,
            real_gid: principal.gid,
            effective_uid: principal.uid,
            effective_gid: principal.gid,
            groups: principal.groups.clone(),
            elevation_stack: Vec::new(),
        }
    }

    pub fn real_uid(&self) -> u32 {
        self.real_uid
    }

    pub fn real_gid(&self) -> u32 {
        self.real_gid
    }

    /// The identity used for permission decisions.
    pub fn effective_uid(&self) -> u32 {
        self.effective_uid
    }

    pub fn effective_gid(&self) -> u32 {
        self.effective_gid
    }

    pub fn is_root(&self) -> bool {
        self.effective_uid == 0
    }

    /// Whether the context belongs to `gid` via its effective group, real
    /// group, or supplementary memberships.
    pub fn is_member(&self, gid: u32) -> bool {
        self.effective_gid == gid || self.real_gid == gid || self.groups.contains(&gid)
    }

    pub fn is_elevated(&self) -> bool {
        !self.elevation_stack.is_empty()
    }

    /// Enter an elevated region: the prior effective ids are saved and the
    /// given ids become effective until the matching [`pop_elevation`].
    ///
    /// Prefer [`with_elevation`], which guarantees the pop on every exit
    /// path.
    ///
    /// [`pop_elevation`]: SecurityContext::pop_elevation
    /// [`with_elevation`]: SecurityContext::with_elevation
    pub fn push_elevation(&mut self, euid: u32, egid: u32) {
        self.elevation_stack.push((self.effective_uid, self.effective_gid));
        self.effective_uid = euid;
        self.effective_gid = egid;
    }

    /// Leave the innermost elevated region, restoring the prior effective
    /// ids. A pop without a matching push is a programming error, reported
    /// as `InvariantViolation` rather than silently ignored.
    pub fn pop_elevation(&mut self) -> FsResult<()> {
        let (uid, gid) = self.elevation_stack.pop().ok_or_else(|| {
            FsError::InvariantViolation("elevation pop without matching push".to_string())
        })?;
        self.effective_uid = uid;
        self.effective_gid = gid;
        Ok(())
    }

    /// Run `f` with the effective ids elevated to (`euid`, `egid`),
    /// restoring the prior identity on every exit path: normal return,
    /// error, and unwind.
    pub fn with_elevation<T>(
        &mut self,
        euid: u32,
        egid: u32,
        f: impl FnOnce(&mut SecurityContext) -> FsResult<T>,
    ) -> FsResult<T> {
        self.push_elevation(euid, egid);
        let mut guard = scopeguard::guard(self, |ctx| {
            // Cannot fail: the push above guarantees a matching frame.
            let _ = ctx.pop_elevation();
        });
        f(&mut **guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_restores_effective_ids() {
        let mut ctx = SecurityContext::new(1000, 1000);
        ctx.push_elevation(0, 0);
        assert_eq!(ctx.effective_uid(), 0);
        assert_eq!(ctx.effective_gid(), 0);
        assert!(ctx.is_elevated());
        ctx.pop_elevation().unwrap();
        assert_eq!(ctx.effective_uid(), 1000);
        assert_eq!(ctx.effective_gid(), 1000);
        assert!(!ctx.is_elevated());
    }

    #[test]
    fn nested_elevation_unwinds_in_order() {
        let mut ctx = SecurityContext::new(1000, 1000);
        ctx.push_elevation(500, 50);
        ctx.push_elevation(0, 0);
        ctx.pop_elevation().unwrap();
        assert_eq!(ctx.effective_uid(), 500);
        assert_eq!(ctx.effective_gid(), 50);
        ctx.pop_elevation().unwrap();
        assert_eq!(ctx.effective_uid(), 1000);
    }

    #[test]
    fn pop_without_push_is_invariant_violation() {
        let mut ctx = SecurityContext::new(1000, 1000);
        assert!(matches!(
            ctx.pop_elevation(),
            Err(FsError::InvariantViolation(_))
        ));
    }

    #[test]
    fn with_elevation_restores_on_success() {
        let mut ctx = SecurityContext::new(1000, 1000);
        let seen = ctx
            .with_elevation(0, 0, |elevated| Ok(elevated.effective_uid()))
            .unwrap();
        assert_eq!(seen, 0);
        assert_eq!(ctx.effective_uid(), 1000);
        assert!(!ctx.is_elevated());
    }

    #[test]
    fn with_elevation_restores_on_error() {
        let mut ctx = SecurityContext::new(1000, 1000);
        let result: FsResult<()> =
            ctx.with_elevation(0, 0, |_| Err(FsError::PermissionDenied));
        assert!(matches!(result, Err(FsError::PermissionDenied)));
        assert_eq!(ctx.effective_uid(), 1000);
        assert_eq!(ctx.effective_gid(), 1000);
        assert!(!ctx.is_elevated());
    }

    #[test]
    fn with_elevation_restores_on_unwind() {
        let mut ctx = SecurityContext::new(1000, 1000);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: FsResult<()> = ctx.with_elevation(0, 0, |_| panic!("payload failed"));
        }));
        assert!(outcome.is_err());
        assert_eq!(ctx.effective_uid(), 1000);
        assert!(!ctx.is_elevated());
    }

    #[test]
    fn membership_covers_effective_real_and_supplementary() {
        let principal = Principal::with_groups(1000, 100, vec![100, 50, 60]);
        let mut ctx = SecurityContext::from_principal(&principal);
        assert!(ctx.is_member(100));
        assert!(ctx.is_member(50));
        assert!(!ctx.is_member(999));
        ctx.push_elevation(1000, 999);
        assert!(ctx.is_member(999));
        ctx.pop_elevation().unwrap();
    }
}
