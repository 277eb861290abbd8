// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Special-bit behaviors: SetGID inheritance, the sticky-bit removal guard,
//! and SetUID/SetGID execution elevation.
//!
//! All three share their trigger points (creation, removal, execution), so
//! they live together; each is a pure decision the facade applies at the
//! right step of its orchestration order.

use std::path::Path;

use crate::config::SecurityPolicy;
use crate::context::SecurityContext;
use crate::error::{FsError, FsResult};
use crate::types::PermissionBits;

/// SetGID inheritance for a newly created child node.
///
/// When the parent directory carries SetGID, the child's group is forced to
/// the parent's group, and a child directory additionally gets SetGID forced
/// on so the behavior propagates. Returns the (gid, perms) the child should
/// adopt, or `None` when nothing would change — re-applying to an already
/// inherited child is a no-op, which keeps the step idempotent.
pub fn inherit_group(
    parent_perms: PermissionBits,
    parent_gid: u32,
    child_is_dir: bool,
    child_gid: u32,
    child_perms: PermissionBits,
) -> Option<(u32, PermissionBits)> {
    if !parent_perms.set_gid() {
        return None;
    }
    let new_perms = if child_is_dir {
        child_perms.with_set_gid()
    } else {
        child_perms
    };
    if child_gid == parent_gid && new_perms == child_perms {
        return None;
    }
    Some((parent_gid, new_perms))
}

/// Sticky-bit guard for delete, rename and move.
///
/// With the sticky bit set on the containing directory, only the entry's
/// owner, the directory's owner, or root may remove or rename the entry.
/// This runs in addition to the standard write check on the directory.
pub fn sticky_allows(
    dir_perms: PermissionBits,
    dir_uid: u32,
    child_uid: u32,
    ctx: &SecurityContext,
) -> bool {
    if !dir_perms.sticky() {
        return true;
    }
    let euid = ctx.effective_uid();
    euid == 0 || euid == dir_uid || euid == child_uid
}

/// Compute the effective ids an execution should run under.
///
/// SetUID substitutes the file owner's uid, SetGID the file's gid. A target
/// uid of 0 is only honored when the executable's path is on the trusted
/// allow-list; from anywhere else the request fails closed with
/// `UntrustedElevationTarget` rather than degrading to a non-elevated run.
/// Returns `None` when the bits would not change the caller's identity.
pub fn elevation_for_exec(
    perms: PermissionBits,
    owner_uid: u32,
    owner_gid: u32,
    path: &Path,
    ctx: &SecurityContext,
    policy: &SecurityPolicy,
) -> FsResult<Option<(u32, u32)>> {
    if !perms.set_uid() && !perms.set_gid() {
        return Ok(None);
    }

    let euid = if perms.set_uid() { owner_uid } else { ctx.effective_uid() };
    let egid = if perms.set_gid() { owner_gid } else { ctx.effective_gid() };

    if euid == 0 && ctx.effective_uid() != 0 && !policy.is_trusted_elevation_path(path) {
        tracing::warn!(
            path = %path.display(),
            uid = ctx.effective_uid(),
            "setuid-root execution from untrusted path rejected"
        );
        return Err(FsError::UntrustedElevationTarget);
    }

    if euid == ctx.effective_uid() && egid == ctx.effective_gid() {
        return Ok(None);
    }
    Ok(Some((euid, egid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn bits(mode: u32) -> PermissionBits {
        PermissionBits::from_bits(mode).unwrap()
    }

    #[test]
    fn inherit_group_noop_without_setgid_parent() {
        assert_eq!(inherit_group(bits(0o755), 50, false, 60, bits(0o644)), None);
    }

    #[test]
    fn inherit_group_forces_parent_gid_on_files() {
        let result = inherit_group(bits(0o2775), 50, false, 60, bits(0o644));
        assert_eq!(result, Some((50, bits(0o644))));
    }

    #[test]
    fn inherit_group_propagates_bit_to_directories() {
        let result = inherit_group(bits(0o2775), 50, true, 60, bits(0o755));
        assert_eq!(result, Some((50, bits(0o2755))));
    }

    #[test]
    fn inherit_group_is_idempotent() {
        // Child already carries the parent's gid and the SetGID bit.
        assert_eq!(inherit_group(bits(0o2775), 50, true, 50, bits(0o2755)), None);
        assert_eq!(inherit_group(bits(0o2775), 50, false, 50, bits(0o644)), None);
    }

    #[test]
    fn sticky_guard_decisions() {
        let dir = bits(0o1777);
        let owner = SecurityContext::new(1001, 1001);
        let dir_owner = SecurityContext::new(500, 500);
        let stranger = SecurityContext::new(1002, 1002);
        let root = SecurityContext::new(0, 0);

        assert!(sticky_allows(dir, 500, 1001, &owner));
        assert!(sticky_allows(dir, 500, 1001, &dir_owner));
        assert!(sticky_allows(dir, 500, 1001, &root));
        assert!(!sticky_allows(dir, 500, 1001, &stranger));

        // Without the sticky bit the guard never denies.
        assert!(sticky_allows(bits(0o777), 500, 1001, &stranger));
    }

    #[test]
    fn elevation_none_without_special_bits() {
        let ctx = SecurityContext::new(1000, 1000);
        let policy = SecurityPolicy::default();
        let result =
            elevation_for_exec(bits(0o755), 0, 0, "/bin/ls".as_ref(), &ctx, &policy).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn setuid_elevates_to_owner() {
        let ctx = SecurityContext::new(1000, 1000);
        let policy = SecurityPolicy::default();
        let result =
            elevation_for_exec(bits(0o4755), 500, 50, "/opt/tool".as_ref(), &ctx, &policy)
                .unwrap();
        assert_eq!(result, Some((500, 1000)));
    }

    #[test]
    fn setgid_elevates_group_only() {
        let ctx = SecurityContext::new(1000, 1000);
        let policy = SecurityPolicy::default();
        let result =
            elevation_for_exec(bits(0o2755), 500, 50, "/opt/tool".as_ref(), &ctx, &policy)
                .unwrap();
        assert_eq!(result, Some((1000, 50)));
    }

    #[test]
    fn setuid_root_from_untrusted_path_fails_closed() {
        let ctx = SecurityContext::new(1000, 1000);
        let policy = SecurityPolicy::default();
        let result =
            elevation_for_exec(bits(0o4755), 0, 0, "/opt/tool".as_ref(), &ctx, &policy);
        assert!(matches!(result, Err(FsError::UntrustedElevationTarget)));
    }

    #[test]
    fn setuid_root_from_trusted_path_is_allowed() {
        let ctx = SecurityContext::new(1000, 1000);
        let policy = SecurityPolicy {
            trusted_elevation_paths: vec![PathBuf::from("/sbin/passwd")],
            ..Default::default()
        };
        let result =
            elevation_for_exec(bits(0o4755), 0, 0, "/sbin/passwd".as_ref(), &ctx, &policy)
                .unwrap();
        assert_eq!(result, Some((0, 1000)));
    }

    #[test]
    fn root_caller_needs_no_trust_check() {
        let ctx = SecurityContext::new(0, 0);
        let policy = SecurityPolicy::default();
        let result =
            elevation_for_exec(bits(0o4755), 0, 50, "/opt/tool".as_ref(), &ctx, &policy).unwrap();
        // Already root; setuid changes nothing, setgid is absent.
        assert_eq!(result, None);
    }

    #[test]
    fn elevation_to_current_identity_is_none() {
        let ctx = SecurityContext::new(500, 50);
        let policy = SecurityPolicy::default();
        let result =
            elevation_for_exec(bits(0o6755), 500, 50, "/opt/tool".as_ref(), &ctx, &policy)
                .unwrap();
        assert_eq!(result, None);
    }
}
