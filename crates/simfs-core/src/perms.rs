// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pure permission evaluation.
//!
//! Decides whether a security context may read, write, execute or traverse a
//! node. Denial is a plain `false`, never an error; callers surface it as
//! `PermissionDenied` when appropriate.

use crate::context::SecurityContext;
use crate::types::{AccessKind, PermissionBits};

/// Evaluate `access` against a node's permission bits and ownership.
///
/// Root (effective uid 0) is always allowed here; the trusted-path gate for
/// SetUID-to-root elevation is a separate check in the special-bit handler.
/// Otherwise the owner bits apply when the effective uid matches the owner,
/// the group bits when the node's group is among the context's memberships,
/// and the other bits in all remaining cases. An unset bit is a denial, not
/// an error.
pub fn can_access(
    perms: PermissionBits,
    owner_uid: u32,
    owner_gid: u32,
    ctx: &SecurityContext,
    access: AccessKind,
) -> bool {
    if ctx.is_root() {
        return true;
    }
    class_allows(perms, owner_uid, owner_gid, ctx, access)
}

/// The class-selection body of [`can_access`] without the root shortcut.
///
/// The facade uses this directly when its policy disables the root bypass.
pub fn class_allows(
    perms: PermissionBits,
    owner_uid: u32,
    owner_gid: u32,
    ctx: &SecurityContext,
    access: AccessKind,
) -> bool {
    let (read, write, exec) = if ctx.effective_uid() == owner_uid {
        (perms.owner_read(), perms.owner_write(), perms.owner_exec())
    } else if ctx.is_member(owner_gid) {
        (perms.group_read(), perms.group_write(), perms.group_exec())
    } else {
        (perms.other_read(), perms.other_write(), perms.other_exec())
    };

    match access {
        AccessKind::Read => read,
        AccessKind::Write => write,
        // Traverse is the directory-descent form of execute; both test the
        // same bit.
        AccessKind::Execute | AccessKind::Traverse => exec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(mode: u32) -> PermissionBits {
        PermissionBits::from_bits(mode).unwrap()
    }

    #[test]
    fn root_is_always_allowed() {
        let ctx = SecurityContext::new(0, 0);
        let perms = bits(0o000);
        for access in [
            AccessKind::Read,
            AccessKind::Write,
            AccessKind::Execute,
            AccessKind::Traverse,
        ] {
            assert!(can_access(perms, 1000, 1000, &ctx, access));
        }
    }

    #[test]
    fn owner_bits_apply_to_owner() {
        let ctx = SecurityContext::new(1000, 1000);
        let perms = bits(0o600);
        assert!(can_access(perms, 1000, 2000, &ctx, AccessKind::Read));
        assert!(can_access(perms, 1000, 2000, &ctx, AccessKind::Write));
        assert!(!can_access(perms, 1000, 2000, &ctx, AccessKind::Execute));
    }

    #[test]
    fn group_bits_apply_to_members() {
        let principal = crate::types::Principal::with_groups(1000, 100, vec![100, 50]);
        let ctx = SecurityContext::from_principal(&principal);
        let perms = bits(0o640);
        // Not the owner, but gid 50 is a supplementary group.
        assert!(can_access(perms, 2000, 50, &ctx, AccessKind::Read));
        assert!(!can_access(perms, 2000, 50, &ctx, AccessKind::Write));
    }

    #[test]
    fn other_bits_apply_to_strangers() {
        let ctx = SecurityContext::new(1000, 1000);
        let perms = bits(0o604);
        assert!(can_access(perms, 2000, 2000, &ctx, AccessKind::Read));
        assert!(!can_access(perms, 2000, 2000, &ctx, AccessKind::Write));
    }

    #[test]
    fn owner_class_wins_even_when_more_restrictive() {
        // Owner with 0o077: owner bits deny even though group/other allow.
        let ctx = SecurityContext::new(1000, 1000);
        let perms = bits(0o077);
        assert!(!can_access(perms, 1000, 1000, &ctx, AccessKind::Read));
    }

    #[test]
    fn traverse_requires_execute_bit() {
        let ctx = SecurityContext::new(1000, 1000);
        assert!(can_access(bits(0o711), 1000, 1000, &ctx, AccessKind::Traverse));
        assert!(!can_access(bits(0o600), 1000, 1000, &ctx, AccessKind::Traverse));
    }

    #[test]
    fn class_allows_has_no_root_shortcut() {
        let root = SecurityContext::new(0, 0);
        assert!(!class_allows(bits(0o000), 0, 0, &root, AccessKind::Read));
        assert!(can_access(bits(0o000), 0, 0, &root, AccessKind::Read));
    }

    #[test]
    fn elevated_context_uses_effective_ids() {
        let mut ctx = SecurityContext::new(1000, 1000);
        let perms = bits(0o600);
        assert!(!can_access(perms, 2000, 2000, &ctx, AccessKind::Read));
        ctx.push_elevation(2000, 2000);
        assert!(can_access(perms, 2000, 2000, &ctx, AccessKind::Read));
        ctx.pop_elevation().unwrap();
        assert!(!can_access(perms, 2000, 2000, &ctx, AccessKind::Read));
    }
}
