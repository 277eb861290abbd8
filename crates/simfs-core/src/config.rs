// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for simfs Core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Security policy knobs for the permission engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Enforce permission bits on every operation. Disabling turns the
    /// engine into a plain tree store (used by some hosting layers during
    /// bring-up).
    pub enforce_permissions: bool,
    /// Allow uid 0 to bypass standard permission checks.
    pub root_bypass_permissions: bool,
    /// Owner of nodes created before any principal is registered (the root
    /// directory).
    pub default_uid: u32,
    pub default_gid: u32,
    /// Locations from which a SetUID executable may elevate to uid 0.
    /// Elevation to root from anywhere else fails closed.
    pub trusted_elevation_paths: Vec<PathBuf>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            enforce_permissions: true,
            root_bypass_permissions: true,
            default_uid: 0,
            default_gid: 0,
            trusted_elevation_paths: Vec::new(),
        }
    }
}

impl SecurityPolicy {
    /// Whether `path` is on the SetUID-to-root allow-list.
    pub fn is_trusted_elevation_path(&self, path: &std::path::Path) -> bool {
        self.trusted_elevation_paths.iter().any(|p| p == path)
    }
}

/// Top-level configuration for a [`crate::VfsCore`] instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FsConfig {
    pub security: SecurityPolicy,
    /// Emit change events to subscribed sinks.
    pub track_events: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            security: SecurityPolicy::default(),
            track_events: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_enforces_with_root_bypass() {
        let policy = SecurityPolicy::default();
        assert!(policy.enforce_permissions);
        assert!(policy.root_bypass_permissions);
        assert!(policy.trusted_elevation_paths.is_empty());
    }

    #[test]
    fn trusted_path_membership_is_exact() {
        let policy = SecurityPolicy {
            trusted_elevation_paths: vec![PathBuf::from("/sbin/passwd")],
            ..Default::default()
        };
        assert!(policy.is_trusted_elevation_path("/sbin/passwd".as_ref()));
        assert!(!policy.is_trusted_elevation_path("/sbin/passwd2".as_ref()));
        assert!(!policy.is_trusted_elevation_path("/sbin".as_ref()));
    }
}
