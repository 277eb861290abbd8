// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-principal umask management.
//!
//! Masks are stored per uid with a process-wide default slot. Lookup falls
//! back from the per-uid entry to the default entry to the hardcoded 0o022.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{FsError, FsResult};
use crate::types::PermissionBits;

/// Base permissions requested for a new file before the umask is applied.
pub const FILE_BASE_MODE: u32 = 0o666;
/// Base permissions requested for a new directory before the umask is applied.
pub const DIR_BASE_MODE: u32 = 0o777;
/// Mask used when neither a per-uid nor a default entry is configured.
pub const FALLBACK_UMASK: u32 = 0o022;

/// Registry of per-principal default-permission masks.
pub struct UmaskManager {
    masks: RwLock<HashMap<u32, u32>>,
    default_mask: RwLock<Option<u32>>,
}

impl UmaskManager {
    pub fn new() -> Self {
        Self {
            masks: RwLock::new(HashMap::new()),
            default_mask: RwLock::new(None),
        }
    }

    /// The mask in effect for `uid`.
    pub fn get(&self, uid: u32) -> u32 {
        if let Some(mask) = self.masks.read().unwrap().get(&uid) {
            return *mask;
        }
        self.default_mask.read().unwrap().unwrap_or(FALLBACK_UMASK)
    }

    /// Set the mask for `uid`. Masks cover only the rwx bits.
    pub fn set(&self, uid: u32, mask: u32) -> FsResult<()> {
        if mask & !0o777 != 0 {
            return Err(FsError::InvalidPermissionValue);
        }
        self.masks.write().unwrap().insert(uid, mask);
        Ok(())
    }

    /// Set the process-wide default mask used when no per-uid entry exists.
    pub fn set_default(&self, mask: u32) -> FsResult<()> {
        if mask & !0o777 != 0 {
            return Err(FsError::InvalidPermissionValue);
        }
        *self.default_mask.write().unwrap() = Some(mask);
        Ok(())
    }

    /// Drop the per-uid entry, restoring the fallback chain.
    pub fn reset(&self, uid: u32) {
        self.masks.write().unwrap().remove(&uid);
    }

    /// `requested & !mask` for the given uid. Special bits pass through.
    pub fn apply(&self, uid: u32, requested: PermissionBits) -> PermissionBits {
        requested.masked(self.get(uid))
    }
}

impl Default for UmaskManager {
    fn default() -> Self {
        Self::new()
    }
}
