// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Virtual filesystem facade for simfs Core.
//!
//! `VfsCore` owns the node table and sequences every mutating operation in a
//! fixed order: standard permission check, special-bit guard, mutation,
//! SetGID inheritance (for creations), audit event, quota delta. A failure in
//! the first two steps short-circuits before anything mutates; collaborator
//! failures after the mutation are reported and never rolled back.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::audit::{AuditEvent, AuditEventType, AuditSink, Severity, TracingAuditSink};
use crate::config::FsConfig;
use crate::context::SecurityContext;
use crate::error::{FsError, FsResult};
use crate::perms;
use crate::quota::{QuotaService, QuotaStatus};
use crate::special;
use crate::storage::{InMemoryBackend, StorageBackend};
use crate::types::{
    AccessKind, Attributes, ContentId, DirEntry, FileTimes, PermissionBits, Principal,
};
#[cfg(feature = "events")]
use crate::types::{EventKind, EventSink, SubscriptionId};
use crate::umask::{UmaskManager, DIR_BASE_MODE, FILE_BASE_MODE};

/// Internal node ID for filesystem nodes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u64);

/// Filesystem node kinds
#[derive(Clone, Debug)]
enum NodeKind {
    File { content: ContentId, size: u64 },
    Directory { children: HashMap<String, NodeId> },
}

/// A node in the tree: type tag, ownership, permission bits, timestamps.
#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    uid: u32,
    gid: u32,
    perms: PermissionBits,
    times: FileTimes,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::File { size, .. } => *size,
            NodeKind::Directory { .. } => 0,
        }
    }
}

/// The virtual filesystem facade.
///
/// Shared across concurrent callers (`Send + Sync`); the node-table mutex
/// serializes structural mutations, which subsumes the per-parent-directory
/// exclusion needed so concurrent creations under a SetGID directory cannot
/// race on group assignment. Security contexts are per-operation values owned
/// by callers and are never stored here.
pub struct VfsCore {
    config: FsConfig,
    nodes: Mutex<HashMap<NodeId, Node>>,
    next_node_id: Mutex<u64>,
    root_id: NodeId,
    principals: Mutex<HashMap<u32, Principal>>,
    umasks: UmaskManager,
    storage: Arc<dyn StorageBackend>,
    audit: Arc<dyn AuditSink>,
    quota: Option<Arc<dyn QuotaService>>,
    #[cfg(feature = "events")]
    event_subscriptions: Mutex<HashMap<SubscriptionId, Arc<dyn EventSink>>>,
    #[cfg(feature = "events")]
    next_subscription_id: Mutex<u64>,
}

impl VfsCore {
    /// Create a facade with in-memory storage, the tracing audit sink, and no
    /// quota service.
    pub fn new(config: FsConfig) -> FsResult<Self> {
        Self::with_collaborators(
            config,
            Arc::new(InMemoryBackend::new()),
            Arc::new(TracingAuditSink),
            None,
        )
    }

    /// Create a facade with explicit collaborators.
    pub fn with_collaborators(
        config: FsConfig,
        storage: Arc<dyn StorageBackend>,
        audit: Arc<dyn AuditSink>,
        quota: Option<Arc<dyn QuotaService>>,
    ) -> FsResult<Self> {
        let core = Self {
            config,
            nodes: Mutex::new(HashMap::new()),
            next_node_id: Mutex::new(1),
            root_id: NodeId(0),
            principals: Mutex::new(HashMap::new()),
            umasks: UmaskManager::new(),
            storage,
            audit,
            quota,
            #[cfg(feature = "events")]
            event_subscriptions: Mutex::new(HashMap::new()),
            #[cfg(feature = "events")]
            next_subscription_id: Mutex::new(1),
        };
        core.create_root_directory();
        Ok(core)
    }

    fn create_root_directory(&self) {
        let now = Self::current_timestamp();
        let root = Node {
            kind: NodeKind::Directory {
                children: HashMap::new(),
            },
            uid: self.config.security.default_uid,
            gid: self.config.security.default_gid,
            perms: PermissionBits::from_bits_truncate(0o755),
            times: FileTimes {
                atime: now,
                mtime: now,
                ctime: now,
                birthtime: now,
            },
        };
        self.nodes.lock().unwrap().insert(self.root_id, root);
    }

    fn allocate_node_id(&self) -> NodeId {
        let mut next_id = self.next_node_id.lock().unwrap();
        let id = NodeId(*next_id);
        *next_id += 1;
        id
    }

    fn current_timestamp() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
    }

    // Principals ------------------------------------------------------------

    /// Register (or replace) the identity for a uid.
    pub fn register_principal(&self, principal: Principal) {
        self.principals.lock().unwrap().insert(principal.uid, principal);
    }

    /// Build a fresh per-operation security context for a registered uid.
    pub fn context_for(&self, uid: u32) -> FsResult<SecurityContext> {
        let principals = self.principals.lock().unwrap();
        let principal = principals.get(&uid).ok_or(FsError::NotFound)?;
        Ok(SecurityContext::from_principal(principal))
    }

    // Permission plumbing ---------------------------------------------------

    fn allows(
        &self,
        perms: PermissionBits,
        owner_uid: u32,
        owner_gid: u32,
        ctx: &SecurityContext,
        access: AccessKind,
    ) -> bool {
        if !self.config.security.enforce_permissions {
            return true;
        }
        if ctx.is_root() && self.config.security.root_bypass_permissions {
            return true;
        }
        perms::class_allows(perms, owner_uid, owner_gid, ctx, access)
    }

    fn node_allows(&self, node: &Node, ctx: &SecurityContext, access: AccessKind) -> bool {
        self.allows(node.perms, node.uid, node.gid, ctx, access)
    }

    /// Split a path into its name components. `.` is dropped, `..` is
    /// rejected so a path can never climb out of the directory its checks
    /// ran against.
    fn normalize(path: &Path) -> FsResult<Vec<String>> {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::RootDir | std::path::Component::CurDir => {}
                std::path::Component::Normal(s) => {
                    components.push(s.to_str().ok_or(FsError::InvalidName)?.to_string());
                }
                std::path::Component::ParentDir | std::path::Component::Prefix(_) => {
                    return Err(FsError::InvalidArgument);
                }
            }
        }
        Ok(components)
    }

    /// Resolve a path to its node, enforcing the traverse bit on every
    /// directory descended through.
    fn resolve(&self, ctx: &SecurityContext, path: &Path) -> FsResult<NodeId> {
        let components = Self::normalize(path)?;
        let nodes = self.nodes.lock().unwrap();
        let mut current = self.root_id;
        for name in &components {
            let node = nodes.get(&current).ok_or(FsError::NotFound)?;
            if !self.node_allows(node, ctx, AccessKind::Traverse) {
                return Err(FsError::PermissionDenied);
            }
            match &node.kind {
                NodeKind::Directory { children } => {
                    current = *children.get(name).ok_or(FsError::NotFound)?;
                }
                NodeKind::File { .. } => return Err(FsError::NotADirectory),
            }
        }
        Ok(current)
    }

    fn resolve_parent(&self, ctx: &SecurityContext, path: &Path) -> FsResult<(NodeId, String)> {
        let parent_path = path.parent().ok_or(FsError::InvalidArgument)?;
        let name = path.file_name().and_then(|n| n.to_str()).ok_or(FsError::InvalidName)?;
        let parent_id = self.resolve(ctx, parent_path)?;
        Ok((parent_id, name.to_string()))
    }

    fn ensure_parent_allows_creation(
        &self,
        ctx: &SecurityContext,
        parent_id: NodeId,
    ) -> FsResult<()> {
        let nodes = self.nodes.lock().unwrap();
        let parent = nodes.get(&parent_id).ok_or(FsError::NotFound)?;
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !self.node_allows(parent, ctx, AccessKind::Write)
            || !self.node_allows(parent, ctx, AccessKind::Traverse)
        {
            return Err(FsError::PermissionDenied);
        }
        Ok(())
    }

    // Collaborator plumbing -------------------------------------------------

    fn dispatch_audit(&self, event: AuditEvent) {
        if let Err(err) = self.audit.log(event) {
            tracing::warn!(%err, "audit sink failed; file operation unaffected");
        }
    }

    fn audit_result<T>(
        &self,
        ctx: &SecurityContext,
        event_type: AuditEventType,
        path: &Path,
        operation: &str,
        result: &FsResult<T>,
    ) {
        let (event_type, success, severity, message) = match result {
            Ok(_) => (event_type, true, Severity::Info, "ok".to_string()),
            Err(FsError::PermissionDenied) => {
                (event_type, false, Severity::Low, "permission denied".to_string())
            }
            Err(FsError::UntrustedElevationTarget) => (
                AuditEventType::SecurityViolation,
                false,
                Severity::High,
                "untrusted elevation target".to_string(),
            ),
            Err(FsError::InvariantViolation(msg)) => (
                AuditEventType::SecurityViolation,
                false,
                Severity::Critical,
                msg.clone(),
            ),
            Err(FsError::QuotaExceeded) => {
                (AuditEventType::Quota, false, Severity::Medium, "quota exceeded".to_string())
            }
            Err(err) => (event_type, false, Severity::Info, err.to_string()),
        };
        self.dispatch_audit(AuditEvent {
            uid: ctx.effective_uid(),
            event_type,
            severity,
            path: path.display().to_string(),
            operation: operation.to_string(),
            success,
            message,
        });
    }

    /// Pre-write quota gate. Hard limit denies; soft limit warns and admits;
    /// a service error fails closed.
    fn check_quota(&self, ctx: &SecurityContext, path: &Path, additional: u64) -> FsResult<()> {
        let Some(quota) = &self.quota else {
            return Ok(());
        };
        match quota.check(ctx.effective_uid(), additional) {
            QuotaStatus::BelowLimit => Ok(()),
            QuotaStatus::AboveSoftLimit => {
                tracing::warn!(
                    uid = ctx.effective_uid(),
                    path = %path.display(),
                    additional,
                    "soft quota limit exceeded"
                );
                self.dispatch_audit(AuditEvent {
                    uid: ctx.effective_uid(),
                    event_type: AuditEventType::Quota,
                    severity: Severity::Medium,
                    path: path.display().to_string(),
                    operation: "write".to_string(),
                    success: true,
                    message: "above soft quota limit".to_string(),
                });
                Ok(())
            }
            QuotaStatus::AboveHardLimit | QuotaStatus::Error => Err(FsError::QuotaExceeded),
        }
    }

    fn report_usage(&self, ctx: &SecurityContext, delta_bytes: i64) {
        if delta_bytes == 0 {
            return;
        }
        if let Some(quota) = &self.quota {
            quota.record_usage(ctx.effective_uid(), delta_bytes);
        }
    }

    #[cfg(feature = "events")]
    fn emit_event(&self, event: EventKind) {
        if !self.config.track_events {
            return;
        }
        let subscriptions = self.event_subscriptions.lock().unwrap();
        for sink in subscriptions.values() {
            sink.on_event(&event);
        }
    }

    #[cfg(feature = "events")]
    pub fn subscribe_events(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        let mut next_id = self.next_subscription_id.lock().unwrap();
        let id = SubscriptionId::new(*next_id);
        *next_id += 1;
        self.event_subscriptions.lock().unwrap().insert(id, sink);
        id
    }

    #[cfg(feature = "events")]
    pub fn unsubscribe_events(&self, id: SubscriptionId) {
        self.event_subscriptions.lock().unwrap().remove(&id);
    }

    // Umask surface ---------------------------------------------------------

    pub fn get_umask(&self, uid: u32) -> u32 {
        self.umasks.get(uid)
    }

    pub fn set_umask(&self, uid: u32, mask: u32) -> FsResult<()> {
        self.umasks.set(uid, mask)
    }

    pub fn set_default_umask(&self, mask: u32) -> FsResult<()> {
        self.umasks.set_default(mask)
    }

    pub fn apply_umask(&self, uid: u32, requested: PermissionBits) -> PermissionBits {
        self.umasks.apply(uid, requested)
    }

    // Query surface ---------------------------------------------------------

    /// Whether the context may perform `access` on the node at `path`.
    pub fn can_access(
        &self,
        ctx: &SecurityContext,
        path: &Path,
        access: AccessKind,
    ) -> FsResult<bool> {
        let node_id = self.resolve(ctx, path)?;
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&node_id).ok_or(FsError::NotFound)?;
        Ok(self.node_allows(node, ctx, access))
    }

    /// Whether the sticky-bit guard permits the context to remove or rename
    /// `name` inside the directory at `dir_path`.
    pub fn check_sticky_permission(
        &self,
        ctx: &SecurityContext,
        dir_path: &Path,
        name: &str,
    ) -> FsResult<bool> {
        let dir_id = self.resolve(ctx, dir_path)?;
        let nodes = self.nodes.lock().unwrap();
        let dir = nodes.get(&dir_id).ok_or(FsError::NotFound)?;
        let NodeKind::Directory { children } = &dir.kind else {
            return Err(FsError::NotADirectory);
        };
        let child_id = children.get(name).ok_or(FsError::NotFound)?;
        let child = nodes.get(child_id).ok_or(FsError::NotFound)?;
        if !self.config.security.enforce_permissions {
            return Ok(true);
        }
        Ok(special::sticky_allows(dir.perms, dir.uid, child.uid, ctx))
    }

    pub fn getattr(&self, ctx: &SecurityContext, path: &Path) -> FsResult<Attributes> {
        let node_id = self.resolve(ctx, path)?;
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&node_id).ok_or(FsError::NotFound)?;
        Ok(Attributes {
            len: node.size(),
            times: node.times,
            uid: node.uid,
            gid: node.gid,
            is_dir: node.is_dir(),
            perms: node.perms,
        })
    }

    pub fn read_dir(&self, ctx: &SecurityContext, path: &Path) -> FsResult<Vec<DirEntry>> {
        let node_id = self.resolve(ctx, path)?;
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(&node_id).ok_or(FsError::NotFound)?;
        let NodeKind::Directory { children } = &node.kind else {
            return Err(FsError::NotADirectory);
        };
        if !self.node_allows(node, ctx, AccessKind::Read) {
            return Err(FsError::PermissionDenied);
        }
        let mut entries: Vec<DirEntry> = children
            .iter()
            .filter_map(|(name, id)| {
                nodes.get(id).map(|child| DirEntry {
                    name: name.clone(),
                    is_dir: child.is_dir(),
                    len: child.size(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    // Mutating operations ---------------------------------------------------

    /// Create a directory. `mode` is the requested permissions before the
    /// creator's umask is applied.
    pub fn mkdir(&self, ctx: &SecurityContext, path: &Path, mode: u32) -> FsResult<()> {
        let result = self.create_node(ctx, path, mode, true);
        self.audit_result(ctx, AuditEventType::Create, path, "mkdir", &result);
        result
    }

    /// Create a directory with the standard base mode (0777 before umask).
    pub fn mkdir_default(&self, ctx: &SecurityContext, path: &Path) -> FsResult<()> {
        self.mkdir(ctx, path, DIR_BASE_MODE)
    }

    /// Create an empty file. `mode` is the requested permissions before the
    /// creator's umask is applied.
    pub fn create(&self, ctx: &SecurityContext, path: &Path, mode: u32) -> FsResult<()> {
        let result = self.create_node(ctx, path, mode, false);
        self.audit_result(ctx, AuditEventType::Create, path, "create", &result);
        result
    }

    /// Create a file with the standard base mode (0666 before umask).
    pub fn create_default(&self, ctx: &SecurityContext, path: &Path) -> FsResult<()> {
        self.create(ctx, path, FILE_BASE_MODE)
    }

    fn create_node(
        &self,
        ctx: &SecurityContext,
        path: &Path,
        mode: u32,
        is_dir: bool,
    ) -> FsResult<()> {
        let requested = PermissionBits::from_bits(mode)?;
        let (parent_id, name) = self.resolve_parent(ctx, path)?;
        self.ensure_parent_allows_creation(ctx, parent_id)?;

        let effective = self.umasks.apply(ctx.effective_uid(), requested);
        let now = Self::current_timestamp();
        let node_id = self.allocate_node_id();

        {
            let mut nodes = self.nodes.lock().unwrap();
            let parent = nodes.get(&parent_id).ok_or(FsError::NotFound)?;
            let (parent_gid, parent_perms) = (parent.gid, parent.perms);
            match &parent.kind {
                NodeKind::Directory { children } => {
                    if children.contains_key(&name) {
                        return Err(FsError::AlreadyExists);
                    }
                }
                NodeKind::File { .. } => return Err(FsError::NotADirectory),
            }

            let kind = if is_dir {
                NodeKind::Directory {
                    children: HashMap::new(),
                }
            } else {
                let content = self.storage.allocate(&[])?;
                NodeKind::File { content, size: 0 }
            };

            let mut node = Node {
                kind,
                uid: ctx.effective_uid(),
                gid: ctx.effective_gid(),
                perms: effective,
                times: FileTimes {
                    atime: now,
                    mtime: now,
                    ctime: now,
                    birthtime: now,
                },
            };
            // SetGID inheritance runs inside the same table lock so a
            // concurrent creation can never observe the uninherited group.
            if let Some((gid, perms)) =
                special::inherit_group(parent_perms, parent_gid, is_dir, node.gid, node.perms)
            {
                node.gid = gid;
                node.perms = perms;
            }
            nodes.insert(node_id, node);
            if let Some(parent) = nodes.get_mut(&parent_id) {
                if let NodeKind::Directory { children } = &mut parent.kind {
                    children.insert(name, node_id);
                    parent.times.mtime = now;
                }
            }
        }

        #[cfg(feature = "events")]
        self.emit_event(EventKind::Created {
            path: path.to_string_lossy().to_string(),
            uid: ctx.effective_uid(),
            is_dir,
        });
        Ok(())
    }

    /// Write `data` at `offset`, growing the file if needed. Growth is
    /// admitted by the quota service before any byte is stored.
    pub fn write(
        &self,
        ctx: &SecurityContext,
        path: &Path,
        offset: u64,
        data: &[u8],
    ) -> FsResult<usize> {
        let result = self.write_inner(ctx, path, offset, data);
        self.audit_result(ctx, AuditEventType::Access, path, "write", &result);
        result
    }

    fn write_inner(
        &self,
        ctx: &SecurityContext,
        path: &Path,
        offset: u64,
        data: &[u8],
    ) -> FsResult<usize> {
        let node_id = self.resolve(ctx, path)?;
        let (content, old_size) = {
            let nodes = self.nodes.lock().unwrap();
            let node = nodes.get(&node_id).ok_or(FsError::NotFound)?;
            if !self.node_allows(node, ctx, AccessKind::Write) {
                return Err(FsError::PermissionDenied);
            }
            match &node.kind {
                NodeKind::File { content, size } => (*content, *size),
                NodeKind::Directory { .. } => return Err(FsError::IsADirectory),
            }
        };

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::InvalidArgument)?;
        if end > old_size {
            self.check_quota(ctx, path, end - old_size)?;
        }

        let written = self.storage.write(content, offset, data)?;

        // The reported delta is measured against the size at update time, not
        // the pre-check snapshot, so concurrent growers never double-count.
        let delta = {
            let mut nodes = self.nodes.lock().unwrap();
            let mut grown = 0u64;
            if let Some(node) = nodes.get_mut(&node_id) {
                if let NodeKind::File { size, .. } = &mut node.kind {
                    if end > *size {
                        grown = end - *size;
                        *size = end;
                    }
                }
                node.times.mtime = Self::current_timestamp();
            }
            grown
        };

        #[cfg(feature = "events")]
        self.emit_event(EventKind::Modified {
            path: path.to_string_lossy().to_string(),
            uid: ctx.effective_uid(),
        });
        self.report_usage(ctx, delta as i64);
        Ok(written)
    }

    pub fn read(
        &self,
        ctx: &SecurityContext,
        path: &Path,
        offset: u64,
        buf: &mut [u8],
    ) -> FsResult<usize> {
        let node_id = self.resolve(ctx, path)?;
        let content = {
            let mut nodes = self.nodes.lock().unwrap();
            let node = nodes.get_mut(&node_id).ok_or(FsError::NotFound)?;
            if !self.allows(node.perms, node.uid, node.gid, ctx, AccessKind::Read) {
                return Err(FsError::PermissionDenied);
            }
            match &node.kind {
                NodeKind::File { content, .. } => {
                    let content = *content;
                    node.times.atime = Self::current_timestamp();
                    content
                }
                NodeKind::Directory { .. } => return Err(FsError::IsADirectory),
            }
        };
        self.storage.read(content, offset, buf)
    }

    /// Remove a file or an empty directory.
    pub fn remove(&self, ctx: &SecurityContext, path: &Path) -> FsResult<()> {
        let result = self.remove_inner(ctx, path);
        self.audit_result(ctx, AuditEventType::Delete, path, "remove", &result);
        result
    }

    fn remove_inner(&self, ctx: &SecurityContext, path: &Path) -> FsResult<()> {
        let (parent_id, name) = self.resolve_parent(ctx, path)?;

        // Checks and unlink share one critical section; nothing can slip a
        // new entry into the directory between the emptiness test and the
        // removal.
        let (child_content, child_size) = {
            let mut nodes = self.nodes.lock().unwrap();
            let parent = nodes.get(&parent_id).ok_or(FsError::NotFound)?;
            let NodeKind::Directory { children } = &parent.kind else {
                return Err(FsError::NotADirectory);
            };
            let child_id = *children.get(&name).ok_or(FsError::NotFound)?;
            let child = nodes.get(&child_id).ok_or(FsError::NotFound)?;

            // Standard permission first, then the sticky guard on top.
            if !self.node_allows(parent, ctx, AccessKind::Write)
                || !self.node_allows(parent, ctx, AccessKind::Traverse)
            {
                return Err(FsError::PermissionDenied);
            }
            if self.config.security.enforce_permissions
                && !special::sticky_allows(parent.perms, parent.uid, child.uid, ctx)
            {
                tracing::warn!(
                    uid = ctx.effective_uid(),
                    path = %path.display(),
                    "sticky bit denies removal"
                );
                return Err(FsError::PermissionDenied);
            }

            let (content, size) = match &child.kind {
                NodeKind::Directory { children } => {
                    if !children.is_empty() {
                        return Err(FsError::DirectoryNotEmpty);
                    }
                    (None, 0)
                }
                NodeKind::File { content, size } => (Some(*content), *size),
            };

            if let Some(parent) = nodes.get_mut(&parent_id) {
                if let NodeKind::Directory { children } = &mut parent.kind {
                    children.remove(&name);
                    parent.times.mtime = Self::current_timestamp();
                }
            }
            nodes.remove(&child_id);
            (content, size)
        };
        if let Some(content) = child_content {
            self.storage.remove(content)?;
        }

        #[cfg(feature = "events")]
        self.emit_event(EventKind::Removed {
            path: path.to_string_lossy().to_string(),
            uid: ctx.effective_uid(),
        });
        self.report_usage(ctx, -(child_size as i64));
        Ok(())
    }

    /// Rename/move a node. The destination must not already exist; the
    /// sticky-bit guard applies to the entry being moved out of its source
    /// directory.
    pub fn rename(&self, ctx: &SecurityContext, from: &Path, to: &Path) -> FsResult<()> {
        let result = self.rename_inner(ctx, from, to);
        self.audit_result(ctx, AuditEventType::Rename, from, "rename", &result);
        result
    }

    fn rename_inner(&self, ctx: &SecurityContext, from: &Path, to: &Path) -> FsResult<()> {
        let from_parts = Self::normalize(from)?;
        let to_parts = Self::normalize(to)?;
        // Renaming a path onto itself is a successful no-op once the source
        // resolves.
        if from_parts == to_parts {
            self.resolve(ctx, from)?;
            return Ok(());
        }
        // The tree must stay a tree: a directory cannot move under itself.
        if to_parts.starts_with(&from_parts) {
            return Err(FsError::InvalidArgument);
        }
        let (src_parent_id, src_name) = self.resolve_parent(ctx, from)?;
        let (dst_parent_id, dst_name) = self.resolve_parent(ctx, to)?;

        // Checks and relink share one critical section so the destination
        // cannot gain a competing entry between the existence test and the
        // insert.
        {
            let mut nodes = self.nodes.lock().unwrap();
            let src_parent = nodes.get(&src_parent_id).ok_or(FsError::NotFound)?;
            let NodeKind::Directory { children } = &src_parent.kind else {
                return Err(FsError::NotADirectory);
            };
            let child_id = *children.get(&src_name).ok_or(FsError::NotFound)?;
            let child = nodes.get(&child_id).ok_or(FsError::NotFound)?;

            if !self.node_allows(src_parent, ctx, AccessKind::Write)
                || !self.node_allows(src_parent, ctx, AccessKind::Traverse)
            {
                return Err(FsError::PermissionDenied);
            }
            if self.config.security.enforce_permissions
                && !special::sticky_allows(src_parent.perms, src_parent.uid, child.uid, ctx)
            {
                tracing::warn!(
                    uid = ctx.effective_uid(),
                    path = %from.display(),
                    "sticky bit denies rename"
                );
                return Err(FsError::PermissionDenied);
            }

            let dst_parent = nodes.get(&dst_parent_id).ok_or(FsError::NotFound)?;
            let NodeKind::Directory { children } = &dst_parent.kind else {
                return Err(FsError::NotADirectory);
            };
            if !self.node_allows(dst_parent, ctx, AccessKind::Write)
                || !self.node_allows(dst_parent, ctx, AccessKind::Traverse)
            {
                return Err(FsError::PermissionDenied);
            }
            if children.contains_key(&dst_name) {
                return Err(FsError::AlreadyExists);
            }

            let now = Self::current_timestamp();
            if let Some(src_parent) = nodes.get_mut(&src_parent_id) {
                if let NodeKind::Directory { children } = &mut src_parent.kind {
                    children.remove(&src_name);
                    src_parent.times.mtime = now;
                }
            }
            if let Some(dst_parent) = nodes.get_mut(&dst_parent_id) {
                if let NodeKind::Directory { children } = &mut dst_parent.kind {
                    children.insert(dst_name, child_id);
                    dst_parent.times.mtime = now;
                }
            }
            if let Some(child) = nodes.get_mut(&child_id) {
                child.times.ctime = now;
            }
        }

        #[cfg(feature = "events")]
        self.emit_event(EventKind::Renamed {
            from: from.to_string_lossy().to_string(),
            to: to.to_string_lossy().to_string(),
            uid: ctx.effective_uid(),
        });
        Ok(())
    }

    /// Change a node's permission bits. Only the owner or root may do so.
    ///
    /// Setting SetUID here is not gated on the trusted-path list; trust is
    /// checked at execution time instead.
    pub fn set_mode(&self, ctx: &SecurityContext, path: &Path, mode: u32) -> FsResult<()> {
        let result = self.set_mode_inner(ctx, path, mode);
        self.audit_result(ctx, AuditEventType::Access, path, "set_mode", &result);
        result
    }

    fn set_mode_inner(&self, ctx: &SecurityContext, path: &Path, mode: u32) -> FsResult<()> {
        let requested = PermissionBits::from_bits(mode)?;
        let node_id = self.resolve(ctx, path)?;
        {
            let mut nodes = self.nodes.lock().unwrap();
            let node = nodes.get_mut(&node_id).ok_or(FsError::NotFound)?;
            if self.config.security.enforce_permissions
                && !ctx.is_root()
                && ctx.effective_uid() != node.uid
            {
                return Err(FsError::PermissionDenied);
            }
            node.perms = requested;
            node.times.ctime = Self::current_timestamp();
        }
        #[cfg(feature = "events")]
        self.emit_event(EventKind::Modified {
            path: path.to_string_lossy().to_string(),
            uid: ctx.effective_uid(),
        });
        Ok(())
    }

    /// Change ownership. Only root may change the owner uid; the owner may
    /// change the gid to a group they belong to. SetUID/SetGID are cleared on
    /// any ownership change.
    pub fn set_owner(
        &self,
        ctx: &SecurityContext,
        path: &Path,
        uid: u32,
        gid: u32,
    ) -> FsResult<()> {
        let result = self.set_owner_inner(ctx, path, uid, gid);
        self.audit_result(ctx, AuditEventType::Access, path, "set_owner", &result);
        result
    }

    fn set_owner_inner(
        &self,
        ctx: &SecurityContext,
        path: &Path,
        uid: u32,
        gid: u32,
    ) -> FsResult<()> {
        let node_id = self.resolve(ctx, path)?;
        {
            let mut nodes = self.nodes.lock().unwrap();
            let node = nodes.get_mut(&node_id).ok_or(FsError::NotFound)?;
            if self.config.security.enforce_permissions && !ctx.is_root() {
                // Non-root callers must own the node, even for a no-op.
                if ctx.effective_uid() != node.uid {
                    return Err(FsError::PermissionDenied);
                }
                if uid != node.uid {
                    return Err(FsError::PermissionDenied);
                }
                if gid != node.gid && !ctx.is_member(gid) {
                    return Err(FsError::PermissionDenied);
                }
            }
            let ownership_changed = uid != node.uid || gid != node.gid;
            node.uid = uid;
            node.gid = gid;
            if ownership_changed {
                node.perms = node.perms.without_set_id_bits();
            }
            node.times.ctime = Self::current_timestamp();
        }
        #[cfg(feature = "events")]
        self.emit_event(EventKind::Modified {
            path: path.to_string_lossy().to_string(),
            uid: ctx.effective_uid(),
        });
        Ok(())
    }

    /// Execute the node at `path` under the caller's context, applying
    /// SetUID/SetGID elevation around the payload. The prior effective ids
    /// are restored on every exit path, including payload failure.
    pub fn execute<T>(
        &self,
        ctx: &mut SecurityContext,
        path: &Path,
        payload: impl FnOnce(&mut SecurityContext) -> FsResult<T>,
    ) -> FsResult<T> {
        let result = self.execute_inner(ctx, path, payload);
        self.audit_result(ctx, AuditEventType::Execute, path, "execute", &result);
        result
    }

    fn execute_inner<T>(
        &self,
        ctx: &mut SecurityContext,
        path: &Path,
        payload: impl FnOnce(&mut SecurityContext) -> FsResult<T>,
    ) -> FsResult<T> {
        let node_id = self.resolve(ctx, path)?;
        let (perms, owner_uid, owner_gid) = {
            let nodes = self.nodes.lock().unwrap();
            let node = nodes.get(&node_id).ok_or(FsError::NotFound)?;
            if node.is_dir() {
                return Err(FsError::IsADirectory);
            }
            if !self.node_allows(node, ctx, AccessKind::Execute) {
                return Err(FsError::PermissionDenied);
            }
            (node.perms, node.uid, node.gid)
        };

        match special::elevation_for_exec(
            perms,
            owner_uid,
            owner_gid,
            path,
            ctx,
            &self.config.security,
        )? {
            None => payload(ctx),
            Some((euid, egid)) => {
                self.dispatch_audit(AuditEvent {
                    uid: ctx.effective_uid(),
                    event_type: AuditEventType::Elevation,
                    severity: Severity::Info,
                    path: path.display().to_string(),
                    operation: "execute".to_string(),
                    success: true,
                    message: format!("elevating to uid {} gid {}", euid, egid),
                });
                ctx.with_elevation(euid, egid, payload)
            }
        }
    }
}
