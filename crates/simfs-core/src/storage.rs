// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Storage backend for file content.
//!
//! The permission engine never touches bytes directly; after authorization it
//! calls through this seam. Only an in-memory backend ships with the core.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::types::ContentId;

/// Content storage primitives the facade calls after authorization succeeds.
pub trait StorageBackend: Send + Sync {
    fn allocate(&self, initial: &[u8]) -> FsResult<ContentId>;
    fn read(&self, id: ContentId, offset: u64, buf: &mut [u8]) -> FsResult<usize>;
    fn write(&self, id: ContentId, offset: u64, data: &[u8]) -> FsResult<usize>;
    fn truncate(&self, id: ContentId, new_len: u64) -> FsResult<()>;
    fn len(&self, id: ContentId) -> FsResult<u64>;
    fn remove(&self, id: ContentId) -> FsResult<()>;
}

/// In-memory storage backend implementation
pub struct InMemoryBackend {
    next_id: Mutex<u64>,
    data: Mutex<HashMap<ContentId, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            data: Mutex::new(HashMap::new()),
        }
    }

    fn get_next_id(&self) -> ContentId {
        let mut next_id = self.next_id.lock().unwrap();
        let id = ContentId::new(*next_id);
        *next_id += 1;
        id
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryBackend {
    fn allocate(&self, initial: &[u8]) -> FsResult<ContentId> {
        let id = self.get_next_id();
        self.data.lock().unwrap().insert(id, initial.to_vec());
        Ok(id)
    }

    fn read(&self, id: ContentId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let data = self.data.lock().unwrap();
        let content = data.get(&id).ok_or(FsError::NotFound)?;

        let start = offset as usize;
        if start >= content.len() {
            return Ok(0);
        }
        let end = std::cmp::min(start + buf.len(), content.len());
        let bytes_to_copy = end - start;
        buf[..bytes_to_copy].copy_from_slice(&content[start..end]);
        Ok(bytes_to_copy)
    }

    fn write(&self, id: ContentId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let mut storage_data = self.data.lock().unwrap();
        let content = storage_data.get_mut(&id).ok_or(FsError::NotFound)?;

        let end = offset
            .checked_add(data.len() as u64)
            .and_then(|end| usize::try_from(end).ok())
            .ok_or(FsError::InvalidArgument)?;
        let start = end - data.len();
        if end > content.len() {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn truncate(&self, id: ContentId, new_len: u64) -> FsResult<()> {
        let mut storage_data = self.data.lock().unwrap();
        let content = storage_data.get_mut(&id).ok_or(FsError::NotFound)?;
        content.resize(new_len as usize, 0);
        Ok(())
    }

    fn len(&self, id: ContentId) -> FsResult<u64> {
        let data = self.data.lock().unwrap();
        let content = data.get(&id).ok_or(FsError::NotFound)?;
        Ok(content.len() as u64)
    }

    fn remove(&self, id: ContentId) -> FsResult<()> {
        self.data.lock().unwrap().remove(&id).ok_or(FsError::NotFound)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_write_read_round_trip() {
        let backend = InMemoryBackend::new();
        let id = backend.allocate(b"hello").unwrap();
        assert_eq!(backend.len(id).unwrap(), 5);

        backend.write(id, 5, b", world").unwrap();
        let mut buf = vec![0u8; 12];
        let n = backend.read(id, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello, world");
    }

    #[test]
    fn read_past_end_returns_zero() {
        let backend = InMemoryBackend::new();
        let id = backend.allocate(b"abc").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(backend.read(id, 10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn truncate_shrinks_and_zero_extends() {
        let backend = InMemoryBackend::new();
        let id = backend.allocate(b"abcdef").unwrap();
        backend.truncate(id, 3).unwrap();
        assert_eq!(backend.len(id).unwrap(), 3);
        backend.truncate(id, 5).unwrap();
        let mut buf = [0u8; 5];
        backend.read(id, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"abc\0\0");
    }

    #[test]
    fn write_at_overflowing_offset_is_rejected() {
        let backend = InMemoryBackend::new();
        let id = backend.allocate(b"abc").unwrap();
        assert!(matches!(
            backend.write(id, u64::MAX, b"x"),
            Err(FsError::InvalidArgument)
        ));
        assert!(matches!(
            backend.write(id, u64::MAX - 1, b"xy"),
            Err(FsError::InvalidArgument)
        ));
        // The rejected writes left the content untouched.
        assert_eq!(backend.len(id).unwrap(), 3);
    }

    #[test]
    fn remove_frees_content() {
        let backend = InMemoryBackend::new();
        let id = backend.allocate(b"x").unwrap();
        backend.remove(id).unwrap();
        assert!(matches!(backend.len(id), Err(FsError::NotFound)));
        assert!(matches!(backend.remove(id), Err(FsError::NotFound)));
    }
}
