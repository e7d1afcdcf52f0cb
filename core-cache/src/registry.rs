//! # Download Registry
//!
//! In-memory bookkeeping of in-flight downloads: an active set of resources
//! plus, for each of them, the attempt id handed to the transport and the
//! latest [`DownloadState`].
//!
//! The registry is plain data. It is owned by the cache manager and only
//! mutated while the manager's state lock is held.

use std::collections::{HashMap, HashSet};

use bridge_traits::transport::TransferId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::format::{format_byte_count, format_optional_byte_count};
use crate::resource::ResourceRef;

/// Progress of one in-flight download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadState {
    /// Fraction in `[0.0, 1.0]`; unchanged while the total size is unknown.
    pub progress: f64,

    /// Bytes persisted so far (never negative).
    pub bytes_written: i64,

    /// Total size, `-1` (or `0`) when unknown.
    pub bytes_expected: i64,

    pub started_at: DateTime<Utc>,
}

impl DownloadState {
    /// Zeroed state for a freshly started download.
    pub fn new() -> Self {
        Self {
            progress: 0.0,
            bytes_written: 0,
            bytes_expected: -1,
            started_at: Utc::now(),
        }
    }

    /// Apply a progress report from the transport.
    ///
    /// Out-of-range values are clamped: negative written counts become `0`,
    /// expected sizes below `-1` become `-1`, and written never exceeds a
    /// known expected size.
    pub fn apply(&mut self, bytes_written: i64, bytes_expected: i64) {
        let expected = bytes_expected.max(-1);
        let mut written = bytes_written.max(0);
        if expected > 0 {
            written = written.min(expected);
            self.progress = (written as f64 / expected as f64).clamp(0.0, 1.0);
        }

        self.bytes_written = written;
        self.bytes_expected = expected;
    }

    pub fn is_size_known(&self) -> bool {
        self.bytes_expected > 0
    }

    /// `"written / expected"` with formatted byte counts.
    pub fn summary(&self) -> String {
        format!(
            "{} / {}",
            format_byte_count(self.bytes_written as u64),
            format_optional_byte_count(self.bytes_expected)
        )
    }
}

impl Default for DownloadState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    attempt: TransferId,
    state: DownloadState,
}

/// Mapping of in-flight resources to their attempt and progress.
#[derive(Debug, Default)]
pub struct DownloadRegistry {
    active: HashSet<ResourceRef>,
    entries: HashMap<ResourceRef, Entry>,
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource` under attempt `id` with a zeroed state.
    ///
    /// Returns `false` (and changes nothing) if it is already registered.
    pub fn begin(&mut self, resource: &ResourceRef, id: TransferId) -> bool {
        if !self.active.insert(resource.clone()) {
            return false;
        }
        self.entries.insert(
            resource.clone(),
            Entry {
                attempt: id,
                state: DownloadState::new(),
            },
        );
        self.debug_check();
        true
    }

    /// Apply progress for attempt `id`.
    ///
    /// Returns the updated state, or `None` when the event is stale (the
    /// resource is not registered or is registered under another attempt).
    pub fn apply_progress(
        &mut self,
        resource: &ResourceRef,
        id: TransferId,
        bytes_written: i64,
        bytes_expected: i64,
    ) -> Option<DownloadState> {
        let entry = self.entries.get_mut(resource)?;
        if entry.attempt != id {
            return None;
        }
        entry.state.apply(bytes_written, bytes_expected);
        Some(entry.state.clone())
    }

    /// Clear the entry for attempt `id`. Returns `false` if the event is stale.
    pub fn finish(&mut self, resource: &ResourceRef, id: TransferId) -> bool {
        if self.attempt(resource) != Some(id) {
            return false;
        }
        self.remove(resource);
        true
    }

    /// Clear the entry regardless of attempt.
    pub fn remove(&mut self, resource: &ResourceRef) -> Option<DownloadState> {
        self.active.remove(resource);
        let removed = self.entries.remove(resource).map(|entry| entry.state);
        self.debug_check();
        removed
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.active.contains(resource)
    }

    pub fn state(&self, resource: &ResourceRef) -> Option<DownloadState> {
        self.entries.get(resource).map(|entry| entry.state.clone())
    }

    pub fn attempt(&self, resource: &ResourceRef) -> Option<TransferId> {
        self.entries.get(resource).map(|entry| entry.attempt)
    }

    /// Registered resources, sorted by cache key.
    pub fn refs(&self) -> Vec<ResourceRef> {
        let mut refs: Vec<_> = self.active.iter().cloned().collect();
        refs.sort();
        refs
    }

    pub fn snapshot(&self) -> HashMap<ResourceRef, DownloadState> {
        self.entries
            .iter()
            .map(|(resource, entry)| (resource.clone(), entry.state.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    fn debug_check(&self) {
        debug_assert_eq!(self.active.len(), self.entries.len());
        debug_assert!(self.active.iter().all(|r| self.entries.contains_key(r)));
    }
}
