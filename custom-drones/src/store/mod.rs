// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Record store
//!
//! Owns every persisted data buffer, keyed by an [`EntryId`]. IDs are
//! assigned from a monotonically increasing counter that is persisted with
//! the records, so an ID is never handed out twice, even after the record
//! that used it is removed.
//!
//! The store only tracks whether it changed since the last persist; it never
//! writes on its own. Persisting happens at shutdown and at explicit save
//! points.

mod storage;

pub use storage::{load_document, save_document, BlobStore, FileBlobStore, Loaded, MemoryBlobStore};

use crate::codec::{self, BUFFER_CAPACITY};
use crate::error::{CodecError, LifecycleError, StorageError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Stable key of one persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(i32);

impl EntryId {
    /// Wrap a raw ID
    pub fn new(id: i32) -> Self {
        EntryId(id)
    }

    /// The raw value
    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One persisted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBuffer {
    /// Key of this record in the store
    pub entry_id: EntryId,
    /// Encoded header and payload
    pub raw_data: Vec<u8>,
    /// True while a portable item, not a placed drone, holds this record
    pub is_item: bool,
}

impl DataBuffer {
    /// Wrap encoded bytes for a placed drone
    pub fn new(entry_id: EntryId, raw_data: Vec<u8>) -> Self {
        DataBuffer {
            entry_id,
            raw_data,
            is_item: false,
        }
    }

    /// An all-zero buffer of full capacity
    pub fn empty(entry_id: EntryId) -> Self {
        Self::new(entry_id, vec![0u8; BUFFER_CAPACITY])
    }
}

/// Problems found by [`RecordStore::scan_headers`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanIssue {
    /// The header could not be read
    Unreadable(CodecError),
    /// No registered type owns the header's tag
    UnknownTypeTag(u32),
}

#[derive(Serialize, Deserialize)]
struct RecordDocument {
    last_id: i32,
    records: BTreeMap<EntryId, DataBuffer>,
}

/// Persisted map of entry IDs to data buffers
#[derive(Debug, Clone)]
pub struct RecordStore {
    last_id: i32,
    records: BTreeMap<EntryId, DataBuffer>,
    dirty: bool,
}

impl RecordStore {
    /// Create an empty store
    ///
    /// A new store starts dirty so that it becomes the persisted baseline on
    /// the first save.
    pub fn new() -> Self {
        RecordStore {
            last_id: 0,
            records: BTreeMap::new(),
            dirty: true,
        }
    }

    /// Load the store persisted under `key`
    ///
    /// A missing, unreadable or structurally invalid document never fails:
    /// the store starts empty and is immediately persisted as the new
    /// baseline. A failure to write that baseline is logged and the store
    /// stays dirty.
    pub fn load(blob: &mut dyn BlobStore, key: &str) -> Self {
        info!("Loading record store '{key}'...");
        let loaded = match load_document::<RecordDocument>(blob, key) {
            Loaded::Present(document) => match Self::from_document(document) {
                Ok(store) => return store,
                Err(reason) => {
                    warn!("Corrupt record store '{key}' ({reason}), generating default.");
                    Self::new()
                }
            },
            Loaded::Corrupt(reason) => {
                warn!("Corrupt record store '{key}' ({reason}), generating default.");
                Self::new()
            }
            Loaded::Absent => {
                warn!("Null record store '{key}', generating default.");
                Self::new()
            }
        };

        let mut store = loaded;
        if let Err(err) = store.persist(blob, key) {
            warn!("Could not persist default record store: {err}");
        }
        store
    }

    fn from_document(document: RecordDocument) -> Result<Self, String> {
        for (id, buffer) in &document.records {
            if *id != buffer.entry_id {
                return Err(format!("record {id} claims to be {}", buffer.entry_id));
            }
            if id.raw() > document.last_id {
                return Err(format!("record {id} is newer than last id {}", document.last_id));
            }
            if buffer.raw_data.len() > BUFFER_CAPACITY {
                return Err(format!(
                    "record {id} holds {} bytes, capacity is {BUFFER_CAPACITY}",
                    buffer.raw_data.len()
                ));
            }
        }
        Ok(RecordStore {
            last_id: document.last_id,
            records: document.records,
            dirty: false,
        })
    }

    /// Write the store under `key` if anything changed since the last persist
    ///
    /// Returns whether a write happened. The dirty flag is cleared only after
    /// a successful write.
    pub fn persist(&mut self, blob: &mut dyn BlobStore, key: &str) -> Result<bool, StorageError> {
        if !self.dirty {
            return Ok(false);
        }
        info!("Saving record store '{key}'...");
        let document = RecordDocument {
            last_id: self.last_id,
            records: self.records.clone(),
        };
        save_document(blob, key, &document)?;
        self.dirty = false;
        Ok(true)
    }

    /// Hand out a fresh, never used ID
    ///
    /// Fails with [`LifecycleError::IdsExhausted`] once the counter reaches
    /// `i32::MAX`; the counter never wraps.
    pub fn assign_id(&mut self) -> Result<EntryId, LifecycleError> {
        self.last_id = self
            .last_id
            .checked_add(1)
            .ok_or(LifecycleError::IdsExhausted {
                last_id: EntryId(self.last_id),
            })?;
        self.dirty = true;
        Ok(EntryId(self.last_id))
    }

    /// The most recently assigned ID, 0 when none was ever assigned
    pub fn last_id(&self) -> EntryId {
        EntryId(self.last_id)
    }

    /// Store `buffer` under `id`, replacing any previous record
    ///
    /// The buffer's own `entry_id` is overwritten with `id`. Inserting under
    /// an ID the counter has not reached yet advances the counter, so
    /// [`assign_id`](Self::assign_id) never returns it later.
    pub fn insert(&mut self, id: EntryId, mut buffer: DataBuffer) -> Option<DataBuffer> {
        buffer.entry_id = id;
        if id.0 > self.last_id {
            self.last_id = id.0;
        }
        self.dirty = true;
        self.records.insert(id, buffer)
    }

    /// Remove and return the record under `id`
    pub fn remove(&mut self, id: EntryId) -> Option<DataBuffer> {
        let removed = self.records.remove(&id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Borrow the record under `id`
    pub fn get(&self, id: EntryId) -> Option<&DataBuffer> {
        self.records.get(&id)
    }

    /// Mutably borrow the record under `id`; marks the store dirty
    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut DataBuffer> {
        let record = self.records.get_mut(&id);
        if record.is_some() {
            self.dirty = true;
        }
        record
    }

    /// Whether a record exists under `id`
    pub fn contains(&self, id: EntryId) -> bool {
        self.records.contains_key(&id)
    }

    /// Deep-copy the record under `id` into a freshly assigned ID
    ///
    /// The copy shares no state with the original and starts out as a placed
    /// record (`is_item == false`). The original is left untouched.
    pub fn duplicate(&mut self, id: EntryId) -> Result<(EntryId, &DataBuffer), LifecycleError> {
        let raw_data = self
            .records
            .get(&id)
            .ok_or(LifecycleError::RecordNotFound { entry_id: id })?
            .raw_data
            .clone();
        let new_id = self.assign_id()?;
        let buffer = self
            .records
            .entry(new_id)
            .or_insert_with(|| DataBuffer::new(new_id, raw_data));
        Ok((new_id, buffer))
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All stored IDs in ascending order
    pub fn ids(&self) -> Vec<EntryId> {
        self.records.keys().copied().collect()
    }

    /// Iterate over all records in ascending ID order
    pub fn iter(&self) -> impl Iterator<Item = &DataBuffer> {
        self.records.values()
    }

    /// Whether anything changed since the last successful persist
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force the next persist to write
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Check every record header against the set of known type tags
    ///
    /// Read-only; runs on the rayon pool when the `parallel` feature is on.
    /// Results are sorted by ID.
    pub fn scan_headers(&self, known_tags: &HashSet<u32>) -> Vec<(EntryId, ScanIssue)> {
        let check = |buffer: &DataBuffer| -> Option<(EntryId, ScanIssue)> {
            match codec::peek_type_tag(&buffer.raw_data) {
                Ok(tag) if known_tags.contains(&tag) => None,
                Ok(tag) => Some((buffer.entry_id, ScanIssue::UnknownTypeTag(tag))),
                Err(err) => Some((buffer.entry_id, ScanIssue::Unreadable(err))),
            }
        };

        #[cfg(feature = "parallel")]
        let mut issues: Vec<_> = self.records.par_iter().filter_map(|(_, b)| check(b)).collect();
        #[cfg(not(feature = "parallel"))]
        let mut issues: Vec<_> = self.records.values().filter_map(check).collect();

        issues.sort_by_key(|(id, _)| *id);
        issues
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
