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
//! Error types
//!
//! One enum per concern. None of these are fatal to the hosting process:
//! callers either skip the affected record, reject the configuration call,
//! or disable drone creation for the rest of the session.

use crate::store::EntryId;
use thiserror::Error;

/// Errors raised while reading or writing a data buffer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer cannot even hold the fixed header
    #[error("buffer is {len} bytes, header needs {required}")]
    BufferTooShort {
        /// Length of the offending buffer
        len: usize,
        /// Minimum length required
        required: usize,
    },

    /// A payload hook tried to write past the end of the buffer
    #[error("payload write of {requested} bytes at offset {offset} exceeds capacity {capacity}")]
    PayloadOverflow {
        /// Absolute cursor offset at the time of the write
        offset: usize,
        /// Number of bytes the hook tried to write
        requested: usize,
        /// Total buffer capacity
        capacity: usize,
    },

    /// A payload hook tried to read past the end of the buffer
    #[error("payload read of {requested} bytes at offset {offset} exceeds buffer length {len}")]
    PayloadUnderflow {
        /// Absolute cursor offset at the time of the read
        offset: usize,
        /// Number of bytes the hook tried to read
        requested: usize,
        /// Length of the buffer being read
        len: usize,
    },

    /// The stored identifier is not printable ASCII
    #[error("identifier bytes are not valid ASCII")]
    InvalidIdentifier,
}

/// Errors raised by the type registry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Another type already uses this name
    #[error("type '{name}' is already registered")]
    AlreadyRegisteredName {
        /// The sanitized name that collided
        name: String,
    },

    /// Another type already uses this skin identifier
    #[error("skin {skin} is already registered to '{existing}'")]
    AlreadyRegisteredSkin {
        /// The skin identifier that collided
        skin: u64,
        /// Name of the type currently holding the skin
        existing: String,
    },

    /// Two different names hash to the same header type tag
    #[error("type tag {tag:#010x} of '{name}' collides with '{existing}'")]
    TypeTagCollision {
        /// The colliding tag
        tag: u32,
        /// Name being registered
        name: String,
        /// Name already holding the tag
        existing: String,
    },

    /// No type is registered under this name
    #[error("type '{name}' is not registered")]
    NotFound {
        /// The sanitized name that was looked up
        name: String,
    },

    /// Nothing is left of the name once disallowed characters are stripped
    #[error("type name '{name}' has no usable characters")]
    InvalidName {
        /// The name as supplied by the caller
        name: String,
    },
}

/// Errors raised by the persisted blob store
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying read or write failed
    #[error("storage I/O failed for '{key}': {source}")]
    Io {
        /// Logical document key
        key: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The document could not be turned into JSON
    #[error("failed to serialize '{key}': {source}")]
    Serialize {
        /// Logical document key
        key: String,
        /// The underlying serde error
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while moving a drone between lifecycle states
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The integrity check has not passed, so creation is not allowed
    #[error("drone creation is disabled until the integrity check passes")]
    Gated,

    /// No type is registered under the requested skin
    #[error("no custom type is registered under skin {skin}")]
    UnknownSkin {
        /// The requested skin identifier
        skin: u64,
    },

    /// The header carries a type tag no registered type owns
    #[error("record {entry_id} references unknown type tag {tag:#010x}")]
    UnknownTypeTag {
        /// The record whose header was decoded
        entry_id: EntryId,
        /// The unresolved tag
        tag: u32,
    },

    /// The registered factory declined to build a behavior
    #[error("type '{name}' could not be instantiated")]
    InstantiationFailed {
        /// The resolved type name
        name: String,
    },

    /// The record store holds nothing under this ID
    #[error("record {entry_id} does not exist")]
    RecordNotFound {
        /// The missing record ID
        entry_id: EntryId,
    },

    /// The ID counter reached its ceiling; no fresh ID can be handed out
    #[error("record IDs are exhausted, last assigned ID is {last_id}")]
    IdsExhausted {
        /// The highest ID ever assigned
        last_id: EntryId,
    },

    /// No live drone is attached to this ID
    #[error("no live drone owns record {entry_id}")]
    NotLive {
        /// The record ID that was looked up
        entry_id: EntryId,
    },

    /// The requested transition is not legal from the current state
    #[error("invalid drone state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state name
        from: &'static str,
        /// Requested state name
        to: &'static str,
    },

    /// Encoding or decoding the record failed
    #[error("record {entry_id}: {source}")]
    Codec {
        /// The record being processed
        entry_id: EntryId,
        /// The codec failure
        #[source]
        source: CodecError,
    },
}
