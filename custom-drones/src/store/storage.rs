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
//! Key-value blob storage for persisted documents
//!
//! The core only needs "read the document stored under a key" and "replace
//! the document stored under a key". Documents are JSON text.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Opaque document store keyed by logical name
pub trait BlobStore {
    /// Read the document under `key`, `Ok(None)` when nothing is stored
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the document under `key`
    fn write(&mut self, key: &str, contents: &str) -> Result<(), StorageError>;
}

/// In-memory store, used for embedding and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    documents: HashMap<String, String>,
    fail_writes: bool,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with an I/O error
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Raw access to a stored document
    pub fn document(&self, key: &str) -> Option<&str> {
        self.documents.get(key).map(String::as_str)
    }

    /// Store a document directly, bypassing failure injection
    pub fn put(&mut self, key: &str, contents: impl Into<String>) {
        self.documents.insert(key.to_string(), contents.into());
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.documents.get(key).cloned())
    }

    fn write(&mut self, key: &str, contents: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "writes disabled"),
            });
        }
        self.documents.insert(key.to_string(), contents.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per document under a root directory
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Store documents under `root`, which is created on first write
    pub fn new(root: impl AsRef<Path>) -> Self {
        FileBlobStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&mut self, key: &str, contents: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.root).map_err(io_err)?;

        // Write then rename so a crash never leaves a truncated document
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)
    }
}

/// Result of reading a typed document
#[derive(Debug)]
pub enum Loaded<T> {
    /// The document parsed successfully
    Present(T),
    /// Nothing is stored, or the store could not be read
    Absent,
    /// Something is stored but it is not a valid document
    Corrupt(String),
}

/// Read and parse the document under `key`
///
/// Read failures are reported as [`Loaded::Absent`]; callers fall back to a
/// default document either way.
pub fn load_document<T: DeserializeOwned>(blob: &dyn BlobStore, key: &str) -> Loaded<T> {
    match blob.read(key) {
        Ok(Some(contents)) => match serde_json::from_str(&contents) {
            Ok(document) => Loaded::Present(document),
            Err(err) => Loaded::Corrupt(err.to_string()),
        },
        Ok(None) => Loaded::Absent,
        Err(err) => {
            log::warn!("{err}");
            Loaded::Absent
        }
    }
}

/// Serialize `document` and write it under `key`
pub fn save_document<T: Serialize>(
    blob: &mut dyn BlobStore,
    key: &str,
    document: &T,
) -> Result<(), StorageError> {
    let contents = serde_json::to_string_pretty(document).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    blob.write(key, &contents)
}
