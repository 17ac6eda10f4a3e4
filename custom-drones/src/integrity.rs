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
//! Extension module integrity checking
//!
//! Drone types are contributed by extension modules. Records of a type whose
//! module is not loaded cannot be restored, so nothing is created until every
//! module seen in an earlier session is present again.
//!
//! The coordinator remembers each module it has seen (name, author, version)
//! in a persisted metadata document. An evaluation compares that table with
//! the modules the host reports as loaded:
//!
//! 1. Nothing missing: [`IntegrityOutcome::Passed`].
//! 2. Modules missing and no earlier missing set: the set is stored and a
//!    reload is requested ([`IntegrityOutcome::ReloadRequested`]). The next
//!    evaluation decides.
//! 3. Modules missing and any of them was already missing last time:
//!    [`IntegrityOutcome::Failed`], the missing set is cleared.
//! 4. Modules missing but none of them was missing last time: the earlier
//!    reload worked for those, [`IntegrityOutcome::Passed`], the missing set
//!    is cleared.

use crate::error::StorageError;
use crate::registry::TypeRegistry;
use crate::store::{load_document, save_document, BlobStore, Loaded};
use log::{error, info, warn};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A module that contributes drone types
///
/// Every callback has an empty default.
pub trait ExtensionModule {
    /// Unique module name, as the host reports it
    fn name(&self) -> &str;

    /// Module author
    fn author(&self) -> &str;

    /// Module version
    fn version(&self) -> Version;

    /// The integrity check passed; creation is now allowed
    fn on_integrity_check_success(&mut self) {}

    /// The integrity check failed; creation stays disabled
    fn on_integrity_check_failure(&mut self) {}

    /// Register this module's drone types
    ///
    /// Called after a successful integrity check, or on attach if the check
    /// already passed.
    fn on_register_types(&mut self, _registry: &mut TypeRegistry) {}

    /// Unregister this module's drone types
    fn on_unregister_types(&mut self, _registry: &mut TypeRegistry) {}

    /// The module was seen before with a different version
    fn on_version_migration(&mut self, _old: &Version, _new: &Version) {}
}

/// A module as remembered across sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Module name
    pub name: String,
    /// Module author
    pub author: String,
    /// Last version seen
    pub version: Version,
}

/// Persisted integrity state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    /// Every module ever seen, by name
    pub modules_seen: BTreeMap<String, ModuleRecord>,
    /// Modules found missing by an evaluation that requested a reload
    pub modules_missing: BTreeSet<String>,
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityOutcome {
    /// All modules are present
    Passed,
    /// These modules are missing; a reload should be attempted
    ReloadRequested(Vec<String>),
    /// These modules are still missing after a reload attempt
    Failed(Vec<String>),
}

/// Tracks seen modules and runs the integrity evaluation
#[derive(Debug, Clone)]
pub struct IntegrityCoordinator {
    metadata: MetaData,
    dirty: bool,
    last_outcome: Option<IntegrityOutcome>,
}

impl IntegrityCoordinator {
    /// Start with no modules seen
    pub fn new() -> Self {
        IntegrityCoordinator {
            metadata: MetaData::default(),
            dirty: true,
            last_outcome: None,
        }
    }

    /// Load the metadata persisted under `key`
    ///
    /// Missing or invalid metadata is replaced by an empty document, which is
    /// persisted right away.
    pub fn load(blob: &mut dyn BlobStore, key: &str) -> Self {
        info!("Loading meta data '{key}'...");
        match load_document::<MetaData>(blob, key) {
            Loaded::Present(metadata) if Self::is_consistent(&metadata) => {
                return IntegrityCoordinator {
                    metadata,
                    dirty: false,
                    last_outcome: None,
                };
            }
            Loaded::Present(_) => warn!("Corrupt meta data '{key}' (module table keys disagree), generating default."),
            Loaded::Corrupt(reason) => warn!("Corrupt meta data '{key}' ({reason}), generating default."),
            Loaded::Absent => warn!("Null meta data '{key}', generating default."),
        }

        let mut coordinator = Self::new();
        if let Err(err) = coordinator.persist(blob, key) {
            warn!("Could not persist default meta data: {err}");
        }
        coordinator
    }

    fn is_consistent(metadata: &MetaData) -> bool {
        metadata.modules_seen.iter().all(|(key, record)| *key == record.name)
    }

    /// Write the metadata if it changed
    ///
    /// Returns whether a write happened.
    pub fn persist(&mut self, blob: &mut dyn BlobStore, key: &str) -> Result<bool, StorageError> {
        if !self.dirty {
            return Ok(false);
        }
        info!("Saving meta data '{key}'...");
        save_document(blob, key, &self.metadata)?;
        self.dirty = false;
        Ok(true)
    }

    /// Record that a module finished initializing
    ///
    /// The first sighting adds the module to the seen table. A later sighting
    /// with a different version stores the new version and returns the old
    /// one, so the caller can run the migration hook.
    pub fn module_initialized(&mut self, name: &str, author: &str, version: &Version) -> Option<Version> {
        match self.metadata.modules_seen.get_mut(name) {
            None => {
                self.metadata.modules_seen.insert(
                    name.to_string(),
                    ModuleRecord {
                        name: name.to_string(),
                        author: author.to_string(),
                        version: version.clone(),
                    },
                );
                self.dirty = true;
                None
            }
            Some(record) if record.version != *version => {
                info!("Module {name} changed version {} -> {version}", record.version);
                let old = std::mem::replace(&mut record.version, version.clone());
                record.author = author.to_string();
                self.dirty = true;
                Some(old)
            }
            Some(_) => None,
        }
    }

    /// Compare the seen table against the loaded modules
    ///
    /// Updates the missing set as described in the module docs.
    pub fn evaluate<S: AsRef<str>>(&mut self, loaded: &[S]) -> IntegrityOutcome {
        info!("Analysing module bundle integrity...");
        let mut missing = Vec::new();
        for (name, record) in &self.metadata.modules_seen {
            if loaded.iter().any(|l| l.as_ref() == name) {
                info!("Found referenced module {name} by {}", record.author);
            } else {
                error!("Missing module [{name}]");
                missing.push(name.clone());
            }
        }

        let outcome = if missing.is_empty() {
            IntegrityOutcome::Passed
        } else if self.metadata.modules_missing.is_empty() {
            error!("Some previously seen modules are missing, attempting to reload them");
            self.metadata.modules_missing.extend(missing.iter().cloned());
            self.dirty = true;
            IntegrityOutcome::ReloadRequested(missing)
        } else if missing.iter().any(|m| self.metadata.modules_missing.contains(m)) {
            error!(
                "Previously seen modules are still missing after a reload: {}. Restore them or forget them, then restart.",
                missing.join(", ")
            );
            IntegrityOutcome::Failed(missing)
        } else {
            warn!("Missing modules were reloaded successfully");
            IntegrityOutcome::Passed
        };

        if !matches!(outcome, IntegrityOutcome::ReloadRequested(_)) && !self.metadata.modules_missing.is_empty() {
            self.metadata.modules_missing.clear();
            self.dirty = true;
        }
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    /// Drop a module from the seen table
    ///
    /// Used when a module is removed for good, so its absence no longer
    /// blocks the integrity check.
    pub fn forget_module(&mut self, name: &str) -> Option<ModuleRecord> {
        let record = self.metadata.modules_seen.remove(name)?;
        self.metadata.modules_missing.remove(name);
        self.dirty = true;
        Some(record)
    }

    /// The persisted state
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// The seen record of a module
    pub fn seen(&self, name: &str) -> Option<&ModuleRecord> {
        self.metadata.modules_seen.get(name)
    }

    /// Modules awaiting a reload verdict
    pub fn missing(&self) -> &BTreeSet<String> {
        &self.metadata.modules_missing
    }

    /// Outcome of the most recent evaluation
    pub fn last_outcome(&self) -> Option<&IntegrityOutcome> {
        self.last_outcome.as_ref()
    }

    /// Check whether the metadata changed since the last persist
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Default for IntegrityCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
