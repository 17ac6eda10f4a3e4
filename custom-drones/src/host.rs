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
//! Adapter to the hosting game server
//!
//! The core never reaches into engine internals itself. Whatever the host
//! needs to do to make a custom drone look native (stamping its identity
//! field, wiring prefabs) and whatever it knows about its loaded extension
//! modules is exposed through this trait.

use crate::registry::TypeHandle;
use crate::store::EntryId;
use log::info;
use std::collections::HashMap;

/// Capabilities the hosting environment provides to the core
pub trait HostAdapter {
    /// Names of the extension modules currently loaded
    fn loaded_modules(&self) -> Vec<String>;

    /// Best-effort request to reload the named modules
    fn reload_modules(&mut self, names: &[String]);

    /// Stamp the engine-side identity of a freshly placed drone
    fn bind_identity(&mut self, _entry_id: EntryId, _handle: &TypeHandle) {}

    /// Forget the engine-side identity of a drone that stopped existing
    fn release_identity(&mut self, _entry_id: EntryId) {}
}

/// Host with a fixed module list that records every request it receives
#[derive(Debug, Default, Clone)]
pub struct StaticHost {
    loaded: Vec<String>,
    reload_requests: Vec<Vec<String>>,
    identities: HashMap<EntryId, TypeHandle>,
}

impl StaticHost {
    /// Host reporting `loaded` as its module list
    pub fn new<I, S>(loaded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StaticHost {
            loaded: loaded.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Replace the reported module list
    pub fn set_loaded<I, S>(&mut self, loaded: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loaded = loaded.into_iter().map(Into::into).collect();
    }

    /// Every reload request received so far, oldest first
    pub fn reload_requests(&self) -> &[Vec<String>] {
        &self.reload_requests
    }

    /// Identity currently bound to `entry_id`
    pub fn identity(&self, entry_id: EntryId) -> Option<&TypeHandle> {
        self.identities.get(&entry_id)
    }

    /// Number of bound identities
    pub fn bound_count(&self) -> usize {
        self.identities.len()
    }
}

impl HostAdapter for StaticHost {
    fn loaded_modules(&self) -> Vec<String> {
        self.loaded.clone()
    }

    fn reload_modules(&mut self, names: &[String]) {
        info!("Reload requested for: {}", names.join(", "));
        self.reload_requests.push(names.to_vec());
    }

    fn bind_identity(&mut self, entry_id: EntryId, handle: &TypeHandle) {
        self.identities.insert(entry_id, handle.clone());
    }

    fn release_identity(&mut self, entry_id: EntryId) {
        self.identities.remove(&entry_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_host_records_requests() {
        let mut host = StaticHost::new(["a", "b"]);
        assert_eq!(host.loaded_modules(), vec!["a".to_string(), "b".to_string()]);

        host.reload_modules(&["b".to_string()]);
        assert_eq!(host.reload_requests(), &[vec!["b".to_string()]]);

        let handle = TypeHandle::new("assets/custom_drones/x", 1, 2);
        host.bind_identity(EntryId::new(3), &handle);
        assert_eq!(host.identity(EntryId::new(3)), Some(&handle));
        host.release_identity(EntryId::new(3));
        assert_eq!(host.bound_count(), 0);
    }
}
