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
//! Custom type registry
//!
//! Maps a custom type name to its skin identifier, its header type tag and
//! the factory that builds its behavior. All three directions are kept in
//! step: a registration either lands in every map or in none of them.
//!
//! # Naming
//!
//! Names live under a mandatory prefix (`assets/custom_drones/` by default),
//! are lowercase and only contain `[0-9a-z._-/]`. A name that does not follow
//! these rules is sanitized and registered under the sanitized form with a
//! warning; it is never rejected for formatting alone.
//!
//! # Example
//!
//! ```
//! use custom_drones::registry::TypeRegistry;
//! use custom_drones::drone::DroneBehavior;
//! use std::any::Any;
//!
//! #[derive(Default)]
//! struct Scout;
//!
//! impl DroneBehavior for Scout {
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//! }
//!
//! let mut registry = TypeRegistry::new();
//! let handle = registry.register_type::<Scout>("Scout", 42).unwrap();
//! assert_eq!(handle.name(), "assets/custom_drones/scout");
//! assert_eq!(registry.resolve_by_skin(42), Some("assets/custom_drones/scout"));
//! ```

use crate::drone::DroneBehavior;
use crate::error::RegistryError;
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};

/// Prefix every custom type name must start with
pub const DEFAULT_NAME_PREFIX: &str = "assets/custom_drones/";

/// Builds a fresh behavior; `None` means the type cannot be instantiated
pub type BehaviorFactory = Box<dyn Fn() -> Option<Box<dyn DroneBehavior>> + Send + Sync>;

/// Identity of a registered type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    name: String,
    skin: u64,
    tag: u32,
}

impl TypeHandle {
    pub(crate) fn new(name: impl Into<String>, skin: u64, tag: u32) -> Self {
        TypeHandle {
            name: name.into(),
            skin,
            tag,
        }
    }

    /// Sanitized, globally unique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric skin identifier
    pub fn skin(&self) -> u64 {
        self.skin
    }

    /// Tag written at the start of every record header
    pub fn tag(&self) -> u32 {
        self.tag
    }
}

struct TypeEntry {
    handle: TypeHandle,
    factory: BehaviorFactory,
}

/// Compute the header tag for a sanitized type name
pub fn type_tag(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

fn canonical_chars(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'))
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Bring a name prefix into canonical form
///
/// Drops leading `/`, strips every character outside `[0-9a-zA-Z._-/]` and
/// lowercases, so that [`sanitize_name`] is idempotent under the result.
pub fn canonical_prefix(prefix: &str) -> String {
    canonical_chars(prefix.trim_start_matches('/'))
}

/// Bring a type name into canonical form
///
/// Adds `prefix` (after dropping a leading `/`) when missing, strips every
/// character outside `[0-9a-zA-Z._-/]`, then lowercases. `prefix` is
/// expected in the form [`canonical_prefix`] returns.
pub fn sanitize_name(name: &str, prefix: &str) -> String {
    let prefixed = if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{prefix}{}", name.strip_prefix('/').unwrap_or(name))
    };

    canonical_chars(&prefixed)
}

/// Registry of custom drone types
pub struct TypeRegistry {
    prefix: String,
    by_name: HashMap<String, TypeEntry>,
    by_skin: HashMap<u64, String>,
    by_tag: HashMap<u32, String>,
}

impl TypeRegistry {
    /// Create an empty registry using [`DEFAULT_NAME_PREFIX`]
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_NAME_PREFIX)
    }

    /// Create an empty registry with a custom mandatory prefix
    ///
    /// The prefix is brought into canonical form first.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let requested = prefix.into();
        let prefix = canonical_prefix(&requested);
        if prefix != requested {
            warn!("Name prefix {requested} is not in canonical form, using {prefix}");
        }
        TypeRegistry {
            prefix,
            by_name: HashMap::new(),
            by_skin: HashMap::new(),
            by_tag: HashMap::new(),
        }
    }

    /// The mandatory name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Sanitize `name` with this registry's prefix
    pub fn sanitize(&self, name: &str) -> String {
        sanitize_name(name, &self.prefix)
    }

    /// Register a custom type
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidName`] if nothing but the prefix survives sanitization
    /// - [`RegistryError::AlreadyRegisteredName`] if the sanitized name is taken
    /// - [`RegistryError::AlreadyRegisteredSkin`] if the skin is taken
    /// - [`RegistryError::TypeTagCollision`] if another name hashes to the same tag
    ///
    /// On error the registry is left exactly as it was.
    pub fn register(
        &mut self,
        name: &str,
        skin: u64,
        factory: BehaviorFactory,
    ) -> Result<TypeHandle, RegistryError> {
        let sanitized = self.sanitize(name);
        if sanitized != name {
            warn!(
                "Trying to register type {name}, but the name is not in canonical form. \
                 It is going to be registered as {sanitized}"
            );
        }
        if sanitized.len() <= self.prefix.len() {
            return Err(RegistryError::InvalidName {
                name: name.to_string(),
            });
        }

        if self.by_name.contains_key(&sanitized) {
            error!("Trying to register type {sanitized}, but it already exists!");
            return Err(RegistryError::AlreadyRegisteredName { name: sanitized });
        }
        if let Some(existing) = self.by_skin.get(&skin) {
            error!("Trying to register type {sanitized} with skin {skin}, but {existing} already uses it!");
            return Err(RegistryError::AlreadyRegisteredSkin {
                skin,
                existing: existing.clone(),
            });
        }
        let tag = type_tag(&sanitized);
        if let Some(existing) = self.by_tag.get(&tag) {
            return Err(RegistryError::TypeTagCollision {
                tag,
                name: sanitized,
                existing: existing.clone(),
            });
        }

        let handle = TypeHandle::new(sanitized.clone(), skin, tag);
        self.by_skin.insert(skin, sanitized.clone());
        self.by_tag.insert(tag, sanitized.clone());
        self.by_name.insert(
            sanitized,
            TypeEntry {
                handle: handle.clone(),
                factory,
            },
        );
        info!("Registered {} as a custom type with skin {}", handle.name, handle.skin);
        Ok(handle)
    }

    /// Register a behavior type that can be built with `Default`
    pub fn register_type<B>(&mut self, name: &str, skin: u64) -> Result<TypeHandle, RegistryError>
    where
        B: DroneBehavior + Default + 'static,
    {
        let handle = self.register(name, skin, Box::new(|| Some(Box::new(B::default()) as Box<dyn DroneBehavior>)))?;
        info!("{} is backed by {}", handle.name, std::any::type_name::<B>());
        Ok(handle)
    }

    /// Remove a custom type from every map
    pub fn unregister(&mut self, name: &str) -> Result<(), RegistryError> {
        let sanitized = self.sanitize(name);
        let entry = self
            .by_name
            .remove(&sanitized)
            .ok_or(RegistryError::NotFound { name: sanitized })?;
        self.by_skin.remove(&entry.handle.skin);
        self.by_tag.remove(&entry.handle.tag);
        Ok(())
    }

    /// Name registered under `skin`
    pub fn resolve_by_skin(&self, skin: u64) -> Option<&str> {
        self.by_skin.get(&skin).map(String::as_str)
    }

    /// Skin registered under `name` (sanitized before lookup)
    pub fn resolve_by_name(&self, name: &str) -> Option<u64> {
        self.get(name).map(TypeHandle::skin)
    }

    /// Handle of the type whose header tag is `tag`
    pub fn resolve_by_tag(&self, tag: u32) -> Option<&TypeHandle> {
        let name = self.by_tag.get(&tag)?;
        self.by_name.get(name).map(|entry| &entry.handle)
    }

    /// Handle registered under `name` (sanitized before lookup)
    pub fn get(&self, name: &str) -> Option<&TypeHandle> {
        let sanitized = self.sanitize(name);
        self.by_name.get(&sanitized).map(|entry| &entry.handle)
    }

    /// Build a behavior for `name`
    ///
    /// Returns `None` when the type is unknown or its factory declines.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn DroneBehavior>> {
        let sanitized = self.sanitize(name);
        self.by_name.get(&sanitized).and_then(|entry| (entry.factory)())
    }

    /// Whether `name` is registered (sanitized before lookup)
    pub fn is_registered(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Tags of every registered type
    pub fn known_tags(&self) -> HashSet<u32> {
        self.by_tag.keys().copied().collect()
    }

    /// Registered names in ascending order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Default)]
    struct Plain;

    impl DroneBehavior for Plain {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn snapshot(registry: &TypeRegistry) -> (Vec<String>, Vec<(u64, String)>, Vec<(u32, String)>) {
        let mut names: Vec<String> = registry.by_name.keys().cloned().collect();
        let mut skins: Vec<(u64, String)> = registry.by_skin.iter().map(|(k, v)| (*k, v.clone())).collect();
        let mut tags: Vec<(u32, String)> = registry.by_tag.iter().map(|(k, v)| (*k, v.clone())).collect();
        names.sort();
        skins.sort();
        tags.sort();
        (names, skins, tags)
    }

    #[test]
    fn test_sanitize_name() {
        let prefix = DEFAULT_NAME_PREFIX;
        assert_eq!(sanitize_name("alpha", prefix), "assets/custom_drones/alpha");
        assert_eq!(sanitize_name("/nested/Beta.prefab", prefix), "assets/custom_drones/nested/beta.prefab");
        assert_eq!(sanitize_name("assets/custom_drones/g a$m!ma", prefix), "assets/custom_drones/gamma");
        assert_eq!(
            sanitize_name("assets/custom_drones/ok-name_1.prefab", prefix),
            "assets/custom_drones/ok-name_1.prefab"
        );
    }

    #[test]
    fn test_custom_prefix_is_canonical() {
        let mut registry = TypeRegistry::with_prefix("/My Drones/");
        assert_eq!(registry.prefix(), "mydrones/");

        let handle = registry.register_type::<Plain>("x", 7).unwrap();
        assert_eq!(handle.name(), "mydrones/x");
        assert_eq!(registry.sanitize(handle.name()), handle.name());
        assert_eq!(registry.resolve_by_name("mydrones/x"), Some(7));
        assert!(registry.get("mydrones/x").is_some());
        assert!(registry.unregister("mydrones/x").is_ok());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_sanitizes_and_resolves() {
        let mut registry = TypeRegistry::new();
        let handle = registry.register_type::<Plain>("Alpha", 42).unwrap();
        assert_eq!(handle.name(), "assets/custom_drones/alpha");
        assert_eq!(handle.tag(), type_tag("assets/custom_drones/alpha"));

        assert_eq!(registry.resolve_by_skin(42), Some("assets/custom_drones/alpha"));
        assert_eq!(registry.resolve_by_name("alpha"), Some(42));
        assert_eq!(registry.resolve_by_name("assets/custom_drones/alpha"), Some(42));
        assert_eq!(registry.resolve_by_tag(handle.tag()), Some(&handle));
        assert!(registry.instantiate("alpha").is_some());
    }

    #[test]
    fn test_failed_register_leaves_maps_untouched() {
        let mut registry = TypeRegistry::new();
        registry.register_type::<Plain>("alpha", 1).unwrap();
        registry.register_type::<Plain>("beta", 2).unwrap();
        let before = snapshot(&registry);

        let name_clash = registry.register_type::<Plain>("ALPHA", 3);
        assert!(matches!(name_clash, Err(RegistryError::AlreadyRegisteredName { .. })));
        assert_eq!(snapshot(&registry), before);

        let skin_clash = registry.register_type::<Plain>("gamma", 2);
        assert!(matches!(
            skin_clash,
            Err(RegistryError::AlreadyRegisteredSkin { skin: 2, ref existing }) if existing == "assets/custom_drones/beta"
        ));
        assert_eq!(snapshot(&registry), before);

        let empty = registry.register_type::<Plain>("$$$", 9);
        assert!(matches!(empty, Err(RegistryError::InvalidName { .. })));
        assert_eq!(snapshot(&registry), before);
    }

    #[test]
    fn test_unregister_removes_every_direction() {
        let mut registry = TypeRegistry::new();
        let handle = registry.register_type::<Plain>("alpha", 7).unwrap();
        registry.unregister("alpha").unwrap();

        assert!(registry.is_empty());
        assert!(registry.resolve_by_skin(7).is_none());
        assert!(registry.resolve_by_tag(handle.tag()).is_none());
        assert!(matches!(registry.unregister("alpha"), Err(RegistryError::NotFound { .. })));

        // Both the name and the skin are free again
        assert!(registry.register_type::<Plain>("alpha", 7).is_ok());
    }

    #[test]
    fn test_declining_factory() {
        let mut registry = TypeRegistry::new();
        registry.register("broken", 5, Box::new(|| None)).unwrap();
        assert!(registry.is_registered("broken"));
        assert!(registry.instantiate("broken").is_none());
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = TypeRegistry::new();
        registry.register_type::<Plain>("zeta", 1).unwrap();
        registry.register_type::<Plain>("alpha", 2).unwrap();
        assert_eq!(registry.names(), vec!["assets/custom_drones/alpha", "assets/custom_drones/zeta"]);
        assert_eq!(registry.known_tags().len(), 2);
    }
}
