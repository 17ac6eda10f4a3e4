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
//! # Custom Drones
//!
//! A persistence and simulation core for user-defined drone types hosted by a
//! game server.
//!
//! ## Features
//!
//! - **Fixed-layout records**: every drone is stored as a 256-byte buffer with
//!   an 80-byte header and a free-form payload owned by its type
//! - **Type registry**: extension modules register drone types by name and
//!   skin; stored records name their type by a CRC-32 tag of that name
//! - **Lifecycle**: spawn, pick up, redeploy, duplicate-on-collision and
//!   destroy, always keeping the record store consistent
//! - **Staggered scheduling**: jittered decision updates and per-tick motion
//!   updates on a fixed-step clock
//! - **Integrity checking**: nothing is created until every previously seen
//!   module is loaded again, with one automatic reload attempt
//!
//! ## Example
//!
//! ```rust
//! use custom_drones::codec::Vec3;
//! use custom_drones::host::StaticHost;
//! use custom_drones::runtime::{DroneRuntime, Phase};
//! use custom_drones::store::MemoryBlobStore;
//! use custom_drones::RuntimeConfig;
//!
//! let mut runtime = DroneRuntime::start(
//!     RuntimeConfig::default(),
//!     MemoryBlobStore::new(),
//!     StaticHost::default(),
//! );
//! runtime.server_initialized();
//! runtime.tick();
//! assert_eq!(runtime.phase(), Phase::Running);
//!
//! // Nothing registered under skin 42 yet
//! assert!(runtime.create(42, Vec3::ZERO, Vec3::ZERO).is_err());
//! ```

#![warn(missing_docs)]

/// Fixed-layout record encoding
pub mod codec;

/// Runtime settings
pub mod config;

/// Live drones and their lifecycle
pub mod drone;

/// Error types
pub mod error;

/// Hosting environment adapter
pub mod host;

/// Extension module integrity checking
pub mod integrity;

/// Drone type registry
pub mod registry;

/// The runtime context object
pub mod runtime;

/// Fixed-step scheduler
pub mod scheduler;

/// Persisted record store
pub mod store;

pub use config::RuntimeConfig;
pub use drone::{Drone, DroneBehavior, DroneCommand, Overrides, UpdateContext};
pub use error::{CodecError, LifecycleError, RegistryError, StorageError};
pub use integrity::ExtensionModule;
pub use registry::{TypeHandle, TypeRegistry};
pub use runtime::{DroneRuntime, Phase};
pub use store::EntryId;
