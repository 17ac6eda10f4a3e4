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
//! Capability interface implemented by every custom drone type
//!
//! The lifecycle and the scheduler only ever hold a `Box<dyn DroneBehavior>`;
//! the concrete type is chosen once, when the type registry's factory builds
//! the behavior for a placed drone.
//!
//! # Example
//!
//! ```
//! use custom_drones::codec::{PayloadReader, PayloadWriter};
//! use custom_drones::drone::{DroneBehavior, UpdateContext};
//! use custom_drones::error::CodecError;
//! use std::any::Any;
//!
//! #[derive(Default)]
//! struct Blinker {
//!     lit: bool,
//! }
//!
//! impl DroneBehavior for Blinker {
//!     fn on_serialize_extra(&self, writer: &mut PayloadWriter<'_>) -> Result<(), CodecError> {
//!         writer.write_bool(self.lit)
//!     }
//!
//!     fn on_deserialize_extra(&mut self, reader: &mut PayloadReader<'_>) -> Result<(), CodecError> {
//!         self.lit = reader.read_bool()?;
//!         Ok(())
//!     }
//!
//!     fn on_decision_update(&mut self, _ctx: &mut UpdateContext<'_>) {
//!         self.lit = !self.lit;
//!     }
//!
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//! }
//! ```

use super::{DestroyReason, DroneCore};
use crate::codec::{PayloadReader, PayloadWriter};
use crate::error::CodecError;
use crate::store::EntryId;
use std::any::Any;
use std::time::Duration;

/// Structural changes a behavior can request during an update
///
/// Commands are queued while the scheduler iterates and applied once the
/// pass over all drones has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroneCommand {
    /// Destroy the drone and release its record
    Destroy,
    /// Convert the drone into a portable item
    PickUp,
}

/// What a behavior sees during a decision or motion update
pub struct UpdateContext<'a> {
    /// Mutable shared state of the drone being updated
    pub drone: &'a mut DroneCore,
    now: Duration,
    delta: Duration,
    commands: &'a mut Vec<(EntryId, DroneCommand)>,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(
        drone: &'a mut DroneCore,
        now: Duration,
        delta: Duration,
        commands: &'a mut Vec<(EntryId, DroneCommand)>,
    ) -> Self {
        UpdateContext {
            drone,
            now,
            delta,
            commands,
        }
    }

    /// Simulation time of the current tick
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Fixed length of one tick
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Tick length in seconds, for motion integration
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Queue a command against the drone being updated
    pub fn request(&mut self, command: DroneCommand) {
        self.commands.push((self.drone.entry_id(), command));
    }
}

/// Per-type hooks for a custom drone
///
/// Only the downcasting accessors are required; every other hook defaults to
/// doing nothing, and the update gates default to the drone's enable flags.
pub trait DroneBehavior {
    /// Write extension state; the writer starts at the first payload byte
    fn on_serialize_extra(&self, _writer: &mut PayloadWriter<'_>) -> Result<(), CodecError> {
        Ok(())
    }

    /// Restore extension state; the reader starts at the first payload byte
    fn on_deserialize_extra(&mut self, _reader: &mut PayloadReader<'_>) -> Result<(), CodecError> {
        Ok(())
    }

    /// Called once when the drone becomes placed, after any restore
    fn on_placed(&mut self, _drone: &mut DroneCore) {}

    /// Low frequency, staggered update for expensive logic
    fn on_decision_update(&mut self, _ctx: &mut UpdateContext<'_>) {}

    /// Per-tick update for cheap continuous state such as position
    fn on_motion_update(&mut self, _ctx: &mut UpdateContext<'_>) {}

    /// Called once when the live drone stops existing
    fn on_destroyed(&mut self, _drone: &DroneCore, _reason: DestroyReason) {}

    /// Whether the decision update should be considered this tick
    fn should_decision_update(&self, drone: &DroneCore) -> bool {
        drone.decision_updates_enabled
    }

    /// Whether the motion update should run this tick
    fn should_motion_update(&self, drone: &DroneCore) -> bool {
        drone.motion_updates_enabled
    }

    /// Allow downcasting to the concrete behavior
    fn as_any(&self) -> &dyn Any;

    /// Allow mutable downcasting to the concrete behavior
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
