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
//! Live custom drone instances
//!
//! A [`Drone`] is the runtime-only representation of one placed record. It
//! pairs the state every drone shares ([`DroneCore`]) with the type-specific
//! [`DroneBehavior`] and the scheduling state the simulation needs. Nothing in
//! here is persisted directly; persistence always goes through
//! [`Drone::encode`] into the record store.

mod behavior;
mod lifecycle;

pub use behavior::{DroneBehavior, DroneCommand, UpdateContext};
pub use lifecycle::{CarriedItem, Lifecycle, Overrides, RestoreReport};

use crate::codec::{self, sanitize_identifier, Header, PayloadReader, Vec3, BUFFER_CAPACITY};
use crate::error::{CodecError, LifecycleError};
use crate::registry::TypeHandle;
use crate::store::EntryId;
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a drone
///
/// ```text
/// Fresh -> Placed -> Carried -> Destroyed
///            |   ^------'         ^
///            '--------------------'
/// ```
///
/// A live instance leaves `Carried` immediately by being destroyed while its
/// record survives; redeploying that record produces a new instance that goes
/// `Fresh -> Placed` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Built but not yet attached to a record
    Fresh,
    /// Materialized in the world and ticking
    Placed,
    /// Converted to a portable item, no longer ticking
    Carried,
    /// Gone for good
    Destroyed,
}

impl LifecycleState {
    /// Stable name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Fresh => "Fresh",
            LifecycleState::Placed => "Placed",
            LifecycleState::Carried => "Carried",
            LifecycleState::Destroyed => "Destroyed",
        }
    }

    /// Whether moving from `self` to `to` is legal
    pub fn can_transition(&self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Fresh, Placed) | (Placed, Carried) | (Placed, Destroyed) | (Carried, Placed) | (Carried, Destroyed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a live drone stopped existing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestroyReason {
    /// Destroyed in the world; the record is removed
    Killed,
    /// Converted to an item; the record is kept for the item
    PickedUp,
    /// The runtime is shutting down; the record is flushed and kept
    Unloaded,
}

/// State shared by every custom drone, mirrored into the record header
#[derive(Debug, Clone)]
pub struct DroneCore {
    entry_id: EntryId,
    handle: TypeHandle,
    identifier: String,
    /// Owning player, 0 when unowned
    pub owner: u64,
    /// Health fraction (0..1)
    pub health: f32,
    /// World position
    pub position: Vec3,
    /// Euler rotation in degrees
    pub rotation: Vec3,
    /// Position at the moment of placement
    pub spawn_position: Vec3,
    /// Rotation at the moment of placement
    pub spawn_rotation: Vec3,
    /// Decision updates are skipped entirely while false
    pub decision_updates_enabled: bool,
    /// Motion updates are skipped while false
    pub motion_updates_enabled: bool,
}

impl DroneCore {
    pub(crate) fn new(entry_id: EntryId, handle: TypeHandle, header: &Header) -> Self {
        DroneCore {
            entry_id,
            handle,
            identifier: sanitize_identifier(&header.identifier),
            owner: header.owner,
            health: header.health,
            position: header.position,
            rotation: header.rotation,
            spawn_position: header.position,
            spawn_rotation: header.rotation,
            decision_updates_enabled: true,
            motion_updates_enabled: true,
        }
    }

    /// ID of the record backing this drone
    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    /// Registered type of this drone
    pub fn type_handle(&self) -> &TypeHandle {
        &self.handle
    }

    /// Short remote-control identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Set the identifier, shortened to what the header can hold
    pub fn set_identifier(&mut self, identifier: &str) {
        self.identifier = sanitize_identifier(identifier);
    }

    /// Header reflecting the current live state
    pub fn header(&self) -> Header {
        Header {
            type_tag: self.handle.tag(),
            owner: self.owner,
            health: self.health,
            position: self.position,
            rotation: self.rotation,
            identifier: self.identifier.clone(),
        }
    }
}

/// Scheduling state, never persisted
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cadence {
    pub(crate) last_decision: Option<Duration>,
    pub(crate) current: Duration,
}

/// One live custom drone
pub struct Drone {
    core: DroneCore,
    behavior: Box<dyn DroneBehavior>,
    state: LifecycleState,
    pub(crate) cadence: Cadence,
}

impl Drone {
    pub(crate) fn new(core: DroneCore, behavior: Box<dyn DroneBehavior>) -> Self {
        Drone {
            core,
            behavior,
            state: LifecycleState::Fresh,
            cadence: Cadence {
                last_decision: None,
                current: Duration::ZERO,
            },
        }
    }

    /// ID of the record backing this drone
    pub fn entry_id(&self) -> EntryId {
        self.core.entry_id
    }

    /// Shared drone state
    pub fn core(&self) -> &DroneCore {
        &self.core
    }

    /// Mutable shared drone state
    pub fn core_mut(&mut self) -> &mut DroneCore {
        &mut self.core
    }

    /// The type-specific behavior
    pub fn behavior(&self) -> &dyn DroneBehavior {
        self.behavior.as_ref()
    }

    /// The type-specific behavior, mutably
    pub fn behavior_mut(&mut self) -> &mut dyn DroneBehavior {
        self.behavior.as_mut()
    }

    /// Downcast the behavior to its concrete type
    pub fn behavior_as<B: 'static>(&self) -> Option<&B> {
        self.behavior.as_any().downcast_ref::<B>()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Current interval between decision updates
    pub fn decision_cadence(&self) -> Duration {
        self.cadence.current
    }

    /// Simulation time of the last decision update, if any happened
    pub fn last_decision(&self) -> Option<Duration> {
        self.cadence.last_decision
    }

    /// Encode the live state into a full buffer
    pub fn encode(&self) -> Result<[u8; BUFFER_CAPACITY], CodecError> {
        let behavior = &self.behavior;
        codec::encode(&self.core.header(), |writer| behavior.on_serialize_extra(writer))
    }

    pub(crate) fn restore_extra(&mut self, reader: &mut PayloadReader<'_>) -> Result<(), CodecError> {
        self.behavior.on_deserialize_extra(reader)
    }

    pub(crate) fn transition(&mut self, to: LifecycleState) -> Result<(), LifecycleError> {
        if !self.state.can_transition(to) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state.name(),
                to: to.name(),
            });
        }
        self.state = to;
        Ok(())
    }

    pub(crate) fn notify_placed(&mut self) {
        self.core.spawn_position = self.core.position;
        self.core.spawn_rotation = self.core.rotation;
        self.behavior.on_placed(&mut self.core);
    }

    pub(crate) fn notify_destroyed(&mut self, reason: DestroyReason) {
        self.behavior.on_destroyed(&self.core, reason);
    }

    /// Run the decision and motion updates due at `now`
    ///
    /// Returns which of the two updates ran. `redraw` supplies the next
    /// decision cadence after a decision update.
    pub(crate) fn step(
        &mut self,
        now: Duration,
        delta: Duration,
        commands: &mut Vec<(EntryId, DroneCommand)>,
        mut redraw: impl FnMut() -> Duration,
    ) -> (bool, bool) {
        let mut decided = false;
        if self.behavior.should_decision_update(&self.core) {
            let due = match self.cadence.last_decision {
                None => true,
                Some(last) => now.saturating_sub(last) >= self.cadence.current,
            };
            if due {
                let mut ctx = UpdateContext::new(&mut self.core, now, delta, commands);
                self.behavior.on_decision_update(&mut ctx);
                self.cadence.last_decision = Some(now);
                self.cadence.current = redraw();
                decided = true;
            }
        }

        let mut moved = false;
        if self.behavior.should_motion_update(&self.core) {
            let mut ctx = UpdateContext::new(&mut self.core, now, delta, commands);
            self.behavior.on_motion_update(&mut ctx);
            moved = true;
        }
        (decided, moved)
    }
}

impl fmt::Debug for Drone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drone")
            .field("entry_id", &self.core.entry_id)
            .field("type", &self.core.handle.name())
            .field("state", &self.state)
            .field("position", &self.core.position)
            .finish()
    }
}
