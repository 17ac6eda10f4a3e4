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
//! Fixed-step simulation scheduler
//!
//! The [`Simulation`] owns every placed drone and drives two kinds of update
//! each tick:
//!
//! - a **decision update**, at most once per drone cadence, where the cadence
//!   is a fixed base plus a random jitter redrawn after every decision, so
//!   drones placed on the same tick drift apart instead of all deciding
//!   together;
//! - a **motion update**, every tick.
//!
//! Drones are visited in insertion order. Behaviors cannot add or remove
//! drones mid-pass; the [`DroneCommand`]s they queue are collected and handed
//! to the caller after the pass via [`Simulation::take_commands`].
//!
//! Time is kept as a [`Duration`] advanced by exactly one tick period per
//! tick, so cadence checks never accumulate floating point drift.

use crate::config::RuntimeConfig;
use crate::drone::{Drone, DroneCommand};
use crate::store::EntryId;
use log::{trace, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::collections::HashMap;
use std::time::Duration;

/// Source of decision cadence jitter
pub trait JitterSource {
    /// Draw a delay in `[0, max)`; zero when `max` is zero
    fn draw(&mut self, max: Duration) -> Duration;
}

/// Jitter from a seedable ChaCha generator
#[derive(Debug, Clone)]
pub struct SeededJitter {
    rng: ChaCha12Rng,
}

impl SeededJitter {
    /// Deterministic jitter from `seed`
    pub fn new(seed: u64) -> Self {
        SeededJitter {
            rng: ChaCha12Rng::seed_from_u64(seed),
        }
    }

    /// Jitter seeded from the operating system
    pub fn from_entropy() -> Self {
        SeededJitter {
            rng: ChaCha12Rng::from_entropy(),
        }
    }
}

impl JitterSource for SeededJitter {
    fn draw(&mut self, max: Duration) -> Duration {
        let max_nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
        if max_nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rng.gen_range(0..max_nanos))
    }
}

/// Jitter that is always zero
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn draw(&mut self, _max: Duration) -> Duration {
        Duration::ZERO
    }
}

/// Updates performed during one or more ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Decision updates run
    pub decisions: u64,
    /// Motion updates run
    pub motions: u64,
}

impl std::ops::AddAssign for TickStats {
    fn add_assign(&mut self, other: TickStats) {
        self.decisions += other.decisions;
        self.motions += other.motions;
    }
}

/// The collection of placed drones and the clock that drives them
pub struct Simulation {
    drones: Vec<Drone>,
    /// Position of each drone in `drones`
    entry_to_index: HashMap<EntryId, usize>,
    tick_period: Duration,
    decision_base: Duration,
    decision_stagger: Duration,
    jitter: Box<dyn JitterSource>,
    elapsed: Duration,
    tick_count: u64,
    playing: bool,
    totals: TickStats,
    commands: Vec<(EntryId, DroneCommand)>,
}

impl Simulation {
    /// Create an empty simulation with entropy-seeded jitter
    ///
    /// # Arguments
    ///
    /// * `tick_period` - Fixed length of one tick
    /// * `decision_base` - Minimum interval between decision updates
    /// * `decision_stagger` - Exclusive upper bound of the added jitter
    pub fn new(tick_period: Duration, decision_base: Duration, decision_stagger: Duration) -> Self {
        Simulation {
            drones: Vec::new(),
            entry_to_index: HashMap::new(),
            tick_period,
            decision_base,
            decision_stagger,
            jitter: Box::new(SeededJitter::from_entropy()),
            elapsed: Duration::ZERO,
            tick_count: 0,
            playing: true,
            totals: TickStats::default(),
            commands: Vec::new(),
        }
    }

    /// Create an empty simulation from runtime settings
    ///
    /// The jitter is seeded from `config.seed` when present.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let sim = Self::new(config.tick_period, config.decision_base, config.decision_stagger);
        match config.seed {
            Some(seed) => sim.with_jitter(SeededJitter::new(seed)),
            None => sim,
        }
    }

    /// Replace the jitter source
    pub fn with_jitter<J: JitterSource + 'static>(mut self, jitter: J) -> Self {
        self.set_jitter(jitter);
        self
    }

    /// Replace the jitter source in place
    pub fn set_jitter<J: JitterSource + 'static>(&mut self, jitter: J) {
        self.jitter = Box::new(jitter);
    }

    fn next_cadence(&mut self) -> Duration {
        self.decision_base + self.jitter.draw(self.decision_stagger)
    }

    /// Add a placed drone at the end of the update order
    ///
    /// The drone gets its first cadence now; it has never decided, so its
    /// first decision update happens on the next tick. A drone added under
    /// an ID that is already live replaces the old one in its slot.
    pub fn add(&mut self, mut drone: Drone) {
        drone.cadence.current = self.next_cadence();
        drone.cadence.last_decision = None;
        let entry_id = drone.entry_id();
        trace!("Drone {entry_id} joins the simulation");
        match self.entry_to_index.get(&entry_id) {
            Some(&index) => {
                warn!("Drone {entry_id} was already live, replacing it");
                self.drones[index] = drone;
            }
            None => {
                self.entry_to_index.insert(entry_id, self.drones.len());
                self.drones.push(drone);
            }
        }
        debug_assert_eq!(self.entry_to_index.len(), self.drones.len());
    }

    /// Remove a drone, keeping the order of the others
    pub fn remove(&mut self, entry_id: EntryId) -> Option<Drone> {
        let index = self.entry_to_index.remove(&entry_id)?;
        let drone = self.drones.remove(index);
        for later in &self.drones[index..] {
            if let Some(slot) = self.entry_to_index.get_mut(&later.entry_id()) {
                *slot -= 1;
            }
        }
        debug_assert_eq!(self.entry_to_index.len(), self.drones.len());
        Some(drone)
    }

    /// Get a live drone
    pub fn get(&self, entry_id: EntryId) -> Option<&Drone> {
        let index = *self.entry_to_index.get(&entry_id)?;
        self.drones.get(index)
    }

    /// Get a live drone mutably
    pub fn get_mut(&mut self, entry_id: EntryId) -> Option<&mut Drone> {
        let index = *self.entry_to_index.get(&entry_id)?;
        self.drones.get_mut(index)
    }

    /// Check whether a live drone owns `entry_id`
    pub fn contains(&self, entry_id: EntryId) -> bool {
        self.entry_to_index.contains_key(&entry_id)
    }

    /// Number of live drones
    pub fn len(&self) -> usize {
        self.drones.len()
    }

    /// Check whether no drone is live
    pub fn is_empty(&self) -> bool {
        self.drones.is_empty()
    }

    /// Live drones in update order
    pub fn iter(&self) -> impl Iterator<Item = &Drone> {
        self.drones.iter()
    }

    /// IDs of live drones in update order
    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.drones.iter().map(Drone::entry_id).collect()
    }

    /// Run one tick
    ///
    /// Evaluates every drone at the current time, then advances the clock by
    /// one tick period. Does nothing while paused.
    pub fn tick(&mut self) -> TickStats {
        let mut stats = TickStats::default();
        if !self.playing {
            return stats;
        }

        let now = self.elapsed;
        let delta = self.tick_period;
        let base = self.decision_base;
        let stagger = self.decision_stagger;
        let jitter = &mut self.jitter;
        let commands = &mut self.commands;
        for drone in self.drones.iter_mut() {
            let (decided, moved) = drone.step(now, delta, commands, || base + jitter.draw(stagger));
            stats.decisions += u64::from(decided);
            stats.motions += u64::from(moved);
        }

        self.elapsed += delta;
        self.tick_count += 1;
        self.totals += stats;
        stats
    }

    /// Drain the commands queued by behaviors
    pub fn take_commands(&mut self) -> Vec<(EntryId, DroneCommand)> {
        std::mem::take(&mut self.commands)
    }

    /// Pause or resume all updates
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Check whether updates are running
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Fixed length of one tick
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Simulation time of the next tick
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of ticks run
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Updates run since creation
    pub fn totals(&self) -> TickStats {
        self.totals
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("drones", &self.drones.len())
            .field("elapsed", &self.elapsed)
            .field("tick_count", &self.tick_count)
            .field("playing", &self.playing)
            .finish()
    }
}
