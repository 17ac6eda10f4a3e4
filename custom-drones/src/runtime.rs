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
//! The runtime context
//!
//! [`DroneRuntime`] owns every piece of state the crate works with: the record
//! store, the type registry, the simulation, the integrity coordinator, the
//! attached extension modules, and the host's blob store and adapter. It is
//! created once at startup and consumed at shutdown.
//!
//! # Startup
//!
//! ```text
//! start() --> attach_module()* --> server_initialized() --> tick()
//!                                                           |
//!                       integrity evaluation runs here -----+
//! ```
//!
//! The integrity evaluation is deferred to the first tick after
//! [`DroneRuntime::server_initialized`], so modules attached in the same
//! frame are all counted. On success, modules register their types and every
//! placed record is restored; only then are creation calls accepted.

use crate::codec::Vec3;
use crate::config::RuntimeConfig;
use crate::drone::{CarriedItem, DroneCommand, Lifecycle, Overrides, RestoreReport};
use crate::error::{LifecycleError, StorageError};
use crate::host::HostAdapter;
use crate::integrity::{ExtensionModule, IntegrityCoordinator, IntegrityOutcome};
use crate::registry::TypeRegistry;
use crate::scheduler::{Simulation, TickStats};
use crate::store::{BlobStore, EntryId, RecordStore, ScanIssue};
use log::{debug, error, info, warn};
use std::collections::VecDeque;

/// Where the runtime is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the integrity check
    Starting,
    /// A reload of missing modules was requested; creation stays disabled
    AwaitingReload,
    /// The integrity check passed
    Running,
    /// The integrity check failed; creation is disabled until restart
    Disabled,
    /// Shut down; only the accessors remain useful
    ShutDown,
}

type DeferredTask<B, H> = Box<dyn FnOnce(&mut DroneRuntime<B, H>)>;

/// Owner of all drone state for one session
pub struct DroneRuntime<B: BlobStore, H: HostAdapter> {
    config: RuntimeConfig,
    blob: B,
    host: H,
    records: RecordStore,
    registry: TypeRegistry,
    simulation: Simulation,
    integrity: IntegrityCoordinator,
    modules: Vec<Box<dyn ExtensionModule>>,
    deferred: VecDeque<DeferredTask<B, H>>,
    carried: Vec<CarriedItem>,
    phase: Phase,
}

impl<B: BlobStore, H: HostAdapter> DroneRuntime<B, H> {
    /// Load persisted state and prepare an idle runtime
    ///
    /// Missing or corrupt documents are replaced by defaults, never reported
    /// as errors.
    ///
    /// # Arguments
    ///
    /// * `config` - Runtime settings
    /// * `blob` - Persistent storage for the two documents
    /// * `host` - Hosting environment adapter
    pub fn start(config: RuntimeConfig, mut blob: B, host: H) -> Self {
        let integrity = IntegrityCoordinator::load(&mut blob, &config.metadata_key);
        let records = RecordStore::load(&mut blob, &config.records_key);
        info!(
            "Custom drones starting with {} stored record(s) and {} known module(s)",
            records.len(),
            integrity.metadata().modules_seen.len()
        );
        DroneRuntime {
            registry: TypeRegistry::with_prefix(config.name_prefix.clone()),
            simulation: Simulation::from_config(&config),
            config,
            blob,
            host,
            records,
            integrity,
            modules: Vec::new(),
            deferred: VecDeque::new(),
            carried: Vec::new(),
            phase: Phase::Starting,
        }
    }

    /// Attach an extension module
    ///
    /// Records the module in the seen table and runs its migration hook when
    /// its version changed. A module attached after the integrity check
    /// passed registers its types immediately. Returns `false` if a module
    /// with the same name is already attached.
    pub fn attach_module(&mut self, mut module: Box<dyn ExtensionModule>) -> bool {
        let name = module.name().to_string();
        if self.module(&name).is_some() {
            warn!("Module {name} is already attached");
            return false;
        }
        let version = module.version();
        if let Some(old) = self.integrity.module_initialized(&name, module.author(), &version) {
            module.on_version_migration(&old, &version);
        }
        if self.phase == Phase::Running {
            module.on_integrity_check_success();
            module.on_register_types(&mut self.registry);
        }
        debug!("Module {name} {version} attached");
        self.modules.push(module);
        true
    }

    /// Detach a module, letting it unregister its types if it registered any
    ///
    /// Drones already placed keep running; new ones of the removed types can
    /// no longer be created or restored.
    pub fn detach_module(&mut self, name: &str) -> Option<Box<dyn ExtensionModule>> {
        let index = self.modules.iter().position(|m| m.name() == name)?;
        let mut module = self.modules.remove(index);
        if self.phase == Phase::Running {
            module.on_unregister_types(&mut self.registry);
        }
        Some(module)
    }

    /// An attached module by name
    pub fn module(&self, name: &str) -> Option<&dyn ExtensionModule> {
        self.modules.iter().find(|m| m.name() == name).map(|m| m.as_ref())
    }

    /// Number of attached modules
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Run `task` at the start of the next tick
    pub fn defer<F>(&mut self, task: F)
    where
        F: FnOnce(&mut DroneRuntime<B, H>) + 'static,
    {
        self.deferred.push_back(Box::new(task));
    }

    /// The host finished starting up
    ///
    /// Schedules the integrity evaluation for the next tick.
    pub fn server_initialized(&mut self) {
        if self.phase != Phase::Starting {
            warn!("server_initialized called in phase {:?}, ignoring", self.phase);
            return;
        }
        self.run_integrity_check();
    }

    /// Schedule another integrity evaluation for the next tick
    ///
    /// Useful after the host reloaded the requested modules. Ignored once the
    /// check passed or the runtime shut down.
    pub fn run_integrity_check(&mut self) {
        match self.phase {
            Phase::Running | Phase::ShutDown => {
                debug!("Integrity check not needed in phase {:?}", self.phase);
            }
            _ => self.defer(|runtime| runtime.evaluate_integrity()),
        }
    }

    fn evaluate_integrity(&mut self) {
        if matches!(self.phase, Phase::Running | Phase::ShutDown) {
            return;
        }
        let loaded = self.host.loaded_modules();
        match self.integrity.evaluate(loaded.as_slice()) {
            IntegrityOutcome::Passed => {
                for module in self.modules.iter_mut() {
                    module.on_integrity_check_success();
                    module.on_register_types(&mut self.registry);
                }
                self.phase = Phase::Running;
                self.restore_records();
            }
            IntegrityOutcome::ReloadRequested(missing) => {
                self.host.reload_modules(&missing);
                self.phase = Phase::AwaitingReload;
            }
            IntegrityOutcome::Failed(_) => {
                for module in self.modules.iter_mut() {
                    module.on_integrity_check_failure();
                }
                self.phase = Phase::Disabled;
            }
        }
        if let Err(err) = self.integrity.persist(&mut self.blob, &self.config.metadata_key) {
            error!("Could not persist meta data after integrity check: {err}");
        }
    }

    fn restore_records(&mut self) -> RestoreReport {
        for (entry_id, issue) in self.records.scan_headers(&self.registry.known_tags()) {
            match issue {
                ScanIssue::Unreadable(err) => warn!("Stored record {entry_id} is unreadable: {err}"),
                ScanIssue::UnknownTypeTag(tag) => {
                    warn!("Stored record {entry_id} has type tag {tag:#010x} which no module registered")
                }
            }
        }
        self.lifecycle().restore_all()
    }

    fn lifecycle(&mut self) -> Lifecycle<'_> {
        Lifecycle::new(&mut self.records, &self.registry, &mut self.simulation, &mut self.host)
    }

    fn ensure_running(&self) -> Result<(), LifecycleError> {
        if self.phase == Phase::Running {
            Ok(())
        } else {
            Err(LifecycleError::Gated)
        }
    }

    /// Advance one tick
    ///
    /// Runs tasks deferred during the previous tick, then the simulation pass
    /// followed by the commands behaviors queued during it. The pass only runs
    /// if the runtime was already running when the tick began, so drones
    /// restored by the integrity check first move on the following tick.
    /// Tasks deferred while this tick runs wait for the next one.
    pub fn tick(&mut self) -> TickStats {
        let was_running = self.phase == Phase::Running;
        let tasks = std::mem::take(&mut self.deferred);
        for task in tasks {
            task(self);
        }

        if !was_running || self.phase != Phase::Running {
            return TickStats::default();
        }
        let stats = self.simulation.tick();
        for (entry_id, command) in self.simulation.take_commands() {
            let result = match command {
                DroneCommand::Destroy => self.lifecycle().destroy(entry_id),
                DroneCommand::PickUp => {
                    let picked = self.lifecycle().pick_up(entry_id);
                    picked.map(|item| self.carried.push(item))
                }
            };
            if let Err(err) = result {
                debug!("Dropping {command:?} for drone {entry_id}: {err}");
            }
        }
        stats
    }

    /// Place a new drone of the type registered under `skin`
    pub fn create(&mut self, skin: u64, position: Vec3, rotation: Vec3) -> Result<EntryId, LifecycleError> {
        self.ensure_running()?;
        self.lifecycle().spawn(skin, position, rotation)
    }

    /// Place a drone from a stored record
    ///
    /// See [`Lifecycle::summon`] for the duplication rules.
    pub fn summon(
        &mut self,
        entry_id: EntryId,
        overrides: Overrides,
        force_duplicate: bool,
    ) -> Result<EntryId, LifecycleError> {
        self.ensure_running()?;
        self.lifecycle().summon(entry_id, overrides, force_duplicate)
    }

    /// Convert a live drone into a portable item
    pub fn pick_up(&mut self, entry_id: EntryId) -> Result<CarriedItem, LifecycleError> {
        self.lifecycle().pick_up(entry_id)
    }

    /// Place the drone held by a portable item
    pub fn redeploy(&mut self, item: &CarriedItem, overrides: Overrides) -> Result<EntryId, LifecycleError> {
        self.ensure_running()?;
        self.lifecycle().redeploy(item, overrides)
    }

    /// Destroy a live drone and release its record
    pub fn destroy(&mut self, entry_id: EntryId) -> Result<(), LifecycleError> {
        self.lifecycle().destroy(entry_id)
    }

    /// Items produced by drones that picked themselves up
    pub fn take_carried_items(&mut self) -> Vec<CarriedItem> {
        std::mem::take(&mut self.carried)
    }

    /// Write every live drone into its record and persist both documents
    ///
    /// Both documents are attempted; the first failure is returned.
    pub fn save(&mut self) -> Result<(), StorageError> {
        let flushed = self.lifecycle().flush_all();
        debug!("Flushed {flushed} live drone(s)");
        let records = self.records.persist(&mut self.blob, &self.config.records_key);
        let metadata = self.integrity.persist(&mut self.blob, &self.config.metadata_key);
        records?;
        metadata?;
        Ok(())
    }

    /// Unload every drone, unregister all module types and persist
    ///
    /// Every live drone is flushed into a placed record first, so the next
    /// session restores it.
    pub fn shutdown(&mut self) -> Result<(), StorageError> {
        if self.phase == Phase::ShutDown {
            return Ok(());
        }
        let unloaded = self.lifecycle().unload_all();
        if self.phase == Phase::Running {
            for module in self.modules.iter_mut() {
                module.on_unregister_types(&mut self.registry);
            }
        }
        self.phase = Phase::ShutDown;
        info!("Custom drones shut down, {unloaded} drone(s) unloaded");
        self.save()
    }

    /// Give back the blob store and host
    pub fn into_parts(self) -> (B, H) {
        (self.blob, self.host)
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runtime settings
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The blob store
    pub fn blob(&self) -> &B {
        &self.blob
    }

    /// The blob store, mutably
    pub fn blob_mut(&mut self) -> &mut B {
        &mut self.blob
    }

    /// The host adapter
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host adapter, mutably
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The record store
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// The type registry
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// The type registry for direct registration, once running
    pub fn registry_mut(&mut self) -> Option<&mut TypeRegistry> {
        match self.phase {
            Phase::Running => Some(&mut self.registry),
            _ => None,
        }
    }

    /// The simulation
    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// The simulation, mutably
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    /// The integrity coordinator
    pub fn integrity(&self) -> &IntegrityCoordinator {
        &self.integrity
    }

    /// The integrity coordinator, mutably
    pub fn integrity_mut(&mut self) -> &mut IntegrityCoordinator {
        &mut self.integrity
    }
}
