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
//! Shared fixtures for the integration tests

#![allow(dead_code)]

use custom_drones::codec::{PayloadReader, PayloadWriter};
use custom_drones::host::StaticHost;
use custom_drones::store::MemoryBlobStore;
use custom_drones::{
    CodecError, DroneBehavior, DroneCommand, DroneRuntime, ExtensionModule, RuntimeConfig, TypeRegistry,
    UpdateContext,
};
use semver::Version;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

pub const ALPHA_SKIN: u64 = 42;
pub const COURIER_SKIN: u64 = 43;
pub const PACK: &str = "alpha-pack";

pub type Runtime = DroneRuntime<MemoryBlobStore, StaticHost>;
pub type CallLog = Rc<RefCell<Vec<String>>>;

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// Counts its updates and persists the counts in its payload
#[derive(Default)]
pub struct Alpha {
    pub decisions: u64,
    pub motions: u64,
}

impl DroneBehavior for Alpha {
    fn on_serialize_extra(&self, writer: &mut PayloadWriter<'_>) -> Result<(), CodecError> {
        writer.write_u64(self.decisions)?;
        writer.write_u64(self.motions)
    }

    fn on_deserialize_extra(&mut self, reader: &mut PayloadReader<'_>) -> Result<(), CodecError> {
        self.decisions = reader.read_u64()?;
        self.motions = reader.read_u64()?;
        Ok(())
    }

    fn on_decision_update(&mut self, _ctx: &mut UpdateContext<'_>) {
        self.decisions += 1;
    }

    fn on_motion_update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.motions += 1;
        ctx.drone.position.y += ctx.delta_secs();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Packs itself up on its first decision
#[derive(Default)]
pub struct Courier;

impl DroneBehavior for Courier {
    fn on_decision_update(&mut self, ctx: &mut UpdateContext<'_>) {
        ctx.request(DroneCommand::PickUp);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Extension module contributing `alpha` and `courier`
pub struct AlphaPack {
    name: String,
    version: Version,
    log: CallLog,
}

impl AlphaPack {
    pub fn new(name: &str, version: &str, log: &CallLog) -> Self {
        AlphaPack {
            name: name.to_string(),
            version: Version::parse(version).unwrap(),
            log: log.clone(),
        }
    }

    fn record(&self, event: String) {
        self.log.borrow_mut().push(event);
    }
}

impl ExtensionModule for AlphaPack {
    fn name(&self) -> &str {
        &self.name
    }

    fn author(&self) -> &str {
        "integration"
    }

    fn version(&self) -> Version {
        self.version.clone()
    }

    fn on_integrity_check_success(&mut self) {
        self.record(format!("{}:success", self.name));
    }

    fn on_integrity_check_failure(&mut self) {
        self.record(format!("{}:failure", self.name));
    }

    fn on_register_types(&mut self, registry: &mut TypeRegistry) {
        if self.name == PACK {
            registry.register_type::<Alpha>("alpha", ALPHA_SKIN).unwrap();
            registry.register_type::<Courier>("courier", COURIER_SKIN).unwrap();
        }
        self.record(format!("{}:register", self.name));
    }

    fn on_unregister_types(&mut self, registry: &mut TypeRegistry) {
        if self.name == PACK {
            registry.unregister("alpha").unwrap();
            registry.unregister("courier").unwrap();
        }
        self.record(format!("{}:unregister", self.name));
    }

    fn on_version_migration(&mut self, old: &Version, new: &Version) {
        self.record(format!("{}:migrate {old}->{new}", self.name));
    }
}

pub fn config() -> RuntimeConfig {
    RuntimeConfig::default()
        .with_tick_period(Duration::from_millis(50))
        .with_decision_cadence(Duration::from_secs(1), Duration::ZERO)
        .with_seed(1)
}

/// A runtime with `alpha-pack` attached and the integrity check passed
pub fn running(blob: MemoryBlobStore, log: &CallLog) -> Runtime {
    init_logging();
    let mut runtime = DroneRuntime::start(config(), blob, StaticHost::new([PACK]));
    runtime.attach_module(Box::new(AlphaPack::new(PACK, "1.0.0", log)));
    runtime.server_initialized();
    runtime.tick();
    runtime
}

pub fn call_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}
