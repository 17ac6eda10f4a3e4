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
//! A drone that circles its spawn point
//!
//! Flies around a unit circle, reversing direction on every decision update,
//! and destroys itself after ten seconds. State is written to
//! `$TMPDIR/custom-drones-demo`, so running the demo twice shows the record
//! store persisting across sessions.
//!
//! ```bash
//! RUST_LOG=info cargo run --example circling_drone
//! ```

use custom_drones::codec::{PayloadReader, PayloadWriter, Vec3};
use custom_drones::host::StaticHost;
use custom_drones::store::FileBlobStore;
use custom_drones::{
    CodecError, DroneBehavior, DroneCommand, DroneRuntime, ExtensionModule, RuntimeConfig, TypeRegistry,
    UpdateContext,
};
use log::{info, warn};
use semver::Version;
use std::any::Any;
use std::f32::consts::PI;

const MODULE: &str = "circling-pack";
const TYPE_NAME: &str = "assets/custom_drones/demo/drone.circling";
const SKIN: u64 = 7_001;
const PROGRESS_WRAP: f32 = 4.0 * PI;
const LIFETIME: f32 = 10.0;

struct Circler {
    going_forward: bool,
    progress: f32,
    age: f32,
}

impl Default for Circler {
    fn default() -> Self {
        Circler {
            going_forward: true,
            progress: 0.0,
            age: 0.0,
        }
    }
}

impl DroneBehavior for Circler {
    fn on_serialize_extra(&self, writer: &mut PayloadWriter<'_>) -> Result<(), CodecError> {
        writer.write_bool(self.going_forward)?;
        writer.write_f32(self.progress)?;
        writer.write_f32(self.age)
    }

    fn on_deserialize_extra(&mut self, reader: &mut PayloadReader<'_>) -> Result<(), CodecError> {
        self.going_forward = reader.read_bool()?;
        self.progress = reader.read_f32()?;
        self.age = reader.read_f32()?;
        Ok(())
    }

    fn on_decision_update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.going_forward = !self.going_forward;
        info!("Drone {} at {}", ctx.drone.entry_id(), ctx.drone.position);
        if self.age >= LIFETIME {
            ctx.request(DroneCommand::Destroy);
        }
    }

    fn on_motion_update(&mut self, ctx: &mut UpdateContext<'_>) {
        let dt = ctx.delta_secs();
        self.age += dt;
        self.progress += if self.going_forward { dt } else { -dt };
        if self.progress > PROGRESS_WRAP {
            self.progress -= PROGRESS_WRAP;
        } else if self.progress < -PROGRESS_WRAP {
            self.progress += PROGRESS_WRAP;
        }

        let drone = &mut *ctx.drone;
        let offset = Vec3::new(self.progress.sin(), 0.0, self.progress.cos());
        drone.position = drone.spawn_position + offset;
        drone.rotation.y = self.progress / PROGRESS_WRAP * 360.0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct CirclingPack;

impl ExtensionModule for CirclingPack {
    fn name(&self) -> &str {
        MODULE
    }

    fn author(&self) -> &str {
        "demo"
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn on_integrity_check_success(&mut self) {
        info!("{MODULE} is ready");
    }

    fn on_register_types(&mut self, registry: &mut TypeRegistry) {
        if let Err(err) = registry.register_type::<Circler>(TYPE_NAME, SKIN) {
            warn!("Could not register {TYPE_NAME}: {err}");
        }
    }

    fn on_unregister_types(&mut self, registry: &mut TypeRegistry) {
        if let Err(err) = registry.unregister(TYPE_NAME) {
            warn!("Could not unregister {TYPE_NAME}: {err}");
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder().filter_level(log::LevelFilter::Info).parse_default_env().init();

    let config = RuntimeConfig::from_env();
    let ticks = (12.0 / config.tick_period.as_secs_f64()).ceil() as u32;
    let storage = FileBlobStore::new(std::env::temp_dir().join("custom-drones-demo"));

    let mut runtime = DroneRuntime::start(config, storage, StaticHost::new([MODULE]));
    runtime.attach_module(Box::new(CirclingPack));
    runtime.server_initialized();
    runtime.tick();

    let restored = runtime.simulation().len();
    let id = runtime.create(SKIN, Vec3::ZERO, Vec3::ZERO)?;
    info!("Spawned drone {id}, {restored} drone(s) restored from the previous run");

    for _ in 0..ticks {
        runtime.tick();
    }
    let totals = runtime.simulation().totals();
    info!(
        "{} decision and {} motion update(s) in {:?} of simulated time",
        totals.decisions,
        totals.motions,
        runtime.simulation().elapsed()
    );
    if runtime.simulation().contains(id) {
        warn!("Drone {id} outlived its lifetime");
    }

    runtime.shutdown()?;
    info!(
        "Stored records: {}",
        runtime.records().ids().iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
    );
    Ok(())
}
