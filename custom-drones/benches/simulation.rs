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
//! Benchmarks for the scheduler pass and record flushing
//!
//! Measures tick cost as the number of placed drones grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use custom_drones::codec::{PayloadReader, PayloadWriter, Vec3};
use custom_drones::host::StaticHost;
use custom_drones::store::MemoryBlobStore;
use custom_drones::{CodecError, DroneBehavior, DroneRuntime, RuntimeConfig, UpdateContext};
use std::any::Any;
use std::time::Duration;

#[derive(Default)]
struct Drifter {
    heading: f32,
}

impl DroneBehavior for Drifter {
    fn on_serialize_extra(&self, writer: &mut PayloadWriter<'_>) -> Result<(), CodecError> {
        writer.write_f32(self.heading)
    }

    fn on_deserialize_extra(&mut self, reader: &mut PayloadReader<'_>) -> Result<(), CodecError> {
        self.heading = reader.read_f32()?;
        Ok(())
    }

    fn on_decision_update(&mut self, _ctx: &mut UpdateContext<'_>) {
        self.heading = (self.heading + 0.7) % std::f32::consts::TAU;
    }

    fn on_motion_update(&mut self, ctx: &mut UpdateContext<'_>) {
        let step = ctx.delta_secs();
        ctx.drone.position.x += self.heading.cos() * step;
        ctx.drone.position.z += self.heading.sin() * step;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn setup(n_drones: usize) -> DroneRuntime<MemoryBlobStore, StaticHost> {
    let config = RuntimeConfig::default()
        .with_decision_cadence(Duration::from_millis(250), Duration::from_millis(250))
        .with_seed(3);
    let mut runtime = DroneRuntime::start(config, MemoryBlobStore::new(), StaticHost::default());
    runtime.server_initialized();
    runtime.tick();
    if let Some(registry) = runtime.registry_mut() {
        registry.register_type::<Drifter>("drifter", 1).ok();
    }
    for i in 0..n_drones {
        runtime.create(1, Vec3::new(i as f32, 0.0, 0.0), Vec3::ZERO).ok();
    }
    runtime
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation_tick");

    for n_drones in [10, 100, 1000].iter() {
        let mut runtime = setup(*n_drones);
        group.bench_with_input(BenchmarkId::new("drifters", n_drones), n_drones, |b, _| {
            b.iter(|| black_box(runtime.tick()));
        });
    }

    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");

    for n_drones in [10, 100, 1000].iter() {
        let mut runtime = setup(*n_drones);
        group.bench_with_input(BenchmarkId::new("flush_and_persist", n_drones), n_drones, |b, _| {
            b.iter(|| runtime.save().ok());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tick, bench_save);
criterion_main!(benches);
