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
//! End-to-end scheduling scenario

mod common;

use common::*;
use custom_drones::codec::Vec3;
use custom_drones::store::MemoryBlobStore;
use std::time::Duration;

#[test]
fn test_one_alpha_for_3600_ticks() {
    let mut rt = running(MemoryBlobStore::new(), &call_log());
    assert_eq!(rt.registry().resolve_by_name("alpha"), Some(ALPHA_SKIN));
    assert_eq!(rt.registry().resolve_by_skin(ALPHA_SKIN), Some("assets/custom_drones/alpha"));

    let id = rt.create(ALPHA_SKIN, Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO).unwrap();
    let ticks = 3600u32;
    for _ in 0..ticks {
        rt.tick();
    }

    // 50 ms ticks against a 1 s cadence: one decision every 20 ticks,
    // starting with the first tick after placement
    let period = rt.config().tick_period;
    let expected_decisions = u64::from(ticks) * period.as_millis() as u64 / 1000;
    assert_eq!(expected_decisions, 180);

    let drone = rt.simulation().get(id).unwrap();
    let alpha = drone.behavior_as::<Alpha>().unwrap();
    assert_eq!(alpha.decisions, expected_decisions);
    assert_eq!(alpha.motions, u64::from(ticks));
    assert_eq!(rt.simulation().totals().decisions, expected_decisions);
    assert_eq!(rt.simulation().totals().motions, u64::from(ticks));
    assert_eq!(drone.core().spawn_position, Vec3::new(1.0, 2.0, 3.0));
    assert!(drone.core().position.y > 2.0);
    assert_eq!(drone.decision_cadence(), Duration::from_secs(1));
}

#[test]
fn test_staggered_spawns_desynchronize() {
    init_logging();
    let config = config().with_decision_cadence(Duration::from_secs(1), Duration::from_millis(500));
    let mut rt = custom_drones::DroneRuntime::start(
        config,
        MemoryBlobStore::new(),
        custom_drones::host::StaticHost::new([PACK]),
    );
    rt.attach_module(Box::new(AlphaPack::new(PACK, "1.0.0", &call_log())));
    rt.server_initialized();
    rt.tick();

    let ids: Vec<_> = (0..16)
        .map(|_| rt.create(ALPHA_SKIN, Vec3::ZERO, Vec3::ZERO).unwrap())
        .collect();
    for _ in 0..100 {
        rt.tick();
    }
    let cadences: Vec<Duration> = ids
        .iter()
        .map(|id| rt.simulation().get(*id).unwrap().decision_cadence())
        .collect();
    assert!(cadences.windows(2).any(|pair| pair[0] != pair[1]));

    let decisions: Vec<u64> = ids
        .iter()
        .map(|id| rt.simulation().get(*id).unwrap().behavior_as::<Alpha>().unwrap().decisions)
        .collect();
    assert!(decisions.iter().all(|d| (4..=6).contains(d)));
}
