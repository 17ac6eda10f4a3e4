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
//! Drone lifecycle transitions
//!
//! [`Lifecycle`] borrows everything a transition touches (record store,
//! type registry, simulation, host adapter) for the duration of one call.
//! It is the only place that moves a drone between states, and it keeps the
//! record store in step with every move:
//!
//! | transition | record |
//! |---|---|
//! | spawn (`Fresh -> Placed`) | new ID, encoded defaults |
//! | restore (`Fresh -> Placed`) | read; duplicated first on collision |
//! | pick up (`Placed -> Carried -> Destroyed`) | re-encoded, `is_item = true`, kept |
//! | destroy (`Placed -> Destroyed`) | removed |
//! | unload | re-encoded, `is_item = false`, kept |

use super::{DestroyReason, Drone, DroneCore, LifecycleState};
use crate::codec::{self, Header, Vec3};
use crate::error::LifecycleError;
use crate::host::HostAdapter;
use crate::registry::TypeRegistry;
use crate::scheduler::Simulation;
use crate::store::{DataBuffer, EntryId, RecordStore};
use log::{debug, error, info, warn};

/// Values that take precedence over the stored header when restoring
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overrides {
    /// Place here instead of the stored position
    pub position: Option<Vec3>,
    /// Rotate to this instead of the stored rotation
    pub rotation: Option<Vec3>,
    /// Assign this owner instead of the stored one
    pub owner: Option<u64>,
}

impl Overrides {
    /// Override the position
    pub fn at(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    /// Override the rotation
    pub fn rotated(mut self, rotation: Vec3) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Override the owner
    pub fn owned_by(mut self, owner: u64) -> Self {
        self.owner = Some(owner);
        self
    }

    fn apply(&self, header: &mut Header) {
        if let Some(position) = self.position {
            header.position = position;
        }
        if let Some(rotation) = self.rotation {
            header.rotation = rotation;
        }
        if let Some(owner) = self.owner {
            header.owner = owner;
        }
    }
}

/// Token held by a portable item that carries a drone's record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarriedItem {
    /// Record the item owns
    pub entry_id: EntryId,
    /// Skin of the drone type, for the item's appearance
    pub skin: u64,
}

/// Outcome of restoring every stored placed record
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Records that are live again
    pub restored: Vec<EntryId>,
    /// Records left in storage, with the reason
    pub skipped: Vec<(EntryId, LifecycleError)>,
}

/// Borrowed view used to perform lifecycle transitions
pub struct Lifecycle<'a> {
    store: &'a mut RecordStore,
    registry: &'a TypeRegistry,
    simulation: &'a mut Simulation,
    host: &'a mut dyn HostAdapter,
}

impl<'a> Lifecycle<'a> {
    /// Borrow the pieces a transition needs
    pub fn new(
        store: &'a mut RecordStore,
        registry: &'a TypeRegistry,
        simulation: &'a mut Simulation,
        host: &'a mut dyn HostAdapter,
    ) -> Self {
        Lifecycle {
            store,
            registry,
            simulation,
            host,
        }
    }

    /// Place a new drone of the type registered under `skin`
    ///
    /// The drone starts from default header values at the given transform and
    /// is backed by a freshly assigned record.
    pub fn spawn(&mut self, skin: u64, position: Vec3, rotation: Vec3) -> Result<EntryId, LifecycleError> {
        let name = self
            .registry
            .resolve_by_skin(skin)
            .ok_or(LifecycleError::UnknownSkin { skin })?;
        let handle = self
            .registry
            .get(name)
            .cloned()
            .ok_or(LifecycleError::UnknownSkin { skin })?;
        let behavior = self
            .registry
            .instantiate(handle.name())
            .ok_or_else(|| LifecycleError::InstantiationFailed {
                name: handle.name().to_string(),
            })?;

        let mut header = Header::new(handle.tag());
        header.position = position;
        header.rotation = rotation;

        let entry_id = self.store.assign_id()?;
        let mut drone = Drone::new(DroneCore::new(entry_id, handle, &header), behavior);
        drone.notify_placed();

        let bytes = match drone.encode() {
            Ok(bytes) => bytes,
            Err(source) => return Err(LifecycleError::Codec { entry_id, source }),
        };
        self.store.insert(entry_id, DataBuffer::new(entry_id, bytes.to_vec()));
        self.place(drone)?;
        Ok(entry_id)
    }

    /// Place a drone from the record under `entry_id`
    ///
    /// When a live drone already owns the record, or `force_duplicate` is set,
    /// the record is duplicated first and the copy is placed, so the original
    /// record and any drone using it are left untouched.
    ///
    /// Unknown type tags, failed instantiation and undecodable records abandon
    /// the restore but leave the stored record in place.
    pub fn summon(
        &mut self,
        entry_id: EntryId,
        overrides: Overrides,
        force_duplicate: bool,
    ) -> Result<EntryId, LifecycleError> {
        if !self.store.contains(entry_id) {
            return Err(LifecycleError::RecordNotFound { entry_id });
        }

        if !force_duplicate && !self.simulation.contains(entry_id) {
            return self.restore(entry_id, overrides);
        }

        let (copy_id, _) = self.store.duplicate(entry_id)?;
        debug!("Record {entry_id} duplicated into {copy_id}");
        self.restore(copy_id, overrides).map_err(|err| {
            self.store.remove(copy_id);
            err
        })
    }

    /// Place the drone held by a portable item
    pub fn redeploy(&mut self, item: &CarriedItem, overrides: Overrides) -> Result<EntryId, LifecycleError> {
        if let Some(record) = self.store.get(item.entry_id) {
            if !record.is_item {
                warn!("Redeploying record {} which is not marked as an item", item.entry_id);
            }
        }
        self.summon(item.entry_id, overrides, false)
    }

    fn restore(&mut self, entry_id: EntryId, overrides: Overrides) -> Result<EntryId, LifecycleError> {
        let raw = self
            .store
            .get(entry_id)
            .map(|record| record.raw_data.clone())
            .ok_or(LifecycleError::RecordNotFound { entry_id })?;

        let (mut header, mut reader) =
            codec::decode(&raw).map_err(|source| LifecycleError::Codec { entry_id, source })?;

        let handle = match self.registry.resolve_by_tag(header.type_tag) {
            Some(handle) => handle.clone(),
            None => {
                warn!(
                    "Record {entry_id} references type tag {:#010x} which is not registered, leaving it in storage",
                    header.type_tag
                );
                return Err(LifecycleError::UnknownTypeTag {
                    entry_id,
                    tag: header.type_tag,
                });
            }
        };
        let behavior = self.registry.instantiate(handle.name()).ok_or_else(|| {
            warn!("Type {} could not be instantiated for record {entry_id}", handle.name());
            LifecycleError::InstantiationFailed {
                name: handle.name().to_string(),
            }
        })?;

        overrides.apply(&mut header);
        let mut drone = Drone::new(DroneCore::new(entry_id, handle, &header), behavior);
        drone
            .restore_extra(&mut reader)
            .map_err(|source| LifecycleError::Codec { entry_id, source })?;
        drone.notify_placed();

        if let Some(record) = self.store.get_mut(entry_id) {
            record.is_item = false;
        }
        self.place(drone)?;
        Ok(entry_id)
    }

    fn place(&mut self, mut drone: Drone) -> Result<(), LifecycleError> {
        drone.transition(LifecycleState::Placed)?;
        self.host.bind_identity(drone.entry_id(), drone.core().type_handle());
        self.simulation.add(drone);
        Ok(())
    }

    /// Restore every stored record that is placed but not live
    ///
    /// Records held by items are skipped. Failures are logged and reported;
    /// the failing records stay in storage.
    pub fn restore_all(&mut self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let pending: Vec<EntryId> = self
            .store
            .iter()
            .filter(|record| !record.is_item)
            .map(|record| record.entry_id)
            .filter(|id| !self.simulation.contains(*id))
            .collect();

        for entry_id in pending {
            match self.restore(entry_id, Overrides::default()) {
                Ok(id) => report.restored.push(id),
                Err(err) => {
                    warn!("Skipping record {entry_id}: {err}");
                    report.skipped.push((entry_id, err));
                }
            }
        }
        info!(
            "Restored {} custom drone(s), skipped {}",
            report.restored.len(),
            report.skipped.len()
        );
        report
    }

    /// Convert a live drone into a portable item
    ///
    /// Live state is encoded into the record before the drone is destroyed;
    /// if encoding fails the drone stays placed and nothing is written.
    pub fn pick_up(&mut self, entry_id: EntryId) -> Result<CarriedItem, LifecycleError> {
        let drone = self
            .simulation
            .get_mut(entry_id)
            .ok_or(LifecycleError::NotLive { entry_id })?;
        if !drone.state().can_transition(LifecycleState::Carried) {
            return Err(LifecycleError::InvalidTransition {
                from: drone.state().name(),
                to: LifecycleState::Carried.name(),
            });
        }
        let bytes = drone
            .encode()
            .map_err(|source| LifecycleError::Codec { entry_id, source })?;
        drone.transition(LifecycleState::Carried)?;
        let skin = drone.core().type_handle().skin();

        let mut record = DataBuffer::new(entry_id, bytes.to_vec());
        record.is_item = true;
        self.store.insert(entry_id, record);

        self.finish(entry_id, DestroyReason::PickedUp)?;
        Ok(CarriedItem { entry_id, skin })
    }

    /// Destroy a live drone
    ///
    /// A drone that was picked up keeps its record for the item; any other
    /// drone's record is removed.
    pub fn destroy(&mut self, entry_id: EntryId) -> Result<(), LifecycleError> {
        self.finish(entry_id, DestroyReason::Killed)
    }

    fn finish(&mut self, entry_id: EntryId, reason: DestroyReason) -> Result<(), LifecycleError> {
        let drone = self
            .simulation
            .get(entry_id)
            .ok_or(LifecycleError::NotLive { entry_id })?;
        if !drone.state().can_transition(LifecycleState::Destroyed) {
            return Err(LifecycleError::InvalidTransition {
                from: drone.state().name(),
                to: LifecycleState::Destroyed.name(),
            });
        }

        let Some(mut drone) = self.simulation.remove(entry_id) else {
            return Err(LifecycleError::NotLive { entry_id });
        };
        let was_carried = drone.state() == LifecycleState::Carried;
        drone.transition(LifecycleState::Destroyed)?;
        drone.notify_destroyed(reason);
        self.host.release_identity(entry_id);

        if !was_carried && reason == DestroyReason::Killed {
            self.store.remove(entry_id);
        }
        Ok(())
    }

    /// Re-encode one live drone into its record
    pub fn flush(&mut self, entry_id: EntryId) -> Result<(), LifecycleError> {
        let drone = self
            .simulation
            .get(entry_id)
            .ok_or(LifecycleError::NotLive { entry_id })?;
        let bytes = drone
            .encode()
            .map_err(|source| LifecycleError::Codec { entry_id, source })?;
        self.store.insert(entry_id, DataBuffer::new(entry_id, bytes.to_vec()));
        Ok(())
    }

    /// Re-encode every live drone into its record
    ///
    /// Returns the number of drones flushed; drones that fail to encode keep
    /// their previous record and are logged.
    pub fn flush_all(&mut self) -> usize {
        let mut flushed = 0;
        for entry_id in self.simulation.entry_ids() {
            match self.flush(entry_id) {
                Ok(()) => flushed += 1,
                Err(err) => error!("Could not flush drone {entry_id}: {err}"),
            }
        }
        flushed
    }

    /// Flush and release every live drone, keeping all records
    ///
    /// Every drone ends up destroyed with its last good state in storage, so
    /// the next startup restores it.
    pub fn unload_all(&mut self) -> usize {
        let ids = self.simulation.entry_ids();
        for entry_id in &ids {
            if let Err(err) = self.flush(*entry_id) {
                error!("Could not flush drone {entry_id} on unload, keeping its previous record: {err}");
            }
            if let Err(err) = self.finish(*entry_id, DestroyReason::Unloaded) {
                error!("Could not unload drone {entry_id}: {err}");
            }
        }
        ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PayloadReader, PayloadWriter, HEADER_SIZE};
    use crate::drone::{DroneBehavior, UpdateContext};
    use crate::error::CodecError;
    use crate::host::StaticHost;
    use crate::scheduler::Simulation;
    use std::any::Any;
    use std::time::Duration;

    #[derive(Default)]
    struct Beacon {
        pulses: u32,
    }

    impl DroneBehavior for Beacon {
        fn on_serialize_extra(&self, writer: &mut PayloadWriter<'_>) -> Result<(), CodecError> {
            writer.write_u32(self.pulses)
        }

        fn on_deserialize_extra(&mut self, reader: &mut PayloadReader<'_>) -> Result<(), CodecError> {
            self.pulses = reader.read_u32()?;
            Ok(())
        }

        fn on_decision_update(&mut self, _ctx: &mut UpdateContext<'_>) {
            self.pulses += 1;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Fixture {
        store: RecordStore,
        registry: TypeRegistry,
        simulation: Simulation,
        host: StaticHost,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = TypeRegistry::new();
            registry.register_type::<Beacon>("beacon", 42).unwrap();
            Fixture {
                store: RecordStore::new(),
                registry,
                simulation: Simulation::new(Duration::from_millis(50), Duration::from_secs(1), Duration::ZERO),
                host: StaticHost::default(),
            }
        }

        fn lifecycle(&mut self) -> Lifecycle<'_> {
            Lifecycle::new(&mut self.store, &self.registry, &mut self.simulation, &mut self.host)
        }
    }

    #[test]
    fn test_spawn_writes_record() {
        let mut fx = Fixture::new();
        let id = fx.lifecycle().spawn(42, Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO).unwrap();

        let record = fx.store.get(id).unwrap();
        assert!(!record.is_item);
        let (header, _) = codec::decode(&record.raw_data).unwrap();
        assert_eq!(header.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(header.type_tag, fx.registry.get("beacon").unwrap().tag());

        assert!(fx.simulation.contains(id));
        assert_eq!(fx.simulation.get(id).unwrap().state(), LifecycleState::Placed);
        assert!(fx.host.identity(id).is_some());
    }

    #[test]
    fn test_spawn_unknown_skin() {
        let mut fx = Fixture::new();
        let err = fx.lifecycle().spawn(7, Vec3::ZERO, Vec3::ZERO).unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownSkin { skin: 7 }));
        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_destroy_removes_record() {
        let mut fx = Fixture::new();
        let id = fx.lifecycle().spawn(42, Vec3::ZERO, Vec3::ZERO).unwrap();
        fx.lifecycle().destroy(id).unwrap();
        assert!(!fx.store.contains(id));
        assert!(fx.simulation.is_empty());
        assert!(fx.host.identity(id).is_none());
        assert!(matches!(fx.lifecycle().destroy(id), Err(LifecycleError::NotLive { .. })));
    }

    #[test]
    fn test_pick_up_keeps_record_as_item() {
        let mut fx = Fixture::new();
        let id = fx.lifecycle().spawn(42, Vec3::ZERO, Vec3::ZERO).unwrap();
        fx.simulation.get_mut(id).unwrap().core_mut().health = 0.25;

        let item = fx.lifecycle().pick_up(id).unwrap();
        assert_eq!(item, CarriedItem { entry_id: id, skin: 42 });
        assert!(fx.simulation.is_empty());

        let record = fx.store.get(id).unwrap();
        assert!(record.is_item);
        let (header, _) = codec::decode(&record.raw_data).unwrap();
        assert_eq!(header.health, 0.25);
    }

    #[test]
    fn test_redeploy_restores_payload() {
        let mut fx = Fixture::new();
        let id = fx.lifecycle().spawn(42, Vec3::ZERO, Vec3::ZERO).unwrap();
        fx.simulation
            .get_mut(id)
            .unwrap()
            .behavior_mut()
            .as_any_mut()
            .downcast_mut::<Beacon>()
            .unwrap()
            .pulses = 5;
        let item = fx.lifecycle().pick_up(id).unwrap();

        let placed = fx
            .lifecycle()
            .redeploy(&item, Overrides::default().at(Vec3::new(9.0, 0.0, 9.0)).owned_by(77))
            .unwrap();
        assert_eq!(placed, id);
        assert!(!fx.store.get(id).unwrap().is_item);

        let drone = fx.simulation.get(id).unwrap();
        assert_eq!(drone.behavior_as::<Beacon>().unwrap().pulses, 5);
        assert_eq!(drone.core().position, Vec3::new(9.0, 0.0, 9.0));
        assert_eq!(drone.core().spawn_position, Vec3::new(9.0, 0.0, 9.0));
        assert_eq!(drone.core().owner, 77);
    }

    #[test]
    fn test_summon_live_record_duplicates() {
        let mut fx = Fixture::new();
        let id = fx.lifecycle().spawn(42, Vec3::ZERO, Vec3::ZERO).unwrap();
        let before = fx.store.get(id).unwrap().clone();

        let copy = fx.lifecycle().summon(id, Overrides::default(), false).unwrap();
        assert_ne!(copy, id);
        assert_eq!(fx.store.get(id), Some(&before));
        assert_eq!(fx.store.get(copy).unwrap().raw_data, before.raw_data);
        assert_eq!(fx.simulation.len(), 2);
    }

    #[test]
    fn test_summon_unknown_tag_leaves_record() {
        let mut fx = Fixture::new();
        let id = fx.store.assign_id().unwrap();
        let bytes = codec::encode(&Header::new(0xFFFF_0000), |_| Ok(())).unwrap();
        fx.store.insert(id, DataBuffer::new(id, bytes.to_vec()));

        let err = fx.lifecycle().summon(id, Overrides::default(), false).unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownTypeTag { tag: 0xFFFF_0000, .. }));
        assert!(fx.store.contains(id));

        // A forced duplicate that fails is cleaned up again
        let records_before = fx.store.len();
        assert!(fx.lifecycle().summon(id, Overrides::default(), true).is_err());
        assert_eq!(fx.store.len(), records_before);
    }

    #[test]
    fn test_summon_declined_factory_leaves_record() {
        let mut fx = Fixture::new();
        let handle = fx
            .registry
            .register("ghost", 43, Box::new(|| -> Option<Box<dyn DroneBehavior>> { None }))
            .unwrap();
        let id = fx.store.assign_id().unwrap();
        let bytes = codec::encode(&Header::new(handle.tag()), |_| Ok(())).unwrap();
        fx.store.insert(id, DataBuffer::new(id, bytes.to_vec()));
        let stored = fx.store.get(id).unwrap().clone();

        let err = fx.lifecycle().summon(id, Overrides::default(), false).unwrap_err();
        assert!(matches!(err, LifecycleError::InstantiationFailed { ref name } if name == handle.name()));
        assert_eq!(fx.store.get(id), Some(&stored));
        assert_eq!(fx.store.len(), 1);
        assert!(fx.simulation.is_empty());
        assert!(fx.host.identity(id).is_none());

        assert!(matches!(
            fx.lifecycle().spawn(43, Vec3::ZERO, Vec3::ZERO),
            Err(LifecycleError::InstantiationFailed { .. })
        ));
        assert_eq!(fx.store.len(), 1);
    }

    #[test]
    fn test_restore_all_skips_bad_records() {
        let mut fx = Fixture::new();
        let good = fx.lifecycle().spawn(42, Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO).unwrap();
        fx.lifecycle().unload_all();

        let unknown = fx.store.assign_id().unwrap();
        let bytes = codec::encode(&Header::new(0x0BAD_7A65), |_| Ok(())).unwrap();
        fx.store.insert(unknown, DataBuffer::new(unknown, bytes.to_vec()));
        let short = fx.store.assign_id().unwrap();
        fx.store.insert(short, DataBuffer::new(short, vec![7u8; HEADER_SIZE - 1]));

        let report = fx.lifecycle().restore_all();
        assert_eq!(report.restored, vec![good]);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(
            report.skipped[0],
            (id, LifecycleError::UnknownTypeTag { tag: 0x0BAD_7A65, .. }) if id == unknown
        ));
        assert!(matches!(
            report.skipped[1],
            (id, LifecycleError::Codec { source: CodecError::BufferTooShort { .. }, .. }) if id == short
        ));

        assert_eq!(fx.simulation.entry_ids(), vec![good]);
        assert_eq!(fx.store.ids(), vec![good, unknown, short]);
        assert_eq!(fx.store.get(short).unwrap().raw_data, vec![7u8; HEADER_SIZE - 1]);
    }

    #[test]
    fn test_summon_missing_record() {
        let mut fx = Fixture::new();
        let err = fx.lifecycle().summon(EntryId::new(3), Overrides::default(), false).unwrap_err();
        assert!(matches!(err, LifecycleError::RecordNotFound { .. }));
    }

    #[test]
    fn test_unload_then_restore_all() {
        let mut fx = Fixture::new();
        let a = fx.lifecycle().spawn(42, Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO).unwrap();
        let b = fx.lifecycle().spawn(42, Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO).unwrap();
        let carried = fx.lifecycle().spawn(42, Vec3::ZERO, Vec3::ZERO).unwrap();
        fx.lifecycle().pick_up(carried).unwrap();
        fx.simulation.get_mut(b).unwrap().core_mut().position = Vec3::new(5.0, 5.0, 5.0);

        assert_eq!(fx.lifecycle().unload_all(), 2);
        assert!(fx.simulation.is_empty());
        assert_eq!(fx.store.len(), 3);

        let report = fx.lifecycle().restore_all();
        assert_eq!(report.restored, vec![a, b]);
        assert!(report.skipped.is_empty());
        assert_eq!(fx.simulation.get(b).unwrap().core().position, Vec3::new(5.0, 5.0, 5.0));
        assert!(!fx.simulation.contains(carried));
    }
}
