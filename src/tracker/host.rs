// Game host abstraction for the session tracker
// The tracker only needs to know which vehicle the local actor is in and whether they drive it

use std::collections::HashMap;

/// Handle of a vehicle instance in the host world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleHandle(pub u32);

/// Read-only view of the host game state
pub trait VehicleHost {
    /// Vehicle the local actor currently occupies, in any seat
    fn current_vehicle(&self) -> Option<VehicleHandle>;

    /// Whether the local actor sits in the driver seat of `vehicle`
    fn is_local_driver(&self, vehicle: VehicleHandle) -> bool;

    /// Display name of the vehicle's model
    fn display_name(&self, vehicle: VehicleHandle) -> Option<String>;

    /// Network identifier shared with other participants
    fn network_id(&self, vehicle: VehicleHandle) -> u32;
}

#[derive(Debug, Clone)]
struct ScriptedVehicle {
    display_name: String,
    net_id: u32,
}

/// In-memory host world driven by explicit calls.
/// Backs the `drive` command and tracker tests.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    vehicles: HashMap<VehicleHandle, ScriptedVehicle>,
    occupied: Option<(VehicleHandle, bool)>,
    next_handle: u32,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a vehicle instance of the given model
    pub fn spawn_vehicle(&mut self, display_name: &str) -> VehicleHandle {
        self.next_handle += 1;
        let handle = VehicleHandle(self.next_handle);
        self.vehicles.insert(
            handle,
            ScriptedVehicle {
                display_name: display_name.to_string(),
                net_id: 1000 + self.next_handle,
            },
        );
        handle
    }

    /// Put the local actor into `vehicle`
    pub fn enter(&mut self, vehicle: VehicleHandle, as_driver: bool) {
        if self.vehicles.contains_key(&vehicle) {
            self.occupied = Some((vehicle, as_driver));
        }
    }

    pub fn leave(&mut self) -> Option<VehicleHandle> {
        self.occupied.take().map(|(vehicle, _)| vehicle)
    }

    /// Delete the instance; the actor is ejected if inside
    pub fn remove_vehicle(&mut self, vehicle: VehicleHandle) {
        self.vehicles.remove(&vehicle);
        if matches!(self.occupied, Some((v, _)) if v == vehicle) {
            self.occupied = None;
        }
    }
}

impl VehicleHost for ScriptedHost {
    fn current_vehicle(&self) -> Option<VehicleHandle> {
        self.occupied.map(|(vehicle, _)| vehicle)
    }

    fn is_local_driver(&self, vehicle: VehicleHandle) -> bool {
        matches!(self.occupied, Some((v, true)) if v == vehicle)
    }

    fn display_name(&self, vehicle: VehicleHandle) -> Option<String> {
        self.vehicles.get(&vehicle).map(|v| v.display_name.clone())
    }

    fn network_id(&self, vehicle: VehicleHandle) -> u32 {
        self.vehicles.get(&vehicle).map(|v| v.net_id).unwrap_or(0)
    }
}
