//! Value identity for a GATT characteristic within a single peripheral.

use btuuid::BluetoothUuid;

/// Identifies a characteristic by the UUID of its parent service and its own
/// UUID. Used as the key for every per-characteristic table the coordinator
/// keeps (the access table, the notification registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicLocator {
    pub service_uuid: BluetoothUuid,
    pub characteristic_uuid: BluetoothUuid,
}

impl CharacteristicLocator {
    pub fn new(service_uuid: BluetoothUuid, characteristic_uuid: BluetoothUuid) -> Self {
        Self {
            service_uuid,
            characteristic_uuid,
        }
    }
}

impl std::fmt::Display for CharacteristicLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service_uuid, self.characteristic_uuid)
    }
}
