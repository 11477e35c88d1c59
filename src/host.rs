//! The seam between the coordinator and a concrete host BLE stack.
//!
//! Everything in this module describes an external collaborator: a real
//! implementation would bind these traits to CoreBluetooth, BlueZ, the
//! Windows Runtime Bluetooth APIs, or a test fake. The coordinator only
//! ever depends on these traits and on [`PeripheralEvent`] — never on a
//! concrete host stack.

use std::collections::HashSet;

use btuuid::BluetoothUuid;

use crate::error::Error;
use crate::locator::CharacteristicLocator;
use crate::properties::CharacteristicProperties;

/// The peripheral's GAP identifier, used by [`HostCentral`] to address a
/// specific peripheral without the coordinator holding a live host object.
pub type PeripheralId = BluetoothUuid;

/// Whether a characteristic write requests an acknowledgement from the
/// peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    /// ATT Write Request; the peripheral must respond.
    WithResponse,
    /// ATT Write Command; unconfirmed, flow-controlled by the host's
    /// "ready to send" signal.
    WithoutResponse,
}

/// The fire-and-forget GATT operations a host peripheral binding issues on
/// behalf of the coordinator.
///
/// Every method here is a request, not a completion: the host stack reports
/// completion asynchronously as a [`PeripheralEvent`] delivered through the
/// [`DelegateBridge`][crate::delegate::DelegateBridge]. This mirrors how
/// CoreBluetooth, BlueZ, and WinRT's Bluetooth GATT APIs all work: you issue
/// an operation and the framework calls you back later, not necessarily on
/// the calling thread.
pub trait HostPeripheral: Send + Sync + 'static {
    /// Discover services, optionally restricted to the given UUIDs.
    fn discover_services(&self, service_uuids: Option<Vec<BluetoothUuid>>);
    /// Discover the characteristics of `service`, optionally restricted to
    /// the given UUIDs.
    fn discover_characteristics(
        &self,
        service: BluetoothUuid,
        characteristic_uuids: Option<Vec<BluetoothUuid>>,
    );
    /// Discover the descriptors of `characteristic`.
    fn discover_descriptors(&self, characteristic: CharacteristicLocator);
    /// Issue a GATT read of `characteristic`'s value.
    fn read_value(&self, characteristic: CharacteristicLocator);
    /// Issue a GATT write of `data` to `characteristic`.
    fn write_value(&self, characteristic: CharacteristicLocator, data: Vec<u8>, write_type: WriteKind);
    /// Enable or disable notifications/indications for `characteristic`.
    fn set_notify_value(&self, characteristic: CharacteristicLocator, notify: bool);
    /// Issue a GATT read of the peripheral's RSSI.
    fn read_rssi(&self);
}

/// The central-manager operations the coordinator calls back into.
///
/// Central-manager scanning and connection orchestration are themselves out
/// of scope (see the crate's design notes); this trait is only the narrow
/// slice the coordinator needs to ask for.
pub trait HostCentral: Send + Sync + 'static {
    /// Request a connection to `peripheral`.
    fn connect(&self, peripheral: PeripheralId);
    /// Request disconnection from `peripheral`.
    fn disconnect(&self, peripheral: PeripheralId);
    /// Resolve the discovery plan for a peripheral from its advertisement
    /// data, if the application has one configured.
    fn find_device_description(
        &self,
        advertisement_data: &crate::advertisement::AdvertisementData,
    ) -> Option<DeviceDescription>;
}

/// A characteristic discovered on a service, as reported by the host stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredCharacteristic {
    pub uuid: BluetoothUuid,
    pub properties: CharacteristicProperties,
}

/// A service discovered on the peripheral, as reported by the host stack.
/// `characteristics` is `None` until characteristic discovery for this
/// service has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: BluetoothUuid,
    pub characteristics: Option<Vec<DiscoveredCharacteristic>>,
}

/// The application's declared interest in a single characteristic of a
/// service, as returned by [`HostCentral::find_device_description`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicDescription {
    pub characteristic_id: BluetoothUuid,
    /// Whether descriptors of this characteristic should also be
    /// discovered once it is found.
    pub discover_descriptors: bool,
}

/// The application's declared interest in a single service: `None`
/// characteristics means "discover all characteristics of this service".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfiguration {
    pub service_id: BluetoothUuid,
    pub characteristics: Option<HashSet<CharacteristicDescription>>,
}

/// The full discovery plan the application wants for a peripheral. `None`
/// (the whole struct absent, i.e. `find_device_description` returning
/// `None`) means "discover everything".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub services: Option<Vec<ServiceConfiguration>>,
}

/// Events forwarded from the host stack's delegate callbacks, in the order
/// the host stack delivered them.
///
/// This is the asynchronous-completion half of [`HostPeripheral`]: each
/// variant here corresponds to one delegate callback named in the crate's
/// external interface notes (`didUpdateValueFor`, `didWriteValueFor`, ...).
#[derive(Debug, Clone)]
pub enum PeripheralEvent {
    /// `didUpdateName`.
    NameUpdated(Option<String>),
    /// `didReadRSSI`.
    RssiRead(Result<i16, Error>),
    /// `didModifyServices`: the listed services were invalidated and must
    /// be rediscovered.
    ServicesModified(Vec<BluetoothUuid>),
    /// `didDiscoverServices`.
    ServicesDiscovered(Result<Vec<BluetoothUuid>, Error>),
    /// `didDiscoverCharacteristicsFor`.
    CharacteristicsDiscovered {
        service: BluetoothUuid,
        result: Result<Vec<DiscoveredCharacteristic>, Error>,
    },
    /// `didDiscoverDescriptorsFor`.
    DescriptorsDiscovered {
        characteristic: CharacteristicLocator,
        result: Result<(), Error>,
    },
    /// `didUpdateValueFor`: delivered both for read completions and for
    /// unsolicited notifications/indications.
    ValueUpdated {
        characteristic: CharacteristicLocator,
        result: Result<Vec<u8>, Error>,
    },
    /// `didWriteValueFor` (write-with-response only; WWR has no completion
    /// callback).
    ValueWritten {
        characteristic: CharacteristicLocator,
        result: Result<(), Error>,
    },
    /// `didUpdateNotificationStateFor`.
    NotificationStateUpdated {
        characteristic: CharacteristicLocator,
        result: Result<bool, Error>,
    },
    /// `peripheralIsReadyToSendWriteWithoutResponse`.
    ReadyToSendWriteWithoutResponse,
}
