//! A per-peripheral coordinator mediating logical GATT read/write/notify
//! operations against a host Bluetooth LE stack.
//!
//! This crate does not talk to Bluetooth hardware, a platform Bluetooth
//! framework, or a central manager itself. It implements the bookkeeping
//! that sits between application code and a host binding: read coalescing,
//! write serialization, write-without-response flow control, RSSI
//! coalescing, notification fan-out, and the post-connect/disconnect
//! pipelines, all driven through a single ordered actor task per
//! peripheral.
//!
//! A concrete host binding (CoreBluetooth, BlueZ, WinRT, or a test fake)
//! implements [`host::HostPeripheral`] and [`host::HostCentral`] and feeds
//! [`host::PeripheralEvent`]s into the [`delegate::DelegateBridge`] handed
//! back by [`coordinator::Coordinator::new`].

mod access_table;
mod actor;
mod advertisement;
mod delegate;
mod error;
mod host;
mod locator;
mod notifications;
mod properties;
mod rssi_queue;
mod snapshot;
mod wwr_gate;

mod coordinator;

pub use advertisement::{AdvertisementData, ManufacturerData};
pub use coordinator::Coordinator;
pub use delegate::DelegateBridge;
pub use error::{Error, Result};
pub use host::{
    CharacteristicDescription, DeviceDescription, DiscoveredCharacteristic, DiscoveredService,
    HostCentral, HostPeripheral, PeripheralEvent, PeripheralId, ServiceConfiguration, WriteKind,
};
pub use locator::CharacteristicLocator;
pub use notifications::{NotificationHandler, Subscription, SubscriptionId};
pub use properties::CharacteristicProperties;
pub use snapshot::{PeripheralConnectionState, PeripheralStateSnapshot, RequestedCharacteristics};
