//! Advertisement data carried by a scan or advertisement report.
//!
//! This is opaque data as far as the coordinator is concerned: it is stored
//! verbatim in the peripheral snapshot and handed to
//! [`HostCentral::find_device_description`][crate::host::HostCentral::find_device_description]
//! during the post-connect pipeline. Parsing the wire representation of an
//! advertisement packet into this struct is the host binding's job, not the
//! coordinator's (see spec §1, "byte-level codecs... out of scope").

use std::collections::HashMap;

use btuuid::BluetoothUuid;

/// Data included in a Bluetooth advertisement or scan response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisementData {
    /// The (possibly shortened) local name of the device (CSS §A.1.2).
    pub local_name: Option<String>,
    /// Manufacturer specific data (CSS §A.1.4).
    pub manufacturer_data: Option<ManufacturerData>,
    /// Service associated data (CSS §A.1.11).
    pub service_data: HashMap<BluetoothUuid, Vec<u8>>,
    /// Advertised GATT service UUIDs (CSS §A.1.1).
    pub service_uuids: Vec<BluetoothUuid>,
    /// Service UUIDs that overflowed the advertisement packet.
    pub overflow_service_uuids: Vec<BluetoothUuid>,
    /// Transmitted power level (CSS §A.1.5).
    pub tx_power_level: Option<i16>,
    /// Set for connectable advertising packets. The coordinator never
    /// consults this itself; it is surfaced for callers that want to decide
    /// whether to attempt a connection.
    pub is_connectable: bool,
    /// Solicited GATT service UUIDs (CSS §A.1.10).
    pub solicited_service_uuids: Vec<BluetoothUuid>,
}

/// Manufacturer specific data included in Bluetooth advertisements. See the
/// Bluetooth Core Specification Supplement §A.1.4 for details.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManufacturerData {
    /// Company identifier (assigned by the Bluetooth SIG).
    pub company_id: u16,
    /// Manufacturer specific data.
    pub data: Vec<u8>,
}
