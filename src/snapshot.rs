//! An observable, read-mostly snapshot of peripheral state.
//!
//! Readers outside the coordinator's isolation domain (typically UI code)
//! read this directly; only the coordinator's actor task ever writes to it.
//! It is implemented as a single [`RwLock`] around all fields rather than
//! per-field atomics: the spec explicitly sanctions "a read-mostly lock" and
//! does not require cross-field atomicity, so one lock covering the whole
//! struct is the simplest implementation that satisfies the contract (and
//! incidentally gives callers cross-field consistency they are not required
//! to rely on).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use btuuid::BluetoothUuid;

use crate::advertisement::AdvertisementData;
use crate::host::{CharacteristicDescription, DiscoveredService};

/// The peripheral's connection state, mirrored from the host peripheral
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeripheralConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// The discovery plan for a single service: `None` means "discover all
/// characteristics of this service".
pub type RequestedCharacteristics = Option<HashSet<CharacteristicDescription>>;

struct SnapshotData {
    name: Option<String>,
    rssi: i16,
    advertisement_data: AdvertisementData,
    state: PeripheralConnectionState,
    services: Option<Vec<DiscoveredService>>,
    last_activity: Instant,
    requested_characteristics: Option<HashMap<BluetoothUuid, RequestedCharacteristics>>,
}

/// A thread-safe observable snapshot of a peripheral's state.
///
/// Cloning a `PeripheralStateSnapshot` is cheap (it is an `Arc` handle); all
/// clones observe the same underlying state.
#[derive(Clone)]
pub struct PeripheralStateSnapshot {
    inner: Arc<RwLock<SnapshotData>>,
}

impl PeripheralStateSnapshot {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SnapshotData {
                name: None,
                rssi: 0,
                advertisement_data: AdvertisementData::default(),
                state: PeripheralConnectionState::Disconnected,
                services: None,
                last_activity: Instant::now(),
                requested_characteristics: None,
            })),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SnapshotData> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SnapshotData> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The last observed GAP name.
    pub fn name(&self) -> Option<String> {
        self.read().name.clone()
    }

    /// The latest RSSI sample, in dBm.
    pub fn rssi(&self) -> i16 {
        self.read().rssi
    }

    /// The last advertisement seen for this peripheral.
    pub fn advertisement_data(&self) -> AdvertisementData {
        self.read().advertisement_data.clone()
    }

    /// The peripheral's current connection state.
    pub fn state(&self) -> PeripheralConnectionState {
        self.read().state
    }

    /// The discovered services, or `None` if no discovery has completed
    /// since the last (re)connect.
    pub fn services(&self) -> Option<Vec<DiscoveredService>> {
        self.read().services.clone()
    }

    /// The active discovery plan, assigned once per connect attempt.
    pub fn requested_characteristics(
        &self,
    ) -> Option<HashMap<BluetoothUuid, RequestedCharacteristics>> {
        self.read().requested_characteristics.clone()
    }

    /// The time of last activity (an advertisement, or the moment of
    /// disconnect). While `state() != Disconnected` the effective value for
    /// staleness purposes is "now" (see [`is_stale`][Self::is_stale]).
    pub fn last_activity(&self) -> Instant {
        self.read().last_activity
    }

    /// True iff the peripheral is disconnected and has not advertised or
    /// connected within `interval`.
    pub fn is_stale(&self, interval: Duration) -> bool {
        let data = self.read();
        data.state == PeripheralConnectionState::Disconnected
            && data.last_activity.elapsed() > interval
    }

    pub(crate) fn set_name(&self, name: Option<String>) {
        self.write().name = name;
    }

    pub(crate) fn set_rssi(&self, rssi: i16) {
        self.write().rssi = rssi;
    }

    pub(crate) fn set_advertisement_data(&self, advertisement_data: AdvertisementData) {
        let mut data = self.write();
        data.advertisement_data = advertisement_data;
        data.last_activity = Instant::now();
    }

    pub(crate) fn set_state(&self, state: PeripheralConnectionState) {
        self.write().state = state;
    }

    pub(crate) fn set_services(&self, services: Option<Vec<DiscoveredService>>) {
        self.write().services = services;
    }

    pub(crate) fn set_requested_characteristics(
        &self,
        plan: Option<HashMap<BluetoothUuid, RequestedCharacteristics>>,
    ) {
        self.write().requested_characteristics = plan;
    }

    /// Stamps `last_activity` to `now - grace`, per the disconnect cleanup
    /// contract (spec §4.3 step 7): `grace` is zero unless the owning
    /// central implements a staleness grace window.
    pub(crate) fn mark_disconnected(&self, grace: Duration) {
        let mut data = self.write();
        data.state = PeripheralConnectionState::Disconnected;
        data.last_activity = Instant::now().checked_sub(grace).unwrap_or(data.last_activity);
    }
}
