//! The coordinator's single-threaded isolation domain (spec §2, §4.2-§4.8,
//! C5/C9's private half).
//!
//! Every public operation and every host delegate callback is funneled
//! through one `mpsc` channel into [`run`], which processes messages
//! strictly in arrival order on a single task. This is the mechanical
//! equivalent of "a single logical serial execution context": nothing here
//! ever touches a `Mutex`, because only one task ever runs this code.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use btuuid::BluetoothUuid;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

use crate::access_table::{AccessTable, ReadAttempt, WriteAttempt};
use crate::advertisement::AdvertisementData;
use crate::error::{Error, Result};
use crate::host::{
    DeviceDescription, DiscoveredCharacteristic, DiscoveredService, HostCentral, HostPeripheral,
    PeripheralEvent, PeripheralId, WriteKind,
};
use crate::locator::CharacteristicLocator;
use crate::notifications::{NotificationHandler, NotificationRegistry, SubscriptionId};
use crate::properties::CharacteristicProperties;
use crate::rssi_queue::{RssiAttempt, RssiReadQueue};
use crate::snapshot::{PeripheralConnectionState, PeripheralStateSnapshot, RequestedCharacteristics};
use crate::wwr_gate::{WwrAttempt, WwrWake, WriteWithoutResponseGate};

/// Everything sent into the actor's queue: a public-API request, or a host
/// delegate event.
pub(crate) enum ActorMessage {
    Request(Request),
    Event(PeripheralEvent),
}

/// What the caller of `AccessTable::try_read` should do, translated across
/// the `mpsc` boundary: the actor has already issued the GATT read (if
/// needed) by the time it replies, so the caller only ever has to wait on
/// one of these two receivers.
pub(crate) enum ReadReply {
    Value(oneshot::Receiver<Result<Vec<u8>>>),
    Retry(oneshot::Receiver<()>),
}

pub(crate) enum WriteReply {
    Value(oneshot::Receiver<Result<()>>),
    Retry(oneshot::Receiver<()>),
}

pub(crate) enum WwrReply {
    /// The write was issued synchronously; nothing further to await.
    Done,
    Wait(oneshot::Receiver<WwrWake>),
}

pub(crate) enum Request {
    Connect {
        reply: oneshot::Sender<()>,
    },
    Disconnect,
    HandleConnected {
        advertisement_data: AdvertisementData,
    },
    HandleDisconnected {
        grace: Duration,
    },
    TryRead {
        locator: CharacteristicLocator,
        reply: oneshot::Sender<ReadReply>,
    },
    TryWrite {
        locator: CharacteristicLocator,
        data: Vec<u8>,
        reply: oneshot::Sender<WriteReply>,
    },
    TryWriteWithoutResponse {
        locator: CharacteristicLocator,
        data: Vec<u8>,
        reply: oneshot::Sender<WwrReply>,
    },
    TryReadRssi {
        reply: oneshot::Sender<oneshot::Receiver<Result<i16>>>,
    },
    RegisterNotification {
        locator: CharacteristicLocator,
        handler: NotificationHandler,
        reply: oneshot::Sender<SubscriptionId>,
    },
    DeregisterNotification {
        locator: CharacteristicLocator,
        id: SubscriptionId,
    },
}

/// The actor's owned state: every component the spec's cooperative-actor
/// algorithms need, plus the host handles it drives.
pub(crate) struct ActorState {
    peripheral_id: PeripheralId,
    host: Arc<dyn HostPeripheral>,
    central: Weak<dyn HostCentral>,
    snapshot: PeripheralStateSnapshot,
    access_table: AccessTable,
    notifications: NotificationRegistry,
    wwr_gate: WriteWithoutResponseGate,
    rssi_queue: RssiReadQueue,
    /// The discovery plan resolved at the start of the current connection,
    /// or `None` before the first connect or after disconnect.
    device_description: Option<DeviceDescription>,
}

impl ActorState {
    pub(crate) fn new(
        peripheral_id: PeripheralId,
        host: Arc<dyn HostPeripheral>,
        central: Weak<dyn HostCentral>,
        snapshot: PeripheralStateSnapshot,
    ) -> Self {
        Self {
            peripheral_id,
            host,
            central,
            snapshot,
            access_table: AccessTable::new(),
            notifications: NotificationRegistry::new(),
            wwr_gate: WriteWithoutResponseGate::new(),
            rssi_queue: RssiReadQueue::new(),
            device_description: None,
        }
    }
}

/// Drives the actor's message loop until the coordinator (and every clone
/// of its sender) is dropped.
pub(crate) async fn run(mut state: ActorState, mut receiver: mpsc::UnboundedReceiver<ActorMessage>) {
    while let Some(message) = receiver.recv().await {
        match message {
            ActorMessage::Request(request) => state.handle_request(request),
            ActorMessage::Event(event) => state.handle_event(event).await,
        }
    }
    trace!(peripheral = %state.peripheral_id, "coordinator actor exiting: no senders remain");
}

impl ActorState {
    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect { reply } => self.handle_connect_request(reply),
            Request::Disconnect => self.handle_disconnect_request(),
            Request::HandleConnected { advertisement_data } => {
                self.handle_connected(advertisement_data)
            }
            Request::HandleDisconnected { grace } => self.handle_disconnected(grace),
            Request::TryRead { locator, reply } => self.handle_try_read(locator, reply),
            Request::TryWrite { locator, data, reply } => self.handle_try_write(locator, data, reply),
            Request::TryWriteWithoutResponse { locator, data, reply } => {
                self.handle_try_wwr(locator, data, reply)
            }
            Request::TryReadRssi { reply } => self.handle_try_read_rssi(reply),
            Request::RegisterNotification { locator, handler, reply } => {
                self.handle_register_notification(locator, handler, reply)
            }
            Request::DeregisterNotification { locator, id } => {
                self.handle_deregister_notification(locator, id)
            }
        }
    }

    fn handle_connect_request(&mut self, reply: oneshot::Sender<()>) {
        self.snapshot.set_state(PeripheralConnectionState::Connecting);
        match self.central.upgrade() {
            Some(central) => central.connect(self.peripheral_id),
            None => warn!(
                peripheral = %self.peripheral_id,
                "connect requested but the central is gone (orphaned peripheral)"
            ),
        }
        let _ = reply.send(());
    }

    fn handle_disconnect_request(&mut self) {
        self.snapshot.set_state(PeripheralConnectionState::Disconnecting);
        for locator in self.notifications.registered_locators() {
            self.host.set_notify_value(locator, false);
        }
        match self.central.upgrade() {
            Some(central) => central.disconnect(self.peripheral_id),
            None => warn!(
                peripheral = %self.peripheral_id,
                "disconnect requested but the central is gone (orphaned peripheral)"
            ),
        }
    }

    /// Post-connect pipeline (spec §4.6): resolve the discovery plan, mirror
    /// it onto the snapshot, and kick off service discovery.
    fn handle_connected(&mut self, advertisement_data: AdvertisementData) {
        self.snapshot.set_advertisement_data(advertisement_data.clone());
        self.snapshot.set_state(PeripheralConnectionState::Connected);

        let description = self
            .central
            .upgrade()
            .and_then(|central| central.find_device_description(&advertisement_data));

        let mirrored = description
            .as_ref()
            .and_then(|d| d.services.as_ref())
            .map(|list| {
                list.iter()
                    .map(|s| (s.service_id, s.characteristics.clone()))
                    .collect::<HashMap<BluetoothUuid, RequestedCharacteristics>>()
            });
        self.snapshot.set_requested_characteristics(mirrored);

        let service_uuids = description
            .as_ref()
            .and_then(|d| d.services.as_ref())
            .map(|list| list.iter().map(|s| s.service_id).collect());
        self.device_description = description;
        self.host.discover_services(service_uuids);
    }

    /// Disconnect cleanup (spec §4.3): every in-flight request fails with
    /// `NotPresent`/`PeripheralNotPresent`, every queued resumer is woken,
    /// and the discovery state is cleared. Notification *registrations*
    /// (app-level interest) are not cleared: they are re-asserted on the
    /// wire once characteristics are rediscovered after a reconnect.
    fn handle_disconnected(&mut self, grace: Duration) {
        self.access_table.drain_on_disconnect();
        self.wwr_gate.drain_on_disconnect();
        self.rssi_queue.drain_on_disconnect();
        self.snapshot.set_services(None);
        self.snapshot.set_requested_characteristics(None);
        self.device_description = None;
        self.snapshot.mark_disconnected(grace);
    }

    fn handle_try_read(&mut self, locator: CharacteristicLocator, reply: oneshot::Sender<ReadReply>) {
        let outcome = match self.access_table.try_read(locator) {
            ReadAttempt::Attach { issue, receiver } => {
                if issue {
                    self.host.read_value(locator);
                }
                ReadReply::Value(receiver)
            }
            ReadAttempt::Wait(receiver) => ReadReply::Retry(receiver),
        };
        let _ = reply.send(outcome);
    }

    fn handle_try_write(
        &mut self,
        locator: CharacteristicLocator,
        data: Vec<u8>,
        reply: oneshot::Sender<WriteReply>,
    ) {
        let outcome = match self.access_table.try_write(locator) {
            WriteAttempt::Installed(receiver) => {
                self.host.write_value(locator, data, WriteKind::WithResponse);
                WriteReply::Value(receiver)
            }
            WriteAttempt::Wait(receiver) => WriteReply::Retry(receiver),
        };
        let _ = reply.send(outcome);
    }

    fn handle_try_wwr(
        &mut self,
        locator: CharacteristicLocator,
        data: Vec<u8>,
        reply: oneshot::Sender<WwrReply>,
    ) {
        let outcome = match self.wwr_gate.try_admit() {
            WwrAttempt::Admitted => {
                self.host.write_value(locator, data, WriteKind::WithoutResponse);
                WwrReply::Done
            }
            WwrAttempt::Wait(receiver) => WwrReply::Wait(receiver),
        };
        let _ = reply.send(outcome);
    }

    fn handle_try_read_rssi(&mut self, reply: oneshot::Sender<oneshot::Receiver<Result<i16>>>) {
        let RssiAttempt::Attach { issue, receiver } = self.rssi_queue.try_attach();
        if issue {
            self.host.read_rssi();
        }
        let _ = reply.send(receiver);
    }

    fn handle_register_notification(
        &mut self,
        locator: CharacteristicLocator,
        handler: NotificationHandler,
        reply: oneshot::Sender<SubscriptionId>,
    ) {
        let (id, is_first) = self.notifications.register(locator, handler);
        if is_first && self.characteristic_supports_notify(locator) {
            self.host.set_notify_value(locator, true);
        }
        let _ = reply.send(id);
    }

    /// Prerequisites from spec §4.5: the service is discovered, the
    /// characteristic is discovered within it, and it advertises `notify`.
    /// If any is missing, registration is still recorded (by the caller)
    /// but nothing is issued on the wire yet — the post-connect pipeline
    /// (`handle_characteristics_discovered`) arms it once discovery catches
    /// up (invariant 7).
    fn characteristic_supports_notify(&self, locator: CharacteristicLocator) -> bool {
        self.snapshot
            .services()
            .into_iter()
            .flatten()
            .find(|service| service.uuid == locator.service_uuid)
            .and_then(|service| service.characteristics)
            .into_iter()
            .flatten()
            .any(|c| c.uuid == locator.characteristic_uuid && c.properties.contains(CharacteristicProperties::NOTIFY))
    }

    fn handle_deregister_notification(&mut self, locator: CharacteristicLocator, id: SubscriptionId) {
        let was_last = self.notifications.deregister(locator, id);
        if was_last {
            self.host.set_notify_value(locator, false);
        }
    }

    async fn handle_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::NameUpdated(name) => self.snapshot.set_name(name),
            PeripheralEvent::RssiRead(result) => {
                if let Ok(value) = &result {
                    self.snapshot.set_rssi(*value);
                }
                self.rssi_queue.resolve(result);
            }
            PeripheralEvent::ServicesModified(service_uuids) => {
                self.handle_services_modified(service_uuids)
            }
            PeripheralEvent::ServicesDiscovered(result) => self.handle_services_discovered(result),
            PeripheralEvent::CharacteristicsDiscovered { service, result } => {
                self.handle_characteristics_discovered(service, result)
            }
            PeripheralEvent::DescriptorsDiscovered { characteristic, result } => {
                if let Err(error) = result {
                    warn!(%characteristic, %error, "descriptor discovery failed");
                }
            }
            PeripheralEvent::ValueUpdated { characteristic, result } => {
                self.handle_value_updated(characteristic, result).await
            }
            PeripheralEvent::ValueWritten { characteristic, result } => {
                if !self.access_table.resolve_write(characteristic, result) {
                    warn!(%characteristic, "discarded write completion with no matching in-flight write");
                }
            }
            PeripheralEvent::NotificationStateUpdated { characteristic, result } => {
                match result {
                    Ok(enabled) => trace!(%characteristic, enabled, "notification state updated"),
                    Err(error) => warn!(%characteristic, %error, "failed to update notification state"),
                }
            }
            PeripheralEvent::ReadyToSendWriteWithoutResponse => self.wwr_gate.ready_to_send(),
        }
    }

    fn handle_services_modified(&mut self, service_uuids: Vec<BluetoothUuid>) {
        let mut services = self.snapshot.services().unwrap_or_default();
        services.retain(|s| !service_uuids.contains(&s.uuid));
        self.snapshot.set_services(Some(services));

        let restricted = if service_uuids.is_empty() {
            None
        } else {
            Some(service_uuids)
        };
        self.host.discover_services(restricted);
    }

    fn handle_services_discovered(&mut self, result: Result<Vec<BluetoothUuid>, Error>) {
        let discovered = match result {
            Ok(discovered) => discovered,
            Err(error) => {
                warn!(%error, "service discovery failed");
                return;
            }
        };

        let wanted: Vec<BluetoothUuid> = match self.configured_service_uuids() {
            Some(configured) => discovered
                .into_iter()
                .filter(|uuid| configured.contains(uuid))
                .collect(),
            None => discovered,
        };

        let services = wanted
            .iter()
            .map(|uuid| DiscoveredService { uuid: *uuid, characteristics: None })
            .collect();
        self.snapshot.set_services(Some(services));

        for uuid in wanted {
            let characteristic_uuids = self.configured_characteristic_uuids(uuid);
            self.host.discover_characteristics(uuid, characteristic_uuids);
        }
    }

    fn handle_characteristics_discovered(
        &mut self,
        service: BluetoothUuid,
        result: Result<Vec<DiscoveredCharacteristic>, Error>,
    ) {
        let characteristics = match result {
            Ok(characteristics) => characteristics,
            Err(error) => {
                warn!(%service, %error, "characteristic discovery failed");
                return;
            }
        };

        let mut services = self.snapshot.services().unwrap_or_default();
        if let Some(entry) = services.iter_mut().find(|s| s.uuid == service) {
            entry.characteristics = Some(characteristics.clone());
        }
        self.snapshot.set_services(Some(services));

        for characteristic in characteristics {
            let locator = CharacteristicLocator::new(service, characteristic.uuid);
            let notify_capable = characteristic.properties.contains(CharacteristicProperties::NOTIFY);
            if notify_capable && self.notifications.has_handlers(&locator) {
                self.host.set_notify_value(locator, true);
            }
            if self.should_discover_descriptors(service, characteristic.uuid) {
                self.host.discover_descriptors(locator);
            }
        }
    }

    async fn handle_value_updated(&mut self, characteristic: CharacteristicLocator, result: Result<Vec<u8>>) {
        if self.access_table.resolve_read(characteristic, result.clone()) {
            return;
        }
        match result {
            Ok(value) => self.fan_out_notification(characteristic, value).await,
            Err(error) => warn!(%characteristic, %error, "unsolicited value update reported an error"),
        }
    }

    /// Fans a single notification/indication out to every registered
    /// handler, sequentially and in registration order (spec §4.5). Awaited
    /// inline by the actor: spec §5 requires fan-out for one callback to be
    /// sequential and fan-out across callbacks to follow callback arrival
    /// order, which only holds if a slow handler's delay is visible to the
    /// actor rather than raced against on a detached task.
    async fn fan_out_notification(&self, characteristic: CharacteristicLocator, value: Vec<u8>) {
        let handlers = self.notifications.handlers_for(&characteristic);
        if handlers.is_empty() {
            trace!(%characteristic, "dropped unsolicited value update: no registered handler");
            return;
        }
        for (_, handler) in handlers {
            handler(value.clone()).await;
        }
    }

    fn configured_service_uuids(&self) -> Option<Vec<BluetoothUuid>> {
        let services = self.device_description.as_ref()?.services.as_ref()?;
        Some(services.iter().map(|s| s.service_id).collect())
    }

    fn configured_characteristic_uuids(&self, service: BluetoothUuid) -> Option<Vec<BluetoothUuid>> {
        let services = self.device_description.as_ref()?.services.as_ref()?;
        let config = services.iter().find(|s| s.service_id == service)?;
        let characteristics = config.characteristics.as_ref()?;
        Some(characteristics.iter().map(|c| c.characteristic_id).collect())
    }

    fn should_discover_descriptors(&self, service: BluetoothUuid, characteristic: BluetoothUuid) -> bool {
        self.device_description
            .as_ref()
            .and_then(|d| d.services.as_ref())
            .and_then(|list| list.iter().find(|s| s.service_id == service))
            .and_then(|s| s.characteristics.as_ref())
            .and_then(|set| set.iter().find(|c| c.characteristic_id == characteristic))
            .map(|c| c.discover_descriptors)
            .unwrap_or(false)
    }
}
