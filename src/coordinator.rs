//! The coordinator's public API (spec §2/§4, C9).
//!
//! A [`Coordinator`] is a cheap, cloneable handle onto one peripheral's
//! actor task. Construction spawns that task and hands back a
//! [`DelegateBridge`] for the concrete host binding to feed delegate
//! callbacks through.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::actor::{self, ActorMessage, ActorState, ReadReply, Request, WriteReply, WwrReply};
use crate::advertisement::AdvertisementData;
use crate::delegate::DelegateBridge;
use crate::error::{Error, Result};
use crate::host::{HostCentral, HostPeripheral, PeripheralId};
use crate::locator::CharacteristicLocator;
use crate::notifications::{NotificationHandler, Subscription, SubscriptionId, SubscriptionOwner};
use crate::snapshot::PeripheralStateSnapshot;
use crate::wwr_gate::WwrWake;

struct CoordinatorInner {
    peripheral_id: PeripheralId,
    sender: mpsc::UnboundedSender<ActorMessage>,
    snapshot: PeripheralStateSnapshot,
}

impl SubscriptionOwner for CoordinatorInner {
    fn deregister_subscription(&self, locator: CharacteristicLocator, id: SubscriptionId) {
        let _ = self
            .sender
            .send(ActorMessage::Request(Request::DeregisterNotification { locator, id }));
    }
}

/// Coordinates logical GATT access to a single peripheral, mediating
/// between application requests and a host BLE stack.
///
/// Cloning a `Coordinator` is cheap and every clone shares the same
/// underlying actor task and observable state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Spawns the coordinator's actor task for `peripheral_id` and returns
    /// a handle to it alongside the [`DelegateBridge`] a concrete host
    /// binding should feed [`PeripheralEvent`][crate::host::PeripheralEvent]s
    /// into.
    ///
    /// `central` is held weakly: the coordinator asks the central manager to
    /// connect/disconnect on the application's behalf, but does not keep it
    /// alive by itself (an orphaned peripheral — its central gone — degrades
    /// its `connect`/`disconnect` requests to a logged warning rather than a
    /// panic or a surfaced error).
    pub fn new(
        peripheral_id: PeripheralId,
        host: Arc<dyn HostPeripheral>,
        central: Weak<dyn HostCentral>,
    ) -> (Coordinator, DelegateBridge) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let snapshot = PeripheralStateSnapshot::new();
        let state = ActorState::new(peripheral_id, host, central, snapshot.clone());
        tokio::spawn(actor::run(state, receiver));

        let inner = Arc::new(CoordinatorInner {
            peripheral_id,
            sender,
            snapshot,
        });
        let bridge = DelegateBridge {
            sender: inner.sender.clone(),
        };
        (Coordinator { inner }, bridge)
    }

    /// The peripheral this coordinator manages.
    pub fn peripheral_id(&self) -> PeripheralId {
        self.inner.peripheral_id
    }

    /// A cheap, cloneable handle onto this peripheral's observable state.
    pub fn snapshot(&self) -> PeripheralStateSnapshot {
        self.inner.snapshot.clone()
    }

    fn send(&self, request: Request) {
        let _ = self.inner.sender.send(ActorMessage::Request(request));
    }

    /// Asks the central to connect to this peripheral. Resolves once the
    /// request has been handed to the central; it does not await link-up
    /// (see [`handle_connected`][Self::handle_connected]).
    pub async fn connect(&self) {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Request::Connect { reply });
        let _ = reply_rx.await;
    }

    /// Unsubscribes every notifying characteristic on the wire, then asks
    /// the central to disconnect. Synchronous: it does not await the
    /// disconnect completing (see
    /// [`handle_disconnected`][Self::handle_disconnected]).
    pub fn disconnect(&self) {
        self.send(Request::Disconnect);
    }

    /// The post-connect pipeline entry point (spec §4.6). Called by
    /// whatever owns the central-manager relationship once its `did_connect`
    /// callback fires for this peripheral: resolves the discovery plan from
    /// `advertisement_data` and kicks off service discovery.
    pub fn handle_connected(&self, advertisement_data: AdvertisementData) {
        self.send(Request::HandleConnected { advertisement_data });
    }

    /// Disconnect cleanup (spec §4.3). Called by whatever owns the
    /// central-manager relationship once its `did_disconnect` callback
    /// fires for this peripheral. `grace` backdates the snapshot's
    /// last-activity timestamp, for centrals that implement a staleness
    /// grace window around a disconnect; pass [`Duration::ZERO`] otherwise.
    pub fn handle_disconnected(&self, grace: Duration) {
        self.send(Request::HandleDisconnected { grace });
    }

    /// Reads `locator`'s value, coalescing with any in-flight read and
    /// queuing behind any in-flight write for the same characteristic
    /// (spec §4.2, invariants 1-2).
    pub async fn read(&self, locator: CharacteristicLocator) -> Result<Vec<u8>> {
        loop {
            let (reply, reply_rx) = oneshot::channel();
            self.send(Request::TryRead { locator, reply });
            match reply_rx.await.expect("coordinator actor task is gone") {
                ReadReply::Value(value_rx) => {
                    return value_rx
                        .await
                        .unwrap_or_else(|_| Err(Error::not_present(locator)));
                }
                ReadReply::Retry(wake_rx) => {
                    let _ = wake_rx.await;
                }
            }
        }
    }

    /// Writes `data` to `locator` with acknowledgement, queuing behind any
    /// other in-flight access to the same characteristic (spec §4.2,
    /// invariants 1, 3).
    pub async fn write(&self, locator: CharacteristicLocator, data: Vec<u8>) -> Result<()> {
        loop {
            let (reply, reply_rx) = oneshot::channel();
            self.send(Request::TryWrite {
                locator,
                data: data.clone(),
                reply,
            });
            match reply_rx.await.expect("coordinator actor task is gone") {
                WriteReply::Value(result_rx) => {
                    return result_rx
                        .await
                        .unwrap_or_else(|_| Err(Error::not_present(locator)));
                }
                WriteReply::Retry(wake_rx) => {
                    let _ = wake_rx.await;
                }
            }
        }
    }

    /// Issues `data` as a write-without-response to `locator`, queuing
    /// behind the host's single in-flight write-without-response slot
    /// (spec §4.4). There is no completion to await and no error channel:
    /// a disconnect while queued simply abandons the write.
    pub async fn write_without_response(&self, locator: CharacteristicLocator, data: Vec<u8>) {
        loop {
            let (reply, reply_rx) = oneshot::channel();
            self.send(Request::TryWriteWithoutResponse {
                locator,
                data: data.clone(),
                reply,
            });
            match reply_rx.await.expect("coordinator actor task is gone") {
                WwrReply::Done => return,
                WwrReply::Wait(wake_rx) => {
                    if let Ok(WwrWake::Disconnected) = wake_rx.await {
                        return;
                    }
                }
            }
        }
    }

    /// Reads the peripheral's RSSI, coalescing with any in-flight read
    /// (spec §4.7).
    pub async fn read_rssi(&self) -> Result<i16> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Request::TryReadRssi { reply });
        let value_rx = reply_rx.await.expect("coordinator actor task is gone");
        value_rx
            .await
            .unwrap_or_else(|_| Err(Error::peripheral_not_present()))
    }

    /// Registers `handler` to be called with each notification/indication
    /// value received for `locator`, issuing `set_notify_value(true)` if
    /// this is the first handler for it (spec §4.5). Returns a
    /// [`Subscription`] handle; call [`Subscription::cancel`] to deregister.
    pub async fn register_notifications<F, Fut>(
        &self,
        locator: CharacteristicLocator,
        handler: F,
    ) -> Subscription
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: NotificationHandler = Arc::new(move |value| Box::pin(handler(value)));
        self.register_notification_handler(locator, boxed).await
    }

    /// As [`register_notifications`][Self::register_notifications], but
    /// takes an already-boxed handler. Useful when the same handler is
    /// registered against more than one characteristic.
    pub async fn register_notification_handler(
        &self,
        locator: CharacteristicLocator,
        handler: NotificationHandler,
    ) -> Subscription {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Request::RegisterNotification { locator, handler, reply });
        let id = reply_rx.await.expect("coordinator actor task is gone");
        let owner: Weak<dyn SubscriptionOwner> = Arc::downgrade(&self.inner);
        Subscription { locator, id, owner }
    }
}
