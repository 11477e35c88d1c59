//! Forwards host-stack delegate callbacks into the coordinator's actor task
//! as ordered messages (spec §4.8, C8).
//!
//! A concrete host binding calls [`DelegateBridge::dispatch`] from whatever
//! thread or queue its framework invokes delegate methods on — exactly as
//! the teacher's `PeripheralAsyncDelegate` is invoked on CoreBluetooth's
//! serial dispatch queue. `dispatch` is a plain, non-async method (an
//! unbounded channel send), so it never blocks the calling callback thread
//! and preserves the delivery order of a single callback invocation.

use tokio::sync::mpsc;

use crate::actor::ActorMessage;
use crate::host::PeripheralEvent;

/// A cheap, cloneable handle that forwards events into a coordinator's
/// single ordered message queue.
#[derive(Clone)]
pub struct DelegateBridge {
    pub(crate) sender: mpsc::UnboundedSender<ActorMessage>,
}

impl DelegateBridge {
    /// Forwards `event` into the coordinator. If the coordinator has
    /// already shut down, the event is silently dropped: there is no one
    /// left to observe it.
    pub fn dispatch(&self, event: PeripheralEvent) {
        let _ = self.sender.send(ActorMessage::Event(event));
    }
}

impl std::fmt::Debug for DelegateBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DelegateBridge { .. }")
    }
}
