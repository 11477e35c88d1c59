//! Coalesces concurrent `read_rssi` calls onto one in-flight sample
//! (spec §4.7, §3 "RSSIReadQueue").

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// What a caller attempting `read_rssi` should do next.
pub enum RssiAttempt {
    /// Await `receiver`. If `issue` is set, the caller is the first in the
    /// queue and must issue the GATT RSSI read itself.
    Attach {
        issue: bool,
        receiver: oneshot::Receiver<Result<i16>>,
    },
}

#[derive(Default)]
pub struct RssiReadQueue {
    waiters: VecDeque<oneshot::Sender<Result<i16>>>,
}

impl RssiReadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to the in-flight sample, issuing a new one if the queue was
    /// empty.
    pub fn try_attach(&mut self) -> RssiAttempt {
        let (tx, rx) = oneshot::channel();
        let issue = self.waiters.is_empty();
        self.waiters.push_back(tx);
        RssiAttempt::Attach { issue, receiver: rx }
    }

    /// `didReadRSSI`: resolve every queued waiter with the same result and
    /// clear the queue.
    pub fn resolve(&mut self, result: Result<i16>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    /// Disconnect cleanup (spec §4.3 step 5): resolve every queued waiter
    /// with `PeripheralNotPresent` and clear the queue.
    pub fn drain_on_disconnect(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(Error::peripheral_not_present()));
        }
    }
}
