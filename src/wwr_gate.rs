//! Single-slot gate coalescing writers onto the host's "ready to send
//! another write-without-response" signal (spec §4.4).

use std::collections::VecDeque;

use tokio::sync::oneshot;

/// What a caller attempting a write-without-response should do next.
pub enum WwrAttempt {
    /// The caller is admitted: it should issue the write immediately.
    Admitted,
    /// Another write is in flight; await `receiver`, then retry.
    Wait(oneshot::Receiver<WwrWake>),
}

/// Why a queued write-without-response caller was woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WwrWake {
    /// The host signaled it is ready for another write; re-attempt
    /// admission.
    Retry,
    /// The peripheral disconnected; treat the write as completed-unknown
    /// (the underlying operation has no acknowledgement channel to begin
    /// with) and do not re-attempt.
    Disconnected,
}

/// The write-without-response admission gate for one peripheral. This is
/// per-peripheral, not per-characteristic: the host's flow-control signal
/// is a property of the link, not of any single characteristic.
#[derive(Default)]
pub struct WriteWithoutResponseGate {
    inflight: bool,
    waiters: VecDeque<oneshot::Sender<WwrWake>>,
}

impl WriteWithoutResponseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt admission. The first caller when the gate is idle is
    /// admitted synchronously; everyone else queues behind it.
    pub fn try_admit(&mut self) -> WwrAttempt {
        if self.inflight {
            let (tx, rx) = oneshot::channel();
            self.waiters.push_back(tx);
            WwrAttempt::Wait(rx)
        } else {
            self.inflight = true;
            WwrAttempt::Admitted
        }
    }

    /// `peripheralIsReadyToSendWriteWithoutResponse`: the gate is no longer
    /// occupied and every waiter is woken to race for the now-open slot.
    pub fn ready_to_send(&mut self) {
        self.inflight = false;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(WwrWake::Retry);
        }
    }

    /// Disconnect cleanup (spec §4.3 step 4): every waiter resolves with
    /// unit, with no error channel to report through.
    pub fn drain_on_disconnect(&mut self) {
        self.inflight = false;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(WwrWake::Disconnected);
        }
    }
}
