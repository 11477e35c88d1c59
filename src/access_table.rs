//! Per-characteristic in-flight request bookkeeping: the
//! read-coalesce / write-serialize / wait-queue state machine (spec §4.2).

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::locator::CharacteristicLocator;

type ReadWaiter = oneshot::Sender<Result<Vec<u8>>>;
type WriteCompleter = oneshot::Sender<Result<()>>;
type QueuedResumer = oneshot::Sender<()>;

enum AccessEntry {
    Read {
        waiters: Vec<ReadWaiter>,
        queued: VecDeque<QueuedResumer>,
    },
    Write {
        completer: WriteCompleter,
        queued: VecDeque<QueuedResumer>,
    },
}

/// What a caller attempting a read should do next.
pub enum ReadAttempt {
    /// Await `receiver` for the result. If `issue` is set, the caller is
    /// the sole waiter of a freshly installed `Read` entry and must issue
    /// the GATT read itself; otherwise it has coalesced onto an in-flight
    /// read and must not issue anything.
    Attach {
        issue: bool,
        receiver: oneshot::Receiver<Result<Vec<u8>>>,
    },
    /// A write is in flight; await `receiver` for a wake-up, then retry.
    Wait(oneshot::Receiver<()>),
}

/// What a caller attempting a write should do next.
pub enum WriteAttempt {
    /// A `Write` entry was installed for the caller; it must issue the GATT
    /// write itself and await `receiver` for the result.
    Installed(oneshot::Receiver<Result<()>>),
    /// Another access is in flight; await `receiver` for a wake-up, then
    /// retry.
    Wait(oneshot::Receiver<()>),
}

/// The in-flight access table for a single peripheral, keyed by
/// characteristic.
#[derive(Default)]
pub struct AccessTable {
    entries: HashMap<CharacteristicLocator, AccessEntry>,
}

impl AccessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Step 1-3 of the read algorithm (spec §4.2).
    pub fn try_read(&mut self, locator: CharacteristicLocator) -> ReadAttempt {
        match self.entries.get_mut(&locator) {
            Some(AccessEntry::Read { waiters, .. }) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                ReadAttempt::Attach {
                    issue: false,
                    receiver: rx,
                }
            }
            Some(AccessEntry::Write { queued, .. }) => {
                let (wake_tx, wake_rx) = oneshot::channel();
                queued.push_back(wake_tx);
                ReadAttempt::Wait(wake_rx)
            }
            None => {
                let (tx, rx) = oneshot::channel();
                self.entries.insert(
                    locator,
                    AccessEntry::Read {
                        waiters: vec![tx],
                        queued: VecDeque::new(),
                    },
                );
                ReadAttempt::Attach {
                    issue: true,
                    receiver: rx,
                }
            }
        }
    }

    /// Step 1-2 of the write algorithm (spec §4.2). Writes never coalesce:
    /// any existing entry (read or write) forces the caller to queue.
    pub fn try_write(&mut self, locator: CharacteristicLocator) -> WriteAttempt {
        match self.entries.get_mut(&locator) {
            Some(entry) => {
                let (wake_tx, wake_rx) = oneshot::channel();
                match entry {
                    AccessEntry::Read { queued, .. } => queued.push_back(wake_tx),
                    AccessEntry::Write { queued, .. } => queued.push_back(wake_tx),
                }
                WriteAttempt::Wait(wake_rx)
            }
            None => {
                let (tx, rx) = oneshot::channel();
                self.entries.insert(
                    locator,
                    AccessEntry::Write {
                        completer: tx,
                        queued: VecDeque::new(),
                    },
                );
                WriteAttempt::Installed(rx)
            }
        }
    }

    /// Resolves an in-flight read. Returns `true` if `locator` had a `Read`
    /// entry (i.e. this was a solicited read completion, not an unsolicited
    /// notification).
    pub fn resolve_read(&mut self, locator: CharacteristicLocator, result: Result<Vec<u8>>) -> bool {
        if !matches!(self.entries.get(&locator), Some(AccessEntry::Read { .. })) {
            return false;
        }

        let Some(AccessEntry::Read { waiters, queued }) = self.entries.remove(&locator) else {
            unreachable!("checked above")
        };

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        for resumer in queued {
            let _ = resumer.send(());
        }
        true
    }

    /// Resolves an in-flight write. Returns `true` if `locator` had a
    /// `Write` entry.
    pub fn resolve_write(&mut self, locator: CharacteristicLocator, result: Result<()>) -> bool {
        if !matches!(self.entries.get(&locator), Some(AccessEntry::Write { .. })) {
            return false;
        }

        let Some(AccessEntry::Write { completer, queued }) = self.entries.remove(&locator) else {
            unreachable!("checked above")
        };

        let _ = completer.send(result);
        for resumer in queued {
            let _ = resumer.send(());
        }
        true
    }

    /// Disconnect cleanup (spec §4.3 steps 1-3): drains every entry,
    /// resolving waiters/completers with `NotPresent` and waking every
    /// queued resumer.
    pub fn drain_on_disconnect(&mut self) {
        for (locator, entry) in self.entries.drain() {
            match entry {
                AccessEntry::Read { waiters, queued } => {
                    for waiter in waiters {
                        let _ = waiter.send(Err(Error::not_present(locator)));
                    }
                    for resumer in queued {
                        let _ = resumer.send(());
                    }
                }
                AccessEntry::Write { completer, queued } => {
                    let _ = completer.send(Err(Error::not_present(locator)));
                    for resumer in queued {
                        let _ = resumer.send(());
                    }
                }
            }
        }
    }
}
