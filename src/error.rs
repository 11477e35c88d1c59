//! Error types surfaced by the coordinator's public operations.

use std::fmt::Display;
use std::sync::Arc;

use crate::locator::CharacteristicLocator;

/// A convenience alias for a `Result` with this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error returned by a coordinator operation.
///
/// See the taxonomy in the crate's design notes: `NotPresent` covers every
/// "there is nothing to talk to" case (unknown characteristic, missing
/// parent service, disconnect mid-request); `Transport` is a verbatim
/// passthrough of whatever the host stack reported.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
}

#[derive(Debug, Clone)]
enum ErrorKind {
    NotPresent(CharacteristicLocator),
    PeripheralNotPresent,
    Transport(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// The characteristic was unknown, its parent service was missing, or
    /// the peripheral disconnected while the request was outstanding.
    pub fn not_present(characteristic: CharacteristicLocator) -> Self {
        Error {
            kind: ErrorKind::NotPresent(characteristic),
        }
    }

    /// There is no characteristic-specific context (e.g. `read_rssi`), but
    /// the peripheral is not present (typically: disconnected).
    pub fn peripheral_not_present() -> Self {
        Error {
            kind: ErrorKind::PeripheralNotPresent,
        }
    }

    /// Wraps a verbatim error reported by the host stack (link loss, ATT
    /// errors, encryption failure, ...). The core never synthesizes these,
    /// only forwards them.
    pub fn transport(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error {
            kind: ErrorKind::Transport(Arc::new(error)),
        }
    }

    /// The characteristic this error is about, if any.
    pub fn characteristic(&self) -> Option<CharacteristicLocator> {
        match &self.kind {
            ErrorKind::NotPresent(c) => Some(*c),
            ErrorKind::PeripheralNotPresent | ErrorKind::Transport(_) => None,
        }
    }

    /// True if this is a `NotPresent`/`PeripheralNotPresent` error rather
    /// than a transport passthrough.
    pub fn is_not_present(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NotPresent(_) | ErrorKind::PeripheralNotPresent
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ErrorKind::NotPresent(c) => write!(f, "characteristic {c} not present"),
            ErrorKind::PeripheralNotPresent => f.write_str("peripheral not present"),
            ErrorKind::Transport(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Transport(error) => Some(&**error),
            ErrorKind::NotPresent(_) | ErrorKind::PeripheralNotPresent => None,
        }
    }
}
