//! Registered notification handlers and the handle used to deregister them
//! (spec §3 "NotificationRegistry", §4.5).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::locator::CharacteristicLocator;

/// A freshly generated, process-unique identifier for a single notification
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
    fn fresh() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An async callback invoked with a characteristic's value, once per
/// notification/indication (or, for the read path, never — see spec §4.2).
pub type NotificationHandler =
    Arc<dyn Fn(Vec<u8>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// `map<CharacteristicLocator, map<subscription_id, handler>>`.
///
/// The per-locator handler list is kept as a `Vec`, not a `HashMap`, because
/// spec §4.5 requires fan-out in registration order — a `HashMap`'s
/// iteration order does not track insertion order.
#[derive(Default)]
pub struct NotificationRegistry {
    handlers: HashMap<CharacteristicLocator, Vec<(SubscriptionId, NotificationHandler)>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `locator`. Returns the fresh subscription id
    /// and whether this is the first handler registered for `locator`
    /// (i.e. whether the coordinator may need to opportunistically issue
    /// `set_notify_value(true, ...)`).
    pub fn register(
        &mut self,
        locator: CharacteristicLocator,
        handler: NotificationHandler,
    ) -> (SubscriptionId, bool) {
        let id = SubscriptionId::fresh();
        let entry = self.handlers.entry(locator).or_default();
        let is_first = entry.is_empty();
        entry.push((id, handler));
        (id, is_first)
    }

    /// Deregisters `id` for `locator`. Returns `true` if it was the last
    /// handler for that locator (i.e. the coordinator may need to issue
    /// `set_notify_value(false, ...)`). A repeat deregistration of an
    /// already-removed id is a no-op, returning `false`.
    pub fn deregister(&mut self, locator: CharacteristicLocator, id: SubscriptionId) -> bool {
        let Some(list) = self.handlers.get_mut(&locator) else {
            return false;
        };
        let Some(index) = list.iter().position(|(existing, _)| *existing == id) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            self.handlers.remove(&locator);
            true
        } else {
            false
        }
    }

    pub fn has_handlers(&self, locator: &CharacteristicLocator) -> bool {
        self.handlers.contains_key(locator)
    }

    /// Every locator with at least one registered handler, i.e. every
    /// characteristic the coordinator believes is notifying on the wire.
    pub fn registered_locators(&self) -> Vec<CharacteristicLocator> {
        self.handlers.keys().copied().collect()
    }

    /// Every handler currently registered for `locator`, in registration
    /// order, for sequential fan-out (spec §4.5).
    pub fn handlers_for(&self, locator: &CharacteristicLocator) -> Vec<(SubscriptionId, NotificationHandler)> {
        self.handlers.get(locator).cloned().unwrap_or_default()
    }
}

/// Implemented by the coordinator so a [`Subscription`] can call back into
/// it without holding a strong reference (dropping the coordinator does
/// not keep pending subscriptions alive).
pub(crate) trait SubscriptionOwner: Send + Sync {
    fn deregister_subscription(&self, locator: CharacteristicLocator, id: SubscriptionId);
}

/// A handle returned by `register_notifications`. Dropping it does **not**
/// deregister the subscription — call [`cancel`][Self::cancel] explicitly
/// (spec §4.1: "deregistration is explicit").
pub struct Subscription {
    pub(crate) locator: CharacteristicLocator,
    pub(crate) id: SubscriptionId,
    pub(crate) owner: Weak<dyn SubscriptionOwner>,
}

impl Subscription {
    /// The characteristic this subscription is for.
    pub fn locator(&self) -> CharacteristicLocator {
        self.locator
    }

    /// Deregisters the subscription. A no-op (not an error) if it was
    /// already deregistered or the coordinator is gone.
    pub fn cancel(self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.deregister_subscription(self.locator, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("locator", &self.locator)
            .field("id", &self.id)
            .finish()
    }
}
