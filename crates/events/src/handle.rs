//! Subscription handles.

use std::rc::Weak;

use servewise_core::{EventName, RegistrationId};

use crate::registry::{EventRegistry, RegistryInner};

/// What a subscriber keeps after subscribing.
///
/// Carries the registration id and the event name it was requested for.
/// `is_registered` is always a live lookup against the registry, never a cached
/// flag. The handle does not keep the registry alive.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: RegistrationId,
    event_name: EventName,
    registry: Weak<RegistryInner>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: RegistrationId, event_name: EventName, registry: Weak<RegistryInner>) -> Self {
        Self {
            id,
            event_name,
            registry,
        }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn event_name(&self) -> &EventName {
        &self.event_name
    }

    /// Whether the registration is currently in the event table.
    pub fn is_registered(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| EventRegistry::from_inner(inner).is_registered(self.id))
    }

    /// Remove the registration. Safe to call repeatedly.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| EventRegistry::from_inner(inner).unsubscribe(self.id))
    }
}

impl core::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("event_name", &self.event_name)
            .field("registered", &self.is_registered())
            .finish()
    }
}
