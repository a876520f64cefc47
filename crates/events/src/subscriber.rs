//! Subscriber lifecycle: one UI unit's interest in one event name.
//!
//! A UI unit re-renders many times while mounted. Each render may produce a new
//! callback closing over fresh state, but it must stay *one* registration so the
//! per-registration duplicate suppression keeps working. `Subscriber` holds the
//! stable identity, created once, and decides on every `sync` whether the
//! registry needs to hear about it:
//!
//! - first sync, or the registration is not live (e.g. the transport has only
//!   just become available): subscribe under the stable identity
//! - dependency set changed: swap the callback in place
//! - otherwise: keep the current callback, touch nothing
//!
//! Dropping the subscriber (unmount) unsubscribes.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use servewise_core::{EventName, RegistrationId};

use crate::handle::SubscriptionHandle;
use crate::registry::EventRegistry;
use crate::transport::TransportRef;

/// Values whose change should refresh a subscriber's callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySet(Vec<JsonValue>);

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, value: impl Into<JsonValue>) -> Self {
        self.0.push(value.into());
        self
    }

    pub fn values(&self) -> &[JsonValue] {
        &self.0
    }
}

impl FromIterator<JsonValue> for DependencySet {
    fn from_iter<I: IntoIterator<Item = JsonValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub struct Subscriber {
    registry: EventRegistry,
    event_name: EventName,
    owner: String,
    identity: RegistrationId,
    synced_deps: Option<DependencySet>,
}

impl Subscriber {
    pub fn new(registry: &EventRegistry, event_name: EventName, owner: impl Into<String>) -> Self {
        Self {
            registry: registry.clone(),
            event_name,
            owner: owner.into(),
            identity: RegistrationId::new(),
            synced_deps: None,
        }
    }

    pub fn id(&self) -> RegistrationId {
        self.identity
    }

    pub fn event_name(&self) -> &EventName {
        &self.event_name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_registered(&self) -> bool {
        self.registry.is_registered(self.identity)
    }

    /// Bring the registration in line with the latest render.
    ///
    /// `callback` is only handed to the registry when something changed; an
    /// unchanged `deps` with a live registration keeps the previous callback.
    pub fn sync<F>(
        &mut self,
        client: Option<&TransportRef>,
        deps: DependencySet,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&JsonValue) -> anyhow::Result<()> + 'static,
    {
        if self.is_registered() && self.synced_deps.as_ref() == Some(&deps) {
            return self.handle();
        }

        let handle = self.registry.subscribe_with_identity(
            client,
            &self.event_name,
            callback,
            &self.owner,
            self.identity,
        );
        self.identity = handle.id();
        self.synced_deps = handle.is_registered().then_some(deps);
        handle
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle::new(self.identity, self.event_name.clone(), self.registry.downgrade())
    }

    /// Remove the registration. Safe to call repeatedly; also runs on drop.
    pub fn unsubscribe(&mut self) {
        self.registry.unsubscribe(self.identity);
        self.synced_deps = None;
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl core::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscriber")
            .field("event_name", &self.event_name)
            .field("owner", &self.owner)
            .field("identity", &self.identity)
            .field("registered", &self.is_registered())
            .finish()
    }
}
