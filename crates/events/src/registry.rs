//! Process-wide event registry: deduplicating fan-out over one transport.
//!
//! Many independent UI units want to react to the same named server push
//! (`order:created`, `payment:completed`, ...) while they are mounted. The
//! registry sits between them and the transport client and guarantees:
//!
//! - **One listener per name**: the transport sees exactly one `on` for an
//!   event name while at least one registration for it is live, and exactly
//!   one `off` when the last one goes away.
//! - **At most once per registration**: a given event instance reaches a given
//!   registration at most once, however often the transport fires it.
//! - **Isolation**: a failing callback is logged and skipped; the rest of the
//!   dispatch pass still runs.
//!
//! ## Dispatch
//!
//! ```text
//! transport push ─► listener(name) ─► instance id ─► snapshot of registrations
//!                                                     ├─ removed since snapshot? skip
//!                                                     ├─ last_seen == instance? skip
//!                                                     └─ mark seen, call callback
//! ```
//!
//! The snapshot is taken at the start of the pass and no `RefCell` borrow is
//! held while a callback runs, so callbacks may subscribe or unsubscribe freely.
//! Registrations added during a pass are first visited by the next pass.
//!
//! ## Threading
//!
//! Single-threaded by construction (`Rc<RefCell<_>>`, `!Send`). All mutation and
//! dispatch happen on the UI event loop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use servewise_core::{EventName, RegistrationId};

use crate::config::RegistryConfig;
use crate::handle::SubscriptionHandle;
use crate::instance::{Clock, EventInstanceId, SystemClock};
use crate::transport::{Listener, TransportRef};

/// Subscriber callback. Errors are logged by the registry, never propagated.
pub type Callback = Rc<dyn Fn(&JsonValue) -> anyhow::Result<()>>;

/// Why a callback invocation failed.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback returned an error: {0:#}")]
    Failed(anyhow::Error),
    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// Counters for one dispatch pass, or accumulated over many.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub passes: u64,
    pub delivered: u64,
    pub duplicates_skipped: u64,
    pub failed: u64,
}

impl DispatchReport {
    fn absorb(&mut self, other: DispatchReport) {
        self.passes += other.passes;
        self.delivered += other.delivered;
        self.duplicates_skipped += other.duplicates_skipped;
        self.failed += other.failed;
    }
}

struct Registration {
    id: RegistrationId,
    owner: String,
    callback: Callback,
    last_seen: Option<EventInstanceId>,
}

/// Table entry for one event name. Exists only while `registrations` is
/// non-empty, and owns the single listener installed on `transport`.
struct EventEntry {
    registrations: Vec<Registration>,
    transport: TransportRef,
    listener: Listener,
}

#[derive(Default)]
struct RegistryState {
    table: HashMap<EventName, EventEntry>,
    index: HashMap<RegistrationId, EventName>,
    totals: DispatchReport,
}

pub(crate) struct RegistryInner {
    config: RegistryConfig,
    clock: Rc<dyn Clock>,
    state: RefCell<RegistryState>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let table = std::mem::take(&mut self.state.get_mut().table);
        for (name, entry) in table {
            entry.transport.off(name.as_str(), &entry.listener);
            debug!(event = %name, "registry dropped; removed transport listener");
        }
    }
}

/// Handle to the event registry.
///
/// Cheap to clone; all clones share one table. Construct one at application
/// start and pass it to every subscriber. Hosts without an injection mechanism
/// can fall back to [`EventRegistry::global`].
#[derive(Clone)]
pub struct EventRegistry {
    inner: Rc<RegistryInner>,
}

thread_local! {
    static GLOBAL: EventRegistry = EventRegistry::new();
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("EventRegistry")
            .field("event_names", &state.table.len())
            .field("registrations", &state.index.len())
            .field("totals", &state.totals)
            .finish()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_clock(config, Rc::new(SystemClock))
    }

    /// Registry reading receipt time from `clock` (tests pin it).
    pub fn with_clock(config: RegistryConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                config,
                clock,
                state: RefCell::new(RegistryState::default()),
            }),
        }
    }

    /// The thread's default registry.
    ///
    /// Only for hosts that cannot pass a registry down explicitly. It lives as
    /// long as the UI thread.
    pub fn global() -> Self {
        GLOBAL.with(Clone::clone)
    }

    pub(crate) fn from_inner(inner: Rc<RegistryInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Register `callback` for `event_name` under a freshly generated identity.
    ///
    /// With no transport (`client` is `None`) this is a no-op and the returned
    /// handle reports `is_registered() == false`.
    pub fn subscribe<F>(
        &self,
        client: Option<&TransportRef>,
        event_name: &EventName,
        callback: F,
        owner: &str,
    ) -> SubscriptionHandle
    where
        F: Fn(&JsonValue) -> anyhow::Result<()> + 'static,
    {
        self.subscribe_as(client, event_name, Rc::new(callback), owner, RegistrationId::new())
    }

    /// Register or refresh the registration identified by `identity`.
    ///
    /// - `identity` live under `event_name`: the callback is swapped in place;
    ///   the last-seen marker is kept. This happens even when `client` is
    ///   `None`, since the installed listener stays in place.
    /// - `identity` not live: a new registration is created with that id.
    /// - `identity` live under another name: that registration is removed and a
    ///   new one with a fresh id is created for `event_name`.
    ///
    /// Without a transport, every case but the in-place swap is a no-op.
    pub fn subscribe_with_identity<F>(
        &self,
        client: Option<&TransportRef>,
        event_name: &EventName,
        callback: F,
        owner: &str,
        identity: RegistrationId,
    ) -> SubscriptionHandle
    where
        F: Fn(&JsonValue) -> anyhow::Result<()> + 'static,
    {
        self.subscribe_as(client, event_name, Rc::new(callback), owner, identity)
    }

    fn subscribe_as(
        &self,
        client: Option<&TransportRef>,
        event_name: &EventName,
        callback: Callback,
        owner: &str,
        identity: RegistrationId,
    ) -> SubscriptionHandle {
        let mut id = identity;
        let current = self.inner.state.borrow().index.get(&id).cloned();

        // A live registration keeps its listener, so the swap needs no transport.
        if current.as_ref() == Some(event_name) {
            self.swap_callback(event_name, id, callback, owner);
            return SubscriptionHandle::new(id, event_name.clone(), self.downgrade());
        }

        let Some(client) = client else {
            debug!(event = %event_name, owner, "no transport yet; subscription is inert");
            return SubscriptionHandle::new(identity, event_name.clone(), self.downgrade());
        };

        match current {
            Some(name) => {
                debug!(
                    registration_id = %id,
                    from = %name,
                    to = %event_name,
                    "identity moved to another event; re-registering"
                );
                self.unsubscribe(id);
                id = RegistrationId::new();
            }
            None => {}
        }

        let registration = Registration {
            id,
            owner: owner.to_string(),
            callback,
            last_seen: None,
        };

        let install = {
            let mut state = self.inner.state.borrow_mut();
            let install = match state.table.get_mut(event_name) {
                Some(entry) => {
                    entry.registrations.push(registration);
                    None
                }
                None => {
                    let listener = self.listener_for(event_name.clone());
                    state.table.insert(
                        event_name.clone(),
                        EventEntry {
                            registrations: vec![registration],
                            transport: client.clone(),
                            listener: listener.clone(),
                        },
                    );
                    Some(listener)
                }
            };
            state.index.insert(id, event_name.clone());
            install
        };

        // Installed outside the borrow: a transport may emit synchronously from `on`.
        if let Some(listener) = install {
            client.on(event_name.as_str(), listener);
            debug!(event = %event_name, owner, "installed transport listener");
        }
        debug!(event = %event_name, owner, registration_id = %id, "registered");

        SubscriptionHandle::new(id, event_name.clone(), self.downgrade())
    }

    fn swap_callback(&self, name: &EventName, id: RegistrationId, callback: Callback, owner: &str) {
        let mut state = self.inner.state.borrow_mut();
        if let Some(registration) = state
            .table
            .get_mut(name)
            .and_then(|entry| entry.registrations.iter_mut().find(|r| r.id == id))
        {
            registration.callback = callback;
            registration.owner = owner.to_string();
            debug!(event = %name, owner, registration_id = %id, "callback updated in place");
        }
    }

    /// Remove a registration. Unknown or already-removed ids are a no-op.
    ///
    /// Returns whether a live registration was removed. When it was the last one
    /// for its event name, the transport listener is uninstalled.
    pub fn unsubscribe(&self, id: RegistrationId) -> bool {
        let (name, uninstall) = {
            let mut state = self.inner.state.borrow_mut();
            let Some(name) = state.index.remove(&id) else {
                return false;
            };
            let now_empty = match state.table.get_mut(&name) {
                Some(entry) => {
                    entry.registrations.retain(|r| r.id != id);
                    entry.registrations.is_empty()
                }
                None => false,
            };
            let uninstall = if now_empty {
                state.table.remove(&name)
            } else {
                None
            };
            (name, uninstall)
        };

        debug!(event = %name, registration_id = %id, "unregistered");
        if let Some(entry) = uninstall {
            entry.transport.off(name.as_str(), &entry.listener);
            debug!(event = %name, "removed transport listener");
        }
        true
    }

    /// Live lookup: is `id` currently in the event table?
    pub fn is_registered(&self, id: RegistrationId) -> bool {
        self.inner.state.borrow().index.contains_key(&id)
    }

    /// Event names that currently have live registrations, sorted.
    pub fn registered_event_names(&self) -> Vec<EventName> {
        let mut names: Vec<EventName> = self.inner.state.borrow().table.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn registration_count(&self, event_name: &EventName) -> usize {
        self.inner
            .state
            .borrow()
            .table
            .get(event_name)
            .map_or(0, |entry| entry.registrations.len())
    }

    /// Owner labels for `event_name`, in registration order.
    pub fn owners(&self, event_name: &EventName) -> Vec<String> {
        self.inner
            .state
            .borrow()
            .table
            .get(event_name)
            .map(|entry| entry.registrations.iter().map(|r| r.owner.clone()).collect())
            .unwrap_or_default()
    }

    /// Total live registrations across all event names.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counters accumulated over every dispatch pass so far.
    pub fn totals(&self) -> DispatchReport {
        self.inner.state.borrow().totals
    }

    fn listener_for(&self, event_name: EventName) -> Listener {
        // Weak: the transport must not keep the registry alive.
        let registry = self.downgrade();
        Rc::new(move |payload: &JsonValue| {
            if let Some(inner) = registry.upgrade() {
                EventRegistry::from_inner(inner).dispatch(&event_name, payload);
            }
        })
    }

    /// One dispatch pass for a physical receipt of `event_name`.
    pub(crate) fn dispatch(&self, event_name: &EventName, payload: &JsonValue) -> DispatchReport {
        let instance = self
            .inner
            .config
            .instance_keys
            .instance_id(payload, self.inner.clock.as_ref());

        let snapshot: Vec<RegistrationId> = self
            .inner
            .state
            .borrow()
            .table
            .get(event_name)
            .map(|entry| entry.registrations.iter().map(|r| r.id).collect())
            .unwrap_or_default();

        let mut report = DispatchReport {
            passes: 1,
            ..DispatchReport::default()
        };

        for id in snapshot {
            let claimed = {
                let mut state = self.inner.state.borrow_mut();
                let Some(registration) = state
                    .table
                    .get_mut(event_name)
                    .and_then(|entry| entry.registrations.iter_mut().find(|r| r.id == id))
                else {
                    // Unsubscribed earlier in this pass.
                    continue;
                };
                if registration.last_seen.as_ref() == Some(&instance) {
                    None
                } else {
                    registration.last_seen = Some(instance.clone());
                    Some((registration.callback.clone(), registration.owner.clone()))
                }
            };

            let Some((callback, owner)) = claimed else {
                report.duplicates_skipped += 1;
                debug!(event = %event_name, registration_id = %id, %instance, "duplicate instance skipped");
                continue;
            };

            match self.invoke(&callback, payload) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        event = %event_name,
                        owner = %owner,
                        registration_id = %id,
                        %instance,
                        error = %err,
                        "subscriber callback failed"
                    );
                }
            }
        }

        self.inner.state.borrow_mut().totals.absorb(report);
        report
    }

    fn invoke(&self, callback: &Callback, payload: &JsonValue) -> Result<(), CallbackError> {
        if !self.inner.config.catch_panics {
            return callback(payload).map_err(CallbackError::Failed);
        }
        match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
            Ok(result) => result.map_err(CallbackError::Failed),
            Err(panic) => Err(CallbackError::Panicked(panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
