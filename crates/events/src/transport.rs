//! Transport client seam (mechanics only).
//!
//! The transport owns the physical realtime connection (a WebSocket in the
//! front ends) and turns server pushes into named events. The registry only
//! needs three things from it:
//!
//! - `on(name, listener)` to start receiving a named event
//! - `off(name, listener)` to stop, given the **exact** listener passed to `on`
//! - a connection state signal, used for diagnostics
//!
//! Connect/reconnect, backoff and session resumption are the transport's own
//! business. If a reconnect drops named listeners, it is the transport's job to
//! re-attach them.
//!
//! ## Threading
//!
//! Everything here runs on one logical thread (the UI event loop). Listeners
//! are `Rc`, not `Arc`, and transports are not required to be `Send`.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Function invoked by the transport for every physical receipt of an event.
///
/// Identity matters: `off` removes the listener that is pointer-equal
/// (`Rc::ptr_eq`) to the one given.
pub type Listener = Rc<dyn Fn(&JsonValue)>;

/// Shared reference to a transport client.
pub type TransportRef = Rc<dyn Transport>;

/// Connection state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Socket is open; server pushes are flowing.
    Connected,
    /// Socket is closed or not yet opened.
    Disconnected,
}

/// Realtime transport client contract.
///
/// Implementations must tolerate `on` being called for a name that already has
/// listeners (they simply accumulate) and `off` with a listener that was never
/// installed (no-op).
pub trait Transport {
    /// Install `listener` for `event_name`.
    fn on(&self, event_name: &str, listener: Listener);

    /// Remove the listener pointer-equal to `listener` for `event_name`.
    fn off(&self, event_name: &str, listener: &Listener);

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

impl<T> Transport for Rc<T>
where
    T: Transport + ?Sized,
{
    fn on(&self, event_name: &str, listener: Listener) {
        (**self).on(event_name, listener)
    }

    fn off(&self, event_name: &str, listener: &Listener) {
        (**self).off(event_name, listener)
    }

    fn connection_state(&self) -> ConnectionState {
        (**self).connection_state()
    }
}
