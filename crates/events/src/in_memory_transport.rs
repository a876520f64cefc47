//! In-memory transport for tests, development and frame replay.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::frame::{FrameError, WireFrame};
use crate::transport::{ConnectionState, Listener, Transport};

/// In-process stand-in for the socket client.
///
/// - No IO
/// - Listeners accumulate per name, like a socket.io client
/// - `emit` calls a snapshot of the listeners, so `off` during an emit is safe
/// - Emits while disconnected are dropped
pub struct InMemoryTransport {
    listeners: RefCell<HashMap<String, Vec<Listener>>>,
    state: Cell<ConnectionState>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.state.set(state);
    }

    /// Fire `event_name` with `payload`. Returns how many listeners ran.
    pub fn emit(&self, event_name: &str, payload: &JsonValue) -> usize {
        if self.state.get() == ConnectionState::Disconnected {
            debug!(event = event_name, "transport disconnected; push dropped");
            return 0;
        }

        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .get(event_name)
            .cloned()
            .unwrap_or_default();

        for listener in &snapshot {
            listener(payload);
        }
        snapshot.len()
    }

    /// Decode a wire frame and emit it.
    pub fn deliver_frame(&self, text: &str) -> Result<usize, FrameError> {
        let frame = WireFrame::decode(text)?;
        Ok(self.emit(frame.event.as_str(), &frame.data))
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners.borrow().get(event_name).map_or(0, Vec::len)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.borrow().values().map(Vec::len).sum()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(HashMap::new()),
            state: Cell::new(ConnectionState::Connected),
        }
    }
}

impl core::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("listeners", &self.total_listeners())
            .field("state", &self.state.get())
            .finish()
    }
}

impl Transport for InMemoryTransport {
    fn on(&self, event_name: &str, listener: Listener) {
        self.listeners
            .borrow_mut()
            .entry(event_name.to_string())
            .or_default()
            .push(listener);
    }

    fn off(&self, event_name: &str, listener: &Listener) {
        let mut listeners = self.listeners.borrow_mut();
        let Some(installed) = listeners.get_mut(event_name) else {
            return;
        };
        if let Some(pos) = installed.iter().position(|l| Rc::ptr_eq(l, listener)) {
            installed.remove(pos);
        }
        if installed.is_empty() {
            listeners.remove(event_name);
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counting_listener(hits: &Rc<Cell<usize>>) -> Listener {
        let hits = hits.clone();
        Rc::new(move |_: &JsonValue| hits.set(hits.get() + 1))
    }

    #[test]
    fn off_removes_only_the_identical_listener() {
        let transport = InMemoryTransport::new();
        let hits = Rc::new(Cell::new(0));
        let a = counting_listener(&hits);
        let b = counting_listener(&hits);

        transport.on("order:created", a.clone());
        transport.on("order:created", b.clone());
        transport.off("order:created", &a);

        assert_eq!(transport.listener_count("order:created"), 1);
        assert_eq!(transport.emit("order:created", &json!({})), 1);
        assert_eq!(hits.get(), 1);

        transport.off("order:created", &b);
        transport.off("order:created", &b);
        assert_eq!(transport.total_listeners(), 0);
    }

    #[test]
    fn disconnected_transport_drops_pushes() {
        let transport = InMemoryTransport::new();
        let hits = Rc::new(Cell::new(0));
        transport.on("order:created", counting_listener(&hits));

        transport.set_connection_state(ConnectionState::Disconnected);
        assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
        assert_eq!(transport.emit("order:created", &json!({})), 0);

        transport.set_connection_state(ConnectionState::Connected);
        assert_eq!(transport.emit("order:created", &json!({})), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn deliver_frame_routes_by_event_name() {
        let transport = InMemoryTransport::new();
        let got = Rc::new(RefCell::new(Vec::new()));
        let sink = got.clone();
        transport.on(
            "payment:completed",
            Rc::new(move |p: &JsonValue| sink.borrow_mut().push(p.clone())),
        );

        let ran = transport
            .deliver_frame(r#"{"event":"payment:completed","data":{"eventId":"e2"}}"#)
            .unwrap();
        assert_eq!(ran, 1);
        assert_eq!(*got.borrow(), vec![json!({"eventId": "e2"})]);

        assert_eq!(
            transport.deliver_frame(r#"{"event":"order:created"}"#).unwrap(),
            0
        );
        assert!(transport.deliver_frame("garbage").is_err());
    }

    #[test]
    fn listener_may_remove_itself_during_emit() {
        let transport = Rc::new(InMemoryTransport::new());
        let slot: Rc<RefCell<Option<Listener>>> = Rc::new(RefCell::new(None));
        let t = transport.clone();
        let me = slot.clone();
        let listener: Listener = Rc::new(move |_: &JsonValue| {
            if let Some(l) = me.borrow_mut().take() {
                t.off("x", &l);
            }
        });
        *slot.borrow_mut() = Some(listener.clone());
        transport.on("x", listener);

        assert_eq!(transport.emit("x", &json!(null)), 1);
        assert_eq!(transport.listener_count("x"), 0);
    }
}
