//! Property tests over random subscribe / unsubscribe / emit sequences.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;

use servewise_events::{
    EventName, EventRegistry, InMemoryTransport, RegistrationId, SubscriptionHandle, TransportRef,
};

const NAMES: [&str; 3] = ["order:created", "payment:completed", "table:seated"];

#[derive(Debug, Clone)]
enum Op {
    Subscribe(usize),
    Unsubscribe(usize),
    UnsubscribeUnknown,
    Resubscribe(usize),
    /// One fresh instance, fired `repeats` times in a row.
    Emit(usize, u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NAMES.len()).prop_map(Op::Subscribe),
        (0..16usize).prop_map(Op::Unsubscribe),
        Just(Op::UnsubscribeUnknown),
        (0..16usize).prop_map(Op::Resubscribe),
        ((0..NAMES.len()), 1..4u8).prop_map(|(n, r)| Op::Emit(n, r)),
    ]
}

proptest! {
    #[test]
    fn listener_count_tracks_live_registrations(ops in prop::collection::vec(op(), 1..60)) {
        let registry = EventRegistry::new();
        let transport = Rc::new(InMemoryTransport::new());
        let client: TransportRef = transport.clone();

        // Deliveries per (registration, instance sequence number).
        let deliveries: Rc<RefCell<HashMap<(RegistrationId, u64), u32>>> = Rc::new(RefCell::new(HashMap::new()));
        let mut seq = 0u64;
        let mut handles: Vec<SubscriptionHandle> = Vec::new();

        let make_cb = |slot: Rc<RefCell<Option<RegistrationId>>>| {
            let deliveries = deliveries.clone();
            move |p: &serde_json::Value| {
                let instance = p["seq"].as_u64().unwrap_or(0);
                if let Some(id) = *slot.borrow() {
                    *deliveries.borrow_mut().entry((id, instance)).or_default() += 1;
                }
                Ok::<_, anyhow::Error>(())
            }
        };

        for op in ops {
            match op {
                Op::Subscribe(n) => {
                    let slot = Rc::new(RefCell::new(None));
                    let h = registry.subscribe(
                        Some(&client),
                        &EventName::new(NAMES[n]).unwrap(),
                        make_cb(slot.clone()),
                        "prop",
                    );
                    *slot.borrow_mut() = Some(h.id());
                    handles.push(h);
                }
                Op::Unsubscribe(i) => {
                    if let Some(h) = handles.get(i) {
                        h.unsubscribe();
                    }
                }
                Op::UnsubscribeUnknown => {
                    prop_assert!(!registry.unsubscribe(RegistrationId::new()));
                }
                Op::Resubscribe(i) => {
                    if let Some(h) = handles.get(i) {
                        let slot = Rc::new(RefCell::new(Some(h.id())));
                        let again = registry.subscribe_with_identity(
                            Some(&client),
                            h.event_name(),
                            make_cb(slot),
                            "prop",
                            h.id(),
                        );
                        prop_assert_eq!(again.id(), h.id());
                    }
                }
                Op::Emit(n, repeats) => {
                    seq += 1;
                    let payload = json!({"eventId": format!("{}-{seq}", NAMES[n]), "seq": seq});
                    for _ in 0..repeats {
                        transport.emit(NAMES[n], &payload);
                    }
                }
            }

            for name in NAMES {
                let ev = EventName::new(name).unwrap();
                let live = registry.registration_count(&ev);
                let listeners = transport.listener_count(name);
                prop_assert!(listeners <= 1);
                prop_assert_eq!(listeners == 1, live > 0);
            }
        }

        for (_, count) in deliveries.borrow().iter() {
            prop_assert_eq!(*count, 1);
        }
    }
}
