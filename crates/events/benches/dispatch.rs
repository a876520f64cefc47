use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;

use servewise_events::{EventName, EventRegistry, InMemoryTransport, TransportRef};

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_fan_out");

    for subscribers in [1usize, 8, 64] {
        let registry = EventRegistry::new();
        let transport = Rc::new(InMemoryTransport::new());
        let client: TransportRef = transport.clone();
        let ev = EventName::new("order:updated").unwrap();
        let hits = Rc::new(Cell::new(0u64));

        for i in 0..subscribers {
            let hits = hits.clone();
            registry.subscribe(
                Some(&client),
                &ev,
                move |_| {
                    hits.set(hits.get() + 1);
                    Ok(())
                },
                &format!("bench-{i}"),
            );
        }

        let mut seq = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, _| {
            b.iter(|| {
                seq += 1;
                transport.emit("order:updated", black_box(&json!({"eventId": seq})));
            })
        });
    }

    group.finish();
}

fn bench_duplicates(c: &mut Criterion) {
    let registry = EventRegistry::new();
    let transport = Rc::new(InMemoryTransport::new());
    let client: TransportRef = transport.clone();
    let ev = EventName::new("payment:completed").unwrap();
    for i in 0..16 {
        registry.subscribe(Some(&client), &ev, |_| Ok(()), &format!("bench-{i}"));
    }
    let payload = json!({"eventId": "same"});
    transport.emit("payment:completed", &payload);

    c.bench_function("dispatch_duplicate_16", |b| {
        b.iter(|| transport.emit("payment:completed", black_box(&payload)))
    });
}

criterion_group!(benches, bench_fan_out, bench_duplicates);
criterion_main!(benches);
