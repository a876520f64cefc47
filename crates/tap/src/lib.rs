//! Replay wire frames through an event registry.
//!
//! Operators use this to debug missed or duplicated UI updates: feed it a
//! capture of socket frames (one JSON frame per line) and the event names a
//! screen listens to, and it reports what each subscriber would have seen.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use servewise_core::EventName;
use servewise_events::{
    DependencySet, EventRegistry, InMemoryTransport, RegistryConfig, Subscriber, TransportRef,
};

#[derive(Debug, Parser)]
#[command(name = "servewise-tap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replay realtime wire frames through the event registry", long_about = None)]
pub struct Cli {
    /// Owner label attached to every tap subscriber.
    #[arg(long, default_value = "servewise-tap", env = "SERVEWISE_TAP_OWNER")]
    pub owner: String,

    /// NDJSON file of frames; stdin when omitted.
    #[arg(long)]
    pub frames: Option<PathBuf>,

    /// Log every delivered payload.
    #[arg(short, long)]
    pub verbose: bool,

    /// Event names to subscribe to (e.g. order:created).
    #[arg(required = true)]
    pub events: Vec<String>,
}

/// What a replay saw.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TapSummary {
    pub frames: u64,
    pub malformed: u64,
    pub passes: u64,
    pub delivered: u64,
    pub duplicates_skipped: u64,
    pub failed: u64,
    /// Deliveries per event name, summed over every registration for it.
    pub per_event: BTreeMap<String, u64>,
}

/// Subscribe to `cli.events`, replay every frame from `reader`, summarize.
pub fn run(reader: impl BufRead, cli: &Cli, config: RegistryConfig) -> Result<TapSummary> {
    let registry = EventRegistry::with_config(config);
    let transport = Rc::new(InMemoryTransport::new());
    let client: TransportRef = transport.clone();

    let mut counters: Vec<(EventName, Rc<Cell<u64>>)> = Vec::new();
    let mut subscribers = Vec::new();
    for raw in &cli.events {
        let name = EventName::new(raw.as_str())
            .with_context(|| format!("bad event name {raw:?}"))?;
        let count = Rc::new(Cell::new(0u64));
        let mut subscriber = Subscriber::new(&registry, name.clone(), cli.owner.as_str());
        subscriber.sync(
            Some(&client),
            DependencySet::new(),
            delivery_logger(name.clone(), count.clone(), cli.verbose),
        );
        counters.push((name, count));
        subscribers.push(subscriber);
    }
    info!(events = ?cli.events, "tap subscribed");

    let mut summary = TapSummary::default();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.context("failed to read frame input")?;
        if line.trim().is_empty() {
            continue;
        }
        summary.frames += 1;
        if let Err(err) = transport.deliver_frame(&line) {
            summary.malformed += 1;
            warn!(line = lineno + 1, error = %err, "skipping malformed frame");
        }
    }

    let totals = registry.totals();
    summary.passes = totals.passes;
    summary.delivered = totals.delivered;
    summary.duplicates_skipped = totals.duplicates_skipped;
    summary.failed = totals.failed;
    for (name, count) in counters {
        *summary.per_event.entry(name.to_string()).or_default() += count.get();
    }

    info!(frames = summary.frames, delivered = summary.delivered, "replay finished");
    drop(subscribers);
    Ok(summary)
}

fn delivery_logger(
    name: EventName,
    count: Rc<Cell<u64>>,
    verbose: bool,
) -> impl Fn(&JsonValue) -> Result<()> + 'static {
    move |payload: &JsonValue| {
        count.set(count.get() + 1);
        if verbose {
            info!(event = %name, %payload, "delivered");
        }
        Ok(())
    }
}
