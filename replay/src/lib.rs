//! Script-driven replay of unit-of-work flushes.
//!
//! Loads a tracking registry and a flush script, feeds every flush through a
//! [`ChangeListener`] and writes each delivered event as one JSON line.

mod script;

pub use script::{
    ChangeEntry, CollectionEntry, Entities, FlushScript, Script, StateEntry, UpdateEntry,
};

use anyhow::{Context, Result};
use changeset_engine::{Dispatcher, DispatcherConfig, EventLog};
use changeset_listener::ChangeListener;
use changeset_model::ConfigRegistry;
use changeset_types::Event;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One line of replay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLine {
    pub event: String,
    pub payload: Event,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Keep auto-dispatch off and run a single pass after the last flush.
    pub manual_dispatch: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub flushes: usize,
    pub rolled_back: usize,
    pub events: usize,
}

pub fn load_registry(path: &Path) -> Result<ConfigRegistry> {
    ConfigRegistry::from_path(path)
        .with_context(|| format!("Failed to load registry from {}", path.display()))
}

pub fn load_script(path: &Path) -> Result<Script> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid script {}", path.display()))
}

/// Replays `script` against `registry`, writing event lines to `out`.
pub fn run_script(
    registry: ConfigRegistry,
    script: &Script,
    options: &ReplayOptions,
    out: &mut impl Write,
) -> Result<ReplaySummary> {
    let log = Arc::new(EventLog::new());
    let dispatcher = Arc::new(Dispatcher::new(
        log.clone(),
        DispatcherConfig {
            auto_dispatch: !options.manual_dispatch,
        },
    ));
    let listener = ChangeListener::new(Arc::new(registry), dispatcher.clone());
    let entities = Entities::allocate(&script.entities);

    let mut summary = ReplaySummary::default();
    for (index, flush) in script.flushes.iter().enumerate() {
        let work = entities
            .unit_of_work(flush)
            .with_context(|| format!("flush #{index}"))?;

        if flush.rollback {
            listener
                .record(&work)
                .with_context(|| format!("flush #{index}"))?;
            let dropped = listener.rollback();
            debug!("Flush #{} rolled back, {} record(s) dropped", index, dropped.total());
            summary.rolled_back += 1;
        } else {
            let delivered = listener
                .flush(&work)
                .with_context(|| format!("flush #{index}"))?;
            debug!("Flush #{} delivered {} event(s)", index, delivered);
            summary.flushes += 1;
        }
        summary.events += write_events(&log, out)?;
    }

    if options.manual_dispatch {
        let delivered = dispatcher.dispatch_all().context("manual dispatch")?;
        info!("Manual dispatch delivered {} event(s)", delivered);
        summary.events += write_events(&log, out)?;
    }

    Ok(summary)
}

fn write_events(log: &EventLog, out: &mut impl Write) -> Result<usize> {
    let entries = log.drain();
    for (event, payload) in &entries {
        let line = EventLine {
            event: event.clone(),
            payload: payload.clone(),
        };
        serde_json::to_writer(&mut *out, &line)?;
        writeln!(out)?;
    }
    Ok(entries.len())
}
