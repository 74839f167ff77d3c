//! Stream-deferred reclaim of freed blocks.
//!
//! A freed block is parked together with one event per stream that may still
//! use it: every recorded stream, plus the allocating stream unless it is the
//! default stream. Work on the default stream is already ordered before any
//! later allocation by the proxy's wait. The block becomes reusable only after
//! every event reports completion. Completion is polled, never awaited.

use super::caching::Allocation;
use super::error::AllocError;
use crate::device::{DeviceRuntime, Event, Stream};

struct PendingBlock<B> {
    block: B,
    events: Vec<Event>,
}

/// Blocks waiting for their recorded streams to retire.
pub(crate) struct PendingFrees<B> {
    entries: Vec<PendingBlock<B>>,
}

impl<B> PendingFrees<B> {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn push(&mut self, block: B, events: Vec<Event>) {
        self.entries.push(PendingBlock { block, events });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove and return blocks whose events have all completed.
    ///
    /// A failed completion query keeps the block parked.
    pub(crate) fn collect_ready(&mut self, runtime: &dyn DeviceRuntime) -> Vec<B> {
        let mut ready = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            let entry = &mut self.entries[i];
            let mut j = 0;
            while j < entry.events.len() {
                match runtime.event_completed(entry.events[j]) {
                    Ok(true) => runtime.destroy_event(entry.events.swap_remove(j)),
                    Ok(false) => j += 1,
                    Err(e) => {
                        tracing::warn!(error = %e, "event query failed, block stays parked");
                        j += 1;
                    }
                }
            }
            if entry.events.is_empty() {
                ready.push(self.entries.swap_remove(i).block);
            } else {
                i += 1;
            }
        }
        ready
    }

    /// Drop every parked block regardless of stream progress.
    pub(crate) fn drain_all(&mut self, runtime: &dyn DeviceRuntime) -> Vec<B> {
        self.entries
            .drain(..)
            .map(|entry| {
                for event in entry.events {
                    runtime.destroy_event(event);
                }
                entry.block
            })
            .collect()
    }
}

/// Streams whose queued work may still touch `allocation`.
pub(crate) fn streams_in_use(allocation: &Allocation) -> Vec<Stream> {
    let mut streams = allocation.recorded_streams();
    if !allocation.stream.is_default() {
        streams.push(allocation.stream);
    }
    streams
}

/// Record one event on each stream that may still use `allocation` and
/// return the ones not yet complete. An empty result means the block can be
/// reused right away.
///
/// On failure the events recorded so far are destroyed.
pub(crate) fn record_free_events(
    runtime: &dyn DeviceRuntime,
    allocation: &Allocation,
) -> Result<Vec<Event>, AllocError> {
    let streams = streams_in_use(allocation);
    let mut events = Vec::with_capacity(streams.len());
    for stream in streams {
        match runtime.record_event(stream) {
            Ok(event) => events.push(event),
            Err(e) => {
                destroy_events(runtime, events);
                return Err(e.into());
            }
        }
    }
    events.retain(|&event| match runtime.event_completed(event) {
        Ok(true) => {
            runtime.destroy_event(event);
            false
        }
        Ok(false) | Err(_) => true,
    });
    Ok(events)
}

pub(crate) fn destroy_events(runtime: &dyn DeviceRuntime, events: Vec<Event>) {
    for event in events {
        runtime.destroy_event(event);
    }
}
