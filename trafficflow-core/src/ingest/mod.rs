//! Streaming ingestion: decodes measurement events, applies them to the
//! graph store and notifies subscribers of every accepted change.

mod event;
mod source;

use std::ops::AddAssign;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

pub use event::StreamEvent;
pub use source::{EventSource, LineSource, VecSource};

use crate::broadcast::{SegmentChange, SubscriptionBroadcaster};
use crate::graph::ApplyOutcome;
use crate::metrics::Metrics;
use crate::prediction::Forecaster;
use crate::{ContextEvent, Error, GraphStore, SegmentId, TrafficSample};

/// What became of one event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Applied(SegmentChange),
    /// Older than the segment's current reading
    Stale,
    /// Routed to the forecaster
    Context,
    Invalid,
    UnknownSegment,
}

/// Per-run event tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub applied: u64,
    pub stale: u64,
    pub invalid: u64,
    pub unknown_segment: u64,
    pub context: u64,
}

impl IngestReport {
    pub fn total(&self) -> u64 {
        self.applied + self.stale + self.invalid + self.unknown_segment + self.context
    }

    fn record(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Applied(_) => self.applied += 1,
            EventOutcome::Stale => self.stale += 1,
            EventOutcome::Context => self.context += 1,
            EventOutcome::Invalid => self.invalid += 1,
            EventOutcome::UnknownSegment => self.unknown_segment += 1,
        }
    }
}

impl AddAssign for IngestReport {
    fn add_assign(&mut self, rhs: Self) {
        self.applied += rhs.applied;
        self.stale += rhs.stale;
        self.invalid += rhs.invalid;
        self.unknown_segment += rhs.unknown_segment;
        self.context += rhs.context;
    }
}

/// Consumer of the measurement stream.
///
/// Holds shared handles only; one pipeline may be driven from several
/// worker threads at once.
pub struct IngestionPipeline {
    graph: Arc<GraphStore>,
    forecaster: Arc<dyn Forecaster>,
    broadcaster: Arc<SubscriptionBroadcaster>,
    metrics: Arc<Metrics>,
}

impl IngestionPipeline {
    pub fn new(
        graph: Arc<GraphStore>,
        forecaster: Arc<dyn Forecaster>,
        broadcaster: Arc<SubscriptionBroadcaster>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            graph,
            forecaster,
            broadcaster,
            metrics,
        }
    }

    /// Decodes and applies one raw payload. Never fails: bad payloads are
    /// counted and reported as [`EventOutcome::Invalid`].
    pub fn process(&self, payload: &[u8]) -> EventOutcome {
        match StreamEvent::decode(payload) {
            Ok(event) => self.apply(event),
            Err(err) => {
                Metrics::incr(&self.metrics.samples_invalid);
                debug!("Discarding event: {err}");
                EventOutcome::Invalid
            }
        }
    }

    /// Routes a decoded event: traffic to the graph, context to the forecaster
    pub fn apply(&self, event: StreamEvent) -> EventOutcome {
        match event {
            StreamEvent::Traffic(sample) => self.apply_sample(&sample),
            StreamEvent::Weather(report) => self.apply_context(ContextEvent::Weather(report)),
            StreamEvent::Incident(incident) => {
                self.apply_context(ContextEvent::Incident(incident))
            }
        }
    }

    fn apply_context(&self, event: ContextEvent) -> EventOutcome {
        if let Err(err) = event.validate() {
            Metrics::incr(&self.metrics.samples_invalid);
            debug!("Discarding context event: {err}");
            return EventOutcome::Invalid;
        }
        self.forecaster.ingest_context(event);
        EventOutcome::Context
    }

    fn apply_sample(&self, sample: &TrafficSample) -> EventOutcome {
        match self.graph.apply_sample(sample) {
            Ok(ApplyOutcome::Applied(state)) => {
                Metrics::incr(&self.metrics.samples_applied);
                self.forecaster.observe(sample);
                let change = SegmentChange {
                    segment_id: sample.segment_id.clone(),
                    state,
                };
                self.broadcaster.publish(&change);
                EventOutcome::Applied(change)
            }
            Ok(ApplyOutcome::Stale) => {
                Metrics::incr(&self.metrics.samples_stale);
                EventOutcome::Stale
            }
            Err(Error::NotFound(what)) => {
                Metrics::incr(&self.metrics.samples_unknown_segment);
                debug!("Discarding sample for unknown {what}");
                EventOutcome::UnknownSegment
            }
            Err(err) => {
                Metrics::incr(&self.metrics.samples_invalid);
                debug!("Discarding sample: {err}");
                EventOutcome::Invalid
            }
        }
    }

    /// Consumes `source` until it ends or `shutdown` is raised. Shutdown is
    /// checked between events, so the event in hand is always finished.
    pub fn run<S: EventSource>(&self, mut source: S, shutdown: &AtomicBool) -> IngestReport {
        let mut report = IngestReport::default();
        while !shutdown.load(Ordering::Acquire) {
            let Some(payload) = source.next_event() else {
                break;
            };
            report.record(&self.process(&payload));
        }
        info!(
            "Ingestion stopped after {} events: {} applied, {} stale, {} invalid, {} unknown segment, {} context",
            report.total(),
            report.applied,
            report.stale,
            report.invalid,
            report.unknown_segment,
            report.context
        );
        report
    }

    /// Applies a batch with one worker per segment.
    ///
    /// Context events go first in stream order. Samples for the same segment
    /// stay in stream order on one worker, so their notifications are
    /// published in the order they were applied.
    pub fn process_batch(&self, payloads: &[Vec<u8>]) -> IngestReport {
        let mut report = IngestReport::default();
        let mut per_segment: HashMap<SegmentId, Vec<TrafficSample>> = HashMap::new();

        for payload in payloads {
            match StreamEvent::decode(payload) {
                Ok(StreamEvent::Traffic(sample)) => per_segment
                    .entry(sample.segment_id.clone())
                    .or_default()
                    .push(sample),
                Ok(event) => report.record(&self.apply(event)),
                Err(err) => {
                    Metrics::incr(&self.metrics.samples_invalid);
                    debug!("Discarding event: {err}");
                    report.invalid += 1;
                }
            }
        }

        let applied = per_segment
            .into_par_iter()
            .map(|(_, samples)| {
                let mut partial = IngestReport::default();
                for sample in &samples {
                    partial.record(&self.apply_sample(sample));
                }
                partial
            })
            .reduce(IngestReport::default, |mut a, b| {
                a += b;
                a
            });
        report += applied;
        report
    }
}
