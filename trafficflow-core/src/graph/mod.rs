//! Live road network graph and its concurrent update protocol.
//!
//! The network topology is fixed at load time and shared behind an `Arc`.
//! Each segment's traffic state sits behind its own lock, so updates to
//! different segments never contend and a reader copying the state table
//! sees every segment either before or after any given update.

mod snapshot;
mod topology;

use std::sync::{Arc, PoisonError, RwLock};

use log::trace;

pub use snapshot::GraphSnapshot;
pub use topology::{IndexedPoint, RoadGraph, Topology};

use crate::loading::{NetworkDefinition, NodeDefinition, SegmentDefinition};
use crate::{Error, RoadSegment, SegmentId, SegmentState, TrafficSample};

/// Result of applying one sample to the live graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApplyOutcome {
    /// The sample was newer than (or as new as) the current state and replaced it
    Applied(SegmentState),
    /// The segment already holds a later reading; the sample was dropped
    Stale,
}

/// Owner of the road network and all current traffic state
#[derive(Debug)]
pub struct GraphStore {
    topology: Arc<Topology>,
    // Indexed by edge index; edges are never removed after load.
    states: Vec<RwLock<SegmentState>>,
}

impl GraphStore {
    /// Bulk-initializes the graph from a network definition
    ///
    /// # Errors
    ///
    /// Returns `MalformedNetwork` if a segment references an unknown node, or if
    /// ids, coordinates, lengths or speed limits are invalid
    pub fn load(
        nodes: Vec<NodeDefinition>,
        segments: Vec<SegmentDefinition>,
    ) -> Result<Self, Error> {
        let topology = Topology::build(nodes, segments)?;
        let states = topology
            .graph
            .edge_weights()
            .map(|info| RwLock::new(SegmentState::free_flow(info.speed_limit_kmh)))
            .collect();
        Ok(Self {
            topology: Arc::new(topology),
            states,
        })
    }

    /// # Errors
    ///
    /// See [`GraphStore::load`]
    pub fn from_definition(definition: NetworkDefinition) -> Result<Self, Error> {
        Self::load(definition.nodes, definition.segments)
    }

    pub fn node_count(&self) -> usize {
        self.topology.graph.node_count()
    }

    pub fn segment_count(&self) -> usize {
        self.states.len()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Immutable view of the whole graph, usable without further locking
    pub fn snapshot(&self) -> GraphSnapshot {
        let states = self
            .states
            .iter()
            .map(|lock| *lock.read().unwrap_or_else(PoisonError::into_inner))
            .collect();
        GraphSnapshot::new(Arc::clone(&self.topology), states)
    }

    /// Atomically updates one segment's speed, congestion and timestamp.
    ///
    /// Last writer wins by sample timestamp: a sample older than the segment's
    /// last update is dropped and reported as [`ApplyOutcome::Stale`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown segment and `InvalidSample` for
    /// out-of-range values
    pub fn apply_sample(&self, sample: &TrafficSample) -> Result<ApplyOutcome, Error> {
        sample.validate()?;
        let edge = self
            .topology
            .edge_index(&sample.segment_id)
            .ok_or_else(|| Error::NotFound(format!("segment {}", sample.segment_id)))?;

        let mut state = self.states[edge.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if state
            .last_update
            .is_some_and(|last| sample.timestamp < last)
        {
            trace!(
                "Dropping stale sample for {} at {}",
                sample.segment_id, sample.timestamp
            );
            return Ok(ApplyOutcome::Stale);
        }

        *state = SegmentState {
            speed_kmh: sample.speed_kmh,
            congestion: sample.congestion,
            last_update: Some(sample.timestamp),
            source: sample.source,
        };
        Ok(ApplyOutcome::Applied(*state))
    }

    /// Current state of one segment
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is unknown
    pub fn segment(&self, id: &SegmentId) -> Result<RoadSegment, Error> {
        let edge = self
            .topology
            .edge_index(id)
            .ok_or_else(|| Error::NotFound(format!("segment {id}")))?;
        let state = *self.states[edge.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(RoadSegment {
            info: self.topology.graph[edge].clone(),
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::SourceTag;

    fn store() -> GraphStore {
        GraphStore::load(
            vec![
                NodeDefinition::new("a", 0.0, 0.0),
                NodeDefinition::new("b", 0.01, 0.0),
            ],
            vec![SegmentDefinition::new("ab", "a", "b", 1000.0, 50.0)],
        )
        .unwrap()
    }

    fn sample(speed: f64, minute: u32) -> TrafficSample {
        TrafficSample {
            segment_id: SegmentId::from("ab"),
            speed_kmh: speed,
            congestion: 0.5,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap(),
            source: SourceTag::Sensor,
        }
    }

    #[test]
    fn unobserved_segment_runs_at_speed_limit() {
        let segment = store().segment(&SegmentId::from("ab")).unwrap();
        assert_eq!(segment.state.speed_kmh, 50.0);
        assert_eq!(segment.state.last_update, None);
        assert_eq!(segment.state.source, SourceTag::Baseline);
    }

    #[test]
    fn equal_timestamp_is_accepted() {
        let store = store();
        store.apply_sample(&sample(30.0, 5)).unwrap();
        let outcome = store.apply_sample(&sample(25.0, 5)).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied(s) if s.speed_kmh == 25.0));
    }

    #[test]
    fn invalid_sample_is_rejected() {
        let err = store().apply_sample(&sample(-3.0, 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidSample(_)));
    }

    #[test]
    fn snapshot_is_isolated_from_later_updates() {
        let store = store();
        let before = store.snapshot();
        store.apply_sample(&sample(12.0, 1)).unwrap();
        let id = SegmentId::from("ab");
        assert_eq!(before.segment(&id).unwrap().state.speed_kmh, 50.0);
        assert_eq!(store.snapshot().segment(&id).unwrap().state.speed_kmh, 12.0);
    }
}
