use std::sync::Arc;

use chrono::{DateTime, Utc};
use petgraph::graph::{EdgeIndex, NodeIndex};

use super::topology::{RoadGraph, Topology};
use crate::{Error, Intersection, NodeId, RoadSegment, SegmentId, SegmentInfo, SegmentState};

/// Immutable point-in-time view of the road network and its traffic state.
///
/// Cloning is cheap: the topology and the state table are shared.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    topology: Arc<Topology>,
    states: Arc<[SegmentState]>,
    taken_at: DateTime<Utc>,
}

impl GraphSnapshot {
    pub(crate) fn new(topology: Arc<Topology>, states: Vec<SegmentState>) -> Self {
        Self {
            topology,
            states: states.into(),
            taken_at: Utc::now(),
        }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.topology.graph
    }

    pub fn node_count(&self) -> usize {
        self.topology.graph.node_count()
    }

    pub fn segment_count(&self) -> usize {
        self.topology.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Intersection> {
        self.topology.graph.node_weights()
    }

    /// All segments with the state they had when the snapshot was taken
    pub fn segments(&self) -> impl Iterator<Item = (&SegmentInfo, &SegmentState)> {
        self.topology
            .graph
            .edge_weights()
            .zip(self.states.iter())
    }

    pub fn node(&self, id: &NodeId) -> Option<&Intersection> {
        self.topology
            .node_index(id)
            .map(|idx| &self.topology.graph[idx])
    }

    pub(crate) fn info(&self, edge: EdgeIndex) -> &SegmentInfo {
        &self.topology.graph[edge]
    }

    pub(crate) fn state(&self, edge: EdgeIndex) -> &SegmentState {
        &self.states[edge.index()]
    }

    pub(crate) fn node_id(&self, node: NodeIndex) -> &NodeId {
        &self.topology.graph[node].id
    }

    /// Point lookup of a segment as of this snapshot
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is unknown
    pub fn segment(&self, id: &SegmentId) -> Result<RoadSegment, Error> {
        let edge = self
            .topology
            .edge_index(id)
            .ok_or_else(|| Error::NotFound(format!("segment {id}")))?;
        Ok(RoadSegment {
            info: self.info(edge).clone(),
            state: *self.state(edge),
        })
    }
}
