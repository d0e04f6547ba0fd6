//! Immutable structure of the road network, shared by the live store and every snapshot

use geo::{LineString, Point};
use hashbrown::HashMap;
use log::info;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use rstar::{RTree, primitives::GeomWithData};

use crate::loading::{NodeDefinition, SegmentDefinition, polyline_length_m};
use crate::{Error, Intersection, NodeId, SegmentId, SegmentInfo};

/// Directed road graph: intersections as nodes, segments as edges
pub type RoadGraph = DiGraph<Intersection, SegmentInfo>;

/// Intersection coordinate stored in the spatial index
pub type IndexedPoint = GeomWithData<[f64; 2], NodeIndex>;

#[derive(Debug)]
pub struct Topology {
    pub(crate) graph: RoadGraph,
    node_index: HashMap<NodeId, NodeIndex>,
    segment_index: HashMap<SegmentId, EdgeIndex>,
    rtree: RTree<IndexedPoint>,
}

impl Topology {
    pub(crate) fn build(
        nodes: Vec<NodeDefinition>,
        segments: Vec<SegmentDefinition>,
    ) -> Result<Self, Error> {
        let mut graph = RoadGraph::with_capacity(nodes.len(), segments.len());
        let mut node_index = HashMap::with_capacity(nodes.len());

        for node in nodes {
            if !node.lon.is_finite() || !node.lat.is_finite() {
                return Err(Error::MalformedNetwork(format!(
                    "node {} has non-finite coordinates",
                    node.id
                )));
            }
            if node_index.contains_key(&node.id) {
                return Err(Error::MalformedNetwork(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            let idx = graph.add_node(Intersection {
                id: node.id.clone(),
                geometry: Point::new(node.lon, node.lat),
            });
            node_index.insert(node.id, idx);
        }

        let mut segment_index = HashMap::with_capacity(segments.len());
        for segment in segments {
            let edge = segment_info(&graph, &node_index, &segment_index, segment)?;
            let from = node_index[&edge.from];
            let to = node_index[&edge.to];
            let id = edge.id.clone();
            let idx = graph.add_edge(from, to, edge);
            segment_index.insert(id, idx);
        }

        let points: Vec<IndexedPoint> = graph
            .node_indices()
            .map(|idx| {
                let p = graph[idx].geometry;
                GeomWithData::new([p.x(), p.y()], idx)
            })
            .collect();
        let rtree = RTree::bulk_load(points);

        info!(
            "Loaded road network with {} intersections and {} segments",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            node_index,
            segment_index,
            rtree,
        })
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn node_index(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_index.get(id).copied()
    }

    pub fn edge_index(&self, id: &SegmentId) -> Option<EdgeIndex> {
        self.segment_index.get(id).copied()
    }

    /// Intersection closest to the given (lon, lat) point
    pub fn nearest_node(&self, point: &Point<f64>) -> Option<NodeIndex> {
        self.rtree
            .nearest_neighbor(&[point.x(), point.y()])
            .map(|indexed| indexed.data)
    }
}

fn segment_info(
    graph: &RoadGraph,
    node_index: &HashMap<NodeId, NodeIndex>,
    segment_index: &HashMap<SegmentId, EdgeIndex>,
    segment: SegmentDefinition,
) -> Result<SegmentInfo, Error> {
    if segment_index.contains_key(&segment.id) {
        return Err(Error::MalformedNetwork(format!(
            "duplicate segment id {}",
            segment.id
        )));
    }
    let (Some(&from), Some(&to)) = (node_index.get(&segment.from), node_index.get(&segment.to))
    else {
        let missing = if node_index.contains_key(&segment.from) {
            &segment.to
        } else {
            &segment.from
        };
        return Err(Error::MalformedNetwork(format!(
            "segment {} references unknown node {}",
            segment.id, missing
        )));
    };
    if !segment.speed_limit_kmh.is_finite() || segment.speed_limit_kmh <= 0.0 {
        return Err(Error::MalformedNetwork(format!(
            "segment {} has non-positive speed limit",
            segment.id
        )));
    }

    let geometry = segment.line_string().unwrap_or_else(|| {
        LineString::from(vec![graph[from].geometry.0, graph[to].geometry.0])
    });
    let length_m = segment
        .length_m
        .unwrap_or_else(|| polyline_length_m(&geometry));
    if !length_m.is_finite() || length_m <= 0.0 {
        return Err(Error::MalformedNetwork(format!(
            "segment {} has non-positive length",
            segment.id
        )));
    }

    Ok(SegmentInfo {
        id: segment.id,
        from: segment.from,
        to: segment.to,
        geometry,
        length_m,
        speed_limit_kmh: segment.speed_limit_kmh,
        toll: segment.toll,
        road_class: segment.road_class,
    })
}
