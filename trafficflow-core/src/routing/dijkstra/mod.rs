mod state;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::cost::CostModel;
use crate::graph::RoadGraph;
use crate::{Error, SegmentId};
use state::State;

/// Heap pops between two deadline checks
const DEADLINE_CHECK_INTERVAL: u64 = 64;

/// Wall-clock bound shared by every search of one query
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchLimits {
    pub(crate) deadline: Instant,
    pub(crate) budget: Duration,
}

impl SearchLimits {
    pub(crate) fn starting_now(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
            budget,
        }
    }
}

/// Multiplicative penalties on edges already used by found routes
#[derive(Debug)]
pub(crate) struct Penalties {
    uses: HashMap<EdgeIndex, i32>,
    factor: f64,
}

impl Penalties {
    pub(crate) fn new(factor: f64) -> Self {
        Self {
            uses: HashMap::new(),
            factor: factor.max(1.0),
        }
    }

    pub(crate) fn mark(&mut self, edges: &[EdgeIndex]) {
        for &edge in edges {
            *self.uses.entry(edge).or_insert(0) += 1;
        }
    }

    fn multiplier(&self, edge: EdgeIndex) -> f64 {
        self.uses
            .get(&edge)
            .map_or(1.0, |&uses| self.factor.powi(uses))
    }
}

/// Dijkstra's algorithm from `origin` to `target`.
///
/// Ties on cost go to the path with fewer segments, then to the
/// lexicographically smaller segment id sequence. Returns the edges of the
/// best path, or `None` if the target cannot be reached.
pub(crate) fn dijkstra_route(
    costs: &CostModel<'_>,
    origin: NodeIndex,
    target: NodeIndex,
    avoid_tolls: bool,
    penalties: &Penalties,
    limits: &SearchLimits,
) -> Result<Option<Vec<EdgeIndex>>, Error> {
    let graph = costs.snapshot.graph();
    let node_count = graph.node_count();

    let mut distances = vec![f64::INFINITY; node_count];
    let mut hops = vec![u32::MAX; node_count];
    let mut elapsed = vec![0.0_f64; node_count];
    let mut predecessors: Vec<Option<EdgeIndex>> = vec![None; node_count];
    let mut settled = FixedBitSet::with_capacity(node_count);
    let mut heap = BinaryHeap::with_capacity(node_count.min(1024));

    // Start node has distance 0
    distances[origin.index()] = 0.0;
    hops[origin.index()] = 0;
    heap.push(State {
        cost: 0.0,
        hops: 0,
        node: origin,
    });

    let mut pops: u64 = 0;
    while let Some(State { node, .. }) = heap.pop() {
        if pops % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= limits.deadline {
            return Err(Error::OptimizationTimeout(limits.budget));
        }
        pops += 1;

        // Skip if this node has been finalized by a better label
        if settled.contains(node.index()) {
            continue;
        }
        settled.insert(node.index());

        // Check if we've reached the target
        if node == target {
            break;
        }

        let cost = distances[node.index()];
        let node_hops = hops[node.index()];
        let node_elapsed = elapsed[node.index()];

        // Examine neighbors
        for edge in graph.edges(node) {
            if avoid_tolls && edge.weight().toll {
                continue;
            }
            let next = edge.target();
            if settled.contains(next.index()) {
                continue;
            }

            let edge_cost = costs.edge(edge.id(), node_elapsed);
            let next_cost = cost + edge_cost.cost * penalties.multiplier(edge.id());
            let next_hops = node_hops + 1;

            let improves = match next_cost
                .total_cmp(&distances[next.index()])
                .then(next_hops.cmp(&hops[next.index()]))
            {
                Ordering::Less => true,
                Ordering::Equal => {
                    extends_to_smaller_path(graph, &predecessors, node, edge.id(), next)
                }
                Ordering::Greater => false,
            };

            if improves {
                distances[next.index()] = next_cost;
                hops[next.index()] = next_hops;
                elapsed[next.index()] = node_elapsed + edge_cost.travel_secs;
                predecessors[next.index()] = Some(edge.id());
                heap.push(State {
                    cost: next_cost,
                    hops: next_hops,
                    node: next,
                });
            }
        }
    }

    if !settled.contains(target.index()) {
        return Ok(None);
    }

    let mut path = Vec::with_capacity(hops[target.index()] as usize);
    let mut current = target;
    while let Some(edge) = predecessors[current.index()] {
        path.push(edge);
        current = graph
            .edge_endpoints(edge)
            .map_or(origin, |(source, _)| source);
    }
    path.reverse();
    Ok(Some(path))
}

/// Segment ids from the origin to `node`, following predecessors
fn path_ids<'g>(
    graph: &'g RoadGraph,
    predecessors: &[Option<EdgeIndex>],
    node: NodeIndex,
) -> Vec<&'g SegmentId> {
    let mut ids = Vec::new();
    let mut current = node;
    while let Some(edge) = predecessors[current.index()] {
        ids.push(&graph[edge].id);
        match graph.edge_endpoints(edge) {
            Some((source, _)) => current = source,
            None => break,
        }
    }
    ids.reverse();
    ids
}

/// Whether reaching `next` through `node` and `edge` gives a lexicographically
/// smaller id sequence than its current path
fn extends_to_smaller_path(
    graph: &RoadGraph,
    predecessors: &[Option<EdgeIndex>],
    node: NodeIndex,
    edge: EdgeIndex,
    next: NodeIndex,
) -> bool {
    let mut candidate = path_ids(graph, predecessors, node);
    candidate.push(&graph[edge].id);
    candidate < path_ids(graph, predecessors, next)
}
