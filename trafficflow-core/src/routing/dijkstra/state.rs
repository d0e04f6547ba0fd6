use std::cmp::Ordering;

use petgraph::graph::NodeIndex;

#[derive(Copy, Clone, Debug)]
pub(super) struct State {
    pub(super) cost: f64,
    pub(super) hops: u32,
    pub(super) node: NodeIndex,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

// Implement Ord for State to use in BinaryHeap
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by (cost, hops, node) (reversed from standard Rust BinaryHeap)
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
