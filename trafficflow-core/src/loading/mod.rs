//! This module is responsible for reading the road network definition
//! handed over by the network loader.

mod definition;

pub use definition::{NetworkDefinition, NodeDefinition, SegmentDefinition};
pub(crate) use definition::polyline_length_m;
