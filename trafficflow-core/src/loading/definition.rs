use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use geo::{Coord, LineString};
use serde::Deserialize;

use crate::{Error, NodeId, SegmentId};

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Road network as supplied by the network definition loader
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkDefinition {
    pub nodes: Vec<NodeDefinition>,
    pub segments: Vec<SegmentDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDefinition {
    pub id: NodeId,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentDefinition {
    pub id: SegmentId,
    pub from: NodeId,
    pub to: NodeId,
    /// Derived from the geometry when absent
    #[serde(default)]
    pub length_m: Option<f64>,
    pub speed_limit_kmh: f64,
    /// Polyline as `[lon, lat]` pairs; straight line between endpoints when empty
    #[serde(default)]
    pub geometry: Vec<[f64; 2]>,
    #[serde(default)]
    pub toll: bool,
    #[serde(default)]
    pub road_class: Option<String>,
}

impl NetworkDefinition {
    /// Reads a JSON network definition
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid JSON network document
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Error> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reads a JSON network definition from a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Failed to open network file '{}': {}", path.display(), e),
            )
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

impl NodeDefinition {
    pub fn new(id: &str, lon: f64, lat: f64) -> Self {
        Self {
            id: NodeId::from(id),
            lon,
            lat,
        }
    }
}

impl SegmentDefinition {
    pub fn new(id: &str, from: &str, to: &str, length_m: f64, speed_limit_kmh: f64) -> Self {
        Self {
            id: SegmentId::from(id),
            from: NodeId::from(from),
            to: NodeId::from(to),
            length_m: Some(length_m),
            speed_limit_kmh,
            geometry: Vec::new(),
            toll: false,
            road_class: None,
        }
    }

    #[must_use]
    pub fn with_toll(mut self) -> Self {
        self.toll = true;
        self
    }

    #[must_use]
    pub fn with_geometry(mut self, geometry: Vec<[f64; 2]>) -> Self {
        self.geometry = geometry;
        self
    }

    pub(crate) fn line_string(&self) -> Option<LineString<f64>> {
        if self.geometry.len() < 2 {
            return None;
        }
        Some(
            self.geometry
                .iter()
                .map(|&[x, y]| Coord { x, y })
                .collect(),
        )
    }
}

/// Great-circle distance in meters between two (lon, lat) coordinates
pub(crate) fn haversine_m(from: Coord<f64>, to: Coord<f64>) -> f64 {
    let lat1_rad = from.y.to_radians();
    let lat2_rad = to.y.to_radians();
    let delta_lat = (to.y - from.y).to_radians();
    let delta_lng = (to.x - from.x).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Great-circle length of a polyline in meters
pub(crate) fn polyline_length_m(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| haversine_m(l.start, l.end)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_definition() {
        let json = r#"{
            "nodes": [{"id": "a", "lon": 18.42, "lat": -33.92}, {"id": "b", "lon": 18.43, "lat": -33.92}],
            "segments": [{"id": "s1", "from": "a", "to": "b", "speed_limit_kmh": 60}]
        }"#;
        let def = NetworkDefinition::from_reader(json.as_bytes()).unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.segments[0].length_m, None);
        assert!(!def.segments[0].toll);
    }

    #[test]
    fn haversine_of_one_degree_latitude() {
        let d = haversine_m(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 1.0 });
        assert!((d - 111_195.0).abs() < 100.0);
    }
}
