use geojson::{Feature, FeatureCollection, Geometry};
use serde_json::{Map, Value as JsonValue, json};

use super::query::{RoutePath, RouteResult};
use crate::Error;

impl RoutePath {
    /// Converts the path to a `GeoJSON` `LineString` feature
    fn to_feature(&self, route_id: &str, rank: usize) -> Result<Feature, Error> {
        let value = json!({
            "type": "Feature",
            "geometry": Geometry::new((&self.geometry).into()),
            "properties": {
                "route_id": route_id,
                "rank": rank,
                "segments": self.segments,
                "total_distance_m": self.total_distance_m,
                "total_time_secs": self.total_time_secs,
                "cost": self.cost,
                "basis": self.basis,
                "congestion": self.congestion,
            }
        });
        Ok(serde_json::from_value::<Feature>(value)?)
    }
}

impl RouteResult {
    /// Converts the optimal route and its alternatives to a `GeoJSON`
    /// `FeatureCollection`, optimum first (rank 0)
    ///
    /// # Errors
    ///
    /// Returns an error if a feature cannot be built
    pub fn to_geojson(&self) -> Result<FeatureCollection, Error> {
        let features = if self.is_reachable() && !self.route.segments.is_empty() {
            std::iter::once(&self.route)
                .chain(&self.alternatives)
                .enumerate()
                .map(|(rank, path)| path.to_feature(&self.route_id.0, rank))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        let mut foreign_members = Map::new();
        foreign_members.insert("status".to_string(), json!(self.status));
        foreign_members.insert(
            "computed_at".to_string(),
            JsonValue::String(self.computed_at.to_rfc3339()),
        );

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        })
    }
}
