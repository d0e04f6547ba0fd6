use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use geo::{Coord, LineString, Point};
use itertools::Itertools;
use log::{debug, warn};
use petgraph::graph::{EdgeIndex, NodeIndex};

use super::cost::CostModel;
use super::dijkstra::{Penalties, SearchLimits, dijkstra_route};
use super::query::{
    CongestionStatus, CostBasis, Endpoint, RouteId, RoutePath, RouteQuery, RouteResult,
    RouteStatus, SegmentCondition,
};
use crate::config::OptimizerConfig;
use crate::metrics::Metrics;
use crate::prediction::Forecaster;
use crate::{Error, GraphSnapshot, GraphStore};

/// Computes optimal and alternative routes over graph snapshots.
///
/// Read-only with respect to the graph store and the forecaster; any number
/// of queries may run in parallel with each other and with ingestion.
pub struct RouteOptimizer {
    graph: Arc<GraphStore>,
    forecaster: Arc<dyn Forecaster>,
    config: OptimizerConfig,
    metrics: Arc<Metrics>,
    next_route: AtomicU64,
}

impl RouteOptimizer {
    pub fn new(
        graph: Arc<GraphStore>,
        forecaster: Arc<dyn Forecaster>,
        config: OptimizerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            graph,
            forecaster,
            config,
            metrics,
            next_route: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimal route plus alternatives over a fresh snapshot
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown endpoints, `InvalidQuery` for malformed
    /// coordinates, `OptimizationTimeout` when the search budget runs out.
    /// An unreachable destination is not an error.
    pub fn optimize(&self, query: &RouteQuery) -> Result<RouteResult, Error> {
        let snapshot = self.graph.snapshot();
        self.optimize_on(&snapshot, query)
    }

    /// Same as [`RouteOptimizer::optimize`] against a caller-provided snapshot
    ///
    /// # Errors
    ///
    /// See [`RouteOptimizer::optimize`]
    pub fn optimize_on(
        &self,
        snapshot: &GraphSnapshot,
        query: &RouteQuery,
    ) -> Result<RouteResult, Error> {
        Metrics::incr(&self.metrics.route_queries);
        let limits = SearchLimits::starting_now(self.config.search_budget());

        let origin = resolve(snapshot, &query.origin)?;
        let destination = resolve(snapshot, &query.destination)?;

        let horizon_minutes = query.horizon_minutes.min(self.config.max_horizon_minutes);
        let view = (horizon_minutes > 0).then(|| self.forecaster.view());
        let costs = CostModel {
            snapshot,
            forecast: view.as_ref(),
            horizon_minutes,
            preference: query.preference,
            min_speed_kmh: self.config.min_speed_kmh.max(f64::MIN_POSITIVE),
            congestion_penalty: self.config.congestion_penalty,
        };

        let route_id = RouteId(format!(
            "route-{}",
            self.next_route.fetch_add(1, Ordering::Relaxed)
        ));
        let mut result = RouteResult {
            route_id,
            status: RouteStatus::Found,
            route: RoutePath::empty(),
            alternatives: Vec::new(),
            preference: query.preference,
            horizon_minutes,
            forecast_generation: None,
            forecast_age_secs: None,
            computed_at: Utc::now(),
        };

        if origin == destination {
            result.route.geometry = LineString::from(vec![snapshot.graph()[origin].geometry.0]);
            return Ok(result);
        }

        let paths = self
            .search_routes(&costs, origin, destination, query, &limits)
            .inspect_err(|err| {
                if matches!(err, Error::OptimizationTimeout(_)) {
                    Metrics::incr(&self.metrics.route_timeouts);
                    warn!(
                        "Route search {} -> {} aborted after {:?}",
                        snapshot.node_id(origin),
                        snapshot.node_id(destination),
                        limits.budget
                    );
                }
            })?;

        let mut paths = paths.into_iter();
        let Some(best) = paths.next() else {
            Metrics::incr(&self.metrics.routes_unreachable);
            debug!(
                "No route from {} to {}",
                snapshot.node_id(origin),
                snapshot.node_id(destination)
            );
            result.status = RouteStatus::Unreachable;
            return Ok(result);
        };

        result.route = best;
        result.alternatives = paths.collect();
        let predicted = std::iter::once(&result.route)
            .chain(&result.alternatives)
            .any(|p| p.basis == CostBasis::Predicted);
        if let Some(view) = view.as_ref().filter(|_| predicted) {
            let age = (result.computed_at - view.model().reference_time()).num_seconds();
            if age > i64::from(horizon_minutes) * 60 {
                debug!(
                    "Route {} costed with forecast generation {} trained on data {age} s old",
                    result.route_id,
                    view.generation()
                );
            }
            result.forecast_generation = Some(view.generation());
            result.forecast_age_secs = Some(age);
        }

        debug!(
            "Route {}: [{}] cost {:.1}, {} alternatives",
            result.route_id,
            result.route.segments.iter().join(", "),
            result.route.cost,
            result.alternatives.len()
        );
        Ok(result)
    }

    /// Optimum first, then alternatives ranked by cost. Empty when unreachable.
    fn search_routes(
        &self,
        costs: &CostModel<'_>,
        origin: NodeIndex,
        destination: NodeIndex,
        query: &RouteQuery,
        limits: &SearchLimits,
    ) -> Result<Vec<RoutePath>, Error> {
        let avoid_tolls = query.constraints.avoid_tolls;
        let mut penalties = Penalties::new(self.config.alternative_penalty);

        let Some(best_edges) =
            dijkstra_route(costs, origin, destination, avoid_tolls, &penalties, limits)?
        else {
            return Ok(Vec::new());
        };
        let best = evaluate(costs, &best_edges, origin);
        let max_cost = best.cost * self.config.alternative_cost_ratio.max(1.0);
        penalties.mark(&best_edges);

        // A query may ask for fewer routes than configured, never more
        let wanted = query
            .max_alternatives
            .map_or(self.config.max_alternatives, |asked| {
                asked.min(self.config.max_alternatives)
            })
            .max(1);
        let mut found: Vec<(Vec<EdgeIndex>, RoutePath)> = vec![(best_edges, best)];

        // Each rerun penalizes the edges of every path seen so far, so the
        // number of attempts is bounded separately from the number accepted.
        for _ in 0..(wanted - 1).saturating_mul(2) {
            if found.len() >= wanted {
                break;
            }
            let Some(edges) =
                dijkstra_route(costs, origin, destination, avoid_tolls, &penalties, limits)?
            else {
                break;
            };
            penalties.mark(&edges);
            if found.iter().any(|(seen, _)| *seen == edges) {
                continue;
            }
            let path = evaluate(costs, &edges, origin);
            if path.cost > max_cost {
                debug!(
                    "Rejecting alternative with cost {:.1} above {:.1}",
                    path.cost, max_cost
                );
                continue;
            }
            found.push((edges, path));
        }

        let mut paths = found.into_iter().map(|(_, path)| path);
        let Some(best) = paths.next() else {
            return Ok(Vec::new());
        };
        let alternatives = paths.sorted_by(|a, b| {
            a.cost
                .total_cmp(&b.cost)
                .then(a.segments.len().cmp(&b.segments.len()))
                .then_with(|| a.segments.cmp(&b.segments))
        });
        Ok(std::iter::once(best).chain(alternatives).collect())
    }
}

fn resolve(snapshot: &GraphSnapshot, endpoint: &Endpoint) -> Result<NodeIndex, Error> {
    match endpoint {
        Endpoint::Node(id) => snapshot
            .topology()
            .node_index(id)
            .ok_or_else(|| Error::NotFound(format!("node {id}"))),
        Endpoint::Coordinate { lon, lat } => {
            if !lon.is_finite() || !lat.is_finite() {
                return Err(Error::InvalidQuery(format!(
                    "coordinate ({lon}, {lat}) is not finite"
                )));
            }
            snapshot
                .topology()
                .nearest_node(&Point::new(*lon, *lat))
                .ok_or_else(|| Error::NotFound("no intersection near coordinate".to_string()))
        }
    }
}

/// Costs a path without penalties, collecting per-segment conditions
fn evaluate(costs: &CostModel<'_>, edges: &[EdgeIndex], origin: NodeIndex) -> RoutePath {
    let snapshot = costs.snapshot;
    let mut path = RoutePath::empty();
    let mut coords: Vec<Coord<f64>> = vec![snapshot.graph()[origin].geometry.0];
    let mut weighted_congestion = 0.0;

    for &edge in edges {
        let info = snapshot.info(edge);
        let edge_cost = costs.edge(edge, path.total_time_secs);

        path.conditions.push(SegmentCondition {
            segment_id: info.id.clone(),
            speed_kmh: edge_cost.speed_kmh,
            congestion: edge_cost.congestion,
            travel_time_secs: edge_cost.travel_secs,
            enter_after_secs: path.total_time_secs,
            basis: edge_cost.basis,
        });
        if edge_cost.basis == CostBasis::Predicted {
            path.basis = CostBasis::Predicted;
        }

        path.segments.push(info.id.clone());
        path.total_distance_m += info.length_m;
        path.total_time_secs += edge_cost.travel_secs;
        path.cost += edge_cost.cost;
        weighted_congestion += edge_cost.congestion * info.length_m;
        // First coordinate repeats the previous segment's end
        coords.extend(info.geometry.coords().skip(1).copied());
    }

    if path.total_distance_m > 0.0 {
        path.congestion = CongestionStatus::from_level(weighted_congestion / path.total_distance_m);
    }
    path.geometry = LineString::new(coords);
    path
}
