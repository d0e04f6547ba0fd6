mod fixtures;

use std::sync::Arc;

use fixtures::*;
use trafficflow_core::prelude::*;
use trafficflow_core::OptimizerConfig;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn two_hop_path_beats_expensive_direct_edge() {
    let result = optimizer(triangle())
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();

    assert_eq!(result.status, RouteStatus::Found);
    assert_eq!(result.path(), ids(&["ab", "bc"]).as_slice());
    assert_close(result.total_cost(), 15.0);
    assert_close(result.route.total_distance_m, 150.0);
    assert_eq!(result.route.basis, CostBasis::Current);
    assert_eq!(result.forecast_generation, None);
}

#[test]
fn single_edge_route() {
    let store = GraphStore::load(
        vec![node("A", 0.0), node("B", 0.001)],
        vec![timed("ab", "A", "B", 10.0)],
    )
    .unwrap();
    let result = optimizer(store)
        .optimize(&RouteQuery::between_nodes("A", "B"))
        .unwrap();

    assert_eq!(result.path(), ids(&["ab"]).as_slice());
    assert_close(result.total_cost(), 10.0);
    assert!(result.alternatives.is_empty());
}

#[test]
fn disconnected_destination_is_unreachable() {
    let optimizer = optimizer(triangle());
    let result = optimizer
        .optimize(&RouteQuery::between_nodes("A", "D"))
        .unwrap();

    assert_eq!(result.status, RouteStatus::Unreachable);
    assert!(!result.is_reachable());
    assert!(result.path().is_empty());
    assert!(result.alternatives.is_empty());
}

#[test]
fn origin_equal_to_destination_is_an_empty_route() {
    let result = optimizer(triangle())
        .optimize(&RouteQuery::between_nodes("B", "B"))
        .unwrap();
    assert_eq!(result.status, RouteStatus::Found);
    assert!(result.path().is_empty());
    assert_eq!(result.total_cost(), 0.0);
}

#[test]
fn unknown_node_is_not_found() {
    let result = optimizer(triangle()).optimize(&RouteQuery::between_nodes("A", "nowhere"));
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn coordinates_resolve_to_nearest_intersection() {
    let query = RouteQuery {
        origin: Endpoint::Coordinate {
            lon: 0.00001,
            lat: 0.00002,
        },
        destination: Endpoint::Coordinate {
            lon: 0.00199,
            lat: -0.00001,
        },
        ..RouteQuery::between_nodes("A", "C")
    };
    let result = optimizer(triangle()).optimize(&query).unwrap();
    assert_eq!(result.path(), ids(&["ab", "bc"]).as_slice());

    let bad = RouteQuery {
        origin: Endpoint::Coordinate {
            lon: f64::NAN,
            lat: 0.0,
        },
        ..RouteQuery::between_nodes("A", "C")
    };
    assert!(matches!(
        optimizer(triangle()).optimize(&bad),
        Err(Error::InvalidQuery(_))
    ));
}

#[test]
fn live_congestion_changes_the_route() {
    let store = triangle();
    // B -> C crawls at 3.6 km/h: 50 m now takes 50 s
    store.apply_sample(&sample("bc", 3.6, 0.9, 1)).unwrap();
    let optimizer = optimizer_with(
        Arc::new(store),
        Arc::new(FixedForecaster::new(base_time(), [])),
        OptimizerConfig {
            min_speed_kmh: 1.0,
            ..OptimizerConfig::default()
        },
    );

    let result = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();
    assert_eq!(result.path(), ids(&["ac"]).as_slice());
    assert_close(result.total_cost(), 20.0);
}

#[test]
fn equal_cost_prefers_fewer_segments() {
    let store = GraphStore::load(
        vec![node("A", 0.0), node("B", 0.001), node("C", 0.002)],
        vec![
            timed("ab", "A", "B", 5.0),
            timed("bc", "B", "C", 5.0),
            timed("zz", "A", "C", 10.0),
        ],
    )
    .unwrap();
    let result = optimizer(store)
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();
    assert_eq!(result.path(), ids(&["zz"]).as_slice());
}

#[test]
fn equal_cost_and_length_prefers_smaller_segment_ids() {
    // B is settled before C, so the first path found to D is the larger one
    let store = GraphStore::load(
        vec![
            node("A", 0.0),
            node("B", 0.001),
            node("C", 0.002),
            node("D", 0.003),
        ],
        vec![
            timed("s2", "A", "B", 10.0),
            timed("s3", "B", "D", 10.0),
            timed("s1", "A", "C", 10.0),
            timed("s4", "C", "D", 10.0),
        ],
    )
    .unwrap();
    let result = optimizer(store)
        .optimize(&RouteQuery::between_nodes("A", "D").with_alternatives(1))
        .unwrap();
    assert_eq!(result.path(), ids(&["s1", "s4"]).as_slice());
}

#[test]
fn parallel_segments_tie_on_id() {
    let store = GraphStore::load(
        vec![node("A", 0.0), node("B", 0.001)],
        vec![timed("z", "A", "B", 10.0), timed("m", "A", "B", 10.0)],
    )
    .unwrap();
    let result = optimizer(store)
        .optimize(&RouteQuery::between_nodes("A", "B"))
        .unwrap();
    assert_eq!(result.path(), ids(&["m"]).as_slice());
    assert_eq!(result.alternatives.len(), 1);
    assert_eq!(result.alternatives[0].segments, ids(&["z"]));
}

#[test]
fn toll_segments_are_avoided_on_request() {
    let store = GraphStore::load(
        vec![node("A", 0.0), node("B", 0.001), node("C", 0.002)],
        vec![
            timed("ab", "A", "B", 10.0),
            timed("bc", "B", "C", 5.0),
            timed("ac", "A", "C", 12.0).with_toll(),
        ],
    )
    .unwrap();
    let optimizer = optimizer(store);

    let fastest = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();
    assert_eq!(fastest.path(), ids(&["ac"]).as_slice());

    let toll_free = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C").avoiding_tolls())
        .unwrap();
    assert_eq!(toll_free.path(), ids(&["ab", "bc"]).as_slice());
    for path in std::iter::once(&toll_free.route).chain(&toll_free.alternatives) {
        assert!(!path.segments.contains(&SegmentId::from("ac")));
    }
}

#[test]
fn toll_only_connection_is_unreachable_when_avoided() {
    let store = GraphStore::load(
        vec![node("A", 0.0), node("B", 0.001)],
        vec![timed("ab", "A", "B", 10.0).with_toll()],
    )
    .unwrap();
    let result = optimizer(store)
        .optimize(&RouteQuery::between_nodes("A", "B").avoiding_tolls())
        .unwrap();
    assert_eq!(result.status, RouteStatus::Unreachable);
}

#[test]
fn distance_preference_ignores_speed() {
    let store = GraphStore::load(
        vec![node("A", 0.0), node("B", 0.001), node("C", 0.002)],
        vec![
            timed("ab", "A", "B", 10.0),
            timed("bc", "B", "C", 5.0),
            // 120 m at 6 km/h: shortest but slowest
            SegmentDefinition::new("ac", "A", "C", 120.0, 6.0),
        ],
    )
    .unwrap();
    let optimizer = optimizer(store);

    let by_time = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();
    assert_eq!(by_time.path(), ids(&["ab", "bc"]).as_slice());

    let by_distance = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C").with_preference(Preference::MinimizeDistance))
        .unwrap();
    assert_eq!(by_distance.path(), ids(&["ac"]).as_slice());
    assert_close(by_distance.total_cost(), 120.0);
}

/// A -> B -> D (20 s), A -> C -> D (22 s), A -> E -> D (60 s)
fn three_corridors() -> GraphStore {
    GraphStore::load(
        vec![
            node("A", 0.0),
            node("B", 0.001),
            node("C", 0.002),
            node("D", 0.003),
            node("E", 0.004),
        ],
        vec![
            timed("ab", "A", "B", 10.0),
            timed("bd", "B", "D", 10.0),
            timed("ac", "A", "C", 11.0),
            timed("cd", "C", "D", 11.0),
            timed("ae", "A", "E", 30.0),
            timed("ed", "E", "D", 30.0),
        ],
    )
    .unwrap()
}

#[test]
fn alternatives_are_distinct_and_within_ratio() {
    let optimizer = optimizer(three_corridors());
    let result = optimizer
        .optimize(&RouteQuery::between_nodes("A", "D"))
        .unwrap();

    assert_eq!(result.path(), ids(&["ab", "bd"]).as_slice());
    assert!(result.alternatives.len() <= optimizer.config().max_alternatives - 1);
    assert!(
        result
            .alternatives
            .iter()
            .any(|alt| alt.segments == ids(&["ac", "cd"]))
    );

    let limit = result.total_cost() * optimizer.config().alternative_cost_ratio;
    let mut seen = vec![result.route.segments.clone()];
    for alt in &result.alternatives {
        assert!(alt.cost <= limit + 1e-9, "alternative {:?} too costly", alt.segments);
        assert!(alt.cost >= result.total_cost());
        assert!(!seen.contains(&alt.segments));
        seen.push(alt.segments.clone());
    }
    // The 60 s corridor is beyond 1.4 x 20 s
    assert!(seen.iter().all(|path| *path != ids(&["ae", "ed"])));
}

#[test]
fn wider_ratio_admits_costlier_alternatives() {
    let optimizer = optimizer_with(
        Arc::new(three_corridors()),
        Arc::new(FixedForecaster::new(base_time(), [])),
        OptimizerConfig {
            alternative_cost_ratio: 4.0,
            alternative_penalty: 4.0,
            ..OptimizerConfig::default()
        },
    );
    let result = optimizer
        .optimize(&RouteQuery::between_nodes("A", "D"))
        .unwrap();

    let alternatives: Vec<_> = result.alternatives.iter().map(|a| a.segments.clone()).collect();
    assert_eq!(alternatives, vec![ids(&["ac", "cd"]), ids(&["ae", "ed"])]);
}

#[test]
fn requested_alternatives_are_capped_by_config() {
    let corridors = optimizer(three_corridors());
    let result = corridors
        .optimize(&RouteQuery::between_nodes("A", "D").with_alternatives(usize::MAX))
        .unwrap();

    assert_eq!(result.status, RouteStatus::Found);
    assert_eq!(result.path(), ids(&["ab", "bd"]).as_slice());
    assert!(result.alternatives.len() <= corridors.config().max_alternatives - 1);

    let result = optimizer(triangle())
        .optimize(&RouteQuery::between_nodes("A", "C").with_alternatives(usize::MAX))
        .unwrap();
    assert_eq!(result.path(), ids(&["ab", "bc"]).as_slice());
    assert!(result.alternatives.len() <= OptimizerConfig::default().max_alternatives - 1);
}

#[test]
fn zero_budget_times_out() {
    let metrics = Arc::new(Metrics::default());
    let optimizer = RouteOptimizer::new(
        Arc::new(triangle()),
        Arc::new(FixedForecaster::new(base_time(), [])),
        OptimizerConfig {
            search_budget_ms: 0,
            ..OptimizerConfig::default()
        },
        Arc::clone(&metrics),
    );
    let result = optimizer.optimize(&RouteQuery::between_nodes("A", "C"));

    assert!(matches!(result, Err(Error::OptimizationTimeout(_))));
    assert_eq!(metrics.snapshot().route_timeouts, 1);
    assert_eq!(metrics.snapshot().route_queries, 1);
}

/// A -> B 10 min, B -> C 5 min, A -> C 20 min at the speed limit
fn long_triangle() -> GraphStore {
    GraphStore::load(
        vec![node("A", 0.0), node("B", 0.05), node("C", 0.1)],
        vec![
            timed("ab", "A", "B", 600.0),
            timed("bc", "B", "C", 300.0),
            timed("ac", "A", "C", 1200.0),
        ],
    )
    .unwrap()
}

#[test]
fn forecast_slowdown_ahead_reroutes() {
    // B -> C is predicted to drop to 12 km/h: 3000 m then take 15 min
    let forecaster = Arc::new(FixedForecaster::new(
        base_time(),
        [(SegmentId::from("bc"), (12.0, 0.8))],
    ));
    let optimizer = optimizer_with(
        Arc::new(long_triangle()),
        forecaster,
        OptimizerConfig::default(),
    );

    let now = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();
    assert_eq!(now.path(), ids(&["ab", "bc"]).as_slice());
    assert_eq!(now.forecast_generation, None);
    assert_eq!(now.forecast_age_secs, None);

    let ahead = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C").with_horizon(60))
        .unwrap();
    assert_eq!(ahead.path(), ids(&["ac"]).as_slice());
    assert_eq!(ahead.horizon_minutes, 60);

    let via_b = ahead
        .alternatives
        .iter()
        .find(|alt| alt.segments == ids(&["ab", "bc"]))
        .expect("slowed corridor is still a valid alternative");
    assert_eq!(via_b.basis, CostBasis::Predicted);
    assert_eq!(via_b.conditions[0].basis, CostBasis::Current);
    assert_eq!(via_b.conditions[1].basis, CostBasis::Predicted);
    assert_close(via_b.conditions[1].enter_after_secs, 600.0);
    assert_close(via_b.conditions[1].travel_time_secs, 900.0);
    assert_eq!(ahead.forecast_generation, Some(1));
    // Trained on observations up to 08:00 on the base day
    let age = ahead.forecast_age_secs.unwrap();
    assert_eq!(age, (ahead.computed_at - base_time()).num_seconds());
    assert!(age > 0);
}

#[test]
fn first_segment_uses_current_reading() {
    let forecaster = Arc::new(FixedForecaster::new(
        base_time(),
        [(SegmentId::from("ab"), (5.0, 1.0))],
    ));
    let optimizer = optimizer_with(
        Arc::new(long_triangle()),
        forecaster,
        OptimizerConfig::default(),
    );
    let result = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C").with_horizon(60))
        .unwrap();

    assert_eq!(result.path(), ids(&["ab", "bc"]).as_slice());
    assert_eq!(result.route.basis, CostBasis::Current);
}

#[test]
fn route_exports_as_geojson() {
    let result = optimizer(triangle())
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();
    let collection = result.to_geojson().unwrap();

    assert_eq!(collection.features.len(), 1 + result.alternatives.len());
    let best = &collection.features[0];
    assert_eq!(
        best.property("rank").and_then(|v| v.as_u64()),
        Some(0)
    );
    let json = serde_json::to_value(best).unwrap();
    assert_eq!(json["geometry"]["type"], "LineString");
    assert_eq!(json["geometry"]["coordinates"].as_array().unwrap().len(), 3);
}

#[test]
fn route_ids_are_unique() {
    let optimizer = optimizer(triangle());
    let first = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();
    let second = optimizer
        .optimize(&RouteQuery::between_nodes("A", "C"))
        .unwrap();
    assert_ne!(first.route_id, second.route_id);
}
