//! Tunables for the core components

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub optimizer: OptimizerConfig,
    pub prediction: PredictionConfig,
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Total number of routes returned, optimum included
    pub max_alternatives: usize,
    /// Alternatives costing more than `optimum * ratio` are rejected
    pub alternative_cost_ratio: f64,
    /// Cost multiplier applied to edges already used by a found route
    pub alternative_penalty: f64,
    pub search_budget_ms: u64,
    /// Floor for the speed used in time costs, km/h
    pub min_speed_kmh: f64,
    /// Extra time weight per unit of congestion
    pub congestion_penalty: f64,
    pub max_horizon_minutes: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_alternatives: 3,
            alternative_cost_ratio: 1.4,
            alternative_penalty: 2.0,
            search_budget_ms: 2000,
            min_speed_kmh: 5.0,
            congestion_penalty: 0.0,
            max_horizon_minutes: 240,
        }
    }
}

impl OptimizerConfig {
    pub fn search_budget(&self) -> Duration {
        Duration::from_millis(self.search_budget_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Samples kept per segment
    pub history_len: usize,
    /// Only samples this recent (relative to the newest one) are used in training
    pub history_window_minutes: u32,
    pub min_samples: usize,
    /// Time constant of the decay toward the segment mean
    pub reversion_minutes: f64,
    pub max_horizon_minutes: u32,
    pub step_minutes: u32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            history_len: 120,
            history_window_minutes: 120,
            min_samples: 3,
            reversion_minutes: 60.0,
            max_horizon_minutes: 240,
            step_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Per-subscriber outbound buffer size
    pub buffer_capacity: usize,
    /// Route registrations kept; the oldest unfollowed one is evicted first
    pub max_routes: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 64,
            max_routes: 1024,
        }
    }
}
