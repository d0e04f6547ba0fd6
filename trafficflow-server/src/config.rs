use std::error::Error;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use trafficflow_core::CoreConfig;

/// Process configuration, read from a TOML file.
///
/// Core sections (`[optimizer]`, `[prediction]`, `[broadcast]`) sit at the
/// top level next to the server's own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: HttpConfig,
    pub network: NetworkConfig,
    pub ingest: IngestConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
    #[serde(flatten)]
    pub core: CoreConfig,
}

impl ServerConfig {
    /// Reads the file at `path`, or returns the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, Box<dyn Error>> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
    pub request_timeout_secs: u64,
    pub concurrency_limit: usize,
    /// Outbound queue per WebSocket client, in notifications
    pub websocket_queue: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            request_timeout_secs: 30,
            concurrency_limit: 256,
            websocket_queue: 32,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub path: PathBuf,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("network.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Newline-delimited event file, or `-` for stdin
    pub source: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source: "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub retrain_interval_secs: u64,
    pub flush_interval_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            retrain_interval_secs: 300,
            flush_interval_ms: 250,
        }
    }
}

impl ScheduleConfig {
    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.retrain_interval_secs.max(1))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.ingest.source, "-");
        assert_eq!(config.core.optimizer.max_alternatives, 3);
        assert_eq!(config.core.broadcast.buffer_capacity, 64);
    }

    #[test]
    fn sections_override_defaults() {
        let config = ServerConfig::parse(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [network]
            path = "city.json"

            [schedule]
            retrain_interval_secs = 60

            [optimizer]
            max_alternatives = 5
            search_budget_ms = 500

            [prediction]
            min_samples = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.server.concurrency_limit, 256);
        assert_eq!(config.network.path, PathBuf::from("city.json"));
        assert_eq!(config.schedule.retrain_interval(), Duration::from_secs(60));
        assert_eq!(config.schedule.flush_interval_ms, 250);
        assert_eq!(config.core.optimizer.max_alternatives, 5);
        assert_eq!(config.core.optimizer.search_budget_ms, 500);
        assert_eq!(config.core.prediction.min_samples, 10);
        assert_eq!(config.core.prediction.history_len, 120);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(ServerConfig::parse("[server]\nbind = 12").is_err());
    }
}
