//! Configuration for the AVO command-line tool.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Frame geometry and cadence.
    pub video: VideoConfig,
    /// Pipeline tuning.
    pub pipeline: PipelineConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the server binds, `IP:PORT`.
    pub bind_addr: String,
    /// Host the client connects to (numeric IP or DNS name).
    pub server_host: String,
    /// Port the client connects to.
    pub server_port: u16,
}

/// Frame geometry and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
}

/// Pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Encoder pool size; 1 preserves capture order on the wire.
    pub encoder_workers: usize,
    /// Decoder pool size; 1 preserves arrival order at the consumer.
    pub decoder_workers: usize,
    /// Ingest frames older than this many milliseconds are dropped.
    pub stale_ingest_ms: u64,
    /// Partial frames idle longer than this many seconds are evicted.
    pub reassembly_timeout_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7777".into(),
            server_host: "127.0.0.1".into(),
            server_port: 7777,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            encoder_workers: 2,
            decoder_workers: 4,
            stale_ingest_ms: 500,
            reassembly_timeout_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AvoConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Render the default configuration as TOML (for `--gen-config`).
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Server-side pipeline settings.
    pub fn server_config(&self) -> avo_core::ServerConfig {
        avo_core::ServerConfig {
            encoder_workers: self.pipeline.encoder_workers.max(1),
            stale_after: Duration::from_millis(self.pipeline.stale_ingest_ms),
        }
    }

    /// Client-side pipeline settings.
    pub fn client_config(&self) -> avo_core::ClientConfig {
        avo_core::ClientConfig {
            decoder_workers: self.pipeline.decoder_workers.max(1),
            reassembly_timeout: Duration::from_secs(self.pipeline.reassembly_timeout_secs),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
