//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::manifest::{DEFAULT_MANIFEST_FILE, DEFAULT_SCRIPT_KEY};
use crate::port::{DEFAULT_SCAN_WIDTH, DEFAULT_START_PORT};

/// Port allocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortsConfig {
    /// Address probes bind to.
    pub host: String,
    /// First port to try.
    pub start: u16,
    /// Number of consecutive ports scanned.
    pub scan_width: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            start: DEFAULT_START_PORT,
            scan_width: DEFAULT_SCAN_WIDTH,
        }
    }
}

/// Readiness detection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Absolute start timeout.
    pub timeout_ms: u64,
    /// Delay before HTTP probing begins.
    pub probe_delay_ms: u64,
    /// Number of HTTP probe attempts.
    pub probe_retries: u32,
    /// Pause between HTTP probe attempts.
    pub probe_interval_ms: u64,
    /// Per-request HTTP timeout.
    pub probe_request_timeout_ms: u64,
    /// Additional output patterns (regex) that signal readiness.
    pub extra_patterns: Vec<String>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            probe_delay_ms: 20_000,
            probe_retries: 5,
            probe_interval_ms: 2_000,
            probe_request_timeout_ms: 2_000,
            extra_patterns: Vec::new(),
        }
    }
}

impl ReadinessConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    #[must_use]
    pub fn probe_request_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_request_timeout_ms)
    }
}

/// Preview process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    /// Program launched in the project directory.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Grace period between SIGTERM and SIGKILL.
    pub terminate_grace_ms: u64,
    /// Number of output lines retained per instance.
    pub log_capacity: usize,
    /// Manifest file patched before each spawn.
    pub manifest_file: String,
    /// Manifest script holding the launch command.
    pub script_key: String,
    /// Host used when building the preview URL.
    pub url_host: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: "npm".to_string(),
            args: vec!["run".to_string(), DEFAULT_SCRIPT_KEY.to_string()],
            terminate_grace_ms: 5_000,
            log_capacity: 1_000,
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            script_key: DEFAULT_SCRIPT_KEY.to_string(),
            url_host: "localhost".to_string(),
        }
    }
}

impl ProcessConfig {
    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

/// Workspace location and reclamation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory used when no workspace is registered for a project.
    pub shared_dir: PathBuf,
    /// Minimum age of a stopped workspace before deletion.
    pub grace_secs: u64,
    /// Interval between reclamation sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            shared_dir: PathBuf::from("sample-project"),
            grace_secs: 30 * 60,
            sweep_interval_secs: 10 * 60,
        }
    }
}

impl WorkspaceConfig {
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Status broadcasting settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Interval between heartbeat pings.
    pub heartbeat_secs: u64,
    /// Queue depth per subscriber.
    pub subscriber_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            subscriber_capacity: 256,
        }
    }
}

impl BroadcastConfig {
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            cors_permissive: true,
        }
    }
}

impl ServerConfig {
    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    pub ports: PortsConfig,
    pub readiness: ReadinessConfig,
    pub process: ProcessConfig,
    pub workspace: WorkspaceConfig,
    pub broadcast: BroadcastConfig,
    pub server: ServerConfig,
}
