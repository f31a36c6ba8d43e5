//! Service configuration.
//!
//! All runtime behaviour is controlled through [`ServiceConfig`], built via
//! [`ServiceConfigBuilder`]. The CLI maps its flags onto the builder; tests
//! build configs pointing at temporary directories.

use crate::error::DocsmithError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-file upload limit: 50 MiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use docsmith::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .output_dir("/tmp/docsmith/output")
///     .max_files(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_files, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to. Default: `0.0.0.0:3000`.
    pub bind: SocketAddr,

    /// Root of the staging store. Each request gets its own subdirectory.
    pub staging_dir: PathBuf,

    /// Flat directory holding produced files awaiting download.
    pub output_dir: PathBuf,

    /// Per-file upload limit in bytes. Default: 50 MiB.
    pub max_file_bytes: u64,

    /// Maximum number of file parts in one request. Default: 20.
    pub max_files: usize,

    /// Upper bound on a single operation's processing time. Default: 120 s.
    pub processing_timeout_secs: u64,

    /// Eviction policy for both stores.
    pub retention: RetentionPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            staging_dir: PathBuf::from("data/uploads"),
            output_dir: PathBuf::from("data/output"),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files: 20,
            processing_timeout_secs: 120,
            retention: RetentionPolicy::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.bind = addr;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_bytes = bytes.max(1024);
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n.max(1);
        self
    }

    pub fn processing_timeout_secs(mut self, secs: u64) -> Self {
        self.config.processing_timeout_secs = secs.max(1);
        self
    }

    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.config.retention = policy;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, DocsmithError> {
        let c = &self.config;
        if c.staging_dir == c.output_dir {
            return Err(DocsmithError::Internal(format!(
                "staging and output stores must differ (both '{}')",
                c.staging_dir.display()
            )));
        }
        if !c.retention.is_disabled() && c.retention.sweep_interval.is_zero() {
            return Err(DocsmithError::Internal(
                "retention sweep interval must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Time-to-live eviction for staged and produced files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Files older than this are removed. Zero disables eviction.
    pub ttl: Duration,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl RetentionPolicy {
    /// Keep everything forever.
    pub fn disabled() -> Self {
        Self {
            ttl: Duration::ZERO,
            sweep_interval: Duration::ZERO,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.ttl.is_zero()
    }
}
