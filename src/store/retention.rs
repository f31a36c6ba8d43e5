//! Time-to-live eviction for both stores.
//!
//! Neither store grows without bound: a background task periodically removes
//! anything whose modification time is older than the configured TTL. In the
//! staging store that reclaims directories orphaned by a crash; in the output
//! store it expires results nobody downloaded.

use crate::config::RetentionPolicy;
use crate::error::{DocsmithError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one sweep over one directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub removed: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for SweepStats {
    fn add_assign(&mut self, other: Self) {
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// Remove direct children of `dir` last modified more than `ttl` ago.
/// A missing directory is treated as empty.
pub async fn sweep(dir: &Path, ttl: Duration) -> Result<SweepStats> {
    let mut stats = SweepStats::default();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => return Err(DocsmithError::io(dir, e)),
    };
    let now = SystemTime::now();

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DocsmithError::io(dir, e))?
    {
        let path = entry.path();
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age <= ttl {
            continue;
        }

        let removal = if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match removal {
            Ok(()) => {
                debug!(
                    "Evicted {} (age {})",
                    path.display(),
                    humantime::format_duration(Duration::from_secs(age.as_secs()))
                );
                stats.removed += 1;
            }
            Err(e) => {
                warn!("Could not evict {}: {}", path.display(), e);
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

/// Run [`sweep`] over every directory on the policy's interval until
/// `shutdown` fires. Returns `None` when retention is disabled.
pub fn spawn_sweeper(
    dirs: Vec<PathBuf>,
    policy: RetentionPolicy,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if policy.is_disabled() {
        info!("Retention disabled; stored files are kept indefinitely");
        return None;
    }
    info!(
        "Starting retention sweeper: ttl {}, every {}",
        humantime::format_duration(policy.ttl),
        humantime::format_duration(policy.sweep_interval)
    );

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(policy.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Retention sweeper shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let mut total = SweepStats::default();
                    for dir in &dirs {
                        match sweep(dir, policy.ttl).await {
                            Ok(stats) => total += stats,
                            Err(e) => warn!("Retention sweep failed: {}", e),
                        }
                    }
                    if total.removed > 0 || total.failed > 0 {
                        info!(removed = total.removed, failed = total.failed, "Retention sweep finished");
                    }
                }
            }
        }
    }))
}
