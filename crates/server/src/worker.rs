use std::path::Path;
use std::time::{Duration, SystemTime};

use convert_common::config::StorageConfig;

/// Periodically delete per-request directories older than
/// `storage.retention_secs`.  Returns immediately when retention is unset.
pub async fn start_retention_sweeper(storage: StorageConfig) {
    let Some(retention) = storage.retention_secs else {
        tracing::info!("retention sweeper disabled; uploads and outputs are kept");
        return;
    };
    let max_age = Duration::from_secs(retention);
    let every = Duration::from_secs(storage.sweep_interval_secs.max(1));

    tracing::info!(
        "Starting retention sweeper: max age {retention}s, every {}s",
        every.as_secs()
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        for root in [&storage.upload_dir, &storage.output_dir] {
            match sweep_dir(root, max_age).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("swept {n} expired request dirs from {}", root.display()),
                Err(e) => tracing::error!("sweeping {}: {e}", root.display()),
            }
        }
    }
}

/// Remove the direct subdirectories of `root` last modified more than
/// `max_age` ago.  Loose files are left alone.
pub async fn sweep_dir(root: &Path, max_age: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(m) if m.is_dir() => m,
            _ => continue,
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("removing {}: {e}", path.display()),
        }
    }
    Ok(removed)
}
