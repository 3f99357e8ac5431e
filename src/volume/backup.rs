//! Volume backup: archive writer and orchestrator.
//!
//! Each included volume is streamed through a helper container into a
//! `<name>_<date>.tar.gz` file. One volume's failure never aborts the run;
//! outcomes are collected into a [`Summary`] and the caller decides the exit
//! status from it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_compression::tokio::write::GzipEncoder;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::helper::HelperContainer;
use crate::engine::Engine;
use crate::utils::errors::{DkrError, Result};
use crate::utils::format::format_size;
use crate::volume::filter::VolumeFilter;
use crate::volume::{archive_file_name, Outcome, Summary};

/// Options for one backup run.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Destination directory for the archive files. Must already exist.
    pub directory: PathBuf,

    /// Report skipped volumes as they are encountered.
    pub verbose: bool,

    /// Volumes backed up in parallel. 1 keeps strict engine-listing order;
    /// above 1 the notice ordering is non-deterministic.
    pub jobs: usize,

    /// Image for the helper containers.
    pub helper_image: String,
}

/// Back up every included volume into `options.directory`.
///
/// Volumes are attempted in engine listing order. Filter exclusions count as
/// skips; a vanished volume is skipped with a warning; any other per-volume
/// error is recorded and the run continues.
pub async fn backup(
    engine: &Engine,
    filter: &VolumeFilter,
    options: &BackupOptions,
    cancel: &CancellationToken,
) -> Result<Summary> {
    if !options.directory.is_dir() {
        return Err(DkrError::Config(format!(
            "Backup directory '{}' does not exist",
            options.directory.display()
        )));
    }

    let all_volumes = engine.volume_names().await?;
    let selected: Vec<bool> = all_volumes.iter().map(|n| filter.included(n)).collect();
    if !selected.contains(&true) {
        return Err(DkrError::Config(
            "No volumes match the provided filters".to_string(),
        ));
    }

    info!(
        "Backing up {} of {} volumes to {}",
        selected.iter().filter(|&&s| s).count(),
        all_volumes.len(),
        options.directory.display()
    );

    let mut summary = Summary::default();
    let mut pending = Vec::new();

    for (name, included) in all_volumes.into_iter().zip(selected) {
        if !included {
            if options.verbose {
                println!("Skipped:   {name}");
            }
            summary.record(name, Outcome::Skipped);
            continue;
        }
        pending.push(name);
    }

    let run = {
        let engine = engine.clone();
        let options = options.clone();
        let cancel = cancel.clone();
        move |name: String| {
            let engine = engine.clone();
            let options = options.clone();
            let cancel = cancel.clone();
            async move { back_up_one(&engine, &name, &options, &cancel).await }
        }
    };

    let outcomes = if options.jobs <= 1 {
        drive_sequential(pending, cancel, run).await
    } else {
        drive_parallel(pending, options.jobs, cancel, run).await
    };
    for (name, outcome) in outcomes {
        summary.record(name, outcome);
    }

    Ok(summary)
}

/// Run `run` for each pending volume in order, one at a time. A failure is
/// recorded and the next volume is still attempted; cancellation marks the
/// remaining volumes as failed without running them.
async fn drive_sequential<F, Fut>(
    pending: Vec<String>,
    cancel: &CancellationToken,
    run: F,
) -> Vec<(String, Outcome)>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Outcome>,
{
    let mut outcomes = Vec::with_capacity(pending.len());
    for name in pending {
        if cancel.is_cancelled() {
            outcomes.push((name, Outcome::Failed("cancelled".to_string())));
            continue;
        }
        let outcome = run(name.clone()).await;
        outcomes.push((name, outcome));
    }
    outcomes
}

/// Bounded worker pool. Each volume's outcome is recorded exactly once via
/// its join handle; a failed sibling never cancels the others.
async fn drive_parallel<F, Fut>(
    pending: Vec<String>,
    jobs: usize,
    cancel: &CancellationToken,
    run: F,
) -> Vec<(String, Outcome)>
where
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Outcome> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(jobs));
    let mut handles = Vec::with_capacity(pending.len());

    for name in pending {
        let run = run.clone();
        let cancel = cancel.clone();
        let semaphore = Arc::clone(&semaphore);

        handles.push(tokio::spawn(async move {
            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return (name, Outcome::Failed("worker pool closed".to_string())),
                },
                _ = cancel.cancelled() => {
                    return (name, Outcome::Failed("cancelled".to_string()));
                }
            };
            let outcome = run(name.clone()).await;
            (name, outcome)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(pair) => outcomes.push(pair),
            Err(e) => warn!("Backup task panicked: {}", e),
        }
    }
    outcomes
}

async fn back_up_one(
    engine: &Engine,
    name: &str,
    options: &BackupOptions,
    cancel: &CancellationToken,
) -> Outcome {
    match write_archive(engine, name, &options.directory, &options.helper_image, cancel).await {
        Ok(path) => {
            let size = fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
            println!("Backed up: {name} ({})", format_size(size));
            Outcome::Succeeded
        }
        Err(DkrError::VolumeNotFound(_)) => {
            warn!("Volume {} disappeared before backup, skipping", name);
            Outcome::Skipped
        }
        Err(e) => {
            eprintln!("Error:     {name} - {e}");
            Outcome::Failed(e.to_string())
        }
    }
}

/// Stream one volume into `<directory>/<name>_<date>.tar.gz`.
///
/// A volume that disappeared between listing and archiving fails with
/// [`DkrError::VolumeNotFound`]. A failed stream never leaves a corrupt
/// `.tar.gz` behind: bytes go to a `.partial` temp file that is renamed only
/// on success and deleted otherwise. The helper container is removed on
/// every path.
pub async fn write_archive(
    engine: &Engine,
    volume: &str,
    directory: &Path,
    helper_image: &str,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    if !engine.volume_exists(volume).await? {
        return Err(DkrError::VolumeNotFound(volume.to_string()));
    }

    let file_name = archive_file_name(volume);
    let final_path = directory.join(&file_name);
    let partial_path = directory.join(format!("{file_name}.partial"));

    let helper = HelperContainer::create(engine, helper_image, volume, true).await?;
    let result = stream_to_file(&helper, &partial_path, cancel).await;
    helper.remove().await;

    match result {
        Ok(()) => {
            fs::rename(&partial_path, &final_path).await?;
            Ok(final_path)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&partial_path).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Failed to discard partial archive {}: {}",
                        partial_path.display(),
                        rm
                    );
                }
            }
            Err(e)
        }
    }
}

async fn stream_to_file(
    helper: &HelperContainer,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let file = fs::File::create(path).await?;
    let mut encoder = GzipEncoder::new(BufWriter::new(file));
    let mut stream = std::pin::pin!(helper.export_volume());

    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            _ = cancel.cancelled() => {
                return Err(DkrError::Stream("cancelled".to_string()));
            }
        };
        match chunk {
            Some(Ok(bytes)) => encoder.write_all(&bytes).await?,
            Some(Err(e)) => return Err(DkrError::Stream(e.to_string())),
            None => break,
        }
    }

    encoder.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_backup_options_defaults_to_sequential() {
        let options = BackupOptions {
            directory: PathBuf::from("/backups"),
            verbose: false,
            jobs: 1,
            helper_image: "alpine".to_string(),
        };
        assert_eq!(options.jobs, 1);
        assert!(!options.verbose);
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("vol{i}")).collect()
    }

    #[tokio::test]
    async fn test_sequential_failure_does_not_abort_siblings() {
        let cancel = CancellationToken::new();
        let outcomes = drive_sequential(names(4), &cancel, |name| async move {
            if name == "vol2" {
                Outcome::Failed("stream interrupted".to_string())
            } else {
                Outcome::Succeeded
            }
        })
        .await;

        let mut summary = Summary::default();
        for (name, outcome) in outcomes {
            summary.record(name, outcome);
        }
        assert_eq!(summary.succeeded, ["vol0", "vol1", "vol3"]);
        assert_eq!(
            summary.failed,
            [("vol2".to_string(), "stream interrupted".to_string())]
        );
        assert!(!summary.is_success());
    }

    #[tokio::test]
    async fn test_sequential_preserves_listing_order() {
        let cancel = CancellationToken::new();
        let outcomes =
            drive_sequential(names(3), &cancel, |_| async { Outcome::Succeeded }).await;
        let order: Vec<&str> = outcomes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, ["vol0", "vol1", "vol2"]);
    }

    #[tokio::test]
    async fn test_sequential_cancellation_skips_remaining() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcomes = drive_sequential(names(2), &cancel, |_| async {
            panic!("cancelled run must not start new volumes");
        })
        .await;

        assert_eq!(outcomes.len(), 2);
        for (_, outcome) in outcomes {
            assert_eq!(outcome, Outcome::Failed("cancelled".to_string()));
        }
    }

    #[tokio::test]
    async fn test_parallel_records_each_volume_exactly_once() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let run_calls = Arc::clone(&calls);

        let outcomes = drive_parallel(names(8), 3, &cancel, move |name| {
            let calls = Arc::clone(&run_calls);
            async move {
                calls.fetch_add(1, Ordering::Relaxed);
                if name == "vol5" {
                    Outcome::Failed("disk full".to_string())
                } else {
                    Outcome::Succeeded
                }
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::Relaxed), 8);
        assert_eq!(outcomes.len(), 8);

        let mut summary = Summary::default();
        for (name, outcome) in outcomes {
            summary.record(name, outcome);
        }
        assert_eq!(summary.succeeded.len(), 7);
        assert_eq!(summary.failed, [("vol5".to_string(), "disk full".to_string())]);
    }
}
