//! Volume restore: archive reader and orchestrator.
//!
//! Every `*.tar.gz` file in the source directory is streamed back into a
//! named volume through a helper container. Restoring into an existing
//! volume is allowed; restore is meant to be repeatable, unlike secret
//! creation.

use std::path::{Path, PathBuf};

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::BufReader;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::helper::HelperContainer;
use crate::engine::Engine;
use crate::utils::errors::{DkrError, Result};
use crate::volume::{volume_name_from_archive, Outcome, Summary};

/// Options for one restore run.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Directory containing the archive files.
    pub directory: PathBuf,

    /// Image for the helper containers.
    pub helper_image: String,
}

/// Restore every archive in `options.directory` into named volumes.
///
/// Non-archive files are ignored silently. A corrupt archive is recorded as
/// a failure and the run continues; a partially extracted volume is left in
/// whatever state extraction reached and reported, never rolled back.
pub async fn restore(
    engine: &Engine,
    options: &RestoreOptions,
    cancel: &CancellationToken,
) -> Result<Summary> {
    if !options.directory.is_dir() {
        return Err(DkrError::Config(format!(
            "Backup directory '{}' does not exist",
            options.directory.display()
        )));
    }

    let archives = list_archives(&options.directory)?;
    if archives.is_empty() {
        return Err(DkrError::Config(format!(
            "No backup files found in directory '{}'",
            options.directory.display()
        )));
    }

    info!(
        "Restoring {} volumes from {}",
        archives.len(),
        options.directory.display()
    );

    let mut summary = Summary::default();
    for (path, volume) in archives {
        if cancel.is_cancelled() {
            summary.record(volume, Outcome::Failed("cancelled".to_string()));
            continue;
        }
        let outcome =
            match restore_archive(engine, &path, &volume, &options.helper_image, cancel).await {
                Ok(()) => {
                    println!("Restored: {volume}");
                    Outcome::Succeeded
                }
                Err(e) => {
                    eprintln!("Error:    {volume} - {e}");
                    Outcome::Failed(e.to_string())
                }
            };
        summary.record(volume, outcome);
    }

    Ok(summary)
}

/// Archive files in `directory` with their target volume names, sorted by
/// file name for a stable processing order.
fn list_archives(directory: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut archives = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some(volume) = volume_name_from_archive(&file_name) {
            archives.push((entry.path(), volume));
        }
    }
    archives.sort();
    Ok(archives)
}

/// Restore one archive into `volume`, creating the volume when absent.
/// The helper container is removed on every path.
pub async fn restore_archive(
    engine: &Engine,
    archive: &Path,
    volume: &str,
    helper_image: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    engine.ensure_volume(volume).await?;

    let helper = HelperContainer::create(engine, helper_image, volume, false).await?;
    let result = upload_archive(&helper, archive, cancel).await;
    helper.remove().await;
    result
}

async fn upload_archive(
    helper: &HelperContainer,
    archive: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let file = tokio::fs::File::open(archive).await?;
    let decoder = GzipDecoder::new(BufReader::new(file));
    let stream = ReaderStream::new(decoder);
    let body = bollard::body_try_stream(stream);

    tokio::select! {
        result = helper.import_archive(body) => result,
        _ = cancel.cancelled() => Err(DkrError::Stream("cancelled".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_list_archives_ignores_other_files() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("pg_data_2026-08-24.tar.gz"), b"x")?;
        fs::write(temp_dir.path().join("grafana.tar.gz"), b"x")?;
        fs::write(temp_dir.path().join("notes.txt"), b"x")?;
        fs::write(temp_dir.path().join("volume.tar"), b"x")?;
        fs::create_dir(temp_dir.path().join("sub.tar.gz"))?;

        let archives = list_archives(temp_dir.path()).unwrap();
        let volumes: Vec<&str> = archives.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(volumes, ["grafana", "pg_data"]);

        Ok(())
    }

    #[test]
    fn test_list_archives_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let archives = list_archives(temp_dir.path()).unwrap();
        assert!(archives.is_empty());
        Ok(())
    }
}
