//! Write-once secrets stored in dedicated volumes.
//!
//! `secret create NAME` stores the payload as a single file named after the
//! volume. Creation refuses to touch an existing volume; there is no
//! overwrite path. The existence check and the create are two engine calls,
//! so two concurrent invocations can race: the engine offers no
//! create-if-absent primitive, and the window is accepted rather than masked
//! with process-local locking that would not span processes anyway.

use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::info;

use crate::engine::helper::HelperContainer;
use crate::engine::Engine;
use crate::utils::errors::{DkrError, Result};

/// Where the secret payload comes from.
pub enum SecretSource<'a> {
    File(&'a Path),
    Stdin,
}

/// Create the volume `name` holding one file `name` with `source`'s bytes.
///
/// Fails with a collision error, writing nothing, when a volume with that
/// name already exists.
pub async fn create_secret(
    engine: &Engine,
    name: &str,
    source: SecretSource<'_>,
    helper_image: &str,
) -> Result<()> {
    if engine.volume_exists(name).await? {
        return Err(DkrError::Collision(format!(
            "Volume '{name}' already exists"
        )));
    }

    let content = read_source(source).await?;
    let archive = build_secret_archive(name, &content)?;

    engine.create_volume(name).await?;

    let helper = HelperContainer::create(engine, helper_image, name, false).await?;
    let result = helper
        .import_archive(bollard::body_full(archive.into()))
        .await;
    helper.remove().await;
    result?;

    info!("Stored secret '{}' ({} bytes)", name, content.len());
    Ok(())
}

async fn read_source(source: SecretSource<'_>) -> Result<Vec<u8>> {
    match source {
        SecretSource::File(path) => Ok(tokio::fs::read(path).await?),
        SecretSource::Stdin => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            Ok(buf)
        }
    }
}

/// Single-entry tar with the payload as `name`, mode 0600.
fn build_secret_archive(name: &str, content: &[u8]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o600);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    builder.append_data(&mut header, name, content)?;
    Ok(builder.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_secret_archive_layout() {
        let archive = build_secret_archive("api_token", b"hunter2").unwrap();
        let mut reader = tar::Archive::new(archive.as_slice());

        let mut entries = reader.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some("api_token"));
        assert_eq!(entry.header().mode().unwrap(), 0o600);

        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"hunter2");

        assert!(entries.next().is_none());
    }

    #[test]
    fn test_secret_archive_empty_content() {
        let archive = build_secret_archive("empty", b"").unwrap();
        let mut reader = tar::Archive::new(archive.as_slice());
        let mut entries = reader.entries().unwrap();
        let entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.header().size().unwrap(), 0);
    }
}
