//! Short-lived helper containers.
//!
//! A helper container exists only to expose one volume's filesystem to the
//! engine's archive endpoints. It is never started: creation binds the
//! volume, the archive endpoints move the bytes, and removal is
//! unconditional whatever happened in between. Each helper is owned by
//! exactly one operation; there is no pooling or reuse across volumes.

use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, RemoveContainerOptions,
    UploadToContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::HostConfig;
use bollard::Docker;
use bytes::Bytes;
use futures_util::Stream;
use tracing::{debug, warn};

/// Mirror of bollard's `BodyType` alias, which is `pub(crate)` there even
/// though `Docker::upload_to_container` takes it as a parameter.
pub type BodyType = http_body_util::Either<
    http_body_util::Full<Bytes>,
    http_body_util::StreamBody<
        std::pin::Pin<
            Box<
                dyn Stream<Item = std::result::Result<http_body::Frame<Bytes>, std::io::Error>>
                    + Send,
            >,
        >,
    >,
>;

use super::{Engine, VOLUME_MOUNT};
use crate::utils::errors::Result;

/// Scoped handle for a helper container. Callers must finish with
/// [`HelperContainer::remove`]; it takes `self` by value and never fails
/// from the caller's point of view, so cleanup can run on success, failure,
/// and cancellation paths alike.
pub struct HelperContainer {
    docker: Docker,
    id: String,
}

impl HelperContainer {
    /// Create a helper with `volume` bound at [`VOLUME_MOUNT`].
    pub async fn create(
        engine: &Engine,
        image: &str,
        volume: &str,
        read_only: bool,
    ) -> Result<Self> {
        engine.ensure_image(image).await?;

        let mode = if read_only { "ro" } else { "rw" };
        let config = Config {
            image: Some(image.to_string()),
            // Never started, but an explicit no-op command keeps the helper
            // inert even if something starts it by accident.
            cmd: Some(vec!["true".to_string()]),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{volume}:{VOLUME_MOUNT}:{mode}")]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = engine
            .docker()
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;
        debug!("Created helper container {} for volume {}", created.id, volume);

        Ok(Self {
            docker: engine.docker().clone(),
            id: created.id,
        })
    }

    /// Tar stream of the mounted volume's contents. The trailing `/.` makes
    /// the engine emit entry paths relative to the volume root, so restore
    /// replays them unchanged.
    pub fn export_volume(
        &self,
    ) -> impl Stream<Item = std::result::Result<Bytes, BollardError>> + '_ {
        self.docker.download_from_container(
            &self.id,
            Some(DownloadFromContainerOptions {
                path: format!("{VOLUME_MOUNT}/."),
            }),
        )
    }

    /// Feed a tar stream into the engine's extraction endpoint for the
    /// mounted volume.
    pub async fn import_archive(&self, tar: BodyType) -> Result<()> {
        self.docker
            .upload_to_container(
                &self.id,
                Some(UploadToContainerOptions {
                    path: VOLUME_MOUNT.to_string(),
                    ..Default::default()
                }),
                tar,
            )
            .await?;
        Ok(())
    }

    /// Remove the helper container. Errors are logged rather than returned;
    /// a leaked helper is worth a warning, not a failed volume.
    pub async fn remove(self) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(&self.id, Some(options)).await {
            warn!("Failed to remove helper container {}: {}", self.id, e);
        }
    }
}
