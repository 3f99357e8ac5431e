//! Docker Engine API wrapper.
//!
//! Thin layer over bollard exposing only the primitives the tool needs:
//! volume listing/creation, container listing, helper image pulls, and the
//! short-lived helper containers in [`helper`].

pub mod helper;

use bollard::container::ListContainersOptions;
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerSummary, Volume};
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions};
use bollard::Docker;
use futures_util::TryStreamExt;
use tracing::debug;

use crate::utils::errors::{DkrError, Result};

/// Default image for helper containers. The helper is never started, so any
/// locally available image works; alpine is just small to pull.
pub const DEFAULT_HELPER_IMAGE: &str = "alpine";

/// Mount point for the target volume inside helper containers.
pub const VOLUME_MOUNT: &str = "/volume";

/// Handle to the local Docker engine.
#[derive(Clone)]
pub struct Engine {
    docker: Docker,
}

impl Engine {
    /// Connect to the local engine and verify it is reachable. Failure here
    /// aborts the whole run before any volume is touched.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DkrError::EngineUnreachable(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| DkrError::EngineUnreachable(e.to_string()))?;
        Ok(Self { docker })
    }

    pub(crate) fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Names of all named volumes, in engine listing order.
    pub async fn volume_names(&self) -> Result<Vec<String>> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions<String>>)
            .await?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .collect())
    }

    pub async fn volume_exists(&self, name: &str) -> Result<bool> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_volume(&self, name: &str) -> Result<Volume> {
        let volume = self
            .docker
            .create_volume(CreateVolumeOptions {
                name: name.to_string(),
                ..Default::default()
            })
            .await?;
        Ok(volume)
    }

    /// Create the volume if it does not exist yet. Restore depends on this
    /// being a no-op for volumes that already exist.
    pub async fn ensure_volume(&self, name: &str) -> Result<()> {
        if !self.volume_exists(name).await? {
            debug!("Creating volume {}", name);
            self.create_volume(name).await?;
        }
        Ok(())
    }

    /// List containers, running only or all.
    pub async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all,
                ..Default::default()
            }))
            .await?;
        Ok(containers)
    }

    /// Pull `image` if it is not available locally. Container creation does
    /// not pull on its own.
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        // An untagged reference makes /images/create pull every tag of the
        // image, so pin :latest the way `docker run` does.
        let reference = qualify_reference(image);
        debug!("Pulling helper image {}", reference);
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: reference,
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }
}

/// Append `:latest` to an image reference that names no tag or digest.
fn qualify_reference(image: &str) -> String {
    if image.contains('@') {
        return image.to_string();
    }
    let name_part = image.rsplit('/').next().unwrap_or(image);
    if name_part.contains(':') {
        image.to_string()
    } else {
        format!("{image}:latest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_reference_pins_latest() {
        assert_eq!(qualify_reference("alpine"), "alpine:latest");
        assert_eq!(qualify_reference("grafana/grafana"), "grafana/grafana:latest");
    }

    #[test]
    fn test_qualify_reference_keeps_tag_and_digest() {
        assert_eq!(qualify_reference("alpine:3.19"), "alpine:3.19");
        assert_eq!(
            qualify_reference("alpine@sha256:abc"),
            "alpine@sha256:abc"
        );
        // A registry port is not a tag.
        assert_eq!(
            qualify_reference("registry.local:5000/tools/helper"),
            "registry.local:5000/tools/helper:latest"
        );
    }
}
