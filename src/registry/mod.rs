//! Docker Hub registry tag queries.
//!
//! Talks to the Hub repositories API rather than the raw registry protocol:
//! one endpoint serves tag names and digests without a token dance, paging
//! through results with the `next` link.

use serde::Deserialize;
use tracing::debug;

use crate::utils::errors::{DkrError, Result};

const HUB_BASE_URL: &str = "https://hub.docker.com/v2/repositories";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct TagPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<TagEntry>,
}

/// One tag as returned by the Hub repositories API.
#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,

    /// Manifest (list) digest for the tag, when the registry reports one.
    #[serde(default)]
    pub digest: Option<String>,

    /// Per-architecture images under the tag.
    #[serde(default)]
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageEntry {
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

impl TagEntry {
    /// True when the tag's manifest digest or any per-architecture image
    /// digest matches.
    pub fn matches_digest(&self, digest: &str) -> bool {
        self.digest.as_deref() == Some(digest)
            || self.images.iter().any(|i| i.digest.as_deref() == Some(digest))
    }

    /// Best digest for this tag: the manifest digest when present, otherwise
    /// the first per-architecture image digest.
    pub fn any_digest(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .or_else(|| self.images.iter().find_map(|i| i.digest.as_deref()))
    }
}

/// Client for the Docker Hub tags API.
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new() -> Self {
        Self::with_base_url(HUB_BASE_URL)
    }

    /// Point the client at a different registry frontend (tests, mirrors).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// All tags for `image`, following pagination. Bare names resolve to the
    /// `library/` namespace.
    pub async fn list_tags(&self, image: &str) -> Result<Vec<TagEntry>> {
        let repository = qualify(image);
        let mut url = format!(
            "{}/{}/tags?page_size={}",
            self.base_url, repository, PAGE_SIZE
        );
        let mut tags = Vec::new();

        loop {
            debug!("Fetching {}", url);
            let response = self.http.get(&url).send().await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(DkrError::Registry(format!("Image '{image}' not found")));
            }
            if !response.status().is_success() {
                return Err(DkrError::Registry(format!(
                    "Registry returned status {} for '{image}'",
                    response.status()
                )));
            }

            let page: TagPage = response.json().await?;
            tags.extend(page.results);

            match page.next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        Ok(tags)
    }

    /// Digest for one specific tag of `image`. Unknown tags and tags without
    /// a recorded digest are errors.
    pub async fn resolve_tag(&self, image: &str, tag: &str) -> Result<String> {
        let tags = self.list_tags(image).await?;
        let entry = tags
            .into_iter()
            .find(|t| t.name == tag)
            .ok_or_else(|| {
                DkrError::Registry(format!("Tag '{tag}' not found for image '{image}'"))
            })?;
        entry
            .any_digest()
            .map(str::to_string)
            .ok_or_else(|| DkrError::Registry(format!("No digest recorded for '{image}:{tag}'")))
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Bare image names live under the `library/` namespace on Docker Hub.
fn qualify(image: &str) -> String {
    if image.contains('/') {
        image.to_string()
    } else {
        format!("library/{image}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_namespaces() {
        assert_eq!(qualify("alpine"), "library/alpine");
        assert_eq!(qualify("grafana/grafana"), "grafana/grafana");
    }

    #[test]
    fn test_tag_page_parsing_and_digest_matching() {
        let json = r#"{
            "count": 2,
            "next": null,
            "results": [
                {
                    "name": "latest",
                    "digest": "sha256:aaa",
                    "images": [
                        {"digest": "sha256:bbb", "architecture": "amd64"},
                        {"digest": "sha256:ccc", "architecture": "arm64"}
                    ]
                },
                {
                    "name": "3.19",
                    "images": []
                }
            ]
        }"#;

        let page: TagPage = serde_json::from_str(json).unwrap();
        assert!(page.next.is_none());
        assert_eq!(page.results.len(), 2);

        let latest = &page.results[0];
        assert!(latest.matches_digest("sha256:aaa"));
        assert!(latest.matches_digest("sha256:ccc"));
        assert!(!latest.matches_digest("sha256:zzz"));
        assert_eq!(latest.any_digest(), Some("sha256:aaa"));

        let bare = &page.results[1];
        assert!(!bare.matches_digest("sha256:aaa"));
        assert_eq!(bare.any_digest(), None);
    }
}
