// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Upstream release listing and asset download.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;

use super::version::{compare_versions, normalize_version};
use crate::error::ProvisionError;
use crate::locks::resilient_lock;

/// GitHub repository publishing croc releases.
pub const CROC_REPO: &str = "schollz/croc";

/// Timeout for release-list requests. Asset downloads have none.
const LIST_TIMEOUT_SECS: u64 = 10;

/// How long a failed listing is remembered before the API is tried again.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(60);

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
    pub size: u64,
}

/// A release as listed upstream. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Release {
    pub tag_name: String,
    /// Normalized version, when the tag parses as one.
    pub version: Option<String>,
    pub name: String,
    pub published_at: Option<String>,
    pub prerelease: bool,
    pub draft: bool,
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Parse one release object. Never fails: bad or missing fields take
    /// their defaults so one malformed entry cannot sink the whole list.
    pub fn from_value(value: &Value) -> Self {
        let str_field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let bool_field = |key: &str| value.get(key).and_then(Value::as_bool).unwrap_or(false);

        let tag_name = str_field("tag_name");
        let version = normalize_version(&tag_name).ok();
        let published_at = value
            .get("published_at")
            .and_then(Value::as_str)
            .map(str::to_string);

        let assets = value
            .get("assets")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_asset).collect())
            .unwrap_or_default();

        Self {
            tag_name,
            version,
            name: str_field("name"),
            published_at,
            prerelease: bool_field("prerelease"),
            draft: bool_field("draft"),
            assets,
        }
    }

    pub fn is_stable(&self) -> bool {
        !self.draft && !self.prerelease && self.version.is_some()
    }

    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

fn parse_asset(value: &Value) -> Option<ReleaseAsset> {
    let name = value.get("name").and_then(Value::as_str)?.to_string();
    let url = value
        .get("browser_download_url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let size = value.get("size").and_then(Value::as_u64).unwrap_or(0);
    Some(ReleaseAsset { name, url, size })
}

/// Parse a release-list response body. Non-array bodies yield an empty list.
pub fn parse_release_list(body: &Value) -> Vec<Release> {
    body.as_array()
        .map(|items| items.iter().filter(|v| v.is_object()).map(Release::from_value).collect())
        .unwrap_or_default()
}

/// Newest stable version in a list.
pub fn latest_stable(releases: &[Release]) -> Option<String> {
    releases
        .iter()
        .filter(|r| r.is_stable())
        .filter_map(|r| r.version.clone())
        .max_by(|a, b| compare_versions(a, b))
}

/// Where releases come from. The provisioner only talks to this trait.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn list_releases(&self) -> Result<Vec<Release>, ProvisionError>;

    /// Download URL for an asset of a tagged release.
    fn asset_url(&self, tag: &str, asset_name: &str) -> String;

    /// Fetch an asset body in full.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ProvisionError>;
}

/// GitHub releases API client with a TTL cache on the listing.
pub struct GithubReleases {
    client: reqwest::Client,
    repo: String,
    ttl: Duration,
    cache: Mutex<Option<(Instant, Vec<Release>)>>,
    last_failure: Mutex<Option<(Instant, String)>>,
}

impl GithubReleases {
    pub fn new(ttl: Duration) -> Self {
        Self::for_repo(CROC_REPO, ttl)
    }

    pub fn for_repo(repo: impl Into<String>, ttl: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crocdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            repo: repo.into(),
            ttl,
            cache: Mutex::new(None),
            last_failure: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<Vec<Release>> {
        let cache = resilient_lock(&self.cache);
        cache
            .as_ref()
            .filter(|(fetched_at, _)| fetched_at.elapsed() < self.ttl)
            .map(|(_, releases)| releases.clone())
    }

    /// A listing failure that is still inside its backoff window.
    fn recent_failure(&self) -> Option<String> {
        let failure = resilient_lock(&self.last_failure);
        failure
            .as_ref()
            .filter(|(failed_at, _)| failed_at.elapsed() < FAILURE_BACKOFF)
            .map(|(_, message)| message.clone())
    }

    async fn fetch_releases(&self) -> Result<Vec<Release>, ProvisionError> {
        if let Some(message) = self.recent_failure() {
            tracing::debug!("Release list skipped, last attempt failed: {}", message);
            return Err(ProvisionError::Network(message));
        }

        match self.fetch_releases().await {
            Ok(releases) => {
                tracing::info!("RELEASES_FETCHED | repo={} count={}", self.repo, releases.len());
                *resilient_lock(&self.last_failure) = None;
                *resilient_lock(&self.cache) = Some((Instant::now(), releases.clone()));
                Ok(releases)
            }
            Err(e) => {
                tracing::warn!("RELEASES_UNAVAILABLE | repo={} error={}", self.repo, e);
                let message = match &e {
                    ProvisionError::Network(message) => message.clone(),
                    other => other.to_string(),
                };
                *resilient_lock(&self.last_failure) = Some((Instant::now(), message));
                Err(e)
            }
        }
    }

    fn asset_url(&self, tag: &str, asset_name: &str) -> String {
        format!(
            "https://github.com/{}/releases/download/{}/{}",
            self.repo, tag, asset_name
        )
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProvisionError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProvisionError::Network(format!(
                "Download of {} failed with {}",
                url,
                response.status()
            )));
        }

        let total = response.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        let mut last_logged = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            body.extend_from_slice(&chunk);
            if body.len() - last_logged >= 1_048_576 {
                last_logged = body.len();
                tracing::debug!("Downloaded {} of {:?} bytes from {}", body.len(), total, url);
            }
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_well_formed_release() {
        let value = json!({
            "tag_name": "v10.2.1",
            "name": "v10.2.1",
            "published_at": "2025-01-10T12:00:00Z",
            "prerelease": false,
            "draft": false,
            "assets": [
                {"name": "croc_v10.2.1_Linux-64bit.tar.gz", "browser_download_url": "https://x/a", "size": 4096}
            ]
        });
        let release = Release::from_value(&value);
        assert_eq!(release.version.as_deref(), Some("10.2.1"));
        assert!(release.is_stable());
        assert_eq!(release.assets[0].size, 4096);
        assert!(release.asset("croc_v10.2.1_Linux-64bit.tar.gz").is_some());
    }

    #[test]
    fn test_malformed_fields_take_defaults() {
        let value = json!({
            "tag_name": 42,
            "name": null,
            "prerelease": "yes",
            "assets": [{"name": 7}, {"name": "ok.zip", "size": "big"}]
        });
        let release = Release::from_value(&value);
        assert_eq!(release.tag_name, "");
        assert!(release.version.is_none());
        assert!(!release.prerelease);
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].size, 0);
        assert!(!release.is_stable());
    }

    #[test]
    fn test_one_bad_entry_does_not_sink_the_list() {
        let body = json!([
            {"tag_name": "v10.2.1"},
            "garbage",
            {"tag_name": "not-a-version"},
            {"tag_name": "v10.1.0", "prerelease": true}
        ]);
        let releases = parse_release_list(&body);
        assert_eq!(releases.len(), 3);
        assert_eq!(latest_stable(&releases).as_deref(), Some("10.2.1"));
    }

    #[test]
    fn test_non_array_body_is_empty() {
        let body = json!({"message": "API rate limit exceeded"});
        assert!(parse_release_list(&body).is_empty());
    }

    #[test]
    fn test_latest_stable_orders_numerically() {
        let body = json!([
            {"tag_name": "v9.6.17"},
            {"tag_name": "v10.10.0"},
            {"tag_name": "v10.2.1"},
            {"tag_name": "v11.0.0", "draft": true}
        ]);
        let releases = parse_release_list(&body);
        assert_eq!(latest_stable(&releases).as_deref(), Some("10.10.0"));
    }

    #[test]
    fn test_asset_url() {
        let source = GithubReleases::new(Duration::from_secs(60));
        assert_eq!(
            source.asset_url("v10.2.1", "croc_v10.2.1_checksums.txt"),
            "https://github.com/schollz/croc/releases/download/v10.2.1/croc_v10.2.1_checksums.txt"
        );
    }

    #[test]
    fn test_cache_respects_ttl() {
        let source = GithubReleases::new(Duration::from_secs(60));
        assert!(source.cached().is_none());

        *resilient_lock(&source.cache) = Some((Instant::now(), vec![]));
        assert!(source.cached().is_some());

        let expired = GithubReleases::new(Duration::ZERO);
        *resilient_lock(&expired.cache) = Some((Instant::now(), vec![]));
        assert!(expired.cached().is_none());
    }

    #[tokio::test]
    async fn test_recent_failure_short_circuits_listing() {
        let source = GithubReleases::for_repo("example/unreachable", Duration::from_secs(60));
        assert!(source.recent_failure().is_none());

        *resilient_lock(&source.last_failure) = Some((Instant::now(), "connect timed out".into()));
        let started = Instant::now();
        let err = source.list_releases().await.unwrap_err();
        assert!(err.to_string().contains("connect timed out"));
        assert!(started.elapsed() < Duration::from_secs(1));

        let stale = Instant::now().checked_sub(FAILURE_BACKOFF + Duration::from_secs(1));
        if let Some(stale) = stale {
            *resilient_lock(&source.last_failure) = Some((stale, "old".into()));
            assert!(source.recent_failure().is_none());
        }
    }
}
