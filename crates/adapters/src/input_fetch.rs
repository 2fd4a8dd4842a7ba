// SPDX-License-Identifier: MIT

//! The Input Fetcher (C2, §4.3): dispatches a raw input URI to the right
//! download mechanism and records the result as an [`InputSource`].

use crate::credentials::{select_auth, select_skopeo_auth, AppliedAuth};
use crate::docker::{ImagePuller, RegistryCredential};
use crate::git::GitCloner;
use crate::http_fetch;
use crate::purl::{canonical_download_url, parse_purl, LatestVersionResolver};
use crate::tag::{split_fragment_tag, split_uri_and_tag};
use async_trait::async_trait;
use scaorch_core::{FetchAuthConfig, InputFetchCause, InputSource, SystemError};
use std::path::Path;
use std::sync::Arc;

/// Fetches one project input into the project's `inputs/` workspace
/// directory, producing the [`InputSource`] record it leaves behind.
#[async_trait]
pub trait InputFetcher: Send + Sync {
    async fn fetch(
        &self,
        raw_uri: &str,
        dest_dir: &Path,
        auth_config: &FetchAuthConfig,
    ) -> Result<InputSource, SystemError>;
}

/// Dispatches across the four input shapes §4.3 describes: plain
/// HTTP(S), `pkg:` PURLs, `docker://` image references, and `.git`
/// repository URLs.
pub struct DispatchingInputFetcher {
    http: reqwest::Client,
    version_resolver: Arc<dyn LatestVersionResolver>,
    image_puller: Arc<dyn ImagePuller>,
    git_cloner: Arc<dyn GitCloner>,
}

impl DispatchingInputFetcher {
    pub fn new(
        http: reqwest::Client,
        version_resolver: Arc<dyn LatestVersionResolver>,
        image_puller: Arc<dyn ImagePuller>,
        git_cloner: Arc<dyn GitCloner>,
    ) -> Self {
        Self {
            http,
            version_resolver,
            image_puller,
            git_cloner,
        }
    }

    fn host_of(uri: &str) -> Option<String> {
        reqwest::Url::parse(uri)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

#[async_trait]
impl InputFetcher for DispatchingInputFetcher {
    async fn fetch(
        &self,
        raw_uri: &str,
        dest_dir: &Path,
        auth_config: &FetchAuthConfig,
    ) -> Result<InputSource, SystemError> {
        if let Some(purl_str) = raw_uri.strip_prefix("pkg:").map(|_| raw_uri) {
            let mut purl = parse_purl(purl_str)?;
            if purl.version.is_none() {
                purl.version = Some(self.version_resolver.latest_version(&purl).await?);
            }
            let url = canonical_download_url(&purl)?;
            let host = Self::host_of(&url).unwrap_or_default();
            let auth = select_auth(auth_config, &host);
            let (filename, size) = http_fetch::download(&self.http, &url, dest_dir, &auth).await?;
            return Ok(InputSource {
                filename,
                download_url: Some(url),
                tag: purl.version.unwrap_or_default(),
                is_uploaded: false,
                size,
            });
        }

        if raw_uri.starts_with("docker://") {
            let (image_ref, tag) = split_fragment_tag(raw_uri);
            let host = image_ref
                .strip_prefix("docker://")
                .and_then(|rest| rest.split('/').next())
                .unwrap_or_default();
            let credential =
                select_skopeo_auth(auth_config, host).map(|(user, password)| RegistryCredential {
                    user,
                    password,
                });
            let tar_path = self
                .image_puller
                .pull(image_ref, dest_dir, credential.as_ref())
                .await?;
            let size = std::fs::metadata(&tar_path)?.len();
            return Ok(InputSource {
                filename: tar_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image.tar".to_string()),
                download_url: Some(image_ref.to_string()),
                tag,
                is_uploaded: false,
                size,
            });
        }

        if raw_uri.ends_with(".git") || raw_uri.contains(".git#") || raw_uri.contains(".git:") {
            let (repo_url, tag) = split_fragment_tag(raw_uri);
            let reference = if tag.is_empty() { None } else { Some(tag.as_str()) };
            let checkout = self.git_cloner.clone_shallow(repo_url, reference, dest_dir).await?;
            let size = dir_size(&checkout)?;
            return Ok(InputSource {
                filename: checkout
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "repo".to_string()),
                download_url: Some(repo_url.to_string()),
                tag,
                is_uploaded: false,
                size,
            });
        }

        if raw_uri.starts_with("http://") || raw_uri.starts_with("https://") {
            let (fetch_uri, tag) = split_uri_and_tag(raw_uri);
            let host = Self::host_of(fetch_uri).unwrap_or_default();
            let auth = select_auth(auth_config, &host);
            let (filename, size) =
                http_fetch::download(&self.http, fetch_uri, dest_dir, &auth).await?;
            return Ok(InputSource {
                filename,
                download_url: Some(fetch_uri.to_string()),
                tag,
                is_uploaded: false,
                size,
            });
        }

        Err(SystemError::InputFetchFailed {
            cause: InputFetchCause::NotFound,
            detail: format!("unrecognized input URI scheme: {raw_uri:?}"),
        })
    }
}

fn dir_size(path: &Path) -> Result<u64, SystemError> {
    let mut total = 0u64;
    for entry in walk(path)? {
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}

fn walk(path: &Path) -> Result<Vec<std::fs::DirEntry>, SystemError> {
    let mut out = Vec::new();
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                stack.push(entry.path());
            } else {
                out.push(entry);
            }
        }
    }
    Ok(out)
}

/// Records a previously-uploaded file (CLI/REST "attach a local file"
/// path, §4.1) rather than fetching one — no network or subprocess
/// involved.
pub fn record_uploaded(filename: &str, tag: &str, size: u64) -> InputSource {
    InputSource {
        filename: filename.to_string(),
        download_url: None,
        tag: tag.to_string(),
        is_uploaded: true,
        size,
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct FakeInputFetcher {
    pub result: Result<InputSource, String>,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl InputFetcher for FakeInputFetcher {
    async fn fetch(
        &self,
        _raw_uri: &str,
        _dest_dir: &Path,
        _auth_config: &FetchAuthConfig,
    ) -> Result<InputSource, SystemError> {
        self.result.clone().map_err(|detail| SystemError::InputFetchFailed {
            cause: InputFetchCause::NotFound,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploaded_input_carries_no_download_url() {
        let input = record_uploaded("report.json", "manual", 128);
        assert!(input.download_url.is_none());
        assert!(input.is_uploaded);
        assert_eq!(input.tag, "manual");
    }
}
