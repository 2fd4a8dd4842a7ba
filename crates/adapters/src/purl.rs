// SPDX-License-Identifier: MIT

//! `pkg:<type>/...` (PURL) resolution (§4.3).

use async_trait::async_trait;
use scaorch_core::{InputFetchCause, SystemError};

/// A parsed Package URL, to the level of detail the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPurl {
    pub package_type: String,
    pub namespace: Option<String>,
    pub name: String,
    pub version: Option<String>,
}

/// Parse a `pkg:type/namespace/name@version` string (qualifiers and
/// subpath are accepted but ignored — they don't affect which archive is
/// fetched for any of the nine supported registries).
pub fn parse_purl(s: &str) -> Result<ParsedPurl, SystemError> {
    let rest = s
        .strip_prefix("pkg:")
        .ok_or_else(|| SystemError::InputFetchFailed {
            cause: InputFetchCause::NotFound,
            detail: format!("not a PURL: {s:?}"),
        })?;

    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(SystemError::InputFetchFailed {
            cause: InputFetchCause::NotFound,
            detail: format!("malformed PURL, expected pkg:type/name: {s:?}"),
        });
    }

    let package_type = segments.remove(0).to_ascii_lowercase();
    let name_with_version = segments.remove(segments.len() - 1);
    let namespace = if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    };

    let (name, version) = match name_with_version.split_once('@') {
        Some((name, version)) => (name.to_string(), Some(version.to_string())),
        None => (name_with_version.to_string(), None),
    };

    Ok(ParsedPurl {
        package_type,
        namespace,
        name,
        version,
    })
}

/// Resolves the version to fetch when a PURL omits one (§4.3 "fetch the
/// latest registry-published version").
#[async_trait]
pub trait LatestVersionResolver: Send + Sync {
    async fn latest_version(&self, purl: &ParsedPurl) -> Result<String, SystemError>;
}

/// Queries each registry's own "latest version" API.
pub struct HttpLatestVersionResolver {
    client: reqwest::Client,
}

impl HttpLatestVersionResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn fetch_failed(detail: impl Into<String>) -> SystemError {
    SystemError::InputFetchFailed {
        cause: InputFetchCause::NotFound,
        detail: detail.into(),
    }
}

#[async_trait]
impl LatestVersionResolver for HttpLatestVersionResolver {
    async fn latest_version(&self, purl: &ParsedPurl) -> Result<String, SystemError> {
        let (url, json_path): (String, &[&str]) = match purl.package_type.as_str() {
            "pypi" => (
                format!("https://pypi.org/pypi/{}/json", purl.name),
                &["info", "version"],
            ),
            "npm" => {
                let pkg = match &purl.namespace {
                    Some(ns) => format!("{ns}/{}", purl.name),
                    None => purl.name.clone(),
                };
                (
                    format!("https://registry.npmjs.org/{pkg}/latest"),
                    &["version"],
                )
            }
            "cargo" => (
                format!("https://crates.io/api/v1/crates/{}", purl.name),
                &["crate", "max_version"],
            ),
            "gem" => (
                format!(
                    "https://rubygems.org/api/v1/versions/{}/latest.json",
                    purl.name
                ),
                &["version"],
            ),
            "nuget" => (
                format!(
                    "https://api.nuget.org/v3-flatcontainer/{}/index.json",
                    purl.name.to_ascii_lowercase()
                ),
                &["versions_last"],
            ),
            other => {
                return Err(fetch_failed(format!(
                    "latest-version resolution is not supported for PURL type {other:?}"
                )))
            }
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_failed(format!("latest-version lookup failed: {e}")))?;
        if !response.status().is_success() {
            return Err(fetch_failed(format!(
                "latest-version lookup returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| fetch_failed(format!("malformed registry response: {e}")))?;

        if json_path == ["versions_last"] {
            let versions = body
                .get("versions")
                .and_then(|v| v.as_array())
                .ok_or_else(|| fetch_failed("nuget response missing versions array"))?;
            return versions
                .last()
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| fetch_failed("nuget response had no versions"));
        }

        let mut cursor = &body;
        for key in json_path {
            cursor = cursor
                .get(key)
                .ok_or_else(|| fetch_failed(format!("registry response missing {key:?}")))?;
        }
        cursor
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| fetch_failed("registry response version field was not a string"))
    }
}

/// Build the canonical download URL for a fully-resolved PURL (version
/// present), for each of the nine supported package types (§4.3).
pub fn canonical_download_url(purl: &ParsedPurl) -> Result<String, SystemError> {
    let version = purl
        .version
        .as_deref()
        .ok_or_else(|| fetch_failed("canonical_download_url requires a resolved version"))?;

    let url = match purl.package_type.as_str() {
        "pypi" => format!(
            "https://pypi.org/packages/source/{}/{}/{}-{}.tar.gz",
            purl.name.chars().next().unwrap_or('_'),
            purl.name,
            purl.name,
            version
        ),
        "npm" => {
            let pkg = match &purl.namespace {
                Some(ns) => format!("{ns}/{}", purl.name),
                None => purl.name.clone(),
            };
            let basename = purl.name.clone();
            format!("https://registry.npmjs.org/{pkg}/-/{basename}-{version}.tgz")
        }
        "cargo" => format!(
            "https://crates.io/api/v1/crates/{}/{}/download",
            purl.name, version
        ),
        "gem" => format!(
            "https://rubygems.org/downloads/{}-{}.gem",
            purl.name, version
        ),
        "nuget" => format!(
            "https://api.nuget.org/v3-flatcontainer/{}/{}/{}.{}.nupkg",
            purl.name.to_ascii_lowercase(),
            version,
            purl.name.to_ascii_lowercase(),
            version
        ),
        "maven" => {
            let group = purl
                .namespace
                .as_deref()
                .ok_or_else(|| fetch_failed("maven PURLs require a namespace (group id)"))?
                .replace('.', "/");
            format!(
                "https://repo1.maven.org/maven2/{group}/{}/{version}/{}-{version}.jar",
                purl.name, purl.name
            )
        }
        "github" => {
            let owner = purl
                .namespace
                .as_deref()
                .ok_or_else(|| fetch_failed("github PURLs require a namespace (owner)"))?;
            format!(
                "https://github.com/{owner}/{}/archive/refs/tags/{version}.tar.gz",
                purl.name
            )
        }
        "gitlab" => {
            let owner = purl
                .namespace
                .as_deref()
                .ok_or_else(|| fetch_failed("gitlab PURLs require a namespace (owner)"))?;
            format!(
                "https://gitlab.com/{owner}/{}/-/archive/{version}/{}-{version}.tar.gz",
                purl.name, purl.name
            )
        }
        "bitbucket" => {
            let owner = purl
                .namespace
                .as_deref()
                .ok_or_else(|| fetch_failed("bitbucket PURLs require a namespace (owner)"))?;
            format!(
                "https://bitbucket.org/{owner}/{}/get/{version}.tar.gz",
                purl.name
            )
        }
        "hackage" => format!(
            "https://hackage.haskell.org/package/{}-{}/{}-{}.tar.gz",
            purl.name, version, purl.name, version
        ),
        other => {
            return Err(fetch_failed(format!(
                "unsupported PURL package type: {other:?}"
            )))
        }
    };
    Ok(url)
}
