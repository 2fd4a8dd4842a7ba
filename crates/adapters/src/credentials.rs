// SPDX-License-Identifier: MIT

//! Per-host credential selection for the Input Fetcher (C2, §4.3).

use scaorch_core::FetchAuthConfig;

/// The credential applied to a single fetch, chosen per §4.3's
/// exact-host matching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedAuth {
    None,
    Basic { user: String, password: String },
    Digest { user: String, password: String },
    Headers(Vec<(String, String)>),
}

/// Resolve the credential for `host` from the fetch-auth configuration.
///
/// Matching is by exact host (§4.3); `basic_auth` is checked before
/// `digest_auth` before `headers`, so when a host is configured under more
/// than one scheme the first configured source wins, per §4.3.
pub fn select_auth(config: &FetchAuthConfig, host: &str) -> AppliedAuth {
    if let Some((user, password)) = config.basic_auth.get(host) {
        return AppliedAuth::Basic {
            user: user.clone(),
            password: password.clone(),
        };
    }
    if let Some((user, password)) = config.digest_auth.get(host) {
        return AppliedAuth::Digest {
            user: user.clone(),
            password: password.clone(),
        };
    }
    if let Some(headers) = config.headers.get(host) {
        return AppliedAuth::Headers(headers.clone());
    }
    AppliedAuth::None
}

/// Resolve the container-puller credential for `host` (§4.3 `skopeo_*`).
pub fn select_skopeo_auth(config: &FetchAuthConfig, host: &str) -> Option<(String, String)> {
    config.skopeo_credentials.get(host).cloned()
}
