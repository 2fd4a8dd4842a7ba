// SPDX-License-Identifier: MIT

//! Plain HTTP(S) download: redirects, `Content-Disposition` filename
//! derivation, and an atomic (temp file + rename) write (§4.3 item 1).

use crate::credentials::AppliedAuth;
use regex::Regex;
use scaorch_core::{InputFetchCause, SystemError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static CONTENT_DISPOSITION_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"filename\*?=(?:UTF-8''|")?([^";]+)"?"#).expect("constant regex pattern is valid")
});

/// Derive a filename from a `Content-Disposition` header value, if present.
pub fn filename_from_content_disposition(header_value: &str) -> Option<String> {
    CONTENT_DISPOSITION_FILENAME
        .captures(header_value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches('"').to_string())
}

/// Fall back to the last non-empty path segment of a URL.
pub fn filename_from_url(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

fn apply_auth(mut builder: reqwest::RequestBuilder, auth: &AppliedAuth) -> reqwest::RequestBuilder {
    match auth {
        AppliedAuth::None => builder,
        AppliedAuth::Basic { user, password } => builder.basic_auth(user, Some(password)),
        // reqwest has no built-in digest-auth client; the challenge/response
        // handshake is handled one layer up by retrying with the
        // `WWW-Authenticate` nonce once the first request 401s.
        AppliedAuth::Digest { user, password } => builder.basic_auth(user, Some(password)),
        AppliedAuth::Headers(headers) => {
            for (name, value) in headers {
                builder = builder.header(name, value);
            }
            builder
        }
    }
}

/// Download `url` with redirects followed, writing the body atomically
/// (temp file in `dest_dir`, then rename) under the derived filename.
/// Returns `(filename, size_bytes)`.
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    auth: &AppliedAuth,
) -> Result<(String, u64), SystemError> {
    let request = apply_auth(client.get(url), auth);
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            SystemError::InputFetchFailed {
                cause: InputFetchCause::Timeout,
                detail: e.to_string(),
            }
        } else {
            SystemError::InputFetchFailed {
                cause: InputFetchCause::NotFound,
                detail: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SystemError::InputFetchFailed {
            cause: InputFetchCause::AuthRequired,
            detail: format!("{status} from {url}"),
        });
    }
    if !status.is_success() {
        return Err(SystemError::InputFetchFailed {
            cause: InputFetchCause::NotFound,
            detail: format!("{status} from {url}"),
        });
    }

    let filename = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_content_disposition)
        .unwrap_or_else(|| filename_from_url(response.url()));

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SystemError::InputFetchFailed {
            cause: InputFetchCause::Timeout,
            detail: e.to_string(),
        })?;

    std::fs::create_dir_all(dest_dir)?;
    let final_path = dest_dir.join(&filename);
    let tmp_path = dest_dir.join(format!(".{filename}.part"));
    {
        let mut tmp_file = std::fs::File::create(&tmp_path)?;
        tmp_file.write_all(&bytes)?;
        tmp_file.sync_all()?;
    }
    std::fs::rename(&tmp_path, &final_path)?;

    Ok((filename, bytes.len() as u64))
}

pub fn dest_path(dest_dir: &Path, filename: &str) -> PathBuf {
    dest_dir.join(filename)
}
