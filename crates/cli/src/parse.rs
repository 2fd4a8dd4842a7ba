// SPDX-License-Identifier: MIT

//! Parsers for the compact `NAME[:groups]`/`PATH[:TAG]`/`URL[#TAG]` syntax
//! §6's CLI surface uses for repeated `--pipeline`/`--input-file`/
//! `--input-url` flags.

use scaorch_daemon::protocol::{InputSpecWire, PipelineRequestWire};

/// `PIPELINE[:grp1,grp2]`
pub fn parse_pipeline_spec(s: &str) -> Result<PipelineRequestWire, String> {
    let (name, groups) = match s.split_once(':') {
        Some((name, groups)) => (name, groups),
        None => (s, ""),
    };
    if name.is_empty() {
        return Err("pipeline name must not be empty".to_string());
    }
    let selected_groups = groups
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();
    Ok(PipelineRequestWire {
        pipeline_name: name.to_string(),
        selected_groups,
    })
}

/// `PATH[:TAG]` — an already-present local file to upload.
pub fn parse_input_file(s: &str) -> Result<InputSpecWire, String> {
    let (path, tag) = match s.split_once(':') {
        Some((path, tag)) => (path, Some(tag.to_string())),
        None => (s, None),
    };
    if path.is_empty() {
        return Err("--input-file path must not be empty".to_string());
    }
    let dst_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    Ok(InputSpecWire {
        upload_path: Some(path.to_string()),
        dst_name: Some(dst_name),
        tag,
        uri: None,
    })
}

/// `URL[#TAG]` — a `pkg:`/`docker://`/git/HTTP(S) URI the daemon's Input
/// Fetcher resolves.
pub fn parse_input_url(s: &str) -> Result<InputSpecWire, String> {
    let (url, tag) = match s.split_once('#') {
        Some((url, tag)) => (url, Some(tag.to_string())),
        None => (s, None),
    };
    if url.is_empty() {
        return Err("--input-url must not be empty".to_string());
    }
    Ok(InputSpecWire {
        upload_path: None,
        dst_name: None,
        tag,
        uri: Some(url.to_string()),
    })
}
