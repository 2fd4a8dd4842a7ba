// SPDX-License-Identifier: MIT

//! `batch-create` source discovery (§6): turning `--input-directory`/
//! `--input-list` into the already-resolved `BatchEntryWire` list
//! `ProjectManager::batch_create` expects. DESIGN.md records this as a
//! front-end (CLI) concern rather than something C7 itself parses.

use anyhow::{bail, Context, Result};
use scaorch_daemon::protocol::{BatchEntryWire, InputSpecWire};
use std::path::Path;

fn looks_like_uri(s: &str) -> bool {
    s.starts_with("pkg:") || s.starts_with("docker://") || s.contains("://")
}

fn entry_name(stem: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{stem}{suffix}"),
        None => stem.to_string(),
    }
}

/// One entry per direct child of `dir` (file or subdirectory), named after
/// the child's file stem plus `suffix`.
pub fn from_directory(dir: &Path, suffix: Option<&str>) -> Result<Vec<BatchEntryWire>> {
    let mut entries = Vec::new();
    let read_dir = std::fs::read_dir(dir)
        .with_context(|| format!("reading --input-directory '{}'", dir.display()))?;
    for item in read_dir {
        let item = item?;
        let path = item.path();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| item.file_name().to_string_lossy().to_string());
        let dst_name = item.file_name().to_string_lossy().to_string();
        entries.push(BatchEntryWire {
            name: entry_name(&stem, suffix),
            inputs: vec![InputSpecWire {
                upload_path: Some(path.to_string_lossy().to_string()),
                dst_name: Some(dst_name),
                tag: None,
                uri: None,
            }],
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Two-column CSV: `name,input`, where `input` is a URI the Input Fetcher
/// resolves or a filesystem path to an already-present file. A header row
/// (`name,input`, case-insensitive) is skipped if present.
pub fn from_csv(csv_path: &Path, suffix: Option<&str>) -> Result<Vec<BatchEntryWire>> {
    let content = std::fs::read_to_string(csv_path)
        .with_context(|| format!("reading --input-list '{}'", csv_path.display()))?;
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if lineno == 0 && line.eq_ignore_ascii_case("name,input") {
            continue;
        }
        let Some((name, input)) = line.split_once(',') else {
            bail!("{}:{}: expected `name,input`, got {:?}", csv_path.display(), lineno + 1, line);
        };
        let name = name.trim();
        let input = input.trim();
        if name.is_empty() || input.is_empty() {
            bail!("{}:{}: name and input must both be non-empty", csv_path.display(), lineno + 1);
        }
        let spec = if looks_like_uri(input) {
            InputSpecWire {
                upload_path: None,
                dst_name: None,
                tag: None,
                uri: Some(input.to_string()),
            }
        } else {
            let path = Path::new(input);
            let dst_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| input.to_string());
            InputSpecWire {
                upload_path: Some(input.to_string()),
                dst_name: Some(dst_name),
                tag: None,
                uri: None,
            }
        };
        entries.push(BatchEntryWire {
            name: entry_name(name, suffix),
            inputs: vec![spec],
        });
    }
    Ok(entries)
}
