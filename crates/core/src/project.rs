// SPDX-License-Identifier: MIT

//! Project entity, InputSource, and name/path validation (§3, §4.1, §4.2).

use crate::error::SystemError;
use crate::id::ProjectId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Opaque key/value settings bag (§3). Known keys are documented in §9/§4.8
/// but the bag itself is not schema-validated beyond JSON value shape.
pub type ProjectSettings = BTreeMap<String, serde_json::Value>;

/// A long-lived analysis container (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub slug: String,
    pub labels: BTreeSet<String>,
    pub notes: String,
    pub settings: ProjectSettings,
    pub is_archived: bool,
    pub created_at_ms: u64,
    pub archived_at_ms: Option<u64>,
}

impl Project {
    pub fn new(id: ProjectId, name: &str, created_at_ms: u64) -> Result<Self, SystemError> {
        validate_project_name(name)?;
        Ok(Self {
            id,
            name: name.to_string(),
            slug: slugify(name),
            labels: BTreeSet::new(),
            notes: String::new(),
            settings: ProjectSettings::new(),
            is_archived: false,
            created_at_ms,
            archived_at_ms: None,
        })
    }

    /// `<slug>-<short-uuid>` directory name used under `workspace_location/projects/` (§6).
    pub fn workspace_dir_name(&self) -> String {
        use crate::id::ShortId;
        format!("{}-{}", self.slug, self.id.as_str().short(8))
    }
}

/// A user-provided input file attached to a project (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSource {
    pub filename: String,
    pub download_url: Option<String>,
    pub tag: String,
    pub is_uploaded: bool,
    pub size: u64,
}

/// Project name pattern: non-empty, starts with an alphanumeric, and
/// contains only alphanumerics, `-`, `_`, and `.` (§3 "pattern-restricted").
pub fn validate_project_name(name: &str) -> Result<(), SystemError> {
    if name.is_empty() {
        return Err(SystemError::InvalidName(
            "project name must not be empty".to_string(),
        ));
    }
    let first = name.chars().next().unwrap_or_default();
    if !first.is_ascii_alphanumeric() {
        return Err(SystemError::InvalidName(format!(
            "project name {name:?} must start with an alphanumeric character"
        )));
    }
    let valid_rest = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid_rest {
        return Err(SystemError::InvalidName(format!(
            "project name {name:?} may only contain letters, digits, '-', '_', '.'"
        )));
    }
    Ok(())
}

/// Lowercase, dash-separated slug derived from a project name.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "project".to_string()
    } else {
        out
    }
}
