// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::paths::PathsError;

/// Resolve the daemon's state directory:
/// `SCAORCH_STATE_DIR` > `XDG_STATE_HOME/scaorch` > `~/.local/state/scaorch`.
pub fn state_dir() -> Result<PathBuf, PathsError> {
    if let Ok(dir) = std::env::var("SCAORCH_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("scaorch"));
    }
    let home = std::env::var("HOME").map_err(|_| PathsError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/scaorch"))
}

/// Read the process-wide `Config` (§4.8) from the environment, honoring
/// only the subset of variable names §4.8 lists (uppercased key in the
/// shell, lowercased key in `Config::from_env_map`).
pub fn config_env_map() -> std::collections::BTreeMap<String, String> {
    const RECOGNIZED: &[&str] = &[
        "db_host",
        "db_name",
        "db_user",
        "db_password",
        "db_port",
        "require_authentication",
        "workspace_location",
        "config_dir",
        "processes",
        "async",
        "task_timeout",
        "scan_file_timeout",
        "scan_max_file_size",
        "pipelines_dirs",
        "policies_file",
        "rest_api_page_size",
        "log_level",
        "site_url",
        "global_webhook",
        "time_zone",
        "rq_redis_host",
        "rq_redis_port",
        "rq_redis_db",
        "rq_redis_username",
        "rq_redis_password",
        "rq_redis_default_timeout",
        "rq_redis_ssl",
    ];
    let mut map = std::collections::BTreeMap::new();
    for key in RECOGNIZED {
        let var_name = format!("SCAORCH_{}", key.to_ascii_uppercase());
        if let Ok(value) = std::env::var(&var_name) {
            map.insert((*key).to_string(), value);
        }
    }
    map
}
