// SPDX-License-Identifier: MIT

//! Configuration Loader (C9, §4.8).
//!
//! Reads an environment-style key/value map at startup. Per-project
//! overrides are merged from an optional `scancode-config.yml` uploaded as
//! an input (§4.8, §6).

use crate::duration::parse_duration;
use crate::error::SystemError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Per-host credentials recognized by the Input Fetcher (C2, §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchAuthConfig {
    #[serde(default)]
    pub basic_auth: BTreeMap<String, (String, String)>,
    #[serde(default)]
    pub digest_auth: BTreeMap<String, (String, String)>,
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<(String, String)>>,
    #[serde(default)]
    pub netrc_file: Option<PathBuf>,
    #[serde(default)]
    pub skopeo_credentials: BTreeMap<String, (String, String)>,
    #[serde(default)]
    pub skopeo_authfile: Option<PathBuf>,
}

/// Process-wide template used to auto-subscribe new projects (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalWebhookConfig {
    pub target_url: String,
    #[serde(default)]
    pub trigger_on_each_run: bool,
    #[serde(default)]
    pub include_summary: bool,
    #[serde(default)]
    pub include_results: bool,
}

/// Redis-backed task queue connection settings (§4.8, queue mode §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub db: u8,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_timeout: Duration,
    pub ssl: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            default_timeout: Duration::from_secs(180),
            ssl: false,
        }
    }
}

/// Process-wide configuration (C9, §4.8).
#[derive(Debug, Clone)]
pub struct Config {
    pub db_host: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_port: u16,
    pub require_authentication: bool,
    pub workspace_location: PathBuf,
    pub config_dir: String,
    /// -1 disables threading/multiprocessing; 0 disables multiprocessing
    /// only; positive is a worker-count hint passed to step bodies.
    pub processes: i32,
    /// Selects the scheduler backend (inline vs queue), §4.5.
    pub r#async: bool,
    pub task_timeout: Duration,
    pub scan_file_timeout: Duration,
    pub scan_max_file_size: Option<u64>,
    pub pipelines_dirs: Vec<PathBuf>,
    pub policies_file: Option<PathBuf>,
    pub paginate_by: BTreeMap<String, u32>,
    pub rest_api_page_size: u32,
    pub log_level: String,
    pub site_url: Option<String>,
    pub global_webhook: Option<GlobalWebhookConfig>,
    pub time_zone: String,
    pub fetch_auth: FetchAuthConfig,
    pub queue: QueueConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_host: "localhost".to_string(),
            db_name: "scaorch".to_string(),
            db_user: "scaorch".to_string(),
            db_password: String::new(),
            db_port: 5432,
            require_authentication: true,
            workspace_location: PathBuf::from("/var/lib/scaorch"),
            config_dir: ".scancode".to_string(),
            processes: 1,
            r#async: false,
            task_timeout: Duration::from_secs(24 * 3600),
            scan_file_timeout: Duration::from_secs(120),
            scan_max_file_size: None,
            pipelines_dirs: Vec::new(),
            policies_file: None,
            paginate_by: BTreeMap::new(),
            rest_api_page_size: 50,
            log_level: "info".to_string(),
            site_url: None,
            global_webhook: None,
            time_zone: "UTC".to_string(),
            fetch_auth: FetchAuthConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

fn get<'a>(env: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(String::as_str)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl Config {
    /// Load configuration from an environment-style key/value map (§4.8).
    ///
    /// Unknown keys are ignored (forward compatible); recognized keys that
    /// fail to parse return `BadConfig`.
    pub fn from_env_map(env: &BTreeMap<String, String>) -> Result<Self, SystemError> {
        let mut cfg = Config::default();

        if let Some(v) = get(env, "db_host") {
            cfg.db_host = v.to_string();
        }
        if let Some(v) = get(env, "db_name") {
            cfg.db_name = v.to_string();
        }
        if let Some(v) = get(env, "db_user") {
            cfg.db_user = v.to_string();
        }
        if let Some(v) = get(env, "db_password") {
            cfg.db_password = v.to_string();
        }
        if let Some(v) = get(env, "db_port") {
            cfg.db_port = v
                .parse()
                .map_err(|_| SystemError::BadConfig(format!("invalid db_port: {v}")))?;
        }
        if let Some(v) = get(env, "require_authentication") {
            cfg.require_authentication = parse_bool(v);
        }
        if let Some(v) = get(env, "workspace_location") {
            cfg.workspace_location = PathBuf::from(v);
        }
        if let Some(v) = get(env, "config_dir") {
            cfg.config_dir = v.to_string();
        }
        if let Some(v) = get(env, "processes") {
            cfg.processes = v
                .parse()
                .map_err(|_| SystemError::BadConfig(format!("invalid processes: {v}")))?;
        }
        if let Some(v) = get(env, "async") {
            cfg.r#async = parse_bool(v);
        }
        if let Some(v) = get(env, "task_timeout") {
            cfg.task_timeout = parse_duration(v)
                .map_err(|e| SystemError::BadConfig(format!("invalid task_timeout: {e}")))?;
        }
        if let Some(v) = get(env, "scan_file_timeout") {
            let secs: u64 = v
                .parse()
                .map_err(|_| SystemError::BadConfig(format!("invalid scan_file_timeout: {v}")))?;
            cfg.scan_file_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get(env, "scan_max_file_size") {
            cfg.scan_max_file_size = Some(v.parse().map_err(|_| {
                SystemError::BadConfig(format!("invalid scan_max_file_size: {v}"))
            })?);
        }
        if let Some(v) = get(env, "pipelines_dirs") {
            cfg.pipelines_dirs = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(v) = get(env, "policies_file") {
            cfg.policies_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get(env, "rest_api_page_size") {
            cfg.rest_api_page_size = v.parse().map_err(|_| {
                SystemError::BadConfig(format!("invalid rest_api_page_size: {v}"))
            })?;
        }
        if let Some(v) = get(env, "log_level") {
            cfg.log_level = v.to_string();
        }
        if let Some(v) = get(env, "site_url") {
            cfg.site_url = Some(v.to_string());
        }
        if let Some(v) = get(env, "global_webhook") {
            cfg.global_webhook = Some(serde_json::from_str(v).map_err(|e| {
                SystemError::BadConfig(format!("invalid global_webhook: {e}"))
            })?);
        }
        if let Some(v) = get(env, "time_zone") {
            cfg.time_zone = v.to_string();
        }
        if let Some(v) = get(env, "rq_redis_host") {
            cfg.queue.host = v.to_string();
        }
        if let Some(v) = get(env, "rq_redis_port") {
            cfg.queue.port = v
                .parse()
                .map_err(|_| SystemError::BadConfig(format!("invalid rq_redis_port: {v}")))?;
        }
        if let Some(v) = get(env, "rq_redis_db") {
            cfg.queue.db = v
                .parse()
                .map_err(|_| SystemError::BadConfig(format!("invalid rq_redis_db: {v}")))?;
        }
        if let Some(v) = get(env, "rq_redis_username") {
            cfg.queue.username = Some(v.to_string());
        }
        if let Some(v) = get(env, "rq_redis_password") {
            cfg.queue.password = Some(v.to_string());
        }
        if let Some(v) = get(env, "rq_redis_default_timeout") {
            let secs: u64 = v.parse().map_err(|_| {
                SystemError::BadConfig(format!("invalid rq_redis_default_timeout: {v}"))
            })?;
            cfg.queue.default_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get(env, "rq_redis_ssl") {
            cfg.queue.ssl = parse_bool(v);
        }

        if cfg.processes < -1 {
            return Err(SystemError::BadConfig(
                "processes must be >= -1".to_string(),
            ));
        }

        Ok(cfg)
    }
}

/// Per-project overrides merged from an uploaded `scancode-config.yml` (§4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectOverrides {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub ignored_patterns: Vec<String>,
    #[serde(default)]
    pub ignored_dependency_scopes: Vec<IgnoredDependencyScope>,
    #[serde(default)]
    pub ignored_vulnerabilities: Vec<String>,
    #[serde(default)]
    pub policies: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoredDependencyScope {
    pub package_type: String,
    pub scope: String,
}

impl ProjectOverrides {
    /// Parse a `scancode-config.yml` document.
    pub fn from_yaml(content: &str) -> Result<Self, SystemError> {
        serde_yaml::from_str(content)
            .map_err(|e| SystemError::BadConfig(format!("invalid scancode-config.yml: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_map_is_empty() {
        let cfg = Config::from_env_map(&BTreeMap::new()).unwrap();
        assert_eq!(cfg.task_timeout, Duration::from_secs(86400));
        assert!(!cfg.r#async);
    }

    #[test]
    fn overrides_recognized_keys() {
        let env = map(&[
            ("db_host", "db.internal"),
            ("async", "true"),
            ("task_timeout", "1h30m"),
            ("pipelines_dirs", "/a, /b ,/c"),
        ]);
        let cfg = Config::from_env_map(&env).unwrap();
        assert_eq!(cfg.db_host, "db.internal");
        assert!(cfg.r#async);
        assert_eq!(cfg.task_timeout, Duration::from_secs(5400));
        assert_eq!(
            cfg.pipelines_dirs,
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
    }

    #[test]
    fn rejects_bad_duration() {
        let env = map(&[("task_timeout", "1d")]);
        assert!(Config::from_env_map(&env).is_err());
    }

    #[test]
    fn rejects_bad_integer() {
        let env = map(&[("db_port", "not-a-number")]);
        assert!(Config::from_env_map(&env).is_err());
    }

    #[test]
    fn processes_validated_regardless_of_async() {
        let env = map(&[("processes", "-5")]);
        assert!(Config::from_env_map(&env).is_err());
    }

    #[test]
    fn global_webhook_parses_as_json() {
        let env = map(&[(
            "global_webhook",
            r#"{"target_url":"https://example.test/hook","trigger_on_each_run":true}"#,
        )]);
        let cfg = Config::from_env_map(&env).unwrap();
        let hook = cfg.global_webhook.unwrap();
        assert_eq!(hook.target_url, "https://example.test/hook");
        assert!(hook.trigger_on_each_run);
        assert!(!hook.include_summary);
    }

    #[test]
    fn rejects_malformed_global_webhook() {
        let env = map(&[("global_webhook", "not json")]);
        assert!(Config::from_env_map(&env).is_err());
    }

    #[test]
    fn project_overrides_parse_yaml() {
        let yaml = r#"
product_name: my-app
ignored_patterns:
  - "*.test.js"
ignored_dependency_scopes:
  - package_type: npm
    scope: devDependencies
"#;
        let overrides = ProjectOverrides::from_yaml(yaml).unwrap();
        assert_eq!(overrides.product_name.as_deref(), Some("my-app"));
        assert_eq!(overrides.ignored_patterns, vec!["*.test.js".to_string()]);
        assert_eq!(overrides.ignored_dependency_scopes.len(), 1);
    }
}
