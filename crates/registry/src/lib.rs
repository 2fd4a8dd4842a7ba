// SPDX-License-Identifier: MIT

//! Pipeline Registry (C4, §4.4).
//!
//! Built-in pipelines are registered in process; extra pipelines are
//! discovered from `.toml` manifests under each configured
//! `pipelines_dirs` entry. A manifest names its ordered steps by the name
//! of a compiled step body the engine resolves at execution time — this
//! crate never executes a step, it only describes pipelines.

use scaorch_core::SystemError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A single ordered step of a pipeline (§4.4).
///
/// `group` is `None` for an always-on step; `Some(group)` steps run only
/// when `group` is present in a run's `selected_groups`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepDescriptor {
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
}

/// Where a [`PipelineDescriptor`] was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineSource {
    BuiltIn,
    Path(PathBuf),
}

/// Metadata and ordered steps for one pipeline (§4.4).
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub name: String,
    pub summary: String,
    pub steps: Vec<StepDescriptor>,
    pub is_addon: bool,
    pub source: PipelineSource,
}

impl PipelineDescriptor {
    /// Every group label referenced by this pipeline's steps, in step order
    /// with duplicates removed.
    pub fn groups(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for step in &self.steps {
            if let Some(group) = &step.group {
                if !seen.contains(&group.as_str()) {
                    seen.push(group.as_str());
                }
            }
        }
        seen
    }
}

/// On-disk shape of a `pipelines_dirs` manifest file (§4.4).
#[derive(Debug, Deserialize)]
struct PipelineManifest {
    name: String,
    summary: String,
    #[serde(default)]
    is_addon: bool,
    steps: Vec<StepDescriptor>,
}

/// Holds every discovered [`PipelineDescriptor`], keyed by name.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: BTreeMap<String, PipelineDescriptor>,
}

impl PipelineRegistry {
    /// An empty registry, for tests that register descriptors directly.
    pub fn empty() -> Self {
        Self {
            pipelines: BTreeMap::new(),
        }
    }

    /// Register the process's built-in pipelines (§4.4).
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for descriptor in builtin_pipelines() {
            registry.insert(descriptor);
        }
        registry
    }

    /// Insert or override a descriptor. Overriding an existing name is
    /// logged as a warning, matching "last loaded wins" (§4.4).
    pub fn insert(&mut self, descriptor: PipelineDescriptor) {
        if let Some(previous) = self.pipelines.get(&descriptor.name) {
            tracing::warn!(
                pipeline = %descriptor.name,
                previous_source = ?previous.source,
                new_source = ?descriptor.source,
                "pipeline name overridden by a later-loaded descriptor",
            );
        }
        self.pipelines.insert(descriptor.name.clone(), descriptor);
    }

    /// Discover and register `.toml` manifests from each directory, in the
    /// order given (later directories override earlier ones and built-ins).
    pub fn discover(&mut self, pipelines_dirs: &[PathBuf]) -> Result<(), SystemError> {
        for dir in pipelines_dirs {
            let mut entries: Vec<_> = std::fs::read_dir(dir)?
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("toml"))
                .collect();
            entries.sort();
            for path in entries {
                self.load_manifest(&path)?;
            }
        }
        Ok(())
    }

    fn load_manifest(&mut self, path: &Path) -> Result<(), SystemError> {
        let content = std::fs::read_to_string(path)?;
        let manifest: PipelineManifest = toml::from_str(&content).map_err(|e| {
            SystemError::InvalidPolicy(format!("malformed pipeline manifest {path:?}: {e}"))
        })?;
        self.insert(PipelineDescriptor {
            name: manifest.name,
            summary: manifest.summary,
            steps: manifest.steps,
            is_addon: manifest.is_addon,
            source: PipelineSource::Path(path.to_path_buf()),
        });
        Ok(())
    }

    /// Resolve a [`PipelineDescriptor`] or fail `UnknownPipeline` (§4.4 step 1).
    pub fn resolve(&self, name: &str) -> Result<&PipelineDescriptor, SystemError> {
        self.pipelines
            .get(name)
            .ok_or_else(|| SystemError::UnknownPipeline(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineDescriptor> {
        self.pipelines.values()
    }

    /// Compute the effective step list for a run (§4.4 step 2): keep every
    /// always-on step, plus every step whose group is in `selected_groups`.
    /// Fails `UnknownGroup` if `selected_groups` names a group the pipeline
    /// does not declare.
    pub fn effective_steps<'a>(
        descriptor: &'a PipelineDescriptor,
        selected_groups: &[String],
    ) -> Result<Vec<&'a StepDescriptor>, SystemError> {
        let declared = descriptor.groups();
        for group in selected_groups {
            if !declared.contains(&group.as_str()) {
                return Err(SystemError::UnknownGroup {
                    pipeline: descriptor.name.clone(),
                    group: group.clone(),
                });
            }
        }
        Ok(descriptor
            .steps
            .iter()
            .filter(|step| match &step.group {
                None => true,
                Some(group) => selected_groups.iter().any(|g| g == group),
            })
            .collect())
    }
}

/// The process's compiled-in pipelines (§4.4).
///
/// A minimal but representative set: a full scan pipeline with optional
/// add-on groups, and a lightweight "load inventory only" pipeline.
pub fn builtin_pipelines() -> Vec<PipelineDescriptor> {
    vec![
        PipelineDescriptor {
            name: "scan_codebase".to_string(),
            summary: "Extract archives, scan files for licenses and \
                      copyrights, resolve packages, and evaluate policy."
                .to_string(),
            steps: vec![
                StepDescriptor {
                    name: "copy_inputs_to_codebase_directory".to_string(),
                    group: None,
                },
                StepDescriptor {
                    name: "extract_archives".to_string(),
                    group: None,
                },
                StepDescriptor {
                    name: "collect_and_create_codebase_resources".to_string(),
                    group: None,
                },
                StepDescriptor {
                    name: "scan_for_application_packages".to_string(),
                    group: None,
                },
                StepDescriptor {
                    name: "scan_for_vulnerabilities".to_string(),
                    group: Some("vulnerabilities".to_string()),
                },
                StepDescriptor {
                    name: "find_vulnerabilities_by_scorecard".to_string(),
                    group: Some("scorecard".to_string()),
                },
                StepDescriptor {
                    name: "evaluate_policies".to_string(),
                    group: None,
                },
            ],
            is_addon: false,
            source: PipelineSource::BuiltIn,
        },
        PipelineDescriptor {
            name: "load_inventory".to_string(),
            summary: "Load a pre-existing scan result without re-scanning."
                .to_string(),
            steps: vec![StepDescriptor {
                name: "load_inventory_from_toolkit_scan".to_string(),
                group: None,
            }],
            is_addon: false,
            source: PipelineSource::BuiltIn,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_fails_for_unknown_pipeline() {
        let registry = PipelineRegistry::with_builtins();
        let err = registry.resolve("does_not_exist").unwrap_err();
        assert!(matches!(err, SystemError::UnknownPipeline(_)));
    }

    #[test]
    fn resolve_finds_builtin() {
        let registry = PipelineRegistry::with_builtins();
        let descriptor = registry.resolve("scan_codebase").unwrap();
        assert_eq!(descriptor.steps.len(), 7);
    }

    #[test]
    fn effective_steps_keeps_always_on_and_selected_groups() {
        let registry = PipelineRegistry::with_builtins();
        let descriptor = registry.resolve("scan_codebase").unwrap();
        let steps =
            PipelineRegistry::effective_steps(descriptor, &["vulnerabilities".to_string()])
                .unwrap();
        assert!(steps.iter().any(|s| s.name == "scan_for_vulnerabilities"));
        assert!(!steps
            .iter()
            .any(|s| s.name == "find_vulnerabilities_by_scorecard"));
        assert!(steps.iter().any(|s| s.name == "evaluate_policies"));
    }

    #[test]
    fn effective_steps_rejects_unknown_group() {
        let registry = PipelineRegistry::with_builtins();
        let descriptor = registry.resolve("scan_codebase").unwrap();
        let err =
            PipelineRegistry::effective_steps(descriptor, &["not-a-group".to_string()])
                .unwrap_err();
        assert!(matches!(err, SystemError::UnknownGroup { .. }));
    }

    #[test]
    fn no_selected_groups_runs_only_always_on_steps() {
        let registry = PipelineRegistry::with_builtins();
        let descriptor = registry.resolve("scan_codebase").unwrap();
        let steps = PipelineRegistry::effective_steps(descriptor, &[]).unwrap();
        assert_eq!(steps.len(), 5);
    }

    #[test]
    fn discover_overrides_builtin_of_the_same_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scan_codebase.toml"),
            r#"
name = "scan_codebase"
summary = "Custom override"

[[steps]]
name = "only_step"
"#,
        )
        .unwrap();

        let mut registry = PipelineRegistry::with_builtins();
        registry.discover(&[dir.path().to_path_buf()]).unwrap();

        let descriptor = registry.resolve("scan_codebase").unwrap();
        assert_eq!(descriptor.summary, "Custom override");
        assert_eq!(descriptor.source, PipelineSource::Path(
            dir.path().join("scan_codebase.toml")
        ));
    }

    #[test]
    fn discover_adds_new_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("custom.toml"),
            r#"
name = "custom_pipeline"
summary = "A custom pipeline"
is_addon = true

[[steps]]
name = "step_one"
"#,
        )
        .unwrap();

        let mut registry = PipelineRegistry::empty();
        registry.discover(&[dir.path().to_path_buf()]).unwrap();

        let descriptor = registry.resolve("custom_pipeline").unwrap();
        assert!(descriptor.is_addon);
        assert_eq!(descriptor.steps.len(), 1);
    }
}
