// SPDX-License-Identifier: MIT

//! Result Exporter (§6 `output`/`results_download`, §1 Non-goals: "Result
//! export formatters (JSON, SPDX, CycloneDX, XLSX, attribution HTML) —
//! only the dispatcher contract is given").
//!
//! The JSON exporter is real — it's also what the webhook payload's
//! optional `results` field (§4.6) embeds. The other formats are
//! represented by the same trait and registered the same way, but are
//! left unimplemented since the document formats they produce (SPDX,
//! CycloneDX, XLSX, an attribution HTML report) are themselves out of
//! scope here.

use scaorch_core::{Project, Run};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One of the output formats `output --format` / `results_download`
/// names (§6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Json,
    Csv,
    Xlsx,
    Spdx,
    CycloneDx { version: Option<String> },
    Attribution,
}

impl ExportFormat {
    fn registry_key(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Spdx => "spdx",
            ExportFormat::CycloneDx { .. } => "cyclonedx",
            ExportFormat::Attribution => "attribution",
        }
    }
}

/// The full exported result document for one project (§4.6 webhook
/// payload's `results` field, §6 `output --format json`).
#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    pub project: &'a Project,
    pub runs: &'a [Run],
}

/// Produces one output format's bytes for a project (§6).
pub trait ResultExporter: Send + Sync {
    fn format(&self) -> ExportFormat;
    fn export(&self, project: &Project, runs: &[Run]) -> Result<Vec<u8>, scaorch_core::SystemError>;
}

/// The only fully-implemented exporter: the raw `ExportDocument` as JSON.
pub struct JsonResultExporter;

impl ResultExporter for JsonResultExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn export(&self, project: &Project, runs: &[Run]) -> Result<Vec<u8>, scaorch_core::SystemError> {
        let document = ExportDocument { project, runs };
        serde_json::to_vec_pretty(&document)
            .map_err(|e| scaorch_core::SystemError::ResultExportFailed(e.to_string()))
    }
}

impl JsonResultExporter {
    /// The same document, as a `serde_json::Value` (used to embed
    /// `results` directly into a webhook payload rather than round-trip
    /// through bytes, §4.6).
    pub fn export_value(&self, project: &Project, runs: &[Run]) -> Result<Value, scaorch_core::SystemError> {
        let document = ExportDocument { project, runs };
        serde_json::to_value(&document)
            .map_err(|e| scaorch_core::SystemError::ResultExportFailed(e.to_string()))
    }
}

/// Maps a requested [`ExportFormat`] to its [`ResultExporter`] (§6
/// dispatcher contract).
pub struct ExportRegistry {
    exporters: HashMap<&'static str, Arc<dyn ResultExporter>>,
}

impl ExportRegistry {
    pub fn empty() -> Self {
        Self {
            exporters: HashMap::new(),
        }
    }

    pub fn register(&mut self, exporter: Arc<dyn ResultExporter>) {
        self.exporters.insert(exporter.format().registry_key(), exporter);
    }

    /// Registers every exporter this crate actually implements. Unlisted
    /// formats (`csv`, `xlsx`, `spdx`, `cyclonedx`, `attribution`) are
    /// left to a future implementation; `resolve` fails `ResultExportFailed`
    /// for them in the meantime.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(JsonResultExporter));
        registry
    }

    pub fn resolve(&self, format: &ExportFormat) -> Result<Arc<dyn ResultExporter>, scaorch_core::SystemError> {
        self.exporters
            .get(format.registry_key())
            .cloned()
            .ok_or_else(|| {
                scaorch_core::SystemError::ResultExportFailed(format!(
                    "no exporter registered for format {:?}",
                    format.registry_key()
                ))
            })
    }
}

impl Default for ExportRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaorch_core::id::{ProjectId, RunId};

    fn project() -> Project {
        Project::new(ProjectId::new("p1"), "scan-1", 0).unwrap()
    }

    fn run() -> Run {
        Run::new(RunId::new("r1"), ProjectId::new("p1"), "scan_codebase", "", vec![], 0)
    }

    #[test]
    fn json_exporter_round_trips_project_name() {
        let project = project();
        let runs = vec![run()];
        let bytes = JsonResultExporter.export(&project, &runs).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["project"]["name"], "scan-1");
        assert_eq!(value["runs"][0]["pipeline_name"], "scan_codebase");
    }

    #[test]
    fn registry_resolves_json_and_rejects_unimplemented_formats() {
        let registry = ExportRegistry::with_builtins();
        assert!(registry.resolve(&ExportFormat::Json).is_ok());
        let err = registry.resolve(&ExportFormat::Xlsx).unwrap_err();
        assert!(matches!(err, scaorch_core::SystemError::ResultExportFailed(_)));
    }
}
