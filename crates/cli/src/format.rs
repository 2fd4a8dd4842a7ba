// SPDX-License-Identifier: MIT

//! Rendering for the CLI's two output modes (§6): a human-readable mode
//! and a machine-readable (JSON) mode.

use clap::ValueEnum;
use scaorch_core::{Project, Run};
use scaorch_daemon::protocol::{PipelineInfoWire, ProjectStatus};
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to render JSON: {e}"),
    }
}

pub fn print_project(project: &Project, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(project),
        OutputFormat::Text => {
            println!("{} ({})", project.name, project.id);
            if !project.labels.is_empty() {
                let labels: Vec<_> = project.labels.iter().cloned().collect();
                println!("  labels: {}", labels.join(", "));
            }
        }
    }
}

pub fn print_projects(projects: &[Project], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(projects),
        OutputFormat::Text => {
            if projects.is_empty() {
                println!("(no projects)");
            }
            for project in projects {
                let archived = if project.is_archived { " [archived]" } else { "" };
                println!("{}\t{}{}", project.id, project.name, archived);
            }
        }
    }
}

pub fn print_run(run: &Run, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(run),
        OutputFormat::Text => println!("[{}] {} ({})", run.status, run.pipeline_name, run.id),
    }
}

pub fn print_runs(runs: &[Run], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(runs),
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("(no runs)");
            }
            for run in runs {
                println!("[{}] {} ({})", run.status, run.pipeline_name, run.id);
            }
        }
    }
}

pub fn print_status(status: &ProjectStatus, format: OutputFormat, verbosity: u8) {
    match format {
        OutputFormat::Json => print_json(status),
        OutputFormat::Text => {
            println!("{} ({})", status.project.name, status.project.id);
            for run in &status.runs {
                println!("  [{}] {}", run.status, run.pipeline_name);
                if verbosity >= 1 {
                    if let Some(exit_code) = run.task_exitcode {
                        println!("    exit_code: {exit_code}");
                    }
                }
                if verbosity >= 2 {
                    println!("    description: {}", run.description);
                }
            }
        }
    }
}

/// `show-pipeline`/`list-pipeline`: `[STATUS] pipeline_name` lines (§6),
/// where STATUS here is whether it's an addon (core pipelines always run;
/// addons are opt-in via `selected_groups`).
pub fn print_pipelines(pipelines: &[PipelineInfoWire], format: OutputFormat, verbosity: u8) {
    match format {
        OutputFormat::Json => print_json(pipelines),
        OutputFormat::Text => {
            for pipeline in pipelines {
                let kind = if pipeline.is_addon { "ADDON" } else { "CORE" };
                println!("[{kind}] {}", pipeline.name);
                if verbosity >= 1 && !pipeline.summary.is_empty() {
                    println!("  {}", pipeline.summary);
                }
                if verbosity >= 2 {
                    for step in &pipeline.steps {
                        match &step.group {
                            Some(group) => println!("  - {} ({group})", step.name),
                            None => println!("  - {}", step.name),
                        }
                    }
                }
            }
        }
    }
}
