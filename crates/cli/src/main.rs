// SPDX-License-Identifier: MIT

//! `scaorch`: the CLI front end talking to the `scaorchd` background
//! process over its Unix-socket wire protocol (§6).

mod batch;
mod client;
mod exit_error;
mod format;
mod parse;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client::DaemonClient;
use exit_error::ExitError;
use format::OutputFormat;
use parse::{parse_input_file, parse_input_url, parse_pipeline_spec};
use scaorch_daemon::protocol::{
    BatchEntryWire, FlushFiltersWire, InputSpecWire, NewProjectWire, PipelineRequestWire, Request,
    Response,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scaorch", version, about = "Software-composition-analysis orchestration CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a project, optionally attaching inputs, pipelines, and executing immediately.
    CreateProject {
        name: String,
        #[arg(long = "pipeline", value_parser = parse_pipeline_spec)]
        pipelines: Vec<PipelineRequestWire>,
        #[arg(long = "input-file", value_parser = parse_input_file)]
        input_files: Vec<InputSpecWire>,
        #[arg(long = "input-url", value_parser = parse_input_url)]
        input_urls: Vec<InputSpecWire>,
        #[arg(long = "copy-codebase", value_name = "DIR")]
        copy_codebase: Option<PathBuf>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        execute: bool,
        #[arg(long = "async")]
        r#async: bool,
        #[arg(long = "no-global-webhook")]
        no_global_webhook: bool,
    },

    /// Create one project per discovered input, from a directory or a CSV list.
    BatchCreate {
        #[arg(long = "input-directory", value_name = "DIR")]
        input_directory: Option<PathBuf>,
        #[arg(long = "input-list", value_name = "CSV")]
        input_list: Option<PathBuf>,
        #[arg(long = "project-name-suffix")]
        project_name_suffix: Option<String>,
        #[arg(long = "pipeline", value_parser = parse_pipeline_spec)]
        pipelines: Vec<PipelineRequestWire>,
        #[arg(long)]
        execute: bool,
        #[arg(long = "async")]
        r#async: bool,
        #[arg(long = "create-global-webhook")]
        create_global_webhook: bool,
    },

    /// Attach more inputs to an existing project. Rejected while a run is in progress.
    AddInput {
        #[arg(long)]
        project: String,
        #[arg(long = "input-file", value_parser = parse_input_file)]
        input_files: Vec<InputSpecWire>,
        #[arg(long = "input-url", value_parser = parse_input_url)]
        input_urls: Vec<InputSpecWire>,
        #[arg(long = "copy-codebase", value_name = "DIR")]
        copy_codebase: Option<PathBuf>,
    },

    /// Queue one or more pipelines onto an existing project.
    AddPipeline {
        #[arg(long)]
        project: String,
        #[arg(required = true, value_parser = parse_pipeline_spec)]
        pipelines: Vec<PipelineRequestWire>,
    },

    /// Subscribe a project to a webhook target.
    AddWebhook {
        #[arg(long)]
        project: String,
        target_url: String,
        #[arg(long = "trigger-on-each-run")]
        trigger_on_each_run: bool,
        #[arg(long = "include-summary")]
        include_summary: bool,
        #[arg(long = "include-results")]
        include_results: bool,
    },

    /// Run the next QUEUED pipeline for a project.
    Execute {
        #[arg(long)]
        project: String,
        /// Accepted for parity with the process-wide async/inline scheduler
        /// backend (§4.5); the backend itself is fixed at daemon startup,
        /// so this flag has no additional per-call effect.
        #[arg(long = "async")]
        r#async: bool,
    },

    /// Print `[STATUS] pipeline_name` lines for a project's runs.
    ShowPipeline {
        #[arg(long)]
        project: String,
    },

    /// Show a project and its runs.
    Status {
        #[arg(long)]
        project: String,
        #[arg(long, default_value_t = 0)]
        verbosity: u8,
    },

    /// List all projects.
    ListProject {
        #[arg(long)]
        search: Option<String>,
        #[arg(long = "include-archived")]
        include_archived: bool,
    },

    /// List the pipeline registry.
    ListPipeline {
        #[arg(long, default_value_t = 0)]
        verbosity: u8,
    },

    /// Export a project's results.
    Output {
        #[arg(long)]
        project: String,
        #[arg(long)]
        format: String,
        /// Print to stdout instead of writing a file.
        #[arg(long)]
        print: bool,
    },

    /// Write a results report for every project matching the given filters.
    Report {
        #[arg(long, value_enum, default_value_t = ReportModel::Package)]
        model: ReportModel,
        #[arg(long = "output-directory", value_name = "DIR")]
        output_directory: Option<PathBuf>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long = "label")]
        labels: Vec<String>,
    },

    /// Exit 1 if the project has any policy alert at or above `--fail-level`.
    CheckCompliance {
        #[arg(long)]
        project: String,
        #[arg(long = "fail-level", value_enum, default_value_t = FailLevel::Error)]
        fail_level: FailLevel,
        /// Accepted for parity with §6; no per-package vulnerability data
        /// is modeled in this build, so it never trips the check on its own.
        #[arg(long = "fail-on-vulnerabilities")]
        fail_on_vulnerabilities: bool,
    },

    /// Compare a project's scan-entity counts against expectations.
    VerifyProject {
        #[arg(long)]
        project: String,
        #[arg(long)]
        packages: Option<u64>,
        #[arg(long = "vulnerable-packages")]
        vulnerable_packages: Option<u64>,
        #[arg(long)]
        dependencies: Option<u64>,
        #[arg(long = "vulnerable-dependencies")]
        vulnerable_dependencies: Option<u64>,
        #[arg(long)]
        vulnerabilities: Option<u64>,
        /// Require exact equality instead of "at least".
        #[arg(long)]
        strict: bool,
    },

    /// Archive a project. Rejected while any run is QUEUED or RUNNING.
    ArchiveProject {
        #[arg(long)]
        project: String,
        #[arg(long = "remove-input")]
        remove_input: bool,
        #[arg(long = "remove-codebase")]
        remove_codebase: bool,
        #[arg(long = "remove-output")]
        remove_output: bool,
        #[arg(long = "no-input")]
        no_input: bool,
    },

    /// Reset a project's runs so its pipelines can run again.
    ResetProject {
        #[arg(long)]
        project: String,
        #[arg(long = "remove-input")]
        remove_input: bool,
        #[arg(long = "remove-webhook")]
        remove_webhook: bool,
        #[arg(long = "restore-pipelines")]
        restore_pipelines: bool,
        #[arg(long = "execute-now")]
        execute_now: bool,
        #[arg(long = "no-input")]
        no_input: bool,
    },

    /// Permanently delete a project and its workspace.
    DeleteProject {
        #[arg(long)]
        project: String,
        #[arg(long = "no-input")]
        no_input: bool,
    },

    /// Delete projects older than `--retain-days` matching the given filters.
    FlushProjects {
        #[arg(long = "retain-days", default_value_t = 0)]
        retain_days: u64,
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long = "pipeline")]
        pipelines: Vec<String>,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long = "no-input")]
        no_input: bool,
    },

    /// Create a user and print its generated API key to stdout.
    CreateUser {
        username: String,
        #[arg(long = "no-input")]
        no_input: bool,
        /// Accepted for parity with §6; no role/permission model is
        /// enforced in this build.
        #[arg(long)]
        admin: bool,
        #[arg(long = "super")]
        r#super: bool,
    },

    /// Ephemeral execution: create a throwaway project, attach one input,
    /// run one or more pipelines synchronously, and dump the result.
    Run {
        /// One or more pipeline names, followed by the input (file path or URI).
        #[arg(required = true, num_args = 2..)]
        args: Vec<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportModel {
    Package,
    Dependency,
    Resource,
    Relation,
    Message,
    Todo,
}

impl ReportModel {
    fn as_str(self) -> &'static str {
        match self {
            ReportModel::Package => "package",
            ReportModel::Dependency => "dependency",
            ReportModel::Resource => "resource",
            ReportModel::Relation => "relation",
            ReportModel::Message => "message",
            ReportModel::Todo => "todo",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FailLevel {
    Missing,
    Warning,
    Error,
}

impl FailLevel {
    fn threshold(self) -> scaorch_policy::Alert {
        match self {
            FailLevel::Missing => scaorch_policy::Alert::Missing,
            FailLevel::Warning => scaorch_policy::Alert::Warning,
            FailLevel::Error => scaorch_policy::Alert::Error,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let code = e.downcast_ref::<ExitError>().map_or(1, |err| err.code);
        eprintln!("Error: {e}");
        std::process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;
    match cli.command {
        Command::CreateProject {
            name,
            pipelines,
            input_files,
            input_urls,
            copy_codebase,
            notes,
            labels,
            execute,
            r#async,
            no_global_webhook,
        } => {
            create_project(
                name,
                pipelines,
                input_files,
                input_urls,
                copy_codebase,
                notes,
                labels,
                execute || r#async,
                !no_global_webhook,
                format,
            )
            .await
        }
        Command::BatchCreate {
            input_directory,
            input_list,
            project_name_suffix,
            pipelines,
            execute,
            r#async,
            create_global_webhook,
        } => {
            batch_create(
                input_directory,
                input_list,
                project_name_suffix,
                pipelines,
                execute || r#async,
                create_global_webhook,
                format,
            )
            .await
        }
        Command::AddInput {
            project,
            input_files,
            input_urls,
            copy_codebase,
        } => add_input(project, input_files, input_urls, copy_codebase).await,
        Command::AddPipeline { project, pipelines } => add_pipeline(project, pipelines, format).await,
        Command::AddWebhook {
            project,
            target_url,
            trigger_on_each_run,
            include_summary,
            include_results,
        } => {
            add_webhook(
                project,
                target_url,
                trigger_on_each_run,
                include_summary,
                include_results,
            )
            .await
        }
        Command::Execute { project, r#async: _ } => execute_project(project, format).await,
        Command::ShowPipeline { project } => show_pipeline(project, format).await,
        Command::Status { project, verbosity } => status(project, format, verbosity).await,
        Command::ListProject { search, include_archived } => {
            list_project(search, include_archived, format).await
        }
        Command::ListPipeline { verbosity } => list_pipeline(format, verbosity).await,
        Command::Output { project, format: fmt, print } => output(project, fmt, print).await,
        Command::Report { model, output_directory, search, labels } => {
            report(model, output_directory, search, labels).await
        }
        Command::CheckCompliance { project, fail_level, fail_on_vulnerabilities } => {
            check_compliance(project, fail_level, fail_on_vulnerabilities).await
        }
        Command::VerifyProject {
            project,
            packages,
            vulnerable_packages,
            dependencies,
            vulnerable_dependencies,
            vulnerabilities,
            strict,
        } => {
            verify_project(
                project,
                packages,
                vulnerable_packages,
                dependencies,
                vulnerable_dependencies,
                vulnerabilities,
                strict,
            )
            .await
        }
        Command::ArchiveProject {
            project,
            remove_input,
            remove_codebase,
            remove_output,
            no_input: _,
        } => archive_project(project, remove_input, remove_codebase, remove_output).await,
        Command::ResetProject {
            project,
            remove_input,
            remove_webhook,
            restore_pipelines,
            execute_now,
            no_input: _,
        } => {
            reset_project(
                project,
                remove_input,
                remove_webhook,
                restore_pipelines,
                execute_now,
                format,
            )
            .await
        }
        Command::DeleteProject { project, no_input: _ } => delete_project(project).await,
        Command::FlushProjects { retain_days, labels, pipelines, dry_run, no_input: _ } => {
            flush_projects(retain_days, labels, pipelines, dry_run).await
        }
        Command::CreateUser { username, no_input: _, admin: _, r#super: _ } => {
            create_user(username).await
        }
        Command::Run { args, project, format: fmt } => run_ephemeral(args, project, fmt).await,
    }
}

fn reject(response: Response) -> anyhow::Error {
    match response {
        Response::Error(wire) => {
            anyhow::Error::new(ExitError::new(exit_error::exit_code_for(wire.error), wire.detail))
        }
        other => anyhow!("unexpected response from scaorchd: {other:?}"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn create_project(
    name: String,
    pipelines: Vec<PipelineRequestWire>,
    input_files: Vec<InputSpecWire>,
    input_urls: Vec<InputSpecWire>,
    copy_codebase: Option<PathBuf>,
    notes: Option<String>,
    labels: Vec<String>,
    execute_now: bool,
    create_global_webhook: bool,
    format: OutputFormat,
) -> Result<()> {
    let client = DaemonClient::connect()?;
    let mut inputs = input_files;
    inputs.extend(input_urls);

    // A `--copy-codebase DIR` needs its own `AddInputs { codebase_copy: true
    // }` call after the project exists, so defer `execute_now` until that
    // call has gone through (it would otherwise race the project's first
    // run and trip `RunInProgress`).
    let defer_execute = copy_codebase.is_some() && execute_now;
    let request = NewProjectWire {
        labels,
        notes: notes.unwrap_or_default(),
        settings: Default::default(),
        inputs,
        pipelines,
        execute_now: execute_now && !defer_execute,
        create_global_webhook,
    };
    let response = client.send(&Request::CreateProject { name, request }).await?;
    let project = match response {
        Response::Project(project) => project,
        other => return Err(reject(other)),
    };

    if let Some(dir) = copy_codebase {
        let entries = batch::from_directory(&dir, None)?;
        let inputs: Vec<InputSpecWire> = entries.into_iter().flat_map(|e| e.inputs).collect();
        let response = client
            .send(&Request::AddInputs {
                project_id: project.id.as_str().to_string(),
                inputs,
                codebase_copy: true,
            })
            .await?;
        if !matches!(response, Response::Ack) {
            return Err(reject(response));
        }
        if defer_execute {
            let response = client
                .send(&Request::Execute { project_id: project.id.as_str().to_string() })
                .await?;
            if !matches!(response, Response::Runs(_)) {
                return Err(reject(response));
            }
        }
    }

    format::print_project(&project, format);
    Ok(())
}

async fn batch_create(
    input_directory: Option<PathBuf>,
    input_list: Option<PathBuf>,
    suffix: Option<String>,
    pipelines: Vec<PipelineRequestWire>,
    execute_now: bool,
    create_global_webhook: bool,
    format: OutputFormat,
) -> Result<()> {
    let entries: Vec<BatchEntryWire> = match (input_directory, input_list) {
        (Some(dir), None) => batch::from_directory(&dir, suffix.as_deref())?,
        (None, Some(csv)) => batch::from_csv(&csv, suffix.as_deref())?,
        (Some(_), Some(_)) => bail!("--input-directory and --input-list are mutually exclusive"),
        (None, None) => bail!("one of --input-directory or --input-list is required"),
    };
    let client = DaemonClient::connect()?;
    let response = client
        .send(&Request::BatchCreate { entries, pipelines, execute_now, create_global_webhook })
        .await?;
    match response {
        Response::BatchCreated { created, failures } => {
            format::print_projects(&created, format);
            for failure in &failures {
                eprintln!("failed: {} ({}: {})", failure.name, failure.error, failure.detail);
            }
            if !failures.is_empty() && created.is_empty() {
                bail!("every batch-create entry failed");
            }
            Ok(())
        }
        other => Err(reject(other)),
    }
}

async fn add_input(
    project: String,
    input_files: Vec<InputSpecWire>,
    input_urls: Vec<InputSpecWire>,
    copy_codebase: Option<PathBuf>,
) -> Result<()> {
    let client = DaemonClient::connect()?;
    let mut inputs = input_files;
    inputs.extend(input_urls);
    let codebase_copy = if let Some(dir) = &copy_codebase {
        let entries = batch::from_directory(dir, None)?;
        inputs.extend(entries.into_iter().flat_map(|e| e.inputs));
        true
    } else {
        false
    };
    let response = client
        .send(&Request::AddInputs { project_id: project, inputs, codebase_copy })
        .await?;
    match response {
        Response::Ack => Ok(()),
        other => Err(reject(other)),
    }
}

async fn add_pipeline(project: String, pipelines: Vec<PipelineRequestWire>, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::connect()?;
    for pipeline in pipelines {
        let response = client
            .send(&Request::AddPipeline {
                project_id: project.clone(),
                pipeline_name: pipeline.pipeline_name,
                selected_groups: pipeline.selected_groups,
                execute_now: false,
            })
            .await?;
        match response {
            Response::Run(run) => format::print_run(&run, format),
            other => return Err(reject(other)),
        }
    }
    Ok(())
}

async fn add_webhook(
    project: String,
    target_url: String,
    trigger_on_each_run: bool,
    include_summary: bool,
    include_results: bool,
) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client
        .send(&Request::AddWebhook {
            project_id: project,
            target_url,
            trigger_on_each_run,
            include_summary,
            include_results,
        })
        .await?;
    match response {
        Response::Ack => Ok(()),
        other => Err(reject(other)),
    }
}

async fn execute_project(project: String, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::Execute { project_id: project }).await?;
    match response {
        Response::Runs(runs) => {
            format::print_runs(&runs, format);
            Ok(())
        }
        other => Err(reject(other)),
    }
}

/// §6 describes this as printing `[STATUS] pipeline_name` lines for a
/// project, which is the project's run list rather than the global
/// pipeline registry (that's `list-pipeline`), so this maps to `Status`.
async fn show_pipeline(project: String, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::Status { project_id: project }).await?;
    match response {
        Response::Status(status) => {
            format::print_runs(&status.runs, format);
            Ok(())
        }
        other => Err(reject(other)),
    }
}

async fn status(project: String, format: OutputFormat, verbosity: u8) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::Status { project_id: project }).await?;
    match response {
        Response::Status(status) => {
            format::print_status(&status, format, verbosity);
            Ok(())
        }
        other => Err(reject(other)),
    }
}

async fn list_project(search: Option<String>, include_archived: bool, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::ListProject).await?;
    match response {
        Response::Projects(mut projects) => {
            if !include_archived {
                projects.retain(|p| !p.is_archived);
            }
            if let Some(search) = &search {
                let needle = search.to_ascii_lowercase();
                projects.retain(|p| p.name.to_ascii_lowercase().contains(&needle));
            }
            format::print_projects(&projects, format);
            Ok(())
        }
        other => Err(reject(other)),
    }
}

async fn list_pipeline(format: OutputFormat, verbosity: u8) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::ListPipeline).await?;
    match response {
        Response::Pipelines(pipelines) => {
            format::print_pipelines(&pipelines, format, verbosity);
            Ok(())
        }
        other => Err(reject(other)),
    }
}

async fn output(project: String, fmt: String, print: bool) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client
        .send(&Request::Output { project_id: project.clone(), format: fmt.clone() })
        .await?;
    match response {
        Response::Document { content_type: _, data } => {
            if print {
                println!("{data}");
            } else {
                let ext = fmt.split(':').next().unwrap_or("json");
                let path = format!("{project}.{ext}");
                std::fs::write(&path, &data).with_context(|| format!("writing {path}"))?;
                println!("wrote {path}");
            }
            Ok(())
        }
        other => Err(reject(other)),
    }
}

async fn report(
    model: ReportModel,
    output_directory: Option<PathBuf>,
    search: Option<String>,
    labels: Vec<String>,
) -> Result<()> {
    let client = DaemonClient::connect()?;
    let projects = match client.send(&Request::ListProject).await? {
        Response::Projects(projects) => projects,
        other => return Err(reject(other)),
    };
    let needle = search.map(|s| s.to_ascii_lowercase());
    let matching: Vec<_> = projects
        .into_iter()
        .filter(|p| !p.is_archived)
        .filter(|p| needle.as_ref().is_none_or(|n| p.name.to_ascii_lowercase().contains(n)))
        .filter(|p| labels.iter().all(|l| p.labels.contains(l)))
        .collect();

    if let Some(dir) = &output_directory {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    for project in &matching {
        let response = client
            .send(&Request::Report { project_id: project.id.as_str().to_string() })
            .await?;
        let data = match response {
            Response::Document { data, .. } => data,
            other => return Err(reject(other)),
        };
        match &output_directory {
            Some(dir) => {
                let path = dir.join(format!("{}-{}-report.json", project.slug, model.as_str()));
                std::fs::write(&path, &data).with_context(|| format!("writing {}", path.display()))?;
                println!("wrote {}", path.display());
            }
            None => println!("{data}"),
        }
    }
    Ok(())
}

async fn check_compliance(project: String, fail_level: FailLevel, _fail_on_vulnerabilities: bool) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::CheckCompliance { project_id: project }).await?;
    match response {
        Response::Alert(alert) => {
            println!("{alert}");
            if alert >= fail_level.threshold() {
                return Err(anyhow::Error::new(ExitError::new(
                    1,
                    format!("alert {alert} at or above fail-level {fail_level:?}"),
                )));
            }
            Ok(())
        }
        other => Err(reject(other)),
    }
}

#[allow(clippy::too_many_arguments)]
async fn verify_project(
    project: String,
    packages: Option<u64>,
    vulnerable_packages: Option<u64>,
    dependencies: Option<u64>,
    vulnerable_dependencies: Option<u64>,
    vulnerabilities: Option<u64>,
    strict: bool,
) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::VerifyProject { project_id: project }).await?;
    let counts = match response {
        Response::Counts(counts) => counts,
        other => return Err(reject(other)),
    };
    // `ScanEntityCounts` has no writer anywhere in this build — scanning
    // itself is an opaque external dependency (§1 Non-goals), so
    // `packages`/`dependencies` read back as 0 along with the
    // vulnerability fields until a real scan-ingestion step exists.
    let checks: [(&str, Option<u64>, u64); 5] = [
        ("packages", packages, counts.package_count),
        ("vulnerable-packages", vulnerable_packages, 0),
        ("dependencies", dependencies, counts.dependency_count),
        ("vulnerable-dependencies", vulnerable_dependencies, 0),
        ("vulnerabilities", vulnerabilities, 0),
    ];
    let mut unmet = Vec::new();
    for (label, expected, actual) in checks {
        let Some(expected) = expected else { continue };
        let ok = if strict { actual == expected } else { actual >= expected };
        if !ok {
            unmet.push(format!("{label}: expected {expected}, got {actual}"));
        }
    }
    if !unmet.is_empty() {
        return Err(anyhow::Error::new(ExitError::new(1, unmet.join("; "))));
    }
    println!(
        "packages={} dependencies={}",
        counts.package_count, counts.dependency_count
    );
    Ok(())
}

async fn archive_project(
    project: String,
    remove_input: bool,
    remove_codebase: bool,
    remove_output: bool,
) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client
        .send(&Request::ArchiveProject {
            project_id: project,
            remove_input,
            remove_codebase,
            remove_output,
        })
        .await?;
    match response {
        Response::Ack => Ok(()),
        other => Err(reject(other)),
    }
}

async fn reset_project(
    project: String,
    remove_input: bool,
    remove_webhook: bool,
    restore_pipelines: bool,
    execute_now: bool,
    format: OutputFormat,
) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client
        .send(&Request::ResetProject {
            project_id: project,
            remove_input,
            remove_webhook,
            restore_pipelines,
            execute_now,
        })
        .await?;
    match response {
        Response::Runs(runs) => {
            format::print_runs(&runs, format);
            Ok(())
        }
        other => Err(reject(other)),
    }
}

async fn delete_project(project: String) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::DeleteProject { project_id: project }).await?;
    match response {
        Response::Ack => Ok(()),
        other => Err(reject(other)),
    }
}

async fn flush_projects(retain_days: u64, labels: Vec<String>, pipelines: Vec<String>, dry_run: bool) -> Result<()> {
    let client = DaemonClient::connect()?;
    if dry_run {
        let candidates = dry_run_flush_candidates(&client, retain_days, &labels, &pipelines).await?;
        for name in &candidates {
            println!("would flush: {name}");
        }
        return Ok(());
    }
    let response = client
        .send(&Request::FlushProjects {
            retain_days,
            filters: FlushFiltersWire { labels, pipeline_names: pipelines },
        })
        .await?;
    match response {
        Response::Flushed(names) => {
            for name in names {
                println!("flushed: {name}");
            }
            Ok(())
        }
        other => Err(reject(other)),
    }
}

/// Mirrors `ProjectManager::flush_projects`'s candidate filter (age, then
/// labels, then pipeline names) without actually deleting anything, since
/// the wire `FlushProjects` request has no dry-run mode of its own.
async fn dry_run_flush_candidates(
    client: &DaemonClient,
    retain_days: u64,
    labels: &[String],
    pipelines: &[String],
) -> Result<Vec<String>> {
    let projects = match client.send(&Request::ListProject).await? {
        Response::Projects(projects) => projects,
        other => return Err(reject(other)),
    };
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let cutoff_age_ms = retain_days.saturating_mul(86_400_000);

    let mut candidates = Vec::new();
    for project in projects {
        if now_ms.saturating_sub(project.created_at_ms) < cutoff_age_ms {
            continue;
        }
        if !labels.iter().all(|l| project.labels.contains(l)) {
            continue;
        }
        if !pipelines.is_empty() {
            let response = client
                .send(&Request::Status { project_id: project.id.as_str().to_string() })
                .await?;
            let runs = match response {
                Response::Status(status) => status.runs,
                other => return Err(reject(other)),
            };
            if !runs.iter().any(|r| pipelines.contains(&r.pipeline_name)) {
                continue;
            }
        }
        candidates.push(project.name);
    }
    Ok(candidates)
}

async fn create_user(username: String) -> Result<()> {
    let client = DaemonClient::connect()?;
    let response = client.send(&Request::CreateUser { username }).await?;
    match response {
        Response::User(user) => {
            println!("{}", user.api_key);
            Ok(())
        }
        other => Err(reject(other)),
    }
}

async fn run_ephemeral(mut args: Vec<String>, project: Option<String>, format: String) -> Result<()> {
    let input = args
        .pop()
        .ok_or_else(|| anyhow!("run requires at least one pipeline and one input"))?;
    let pipelines = args
        .into_iter()
        .map(|p| parse_pipeline_spec(&p).map_err(|e| anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;
    let input_spec = if input.contains("://") || input.starts_with("pkg:") {
        parse_input_url(&input).map_err(|e| anyhow!(e))?
    } else {
        parse_input_file(&input).map_err(|e| anyhow!(e))?
    };

    let name = project.unwrap_or_else(|| format!("run-{}", uuid::Uuid::new_v4().simple()));
    let client = DaemonClient::connect()?;
    let request = NewProjectWire {
        labels: Vec::new(),
        notes: String::new(),
        settings: Default::default(),
        inputs: vec![input_spec],
        pipelines,
        execute_now: true,
        create_global_webhook: false,
    };
    let response = client.send(&Request::CreateProject { name, request }).await?;
    let project = match response {
        Response::Project(project) => project,
        other => return Err(reject(other)),
    };

    let response = client
        .send(&Request::Output { project_id: project.id.as_str().to_string(), format })
        .await?;
    match response {
        Response::Document { data, .. } => {
            println!("{data}");
            Ok(())
        }
        other => Err(reject(other)),
    }
}
