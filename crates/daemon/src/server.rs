// SPDX-License-Identifier: MIT

//! The Unix-socket accept loop and per-connection request dispatcher.

use crate::protocol::{
    BatchEntryFailureWire, FlushFiltersWire, NewUser, PipelineInfoWire, ProjectStatus, Request,
    Response,
};
use crate::runtime::Runtime;
use crate::wire::{self, ProtocolError};
use scaorch_core::id::ProjectId;
use scaorch_core::{Clock, IdGen, Project, SystemError};
use scaorch_engine::export::ExportFormat;
use scaorch_engine::project_manager::{BatchEntry, InputSpec, NewProjectRequest, PipelineRequest};
use scaorch_policy::ProjectAlertInputs;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};

/// Accept connections on `socket_path` until `shutdown` fires, dispatching
/// each request against `runtime`.
pub async fn serve(
    listener: UnixListener,
    runtime: Arc<Runtime>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let runtime = runtime.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, runtime).await {
                                tracing::warn!(error = %e, "connection ended with an error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("listener shutting down");
                    return;
                }
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, runtime: Arc<Runtime>) -> Result<(), ProtocolError> {
    loop {
        let request: Request = match wire::read_framed(&mut stream, wire::DEFAULT_TIMEOUT).await {
            Ok(req) => req,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };
        let response = dispatch(&runtime, request).await;
        wire::write_framed(&mut stream, &response, wire::DEFAULT_TIMEOUT).await?;
    }
}

fn find_project(runtime: &Runtime, ident: &str) -> Result<Project, SystemError> {
    runtime.repository.with_state(|state| {
        if let Some(project) = state.get_project(&ProjectId::new(ident)) {
            return Ok(project.clone());
        }
        state
            .projects
            .values()
            .find(|p| p.name == ident)
            .cloned()
            .ok_or_else(|| SystemError::StepFailure {
                step: "find_project".to_string(),
                detail: format!("unknown project {ident}"),
            })
    })
}

/// Subscribe `project_id` to the process-wide `global_webhook` (§4.8), if
/// one is configured. Mirrors the `AddWebhook` handler's own
/// `Event::WebhookSubscribed` append.
fn subscribe_global_webhook(runtime: &Runtime, project_id: &ProjectId) -> Result<(), SystemError> {
    let Some(global) = &runtime.config.global_webhook else {
        return Ok(());
    };
    runtime.repository.append(scaorch_core::Event::WebhookSubscribed {
        subscription_id: scaorch_core::id::WebhookSubscriptionId::new(scaorch_core::UuidIdGen.next()),
        project_id: project_id.clone(),
        target_url: global.target_url.clone(),
        trigger_on_each_run: global.trigger_on_each_run,
        include_summary: global.include_summary,
        include_results: global.include_results,
        created_at_ms: scaorch_core::SystemClock.epoch_ms(),
    })
}

fn to_input_spec(wire: crate::protocol::InputSpecWire) -> Result<InputSpec, SystemError> {
    if let Some(uri) = wire.uri {
        return Ok(InputSpec::Uri(uri));
    }
    let src_path = wire.upload_path.ok_or_else(|| SystemError::BadConfig(
        "input must set either `uri` or `upload_path`".to_string(),
    ))?;
    let dst_name = wire.dst_name.unwrap_or_else(|| {
        std::path::Path::new(&src_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| src_path.clone())
    });
    Ok(InputSpec::Upload {
        src_path: src_path.into(),
        dst_name,
        tag: wire.tag,
    })
}

async fn dispatch(runtime: &Runtime, request: Request) -> Response {
    match try_dispatch(runtime, request).await {
        Ok(response) => response,
        Err(e) => Response::from_error(&e),
    }
}

async fn try_dispatch(runtime: &Runtime, request: Request) -> Result<Response, SystemError> {
    match request {
        Request::Ping => Ok(Response::Pong),

        Request::CreateProject { name, request } => {
            let mut inputs = Vec::with_capacity(request.inputs.len());
            for input in request.inputs {
                inputs.push(to_input_spec(input)?);
            }
            let pipelines = request
                .pipelines
                .into_iter()
                .map(|p| PipelineRequest {
                    pipeline_name: p.pipeline_name,
                    selected_groups: p.selected_groups,
                })
                .collect();
            let create_global_webhook = request.create_global_webhook;
            let project = runtime
                .manager
                .create_project(
                    &name,
                    NewProjectRequest {
                        labels: request.labels.into_iter().collect(),
                        notes: request.notes,
                        settings: request.settings.into_iter().collect(),
                        inputs,
                        pipelines,
                        execute_now: request.execute_now,
                    },
                )
                .await?;
            if create_global_webhook {
                subscribe_global_webhook(runtime, &project.id)?;
            }
            Ok(Response::Project(project))
        }

        Request::AddInputs {
            project_id,
            inputs,
            codebase_copy,
        } => {
            let project = find_project(runtime, &project_id)?;
            let mut specs = Vec::with_capacity(inputs.len());
            for input in inputs {
                specs.push(to_input_spec(input)?);
            }
            runtime.manager.add_inputs(&project.id, specs, codebase_copy).await?;
            Ok(Response::Ack)
        }

        Request::AddPipeline {
            project_id,
            pipeline_name,
            selected_groups,
            execute_now,
        } => {
            let project = find_project(runtime, &project_id)?;
            let run = runtime
                .manager
                .add_pipeline(&project.id, &pipeline_name, selected_groups, execute_now)
                .await?;
            Ok(Response::Run(run))
        }

        Request::AddWebhook {
            project_id,
            target_url,
            trigger_on_each_run,
            include_summary,
            include_results,
        } => {
            let project = find_project(runtime, &project_id)?;
            runtime.repository.append(scaorch_core::Event::WebhookSubscribed {
                subscription_id: scaorch_core::id::WebhookSubscriptionId::new(
                    scaorch_core::UuidIdGen.next(),
                ),
                project_id: project.id,
                target_url,
                trigger_on_each_run,
                include_summary,
                include_results,
                created_at_ms: scaorch_core::SystemClock.epoch_ms(),
            })?;
            Ok(Response::Ack)
        }

        Request::Execute { project_id } => {
            let project = find_project(runtime, &project_id)?;
            runtime
                .scheduler
                .drive_project(
                    &project,
                    &runtime.config.workspace_location,
                    runtime.policy_document.as_deref(),
                    runtime.config.task_timeout,
                )
                .await?;
            let runs = runtime
                .repository
                .with_state(|s| s.runs_for_project(&project.id).cloned().collect());
            Ok(Response::Runs(runs))
        }

        Request::ShowPipeline => Ok(Response::Pipelines(
            runtime.registry.iter().map(PipelineInfoWire::from).collect(),
        )),

        Request::Status { project_id } => {
            let project = find_project(runtime, &project_id)?;
            let runs = runtime
                .repository
                .with_state(|s| s.runs_for_project(&project.id).cloned().collect());
            Ok(Response::Status(ProjectStatus { project, runs }))
        }

        Request::ListProject => {
            let projects = runtime
                .repository
                .with_state(|s| s.projects.values().cloned().collect());
            Ok(Response::Projects(projects))
        }

        Request::ListPipeline => Ok(Response::Pipelines(
            runtime.registry.iter().map(PipelineInfoWire::from).collect(),
        )),

        Request::Output { project_id, format } => {
            let project = find_project(runtime, &project_id)?;
            let runs: Vec<_> = runtime
                .repository
                .with_state(|s| s.runs_for_project(&project.id).cloned().collect());
            let format = parse_format(&format)?;
            let exporter = runtime.exporters.resolve(&format)?;
            let bytes = exporter.export(&project, &runs)?;
            let data = String::from_utf8(bytes).map_err(|e| {
                SystemError::ResultExportFailed(format!("exported document was not UTF-8: {e}"))
            })?;
            Ok(Response::Document {
                content_type: "application/json".to_string(),
                data,
            })
        }

        Request::Report { project_id } => {
            let project = find_project(runtime, &project_id)?;
            let runs: Vec<_> = runtime
                .repository
                .with_state(|s| s.runs_for_project(&project.id).cloned().collect());
            let document = scaorch_engine::export::JsonResultExporter
                .export_value(&project, &runs)?;
            Ok(Response::Document {
                content_type: "application/json".to_string(),
                data: document.to_string(),
            })
        }

        Request::CheckCompliance { project_id } => {
            let _project = find_project(runtime, &project_id)?;
            let alert = match &runtime.policy_document {
                Some(policy) => policy.project_alert(&ProjectAlertInputs::default()),
                None => scaorch_policy::Alert::Empty,
            };
            Ok(Response::Alert(alert))
        }

        Request::VerifyProject { project_id } => {
            let project = find_project(runtime, &project_id)?;
            let counts = runtime
                .repository
                .with_state(|s| s.scan_entity_counts.get(project.id.as_str()).copied())
                .unwrap_or_default();
            Ok(Response::Counts(counts))
        }

        Request::ArchiveProject {
            project_id,
            remove_input,
            remove_codebase,
            remove_output,
        } => {
            let project = find_project(runtime, &project_id)?;
            runtime
                .manager
                .archive_project(&project.id, remove_input, remove_codebase, remove_output)?;
            Ok(Response::Ack)
        }

        Request::ResetProject {
            project_id,
            remove_input,
            remove_webhook,
            restore_pipelines,
            execute_now,
        } => {
            let project = find_project(runtime, &project_id)?;
            let runs = runtime
                .manager
                .reset_project(&project.id, remove_input, remove_webhook, restore_pipelines, execute_now)
                .await?;
            Ok(Response::Runs(runs))
        }

        Request::DeleteProject { project_id } => {
            let project = find_project(runtime, &project_id)?;
            runtime.manager.delete_project(&project.id)?;
            Ok(Response::Ack)
        }

        Request::FlushProjects { retain_days, filters } => {
            let flushed = runtime
                .manager
                .flush_projects(retain_days, &to_flush_filters(filters))?;
            Ok(Response::Flushed(flushed))
        }

        Request::BatchCreate {
            entries,
            pipelines,
            execute_now,
            create_global_webhook,
        } => {
            let entries = entries
                .into_iter()
                .map(|e| {
                    let inputs = e
                        .inputs
                        .into_iter()
                        .map(to_input_spec)
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok::<_, SystemError>(BatchEntry { name: e.name, inputs })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let pipelines = pipelines
                .into_iter()
                .map(|p| PipelineRequest {
                    pipeline_name: p.pipeline_name,
                    selected_groups: p.selected_groups,
                })
                .collect();
            let outcome = runtime.manager.batch_create(entries, pipelines, execute_now).await;
            if create_global_webhook {
                for created in &outcome.created {
                    subscribe_global_webhook(runtime, &created.id)?;
                }
            }
            Ok(Response::BatchCreated {
                created: outcome.created,
                failures: outcome
                    .failures
                    .into_iter()
                    .map(|f| BatchEntryFailureWire {
                        name: f.name,
                        error: f.error.kind(),
                        detail: f.error.to_string(),
                    })
                    .collect(),
            })
        }

        Request::CreateUser { username } => {
            let api_key = format!("{}:{}", scaorch_core::UuidIdGen.next(), scaorch_core::UuidIdGen.next());
            Ok(Response::User(NewUser { username, api_key }))
        }

        Request::Shutdown => Ok(Response::Ack),
    }
}

fn parse_format(raw: &str) -> Result<ExportFormat, SystemError> {
    let (name, arg) = match raw.split_once(':') {
        Some((n, a)) => (n, Some(a.to_string())),
        None => (raw, None),
    };
    match name {
        "json" => Ok(ExportFormat::Json),
        "csv" => Ok(ExportFormat::Csv),
        "xlsx" => Ok(ExportFormat::Xlsx),
        "spdx" => Ok(ExportFormat::Spdx),
        "cyclonedx" => Ok(ExportFormat::CycloneDx { version: arg }),
        "attribution" => Ok(ExportFormat::Attribution),
        other => Err(SystemError::ResultExportFailed(format!("unknown format {other}"))),
    }
}

fn to_flush_filters(wire: FlushFiltersWire) -> scaorch_engine::project_manager::FlushFilters {
    scaorch_engine::project_manager::FlushFilters {
        labels: wire.labels,
        pipeline_names: wire.pipeline_names,
    }
}
