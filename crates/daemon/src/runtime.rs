// SPDX-License-Identifier: MIT

//! Assembles the full engine stack (C1-C9) from a loaded [`Config`] and
//! [`DaemonPaths`]: one `Runtime` the server and worker loop share.

use crate::notifier::WebhookTerminalNotifier;
use crate::paths::DaemonPaths;
use scaorch_adapters::{
    DispatchingInputFetcher, HttpLatestVersionResolver, HttpWebhookSender, SkopeoImagePuller,
    SystemGitCloner, WebhookSender,
};
use scaorch_core::{Config, SystemClock, SystemError, UuidIdGen};
use scaorch_engine::export::ExportRegistry;
use scaorch_engine::pipeline::{PipelineEngine, StepRegistry};
use scaorch_engine::scheduler::{ExecutionBackend, InProcessJobQueue, JobQueue, RunScheduler};
use scaorch_engine::project_manager::ProjectManager;
use scaorch_policy::PolicyDocument;
use scaorch_registry::PipelineRegistry;
use scaorch_storage::{SharedRepository, WalRepository};
use std::sync::Arc;

/// Everything the daemon's request handlers and queue worker reach into.
pub struct Runtime {
    pub config: Config,
    pub repository: SharedRepository,
    pub registry: Arc<PipelineRegistry>,
    pub policy_document: Option<Arc<PolicyDocument>>,
    pub exporters: Arc<ExportRegistry>,
    pub scheduler: Arc<RunScheduler<SystemClock>>,
    pub manager: Arc<ProjectManager<SystemClock, UuidIdGen>>,
    /// `Some` only under [`ExecutionBackend::Queue`] (§4.5).
    pub job_queue: Option<Arc<InProcessJobQueue>>,
}

impl Runtime {
    pub fn build(config: Config, paths: &DaemonPaths) -> Result<(Self, Option<tokio::sync::mpsc::UnboundedReceiver<String>>), SystemError> {
        let repository: SharedRepository = Arc::new(WalRepository::open(&paths.wal_path)?);

        fn build_registry(pipelines_dirs: &[std::path::PathBuf]) -> Result<PipelineRegistry, SystemError> {
            let mut registry = PipelineRegistry::with_builtins();
            registry.discover(pipelines_dirs)?;
            Ok(registry)
        }
        let registry = Arc::new(build_registry(&config.pipelines_dirs)?);

        let policy_document = match &config.policies_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Some(Arc::new(PolicyDocument::from_yaml(&content)?))
            }
            None => None,
        };

        let http = reqwest::Client::new();
        let input_fetcher = Arc::new(DispatchingInputFetcher::new(
            http.clone(),
            Arc::new(HttpLatestVersionResolver::new(http.clone())),
            Arc::new(SkopeoImagePuller),
            Arc::new(SystemGitCloner),
        ));

        let clock = SystemClock;
        let engine = Arc::new(PipelineEngine::new(
            build_registry(&config.pipelines_dirs)?,
            StepRegistry::with_builtins(),
            repository.clone(),
            clock,
        ));

        let webhook_sender: Arc<dyn WebhookSender> = Arc::new(HttpWebhookSender::new(
            http.clone(),
            clock,
            UuidIdGen,
        ));
        let exporters = Arc::new(ExportRegistry::with_builtins());
        let notifier = Arc::new(WebhookTerminalNotifier::new(
            repository.clone(),
            webhook_sender,
            exporters.clone(),
        ));

        let backend = if config.r#async {
            ExecutionBackend::Queue
        } else {
            ExecutionBackend::Inline
        };

        let scheduler = Arc::new(RunScheduler::new(
            repository.clone(),
            engine,
            clock,
            backend,
            notifier,
        ));

        let (job_queue, queue_receiver) = match backend {
            ExecutionBackend::Queue => {
                let (queue, receiver) = InProcessJobQueue::new();
                (Some(Arc::new(queue)), Some(receiver))
            }
            ExecutionBackend::Inline => (None, None),
        };

        let job_queue_dyn: Option<Arc<dyn JobQueue>> = job_queue
            .as_ref()
            .map(|q| Arc::clone(q) as Arc<dyn JobQueue>);

        let manager = Arc::new(ProjectManager::new(
            repository.clone(),
            registry.clone(),
            config.workspace_location.clone(),
            clock,
            UuidIdGen,
            input_fetcher,
            config.fetch_auth.clone(),
            scheduler.clone(),
            job_queue_dyn,
            policy_document.clone(),
            config.task_timeout,
        ));

        Ok((
            Self {
                config,
                repository,
                registry,
                policy_document,
                exporters,
                scheduler,
                manager,
                job_queue,
            },
            queue_receiver,
        ))
    }
}
