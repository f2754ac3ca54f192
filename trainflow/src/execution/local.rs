//! In-process execution service.

use super::cache_store::{CacheStore, CachedStep, InMemoryCacheStore};
use super::clock::{Clock, SystemClock};
use super::fingerprint::step_fingerprint;
use super::report::{
    BranchOutcome, ConditionOutcome, ExecutionHandle, ExecutionReport, ExecutionStatus,
    RegisteredModel, StepRecord, StepStatus,
};
use super::resolve::Resolver;
use super::runner::{JobRequest, JobRunner};
use super::ExecutionService;
use crate::core::{S3Uri, Value};
use crate::errors::TrainflowError;
use crate::pipeline::PipelineGraph;
use crate::properties::{OutputSlot, Source};
use crate::steps::{ConditionStep, RegisterModelStep, Step, StepNode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs pipeline graphs in process, delegating job work to a [`JobRunner`].
///
/// Submission runs the whole execution before returning. Steps run one at a
/// time in graph order; the steps of a taken branch run right after their
/// condition step. The first failure ends the execution and nothing is
/// retried.
///
/// Reports are kept in memory until [`LocalExecutionService::forget`] drops them.
pub struct LocalExecutionService {
    runner: Arc<dyn JobRunner>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    artifact_root: S3Uri,
    model_versions: Mutex<HashMap<String, u32>>,
    reports: Mutex<HashMap<Uuid, ExecutionReport>>,
}

impl std::fmt::Debug for LocalExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutionService")
            .field("artifact_root", &self.artifact_root)
            .field("executions", &self.reports.lock().len())
            .finish_non_exhaustive()
    }
}

impl LocalExecutionService {
    /// Creates a service with an in-memory cache and the system clock.
    /// Outputs without a fixed destination are placed under `artifact_root`.
    #[must_use]
    pub fn new(runner: Arc<dyn JobRunner>, artifact_root: S3Uri) -> Self {
        Self {
            runner,
            cache: Arc::new(InMemoryCacheStore::new()),
            clock: Arc::new(SystemClock),
            artifact_root,
            model_versions: Mutex::new(HashMap::new()),
            reports: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the cache store.
    #[must_use]
    pub fn with_cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the latest registered version in a model package group.
    #[must_use]
    pub fn latest_model_version(&self, group: &str) -> Option<u32> {
        self.model_versions.lock().get(group).copied()
    }

    /// Drops the stored report of an execution, returning it if present.
    pub fn forget(&self, handle: &ExecutionHandle) -> Option<ExecutionReport> {
        self.reports.lock().remove(&handle.id)
    }

    fn register_version(&self, group: &str) -> u32 {
        let mut versions = self.model_versions.lock();
        let version = versions.entry(group.to_string()).or_insert(0);
        *version += 1;
        *version
    }
}

#[async_trait]
impl ExecutionService for LocalExecutionService {
    async fn submit(
        &self,
        graph: &PipelineGraph,
        overrides: HashMap<String, Value>,
    ) -> Result<ExecutionHandle, TrainflowError> {
        graph.validate()?;
        let parameters = graph.parameters().bind(&overrides)?;
        let code_digests = code_digests(graph)?;
        let handle = ExecutionHandle::new(graph.name());
        info!(execution = %handle, "submitted execution");

        let mut run = Run {
            service: self,
            handle: handle.clone(),
            code_digests,
            resolver: Resolver::new(parameters),
            steps: Vec::new(),
            conditions: Vec::new(),
            registered_models: Vec::new(),
        };
        let started_at = self.clock.now();
        let error = run.execute(graph).await.err();

        let status = if error.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        };
        info!(execution = %handle, ?status, steps = run.steps.len(), "finished execution");

        let report = ExecutionReport {
            handle: handle.clone(),
            status,
            parameters: run.resolver.parameters().clone(),
            steps: run.steps,
            conditions: run.conditions,
            registered_models: run.registered_models,
            error,
            started_at,
            finished_at: self.clock.now(),
        };
        self.reports.lock().insert(handle.id, report);
        Ok(handle)
    }

    async fn describe(&self, handle: &ExecutionHandle) -> Result<ExecutionReport, TrainflowError> {
        self.reports
            .lock()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| TrainflowError::UnknownExecution(handle.to_string()))
    }
}

/// Content digests of every cacheable step's program, read at submission.
fn code_digests(graph: &PipelineGraph) -> Result<HashMap<String, String>, TrainflowError> {
    let mut digests = HashMap::new();
    for node in graph.all_steps() {
        if !node.cache_scope().is_some_and(|scope| scope.enabled) {
            continue;
        }
        let code = match node {
            StepNode::Processing(step) => step.code().clone(),
            StepNode::Training(step) => step.estimator().entry_program(),
            StepNode::Condition(_) | StepNode::RegisterModel(_) => continue,
        };
        digests.insert(node.name().to_string(), code.digest()?);
    }
    Ok(digests)
}

/// State of one execution in progress.
struct Run<'a> {
    service: &'a LocalExecutionService,
    handle: ExecutionHandle,
    code_digests: HashMap<String, String>,
    resolver: Resolver,
    steps: Vec<StepRecord>,
    conditions: Vec<ConditionOutcome>,
    registered_models: Vec<RegisteredModel>,
}

impl Run<'_> {
    async fn execute(&mut self, graph: &PipelineGraph) -> Result<(), String> {
        let mut queue: VecDeque<&StepNode> = graph.steps().iter().collect();

        while let Some(node) = queue.pop_front() {
            let result = match node {
                StepNode::Processing(_) | StepNode::Training(_) => self.run_job(node).await,
                StepNode::Condition(step) => self.evaluate(step).map(|next| {
                    for child in next.iter().rev() {
                        queue.push_front(child);
                    }
                }),
                StepNode::RegisterModel(step) => self.register(step),
            };

            if let Err(reason) = result {
                warn!(execution = %self.handle, step = node.name(), %reason, "step failed");
                self.steps.push(self.record(
                    node,
                    StepStatus::Failed {
                        reason: reason.clone(),
                    },
                    None,
                    BTreeMap::new(),
                    BTreeMap::new(),
                ));
                return Err(format!("{}: {reason}", node.name()));
            }
        }

        Ok(())
    }

    fn record(
        &self,
        node: &StepNode,
        status: StepStatus,
        fingerprint: Option<String>,
        outputs: BTreeMap<String, String>,
        metrics: BTreeMap<String, f64>,
    ) -> StepRecord {
        StepRecord {
            name: node.name().to_string(),
            kind: node.kind(),
            status,
            fingerprint,
            outputs,
            metrics,
            finished_at: self.now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.service.clock.now()
    }

    fn resolve_inputs(&self, node: &StepNode) -> Result<BTreeMap<String, Value>, String> {
        node.inputs()
            .into_iter()
            .map(|input| {
                self.resolver
                    .resolve(&input.source)
                    .map(|value| (input.name, value))
                    .map_err(|e| e.to_string())
            })
            .collect()
    }

    async fn run_job(&mut self, node: &StepNode) -> Result<(), String> {
        let name = node.name();
        let inputs = self.resolve_inputs(node)?;
        let arguments = node.as_step().arguments();
        let cache_scope = node.cache_scope().filter(|scope| scope.enabled).copied();
        let fingerprint = cache_scope.map(|_| {
            step_fingerprint(
                node.kind(),
                &arguments,
                &inputs,
                self.code_digests.get(name).map(String::as_str),
            )
        });

        if let Some(key) = &fingerprint {
            if let Some(entry) = self.service.cache.get(key, self.now()).await {
                info!(execution = %self.handle, step = name, "cache hit");
                self.resolver.record_outputs(name, entry.outputs.clone());
                self.resolver.record_documents(entry.documents);
                self.steps.push(self.record(
                    node,
                    StepStatus::CacheHit,
                    fingerprint.clone(),
                    entry.outputs,
                    entry.metrics,
                ));
                return Ok(());
            }
        }

        let (outputs, property_files) = self.output_locations(node);
        let request = JobRequest {
            execution_id: self.handle.id,
            step_name: name.to_string(),
            kind: node.kind(),
            arguments,
            inputs,
            outputs: outputs.clone(),
            property_files,
        };
        debug!(execution = %self.handle, step = name, "launching job");
        let result = self
            .service
            .runner
            .run(&request)
            .await
            .map_err(|e| e.to_string())?;

        let metrics = match node {
            StepNode::Training(step) => scrape_metrics(step.estimator(), &result.logs),
            _ => BTreeMap::new(),
        };
        self.resolver.record_outputs(name, outputs.clone());
        self.resolver.record_documents(result.documents.clone());

        if let (Some(key), Some(scope)) = (&fingerprint, cache_scope) {
            let entry = CachedStep::new(outputs.clone(), result.documents, metrics.clone(), self.now())
                .with_ttl(scope.ttl);
            self.service.cache.put(key, entry).await;
        }

        info!(execution = %self.handle, step = name, metrics = metrics.len(), "executed step");
        self.steps
            .push(self.record(node, StepStatus::Executed, fingerprint, outputs, metrics));
        Ok(())
    }

    /// Output locations by slot label, and property file locations by name.
    fn output_locations(
        &self,
        node: &StepNode,
    ) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        let mut outputs = BTreeMap::new();
        let mut property_files = BTreeMap::new();
        let scratch = self.service.artifact_root.join(&format!(
            "{}/{}/{}",
            self.handle.pipeline_name,
            self.handle.id.simple(),
            node.name()
        ));

        match node {
            StepNode::Processing(step) => {
                for output in step.processing_outputs() {
                    let location = output
                        .destination
                        .as_ref()
                        .map_or_else(|| scratch.join(&output.output_name), Clone::clone)
                        .to_string();
                    outputs.insert(output.output_name.clone(), location);
                }
                for file in step.property_files() {
                    if let Some(base) = outputs.get(&file.output_name) {
                        let location = format!("{base}/{}", file.path);
                        property_files.insert(file.name.clone(), location.clone());
                        outputs.insert(OutputSlot::PropertyFile(file.name.clone()).label(), location);
                    }
                }
            }
            StepNode::Training(step) => {
                let job = format!("{}-{}", node.name(), self.handle.id.simple());
                let archive = step
                    .estimator()
                    .output_path
                    .join(&format!("{job}/output/model.tar.gz"));
                outputs.insert(OutputSlot::ModelArtifacts.label(), archive.to_string());
            }
            StepNode::Condition(_) | StepNode::RegisterModel(_) => {}
        }

        (outputs, property_files)
    }

    /// Evaluates a condition once and returns the steps of the taken arm.
    fn evaluate<'n>(&mut self, step: &'n ConditionStep) -> Result<&'n [StepNode], String> {
        let left_values = step
            .conditions()
            .iter()
            .map(|condition| {
                let value = self
                    .resolver
                    .resolve(&Source::Property(condition.left.clone()))
                    .map_err(|e| e.to_string())?;
                value
                    .as_f64()
                    .ok_or_else(|| format!("'{}' resolved to non-numeric '{value}'", condition.left))
            })
            .collect::<Result<Vec<f64>, String>>()?;

        let decision = step.decide(&left_values);
        let branch = step.branch(decision);
        let outcome = if branch.is_stop() {
            BranchOutcome::Stopped
        } else {
            BranchOutcome::Continued {
                steps: branch.steps().iter().map(|s| s.name().to_string()).collect(),
            }
        };
        info!(
            execution = %self.handle,
            step = step.name(),
            ?left_values,
            ?decision,
            stopped = branch.is_stop(),
            "evaluated condition"
        );

        self.conditions.push(ConditionOutcome {
            step: step.name().to_string(),
            left_values,
            decision,
            branch: outcome,
        });
        self.steps.push(StepRecord {
            name: step.name().to_string(),
            kind: step.kind(),
            status: StepStatus::Executed,
            fingerprint: None,
            outputs: BTreeMap::new(),
            metrics: BTreeMap::new(),
            finished_at: self.now(),
        });
        Ok(branch.steps())
    }

    fn register(&mut self, step: &RegisterModelStep) -> Result<(), String> {
        let resolve = |source: &Source| {
            self.resolver
                .resolve(source)
                .map(|value| value.to_string())
                .map_err(|e| e.to_string())
        };
        let model_data = resolve(&Source::Property(step.model_data().clone()))?;
        let approval_status = resolve(step.approval_status())?;
        let statistics = step
            .model_metrics()
            .model_statistics
            .as_ref()
            .map(|metrics| resolve(&metrics.s3_uri))
            .transpose()?;

        let group = step.model_package_group_name();
        let version = self.service.register_version(group);
        info!(execution = %self.handle, group, version, "registered model package");

        let mut outputs = BTreeMap::new();
        outputs.insert("ModelPackageVersion".to_string(), version.to_string());
        self.registered_models.push(RegisteredModel {
            model_package_group_name: group.to_string(),
            version,
            model_data,
            approval_status,
            statistics,
        });
        self.steps.push(StepRecord {
            name: step.name().to_string(),
            kind: step.kind(),
            status: StepStatus::Executed,
            fingerprint: None,
            outputs,
            metrics: BTreeMap::new(),
            finished_at: self.now(),
        });
        Ok(())
    }
}

/// The last value each metric takes across the job's log lines.
fn scrape_metrics(estimator: &crate::steps::Estimator, logs: &[String]) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    for line in logs {
        for definition in &estimator.metric_definitions {
            if let Some(value) = definition.scrape(line) {
                metrics.insert(definition.name().to_string(), value);
            }
        }
    }
    metrics
}
