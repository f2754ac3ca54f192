//! End-to-end tests: build the workflow graph and run it locally.

#[cfg(test)]
mod tests {
    use crate::core::{CacheScope, S3Uri, Value};
    use crate::errors::TrainflowError;
    use crate::execution::{
        ExecutionHandle, ExecutionReport, ExecutionService, ExecutionStatus, LocalExecutionService,
        ManualClock, SimulatedJobRunner,
    };
    use crate::pipeline::{Edge, PipelineGraph, DEFINITION_VERSION};
    use crate::steps::{BranchDecision, DistributionConfig, S3DataDistribution, StepNode};
    use crate::testing::{
        assert_cache_hit, assert_executed, assert_no_dangling_references, assert_registered,
        assert_step_order, assert_stopped, assert_unique_names, execution_context,
        workflow_config, write_scripts,
    };
    use crate::workflow::{
        build_pipeline, PipelineConfig, StepNames, INPUT_DATA_URL, TRAINING_INSTANCE_COUNT,
    };
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    const GROUP: &str = "BirdEnd2EndModelGroup";

    struct Harness {
        dir: TempDir,
        graph: PipelineGraph,
        names: StepNames,
        runner: Arc<SimulatedJobRunner>,
        clock: Arc<ManualClock>,
        service: LocalExecutionService,
    }

    impl Harness {
        fn new(runner: SimulatedJobRunner) -> Self {
            let dir = tempfile::tempdir().unwrap();
            write_scripts(dir.path()).unwrap();
            let config = workflow_config(dir.path());
            let graph = build_pipeline(&config, &execution_context().unwrap()).unwrap();

            let runner = Arc::new(runner);
            let clock = Arc::new(ManualClock::default());
            let artifact_root =
                S3Uri::new("sagemaker-us-east-1-111122223333", "local-executions").unwrap();
            let service = LocalExecutionService::new(runner.clone(), artifact_root)
                .with_clock(clock.clone());

            Self {
                dir,
                graph,
                names: StepNames::with_prefix(&config.base_job_prefix),
                runner,
                clock,
                service,
            }
        }

        fn with_accuracy(accuracy: f64) -> Self {
            Self::new(SimulatedJobRunner::new().with_accuracy(accuracy))
        }

        async fn run(&self, overrides: HashMap<String, Value>) -> ExecutionReport {
            let handle = self.service.submit(&self.graph, overrides).await.unwrap();
            self.service.describe(&handle).await.unwrap()
        }

        async fn run_defaults(&self) -> ExecutionReport {
            self.run(HashMap::new()).await
        }
    }

    fn build(config: &PipelineConfig) -> PipelineGraph {
        build_pipeline(config, &execution_context().unwrap()).unwrap()
    }

    fn training_distribution(graph: &PipelineGraph) -> (DistributionConfig, Vec<S3DataDistribution>) {
        match graph.step("BirdEnd2EndTrain") {
            Some(StepNode::Training(step)) => (
                step.estimator().distribution,
                step.channels().iter().map(|(_, input)| input.distribution).collect(),
            ),
            other => panic!("expected a training step, got {other:?}"),
        }
    }

    #[test]
    fn test_graph_shape() {
        let graph = build(&PipelineConfig::default());
        let names = StepNames::with_prefix("BirdEnd2End");

        assert_step_order(
            &graph,
            &[
                names.preprocess.as_str(),
                names.train.as_str(),
                names.evaluation.as_str(),
                names.condition.as_str(),
            ],
        );
        assert_no_dangling_references(&graph);
        assert_unique_names(&graph);

        assert!(graph.steps().iter().all(|step| step.name() != names.register));
        assert_eq!(graph.parent_of(&names.register), Some(names.condition.as_str()));
        match graph.step(&names.condition) {
            Some(StepNode::Condition(step)) => {
                assert_eq!(step.if_branch().steps().len(), 1);
                assert!(step.else_branch().is_stop());
            }
            other => panic!("expected a condition step, got {other:?}"),
        }
    }

    #[test]
    fn test_dependency_edges() {
        let graph = build(&PipelineConfig::default());
        let edge = |producer: &str, consumer: &str| Edge {
            producer: format!("BirdEnd2End{producer}"),
            consumer: format!("BirdEnd2End{consumer}"),
        };

        assert_eq!(
            graph.edges(),
            vec![
                edge("Evaluation", "AccuracyCond"),
                edge("Evaluation", "RegisterModel"),
                edge("Preprocess", "Evaluation"),
                edge("Preprocess", "Train"),
                edge("Train", "Evaluation"),
                edge("Train", "RegisterModel"),
            ]
        );
    }

    #[test]
    fn test_cache_scopes() {
        let graph = build(&PipelineConfig::default());
        let names = StepNames::with_prefix("BirdEnd2End");
        let scope = |name: &str| graph.step(name).and_then(StepNode::cache_scope).copied();

        assert_eq!(scope(&names.preprocess), Some(CacheScope::days(30)));
        assert_eq!(scope(&names.train), Some(CacheScope::days(30)));
        assert_eq!(scope(&names.evaluation), None);
        assert_eq!(scope(&names.condition), None);
        assert_eq!(scope(&names.register), None);
    }

    #[test]
    fn test_distribution_at_instance_count_boundaries() {
        for (count, expected, data) in [
            (0, DistributionConfig::Disabled, S3DataDistribution::FullyReplicated),
            (1, DistributionConfig::Disabled, S3DataDistribution::FullyReplicated),
            (
                2,
                DistributionConfig::Mpi { processes_per_host: 1 },
                S3DataDistribution::ShardedByS3Key,
            ),
            (
                4,
                DistributionConfig::Mpi { processes_per_host: 1 },
                S3DataDistribution::ShardedByS3Key,
            ),
        ] {
            let graph = build(&PipelineConfig::default().with_training_instance_count(count));
            let (distribution, channels) = training_distribution(&graph);
            assert_eq!(distribution, expected, "instance count {count}");
            assert_eq!(channels, vec![data, data], "instance count {count}");
        }
    }

    #[test]
    fn test_definition_document() {
        let graph = build(&PipelineConfig::default());
        let definition = graph.definition();
        let json: serde_json::Value =
            serde_json::from_str(&definition.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["Version"], DEFINITION_VERSION);
        assert_eq!(json["Parameters"].as_array().map(Vec::len), Some(8));
        assert_eq!(
            definition.step_names(),
            vec![
                "BirdEnd2EndPreprocess",
                "BirdEnd2EndTrain",
                "BirdEnd2EndEvaluation",
                "BirdEnd2EndAccuracyCond",
            ]
        );
        assert_eq!(
            json["Steps"][0]["CacheConfig"],
            serde_json::json!({"Enabled": true, "ExpireAfter": "P30D"})
        );
        assert!(json["Steps"][2].get("CacheConfig").is_none());
        assert_eq!(
            json["Steps"][3]["Arguments"]["IfSteps"][0]["Name"],
            "BirdEnd2EndRegisterModel"
        );
    }

    #[tokio::test]
    async fn test_accuracy_above_threshold_registers_model() {
        let harness = Harness::with_accuracy(0.81);
        let names = &harness.names;
        let report = harness.run_defaults().await;

        assert!(report.succeeded());
        for step in [&names.preprocess, &names.train, &names.evaluation, &names.condition] {
            assert_executed(&report, step);
        }
        assert_executed(&report, &names.register);
        assert_registered(&report, GROUP);

        let outcome = report.condition(&names.condition).unwrap();
        assert_eq!(outcome.decision, BranchDecision::IfBranch);
        assert_eq!(outcome.left_values, vec![0.81]);

        let model = &report.registered_models[0];
        assert_eq!(model.version, 1);
        assert_eq!(model.approval_status, "PendingManualApproval");
        assert_eq!(
            Some(&model.model_data),
            report.step(&names.train).unwrap().outputs.get("ModelArtifacts")
        );
        assert!(model.model_data.ends_with("/output/model.tar.gz"));
        let evaluation_output = &report.step(&names.evaluation).unwrap().outputs["evaluation"];
        assert_eq!(
            model.statistics.as_deref(),
            Some(format!("{evaluation_output}/evaluation.json").as_str())
        );
    }

    #[tokio::test]
    async fn test_accuracy_below_threshold_stops_without_error() {
        let harness = Harness::with_accuracy(0.79);
        let names = &harness.names;
        let report = harness.run_defaults().await;

        assert_eq!(report.status, ExecutionStatus::Succeeded);
        assert_eq!(report.error, None);
        assert_stopped(&report, &names.condition);
        assert_eq!(
            report.condition(&names.condition).map(|o| o.decision),
            Some(BranchDecision::ElseBranch)
        );
        assert!(report.step(&names.register).is_none());
        assert!(report.registered_models.is_empty());
        assert_eq!(harness.service.latest_model_version(GROUP), None);
    }

    #[tokio::test]
    async fn test_accuracy_at_threshold_registers_model() {
        let harness = Harness::with_accuracy(0.8);
        let report = harness.run_defaults().await;

        assert_registered(&report, GROUP);
    }

    #[tokio::test]
    async fn test_training_metrics_are_scraped() {
        let harness = Harness::new(SimulatedJobRunner::new().with_accuracy(0.9).with_epochs(4));
        let report = harness.run_defaults().await;

        let metrics = &report.step(&harness.names.train).unwrap().metrics;
        assert_eq!(
            metrics.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["acc", "loss", "val_acc", "val_loss"]
        );
        assert_eq!(metrics["acc"], 0.9);
        assert_eq!(metrics["val_acc"], 0.89);
    }

    #[tokio::test]
    async fn test_resubmission_within_ttl_skips_cached_steps() {
        let harness = Harness::with_accuracy(0.85);
        let names = &harness.names;

        let first = harness.run_defaults().await;
        let second = harness.run_defaults().await;

        assert_executed(&first, &names.preprocess);
        assert_executed(&first, &names.train);
        assert_cache_hit(&second, &names.preprocess);
        assert_cache_hit(&second, &names.train);
        assert_executed(&second, &names.evaluation);

        assert_eq!(harness.runner.invocations(&names.preprocess), 1);
        assert_eq!(harness.runner.invocations(&names.train), 1);
        assert_eq!(harness.runner.invocations(&names.evaluation), 2);

        assert_eq!(
            first.step(&names.train).unwrap().outputs,
            second.step(&names.train).unwrap().outputs
        );
        assert_eq!(second.registered_models[0].version, 2);
        assert_eq!(harness.service.latest_model_version(GROUP), Some(2));
    }

    #[tokio::test]
    async fn test_resubmission_after_ttl_reexecutes() {
        let harness = Harness::with_accuracy(0.85);
        let names = &harness.names;

        harness.run_defaults().await;
        harness.clock.advance(chrono::Duration::days(31));
        let report = harness.run_defaults().await;

        assert_executed(&report, &names.preprocess);
        assert_executed(&report, &names.train);
        assert_eq!(harness.runner.invocations(&names.preprocess), 2);
        assert_eq!(harness.runner.invocations(&names.train), 2);
    }

    #[tokio::test]
    async fn test_changed_script_invalidates_only_its_step() {
        let harness = Harness::with_accuracy(0.85);
        let names = &harness.names;

        harness.run_defaults().await;
        std::fs::write(
            harness.dir.path().join("preprocess.py"),
            "print('a different split')\n",
        )
        .unwrap();
        let report = harness.run_defaults().await;

        assert_executed(&report, &names.preprocess);
        assert_cache_hit(&report, &names.train);
    }

    #[tokio::test]
    async fn test_changed_parameter_invalidates_cache() {
        let harness = Harness::with_accuracy(0.85);
        let names = &harness.names;

        harness.run_defaults().await;
        let mut overrides = HashMap::new();
        overrides.insert(
            INPUT_DATA_URL.to_string(),
            Value::from("s3://another-bucket/images"),
        );
        let report = harness.run(overrides).await;

        assert_executed(&report, &names.preprocess);
        assert_eq!(
            report.parameters[INPUT_DATA_URL],
            Value::from("s3://another-bucket/images")
        );
        assert_eq!(harness.runner.invocations(&names.preprocess), 2);
    }

    #[tokio::test]
    async fn test_job_failure_ends_execution_without_retry() {
        let harness = Harness::new(SimulatedJobRunner::new().failing_on("BirdEnd2EndTrain"));
        let names = &harness.names;
        let report = harness.run_defaults().await;

        assert_eq!(report.status, ExecutionStatus::Failed);
        assert!(report.error.as_deref().unwrap().contains(&names.train));
        assert_executed(&report, &names.preprocess);
        assert!(report.step(&names.evaluation).is_none());
        assert!(report.conditions.is_empty());
        assert_eq!(harness.runner.invocations(&names.train), 1);
        assert_eq!(harness.runner.total_invocations(), 2);
    }

    #[tokio::test]
    async fn test_failed_step_is_not_cached() {
        let harness = Harness::new(SimulatedJobRunner::new().failing_on("BirdEnd2EndTrain"));
        let names = &harness.names;

        harness.run_defaults().await;
        let report = harness.run_defaults().await;

        assert_cache_hit(&report, &names.preprocess);
        assert_eq!(harness.runner.invocations(&names.train), 2);
    }

    #[tokio::test]
    async fn test_invalid_overrides_are_rejected_at_submission() {
        let harness = Harness::with_accuracy(0.85);

        let mut unknown = HashMap::new();
        unknown.insert("NoSuchParameter".to_string(), Value::from(1_i64));
        let err = harness.service.submit(&harness.graph, unknown).await.unwrap_err();
        assert!(matches!(err, TrainflowError::Parameter(_)));

        let mut mismatched = HashMap::new();
        mismatched.insert(TRAINING_INSTANCE_COUNT.to_string(), Value::from("two"));
        let err = harness.service.submit(&harness.graph, mismatched).await.unwrap_err();
        assert!(matches!(err, TrainflowError::Parameter(_)));

        assert_eq!(harness.runner.total_invocations(), 0);
    }

    #[tokio::test]
    async fn test_missing_script_fails_submission() {
        let dir = tempfile::tempdir().unwrap();
        let graph = build(&workflow_config(dir.path()));
        let service = LocalExecutionService::new(
            Arc::new(SimulatedJobRunner::new()),
            S3Uri::new("bucket", "executions").unwrap(),
        );

        let err = service.submit(&graph, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, TrainflowError::Io(_)));
    }

    #[tokio::test]
    async fn test_forgotten_execution_is_unknown() {
        let harness = Harness::with_accuracy(0.85);
        let handle = harness
            .service
            .submit(&harness.graph, HashMap::new())
            .await
            .unwrap();

        let report = harness.service.forget(&handle).unwrap();
        assert_eq!(report.handle, handle);
        assert!(harness.service.forget(&handle).is_none());
        assert!(matches!(
            harness.service.describe(&handle).await,
            Err(TrainflowError::UnknownExecution(_))
        ));
    }

    #[tokio::test]
    async fn test_describe_unknown_execution() {
        let harness = Harness::with_accuracy(0.85);
        let err = harness
            .service
            .describe(&ExecutionHandle::new("BirdEnd2EndPipeline"))
            .await
            .unwrap_err();

        assert!(matches!(err, TrainflowError::UnknownExecution(_)));
    }
}
