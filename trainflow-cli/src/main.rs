//! The `trainflow` command.

mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, DefinitionCommand, SessionArgs, SimulateCommand};
use trainflow::execution::{ExecutionService, LocalExecutionService, SimulatedJobRunner};
use trainflow::observability::init_tracing;
use trainflow::pipeline::PipelineGraph;
use trainflow::steps::StepNode;
use trainflow::workflow::{build_pipeline, ExecutionContext, PipelineConfig, StaticIdentity};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let (config, ctx) = session(&cli.session)?;
    let graph = build_pipeline(&config, &ctx).context("Failed to build pipeline")?;

    match &cli.command {
        Command::Definition(cmd) => print_definition(&graph, cmd)?,
        Command::Inspect => inspect(&graph),
        Command::Simulate(cmd) => simulate(&graph, &config, &ctx, cmd).await?,
    }

    Ok(())
}

fn session(args: &SessionArgs) -> Result<(PipelineConfig, ExecutionContext)> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(region) = &args.region {
        config.region.clone_from(region);
    }
    if let Some(role) = &args.role {
        config = config.with_role(role);
    }
    if let Some(bucket) = &args.bucket {
        config = config.with_default_bucket(bucket);
    }
    if let Some(dir) = &args.base_dir {
        config = config.with_base_dir(dir);
    }
    if let Some(count) = args.training_instance_count {
        config = config.with_training_instance_count(count);
    }

    let identity = StaticIdentity::new(&args.account_id, args.ambient_role.clone());
    let ctx = ExecutionContext::new(&config.region, config.default_bucket.clone(), Arc::new(identity))
        .context("Failed to open session")?;
    Ok((config, ctx))
}

fn print_definition(graph: &PipelineGraph, cmd: &DefinitionCommand) -> Result<()> {
    let json = graph.definition().to_json_pretty()?;
    match &cmd.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote pipeline definition");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn inspect(graph: &PipelineGraph) {
    println!("{}", graph.name());
    for parameter in graph.parameters() {
        println!("  param {} = {}", parameter.name(), parameter.default_value());
    }
    for step in graph.steps() {
        print_step(step, 1);
    }
    for edge in graph.edges() {
        println!("  {} -> {}", edge.producer, edge.consumer);
    }
}

fn print_step(step: &StepNode, depth: usize) {
    let cache = step
        .cache_scope()
        .map(|scope| format!(" (cache {})", scope.expire_after()))
        .unwrap_or_default();
    println!("{:indent$}{} [{}]{cache}", "", step.name(), step.kind(), indent = depth * 2);
    if let StepNode::Condition(condition) = step {
        for (arm, branch) in [("if", condition.if_branch()), ("else", condition.else_branch())] {
            if branch.is_stop() {
                println!("{:indent$}{arm}: stop", "", indent = (depth + 1) * 2);
            } else {
                println!("{:indent$}{arm}:", "", indent = (depth + 1) * 2);
                for child in branch.steps() {
                    print_step(child, depth + 2);
                }
            }
        }
    }
}

async fn simulate(
    graph: &PipelineGraph,
    config: &PipelineConfig,
    ctx: &ExecutionContext,
    cmd: &SimulateCommand,
) -> Result<()> {
    if cmd.scaffold_scripts && !config.base_dir.join("preprocess.py").exists() {
        trainflow::testing::write_scripts(&config.base_dir).with_context(|| {
            format!("Failed to write scripts into {}", config.base_dir.display())
        })?;
    }

    let mut runner = SimulatedJobRunner::new().with_accuracy(cmd.accuracy);
    if let Some(step) = &cmd.fail_step {
        runner = runner.failing_on(step);
    }
    let artifact_root = ctx.bucket_uri(&format!("{}/local-executions", config.base_job_prefix))?;
    let service = LocalExecutionService::new(Arc::new(runner), artifact_root);
    let overrides: HashMap<_, _> = cmd.params.iter().cloned().collect();

    for run in 1..=cmd.runs {
        let handle = service
            .submit(graph, overrides.clone())
            .await
            .with_context(|| format!("Submission {run} was rejected"))?;
        let report = service.describe(&handle).await?;
        info!(run, execution = %handle, status = ?report.status, "simulated execution");
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
