//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use trainflow::core::Value;
use trainflow::observability::LogFormat;

/// Build, inspect and locally simulate the bird-classification training pipeline
#[derive(Debug, Parser, Clone)]
#[command(name = "trainflow")]
#[command(version)]
#[command(about = "Declarative training pipeline builder", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Log output format (human or json)
    #[arg(long, global = true, env = "TRAINFLOW_LOG_FORMAT", default_value_t = LogFormat::Human)]
    pub log_format: LogFormat,
}

/// Where and as whom the pipeline is built.
#[derive(Debug, Args, Clone)]
pub struct SessionArgs {
    /// JSON pipeline configuration file
    #[arg(short, long, global = true, env = "TRAINFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Region, overriding the configuration file
    #[arg(long, global = true, env = "TRAINFLOW_REGION")]
    pub region: Option<String>,

    /// Execution role, overriding the ambient role
    #[arg(long, global = true, env = "TRAINFLOW_ROLE")]
    pub role: Option<String>,

    /// Ambient execution role of the session
    #[arg(long, global = true, env = "TRAINFLOW_AMBIENT_ROLE")]
    pub ambient_role: Option<String>,

    /// Account id of the session
    #[arg(long, global = true, env = "TRAINFLOW_ACCOUNT_ID", default_value = "000000000000")]
    pub account_id: String,

    /// Artifact bucket
    #[arg(long, global = true, env = "TRAINFLOW_BUCKET")]
    pub bucket: Option<String>,

    /// Directory holding preprocess.py, evaluation.py and code/train_debugger.py
    #[arg(long, global = true, env = "TRAINFLOW_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Default training instance count
    #[arg(long, global = true)]
    pub training_instance_count: Option<i64>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the pipeline definition document
    Definition(DefinitionCommand),

    /// Print the step tree and dependency edges
    Inspect,

    /// Run the pipeline on the local simulated execution service
    Simulate(SimulateCommand),
}

/// Print the pipeline definition
#[derive(Debug, Args, Clone)]
pub struct DefinitionCommand {
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Simulate executions
#[derive(Debug, Args, Clone)]
pub struct SimulateCommand {
    /// Accuracy the simulated evaluation reports
    #[arg(long, default_value_t = 0.87)]
    pub accuracy: f64,

    /// Number of consecutive submissions
    #[arg(long, default_value_t = 1)]
    pub runs: u32,

    /// Parameter overrides (NAME=VALUE)
    #[arg(short, long = "param", value_parser = parse_override)]
    pub params: Vec<(String, Value)>,

    /// Make jobs of this step fail
    #[arg(long)]
    pub fail_step: Option<String>,

    /// Write placeholder scripts into the base directory if missing
    #[arg(long)]
    pub scaffold_scripts: bool,
}

/// Parses `NAME=VALUE`, typing the value as integer, float, boolean or string.
fn parse_override(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }

    let value = if let Ok(int) = value.parse::<i64>() {
        Value::Integer(int)
    } else if let Ok(float) = value.parse::<f64>() {
        Value::Float(float)
    } else if let Ok(flag) = value.parse::<bool>() {
        Value::Bool(flag)
    } else {
        Value::String(value.to_string())
    };
    Ok((name.to_string(), value))
}
