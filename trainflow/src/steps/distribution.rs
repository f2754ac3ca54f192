//! Distribution mode selection for training jobs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How the training framework spreads work across hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionConfig {
    /// No distributed launcher.
    Disabled,
    /// Message-passing launcher.
    Mpi {
        /// Worker processes started on each host.
        processes_per_host: u32,
    },
}

impl DistributionConfig {
    /// Returns true if a distributed launcher is used.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Mpi { .. })
    }

    /// Renders the framework-level distribution document.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Disabled => serde_json::json!({"parameter_server": {"enabled": false}}),
            Self::Mpi { processes_per_host } => serde_json::json!({
                "mpi": {"enabled": true, "processes_per_host": processes_per_host}
            }),
        }
    }

    /// Hyperparameters the launcher reads inside the training container.
    #[must_use]
    pub fn launcher_hyperparameters(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        match self {
            Self::Disabled => {
                params.insert("sagemaker_parameter_server_enabled".to_string(), "false".to_string());
            }
            Self::Mpi { processes_per_host } => {
                params.insert("sagemaker_mpi_enabled".to_string(), "true".to_string());
                params.insert(
                    "sagemaker_mpi_num_of_processes_per_host".to_string(),
                    processes_per_host.to_string(),
                );
            }
        }
        params
    }
}

/// How a training channel's data is split across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum S3DataDistribution {
    /// Every worker receives the whole dataset.
    FullyReplicated,
    /// Each worker receives a disjoint shard keyed by object.
    ShardedByS3Key,
}

impl fmt::Display for S3DataDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullyReplicated => write!(f, "FullyReplicated"),
            Self::ShardedByS3Key => write!(f, "ShardedByS3Key"),
        }
    }
}

/// The launcher and data split chosen for one training step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionPlan {
    /// Launcher configuration passed to the training step.
    pub distribution: DistributionConfig,
    /// Data split applied to every training channel.
    pub data_distribution: S3DataDistribution,
}

/// Selects the distribution plan for a configured instance count.
///
/// More than one instance runs one MPI process per host over sharded data;
/// anything else runs without a launcher over fully replicated data.
#[must_use]
pub fn select_distribution(instance_count: i64) -> DistributionPlan {
    if instance_count > 1 {
        DistributionPlan {
            distribution: DistributionConfig::Mpi { processes_per_host: 1 },
            data_distribution: S3DataDistribution::ShardedByS3Key,
        }
    } else {
        DistributionPlan {
            distribution: DistributionConfig::Disabled,
            data_distribution: S3DataDistribution::FullyReplicated,
        }
    }
}
