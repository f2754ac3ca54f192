//! Profiling and debugging configuration for training jobs.

use serde::{Deserialize, Serialize};

/// A window of training steps to profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingWindow {
    /// First profiled step.
    pub start_step: u32,
    /// Number of profiled steps.
    pub num_steps: u32,
}

impl ProfilingWindow {
    /// Creates a profiling window.
    #[must_use]
    pub fn new(start_step: u32, num_steps: u32) -> Self {
        Self { start_step, num_steps }
    }

    fn encoded(self, extra: &[(&str, &str)]) -> String {
        let mut doc = serde_json::json!({
            "StartStep": self.start_step,
            "NumSteps": self.num_steps,
        });
        for (key, value) in extra {
            doc[*key] = serde_json::Value::String((*value).to_string());
        }
        doc.to_string()
    }
}

/// Python profiler implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PythonProfiler {
    /// Built-in `cProfile`.
    CProfile,
    /// `pyinstrument`.
    Pyinstrument,
}

impl PythonProfiler {
    fn as_str(self) -> &'static str {
        match self {
            Self::CProfile => "cprofile",
            Self::Pyinstrument => "pyinstrument",
        }
    }
}

/// Timer used by `cProfile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CProfileTimer {
    /// Wall clock time.
    TotalTime,
    /// CPU time.
    CpuTime,
    /// Time spent off CPU.
    OffCpuTime,
}

impl CProfileTimer {
    fn as_str(self) -> &'static str {
        match self {
            Self::TotalTime => "total_time",
            Self::CpuTime => "cpu_time",
            Self::OffCpuTime => "off_cpu_time",
        }
    }
}

/// Python profiling window with its profiler choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonProfilingWindow {
    /// Profiled steps.
    pub window: ProfilingWindow,
    /// Profiler implementation.
    pub profiler: PythonProfiler,
    /// Timer, only meaningful for `cProfile`.
    pub cprofile_timer: Option<CProfileTimer>,
}

/// Phased framework profiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkProfile {
    /// Detailed (operator-level) profiling.
    pub detailed: Option<ProfilingWindow>,
    /// Data loader profiling.
    pub dataloader: Option<ProfilingWindow>,
    /// Python profiling.
    pub python: Option<PythonProfilingWindow>,
}

/// System monitoring and framework profiling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// System monitor sampling interval.
    pub system_monitor_interval_millis: u64,
    /// Framework profiling phases.
    pub framework: Option<FrameworkProfile>,
}

impl ProfilerConfig {
    /// Renders the profiler configuration for a training job definition.
    #[must_use]
    pub fn to_definition(&self) -> serde_json::Value {
        let mut params = serde_json::Map::new();
        if let Some(framework) = &self.framework {
            if let Some(window) = framework.detailed {
                params.insert("DetailedProfilingConfig".into(), window.encoded(&[]).into());
            }
            if let Some(window) = framework.dataloader {
                params.insert("DataloaderProfilingConfig".into(), window.encoded(&[]).into());
            }
            if let Some(python) = framework.python {
                let mut extra = vec![("ProfilerName", python.profiler.as_str())];
                if let Some(timer) = python.cprofile_timer {
                    extra.push(("cProfileTimer", timer.as_str()));
                }
                params.insert(
                    "PythonProfilingConfig".into(),
                    python.window.encoded(&extra).into(),
                );
            }
        }
        serde_json::json!({
            "ProfilingIntervalInMilliseconds": self.system_monitor_interval_millis,
            "ProfilingParameters": params,
        })
    }
}

/// A named tensor collection saved by the debugger hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name, e.g. `weights`.
    pub name: String,
}

impl CollectionConfig {
    /// Creates a collection config.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Tensor collection hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerHookConfig {
    /// Collections to save.
    pub collections: Vec<CollectionConfig>,
}

impl DebuggerHookConfig {
    /// Creates a hook config saving the named collections.
    #[must_use]
    pub fn collecting(names: &[&str]) -> Self {
        Self {
            collections: names.iter().map(|name| CollectionConfig::new(*name)).collect(),
        }
    }

    /// Renders the hook configuration for a training job definition.
    #[must_use]
    pub fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "CollectionConfigurations": self
                .collections
                .iter()
                .map(|c| serde_json::json!({"CollectionName": c.name}))
                .collect::<Vec<_>>(),
        })
    }
}

/// Built-in analysis rules evaluated alongside a training job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    /// Aggregated profiling report.
    ProfilerReport,
    /// Flags a loss that stops decreasing.
    LossNotDecreasing,
    /// Flags vanishing gradients.
    VanishingGradient,
    /// Flags overfitting.
    Overfit,
}

impl Rule {
    /// Rule name as known to the execution service.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ProfilerReport => "ProfilerReport",
            Self::LossNotDecreasing => "LossNotDecreasing",
            Self::VanishingGradient => "VanishingGradient",
            Self::Overfit => "Overfit",
        }
    }

    /// Returns true for rules fed by profiler data rather than tensors.
    #[must_use]
    pub fn is_profiler_rule(self) -> bool {
        matches!(self, Self::ProfilerReport)
    }

    /// Renders the rule configuration.
    #[must_use]
    pub fn to_definition(self) -> serde_json::Value {
        serde_json::json!({
            "RuleConfigurationName": self.name(),
            "RuleParameters": {"rule_to_invoke": self.name()},
        })
    }
}
