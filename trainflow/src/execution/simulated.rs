//! A job runner that fakes job work in memory.

use super::runner::{JobError, JobRequest, JobResult, JobRunner};
use crate::core::StepKind;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

const DEFAULT_ACCURACY: f64 = 0.87;
const DEFAULT_EPOCHS: u32 = 3;

/// Stands in for the managed service when running pipelines locally.
///
/// Training jobs print Keras-style progress lines. Jobs that declare
/// property files write an evaluation report with the configured accuracy
/// to each property file location.
#[derive(Debug)]
pub struct SimulatedJobRunner {
    accuracy: f64,
    epochs: u32,
    failing: HashSet<String>,
    invocations: Mutex<HashMap<String, usize>>,
}

impl Default for SimulatedJobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedJobRunner {
    /// Creates a runner reporting the default accuracy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            accuracy: DEFAULT_ACCURACY,
            epochs: DEFAULT_EPOCHS,
            failing: HashSet::new(),
            invocations: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the accuracy written to evaluation reports.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Sets how many epochs training jobs log.
    #[must_use]
    pub fn with_epochs(mut self, epochs: u32) -> Self {
        self.epochs = epochs.max(1);
        self
    }

    /// Makes every job of the named step fail.
    #[must_use]
    pub fn failing_on(mut self, step: impl Into<String>) -> Self {
        self.failing.insert(step.into());
        self
    }

    /// How many times jobs of a step were launched.
    #[must_use]
    pub fn invocations(&self, step: &str) -> usize {
        self.invocations.lock().get(step).copied().unwrap_or(0)
    }

    /// How many jobs were launched in total.
    #[must_use]
    pub fn total_invocations(&self) -> usize {
        self.invocations.lock().values().sum()
    }

    fn training_logs(&self) -> Vec<String> {
        (1..=self.epochs)
            .map(|epoch| {
                let progress = f64::from(epoch) / f64::from(self.epochs);
                let accuracy = self.accuracy * progress;
                let loss = 1.0 - accuracy;
                format!(
                    "Epoch {epoch}/{total} - loss: {loss:.4} - accuracy: {accuracy:.4} - \
                     val_loss: {val_loss:.4} - val_accuracy: {val_accuracy:.4}",
                    total = self.epochs,
                    val_loss = loss + 0.02,
                    val_accuracy = accuracy - 0.01,
                )
            })
            .collect()
    }

    fn evaluation_report(&self) -> serde_json::Value {
        serde_json::json!({
            "multiclass_classification_metrics": {
                "accuracy": {
                    "value": self.accuracy,
                    "standard_deviation": "NaN",
                },
            },
        })
    }
}

#[async_trait]
impl JobRunner for SimulatedJobRunner {
    async fn run(&self, request: &JobRequest) -> Result<JobResult, JobError> {
        *self
            .invocations
            .lock()
            .entry(request.step_name.clone())
            .or_insert(0) += 1;

        if self.failing.contains(&request.step_name) {
            return Err(JobError::new(&request.step_name, "simulated job failure"));
        }

        let mut result = JobResult::default();
        if request.kind == StepKind::Training {
            for line in self.training_logs() {
                result = result.with_log(line);
            }
        }
        for location in request.property_files.values() {
            result = result.with_document(location, self.evaluation_report());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::MetricDefinition;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn request(step: &str, kind: StepKind) -> JobRequest {
        JobRequest {
            execution_id: Uuid::new_v4(),
            step_name: step.to_string(),
            kind,
            arguments: serde_json::json!({}),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            property_files: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_training_logs_are_scrapable() {
        let runner = SimulatedJobRunner::new().with_accuracy(0.9).with_epochs(2);
        let result = runner.run(&request("Train", StepKind::Training)).await.unwrap();

        assert_eq!(result.logs.len(), 2);
        let accuracy = MetricDefinition::new("accuracy", r"accuracy: ([0-9\.]+)").unwrap();
        let last = result.logs.iter().filter_map(|l| accuracy.scrape(l)).last();
        assert_eq!(last, Some(0.9));
    }

    #[tokio::test]
    async fn test_writes_evaluation_report() {
        let runner = SimulatedJobRunner::new().with_accuracy(0.75);
        let mut req = request("Evaluate", StepKind::Processing);
        req.property_files
            .insert("EvaluationReport".to_string(), "s3://b/eval/evaluation.json".to_string());

        let result = runner.run(&req).await.unwrap();
        let document = &result.documents["s3://b/eval/evaluation.json"];
        assert_eq!(
            document["multiclass_classification_metrics"]["accuracy"]["value"],
            serde_json::json!(0.75)
        );
    }

    #[tokio::test]
    async fn test_failing_step_counts_invocation() {
        let runner = SimulatedJobRunner::new().failing_on("Train");

        let err = runner.run(&request("Train", StepKind::Training)).await.unwrap_err();
        assert_eq!(err.step, "Train");
        assert_eq!(runner.invocations("Train"), 1);
        assert_eq!(runner.total_invocations(), 1);
    }
}
