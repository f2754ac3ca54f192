//! Assertions over built graphs and execution reports.

use std::collections::HashSet;

use crate::execution::{BranchOutcome, ExecutionReport, StepStatus};
use crate::pipeline::PipelineGraph;

/// Asserts that every reference names an earlier step and a slot it declares.
pub fn assert_no_dangling_references(graph: &PipelineGraph) {
    let steps = graph.all_steps();
    for (position, consumer) in steps.iter().enumerate() {
        for reference in consumer.references() {
            let producer = steps[..position]
                .iter()
                .find(|step| step.name() == reference.step());
            assert!(
                producer.is_some(),
                "Step '{}' references '{}', which is not an earlier step",
                consumer.name(),
                reference
            );
            assert!(
                producer.is_some_and(|step| step.has_slot(reference.slot())),
                "Step '{}' references '{}', which its producer does not declare",
                consumer.name(),
                reference
            );
        }
    }
}

/// Asserts that parameter names and step names (nested included) are unique.
pub fn assert_unique_names(graph: &PipelineGraph) {
    let mut seen = HashSet::new();
    for parameter in graph.parameters() {
        assert!(
            seen.insert(parameter.name()),
            "Duplicate parameter name '{}'",
            parameter.name()
        );
    }

    let mut seen = HashSet::new();
    for step in graph.all_steps() {
        assert!(seen.insert(step.name()), "Duplicate step name '{}'", step.name());
    }
}

/// Asserts the exact top-level step order.
pub fn assert_step_order(graph: &PipelineGraph, expected: &[&str]) {
    assert_eq!(
        graph.step_names(),
        expected,
        "Unexpected top-level step order"
    );
}

/// Asserts that the step ran its job.
pub fn assert_executed(report: &ExecutionReport, step: &str) {
    let status = report.step(step).map(|record| &record.status);
    assert_eq!(
        status,
        Some(&StepStatus::Executed),
        "Expected '{step}' to execute, got {status:?}"
    );
}

/// Asserts that the step was replayed from cache.
pub fn assert_cache_hit(report: &ExecutionReport, step: &str) {
    let status = report.step(step).map(|record| &record.status);
    assert_eq!(
        status,
        Some(&StepStatus::CacheHit),
        "Expected '{step}' to be a cache hit, got {status:?}"
    );
}

/// Asserts that a model was published in the group.
pub fn assert_registered(report: &ExecutionReport, group: &str) {
    assert!(
        report
            .registered_models
            .iter()
            .any(|model| model.model_package_group_name == group),
        "Expected a model registered in '{group}', got {:?}",
        report.registered_models
    );
}

/// Asserts that the condition step took an empty arm.
pub fn assert_stopped(report: &ExecutionReport, condition: &str) {
    let outcome = report.condition(condition).map(|outcome| &outcome.branch);
    assert_eq!(
        outcome,
        Some(&BranchOutcome::Stopped),
        "Expected '{condition}' to stop, got {outcome:?}"
    );
}
