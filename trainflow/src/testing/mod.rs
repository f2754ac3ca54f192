//! Testing utilities for trainflow pipelines.
//!
//! This module provides:
//! - Fixtures for the workflow configuration and execution context
//! - Graph assertions (unique names, no dangling references)
//! - Execution report assertions

mod assertions;
mod fixtures;

pub use assertions::{
    assert_cache_hit, assert_executed, assert_no_dangling_references, assert_registered,
    assert_step_order, assert_stopped, assert_unique_names,
};
pub use fixtures::{
    execution_context, static_identity, workflow_config, write_scripts, TEST_ACCOUNT,
    TEST_REGION, TEST_ROLE,
};
