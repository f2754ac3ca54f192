//! Pipeline graph assembly.
//!
//! This module provides:
//! - A validating builder that admits steps in dependency order
//! - The immutable graph and its static checks
//! - Definition rendering for the execution service

mod builder;
mod definition;
mod graph;
mod scope;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use definition::{PipelineDefinition, DEFINITION_VERSION};
pub use graph::{Edge, PipelineGraph};
