//! Core domain model types for trainflow.
//!
//! This module contains the building blocks shared by every step variant:
//! - Step kind enum
//! - Literal values
//! - Storage locations and local mount paths
//! - Cache scopes

mod cache;
mod kind;
mod location;
mod value;

pub use cache::CacheScope;
pub use kind::StepKind;
pub use location::{validate_mount_path, S3Uri};
pub use value::{Value, ValueKind};
