//! Deferred references to outputs of other steps.
//!
//! A [`PropertyReference`] carries no value at construction time. It names a
//! producing step, one of that step's output slots and optionally a field
//! path inside a structured report. Only the execution service resolves it,
//! after the producing step has run.

mod property_file;
mod reference;
mod source;

pub use property_file::{lookup_json_path, PropertyFile};
pub use reference::{OutputSlot, PropertyReference};
pub use source::Source;
