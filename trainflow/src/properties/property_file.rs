//! Property files: structured reports addressable by field path.

use serde::{Deserialize, Serialize};

/// Declares that a processing output contains a JSON report whose fields
/// later steps may read without knowing its schema at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFile {
    /// Name used to address the report.
    pub name: String,
    /// The processing output the report is written to.
    pub output_name: String,
    /// File path of the report, relative to the output.
    pub path: String,
}

impl PropertyFile {
    /// Creates a property file declaration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        output_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            output_name: output_name.into(),
            path: path.into(),
        }
    }

    /// Renders the declaration as it appears in a pipeline definition.
    #[must_use]
    pub fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "PropertyFileName": self.name,
            "OutputName": self.output_name,
            "FilePath": self.path,
        })
    }
}

/// Looks up a dotted field path such as `a.b[0].c` in a JSON document.
#[must_use]
pub fn lookup_json_path<'a>(document: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = document;
    for segment in path.split('.') {
        let (field, indexes) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };
        if !field.is_empty() {
            current = current.get(field)?;
        }
        for index in indexes.split('[').filter(|s| !s.is_empty()) {
            let index: usize = index.strip_suffix(']')?.parse().ok()?;
            current = current.get(index)?;
        }
    }
    Some(current)
}
