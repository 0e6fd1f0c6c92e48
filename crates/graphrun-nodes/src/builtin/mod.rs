//! Generic built-in node kinds.
//!
//! These cover plumbing (values, arithmetic, text, delays, logging) so graphs
//! can be exercised end to end without any domain-specific operators.

pub mod flow;
pub mod math;
pub mod text;
pub mod value;

use graphrun_core::error::NodeError;

/// Fetch input `slot`, failing with a message naming the slot label.
pub(crate) fn input<'a>(
    inputs: &'a [serde_json::Value],
    slot: usize,
    label: &str,
) -> Result<&'a serde_json::Value, NodeError> {
    inputs
        .get(slot)
        .ok_or_else(|| NodeError::failed(format!("missing input '{}'", label)))
}

/// Render a value as text: strings verbatim, everything else as JSON.
pub(crate) fn display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
