use serde::Serialize;

/// One input or output slot of a node kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInfo {
    pub id: usize,
    pub label: String,
}

/// Static description of a node kind: its slots and whether running it has
/// effects beyond producing outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchema {
    pub schema_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub inputs: Vec<SlotInfo>,
    pub outputs: Vec<SlotInfo>,
    pub has_side_effects: bool,
}

impl NodeSchema {
    /// Create a schema with no slots.
    pub fn new(schema_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            name: name.into(),
            category: "uncategorized".to_string(),
            description: String::new(),
            inputs: vec![],
            outputs: vec![],
            has_side_effects: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the input slots, numbered in the given order.
    pub fn with_inputs(mut self, labels: &[&str]) -> Self {
        self.inputs = slots(labels);
        self
    }

    /// Set the output slots, numbered in the given order.
    pub fn with_outputs(mut self, labels: &[&str]) -> Self {
        self.outputs = slots(labels);
        self
    }

    pub fn with_side_effects(mut self, side_effects: bool) -> Self {
        self.has_side_effects = side_effects;
        self
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}

fn slots(labels: &[&str]) -> Vec<SlotInfo> {
    labels
        .iter()
        .enumerate()
        .map(|(id, label)| SlotInfo {
            id,
            label: label.to_string(),
        })
        .collect()
}
