//! Flows: named, ordered sequences of template references.

use serde::{Deserialize, Serialize};

/// A reference to a request template by name.
///
/// Steps are not copies: renaming or deleting a template leaves the step
/// dangling, which makes the flow non-execable until it is edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepRef {
    /// Name of the referenced template.
    pub template: String,
}

impl StepRef {
    /// Creates a reference to the named template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl From<&str> for StepRef {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<String> for StepRef {
    fn from(template: String) -> Self {
        Self::new(template)
    }
}

/// A named, ordered sequence of steps executed one after another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    /// Unique (case-insensitive) flow name.
    pub name: String,

    /// Steps, densely indexed from 0.
    #[serde(default)]
    pub steps: Vec<StepRef>,
}

impl Flow {
    /// Creates a flow from template names.
    pub fn new<I, S>(name: impl Into<String>, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            steps: templates.into_iter().map(StepRef::new).collect(),
        }
    }

    /// Names of the referenced templates, in step order.
    pub fn template_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.template.as_str()).collect()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Checks if the flow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_new() {
        let flow = Flow::new("checkout", ["login", "add-item", "pay"]);
        assert_eq!(flow.len(), 3);
        assert_eq!(flow.template_names(), vec!["login", "add-item", "pay"]);
    }

    #[test]
    fn test_steps_serialize_as_names() {
        let flow = Flow::new("f", ["a", "b"]);
        let json = serde_json::to_string(&flow).unwrap();
        assert_eq!(json, r#"{"name":"f","steps":["a","b"]}"#);

        let restored: Flow = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, flow);
    }
}
