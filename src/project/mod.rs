//! Projects: the unit of persisted state.
//!
//! A [`Project`] holds the request templates, the flows composed from them, the
//! persisted variables and the project settings. Template and flow names are
//! unique within a project, compared case-insensitively.

pub mod flow;
pub mod store;
pub mod template;

pub use flow::{Flow, StepRef};
pub use store::{FileProjectStore, MemoryProjectStore, ProjectStore, DEFAULT_PROJECT_FILE};
pub use template::RequestTemplate;

use crate::config::ProjectSettings;
use crate::history::HistoryError;
use crate::variables::{SubstitutionOptions, VarStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Name given to projects created without one.
pub const DEFAULT_PROJECT_NAME: &str = "Unnamed Project";

/// Kind of named item in a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Template,
    Flow,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Template => f.write_str("request template"),
            ItemKind::Flow => f.write_str("flow"),
        }
    }
}

/// Errors raised while editing, loading or saving a project.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("{0} name must not be empty")]
    EmptyName(ItemKind),

    #[error("{kind} {name:?} already exists")]
    DuplicateName { kind: ItemKind, name: String },

    #[error("no request template named {0:?}")]
    TemplateNotFound(String),

    #[error("no flow named {0:?}")]
    FlowNotFound(String),

    #[error("project file {} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("project file {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("no project loaded")]
    NoProject,

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project data in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Normalizes a template or flow name into its lookup key.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Items stored in a project under a unique name.
trait Named {
    fn name(&self) -> &str;
}

impl Named for RequestTemplate {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Flow {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Serializes a keyed map as a plain list of items, rebuilding the keys on load.
mod named_list {
    use super::{name_key, Named};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, T>(map: &BTreeMap<String, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Named,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        let mut map = BTreeMap::new();
        for item in items {
            let key = name_key(item.name());
            if key.is_empty() {
                return Err(D::Error::custom("item with an empty name"));
            }
            if map.contains_key(&key) {
                return Err(D::Error::custom(format!("duplicate name {:?}", item.name())));
            }
            map.insert(key, item);
        }
        Ok(map)
    }
}

/// A project: templates, flows, variables and settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Display name.
    pub name: String,

    #[serde(default, with = "named_list")]
    templates: BTreeMap<String, RequestTemplate>,

    #[serde(default, with = "named_list")]
    flows: BTreeMap<String, Flow>,

    /// Persisted variables and current environment.
    #[serde(default)]
    pub vars: VarStore,

    /// Project settings.
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT_NAME)
    }
}

impl Project {
    /// Creates an empty project with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            templates: BTreeMap::new(),
            flows: BTreeMap::new(),
            vars: VarStore::new(),
            settings: ProjectSettings::default(),
        }
    }

    /// Substitution options for this project's variable prefix.
    pub fn substitution_options(&self) -> SubstitutionOptions {
        SubstitutionOptions::new(self.settings.var_prefix.clone())
    }

    /// All templates, ordered by name.
    pub fn templates(&self) -> impl Iterator<Item = &RequestTemplate> {
        self.templates.values()
    }

    /// Looks up a template by name, ignoring case.
    pub fn template(&self, name: &str) -> Option<&RequestTemplate> {
        self.templates.get(&name_key(name))
    }

    /// Looks up a template for editing.
    pub fn template_mut(&mut self, name: &str) -> Option<&mut RequestTemplate> {
        self.templates.get_mut(&name_key(name))
    }

    /// Adds a template. Fails on an empty or already used name.
    pub fn add_template(&mut self, template: RequestTemplate) -> Result<(), ProjectError> {
        let key = name_key(&template.name);
        if key.is_empty() {
            return Err(ProjectError::EmptyName(ItemKind::Template));
        }
        if self.templates.contains_key(&key) {
            return Err(ProjectError::DuplicateName {
                kind: ItemKind::Template,
                name: template.name,
            });
        }
        self.templates.insert(key, template);
        Ok(())
    }

    /// Removes a template.
    ///
    /// Flows referring to it are left as they are and become non-execable.
    pub fn remove_template(&mut self, name: &str) -> Result<RequestTemplate, ProjectError> {
        self.templates
            .remove(&name_key(name))
            .ok_or_else(|| ProjectError::TemplateNotFound(name.to_string()))
    }

    /// All flows, ordered by name.
    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    /// Looks up a flow by name, ignoring case.
    pub fn flow(&self, name: &str) -> Option<&Flow> {
        self.flows.get(&name_key(name))
    }

    /// Looks up a flow for editing.
    pub fn flow_mut(&mut self, name: &str) -> Option<&mut Flow> {
        self.flows.get_mut(&name_key(name))
    }

    /// Adds a flow. Fails on an empty or already used name.
    pub fn add_flow(&mut self, flow: Flow) -> Result<(), ProjectError> {
        let key = name_key(&flow.name);
        if key.is_empty() {
            return Err(ProjectError::EmptyName(ItemKind::Flow));
        }
        if self.flows.contains_key(&key) {
            return Err(ProjectError::DuplicateName {
                kind: ItemKind::Flow,
                name: flow.name,
            });
        }
        self.flows.insert(key, flow);
        Ok(())
    }

    /// Removes a flow.
    pub fn remove_flow(&mut self, name: &str) -> Result<Flow, ProjectError> {
        self.flows
            .remove(&name_key(name))
            .ok_or_else(|| ProjectError::FlowNotFound(name.to_string()))
    }

    /// Renames a flow. Changing only the case of the name is allowed.
    pub fn rename_flow(&mut self, old: &str, new: &str) -> Result<(), ProjectError> {
        let old_key = name_key(old);
        let new_key = name_key(new);
        if new_key.is_empty() {
            return Err(ProjectError::EmptyName(ItemKind::Flow));
        }
        if !self.flows.contains_key(&old_key) {
            return Err(ProjectError::FlowNotFound(old.to_string()));
        }
        if new_key != old_key && self.flows.contains_key(&new_key) {
            return Err(ProjectError::DuplicateName {
                kind: ItemKind::Flow,
                name: new.to_string(),
            });
        }

        if let Some(mut flow) = self.flows.remove(&old_key) {
            flow.name = new.trim().to_string();
            self.flows.insert(new_key, flow);
        }
        Ok(())
    }

    /// Step templates of a flow that do not exist, in step order.
    pub fn missing_templates<'a>(&self, flow: &'a Flow) -> Vec<&'a str> {
        flow.steps
            .iter()
            .filter(|step| self.template(&step.template).is_none())
            .map(|step| step.template.as_str())
            .collect()
    }

    /// Checks if every step of a flow resolves to an existing template.
    pub fn is_execable(&self, flow: &Flow) -> bool {
        flow.steps
            .iter()
            .all(|step| self.template(&step.template).is_some())
    }
}
