//! Layered variable store.
//!
//! Variables live in four scopes. Lookups walk them from highest to lowest
//! precedence and return the first hit:
//!
//! 1. [`Scope::Override`] - one-time values given for a single send or run
//! 2. [`Scope::FlowRun`] - values captured so far in the current flow run
//! 3. [`Scope::Environment`] - the persisted variables of the current environment
//! 4. [`Scope::Default`] - the persisted default environment
//!
//! Only the two environment scopes are serialized with the project; overrides and
//! flow-run captures exist for the lifetime of one command.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Name of the default environment. Environment names are stored upper-cased,
/// so this can never collide with a user environment.
pub const DEFAULT_ENV: &str = "";

/// One precedence layer of the [`VarStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One-time values for the current send or run only.
    Override,
    /// Values captured from responses during the current flow run.
    FlowRun,
    /// Persisted variables of the current environment.
    Environment,
    /// Persisted variables of the default environment.
    Default,
}

impl Scope {
    /// All scopes, highest precedence first.
    pub const PRECEDENCE: [Scope; 4] = [
        Scope::Override,
        Scope::FlowRun,
        Scope::Environment,
        Scope::Default,
    ];
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Scope::Override => "override",
            Scope::FlowRun => "flow-run",
            Scope::Environment => "environment",
            Scope::Default => "default",
        };
        f.write_str(name)
    }
}

/// Normalizes an environment name for storage and lookup.
pub fn normalize_env_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Variable store with scoped override semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarStore {
    /// Persisted environments keyed by upper-cased name; [`DEFAULT_ENV`] is the default.
    #[serde(default)]
    environments: BTreeMap<String, BTreeMap<String, String>>,

    /// Name of the current environment.
    #[serde(default)]
    current: String,

    #[serde(skip)]
    overrides: HashMap<String, String>,

    #[serde(skip)]
    flow_run: HashMap<String, String>,
}

impl VarStore {
    /// Creates an empty store whose current environment is the default one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a variable, scanning scopes in precedence order.
    ///
    /// Returns `None` when the name is unset everywhere. An empty string is a
    /// value like any other and is returned as `Some("")`.
    pub fn get(&self, name: &str) -> Option<&str> {
        Scope::PRECEDENCE
            .iter()
            .find_map(|scope| self.get_in(*scope, name))
    }

    /// Looks a variable up in exactly one scope.
    pub fn get_in(&self, scope: Scope, name: &str) -> Option<&str> {
        match scope {
            Scope::Override => self.overrides.get(name).map(String::as_str),
            Scope::FlowRun => self.flow_run.get(name).map(String::as_str),
            Scope::Environment => {
                if self.current == DEFAULT_ENV {
                    return None;
                }
                self.environments
                    .get(&self.current)
                    .and_then(|vars| vars.get(name))
                    .map(String::as_str)
            }
            Scope::Default => self
                .environments
                .get(DEFAULT_ENV)
                .and_then(|vars| vars.get(name))
                .map(String::as_str),
        }
    }

    /// Writes a value into one scope without touching the others.
    ///
    /// Writing to [`Scope::Environment`] while the default environment is current
    /// writes the default environment.
    pub fn set(&mut self, scope: Scope, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        match scope {
            Scope::Override => {
                self.overrides.insert(name, value);
            }
            Scope::FlowRun => {
                self.flow_run.insert(name, value);
            }
            Scope::Environment => {
                let env = self.current.clone();
                self.environments.entry(env).or_default().insert(name, value);
            }
            Scope::Default => {
                self.environments
                    .entry(DEFAULT_ENV.to_string())
                    .or_default()
                    .insert(name, value);
            }
        }
    }

    /// Removes a value from one scope, returning the old value.
    pub fn unset(&mut self, scope: Scope, name: &str) -> Option<String> {
        match scope {
            Scope::Override => self.overrides.remove(name),
            Scope::FlowRun => self.flow_run.remove(name),
            Scope::Environment => {
                let current = self.current.clone();
                let removed = self
                    .environments
                    .get_mut(&current)
                    .and_then(|vars| vars.remove(name));
                self.drop_empty_env(&current);
                removed
            }
            Scope::Default => self
                .environments
                .get_mut(DEFAULT_ENV)
                .and_then(|vars| vars.remove(name)),
        }
    }

    /// Removes every value from one scope.
    pub fn clear(&mut self, scope: Scope) {
        match scope {
            Scope::Override => self.overrides.clear(),
            Scope::FlowRun => self.flow_run.clear(),
            Scope::Environment => {
                let current = self.current.clone();
                self.environments.remove(&current);
            }
            Scope::Default => {
                self.environments.remove(DEFAULT_ENV);
            }
        }
    }

    /// Replaces the override scope with the given values.
    pub fn set_overrides(&mut self, overrides: HashMap<String, String>) {
        self.overrides = overrides;
    }

    /// Produces an immutable view of every visible variable at current precedence.
    pub fn snapshot(&self) -> VarSnapshot {
        let mut values = HashMap::new();
        for scope in Scope::PRECEDENCE.iter().rev() {
            for (name, value) in self.values_in(*scope) {
                values.insert(name.to_string(), value.to_string());
            }
        }
        VarSnapshot { values }
    }

    /// Returns all values of one scope, sorted by name.
    pub fn values_in(&self, scope: Scope) -> BTreeMap<&str, &str> {
        let iter: Box<dyn Iterator<Item = (&String, &String)>> = match scope {
            Scope::Override => Box::new(self.overrides.iter()),
            Scope::FlowRun => Box::new(self.flow_run.iter()),
            Scope::Environment if self.current == DEFAULT_ENV => Box::new(std::iter::empty()),
            Scope::Environment => match self.environments.get(&self.current) {
                Some(vars) => Box::new(vars.iter()),
                None => Box::new(std::iter::empty()),
            },
            Scope::Default => match self.environments.get(DEFAULT_ENV) {
                Some(vars) => Box::new(vars.iter()),
                None => Box::new(std::iter::empty()),
            },
        };
        iter.map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    /// Name of the current environment; empty for the default environment.
    pub fn current_environment(&self) -> &str {
        &self.current
    }

    /// Switches the current environment. An empty name selects the default.
    ///
    /// Environments spring into existence when their first variable is set, so
    /// switching to an unknown name is allowed.
    pub fn use_environment(&mut self, name: &str) {
        self.current = normalize_env_name(name);
    }

    /// Lists the names of all non-default environments holding variables.
    pub fn environment_names(&self) -> Vec<String> {
        self.environments
            .keys()
            .filter(|name| name.as_str() != DEFAULT_ENV)
            .cloned()
            .collect()
    }

    /// Removes an environment entry if it no longer holds variables.
    fn drop_empty_env(&mut self, name: &str) {
        if self.environments.get(name).is_some_and(|vars| vars.is_empty()) {
            self.environments.remove(name);
        }
    }
}

/// Immutable resolved view of a [`VarStore`] used for one render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarSnapshot {
    values: HashMap<String, String>,
}

impl VarSnapshot {
    /// Resolves a variable from the snapshot.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Checks if a variable is visible in the snapshot.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of visible variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Checks if no variables are visible.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<HashMap<String, String>> for VarSnapshot {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VarSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
