/// Workflow definitions: the configured graph of states and steps that a
/// content item moves through.
/// Definitions are configuration, loaded at start-up and shared read-only
/// (`Arc<WorkflowDefinition>`) between concurrent transitions.

use crate::errors::{WorkflowError, WorkflowResult};
use crate::identity::{Role, User};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Identifier of a workflow state.
pub type StateId = String;

/// Identifier of a workflow step.
pub type StepId = String;

/// Multi-valued plugin property map (`key -> [values]`).
pub type Properties = BTreeMap<String, Vec<String>>;

/// Who may act on an item sitting in a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// A specific actor in the state's role must already be attached
    User,

    /// Any member of the state's role may act
    Group,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::User => write!(f, "user"),
            Permission::Group => write!(f, "group"),
        }
    }
}

/// A state in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: StateId,

    #[serde(default)]
    pub name: String,

    /// Role responsible for items in this state
    pub actor_role: Role,

    pub permission: Permission,
}

impl WorkflowState {
    pub fn is_user_permission(&self) -> bool {
        self.permission == Permission::User
    }

    pub fn is_group_permission(&self) -> bool {
        self.permission == Permission::Group
    }
}

/// Reference to a validator or action plugin attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRef {
    /// Human readable label, used in logs
    #[serde(default)]
    pub label: String,

    /// Registry name of the plugin
    pub plugin: String,

    #[serde(default)]
    pub properties: Properties,
}

impl PluginRef {
    pub fn new(plugin: impl Into<String>) -> Self {
        let plugin = plugin.into();
        Self {
            label: plugin.clone(),
            plugin,
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// First value of a property, if set.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Label for log output.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.plugin
        } else {
            &self.label
        }
    }
}

/// An edge of the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,

    #[serde(default)]
    pub name: String,

    pub from_state: StateId,

    pub to_state: StateId,

    /// Roles allowed to take the step
    #[serde(default)]
    pub valid_for: BTreeSet<Role>,

    /// Any authenticated user may take the step
    #[serde(default)]
    pub valid_for_all: bool,

    /// Pre-commit checks, run in order
    #[serde(default)]
    pub validators: Vec<PluginRef>,

    /// Post-commit side effects, run in order
    #[serde(default)]
    pub actions: Vec<PluginRef>,

    /// Mark the resulting history record as a submission
    #[serde(default)]
    pub treat_as_submitted: bool,

    #[serde(default)]
    pub display_order: i32,
}

impl WorkflowStep {
    /// Whether `user` holds a role this step is valid for.
    pub fn permits(&self, user: &User) -> bool {
        self.valid_for_all || !self.valid_for.is_disjoint(&user.roles)
    }
}

/// A directed graph of states and steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub start_state: StateId,

    pub end_state: StateId,

    pub trash_state: StateId,

    #[serde(default)]
    pub states: Vec<WorkflowState>,

    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn state(&self, id: &str) -> Option<&WorkflowState> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn start(&self) -> WorkflowResult<&WorkflowState> {
        self.state(&self.start_state).ok_or_else(|| {
            WorkflowError::InvalidDefinition(format!(
                "start state {} missing from workflow {}",
                self.start_state, self.id
            ))
        })
    }

    /// Outgoing steps of a state, ordered by display order.
    pub fn next_steps(&self, state: &str) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> =
            self.steps.iter().filter(|s| s.from_state == state).collect();
        steps.sort_by_key(|s| s.display_order);
        steps
    }

    /// True for every state that is not the start, end or trash state.
    pub fn is_intermediate_state(&self, state: &str) -> bool {
        state != self.start_state && state != self.end_state && state != self.trash_state
    }

    pub fn is_end_state(&self, state: &str) -> bool {
        state == self.end_state
    }

    /// Check the graph is internally consistent.
    pub fn validate(&self) -> WorkflowResult<()> {
        let mut state_ids = HashSet::new();
        for state in &self.states {
            if !state_ids.insert(state.id.as_str()) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "workflow {}: duplicate state {}",
                    self.id, state.id
                )));
            }
        }

        for (label, id) in [
            ("start", &self.start_state),
            ("end", &self.end_state),
            ("trash", &self.trash_state),
        ] {
            if !state_ids.contains(id.as_str()) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "workflow {}: {} state {} is not defined",
                    self.id, label, id
                )));
            }
        }

        let mut step_ids = HashSet::new();
        for step in &self.steps {
            if !step_ids.insert(step.id.as_str()) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "workflow {}: duplicate step {}",
                    self.id, step.id
                )));
            }
            for endpoint in [&step.from_state, &step.to_state] {
                if !state_ids.contains(endpoint.as_str()) {
                    return Err(WorkflowError::InvalidDefinition(format!(
                        "workflow {}: step {} references unknown state {}",
                        self.id, step.id, endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}
