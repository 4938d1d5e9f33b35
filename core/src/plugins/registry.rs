use super::{PluginAction, TransitionAction, Validator};
use std::collections::HashMap;
use std::sync::Arc;

pub type ValidatorFactory = Arc<dyn Fn() -> Arc<dyn Validator> + Send + Sync>;
pub type TransitionActionFactory = Arc<dyn Fn() -> Arc<dyn TransitionAction> + Send + Sync>;
pub type PluginActionFactory = Arc<dyn Fn() -> Arc<dyn PluginAction> + Send + Sync>;

/// Name to factory lookup for every plugin capability.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    validators: HashMap<String, ValidatorFactory>,
    transition_actions: HashMap<String, TransitionActionFactory>,
    plugin_actions: HashMap<String, PluginActionFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtins(&mut registry);
        registry
    }

    pub fn register_validator<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Validator> + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .validators
            .insert(name.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::warn!("Validator '{}' already registered - replaced", name);
        }
    }

    pub fn register_transition_action<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn TransitionAction> + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .transition_actions
            .insert(name.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::warn!("Transition action '{}' already registered - replaced", name);
        }
    }

    pub fn register_plugin_action<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn PluginAction> + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .plugin_actions
            .insert(name.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::warn!("Plugin action '{}' already registered - replaced", name);
        }
    }

    pub fn validator(&self, name: &str) -> Option<Arc<dyn Validator>> {
        self.validators.get(name).map(|factory| factory())
    }

    pub fn transition_action(&self, name: &str) -> Option<Arc<dyn TransitionAction>> {
        self.transition_actions.get(name).map(|factory| factory())
    }

    pub fn plugin_action(&self, name: &str) -> Option<Arc<dyn PluginAction>> {
        self.plugin_actions.get(name).map(|factory| factory())
    }

    pub fn validator_names(&self) -> Vec<String> {
        sorted_names(&self.validators)
    }

    pub fn transition_action_names(&self) -> Vec<String> {
        sorted_names(&self.transition_actions)
    }

    pub fn plugin_action_names(&self) -> Vec<String> {
        sorted_names(&self.plugin_actions)
    }
}

fn sorted_names<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort();
    names
}
