/// Configuration management for Quill.
/// Handles loading, parsing and validation of ~/.quill/config.toml
use crate::content::ContainerRef;
use crate::errors::{ConfigError, ConfigResult};
use crate::identity::User;
use crate::job_queue::{ActionConfiguration, DEFAULT_MAX_CHAIN_PASSES};
use crate::memory_store::{InMemoryActionCatalog, StaticWorkflowDirectory};
use crate::workflow::WorkflowDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuillConfig {
    /// Configuration file version
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Background drain settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Workflow definitions, referenced by id from outlets and catalogues
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,

    #[serde(default)]
    pub outlets: Vec<ContainerConfig>,

    #[serde(default)]
    pub catalogues: Vec<ContainerConfig>,

    /// Plugin action configurations for the job queue
    #[serde(default)]
    pub actions: Vec<ActionConfiguration>,
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
            workflows: Vec::new(),
            outlets: Vec::new(),
            catalogues: Vec::new(),
            actions: Vec::new(),
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl QuillConfig {
    /// Directory mapping every configured outlet and catalogue to its workflow.
    pub fn workflow_directory(&self) -> StaticWorkflowDirectory {
        let mut directory = StaticWorkflowDirectory::new();
        for workflow in &self.workflows {
            directory = directory.with_workflow(workflow.clone());
        }
        for outlet in &self.outlets {
            directory = directory.assign(ContainerRef::Outlet(outlet.id.clone()), &outlet.workflow);
        }
        for catalogue in &self.catalogues {
            directory = directory.assign(
                ContainerRef::Catalogue(catalogue.id.clone()),
                &catalogue.workflow,
            );
        }
        directory
    }

    pub fn action_catalog(&self) -> InMemoryActionCatalog {
        InMemoryActionCatalog::from_configs(self.actions.iter().cloned())
    }
}

/// Which store backs content and queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

/// Storage and persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite database file (sqlite backend only)
    #[serde(default = "default_db_path")]
    pub database_path: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_db_path() -> String {
    quill_home().join("quill.db").to_string_lossy().into_owned()
}

fn default_pool_size() -> u32 {
    5
}

/// Background drain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_job_queue_interval")]
    pub job_queue_interval_secs: u64,

    #[serde(default = "default_index_interval")]
    pub index_interval_secs: u64,

    /// Maximum follow-up passes per job queue drain
    #[serde(default = "default_max_chain_passes")]
    pub max_chain_passes: usize,

    /// User that automatic plugin actions run as
    #[serde(default = "default_system_user")]
    pub system_user: User,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_queue_interval_secs: default_job_queue_interval(),
            index_interval_secs: default_index_interval(),
            max_chain_passes: default_max_chain_passes(),
            system_user: default_system_user(),
        }
    }
}

fn default_job_queue_interval() -> u64 {
    60
}

fn default_index_interval() -> u64 {
    30
}

fn default_max_chain_passes() -> usize {
    DEFAULT_MAX_CHAIN_PASSES
}

fn default_system_user() -> User {
    User::new("system", "System")
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
    Pretty,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// An outlet or catalogue and the workflow it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Id of a configured workflow
    pub workflow: String,
}

/// Base directory for Quill's files (~/.quill).
pub fn quill_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quill")
}

/// Configuration manager
pub struct ConfigManager {
    config: QuillConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| quill_home().join("config.toml"));

        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            warn!("Config file not found at {:?}, using defaults", path);
            QuillConfig::default()
        };

        debug!("Configuration loaded successfully");
        Ok(ConfigManager {
            config,
            config_path: path,
        })
    }

    /// Wrap an already built configuration.
    pub fn from_config(config: QuillConfig, config_path: PathBuf) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub fn config(&self) -> &QuillConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut QuillConfig {
        &mut self.config
    }

    /// Save configuration to file
    pub fn save(&self) -> ConfigResult<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, content)?;

        info!("Configuration saved to {:?}", self.config_path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let config = &self.config;

        if config.storage.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "Database pool size must be greater than 0".to_string(),
            ));
        }
        if config.scheduler.job_queue_interval_secs == 0 || config.scheduler.index_interval_secs == 0
        {
            return Err(ConfigError::Invalid(
                "Drain intervals must be greater than 0".to_string(),
            ));
        }
        if config.scheduler.max_chain_passes == 0 {
            return Err(ConfigError::Invalid(
                "max_chain_passes must be greater than 0".to_string(),
            ));
        }

        let mut workflow_ids = HashSet::new();
        for workflow in &config.workflows {
            if !workflow_ids.insert(workflow.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate workflow id {}",
                    workflow.id
                )));
            }
            workflow
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        for (kind, containers) in [("outlet", &config.outlets), ("catalogue", &config.catalogues)] {
            for container in containers {
                if !workflow_ids.contains(container.workflow.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "{} {} references unknown workflow {}",
                        kind, container.id, container.workflow
                    )));
                }
            }
        }

        let action_ids: HashSet<&str> = config.actions.iter().map(|a| a.id.as_str()).collect();
        if action_ids.len() != config.actions.len() {
            return Err(ConfigError::Invalid("Duplicate action id".to_string()));
        }
        for action in &config.actions {
            for next in &action.on_complete {
                if !action_ids.contains(next.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "action {} chains to unknown action {}",
                        action.id, next
                    )));
                }
            }
        }

        if config.workflows.is_empty() {
            warn!("No workflows configured - content items cannot be started");
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Load configuration overrides from environment variables
    pub fn load_from_env(&mut self) -> ConfigResult<()> {
        if let Ok(path) = std::env::var("QUILL_DATABASE_PATH") {
            self.config.storage.database_path = path;
        }

        if let Ok(backend) = std::env::var("QUILL_STORAGE_BACKEND") {
            self.config.storage.backend = backend.parse().map_err(ConfigError::Invalid)?;
        }

        if let Ok(level) = std::env::var("QUILL_LOG_LEVEL") {
            self.config.logging.level = level;
        }

        debug!("Configuration overrides loaded from environment variables");
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = "1.0.0"

[storage]
backend = "sqlite"
database_path = "/tmp/quill-test.db"

[scheduler]
job_queue_interval_secs = 15

[[workflows]]
id = "news"
start_state = "draft"
end_state = "published"
trash_state = "trash"

[[workflows.states]]
id = "draft"
actor_role = "reporter"
permission = "group"

[[workflows.states]]
id = "published"
actor_role = "editor"
permission = "group"

[[workflows.states]]
id = "trash"
actor_role = "editor"
permission = "group"

[[workflows.steps]]
id = "publish"
from_state = "draft"
to_state = "published"
valid_for = ["editor"]

[[workflows.steps.validators]]
plugin = "minimum_word_count"
properties = { minimum = ["100"] }

[[outlets]]
id = "daily"
workflow = "news"

[[actions]]
id = "reindex"
plugin = "reindex"
on_complete = ["announce"]

[[actions]]
id = "announce"
plugin = "log_message"
properties = { message = ["published"] }
"#;

    fn manager(config: QuillConfig) -> ConfigManager {
        ConfigManager::from_config(config, PathBuf::from("/tmp/quill-test.toml"))
    }

    #[test]
    fn test_default_config() {
        let config = QuillConfig::default();
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.scheduler.job_queue_interval_secs, 60);
        assert_eq!(config.scheduler.index_interval_secs, 30);
        assert_eq!(config.scheduler.max_chain_passes, 10);
        assert_eq!(config.scheduler.system_user.id, "system");
        assert!(manager(config).validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config: QuillConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.scheduler.job_queue_interval_secs, 15);
        assert_eq!(config.scheduler.index_interval_secs, 30);
        assert_eq!(config.workflows[0].steps[0].validators[0].property("minimum"), Some("100"));
        assert_eq!(config.actions[0].on_complete, vec!["announce"]);
        assert!(manager(config).validate().is_ok());
    }

    #[tokio::test]
    async fn test_workflow_directory_from_config() {
        use crate::traits::WorkflowDirectory;
        let config: QuillConfig = toml::from_str(SAMPLE).unwrap();
        let directory = config.workflow_directory();
        let found = directory
            .workflow_for(&ContainerRef::Outlet("daily".to_string()))
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, "news");
    }

    #[test]
    fn test_validate_rejects_unknown_workflow() {
        let mut config: QuillConfig = toml::from_str(SAMPLE).unwrap();
        config.outlets[0].workflow = "missing".to_string();
        assert!(matches!(
            manager(config).validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_chain() {
        let mut config: QuillConfig = toml::from_str(SAMPLE).unwrap();
        config.actions[1].on_complete.push("nowhere".to_string());
        assert!(manager(config).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = QuillConfig::default();
        config.scheduler.index_interval_secs = 0;
        assert!(manager(config).validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config: QuillConfig = toml::from_str(SAMPLE).unwrap();
        ConfigManager::from_config(config, path.clone())
            .save()
            .unwrap();

        let loaded = ConfigManager::load(Some(&path)).unwrap();
        assert_eq!(loaded.config().workflows.len(), 1);
        assert_eq!(loaded.config().workflows[0].steps[0].id, "publish");
        assert_eq!(loaded.config().actions.len(), 2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(manager.config().workflows.is_empty());
    }
}
