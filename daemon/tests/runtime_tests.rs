// Daemon wiring tests: services built from a configuration file.

use quill_core::{
    ConfigManager, ContentItem, ContentStore, JobRequest, StaticIdentity, StorageBackend, User,
};
use quill_daemon::Services;
use tempfile::TempDir;
use uuid::Uuid;

const WORKFLOW: &str = r#"
[scheduler]
system_user = { id = "system", name = "System", roles = ["editor"] }

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
id = "auto_publish"
from_state = "draft"
to_state = "published"
valid_for = ["editor"]

[[outlets]]
id = "daily"
workflow = "news"

[[actions]]
id = "publish_now"
plugin = "execute_workflow_step"
properties = { step = ["auto_publish"] }
"#;

fn write_config(dir: &TempDir, storage: &str) -> ConfigManager {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, format!("{}\n{}", storage, WORKFLOW)).unwrap();
    let manager = ConfigManager::load(Some(&path)).unwrap();
    manager.validate().unwrap();
    manager
}

fn reporter() -> User {
    User::new("ann", "Ann").with_role("reporter")
}

/// Create a draft and let a queued job publish it.
async fn publish_via_job_queue(services: &Services) -> Uuid {
    let item = ContentItem::article("daily", "Scheduled story", "Goes out by itself.")
        .with_actor(&reporter(), "reporter");
    let item = services
        .facade
        .create(&item, &StaticIdentity::new(reporter()))
        .await
        .unwrap();
    let id = item.id.unwrap();

    services
        .scheduler
        .enqueue(JobRequest::new("publish_now", item.kind_name(), id))
        .await
        .unwrap();

    let (jobs, index) = services.drain_once().await.unwrap();
    assert_eq!(jobs.completed, 1);
    assert_eq!(index.indexed, 1);
    id
}

#[tokio::test]
async fn test_memory_backend_runs_queued_step() {
    let dir = TempDir::new().unwrap();
    let manager = write_config(&dir, "");
    assert_eq!(manager.config().storage.backend, StorageBackend::Memory);

    let services = Services::build(manager.config()).await.unwrap();
    let id = publish_via_job_queue(&services).await;

    let stored = services.content.find_by_id(&id).await.unwrap();
    assert_eq!(stored.current_state.as_deref(), Some("published"));
    assert_eq!(stored.last_transition().unwrap().user_id, "system");

    let doc = services.search.document(&id).unwrap();
    assert_eq!(doc.title, "Scheduled story");
    services.close().await;
}

#[tokio::test]
async fn test_sqlite_backend_persists_to_configured_file() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("db").join("quill.db");
    let storage = format!(
        "[storage]\nbackend = \"sqlite\"\ndatabase_path = {:?}\npool_size = 2\n",
        db.to_string_lossy()
    );
    let manager = write_config(&dir, &storage);

    let id = {
        let services = Services::build(manager.config()).await.unwrap();
        let id = publish_via_job_queue(&services).await;
        services.close().await;
        id
    };
    assert!(db.exists());

    let services = Services::build(manager.config()).await.unwrap();
    let stored = services.content.find_by_id(&id).await.unwrap();
    assert_eq!(stored.current_state.as_deref(), Some("published"));
    assert_eq!(stored.history.len(), 2);

    // Nothing left to do after a restart.
    let (jobs, index) = services.drain_once().await.unwrap();
    assert_eq!(jobs.executed, 0);
    assert_eq!(index.processed(), 0);
    services.close().await;
}
