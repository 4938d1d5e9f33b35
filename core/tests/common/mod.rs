#![allow(dead_code)]
// Shared fixtures for the integration tests.

use quill_core::{
    ActionConfiguration, ContainerRef, ContentFacade, ContentStore, IndexQueue, InMemoryActionCatalog,
    InMemorySearchIndex, InMemoryStore, JobScheduler, Permission, PluginContext, PluginRef,
    PluginRegistry, Role, StaticWorkflowDirectory, User, WorkflowDefinition, WorkflowEngine,
    WorkflowState, WorkflowStep,
};
use std::sync::Arc;

pub const OUTLET: &str = "daily";
pub const CATALOGUE: &str = "photos";

pub fn reporter() -> User {
    User::new("ann", "Ann Reporter").with_role("reporter")
}

pub fn editor() -> User {
    User::new("bob", "Bob Editor").with_role("editor")
}

pub fn publisher() -> User {
    User::new("cat", "Cat Publisher").with_role("publisher")
}

pub fn system_user() -> User {
    User::new("system", "System")
        .with_role("reporter")
        .with_role("editor")
        .with_role("publisher")
}

fn state(id: &str, role: &str, permission: Permission) -> WorkflowState {
    WorkflowState {
        id: id.to_string(),
        name: id.to_string(),
        actor_role: Role::new(role),
        permission,
    }
}

pub fn step(id: &str, from: &str, to: &str, roles: &[&str]) -> WorkflowStep {
    WorkflowStep {
        id: id.to_string(),
        name: id.to_string(),
        from_state: from.to_string(),
        to_state: to.to_string(),
        valid_for: roles.iter().map(|r| Role::new(*r)).collect(),
        valid_for_all: false,
        validators: Vec::new(),
        actions: Vec::new(),
        treat_as_submitted: false,
        display_order: 0,
    }
}

/// Draft (GROUP, reporter) -> Review (USER, editor) -> Published (GROUP, publisher),
/// plus a trash state reachable from draft.
pub fn news_workflow() -> WorkflowDefinition {
    let mut submit = step("submit", "draft", "review", &["reporter"]);
    submit.treat_as_submitted = true;
    submit.display_order = 1;

    let mut discard = step("discard", "draft", "trash", &[]);
    discard.valid_for_all = true;
    discard.display_order = 2;

    let mut publish = step("publish", "review", "published", &["editor"]);
    publish.actions.push(PluginRef::new("index_content"));
    publish.display_order = 1;

    let mut reject = step("reject", "review", "draft", &["editor"]);
    reject.display_order = 2;

    WorkflowDefinition {
        id: "news".to_string(),
        name: "News".to_string(),
        description: "Standard news desk workflow".to_string(),
        start_state: "draft".to_string(),
        end_state: "published".to_string(),
        trash_state: "trash".to_string(),
        states: vec![
            state("draft", "reporter", Permission::Group),
            state("review", "editor", Permission::User),
            state("published", "publisher", Permission::Group),
            state("trash", "editor", Permission::Group),
        ],
        steps: vec![submit, discard, publish, reject],
    }
}

/// Every service wired over one in-memory store.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub search: Arc<InMemorySearchIndex>,
    pub index_queue: Arc<IndexQueue>,
    pub catalog: Arc<InMemoryActionCatalog>,
    pub scheduler: Arc<JobScheduler>,
    pub engine: Arc<WorkflowEngine>,
    pub facade: ContentFacade,
    /// Context for job queue drains, with the engine and a system user
    pub drain_ctx: PluginContext,
}

pub fn harness() -> Harness {
    harness_with(news_workflow(), PluginRegistry::with_builtins(), Vec::new())
}

pub fn harness_with(
    workflow: WorkflowDefinition,
    registry: PluginRegistry,
    actions: Vec<ActionConfiguration>,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    harness_over(store.clone(), store, workflow, registry, actions)
}

/// Like `harness_with`, but content reads and writes go through `content`
/// while the queues stay on `store`.
pub fn harness_over(
    store: Arc<InMemoryStore>,
    content: Arc<dyn ContentStore>,
    workflow: WorkflowDefinition,
    registry: PluginRegistry,
    actions: Vec<ActionConfiguration>,
) -> Harness {
    let search = Arc::new(InMemorySearchIndex::new(content.clone()));
    let index_queue = Arc::new(IndexQueue::new(store.clone(), search.clone()));
    let catalog = Arc::new(InMemoryActionCatalog::from_configs(actions));
    let registry = Arc::new(registry);
    let scheduler = Arc::new(JobScheduler::new(
        store.clone(),
        catalog.clone(),
        registry.clone(),
    ));

    let workflow_id = workflow.id.clone();
    let directory = Arc::new(
        StaticWorkflowDirectory::new()
            .with_workflow(workflow)
            .assign(ContainerRef::Outlet(OUTLET.to_string()), workflow_id.clone())
            .assign(ContainerRef::Catalogue(CATALOGUE.to_string()), workflow_id),
    );

    let engine_ctx =
        PluginContext::new(content.clone(), index_queue.clone()).with_jobs(scheduler.clone());
    let engine = Arc::new(WorkflowEngine::new(
        content.clone(),
        directory,
        registry,
        engine_ctx.clone(),
    ));
    let facade = ContentFacade::new(content, engine.clone(), index_queue.clone());
    let drain_ctx = engine_ctx
        .with_workflow(engine.clone())
        .with_acting_user(system_user());

    Harness {
        store,
        search,
        index_queue,
        catalog,
        scheduler,
        engine,
        facade,
        drain_ctx,
    }
}
