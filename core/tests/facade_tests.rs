// Content facade integration tests: every mutation keeps the search index in step.

mod common;

use common::*;
use quill_core::{
    ContentError, ContentItem, ContentKind, ContentStore, EntityType, IndexOperation, MediaStatus,
    StaticIdentity, WorkflowError,
};

fn ann() -> StaticIdentity {
    StaticIdentity::new(reporter())
}

fn approve(item: &mut ContentItem) {
    if let ContentKind::Media { status, .. } = &mut item.kind {
        *status = MediaStatus::Approved;
    }
}

#[tokio::test]
async fn test_create_queues_index_update() {
    let h = harness();
    let item = ContentItem::article(OUTLET, "Harbour expansion", "Cranes arrive.")
        .with_actor(&reporter(), "reporter");
    let created = h.facade.create(&item, &ann()).await.unwrap();

    let entries = h.index_queue.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_id, created.id.unwrap());
    assert_eq!(entries[0].operation, IndexOperation::Update);

    h.index_queue.drain().await.unwrap();
    assert_eq!(h.search.search("cranes"), vec![created.id.unwrap()]);
}

#[tokio::test]
async fn test_update_reindexes_edited_fields() {
    let h = harness();
    let item = ContentItem::article(OUTLET, "Old headline", "Body text.")
        .with_actor(&reporter(), "reporter");
    let created = h.facade.create(&item, &ann()).await.unwrap();
    h.index_queue.drain().await.unwrap();

    let mut edited = created.clone();
    edited.title = "New headline".to_string();
    let updated = h.facade.update(&edited).await.unwrap();
    assert_eq!(updated.version, created.version + 1);
    assert!(updated.updated >= created.updated);

    h.index_queue.drain().await.unwrap();
    let doc = h.search.document(&created.id.unwrap()).unwrap();
    assert_eq!(doc.title, "New headline");
    assert!(h.search.search("old headline").is_empty());
}

#[tokio::test]
async fn test_update_cannot_move_item_between_states() {
    let h = harness();
    let item = ContentItem::article(OUTLET, "Sneaky", "text").with_actor(&reporter(), "reporter");
    let created = h.facade.create(&item, &ann()).await.unwrap();

    let mut edited = created.clone();
    edited.current_state = Some("published".to_string());
    edited.history.clear();
    edited.actors.clear();
    let updated = h.facade.update(&edited).await.unwrap();

    assert_eq!(updated.current_state.as_deref(), Some("draft"));
    assert_eq!(updated.history, created.history);
    assert_eq!(updated.actors, created.actors);
}

#[tokio::test]
async fn test_update_requires_started_item() {
    let h = harness();
    let err = h
        .facade
        .update(&ContentItem::article(OUTLET, "Unsaved", "text"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ContentError::Workflow(WorkflowError::TransitionFailed(_))
    ));
}

#[tokio::test]
async fn test_update_with_stale_version_conflicts() {
    let h = harness();
    let item = ContentItem::article(OUTLET, "Busy", "text").with_actor(&reporter(), "reporter");
    let created = h.facade.create(&item, &ann()).await.unwrap();

    h.facade.update(&created).await.unwrap();
    let err = h.facade.update(&created).await.unwrap_err();
    match err {
        ContentError::Workflow(e) => assert!(e.is_retryable()),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_step_queues_index_update() {
    let h = harness();
    let item = ContentItem::article(OUTLET, "Moving", "text")
        .with_actor(&reporter(), "reporter")
        .with_actor(&editor(), "editor");
    let created = h.facade.create(&item, &ann()).await.unwrap();
    h.index_queue.drain().await.unwrap();

    let moved = h.facade.step(&created, "submit", &ann()).await.unwrap();
    assert_eq!(moved.current_state.as_deref(), Some("review"));

    h.index_queue.drain().await.unwrap();
    let doc = h.search.document(&created.id.unwrap()).unwrap();
    assert_eq!(doc.state.as_deref(), Some("review"));
}

#[tokio::test]
async fn test_delete_removes_from_store_and_index() {
    let h = harness();
    let item = ContentItem::article(OUTLET, "Retracted", "text").with_actor(&reporter(), "reporter");
    let created = h.facade.create(&item, &ann()).await.unwrap();
    let id = created.id.unwrap();
    h.index_queue.drain().await.unwrap();
    assert!(h.search.document(&id).is_some());

    h.facade.delete(&id).await.unwrap();
    let entries = h.index_queue.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, IndexOperation::Remove);
    assert!(ContentStore::find_by_id(h.store.as_ref(), &id).await.is_err());

    let report = h.index_queue.drain().await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(h.search.document(&id).is_none());

    let err = h.facade.find(&id).await.unwrap_err();
    assert!(matches!(err, ContentError::Workflow(WorkflowError::NotFound(_))));
    let err = h.facade.delete(&id).await.unwrap_err();
    assert!(matches!(err, ContentError::Workflow(WorkflowError::NotFound(_))));
}

#[tokio::test]
async fn test_media_is_indexed_only_when_approved() {
    let h = harness();
    let photo = ContentItem::media(CATALOGUE, "Lighthouse").with_actor(&reporter(), "reporter");
    let created = h.facade.create(&photo, &ann()).await.unwrap();
    let id = created.id.unwrap();

    let entries = h.index_queue.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_type, EntityType::Media);
    assert_eq!(entries[0].operation, IndexOperation::Remove);

    let mut approved = created.clone();
    approve(&mut approved);
    h.facade.update(&approved).await.unwrap();

    // The update replaces the pending removal.
    let entries = h.index_queue.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, IndexOperation::Update);

    h.index_queue.drain().await.unwrap();
    assert!(h.search.document(&id).is_some());
    assert_eq!(h.search.search("lighthouse"), vec![id]);
}

#[tokio::test]
async fn test_media_reapproved_before_drain_stays_indexed() {
    let h = harness();
    let photo = ContentItem::media(CATALOGUE, "Harbour at dusk").with_actor(&reporter(), "reporter");
    let mut current = h.facade.create(&photo, &ann()).await.unwrap();
    let id = current.id.unwrap();
    h.index_queue.drain().await.unwrap();

    approve(&mut current);
    current = h.facade.update(&current).await.unwrap();
    if let ContentKind::Media { status, .. } = &mut current.kind {
        *status = MediaStatus::Rejected;
    }
    current = h.facade.update(&current).await.unwrap();
    approve(&mut current);
    h.facade.update(&current).await.unwrap();

    let report = h.index_queue.drain().await.unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.removed, 0);
    assert!(h.search.document(&id).is_some());
}

#[tokio::test]
async fn test_repeated_edits_coalesce_into_one_entry() {
    let h = harness();
    let item = ContentItem::article(OUTLET, "Draft 1", "text").with_actor(&reporter(), "reporter");
    let mut current = h.facade.create(&item, &ann()).await.unwrap();

    for n in 2..=4 {
        current.title = format!("Draft {n}");
        current = h.facade.update(&current).await.unwrap();
    }

    assert_eq!(h.index_queue.entries().await.unwrap().len(), 1);
    let report = h.index_queue.drain().await.unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(
        h.search.document(&current.id.unwrap()).unwrap().title,
        "Draft 4"
    );
}
