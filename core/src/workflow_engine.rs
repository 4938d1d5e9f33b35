/// Workflow engine: starts content items in their container's workflow and
/// moves them between states.
///
/// Every transition works on a copy of the caller's item and persists it
/// once. Either the whole transition is stored or nothing is.
use crate::content::{replace_control_chars, word_count, ContentItem, ContentKind, TransitionRecord};
use crate::errors::{ValidationFailure, WorkflowError, WorkflowResult};
use crate::identity::User;
use crate::plugins::{PluginContext, PluginRegistry};
use crate::traits::{ContentStore, IdentityResolver, WorkflowDirectory};
use crate::workflow::{Permission, WorkflowDefinition, WorkflowStep};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

pub struct WorkflowEngine {
    store: Arc<dyn ContentStore>,
    directory: Arc<dyn WorkflowDirectory>,
    registry: Arc<PluginRegistry>,

    /// Handed to post-commit transition actions
    context: PluginContext,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        directory: Arc<dyn WorkflowDirectory>,
        registry: Arc<PluginRegistry>,
        context: PluginContext,
    ) -> Self {
        Self {
            store,
            directory,
            registry,
            context,
        }
    }

    /// The workflow owning the item's container.
    pub async fn definition_for(&self, item: &ContentItem) -> WorkflowResult<Arc<WorkflowDefinition>> {
        self.directory
            .workflow_for(&item.container())
            .await?
            .ok_or_else(|| {
                WorkflowError::TransitionFailed(format!(
                    "workflow definition could not be determined for {}",
                    item.container()
                ))
            })
    }

    /// Put a new item into the start state of its workflow and persist it.
    pub async fn start(
        &self,
        item: &ContentItem,
        identity: &dyn IdentityResolver,
    ) -> WorkflowResult<ContentItem> {
        if let Some(id) = item.id {
            return Err(WorkflowError::DuplicateExecution(id.to_string()));
        }

        let definition = self.definition_for(item).await?;
        let start = definition.start()?;
        if !item.has_actor_in_role(&start.actor_role) {
            return Err(WorkflowError::MissingActorRole(start.actor_role.clone()));
        }

        let user = resolve_user(identity).await?;
        let now = Utc::now();

        let mut next = item.clone();
        next.history
            .push(transition_record(&next, None, &start.id, &user, false, now));
        next.current_state = Some(start.id.clone());
        next.created = Some(now);
        next.updated = Some(now);
        next.precalculated_current_actor = next.current_actor(&definition);

        let persisted = self.store.create(&next).await?;
        info!(
            "Started {} {} in {} ({}) by {}",
            persisted.kind_name(),
            display_id(&persisted),
            start.id,
            definition.id,
            user.id
        );
        Ok(persisted)
    }

    /// Take workflow step `step_id` on a started item.
    ///
    /// Validation happens before anything is persisted. Post-commit actions
    /// run after the store accepted the new state and never undo it.
    pub async fn step(
        &self,
        item: &ContentItem,
        step_id: &str,
        identity: &dyn IdentityResolver,
    ) -> WorkflowResult<ContentItem> {
        let user = resolve_user(identity).await?;

        let current_state = match (&item.id, &item.current_state) {
            (Some(_), Some(state)) => state.clone(),
            _ => {
                return Err(WorkflowError::TransitionFailed(
                    "content item has not been started".to_string(),
                ))
            }
        };

        let definition = self.definition_for(item).await?;
        let step = definition.step(step_id).ok_or_else(|| {
            WorkflowError::TransitionFailed(format!(
                "step {} not found in workflow {}",
                step_id, definition.id
            ))
        })?;

        check_transition(&definition, &current_state, step, &user)?;

        let destination = definition.state(&step.to_state).ok_or_else(|| {
            WorkflowError::InvalidDefinition(format!(
                "step {} leads to unknown state {}",
                step.id, step.to_state
            ))
        })?;
        if destination.permission == Permission::User
            && !item.has_actor_in_role(&destination.actor_role)
        {
            return Err(WorkflowError::ValidationFailed(
                ValidationFailure::MissingRole(destination.actor_role.clone()),
            ));
        }

        self.run_validators(item, step).await?;

        let now = Utc::now();
        let mut next = item.clone();

        if let Some(state) = definition.state(&current_state) {
            if state.permission == Permission::Group && !next.has_actor(&user.id, &state.actor_role)
            {
                next.add_actor(&user, state.actor_role.clone());
            }
        }

        // The history keeps the story as submitted.
        let record = transition_record(
            &next,
            Some(current_state.clone()),
            &step.to_state,
            &user,
            step.treat_as_submitted,
            now,
        );

        if let ContentKind::Article {
            story,
            word_count: words,
            ..
        } = &mut next.kind
        {
            *story = replace_control_chars(story);
            *words = word_count(story);
        }

        next.history.push(record);
        next.current_state = Some(step.to_state.clone());
        next.updated = Some(now);
        next.precalculated_current_actor = next.current_actor(&definition);

        let persisted = self.store.update(&next).await?;
        info!(
            "{} {} moved {} -> {} via {} by {}",
            persisted.kind_name(),
            display_id(&persisted),
            current_state,
            step.to_state,
            step.id,
            user.id
        );

        self.run_actions(&persisted, step, &user).await;
        Ok(persisted)
    }

    /// Outgoing steps of the item's current state that `user` may take.
    pub async fn available_steps(
        &self,
        item: &ContentItem,
        user: &User,
    ) -> WorkflowResult<Vec<WorkflowStep>> {
        let Some(current) = item.current_state.as_deref() else {
            return Ok(Vec::new());
        };
        let definition = self.definition_for(item).await?;
        Ok(definition
            .next_steps(current)
            .into_iter()
            .filter(|step| step.permits(user))
            .cloned()
            .collect())
    }

    async fn run_validators(&self, item: &ContentItem, step: &WorkflowStep) -> WorkflowResult<()> {
        for reference in &step.validators {
            let validator = self.registry.validator(&reference.plugin).ok_or_else(|| {
                WorkflowError::TransitionFailed(format!(
                    "unknown validator {} on step {}",
                    reference.plugin, step.id
                ))
            })?;

            if let Err(e) = validator.validate(item, step, reference).await {
                debug!(
                    "Validator {} rejected step {}: {}",
                    reference.display_label(),
                    step.id,
                    e
                );
                return Err(WorkflowError::ValidationFailed(ValidationFailure::Rejected {
                    validator: reference.display_label().to_string(),
                    message: e.message().to_string(),
                }));
            }
        }
        Ok(())
    }

    async fn run_actions(&self, item: &ContentItem, step: &WorkflowStep, user: &User) {
        for reference in &step.actions {
            let Some(action) = self.registry.transition_action(&reference.plugin) else {
                error!(
                    "Unknown transition action {} on step {}",
                    reference.plugin, step.id
                );
                continue;
            };

            if let Err(e) = action
                .execute(&self.context, item, step, reference, user)
                .await
            {
                error!(
                    "Action {} failed after step {} on {}: {}",
                    reference.display_label(),
                    step.id,
                    display_id(item),
                    e
                );
            }
        }
    }
}

/// Checks that `requested` leads to a next state of `current` and that the
/// user holds a role of the first outgoing step into that state.
fn check_transition(
    definition: &WorkflowDefinition,
    current: &str,
    requested: &WorkflowStep,
    user: &User,
) -> WorkflowResult<()> {
    match definition
        .next_steps(current)
        .into_iter()
        .find(|s| s.to_state == requested.to_state)
    {
        Some(step) if step.permits(user) => Ok(()),
        Some(step) => Err(WorkflowError::TransitionFailed(format!(
            "illegal transition: {} may not take step {}",
            user.id, step.id
        ))),
        None => Err(WorkflowError::TransitionFailed(format!(
            "illegal transition: {} is not reachable from {}",
            requested.to_state, current
        ))),
    }
}

async fn resolve_user(identity: &dyn IdentityResolver) -> WorkflowResult<User> {
    identity
        .current_user()
        .await
        .map_err(|e| WorkflowError::TransitionFailed(format!("could not resolve acting user: {}", e)))
}

fn transition_record(
    item: &ContentItem,
    from_state: Option<String>,
    to_state: &str,
    user: &User,
    submitted: bool,
    timestamp: DateTime<Utc>,
) -> TransitionRecord {
    let (headline, story, brief) = match &item.kind {
        ContentKind::Article { story, brief, .. } => (
            Some(item.title.clone()),
            Some(story.clone()),
            Some(brief.clone()),
        ),
        ContentKind::Media { .. } => (None, None, None),
    };

    TransitionRecord {
        id: Uuid::new_v4(),
        timestamp,
        from_state,
        to_state: to_state.to_string(),
        user_id: user.id.clone(),
        user_name: user.display_name().to_string(),
        submitted,
        headline,
        story,
        brief,
    }
}

fn display_id(item: &ContentItem) -> String {
    item.id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "<new>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use crate::workflow::WorkflowState;
    use std::collections::BTreeSet;

    fn definition() -> WorkflowDefinition {
        let state = |id: &str| WorkflowState {
            id: id.to_string(),
            name: id.to_string(),
            actor_role: Role::new("writer"),
            permission: Permission::Group,
        };
        let step = |id: &str, from: &str, to: &str, order: i32, roles: &[&str]| WorkflowStep {
            id: id.to_string(),
            name: id.to_string(),
            from_state: from.to_string(),
            to_state: to.to_string(),
            valid_for: roles.iter().map(|r| Role::new(*r)).collect::<BTreeSet<_>>(),
            valid_for_all: false,
            validators: Vec::new(),
            actions: Vec::new(),
            treat_as_submitted: false,
            display_order: order,
        };
        WorkflowDefinition {
            id: "w".to_string(),
            name: String::new(),
            description: String::new(),
            start_state: "a".to_string(),
            end_state: "c".to_string(),
            trash_state: "t".to_string(),
            states: vec![state("a"), state("b"), state("c"), state("t")],
            steps: vec![
                step("a-b-editor", "a", "b", 2, &["editor"]),
                step("a-b-writer", "a", "b", 1, &["writer"]),
                step("b-c", "b", "c", 1, &["editor"]),
            ],
        }
    }

    #[test]
    fn test_check_transition_uses_roles_of_first_matching_destination() {
        let def = definition();
        let writer = User::new("w", "W").with_role("writer");
        let requested = def.step("a-b-editor").unwrap();
        assert!(check_transition(&def, "a", requested, &writer).is_ok());
    }

    #[test]
    fn test_check_transition_rejects_unreachable() {
        let def = definition();
        let editor = User::new("e", "E").with_role("editor");
        let requested = def.step("b-c").unwrap();
        assert!(matches!(
            check_transition(&def, "a", requested, &editor),
            Err(WorkflowError::TransitionFailed(_))
        ));
    }

    #[test]
    fn test_check_transition_checks_role_of_matched_step() {
        let def = definition();
        let editor = User::new("e", "E").with_role("editor");
        let requested = def.step("a-b-editor").unwrap();
        // The first step into "b" is writer-only, so the editor is refused.
        assert!(check_transition(&def, "a", requested, &editor).is_err());
    }

    #[test]
    fn test_transition_record_snapshots_articles() {
        let user = User::new("u", "U");
        let article = ContentItem::article("o", "Headline", "Story");
        let record = transition_record(&article, None, "a", &user, true, Utc::now());
        assert_eq!(record.headline.as_deref(), Some("Headline"));
        assert_eq!(record.story.as_deref(), Some("Story"));
        assert!(record.submitted);

        let media = ContentItem::media("c", "Pic");
        let record = transition_record(&media, Some("a".into()), "b", &user, false, Utc::now());
        assert!(record.headline.is_none());
        assert_eq!(record.from_state.as_deref(), Some("a"));
    }
}
