/// Content items: articles and media assets moving through a workflow.
use crate::identity::{Role, User};
use crate::index_queue::EntityType;
use crate::workflow::{Permission, StateId, WorkflowDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The configuration object that owns an item's workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ContainerRef {
    /// Publication channel holding articles
    Outlet(String),

    /// Media archive holding media assets
    Catalogue(String),
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRef::Outlet(id) => write!(f, "outlet:{}", id),
            ContainerRef::Catalogue(id) => write!(f, "catalogue:{}", id),
        }
    }
}

/// A user attached to an item in a given role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user: &User, role: Role) -> Self {
        Self {
            user_id: user.id.clone(),
            user_name: user.display_name().to_string(),
            role,
        }
    }
}

/// Editorial status of a media asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    #[default]
    Unsubmitted,
    Submitted,
    Rejected,
    Approved,
}

/// Kind-specific fields of a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentKind {
    Article {
        outlet: String,
        #[serde(default)]
        story: String,
        #[serde(default)]
        brief: String,
        #[serde(default)]
        word_count: usize,
    },
    Media {
        catalogue: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        status: MediaStatus,
    },
}

/// One entry of an item's append-only workflow history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,

    /// None for the record written by `start`
    pub from_state: Option<StateId>,
    pub to_state: StateId,

    pub user_id: String,
    pub user_name: String,

    /// Whether the step counts as a submission
    pub submitted: bool,

    // Article snapshot taken at the time of the transition
    pub headline: Option<String>,
    pub story: Option<String>,
    pub brief: Option<String>,
}

/// A unit of editorial content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Assigned by the store when the item is started
    pub id: Option<Uuid>,
    pub title: String,
    pub owner: Option<String>,
    pub kind: ContentKind,
    pub current_state: Option<StateId>,
    pub actors: Vec<Actor>,
    pub history: Vec<TransitionRecord>,
    pub precalculated_current_actor: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,

    /// Optimistic concurrency counter, bumped by the store on every update
    pub version: i64,
}

impl ContentItem {
    fn with_kind(title: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            id: None,
            title: title.into(),
            owner: None,
            kind,
            current_state: None,
            actors: Vec::new(),
            history: Vec::new(),
            precalculated_current_actor: None,
            created: None,
            updated: None,
            version: 0,
        }
    }

    /// A new, unstarted article in an outlet.
    pub fn article(
        outlet: impl Into<String>,
        title: impl Into<String>,
        story: impl Into<String>,
    ) -> Self {
        let story = story.into();
        let word_count = word_count(&story);
        Self::with_kind(
            title,
            ContentKind::Article {
                outlet: outlet.into(),
                story,
                brief: String::new(),
                word_count,
            },
        )
    }

    /// A new, unstarted media asset in a catalogue.
    pub fn media(catalogue: impl Into<String>, title: impl Into<String>) -> Self {
        Self::with_kind(
            title,
            ContentKind::Media {
                catalogue: catalogue.into(),
                description: String::new(),
                status: MediaStatus::default(),
            },
        )
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Attach `user` in `role`. Duplicate (user, role) pairs are ignored.
    pub fn with_actor(mut self, user: &User, role: impl Into<Role>) -> Self {
        self.add_actor(user, role.into());
        self
    }

    pub fn add_actor(&mut self, user: &User, role: Role) {
        if !self.has_actor(&user.id, &role) {
            self.actors.push(Actor::new(user, role));
        }
    }

    pub fn has_actor(&self, user_id: &str, role: &Role) -> bool {
        self.actors
            .iter()
            .any(|a| a.user_id == user_id && &a.role == role)
    }

    pub fn has_actor_in_role(&self, role: &Role) -> bool {
        self.actors.iter().any(|a| &a.role == role)
    }

    pub fn actors_in_role<'a>(&'a self, role: &'a Role) -> impl Iterator<Item = &'a Actor> + 'a {
        self.actors.iter().filter(move |a| &a.role == role)
    }

    pub fn is_started(&self) -> bool {
        self.id.is_some()
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ContentKind::Article { .. } => "article",
            ContentKind::Media { .. } => "media",
        }
    }

    pub fn container(&self) -> ContainerRef {
        match &self.kind {
            ContentKind::Article { outlet, .. } => ContainerRef::Outlet(outlet.clone()),
            ContentKind::Media { catalogue, .. } => ContainerRef::Catalogue(catalogue.clone()),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self.kind {
            ContentKind::Article { .. } => EntityType::Article,
            ContentKind::Media { .. } => EntityType::Media,
        }
    }

    /// Media approved for publication. Always false for articles.
    pub fn is_approved_media(&self) -> bool {
        matches!(
            self.kind,
            ContentKind::Media {
                status: MediaStatus::Approved,
                ..
            }
        )
    }

    /// Word count of an article, zero for media.
    pub fn word_count(&self) -> usize {
        match &self.kind {
            ContentKind::Article { word_count, .. } => *word_count,
            ContentKind::Media { .. } => 0,
        }
    }

    /// Searchable body text.
    pub fn text(&self) -> String {
        match &self.kind {
            ContentKind::Article { story, brief, .. } => {
                if brief.is_empty() {
                    story.clone()
                } else {
                    format!("{}\n{}", brief, story)
                }
            }
            ContentKind::Media { description, .. } => description.clone(),
        }
    }

    /// Human readable description of who currently holds the item.
    ///
    /// For a GROUP state this is the role name. For a USER state it is the
    /// comma separated names of the actors holding the state's role.
    pub fn current_actor(&self, definition: &WorkflowDefinition) -> Option<String> {
        let state = definition.state(self.current_state.as_deref()?)?;
        match state.permission {
            Permission::Group => Some(state.actor_role.name().to_string()),
            Permission::User => Some(
                self.actors_in_role(&state.actor_role)
                    .map(|a| a.user_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        }
    }

    pub fn last_transition(&self) -> Option<&TransitionRecord> {
        self.history.last()
    }
}

/// Replace control characters with a space, keeping line breaks and tabs.
pub fn replace_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// Number of whitespace separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowState;

    fn definition(permission: Permission) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "w".to_string(),
            name: String::new(),
            description: String::new(),
            start_state: "s".to_string(),
            end_state: "s".to_string(),
            trash_state: "s".to_string(),
            states: vec![WorkflowState {
                id: "s".to_string(),
                name: String::new(),
                actor_role: Role::new("editor"),
                permission,
            }],
            steps: Vec::new(),
        }
    }

    #[test]
    fn test_current_actor_group_is_role_name() {
        let mut item = ContentItem::article("daily", "Title", "body");
        item.current_state = Some("s".to_string());
        assert_eq!(
            item.current_actor(&definition(Permission::Group)),
            Some("editor".to_string())
        );
    }

    #[test]
    fn test_current_actor_user_lists_actors() {
        let ann = User::new("ann", "Ann");
        let bob = User::new("bob", "Bob");
        let mut item = ContentItem::article("daily", "Title", "body")
            .with_actor(&ann, "editor")
            .with_actor(&bob, "editor")
            .with_actor(&bob, "reporter");
        item.current_state = Some("s".to_string());
        assert_eq!(
            item.current_actor(&definition(Permission::User)),
            Some("Ann, Bob".to_string())
        );
    }

    #[test]
    fn test_duplicate_actor_ignored() {
        let ann = User::new("ann", "Ann");
        let item = ContentItem::media("photos", "Pic")
            .with_actor(&ann, "editor")
            .with_actor(&ann, "editor");
        assert_eq!(item.actors.len(), 1);
    }

    #[test]
    fn test_container_and_entity_type() {
        let article = ContentItem::article("daily", "T", "");
        assert_eq!(article.container(), ContainerRef::Outlet("daily".into()));
        assert_eq!(article.entity_type(), EntityType::Article);
        assert_eq!(article.kind_name(), "article");

        let media = ContentItem::media("photos", "P");
        assert_eq!(media.container(), ContainerRef::Catalogue("photos".into()));
        assert_eq!(media.entity_type(), EntityType::Media);
        assert!(!media.is_approved_media());
    }

    #[test]
    fn test_replace_control_chars() {
        assert_eq!(replace_control_chars("a\u{0}b\u{7}c\nd\te"), "a b c\nd\te");
        assert_eq!(word_count(&replace_control_chars("a\u{7}b")), 2);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree  "), 3);
        assert_eq!(word_count(""), 0);
        assert_eq!(ContentItem::article("o", "t", "a b c d").word_count(), 4);
    }

    #[test]
    fn test_item_serializes_to_json() {
        let item = ContentItem::article("daily", "Title", "Some words");
        let json = serde_json::to_string(&item).unwrap();
        let back: ContentItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }
}
