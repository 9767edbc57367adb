//! Cross-story interconnection records
//!
//! [`StoryInterconnections`] is extracted per story once every story has
//! converged on its own. It is what ties one document into the system model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// How one story relates to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Must ship before this story
    Prerequisite,
    /// Can ship alongside
    Parallel,
    /// Builds on this story
    Dependent,
    /// Loosely related
    Related,
}

impl RelationshipKind {
    /// Rendering order of relationship groups
    pub const ORDER: [Self; 4] = [
        Self::Prerequisite,
        Self::Parallel,
        Self::Dependent,
        Self::Related,
    ];

    /// Group heading
    #[inline]
    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::Prerequisite => "Prerequisite",
            Self::Parallel => "Parallel",
            Self::Dependent => "Dependent",
            Self::Related => "Related",
        }
    }
}

impl Display for RelationshipKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prerequisite => "prerequisite",
            Self::Parallel => "parallel",
            Self::Dependent => "dependent",
            Self::Related => "related",
        })
    }
}

/// One edge to another story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedStory {
    pub story_id: String,
    pub relationship: RelationshipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RelatedStory {
    /// New edge without description
    #[must_use]
    pub fn new(story_id: impl Into<String>, relationship: RelationshipKind) -> Self {
        Self {
            story_id: story_id.into(),
            relationship,
            description: None,
        }
    }

    /// Attach a description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// State and event ownership of a story
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ownership {
    #[serde(default)]
    pub owns_state: Vec<String>,
    #[serde(default)]
    pub consumes_state: Vec<String>,
    #[serde(default)]
    pub emits_events: Vec<String>,
    #[serde(default)]
    pub listens_to_events: Vec<String>,
}

impl Ownership {
    /// True when nothing is owned, consumed, emitted or listened to
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owns_state.is_empty()
            && self.consumes_state.is_empty()
            && self.emits_events.is_empty()
            && self.listens_to_events.is_empty()
    }

    /// Union another ownership record into this one, keeping first-seen order
    pub fn merge(&mut self, other: &Ownership) {
        push_unique(&mut self.owns_state, &other.owns_state);
        push_unique(&mut self.consumes_state, &other.consumes_state);
        push_unique(&mut self.emits_events, &other.emits_events);
        push_unique(&mut self.listens_to_events, &other.listens_to_events);
    }
}

fn push_unique(into: &mut Vec<String>, from: &[String]) {
    for value in from {
        if !into.contains(value) {
            into.push(value.clone());
        }
    }
}

/// Interconnections of one story
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryInterconnections {
    /// May be omitted on input; the engine files records by story
    #[serde(default)]
    pub story_id: String,
    /// Product term → stable component identifier
    #[serde(default)]
    pub ui_mapping: BTreeMap<String, String>,
    /// Stable identifiers this story depends on
    #[serde(default)]
    pub contract_dependencies: Vec<String>,
    #[serde(default)]
    pub ownership: Ownership,
    #[serde(default)]
    pub related_stories: Vec<RelatedStory>,
}

impl StoryInterconnections {
    /// Empty record for a story
    #[inline]
    #[must_use]
    pub fn new(story_id: impl Into<String>) -> Self {
        Self {
            story_id: story_id.into(),
            ..Self::default()
        }
    }

    /// Add an edge unless the same (target, kind) is already recorded
    ///
    /// Returns `true` when the edge is new.
    pub fn add_related(&mut self, related: RelatedStory) -> bool {
        let exists = self
            .related_stories
            .iter()
            .any(|r| r.story_id == related.story_id && r.relationship == related.relationship);
        if exists {
            return false;
        }
        self.related_stories.push(related);
        true
    }

    /// Add a contract dependency unless already present
    pub fn add_contract_dependency(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.contract_dependencies.contains(&id) {
            return false;
        }
        self.contract_dependencies.push(id);
        true
    }

    /// Whether any edge points at `story_id`
    #[must_use]
    pub fn links_to(&self, story_id: &str) -> bool {
        self.related_stories.iter().any(|r| r.story_id == story_id)
    }

    /// Edges grouped prerequisite → parallel → dependent → related
    #[must_use]
    pub fn grouped_relationships(&self) -> Vec<(RelationshipKind, Vec<&RelatedStory>)> {
        RelationshipKind::ORDER
            .iter()
            .map(|kind| {
                let group: Vec<_> = self
                    .related_stories
                    .iter()
                    .filter(|r| r.relationship == *kind)
                    .collect();
                (*kind, group)
            })
            .filter(|(_, group)| !group.is_empty())
            .collect()
    }

    /// True when nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ui_mapping.is_empty()
            && self.contract_dependencies.is_empty()
            && self.ownership.is_empty()
            && self.related_stories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_related_dedupes_same_edge() {
        let mut links = StoryInterconnections::new("story-1");
        assert!(links.add_related(RelatedStory::new("story-2", RelationshipKind::Parallel)));
        assert!(!links.add_related(RelatedStory::new("story-2", RelationshipKind::Parallel)));
        assert!(links.add_related(RelatedStory::new("story-2", RelationshipKind::Dependent)));
        assert_eq!(links.related_stories.len(), 2);
        assert!(links.links_to("story-2"));
    }

    #[test]
    fn grouped_in_fixed_order() {
        let mut links = StoryInterconnections::new("s");
        links.add_related(RelatedStory::new("c", RelationshipKind::Related));
        links.add_related(RelatedStory::new("a", RelationshipKind::Prerequisite));
        links.add_related(RelatedStory::new("b", RelationshipKind::Dependent));
        let kinds: Vec<_> = links
            .grouped_relationships()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            kinds,
            vec![
                RelationshipKind::Prerequisite,
                RelationshipKind::Dependent,
                RelationshipKind::Related
            ]
        );
    }

    #[test]
    fn ownership_merge_keeps_order_and_uniqueness() {
        let mut a = Ownership {
            owns_state: vec!["STATE-CART".into()],
            ..Ownership::default()
        };
        let b = Ownership {
            owns_state: vec!["STATE-CART".into(), "STATE-USER".into()],
            emits_events: vec!["EVT-PAID".into()],
            ..Ownership::default()
        };
        a.merge(&b);
        assert_eq!(a.owns_state, vec!["STATE-CART", "STATE-USER"]);
        assert_eq!(a.emits_events, vec!["EVT-PAID"]);
    }

    #[test]
    fn json_shape() {
        let json = r#"{"storyId":"s1","relatedStories":[{"storyId":"s2","relationship":"prerequisite"}]}"#;
        let links: StoryInterconnections = serde_json::from_str(json).unwrap();
        assert_eq!(links.related_stories[0].relationship, RelationshipKind::Prerequisite);
        assert!(links.ownership.is_empty());
    }
}
