//! Story document model
//!
//! A [`Document`] is the structured record of one user story. It is created
//! empty at intake, mutated only by the patch orchestrator and rendered
//! read-only any number of times.

use crate::fingerprint::{Fingerprint, FingerprintError};
use crate::path::{CollectionPath, ImplNoteKey, NarrativeField};
use serde::{Deserialize, Serialize};

/// Collection entry `{id, text}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Identifier, unique within its collection
    pub id: String,
    /// Item text
    pub text: String,
}

impl Item {
    /// Create new item
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// UI-mapping entry `{id, productTerm, componentName}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiMappingEntry {
    /// Identifier, unique within the mapping
    pub id: String,
    /// Term the product uses
    pub product_term: String,
    /// Component that realises it
    pub component_name: String,
}

impl UiMappingEntry {
    /// Create new mapping entry
    #[inline]
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        product_term: impl Into<String>,
        component_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            product_term: product_term.into(),
            component_name: component_name.into(),
        }
    }
}

/// A value that can be stored in a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Plain item
    Item(Item),
    /// UI mapping entry
    UiMapping(UiMappingEntry),
}

impl Entry {
    /// Entry identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Item(item) => &item.id,
            Self::UiMapping(entry) => &entry.id,
        }
    }
}

/// The fixed three-line narrative
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Narrative {
    /// Persona
    pub as_a: String,
    /// Capability
    pub i_want: String,
    /// Benefit
    pub so_that: String,
}

impl Narrative {
    /// Create new narrative
    #[must_use]
    pub fn new(
        as_a: impl Into<String>,
        i_want: impl Into<String>,
        so_that: impl Into<String>,
    ) -> Self {
        Self {
            as_a: as_a.into(),
            i_want: i_want.into(),
            so_that: so_that.into(),
        }
    }

    /// Read one line
    #[inline]
    #[must_use]
    pub fn get(&self, field: NarrativeField) -> &str {
        match field {
            NarrativeField::AsA => &self.as_a,
            NarrativeField::IWant => &self.i_want,
            NarrativeField::SoThat => &self.so_that,
        }
    }

    /// Overwrite one line
    pub fn set(&mut self, field: NarrativeField, text: impl Into<String>) {
        let slot = match field {
            NarrativeField::AsA => &mut self.as_a,
            NarrativeField::IWant => &mut self.i_want,
            NarrativeField::SoThat => &mut self.so_that,
        };
        *slot = text.into();
    }
}

/// The seven-key implementation-notes record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationNotes {
    pub state_ownership: Vec<Item>,
    pub data_flow: Vec<Item>,
    pub api_contracts: Vec<Item>,
    pub loading_states: Vec<Item>,
    pub performance: Vec<Item>,
    pub security: Vec<Item>,
    pub telemetry: Vec<Item>,
}

impl ImplementationNotes {
    /// Items under one key
    #[must_use]
    pub fn get(&self, key: ImplNoteKey) -> &Vec<Item> {
        match key {
            ImplNoteKey::StateOwnership => &self.state_ownership,
            ImplNoteKey::DataFlow => &self.data_flow,
            ImplNoteKey::ApiContracts => &self.api_contracts,
            ImplNoteKey::LoadingStates => &self.loading_states,
            ImplNoteKey::Performance => &self.performance,
            ImplNoteKey::Security => &self.security,
            ImplNoteKey::Telemetry => &self.telemetry,
        }
    }

    /// Mutable items under one key
    pub fn get_mut(&mut self, key: ImplNoteKey) -> &mut Vec<Item> {
        match key {
            ImplNoteKey::StateOwnership => &mut self.state_ownership,
            ImplNoteKey::DataFlow => &mut self.data_flow,
            ImplNoteKey::ApiContracts => &mut self.api_contracts,
            ImplNoteKey::LoadingStates => &mut self.loading_states,
            ImplNoteKey::Performance => &mut self.performance,
            ImplNoteKey::Security => &mut self.security,
            ImplNoteKey::Telemetry => &mut self.telemetry,
        }
    }

    /// True when every key is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        ImplNoteKey::ALL.iter().all(|k| self.get(*k).is_empty())
    }
}

/// Structured per-story document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub title: String,
    pub story: Narrative,
    pub user_visible_behavior: Vec<Item>,
    pub outcome_acceptance_criteria: Vec<Item>,
    pub system_acceptance_criteria: Vec<Item>,
    pub implementation_notes: ImplementationNotes,
    pub ui_mapping: Vec<UiMappingEntry>,
    pub open_questions: Vec<Item>,
    pub edge_cases: Vec<Item>,
    pub non_goals: Vec<Item>,
}

impl Document {
    /// Empty document with a title
    #[inline]
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the narrative at intake
    #[inline]
    #[must_use]
    pub fn with_story(mut self, story: Narrative) -> Self {
        self.story = story;
        self
    }

    /// Read-only view of one collection
    #[must_use]
    pub fn collection(&self, path: CollectionPath) -> CollectionRef<'_> {
        let items = match path {
            CollectionPath::UiMapping => return CollectionRef::UiMapping(&self.ui_mapping),
            CollectionPath::UserVisibleBehavior => &self.user_visible_behavior,
            CollectionPath::OutcomeAcceptanceCriteria => &self.outcome_acceptance_criteria,
            CollectionPath::SystemAcceptanceCriteria => &self.system_acceptance_criteria,
            CollectionPath::ImplementationNotes(key) => self.implementation_notes.get(key),
            CollectionPath::OpenQuestions => &self.open_questions,
            CollectionPath::EdgeCases => &self.edge_cases,
            CollectionPath::NonGoals => &self.non_goals,
        };
        CollectionRef::Items(items)
    }

    /// Mutable view of one collection
    pub fn collection_mut(&mut self, path: CollectionPath) -> CollectionMut<'_> {
        let items = match path {
            CollectionPath::UiMapping => return CollectionMut::UiMapping(&mut self.ui_mapping),
            CollectionPath::UserVisibleBehavior => &mut self.user_visible_behavior,
            CollectionPath::OutcomeAcceptanceCriteria => &mut self.outcome_acceptance_criteria,
            CollectionPath::SystemAcceptanceCriteria => &mut self.system_acceptance_criteria,
            CollectionPath::ImplementationNotes(key) => self.implementation_notes.get_mut(key),
            CollectionPath::OpenQuestions => &mut self.open_questions,
            CollectionPath::EdgeCases => &mut self.edge_cases,
            CollectionPath::NonGoals => &mut self.non_goals,
        };
        CollectionMut::Items(items)
    }

    /// Total number of entries across every collection
    #[must_use]
    pub fn entry_count(&self) -> usize {
        CollectionPath::ALL
            .iter()
            .map(|c| self.collection(*c).len())
            .sum()
    }

    /// Content fingerprint of the canonical JSON form
    ///
    /// # Errors
    /// Returns error if the document cannot be encoded
    pub fn fingerprint(&self) -> Result<Fingerprint, FingerprintError> {
        Fingerprint::of_json(self)
    }
}

/// Read-only collection view
#[derive(Debug, Clone, Copy)]
pub enum CollectionRef<'a> {
    /// `{id, text}` entries
    Items(&'a [Item]),
    /// UI mapping entries
    UiMapping(&'a [UiMappingEntry]),
}

impl<'a> CollectionRef<'a> {
    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Items(items) => items.len(),
            Self::UiMapping(entries) => entries.len(),
        }
    }

    /// True when empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifier at position
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<&'a str> {
        match self {
            Self::Items(items) => items.get(index).map(|i| i.id.as_str()),
            Self::UiMapping(entries) => entries.get(index).map(|e| e.id.as_str()),
        }
    }

    /// Position of the entry with this id
    #[must_use]
    pub fn position_by_id(&self, id: &str) -> Option<usize> {
        match self {
            Self::Items(items) => items.iter().position(|i| i.id == id),
            Self::UiMapping(entries) => entries.iter().position(|e| e.id == id),
        }
    }

    /// Position of the first entry whose text equals `text`
    ///
    /// UI mapping entries match on their product term.
    #[must_use]
    pub fn position_by_text(&self, text: &str) -> Option<usize> {
        match self {
            Self::Items(items) => items.iter().position(|i| i.text == text),
            Self::UiMapping(entries) => entries.iter().position(|e| e.product_term == text),
        }
    }

    /// Whether an entry carries this id
    #[inline]
    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.position_by_id(id).is_some()
    }

    /// All identifiers in order
    #[must_use]
    pub fn ids(&self) -> Vec<&'a str> {
        (0..self.len()).filter_map(|i| self.id_at(i)).collect()
    }
}

/// Mutable collection view
#[derive(Debug)]
pub enum CollectionMut<'a> {
    /// `{id, text}` entries
    Items(&'a mut Vec<Item>),
    /// UI mapping entries
    UiMapping(&'a mut Vec<UiMappingEntry>),
}

impl CollectionMut<'_> {
    /// Append an entry
    ///
    /// # Errors
    /// Returns the entry back when its shape does not fit the collection
    pub fn push(&mut self, entry: Entry) -> Result<(), Entry> {
        match (self, entry) {
            (Self::Items(items), Entry::Item(item)) => items.push(item),
            (Self::UiMapping(entries), Entry::UiMapping(mapping)) => entries.push(mapping),
            (_, entry) => return Err(entry),
        }
        Ok(())
    }

    /// Substitute the entry at `index` in place
    ///
    /// # Errors
    /// Returns the entry back on shape mismatch or out-of-range index
    pub fn replace(&mut self, index: usize, entry: Entry) -> Result<(), Entry> {
        match (self, entry) {
            (Self::Items(items), Entry::Item(item)) if index < items.len() => {
                items[index] = item;
            }
            (Self::UiMapping(entries), Entry::UiMapping(mapping)) if index < entries.len() => {
                entries[index] = mapping;
            }
            (_, entry) => return Err(entry),
        }
        Ok(())
    }

    /// Delete the entry at `index`, returning its id
    pub fn remove(&mut self, index: usize) -> Option<String> {
        match self {
            Self::Items(items) if index < items.len() => Some(items.remove(index).id),
            Self::UiMapping(entries) if index < entries.len() => Some(entries.remove(index).id),
            _ => None,
        }
    }
}
