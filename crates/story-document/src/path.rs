//! Section paths addressing fields of a story document
//!
//! [`SectionPath`] is the closed set of places a patch may target: one of
//! the three narrative lines or one of the item collections. Every lookup
//! into a [`Document`](crate::Document) dispatches on it exhaustively, so a
//! new section is a compile error until every consumer handles it.
//!
//! The wire names and identifier prefixes below are a compatibility
//! contract with downstream tools and must not change.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Maximum length (in characters) of any item or narrative text
pub const MAX_TEXT_LEN: usize = 500;

/// One of the three narrative lines of a story
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NarrativeField {
    /// "As a ..."
    AsA,
    /// "I want ..."
    IWant,
    /// "So that ..."
    SoThat,
}

impl NarrativeField {
    /// All narrative lines in rendering order
    pub const ALL: [Self; 3] = [Self::AsA, Self::IWant, Self::SoThat];

    /// Wire name used in patch paths
    #[inline]
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::AsA => "story.asA",
            Self::IWant => "story.iWant",
            Self::SoThat => "story.soThat",
        }
    }

    /// Label used by the renderer
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AsA => "As a",
            Self::IWant => "I want",
            Self::SoThat => "So that",
        }
    }
}

/// Implementation-notes subsection key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImplNoteKey {
    /// Who owns which piece of state
    StateOwnership,
    /// How data moves between components
    DataFlow,
    /// Contracts with backend services
    ApiContracts,
    /// Loading, empty and error states
    LoadingStates,
    /// Performance budgets
    Performance,
    /// Security considerations
    Security,
    /// Telemetry and analytics events
    Telemetry,
}

impl ImplNoteKey {
    /// All keys in canonical order
    pub const ALL: [Self; 7] = [
        Self::StateOwnership,
        Self::DataFlow,
        Self::ApiContracts,
        Self::LoadingStates,
        Self::Performance,
        Self::Security,
        Self::Telemetry,
    ];

    /// Record key as it appears in JSON
    #[inline]
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::StateOwnership => "stateOwnership",
            Self::DataFlow => "dataFlow",
            Self::ApiContracts => "apiContracts",
            Self::LoadingStates => "loadingStates",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::Telemetry => "telemetry",
        }
    }

    /// Rendered subsection heading
    #[inline]
    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::StateOwnership => "State Ownership",
            Self::DataFlow => "Data Flow",
            Self::ApiContracts => "API Contracts",
            Self::LoadingStates => "Loading States",
            Self::Performance => "Performance",
            Self::Security => "Security",
            Self::Telemetry => "Telemetry",
        }
    }

    /// Parse a record key (`dataFlow`) or a rendered heading (`Data Flow`)
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.key() == raw || k.heading().eq_ignore_ascii_case(raw))
    }
}

/// An item collection of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectionPath {
    /// `userVisibleBehavior`
    UserVisibleBehavior,
    /// `outcomeAcceptanceCriteria`
    OutcomeAcceptanceCriteria,
    /// `systemAcceptanceCriteria`
    SystemAcceptanceCriteria,
    /// `implementationNotes.<key>`
    ImplementationNotes(ImplNoteKey),
    /// `uiMapping`
    UiMapping,
    /// `openQuestions`
    OpenQuestions,
    /// `edgeCases`
    EdgeCases,
    /// `nonGoals`
    NonGoals,
}

impl CollectionPath {
    /// Every collection in canonical rendering order
    pub const ALL: [Self; 14] = [
        Self::UserVisibleBehavior,
        Self::OutcomeAcceptanceCriteria,
        Self::SystemAcceptanceCriteria,
        Self::ImplementationNotes(ImplNoteKey::StateOwnership),
        Self::ImplementationNotes(ImplNoteKey::DataFlow),
        Self::ImplementationNotes(ImplNoteKey::ApiContracts),
        Self::ImplementationNotes(ImplNoteKey::LoadingStates),
        Self::ImplementationNotes(ImplNoteKey::Performance),
        Self::ImplementationNotes(ImplNoteKey::Security),
        Self::ImplementationNotes(ImplNoteKey::Telemetry),
        Self::UiMapping,
        Self::OpenQuestions,
        Self::EdgeCases,
        Self::NonGoals,
    ];

    /// Wire name used in patch paths
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::UserVisibleBehavior => "userVisibleBehavior",
            Self::OutcomeAcceptanceCriteria => "outcomeAcceptanceCriteria",
            Self::SystemAcceptanceCriteria => "systemAcceptanceCriteria",
            Self::ImplementationNotes(key) => match key {
                ImplNoteKey::StateOwnership => "implementationNotes.stateOwnership",
                ImplNoteKey::DataFlow => "implementationNotes.dataFlow",
                ImplNoteKey::ApiContracts => "implementationNotes.apiContracts",
                ImplNoteKey::LoadingStates => "implementationNotes.loadingStates",
                ImplNoteKey::Performance => "implementationNotes.performance",
                ImplNoteKey::Security => "implementationNotes.security",
                ImplNoteKey::Telemetry => "implementationNotes.telemetry",
            },
            Self::UiMapping => "uiMapping",
            Self::OpenQuestions => "openQuestions",
            Self::EdgeCases => "edgeCases",
            Self::NonGoals => "nonGoals",
        }
    }

    /// Identifier prefix every entry id in this collection must carry
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::UserVisibleBehavior => "UVB-",
            Self::OutcomeAcceptanceCriteria => "AC-OUT-",
            Self::SystemAcceptanceCriteria => "AC-SYS-",
            Self::ImplementationNotes(key) => match key {
                ImplNoteKey::StateOwnership => "IMPL-STATE-",
                ImplNoteKey::DataFlow => "IMPL-FLOW-",
                ImplNoteKey::ApiContracts => "IMPL-API-",
                ImplNoteKey::LoadingStates => "IMPL-LOAD-",
                ImplNoteKey::Performance => "IMPL-PERF-",
                ImplNoteKey::Security => "IMPL-SEC-",
                ImplNoteKey::Telemetry => "IMPL-TEL-",
            },
            Self::UiMapping => "UI-MAP-",
            Self::OpenQuestions => "QUESTION-",
            Self::EdgeCases => "EDGE-",
            Self::NonGoals => "NON-GOAL-",
        }
    }

    /// Rendered heading of the section holding this collection
    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::UserVisibleBehavior => "User-Visible Behavior",
            Self::OutcomeAcceptanceCriteria => "Outcome Acceptance Criteria",
            Self::SystemAcceptanceCriteria => "System Acceptance Criteria",
            Self::ImplementationNotes(key) => key.heading(),
            Self::UiMapping => "UI Mapping",
            Self::OpenQuestions => "Open Questions",
            Self::EdgeCases => "Edge Cases",
            Self::NonGoals => "Non-Goals",
        }
    }

    /// Whether entries are `{id, productTerm, componentName}` rather than `{id, text}`
    #[inline]
    #[must_use]
    pub const fn is_ui_mapping(self) -> bool {
        matches!(self, Self::UiMapping)
    }

    /// Whether the collection is read as product-facing behavior
    #[inline]
    #[must_use]
    pub const fn is_user_facing(self) -> bool {
        matches!(
            self,
            Self::UserVisibleBehavior | Self::OutcomeAcceptanceCriteria
        )
    }
}

/// Any patchable location in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionPath {
    /// A scalar narrative line (no identifier)
    Narrative(NarrativeField),
    /// An item collection
    Collection(CollectionPath),
}

impl SectionPath {
    /// Wire name used in patch paths
    #[inline]
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Narrative(field) => field.wire_name(),
            Self::Collection(collection) => collection.wire_name(),
        }
    }

    /// Resolve a wire name, `None` when it names neither a collection nor a narrative line
    #[must_use]
    pub fn resolve(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        NarrativeField::ALL
            .into_iter()
            .find(|f| f.wire_name() == raw)
            .map(Self::Narrative)
            .or_else(|| {
                CollectionPath::ALL
                    .into_iter()
                    .find(|c| c.wire_name() == raw)
                    .map(Self::Collection)
            })
    }

    /// Identifier prefix, `None` for narrative lines
    #[inline]
    #[must_use]
    pub const fn id_prefix(self) -> Option<&'static str> {
        match self {
            Self::Narrative(_) => None,
            Self::Collection(collection) => Some(collection.id_prefix()),
        }
    }
}

impl Display for SectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for SectionPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s).ok_or_else(|| PathError::Unknown(s.to_string()))
    }
}

impl serde::Serialize for SectionPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.wire_name())
    }
}

impl<'de> serde::Deserialize<'de> for SectionPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Path resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Neither a collection nor a narrative line
    #[error("unknown path \"{0}\"")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_wire_name_resolves_to_itself() {
        for field in NarrativeField::ALL {
            let path = SectionPath::Narrative(field);
            assert_eq!(SectionPath::resolve(path.wire_name()), Some(path));
        }
        for collection in CollectionPath::ALL {
            let path = SectionPath::Collection(collection);
            assert_eq!(SectionPath::resolve(path.wire_name()), Some(path));
        }
    }

    #[test]
    fn bare_implementation_notes_is_unknown() {
        assert!(SectionPath::resolve("implementationNotes").is_none());
        assert!(SectionPath::resolve("implementationNotes.unknown").is_none());
        assert!(matches!(
            "acceptanceCriteria".parse::<SectionPath>(),
            Err(PathError::Unknown(_))
        ));
    }

    #[test]
    fn prefix_table() {
        assert_eq!(CollectionPath::OutcomeAcceptanceCriteria.id_prefix(), "AC-OUT-");
        assert_eq!(
            CollectionPath::ImplementationNotes(ImplNoteKey::LoadingStates).id_prefix(),
            "IMPL-LOAD-"
        );
        assert_eq!(CollectionPath::NonGoals.id_prefix(), "NON-GOAL-");
        assert_eq!(SectionPath::Narrative(NarrativeField::IWant).id_prefix(), None);
    }

    #[test]
    fn impl_note_key_accepts_heading_or_key() {
        assert_eq!(ImplNoteKey::parse("dataFlow"), Some(ImplNoteKey::DataFlow));
        assert_eq!(ImplNoteKey::parse("api contracts"), Some(ImplNoteKey::ApiContracts));
        assert_eq!(ImplNoteKey::parse("nope"), None);
    }

    #[test]
    fn serde_round_trips_wire_name() {
        let path = SectionPath::Collection(CollectionPath::EdgeCases);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"edgeCases\"");
        let back: SectionPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
