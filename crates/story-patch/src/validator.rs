//! Patch validation
//!
//! Structural problems (no path, no advisor, unknown op or path) stop validation
//! at once. Everything else is semantic and accumulates, so one patch with a
//! bad id, a wrong prefix and oversized text reports all three.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use story_document::{
    CollectionPath, CollectionRef, Document, Patch, PatchItem, PatchMatch, PatchOp,
    SectionPath, MAX_TEXT_LEN,
};

static ID_FORMAT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").ok());

/// Whether `id` uses only ASCII letters, digits, `_` and `-`
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    ID_FORMAT.as_ref().is_some_and(|re| re.is_match(id))
}

/// Whether a failure is about the patch's shape or its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    /// Malformed patch; validation stopped
    Structural,
    /// Id, format, duplicate, length or no-match problem
    Semantic,
}

/// One validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "issue", rename_all = "camelCase")]
pub enum ValidationIssue {
    #[error("Missing path")]
    MissingPath,

    #[error("Missing metadata.advisorId")]
    MissingAdvisorId,

    #[error("Unknown path \"{path}\"")]
    UnknownPath { path: String },

    #[error("Missing or unknown op")]
    UnknownOp,

    #[error("Missing item for {op} on {path}")]
    MissingItem { path: SectionPath, op: PatchOp },

    #[error("Missing {field} in {path}")]
    MissingText { path: SectionPath, field: &'static str },

    #[error("{field} in {path} exceeds {max} characters ({len})", max = MAX_TEXT_LEN)]
    TextTooLong {
        path: SectionPath,
        field: &'static str,
        len: usize,
    },

    #[error("Missing id in {path}")]
    MissingId { path: SectionPath },

    #[error("Invalid id format \"{id}\" in {path}")]
    InvalidIdFormat { path: SectionPath, id: String },

    #[error("Id \"{id}\" in {path} must start with \"{prefix}\"")]
    WrongPrefix {
        path: SectionPath,
        id: String,
        prefix: &'static str,
    },

    #[error("Duplicate id \"{id}\" in {path}")]
    DuplicateId { path: SectionPath, id: String },

    #[error("Narrative line {path} accepts only replace, got {op}")]
    NarrativeOp { path: SectionPath, op: PatchOp },

    #[error("{op} on {path} requires match.id or match.textEquals")]
    MissingMatch { path: SectionPath, op: PatchOp },

    #[error("No entry in {path} matches {selector}")]
    NoMatch { path: SectionPath, selector: String },
}

impl ValidationIssue {
    /// Structural or semantic
    #[must_use]
    pub const fn kind(&self) -> IssueKind {
        match self {
            Self::MissingPath
            | Self::MissingAdvisorId
            | Self::UnknownPath { .. }
            | Self::UnknownOp => IssueKind::Structural,
            _ => IssueKind::Semantic,
        }
    }
}

/// Outcome of validating one patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    /// Resolved path, when resolution got that far
    #[serde(skip)]
    pub path: Option<SectionPath>,
}

impl Validation {
    fn finish(path: Option<SectionPath>, errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            path,
        }
    }

    /// True when any issue is structural
    #[must_use]
    pub fn is_structural(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind() == IssueKind::Structural)
    }

    /// Error messages in report order
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Gate for proposed patches
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchValidator;

impl PatchValidator {
    /// Create new validator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate one patch against the current document
    #[must_use]
    pub fn validate(&self, patch: &Patch, document: &Document) -> Validation {
        let mut structural = Vec::new();
        let raw_path = patch.path.as_deref().map(str::trim).filter(|p| !p.is_empty());
        if raw_path.is_none() {
            structural.push(ValidationIssue::MissingPath);
        }
        if patch
            .advisor_id()
            .map_or(true, |advisor| advisor.trim().is_empty())
        {
            structural.push(ValidationIssue::MissingAdvisorId);
        }
        if patch.op == PatchOp::Unknown {
            structural.push(ValidationIssue::UnknownOp);
        }
        let Some(raw_path) = raw_path else {
            return Validation::finish(None, structural);
        };
        if !structural.is_empty() {
            return Validation::finish(None, structural);
        }
        let Some(path) = SectionPath::resolve(raw_path) else {
            return Validation::finish(
                None,
                vec![ValidationIssue::UnknownPath {
                    path: raw_path.to_string(),
                }],
            );
        };

        let errors = match path {
            SectionPath::Narrative(_) => narrative_issues(path, patch),
            SectionPath::Collection(collection) => {
                collection_issues(path, collection, patch, document)
            }
        };
        Validation::finish(Some(path), errors)
    }
}

fn narrative_issues(path: SectionPath, patch: &Patch) -> Vec<ValidationIssue> {
    let mut errors = Vec::new();
    if patch.op != PatchOp::Replace {
        errors.push(ValidationIssue::NarrativeOp { path, op: patch.op });
    }
    if patch.op == PatchOp::Remove {
        return errors;
    }
    match &patch.item {
        Some(item) => check_text(path, "text", item.text.as_deref(), &mut errors),
        None => errors.push(ValidationIssue::MissingItem { path, op: patch.op }),
    }
    errors
}

fn collection_issues(
    path: SectionPath,
    collection: CollectionPath,
    patch: &Patch,
    document: &Document,
) -> Vec<ValidationIssue> {
    let mut errors = Vec::new();
    let entries = document.collection(collection);

    let target = match patch.op {
        PatchOp::Add | PatchOp::Unknown => None,
        PatchOp::Replace | PatchOp::Remove => {
            match patch.selector.as_ref().filter(|m| !m.is_empty()) {
                None => {
                    errors.push(ValidationIssue::MissingMatch { path, op: patch.op });
                    None
                }
                Some(selector) => {
                    let found = resolve_match(entries, selector);
                    if found.is_none() {
                        errors.push(ValidationIssue::NoMatch {
                            path,
                            selector: selector.to_string(),
                        });
                    }
                    found
                }
            }
        }
    };

    if patch.op == PatchOp::Remove {
        return errors;
    }

    let Some(item) = &patch.item else {
        errors.push(ValidationIssue::MissingItem { path, op: patch.op });
        return errors;
    };

    check_payload(path, collection, item, &mut errors);

    if let Some(id) = item.id.as_deref() {
        let clash = entries.position_by_id(id);
        // an unresolved replace already carries MissingMatch or NoMatch
        let duplicate = match (patch.op, target) {
            (PatchOp::Add, _) => clash.is_some(),
            (_, Some(target)) => clash.is_some_and(|at| at != target),
            (_, None) => false,
        };
        if duplicate {
            errors.push(ValidationIssue::DuplicateId {
                path,
                id: id.to_string(),
            });
        }
    }
    errors
}

fn check_payload(
    path: SectionPath,
    collection: CollectionPath,
    item: &PatchItem,
    errors: &mut Vec<ValidationIssue>,
) {
    if collection.is_ui_mapping() {
        check_text(path, "productTerm", item.product_term.as_deref(), errors);
        check_text(path, "componentName", item.component_name.as_deref(), errors);
    } else {
        check_text(path, "text", item.text.as_deref(), errors);
    }

    match item.id.as_deref() {
        None | Some("") => errors.push(ValidationIssue::MissingId { path }),
        Some(id) => {
            if !is_valid_id(id) {
                errors.push(ValidationIssue::InvalidIdFormat {
                    path,
                    id: id.to_string(),
                });
            }
            let prefix = collection.id_prefix();
            if !id.starts_with(prefix) {
                errors.push(ValidationIssue::WrongPrefix {
                    path,
                    id: id.to_string(),
                    prefix,
                });
            }
        }
    }
}

fn check_text(
    path: SectionPath,
    field: &'static str,
    text: Option<&str>,
    errors: &mut Vec<ValidationIssue>,
) {
    match text {
        None => errors.push(ValidationIssue::MissingText { path, field }),
        Some(text) if text.trim().is_empty() => {
            errors.push(ValidationIssue::MissingText { path, field });
        }
        Some(text) => {
            let len = text.chars().count();
            if len > MAX_TEXT_LEN {
                errors.push(ValidationIssue::TextTooLong { path, field, len });
            }
        }
    }
}

/// Position of the entry a selector names
///
/// `id` wins when both keys are given.
#[must_use]
pub fn resolve_match(entries: CollectionRef<'_>, selector: &PatchMatch) -> Option<usize> {
    if let Some(id) = selector.id.as_deref() {
        return entries.position_by_id(id);
    }
    selector
        .text_equals
        .as_deref()
        .and_then(|text| entries.position_by_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_document::{Item, Narrative, PatchMetadata, UiMappingEntry};

    fn doc() -> Document {
        let mut doc = Document::new("Checkout").with_story(Narrative::new(
            "shopper",
            "to pay",
            "I finish",
        ));
        doc.outcome_acceptance_criteria
            .push(Item::new("AC-OUT-1", "User sees confirmation"));
        doc.outcome_acceptance_criteria
            .push(Item::new("AC-OUT-2", "User sees receipt"));
        doc.ui_mapping
            .push(UiMappingEntry::new("UI-MAP-1", "Pay button", "PayButton"));
        doc
    }

    fn validate(patch: &Patch) -> Validation {
        PatchValidator::new().validate(patch, &doc())
    }

    #[test]
    fn accepts_well_formed_add() {
        let patch = Patch::add(
            "outcomeAcceptanceCriteria",
            PatchItem::item("AC-OUT-3", "User is emailed"),
            "validation",
        );
        let v = validate(&patch);
        assert!(v.valid, "{:?}", v.errors);
        assert_eq!(
            v.path,
            Some(SectionPath::Collection(CollectionPath::OutcomeAcceptanceCriteria))
        );
    }

    #[test]
    fn duplicate_add_message() {
        let patch = Patch::add(
            "outcomeAcceptanceCriteria",
            PatchItem::item("AC-OUT-1", "Again"),
            "validation",
        );
        let v = validate(&patch);
        assert_eq!(
            v.messages(),
            vec![r#"Duplicate id "AC-OUT-1" in outcomeAcceptanceCriteria"#.to_string()]
        );
    }

    #[test]
    fn all_semantic_errors_are_reported_together() {
        let patch = Patch::add(
            "outcomeAcceptanceCriteria",
            PatchItem::item("bad id!", "x".repeat(MAX_TEXT_LEN + 1)),
            "validation",
        );
        let v = validate(&patch);
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 3);
        assert!(matches!(v.errors[0], ValidationIssue::TextTooLong { len: 501, .. }));
        assert!(matches!(v.errors[1], ValidationIssue::InvalidIdFormat { .. }));
        assert!(matches!(v.errors[2], ValidationIssue::WrongPrefix { prefix: "AC-OUT-", .. }));
        assert!(!v.is_structural());
    }

    #[test]
    fn missing_path_short_circuits() {
        let mut patch = Patch::add("x", PatchItem::default(), "validation");
        patch.path = None;
        let v = validate(&patch);
        assert_eq!(v.errors, vec![ValidationIssue::MissingPath]);
        assert!(v.is_structural());
    }

    #[test]
    fn missing_path_and_advisor_reported_together() {
        let mut patch = Patch::add("x", PatchItem::default(), "validation");
        patch.path = None;
        patch.metadata = PatchMetadata::default();
        let v = validate(&patch);
        assert_eq!(
            v.errors,
            vec![ValidationIssue::MissingPath, ValidationIssue::MissingAdvisorId]
        );
    }

    #[test]
    fn missing_advisor_short_circuits() {
        let mut patch = Patch::add(
            "outcomeAcceptanceCriteria",
            PatchItem::item("bad id", ""),
            "validation",
        );
        patch.metadata = PatchMetadata::advisor("  ");
        let v = validate(&patch);
        assert_eq!(v.errors, vec![ValidationIssue::MissingAdvisorId]);
    }

    #[test]
    fn unknown_op_is_structural() {
        let raw = r#"[{"path":"edgeCases","op":"upsert","item":{"id":"EDGE-9","text":"t"},"metadata":{"advisorId":"qa"}}]"#;
        let patches = Patch::parse_list(raw).unwrap();
        let v = validate(&patches[0]);
        assert_eq!(v.errors, vec![ValidationIssue::UnknownOp]);
        assert!(v.is_structural());
        assert_eq!(v.messages(), vec!["Missing or unknown op"]);
    }

    #[test]
    fn replace_with_unresolved_selector_reports_no_duplicate() {
        let no_match = Patch::replace(
            "outcomeAcceptanceCriteria",
            Some(PatchMatch::by_text("Nothing like this")),
            PatchItem::item("AC-OUT-2", "Changed"),
            "a",
        );
        assert!(matches!(
            validate(&no_match).errors[..],
            [ValidationIssue::NoMatch { .. }]
        ));
    }

    #[test]
    fn unknown_path_short_circuits() {
        let patch = Patch::add("implementationNotes", PatchItem::item("X", "y"), "a");
        let v = validate(&patch);
        assert_eq!(
            v.errors,
            vec![ValidationIssue::UnknownPath {
                path: "implementationNotes".into()
            }]
        );
        assert_eq!(v.messages(), vec![r#"Unknown path "implementationNotes""#]);
    }

    #[test]
    fn narrative_accepts_only_replace() {
        let ok = Patch::replace("story.iWant", None, PatchItem::text("to pay fast"), "a");
        assert!(validate(&ok).valid);

        let add = Patch::add("story.iWant", PatchItem::text("to pay fast"), "a");
        let v = validate(&add);
        assert_eq!(v.errors.len(), 1);
        assert!(matches!(v.errors[0], ValidationIssue::NarrativeOp { op: PatchOp::Add, .. }));

        let remove = Patch::remove("story.soThat", PatchMatch::by_text("I finish"), "a");
        assert!(!validate(&remove).valid);
    }

    #[test]
    fn narrative_text_must_be_present_and_bounded() {
        let empty = Patch::replace("story.asA", None, PatchItem::text("   "), "a");
        assert!(matches!(
            validate(&empty).errors[..],
            [ValidationIssue::MissingText { field: "text", .. }]
        ));

        let long = Patch::replace("story.asA", None, PatchItem::text("y".repeat(600)), "a");
        assert!(matches!(
            validate(&long).errors[..],
            [ValidationIssue::TextTooLong { len: 600, .. }]
        ));
    }

    #[test]
    fn replace_requires_selector_and_match() {
        let no_selector = Patch::replace(
            "outcomeAcceptanceCriteria",
            None,
            PatchItem::item("AC-OUT-1", "Changed"),
            "a",
        );
        assert!(matches!(
            validate(&no_selector).errors[..],
            [ValidationIssue::MissingMatch { .. }]
        ));

        let no_match = Patch::replace(
            "outcomeAcceptanceCriteria",
            Some(PatchMatch::by_id("AC-OUT-9")),
            PatchItem::item("AC-OUT-9", "Changed"),
            "a",
        );
        assert_eq!(
            validate(&no_match).messages(),
            vec![r#"No entry in outcomeAcceptanceCriteria matches id "AC-OUT-9""#]
        );
    }

    #[test]
    fn replace_may_keep_own_id_but_not_take_another() {
        let keep = Patch::replace(
            "outcomeAcceptanceCriteria",
            Some(PatchMatch::by_text("User sees receipt")),
            PatchItem::item("AC-OUT-2", "User sees an emailed receipt"),
            "a",
        );
        assert!(validate(&keep).valid);

        let steal = Patch::replace(
            "outcomeAcceptanceCriteria",
            Some(PatchMatch::by_id("AC-OUT-2")),
            PatchItem::item("AC-OUT-1", "Collides"),
            "a",
        );
        assert!(matches!(
            validate(&steal).errors[..],
            [ValidationIssue::DuplicateId { .. }]
        ));
    }

    #[test]
    fn remove_needs_no_item() {
        let remove = Patch::remove(
            "outcomeAcceptanceCriteria",
            PatchMatch::by_id("AC-OUT-2"),
            "a",
        );
        assert!(validate(&remove).valid);
    }

    #[test]
    fn ui_mapping_checks_both_fields() {
        let patch = Patch::add(
            "uiMapping",
            PatchItem {
                id: Some("UI-MAP-2".into()),
                product_term: Some("Cart".into()),
                ..PatchItem::default()
            },
            "ui",
        );
        assert!(matches!(
            validate(&patch).errors[..],
            [ValidationIssue::MissingText { field: "componentName", .. }]
        ));

        let by_term = Patch::remove("uiMapping", PatchMatch::by_text("Pay button"), "ui");
        assert!(validate(&by_term).valid);
    }

    #[test]
    fn implementation_note_prefix_is_enforced() {
        let patch = Patch::add(
            "implementationNotes.security",
            PatchItem::item("IMPL-FLOW-1", "Tokenise card"),
            "security",
        );
        assert_eq!(
            validate(&patch).messages(),
            vec![r#"Id "IMPL-FLOW-1" in implementationNotes.security must start with "IMPL-SEC-""#]
        );
    }
}
