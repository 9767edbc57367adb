//! Patch wire types
//!
//! A [`Patch`] is a single proposed, typed edit to a [`Document`](crate::Document).
//! This is the fixed interchange shape between advisors and the engine:
//!
//! ```json
//! {"path": "outcomeAcceptanceCriteria", "op": "add",
//!  "item": {"id": "AC-OUT-1", "text": "User sees confirmation"},
//!  "metadata": {"advisorId": "validation"}}
//! ```
//!
//! Fields an advisor may omit stay optional here; the validator decides
//! whether a patch is well-formed.

use crate::document::{Entry, Item, UiMappingEntry};
use crate::fingerprint::Fingerprint;
use crate::path::CollectionPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Patch operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Append an entry
    Add,
    /// Substitute a matched entry or set a narrative line
    Replace,
    /// Delete a matched entry
    Remove,
    /// Missing or unrecognised `op`; rejected by validation
    #[default]
    #[serde(other)]
    Unknown,
}

impl Display for PatchOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
            Self::Unknown => "unknown",
        })
    }
}

/// Item payload of an `add` or `replace`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
}

impl PatchItem {
    /// `{id, text}` payload
    #[must_use]
    pub fn item(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Text-only payload for narrative lines
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// `{id, productTerm, componentName}` payload
    #[must_use]
    pub fn ui_mapping(
        id: impl Into<String>,
        product_term: impl Into<String>,
        component_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            product_term: Some(product_term.into()),
            component_name: Some(component_name.into()),
            ..Self::default()
        }
    }

    /// Build the stored entry for a collection, `None` if a required field is missing
    #[must_use]
    pub fn to_entry(&self, collection: CollectionPath) -> Option<Entry> {
        let id = self.id.clone()?;
        if collection.is_ui_mapping() {
            Some(Entry::UiMapping(UiMappingEntry {
                id,
                product_term: self.product_term.clone()?,
                component_name: self.component_name.clone()?,
            }))
        } else {
            Some(Entry::Item(Item {
                id,
                text: self.text.clone()?,
            }))
        }
    }
}

/// Selector for `replace`/`remove`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_equals: Option<String>,
}

impl PatchMatch {
    /// Match by identifier
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text_equals: None,
        }
    }

    /// Match by exact text
    #[must_use]
    pub fn by_text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text_equals: Some(text.into()),
        }
    }

    /// True when neither selector is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.text_equals.is_none()
    }
}

impl Display for PatchMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (&self.id, &self.text_equals) {
            (Some(id), _) => write!(f, "id \"{id}\""),
            (None, Some(text)) => write!(f, "text \"{text}\""),
            (None, None) => f.write_str("<empty match>"),
        }
    }
}

/// Patch provenance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_id: Option<String>,
    /// Any further advisor-supplied keys, carried through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PatchMetadata {
    /// Metadata naming the proposing advisor
    #[must_use]
    pub fn advisor(advisor_id: impl Into<String>) -> Self {
        Self {
            advisor_id: Some(advisor_id.into()),
            extra: BTreeMap::new(),
        }
    }
}

/// A single proposed edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Raw wire path; resolved by the validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub op: PatchOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<PatchItem>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<PatchMatch>,
    #[serde(default)]
    pub metadata: PatchMetadata,
}

impl Patch {
    /// `add` patch
    #[must_use]
    pub fn add(path: impl Into<String>, item: PatchItem, advisor_id: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            op: PatchOp::Add,
            item: Some(item),
            selector: None,
            metadata: PatchMetadata::advisor(advisor_id),
        }
    }

    /// `replace` patch; narrative lines take no selector
    #[must_use]
    pub fn replace(
        path: impl Into<String>,
        selector: Option<PatchMatch>,
        item: PatchItem,
        advisor_id: impl Into<String>,
    ) -> Self {
        Self {
            path: Some(path.into()),
            op: PatchOp::Replace,
            item: Some(item),
            selector,
            metadata: PatchMetadata::advisor(advisor_id),
        }
    }

    /// `remove` patch
    #[must_use]
    pub fn remove(
        path: impl Into<String>,
        selector: PatchMatch,
        advisor_id: impl Into<String>,
    ) -> Self {
        Self {
            path: Some(path.into()),
            op: PatchOp::Remove,
            item: None,
            selector: Some(selector),
            metadata: PatchMetadata::advisor(advisor_id),
        }
    }

    /// Proposing advisor, if stated
    #[inline]
    #[must_use]
    pub fn advisor_id(&self) -> Option<&str> {
        self.metadata.advisor_id.as_deref()
    }

    /// Parse an advisor reply
    ///
    /// Accepts either a bare JSON array of patches or an object with a
    /// `patches` array. An empty array is a legitimate "nothing to add".
    ///
    /// # Errors
    /// Returns error when the reply is not one of those shapes
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, PatchParseError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Reply {
            Bare(Vec<Patch>),
            Wrapped { patches: Vec<Patch> },
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PatchParseError::Empty);
        }
        match serde_json::from_str::<Reply>(trimmed) {
            Ok(Reply::Bare(patches) | Reply::Wrapped { patches }) => Ok(patches),
            Err(source) => Err(PatchParseError::Json(source)),
        }
    }
}

/// A batch of patches proposed against one document version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchBatch {
    /// Fingerprint of the document the proposer saw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Fingerprint>,
    pub patches: Vec<Patch>,
}

impl PatchBatch {
    /// Batch without a base check
    #[inline]
    #[must_use]
    pub fn new(patches: Vec<Patch>) -> Self {
        Self {
            base: None,
            patches,
        }
    }

    /// Require the document to still match `base`
    #[inline]
    #[must_use]
    pub fn against(mut self, base: Fingerprint) -> Self {
        self.base = Some(base);
        self
    }
}

/// Advisor reply could not be read as patches
#[derive(Debug, thiserror::Error)]
pub enum PatchParseError {
    /// Nothing at all came back
    #[error("advisor reply is empty")]
    Empty,

    /// Not a patch list
    #[error("advisor reply is not a patch list: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_matches_contract() {
        let patch = Patch::add(
            "outcomeAcceptanceCriteria",
            PatchItem::item("AC-OUT-1", "User sees confirmation"),
            "validation",
        );
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["path"], "outcomeAcceptanceCriteria");
        assert_eq!(json["op"], "add");
        assert_eq!(json["item"]["id"], "AC-OUT-1");
        assert_eq!(json["metadata"]["advisorId"], "validation");
        assert!(json.get("match").is_none());
    }

    #[test]
    fn parse_bare_and_wrapped_lists() {
        let bare = r#"[{"path":"edgeCases","op":"remove","match":{"textEquals":"x"},"metadata":{"advisorId":"a"}}]"#;
        let patches = Patch::parse_list(bare).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(
            patches[0].selector.as_ref().unwrap().text_equals.as_deref(),
            Some("x")
        );

        let wrapped = r#"{"patches": []}"#;
        assert!(Patch::parse_list(wrapped).unwrap().is_empty());
    }

    #[test]
    fn parse_failure_is_distinct_from_empty_list() {
        assert!(matches!(Patch::parse_list("  "), Err(PatchParseError::Empty)));
        assert!(matches!(
            Patch::parse_list("```json\n[]\n```"),
            Err(PatchParseError::Json(_))
        ));
        assert!(Patch::parse_list("[]").unwrap().is_empty());
    }

    #[test]
    fn missing_fields_survive_parsing() {
        let raw = r#"[{"op":"add","item":{"text":"no id"}}]"#;
        let patches = Patch::parse_list(raw).unwrap();
        assert!(patches[0].path.is_none());
        assert!(patches[0].advisor_id().is_none());
    }

    #[test]
    fn unrecognised_op_does_not_sink_the_list() {
        let raw = r#"[{"path":"edgeCases","op":"upsert"},{"path":"edgeCases"},{"path":"edgeCases","op":"remove","match":{"id":"EDGE-1"}}]"#;
        let ops: Vec<PatchOp> = Patch::parse_list(raw).unwrap().iter().map(|p| p.op).collect();
        assert_eq!(ops, vec![PatchOp::Unknown, PatchOp::Unknown, PatchOp::Remove]);
    }

    #[test]
    fn extra_metadata_is_kept() {
        let raw = r#"[{"path":"nonGoals","op":"add","item":{"id":"NON-GOAL-1","text":"t"},"metadata":{"advisorId":"scope","confidence":0.9}}]"#;
        let patches = Patch::parse_list(raw).unwrap();
        assert_eq!(patches[0].metadata.extra["confidence"], 0.9);
    }

    #[test]
    fn to_entry_follows_collection_shape() {
        let ui = PatchItem::ui_mapping("UI-MAP-1", "Cart", "CartDrawer");
        assert!(matches!(
            ui.to_entry(CollectionPath::UiMapping),
            Some(Entry::UiMapping(_))
        ));
        assert!(ui.to_entry(CollectionPath::EdgeCases).is_none());
        assert!(PatchItem::text("no id")
            .to_entry(CollectionPath::EdgeCases)
            .is_none());
    }
}
