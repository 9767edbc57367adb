//! Batch application
//!
//! Applies a batch of patches to a working copy of a document. Each
//! `(path, target)` pair may be claimed by one patch per batch; the first
//! claim in batch order wins and later claimants are rejected with the
//! winner's index. The caller's document is never touched.

use crate::validator::{resolve_match, PatchValidator, ValidationIssue};
use indexmap::IndexMap;
use serde::Serialize;
use story_document::{
    Document, Fingerprint, Patch, PatchBatch, PatchOp, SectionPath,
};
use tracing::{debug, warn};

/// Why the orchestrator refused a patch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum RejectionReason {
    /// Failed validation
    #[error("invalid patch: {}", join_issues(.issues))]
    Invalid { issues: Vec<ValidationIssue> },

    /// Path not among the paths the proposing advisor may touch
    #[error("path \"{path}\" is outside the advisor's scope")]
    OutOfScope { path: String },

    /// Another patch in the batch already claimed the target
    #[error("conflicts with patch #{winner} on {path} target \"{target}\"")]
    Conflict {
        winner: usize,
        path: SectionPath,
        target: String,
    },

    /// Batch was proposed against a different document version
    #[error("stale base: expected {expected}, document is {actual}")]
    StaleBase {
        expected: Fingerprint,
        actual: String,
    },
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A patch that changed the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPatch {
    /// Position in the batch
    pub index: usize,
    pub advisor_id: String,
    pub path: SectionPath,
    pub op: PatchOp,
    /// Entry id affected; `None` for narrative lines
    pub target: Option<String>,
}

/// A patch the orchestrator refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedPatch {
    pub index: usize,
    pub advisor_id: Option<String>,
    pub reason: RejectionReason,
}

impl RejectedPatch {
    /// Validation issues, empty for non-validation rejections
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        match &self.reason {
            RejectionReason::Invalid { issues } => issues,
            _ => &[],
        }
    }
}

/// Result of applying one batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Updated document
    pub document: Document,
    pub applied: Vec<AppliedPatch>,
    pub rejected: Vec<RejectedPatch>,
}

impl BatchOutcome {
    /// True when no patch was rejected
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// True when at least one patch was applied
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Claim key: resolved path plus target id (empty for narrative lines)
type Claim = (SectionPath, String);

/// Applies validated patches, one winner per target
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOrchestrator {
    validator: PatchValidator,
}

impl PatchOrchestrator {
    /// Create new orchestrator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch with no scope restriction
    #[must_use]
    pub fn apply(&self, document: &Document, batch: PatchBatch) -> BatchOutcome {
        self.apply_scoped(document, batch, None)
    }

    /// Apply a batch, rejecting patches outside `scope` when given
    #[must_use]
    pub fn apply_scoped(
        &self,
        document: &Document,
        batch: PatchBatch,
        scope: Option<&[SectionPath]>,
    ) -> BatchOutcome {
        let PatchBatch { base, patches } = batch;

        if let Some(expected) = base {
            let actual = document.fingerprint();
            let fresh = matches!(&actual, Ok(current) if *current == expected);
            if !fresh {
                let actual = actual.map_or_else(|e| e.to_string(), |f| f.to_string());
                warn!(
                    expected = %expected.short(),
                    patches = patches.len(),
                    "rejecting stale patch batch"
                );
                let rejected = patches
                    .iter()
                    .enumerate()
                    .map(|(index, patch)| RejectedPatch {
                        index,
                        advisor_id: patch.advisor_id().map(str::to_string),
                        reason: RejectionReason::StaleBase {
                            expected,
                            actual: actual.clone(),
                        },
                    })
                    .collect();
                return BatchOutcome {
                    document: document.clone(),
                    applied: Vec::new(),
                    rejected,
                };
            }
        }

        let mut working = document.clone();
        let mut claims: IndexMap<Claim, usize> = IndexMap::new();
        let mut applied = Vec::new();
        let mut rejected = Vec::new();

        for (index, patch) in patches.iter().enumerate() {
            let advisor_id = patch.advisor_id().map(str::to_string);
            match self.apply_one(&mut working, &mut claims, index, patch, scope) {
                Ok(record) => {
                    debug!(
                        index,
                        advisor = %record.advisor_id,
                        path = %record.path,
                        op = %record.op,
                        target = record.target.as_deref().unwrap_or(""),
                        "applied patch"
                    );
                    applied.push(record);
                }
                Err(reason) => {
                    warn!(
                        index,
                        advisor = advisor_id.as_deref().unwrap_or("<none>"),
                        %reason,
                        "rejected patch"
                    );
                    rejected.push(RejectedPatch {
                        index,
                        advisor_id,
                        reason,
                    });
                }
            }
        }

        BatchOutcome {
            document: working,
            applied,
            rejected,
        }
    }

    fn apply_one(
        &self,
        working: &mut Document,
        claims: &mut IndexMap<Claim, usize>,
        index: usize,
        patch: &Patch,
        scope: Option<&[SectionPath]>,
    ) -> Result<AppliedPatch, RejectionReason> {
        if let (Some(scope), Some(path)) = (scope, patch.path.as_deref().and_then(SectionPath::resolve)) {
            if !scope.contains(&path) {
                return Err(RejectionReason::OutOfScope {
                    path: path.to_string(),
                });
            }
        }

        let key = claim_key(working, patch);
        if let Some(key) = &key {
            if let Some(&winner) = claims.get(key) {
                return Err(RejectionReason::Conflict {
                    winner,
                    path: key.0,
                    target: key.1.clone(),
                });
            }
        }

        let validation = self.validator.validate(patch, working);
        let path = match validation.path {
            Some(path) if validation.valid => path,
            _ => {
                return Err(RejectionReason::Invalid {
                    issues: validation.errors,
                })
            }
        };

        let target = mutate(working, path, patch).map_err(|issue| RejectionReason::Invalid {
            issues: vec![issue],
        })?;

        if let Some(key) = key {
            claims.insert(key, index);
        }
        if let Some(new_id) = &target {
            claims.entry((path, new_id.clone())).or_insert(index);
        }

        Ok(AppliedPatch {
            index,
            advisor_id: patch.advisor_id().unwrap_or_default().to_string(),
            path,
            op: patch.op,
            target,
        })
    }
}

/// Target a patch would claim, resolved against the working document
///
/// `textEquals` is resolved to the matched entry's id so that an id match
/// and a text match on the same entry compete for one claim.
fn claim_key(working: &Document, patch: &Patch) -> Option<Claim> {
    let path = SectionPath::resolve(patch.path.as_deref()?)?;
    let SectionPath::Collection(collection) = path else {
        return Some((path, String::new()));
    };
    let target = match patch.op {
        PatchOp::Unknown => return None,
        PatchOp::Add => patch.item.as_ref()?.id.clone()?,
        PatchOp::Replace | PatchOp::Remove => {
            let selector = patch.selector.as_ref()?;
            let entries = working.collection(collection);
            match resolve_match(entries, selector) {
                Some(position) => entries.id_at(position)?.to_string(),
                None => selector.id.clone()?,
            }
        }
    };
    Some((path, target))
}

/// Perform one already-validated mutation, returning the resulting entry id
fn mutate(
    working: &mut Document,
    path: SectionPath,
    patch: &Patch,
) -> Result<Option<String>, ValidationIssue> {
    let missing_item = || ValidationIssue::MissingItem { path, op: patch.op };

    match path {
        SectionPath::Narrative(field) => {
            let text = patch
                .item
                .as_ref()
                .and_then(|item| item.text.clone())
                .ok_or_else(missing_item)?;
            working.story.set(field, text);
            Ok(None)
        }
        SectionPath::Collection(collection) => {
            let no_match = || ValidationIssue::NoMatch {
                path,
                selector: patch
                    .selector
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            };
            let position = match patch.op {
                PatchOp::Unknown => return Err(ValidationIssue::UnknownOp),
                PatchOp::Add => None,
                PatchOp::Replace | PatchOp::Remove => {
                    let selector = patch.selector.as_ref().ok_or_else(no_match)?;
                    Some(resolve_match(working.collection(collection), selector).ok_or_else(no_match)?)
                }
            };

            let mut entries = working.collection_mut(collection);
            match (patch.op, position) {
                (PatchOp::Remove, Some(position)) => {
                    entries.remove(position).map(Some).ok_or_else(no_match)
                }
                (op, position) => {
                    let entry = patch
                        .item
                        .as_ref()
                        .and_then(|item| item.to_entry(collection))
                        .ok_or_else(missing_item)?;
                    let id = entry.id().to_string();
                    let result = match (op, position) {
                        (PatchOp::Replace, Some(position)) => entries.replace(position, entry),
                        _ => entries.push(entry),
                    };
                    result.map(|()| Some(id)).map_err(|_| missing_item())
                }
            }
        }
    }
}
