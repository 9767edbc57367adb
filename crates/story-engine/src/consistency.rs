//! Pass 2b: corpus-wide consistency review
//!
//! The corpus judge sees every story's interconnections at once and answers
//! with `{issues, fixes}`. Fixes at or above the confidence threshold are
//! applied to the shared [`StoryGraph`] once, in the order the judge gave
//! them. Everything below the threshold is kept for manual review.

use crate::capability::{CorpusContext, CorpusJudge, CorpusJudgeRequest};
use crate::config::ConsistencyConfig;
use crate::error::{EvaluationError, Stage};
use crate::interconnect::{LinkIssue, StoryGraph};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use story_document::{Ownership, RelatedStory, RelationshipKind};
use story_ids::RegistrySnapshot;

/// Subject used on evaluation errors from the corpus judge
const CORPUS: &str = "corpus";

/// Corpus-level finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusIssue {
    pub description: String,
    #[serde(default)]
    pub stories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

/// What a fix changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FixAction {
    #[serde(rename_all = "camelCase")]
    AddRelationship {
        story_id: String,
        target_story_id: String,
        relationship: RelationshipKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AddContractDependency { story_id: String, contract_id: String },
    #[serde(rename_all = "camelCase")]
    AddOwnership { story_id: String, ownership: Ownership },
    #[serde(rename_all = "camelCase")]
    AddUiMapping {
        story_id: String,
        product_term: String,
        component_id: String,
    },
}

impl FixAction {
    /// Story the fix edits
    #[must_use]
    pub fn story_id(&self) -> &str {
        match self {
            Self::AddRelationship { story_id, .. }
            | Self::AddContractDependency { story_id, .. }
            | Self::AddOwnership { story_id, .. }
            | Self::AddUiMapping { story_id, .. } => story_id,
        }
    }
}

impl fmt::Display for FixAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddRelationship {
                story_id,
                target_story_id,
                relationship,
                ..
            } => write!(f, "{story_id} {relationship} {target_story_id}"),
            Self::AddContractDependency { story_id, contract_id } => {
                write!(f, "{story_id} depends on {contract_id}")
            }
            Self::AddOwnership { story_id, .. } => write!(f, "{story_id} ownership"),
            Self::AddUiMapping {
                story_id,
                product_term,
                component_id,
            } => write!(f, "{story_id} maps {product_term} to {component_id}"),
        }
    }
}

/// One proposed corpus fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyFix {
    #[serde(flatten)]
    pub action: FixAction,
    /// 0..=1
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Parsed corpus judge reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusVerdict {
    #[serde(default)]
    pub issues: Vec<CorpusIssue>,
    #[serde(default)]
    pub fixes: Vec<ConsistencyFix>,
}

impl CorpusVerdict {
    /// Parse and range-check a raw reply
    ///
    /// # Errors
    /// Returns a description of the first problem found
    pub fn parse(raw: &str) -> Result<Self, String> {
        let verdict: Self = serde_json::from_str(raw.trim()).map_err(|e| e.to_string())?;
        if let Some(fix) = verdict
            .fixes
            .iter()
            .find(|f| !(f.confidence.is_finite() && (0.0..=1.0).contains(&f.confidence)))
        {
            return Err(format!("confidence {} of fix \"{}\" is outside 0..=1", fix.confidence, fix.action));
        }
        Ok(verdict)
    }
}

/// A fix that cleared the threshold but could not be applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFix {
    pub fix: ConsistencyFix,
    pub reason: String,
}

/// Result of applying fixes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixReport {
    pub applied: Vec<ConsistencyFix>,
    /// Below the threshold; left for manual review
    pub deferred: Vec<ConsistencyFix>,
    pub failed: Vec<FailedFix>,
    /// Non-fatal findings raised while applying
    pub link_issues: Vec<LinkIssue>,
}

/// Full Pass 2b result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyOutcome {
    pub issues: Vec<CorpusIssue>,
    #[serde(flatten)]
    pub fixes: FixReport,
    pub orphans_before: Vec<String>,
    /// Orphan check re-run after auto-apply
    pub orphans_after: Vec<String>,
}

/// Apply fixes with `confidence ≥ threshold`, single pass, in order
pub fn apply_fixes(
    graph: &mut StoryGraph,
    fixes: Vec<ConsistencyFix>,
    threshold: f64,
    known: &RegistrySnapshot,
) -> FixReport {
    let mut report = FixReport::default();
    for fix in fixes {
        if fix.confidence < threshold {
            tracing::warn!(fix = %fix.action, confidence = fix.confidence, "fix deferred to manual review");
            report.deferred.push(fix);
            continue;
        }
        match apply_one(graph, &fix.action, known) {
            Ok(issue) => {
                tracing::debug!(fix = %fix.action, confidence = fix.confidence, "applied fix");
                report.link_issues.extend(issue);
                report.applied.push(fix);
            }
            Err(reason) => {
                tracing::warn!(fix = %fix.action, %reason, "fix not applicable");
                report.failed.push(FailedFix { fix, reason });
            }
        }
    }
    report
}

fn apply_one(
    graph: &mut StoryGraph,
    action: &FixAction,
    known: &RegistrySnapshot,
) -> Result<Option<LinkIssue>, String> {
    if let FixAction::AddRelationship {
        story_id,
        target_story_id,
        relationship,
        description,
    } = action
    {
        let mut related = RelatedStory::new(target_story_id.as_str(), *relationship);
        related.description.clone_from(description);
        return graph
            .add_relationship(story_id, related)
            .map(|_| None)
            .map_err(|issue| issue.to_string());
    }

    let story_id = action.story_id();
    let record = graph
        .record_mut(story_id)
        .ok_or_else(|| format!("unknown story {story_id}"))?;
    match action {
        FixAction::AddContractDependency { contract_id, .. } => {
            record.add_contract_dependency(contract_id.as_str());
            Ok((!known.contains_id(contract_id)).then(|| LinkIssue::UnknownReference {
                story_id: story_id.to_string(),
                reference: contract_id.clone(),
            }))
        }
        FixAction::AddOwnership { ownership, .. } => {
            record.ownership.merge(ownership);
            Ok(None)
        }
        FixAction::AddUiMapping {
            product_term,
            component_id,
            ..
        } => {
            record.ui_mapping.insert(product_term.clone(), component_id.clone());
            Ok(None)
        }
        FixAction::AddRelationship { .. } => Ok(None),
    }
}

/// Runs the corpus judge and auto-applies its fixes
#[derive(Clone)]
pub struct ConsistencyEngine {
    judge: Arc<dyn CorpusJudge>,
    config: ConsistencyConfig,
}

impl fmt::Debug for ConsistencyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistencyEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConsistencyEngine {
    /// Create engine
    #[inline]
    #[must_use]
    pub fn new(judge: Arc<dyn CorpusJudge>, config: ConsistencyConfig) -> Self {
        Self { judge, config }
    }

    /// Judge the corpus and apply confident fixes to `graph`
    ///
    /// # Errors
    /// [`EvaluationError`] when the corpus judge fails or answers garbage;
    /// `graph` is untouched in that case
    pub async fn review(
        &self,
        corpus: &CorpusContext,
        graph: &mut StoryGraph,
        known: &RegistrySnapshot,
    ) -> Result<ConsistencyOutcome, EvaluationError> {
        let orphans_before = graph.orphans();
        let request = CorpusJudgeRequest {
            corpus: corpus.clone(),
            interconnections: graph.iter().cloned().collect(),
            orphans: orphans_before.clone(),
        };
        let raw = self
            .judge
            .judge(&request)
            .await
            .map_err(|source| EvaluationError::failed(Stage::CorpusJudge, CORPUS, source))?;
        let verdict =
            CorpusVerdict::parse(&raw).map_err(|detail| EvaluationError::malformed(Stage::CorpusJudge, CORPUS, detail))?;

        let fixes = apply_fixes(graph, verdict.fixes, self.config.auto_apply_confidence, known);
        let orphans_after = graph.orphans();
        tracing::info!(
            issues = verdict.issues.len(),
            applied = fixes.applied.len(),
            deferred = fixes.deferred.len(),
            failed = fixes.failed.len(),
            orphans = orphans_after.len(),
            "consistency review finished"
        );
        Ok(ConsistencyOutcome {
            issues: verdict.issues,
            fixes,
            orphans_before,
            orphans_after,
        })
    }
}
