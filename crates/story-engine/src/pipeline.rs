//! Corpus pipeline
//!
//! One run takes a corpus of story seeds through:
//!
//! 1. discovery: mint stable ids for every entity the corpus mentions, then
//!    freeze the registry
//! 2. per story: advisors in fixed order, each batch applied by the
//!    orchestrator, then render and refine
//! 3. Pass 2: concurrent interconnection extraction, merged into the story
//!    graph
//! 4. Pass 2b: corpus judge and single-pass auto-apply
//! 5. final artifacts: refined text plus interconnection metadata
//!
//! A story whose advisor, judge or rewrite call fails is recorded as
//! [`StoryStatus::EvaluationFailed`] and the rest of the corpus continues.

use crate::capability::{AdvisorRequest, Capabilities, CorpusContext};
use crate::config::EngineConfig;
use crate::consistency::{ConsistencyEngine, ConsistencyOutcome};
use crate::error::{EngineError, EvaluationError, OrphanError, Result, Stage};
use crate::interconnect::{extract_all, ExtractionJob, LinkIssue, StoryGraph};
use crate::judge::RubricJudge;
use crate::refinement::{RefinementController, RefinementReport};
use crate::rewriter::StoryRewriter;
use crate::telemetry::RunId;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use story_document::{Document, Narrative, Patch, PatchBatch};
use story_ids::{EntityKind, IdentifierRegistry, RegistrySnapshot};
use story_patch::{AppliedPatch, PatchOrchestrator, RejectedPatch};
use story_render::{append_interconnections, DocumentRenderer};
use tracing::Instrument;

/// Seed of one story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryInput {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub story: Narrative,
}

impl StoryInput {
    /// New seed
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, story: Narrative) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            story,
        }
    }
}

/// What one advisor did to one story
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorRun {
    pub advisor_id: String,
    pub applied: Vec<AppliedPatch>,
    pub rejected: Vec<RejectedPatch>,
}

/// Where a story ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryStatus {
    Approved,
    /// Flagged by the refinement loop
    NeedsReview,
    /// An external call failed; no refined text exists
    EvaluationFailed,
}

/// Failure recorded against one story or the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

impl From<&EvaluationError> for StageFailure {
    fn from(err: &EvaluationError) -> Self {
        Self {
            stage: err.stage(),
            message: err.to_string(),
        }
    }
}

/// Per-story result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryReport {
    pub story_id: String,
    pub title: String,
    pub status: StoryStatus,
    pub advisor_runs: Vec<AdvisorRun>,
    /// Document after every advisor batch
    pub document: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementReport>,
    /// Refined text plus interconnection metadata; empty when evaluation failed
    pub artifact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
}

impl StoryReport {
    /// Reached approval or manual review
    #[inline]
    #[must_use]
    pub fn converged(&self) -> bool {
        self.status != StoryStatus::EvaluationFailed
    }

    /// Text the refinement loop settled on
    #[must_use]
    pub fn refined_text(&self) -> Option<&str> {
        self.refinement.as_ref().map(|r| r.outcome.text())
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Frozen identifier registry
    pub registry: RegistrySnapshot,
    pub stories: Vec<StoryReport>,
    pub link_issues: Vec<LinkIssue>,
    /// Extraction failures, by story id
    pub extraction_failures: Vec<(String, StageFailure)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_failure: Option<StageFailure>,
    /// Converged stories still unlinked after auto-apply
    pub orphans: Vec<String>,
    pub links_required: bool,
}

impl CorpusReport {
    /// Report for one story
    #[must_use]
    pub fn story(&self, story_id: &str) -> Option<&StoryReport> {
        self.stories.iter().find(|s| s.story_id == story_id)
    }

    /// Stories with a given status
    pub fn with_status(&self, status: StoryStatus) -> impl Iterator<Item = &StoryReport> {
        self.stories.iter().filter(move |s| s.status == status)
    }

    /// Enforce "no orphan stories" when links are required
    ///
    /// # Errors
    /// Lists the orphans
    pub fn check_links(&self) -> std::result::Result<(), OrphanError> {
        if !self.links_required || self.orphans.is_empty() {
            return Ok(());
        }
        Err(OrphanError {
            orphans: self.orphans.clone(),
        })
    }
}

#[derive(Deserialize)]
struct Mention {
    kind: String,
    name: String,
}

/// Parse a discovery reply into `(kind, name)` pairs
///
/// # Errors
/// [`EvaluationError::MalformedOutput`] for anything but an array of
/// mentions with known kinds
pub fn parse_mentions(raw: &str) -> std::result::Result<Vec<(EntityKind, String)>, EvaluationError> {
    let mentions: Vec<Mention> = serde_json::from_str(raw.trim())
        .map_err(|e| EvaluationError::malformed(Stage::Discovery, "corpus", e))?;
    mentions
        .into_iter()
        .map(|m| {
            m.kind
                .parse::<EntityKind>()
                .map(|kind| (kind, m.name))
                .map_err(|e| EvaluationError::malformed(Stage::Discovery, "corpus", e))
        })
        .collect()
}

/// Runs a corpus end to end
pub struct StoryPipeline {
    capabilities: Capabilities,
    config: EngineConfig,
    orchestrator: PatchOrchestrator,
    renderer: DocumentRenderer,
    refinement: RefinementController,
    consistency: ConsistencyEngine,
}

impl std::fmt::Debug for StoryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryPipeline")
            .field("capabilities", &self.capabilities)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StoryPipeline {
    /// Create pipeline
    ///
    /// # Errors
    /// [`EngineError::Config`] when a threshold is out of range
    pub fn new(capabilities: Capabilities, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let refinement = RefinementController::new(
            RubricJudge::new(Arc::clone(&capabilities.judge)),
            StoryRewriter::new(Arc::clone(&capabilities.rewriter)),
            config.refinement,
        );
        let consistency = ConsistencyEngine::new(Arc::clone(&capabilities.corpus_judge), config.consistency);
        Ok(Self {
            capabilities,
            config,
            orchestrator: PatchOrchestrator::new(),
            renderer: DocumentRenderer::new(),
            refinement,
            consistency,
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the whole corpus
    ///
    /// # Errors
    /// [`EngineError::InvalidInput`] for an empty corpus or duplicate story
    /// ids; [`EngineError::Evaluation`] when discovery fails. Failures of
    /// later stages are recorded in the report.
    pub async fn run(&self, description: &str, stories: Vec<StoryInput>) -> Result<CorpusReport> {
        if stories.is_empty() {
            return Err(EngineError::InvalidInput("corpus has no stories".into()));
        }
        let mut seen = IndexSet::new();
        if let Some(duplicate) = stories.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(EngineError::InvalidInput(format!("duplicate story id {}", duplicate.id)));
        }

        let run_id = RunId::new();
        let span = tracing::info_span!("pipeline", run = %run_id, stories = stories.len());
        self.run_inner(run_id, description, stories).instrument(span).await
    }

    async fn run_inner(&self, run_id: RunId, description: &str, stories: Vec<StoryInput>) -> Result<CorpusReport> {
        let started_at = Utc::now();
        let mut corpus = CorpusContext {
            description: description.to_string(),
            stories: stories.iter().map(|s| (s.id.clone(), s.title.clone())).collect(),
            known_ids: Vec::new(),
        };

        let registry = self.discover(&corpus).await?;
        corpus.known_ids = registry.iter().map(|r| r.id.as_str().to_string()).collect();
        let corpus = Arc::new(corpus);

        let mut reports = Vec::with_capacity(stories.len());
        for input in stories {
            reports.push(self.process_story(input, &corpus).await);
        }

        let converged: Vec<&StoryReport> = reports.iter().filter(|r| r.converged()).collect();
        let mut graph = StoryGraph::new(converged.iter().map(|r| r.story_id.clone()));
        let jobs = converged
            .iter()
            .map(|r| ExtractionJob {
                story_id: r.story_id.clone(),
                text: r.refined_text().unwrap_or_default().to_string(),
            })
            .collect();
        let extracted = extract_all(
            Arc::clone(&self.capabilities.extractor),
            Arc::clone(&corpus),
            jobs,
            self.config.consistency.extraction_concurrency,
        )
        .await;

        let mut link_issues = Vec::new();
        let mut extraction_failures = Vec::new();
        for (story_id, outcome) in extracted {
            match outcome {
                Ok(record) => link_issues.extend(graph.merge(&story_id, record, &registry)),
                Err(err) => extraction_failures.push((story_id, StageFailure::from(&err))),
            }
        }

        let (consistency, consistency_failure) = match self.consistency.review(&corpus, &mut graph, &registry).await {
            Ok(outcome) => (Some(outcome), None),
            Err(err) => {
                tracing::warn!(error = %err, "corpus review failed");
                (None, Some(StageFailure::from(&err)))
            }
        };

        let links_required = self.config.consistency.require_links;
        let orphans = graph.orphans();
        if links_required && !orphans.is_empty() {
            tracing::warn!(orphans = ?orphans, "stories without relationships");
        }

        for report in &mut reports {
            let Some(record) = graph.interconnections(&report.story_id) else {
                continue;
            };
            if let Some(artifact) = report.refined_text().map(|text| append_interconnections(text, record)) {
                report.artifact = artifact;
            }
        }

        let finished_at = Utc::now();
        tracing::info!(
            approved = reports.iter().filter(|r| r.status == StoryStatus::Approved).count(),
            needs_review = reports.iter().filter(|r| r.status == StoryStatus::NeedsReview).count(),
            failed = reports.iter().filter(|r| !r.converged()).count(),
            links = graph.edge_count(),
            "pipeline finished"
        );
        Ok(CorpusReport {
            run_id,
            started_at,
            finished_at,
            registry,
            stories: reports,
            link_issues,
            extraction_failures,
            consistency,
            consistency_failure,
            orphans,
            links_required,
        })
    }

    async fn discover(&self, corpus: &CorpusContext) -> Result<RegistrySnapshot> {
        let raw = self
            .capabilities
            .discoverer
            .discover(corpus)
            .await
            .map_err(|source| EvaluationError::failed(Stage::Discovery, "corpus", source))?;
        let mentions = parse_mentions(&raw)?;

        let registry = IdentifierRegistry::new();
        let ids = registry.mint_all(mentions.iter().map(|(kind, name)| (*kind, name.as_str())));
        tracing::info!(mentions = mentions.len(), ids = registry.len(), "discovery finished");
        tracing::debug!(ids = ?ids, "minted identifiers");
        Ok(registry.freeze())
    }

    async fn process_story(&self, input: StoryInput, corpus: &Arc<CorpusContext>) -> StoryReport {
        let StoryInput { id, title, story } = input;
        tracing::info!(story = %id, "story started");
        let mut report = StoryReport {
            story_id: id.clone(),
            title: title.clone(),
            status: StoryStatus::EvaluationFailed,
            advisor_runs: Vec::new(),
            document: Document::new(title).with_story(story),
            refinement: None,
            artifact: String::new(),
            failure: None,
        };

        for advisor in &self.capabilities.advisors {
            let paths = advisor.paths();
            let request = AdvisorRequest {
                story_id: id.clone(),
                text: self.renderer.render(&report.document),
                corpus: Arc::clone(corpus),
                paths: paths.clone(),
            };
            let patches = match advisor.propose(&request).await {
                Ok(raw) => Patch::parse_list(&raw)
                    .map_err(|e| EvaluationError::malformed(Stage::Advise, format!("{id}/{}", advisor.id()), e)),
                Err(source) => Err(EvaluationError::failed(Stage::Advise, format!("{id}/{}", advisor.id()), source)),
            };
            let patches = match patches {
                Ok(patches) => patches,
                Err(err) => return Self::fail(report, &err),
            };

            let batch = match report.document.fingerprint() {
                Ok(base) => PatchBatch::new(patches).against(base),
                Err(error) => {
                    tracing::warn!(
                        story = %id,
                        advisor = advisor.id(),
                        %error,
                        "document fingerprint failed; batch has no base check"
                    );
                    PatchBatch::new(patches)
                }
            };
            let outcome = self.orchestrator.apply_scoped(&report.document, batch, Some(&paths));
            tracing::debug!(
                story = %id,
                advisor = advisor.id(),
                applied = outcome.applied.len(),
                rejected = outcome.rejected.len(),
                "advisor batch applied"
            );
            report.advisor_runs.push(AdvisorRun {
                advisor_id: advisor.id().to_string(),
                applied: outcome.applied,
                rejected: outcome.rejected,
            });
            report.document = outcome.document;
        }

        let rendered = self.renderer.render(&report.document);
        match self.refinement.refine(&id, &rendered, &corpus.summary()).await {
            Ok(refinement) => {
                report.status = if refinement.outcome.is_approved() {
                    StoryStatus::Approved
                } else {
                    StoryStatus::NeedsReview
                };
                report.artifact = refinement.outcome.text().to_string();
                report.refinement = Some(refinement);
                tracing::info!(story = %id, status = ?report.status, "story finished");
                report
            }
            Err(err) => Self::fail(report, &err),
        }
    }

    fn fail(mut report: StoryReport, err: &EvaluationError) -> StoryReport {
        tracing::warn!(story = %report.story_id, stage = %err.stage(), error = %err, "story evaluation failed");
        report.status = StoryStatus::EvaluationFailed;
        report.failure = Some(StageFailure::from(err));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_need_known_kinds() {
        let parsed = parse_mentions(r#"[{"kind":"component","name":"Login Button"},{"kind":"api","name":"Payments"}]"#)
            .unwrap();
        assert_eq!(parsed[1], (EntityKind::ApiContract, "Payments".to_string()));

        let err = parse_mentions(r#"[{"kind":"gizmo","name":"x"}]"#).unwrap_err();
        assert_eq!(err.stage(), Stage::Discovery);
        assert!(parse_mentions("{}").is_err());
    }

    #[test]
    fn link_check_honours_configuration() {
        let mut report = CorpusReport {
            run_id: RunId::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            registry: RegistrySnapshot::default(),
            stories: Vec::new(),
            link_issues: Vec::new(),
            extraction_failures: Vec::new(),
            consistency: None,
            consistency_failure: None,
            orphans: vec!["story-3".into()],
            links_required: true,
        };
        assert_eq!(report.check_links().unwrap_err().orphans, vec!["story-3"]);
        report.links_required = false;
        assert!(report.check_links().is_ok());
    }
}
