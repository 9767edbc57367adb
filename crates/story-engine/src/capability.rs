//! External capability seams
//!
//! Every call that leaves the process goes through one of these traits.
//! Implementations return raw text; the engine parses it so that a
//! malformed reply is always reported as an evaluation failure and never
//! mistaken for "nothing to add" or a low score.

use crate::error::CapabilityResult;
use crate::judge::{DuplicateSection, Violation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use story_document::SectionPath;

/// Read-only description of the whole corpus, shared with every call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusContext {
    /// Free-form product description
    pub description: String,
    /// `(story id, title)` for every story in the corpus
    pub stories: Vec<(String, String)>,
    /// Stable identifiers minted during discovery
    pub known_ids: Vec<String>,
}

impl CorpusContext {
    /// Short text summary for judge prompts
    #[must_use]
    pub fn summary(&self) -> String {
        let titles: Vec<String> = self
            .stories
            .iter()
            .map(|(id, title)| format!("{id}: {title}"))
            .collect();
        format!(
            "{}\nStories: {}\nKnown ids: {}",
            self.description.trim(),
            titles.join("; "),
            self.known_ids.join(", ")
        )
    }
}

/// Input to an advisor
#[derive(Debug, Clone)]
pub struct AdvisorRequest {
    pub story_id: String,
    /// Current rendered document
    pub text: String,
    pub corpus: Arc<CorpusContext>,
    /// Paths this advisor may touch
    pub paths: Vec<SectionPath>,
}

/// Proposes patches for one concern
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Advisor id stamped on its patches
    fn id(&self) -> &str;

    /// Paths this advisor may touch
    fn paths(&self) -> Vec<SectionPath>;

    /// Raw JSON reply: a patch array or `{"patches": [...]}`
    async fn propose(&self, request: &AdvisorRequest) -> CapabilityResult<String>;
}

/// Input to the rubric judge
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub story_id: String,
    pub text: String,
    pub corpus_summary: String,
    /// 1 for the first judgement, 2 after a rewrite
    pub attempt: u8,
}

/// Scores rendered text against the rubric
#[async_trait]
pub trait Judge: Send + Sync {
    /// Raw JSON rubric
    async fn score(&self, request: &JudgeRequest) -> CapabilityResult<String>;
}

/// Input to the rewriter
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub story_id: String,
    pub text: String,
    pub violations: Vec<Violation>,
    pub duplicate_sections: Vec<DuplicateSection>,
}

/// Produces a corrected full document
#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Corrected markdown document
    async fn rewrite(&self, request: &RewriteRequest) -> CapabilityResult<String>;
}

/// Finds system-level entities mentioned across the corpus
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Raw JSON array of `{"kind": "...", "name": "..."}`
    async fn discover(&self, corpus: &CorpusContext) -> CapabilityResult<String>;
}

/// Input to interconnection extraction
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub story_id: String,
    /// Final rendered document
    pub text: String,
    pub corpus: Arc<CorpusContext>,
}

/// Extracts one story's interconnections
#[async_trait]
pub trait InterconnectionExtractor: Send + Sync {
    /// Raw JSON `StoryInterconnections` (the story id may be omitted)
    async fn extract(&self, request: &ExtractionRequest) -> CapabilityResult<String>;
}

/// Input to the corpus-wide judge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusJudgeRequest {
    pub corpus: CorpusContext,
    pub interconnections: Vec<story_document::StoryInterconnections>,
    /// Stories with no relationship at the time of the call
    pub orphans: Vec<String>,
}

/// Judges the corpus as a whole
#[async_trait]
pub trait CorpusJudge: Send + Sync {
    /// Raw JSON `{"issues": [...], "fixes": [...]}`
    async fn judge(&self, request: &CorpusJudgeRequest) -> CapabilityResult<String>;
}

/// All capabilities one pipeline run needs
#[derive(Clone)]
pub struct Capabilities {
    pub discoverer: Arc<dyn Discoverer>,
    /// Run strictly in this order for every story
    pub advisors: Vec<Arc<dyn Advisor>>,
    pub judge: Arc<dyn Judge>,
    pub rewriter: Arc<dyn Rewriter>,
    pub extractor: Arc<dyn InterconnectionExtractor>,
    pub corpus_judge: Arc<dyn CorpusJudge>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let advisors: Vec<&str> = self.advisors.iter().map(|a| a.id()).collect();
        f.debug_struct("Capabilities")
            .field("advisors", &advisors)
            .finish_non_exhaustive()
    }
}
