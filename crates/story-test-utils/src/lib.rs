//! Testing utilities for the story workspace
//!
//! Scripted capabilities, a bundle that keeps typed handles to them, and
//! document and corpus fixtures.

#![allow(missing_docs)]

mod scripted;

pub use scripted::{
    rubric_json, Reply, ScriptedAdvisor, ScriptedCorpusJudge, ScriptedDiscoverer, ScriptedExtractor,
    ScriptedJudge, ScriptedRewriter,
};

use std::sync::Arc;
use story_document::{Document, Item, Narrative, RelatedStory, RelationshipKind, StoryInterconnections};
use story_engine::{Advisor, Capabilities, StoryInput};

/// Scripted capabilities with typed handles kept for assertions
#[derive(Debug, Clone)]
pub struct ScriptedCapabilities {
    pub discoverer: Arc<ScriptedDiscoverer>,
    pub advisors: Vec<Arc<ScriptedAdvisor>>,
    pub judge: Arc<ScriptedJudge>,
    pub rewriter: Arc<ScriptedRewriter>,
    pub extractor: Arc<ScriptedExtractor>,
    pub corpus_judge: Arc<ScriptedCorpusJudge>,
}

impl Default for ScriptedCapabilities {
    /// Approving judge, echoing rewriter, nothing discovered or extracted
    fn default() -> Self {
        Self {
            discoverer: Arc::new(ScriptedDiscoverer::default()),
            advisors: Vec::new(),
            judge: Arc::new(ScriptedJudge::new(4.0)),
            rewriter: Arc::new(ScriptedRewriter::new()),
            extractor: Arc::new(ScriptedExtractor::new()),
            corpus_judge: Arc::new(ScriptedCorpusJudge::default()),
        }
    }
}

impl ScriptedCapabilities {
    /// Trait-object bundle for the pipeline
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            discoverer: self.discoverer.clone(),
            advisors: self
                .advisors
                .iter()
                .map(|a| Arc::clone(a) as Arc<dyn Advisor>)
                .collect(),
            judge: self.judge.clone(),
            rewriter: self.rewriter.clone(),
            extractor: self.extractor.clone(),
            corpus_judge: self.corpus_judge.clone(),
        }
    }
}

/// Seed with a generic shopper narrative
#[must_use]
pub fn seed(id: &str, title: &str) -> StoryInput {
    StoryInput::new(
        id,
        title,
        Narrative::new("shopper", format!("to {}", title.to_lowercase()), "I finish my order"),
    )
}

/// Three shop stories: browse, cart, checkout
#[must_use]
pub fn shop_corpus() -> Vec<StoryInput> {
    vec![
        seed("story-1", "Browse catalog"),
        seed("story-2", "Manage cart"),
        seed("story-3", "Checkout"),
    ]
}

/// Record with one relationship
#[must_use]
pub fn linked(story_id: &str, target: &str, relationship: RelationshipKind) -> StoryInterconnections {
    let mut record = StoryInterconnections::new(story_id);
    record.add_related(RelatedStory::new(target, relationship));
    record
}

/// Checkout document with a few sections filled
#[must_use]
pub fn checkout_document() -> Document {
    let mut doc = Document::new("Checkout").with_story(Narrative::new(
        "returning shopper",
        "to pay with my saved card",
        "checkout takes seconds",
    ));
    doc.user_visible_behavior
        .push(Item::new("UVB-1", "Pay button shows the saved card"));
    doc.outcome_acceptance_criteria
        .push(Item::new("AC-OUT-1", "User sees confirmation"));
    doc.edge_cases.push(Item::new("EDGE-1", "Card declined"));
    doc
}
