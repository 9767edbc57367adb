//! Story Engine
//!
//! Drives a corpus of user stories from seed to refined, cross-linked
//! documents:
//!
//! - [`RubricJudge`]: scores rendered text, separating failed calls from low scores
//! - [`StoryRewriter`]: accepts or refuses rewrites, then moves technical lines
//!   and merges duplicate sections deterministically
//! - [`RefinementController`]: judge, at most one rewrite, re-judge
//! - [`StoryGraph`] and [`ConsistencyEngine`]: Pass 2 interconnections and
//!   corpus-wide fixes
//! - [`StoryPipeline`]: all of the above, end to end
//!
//! Every external call goes through a capability trait in [`capability`],
//! so any model client (or a scripted fake) can be plugged in.
//!
//! # Example
//!
//! ```rust,ignore
//! use story_engine::{Capabilities, EngineConfig, StoryInput, StoryPipeline};
//! use story_document::Narrative;
//!
//! # async fn example(capabilities: Capabilities) -> story_engine::Result<()> {
//! let pipeline = StoryPipeline::new(capabilities, EngineConfig::from_toml_file("engine.toml")?)?;
//! let report = pipeline
//!     .run(
//!         "Online shop",
//!         vec![StoryInput::new("story-1", "Checkout", Narrative::new("shopper", "to pay", "I get my order"))],
//!     )
//!     .await?;
//! report.check_links()?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod capability;
pub mod config;
pub mod consistency;
pub mod error;
pub mod interconnect;
pub mod judge;
pub mod pipeline;
pub mod refinement;
pub mod rewriter;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use capability::{
    Advisor, AdvisorRequest, Capabilities, CorpusContext, CorpusJudge, CorpusJudgeRequest, Discoverer,
    ExtractionRequest, InterconnectionExtractor, Judge, JudgeRequest, RewriteRequest, Rewriter,
};
pub use config::{ConsistencyConfig, EngineConfig, RefinementConfig, TelemetryConfig};
pub use consistency::{
    apply_fixes, ConsistencyEngine, ConsistencyFix, ConsistencyOutcome, CorpusIssue, CorpusVerdict, FailedFix,
    FixAction, FixReport,
};
pub use error::{
    CapabilityError, CapabilityResult, ConfigError, EngineError, ErrorKind, EvaluationError, OrphanError, Result,
    RewriteError, Stage,
};
pub use interconnect::{extract_all, parse_interconnections, ExtractionJob, LinkIssue, StoryGraph};
pub use judge::{
    Dimension, DimensionScore, DuplicateSection, JudgeRubric, Recommendation, RubricJudge, Violation,
    ViolationCategory, MAX_SCORE,
};
pub use pipeline::{
    parse_mentions, AdvisorRun, CorpusReport, StageFailure, StoryInput, StoryPipeline, StoryReport, StoryStatus,
};
pub use refinement::{
    FlagReason, RefinementController, RefinementOutcome, RefinementReport, RefinementState, Transition,
};
pub use rewriter::{check_degenerate, consolidate, StoryRewriter};
pub use telemetry::{init_tracing, RunId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
