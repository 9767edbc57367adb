//! Refinement loop controller
//!
//! ```text
//! GENERATED → JUDGED ─ score ≥ threshold ─────────────────────────────→ APPROVED
//!                   └─ else → REWRITING → REWRITTEN → RE-JUDGED ─ pass → APPROVED
//!                                                              └─ else → FLAGGED
//! ```
//!
//! The judge runs at most twice per story. Flagging is terminal for the
//! story but never an error.

use crate::config::RefinementConfig;
use crate::error::{EvaluationError, RewriteError};
use crate::judge::{JudgeRubric, RubricJudge};
use crate::rewriter::StoryRewriter;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// Loop state, recorded in order on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefinementState {
    Generated,
    Judged,
    Rewriting,
    Rewritten,
    ReJudged,
    Approved,
    Flagged,
}

impl Display for RefinementState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Generated => "GENERATED",
            Self::Judged => "JUDGED",
            Self::Rewriting => "REWRITING",
            Self::Rewritten => "REWRITTEN",
            Self::ReJudged => "RE-JUDGED",
            Self::Approved => "APPROVED",
            Self::Flagged => "FLAGGED",
        })
    }
}

/// One entry of the refinement trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub state: RefinementState,
    /// Score known at this point, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Why a story needs manual review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagReason {
    /// Re-judged below threshold
    LowQualityAfterRewrite,
    /// Rewrite output was empty, fenced or partial
    RewriteRejected,
    /// Rewriting is switched off in configuration
    RewriteDisabled,
}

impl Display for FlagReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LowQualityAfterRewrite => "low-quality-after-rewrite",
            Self::RewriteRejected => "rewrite-rejected",
            Self::RewriteDisabled => "rewrite-disabled",
        })
    }
}

/// Terminal result of the loop
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RefinementOutcome {
    Approved {
        score: f64,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Flagged {
        needs_review: bool,
        reason: FlagReason,
        score: f64,
        /// Best text available: the rewrite when it was accepted
        text: String,
    },
}

impl RefinementOutcome {
    fn flagged(reason: FlagReason, score: f64, text: String) -> Self {
        Self::Flagged {
            needs_review: true,
            reason,
            score,
            text,
        }
    }

    /// Final score
    #[must_use]
    pub fn score(&self) -> f64 {
        match self {
            Self::Approved { score, .. } | Self::Flagged { score, .. } => *score,
        }
    }

    /// Final text
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Approved { text, .. } | Self::Flagged { text, .. } => text,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Everything the loop observed for one story
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementReport {
    pub outcome: RefinementOutcome,
    pub trace: Vec<Transition>,
    /// Rubrics in judgement order; never more than two
    pub rubrics: Vec<JudgeRubric>,
    /// Why a rewrite was refused, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_error: Option<String>,
}

impl RefinementReport {
    /// Number of judge invocations
    #[inline]
    #[must_use]
    pub fn judge_calls(&self) -> usize {
        self.rubrics.len()
    }

    /// States in order
    pub fn states(&self) -> impl Iterator<Item = RefinementState> + '_ {
        self.trace.iter().map(|t| t.state)
    }
}

struct Trace {
    story_id: String,
    entries: Vec<Transition>,
}

impl Trace {
    fn new(story_id: &str) -> Self {
        let mut trace = Self {
            story_id: story_id.to_string(),
            entries: Vec::new(),
        };
        trace.record(RefinementState::Generated, None);
        trace
    }

    fn record(&mut self, state: RefinementState, score: Option<f64>) {
        tracing::info!(story = %self.story_id, %state, ?score, "refinement transition");
        self.entries.push(Transition { state, score });
    }
}

/// Drives one story from generated text to approval or manual review
#[derive(Debug, Clone)]
pub struct RefinementController {
    judge: RubricJudge,
    rewriter: StoryRewriter,
    config: RefinementConfig,
}

impl RefinementController {
    /// Create controller
    #[inline]
    #[must_use]
    pub fn new(judge: RubricJudge, rewriter: StoryRewriter, config: RefinementConfig) -> Self {
        Self {
            judge,
            rewriter,
            config,
        }
    }

    /// Approval threshold in use
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.config.approval_threshold
    }

    /// Run the loop
    ///
    /// # Errors
    /// Returns [`EvaluationError`] when a judge or rewrite call fails or
    /// answers in an unreadable shape. A low score is not an error.
    pub async fn refine(
        &self,
        story_id: &str,
        text: &str,
        corpus_summary: &str,
    ) -> Result<RefinementReport, EvaluationError> {
        let threshold = self.config.approval_threshold;
        let mut trace = Trace::new(story_id);

        let first = self.judge.evaluate(story_id, text, corpus_summary, 1).await?;
        let first_score = first.overall_score;
        trace.record(RefinementState::Judged, Some(first_score));

        if first.passes(threshold) {
            trace.record(RefinementState::Approved, Some(first_score));
            return Ok(Self::finish(
                trace,
                vec![first],
                RefinementOutcome::Approved {
                    score: first_score,
                    text: text.to_string(),
                },
                None,
            ));
        }

        if !self.config.rewrite_enabled {
            trace.record(RefinementState::Flagged, Some(first_score));
            let outcome = RefinementOutcome::flagged(FlagReason::RewriteDisabled, first_score, text.to_string());
            return Ok(Self::finish(trace, vec![first], outcome, None));
        }

        trace.record(RefinementState::Rewriting, Some(first_score));
        let rewritten = match self.rewriter.rewrite(story_id, text, &first).await {
            Ok(rewritten) => rewritten,
            Err(RewriteError::Evaluation(err)) => return Err(err),
            Err(degenerate) => {
                tracing::warn!(story = story_id, error = %degenerate, "rewrite rejected");
                trace.record(RefinementState::Flagged, Some(first_score));
                let outcome = RefinementOutcome::flagged(FlagReason::RewriteRejected, first_score, text.to_string());
                return Ok(Self::finish(trace, vec![first], outcome, Some(degenerate.to_string())));
            }
        };
        trace.record(RefinementState::Rewritten, None);

        let second = self.judge.evaluate(story_id, &rewritten, corpus_summary, 2).await?;
        let second_score = second.overall_score;
        trace.record(RefinementState::ReJudged, Some(second_score));

        let outcome = if second.passes(threshold) {
            trace.record(RefinementState::Approved, Some(second_score));
            RefinementOutcome::Approved {
                score: second_score,
                text: rewritten,
            }
        } else {
            tracing::warn!(story = story_id, score = second_score, threshold, "flagged for manual review");
            trace.record(RefinementState::Flagged, Some(second_score));
            RefinementOutcome::flagged(FlagReason::LowQualityAfterRewrite, second_score, rewritten)
        };
        Ok(Self::finish(trace, vec![first, second], outcome, None))
    }

    fn finish(
        trace: Trace,
        rubrics: Vec<JudgeRubric>,
        outcome: RefinementOutcome,
        rewrite_error: Option<String>,
    ) -> RefinementReport {
        RefinementReport {
            outcome,
            trace: trace.entries,
            rubrics,
            rewrite_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::testing::{FixedJudge, FixedRewriter};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use super::RefinementState::*;

    const TEXT: &str = "# Checkout\n\n## Story\n\n- **As a** shopper\n";

    fn controller(judge: Arc<FixedJudge>, rewrite: Result<String, String>) -> RefinementController {
        RefinementController::new(
            RubricJudge::new(judge),
            StoryRewriter::new(Arc::new(FixedRewriter(rewrite))),
            RefinementConfig::default(),
        )
    }

    #[tokio::test]
    async fn approves_on_first_pass() {
        let judge = Arc::new(FixedJudge::scores([4.1]));
        let report = controller(judge.clone(), Err("unused".into()))
            .refine("story-1", TEXT, "")
            .await
            .unwrap();
        assert_eq!(report.outcome, RefinementOutcome::Approved { score: 4.1, text: TEXT.into() });
        assert_eq!(report.states().collect::<Vec<_>>(), vec![Generated, Judged, Approved]);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn low_rejudge_is_flagged_after_two_calls() {
        let judge = Arc::new(FixedJudge::scores([2.8, 3.2, 5.0]));
        let report = controller(judge.clone(), Ok(TEXT.into()))
            .refine("story-1", TEXT, "")
            .await
            .unwrap();

        match &report.outcome {
            RefinementOutcome::Flagged { needs_review, reason, score, .. } => {
                assert!(*needs_review);
                assert_eq!(*reason, FlagReason::LowQualityAfterRewrite);
                assert!((score - 3.2).abs() < f64::EPSILON);
            }
            other => panic!("expected flagged, got {other:?}"),
        }
        assert_eq!(
            report.states().collect::<Vec<_>>(),
            vec![Generated, Judged, Rewriting, Rewritten, ReJudged, Flagged]
        );
        assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.judge_calls(), 2);
    }

    #[tokio::test]
    async fn degenerate_rewrite_keeps_first_score() {
        let judge = Arc::new(FixedJudge::scores([2.0]));
        let report = controller(judge.clone(), Ok("```\n# Checkout\n```".into()))
            .refine("story-1", TEXT, "")
            .await
            .unwrap();
        assert_eq!(
            report.outcome,
            RefinementOutcome::Flagged {
                needs_review: true,
                reason: FlagReason::RewriteRejected,
                score: 2.0,
                text: TEXT.into(),
            }
        );
        assert!(report.rewrite_error.is_some());
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_rewrite_flags_immediately() {
        let judge = Arc::new(FixedJudge::scores([1.5]));
        let config = RefinementConfig {
            rewrite_enabled: false,
            ..RefinementConfig::default()
        };
        let controller = RefinementController::new(
            RubricJudge::new(judge),
            StoryRewriter::new(Arc::new(FixedRewriter(Err("unused".into())))),
            config,
        );
        let report = controller.refine("story-1", TEXT, "").await.unwrap();
        assert!(matches!(
            report.outcome,
            RefinementOutcome::Flagged { reason: FlagReason::RewriteDisabled, .. }
        ));
    }

    #[tokio::test]
    async fn failures_are_errors_not_scores() {
        let judge = Arc::new(FixedJudge::failing("timeout"));
        let err = controller(judge, Ok(TEXT.into()))
            .refine("story-1", TEXT, "")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Judge);

        let judge = Arc::new(FixedJudge::scores([2.0]));
        let err = controller(judge, Err("rate limited".into()))
            .refine("story-1", TEXT, "")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Rewrite);
    }

    #[test]
    fn flagged_outcome_serializes_with_review_marker() {
        let outcome = RefinementOutcome::flagged(FlagReason::LowQualityAfterRewrite, 3.2, String::new());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "flagged");
        assert_eq!(json["needsReview"], true);
        assert_eq!(json["reason"], "low-quality-after-rewrite");
        assert_eq!(json["score"], 3.2);
    }
}
