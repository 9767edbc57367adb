//! Rubric judge
//!
//! Wraps the [`Judge`] capability: sends rendered text, parses the JSON
//! rubric strictly, and folds in duplicate sections found locally by the
//! section reader. Anything unparseable becomes
//! [`EvaluationError::MalformedOutput`]; a parsed rubric with a low score is
//! a perfectly good result.

use crate::capability::{Judge, JudgeRequest};
use crate::error::{EvaluationError, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use story_render::{duplicate_sections, read_sections};

/// Highest score on every scale
pub const MAX_SCORE: f64 = 5.0;

/// Scored rubric dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    /// Behavior is described as what the user sees
    UserObservability,
    /// Technical detail lives under Implementation Notes
    TechnicalSeparation,
    /// Acceptance criteria can be checked
    Testability,
    Completeness,
    Consistency,
}

impl Dimension {
    /// Every dimension, in report order
    pub const ALL: [Self; 5] = [
        Self::UserObservability,
        Self::TechnicalSeparation,
        Self::Testability,
        Self::Completeness,
        Self::Consistency,
    ];

    /// Wire key
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::UserObservability => "userObservability",
            Self::TechnicalSeparation => "technicalSeparation",
            Self::Testability => "testability",
            Self::Completeness => "completeness",
            Self::Consistency => "consistency",
        }
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Score of one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// What kind of problem a violation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationCategory {
    /// Technical content in a user-facing section
    Technical,
    /// Repeated content or section
    Duplicate,
    /// Required content absent
    Missing,
    /// Vague or untestable wording
    Ambiguous,
    #[default]
    #[serde(other)]
    Other,
}

/// One offending passage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Offending text, quoted verbatim from the document
    pub text: String,
    pub reason: String,
    #[serde(default)]
    pub category: ViolationCategory,
    /// Implementation-notes key or heading where technical text belongs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_section: Option<String>,
}

impl Violation {
    /// Technical violation
    #[must_use]
    pub fn technical(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reason: reason.into(),
            category: ViolationCategory::Technical,
            target_section: None,
        }
    }

    /// Direct the moved text to an implementation-notes subsection
    #[must_use]
    pub fn into_section(mut self, section: impl Into<String>) -> Self {
        self.target_section = Some(section.into());
        self
    }
}

/// Judge's advice; the loop itself decides on score alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Recommendation {
    Approve,
    Rewrite,
    ManualReview,
}

/// A level-2 section that occurs more than once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSection {
    pub section: String,
    pub count: usize,
}

/// Parsed judge output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeRubric {
    pub dimensions: BTreeMap<Dimension, DimensionScore>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    pub overall_score: f64,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub duplicate_sections: Vec<DuplicateSection>,
}

impl JudgeRubric {
    /// Whether the score clears `threshold`
    #[inline]
    #[must_use]
    pub fn passes(&self, threshold: f64) -> bool {
        self.overall_score >= threshold
    }

    /// Violations of one category
    pub fn violations_of(&self, category: ViolationCategory) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.category == category)
    }

    /// Parse and range-check a raw judge reply
    ///
    /// # Errors
    /// Returns a description of the first problem found
    pub fn parse(raw: &str) -> Result<Self, String> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawScore {
            Plain(f64),
            Detailed(DimensionScore),
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawRubric {
            dimensions: BTreeMap<String, RawScore>,
            #[serde(default)]
            violations: Vec<Violation>,
            overall_score: f64,
            recommendation: Recommendation,
            #[serde(default)]
            duplicate_sections: Vec<DuplicateSection>,
        }

        let raw: RawRubric = serde_json::from_str(raw.trim()).map_err(|e| e.to_string())?;
        check_score("overallScore", raw.overall_score)?;

        let mut dimensions = BTreeMap::new();
        for dimension in Dimension::ALL {
            let score = match raw.dimensions.get(dimension.key()) {
                None => return Err(format!("missing dimension {dimension}")),
                Some(RawScore::Plain(score)) => DimensionScore {
                    score: *score,
                    notes: None,
                },
                Some(RawScore::Detailed(score)) => score.clone(),
            };
            check_score(dimension.key(), score.score)?;
            dimensions.insert(dimension, score);
        }

        Ok(Self {
            dimensions,
            violations: raw.violations,
            overall_score: raw.overall_score,
            recommendation: raw.recommendation,
            duplicate_sections: raw.duplicate_sections,
        })
    }

    /// Fold locally detected duplicates into the judge's list
    ///
    /// Counts for a section reported by both take the larger value.
    pub fn merge_duplicates(&mut self, found: impl IntoIterator<Item = (String, usize)>) {
        for (section, count) in found {
            match self
                .duplicate_sections
                .iter_mut()
                .find(|d| d.section.trim().eq_ignore_ascii_case(section.trim()))
            {
                Some(existing) => existing.count = existing.count.max(count),
                None => self.duplicate_sections.push(DuplicateSection { section, count }),
            }
        }
    }
}

fn check_score(name: &str, score: f64) -> Result<(), String> {
    if score.is_finite() && (0.0..=MAX_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(format!("{name} {score} is outside 0..=5"))
    }
}

/// Rubric judge over an injected [`Judge`] capability
#[derive(Clone)]
pub struct RubricJudge {
    judge: Arc<dyn Judge>,
}

impl fmt::Debug for RubricJudge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RubricJudge").finish_non_exhaustive()
    }
}

impl RubricJudge {
    /// Create judge
    #[inline]
    #[must_use]
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    /// Score rendered text
    ///
    /// # Errors
    /// Returns [`EvaluationError`] when the judge call fails or its reply
    /// cannot be read as a rubric
    pub async fn evaluate(
        &self,
        story_id: &str,
        text: &str,
        corpus_summary: &str,
        attempt: u8,
    ) -> Result<JudgeRubric, EvaluationError> {
        let stage = if attempt > 1 { Stage::ReJudge } else { Stage::Judge };
        let request = JudgeRequest {
            story_id: story_id.to_string(),
            text: text.to_string(),
            corpus_summary: corpus_summary.to_string(),
            attempt,
        };

        let raw = self
            .judge
            .score(&request)
            .await
            .map_err(|source| EvaluationError::failed(stage, story_id, source))?;
        let mut rubric =
            JudgeRubric::parse(&raw).map_err(|detail| EvaluationError::malformed(stage, story_id, detail))?;

        rubric.merge_duplicates(duplicate_sections(&read_sections(text)));
        tracing::debug!(
            story = story_id,
            attempt,
            score = rubric.overall_score,
            violations = rubric.violations.len(),
            duplicates = rubric.duplicate_sections.len(),
            "judged story"
        );
        Ok(rubric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rubric_json, FixedJudge};

    #[test]
    fn parses_mixed_dimension_shapes() {
        let rubric = JudgeRubric::parse(&rubric_json(2.8)).unwrap();
        assert_eq!(rubric.dimensions.len(), 5);
        assert_eq!(
            rubric.dimensions[&Dimension::TechnicalSeparation].notes.as_deref(),
            Some("ok")
        );
        assert_eq!(rubric.violations[0].category, ViolationCategory::Technical);
        assert_eq!(rubric.violations[0].target_section.as_deref(), Some("apiContracts"));
        assert!(!rubric.passes(3.5));
        assert_eq!(rubric.violations_of(ViolationCategory::Technical).count(), 1);
    }

    #[test]
    fn missing_dimension_is_malformed() {
        let raw = r#"{"dimensions":{"userObservability":4},"overallScore":4,"recommendation":"approve"}"#;
        let err = JudgeRubric::parse(raw).unwrap_err();
        assert_eq!(err, "missing dimension technicalSeparation");
    }

    #[test]
    fn out_of_range_score_is_malformed() {
        let err = JudgeRubric::parse(&rubric_json(7.0)).unwrap_err();
        assert!(err.contains("outside 0..=5"));
    }

    #[test]
    fn unknown_category_falls_back_to_other() {
        let v: Violation =
            serde_json::from_str(r#"{"text":"x","reason":"y","category":"tone"}"#).unwrap();
        assert_eq!(v.category, ViolationCategory::Other);
    }

    #[test]
    fn merge_keeps_larger_count() {
        let mut rubric = JudgeRubric::parse(&rubric_json(3.0)).unwrap();
        rubric.duplicate_sections.push(DuplicateSection {
            section: "Edge Cases".into(),
            count: 2,
        });
        rubric.merge_duplicates([("edge cases".to_string(), 3), ("Story".to_string(), 2)]);
        assert_eq!(
            rubric.duplicate_sections,
            vec![
                DuplicateSection {
                    section: "Edge Cases".into(),
                    count: 3
                },
                DuplicateSection {
                    section: "Story".into(),
                    count: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn call_failure_is_evaluation_error_not_low_score() {
        let judge = RubricJudge::new(Arc::new(FixedJudge::failing("rate limited")));
        let err = judge.evaluate("story-1", "# T\n", "", 1).await.unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::CapabilityFailed {
                stage: Stage::Judge,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn garbage_reply_is_malformed() {
        let judge = RubricJudge::new(Arc::new(FixedJudge::raw(["looks good to me!"])));
        let err = judge.evaluate("story-1", "# T\n", "", 2).await.unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::MalformedOutput {
                stage: Stage::ReJudge,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn local_duplicates_are_reported() {
        let judge = RubricJudge::new(Arc::new(FixedJudge::scores([4.0])));
        let text = "# T\n\n## Edge Cases\n\n- a\n\n## Edge Cases\n\n- b\n";
        let rubric = judge.evaluate("story-1", text, "", 1).await.unwrap();
        assert_eq!(
            rubric.duplicate_sections,
            vec![DuplicateSection {
                section: "Edge Cases".into(),
                count: 2
            }]
        );
    }
}
