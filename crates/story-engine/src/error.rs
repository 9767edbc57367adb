//! Error types for the story engine
//!
//! Three kinds matter to callers:
//! - Structural: a malformed patch or configuration
//! - Semantic: content rules (ids, duplicates, orphans)
//! - Evaluation: an external capability could not run or answered garbage
//!
//! A low judge score is never an error.

use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use story_patch::{IssueKind, ValidationIssue};

/// Error raised by a capability implementation
///
/// Wraps `anyhow` so collaborators can attach whatever context they like.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct CapabilityError(#[from] anyhow::Error);

impl CapabilityError {
    /// Error from a message
    #[must_use]
    pub fn msg(message: impl Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }
}

/// Result of a capability call
pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Pipeline stage that made an external call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Discovery,
    Advise,
    Judge,
    ReJudge,
    Rewrite,
    Extract,
    CorpusJudge,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovery => "discovery",
            Self::Advise => "advise",
            Self::Judge => "judge",
            Self::ReJudge => "re-judge",
            Self::Rewrite => "rewrite",
            Self::Extract => "extract",
            Self::CorpusJudge => "corpus-judge",
        })
    }
}

/// An external call failed or its output could not be used
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// The capability itself failed
    #[error("{stage} call for {subject} failed: {source}")]
    CapabilityFailed {
        stage: Stage,
        subject: String,
        source: CapabilityError,
    },

    /// The capability answered, but not in the expected shape
    #[error("{stage} output for {subject} is malformed: {detail}")]
    MalformedOutput {
        stage: Stage,
        subject: String,
        detail: String,
    },
}

impl EvaluationError {
    /// Capability failure
    #[inline]
    pub fn failed(stage: Stage, subject: impl Into<String>, source: CapabilityError) -> Self {
        Self::CapabilityFailed {
            stage,
            subject: subject.into(),
            source,
        }
    }

    /// Unusable output
    #[inline]
    pub fn malformed(stage: Stage, subject: impl Into<String>, detail: impl Display) -> Self {
        Self::MalformedOutput {
            stage,
            subject: subject.into(),
            detail: detail.to_string(),
        }
    }

    /// Stage that failed
    #[inline]
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::CapabilityFailed { stage, .. } | Self::MalformedOutput { stage, .. } => *stage,
        }
    }
}

/// Rewrite could not produce a usable document
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    /// Rewriter call failed
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Nothing came back
    #[error("rewrite output is empty")]
    Empty,

    /// Output wrapped in a code fence
    #[error("rewrite output is wrapped in a code fence")]
    Fenced,

    /// Output lost sections the input had
    #[error("rewrite output is missing {}", .missing.join(", "))]
    Partial { missing: Vec<String> },
}

impl RewriteError {
    /// True for degenerate output as opposed to a failed call
    #[inline]
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !matches!(self, Self::Evaluation(_))
    }
}

/// Configuration could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File unreadable
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Not valid TOML for this schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("{field} {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Stories with no recorded relationship to any other story
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("orphan stories: {}", .orphans.join(", "))]
pub struct OrphanError {
    pub orphans: Vec<String>,
}

/// Caller-facing error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Structural,
    Semantic,
    Evaluation,
}

impl From<IssueKind> for ErrorKind {
    fn from(kind: IssueKind) -> Self {
        match kind {
            IssueKind::Structural => Self::Structural,
            IssueKind::Semantic => Self::Semantic,
        }
    }
}

/// Umbrella engine error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Patch failed validation
    #[error("invalid patch: {0}")]
    Validation(#[from] ValidationIssue),

    /// External call failed
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Rewrite failed
    #[error("rewrite failed: {0}")]
    Rewrite(#[from] RewriteError),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Orphan stories remain
    #[error(transparent)]
    Orphans(#[from] OrphanError),

    /// Empty corpus or similar misuse
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    /// Which kind of failure this is
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(issue) => issue.kind().into(),
            Self::Evaluation(_) => ErrorKind::Evaluation,
            Self::Rewrite(RewriteError::Evaluation(_)) => ErrorKind::Evaluation,
            Self::Rewrite(_) | Self::Orphans(_) => ErrorKind::Semantic,
            Self::Config(_) | Self::InvalidInput(_) => ErrorKind::Structural,
        }
    }
}

/// Engine result type
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_is_never_content() {
        let err: EngineError = EvaluationError::malformed(Stage::Judge, "story-1", "no overallScore").into();
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert_eq!(
            err.to_string(),
            "evaluation failed: judge output for story-1 is malformed: no overallScore"
        );

        let rewrite: EngineError = RewriteError::Evaluation(EvaluationError::failed(
            Stage::Rewrite,
            "story-1",
            CapabilityError::msg("timeout"),
        ))
        .into();
        assert_eq!(rewrite.kind(), ErrorKind::Evaluation);
    }

    #[test]
    fn degenerate_rewrites_are_semantic() {
        let err = RewriteError::Partial {
            missing: vec!["## Story".into(), "## Edge Cases".into()],
        };
        assert!(err.is_degenerate());
        assert_eq!(err.to_string(), "rewrite output is missing ## Story, ## Edge Cases");
        assert_eq!(EngineError::from(err).kind(), ErrorKind::Semantic);
    }

    #[test]
    fn validation_kind_is_preserved() {
        assert_eq!(
            EngineError::from(ValidationIssue::MissingPath).kind(),
            ErrorKind::Structural
        );
    }

    #[test]
    fn stage_names_are_kebab_case() {
        assert_eq!(Stage::ReJudge.to_string(), "re-judge");
        assert_eq!(
            serde_json::to_value(Stage::CorpusJudge).unwrap(),
            serde_json::json!("corpus-judge")
        );
    }
}
