//! In-crate fakes for unit tests

use crate::capability::{Judge, JudgeRequest, RewriteRequest, Rewriter};
use crate::error::{CapabilityError, CapabilityResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rubric JSON with every dimension at `score` and one technical violation
pub(crate) fn rubric_json(score: f64) -> String {
    format!(
        r#"{{"dimensions":{{"userObservability":{score},"technicalSeparation":{{"score":{score},"notes":"ok"}},
            "testability":{score},"completeness":{score},"consistency":{score}}},
           "violations":[{{"text":"POST /payments","reason":"API detail","category":"technical","targetSection":"apiContracts"}}],
           "overallScore":{score},"recommendation":"rewrite"}}"#
    )
}

/// Replies in order; an `Err` entry simulates a failed call
pub(crate) struct FixedJudge {
    replies: Mutex<VecDeque<Result<String, String>>>,
    pub(crate) calls: AtomicUsize,
}

impl FixedJudge {
    pub(crate) fn raw<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn scores(scores: impl IntoIterator<Item = f64>) -> Self {
        Self::raw(scores.into_iter().map(rubric_json))
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Judge for FixedJudge {
    async fn score(&self, _request: &JudgeRequest) -> CapabilityResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().pop_front();
        match next {
            Some(Ok(raw)) => Ok(raw),
            Some(Err(message)) => Err(CapabilityError::msg(message)),
            None => Err(CapabilityError::msg("no scripted judge reply left")),
        }
    }
}

/// Returns one fixed reply, or fails
pub(crate) struct FixedRewriter(pub(crate) Result<String, String>);

#[async_trait]
impl Rewriter for FixedRewriter {
    async fn rewrite(&self, _request: &RewriteRequest) -> CapabilityResult<String> {
        self.0.clone().map_err(CapabilityError::msg)
    }
}
