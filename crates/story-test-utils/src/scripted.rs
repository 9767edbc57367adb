//! Scripted capabilities
//!
//! Every fake answers per story id, falls back to a neutral default, and
//! counts its calls so tests can assert on invocation bounds.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use story_document::{Patch, SectionPath, StoryInterconnections};
use story_engine::{
    Advisor, AdvisorRequest, CapabilityError, CapabilityResult, CorpusContext, CorpusJudge, CorpusJudgeRequest,
    Discoverer, ExtractionRequest, InterconnectionExtractor, Judge, JudgeRequest, RewriteRequest, Rewriter,
};

/// Scripted reply: raw text, or a failed call with this message
pub type Reply = Result<String, String>;

fn answer(reply: Reply) -> CapabilityResult<String> {
    reply.map_err(CapabilityError::msg)
}

/// Rubric JSON with every dimension at `score`
#[must_use]
pub fn rubric_json(score: f64) -> String {
    format!(
        r#"{{"dimensions":{{"userObservability":{score},"technicalSeparation":{score},"testability":{score},"completeness":{score},"consistency":{score}}},"violations":[],"overallScore":{score},"recommendation":"{}"}}"#,
        if score >= 3.5 { "approve" } else { "rewrite" }
    )
}

/// Advisor with per-story replies; `[]` when nothing is scripted
#[derive(Debug)]
pub struct ScriptedAdvisor {
    id: String,
    paths: Vec<SectionPath>,
    replies: Mutex<HashMap<String, Reply>>,
    seen: Mutex<Vec<AdvisorRequest>>,
}

impl ScriptedAdvisor {
    /// Advisor allowed to touch `paths` (wire names)
    ///
    /// # Panics
    /// On an unknown path name
    #[must_use]
    pub fn new(id: &str, paths: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            paths: paths
                .iter()
                .map(|p| SectionPath::resolve(p).unwrap_or_else(|| panic!("unknown path {p}")))
                .collect(),
            replies: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Reply with these patches for `story_id`
    ///
    /// # Panics
    /// If the patches cannot be encoded
    #[must_use]
    pub fn with_patches(self, story_id: &str, patches: &[Patch]) -> Self {
        let raw = serde_json::to_string(patches).expect("patches encode");
        self.with_reply(story_id, Ok(raw))
    }

    /// Raw reply for `story_id`
    #[must_use]
    pub fn with_reply(self, story_id: &str, reply: Reply) -> Self {
        self.replies.lock().insert(story_id.to_string(), reply);
        self
    }

    /// Requests received, in order
    #[must_use]
    pub fn requests(&self) -> Vec<AdvisorRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    fn id(&self) -> &str {
        &self.id
    }

    fn paths(&self) -> Vec<SectionPath> {
        self.paths.clone()
    }

    async fn propose(&self, request: &AdvisorRequest) -> CapabilityResult<String> {
        self.seen.lock().push(request.clone());
        let reply = self
            .replies
            .lock()
            .get(&request.story_id)
            .cloned()
            .unwrap_or_else(|| Ok("[]".to_string()));
        answer(reply)
    }
}

/// Judge with per-story score queues and an invocation counter
#[derive(Debug)]
pub struct ScriptedJudge {
    default_score: f64,
    queues: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl ScriptedJudge {
    /// Judge that scores every unscripted story `default_score`
    #[must_use]
    pub fn new(default_score: f64) -> Self {
        Self {
            default_score,
            queues: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
        }
    }

    /// Scores for successive judgements of `story_id`
    #[must_use]
    pub fn with_scores(self, story_id: &str, scores: &[f64]) -> Self {
        let replies = scores.iter().map(|s| Ok(rubric_json(*s))).collect();
        self.queues.lock().insert(story_id.to_string(), replies);
        self
    }

    /// Raw replies for successive judgements of `story_id`
    #[must_use]
    pub fn with_replies(self, story_id: &str, replies: Vec<Reply>) -> Self {
        self.queues.lock().insert(story_id.to_string(), replies.into());
        self
    }

    /// Calls for one story
    #[must_use]
    pub fn calls_for(&self, story_id: &str) -> usize {
        self.calls.lock().get(story_id).copied().unwrap_or(0)
    }

    /// Calls across all stories
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn score(&self, request: &JudgeRequest) -> CapabilityResult<String> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().entry(request.story_id.clone()).or_default() += 1;
        let next = self
            .queues
            .lock()
            .get_mut(&request.story_id)
            .and_then(VecDeque::pop_front);
        answer(next.unwrap_or_else(|| Ok(rubric_json(self.default_score))))
    }
}

/// Rewriter that echoes its input unless a reply is scripted
#[derive(Debug, Default)]
pub struct ScriptedRewriter {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
}

impl ScriptedRewriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw reply for `story_id`
    #[must_use]
    pub fn with_reply(self, story_id: &str, reply: Reply) -> Self {
        self.replies.lock().insert(story_id.to_string(), reply);
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rewriter for ScriptedRewriter {
    async fn rewrite(&self, request: &RewriteRequest) -> CapabilityResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .get(&request.story_id)
            .cloned()
            .unwrap_or_else(|| Ok(request.text.clone()));
        answer(reply)
    }
}

/// Extractor with per-story records; empty record when unscripted
#[derive(Debug, Default)]
pub struct ScriptedExtractor {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `record` for its story
    ///
    /// # Panics
    /// If the record cannot be encoded
    #[must_use]
    pub fn with_record(self, record: &StoryInterconnections) -> Self {
        let raw = serde_json::to_string(record).expect("record encodes");
        self.with_reply(&record.story_id, Ok(raw))
    }

    /// Raw reply for `story_id`
    #[must_use]
    pub fn with_reply(self, story_id: &str, reply: Reply) -> Self {
        self.replies.lock().insert(story_id.to_string(), reply);
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InterconnectionExtractor for ScriptedExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> CapabilityResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .get(&request.story_id)
            .cloned()
            .unwrap_or_else(|| Ok("{}".to_string()));
        answer(reply)
    }
}

/// Corpus judge with one fixed verdict; records what it was shown
#[derive(Debug)]
pub struct ScriptedCorpusJudge {
    reply: Reply,
    seen: Mutex<Vec<CorpusJudgeRequest>>,
}

impl Default for ScriptedCorpusJudge {
    fn default() -> Self {
        Self::new(Ok(r#"{"issues":[],"fixes":[]}"#.to_string()))
    }
}

impl ScriptedCorpusJudge {
    #[must_use]
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Orphans reported to the judge on each call
    #[must_use]
    pub fn orphans_seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().iter().map(|r| r.orphans.clone()).collect()
    }
}

#[async_trait]
impl CorpusJudge for ScriptedCorpusJudge {
    async fn judge(&self, request: &CorpusJudgeRequest) -> CapabilityResult<String> {
        self.seen.lock().push(request.clone());
        answer(self.reply.clone())
    }
}

/// Discoverer returning fixed `(kind, name)` mentions
#[derive(Debug, Default)]
pub struct ScriptedDiscoverer {
    reply: Option<Reply>,
    mentions: Vec<(String, String)>,
}

impl ScriptedDiscoverer {
    /// Mentions as `(kind, name)`
    #[must_use]
    pub fn new(mentions: &[(&str, &str)]) -> Self {
        Self {
            reply: None,
            mentions: mentions
                .iter()
                .map(|(k, n)| ((*k).to_string(), (*n).to_string()))
                .collect(),
        }
    }

    /// Answer with a raw reply instead
    #[must_use]
    pub fn raw(reply: Reply) -> Self {
        Self {
            reply: Some(reply),
            mentions: Vec::new(),
        }
    }
}

#[async_trait]
impl Discoverer for ScriptedDiscoverer {
    async fn discover(&self, _corpus: &CorpusContext) -> CapabilityResult<String> {
        if let Some(reply) = &self.reply {
            return answer(reply.clone());
        }
        let mentions: Vec<serde_json::Value> = self
            .mentions
            .iter()
            .map(|(kind, name)| serde_json::json!({ "kind": kind, "name": name }))
            .collect();
        Ok(serde_json::Value::Array(mentions).to_string())
    }
}
