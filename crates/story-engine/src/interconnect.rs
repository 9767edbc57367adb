//! Pass 2: interconnection extraction and the story graph
//!
//! Extraction is read-only over the converged stories and runs
//! concurrently, bounded by a semaphore. Results are merged into the
//! [`StoryGraph`] afterwards by a single writer, in story order, so the
//! merged graph does not depend on completion order.

use crate::capability::{CorpusContext, ExtractionRequest, InterconnectionExtractor};
use crate::error::{EvaluationError, OrphanError, Stage};
use indexmap::{IndexMap, IndexSet};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::Serialize;
use std::sync::Arc;
use story_document::{RelatedStory, StoryInterconnections};
use story_ids::RegistrySnapshot;
use tokio::sync::Semaphore;

/// Problem found while merging interconnections
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "issue", rename_all = "camelCase")]
pub enum LinkIssue {
    /// Contract dependency not issued by the registry; kept on the record
    #[error("{story_id} depends on unknown identifier {reference}")]
    #[serde(rename_all = "camelCase")]
    UnknownReference { story_id: String, reference: String },

    /// Relationship to a story outside the corpus; not added
    #[error("{story_id} relates to unknown story {target}")]
    #[serde(rename_all = "camelCase")]
    UnknownStory { story_id: String, target: String },

    /// Relationship from a story to itself; not added
    #[error("{story_id} relates to itself")]
    #[serde(rename_all = "camelCase")]
    SelfReference { story_id: String },
}

/// Shared graph of story relationships
///
/// Nodes are story indices in corpus order; the per-story records keep the
/// full detail (kinds, descriptions, ownership, UI mapping).
#[derive(Debug, Clone, Default)]
pub struct StoryGraph {
    ids: IndexSet<String>,
    graph: DiGraphMap<u32, ()>,
    links: IndexMap<String, StoryInterconnections>,
}

impl StoryGraph {
    /// Graph with one node per story and no edges
    #[must_use]
    pub fn new<I, S>(story_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self::default();
        for id in story_ids {
            let id = id.into();
            let (index, fresh) = graph.ids.insert_full(id.clone());
            if fresh {
                graph.graph.add_node(node(index));
                graph.links.insert(id.clone(), StoryInterconnections::new(id));
            }
        }
        graph
    }

    /// Number of stories
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `story_id` is part of the corpus
    #[inline]
    #[must_use]
    pub fn contains(&self, story_id: &str) -> bool {
        self.ids.contains(story_id)
    }

    /// Distinct linked story pairs
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Record for one story
    #[must_use]
    pub fn interconnections(&self, story_id: &str) -> Option<&StoryInterconnections> {
        self.links.get(story_id)
    }

    /// All records in corpus order
    pub fn iter(&self) -> impl Iterator<Item = &StoryInterconnections> {
        self.links.values()
    }

    pub(crate) fn record_mut(&mut self, story_id: &str) -> Option<&mut StoryInterconnections> {
        self.links.get_mut(story_id)
    }

    /// Merge one extracted record into the graph
    ///
    /// The record is filed under `story_id` whatever id it carries.
    /// Unknown contract dependencies are kept and reported; relationships to
    /// unknown stories or to the story itself are reported and dropped.
    pub fn merge(
        &mut self,
        story_id: &str,
        extracted: StoryInterconnections,
        known: &RegistrySnapshot,
    ) -> Vec<LinkIssue> {
        let mut issues = Vec::new();
        let Some(record) = self.links.get_mut(story_id) else {
            issues.push(LinkIssue::UnknownStory {
                story_id: story_id.to_string(),
                target: story_id.to_string(),
            });
            return issues;
        };

        for (term, component) in extracted.ui_mapping {
            record.ui_mapping.entry(term).or_insert(component);
        }
        for dependency in extracted.contract_dependencies {
            if !known.contains_id(&dependency) {
                issues.push(LinkIssue::UnknownReference {
                    story_id: story_id.to_string(),
                    reference: dependency.clone(),
                });
            }
            record.add_contract_dependency(dependency);
        }
        record.ownership.merge(&extracted.ownership);

        for related in extracted.related_stories {
            if let Err(issue) = self.add_relationship(story_id, related) {
                issues.push(issue);
            }
        }
        issues
    }

    /// Add one relationship
    ///
    /// Returns `Ok(true)` when the edge is new and `Ok(false)` when the same
    /// target and kind were already recorded.
    ///
    /// # Errors
    /// [`LinkIssue::SelfReference`] or [`LinkIssue::UnknownStory`]
    pub fn add_relationship(&mut self, from: &str, related: RelatedStory) -> Result<bool, LinkIssue> {
        if related.story_id == from {
            return Err(LinkIssue::SelfReference {
                story_id: from.to_string(),
            });
        }
        let (Some(source), Some(target)) = (self.ids.get_index_of(from), self.ids.get_index_of(&related.story_id))
        else {
            let target = if self.contains(from) { related.story_id.as_str() } else { from };
            return Err(LinkIssue::UnknownStory {
                story_id: from.to_string(),
                target: target.to_string(),
            });
        };

        let added = self
            .links
            .get_mut(from)
            .is_some_and(|record| record.add_related(related));
        self.graph.add_edge(node(source), node(target), ());
        Ok(added)
    }

    /// Stories no relationship mentions, as source or target
    ///
    /// A corpus of one story has none.
    #[must_use]
    pub fn orphans(&self) -> Vec<String> {
        if self.ids.len() <= 1 {
            return Vec::new();
        }
        self.ids
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                let n = node(*index);
                self.graph.neighbors_directed(n, Direction::Outgoing).next().is_none()
                    && self.graph.neighbors_directed(n, Direction::Incoming).next().is_none()
            })
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Enforce "no orphan stories"
    ///
    /// # Errors
    /// Lists every orphan
    pub fn check_links(&self) -> Result<(), OrphanError> {
        let orphans = self.orphans();
        if orphans.is_empty() {
            Ok(())
        } else {
            Err(OrphanError { orphans })
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn node(index: usize) -> u32 {
    index as u32
}

/// One story handed to extraction
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub story_id: String,
    /// Final rendered text
    pub text: String,
}

/// Parse an extractor reply
///
/// # Errors
/// [`EvaluationError::MalformedOutput`] when the reply is not a record
pub fn parse_interconnections(story_id: &str, raw: &str) -> Result<StoryInterconnections, EvaluationError> {
    let mut record: StoryInterconnections = serde_json::from_str(raw.trim())
        .map_err(|e| EvaluationError::malformed(Stage::Extract, story_id, e))?;
    record.story_id = story_id.to_string();
    Ok(record)
}

/// Extract every story concurrently, at most `concurrency` calls at a time
///
/// Results come back in job order.
pub async fn extract_all(
    extractor: Arc<dyn InterconnectionExtractor>,
    corpus: Arc<CorpusContext>,
    jobs: Vec<ExtractionJob>,
    concurrency: usize,
) -> Vec<(String, Result<StoryInterconnections, EvaluationError>)> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let tasks = jobs.into_iter().map(|job| {
        let semaphore = Arc::clone(&semaphore);
        let extractor = Arc::clone(&extractor);
        let corpus = Arc::clone(&corpus);
        async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    let request = ExtractionRequest {
                        story_id: job.story_id.clone(),
                        text: job.text,
                        corpus,
                    };
                    match extractor.extract(&request).await {
                        Ok(raw) => parse_interconnections(&job.story_id, &raw),
                        Err(source) => Err(EvaluationError::failed(Stage::Extract, &job.story_id, source)),
                    }
                }
                Err(closed) => Err(EvaluationError::failed(
                    Stage::Extract,
                    &job.story_id,
                    crate::error::CapabilityError::msg(closed.to_string()),
                )),
            };
            if let Err(err) = &outcome {
                tracing::warn!(story = %job.story_id, error = %err, "interconnection extraction failed");
            }
            (job.story_id, outcome)
        }
    });
    futures::future::join_all(tasks).await
}
