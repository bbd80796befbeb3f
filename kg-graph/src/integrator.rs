//! Batch integration of one paper's extracted problems into the graph
//! (C18, §4.18). Per-mention failures are recorded and the batch
//! continues — a paper with one bad extraction should not lose the rest.

use kg_core::{new_trace_id, MatchConfidence};
use kg_extraction::ExtractedProblem;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auto_linker::AutoLinker;
use crate::embeddings::EmbeddingClient;
use crate::models::ProblemMention;
use crate::repository::Repository;

/// Outcome of integrating one extracted problem (§4.18).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionIntegrationResult {
    pub mention_id: String,
    pub concept_id: Option<String>,
    pub is_new_concept: bool,
    pub match_confidence: Option<MatchConfidence>,
    pub match_score: Option<f64>,
    pub auto_linked: bool,
    pub trace_id: String,
    pub error: Option<String>,
}

/// Aggregate outcome of integrating every problem extracted from one
/// paper (§4.18).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub paper_doi: String,
    pub trace_id: String,
    pub mentions_created: u32,
    pub mentions_linked: u32,
    pub mentions_new_concepts: u32,
    pub mention_results: Vec<MentionIntegrationResult>,
    pub errors: Vec<String>,
}

impl IntegrationResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct KgIntegrator<'a> {
    repo: &'a dyn Repository,
    embedder: &'a EmbeddingClient,
    linker: AutoLinker<'a>,
}

impl<'a> KgIntegrator<'a> {
    pub fn new(repo: &'a dyn Repository, embedder: &'a EmbeddingClient, linker: AutoLinker<'a>) -> Self {
        Self { repo, embedder, linker }
    }

    /// §4.18: integrate every problem extracted from one paper. Never
    /// aborts the batch on a per-mention error; the failure is recorded
    /// in `errors` and `mention_results` and processing continues.
    pub async fn integrate_extracted_problems(
        &self,
        extracted_problems: &[ExtractedProblem],
        paper_doi: &str,
        session_trace_id: Option<String>,
    ) -> IntegrationResult {
        let session_trace_id = session_trace_id.unwrap_or_else(|| format!("session-{}", new_trace_id()));
        let mut result = IntegrationResult {
            paper_doi: paper_doi.to_string(),
            trace_id: session_trace_id.clone(),
            mentions_created: 0,
            mentions_linked: 0,
            mentions_new_concepts: 0,
            mention_results: Vec::new(),
            errors: Vec::new(),
        };

        info!(
            trace_id = %session_trace_id,
            paper_doi,
            count = extracted_problems.len(),
            "integrating extracted problems"
        );

        for (idx, problem) in extracted_problems.iter().enumerate() {
            let trace_id = format!("{session_trace_id}-p{idx}");
            match self.process_one(problem, paper_doi, &trace_id).await {
                Ok(mention_result) => {
                    result.mentions_created += 1;
                    if mention_result.auto_linked {
                        result.mentions_linked += 1;
                    }
                    if mention_result.is_new_concept {
                        result.mentions_new_concepts += 1;
                    }
                    result.mention_results.push(mention_result);
                }
                Err(e) => {
                    let message = format!("failed to process problem {idx}: {e}");
                    error!(trace_id = %session_trace_id, "{message}");
                    result.errors.push(message);
                }
            }
        }

        info!(
            trace_id = %session_trace_id,
            created = result.mentions_created,
            linked = result.mentions_linked,
            new_concepts = result.mentions_new_concepts,
            "integration complete"
        );

        result
    }

    async fn process_one(
        &self,
        problem: &ExtractedProblem,
        paper_doi: &str,
        trace_id: &str,
    ) -> crate::error::GraphResult<MentionIntegrationResult> {
        let mut mention = ProblemMention::from_extracted(problem, paper_doi);

        let embedding = self.embedder.embed(&mention.statement).await?;
        mention.embedding = Some(embedding);

        self.repo.create_problem_mention(&mention).await?;
        info!(trace_id, mention_id = %mention.id, "stored problem mention");

        if let Some((concept, score, confidence)) =
            self.linker.auto_link_high_confidence(&mention, trace_id).await?
        {
            info!(trace_id, mention_id = %mention.id, concept_id = %concept.id, "auto-linked");
            return Ok(MentionIntegrationResult {
                mention_id: mention.id,
                concept_id: Some(concept.id),
                is_new_concept: false,
                match_confidence: Some(confidence),
                match_score: Some(score),
                auto_linked: true,
                trace_id: trace_id.to_string(),
                error: None,
            });
        }

        let concept = self.linker.create_new_concept(&mention, trace_id).await?;
        info!(trace_id, mention_id = %mention.id, concept_id = %concept.id, "new concept");
        Ok(MentionIntegrationResult {
            mention_id: mention.id,
            concept_id: Some(concept.id),
            is_new_concept: true,
            match_confidence: Some(MatchConfidence::High),
            match_score: Some(1.0),
            auto_linked: false,
            trace_id: trace_id.to_string(),
            error: None,
        })
    }
}

// No unit tests here: every path through `process_one` calls out to the
// embedding provider over HTTP, and (matching `embeddings.rs` itself,
// which isn't unit-tested either) nothing in this workspace's
// dependency stack mocks that transport. `concept_matcher` and
// `auto_linker` cover the matching/linking logic against pre-set
// embeddings instead.
