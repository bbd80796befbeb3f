//! HIGH-confidence auto-linking (C17, §4.17). The transactional write
//! is split into the two [`Repository`] methods that do the equivalent
//! work over SQLite: linking an existing concept, or creating a new one.

use kg_core::MatchConfidence;
use tracing::info;

use crate::concept_matcher::ConceptMatcher;
use crate::embeddings::EmbeddingClient;
use crate::error::{GraphError, GraphResult};
use crate::models::{ProblemConcept, ProblemMention};
use crate::repository::Repository;

pub struct AutoLinker<'a> {
    repo: &'a dyn Repository,
    matcher: ConceptMatcher<'a>,
    embedder: &'a EmbeddingClient,
}

impl<'a> AutoLinker<'a> {
    pub fn new(repo: &'a dyn Repository, matcher: ConceptMatcher<'a>, embedder: &'a EmbeddingClient) -> Self {
        Self { repo, matcher, embedder }
    }

    /// §4.17 workflow: find the best candidate, and if it classifies as
    /// [`MatchConfidence::High`], create the `INSTANCE_OF` edge and return
    /// the updated concept alongside the match score/band that produced
    /// it. Otherwise returns `Ok(None)` — the caller (C18's integrator) is
    /// responsible for calling [`Self::create_new_concept`] in that case.
    pub async fn auto_link_high_confidence(
        &self,
        mention: &ProblemMention,
        trace_id: &str,
    ) -> GraphResult<Option<(ProblemConcept, f64, MatchConfidence)>> {
        info!(trace_id, mention_id = %mention.id, "auto-linking mention");

        let candidates = self.matcher.find_candidates(mention).await.map_err(|e| {
            GraphError::auto_linker(trace_id, format!("failed to find matching concept: {e}"))
        })?;

        let Some((best, confidence)) = self.matcher.classify_best(&candidates) else {
            info!(trace_id, mention_id = %mention.id, "no candidate concepts found");
            return Ok(None);
        };

        if confidence != MatchConfidence::High {
            info!(
                trace_id,
                mention_id = %mention.id,
                confidence = ?confidence,
                "no HIGH confidence match"
            );
            return Ok(None);
        }

        let score = best.final_score();
        info!(
            trace_id,
            mention_id = %mention.id,
            concept_id = %best.concept_id,
            score,
            "HIGH confidence match found"
        );

        let concept = self
            .repo
            .link_instance_of(mention, best, trace_id)
            .await
            .map_err(|e| GraphError::auto_linker(trace_id, format!("failed to create INSTANCE_OF relationship: {e}")))?;

        info!(trace_id, mention_id = %mention.id, concept_id = %concept.id, "auto-linked");
        Ok(Some((concept, score, confidence)))
    }

    /// §4.17: called when no HIGH confidence match exists. The mention
    /// becomes the first instance of a brand-new canonical concept.
    pub async fn create_new_concept(&self, mention: &ProblemMention, trace_id: &str) -> GraphResult<ProblemConcept> {
        info!(trace_id, mention_id = %mention.id, "creating new concept");

        let embedding = self
            .embedder
            .embed(&mention.statement)
            .await
            .map_err(|e| GraphError::auto_linker(trace_id, format!("failed to generate concept embedding: {e}")))?;

        let concept = ProblemConcept::first_mention_from(mention, embedding);

        self.repo
            .create_concept_and_link(&concept, mention, trace_id)
            .await
            .map_err(|e| GraphError::auto_linker(trace_id, format!("failed to create new concept: {e}")))?;

        info!(trace_id, mention_id = %mention.id, concept_id = %concept.id, "created new concept");
        Ok(concept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GraphDbPool;
    use crate::repository::SqliteRepository;
    use kg_core::config::{EmbeddingSettings, MatcherSettings, RetrySettings};
    use kg_core::{ReviewStatus, SectionType};

    fn sample_mention(id: &str, domain: &str, embedding: Vec<f32>) -> ProblemMention {
        let now = chrono::Utc::now().to_rfc3339();
        ProblemMention {
            id: id.to_string(),
            statement: "A statement long enough to be valid.".into(),
            paper_doi: "10.1/x".into(),
            section: SectionType::Introduction,
            domain: Some(domain.to_string()),
            assumptions: vec![],
            constraints: vec![],
            datasets: vec![],
            metrics: vec![],
            baselines: vec![],
            quoted_text: "q".into(),
            embedding: Some(embedding),
            concept_id: None,
            match_confidence: None,
            match_score: None,
            match_method: None,
            review_status: ReviewStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn no_candidates_returns_none() {
        let db = GraphDbPool::open_in_memory(4).await.unwrap();
        let repo = SqliteRepository::new(db, RetrySettings { max_retries: 0, base_delay_ms: 1 });
        let matcher = ConceptMatcher::new(&repo, MatcherSettings::default());
        let embedder = EmbeddingClient::new(&EmbeddingSettings { dimension: 4, ..EmbeddingSettings::default() });
        let linker = AutoLinker::new(&repo, matcher, &embedder);

        let mention = sample_mention("m1", "nlp", vec![1.0, 0.0, 0.0, 0.0]);
        let result = linker.auto_link_high_confidence(&mention, "trace-1").await.unwrap();
        assert!(result.is_none());
    }
}
