//! Mention-to-concept matching (C16, §4.16), split out of the
//! auto-linker so [`crate::auto_linker::AutoLinker`] only orchestrates the
//! confidence-band decision and the transactional writes.

use kg_core::config::MatcherSettings;
use kg_core::MatchConfidence;
use tracing::warn;

use crate::error::GraphResult;
use crate::models::{MatchCandidate, ProblemMention};
use crate::repository::Repository;

pub struct ConceptMatcher<'a> {
    repo: &'a dyn Repository,
    settings: MatcherSettings,
}

impl<'a> ConceptMatcher<'a> {
    pub fn new(repo: &'a dyn Repository, settings: MatcherSettings) -> Self {
        Self { repo, settings }
    }

    /// §4.16 steps 1-5: vector KNN, domain-match flag, citation boost,
    /// final score, sorted descending by `final_score`. Candidates with a
    /// `final_score` below `low_threshold` are dropped — they would only
    /// ever classify as [`MatchConfidence::Rejected`] downstream.
    pub async fn find_candidates(&self, mention: &ProblemMention) -> GraphResult<Vec<MatchCandidate>> {
        let embedding = mention.embedding.as_deref().ok_or_else(|| {
            crate::error::GraphError::matcher("n/a", "mention has no embedding to match against")
        })?;

        let mut candidates = self.repo.find_similar_concepts(embedding, self.settings.top_k).await?;

        for candidate in &mut candidates {
            candidate.domain_match = match (&mention.domain, &candidate.domain) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            };

            candidate.citation_boost = match self.repo.citation_path_exists(&mention.paper_doi, &candidate.concept_id).await {
                Ok(true) => self.settings.citation_boost,
                Ok(false) => 0.0,
                Err(e) => {
                    warn!(
                        paper_doi = %mention.paper_doi,
                        concept_id = %candidate.concept_id,
                        error = %e,
                        "citation-boost query failed, degrading to 0.0"
                    );
                    0.0
                }
            };
        }

        candidates.retain(|c| self.final_score(c) >= self.settings.low_threshold);
        candidates.sort_by(|a, b| {
            self.final_score(b).partial_cmp(&self.final_score(a)).unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(candidates)
    }

    fn final_score(&self, candidate: &MatchCandidate) -> f64 {
        (candidate.similarity_score + candidate.citation_boost).min(1.0)
    }

    /// §4.16 step 6: classify the best candidate (if any) using this
    /// matcher's configured thresholds rather than the fixed defaults
    /// baked into [`MatchConfidence::classify`].
    pub fn classify_best<'c>(
        &self,
        candidates: &'c [MatchCandidate],
    ) -> Option<(&'c MatchCandidate, MatchConfidence)> {
        let best = candidates.first()?;
        let confidence = MatchConfidence::classify_with_thresholds(
            self.final_score(best),
            self.settings.high_threshold,
            self.settings.medium_threshold,
            self.settings.low_threshold,
        );
        Some((best, confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GraphDbPool;
    use crate::models::ProblemConcept;
    use crate::repository::SqliteRepository;
    use kg_core::config::RetrySettings;
    use kg_core::{ReviewStatus, SectionType};

    async fn repo_with_concept(domain: &str) -> (SqliteRepository, ProblemConcept) {
        let db = GraphDbPool::open_in_memory(4).await.unwrap();
        let repo = SqliteRepository::new(db, RetrySettings { max_retries: 0, base_delay_ms: 1 });

        let now = chrono::Utc::now().to_rfc3339();
        let seed_mention = ProblemMention {
            id: "seed".into(),
            statement: "A statement long enough to be valid.".into(),
            paper_doi: "10.1/seed".into(),
            section: SectionType::Introduction,
            domain: Some(domain.to_string()),
            assumptions: vec![],
            constraints: vec![],
            datasets: vec![],
            metrics: vec![],
            baselines: vec![],
            quoted_text: "q".into(),
            embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
            concept_id: None,
            match_confidence: None,
            match_score: None,
            match_method: None,
            review_status: ReviewStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        };
        let concept = ProblemConcept::first_mention_from(&seed_mention, vec![1.0, 0.0, 0.0, 0.0]);
        repo.create_problem_concept(&concept).await.unwrap();
        (repo, concept)
    }

    fn sample_mention(domain: &str, embedding: Vec<f32>) -> ProblemMention {
        let now = chrono::Utc::now().to_rfc3339();
        ProblemMention {
            id: "m1".into(),
            statement: "A statement long enough to be valid.".into(),
            paper_doi: "10.1/other".into(),
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
    async fn identical_embedding_and_domain_yields_high_confidence() {
        let (repo, concept) = repo_with_concept("nlp").await;
        let matcher = ConceptMatcher::new(&repo, MatcherSettings::default());
        let mention = sample_mention("nlp", vec![1.0, 0.0, 0.0, 0.0]);

        let candidates = matcher.find_candidates(&mention).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].concept_id, concept.id);
        assert!(candidates[0].domain_match);

        let (best, confidence) = matcher.classify_best(&candidates).unwrap();
        assert_eq!(best.concept_id, concept.id);
        assert_eq!(confidence, MatchConfidence::High);
    }

    #[tokio::test]
    async fn low_similarity_candidate_is_filtered_out() {
        let (repo, _concept) = repo_with_concept("nlp").await;
        let matcher = ConceptMatcher::new(&repo, MatcherSettings::default());
        let mention = sample_mention("nlp", vec![0.0, 1.0, 0.0, 0.0]);

        let candidates = matcher.find_candidates(&mention).await.unwrap();
        assert!(candidates.is_empty());
    }
}
