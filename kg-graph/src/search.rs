//! Hybrid semantic/structured search over canonical concepts (C20,
//! §4.20). Ranks and deduplicates against [`ProblemConcept`], the
//! canonical node this crate's graph actually holds — not the raw
//! per-paper `Problem` mentions.

use kg_core::config::SearchSettings;
use kg_core::ConceptStatus;
use tracing::{error, info};

use crate::embeddings::EmbeddingClient;
use crate::error::GraphResult;
use crate::models::ProblemConcept;
use crate::repository::{Repository, StructuredFilter};

#[derive(Debug, Clone, PartialEq)]
pub enum MatchType {
    Semantic,
    Structured,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub concept: ProblemConcept,
    pub score: f64,
    pub match_type: MatchType,
}

pub struct SearchService<'a> {
    repo: &'a dyn Repository,
    embedder: &'a EmbeddingClient,
    settings: SearchSettings,
}

impl<'a> SearchService<'a> {
    pub fn new(repo: &'a dyn Repository, embedder: &'a EmbeddingClient, settings: SearchSettings) -> Self {
        Self { repo, embedder, settings }
    }

    /// §4.20: rank concepts by embedding similarity to `query`. Query
    /// embedding failures degrade to an empty result set rather than
    /// propagating, so a flaky embedding provider degrades search instead
    /// of crashing the caller.
    pub async fn semantic_search(&self, query: &str, top_k: Option<usize>, min_score: Option<f64>) -> Vec<SearchResult> {
        let top_k = top_k.unwrap_or(self.settings.default_top_k);
        let min_score = min_score.unwrap_or(self.settings.similarity_threshold);

        let query_embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                error!(error = %e, "failed to generate query embedding");
                return Vec::new();
            }
        };

        let candidates = match self.repo.find_similar_concepts(&query_embedding, top_k).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "semantic search failed");
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for candidate in candidates {
            if candidate.similarity_score < min_score {
                continue;
            }
            if let Ok(concept) = self.repo.get_problem_concept(&candidate.concept_id).await {
                results.push(SearchResult { concept, score: candidate.similarity_score, match_type: MatchType::Semantic });
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        info!(query_len = query.len(), found = results.len(), "semantic search complete");
        results
    }

    /// §4.20: filter concepts by domain/status/dataset-presence/year
    /// range, with every result scored `1.0` (no ranking signal beyond
    /// recency).
    pub async fn structured_search(&self, filter: StructuredFilter, top_k: Option<usize>) -> GraphResult<Vec<SearchResult>> {
        let top_k = top_k.unwrap_or(self.settings.default_top_k);
        let concepts = self.repo.search_concepts_structured(&filter, top_k).await?;

        let results = concepts
            .into_iter()
            .map(|concept| SearchResult { concept, score: 1.0, match_type: MatchType::Structured })
            .collect();

        Ok(results)
    }

    /// §4.20: semantic ranking combined with a structural bonus for
    /// `domain`/`status` matches. `structural_score = structural_bonus`
    /// when either filter is set (max `1.0`), else `1.0` (no filters to
    /// reward). Final score is
    /// `semantic_weight * semantic + (1 - semantic_weight) * structural`.
    pub async fn hybrid_search(
        &self,
        query: &str,
        domain: Option<&str>,
        status: Option<ConceptStatus>,
        top_k: Option<usize>,
        semantic_weight: Option<f64>,
    ) -> Vec<SearchResult> {
        let top_k = top_k.unwrap_or(self.settings.default_top_k);
        let semantic_weight = semantic_weight.unwrap_or(self.settings.semantic_weight);
        let structured_weight = 1.0 - semantic_weight;

        let semantic_results = self.semantic_search(query, Some(top_k * 3), None).await;

        let mut filtered: Vec<SearchResult> = semantic_results
            .into_iter()
            .filter(|r| domain.map_or(true, |d| r.concept.domain.eq_ignore_ascii_case(d)))
            .filter(|r| status.map_or(true, |s| r.concept.status == s))
            .collect();

        for result in &mut filtered {
            let mut structural_bonus = 0.0;
            if let Some(d) = domain {
                if result.concept.domain.eq_ignore_ascii_case(d) {
                    structural_bonus += 0.5;
                }
            }
            if let Some(s) = status {
                if result.concept.status == s {
                    structural_bonus += 0.5;
                }
            }
            let structural_score = if domain.is_some() || status.is_some() { structural_bonus } else { 1.0 };

            result.score = semantic_weight * result.score + structured_weight * structural_score;
            result.match_type = MatchType::Hybrid;
        }

        filtered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        filtered.truncate(top_k);
        filtered
    }

    /// §4.20: deduplication helper — concepts similar enough to
    /// `concept` to be candidate duplicates, excluding `concept` itself.
    pub async fn find_similar_concepts(&self, concept: &ProblemConcept, threshold: Option<f64>) -> Vec<SearchResult> {
        let threshold = threshold.unwrap_or(self.settings.deduplication_threshold);
        let mut results = self.semantic_search(&concept.canonical_statement, Some(10), Some(threshold)).await;
        results.retain(|r| r.concept.id != concept.id);
        info!(concept_id = %concept.id, found = results.len(), "similarity search for deduplication complete");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GraphDbPool;
    use crate::repository::SqliteRepository;
    use kg_core::config::{EmbeddingSettings, RetrySettings};
    use kg_core::{ReviewStatus, SectionType};

    #[tokio::test]
    async fn structured_search_filters_by_domain() {
        let db = GraphDbPool::open_in_memory(4).await.unwrap();
        let repo = SqliteRepository::new(db, RetrySettings { max_retries: 0, base_delay_ms: 1 });
        let embedder = EmbeddingClient::new(&EmbeddingSettings { dimension: 4, ..EmbeddingSettings::default() });
        let service = SearchService::new(&repo, &embedder, SearchSettings::default());

        let now = chrono::Utc::now().to_rfc3339();
        let seed_mention = crate::models::ProblemMention {
            id: "seed".into(),
            statement: "A statement long enough to be valid.".into(),
            paper_doi: "10.1/seed".into(),
            section: SectionType::Introduction,
            domain: Some("nlp".into()),
            assumptions: vec![],
            constraints: vec![],
            datasets: vec![],
            metrics: vec![],
            baselines: vec![],
            quoted_text: "q".into(),
            embedding: None,
            concept_id: None,
            match_confidence: None,
            match_score: None,
            match_method: None,
            review_status: ReviewStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        };
        let nlp_concept = ProblemConcept::first_mention_from(&seed_mention, vec![1.0, 0.0, 0.0, 0.0]);
        let mut vision_seed = seed_mention.clone();
        vision_seed.domain = Some("vision".into());
        let vision_concept = ProblemConcept::first_mention_from(&vision_seed, vec![0.0, 1.0, 0.0, 0.0]);

        repo.create_problem_concept(&nlp_concept).await.unwrap();
        repo.create_problem_concept(&vision_concept).await.unwrap();

        let filter = StructuredFilter { domain: Some("nlp".into()), ..Default::default() };
        let results = service.structured_search(filter, None).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].concept.id, nlp_concept.id);
        assert_eq!(results[0].match_type, MatchType::Structured);
    }
}
