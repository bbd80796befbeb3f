//! Persisted graph-store value types (§3 "ProblemMention"/"ProblemConcept"
//! and their neighbors).
//!
//! Nested metadata reuses [`kg_extraction::ConfidentItem`] rather than
//! five separate `Assumption`/`Constraint`/`Dataset`/`Metric`/`Baseline`
//! models — "each nested field carries its own confidence" (§3) is
//! satisfied by the simpler unified type, and it's already built and
//! tested in `kg-extraction`.

use chrono::Utc;
use kg_core::{ConceptStatus, MatchConfidence, MatchMethod, ReviewStatus, SectionType, SynthesisMethod};
use kg_extraction::{ConfidentItem, ExtractedProblem};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A paper-specific occurrence of a research problem (§3). Immutable
/// except for its match fields, which are set once by the auto-linker or
/// the (out-of-scope) external review workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemMention {
    pub id: String,
    pub statement: String,
    pub paper_doi: String,
    pub section: SectionType,
    pub domain: Option<String>,
    pub assumptions: Vec<ConfidentItem>,
    pub constraints: Vec<ConfidentItem>,
    pub datasets: Vec<ConfidentItem>,
    pub metrics: Vec<ConfidentItem>,
    pub baselines: Vec<ConfidentItem>,
    pub quoted_text: String,
    pub embedding: Option<Vec<f32>>,
    pub concept_id: Option<String>,
    pub match_confidence: Option<MatchConfidence>,
    pub match_score: Option<f64>,
    pub match_method: Option<MatchMethod>,
    pub review_status: ReviewStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl ProblemMention {
    /// Build a mention from one LLM-extracted problem plus the paper it
    /// came from (C18 step 2). `paper_doi` is validated at the repository
    /// boundary, not here, since callers may construct a mention before
    /// the paper row exists.
    pub fn from_extracted(problem: &ExtractedProblem, paper_doi: &str) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            statement: problem.statement.clone(),
            paper_doi: paper_doi.to_string(),
            section: problem.section,
            domain: problem.domain.clone(),
            assumptions: problem.assumptions.clone(),
            constraints: problem.constraints.clone(),
            datasets: problem.datasets.clone(),
            metrics: problem.metrics.clone(),
            baselines: problem.baselines.clone(),
            quoted_text: problem.quoted_text.clone(),
            embedding: None,
            concept_id: None,
            match_confidence: None,
            match_score: None,
            match_method: None,
            review_status: ReviewStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Canonical problem node synthesized from one or more mentions (§3).
/// Versioned: every write increments `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemConcept {
    pub id: String,
    pub canonical_statement: String,
    pub domain: String,
    pub status: ConceptStatus,
    pub assumptions: Vec<ConfidentItem>,
    pub constraints: Vec<ConfidentItem>,
    pub datasets: Vec<ConfidentItem>,
    pub metrics: Vec<ConfidentItem>,
    pub verified_baselines: Vec<ConfidentItem>,
    pub claimed_baselines: Vec<ConfidentItem>,
    pub synthesis_method: SynthesisMethod,
    pub mention_count: i64,
    pub paper_count: i64,
    pub first_mentioned_year: Option<i32>,
    pub last_mentioned_year: Option<i32>,
    pub embedding: Option<Vec<f32>>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl ProblemConcept {
    /// Build the first-mention concept C17's `create_new_concept` emits:
    /// metadata copied from the mention, `mention_count = paper_count = 1`.
    pub fn first_mention_from(mention: &ProblemMention, embedding: Vec<f32>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            canonical_statement: mention.statement.clone(),
            domain: mention.domain.clone().unwrap_or_else(|| "unknown".to_string()),
            status: ConceptStatus::Open,
            assumptions: mention.assumptions.clone(),
            constraints: mention.constraints.clone(),
            datasets: mention.datasets.clone(),
            metrics: mention.metrics.clone(),
            verified_baselines: Vec::new(),
            claimed_baselines: mention.baselines.clone(),
            synthesis_method: SynthesisMethod::FirstMention,
            mention_count: 1,
            paper_count: 1,
            first_mentioned_year: None,
            last_mentioned_year: None,
            embedding: Some(embedding),
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// `first_mentioned_year <= last_mentioned_year` invariant (§3).
    pub fn has_valid_year_order(&self) -> bool {
        match (self.first_mentioned_year, self.last_mentioned_year) {
            (Some(first), Some(last)) => first <= last,
            _ => true,
        }
    }
}

/// A candidate concept match surfaced by the matcher (C16), before
/// confidence classification decides what happens next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub concept_id: String,
    pub concept_statement: String,
    pub domain: Option<String>,
    pub mention_count: i64,
    pub similarity_score: f64,
    pub domain_match: bool,
    pub citation_boost: f64,
}

impl MatchCandidate {
    /// `final_score = min(1.0, similarity + citation_boost)` (§4.16 step 5).
    pub fn final_score(&self) -> f64 {
        (self.similarity_score + self.citation_boost).min(1.0)
    }

    pub fn confidence(&self) -> MatchConfidence {
        MatchConfidence::classify(self.final_score())
    }
}

/// A scientific paper source node (§3/§6). The spec's extraction
/// components only need `doi`/`title`/`authors`; the rest mirrors the
/// bibliographic fields the acquisition layer already normalizes (§4.8
/// `NormalizedPaper`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub doi: String,
    pub title: String,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: i32,
    pub abstract_text: Option<String>,
    pub arxiv_id: Option<String>,
    pub openalex_id: Option<String>,
    pub semantic_scholar_id: Option<String>,
    pub pdf_url: Option<String>,
    pub ingested_at: String,
}

/// An author node, linked to papers via `AUTHORED_BY` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub affiliations: Vec<String>,
    pub orcid: Option<String>,
    pub semantic_scholar_id: Option<String>,
}

/// One problem-to-problem relation edge, persisted verbatim from C12's
/// `ExtractedRelation` (§3, §6 edge types `EXTENDS`/`CONTRADICTS`/…).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemRelation {
    pub source_problem_ref: String,
    pub target_problem_ref: String,
    pub relation_type: kg_core::RelationType,
    pub confidence: f64,
    pub evidence: String,
    pub extraction_method: kg_core::ExtractionMethod,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_score_is_clamped_to_one() {
        let candidate = MatchCandidate {
            concept_id: "c1".into(),
            concept_statement: "stmt".into(),
            domain: None,
            mention_count: 1,
            similarity_score: 0.9,
            domain_match: false,
            citation_boost: 0.2,
        };
        assert_eq!(candidate.final_score(), 1.0);
        assert_eq!(candidate.confidence(), MatchConfidence::High);
    }

    #[test]
    fn year_order_invariant_rejects_inverted_range() {
        let mut concept = ProblemConcept::first_mention_from(
            &ProblemMention::from_extracted(
                &ExtractedProblem {
                    statement: "A statement long enough to pass validation.".into(),
                    quoted_text: "quote".into(),
                    confidence: 0.9,
                    domain: None,
                    section: SectionType::Introduction,
                    assumptions: vec![],
                    constraints: vec![],
                    datasets: vec![],
                    metrics: vec![],
                    baselines: vec![],
                },
                "10.1234/x",
            ),
            vec![0.1, 0.2],
        );
        assert!(concept.has_valid_year_order());
        concept.first_mentioned_year = Some(2020);
        concept.last_mentioned_year = Some(2019);
        assert!(!concept.has_valid_year_order());
    }
}
