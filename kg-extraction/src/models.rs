//! Extraction-stage value types (§3 "ExtractedProblem"/"ExtractedRelation").
//!
//! These are the LLM-facing records, distinct from `kg-graph`'s persisted
//! `ProblemMention`/`ProblemConcept` — a `ProblemMention` is built from an
//! `ExtractedProblem` plus a paper DOI by the canonicalization integrator.

use kg_core::{ExtractionMethod, RelationType, SectionType};
use serde::{Deserialize, Serialize};

/// A nested metadata item (assumption, constraint, dataset, metric,
/// baseline) carrying its own confidence, per §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidentItem {
    pub text: String,
    #[serde(default = "default_item_confidence")]
    pub confidence: f64,
}

fn default_item_confidence() -> f64 {
    1.0
}

impl ConfidentItem {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self { text: text.into(), confidence }
    }
}

/// A single research-problem mention as returned by the LLM, before
/// filtering (§4.11) or canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProblem {
    pub statement: String,
    pub quoted_text: String,
    pub confidence: f64,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub section: SectionType,
    #[serde(default)]
    pub assumptions: Vec<ConfidentItem>,
    #[serde(default)]
    pub constraints: Vec<ConfidentItem>,
    #[serde(default)]
    pub datasets: Vec<ConfidentItem>,
    #[serde(default)]
    pub metrics: Vec<ConfidentItem>,
    #[serde(default)]
    pub baselines: Vec<ConfidentItem>,
}

impl ExtractedProblem {
    /// The two length invariants from §3: `statement` has at least 20
    /// characters, `quoted_text` at least 1.
    pub fn is_well_formed(&self) -> bool {
        self.statement.chars().count() >= 20 && !self.quoted_text.is_empty()
    }
}

/// Result of one LLM call extracting problems from a single section (§4.11).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionExtractionOutcome {
    pub section_type: SectionType,
    pub problems: Vec<ExtractedProblem>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Set when every retry attempt against the LLM failed for this
    /// section; `problems` is empty in that case rather than genuinely
    /// reflecting "no problems found" (§4.13/§7: stage errors must be
    /// recorded, not swallowed).
    pub error: Option<String>,
}

impl SectionExtractionOutcome {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Aggregate result of `extract_from_sections` (§4.11).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchExtractionResult {
    pub results: Vec<SectionExtractionOutcome>,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
}

impl BatchExtractionResult {
    pub fn all_problems(&self) -> Vec<ExtractedProblem> {
        self.results.iter().flat_map(|r| r.problems.clone()).collect()
    }

    pub fn high_confidence_problems(&self, threshold: f64) -> Vec<ExtractedProblem> {
        self.all_problems()
            .into_iter()
            .filter(|p| p.confidence >= threshold)
            .collect()
    }

    pub fn total_problems(&self) -> usize {
        self.results.iter().map(|r| r.problems.len()).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

/// A typed relationship between two problems (§3, C12).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub source_problem_ref: String,
    pub target_problem_ref: String,
    pub relation_type: RelationType,
    pub confidence: f64,
    pub evidence: String,
    pub extraction_method: ExtractionMethod,
}

impl ExtractedRelation {
    /// The evidence-length invariant from §3: at least 10 characters.
    pub fn is_well_formed(&self) -> bool {
        self.evidence.chars().count() >= 10
    }

    /// Dedup key: `(source, target, type)`, keeping the highest confidence
    /// on collision (§3).
    fn dedup_key(&self) -> (String, String, RelationType) {
        (self.source_problem_ref.clone(), self.target_problem_ref.clone(), self.relation_type)
    }
}

/// Result of relation extraction over a text/problem set (§4.12).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationExtractionResult {
    pub relations: Vec<ExtractedRelation>,
    /// Set when the optional LLM pass (§4.12) failed and extraction fell
    /// back to the textual-cue/similarity signals alone.
    pub llm_error: Option<String>,
}

impl RelationExtractionResult {
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn get_by_type(&self, relation_type: RelationType) -> Vec<&ExtractedRelation> {
        self.relations.iter().filter(|r| r.relation_type == relation_type).collect()
    }
}

/// Deduplicate relations on `(source, target, type)`, keeping the highest
/// confidence entry for each key (§3, §8 invariant 6-adjacent).
pub fn dedup_relations(relations: Vec<ExtractedRelation>) -> Vec<ExtractedRelation> {
    use std::collections::HashMap;

    let mut best: HashMap<(String, String, RelationType), ExtractedRelation> = HashMap::new();
    for relation in relations {
        let key = relation.dedup_key();
        match best.get(&key) {
            Some(existing) if existing.confidence >= relation.confidence => {}
            _ => {
                best.insert(key, relation);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_requires_minimum_lengths() {
        let mut p = ExtractedProblem {
            statement: "short".to_string(),
            quoted_text: "x".to_string(),
            confidence: 0.9,
            domain: None,
            section: SectionType::Limitations,
            assumptions: vec![],
            constraints: vec![],
            datasets: vec![],
            metrics: vec![],
            baselines: vec![],
        };
        assert!(!p.is_well_formed());
        p.statement = "This statement is definitely long enough.".to_string();
        assert!(p.is_well_formed());
    }

    #[test]
    fn dedup_keeps_highest_confidence() {
        let low = ExtractedRelation {
            source_problem_ref: "a".into(),
            target_problem_ref: "b".into(),
            relation_type: RelationType::Extends,
            confidence: 0.4,
            evidence: "some evidence here".into(),
            extraction_method: ExtractionMethod::TextualCue,
        };
        let high = ExtractedRelation { confidence: 0.8, ..low.clone() };
        let deduped = dedup_relations(vec![low, high.clone()]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.8);
    }
}
