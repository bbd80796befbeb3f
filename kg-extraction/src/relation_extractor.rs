//! Relation extraction between problem mentions (C12, §4.12).
//!
//! Two non-LLM signals (textual cues, Jaccard similarity) plus an optional
//! LLM pass, unioned and deduplicated.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use kg_core::config::RelationSettings;
use kg_core::{ExtractionMethod, RelationType};
use regex::Regex;

use crate::error::ExtractionResult;
use crate::llm_client::LlmClient;
use crate::models::{dedup_relations, ExtractedProblem, ExtractedRelation, RelationExtractionResult};

/// Surface cues per relation type, transcribed from the catalog used by
/// the heuristic extractor this module replaces wholesale. Order matches
/// the declared `RelationType` enum order.
fn relation_cues() -> &'static Vec<(RelationType, Vec<&'static str>)> {
    static CUES: OnceLock<Vec<(RelationType, Vec<&'static str>)>> = OnceLock::new();
    CUES.get_or_init(|| {
        vec![
            (
                RelationType::Extends,
                vec![
                    "builds on",
                    "extends",
                    "further explores",
                    "advances",
                    "expands upon",
                    "improves upon",
                    "enhances",
                    "augments",
                    "goes beyond",
                    "taking further",
                ],
            ),
            (
                RelationType::Contradicts,
                vec![
                    "conflicts with",
                    "challenges",
                    "contrary to",
                    "contradicts",
                    "opposes",
                    "in contrast to",
                    "disputes",
                    "refutes",
                    "questions",
                    "undermines",
                ],
            ),
            (
                RelationType::DependsOn,
                vec![
                    "requires",
                    "prerequisite",
                    "depends on",
                    "relies on",
                    "assumes",
                    "presupposes",
                    "contingent on",
                    "needs",
                    "based on",
                    "building upon",
                ],
            ),
            (
                RelationType::Reframes,
                vec![
                    "redefines",
                    "alternative view",
                    "new perspective",
                    "reconceptualizes",
                    "reformulates",
                    "recasts",
                    "reinterprets",
                    "different framing",
                    "another way to view",
                    "alternative formulation",
                ],
            ),
            (
                RelationType::Supersedes,
                vec![
                    "replaces",
                    "supersedes",
                    "obsoletes",
                    "makes obsolete",
                    "renders unnecessary",
                    "subsumes",
                    "encompasses",
                ],
            ),
            (
                RelationType::Specializes,
                vec![
                    "specializes",
                    "focuses on",
                    "narrows",
                    "specific case of",
                    "particular instance",
                    "special case",
                    "restricted to",
                ],
            ),
            (
                RelationType::Generalizes,
                vec![
                    "generalizes",
                    "broader than",
                    "extends to",
                    "applies more broadly",
                    "more general form",
                    "abstracts",
                    "wider scope",
                ],
            ),
        ]
    })
}

fn problem_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)problem\s*(\d+)").expect("valid problem-number regex"))
}

/// Extracts relations between a set of already-identified problems (C12).
pub struct RelationExtractor {
    client: Option<Arc<dyn LlmClient>>,
    settings: RelationSettings,
}

impl RelationExtractor {
    pub fn new(settings: RelationSettings) -> Self {
        Self { client: None, settings }
    }

    pub fn with_llm(settings: RelationSettings, client: Arc<dyn LlmClient>) -> Self {
        Self { client: Some(client), settings }
    }

    /// Non-LLM extraction: textual cues plus Jaccard similarity (§4.12).
    pub fn extract_from_text(
        &self,
        text: &str,
        problems: &[ExtractedProblem],
    ) -> RelationExtractionResult {
        let mut relations = self.extract_by_textual_cues(text, problems);
        relations.extend(self.extract_by_similarity(problems));
        self.finalize(relations)
    }

    /// Same as `extract_from_text`, plus an optional LLM pass resolving
    /// ordinal problem references back to problem statements, falling back
    /// to the non-LLM signals on any error (§4.12).
    pub async fn extract_from_text_with_llm(
        &self,
        text: &str,
        problems: &[ExtractedProblem],
        paper_title: Option<&str>,
    ) -> RelationExtractionResult {
        let Some(client) = &self.client else {
            return self.extract_from_text(text, problems);
        };
        if problems.len() < 2 {
            return RelationExtractionResult::default();
        }

        match self.extract_via_llm(client.as_ref(), text, problems, paper_title).await {
            Ok(llm_relations) => {
                let mut all = llm_relations;
                all.extend(self.extract_by_textual_cues(text, problems));
                self.finalize(all)
            }
            Err(e) => {
                let mut result = self.extract_from_text(text, problems);
                result.llm_error = Some(e.to_string());
                result
            }
        }
    }

    async fn extract_via_llm(
        &self,
        client: &dyn LlmClient,
        text: &str,
        problems: &[ExtractedProblem],
        paper_title: Option<&str>,
    ) -> ExtractionResult<Vec<ExtractedRelation>> {
        let problem_list: String = problems
            .iter()
            .enumerate()
            .map(|(i, p)| format!("Problem {}: {}", i + 1, p.statement))
            .collect::<Vec<_>>()
            .join("\n");

        let excerpt: String = text.chars().take(2000).collect();
        let prompt = format!(
            "Paper: {title}\n\nProblems:\n{problem_list}\n\nSource text excerpt:\n{excerpt}\n\n\
             Identify relationships between the numbered problems above. For each one, state \
             which problems are involved (by number), the relation type \
             (extends, contradicts, depends_on, reframes, related_to, supersedes, specializes, \
             generalizes), the supporting text evidence, and a confidence score.",
            title = paper_title.unwrap_or("Unknown"),
        );

        #[derive(serde::Deserialize)]
        struct LlmRelation {
            source: String,
            target: String,
            relation_type: RelationType,
            confidence: f64,
            evidence: String,
        }
        #[derive(serde::Deserialize)]
        struct LlmRelationResult {
            #[serde(default)]
            relations: Vec<LlmRelation>,
        }

        let (value, _usage) = client.extract(&prompt, Some(LLM_RELATION_SYSTEM_PROMPT)).await?;
        let parsed: LlmRelationResult = serde_json::from_value(value)
            .map_err(|e| crate::error::ExtractionError::Llm(format!("malformed relation response: {e}")))?;

        Ok(parsed
            .relations
            .into_iter()
            .filter_map(|r| {
                let source = resolve_problem_ref(&r.source, problems)?;
                let target = resolve_problem_ref(&r.target, problems)?;
                Some(ExtractedRelation {
                    source_problem_ref: source,
                    target_problem_ref: target,
                    relation_type: r.relation_type,
                    confidence: r.confidence,
                    evidence: r.evidence,
                    extraction_method: ExtractionMethod::Llm,
                })
            })
            .collect())
    }

    fn extract_by_textual_cues(
        &self,
        text: &str,
        problems: &[ExtractedProblem],
    ) -> Vec<ExtractedRelation> {
        let mut relations = Vec::new();
        let text_lower = text.to_lowercase();
        let window = self.settings.cue_window_chars;

        for (relation_type, cues) in relation_cues() {
            for cue in cues {
                let Some(cue_idx) = text_lower.find(cue) else { continue };
                let context_start = snap_to_char_boundary(text, cue_idx.saturating_sub(window), false);
                let context_end =
                    snap_to_char_boundary(text, (cue_idx + cue.len() + window).min(text.len()), true);
                let context = &text[context_start..context_end];
                let matched = self.match_problems_to_context(context, problems);

                if matched.len() >= 2 {
                    relations.push(ExtractedRelation {
                        source_problem_ref: truncate_ref(&matched[0].statement),
                        target_problem_ref: truncate_ref(&matched[1].statement),
                        relation_type: *relation_type,
                        confidence: 0.6,
                        evidence: context.trim().to_string(),
                        extraction_method: ExtractionMethod::TextualCue,
                    });
                }
            }
        }

        relations
    }

    fn extract_by_similarity(&self, problems: &[ExtractedProblem]) -> Vec<ExtractedRelation> {
        let mut relations = Vec::new();
        for i in 0..problems.len() {
            for j in (i + 1)..problems.len() {
                let similarity = jaccard_similarity(&problems[i].statement, &problems[j].statement);
                if similarity >= self.settings.similarity_threshold {
                    relations.push(ExtractedRelation {
                        source_problem_ref: truncate_ref(&problems[i].statement),
                        target_problem_ref: truncate_ref(&problems[j].statement),
                        relation_type: RelationType::RelatedTo,
                        confidence: similarity,
                        evidence: format!(
                            "High semantic similarity ({similarity:.2}) between problem statements"
                        ),
                        extraction_method: ExtractionMethod::SemanticSimilarity,
                    });
                }
            }
        }
        relations
    }

    fn match_problems_to_context<'a>(
        &self,
        context: &str,
        problems: &'a [ExtractedProblem],
    ) -> Vec<&'a ExtractedProblem> {
        let context_lower = context.to_lowercase();
        let context_words: HashSet<&str> = context_lower.split_whitespace().collect();
        problems
            .iter()
            .filter(|p| {
                let lower = p.statement.to_lowercase();
                let words: HashSet<&str> = lower.split_whitespace().collect();
                if words.is_empty() {
                    return false;
                }
                let overlap = words.iter().filter(|w| context_words.contains(*w)).count();
                (overlap as f64 / words.len() as f64) >= self.settings.word_overlap_threshold
            })
            .collect()
    }

    fn finalize(&self, relations: Vec<ExtractedRelation>) -> RelationExtractionResult {
        let deduped = dedup_relations(relations);
        let filtered: Vec<ExtractedRelation> = deduped
            .into_iter()
            .filter(|r| r.confidence >= self.settings.min_confidence)
            .filter(|r| r.is_well_formed())
            .collect();
        RelationExtractionResult { relations: filtered, llm_error: None }
    }
}

const LLM_RELATION_SYSTEM_PROMPT: &str = "You are an expert at analyzing research literature and \
identifying relationships between research problems. Be precise and only report relationships \
with clear textual evidence. Respond with a JSON object: {\"relations\": [...]}.";

fn resolve_problem_ref(raw: &str, problems: &[ExtractedProblem]) -> Option<String> {
    if let Some(caps) = problem_number_pattern().captures(raw) {
        let n: usize = caps.get(1)?.as_str().parse().ok()?;
        if n >= 1 && n <= problems.len() {
            return Some(truncate_ref(&problems[n - 1].statement));
        }
        return None;
    }
    if let Ok(n) = raw.trim().parse::<usize>() {
        if n >= 1 && n <= problems.len() {
            return Some(truncate_ref(&problems[n - 1].statement));
        }
        return None;
    }
    Some(truncate_ref(raw))
}

fn truncate_ref(statement: &str) -> String {
    statement.chars().take(100).collect()
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let lower_a = a.to_lowercase();
    let lower_b = b.to_lowercase();
    let set_a: HashSet<&str> = lower_a.split_whitespace().collect();
    let set_b: HashSet<&str> = lower_b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn snap_to_char_boundary(s: &str, mut idx: usize, forward: bool) -> usize {
    idx = idx.min(s.len());
    if forward {
        while idx < s.len() && !s.is_char_boundary(idx) {
            idx += 1;
        }
    } else {
        while idx > 0 && !s.is_char_boundary(idx) {
            idx -= 1;
        }
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_core::SectionType;

    fn problem(statement: &str) -> ExtractedProblem {
        ExtractedProblem {
            statement: statement.to_string(),
            quoted_text: "quote".to_string(),
            confidence: 0.9,
            domain: None,
            section: SectionType::Limitations,
            assumptions: vec![],
            constraints: vec![],
            datasets: vec![],
            metrics: vec![],
            baselines: vec![],
        }
    }

    #[test]
    fn textual_cue_detects_extends_relation() {
        let p1 = problem("Our transformer model struggles with long context windows in practice");
        let p2 = problem("Prior transformer model struggles with long context windows historically");
        let text = format!(
            "{} This work builds on {} by handling longer sequences efficiently.",
            p1.statement, p2.statement
        );
        let extractor = RelationExtractor::new(RelationSettings::default());
        let result = extractor.extract_from_text(&text, &[p1, p2]);
        assert!(result.get_by_type(RelationType::Extends).len() >= 1);
    }

    #[test]
    fn similarity_emits_related_to_above_threshold() {
        let p1 = problem("the model fails to generalize to unseen rare domains in evaluation");
        let p2 = problem("the model fails to generalize to unseen rare domains in evaluation too");
        let mut settings = RelationSettings::default();
        settings.similarity_threshold = 0.5;
        let extractor = RelationExtractor::new(settings);
        let result = extractor.extract_from_text("", &[p1, p2]);
        assert!(result.get_by_type(RelationType::RelatedTo).len() == 1);
    }

    #[test]
    fn jaccard_is_symmetric_and_bounded() {
        let s = jaccard_similarity("alpha beta gamma", "beta gamma delta");
        assert!(s > 0.0 && s < 1.0);
        assert_eq!(jaccard_similarity("", "anything"), 0.0);
    }
}
