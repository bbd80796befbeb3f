//! Per-section problem extraction via structured LLM calls (C11, §4.11).

use std::sync::Arc;

use kg_core::config::ExtractorSettings;
use tracing::{debug, warn};

use crate::error::{ExtractionError, ExtractionResult};
use crate::llm_client::LlmClient;
use crate::models::{BatchExtractionResult, ExtractedProblem, SectionExtractionOutcome};
use crate::section_segmenter::Section;

/// Paper-level metadata threaded into every section prompt.
#[derive(Debug, Clone, Default)]
pub struct PaperMeta {
    pub title: Option<String>,
    pub doi: Option<String>,
}

#[derive(serde::Deserialize)]
struct LlmProblemList {
    #[serde(default)]
    problems: Vec<ExtractedProblem>,
}

/// Extracts candidate problem mentions from segmented paper sections (C11).
pub struct ProblemExtractor {
    client: Arc<dyn LlmClient>,
    settings: ExtractorSettings,
}

impl ProblemExtractor {
    pub fn new(client: Arc<dyn LlmClient>, settings: ExtractorSettings) -> Self {
        Self { client, settings }
    }

    /// Run extraction over every section in order, accumulating token
    /// usage and per-section outcomes (§4.11).
    pub async fn extract_from_sections(
        &self,
        sections: &[Section],
        paper_meta: &PaperMeta,
    ) -> BatchExtractionResult {
        let mut batch = BatchExtractionResult::default();

        for section in sections {
            let outcome = self.extract_from_section(section, paper_meta).await;
            batch.total_prompt_tokens += outcome.prompt_tokens;
            batch.total_completion_tokens += outcome.completion_tokens;
            batch.results.push(outcome);
        }

        batch
    }

    async fn extract_from_section(
        &self,
        section: &Section,
        paper_meta: &PaperMeta,
    ) -> SectionExtractionOutcome {
        if section.priority() > self.settings.max_section_priority {
            debug!(section = %section.title, priority = section.priority(), "skipping low-priority section");
            return SectionExtractionOutcome {
                section_type: section.section_type,
                problems: Vec::new(),
                skipped: true,
                skip_reason: Some(format!(
                    "priority {} exceeds max_section_priority {}",
                    section.priority(),
                    self.settings.max_section_priority
                )),
                prompt_tokens: 0,
                completion_tokens: 0,
                error: None,
            };
        }

        let prompt = build_prompt(section, paper_meta, None);
        let mut attempt = 0u32;
        let mut prompt_tokens = 0u64;
        let mut completion_tokens = 0u64;
        let mut last_error: Option<ExtractionError> = None;
        let mut problems: Vec<ExtractedProblem> = Vec::new();
        let mut retried_on_empty = false;

        loop {
            attempt += 1;
            let current_prompt = if retried_on_empty {
                build_prompt(section, paper_meta, Some(EMPTY_RETRY_REMINDER))
            } else {
                prompt.clone()
            };

            match self.client.extract(&current_prompt, Some(SYSTEM_PROMPT)).await {
                Ok((value, usage)) => {
                    prompt_tokens += usage.prompt_tokens;
                    completion_tokens += usage.completion_tokens;

                    match serde_json::from_value::<LlmProblemList>(value) {
                        Ok(parsed) => {
                            if parsed.problems.is_empty()
                                && self.settings.retry_on_empty
                                && !retried_on_empty
                                && attempt <= self.settings.max_retries
                            {
                                retried_on_empty = true;
                                continue;
                            }
                            problems = self.filter_and_cap(parsed.problems);
                            break;
                        }
                        Err(e) => {
                            last_error = Some(ExtractionError::Llm(format!("malformed response: {e}")));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }

            if attempt > self.settings.max_retries {
                warn!(section = %section.title, error = ?last_error, "problem extraction exhausted retries");
                break;
            }
        }

        SectionExtractionOutcome {
            section_type: section.section_type,
            problems,
            skipped: false,
            skip_reason: None,
            prompt_tokens,
            completion_tokens,
            error: last_error.map(|e| e.to_string()),
        }
    }

    /// Apply the confidence floor, length invariants, and per-section cap
    /// (§4.11), keeping the highest-confidence problems on ties.
    fn filter_and_cap(&self, problems: Vec<ExtractedProblem>) -> Vec<ExtractedProblem> {
        let mut kept: Vec<ExtractedProblem> = problems
            .into_iter()
            .filter(|p| p.confidence >= self.settings.min_confidence)
            .filter(|p| p.is_well_formed())
            .collect();

        kept.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        kept.truncate(self.settings.max_problems_per_section);
        kept
    }
}

const SYSTEM_PROMPT: &str = "You are an expert at reading academic papers and extracting concrete \
research problem statements. Only report problems with clear textual support; quote the exact \
supporting text. Respond with a JSON object: {\"problems\": [...]}.";

const EMPTY_RETRY_REMINDER: &str =
    "Your previous response contained no problems. Re-read the section text closely: if it \
describes any limitation, open question, assumption, or unsolved issue, report it. Only return \
an empty list if the section truly contains no research problem statement.";

fn build_prompt(section: &Section, paper_meta: &PaperMeta, reminder: Option<&str>) -> String {
    let title = paper_meta.title.as_deref().unwrap_or("Unknown");
    let doi = paper_meta.doi.as_deref().unwrap_or("Unknown");
    let reminder_block = reminder.map(|r| format!("\n\n{r}")).unwrap_or_default();

    format!(
        "Paper: {title}\nDOI: {doi}\nSection: {section_title} ({section_type:?})\n\n\
         Section text:\n{content}\n\n\
         Extract every concrete research problem statement supported by this text. \
         For each one, provide: statement (a self-contained sentence, at least 20 characters), \
         quoted_text (the exact supporting excerpt), confidence (0.0-1.0), domain (optional), \
         and any assumptions, constraints, datasets, metrics, or baselines you can identify, \
         each with its own confidence.{reminder_block}",
        section_title = section.title,
        section_type = section.section_type,
        content = section.content,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::TokenUsage;
    use async_trait::async_trait;
    use kg_core::SectionType;
    use std::sync::Mutex;

    struct StubClient {
        responses: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        async fn extract(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
        ) -> ExtractionResult<(serde_json::Value, TokenUsage)> {
            let mut responses = self.responses.lock().unwrap();
            let value = responses.pop().unwrap_or(serde_json::json!({"problems": []}));
            Ok((value, TokenUsage::new(10, 5)))
        }
    }

    fn section() -> Section {
        Section {
            section_type: SectionType::Limitations,
            title: "Limitations".to_string(),
            content: "Our approach struggles with long documents and rare domains.".to_string(),
            start_char: 0,
            end_char: 10,
        }
    }

    #[tokio::test]
    async fn filters_below_confidence_and_short_statements() {
        let response = serde_json::json!({
            "problems": [
                {"statement": "too short", "quoted_text": "x", "confidence": 0.9, "section": "limitations"},
                {"statement": "This is a well formed problem statement indeed.", "quoted_text": "quote", "confidence": 0.3, "section": "limitations"},
                {"statement": "This is a well formed problem statement indeed.", "quoted_text": "quote", "confidence": 0.8, "section": "limitations"},
            ]
        });
        let client = Arc::new(StubClient { responses: Mutex::new(vec![response]) });
        let extractor = ProblemExtractor::new(client, ExtractorSettings::default());
        let outcome = extractor.extract_from_section(&section(), &PaperMeta::default()).await;
        assert_eq!(outcome.problems.len(), 1);
        assert_eq!(outcome.problems[0].confidence, 0.8);
    }

    #[tokio::test]
    async fn low_priority_section_is_skipped_without_llm_call() {
        let mut section = section();
        section.section_type = SectionType::References;
        let client = Arc::new(StubClient { responses: Mutex::new(vec![]) });
        let extractor = ProblemExtractor::new(client, ExtractorSettings::default());
        let outcome = extractor.extract_from_section(&section, &PaperMeta::default()).await;
        assert!(outcome.skipped);
        assert!(outcome.problems.is_empty());
    }
}
