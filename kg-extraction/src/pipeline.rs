//! End-to-end paper processing orchestration (C13, §4.13).
//!
//! `process_text`, `process_pdf_bytes`, and their callers all funnel
//! through [`Pipeline::process_extracted_text`], recording one
//! [`StageResult`] per stage regardless of outcome.

use std::sync::Arc;
use std::time::Instant;

use kg_core::config::{ExtractorSettings, RelationSettings};
use kg_core::SectionType;
use serde_json::json;

use crate::error::ExtractionResult;
use crate::llm_client::LlmClient;
use crate::models::{BatchExtractionResult, ExtractedProblem};
use crate::pdf_extractor::{ExtractedDocument, PdfExtractor};
use crate::problem_extractor::{PaperMeta, ProblemExtractor};
use crate::relation_extractor::RelationExtractor;
use crate::section_segmenter::{SectionSegmenter, SectionSegmenterConfig, SegmentedDocument};

/// Result of one pipeline stage, appended to [`PaperProcessingResult`]
/// regardless of whether the stage succeeded (§4.13).
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageResult {
    pub stage: String,
    pub success: bool,
    pub duration_ms: f64,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

impl StageResult {
    fn ok(stage: &str, started: Instant, metadata: serde_json::Value) -> Self {
        Self {
            stage: stage.to_string(),
            success: true,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            error: None,
            metadata,
        }
    }

    fn failed(stage: &str, started: Instant, error: impl ToString) -> Self {
        Self {
            stage: stage.to_string(),
            success: false,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            error: Some(error.to_string()),
            metadata: json!({}),
        }
    }
}

/// Complete result of processing one paper through the pipeline (§4.13).
#[derive(Debug, Clone, Default)]
pub struct PaperProcessingResult {
    pub paper_doi: Option<String>,
    pub paper_title: Option<String>,
    pub paper_authors: Vec<String>,
    pub source_url: Option<String>,
    pub source_path: Option<String>,
    pub stages: Vec<StageResult>,
    pub extracted_document: Option<ExtractedDocument>,
    pub segmented_document: Option<SegmentedDocument>,
    pub extraction_result: Option<BatchExtractionResult>,
    pub relation_result: Option<crate::models::RelationExtractionResult>,
    pub success: bool,
    pub total_duration_ms: f64,
}

impl PaperProcessingResult {
    pub fn problem_count(&self) -> usize {
        self.extraction_result.as_ref().map(|r| r.total_problems()).unwrap_or(0)
    }

    pub fn section_count(&self) -> usize {
        self.segmented_document.as_ref().map(|d| d.sections.len()).unwrap_or(0)
    }

    pub fn relation_count(&self) -> usize {
        self.relation_result.as_ref().map(|r| r.relation_count()).unwrap_or(0)
    }

    pub fn get_problems(&self) -> Vec<ExtractedProblem> {
        self.extraction_result.as_ref().map(|r| r.all_problems()).unwrap_or_default()
    }

    pub fn get_high_confidence_problems(&self, threshold: f64) -> Vec<ExtractedProblem> {
        self.extraction_result
            .as_ref()
            .map(|r| r.high_confidence_problems(threshold))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub min_section_length: usize,
    pub skip_references: bool,
    pub extraction: ExtractorSettings,
    pub relations: RelationSettings,
    pub extract_relations: bool,
    pub segmenter: SectionSegmenterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_section_length: 100,
            skip_references: true,
            extraction: ExtractorSettings::default(),
            relations: RelationSettings::default(),
            extract_relations: true,
            segmenter: SectionSegmenterConfig::default(),
        }
    }
}

/// Orchestrates PDF/text extraction through problem and relation
/// extraction (C13).
pub struct Pipeline {
    config: PipelineConfig,
    pdf_extractor: PdfExtractor,
    segmenter: SectionSegmenter,
    problem_extractor: ProblemExtractor,
    relation_extractor: RelationExtractor,
}

/// Text passed to relation extraction is capped at this many characters
/// to bound LLM prompt size (§4.13).
const RELATION_TEXT_CHAR_LIMIT: usize = 5000;

impl Pipeline {
    pub fn new(client: Arc<dyn LlmClient>, config: PipelineConfig) -> Self {
        let problem_extractor = ProblemExtractor::new(client.clone(), config.extraction.clone());
        let relation_extractor = RelationExtractor::with_llm(config.relations.clone(), client);
        Self {
            segmenter: SectionSegmenter::new(config.segmenter.clone()),
            pdf_extractor: PdfExtractor::new(),
            problem_extractor,
            relation_extractor,
            config,
        }
    }

    pub async fn process_text(
        &self,
        text: &str,
        paper_meta: &PaperMeta,
        authors: Vec<String>,
    ) -> PaperProcessingResult {
        let start = Instant::now();
        let mut result = PaperProcessingResult {
            paper_doi: paper_meta.doi.clone(),
            paper_title: paper_meta.title.clone(),
            paper_authors: authors,
            ..Default::default()
        };

        result.stages.push(StageResult::ok(
            "text_input",
            start,
            json!({ "chars": text.chars().count() }),
        ));

        self.process_extracted_text(&mut result, text).await;

        result.total_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        result.success = result.stages.iter().all(|s| s.success);
        result
    }

    pub async fn process_pdf_bytes(
        &self,
        bytes: &[u8],
        source_path: Option<String>,
        paper_meta: &PaperMeta,
        authors: Vec<String>,
    ) -> PaperProcessingResult {
        let start = Instant::now();
        let mut result = PaperProcessingResult {
            paper_doi: paper_meta.doi.clone(),
            paper_title: paper_meta.title.clone(),
            paper_authors: authors,
            source_path,
            ..Default::default()
        };

        let stage_start = Instant::now();
        let document = match self.pdf_extractor.extract(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                result.stages.push(StageResult::failed("pdf_extraction", stage_start, e));
                result.total_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                result.success = false;
                return result;
            }
        };

        result.stages.push(StageResult::ok(
            "pdf_extraction",
            stage_start,
            json!({ "pages": document.page_count(), "chars": document.cleaned_text.chars().count() }),
        ));
        let text = document.cleaned_text.clone();
        result.extracted_document = Some(document);

        self.process_extracted_text(&mut result, &text).await;

        result.total_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        result.success = result.stages.iter().all(|s| s.success);
        result
    }

    /// Stages 2-4, shared by every entry point (§4.13).
    async fn process_extracted_text(&self, result: &mut PaperProcessingResult, text: &str) {
        let stage_start = Instant::now();
        let segmented = self.segmenter.segment_with_abstract(text);
        let total_sections = segmented.sections.len();

        let filtered: Vec<_> = segmented
            .sections
            .iter()
            .filter(|s| !self.config.skip_references || s.section_type != SectionType::References)
            .filter(|s| s.content.len() >= self.config.min_section_length)
            .cloned()
            .collect();

        result.stages.push(StageResult::ok(
            "section_segmentation",
            stage_start,
            json!({ "total_sections": total_sections, "filtered_sections": filtered.len() }),
        ));
        result.segmented_document = Some(segmented);

        let stage_start = Instant::now();
        let paper_meta = PaperMeta { title: result.paper_title.clone(), doi: result.paper_doi.clone() };
        let extraction_result = self.problem_extractor.extract_from_sections(&filtered, &paper_meta).await;

        let section_errors: Vec<&str> = extraction_result
            .results
            .iter()
            .filter_map(|r| r.error.as_deref())
            .collect();
        let metadata = json!({
            "sections_processed": extraction_result.results.len(),
            "problems_extracted": extraction_result.total_problems(),
            "token_usage": extraction_result.total_tokens(),
            "section_errors": section_errors,
        });
        result.stages.push(if section_errors.is_empty() {
            StageResult::ok("problem_extraction", stage_start, metadata)
        } else {
            StageResult {
                stage: "problem_extraction".to_string(),
                success: false,
                duration_ms: stage_start.elapsed().as_secs_f64() * 1000.0,
                error: Some(section_errors.join("; ")),
                metadata,
            }
        });
        let problem_count = extraction_result.total_problems();
        result.extraction_result = Some(extraction_result);

        if self.config.extract_relations && problem_count >= 2 {
            let stage_start = Instant::now();
            let problems = result.get_problems();
            let excerpt: String = text.chars().take(RELATION_TEXT_CHAR_LIMIT).collect();

            let relation_result = self
                .relation_extractor
                .extract_from_text_with_llm(&excerpt, &problems, result.paper_title.as_deref())
                .await;

            let metadata = json!({ "relations_extracted": relation_result.relation_count() });
            result.stages.push(match &relation_result.llm_error {
                None => StageResult::ok("relation_extraction", stage_start, metadata),
                Some(llm_error) => StageResult {
                    stage: "relation_extraction".to_string(),
                    success: false,
                    duration_ms: stage_start.elapsed().as_secs_f64() * 1000.0,
                    error: Some(llm_error.clone()),
                    metadata,
                },
            });
            result.relation_result = Some(relation_result);
        }
    }
}

pub type PipelineResult<T> = ExtractionResult<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::TokenUsage;
    use async_trait::async_trait;

    struct EmptyClient;

    #[async_trait]
    impl LlmClient for EmptyClient {
        async fn extract(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
        ) -> ExtractionResult<(serde_json::Value, TokenUsage)> {
            Ok((json!({"problems": []}), TokenUsage::default()))
        }
    }

    #[tokio::test]
    async fn process_text_runs_all_stages_and_short_circuits_without_problems() {
        let pipeline = Pipeline::new(Arc::new(EmptyClient), PipelineConfig::default());
        let text = "Introduction\n".to_string()
            + &"This is a long introduction section with plenty of prose to pass the minimum section length floor required by the pipeline configuration before it tries to call the extractor. ".repeat(5);
        let meta = PaperMeta { title: Some("Test Paper".to_string()), doi: None };
        let result = pipeline.process_text(&text, &meta, vec![]).await;

        assert!(result.success);
        assert!(result.stages.iter().any(|s| s.stage == "text_input"));
        assert!(result.stages.iter().any(|s| s.stage == "section_segmentation"));
        assert!(result.stages.iter().any(|s| s.stage == "problem_extraction"));
        assert!(!result.stages.iter().any(|s| s.stage == "relation_extraction"));
    }
}
