//! Staged, resumable extraction of research-problem mentions from papers:
//! PDF text extraction, section segmentation, LLM-driven problem and
//! relation extraction, and durable batch orchestration (spec §4.9-§4.15).

pub mod batch_processor;
pub mod error;
pub mod llm_client;
pub mod models;
pub mod pdf_extractor;
pub mod pipeline;
pub mod problem_extractor;
pub mod relation_extractor;
pub mod section_segmenter;

pub use batch_processor::{BatchProcessor, BatchResult, JobRunner, PaperSpec, ProgressCallback};
pub use error::{ExtractionError, ExtractionResult};
pub use llm_client::{LlmClient, LlmClientConfig, OpenAiCompatibleClient, TokenUsage};
pub use models::{
    dedup_relations, BatchExtractionResult, ConfidentItem, ExtractedProblem, ExtractedRelation,
    RelationExtractionResult, SectionExtractionOutcome,
};
pub use pdf_extractor::{ExtractedDocument, ExtractedPage, PdfExtractor};
pub use pipeline::{PaperProcessingResult, Pipeline, PipelineConfig, StageResult};
pub use problem_extractor::{PaperMeta, ProblemExtractor};
pub use relation_extractor::RelationExtractor;
pub use section_segmenter::{Section, SectionSegmenter, SectionSegmenterConfig, SegmentedDocument};
