//! PDF text extraction and cleanup (C9, §4.9).

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

use crate::error::{ExtractionError, ExtractionResult};

/// One page of extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub page_number: usize,
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
}

impl ExtractedPage {
    fn new(page_number: usize, text: String) -> Self {
        let char_count = text.chars().count();
        let word_count = text.split_whitespace().count();
        Self { page_number, text, char_count, word_count }
    }
}

/// Full extraction result for one PDF document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub pages: Vec<ExtractedPage>,
    /// Cleaned, concatenated text across all pages.
    pub cleaned_text: String,
    /// True when the mean page length suggests a scanned, non-OCR'd PDF.
    pub is_scanned: bool,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Threshold below which the mean chars-per-page is treated as a scan
/// with no extractable text layer (§4.9).
const SCANNED_MEAN_CHARS_THRESHOLD: f64 = 200.0;

/// Extracts and cleans text from PDF bytes (C9).
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract ordered pages from PDF bytes, then clean the concatenation.
    pub fn extract(&self, bytes: &[u8]) -> ExtractionResult<ExtractedDocument> {
        let raw_pages = extract_pages(bytes)?;
        let pages: Vec<ExtractedPage> = raw_pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| ExtractedPage::new(i + 1, text))
            .collect();

        let is_scanned = if pages.is_empty() {
            true
        } else {
            let mean = pages.iter().map(|p| p.char_count).sum::<usize>() as f64 / pages.len() as f64;
            mean < SCANNED_MEAN_CHARS_THRESHOLD
        };

        let concatenated = pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n\n");
        let cleaned_text = clean_text(&concatenated);

        Ok(ExtractedDocument { pages, cleaned_text, is_scanned })
    }
}

/// Split the crate-level page extraction off so the regex/cleanup logic
/// below can be unit tested without needing real PDF bytes.
fn extract_pages(bytes: &[u8]) -> ExtractionResult<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))
}

fn banner_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?mi)^\s*(arXiv:\S+(\s+\[\S+\])?(\s+\d{1,2}\s+\w+\s+\d{4})?|Preprint\.?\s*(Under review.*)?|Proceedings of .*|Published as a conference paper.*|\d{1,4})\s*$",
        )
        .expect("valid banner regex")
    })
}

fn dehyphenate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([a-z])-\n([a-z])").expect("valid dehyphenation regex"))
}

fn blank_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("valid newline-run regex"))
}

fn space_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[ \t]{2,}").expect("valid space-run regex"))
}

/// Three-step cleaning pipeline (§4.9): strip banners/page numbers,
/// dehyphenate line-wrapped words, normalize Unicode and whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped = banner_pattern().replace_all(text, "");
    let dehyphenated = dehyphenate_pattern().replace_all(&stripped, "$1$2");
    let normalized: String = dehyphenated.nfc().collect();
    let collapsed_spaces = space_run_pattern().replace_all(&normalized, " ");
    let collapsed_newlines = blank_run_pattern().replace_all(&collapsed_spaces, "\n\n");
    collapsed_newlines.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_arxiv_banner_line() {
        let text = "arXiv:2301.01234v2 [cs.CL] 3 Jan 2023\nActual paper content starts here.";
        let cleaned = clean_text(text);
        assert!(!cleaned.contains("arXiv:"));
        assert!(cleaned.contains("Actual paper content"));
    }

    #[test]
    fn dehyphenates_across_line_breaks() {
        let text = "This is a demon-\nstration of dehyphenation.";
        let cleaned = clean_text(text);
        assert!(cleaned.contains("demonstration"));
        assert!(!cleaned.contains("demon-"));
    }

    #[test]
    fn collapses_excess_newlines_and_spaces() {
        let text = "line one\n\n\n\n\nline two   with   spaces";
        let cleaned = clean_text(text);
        assert!(!cleaned.contains("\n\n\n"));
        assert!(!cleaned.contains("   "));
    }

    #[test]
    fn page_word_and_char_counts() {
        let page = ExtractedPage::new(1, "hello world".to_string());
        assert_eq!(page.word_count, 2);
        assert_eq!(page.char_count, 11);
    }

    #[test]
    fn empty_document_is_treated_as_scanned() {
        let doc = ExtractedDocument { pages: vec![], cleaned_text: String::new(), is_scanned: true };
        assert!(doc.is_scanned);
        assert_eq!(doc.page_count(), 0);
    }
}
