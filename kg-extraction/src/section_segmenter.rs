//! Heading-driven section segmentation (C10, §4.10).

use std::sync::OnceLock;

use kg_core::SectionType;
use regex::Regex;

/// One identified section of a paper.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub section_type: SectionType,
    pub title: String,
    pub content: String,
    pub start_char: usize,
    pub end_char: usize,
}

impl Section {
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    pub fn priority(&self) -> i32 {
        self.section_type.priority()
    }
}

/// Output of segmenting one document.
#[derive(Debug, Clone)]
pub struct SegmentedDocument {
    pub sections: Vec<Section>,
    pub full_text: String,
    pub detected_structure: bool,
}

impl SegmentedDocument {
    pub fn get_sections_by_type(&self, section_type: SectionType) -> Vec<&Section> {
        self.sections.iter().filter(|s| s.section_type == section_type).collect()
    }

    pub fn get_sections_by_priority(&self, max_priority: i32) -> Vec<&Section> {
        let mut out: Vec<&Section> =
            self.sections.iter().filter(|s| s.priority() <= max_priority).collect();
        out.sort_by_key(|s| s.priority());
        out
    }

    /// Sections most likely to contain research problem statements (§4.10).
    pub fn get_problem_sections(&self) -> Vec<&Section> {
        self.get_sections_by_priority(5)
    }
}

#[derive(Debug, Clone)]
pub struct SectionSegmenterConfig {
    pub min_section_words: usize,
    pub max_heading_length: usize,
}

impl Default for SectionSegmenterConfig {
    fn default() -> Self {
        Self { min_section_words: 20, max_heading_length: 100 }
    }
}

/// Segments academic-paper text into typed sections by heuristic heading
/// detection (C10).
#[derive(Debug, Clone, Default)]
pub struct SectionSegmenter {
    config: SectionSegmenterConfig,
}

impl SectionSegmenter {
    pub fn new(config: SectionSegmenterConfig) -> Self {
        Self { config }
    }

    pub fn segment(&self, text: &str) -> SegmentedDocument {
        if text.trim().is_empty() {
            return SegmentedDocument {
                sections: Vec::new(),
                full_text: text.to_string(),
                detected_structure: false,
            };
        }

        let headings = self.find_headings(text);
        if headings.is_empty() {
            return SegmentedDocument {
                sections: vec![Section {
                    section_type: SectionType::Unknown,
                    title: String::new(),
                    content: text.to_string(),
                    start_char: 0,
                    end_char: text.len(),
                }],
                full_text: text.to_string(),
                detected_structure: false,
            };
        }

        let mut sections = self.extract_sections(text, &headings);
        sections.retain(|s| s.word_count() >= self.config.min_section_words);

        SegmentedDocument { sections, full_text: text.to_string(), detected_structure: true }
    }

    /// Segment with special-case abstract extraction preceding any
    /// numbered introduction heading (§4.10).
    pub fn segment_with_abstract(&self, text: &str) -> SegmentedDocument {
        let mut sections = Vec::new();
        let mut remaining_text = text;
        let mut offset = 0usize;

        if let Some(m) = abstract_prefix_pattern().captures(text) {
            let whole = m.get(0).expect("capture 0 always present");
            let content = m.get(1).map(|g| g.as_str().trim()).unwrap_or_default();
            if content.split_whitespace().count() >= self.config.min_section_words {
                sections.push(Section {
                    section_type: SectionType::Abstract,
                    title: "Abstract".to_string(),
                    content: content.to_string(),
                    start_char: whole.start(),
                    end_char: whole.end(),
                });
                offset = whole.end();
                remaining_text = &text[offset..];
            }
        }

        let remaining_doc = self.segment(remaining_text);
        for mut section in remaining_doc.sections {
            section.start_char += offset;
            section.end_char += offset;
            sections.push(section);
        }

        let detected_structure = sections.len() > 1;
        SegmentedDocument { sections, full_text: text.to_string(), detected_structure }
    }

    fn find_headings(&self, text: &str) -> Vec<(usize, usize, String, SectionType)> {
        let mut headings = Vec::new();
        let mut current_pos = 0usize;

        for line in text.split('\n') {
            let stripped = line.trim();
            if stripped.is_empty() || stripped.len() > self.config.max_heading_length {
                current_pos += line.len() + 1;
                continue;
            }

            let section_type = classify_heading(stripped);
            if section_type != SectionType::Unknown {
                let end_pos = current_pos + line.len();
                headings.push((current_pos, end_pos, stripped.to_string(), section_type));
            }

            current_pos += line.len() + 1;
        }

        headings
    }

    fn extract_sections(
        &self,
        text: &str,
        headings: &[(usize, usize, String, SectionType)],
    ) -> Vec<Section> {
        let mut sections = Vec::with_capacity(headings.len());

        for (i, (start_pos, heading_end, heading_text, section_type)) in headings.iter().enumerate() {
            let content_start = *heading_end;
            let content_end = headings.get(i + 1).map(|next| next.0).unwrap_or(text.len());
            let content = text[content_start..content_end].trim().to_string();

            sections.push(Section {
                section_type: *section_type,
                title: heading_text.clone(),
                content,
                start_char: *start_pos,
                end_char: content_end,
            });
        }

        sections
    }
}

/// Classify a single candidate heading line, or `Unknown` if no pattern
/// matches. Patterns are tried in the declared section-type order; the
/// first match wins.
fn classify_heading(heading_text: &str) -> SectionType {
    let cleaned = heading_text.trim();
    for (section_type, patterns) in section_patterns() {
        if patterns.iter().any(|p| p.is_match(cleaned)) {
            return *section_type;
        }
    }
    SectionType::Unknown
}

fn abstract_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)^abstract\s*[:\-]?\s*(.*?)(?=\n\s*(?:\d+\.?\s*)?(?:introduction|1\.|i\.))")
            .expect("valid abstract-prefix regex")
    })
}

/// Ordered heading patterns per section type.
fn section_patterns() -> &'static Vec<(SectionType, Vec<Regex>)> {
    static PATTERNS: OnceLock<Vec<(SectionType, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")).expect("valid section heading regex"))
                .collect()
        };

        vec![
            (SectionType::Abstract, compile(&[r"^abstract\s*$", r"^summary\s*$"])),
            (
                SectionType::Introduction,
                compile(&[
                    r"^(?:\d+\.?\s*)?introduction\s*$",
                    r"^(?:\d+\.?\s*)?overview\s*$",
                    r"^1\.?\s*introduction\s*$",
                ]),
            ),
            (
                SectionType::RelatedWork,
                compile(&[
                    r"^(?:\d+\.?\s*)?related\s+work\s*$",
                    r"^(?:\d+\.?\s*)?prior\s+work\s*$",
                    r"^(?:\d+\.?\s*)?literature\s+review\s*$",
                    r"^(?:\d+\.?\s*)?related\s+research\s*$",
                ]),
            ),
            (
                SectionType::Background,
                compile(&[
                    r"^(?:\d+\.?\s*)?background\s*$",
                    r"^(?:\d+\.?\s*)?preliminaries\s*$",
                    r"^(?:\d+\.?\s*)?problem\s+(?:statement|formulation|definition)\s*$",
                ]),
            ),
            (
                SectionType::Methods,
                compile(&[
                    r"^(?:\d+\.?\s*)?method(?:s|ology)?\s*$",
                    r"^(?:\d+\.?\s*)?approach\s*$",
                    r"^(?:\d+\.?\s*)?(?:our\s+)?(?:proposed\s+)?(?:method|approach|framework|model)\s*$",
                    r"^(?:\d+\.?\s*)?technique(?:s)?\s*$",
                    r"^(?:\d+\.?\s*)?algorithm\s*$",
                ]),
            ),
            (
                SectionType::Experiments,
                compile(&[
                    r"^(?:\d+\.?\s*)?experiment(?:s|al)?\s*(?:setup|settings)?\s*$",
                    r"^(?:\d+\.?\s*)?evaluation\s*$",
                    r"^(?:\d+\.?\s*)?empirical\s+(?:study|evaluation|analysis)\s*$",
                    r"^(?:\d+\.?\s*)?(?:experimental\s+)?setup\s*$",
                ]),
            ),
            (
                SectionType::Results,
                compile(&[
                    r"^(?:\d+\.?\s*)?results?\s*$",
                    r"^(?:\d+\.?\s*)?(?:experimental\s+)?results?\s+(?:and\s+)?(?:analysis|discussion)?\s*$",
                    r"^(?:\d+\.?\s*)?findings\s*$",
                    r"^(?:\d+\.?\s*)?results?\s+and\s+discussion\s*$",
                ]),
            ),
            (
                SectionType::Discussion,
                compile(&[
                    r"^(?:\d+\.?\s*)?discussion\s*$",
                    r"^(?:\d+\.?\s*)?analysis\s*$",
                    r"^(?:\d+\.?\s*)?interpretation\s*$",
                ]),
            ),
            (
                SectionType::Limitations,
                compile(&[
                    r"^(?:\d+\.?\s*)?limitation(?:s)?\s*$",
                    r"^(?:\d+\.?\s*)?limitation(?:s)?\s+(?:and\s+)?(?:future\s+work|directions)?\s*$",
                    r"^(?:\d+\.?\s*)?(?:current\s+)?limitation(?:s)?\s*$",
                    r"^(?:\d+\.?\s*)?threats?\s+to\s+validity\s*$",
                    r"^(?:\d+\.?\s*)?(?:potential\s+)?(?:limitation(?:s)?|weakness(?:es)?)\s*$",
                ]),
            ),
            (
                SectionType::FutureWork,
                compile(&[
                    r"^(?:\d+\.?\s*)?future\s+(?:work|directions?|research)\s*$",
                    r"^(?:\d+\.?\s*)?(?:directions?\s+for\s+)?future\s+(?:work|research)\s*$",
                    r"^(?:\d+\.?\s*)?open\s+(?:problems?|questions?|issues?)\s*$",
                    r"^(?:\d+\.?\s*)?next\s+steps?\s*$",
                ]),
            ),
            (
                SectionType::Conclusion,
                compile(&[
                    r"^(?:\d+\.?\s*)?conclusion(?:s)?\s*$",
                    r"^(?:\d+\.?\s*)?concluding\s+remarks?\s*$",
                    r"^(?:\d+\.?\s*)?conclusion(?:s)?\s+(?:and\s+)?(?:future\s+work)?\s*$",
                    r"^(?:\d+\.?\s*)?summary\s+and\s+conclusion(?:s)?\s*$",
                ]),
            ),
            (SectionType::Acknowledgments, compile(&[r"^acknowledgment(?:s)?\s*$", r"^acknowledgement(?:s)?\s*$"])),
            (
                SectionType::References,
                compile(&[r"^references?\s*$", r"^bibliography\s*$", r"^(?:cited\s+)?literature\s*$"]),
            ),
            (
                SectionType::Appendix,
                compile(&[
                    r"^appendix\s*[a-z]?\s*$",
                    r"^appendices\s*$",
                    r"^supplementary\s+(?:material|information)\s*$",
                ]),
            ),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_headings() {
        assert_eq!(classify_heading("Introduction"), SectionType::Introduction);
        assert_eq!(classify_heading("1. Introduction"), SectionType::Introduction);
        assert_eq!(classify_heading("Limitations and Future Work"), SectionType::Limitations);
        assert_eq!(classify_heading("References"), SectionType::References);
        assert_eq!(classify_heading("not a heading at all, just prose"), SectionType::Unknown);
    }

    #[test]
    fn segments_simple_paper() {
        let text = "Abstract\nThis is the abstract of the paper describing the work in enough words to pass the floor.\n\nIntroduction\nThis is the introduction section with plenty of words to clear the minimum section word count floor easily.\n\nLimitations\nOur approach has several limitations worth discussing here at some length to pass the floor easily too.";
        let segmenter = SectionSegmenter::default();
        let doc = segmenter.segment(text);
        assert!(doc.detected_structure);
        assert!(doc.get_sections_by_type(SectionType::Limitations).len() == 1);
        assert!(doc.get_problem_sections().iter().any(|s| s.section_type == SectionType::Limitations));
    }

    #[test]
    fn no_headings_falls_back_to_unknown_section() {
        let text = "Just a wall of prose with no headings whatsoever in it at all.";
        let segmenter = SectionSegmenter::default();
        let doc = segmenter.segment(text);
        assert!(!doc.detected_structure);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].section_type, SectionType::Unknown);
    }

    #[test]
    fn short_sections_are_dropped() {
        let text = "Acknowledgments\ntoo short\n\nIntroduction\nThis introduction section has enough words in it to clear the default minimum section word count floor comfortably now.";
        let segmenter = SectionSegmenter::default();
        let doc = segmenter.segment(text);
        assert!(doc.get_sections_by_type(SectionType::Acknowledgments).is_empty());
        assert_eq!(doc.get_sections_by_type(SectionType::Introduction).len(), 1);
    }
}
