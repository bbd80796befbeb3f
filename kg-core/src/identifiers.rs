//! Paper identifiers and source tags (spec §3 "Identifiers & source tags").

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Origin of a bibliographic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    SemanticScholar,
    Arxiv,
    OpenAlex,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::SemanticScholar => "semantic_scholar",
            SourceType::Arxiv => "arxiv",
            SourceType::OpenAlex => "openalex",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A paper identifier, tagged by kind. Detection is regex-based with
/// explicit prefix stripping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PaperIdentifier {
    Doi(String),
    ArxivId(String),
    S2Id(String),
    OpenAlexId(String),
    Url(String),
    Unknown(String),
}

static DOI_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|doi:)").unwrap());
static DOI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());

static ARXIV_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://arxiv\.org/abs/|arxiv:)").unwrap()
});
static ARXIV_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").unwrap());

static S2_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://(?:www\.)?semanticscholar\.org/paper/[^/]*/|s2:)").unwrap()
});
static S2_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-f]{40}$").unwrap());

static OPENALEX_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://openalex\.org/|openalex:)").unwrap()
});
static OPENALEX_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[Ww]\d+$").unwrap());

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^https?://").unwrap());

impl PaperIdentifier {
    /// Detect the identifier kind from a raw user-supplied string, stripping
    /// known prefixes before matching the bare identifier pattern.
    pub fn detect(raw: &str) -> PaperIdentifier {
        let trimmed = raw.trim();

        if let Some(rest) = strip_prefix(&DOI_PREFIX_RE, trimmed) {
            if DOI_RE.is_match(rest) {
                return PaperIdentifier::Doi(rest.to_string());
            }
        } else if DOI_RE.is_match(trimmed) {
            return PaperIdentifier::Doi(trimmed.to_string());
        }

        if let Some(rest) = strip_prefix(&ARXIV_PREFIX_RE, trimmed) {
            if ARXIV_ID_RE.is_match(rest) {
                return PaperIdentifier::ArxivId(rest.to_string());
            }
        } else if ARXIV_ID_RE.is_match(trimmed) {
            return PaperIdentifier::ArxivId(trimmed.to_string());
        }

        if let Some(rest) = strip_prefix(&S2_PREFIX_RE, trimmed) {
            if S2_ID_RE.is_match(rest) {
                return PaperIdentifier::S2Id(rest.to_string());
            }
        } else if S2_ID_RE.is_match(trimmed) {
            return PaperIdentifier::S2Id(trimmed.to_string());
        }

        if let Some(rest) = strip_prefix(&OPENALEX_PREFIX_RE, trimmed) {
            if OPENALEX_ID_RE.is_match(rest) {
                return PaperIdentifier::OpenAlexId(rest.to_string());
            }
        } else if OPENALEX_ID_RE.is_match(trimmed) {
            return PaperIdentifier::OpenAlexId(trimmed.to_string());
        }

        if URL_RE.is_match(trimmed) {
            return PaperIdentifier::Url(trimmed.to_string());
        }

        PaperIdentifier::Unknown(trimmed.to_string())
    }

    pub fn as_raw(&self) -> &str {
        match self {
            PaperIdentifier::Doi(s)
            | PaperIdentifier::ArxivId(s)
            | PaperIdentifier::S2Id(s)
            | PaperIdentifier::OpenAlexId(s)
            | PaperIdentifier::Url(s)
            | PaperIdentifier::Unknown(s) => s,
        }
    }
}

fn strip_prefix<'a>(re: &Regex, s: &'a str) -> Option<&'a str> {
    re.find(s).map(|m| &s[m.end()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_bare_doi() {
        assert_eq!(
            PaperIdentifier::detect("10.1145/3411764.3445518"),
            PaperIdentifier::Doi("10.1145/3411764.3445518".to_string())
        );
    }

    #[test]
    fn strips_doi_url_prefix() {
        assert_eq!(
            PaperIdentifier::detect("https://doi.org/10.1038/s41586-021-03491-6"),
            PaperIdentifier::Doi("10.1038/s41586-021-03491-6".to_string())
        );
    }

    #[test]
    fn detects_arxiv_id_with_version() {
        assert_eq!(
            PaperIdentifier::detect("arxiv:2301.12345v2"),
            PaperIdentifier::ArxivId("2301.12345v2".to_string())
        );
    }

    #[test]
    fn detects_arxiv_abs_url() {
        assert_eq!(
            PaperIdentifier::detect("https://arxiv.org/abs/2301.12345"),
            PaperIdentifier::ArxivId("2301.12345".to_string())
        );
    }

    #[test]
    fn detects_openalex_id() {
        assert_eq!(
            PaperIdentifier::detect("https://openalex.org/W2741809807"),
            PaperIdentifier::OpenAlexId("W2741809807".to_string())
        );
    }

    #[test]
    fn falls_back_to_url() {
        assert_eq!(
            PaperIdentifier::detect("https://example.com/paper.pdf"),
            PaperIdentifier::Url("https://example.com/paper.pdf".to_string())
        );
    }

    #[test]
    fn falls_back_to_unknown() {
        assert_eq!(
            PaperIdentifier::detect("not an identifier"),
            PaperIdentifier::Unknown("not an identifier".to_string())
        );
    }
}
