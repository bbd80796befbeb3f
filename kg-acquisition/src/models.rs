//! The unified bibliographic record (`NormalizedPaper`, spec §3) and the
//! PDF download result tagged union (§4.7).

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use kg_core::SourceType;
use serde::{Deserialize, Serialize};

/// A single author entry, affiliation/ID richness varying by source (§4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAuthor {
    pub name: String,
    pub external_id: Option<String>,
    pub affiliation: Option<String>,
    pub orcid: Option<String>,
}

impl NormalizedAuthor {
    /// How much identifying metadata this author entry carries; used to pick
    /// the richer author list during a merge (§3/§4.8).
    fn richness(&self) -> u8 {
        self.external_id.is_some() as u8
            + self.affiliation.is_some() as u8
            + self.orcid.is_some() as u8
    }
}

/// Unified bibliographic record. `source` is either a concrete
/// [`SourceType`] tag or `"merged"` once `merge` has run (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPaper {
    pub title: String,
    pub source: String,
    pub doi: Option<String>,
    pub external_ids: BTreeMap<String, String>,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub publication_date: Option<String>,
    pub venue: Option<String>,
    pub authors: Vec<NormalizedAuthor>,
    pub citation_count: Option<u64>,
    pub reference_count: Option<u64>,
    pub fields_of_study: BTreeSet<String>,
    pub publication_types: BTreeSet<String>,
    pub is_open_access: bool,
    pub pdf_url: Option<String>,
}

impl NormalizedPaper {
    pub fn new(title: impl Into<String>, source: SourceType) -> Self {
        Self {
            title: title.into(),
            source: source.as_str().to_string(),
            doi: None,
            external_ids: BTreeMap::new(),
            abstract_text: None,
            year: None,
            publication_date: None,
            venue: None,
            authors: Vec::new(),
            citation_count: None,
            reference_count: None,
            fields_of_study: BTreeSet::new(),
            publication_types: BTreeSet::new(),
            is_open_access: false,
            pdf_url: None,
        }
    }

    /// The invariant from §3: a DOI, when present, always starts with `10.`.
    pub fn doi_is_valid(&self) -> bool {
        self.doi.as_deref().map(|d| d.starts_with("10.")).unwrap_or(true)
    }

    /// Authors entry used for the "richest affiliation+ID score" merge rule.
    pub fn author_richness(&self) -> u32 {
        self.authors.iter().map(|a| a.richness() as u32).sum()
    }
}

/// Outcome of `get_pdf` (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadResult {
    Completed {
        identifier: String,
        path: std::path::PathBuf,
        size: u64,
        content_hash: String,
        source: SourceType,
    },
    NotAvailable {
        identifier: String,
        reason: String,
    },
    Failed {
        identifier: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_paper_has_no_doi_and_satisfies_the_invariant() {
        let p = NormalizedPaper::new("Title", SourceType::Arxiv);
        assert!(p.doi_is_valid());
    }

    #[test]
    fn doi_with_bad_prefix_fails_invariant() {
        let mut p = NormalizedPaper::new("Title", SourceType::SemanticScholar);
        p.doi = Some("not-a-doi".to_string());
        assert!(!p.doi_is_valid());
    }
}
