//! Cross-source merge (C8, spec §3/§4.8). Per-source field mapping lives in
//! `sources::*`, one handler per source variant (§9 "Dynamic dispatch by
//! source-tag string" is resolved by that closed sum type, not here);
//! `merge` is the only place that may emit `source = "merged"`.

use crate::error::{AcquisitionError, AcquisitionResult};
use crate::models::NormalizedPaper;

/// Merge several source-specific records describing the same paper into one
/// unified record. Per §3: longest title/abstract; earliest non-null DOI
/// wins; authors come from the richest source; sets are unioned;
/// `is_open_access` is true if any input says true.
pub fn merge(papers: Vec<NormalizedPaper>) -> AcquisitionResult<NormalizedPaper> {
    if papers.is_empty() {
        return Err(AcquisitionError::EmptyMerge);
    }
    if papers.len() == 1 {
        return Ok(papers.into_iter().next().unwrap());
    }

    let mut merged = NormalizedPaper {
        title: String::new(),
        source: "merged".to_string(),
        doi: None,
        external_ids: Default::default(),
        abstract_text: None,
        year: None,
        publication_date: None,
        venue: None,
        authors: Vec::new(),
        citation_count: None,
        reference_count: None,
        fields_of_study: Default::default(),
        publication_types: Default::default(),
        is_open_access: false,
        pdf_url: None,
    };

    let mut best_author_richness = 0u32;
    let mut latest_year: Option<i32> = None;

    for paper in &papers {
        if paper.title.len() > merged.title.len() {
            merged.title = paper.title.clone();
        }
        if let Some(abs) = &paper.abstract_text {
            if abs.len() > merged.abstract_text.as_deref().map(str::len).unwrap_or(0) {
                merged.abstract_text = Some(abs.clone());
            }
        }
        if merged.doi.is_none() {
            merged.doi = paper.doi.clone();
        }
        for (k, v) in &paper.external_ids {
            merged.external_ids.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if let Some(y) = paper.year {
            latest_year = Some(latest_year.map_or(y, |cur| cur.max(y)));
        }
        if merged.venue.is_none() {
            merged.venue = paper.venue.clone();
        }
        let richness = paper.author_richness();
        if richness >= best_author_richness || merged.authors.is_empty() {
            best_author_richness = richness;
            merged.authors = paper.authors.clone();
        }
        merged.citation_count = match (merged.citation_count, paper.citation_count) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        merged.reference_count = match (merged.reference_count, paper.reference_count) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        merged.fields_of_study.extend(paper.fields_of_study.iter().cloned());
        merged.publication_types.extend(paper.publication_types.iter().cloned());
        merged.is_open_access = merged.is_open_access || paper.is_open_access;
        if merged.pdf_url.is_none() {
            merged.pdf_url = paper.pdf_url.clone();
        }
        if merged.publication_date.is_none() {
            merged.publication_date = paper.publication_date.clone();
        }
    }

    merged.year = latest_year;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_core::SourceType;

    #[test]
    fn merging_a_single_paper_returns_it_unchanged() {
        let mut p = NormalizedPaper::new("Title", SourceType::Arxiv);
        p.doi = Some("10.1/x".to_string());
        let merged = merge(vec![p.clone()]).unwrap();
        assert_eq!(merged, p);
    }

    #[test]
    fn empty_merge_is_an_error() {
        assert!(merge(vec![]).is_err());
    }

    #[test]
    fn longest_title_and_abstract_win() {
        let mut a = NormalizedPaper::new("Short", SourceType::Arxiv);
        a.abstract_text = Some("brief".to_string());
        let mut b = NormalizedPaper::new("A Much Longer Title", SourceType::SemanticScholar);
        b.abstract_text = Some("a considerably longer abstract body".to_string());

        let merged = merge(vec![a, b]).unwrap();
        assert_eq!(merged.title, "A Much Longer Title");
        assert_eq!(merged.abstract_text.unwrap(), "a considerably longer abstract body");
        assert_eq!(merged.source, "merged");
    }

    #[test]
    fn earliest_non_null_doi_wins() {
        let a = NormalizedPaper::new("T", SourceType::Arxiv);
        let mut b = NormalizedPaper::new("T", SourceType::SemanticScholar);
        b.doi = Some("10.1/from-b".to_string());
        let merged = merge(vec![a, b]).unwrap();
        assert_eq!(merged.doi.as_deref(), Some("10.1/from-b"));
    }

    #[test]
    fn sets_are_unioned() {
        let mut a = NormalizedPaper::new("T", SourceType::Arxiv);
        a.fields_of_study.insert("cs.LG".to_string());
        let mut b = NormalizedPaper::new("T", SourceType::OpenAlex);
        b.fields_of_study.insert("Machine Learning".to_string());

        let merged = merge(vec![a, b]).unwrap();
        assert_eq!(merged.fields_of_study.len(), 2);
    }

    #[test]
    fn open_access_is_true_if_any_source_says_true() {
        let a = NormalizedPaper::new("T", SourceType::SemanticScholar);
        let mut b = NormalizedPaper::new("T", SourceType::Arxiv);
        b.is_open_access = true;
        let merged = merge(vec![a, b]).unwrap();
        assert!(merged.is_open_access);
    }
}
