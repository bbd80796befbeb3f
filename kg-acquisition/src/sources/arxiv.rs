//! arXiv Atom feed client (C5, spec §4.5/§6).
//!
//! The arXiv API speaks Atom/XML rather than JSON; entries are parsed with a
//! streaming `quick_xml::Reader` event loop rather than a full DOM, the way
//! PubMed's Atom-flavored feed is parsed elsewhere in this codebase's lineage.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::context::SourceContext;
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::models::{NormalizedAuthor, NormalizedPaper};
use crate::response_cache::Namespace;
use kg_core::CoreError;

const QUERY_URL: &str = "http://export.arxiv.org/api/query";
const PDF_BASE_URL: &str = "https://arxiv.org/pdf";
const ABS_BASE_URL: &str = "https://arxiv.org/abs";

static ARXIV_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:arxiv[:.])?(\d{4}\.\d{4,5}(?:v\d+)?|[a-z-]+(?:\.[A-Z]{2})?/\d{7}(?:v\d+)?)").unwrap()
});
static VERSION_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"v\d+$").unwrap());

/// Strip any known prefix (`arxiv:`, a full `/abs/` or `/pdf/` URL) and
/// return the bare identifier, version suffix retained (§4.5).
pub fn normalize_arxiv_id(identifier: &str) -> String {
    ARXIV_ID_RE
        .captures(identifier)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| identifier.to_string())
}

/// PDF URL with any `vN` version suffix stripped from the base id.
pub fn construct_pdf_url(arxiv_id: &str) -> String {
    let base_id = VERSION_SUFFIX_RE.replace(arxiv_id, "");
    format!("{PDF_BASE_URL}/{base_id}.pdf")
}

/// Abstract page URL. Unlike the PDF URL, the version suffix is preserved.
pub fn construct_abs_url(arxiv_id: &str) -> String {
    format!("{ABS_BASE_URL}/{arxiv_id}")
}

#[derive(Debug, Default)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    authors: Vec<NormalizedAuthor>,
    published: String,
    categories: Vec<String>,
    primary_category: Option<String>,
    doi: Option<String>,
}

/// Parse an Atom feed body into entries. Malformed documents with zero
/// entries surface as `AcquisitionError::Parse`; partially-malformed entries
/// are skipped rather than aborting the whole feed.
fn parse_feed(xml: &str) -> AcquisitionResult<Vec<Entry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<Entry> = None;
    let mut in_entry_id = false;
    let mut in_title = false;
    let mut in_summary = false;
    let mut in_published = false;
    let mut in_author_name = false;
    let mut in_author = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"entry" => current = Some(Entry::default()),
                b"id" if current.is_some() => in_entry_id = true,
                b"title" if current.is_some() => in_title = true,
                b"summary" => in_summary = true,
                b"published" => in_published = true,
                b"author" => in_author = true,
                b"name" if in_author => in_author_name = true,
                b"category" => {
                    if let Some(entry) = current.as_mut() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"term" {
                                let term = String::from_utf8_lossy(&attr.value).to_string();
                                if entry.primary_category.is_none() {
                                    entry.primary_category = Some(term.clone());
                                }
                                entry.categories.push(term);
                            }
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"category" => {
                if let Some(entry) = current.as_mut() {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"term" {
                            let term = String::from_utf8_lossy(&attr.value).to_string();
                            if entry.primary_category.is_none() {
                                entry.primary_category = Some(term.clone());
                            }
                            entry.categories.push(term);
                        }
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if let Some(entry) = current.as_mut() {
                    if in_entry_id {
                        entry.id = normalize_arxiv_id(&text);
                    } else if in_title {
                        entry.title = text.replace('\n', " ").trim().to_string();
                    } else if in_summary {
                        entry.summary = text.trim().to_string();
                    } else if in_published {
                        entry.published = text;
                    } else if in_author_name {
                        entry.authors.push(NormalizedAuthor {
                            name: text,
                            external_id: None,
                            affiliation: None,
                            orcid: None,
                        });
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                b"id" => in_entry_id = false,
                b"title" => in_title = false,
                b"summary" => in_summary = false,
                b"published" => in_published = false,
                b"author" => in_author = false,
                b"name" => in_author_name = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(AcquisitionError::Parse(format!("arXiv feed XML error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

impl Entry {
    fn normalize(self) -> NormalizedPaper {
        let mut p = NormalizedPaper::new(self.title, kg_core::SourceType::Arxiv);
        p.abstract_text = Some(self.summary);
        p.authors = self.authors;
        p.doi = self.doi;
        p.is_open_access = true;
        p.publication_date = Some(self.published.clone());
        p.year = year_from_arxiv_id(&self.id).or_else(|| year_from_published(&self.published));
        p.fields_of_study = self.categories.into_iter().collect::<BTreeSet<_>>();
        p.external_ids.insert("arxiv".to_string(), self.id.clone());
        p.pdf_url = Some(construct_pdf_url(&self.id));
        p
    }
}

/// Year parsed from `published`, falling back to the new-style arXiv id's
/// leading `YYMM` mapped to a century (§4.8: new ids starting `00`-`90`
/// are assumed 2000s, `91`-`99` 1900s, matching arXiv's own id epoch).
fn year_from_published(published: &str) -> Option<i32> {
    published.get(0..4).and_then(|s| s.parse().ok())
}

fn year_from_arxiv_id(id: &str) -> Option<i32> {
    let digits = id.split('/').last().unwrap_or(id);
    let yy: i32 = digits.get(0..2)?.parse().ok()?;
    Some(if yy >= 91 { 1900 + yy } else { 2000 + yy })
}

pub struct ArxivClient {
    http: reqwest::Client,
    ctx: SourceContext,
}

impl ArxivClient {
    pub fn new(ctx: SourceContext, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build arXiv http client");
        Self { http, ctx }
    }

    async fn query(&self, params: &[(&str, &str)]) -> AcquisitionResult<Vec<Entry>> {
        self.ctx.breaker.check()?;
        self.ctx.limiter.acquire().await;

        let result = self
            .ctx
            .retry
            .run(|| async {
                let resp = self
                    .http
                    .get(QUERY_URL)
                    .query(params)
                    .send()
                    .await
                    .map_err(AcquisitionError::Http)?;
                let status = resp.status();
                if status.as_u16() == 429 {
                    return Err(AcquisitionError::Core(CoreError::RateLimited {
                        retry_after: Duration::from_secs(3),
                    }));
                }
                if status.is_server_error() {
                    return Err(AcquisitionError::Core(CoreError::Transient(format!("status {status}"))));
                }
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(AcquisitionError::Core(CoreError::ApiError { status: status.as_u16(), body }));
                }
                let text = resp.text().await.map_err(AcquisitionError::Http)?;
                parse_feed(&text)
            })
            .await;

        match result {
            Ok(entries) => {
                self.ctx.breaker.record_success();
                Ok(entries)
            }
            Err(e) => {
                if e.counts_as_breaker_failure() {
                    self.ctx.breaker.record_failure();
                }
                Err(e)
            }
        }
    }

    pub async fn get_paper(&self, identifier: &str) -> AcquisitionResult<NormalizedPaper> {
        let arxiv_id = normalize_arxiv_id(identifier);
        let cache_key = crate::response_cache::ResponseCache::make_key("arxiv", "get_paper", &[("id", arxiv_id.as_str())]);
        if let Some(hit) = self.ctx.cache.get(&cache_key, Namespace::Paper) {
            return serde_json::from_value(hit).map_err(|e| AcquisitionError::Parse(e.to_string()));
        }

        let entries = self
            .query(&[("id_list", arxiv_id.as_str()), ("max_results", "1")])
            .await?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or(AcquisitionError::Core(CoreError::NotFound))?;
        let normalized = entry.normalize();
        let value = serde_json::to_value(&normalized).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
        self.ctx.cache.set(&cache_key, value, Namespace::Paper);
        Ok(normalized)
    }

    pub async fn search_papers(&self, query: &str, limit: usize) -> AcquisitionResult<Vec<NormalizedPaper>> {
        let limit = limit.min(100);
        let limit_str = limit.to_string();
        let params = [("search_query", query), ("start", "0"), ("max_results", limit_str.as_str())];

        let cache_key = crate::response_cache::ResponseCache::make_key("arxiv", "search_papers", &params);
        let entries = if let Some(hit) = self.ctx.cache.get(&cache_key, Namespace::Search) {
            serde_json::from_value(hit).map_err(|e| AcquisitionError::Parse(e.to_string()))?
        } else {
            let entries = self.query(&params).await?;
            let value = serde_json::to_value(
                entries.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            )
            .map_err(|e| AcquisitionError::Parse(e.to_string()))?;
            self.ctx.cache.set(&cache_key, value, Namespace::Search);
            entries
        };

        Ok(entries.into_iter().map(Entry::normalize).collect())
    }

    pub fn get_pdf_url(&self, identifier: &str) -> String {
        construct_pdf_url(&normalize_arxiv_id(identifier))
    }

    pub fn get_abs_url(&self, identifier: &str) -> String {
        construct_abs_url(&normalize_arxiv_id(identifier))
    }

    /// Download PDF bytes directly from arXiv. Bypasses the cache/breaker
    /// pipeline used for metadata — PDF storage is C6's concern.
    pub async fn download_pdf(&self, identifier: &str) -> AcquisitionResult<Vec<u8>> {
        let url = self.get_pdf_url(identifier);
        let resp = self.http.get(&url).send().await.map_err(AcquisitionError::Http)?;
        if resp.status().as_u16() == 404 {
            return Err(AcquisitionError::Core(CoreError::NotFound));
        }
        if !resp.status().is_success() {
            return Err(AcquisitionError::Core(CoreError::ApiError {
                status: resp.status().as_u16(),
                body: String::new(),
            }));
        }
        let bytes = resp.bytes().await.map_err(AcquisitionError::Http)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_new_style_id() {
        assert_eq!(normalize_arxiv_id("2106.01345"), "2106.01345");
    }

    #[test]
    fn strips_arxiv_colon_prefix() {
        assert_eq!(normalize_arxiv_id("arxiv:2106.01345v2"), "2106.01345v2");
    }

    #[test]
    fn extracts_id_from_abs_url() {
        assert_eq!(normalize_arxiv_id("https://arxiv.org/abs/2106.01345"), "2106.01345");
    }

    #[test]
    fn old_style_id_is_preserved() {
        assert_eq!(normalize_arxiv_id("hep-th/9901001"), "hep-th/9901001");
    }

    #[test]
    fn pdf_url_strips_version_suffix() {
        assert_eq!(construct_pdf_url("2106.01345v2"), "https://arxiv.org/pdf/2106.01345.pdf");
    }

    #[test]
    fn abs_url_preserves_version_suffix() {
        assert_eq!(construct_abs_url("2106.01345v2"), "https://arxiv.org/abs/2106.01345v2");
    }

    #[test]
    fn year_from_new_style_id() {
        assert_eq!(year_from_arxiv_id("2106.01345"), Some(2021));
    }

    #[test]
    fn year_from_old_style_id_before_2000() {
        assert_eq!(year_from_arxiv_id("hep-th/9901001"), Some(1999));
    }

    #[test]
    fn parses_minimal_atom_entry() {
        let xml = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2106.01345v1</id>
    <title>A Great Paper</title>
    <summary>An abstract.</summary>
    <published>2021-06-02T00:00:00Z</published>
    <author><name>Jane Doe</name></author>
    <category term="cs.LG"/>
  </entry>
</feed>"#;
        let entries = parse_feed(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "2106.01345v1");
        assert_eq!(entries[0].title, "A Great Paper");
        assert_eq!(entries[0].authors[0].name, "Jane Doe");
        assert_eq!(entries[0].primary_category.as_deref(), Some("cs.LG"));
    }
}
