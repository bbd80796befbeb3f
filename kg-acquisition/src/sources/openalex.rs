//! OpenAlex REST/JSON client (C5, spec §4.5/§6).

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::context::SourceContext;
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::models::{NormalizedAuthor, NormalizedPaper};
use crate::response_cache::Namespace;
use kg_core::CoreError;

const BASE_URL: &str = "https://api.openalex.org";

/// Reassemble the dense abstract text from OpenAlex's inverted index
/// `{word: [positions]}`. Positions without a word are skipped but do not
/// shift subsequent words out of order (§4.5).
pub fn reconstruct_abstract(inverted_index: &BTreeMap<String, Vec<u32>>) -> Option<String> {
    if inverted_index.is_empty() {
        return None;
    }
    let max_pos = inverted_index.values().flatten().copied().max()?;

    let mut words: Vec<Option<&str>> = vec![None; max_pos as usize + 1];
    for (word, positions) in inverted_index {
        for &pos in positions {
            words[pos as usize] = Some(word.as_str());
        }
    }

    let joined: Vec<&str> = words.into_iter().flatten().collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join(" "))
    }
}

/// Build a `filter=k1:v1,k2:v2` string from filter params (§4.5): bools
/// lower-case to `true`/`false`, lists join with `|`, scalars stringify.
pub fn build_filter_string(filters: &[(&str, FilterValue)]) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let parts: Vec<String> = filters
        .iter()
        .map(|(key, value)| format!("{key}:{}", value.render()))
        .collect();
    Some(parts.join(","))
}

pub enum FilterValue {
    Bool(bool),
    List(Vec<String>),
    Scalar(String),
}

impl FilterValue {
    fn render(&self) -> String {
        match self {
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::List(items) => items.join("|"),
            FilterValue::Scalar(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInstitution {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuthorRef {
    display_name: Option<String>,
    id: Option<String>,
    orcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuthorship {
    author: Option<RawAuthorRef>,
    institutions: Option<Vec<RawInstitution>>,
}

#[derive(Debug, Deserialize)]
struct RawOpenAccess {
    is_oa: Option<bool>,
    oa_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConcept {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWork {
    title: Option<String>,
    doi: Option<String>,
    publication_year: Option<i32>,
    publication_date: Option<String>,
    authorships: Option<Vec<RawAuthorship>>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<u32>>>,
    concepts: Option<Vec<RawConcept>>,
    open_access: Option<RawOpenAccess>,
    best_oa_location: Option<RawLocation>,
    cited_by_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    results: Option<Vec<RawWork>>,
}

impl RawWork {
    /// Per §4.8's mapping table: doi <- doi (URL prefix stripped), year <-
    /// publication_year, authors <- authorships[].author.{display_name, id,
    /// orcid} + institutions[], abstract <- reconstructed inverted index,
    /// fields_of_study <- concepts[].display_name, is_open_access <-
    /// open_access.is_oa, pdf_url <- open_access.oa_url else
    /// best_oa_location.pdf_url.
    fn normalize(self) -> NormalizedPaper {
        let mut p = NormalizedPaper::new(self.title.unwrap_or_default(), kg_core::SourceType::OpenAlex);
        p.doi = self.doi.map(|d| d.trim_start_matches("https://doi.org/").to_string());
        p.year = self.publication_year;
        p.publication_date = self.publication_date;
        p.authors = self
            .authorships
            .unwrap_or_default()
            .into_iter()
            .map(|a| {
                let affiliation = a
                    .institutions
                    .unwrap_or_default()
                    .into_iter()
                    .find_map(|i| i.display_name);
                let author = a.author.unwrap_or(RawAuthorRef { display_name: None, id: None, orcid: None });
                NormalizedAuthor {
                    name: author.display_name.unwrap_or_default(),
                    external_id: author.id,
                    affiliation,
                    orcid: author.orcid,
                }
            })
            .collect();
        p.abstract_text = self.abstract_inverted_index.as_ref().and_then(reconstruct_abstract);
        p.fields_of_study = self
            .concepts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.display_name)
            .collect::<BTreeSet<_>>();
        p.is_open_access = self.open_access.as_ref().and_then(|o| o.is_oa).unwrap_or(false);
        p.pdf_url = self
            .open_access
            .and_then(|o| o.oa_url)
            .or_else(|| self.best_oa_location.and_then(|l| l.pdf_url));
        p.citation_count = self.cited_by_count;
        p
    }
}

pub struct OpenAlexClient {
    http: reqwest::Client,
    mailto: Option<String>,
    ctx: SourceContext,
}

impl OpenAlexClient {
    pub fn new(ctx: SourceContext, mailto: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build OpenAlex http client");
        Self { http, mailto, ctx }
    }

    async fn request(&self, path: &str, params: &[(&str, &str)]) -> AcquisitionResult<Value> {
        self.ctx.breaker.check()?;
        self.ctx.limiter.acquire().await;

        let result = self
            .ctx
            .retry
            .run(|| async {
                let mut req = self.http.get(format!("{BASE_URL}{path}")).query(params);
                if let Some(mailto) = &self.mailto {
                    req = req.query(&[("mailto", mailto.as_str())]);
                }
                let resp = req.send().await.map_err(AcquisitionError::Http)?;
                let status = resp.status();
                if status.as_u16() == 404 {
                    return Err(AcquisitionError::Core(CoreError::NotFound));
                }
                if status.as_u16() == 429 {
                    return Err(AcquisitionError::Core(CoreError::RateLimited {
                        retry_after: Duration::from_secs(1),
                    }));
                }
                if status.is_server_error() {
                    return Err(AcquisitionError::Core(CoreError::Transient(format!("status {status}"))));
                }
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(AcquisitionError::Core(CoreError::ApiError { status: status.as_u16(), body }));
                }
                resp.json::<Value>().await.map_err(AcquisitionError::Http)
            })
            .await;

        match result {
            Ok(v) => {
                self.ctx.breaker.record_success();
                Ok(v)
            }
            Err(e) => {
                if e.counts_as_breaker_failure() {
                    self.ctx.breaker.record_failure();
                }
                Err(e)
            }
        }
    }

    pub async fn get_work(&self, identifier: &str) -> AcquisitionResult<NormalizedPaper> {
        let (path, cache_field) = if identifier.starts_with('W') || identifier.starts_with("https://openalex.org/W") {
            let id = identifier.trim_start_matches("https://openalex.org/").to_string();
            (format!("/works/{id}"), id)
        } else {
            let doi = identifier.trim_start_matches("https://doi.org/").to_string();
            (format!("/works/https://doi.org/{doi}"), doi)
        };

        let cache_key = crate::response_cache::ResponseCache::make_key("openalex", "get_work", &[("id", cache_field.as_str())]);
        if let Some(hit) = self.ctx.cache.get(&cache_key, Namespace::Paper) {
            let raw: RawWork = serde_json::from_value(hit).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
            return Ok(raw.normalize());
        }

        let value = self.request(&path, &[]).await?;
        self.ctx.cache.set(&cache_key, value.clone(), Namespace::Paper);
        let raw: RawWork = serde_json::from_value(value).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
        Ok(raw.normalize())
    }

    pub async fn get_work_by_doi(&self, doi: &str) -> AcquisitionResult<NormalizedPaper> {
        self.get_work(doi.trim_start_matches("https://doi.org/")).await
    }

    pub async fn search_works(&self, query: &str, filters: &[(&str, FilterValue)], per_page: usize) -> AcquisitionResult<Vec<NormalizedPaper>> {
        let per_page = per_page.min(200);
        let per_page_str = per_page.to_string();
        let filter_string = build_filter_string(filters);

        let mut params = vec![("search", query), ("per-page", per_page_str.as_str())];
        if let Some(f) = &filter_string {
            params.push(("filter", f.as_str()));
        }

        let cache_key = crate::response_cache::ResponseCache::make_key("openalex", "search_works", &params);
        let value = if let Some(hit) = self.ctx.cache.get(&cache_key, Namespace::Search) {
            hit
        } else {
            let v = self.request("/works", &params).await?;
            self.ctx.cache.set(&cache_key, v.clone(), Namespace::Search);
            v
        };

        let parsed: RawSearchResponse = serde_json::from_value(value).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
        Ok(parsed.results.unwrap_or_default().into_iter().map(RawWork::normalize).collect())
    }

    pub async fn get_author(&self, author_id: &str) -> AcquisitionResult<Value> {
        let id = author_id.trim_start_matches("https://openalex.org/");
        self.request(&format!("/authors/{id}"), &[]).await
    }

    pub async fn get_author_works(&self, author_id: &str, per_page: usize) -> AcquisitionResult<Vec<NormalizedPaper>> {
        let id = author_id.trim_start_matches("https://openalex.org/").to_string();
        self.search_works("", &[("authorships.author.id", FilterValue::Scalar(id))], per_page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstructs_abstract_in_order() {
        let mut index = BTreeMap::new();
        index.insert("Deep".to_string(), vec![0]);
        index.insert("learning".to_string(), vec![1]);
        index.insert("works".to_string(), vec![3]);
        assert_eq!(reconstruct_abstract(&index).unwrap(), "Deep learning works");
    }

    #[test]
    fn empty_index_yields_none() {
        assert!(reconstruct_abstract(&BTreeMap::new()).is_none());
    }

    #[test]
    fn filter_string_renders_bool_list_and_scalar() {
        let filters = [
            ("is_oa", FilterValue::Bool(true)),
            ("concepts.id", FilterValue::List(vec!["C1".to_string(), "C2".to_string()])),
            ("publication_year", FilterValue::Scalar("2023".to_string())),
        ];
        assert_eq!(
            build_filter_string(&filters).unwrap(),
            "is_oa:true,concepts.id:C1|C2,publication_year:2023"
        );
    }

    #[test]
    fn normalizes_doi_by_stripping_url_prefix() {
        let raw: RawWork = serde_json::from_value(serde_json::json!({
            "title": "A Work",
            "doi": "https://doi.org/10.1/x",
            "open_access": {"is_oa": true, "oa_url": "https://example.com/x.pdf"},
        }))
        .unwrap();
        let normalized = raw.normalize();
        assert_eq!(normalized.doi.as_deref(), Some("10.1/x"));
        assert!(normalized.is_open_access);
    }
}
