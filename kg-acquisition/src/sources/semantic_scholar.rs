//! Semantic Scholar Academic Graph API client (C5, spec §4.5/§6).
//!
//! Every call flows through the fixed skeleton: cache → breaker → limiter →
//! retry → parse. HTTP 404 becomes `NotFound` (not a breaker failure); 429
//! becomes `RateLimited(retry_after)`.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::context::SourceContext;
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::models::{NormalizedAuthor, NormalizedPaper};
use crate::response_cache::Namespace;
use kg_core::CoreError;

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

const DEFAULT_PAPER_FIELDS: &str = "paperId,externalIds,title,abstract,year,venue,authors,\
citationCount,referenceCount,fieldsOfStudy,publicationTypes,isOpenAccess,openAccessPdf,\
publicationDate";

pub struct SemanticScholarClient {
    http: reqwest::Client,
    api_key: Option<String>,
    ctx: SourceContext,
}

#[derive(Debug, Deserialize)]
struct RawExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: Option<String>,
    #[serde(rename = "authorId")]
    author_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPaper {
    title: Option<String>,
    #[serde(rename = "externalIds")]
    external_ids: Option<RawExternalIds>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    authors: Option<Vec<RawAuthor>>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
    #[serde(rename = "referenceCount")]
    reference_count: Option<u64>,
    #[serde(rename = "fieldsOfStudy")]
    fields_of_study: Option<Vec<String>>,
    #[serde(rename = "publicationTypes")]
    publication_types: Option<Vec<String>>,
    #[serde(rename = "isOpenAccess")]
    is_open_access: Option<bool>,
    #[serde(rename = "openAccessPdf")]
    open_access_pdf: Option<RawOpenAccessPdf>,
    #[serde(rename = "publicationDate")]
    publication_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    data: Option<Vec<RawPaper>>,
}

impl RawPaper {
    /// Per §4.8's mapping table: doi <- externalIds.DOI, year <- year,
    /// authors <- authors[].{name, authorId}, abstract <- abstract,
    /// fields_of_study <- fieldsOfStudy, is_open_access <- isOpenAccess,
    /// pdf_url <- openAccessPdf.url.
    fn normalize(self) -> NormalizedPaper {
        let mut p = NormalizedPaper::new(self.title.unwrap_or_default(), kg_core::SourceType::SemanticScholar);
        if let Some(ids) = self.external_ids {
            p.doi = ids.doi;
            if let Some(arxiv) = ids.arxiv {
                p.external_ids.insert("arxiv".to_string(), arxiv);
            }
        }
        p.abstract_text = self.abstract_text;
        p.year = self.year;
        p.venue = self.venue;
        p.authors = self
            .authors
            .unwrap_or_default()
            .into_iter()
            .map(|a| NormalizedAuthor {
                name: a.name.unwrap_or_default(),
                external_id: a.author_id,
                affiliation: None,
                orcid: None,
            })
            .collect();
        p.citation_count = self.citation_count;
        p.reference_count = self.reference_count;
        p.fields_of_study = self.fields_of_study.unwrap_or_default().into_iter().collect::<BTreeSet<_>>();
        p.publication_types = self.publication_types.unwrap_or_default().into_iter().collect::<BTreeSet<_>>();
        p.is_open_access = self.is_open_access.unwrap_or(false);
        p.pdf_url = self.open_access_pdf.and_then(|o| o.url);
        p.publication_date = self.publication_date;
        p
    }
}

impl SemanticScholarClient {
    pub fn new(ctx: SourceContext, api_key: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build Semantic Scholar http client");
        Self { http, api_key, ctx }
    }

    async fn request(&self, path: &str, params: &[(&str, &str)]) -> AcquisitionResult<Value> {
        self.ctx.breaker.check()?;
        self.ctx.limiter.acquire().await;

        let result = self
            .ctx
            .retry
            .run(|| async {
                let mut req = self.http.get(format!("{BASE_URL}/{path}")).query(params);
                if let Some(key) = &self.api_key {
                    req = req.header("x-api-key", key);
                }
                let resp = req.send().await.map_err(AcquisitionError::Http)?;
                let status = resp.status();

                if status.as_u16() == 404 {
                    return Err(AcquisitionError::Core(CoreError::NotFound));
                }
                if status.as_u16() == 429 {
                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(1);
                    return Err(AcquisitionError::Core(CoreError::RateLimited {
                        retry_after: Duration::from_secs(retry_after),
                    }));
                }
                if status.is_server_error() {
                    return Err(AcquisitionError::Core(CoreError::Transient(format!(
                        "semantic scholar server error {status}"
                    ))));
                }
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(AcquisitionError::Core(CoreError::ApiError {
                        status: status.as_u16(),
                        body,
                    }));
                }

                resp.json::<Value>()
                    .await
                    .map_err(AcquisitionError::Http)
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

    /// `getPaper(id)` — `id` may be a bare S2 id, `DOI:...`, or `ARXIV:...`.
    pub async fn get_paper(&self, identifier: &str) -> AcquisitionResult<NormalizedPaper> {
        let cache_key = crate::response_cache::ResponseCache::make_key(
            "semantic_scholar",
            "get_paper",
            &[("identifier", identifier)],
        );
        if let Some(hit) = self.ctx.cache.get(&cache_key, Namespace::Paper) {
            let raw: RawPaper = serde_json::from_value(hit).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
            return Ok(raw.normalize());
        }

        let value = self
            .request(&format!("paper/{identifier}"), &[("fields", DEFAULT_PAPER_FIELDS)])
            .await?;
        self.ctx.cache.set(&cache_key, value.clone(), Namespace::Paper);
        let raw: RawPaper = serde_json::from_value(value).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
        Ok(raw.normalize())
    }

    pub async fn get_paper_by_doi(&self, doi: &str) -> AcquisitionResult<NormalizedPaper> {
        self.get_paper(&format!("DOI:{doi}")).await
    }

    pub async fn get_paper_by_arxiv(&self, arxiv_id: &str) -> AcquisitionResult<NormalizedPaper> {
        self.get_paper(&format!("ARXIV:{arxiv_id}")).await
    }

    /// `searchPapers`; `limit` clamped to the API's maximum of 100 (§4.5).
    pub async fn search_papers(&self, query: &str, limit: usize) -> AcquisitionResult<Vec<NormalizedPaper>> {
        let limit = limit.min(100);
        let limit_str = limit.to_string();
        let params = [("query", query), ("limit", limit_str.as_str()), ("fields", DEFAULT_PAPER_FIELDS)];

        let cache_key = crate::response_cache::ResponseCache::make_key("semantic_scholar", "search_papers", &params);
        let value = if let Some(hit) = self.ctx.cache.get(&cache_key, Namespace::Search) {
            hit
        } else {
            let v = self.request("paper/search", &params).await?;
            self.ctx.cache.set(&cache_key, v.clone(), Namespace::Search);
            v
        };

        let parsed: RawSearchResponse = serde_json::from_value(value).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
        Ok(parsed.data.unwrap_or_default().into_iter().map(RawPaper::normalize).collect())
    }

    pub async fn get_author(&self, author_id: &str) -> AcquisitionResult<Value> {
        self.request(&format!("author/{author_id}"), &[("fields", "authorId,name,affiliations,paperCount,citationCount,hIndex")]).await
    }

    /// `getAuthorPapers`; `limit` clamped to the API's maximum of 1000.
    pub async fn get_author_papers(&self, author_id: &str, limit: usize) -> AcquisitionResult<Vec<NormalizedPaper>> {
        let limit = limit.min(1000);
        let limit_str = limit.to_string();
        let value = self
            .request(&format!("author/{author_id}/papers"), &[("limit", limit_str.as_str()), ("fields", DEFAULT_PAPER_FIELDS)])
            .await?;
        let parsed: RawSearchResponse = serde_json::from_value(value).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
        Ok(parsed.data.unwrap_or_default().into_iter().map(RawPaper::normalize).collect())
    }

    pub async fn get_citations(&self, paper_id: &str) -> AcquisitionResult<Vec<NormalizedPaper>> {
        let value = self
            .request(&format!("paper/{paper_id}/citations"), &[("fields", DEFAULT_PAPER_FIELDS)])
            .await?;
        let parsed: RawSearchResponse = serde_json::from_value(value).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
        Ok(parsed.data.unwrap_or_default().into_iter().map(RawPaper::normalize).collect())
    }

    pub async fn get_references(&self, paper_id: &str) -> AcquisitionResult<Vec<NormalizedPaper>> {
        let value = self
            .request(&format!("paper/{paper_id}/references"), &[("fields", DEFAULT_PAPER_FIELDS)])
            .await?;
        let parsed: RawSearchResponse = serde_json::from_value(value).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
        Ok(parsed.data.unwrap_or_default().into_iter().map(RawPaper::normalize).collect())
    }

    /// `bulkGetPapers`, ≤500 ids per call, results cached individually under
    /// each paper's canonical id afterward (§4.5).
    pub async fn bulk_get_papers(&self, ids: &[String]) -> AcquisitionResult<Vec<NormalizedPaper>> {
        if ids.len() > 500 {
            return Err(AcquisitionError::Core(CoreError::ValidationError(
                "bulk_get_papers accepts at most 500 ids per call".to_string(),
            )));
        }

        self.ctx.breaker.check()?;
        self.ctx.limiter.acquire().await;

        let body = serde_json::json!({ "ids": ids });
        let result = self
            .ctx
            .retry
            .run(|| async {
                let resp = self
                    .http
                    .post(format!("{BASE_URL}/paper/batch"))
                    .query(&[("fields", DEFAULT_PAPER_FIELDS)])
                    .json(&body)
                    .send()
                    .await
                    .map_err(AcquisitionError::Http)?;
                let status = resp.status();
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
                resp.json::<Vec<Value>>().await.map_err(AcquisitionError::Http)
            })
            .await;

        match result {
            Ok(values) => {
                self.ctx.breaker.record_success();
                let mut papers = Vec::with_capacity(values.len());
                for value in values {
                    let raw: RawPaper = serde_json::from_value(value.clone()).map_err(|e| AcquisitionError::Parse(e.to_string()))?;
                    let normalized = raw.normalize();
                    if let Some(id) = value.get("paperId").and_then(Value::as_str) {
                        let cache_key = crate::response_cache::ResponseCache::make_key(
                            "semantic_scholar",
                            "get_paper",
                            &[("identifier", id)],
                        );
                        self.ctx.cache.set(&cache_key, value, Namespace::Paper);
                    }
                    papers.push(normalized);
                }
                Ok(papers)
            }
            Err(e) => {
                if e.counts_as_breaker_failure() {
                    self.ctx.breaker.record_failure();
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_core_fields() {
        let raw: RawPaper = serde_json::from_value(serde_json::json!({
            "title": "A Paper",
            "externalIds": {"DOI": "10.1/x", "ArXiv": "2101.00001"},
            "abstract": "text",
            "year": 2021,
            "fieldsOfStudy": ["Computer Science"],
            "isOpenAccess": true,
            "openAccessPdf": {"url": "https://example.com/x.pdf"}
        }))
        .unwrap();
        let normalized = raw.normalize();
        assert_eq!(normalized.doi.as_deref(), Some("10.1/x"));
        assert_eq!(normalized.source, "semantic_scholar");
        assert!(normalized.is_open_access);
        assert_eq!(normalized.pdf_url.as_deref(), Some("https://example.com/x.pdf"));
    }
}
