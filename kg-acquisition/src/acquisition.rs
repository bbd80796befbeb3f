//! Unified paper acquisition layer (C7, spec §4.7).
//!
//! Owns neither the HTTP sockets nor the caches, only the decision of which
//! source to consult and in what order (§3 "Lifecycle & ownership").

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::error::{AcquisitionError, AcquisitionResult};
use crate::models::{DownloadResult, NormalizedPaper};
use crate::pdf_cache::PdfCache;
use crate::sources::{ArxivClient, OpenAlexClient, SemanticScholarClient};
use kg_core::{CoreError, PaperIdentifier, SourceType};

static DOI_FROM_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"doi\.org/(10\.\S+)").unwrap());
static ARXIV_FROM_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"arxiv\.org/(?:abs|pdf)/([^\s/]+)").unwrap());
static OPENALEX_FROM_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"openalex\.org/(W\d+)").unwrap());

pub struct AcquisitionLayer {
    s2: SemanticScholarClient,
    arxiv: ArxivClient,
    openalex: OpenAlexClient,
    pdf_cache: PdfCache,
    http: reqwest::Client,
}

impl AcquisitionLayer {
    pub fn new(
        s2: SemanticScholarClient,
        arxiv: ArxivClient,
        openalex: OpenAlexClient,
        pdf_cache: PdfCache,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build direct-download http client");
        Self { s2, arxiv, openalex, pdf_cache, http }
    }

    /// Resolution order by identifier type (§4.7):
    /// DOI -> SemanticScholar, fallback OpenAlex.
    /// ArxivID -> arXiv, fallback SemanticScholar.
    /// S2/OpenAlex ID -> only the owning source.
    /// URL -> parse out an embedded identifier, recurse.
    /// Unknown -> try DOI, then arXiv, then S2 ID, then OpenAlex.
    pub async fn get_metadata(&self, identifier: &str) -> AcquisitionResult<Option<NormalizedPaper>> {
        let resolved = match PaperIdentifier::detect(identifier) {
            PaperIdentifier::Url(url) => extract_embedded_identifier(&url),
            other => other,
        };

        match resolved {
            PaperIdentifier::Doi(doi) => self.doi_then_openalex(&doi).await,
            PaperIdentifier::ArxivId(arxiv_id) => self.arxiv_then_s2(&arxiv_id).await,
            PaperIdentifier::S2Id(s2_id) => or_not_found(self.s2.get_paper(&s2_id).await),
            PaperIdentifier::OpenAlexId(oa_id) => or_not_found(self.openalex.get_work(&oa_id).await),
            PaperIdentifier::Url(_) => unreachable!("URLs are resolved to an embedded identifier above"),
            PaperIdentifier::Unknown(raw) => self.try_any_source(&raw).await,
        }
    }

    async fn doi_then_openalex(&self, doi: &str) -> AcquisitionResult<Option<NormalizedPaper>> {
        match self.s2.get_paper_by_doi(doi).await {
            Ok(p) => Ok(Some(p)),
            Err(AcquisitionError::Core(CoreError::NotFound)) => {
                or_not_found(self.openalex.get_work_by_doi(doi).await)
            }
            Err(e) => Err(e),
        }
    }

    async fn arxiv_then_s2(&self, arxiv_id: &str) -> AcquisitionResult<Option<NormalizedPaper>> {
        match self.arxiv.get_paper(arxiv_id).await {
            Ok(p) => Ok(Some(p)),
            Err(AcquisitionError::Core(CoreError::NotFound)) => {
                or_not_found(self.s2.get_paper_by_arxiv(arxiv_id).await)
            }
            Err(e) => Err(e),
        }
    }

    async fn try_any_source(&self, raw: &str) -> AcquisitionResult<Option<NormalizedPaper>> {
        for attempt in [
            self.s2.get_paper_by_doi(raw).await,
        ] {
            match attempt {
                Ok(p) => return Ok(Some(p)),
                Err(AcquisitionError::Core(CoreError::NotFound)) => {}
                Err(e) => return Err(e),
            }
        }
        match self.arxiv.get_paper(raw).await {
            Ok(p) => return Ok(Some(p)),
            Err(AcquisitionError::Core(CoreError::NotFound)) => {}
            Err(e) => return Err(e),
        }
        match self.s2.get_paper(raw).await {
            Ok(p) => return Ok(Some(p)),
            Err(AcquisitionError::Core(CoreError::NotFound)) => {}
            Err(e) => return Err(e),
        }
        or_not_found(self.openalex.get_work(raw).await)
    }

    /// PDF download priority (§4.7): direct arXiv download for
    /// arXiv-identified records, then `pdf_url` on the normalized metadata.
    /// Always flows through C6.
    pub async fn get_pdf(&self, identifier: &str) -> AcquisitionResult<DownloadResult> {
        if let PaperIdentifier::ArxivId(arxiv_id) = PaperIdentifier::detect(identifier) {
            return Ok(self.download_from_arxiv(&arxiv_id).await);
        }

        let metadata = match self.get_metadata(identifier).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                return Ok(DownloadResult::NotAvailable {
                    identifier: identifier.to_string(),
                    reason: "paper not found".to_string(),
                });
            }
            Err(e) => {
                return Ok(DownloadResult::Failed {
                    identifier: identifier.to_string(),
                    message: e.to_string(),
                });
            }
        };

        if let Some(arxiv_id) = metadata.external_ids.get("arxiv") {
            return Ok(self.download_from_arxiv(arxiv_id).await);
        }

        if let Some(pdf_url) = &metadata.pdf_url {
            let source = source_from_tag(&metadata.source);
            return Ok(self.download_from_url(pdf_url, identifier, source).await);
        }

        Ok(DownloadResult::NotAvailable {
            identifier: identifier.to_string(),
            reason: "no pdf url available".to_string(),
        })
    }

    async fn download_from_arxiv(&self, arxiv_id: &str) -> DownloadResult {
        let cache_id = format!("arxiv:{arxiv_id}");
        match self.arxiv.download_pdf(arxiv_id).await {
            Ok(bytes) => match self.pdf_cache.store(&cache_id, &bytes, SourceType::Arxiv).await {
                Ok((path, size, content_hash)) => DownloadResult::Completed {
                    identifier: cache_id,
                    path,
                    size,
                    content_hash,
                    source: SourceType::Arxiv,
                },
                Err(e) => DownloadResult::Failed { identifier: cache_id, message: e.to_string() },
            },
            Err(AcquisitionError::Core(CoreError::NotFound)) => DownloadResult::NotAvailable {
                identifier: cache_id,
                reason: "pdf not found on arXiv".to_string(),
            },
            Err(e) => DownloadResult::Failed { identifier: cache_id, message: e.to_string() },
        }
    }

    async fn download_from_url(&self, url: &str, identifier: &str, source: SourceType) -> DownloadResult {
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => return DownloadResult::Failed { identifier: identifier.to_string(), message: e.to_string() },
        };
        if !resp.status().is_success() {
            return DownloadResult::Failed {
                identifier: identifier.to_string(),
                message: format!("http error {}", resp.status()),
            };
        }
        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => return DownloadResult::Failed { identifier: identifier.to_string(), message: e.to_string() },
        };
        match self.pdf_cache.store(identifier, &bytes, source).await {
            Ok((path, size, content_hash)) => DownloadResult::Completed {
                identifier: identifier.to_string(),
                path,
                size,
                content_hash,
                source,
            },
            Err(e) => DownloadResult::Failed { identifier: identifier.to_string(), message: e.to_string() },
        }
    }

    /// Fans out to the requested source or all three, concatenates,
    /// deduplicates by DOI (records without DOIs are retained unchanged),
    /// and truncates to `limit` (§4.7).
    pub async fn search(&self, query: &str, source: Option<SourceType>, limit: usize) -> Vec<NormalizedPaper> {
        let mut results = Vec::new();

        if source.is_none() || source == Some(SourceType::SemanticScholar) {
            match self.s2.search_papers(query, limit).await {
                Ok(mut r) => results.append(&mut r),
                Err(e) => warn!(error = %e, "semantic scholar search failed"),
            }
        }
        if source.is_none() || source == Some(SourceType::OpenAlex) {
            match self.openalex.search_works(query, &[], limit).await {
                Ok(mut r) => results.append(&mut r),
                Err(e) => warn!(error = %e, "openalex search failed"),
            }
        }
        if source.is_none() || source == Some(SourceType::Arxiv) {
            match self.arxiv.search_papers(query, limit).await {
                Ok(mut r) => results.append(&mut r),
                Err(e) => warn!(error = %e, "arxiv search failed"),
            }
        }

        let mut seen_dois = HashSet::new();
        let mut unique = Vec::with_capacity(results.len());
        for paper in results {
            match &paper.doi {
                Some(doi) if !seen_dois.insert(doi.clone()) => continue,
                _ => unique.push(paper),
            }
        }
        unique.truncate(limit);
        unique
    }
}

fn or_not_found(result: AcquisitionResult<NormalizedPaper>) -> AcquisitionResult<Option<NormalizedPaper>> {
    match result {
        Ok(p) => Ok(Some(p)),
        Err(AcquisitionError::Core(CoreError::NotFound)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn source_from_tag(tag: &str) -> SourceType {
    match tag {
        "arxiv" => SourceType::Arxiv,
        "openalex" => SourceType::OpenAlex,
        _ => SourceType::SemanticScholar,
    }
}

fn extract_embedded_identifier(url: &str) -> PaperIdentifier {
    if let Some(m) = DOI_FROM_URL_RE.captures(url).and_then(|c| c.get(1)) {
        return PaperIdentifier::Doi(m.as_str().to_string());
    }
    if let Some(m) = ARXIV_FROM_URL_RE.captures(url).and_then(|c| c.get(1)) {
        let id = m.as_str().trim_end_matches(".pdf");
        return PaperIdentifier::ArxivId(id.to_string());
    }
    if let Some(m) = OPENALEX_FROM_URL_RE.captures(url).and_then(|c| c.get(1)) {
        return PaperIdentifier::OpenAlexId(m.as_str().to_string());
    }
    PaperIdentifier::Unknown(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_doi_from_doi_org_url() {
        assert_eq!(
            extract_embedded_identifier("https://doi.org/10.1038/s41586-021-03491-6"),
            PaperIdentifier::Doi("10.1038/s41586-021-03491-6".to_string())
        );
    }

    #[test]
    fn extracts_arxiv_id_from_pdf_url() {
        assert_eq!(
            extract_embedded_identifier("https://arxiv.org/pdf/2106.01345.pdf"),
            PaperIdentifier::ArxivId("2106.01345".to_string())
        );
    }

    #[test]
    fn extracts_openalex_id() {
        assert_eq!(
            extract_embedded_identifier("https://openalex.org/W2741809807"),
            PaperIdentifier::OpenAlexId("W2741809807".to_string())
        );
    }

    #[test]
    fn unrecognized_url_falls_back_to_unknown() {
        assert_eq!(
            extract_embedded_identifier("https://example.com/paper.pdf"),
            PaperIdentifier::Unknown("https://example.com/paper.pdf".to_string())
        );
    }
}
