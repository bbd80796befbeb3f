//! Transactional CRUD against the graph store (C19, §4.19). `sqlx`
//! transactions against the SQLite+`sqlite-vec` store opened by
//! [`crate::db::GraphDbPool`].
//!
//! **Open Question resolution (§9, recorded in `DESIGN.md`):** the graph
//! store is SQLite-backed rather than a Neo4j driver. Neo4j is named in
//! §1 as an external collaborator consumed "via a small repository
//! interface" — this crate supplies that interface (the [`Repository`]
//! trait) and the only concrete implementation in the workspace.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kg_core::config::RetrySettings;
use kg_core::{ConceptStatus, CoreError, MatchConfidence, MatchMethod, ReviewStatus};
use sqlx::{Row, SqlitePool};

use crate::db::GraphDbPool;
use crate::error::{GraphError, GraphResult};
use crate::models::{Author, MatchCandidate, Paper, ProblemConcept, ProblemMention, ProblemRelation};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_paper(&self, paper: &Paper) -> GraphResult<()>;
    async fn get_paper(&self, doi: &str) -> GraphResult<Paper>;

    async fn create_author(&self, author: &Author) -> GraphResult<()>;
    async fn get_author(&self, id: &str) -> GraphResult<Author>;

    /// Always returns `Ok(None)` (§9 Open Question): every author is created
    /// fresh per paper rather than deduplicated by external id. Flagged here
    /// rather than silently "fixed", since fixing it would change the
    /// persisted graph shape without a migration story.
    async fn find_author_by_external_id(&self, source: &str, external_id: &str) -> GraphResult<Option<Author>>;

    async fn create_problem_mention(&self, mention: &ProblemMention) -> GraphResult<()>;
    async fn get_problem_mention(&self, id: &str) -> GraphResult<ProblemMention>;
    async fn update_problem_mention(&self, mention: &ProblemMention) -> GraphResult<()>;

    async fn create_problem_concept(&self, concept: &ProblemConcept) -> GraphResult<()>;
    async fn get_problem_concept(&self, id: &str) -> GraphResult<ProblemConcept>;
    async fn update_problem_concept(&self, concept: &ProblemConcept) -> GraphResult<()>;
    /// `soft = true` sets `status = deprecated` instead of removing the row.
    async fn delete_problem_concept(&self, id: &str, soft: bool) -> GraphResult<()>;

    async fn create_relation(&self, relation: &ProblemRelation) -> GraphResult<()>;

    async fn record_citation(&self, citing_doi: &str, cited_doi: &str) -> GraphResult<()>;
    /// One-hop check: does `paper_doi` cite a paper that has a mention
    /// matched to `concept_id`? Used by the matcher's citation boost
    /// (§4.16 step 4); never fails, only ever answers `false` when no
    /// citation data has been recorded.
    async fn citation_path_exists(&self, paper_doi: &str, concept_id: &str) -> GraphResult<bool>;

    /// Vector-nearest-neighbor query over `ProblemConcept.embedding`
    /// (§4.16 step 2). Returns up to `top_k` candidates with
    /// `domain_match`/`citation_boost` left at their defaults for the
    /// matcher to fill in.
    async fn find_similar_concepts(&self, embedding: &[f32], top_k: usize) -> GraphResult<Vec<MatchCandidate>>;

    /// C17 op 1: `MERGE` the `INSTANCE_OF` edge and update the mention's
    /// match fields and the concept's `mention_count`/`updated_at`, all in
    /// one transaction (§4.17, §5).
    async fn link_instance_of(
        &self,
        mention: &ProblemMention,
        candidate: &MatchCandidate,
        trace_id: &str,
    ) -> GraphResult<ProblemConcept>;

    /// C17 op 2: create the concept node and its `INSTANCE_OF` edge
    /// (`confidence = 1.0`) in one transaction (§4.17).
    async fn create_concept_and_link(
        &self,
        concept: &ProblemConcept,
        mention: &ProblemMention,
        trace_id: &str,
    ) -> GraphResult<()>;

    /// Structured filter search backing C20's `structured_search` (§4.20).
    async fn search_concepts_structured(&self, filter: &StructuredFilter, top_k: usize) -> GraphResult<Vec<ProblemConcept>>;
}

/// Filters for C20's `structured_search`. `year_from`/`year_to` filter on
/// the concept's own `first_mentioned_year`/`last_mentioned_year` rather
/// than joining through a source paper — those two fields already carry
/// the information a paper join would recover, and a `ProblemConcept`
/// aggregates mentions from more than one paper, so there is no single
/// paper to join against.
#[derive(Debug, Clone, Default)]
pub struct StructuredFilter {
    pub domain: Option<String>,
    pub status: Option<ConceptStatus>,
    pub has_datasets: Option<bool>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
}

/// SQLite+`sqlite-vec`-backed [`Repository`] implementation.
pub struct SqliteRepository {
    db: GraphDbPool,
    retry: RetrySettings,
}

impl SqliteRepository {
    pub fn new(db: GraphDbPool, retry: RetrySettings) -> Self {
        Self { db, retry }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// Exponential backoff around one write attempt (§4.19: "every write
    /// is retried on transient transport errors with exponential backoff
    /// up to `max_retries`"). Grounded on `kg-acquisition`'s
    /// `RetryPolicy`, generalized from `AcquisitionError` to `GraphError`.
    async fn with_retry<T, F, Fut>(&self, mut f: F) -> GraphResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = GraphResult<T>>,
    {
        let mut attempt = 0u32;
        let base = Duration::from_millis(self.retry.base_delay_ms);
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let exp = base.as_secs_f64() * 2f64.powi(attempt as i32);
                    tokio::time::sleep(Duration::from_secs_f64(exp)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> GraphResult<String> {
    serde_json::to_string(value).map_err(|e| GraphError::Core(CoreError::ValidationError(e.to_string())))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> GraphResult<T> {
    serde_json::from_str(raw).map_err(|e| GraphError::Core(CoreError::ValidationError(e.to_string())))
}

fn embedding_to_vec0(embedding: &[f32]) -> GraphResult<String> {
    to_json(&embedding)
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_paper(&self, paper: &Paper) -> GraphResult<()> {
        self.with_retry(|| async {
            let authors = to_json(&paper.authors)?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO papers (doi, title, authors, venue, year, abstract_text, arxiv_id, openalex_id, semantic_scholar_id, pdf_url, ingested_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&paper.doi)
            .bind(&paper.title)
            .bind(&authors)
            .bind(&paper.venue)
            .bind(paper.year)
            .bind(&paper.abstract_text)
            .bind(&paper.arxiv_id)
            .bind(&paper.openalex_id)
            .bind(&paper.semantic_scholar_id)
            .bind(&paper.pdf_url)
            .bind(&paper.ingested_at)
            .execute(self.pool())
            .await?;

            if result.rows_affected() == 0 {
                return Err(GraphError::Core(CoreError::Duplicate));
            }
            Ok(())
        })
        .await
    }

    async fn get_paper(&self, doi: &str) -> GraphResult<Paper> {
        let row = sqlx::query(
            "SELECT doi, title, authors, venue, year, abstract_text, arxiv_id, openalex_id, semantic_scholar_id, pdf_url, ingested_at
             FROM papers WHERE doi = ?",
        )
        .bind(doi)
        .fetch_optional(self.pool())
        .await?
        .ok_or(GraphError::Core(CoreError::NotFound))?;

        Ok(Paper {
            doi: row.get("doi"),
            title: row.get("title"),
            authors: from_json(row.get::<String, _>("authors").as_str())?,
            venue: row.get("venue"),
            year: row.get("year"),
            abstract_text: row.get("abstract_text"),
            arxiv_id: row.get("arxiv_id"),
            openalex_id: row.get("openalex_id"),
            semantic_scholar_id: row.get("semantic_scholar_id"),
            pdf_url: row.get("pdf_url"),
            ingested_at: row.get("ingested_at"),
        })
    }

    async fn create_author(&self, author: &Author) -> GraphResult<()> {
        self.with_retry(|| async {
            let affiliations = to_json(&author.affiliations)?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO authors (id, name, affiliations, orcid, semantic_scholar_id)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&author.id)
            .bind(&author.name)
            .bind(&affiliations)
            .bind(&author.orcid)
            .bind(&author.semantic_scholar_id)
            .execute(self.pool())
            .await?;

            if result.rows_affected() == 0 {
                return Err(GraphError::Core(CoreError::Duplicate));
            }
            Ok(())
        })
        .await
    }

    async fn get_author(&self, id: &str) -> GraphResult<Author> {
        let row = sqlx::query("SELECT id, name, affiliations, orcid, semantic_scholar_id FROM authors WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(GraphError::Core(CoreError::NotFound))?;

        Ok(Author {
            id: row.get("id"),
            name: row.get("name"),
            affiliations: from_json(row.get::<String, _>("affiliations").as_str())?,
            orcid: row.get("orcid"),
            semantic_scholar_id: row.get("semantic_scholar_id"),
        })
    }

    async fn find_author_by_external_id(&self, _source: &str, _external_id: &str) -> GraphResult<Option<Author>> {
        Ok(None)
    }

    async fn create_problem_mention(&self, mention: &ProblemMention) -> GraphResult<()> {
        self.with_retry(|| async {
            let assumptions = to_json(&mention.assumptions)?;
            let constraints = to_json(&mention.constraints)?;
            let datasets = to_json(&mention.datasets)?;
            let metrics = to_json(&mention.metrics)?;
            let baselines = to_json(&mention.baselines)?;
            let section = to_json(&mention.section)?;
            let review_status = to_json(&mention.review_status)?;
            let match_confidence = mention.match_confidence.map(|c| to_json(&c)).transpose()?;
            let match_method = mention.match_method.map(|m| to_json(&m)).transpose()?;

            let result = sqlx::query(
                "INSERT OR IGNORE INTO problem_mentions (
                    id, statement, paper_doi, section, domain, assumptions, constraints, datasets, metrics, baselines,
                    quoted_text, concept_id, match_confidence, match_score, match_method, review_status, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&mention.id)
            .bind(&mention.statement)
            .bind(&mention.paper_doi)
            .bind(&section)
            .bind(&mention.domain)
            .bind(&assumptions)
            .bind(&constraints)
            .bind(&datasets)
            .bind(&metrics)
            .bind(&baselines)
            .bind(&mention.quoted_text)
            .bind(&mention.concept_id)
            .bind(&match_confidence)
            .bind(mention.match_score)
            .bind(&match_method)
            .bind(&review_status)
            .bind(&mention.created_at)
            .bind(&mention.updated_at)
            .execute(self.pool())
            .await?;

            if result.rows_affected() == 0 {
                return Err(GraphError::Core(CoreError::Duplicate));
            }

            if let Some(embedding) = &mention.embedding {
                let rowid: i64 = sqlx::query_scalar("SELECT rowid FROM problem_mentions WHERE id = ?")
                    .bind(&mention.id)
                    .fetch_one(self.pool())
                    .await?;
                let payload = embedding_to_vec0(embedding)?;
                sqlx::query("INSERT OR REPLACE INTO mention_vec(rowid, embedding) VALUES (?, ?)")
                    .bind(rowid)
                    .bind(payload)
                    .execute(self.pool())
                    .await?;
            }

            Ok(())
        })
        .await
    }

    async fn get_problem_mention(&self, id: &str) -> GraphResult<ProblemMention> {
        let row = sqlx::query(
            "SELECT id, statement, paper_doi, section, domain, assumptions, constraints, datasets, metrics, baselines,
                    quoted_text, concept_id, match_confidence, match_score, match_method, review_status, created_at, updated_at
             FROM problem_mentions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(GraphError::Core(CoreError::NotFound))?;

        row_to_mention(&row)
    }

    async fn update_problem_mention(&self, mention: &ProblemMention) -> GraphResult<()> {
        self.with_retry(|| async {
            let assumptions = to_json(&mention.assumptions)?;
            let constraints = to_json(&mention.constraints)?;
            let datasets = to_json(&mention.datasets)?;
            let metrics = to_json(&mention.metrics)?;
            let baselines = to_json(&mention.baselines)?;
            let review_status = to_json(&mention.review_status)?;
            let match_confidence = mention.match_confidence.map(|c| to_json(&c)).transpose()?;
            let match_method = mention.match_method.map(|m| to_json(&m)).transpose()?;
            let updated_at = Utc::now().to_rfc3339();

            let result = sqlx::query(
                "UPDATE problem_mentions SET
                    assumptions = ?, constraints = ?, datasets = ?, metrics = ?, baselines = ?,
                    concept_id = ?, match_confidence = ?, match_score = ?, match_method = ?,
                    review_status = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&assumptions)
            .bind(&constraints)
            .bind(&datasets)
            .bind(&metrics)
            .bind(&baselines)
            .bind(&mention.concept_id)
            .bind(&match_confidence)
            .bind(mention.match_score)
            .bind(&match_method)
            .bind(&review_status)
            .bind(&updated_at)
            .bind(&mention.id)
            .execute(self.pool())
            .await?;

            if result.rows_affected() == 0 {
                return Err(GraphError::Core(CoreError::NotFound));
            }
            Ok(())
        })
        .await
    }

    async fn create_problem_concept(&self, concept: &ProblemConcept) -> GraphResult<()> {
        self.with_retry(|| async {
            insert_concept(self.pool(), concept).await?;
            Ok(())
        })
        .await
    }

    async fn get_problem_concept(&self, id: &str) -> GraphResult<ProblemConcept> {
        let row = sqlx::query(
            "SELECT id, canonical_statement, domain, status, assumptions, constraints, datasets, metrics,
                    verified_baselines, claimed_baselines, synthesis_method, mention_count, paper_count,
                    first_mentioned_year, last_mentioned_year, version, created_at, updated_at
             FROM problem_concepts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(GraphError::Core(CoreError::NotFound))?;

        row_to_concept(&row)
    }

    async fn update_problem_concept(&self, concept: &ProblemConcept) -> GraphResult<()> {
        self.with_retry(|| async {
            let assumptions = to_json(&concept.assumptions)?;
            let constraints = to_json(&concept.constraints)?;
            let datasets = to_json(&concept.datasets)?;
            let metrics = to_json(&concept.metrics)?;
            let verified_baselines = to_json(&concept.verified_baselines)?;
            let claimed_baselines = to_json(&concept.claimed_baselines)?;
            let status = to_json(&concept.status)?;
            let updated_at = Utc::now().to_rfc3339();

            let result = sqlx::query(
                "UPDATE problem_concepts SET
                    canonical_statement = ?, domain = ?, status = ?, assumptions = ?, constraints = ?, datasets = ?,
                    metrics = ?, verified_baselines = ?, claimed_baselines = ?, mention_count = ?, paper_count = ?,
                    first_mentioned_year = ?, last_mentioned_year = ?, version = version + 1, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&concept.canonical_statement)
            .bind(&concept.domain)
            .bind(&status)
            .bind(&assumptions)
            .bind(&constraints)
            .bind(&datasets)
            .bind(&metrics)
            .bind(&verified_baselines)
            .bind(&claimed_baselines)
            .bind(concept.mention_count)
            .bind(concept.paper_count)
            .bind(concept.first_mentioned_year)
            .bind(concept.last_mentioned_year)
            .bind(&updated_at)
            .bind(&concept.id)
            .execute(self.pool())
            .await?;

            if result.rows_affected() == 0 {
                return Err(GraphError::Core(CoreError::NotFound));
            }
            Ok(())
        })
        .await
    }

    async fn delete_problem_concept(&self, id: &str, soft: bool) -> GraphResult<()> {
        self.with_retry(|| async {
            let result = if soft {
                let status = to_json(&ConceptStatus::Deprecated)?;
                let updated_at = Utc::now().to_rfc3339();
                sqlx::query("UPDATE problem_concepts SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(&status)
                    .bind(&updated_at)
                    .bind(id)
                    .execute(self.pool())
                    .await?
            } else {
                sqlx::query("DELETE FROM problem_concepts WHERE id = ?")
                    .bind(id)
                    .execute(self.pool())
                    .await?
            };

            if result.rows_affected() == 0 {
                return Err(GraphError::Core(CoreError::NotFound));
            }
            Ok(())
        })
        .await
    }

    async fn create_relation(&self, relation: &ProblemRelation) -> GraphResult<()> {
        self.with_retry(|| async {
            let relation_type = to_json(&relation.relation_type)?;
            let extraction_method = to_json(&relation.extraction_method)?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO problem_relations (source_problem_ref, target_problem_ref, relation_type, confidence, evidence, extraction_method, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&relation.source_problem_ref)
            .bind(&relation.target_problem_ref)
            .bind(&relation_type)
            .bind(relation.confidence)
            .bind(&relation.evidence)
            .bind(&extraction_method)
            .bind(&relation.created_at)
            .execute(self.pool())
            .await?;

            if result.rows_affected() == 0 {
                return Err(GraphError::Core(CoreError::Duplicate));
            }
            Ok(())
        })
        .await
    }

    async fn record_citation(&self, citing_doi: &str, cited_doi: &str) -> GraphResult<()> {
        sqlx::query("INSERT OR IGNORE INTO paper_citations (citing_doi, cited_doi) VALUES (?, ?)")
            .bind(citing_doi)
            .bind(cited_doi)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn citation_path_exists(&self, paper_doi: &str, concept_id: &str) -> GraphResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM paper_citations pc
             JOIN problem_mentions pm ON pm.paper_doi = pc.cited_doi
             WHERE pc.citing_doi = ? AND pm.concept_id = ?
             LIMIT 1",
        )
        .bind(paper_doi)
        .bind(concept_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.is_some())
    }

    async fn find_similar_concepts(&self, embedding: &[f32], top_k: usize) -> GraphResult<Vec<MatchCandidate>> {
        let payload = embedding_to_vec0(embedding)?;
        let rows = sqlx::query(
            "WITH knn AS (SELECT rowid, distance FROM concept_vec WHERE embedding MATCH ? AND k = ?)
             SELECT c.id, c.canonical_statement, c.domain, c.mention_count, knn.distance
             FROM knn JOIN problem_concepts c ON c.rowid = knn.rowid
             ORDER BY knn.distance ASC",
        )
        .bind(&payload)
        .bind(top_k as i64)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let distance: f64 = row.get("distance");
                MatchCandidate {
                    concept_id: row.get("id"),
                    concept_statement: row.get("canonical_statement"),
                    domain: row.get("domain"),
                    mention_count: row.get("mention_count"),
                    similarity_score: l2_distance_to_cosine_similarity(distance),
                    domain_match: false,
                    citation_boost: 0.0,
                }
            })
            .collect())
    }

    async fn link_instance_of(
        &self,
        mention: &ProblemMention,
        candidate: &MatchCandidate,
        trace_id: &str,
    ) -> GraphResult<ProblemConcept> {
        let final_score = candidate.final_score();
        let confidence = MatchConfidence::High;
        let match_method = MatchMethod::Auto;
        let review_status = ReviewStatus::Approved;
        let matched_at = Utc::now().to_rfc3339();

        let confidence_json = to_json(&confidence)?;
        let match_method_json = to_json(&match_method)?;
        let review_status_json = to_json(&review_status)?;

        let mut tx = self.pool().begin().await?;

        let mention_exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM problem_mentions WHERE id = ?").bind(&mention.id).fetch_optional(&mut *tx).await?;
        let concept_exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM problem_concepts WHERE id = ?").bind(&candidate.concept_id).fetch_optional(&mut *tx).await?;
        if mention_exists.is_none() || concept_exists.is_none() {
            tx.rollback().await?;
            return Err(GraphError::auto_linker(trace_id, "mention or concept not found"));
        }

        sqlx::query(
            "INSERT INTO instance_of_edges (mention_id, concept_id, confidence, match_method, matched_at, matched_by, trace_id)
             VALUES (?, ?, ?, ?, ?, 'auto_linker', ?)
             ON CONFLICT(mention_id) DO UPDATE SET
                concept_id = excluded.concept_id, confidence = excluded.confidence, match_method = excluded.match_method,
                matched_at = excluded.matched_at, matched_by = excluded.matched_by, trace_id = excluded.trace_id",
        )
        .bind(&mention.id)
        .bind(&candidate.concept_id)
        .bind(final_score)
        .bind(&match_method_json)
        .bind(&matched_at)
        .bind(trace_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE problem_mentions SET concept_id = ?, match_confidence = ?, match_score = ?, match_method = ?, review_status = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&candidate.concept_id)
        .bind(&confidence_json)
        .bind(final_score)
        .bind(&match_method_json)
        .bind(&review_status_json)
        .bind(&matched_at)
        .bind(&mention.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE problem_concepts SET mention_count = mention_count + 1, updated_at = ? WHERE id = ?")
            .bind(&matched_at)
            .bind(&candidate.concept_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "SELECT id, canonical_statement, domain, status, assumptions, constraints, datasets, metrics,
                    verified_baselines, claimed_baselines, synthesis_method, mention_count, paper_count,
                    first_mentioned_year, last_mentioned_year, version, created_at, updated_at
             FROM problem_concepts WHERE id = ?",
        )
        .bind(&candidate.concept_id)
        .fetch_one(&mut *tx)
        .await?;
        let concept = row_to_concept(&row)?;

        tx.commit().await?;
        Ok(concept)
    }

    async fn create_concept_and_link(
        &self,
        concept: &ProblemConcept,
        mention: &ProblemMention,
        trace_id: &str,
    ) -> GraphResult<()> {
        let matched_at = Utc::now().to_rfc3339();
        let confidence_json = to_json(&MatchConfidence::High)?;
        let match_method_json = to_json(&MatchMethod::Auto)?;
        let review_status_json = to_json(&ReviewStatus::Approved)?;

        let mut tx = self.pool().begin().await?;
        insert_concept_tx(&mut tx, concept).await?;

        sqlx::query(
            "INSERT INTO instance_of_edges (mention_id, concept_id, confidence, match_method, matched_at, matched_by, trace_id)
             VALUES (?, ?, 1.0, ?, ?, 'auto_linker', ?)",
        )
        .bind(&mention.id)
        .bind(&concept.id)
        .bind(&match_method_json)
        .bind(&matched_at)
        .bind(trace_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE problem_mentions SET concept_id = ?, match_confidence = ?, match_score = 1.0, match_method = ?, review_status = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&concept.id)
        .bind(&confidence_json)
        .bind(&match_method_json)
        .bind(&review_status_json)
        .bind(&matched_at)
        .bind(&mention.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search_concepts_structured(&self, filter: &StructuredFilter, top_k: usize) -> GraphResult<Vec<ProblemConcept>> {
        let mut sql = "SELECT id, canonical_statement, domain, status, assumptions, constraints, datasets, metrics,
                    verified_baselines, claimed_baselines, synthesis_method, mention_count, paper_count,
                    first_mentioned_year, last_mentioned_year, version, created_at, updated_at
             FROM problem_concepts WHERE 1 = 1"
            .to_string();
        let mut conditions = Vec::new();
        if filter.domain.is_some() {
            conditions.push(" AND domain = ?".to_string());
        }
        if filter.status.is_some() {
            conditions.push(" AND status = ?".to_string());
        }
        if let Some(has_datasets) = filter.has_datasets {
            if has_datasets {
                conditions.push(" AND json_array_length(datasets) > 0".to_string());
            } else {
                conditions.push(" AND json_array_length(datasets) = 0".to_string());
            }
        }
        if filter.year_from.is_some() {
            conditions.push(" AND (last_mentioned_year IS NULL OR last_mentioned_year >= ?)".to_string());
        }
        if filter.year_to.is_some() {
            conditions.push(" AND (first_mentioned_year IS NULL OR first_mentioned_year <= ?)".to_string());
        }
        sql.push_str(&conditions.concat());
        sql.push_str(" ORDER BY updated_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(domain) = &filter.domain {
            query = query.bind(domain);
        }
        if let Some(status) = filter.status {
            query = query.bind(to_json(&status)?);
        }
        if let Some(year_from) = filter.year_from {
            query = query.bind(year_from);
        }
        if let Some(year_to) = filter.year_to {
            query = query.bind(year_to);
        }
        query = query.bind(top_k as i64);

        let rows = query.fetch_all(self.pool()).await?;
        rows.iter().map(row_to_concept).collect()
    }
}

async fn insert_concept(pool: &SqlitePool, concept: &ProblemConcept) -> GraphResult<()> {
    let assumptions = to_json(&concept.assumptions)?;
    let constraints = to_json(&concept.constraints)?;
    let datasets = to_json(&concept.datasets)?;
    let metrics = to_json(&concept.metrics)?;
    let verified_baselines = to_json(&concept.verified_baselines)?;
    let claimed_baselines = to_json(&concept.claimed_baselines)?;
    let status = to_json(&concept.status)?;
    let synthesis_method = to_json(&concept.synthesis_method)?;

    let result = sqlx::query(
        "INSERT OR IGNORE INTO problem_concepts (
            id, canonical_statement, domain, status, assumptions, constraints, datasets, metrics,
            verified_baselines, claimed_baselines, synthesis_method, mention_count, paper_count,
            first_mentioned_year, last_mentioned_year, version, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&concept.id)
    .bind(&concept.canonical_statement)
    .bind(&concept.domain)
    .bind(&status)
    .bind(&assumptions)
    .bind(&constraints)
    .bind(&datasets)
    .bind(&metrics)
    .bind(&verified_baselines)
    .bind(&claimed_baselines)
    .bind(&synthesis_method)
    .bind(concept.mention_count)
    .bind(concept.paper_count)
    .bind(concept.first_mentioned_year)
    .bind(concept.last_mentioned_year)
    .bind(concept.version)
    .bind(&concept.created_at)
    .bind(&concept.updated_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(GraphError::Core(CoreError::Duplicate));
    }

    if let Some(embedding) = &concept.embedding {
        let rowid: i64 =
            sqlx::query_scalar("SELECT rowid FROM problem_concepts WHERE id = ?").bind(&concept.id).fetch_one(pool).await?;
        let payload = embedding_to_vec0(embedding)?;
        sqlx::query("INSERT OR REPLACE INTO concept_vec(rowid, embedding) VALUES (?, ?)")
            .bind(rowid)
            .bind(payload)
            .execute(pool)
            .await?;
    }

    Ok(())
}

async fn insert_concept_tx(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, concept: &ProblemConcept) -> GraphResult<()> {
    let assumptions = to_json(&concept.assumptions)?;
    let constraints = to_json(&concept.constraints)?;
    let datasets = to_json(&concept.datasets)?;
    let metrics = to_json(&concept.metrics)?;
    let verified_baselines = to_json(&concept.verified_baselines)?;
    let claimed_baselines = to_json(&concept.claimed_baselines)?;
    let status = to_json(&concept.status)?;
    let synthesis_method = to_json(&concept.synthesis_method)?;

    sqlx::query(
        "INSERT INTO problem_concepts (
            id, canonical_statement, domain, status, assumptions, constraints, datasets, metrics,
            verified_baselines, claimed_baselines, synthesis_method, mention_count, paper_count,
            first_mentioned_year, last_mentioned_year, version, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&concept.id)
    .bind(&concept.canonical_statement)
    .bind(&concept.domain)
    .bind(&status)
    .bind(&assumptions)
    .bind(&constraints)
    .bind(&datasets)
    .bind(&metrics)
    .bind(&verified_baselines)
    .bind(&claimed_baselines)
    .bind(&synthesis_method)
    .bind(concept.mention_count)
    .bind(concept.paper_count)
    .bind(concept.first_mentioned_year)
    .bind(concept.last_mentioned_year)
    .bind(concept.version)
    .bind(&concept.created_at)
    .bind(&concept.updated_at)
    .execute(&mut **tx)
    .await?;

    if let Some(embedding) = &concept.embedding {
        let rowid: i64 =
            sqlx::query_scalar("SELECT rowid FROM problem_concepts WHERE id = ?").bind(&concept.id).fetch_one(&mut **tx).await?;
        let payload = embedding_to_vec0(embedding)?;
        sqlx::query("INSERT OR REPLACE INTO concept_vec(rowid, embedding) VALUES (?, ?)")
            .bind(rowid)
            .bind(payload)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

fn row_to_mention(row: &sqlx::sqlite::SqliteRow) -> GraphResult<ProblemMention> {
    let match_confidence: Option<String> = row.get("match_confidence");
    let match_method: Option<String> = row.get("match_method");
    Ok(ProblemMention {
        id: row.get("id"),
        statement: row.get("statement"),
        paper_doi: row.get("paper_doi"),
        section: from_json(row.get::<String, _>("section").as_str())?,
        domain: row.get("domain"),
        assumptions: from_json(row.get::<String, _>("assumptions").as_str())?,
        constraints: from_json(row.get::<String, _>("constraints").as_str())?,
        datasets: from_json(row.get::<String, _>("datasets").as_str())?,
        metrics: from_json(row.get::<String, _>("metrics").as_str())?,
        baselines: from_json(row.get::<String, _>("baselines").as_str())?,
        quoted_text: row.get("quoted_text"),
        embedding: None,
        concept_id: row.get("concept_id"),
        match_confidence: match_confidence.map(|raw| from_json(&raw)).transpose()?,
        match_score: row.get("match_score"),
        match_method: match_method.map(|raw| from_json(&raw)).transpose()?,
        review_status: from_json(row.get::<String, _>("review_status").as_str())?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_concept(row: &sqlx::sqlite::SqliteRow) -> GraphResult<ProblemConcept> {
    Ok(ProblemConcept {
        id: row.get("id"),
        canonical_statement: row.get("canonical_statement"),
        domain: row.get("domain"),
        status: from_json(row.get::<String, _>("status").as_str())?,
        assumptions: from_json(row.get::<String, _>("assumptions").as_str())?,
        constraints: from_json(row.get::<String, _>("constraints").as_str())?,
        datasets: from_json(row.get::<String, _>("datasets").as_str())?,
        metrics: from_json(row.get::<String, _>("metrics").as_str())?,
        verified_baselines: from_json(row.get::<String, _>("verified_baselines").as_str())?,
        claimed_baselines: from_json(row.get::<String, _>("claimed_baselines").as_str())?,
        synthesis_method: from_json(row.get::<String, _>("synthesis_method").as_str())?,
        mention_count: row.get("mention_count"),
        paper_count: row.get("paper_count"),
        first_mentioned_year: row.get("first_mentioned_year"),
        last_mentioned_year: row.get("last_mentioned_year"),
        embedding: None,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// `vec0`'s default metric is squared L2 distance. For unit-normalized
/// embeddings, `||a - b||^2 = 2 - 2cos(a, b)`, so cosine similarity
/// recovers as `1 - distance / 2`. Callers that hand the embedding client
/// non-normalized vectors will see a looser approximation, which only
/// affects ranking order among near ties, not correctness of the
/// confidence bands at the documented boundaries.
fn l2_distance_to_cosine_similarity(distance: f64) -> f64 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_core::SectionType;

    async fn test_repo() -> SqliteRepository {
        let db = GraphDbPool::open_in_memory(4).await.unwrap();
        SqliteRepository::new(db, RetrySettings { max_retries: 0, base_delay_ms: 1 })
    }

    fn sample_mention(id: &str) -> ProblemMention {
        let now = Utc::now().to_rfc3339();
        ProblemMention {
            id: id.to_string(),
            statement: "A research problem statement long enough.".to_string(),
            paper_doi: "10.1234/x".to_string(),
            section: SectionType::Introduction,
            domain: Some("nlp".to_string()),
            assumptions: vec![],
            constraints: vec![],
            datasets: vec![],
            metrics: vec![],
            baselines: vec![],
            quoted_text: "quoted".to_string(),
            embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
            concept_id: None,
            match_confidence: None,
            match_score: None,
            match_method: None,
            review_status: ReviewStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_get_problem_mention_round_trips() {
        let repo = test_repo().await;
        let mention = sample_mention("m1");
        repo.create_problem_mention(&mention).await.unwrap();

        let fetched = repo.get_problem_mention("m1").await.unwrap();
        assert_eq!(fetched.statement, mention.statement);
        assert_eq!(fetched.paper_doi, "10.1234/x");
    }

    #[tokio::test]
    async fn create_problem_mention_rejects_duplicate_id() {
        let repo = test_repo().await;
        let mention = sample_mention("m1");
        repo.create_problem_mention(&mention).await.unwrap();

        let err = repo.create_problem_mention(&mention).await.unwrap_err();
        assert!(matches!(err, GraphError::Core(CoreError::Duplicate)));
    }

    #[tokio::test]
    async fn get_problem_mention_not_found() {
        let repo = test_repo().await;
        let err = repo.get_problem_mention("missing").await.unwrap_err();
        assert!(matches!(err, GraphError::Core(CoreError::NotFound)));
    }

    #[tokio::test]
    async fn find_author_by_external_id_is_always_none() {
        let repo = test_repo().await;
        let author = Author {
            id: "a1".to_string(),
            name: "A. Researcher".to_string(),
            affiliations: vec![],
            orcid: None,
            semantic_scholar_id: Some("s2-1".to_string()),
        };
        repo.create_author(&author).await.unwrap();
        assert!(repo.find_author_by_external_id("semantic_scholar", "s2-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_problem_concept_soft_sets_deprecated() {
        let repo = test_repo().await;
        let mention = sample_mention("m2");
        let concept = ProblemConcept::first_mention_from(&mention, vec![1.0, 0.0, 0.0, 0.0]);
        repo.create_problem_concept(&concept).await.unwrap();

        repo.delete_problem_concept(&concept.id, true).await.unwrap();
        let fetched = repo.get_problem_concept(&concept.id).await.unwrap();
        assert_eq!(fetched.status, ConceptStatus::Deprecated);
    }

    #[tokio::test]
    async fn link_instance_of_updates_mention_and_concept_atomically() {
        let repo = test_repo().await;
        let mention = sample_mention("m3");
        repo.create_problem_mention(&mention).await.unwrap();

        let concept = ProblemConcept::first_mention_from(&sample_mention("seed"), vec![1.0, 0.0, 0.0, 0.0]);
        repo.create_problem_concept(&concept).await.unwrap();

        let candidate = MatchCandidate {
            concept_id: concept.id.clone(),
            concept_statement: concept.canonical_statement.clone(),
            domain: Some(concept.domain.clone()),
            mention_count: concept.mention_count,
            similarity_score: 0.99,
            domain_match: true,
            citation_boost: 0.0,
        };

        let updated = repo.link_instance_of(&mention, &candidate, "trace-1").await.unwrap();
        assert_eq!(updated.mention_count, 2);

        let fetched_mention = repo.get_problem_mention("m3").await.unwrap();
        assert_eq!(fetched_mention.concept_id.as_deref(), Some(concept.id.as_str()));
        assert_eq!(fetched_mention.match_confidence, Some(MatchConfidence::High));
        assert_eq!(fetched_mention.review_status, ReviewStatus::Approved);
    }
}
