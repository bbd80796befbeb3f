//! Canonicalization core: vector-similarity concept matching, transactional
//! auto-linking, per-paper integration of extraction output, the graph
//! repository, and the read-only search service (spec §4.16-§4.20).

pub mod auto_linker;
pub mod concept_matcher;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod integrator;
pub mod models;
pub mod repository;
pub mod search;

pub use auto_linker::AutoLinker;
pub use concept_matcher::ConceptMatcher;
pub use db::GraphDbPool;
pub use embeddings::EmbeddingClient;
pub use error::{GraphError, GraphResult};
pub use integrator::{IntegrationResult, KgIntegrator, MentionIntegrationResult};
pub use models::{Author, MatchCandidate, Paper, ProblemConcept, ProblemMention, ProblemRelation};
pub use repository::{Repository, SqliteRepository, StructuredFilter};
pub use search::{MatchType, SearchResult, SearchService};
