//! One client per external bibliographic source (C5), each sharing the
//! cache → breaker → limiter → retry skeleton via [`crate::context::SourceContext`].

pub mod arxiv;
pub mod openalex;
pub mod semantic_scholar;

pub use arxiv::ArxivClient;
pub use openalex::OpenAlexClient;
pub use semantic_scholar::SemanticScholarClient;
