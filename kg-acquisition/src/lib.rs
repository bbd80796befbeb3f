//! Paper acquisition: rate-limited, circuit-broken, cached, retried clients
//! for Semantic Scholar, arXiv, and OpenAlex, normalized into one record
//! shape and merged across sources (spec §4).

pub mod acquisition;
pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pdf_cache;
pub mod rate_limiter;
pub mod response_cache;
pub mod retry;
pub mod sources;

pub use acquisition::AcquisitionLayer;
pub use circuit_breaker::CircuitBreaker;
pub use context::SourceContext;
pub use error::{AcquisitionError, AcquisitionResult};
pub use models::{DownloadResult, NormalizedAuthor, NormalizedPaper};
pub use normalize::merge;
pub use pdf_cache::PdfCache;
pub use rate_limiter::RateLimiter;
pub use response_cache::{Namespace, ResponseCache};
pub use retry::RetryPolicy;
pub use sources::{ArxivClient, OpenAlexClient, SemanticScholarClient};
