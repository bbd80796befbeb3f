//! Shared configuration, domain value types, and the base error taxonomy
//! used across the acquisition, extraction, and canonicalization crates.

pub mod config;
pub mod enums;
pub mod error;
pub mod identifiers;
pub mod trace;

pub use config::{Config, ConfigError, Secrets, SecretsError, Settings, SettingsError, load_dotenv};
pub use enums::{
    ConceptStatus, ExtractionMethod, MatchConfidence, MatchMethod, RelationType, ReviewStatus,
    SectionType, SynthesisMethod,
};
pub use error::CoreError;
pub use identifiers::{PaperIdentifier, SourceType};
pub use trace::new_trace_id;
