//! Shared domain enums (spec §3 Data Model), used across the acquisition,
//! extraction, and canonicalization crates.

use serde::{Deserialize, Serialize};

/// Confidence band assigned to a mention-to-concept match (§4.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    /// `final_score >= 0.95` — auto-link.
    High,
    /// `0.80 <= final_score < 0.95` — single-reviewer check.
    Medium,
    /// `0.50 <= final_score < 0.80` — multi-reviewer consensus.
    Low,
    /// `final_score < 0.50`, or the score is not a number.
    Rejected,
}

impl MatchConfidence {
    /// Classify a raw similarity/final score into a confidence band.
    ///
    /// `NaN` always classifies as [`MatchConfidence::Rejected`]. Scores above
    /// `1.0` (which cannot occur after the `final_score` clamp in C16's
    /// caller, but which `classify` treats as a pure function of its input)
    /// classify as [`MatchConfidence::High`], same as any other value at or
    /// above the high threshold.
    pub fn classify(score: f64) -> MatchConfidence {
        Self::classify_with_thresholds(score, 0.95, 0.80, 0.50)
    }

    /// Classify using explicit thresholds, for callers that source them from
    /// [`crate::config::MatcherSettings`] rather than the built-in defaults.
    pub fn classify_with_thresholds(
        score: f64,
        high: f64,
        medium: f64,
        low: f64,
    ) -> MatchConfidence {
        if score.is_nan() {
            return MatchConfidence::Rejected;
        }
        if score >= high {
            MatchConfidence::High
        } else if score >= medium {
            MatchConfidence::Medium
        } else if score >= low {
            MatchConfidence::Low
        } else {
            MatchConfidence::Rejected
        }
    }
}

/// Review workflow status of a [`ProblemMention`](crate) (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    NeedsConsensus,
    Blacklisted,
}

/// How a mention was matched to a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Automatic high-confidence match by the auto-linker (C17).
    Auto,
    /// Decided by the external human-review workflow (out of scope; we only
    /// persist the outcome).
    Manual,
}

/// How a concept's canonical statement was established (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMethod {
    FirstMention,
    LlmSynthesis,
    HumanEdit,
}

/// Lifecycle status of a canonical problem concept (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStatus {
    Open,
    InProgress,
    Resolved,
    Deprecated,
}

/// Typed relationship between two problems (§3, C12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Extends,
    Contradicts,
    DependsOn,
    Reframes,
    RelatedTo,
    Supersedes,
    Specializes,
    Generalizes,
}

/// How a relation between two problems was established (C12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    TextualCue,
    SemanticSimilarity,
    Llm,
}

/// Section type, ordered by extraction priority (§3, §4.10). Lower numeric
/// priority means more likely to contain a research problem statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Limitations,
    FutureWork,
    Discussion,
    Conclusion,
    Introduction,
    Results,
    Experiments,
    Methods,
    RelatedWork,
    Background,
    Abstract,
    Acknowledgments,
    References,
    Appendix,
    Unknown,
}

impl SectionType {
    /// Extraction priority; lower is higher-priority.
    pub fn priority(&self) -> i32 {
        match self {
            SectionType::Limitations => 1,
            SectionType::FutureWork => 2,
            SectionType::Discussion => 3,
            SectionType::Conclusion => 4,
            SectionType::Introduction => 5,
            SectionType::Results => 6,
            SectionType::Experiments => 7,
            SectionType::Methods => 8,
            SectionType::RelatedWork => 9,
            SectionType::Background => 10,
            SectionType::Abstract => 11,
            SectionType::Acknowledgments => 99,
            SectionType::References | SectionType::Appendix => 100,
            SectionType::Unknown => 50,
        }
    }
}

impl Default for SectionType {
    fn default() -> Self {
        SectionType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries_match_spec() {
        assert_eq!(MatchConfidence::classify(0.95), MatchConfidence::High);
        assert_eq!(MatchConfidence::classify(0.949), MatchConfidence::Medium);
        assert_eq!(MatchConfidence::classify(0.80), MatchConfidence::Medium);
        assert_eq!(MatchConfidence::classify(0.799), MatchConfidence::Low);
        assert_eq!(MatchConfidence::classify(0.50), MatchConfidence::Low);
        assert_eq!(MatchConfidence::classify(0.499), MatchConfidence::Rejected);
        assert_eq!(MatchConfidence::classify(f64::NAN), MatchConfidence::Rejected);
        assert_eq!(MatchConfidence::classify(1.5), MatchConfidence::High);
    }

    #[test]
    fn section_priority_orders_limitations_before_references() {
        assert!(SectionType::Limitations.priority() < SectionType::FutureWork.priority());
        assert!(SectionType::Introduction.priority() < SectionType::References.priority());
        assert!(SectionType::Unknown.priority() > SectionType::Introduction.priority());
    }
}
