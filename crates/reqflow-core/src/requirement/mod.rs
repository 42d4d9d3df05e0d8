//! Requirement records and the policies defined over them.

pub mod model;

use model::Requirement;
use serde::{Deserialize, Serialize};

/// Two records are equivalent when id, name and description all match.
///
/// Metadata, fragments and analysis are deliberately ignored: a reload that
/// only differs in those keeps the current collection.
pub fn is_equivalent(a: &Requirement, b: &Requirement) -> bool {
    a.global_id == b.global_id && a.name == b.name && a.description == b.description
}

/// Element-for-element equivalence of two ordered record sets.
pub fn same_sequence(current: &[Requirement], incoming: &[Requirement]) -> bool {
    current.len() == incoming.len()
        && current
            .iter()
            .zip(incoming)
            .all(|(a, b)| is_equivalent(a, b))
}

/// Declarative choice of which records an analysis batch covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSelection {
    All,
    Analyzed,
    Unanalyzed,
    ModifiedSinceAnalysis,
}

impl AnalysisSelection {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "all" => Some(Self::All),
            "analyzed" => Some(Self::Analyzed),
            "unanalyzed" => Some(Self::Unanalyzed),
            "modified" | "modified_since_analysis" => Some(Self::ModifiedSinceAnalysis),
            _ => None,
        }
    }

    /// Whether a record belongs to this selection.
    pub fn matches(&self, requirement: &Requirement) -> bool {
        match self {
            Self::All => true,
            Self::Analyzed => requirement.is_analyzed(),
            Self::Unanalyzed => !requirement.is_analyzed(),
            Self::ModifiedSinceAnalysis => requirement.is_modified_since_analysis(),
        }
    }
}
