//! Validation and run-result records produced by the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RetrievalCoverage, RunId, SectionId};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Structural,
    Rag,
    Content,
}

/// Issue severity. Ordered so that `Critical` is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Permissive parse; anything unrecognised is `Minor`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "major" => Self::Major,
            _ => Self::Minor,
        }
    }

    pub fn as_upper(&self) -> &'static str {
        match self {
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub description: String,
    pub location: String,
}

impl ValidationIssue {
    pub fn new(
        category: IssueCategory,
        severity: Severity,
        description: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            description: description.into(),
            location: location.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// How a [`SectionValidation`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    /// Automated checks only (critical issue found, model check skipped).
    Automated,
    /// Automated checks combined with the model-assisted review.
    Combined,
    /// Synthesised after collaborator failures used up every attempt.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionValidation {
    pub valid: bool,
    pub score: f64,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
    pub automated_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_score: Option<f64>,
    pub method: ValidationMethod,
}

impl SectionValidation {
    pub fn critical_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_critical())
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_critical)
    }
}

/// Working state of one section across its retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionResult {
    pub content: String,
    pub validation: SectionValidation,
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Run result
// ---------------------------------------------------------------------------

/// Terminal state of a section's correction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionOutcome {
    Accepted,
    AcceptedDegraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub id: SectionId,
    pub title: String,
    pub attempts: u32,
    pub outcome: SectionOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    IncompleteRequirements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub duration_seconds: f64,
    pub total_sections: usize,
    pub valid_sections: usize,
    pub average_score: f64,
    pub generated_at: DateTime<Utc>,
    pub completeness_score: f64,
}

/// The terminal artifact of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: RunId,
    pub status: RunStatus,
    pub document: String,
    pub per_section_validation: BTreeMap<SectionId, SectionValidation>,
    /// Sections in assembly order.
    pub sections: Vec<SectionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_coverage: Option<RetrievalCoverage>,
    pub metadata: RunMetadata,
}
