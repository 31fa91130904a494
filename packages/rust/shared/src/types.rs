//! Core domain types for archdoc runs.
//!
//! Everything that crosses a stage boundary is a typed record here: the
//! normalized [`ProjectContext`], retrieval results, naming artifacts and the
//! per-section validation outcome.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the run manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ProjectContext
// ---------------------------------------------------------------------------

/// Identity of the project the document is written for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Short acronym derived from `full_name` (e.g. `IOT`).
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub business_line: String,
    pub region: String,
    pub owner: String,
    pub cost_center: String,
}

/// Hosting footprint requested for the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Infrastructure {
    pub cloud_provider: String,
    pub primary_region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_region: Option<String>,
    /// Upper-cased environment codes, e.g. `DEV`, `PRD`.
    pub environments: Vec<String>,
    pub high_availability: bool,
    pub disaster_recovery: bool,
    pub multi_region: bool,
}

/// Requirement lists, one entry per line of the original input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    pub functional: Vec<String>,
    pub non_functional: Vec<String>,
    pub constraints: Vec<String>,
    pub assumptions: Vec<String>,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stakeholder {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletenessStatus {
    Ready,
    Incomplete,
}

/// Structural completeness assessment of the raw input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    pub is_complete: bool,
    /// Fraction of optional fields supplied, in `[0, 1]`.
    pub score: f64,
    pub missing_fields: Vec<String>,
    pub provided_fields: usize,
    pub total_fields: usize,
    pub status: CompletenessStatus,
}

/// Validated internal project context; immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project: ProjectInfo,
    pub infrastructure: Infrastructure,
    pub requirements: Requirements,
    pub stakeholders: Vec<Stakeholder>,
    pub completeness: Completeness,
}

// ---------------------------------------------------------------------------
// Sections & knowledge domains
// ---------------------------------------------------------------------------

/// Identifier of one document section. Declaration order is assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    ExecutiveSummary,
    Context,
    FunctionalRequirements,
    NonFunctionalRequirements,
    Constraints,
    Assumptions,
    Risks,
    SolutionOverview,
    ComponentDecomposition,
    Hosting,
    IdentityAccessManagement,
    NetworkConfiguration,
    SecurityControls,
    DataManagement,
    MonitoringObservability,
    DisasterRecovery,
    CostEstimation,
    DeploymentStrategy,
    Adrs,
}

impl SectionId {
    /// Stable snake_case key (also the prompt template file stem).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "executive_summary",
            Self::Context => "context",
            Self::FunctionalRequirements => "functional_requirements",
            Self::NonFunctionalRequirements => "non_functional_requirements",
            Self::Constraints => "constraints",
            Self::Assumptions => "assumptions",
            Self::Risks => "risks",
            Self::SolutionOverview => "solution_overview",
            Self::ComponentDecomposition => "component_decomposition",
            Self::Hosting => "hosting",
            Self::IdentityAccessManagement => "identity_access_management",
            Self::NetworkConfiguration => "network_configuration",
            Self::SecurityControls => "security_controls",
            Self::DataManagement => "data_management",
            Self::MonitoringObservability => "monitoring_observability",
            Self::DisasterRecovery => "disaster_recovery",
            Self::CostEstimation => "cost_estimation",
            Self::DeploymentStrategy => "deployment_strategy",
            Self::Adrs => "adrs",
        }
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group of the knowledge taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainGroup {
    Naming,
    Governance,
    Architecture,
}

impl DomainGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naming => "naming",
            Self::Governance => "governance",
            Self::Architecture => "architecture",
        }
    }

    /// Noun used in not-found messages for this group.
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Naming => "naming convention",
            Self::Governance => "governance standard",
            Self::Architecture => "architecture pattern",
        }
    }
}

/// A named knowledge category queried against the retrieval service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RagDomain {
    #[serde(rename = "naming.resource_groups")]
    NamingResourceGroups,
    #[serde(rename = "naming.vnets")]
    NamingVnets,
    #[serde(rename = "naming.subnets")]
    NamingSubnets,
    #[serde(rename = "naming.security_groups")]
    NamingSecurityGroups,
    #[serde(rename = "naming.key_vaults")]
    NamingKeyVaults,
    #[serde(rename = "naming.storage")]
    NamingStorage,
    #[serde(rename = "governance.tagging")]
    GovernanceTagging,
    #[serde(rename = "governance.rbac")]
    GovernanceRbac,
    #[serde(rename = "governance.security_baseline")]
    GovernanceSecurityBaseline,
    #[serde(rename = "architecture.network_segmentation")]
    ArchitectureNetworkSegmentation,
    #[serde(rename = "architecture.iam_model")]
    ArchitectureIamModel,
    #[serde(rename = "architecture.reference_patterns")]
    ArchitectureReferencePatterns,
}

impl RagDomain {
    pub fn group(&self) -> DomainGroup {
        match self {
            Self::NamingResourceGroups
            | Self::NamingVnets
            | Self::NamingSubnets
            | Self::NamingSecurityGroups
            | Self::NamingKeyVaults
            | Self::NamingStorage => DomainGroup::Naming,
            Self::GovernanceTagging | Self::GovernanceRbac | Self::GovernanceSecurityBaseline => {
                DomainGroup::Governance
            }
            Self::ArchitectureNetworkSegmentation
            | Self::ArchitectureIamModel
            | Self::ArchitectureReferencePatterns => DomainGroup::Architecture,
        }
    }

    pub fn subdomain(&self) -> &'static str {
        match self {
            Self::NamingResourceGroups => "resource_groups",
            Self::NamingVnets => "vnets",
            Self::NamingSubnets => "subnets",
            Self::NamingSecurityGroups => "security_groups",
            Self::NamingKeyVaults => "key_vaults",
            Self::NamingStorage => "storage",
            Self::GovernanceTagging => "tagging",
            Self::GovernanceRbac => "rbac",
            Self::GovernanceSecurityBaseline => "security_baseline",
            Self::ArchitectureNetworkSegmentation => "network_segmentation",
            Self::ArchitectureIamModel => "iam_model",
            Self::ArchitectureReferencePatterns => "reference_patterns",
        }
    }

    /// Dotted identifier, e.g. `naming.vnets`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.group().as_str(), self.subdomain())
    }

    /// Human label, e.g. `key vaults`.
    pub fn label(&self) -> String {
        self.subdomain().replace('_', " ")
    }
}

impl std::fmt::Display for RagDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.group().as_str(), self.subdomain())
    }
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// One hit returned by the hybrid retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub score: f64,
    pub title: String,
}

/// Outcome of one taxonomy query. `found == false` is a valid state, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalDomainResult {
    pub domain: RagDomain,
    pub found: bool,
    pub query: String,
    pub chunks: Vec<RetrievedChunk>,
    pub top_score: f64,
    pub source_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of found and missing knowledge domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCoverage {
    pub found: Vec<String>,
    pub missing: Vec<String>,
    pub total_queries: usize,
    pub successful_queries: usize,
    pub coverage_score: f64,
}

// ---------------------------------------------------------------------------
// Naming artifacts
// ---------------------------------------------------------------------------

/// Inputs for resolving a resource-group name for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingRequest {
    pub project_name: String,
    pub cloud_region: String,
    pub environment: String,
    pub business_line: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingComponent {
    pub value: String,
    pub description: String,
}

/// Where a naming convention was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingSource {
    pub file: String,
    pub section: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingValidation {
    pub query_executed: bool,
    pub convention_found: bool,
    pub all_codes_validated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// A resolved identifier or an explicit failure; never an invented name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, NamingComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<NamingSource>,
    pub validation: NamingValidation,
}

impl NamingArtifact {
    /// An unresolved artifact carrying only an error message.
    pub fn failed(error: impl Into<String>, validation: NamingValidation) -> Self {
        Self {
            error: Some(error.into()),
            validation,
            ..Default::default()
        }
    }
}

/// Naming artifact resolved for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentNaming {
    pub environment: String,
    /// Key used in prompts, e.g. `rg_dev`.
    pub key: String,
    pub artifact: NamingArtifact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn section_id_order_matches_declaration() {
        assert!(SectionId::ExecutiveSummary < SectionId::Hosting);
        assert!(SectionId::NetworkConfiguration < SectionId::Adrs);
        let json = serde_json::to_string(&SectionId::IdentityAccessManagement).unwrap();
        assert_eq!(json, r#""identity_access_management""#);
    }

    #[test]
    fn rag_domain_ids_and_labels() {
        assert_eq!(RagDomain::NamingKeyVaults.id(), "naming.key_vaults");
        assert_eq!(RagDomain::NamingKeyVaults.label(), "key vaults");
        assert_eq!(RagDomain::GovernanceRbac.group(), DomainGroup::Governance);
        let json = serde_json::to_string(&RagDomain::ArchitectureIamModel).unwrap();
        assert_eq!(json, r#""architecture.iam_model""#);
        assert_eq!(
            RagDomain::ArchitectureIamModel.to_string(),
            RagDomain::ArchitectureIamModel.id()
        );
    }

    #[test]
    fn failed_naming_artifact_has_no_name() {
        let artifact = NamingArtifact::failed(
            "convention not found",
            NamingValidation {
                query_executed: true,
                ..Default::default()
            },
        );
        assert!(artifact.name.is_none());
        let json = serde_json::to_value(&artifact).unwrap();
        assert!(json.get("name").is_none());
        assert_eq!(json["error"], "convention not found");
    }

    #[test]
    fn completeness_status_serializes_upper() {
        let json = serde_json::to_string(&CompletenessStatus::Incomplete).unwrap();
        assert_eq!(json, r#""INCOMPLETE""#);
    }
}
