//! Static section registry: the contract every generated section must satisfy.
//!
//! [`section_order`] is the assembly order of the final document;
//! [`generation_order`] moves the infrastructure-facing sections to the front.

use serde::Serialize;

use archdoc_shared::{RagDomain, SectionId};

/// Kinds of concrete artifacts a section must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    ResourceGroupNames,
    VnetNames,
    SubnetNames,
    SecurityGroupNames,
    KeyVaultNames,
    StorageAccountNames,
    RbacRoles,
    ServicePrincipals,
    ManagedIdentities,
    NetworkTopology,
    SecurityControlsList,
    TaggingTable,
    CostBreakdown,
    DeploymentPipeline,
    MonitoringMetrics,
    AdrDecisions,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceGroupNames => "resource_group_names",
            Self::VnetNames => "vnet_names",
            Self::SubnetNames => "subnet_names",
            Self::SecurityGroupNames => "security_group_names",
            Self::KeyVaultNames => "key_vault_names",
            Self::StorageAccountNames => "storage_account_names",
            Self::RbacRoles => "rbac_roles",
            Self::ServicePrincipals => "service_principals",
            Self::ManagedIdentities => "managed_identities",
            Self::NetworkTopology => "network_topology",
            Self::SecurityControlsList => "security_controls_list",
            Self::TaggingTable => "tagging_table",
            Self::CostBreakdown => "cost_breakdown",
            Self::DeploymentPipeline => "deployment_pipeline",
            Self::MonitoringMetrics => "monitoring_metrics",
            Self::AdrDecisions => "adr_decisions",
        }
    }
}

/// Schema definition for one document section.
#[derive(Debug, Clone, Serialize)]
pub struct SectionSchema {
    pub id: SectionId,
    pub title: &'static str,
    pub description: &'static str,
    pub required_artifacts: &'static [ArtifactType],
    pub required_tables: &'static [&'static str],
    pub required_rag_domains: &'static [RagDomain],
    pub min_paragraphs: usize,
    pub max_length: usize,
    pub requires_diagram: bool,
    pub subsections: &'static [&'static str],
}

use ArtifactType as A;
use RagDomain as D;

static REGISTRY: [SectionSchema; 19] = [
    SectionSchema {
        id: SectionId::ExecutiveSummary,
        title: "1. Executive Summary",
        description: "High-level overview of the solution, business context, and key architectural decisions",
        required_artifacts: &[],
        required_tables: &[],
        required_rag_domains: &[],
        min_paragraphs: 3,
        max_length: 1500,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::Context,
        title: "2. Context and Background",
        description: "Business context, stakeholders, current state, and project objectives",
        required_artifacts: &[],
        required_tables: &["stakeholders"],
        required_rag_domains: &[],
        min_paragraphs: 2,
        max_length: 2000,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::FunctionalRequirements,
        title: "3. Functional Requirements",
        description: "Detailed functional requirements with priorities and acceptance criteria",
        required_artifacts: &[],
        required_tables: &["functional_requirements"],
        required_rag_domains: &[],
        min_paragraphs: 1,
        max_length: 3000,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::NonFunctionalRequirements,
        title: "4. Non-Functional Requirements",
        description: "Performance, scalability, availability, security, and compliance requirements",
        required_artifacts: &[],
        required_tables: &["non_functional_requirements"],
        required_rag_domains: &[D::GovernanceSecurityBaseline],
        min_paragraphs: 1,
        max_length: 3000,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::Constraints,
        title: "5. Constraints",
        description: "Technical, organizational, and regulatory constraints",
        required_artifacts: &[],
        required_tables: &["constraints"],
        required_rag_domains: &[],
        min_paragraphs: 1,
        max_length: 1500,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::Assumptions,
        title: "6. Assumptions",
        description: "Key assumptions made during architecture design",
        required_artifacts: &[],
        required_tables: &[],
        required_rag_domains: &[],
        min_paragraphs: 1,
        max_length: 1000,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::Risks,
        title: "7. Risks and Mitigations",
        description: "Identified risks with mitigation strategies",
        required_artifacts: &[],
        required_tables: &["risks"],
        required_rag_domains: &[],
        min_paragraphs: 1,
        max_length: 2000,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::SolutionOverview,
        title: "8. Solution Overview",
        description: "High-level architecture overview with system context diagram",
        required_artifacts: &[],
        required_tables: &[],
        required_rag_domains: &[D::ArchitectureReferencePatterns],
        min_paragraphs: 3,
        max_length: 2500,
        requires_diagram: true,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::ComponentDecomposition,
        title: "9. Component Decomposition",
        description: "Detailed component breakdown with Azure services, SKUs, and dependencies",
        required_artifacts: &[],
        required_tables: &["components"],
        required_rag_domains: &[],
        min_paragraphs: 2,
        max_length: 4000,
        requires_diagram: true,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::Hosting,
        title: "9.a. Hosting",
        description: "Resource Groups, Azure regions, tagging strategy, and resource organization",
        required_artifacts: &[A::ResourceGroupNames, A::TaggingTable],
        required_tables: &["resource_groups", "tags"],
        required_rag_domains: &[D::NamingResourceGroups, D::GovernanceTagging],
        min_paragraphs: 2,
        max_length: 3000,
        requires_diagram: false,
        subsections: &["Resource Groups", "Tagging Strategy", "Regional Deployment"],
    },
    SectionSchema {
        id: SectionId::IdentityAccessManagement,
        title: "9.h.i. Identity and Access Management",
        description: "Entra ID security groups, RBAC roles, service principals, and managed identities",
        required_artifacts: &[
            A::SecurityGroupNames,
            A::RbacRoles,
            A::ServicePrincipals,
            A::ManagedIdentities,
        ],
        required_tables: &["security_groups", "rbac_assignments", "service_principals"],
        required_rag_domains: &[
            D::NamingSecurityGroups,
            D::GovernanceRbac,
            D::ArchitectureIamModel,
        ],
        min_paragraphs: 3,
        max_length: 4000,
        requires_diagram: true,
        subsections: &[
            "Entra ID Security Groups",
            "RBAC Roles",
            "Service Principals",
            "Managed Identities",
        ],
    },
    SectionSchema {
        id: SectionId::NetworkConfiguration,
        title: "9.i.ii. Network Configuration",
        description: "VNets, subnets, NSGs, private endpoints, and network topology",
        required_artifacts: &[A::VnetNames, A::SubnetNames, A::NetworkTopology],
        required_tables: &["vnets", "subnets", "nsgs"],
        required_rag_domains: &[
            D::NamingVnets,
            D::NamingSubnets,
            D::ArchitectureNetworkSegmentation,
        ],
        min_paragraphs: 3,
        max_length: 4000,
        requires_diagram: true,
        subsections: &[
            "Network Topology",
            "VNets and Subnets",
            "Network Security Groups",
            "Private Endpoints",
        ],
    },
    SectionSchema {
        id: SectionId::SecurityControls,
        title: "10. Security Controls",
        description: "Security baseline, encryption, key management, and compliance controls",
        required_artifacts: &[A::KeyVaultNames, A::SecurityControlsList],
        required_tables: &["security_controls", "encryption"],
        required_rag_domains: &[D::NamingKeyVaults, D::GovernanceSecurityBaseline],
        min_paragraphs: 3,
        max_length: 3500,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::DataManagement,
        title: "11. Data Management",
        description: "Data storage, retention, backup, and data lifecycle management",
        required_artifacts: &[A::StorageAccountNames],
        required_tables: &["storage_accounts", "backup_policy"],
        required_rag_domains: &[D::NamingStorage],
        min_paragraphs: 2,
        max_length: 3000,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::MonitoringObservability,
        title: "12. Monitoring and Observability",
        description: "Monitoring strategy, metrics, alerts, and logging",
        required_artifacts: &[A::MonitoringMetrics],
        required_tables: &["monitoring_metrics", "alerts"],
        required_rag_domains: &[],
        min_paragraphs: 2,
        max_length: 2500,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::DisasterRecovery,
        title: "13. Disaster Recovery and Business Continuity",
        description: "DR strategy, RPO/RTO, backup procedures, and failover mechanisms",
        required_artifacts: &[],
        required_tables: &["dr_strategy"],
        required_rag_domains: &[],
        min_paragraphs: 2,
        max_length: 2500,
        requires_diagram: true,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::CostEstimation,
        title: "14. Cost Estimation",
        description: "Estimated monthly costs per environment with breakdown by service",
        required_artifacts: &[A::CostBreakdown],
        required_tables: &["cost_breakdown"],
        required_rag_domains: &[],
        min_paragraphs: 1,
        max_length: 2000,
        requires_diagram: false,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::DeploymentStrategy,
        title: "15. Deployment Strategy",
        description: "CI/CD pipeline, IaC approach, deployment environments, and rollout plan",
        required_artifacts: &[A::DeploymentPipeline],
        required_tables: &["deployment_environments"],
        required_rag_domains: &[],
        min_paragraphs: 2,
        max_length: 2500,
        requires_diagram: true,
        subsections: &[],
    },
    SectionSchema {
        id: SectionId::Adrs,
        title: "16. Architecture Decision Records (ADRs)",
        description: "Key architectural decisions with context, options, and rationale",
        required_artifacts: &[A::AdrDecisions],
        required_tables: &[],
        required_rag_domains: &[],
        min_paragraphs: 1,
        max_length: 5000,
        requires_diagram: false,
        subsections: &[],
    },
];

/// Sections generated before all others.
const PRIORITY_SECTIONS: [SectionId; 3] = [
    SectionId::Hosting,
    SectionId::IdentityAccessManagement,
    SectionId::NetworkConfiguration,
];

/// All schemas in assembly order.
pub fn section_order() -> &'static [SectionSchema] {
    &REGISTRY
}

/// Look up a schema by id.
pub fn schema(id: SectionId) -> &'static SectionSchema {
    // Registry entries are declared in `SectionId` order.
    &REGISTRY[id as usize]
}

/// Schemas in generation order: priority sections first, then the rest in
/// assembly order.
pub fn generation_order() -> Vec<&'static SectionSchema> {
    let mut ordered: Vec<&SectionSchema> =
        PRIORITY_SECTIONS.iter().map(|id| schema(*id)).collect();
    ordered.extend(
        REGISTRY
            .iter()
            .filter(|s| !PRIORITY_SECTIONS.contains(&s.id)),
    );
    ordered
}

/// Whether a section is in the priority group.
pub fn is_priority(id: SectionId) -> bool {
    PRIORITY_SECTIONS.contains(&id)
}
