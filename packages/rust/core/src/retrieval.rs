//! Domain retrieval: one hybrid search per taxonomy entry, tagged found or
//! not found, plus coverage metrics.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use archdoc_shared::{
    ArchDocError, ProjectContext, RagDomain, Result, RetrievalCoverage, RetrievalDomainResult,
    RetrievedChunk,
};

use crate::services::{Embedder, KnowledgeIndex, with_timeout};

/// Placeholder in query templates replaced by the inferred project category.
const PROJECT_TYPE_SLOT: &str = "{project_type}";

/// Query template per knowledge domain.
pub const TAXONOMY: [(RagDomain, &str); 12] = [
    (
        RagDomain::NamingResourceGroups,
        "resource group naming convention private paas RG pattern",
    ),
    (
        RagDomain::NamingVnets,
        "virtual network vnet naming convention pattern azure",
    ),
    (
        RagDomain::NamingSubnets,
        "subnet naming convention pattern network",
    ),
    (
        RagDomain::NamingSecurityGroups,
        "entra id security group naming convention pattern azure ad",
    ),
    (
        RagDomain::NamingKeyVaults,
        "key vault naming convention pattern secrets",
    ),
    (
        RagDomain::NamingStorage,
        "storage account naming convention pattern blob",
    ),
    (
        RagDomain::GovernanceTagging,
        "azure tagging policy standard mandatory tags governance",
    ),
    (
        RagDomain::GovernanceRbac,
        "role based access control rbac model azure permissions",
    ),
    (
        RagDomain::GovernanceSecurityBaseline,
        "security baseline standards controls compliance azure",
    ),
    (
        RagDomain::ArchitectureNetworkSegmentation,
        "network segmentation hub spoke topology vnet peering",
    ),
    (
        RagDomain::ArchitectureIamModel,
        "identity access management model entra id azure ad authentication",
    ),
    (
        RagDomain::ArchitectureReferencePatterns,
        "reference architecture pattern {project_type} best practices azure",
    ),
];

/// Project categories and their trigger keywords; first match wins.
const CATEGORIES: [(&str, &[&str]); 6] = [
    ("iot platform", &["iot", "internet of things", "sensor", "device"]),
    ("data analytics", &["data", "analytics", "bi", "warehouse", "lake"]),
    ("web application", &["web", "portal", "website", "frontend"]),
    ("microservices", &["api", "microservice", "service"]),
    ("mobile application", &["mobile", "app"]),
    (
        "ai ml platform",
        &["ai", "ml", "machine learning", "artificial intelligence"],
    ),
];

const DEFAULT_CATEGORY: &str = "cloud application";

/// Infer a coarse project category from the project name and description.
pub fn infer_project_category(ctx: &ProjectContext) -> &'static str {
    let haystack = format!(
        "{} {}",
        ctx.project.full_name.to_lowercase(),
        ctx.project.description.to_lowercase()
    );
    CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Frozen retrieval results for one run, keyed by domain.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalReport {
    pub results: BTreeMap<RagDomain, RetrievalDomainResult>,
}

impl RetrievalReport {
    pub fn get(&self, domain: RagDomain) -> Option<&RetrievalDomainResult> {
        self.results.get(&domain)
    }

    /// Whether the domain returned at least one chunk.
    pub fn is_found(&self, domain: RagDomain) -> bool {
        self.get(domain).is_some_and(|r| r.found)
    }

    pub fn coverage(&self) -> RetrievalCoverage {
        let (found, missing): (Vec<_>, Vec<_>) =
            self.results.values().partition(|r| r.found);
        let total_queries = self.results.len();
        let successful_queries = found.len();
        RetrievalCoverage {
            found: found.iter().map(|r| r.domain.id()).collect(),
            missing: missing.iter().map(|r| r.domain.id()).collect(),
            total_queries,
            successful_queries,
            coverage_score: if total_queries == 0 {
                0.0
            } else {
                successful_queries as f64 / total_queries as f64
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Issues the taxonomy queries against the knowledge index.
#[derive(Debug, Clone)]
pub struct RetrievalCoordinator {
    pub top_k: usize,
    pub call_timeout: Duration,
}

impl RetrievalCoordinator {
    pub fn new(top_k: usize, call_timeout: Duration) -> Self {
        Self {
            top_k,
            call_timeout,
        }
    }

    /// Run every taxonomy query concurrently.
    ///
    /// Per-domain failures are captured in the result. The call only fails
    /// when every query hit a collaborator error, which means the service
    /// itself is unreachable.
    #[instrument(skip_all, fields(project = %ctx.project.name, top_k = self.top_k))]
    pub async fn retrieve_all<E, K>(
        &self,
        embedder: &E,
        index: &K,
        ctx: &ProjectContext,
    ) -> Result<RetrievalReport>
    where
        E: Embedder,
        K: KnowledgeIndex,
    {
        let category = infer_project_category(ctx);
        debug!(category, "inferred project category");

        let queries = TAXONOMY.iter().map(|(domain, template)| {
            let query = template.replace(PROJECT_TYPE_SLOT, category);
            self.query_domain(embedder, index, *domain, query)
        });
        let outcomes = join_all(queries).await;

        let errored = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .count();
        if !outcomes.is_empty() && errored == outcomes.len() {
            let first = outcomes
                .iter()
                .find_map(|(_, o)| o.as_ref().err())
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(ArchDocError::Retrieval(format!(
                "all {errored} knowledge queries failed; first error: {first}"
            )));
        }

        let results: BTreeMap<_, _> = outcomes
            .into_iter()
            .map(|(result, _)| (result.domain, result))
            .collect();
        let report = RetrievalReport { results };
        let coverage = report.coverage();

        info!(
            found = coverage.successful_queries,
            total = coverage.total_queries,
            errored,
            coverage = coverage.coverage_score,
            "retrieval complete"
        );

        Ok(report)
    }

    async fn query_domain<E, K>(
        &self,
        embedder: &E,
        index: &K,
        domain: RagDomain,
        query: String,
    ) -> (RetrievalDomainResult, std::result::Result<(), ArchDocError>)
    where
        E: Embedder,
        K: KnowledgeIndex,
    {
        let outcome = async {
            let vector = with_timeout("embedding", self.call_timeout, embedder.embed(&query)).await?;
            with_timeout(
                "hybrid search",
                self.call_timeout,
                index.hybrid_search(&query, &vector, self.top_k),
            )
            .await
        }
        .await;

        match outcome {
            Ok(chunks) if !chunks.is_empty() => {
                debug!(domain = %domain, chunks = chunks.len(), "domain found");
                (found_result(domain, query, chunks), Ok(()))
            }
            Ok(_) => {
                warn!(domain = %domain, "no knowledge found for domain");
                let error = format!(
                    "{} {} not found in knowledge index",
                    domain.label(),
                    domain.group().noun()
                );
                (missing_result(domain, query, error), Ok(()))
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "knowledge query failed");
                (missing_result(domain, query, e.to_string()), Err(e))
            }
        }
    }
}

fn found_result(domain: RagDomain, query: String, chunks: Vec<RetrievedChunk>) -> RetrievalDomainResult {
    let mut source_files: Vec<String> = Vec::new();
    for chunk in &chunks {
        if !source_files.contains(&chunk.title) {
            source_files.push(chunk.title.clone());
        }
    }
    RetrievalDomainResult {
        domain,
        found: true,
        query,
        top_score: chunks.first().map(|c| c.score).unwrap_or(0.0),
        chunks,
        source_files,
        error: None,
    }
}

fn missing_result(domain: RagDomain, query: String, error: String) -> RetrievalDomainResult {
    RetrievalDomainResult {
        domain,
        found: false,
        query,
        chunks: Vec::new(),
        top_score: 0.0,
        source_files: Vec::new(),
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeIndex, FixedEmbedder, chunk, sample_context};

    fn coordinator() -> RetrievalCoordinator {
        RetrievalCoordinator::new(5, Duration::from_secs(5))
    }

    #[test]
    fn category_inference_first_match_wins() {
        let mut ctx = sample_context();
        ctx.project.full_name = "Sensor Data Lake".into();
        ctx.project.description = String::new();
        assert_eq!(infer_project_category(&ctx), "iot platform");

        ctx.project.full_name = "Customer Portal".into();
        assert_eq!(infer_project_category(&ctx), "web application");

        ctx.project.full_name = "Payroll".into();
        assert_eq!(infer_project_category(&ctx), DEFAULT_CATEGORY);
    }

    #[tokio::test]
    async fn empty_results_are_not_found_with_error() {
        let index = FakeIndex::empty().with_hits(
            "resource group",
            vec![
                chunk("RG naming pattern", 0.92, "naming-standard.pdf"),
                chunk("RG examples", 0.81, "naming-standard.pdf"),
            ],
        );
        let report = coordinator()
            .retrieve_all(&FixedEmbedder::default(), &index, &sample_context())
            .await
            .unwrap();

        assert_eq!(report.results.len(), 12);
        let rg = report.get(RagDomain::NamingResourceGroups).unwrap();
        assert!(rg.found);
        assert_eq!(rg.source_files, vec!["naming-standard.pdf"]);
        assert!((rg.top_score - 0.92).abs() < 1e-9);

        let vnets = report.get(RagDomain::NamingVnets).unwrap();
        assert!(!vnets.found);
        assert!(vnets.error.as_deref().is_some_and(|e| !e.is_empty()));

        let coverage = report.coverage();
        assert_eq!(coverage.successful_queries, 1);
        assert_eq!(coverage.total_queries, 12);
        assert!((coverage.coverage_score - 1.0 / 12.0).abs() < 1e-12);
        assert_eq!(coverage.found, vec!["naming.resource_groups"]);
        assert_eq!(coverage.missing.len(), 11);
    }

    #[tokio::test]
    async fn partial_failures_are_captured_per_domain() {
        let index = FakeIndex::empty().failing("tagging");
        let report = coordinator()
            .retrieve_all(&FixedEmbedder::default(), &index, &sample_context())
            .await
            .unwrap();
        let tagging = report.get(RagDomain::GovernanceTagging).unwrap();
        assert!(!tagging.found);
        assert!(tagging.error.as_deref().unwrap().contains("retrieval error"));
    }

    #[tokio::test]
    async fn unreachable_service_aborts() {
        let err = coordinator()
            .retrieve_all(&FixedEmbedder::failing(), &FakeIndex::empty(), &sample_context())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchDocError::Retrieval(_)));
        assert!(err.to_string().contains("all 12"));
    }

    #[tokio::test]
    async fn reference_pattern_query_carries_category() {
        let index = FakeIndex::empty();
        let mut ctx = sample_context();
        ctx.project.full_name = "IoT Platform".into();
        let report = coordinator()
            .retrieve_all(&FixedEmbedder::default(), &index, &ctx)
            .await
            .unwrap();
        let refs = report.get(RagDomain::ArchitectureReferencePatterns).unwrap();
        assert!(refs.query.contains("iot platform"));
        assert!(index.queries().iter().all(|(_, k)| *k == 5));
    }
}
