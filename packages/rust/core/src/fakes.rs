//! In-memory collaborator fakes (testing only).
//!
//! `ScriptedGenerator` tells draft calls from review calls by the request
//! label (`draft:<section>` / `review:<section>`) and replays per-section
//! scripts, falling back to content that satisfies the section schema.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use archdoc_shared::{
    ArchDocError, Completeness, CompletenessStatus, Infrastructure, NamingArtifact,
    NamingComponent, NamingRequest, NamingSource, NamingValidation, ProjectContext, ProjectInfo,
    Requirements, Result, RetrievedChunk, SectionId, Stakeholder,
};

use crate::schema::{self, SectionSchema};
use crate::services::{Embedder, GenerationRequest, KnowledgeIndex, NamingResolver, TextGenerator};

/// Markdown table included in passing drafts for table-bearing sections.
pub const TABLE_SNIPPET: &str =
    "| Component | Azure Service | Tier |\n|---|---|---|\n| Ingestion | Event Hubs | Standard |";

pub const DIAGRAM_SNIPPET: &str = "```mermaid\ngraph TD\n  Devices --> Ingestion --> Storage\n```";

pub const PASSING_REVIEW: &str =
    "VALIDATION RESULT: PASS\nSCORE: 0.9\nISSUES:\nRECOMMENDATIONS:\n- Keep the tables current\n";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn chunk(content: &str, score: f64, title: &str) -> RetrievedChunk {
    RetrievedChunk {
        content: content.into(),
        score,
        title: title.into(),
    }
}

/// A complete context for an IoT telemetry project.
pub fn sample_context() -> ProjectContext {
    ProjectContext {
        project: ProjectInfo {
            name: "FT".into(),
            full_name: "Fleet Telemetry".into(),
            description: "Collects vehicle sensor readings and raises maintenance alerts.".into(),
            business_line: "GLB".into(),
            region: "GLB".into(),
            owner: "Platform Team".into(),
            cost_center: "CC-1001".into(),
        },
        infrastructure: Infrastructure {
            cloud_provider: "Azure".into(),
            primary_region: "North Europe".into(),
            secondary_region: None,
            environments: vec!["DEV".into(), "PRD".into()],
            high_availability: true,
            disaster_recovery: false,
            multi_region: false,
        },
        requirements: Requirements {
            functional: vec!["Ingest telemetry every 10 seconds".into()],
            ..Default::default()
        },
        stakeholders: vec![Stakeholder {
            name: "Alice".into(),
            role: "Product Owner".into(),
        }],
        completeness: Completeness {
            is_complete: true,
            score: 0.85,
            missing_fields: vec![],
            provided_fields: 11,
            total_fields: 13,
            status: CompletenessStatus::Ready,
        },
    }
}

/// Section text that passes every automated check for `schema`.
///
/// Not-found statements are included for every required domain, so the
/// text passes whatever the retrieval outcome was.
pub fn passing_section(schema: &SectionSchema) -> String {
    let mut blocks = vec![
        format!("### {}", schema.title),
        "The telemetry platform runs on managed Azure services in the primary region. \
         Each environment is isolated in its own resource group and deployed through \
         declarative templates that are reviewed before every release."
            .to_string(),
        "Operational ownership sits with the platform team, which maintains the runbooks, \
         the alert routing rules and the quarterly access reviews for every production \
         subscription used by the solution."
            .to_string(),
        "Capacity is sized for ten thousand vehicles reporting every ten seconds, with \
         autoscaling rules on the ingestion tier and a ninety day retention window on \
         the hot analytical store."
            .to_string(),
    ];
    if !schema.required_tables.is_empty() {
        blocks.push(TABLE_SNIPPET.to_string());
    }
    if schema.requires_diagram {
        blocks.push(DIAGRAM_SNIPPET.to_string());
    }
    for domain in schema.required_rag_domains {
        blocks.push(format!("Standard {} not found in the knowledge index.", domain.id()));
    }
    if !schema.required_rag_domains.is_empty() {
        blocks.push("Source: Cloud Governance Handbook, Section 4".to_string());
    }
    blocks.join("\n\n")
}

// ---------------------------------------------------------------------------
// Embedder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FixedEmbedder {
    fail: bool,
}

impl FixedEmbedder {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        if self.fail {
            Err(ArchDocError::Embedding("embedding deployment unavailable".into()))
        } else {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }
}

// ---------------------------------------------------------------------------
// Knowledge index
// ---------------------------------------------------------------------------

/// Returns scripted hits for queries containing a needle; empty otherwise.
#[derive(Debug, Default)]
pub struct FakeIndex {
    hits: Vec<(String, Vec<RetrievedChunk>)>,
    failing: Vec<String>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl FakeIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, needle: &str, chunks: Vec<RetrievedChunk>) -> Self {
        self.hits.push((needle.into(), chunks));
        self
    }

    pub fn failing(mut self, needle: &str) -> Self {
        self.failing.push(needle.into());
        self
    }

    /// `(query, top_k)` pairs received so far.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

impl KnowledgeIndex for FakeIndex {
    async fn hybrid_search(
        &self,
        query: &str,
        _vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        self.queries.lock().unwrap().push((query.to_string(), top_k));
        if self.failing.iter().any(|n| query.contains(n.as_str())) {
            return Err(ArchDocError::Retrieval(format!("index rejected '{query}'")));
        }
        Ok(self
            .hits
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, chunks)| chunks.iter().take(top_k).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

type Script = HashMap<SectionId, VecDeque<std::result::Result<String, String>>>;

#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    drafts: Mutex<Script>,
    reviews: Mutex<Script>,
    misconfigured: Mutex<HashMap<SectionId, String>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue draft responses for one section; `Err` entries become
    /// generation failures.
    pub fn script_drafts(
        self,
        id: SectionId,
        drafts: Vec<std::result::Result<String, String>>,
    ) -> Self {
        self.drafts.lock().unwrap().insert(id, drafts.into());
        self
    }

    pub fn script_reviews(
        self,
        id: SectionId,
        reviews: Vec<std::result::Result<String, String>>,
    ) -> Self {
        self.reviews.lock().unwrap().insert(id, reviews.into());
        self
    }

    /// Every draft call for `id` fails with a configuration error.
    pub fn misconfigure_drafts(self, id: SectionId, message: &str) -> Self {
        self.misconfigured.lock().unwrap().insert(id, message.into());
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_labelled(&self, label: &str) -> Vec<GenerationRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.label == label)
            .collect()
    }
}

impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        let (kind, section) = request.label.split_once(':').unwrap_or(("draft", ""));
        let Some(schema) = schema::section_order()
            .iter()
            .find(|s| s.id.as_str() == section)
        else {
            return Ok(PASSING_REVIEW.to_string());
        };

        if kind != "review" {
            if let Some(message) = self.misconfigured.lock().unwrap().get(&schema.id) {
                return Err(ArchDocError::config(message.clone()));
            }
        }

        let script = if kind == "review" {
            &self.reviews
        } else {
            &self.drafts
        };
        let next = script
            .lock()
            .unwrap()
            .get_mut(&schema.id)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ArchDocError::Generation(message)),
            None if kind == "review" => Ok(PASSING_REVIEW.to_string()),
            None => Ok(passing_section(schema)),
        }
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FixedNaming {
    error: Option<String>,
    requests: Mutex<Vec<NamingRequest>>,
}

impl FixedNaming {
    pub fn resolved() -> Self {
        Self::default()
    }

    pub fn unresolved(error: &str) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<NamingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl NamingResolver for FixedNaming {
    async fn resolve(&self, request: &NamingRequest) -> NamingArtifact {
        self.requests.lock().unwrap().push(request.clone());
        let validation = NamingValidation {
            query_executed: true,
            convention_found: self.error.is_none(),
            all_codes_validated: self.error.is_none(),
            errors: vec![],
        };
        if let Some(error) = &self.error {
            return NamingArtifact::failed(error.clone(), validation);
        }
        let name = format!(
            "{}-{}-IENO-{}-{}-RG01",
            request.business_line, request.region, request.project_name, request.environment
        );
        NamingArtifact {
            name: Some(name),
            error: None,
            pattern: Some(
                "{Business Line}-{Region}-{Cloud Region}-{Project}-{Environment}-RG##".into(),
            ),
            components: [(
                "project".to_string(),
                NamingComponent {
                    value: request.project_name.clone(),
                    description: format!("{} Project", request.project_name),
                },
            )]
            .into(),
            source: Some(NamingSource {
                file: "naming-standard.pdf".into(),
                section: "Resource Groups".into(),
                examples: vec![],
            }),
            validation,
        }
    }
}
