//! Resource-group naming resolved from the governance knowledge base.
//!
//! The convention and its code tables are never hard-coded: they are pulled
//! out of retrieved text by [`extract_naming_knowledge`]. Only the Azure
//! region → cloud-region code table has a built-in fallback.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use archdoc_shared::{
    ArchDocError, NamingArtifact, NamingComponent, NamingRequest, NamingSource, NamingValidation,
    Result, RetrievedChunk,
};

use tokio::sync::OnceCell;

use crate::services::{Embedder, KnowledgeIndex, NamingResolver, with_timeout};

const CONVENTION_QUERY: &str = "resource group naming convention private paas azure RG pattern";
const CONVENTION_TOP_K: usize = 10;
const MAX_CONVENTION_CHUNKS: usize = 5;
const RELEVANCE_KEYWORDS: [&str; 4] = ["resource group", "rg##", "rg01", "naming convention"];

pub const DESCRIPTIVE_PATTERN: &str =
    "{Business Line}-{Region}-{Cloud Region}-{Project}-{Environment}-RG##";
const SOURCE_SECTION: &str = "Resource Group Naming";
const MAX_EXAMPLES: usize = 3;

const REGION_FALLBACK: [(&str, &str); 7] = [
    ("north europe", "IENO"),
    ("west europe", "NLWE"),
    ("east us", "USEA"),
    ("west us", "USWE"),
    ("central us", "USCE"),
    ("uk south", "UKSO"),
    ("france central", "FRCE"),
];

/// Words that mark a 4-letter code description as a geographic region.
const GEO_WORDS: [&str; 11] = [
    "north", "south", "east", "west", "central", "europe", "us", "uk", "france", "ireland",
    "netherlands",
];

static PATTERN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[^}]+\}-\{[^}]+\}-\{[^}]+\}-\{[^}]+\}-\{[^}]+\}-RG##").expect("valid regex")
});

static EXAMPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z]{3}-[A-Z]{3}-[A-Z]{4}-[A-Z]{3,10}-[A-Z]{3}-RG\d{2}\b").expect("valid regex")
});

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{3}-[A-Z]{3}-[A-Z]{4}-[A-Z]{3,10}-[A-Z]{3}-RG\d{2}$").expect("valid regex")
});

static BUSINESS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(GLB|OSS|IST|FMS|BRS|ENE|HCR|EDU|SPO|SEN)\b[ \t]*[:-]?[ \t]*([A-Z][a-z][A-Za-z ]*)")
        .expect("valid regex")
});

static REGION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(GLB|NAM|COE|LAM|APJ|MEA)\b[ \t]*[:-]?[ \t]*([A-Z][a-z][A-Za-z ]*)")
        .expect("valid regex")
});

static CLOUD_REGION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{4})\b[ \t]*[:-]?[ \t]*([A-Z][a-z][A-Za-z ]*)").expect("valid regex")
});

static ENVIRONMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(PRD|DEV|TST|STG|UAT|QAS)\b[ \t]*[:-]?[ \t]*([A-Z][a-z][A-Za-z ]*)")
        .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Code → description tables found in convention text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTable {
    pub business_lines: BTreeMap<String, String>,
    pub regions: BTreeMap<String, String>,
    pub cloud_regions: BTreeMap<String, String>,
    pub environments: BTreeMap<String, String>,
}

impl CodeTable {
    /// Later tables do not overwrite codes already known.
    pub fn merge(&mut self, other: CodeTable) {
        fn absorb(into: &mut BTreeMap<String, String>, from: BTreeMap<String, String>) {
            for (k, v) in from {
                into.entry(k).or_insert(v);
            }
        }
        absorb(&mut self.business_lines, other.business_lines);
        absorb(&mut self.regions, other.regions);
        absorb(&mut self.cloud_regions, other.cloud_regions);
        absorb(&mut self.environments, other.environments);
    }

    /// Fill empty tables with the global defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.business_lines.is_empty() {
            self.business_lines.insert("GLB".into(), "Global".into());
        }
        if self.regions.is_empty() {
            self.regions.insert("GLB".into(), "Global".into());
        }
        if self.environments.is_empty() {
            for (code, desc) in [("PRD", "Production"), ("DEV", "Development"), ("TST", "Test")] {
                self.environments.insert(code.into(), desc.into());
            }
        }
        self
    }

    /// Map an Azure region name to its cloud-region code, trying the
    /// extracted table before the fallback.
    pub fn cloud_region_code(&self, azure_region: &str) -> Option<String> {
        let needle = azure_region.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        if let Some((code, _)) = self
            .cloud_regions
            .iter()
            .find(|(_, desc)| desc.to_lowercase().contains(&needle))
        {
            debug!(region = azure_region, code, "region mapped from knowledge base");
            return Some(code.clone());
        }
        let code = REGION_FALLBACK
            .iter()
            .find(|(name, _)| *name == needle)
            .map(|(_, code)| (*code).to_string());
        if let Some(code) = &code {
            warn!(region = azure_region, code, "region mapped from fallback table");
        }
        code
    }
}

/// Everything recoverable from one block of convention text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingKnowledge {
    pub pattern: Option<String>,
    /// The pattern was spelled out literally rather than described.
    pub explicit_pattern: bool,
    pub examples: Vec<String>,
    pub codes: CodeTable,
}

/// Best-effort extraction; no match yields empty fields, never an error.
pub fn extract_naming_knowledge(text: &str) -> NamingKnowledge {
    let lower = text.to_lowercase();
    let (pattern, explicit_pattern) = match PATTERN_RE.find(text) {
        Some(m) => (Some(m.as_str().to_string()), true),
        None if lower.contains("business line") && lower.contains("cloud region") && lower.contains("rg") => {
            (Some(DESCRIPTIVE_PATTERN.to_string()), false)
        }
        None => (None, false),
    };

    let examples = EXAMPLE_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .take(MAX_EXAMPLES)
        .collect();

    let codes = CodeTable {
        business_lines: collect_codes(&BUSINESS_LINE_RE, text),
        regions: collect_codes(&REGION_RE, text),
        cloud_regions: collect_codes(&CLOUD_REGION_RE, text)
            .into_iter()
            .filter(|(_, desc)| is_geographic(desc))
            .collect(),
        environments: collect_codes(&ENVIRONMENT_RE, text),
    };

    NamingKnowledge {
        pattern,
        explicit_pattern,
        examples,
        codes,
    }
}

fn collect_codes(re: &Regex, text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for caps in re.captures_iter(text) {
        let desc = caps[2].trim();
        if !desc.is_empty() {
            out.entry(caps[1].to_string()).or_insert_with(|| desc.to_string());
        }
    }
    out
}

fn is_geographic(desc: &str) -> bool {
    desc.split_whitespace()
        .any(|w| GEO_WORDS.contains(&w.to_lowercase().as_str()))
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

/// The six segments of a resource-group name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroupName {
    pub business_line: String,
    pub region: String,
    pub cloud_region: String,
    pub project: String,
    pub environment: String,
    pub suffix: String,
}

/// Check `name` against `XXX-XXX-XXXX-PROJECT-XXX-RG##`.
pub fn validate_resource_group_name(name: &str) -> Result<ResourceGroupName> {
    if !NAME_RE.is_match(name) {
        return Err(ArchDocError::validation(format!(
            "'{name}' does not follow {DESCRIPTIVE_PATTERN}"
        )));
    }
    let segments: Vec<&str> = name.split('-').collect();
    let [bl, region, cloud, project, env, suffix] = segments.as_slice() else {
        return Err(ArchDocError::validation(format!(
            "expected 6 segments in '{name}', found {}",
            segments.len()
        )));
    };
    Ok(ResourceGroupName {
        business_line: (*bl).into(),
        region: (*region).into(),
        cloud_region: (*cloud).into(),
        project: (*project).into(),
        environment: (*env).into(),
        suffix: (*suffix).into(),
    })
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

type ConventionLookup = std::result::Result<Vec<RetrievedChunk>, String>;

/// [`NamingResolver`] backed by the same embedder and index as retrieval.
///
/// The convention lookup runs once per resolver; every environment of a run
/// shares its outcome.
#[derive(Debug, Clone)]
pub struct RagNamingResolver<E, K> {
    embedder: E,
    index: K,
    call_timeout: Duration,
    convention: OnceCell<ConventionLookup>,
}

impl<E: Embedder, K: KnowledgeIndex> RagNamingResolver<E, K> {
    pub fn new(embedder: E, index: K, call_timeout: Duration) -> Self {
        Self {
            embedder,
            index,
            call_timeout,
            convention: OnceCell::new(),
        }
    }

    async fn convention_chunks(&self) -> &ConventionLookup {
        self.convention
            .get_or_init(|| async { self.lookup_convention().await.map_err(|e| e.to_string()) })
            .await
    }

    async fn lookup_convention(&self) -> Result<Vec<RetrievedChunk>> {
        let vector = with_timeout("embedding", self.call_timeout, self.embedder.embed(CONVENTION_QUERY)).await?;
        let chunks = with_timeout(
            "hybrid search",
            self.call_timeout,
            self.index.hybrid_search(CONVENTION_QUERY, &vector, CONVENTION_TOP_K),
        )
        .await?;
        let total = chunks.len();
        let relevant: Vec<_> = chunks
            .into_iter()
            .filter(|c| {
                let lower = c.content.to_lowercase();
                RELEVANCE_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .take(MAX_CONVENTION_CHUNKS)
            .collect();
        debug!(total, relevant = relevant.len(), "naming convention chunks");
        Ok(relevant)
    }
}

/// Uppercased field, or `default` when blank.
fn code_or(value: &str, default: &str) -> String {
    let v = value.trim();
    if v.is_empty() { default.to_string() } else { v.to_uppercase() }
}

impl<E: Embedder, K: KnowledgeIndex> NamingResolver for RagNamingResolver<E, K> {
    #[instrument(skip_all, fields(project = %request.project_name, environment = %request.environment))]
    async fn resolve(&self, request: &NamingRequest) -> NamingArtifact {
        let chunks = match self.convention_chunks().await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "naming convention lookup failed");
                return NamingArtifact::failed(
                    format!("Resource group naming convention lookup failed: {e}"),
                    NamingValidation::default(),
                );
            }
        };

        if chunks.is_empty() {
            warn!("no resource group naming convention in knowledge index");
            return NamingArtifact::failed(
                "Resource group naming convention not found in knowledge index",
                NamingValidation {
                    query_executed: true,
                    ..Default::default()
                },
            );
        }

        let extracted: Vec<(&RetrievedChunk, NamingKnowledge)> = chunks
            .iter()
            .map(|c| (c, extract_naming_knowledge(&c.content)))
            .collect();

        let chosen = extracted
            .iter()
            .find(|(_, k)| k.explicit_pattern)
            .or_else(|| extracted.iter().find(|(_, k)| k.pattern.is_some()));
        let Some((source_chunk, knowledge)) = chosen else {
            warn!(chunks = chunks.len(), "naming pattern not extractable");
            return NamingArtifact::failed(
                "Could not extract the resource group naming pattern from retrieved documents",
                NamingValidation {
                    query_executed: true,
                    ..Default::default()
                },
            );
        };
        let pattern = knowledge.pattern.clone().unwrap_or_default();
        let source = NamingSource {
            file: source_chunk.title.clone(),
            section: SOURCE_SECTION.into(),
            examples: knowledge.examples.clone(),
        };

        let mut codes = CodeTable::default();
        for (_, k) in &extracted {
            codes.merge(k.codes.clone());
        }
        let codes = codes.with_defaults();

        let project = code_or(&request.project_name, "PROJECT");
        let business_line = code_or(&request.business_line, "GLB");
        let region = code_or(&request.region, "GLB");
        let environment = code_or(&request.environment, "PRD");
        let azure_region = if request.cloud_region.trim().is_empty() {
            "North Europe"
        } else {
            request.cloud_region.as_str()
        };

        let Some(cloud_code) = codes.cloud_region_code(azure_region) else {
            warn!(region = azure_region, "cloud region not mappable");
            return NamingArtifact {
                pattern: Some(pattern),
                source: Some(source),
                ..NamingArtifact::failed(
                    format!("Could not map Azure region '{azure_region}' to a cloud region code"),
                    NamingValidation {
                        query_executed: true,
                        convention_found: true,
                        ..Default::default()
                    },
                )
            };
        };

        let mut errors = Vec::new();
        if business_line != "GLB" && !codes.business_lines.contains_key(&business_line) {
            errors.push(format!("Business line '{business_line}' not found in extracted codes"));
        }
        if region != "GLB" && !codes.regions.contains_key(&region) {
            errors.push(format!("Region '{region}' not found in extracted codes"));
        }
        if !codes.environments.contains_key(&environment) {
            errors.push(format!("Environment '{environment}' not found in extracted codes"));
        }

        let name = format!("{business_line}-{region}-{cloud_code}-{project}-{environment}-RG01");
        let name_check = validate_resource_group_name(&name);
        let describe = |table: &BTreeMap<String, String>, code: &str, default: &str| {
            table.get(code).cloned().unwrap_or_else(|| default.to_string())
        };
        let components = BTreeMap::from([
            (
                "business_line".to_string(),
                NamingComponent {
                    description: describe(&codes.business_lines, &business_line, "Global"),
                    value: business_line,
                },
            ),
            (
                "region".to_string(),
                NamingComponent {
                    description: describe(&codes.regions, &region, "Global"),
                    value: region,
                },
            ),
            (
                "cloud_region".to_string(),
                NamingComponent {
                    description: describe(&codes.cloud_regions, &cloud_code, azure_region),
                    value: cloud_code,
                },
            ),
            (
                "project".to_string(),
                NamingComponent {
                    description: format!("{project} Project"),
                    value: project,
                },
            ),
            (
                "environment".to_string(),
                NamingComponent {
                    description: describe(&codes.environments, &environment, &environment),
                    value: environment,
                },
            ),
            (
                "suffix".to_string(),
                NamingComponent {
                    value: "RG01".into(),
                    description: "Resource Group 01".into(),
                },
            ),
        ]);

        if let Err(e) = name_check {
            warn!(name = %name, error = %e, "resolved name breaks the naming pattern");
            errors.push(e.to_string());
            return NamingArtifact {
                pattern: Some(pattern),
                components,
                source: Some(source),
                ..NamingArtifact::failed(
                    format!("Resolved resource group name '{name}' does not follow the naming pattern"),
                    NamingValidation {
                        query_executed: true,
                        convention_found: true,
                        all_codes_validated: false,
                        errors,
                    },
                )
            };
        }

        info!(name = %name, codes_valid = errors.is_empty(), "resource group name resolved");
        NamingArtifact {
            name: Some(name),
            error: None,
            pattern: Some(pattern),
            components,
            source: Some(source),
            validation: NamingValidation {
                query_executed: true,
                convention_found: true,
                all_codes_validated: errors.is_empty(),
                errors,
            },
        }
    }
}
