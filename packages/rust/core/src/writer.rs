//! Section writer: builds the generation request for one section attempt
//! and returns the raw generated text. No validation happens here.

use std::fmt::Write as _;
use std::time::Duration;

use tracing::{debug, instrument};

use archdoc_shared::{
    EnvironmentNaming, ProjectContext, Result, SectionValidation, ValidationIssue,
};

use crate::prompts::PromptLibrary;
use crate::retrieval::RetrievalReport;
use crate::schema::SectionSchema;
use crate::services::{GenerationRequest, TextGenerator, with_timeout};

/// Chunks quoted per found domain.
const CHUNKS_PER_DOMAIN: usize = 3;
/// Characters quoted per chunk.
const CHUNK_EXCERPT_CHARS: usize = 500;

/// Reviewer findings carried into the next attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feedback {
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
}

impl Feedback {
    /// Critical issues and all recommendations of a failed validation.
    pub fn from_validation(validation: &SectionValidation) -> Self {
        Self {
            issues: validation.critical_issues().cloned().collect(),
            recommendations: validation.recommendations.clone(),
        }
    }
}

/// Everything the writer needs for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct WriterInput<'a> {
    pub schema: &'a SectionSchema,
    pub context: &'a ProjectContext,
    pub retrieval: &'a RetrievalReport,
    pub naming: &'a [EnvironmentNaming],
    pub feedback: Option<&'a Feedback>,
}

#[derive(Debug, Clone)]
pub struct SectionWriter {
    prompts: PromptLibrary,
    temperature: f32,
    max_tokens: u32,
    call_timeout: Duration,
}

impl SectionWriter {
    pub fn new(prompts: PromptLibrary, temperature: f32, max_tokens: u32, call_timeout: Duration) -> Self {
        Self {
            prompts,
            temperature,
            max_tokens,
            call_timeout,
        }
    }

    /// Generate the section text. Collaborator faults propagate unchanged.
    #[instrument(skip_all, fields(section = %input.schema.id, retry = input.feedback.is_some()))]
    pub async fn write<G: TextGenerator>(&self, generator: &G, input: WriterInput<'_>) -> Result<String> {
        let request = self.build_request(input);
        debug!(prompt_chars = request.user.len(), "requesting section draft");
        with_timeout(&request.label, self.call_timeout, generator.generate(&request)).await
    }

    pub fn build_request(&self, input: WriterInput<'_>) -> GenerationRequest {
        let system = self
            .prompts
            .writer(input.schema.id)
            .map(str::to_string)
            .unwrap_or_else(|| generic_instructions(input.schema));

        GenerationRequest {
            label: format!("draft:{}", input.schema.id),
            system,
            user: user_prompt(input),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt assembly
// ---------------------------------------------------------------------------

fn generic_instructions(schema: &SectionSchema) -> String {
    let artifacts: Vec<&str> = schema.required_artifacts.iter().map(|a| a.as_str()).collect();
    let domains: Vec<String> = schema.required_rag_domains.iter().map(|d| d.id()).collect();

    format!(
        "You are a senior cloud architect writing the \"{title}\" section of a Technical \
Architecture Document.

SECTION PURPOSE:
{description}

REQUIRED ARTIFACTS:
{artifacts}

REQUIRED TABLES:
{tables}

REQUIRED KNOWLEDGE DOMAINS:
{domains}

STRUCTURE:
- At least {min_paragraphs} paragraphs
- At most {max_length} characters
- Mermaid diagram required: {diagram}
- Subsections: {subsections}

RULES:
1. Use only standards present in the retrieved knowledge.
2. When a standard was not retrieved, state \"<domain> not found in knowledge index\".
3. Never invent naming conventions or resource names; use the pre-generated names.
4. Cite every governance element as [Source: document, section].
5. Output Markdown; tables in GitHub format; diagrams as ```mermaid blocks.",
        title = schema.title,
        description = schema.description,
        artifacts = bullet_list(&artifacts),
        tables = bullet_list(schema.required_tables),
        domains = bullet_list(&domains),
        min_paragraphs = schema.min_paragraphs,
        max_length = schema.max_length,
        diagram = if schema.requires_diagram { "yes" } else { "no" },
        subsections = if schema.subsections.is_empty() {
            "none".to_string()
        } else {
            schema.subsections.join(", ")
        },
    )
}

fn user_prompt(input: WriterInput<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PROJECT CONTEXT:\n{}", format_context(input.context));
    let _ = writeln!(
        out,
        "RETRIEVED STANDARDS:\n{}",
        format_retrieval(input.schema, input.retrieval)
    );
    let _ = writeln!(out, "PRE-GENERATED NAMING ARTIFACTS:\n{}", format_naming(input.naming));
    if let Some(feedback) = input.feedback {
        let _ = writeln!(
            out,
            "FEEDBACK FROM PREVIOUS ATTEMPT (must be corrected):\n{}",
            format_feedback(feedback)
        );
    }
    let _ = write!(
        out,
        "Write the {} section now, with every required artifact, table and subsection.",
        input.schema.title
    );
    out
}

fn format_context(ctx: &ProjectContext) -> String {
    let p = &ctx.project;
    let i = &ctx.infrastructure;
    let mut out = format!(
        "Project Name: {}\nProject Acronym: {}\nDescription: {}\nBusiness Line: {}\nRegion: {}\n",
        p.full_name, p.name, p.description, p.business_line, p.region
    );
    let _ = writeln!(
        out,
        "Infrastructure:\n- Cloud Provider: {}\n- Primary Region: {}\n- Environments: {}\n- High Availability: {}\n- Disaster Recovery: {}",
        i.cloud_provider,
        i.primary_region,
        i.environments.join(", "),
        i.high_availability,
        i.disaster_recovery
    );
    if let Some(secondary) = &i.secondary_region {
        let _ = writeln!(out, "- Secondary Region: {secondary}");
    }
    let r = &ctx.requirements;
    for (label, items) in [
        ("Functional Requirements", &r.functional),
        ("Non-Functional Requirements", &r.non_functional),
        ("Constraints", &r.constraints),
        ("Assumptions", &r.assumptions),
        ("Risks", &r.risks),
    ] {
        if !items.is_empty() {
            let _ = writeln!(out, "{label}:\n{}", bullet_list(items));
        }
    }
    if !ctx.stakeholders.is_empty() {
        let people: Vec<String> = ctx
            .stakeholders
            .iter()
            .map(|s| format!("{} ({})", s.name, s.role))
            .collect();
        let _ = writeln!(out, "Stakeholders:\n{}", bullet_list(&people));
    }
    out
}

fn format_retrieval(schema: &SectionSchema, retrieval: &RetrievalReport) -> String {
    if schema.required_rag_domains.is_empty() {
        return "No specific standards required for this section.\n".to_string();
    }

    let mut out = String::new();
    for domain in schema.required_rag_domains {
        let _ = writeln!(out, "### {}", domain.id());
        match retrieval.get(*domain) {
            Some(result) if result.found => {
                let _ = writeln!(out, "Status: FOUND");
                let _ = writeln!(out, "Sources: {}", result.source_files.join(", "));
                for (i, chunk) in result.chunks.iter().take(CHUNKS_PER_DOMAIN).enumerate() {
                    let excerpt: String = chunk.content.chars().take(CHUNK_EXCERPT_CHARS).collect();
                    let _ = writeln!(out, "Chunk {} [{}]:\n{excerpt}", i + 1, chunk.title);
                }
            }
            Some(result) => {
                let _ = writeln!(out, "Status: NOT FOUND");
                let _ = writeln!(
                    out,
                    "Error: {}",
                    result.error.as_deref().unwrap_or("not found")
                );
            }
            None => {
                let _ = writeln!(out, "Status: NOT FOUND\nError: domain was not queried");
            }
        }
        out.push('\n');
    }
    out
}

fn format_naming(naming: &[EnvironmentNaming]) -> String {
    if naming.is_empty() {
        return "No pre-generated naming artifacts available.\n".to_string();
    }
    let mut out = String::new();
    for entry in naming {
        let key = entry.key.to_uppercase();
        let artifact = &entry.artifact;
        match (&artifact.name, &artifact.error) {
            (Some(name), _) => {
                let _ = writeln!(out, "{key}:\n  Name: {name}");
                if let Some(pattern) = &artifact.pattern {
                    let _ = writeln!(out, "  Pattern: {pattern}");
                }
                if let Some(source) = &artifact.source {
                    let _ = writeln!(out, "  Source: {}", source.file);
                }
            }
            (None, error) => {
                let _ = writeln!(
                    out,
                    "{key}: UNRESOLVED ({})",
                    error.as_deref().unwrap_or("no name produced")
                );
            }
        }
    }
    out
}

fn format_feedback(feedback: &Feedback) -> String {
    let mut out = String::new();
    if !feedback.issues.is_empty() {
        out.push_str("Issues to fix:\n");
        for issue in &feedback.issues {
            let _ = writeln!(out, "- [{}] {}", issue.severity.as_upper(), issue.description);
        }
    }
    if !feedback.recommendations.is_empty() {
        out.push_str("Recommendations:\n");
        for rec in &feedback.recommendations {
            let _ = writeln!(out, "- {rec}");
        }
    }
    out
}

fn bullet_list<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        return "- none".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}
