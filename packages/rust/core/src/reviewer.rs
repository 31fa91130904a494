//! Section reviewer: deterministic structural checks, then (only when no
//! critical issue was found) a model-assisted quality review.
//!
//! Automated penalties are tracked in whole points out of 100 so that
//! threshold comparisons are exact.

use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use archdoc_shared::{
    IssueCategory, RagDomain, Result, SectionValidation, Severity, ValidationIssue,
    ValidationMethod,
};

use crate::prompts::PromptLibrary;
use crate::retrieval::RetrievalReport;
use crate::schema::SectionSchema;
use crate::services::{GenerationRequest, TextGenerator, with_timeout};

/// Minimum score for a valid section.
pub const VALID_SCORE: f64 = 0.6;
/// Neutral model score used when the review layout cannot be parsed.
pub const NEUTRAL_MODEL_SCORE: f64 = 0.7;

const AUTOMATED_WEIGHT: f64 = 0.6;
const MODEL_WEIGHT: f64 = 0.4;
const MIN_LENGTH: usize = 500;

const PENALTY_TOO_SHORT: i32 = 30;
const PENALTY_TOO_LONG: i32 = 10;
const PENALTY_PARAGRAPHS: i32 = 20;
const PENALTY_TABLE: i32 = 20;
const PENALTY_DIAGRAM: i32 = 15;
const PENALTY_NOT_FOUND: i32 = 25;
const PENALTY_VAGUE: i32 = 5;
const PENALTY_CITATION: i32 = 15;

const VAGUE_PHRASES: [&str; 5] = [
    "will be established",
    "will be defined",
    "to be determined",
    "following best practices",
    "per standards",
];

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|[^\n]+\|[^\n]+\n\|[-:\s|]+\|").expect("valid regex"));

static RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*\**VALIDATION RESULT:?\**\s*:?\s*\[?(PASS|FAIL)").expect("valid regex")
});

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*\**SCORE:?\**\s*:?\s*([0-9]*\.?[0-9]+)").expect("valid regex"));

static ISSUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-\s*\[(\w+)\]\s*(.+?)(?:\s*\(([^()]+)\))?$").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Automated checks
// ---------------------------------------------------------------------------

/// Result of the deterministic phase.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomatedReview {
    pub score: f64,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
}

impl AutomatedReview {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_critical)
    }

    pub fn into_validation(self) -> SectionValidation {
        let valid = !self.has_critical() && self.score >= VALID_SCORE;
        SectionValidation {
            valid,
            score: self.score,
            issues: self.issues,
            recommendations: self.recommendations,
            automated_score: self.score,
            model_score: None,
            method: ValidationMethod::Automated,
        }
    }
}

/// Run the structural checks against `schema`.
pub fn automated_checks(
    content: &str,
    schema: &SectionSchema,
    retrieval: &RetrievalReport,
) -> AutomatedReview {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    let mut points: i32 = 100;
    let lower = content.to_lowercase();
    let length = content.chars().count();

    if length < MIN_LENGTH {
        issues.push(ValidationIssue::new(
            IssueCategory::Structural,
            Severity::Critical,
            format!("Section too short ({length} chars); at least {MIN_LENGTH} expected"),
            "overall",
        ));
        points -= PENALTY_TOO_SHORT;
    }

    if length > schema.max_length {
        issues.push(ValidationIssue::new(
            IssueCategory::Structural,
            Severity::Minor,
            format!("Section exceeds maximum length ({length} > {})", schema.max_length),
            "overall",
        ));
        points -= PENALTY_TOO_LONG;
    }

    let paragraphs = count_paragraphs(content);
    if paragraphs < schema.min_paragraphs {
        issues.push(ValidationIssue::new(
            IssueCategory::Structural,
            Severity::Major,
            format!(
                "Insufficient paragraphs ({paragraphs} found, {} required)",
                schema.min_paragraphs
            ),
            "overall",
        ));
        points -= PENALTY_PARAGRAPHS;
    }

    if !schema.required_tables.is_empty() && !TABLE_RE.is_match(content) {
        issues.push(ValidationIssue::new(
            IssueCategory::Structural,
            Severity::Critical,
            format!(
                "Required table(s) missing: {}",
                schema.required_tables.join(", ")
            ),
            "tables",
        ));
        points -= PENALTY_TABLE;
    }

    if schema.requires_diagram && !lower.contains("```mermaid") {
        issues.push(ValidationIssue::new(
            IssueCategory::Structural,
            Severity::Major,
            "Required Mermaid diagram not found",
            "diagrams",
        ));
        points -= PENALTY_DIAGRAM;
    }

    for domain in schema.required_rag_domains {
        if !retrieval.is_found(*domain) && !discloses_not_found(&lower, *domain) {
            issues.push(ValidationIssue::new(
                IssueCategory::Rag,
                Severity::Critical,
                format!(
                    "Knowledge domain '{}' was not found, but the section does not state this explicitly",
                    domain.id()
                ),
                "rag_compliance",
            ));
            points -= PENALTY_NOT_FOUND;
        }
    }

    for phrase in VAGUE_PHRASES {
        if lower.contains(phrase) {
            recommendations.push(format!(
                "Generic phrase '{phrase}' detected; replace it with concrete details"
            ));
            points -= PENALTY_VAGUE;
        }
    }

    if !schema.required_rag_domains.is_empty() && !lower.contains("source:") {
        issues.push(ValidationIssue::new(
            IssueCategory::Rag,
            Severity::Major,
            "No source citations found for knowledge-based content",
            "citations",
        ));
        points -= PENALTY_CITATION;
    }

    let score = f64::from(points.clamp(0, 100)) / 100.0;
    AutomatedReview {
        score,
        issues,
        recommendations,
    }
}

/// Non-empty blocks separated by blank lines that are not headings.
fn count_paragraphs(content: &str) -> usize {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.starts_with('#'))
        .count()
}

/// A line must say "not found" and name the domain (id, subdomain or label).
fn discloses_not_found(lower_content: &str, domain: RagDomain) -> bool {
    let id = domain.id();
    let label = domain.label();
    lower_content.lines().any(|line| {
        line.contains("not found")
            && (line.contains(&id) || line.contains(domain.subdomain()) || line.contains(&label))
    })
}

// ---------------------------------------------------------------------------
// Model review
// ---------------------------------------------------------------------------

/// Parsed model-assisted verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReview {
    pub passed: bool,
    pub score: f64,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
}

impl ModelReview {
    /// Stand-in verdict when the review text is unusable.
    pub fn neutral() -> Self {
        Self {
            passed: true,
            score: NEUTRAL_MODEL_SCORE,
            issues: Vec::new(),
            recommendations: vec!["Model review could not be parsed; neutral score applied".into()],
        }
    }
}

/// Parse the fixed review layout permissively.
///
/// Returns `None` when neither a result line nor a score line is present.
pub fn parse_review(text: &str) -> Option<ModelReview> {
    let verdict = RESULT_RE
        .captures(text)
        .map(|c| c[1].eq_ignore_ascii_case("PASS"));
    let score = SCORE_RE
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|s| s.clamp(0.0, 1.0));

    if verdict.is_none() && score.is_none() {
        return None;
    }

    #[derive(PartialEq)]
    enum Block {
        Preamble,
        Issues,
        Recommendations,
    }

    let mut block = Block::Preamble;
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        let upper = line.trim_start_matches('*').to_ascii_uppercase();
        if upper.starts_with("ISSUES") {
            block = Block::Issues;
            continue;
        }
        if upper.starts_with("RECOMMENDATIONS") {
            block = Block::Recommendations;
            continue;
        }
        if !line.starts_with('-') {
            continue;
        }
        match block {
            Block::Issues => {
                if let Some(c) = ISSUE_RE.captures(line) {
                    issues.push(ValidationIssue::new(
                        IssueCategory::Content,
                        Severity::parse_lenient(&c[1]),
                        c[2].trim(),
                        c.get(3).map_or("general", |m| m.as_str().trim()),
                    ));
                }
            }
            Block::Recommendations => {
                let rec = line.trim_start_matches('-').trim();
                if !rec.is_empty() {
                    recommendations.push(rec.to_string());
                }
            }
            Block::Preamble => {}
        }
    }

    Some(ModelReview {
        passed: verdict.unwrap_or(true),
        score: score.unwrap_or(NEUTRAL_MODEL_SCORE),
        issues,
        recommendations,
    })
}

/// Merge both phases: `0.6 × automated + 0.4 × model`.
pub fn combine(automated: AutomatedReview, model: ModelReview) -> SectionValidation {
    let score = AUTOMATED_WEIGHT * automated.score + MODEL_WEIGHT * model.score;
    let mut issues = automated.issues;
    issues.extend(model.issues);
    let mut recommendations = automated.recommendations;
    recommendations.extend(model.recommendations);
    let valid = !issues.iter().any(ValidationIssue::is_critical) && score >= VALID_SCORE;

    SectionValidation {
        valid,
        score,
        issues,
        recommendations,
        automated_score: automated.score,
        model_score: Some(model.score),
        method: ValidationMethod::Combined,
    }
}

// ---------------------------------------------------------------------------
// Reviewer service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SectionReviewer {
    prompts: PromptLibrary,
    temperature: f32,
    max_tokens: u32,
    call_timeout: Duration,
}

impl SectionReviewer {
    pub fn new(prompts: PromptLibrary, temperature: f32, max_tokens: u32, call_timeout: Duration) -> Self {
        Self {
            prompts,
            temperature,
            max_tokens,
            call_timeout,
        }
    }

    /// Validate one section draft.
    ///
    /// A failing model call is returned as an error so the caller can retry;
    /// an unparseable review degrades to a neutral pass.
    #[instrument(skip_all, fields(section = %schema.id, chars = content.len()))]
    pub async fn review<G: TextGenerator>(
        &self,
        generator: &G,
        content: &str,
        schema: &SectionSchema,
        retrieval: &RetrievalReport,
    ) -> Result<SectionValidation> {
        let automated = automated_checks(content, schema, retrieval);
        if automated.has_critical() {
            debug!(
                score = automated.score,
                issues = automated.issues.len(),
                "critical structural issues, skipping model review"
            );
            return Ok(automated.into_validation());
        }

        let request = self.build_request(content, schema, retrieval);
        let text = with_timeout(&request.label, self.call_timeout, generator.generate(&request)).await?;
        let model = parse_review(&text).unwrap_or_else(|| {
            warn!(section = %schema.id, "review layout not recognised, applying neutral score");
            ModelReview::neutral()
        });

        let validation = combine(automated, model);
        info!(
            valid = validation.valid,
            score = validation.score,
            issues = validation.issues.len(),
            "section reviewed"
        );
        Ok(validation)
    }

    pub fn build_request(
        &self,
        content: &str,
        schema: &SectionSchema,
        retrieval: &RetrievalReport,
    ) -> GenerationRequest {
        let system = self
            .prompts
            .reviewer()
            .unwrap_or(BUILTIN_REVIEWER_INSTRUCTIONS)
            .to_string();

        let mut user = format!("SECTION TO REVIEW: {}\n\nSECTION REQUIREMENTS:\n", schema.title);
        let artifacts: Vec<&str> = schema.required_artifacts.iter().map(|a| a.as_str()).collect();
        let domains: Vec<String> = schema.required_rag_domains.iter().map(|d| d.id()).collect();
        let _ = writeln!(user, "- Required artifacts: {}", or_none(&artifacts.join(", ")));
        let _ = writeln!(user, "- Required tables: {}", or_none(&schema.required_tables.join(", ")));
        let _ = writeln!(user, "- Required knowledge domains: {}", or_none(&domains.join(", ")));
        let _ = writeln!(user, "- Minimum paragraphs: {}", schema.min_paragraphs);
        let _ = writeln!(user, "- Requires Mermaid diagram: {}", schema.requires_diagram);

        user.push_str("\nKNOWLEDGE AVAILABILITY:\n");
        if schema.required_rag_domains.is_empty() {
            user.push_str("No retrieved knowledge required for this section.\n");
        }
        for domain in schema.required_rag_domains {
            let status = if retrieval.is_found(*domain) { "FOUND" } else { "NOT FOUND" };
            let _ = writeln!(user, "- {}: {status}", domain.id());
        }
        let _ = write!(
            user,
            "\nSECTION CONTENT TO REVIEW:\n---\n{content}\n---\n\nAssess this section against every criterion."
        );

        GenerationRequest {
            label: format!("review:{}", schema.id),
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn or_none(s: &str) -> &str {
    if s.is_empty() { "none" } else { s }
}

const BUILTIN_REVIEWER_INSTRUCTIONS: &str = "You are a senior technical reviewer validating one \
section of a Technical Architecture Document.

Check content quality, completeness of required artifacts and tables, use of concrete values, \
correct citation of retrieved standards, explicit disclosure of standards that were not found, \
and technical soundness of the Azure design.

Answer in exactly this layout:
VALIDATION RESULT: PASS or FAIL
SCORE: a number between 0.0 and 1.0
ISSUES:
- [CRITICAL|MAJOR|MINOR] description (location)
RECOMMENDATIONS:
- recommendation text

Only mark an issue CRITICAL when it makes the section unusable.";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use archdoc_shared::{RetrievalDomainResult, SectionId};

    use crate::fakes::{ScriptedGenerator, TABLE_SNIPPET, passing_section};
    use crate::schema;

    fn reviewer() -> SectionReviewer {
        SectionReviewer::new(PromptLibrary::builtin(), 0.2, 2000, Duration::from_secs(5))
    }

    fn all_found() -> RetrievalReport {
        let results = crate::retrieval::TAXONOMY
            .iter()
            .map(|(domain, _)| {
                (
                    *domain,
                    RetrievalDomainResult {
                        domain: *domain,
                        found: true,
                        query: String::new(),
                        chunks: vec![],
                        top_score: 0.9,
                        source_files: vec!["handbook.pdf".into()],
                        error: None,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();
        RetrievalReport { results }
    }

    #[test]
    fn short_content_without_table_or_diagram_fails_hard() {
        // Component decomposition requires a table and a diagram.
        let s = schema::schema(SectionId::ComponentDecomposition);
        let content = format!("### {}\n\n{}\n\n{}", s.title, "a".repeat(190), "b".repeat(190));
        assert!(content.len() < 500);

        let review = automated_checks(&content, s, &RetrievalReport::default());
        let v = review.clone().into_validation();
        assert!(!v.valid);
        assert!(v.has_critical());
        // too short (-0.3), table (-0.2), diagram (-0.15)
        assert!((review.score - 0.35).abs() < 1e-9);
        assert!(review.score <= VALID_SCORE - 0.2);
        assert_eq!(v.method, ValidationMethod::Automated);
    }

    #[test]
    fn passing_content_has_no_issues() {
        for s in schema::section_order() {
            let review = automated_checks(&passing_section(s), s, &RetrievalReport::default());
            assert!(review.issues.is_empty(), "{}: {:?}", s.id, review.issues);
            assert!((review.score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_not_found_disclosure_is_critical_per_domain() {
        let s = schema::schema(SectionId::NetworkConfiguration);
        let content = passing_section(s)
            .lines()
            .filter(|l| !l.contains("not found"))
            .collect::<Vec<_>>()
            .join("\n");

        let review = automated_checks(&content, s, &RetrievalReport::default());
        let rag_critical: Vec<_> = review
            .issues
            .iter()
            .filter(|i| i.category == IssueCategory::Rag && i.is_critical())
            .collect();
        assert_eq!(rag_critical.len(), 3);
        assert!((review.score - 0.25).abs() < 1e-9);

        // Same text is fine when the knowledge was retrieved.
        let found = automated_checks(&content, s, &all_found());
        assert!(!found.has_critical());
    }

    #[test]
    fn disclosure_accepts_human_label() {
        let s = schema::schema(SectionId::DataManagement);
        let content = passing_section(s).replace(
            "Standard naming.storage not found in the knowledge index.",
            "The Storage naming convention was not found in the governance index.",
        );
        let review = automated_checks(&content, s, &RetrievalReport::default());
        assert!(!review.has_critical(), "{:?}", review.issues);
    }

    #[test]
    fn vague_phrases_and_missing_citations_penalise() {
        let s = schema::schema(SectionId::Hosting);
        let content = passing_section(s)
            .replace("Source: Cloud Governance Handbook, Section 4", "Owners to be determined.")
            + "\n\nAccess rules will be defined later.";
        let review = automated_checks(&content, s, &RetrievalReport::default());
        assert_eq!(review.recommendations.len(), 2);
        let citation = review
            .issues
            .iter()
            .find(|i| i.location == "citations")
            .unwrap();
        assert_eq!(citation.severity, Severity::Major);
        assert!((review.score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn table_missing_reported_once() {
        let s = schema::schema(SectionId::Hosting);
        let content = passing_section(s).replace(TABLE_SNIPPET, "No tables yet.");
        let review = automated_checks(&content, s, &RetrievalReport::default());
        let table_issues: Vec<_> = review.issues.iter().filter(|i| i.location == "tables").collect();
        assert_eq!(table_issues.len(), 1);
        assert!(table_issues[0].description.contains("resource_groups, tags"));
    }

    #[test]
    fn parses_review_layout() {
        let text = "VALIDATION RESULT: FAIL\nSCORE: 0.55\nISSUES:\n\
                    - [CRITICAL] Resource group names are invented (Resource Groups)\n\
                    - [Major] Tag table lacks owner tag\n\
                    - [blocker] Odd severity (Tags)\n\
                    RECOMMENDATIONS:\n- Use the pre-generated names\n- Add the owner tag\n";
        let review = parse_review(text).unwrap();
        assert!(!review.passed);
        assert!((review.score - 0.55).abs() < 1e-9);
        assert_eq!(review.issues.len(), 3);
        assert_eq!(review.issues[0].severity, Severity::Critical);
        assert_eq!(review.issues[0].description, "Resource group names are invented");
        assert_eq!(review.issues[0].location, "Resource Groups");
        assert_eq!(review.issues[0].category, IssueCategory::Content);
        assert_eq!(review.issues[1].location, "general");
        assert_eq!(review.issues[2].severity, Severity::Minor);
        assert_eq!(review.recommendations, vec!["Use the pre-generated names", "Add the owner tag"]);
    }

    #[test]
    fn score_is_clamped_and_garbage_is_rejected() {
        let review = parse_review("VALIDATION RESULT: PASS\nSCORE: 7.5").unwrap();
        assert!(review.passed);
        assert!((review.score - 1.0).abs() < 1e-9);

        assert!(parse_review("Looks great to me!").is_none());
    }

    #[test]
    fn combined_score_weights_phases() {
        let automated = AutomatedReview {
            score: 0.9,
            issues: vec![],
            recommendations: vec!["auto".into()],
        };
        let model = ModelReview {
            passed: true,
            score: 0.5,
            issues: vec![ValidationIssue::new(
                IssueCategory::Content,
                Severity::Minor,
                "wordy",
                "general",
            )],
            recommendations: vec!["model".into()],
        };
        let v = combine(automated, model);
        assert!((v.score - 0.74).abs() < 1e-9);
        assert!(v.valid);
        assert_eq!(v.model_score, Some(0.5));
        assert_eq!(v.recommendations, vec!["auto", "model"]);
        assert_eq!(v.method, ValidationMethod::Combined);
    }

    #[tokio::test]
    async fn unparseable_review_degrades_to_neutral_pass() {
        let generator = ScriptedGenerator::new()
            .script_reviews(SectionId::Assumptions, vec![Ok("I cannot comply.".into())]);
        let s = schema::schema(SectionId::Assumptions);
        let v = reviewer()
            .review(&generator, &passing_section(s), s, &RetrievalReport::default())
            .await
            .unwrap();
        assert!(v.valid);
        assert_eq!(v.model_score, Some(NEUTRAL_MODEL_SCORE));
        assert!((v.score - (0.6 + 0.4 * NEUTRAL_MODEL_SCORE)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn critical_issue_skips_model_call() {
        let generator = ScriptedGenerator::new();
        let s = schema::schema(SectionId::Risks);
        let v = reviewer()
            .review(&generator, "too short", s, &RetrievalReport::default())
            .await
            .unwrap();
        assert!(!v.valid);
        assert!(generator.requests().is_empty());
    }

    #[tokio::test]
    async fn failing_model_call_propagates() {
        let generator = ScriptedGenerator::new()
            .script_reviews(SectionId::Risks, vec![Err("rate limited".into())]);
        let s = schema::schema(SectionId::Risks);
        let err = reviewer()
            .review(&generator, &passing_section(s), s, &RetrievalReport::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn review_request_lists_availability() {
        let s = schema::schema(SectionId::Hosting);
        let req = reviewer().build_request("body", s, &RetrievalReport::default());
        assert_eq!(req.label, "review:hosting");
        assert!(req.user.contains("- naming.resource_groups: NOT FOUND"));
        assert!(req.user.contains("---\nbody\n---"));
        assert!(req.system.contains("VALIDATION RESULT"));
    }
}
