//! Document assembler and run-artifact writer.
//!
//! Turns per-section content into the final Markdown document and writes a
//! run's outputs to disk.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use archdoc_shared::{
    ArchDocError, CURRENT_SCHEMA_VERSION, Completeness, PipelineResult, ProjectContext, Result,
    RetrievalCoverage, RunId, RunMetadata, RunStatus, SectionId, SectionRecord, SectionValidation,
};

use crate::schema;

const DOCUMENT_VERSION: &str = "1.0";
const SEPARATOR: &str = "\n---\n";
const REVIEW_SCORE_TARGET: f64 = 0.8;

/// Everything the document body and trailing report are built from.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    pub context: &'a ProjectContext,
    pub sections: &'a BTreeMap<SectionId, String>,
    pub validations: &'a BTreeMap<SectionId, SectionValidation>,
    pub records: &'a [SectionRecord],
    pub coverage: &'a RetrievalCoverage,
    pub generated_at: DateTime<Utc>,
}

/// Header, sections in registry order, then the validation report.
///
/// Output order depends only on the registry, never on the order in which
/// sections were generated.
pub fn assemble_document(input: &AssemblyInput<'_>) -> String {
    let mut parts = vec![
        "# Technical Architecture Document".to_string(),
        format!("## {}", input.context.project.full_name),
        format!("\n**Document Version:** {DOCUMENT_VERSION}"),
        format!(
            "**Generated:** {}",
            input.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        "**Status:** Draft for Review".to_string(),
        SEPARATOR.to_string(),
    ];

    for s in schema::section_order() {
        if let Some(content) = input.sections.get(&s.id) {
            parts.push(content.clone());
            parts.push(SEPARATOR.to_string());
        }
    }

    parts.push(validation_report(input));
    parts.join("\n")
}

fn validation_report(input: &AssemblyInput<'_>) -> String {
    let coverage = input.coverage;
    let mut out = String::from("## Document Validation Report\n\n");
    out.push_str(
        "This section records how the document was generated and how each section scored.\n\n",
    );

    out.push_str("### Knowledge Base Coverage\n\n");
    let _ = writeln!(
        out,
        "**Coverage Score:** {:.1}%\n",
        coverage.coverage_score * 100.0
    );
    if !coverage.found.is_empty() {
        out.push_str("**Standards Retrieved from Knowledge Base:**\n");
        for domain in &coverage.found {
            let _ = writeln!(out, "- ✅ {domain}");
        }
    }
    if !coverage.missing.is_empty() {
        out.push_str("\n**Standards Not Found in Knowledge Base:**\n");
        for domain in &coverage.missing {
            let _ = writeln!(out, "- ❌ {domain}");
        }
        out.push_str(
            "\n**Action Required:** Upload the missing standard documents to the knowledge base \
             and re-run the indexer.\n",
        );
    }

    out.push_str("\n### Section Quality Scores\n\n");
    out.push_str("| Section | Valid | Score | Attempts | Issues |\n");
    out.push_str("|---------|-------|-------|----------|--------|\n");
    let attempts: BTreeMap<SectionId, u32> =
        input.records.iter().map(|r| (r.id, r.attempts)).collect();
    for s in schema::section_order() {
        let Some(v) = input.validations.get(&s.id) else {
            continue;
        };
        let _ = writeln!(
            out,
            "| {} | {} | {:.2} | {} | {} |",
            s.title,
            if v.valid { "✅" } else { "❌" },
            v.score,
            attempts.get(&s.id).copied().unwrap_or(0),
            v.issues.len()
        );
    }

    let critical: Vec<String> = schema::section_order()
        .iter()
        .filter_map(|s| input.validations.get(&s.id).map(|v| (s.id, v)))
        .flat_map(|(id, v)| {
            v.critical_issues()
                .map(move |i| format!("{id}: {}", i.description))
        })
        .collect();
    if !critical.is_empty() {
        out.push_str("\n### Critical Issues Detected\n\n");
        for line in critical {
            let _ = writeln!(out, "- ⚠️ {line}");
        }
    }

    out.push_str("\n### Recommendations\n\n");
    let _ = writeln!(
        out,
        "1. Review sections scoring below {REVIEW_SCORE_TARGET:.1} for potential improvements"
    );
    out.push_str("2. Upload missing standard documents to improve knowledge base coverage\n");
    out.push_str("3. Validate all generated names against organizational standards\n");
    out.push_str("4. Have the architecture review board approve before implementation\n");
    out
}

/// Report returned instead of a document when requirements are incomplete.
pub fn incomplete_report(completeness: &Completeness) -> String {
    let mut out = String::from("# Requirements Incomplete\n\n");
    out.push_str(
        "The provided requirements are incomplete and cannot be used to generate a document.\n\n",
    );
    out.push_str("**Status:** INCOMPLETE\n\n");
    let _ = writeln!(
        out,
        "**Completeness Score:** {:.1}%\n",
        completeness.score * 100.0
    );
    out.push_str("**Missing Required Fields:**\n");
    for field in &completeness.missing_fields {
        let _ = writeln!(out, "- {field}");
    }
    out.push_str("\n**Action Required:**\nProvide the missing information and run the generation again.\n");
    out
}

// ---------------------------------------------------------------------------
// Run artifacts
// ---------------------------------------------------------------------------

pub const DOCUMENT_FILE: &str = "document.md";
pub const VALIDATION_FILE: &str = "validation.json";
pub const CONTEXT_FILE: &str = "context.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Metadata for a single artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// `manifest.json` of a run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub project_name: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub metadata: RunMetadata,
    pub artifacts: Vec<ArtifactMeta>,
}

#[derive(Serialize)]
struct ValidationFile<'a> {
    run_id: &'a RunId,
    status: RunStatus,
    sections: &'a [SectionRecord],
    per_section_validation: &'a BTreeMap<SectionId, SectionValidation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retrieval_coverage: Option<&'a RetrievalCoverage>,
}

/// Write a run's outputs under `<out_dir>/<run_id>/`.
///
/// ```text
/// <out_dir>/<run_id>/
/// ├── document.md
/// ├── validation.json
/// ├── context.json
/// └── manifest.json
/// ```
/// Every file is written to a temp file first, then renamed.
#[instrument(skip_all, fields(run_id = %result.run_id, out_dir = %out_dir.display()))]
pub fn write_run_artifacts(
    out_dir: &Path,
    result: &PipelineResult,
    context: &ProjectContext,
) -> Result<RunManifest> {
    let run_dir = run_dir(out_dir, &result.run_id);
    std::fs::create_dir_all(&run_dir).map_err(|e| ArchDocError::io(&run_dir, e))?;

    let validation = to_json(&ValidationFile {
        run_id: &result.run_id,
        status: result.status,
        sections: &result.sections,
        per_section_validation: &result.per_section_validation,
        retrieval_coverage: result.retrieval_coverage.as_ref(),
    })?;
    let context_json = to_json(context)?;

    let files = [
        (DOCUMENT_FILE, result.document.as_str()),
        (VALIDATION_FILE, validation.as_str()),
        (CONTEXT_FILE, context_json.as_str()),
    ];
    let mut artifacts = Vec::with_capacity(files.len());
    for (filename, content) in files {
        write_atomic(&run_dir, filename, content)?;
        artifacts.push(ArtifactMeta {
            filename: filename.to_string(),
            sha256: sha256_hex(content),
            size_bytes: content.len(),
        });
    }

    let manifest = RunManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        run_id: result.run_id.clone(),
        project_name: context.project.full_name.clone(),
        status: result.status,
        created_at: Utc::now(),
        metadata: result.metadata.clone(),
        artifacts,
    };
    write_atomic(&run_dir, MANIFEST_FILE, &to_json(&manifest)?)?;

    info!(path = %run_dir.display(), files = manifest.artifacts.len() + 1, "run artifacts written");
    Ok(manifest)
}

/// Read a run's manifest and check its schema version and checksums.
pub fn verify_run_dir(run_dir: &Path) -> Result<RunManifest> {
    let manifest_path = run_dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| ArchDocError::io(&manifest_path, e))?;
    let manifest: RunManifest = serde_json::from_str(&content)
        .map_err(|e| ArchDocError::validation(format!("invalid {MANIFEST_FILE}: {e}")))?;

    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(ArchDocError::validation(format!(
            "unsupported schema_version: {} (expected {CURRENT_SCHEMA_VERSION})",
            manifest.schema_version
        )));
    }

    for artifact in &manifest.artifacts {
        let path = run_dir.join(&artifact.filename);
        let content = std::fs::read_to_string(&path).map_err(|e| ArchDocError::io(&path, e))?;
        if sha256_hex(&content) != artifact.sha256 {
            return Err(ArchDocError::validation(format!(
                "checksum mismatch for {}",
                artifact.filename
            )));
        }
    }
    Ok(manifest)
}

pub fn run_dir(out_dir: &Path, run_id: &RunId) -> PathBuf {
    out_dir.join(run_id.to_string())
}

fn write_atomic(dir: &Path, filename: &str, content: &str) -> Result<()> {
    let target = dir.join(filename);
    let temp = dir.join(format!(".{filename}.tmp"));
    std::fs::write(&temp, content).map_err(|e| ArchDocError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| ArchDocError::io(&target, e))?;
    debug!(file = %filename, size = content.len(), "wrote artifact");
    Ok(())
}

fn to_json<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| ArchDocError::validation(format!("JSON serialization failed: {e}")))
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archdoc_shared::{
        CompletenessStatus, IssueCategory, SectionOutcome, Severity, ValidationIssue,
        ValidationMethod,
    };

    use crate::fakes::sample_context;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("archdoc-assembler-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn validation(valid: bool, score: f64, critical: Option<&str>) -> SectionValidation {
        SectionValidation {
            valid,
            score,
            issues: critical
                .map(|d| {
                    vec![ValidationIssue::new(
                        IssueCategory::Structural,
                        Severity::Critical,
                        d,
                        "tables",
                    )]
                })
                .unwrap_or_default(),
            recommendations: vec![],
            automated_score: score,
            model_score: None,
            method: ValidationMethod::Automated,
        }
    }

    fn coverage() -> RetrievalCoverage {
        RetrievalCoverage {
            found: vec!["naming.resource_groups".into()],
            missing: vec!["naming.vnets".into()],
            total_queries: 2,
            successful_queries: 1,
            coverage_score: 0.5,
        }
    }

    fn record(id: SectionId, attempts: u32, outcome: SectionOutcome) -> SectionRecord {
        SectionRecord {
            id,
            title: schema::schema(id).title.into(),
            attempts,
            outcome,
        }
    }

    #[test]
    fn sections_follow_registry_order() {
        // Inserted in generation order (priority sections first).
        let mut sections = BTreeMap::new();
        let mut validations = BTreeMap::new();
        let mut records = Vec::new();
        for s in schema::generation_order() {
            sections.insert(s.id, format!("### {}\n\nBody of {}.", s.title, s.id));
            validations.insert(s.id, validation(true, 0.9, None));
            records.push(record(s.id, 1, SectionOutcome::Accepted));
        }
        let ctx = sample_context();
        let cov = coverage();
        let doc = assemble_document(&AssemblyInput {
            context: &ctx,
            sections: &sections,
            validations: &validations,
            records: &records,
            coverage: &cov,
            generated_at: Utc::now(),
        });

        assert!(doc.starts_with("# Technical Architecture Document\n## Fleet Telemetry"));
        let positions: Vec<usize> = schema::section_order()
            .iter()
            .map(|s| doc.find(&format!("Body of {}.", s.id)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(doc.find("Body of executive_summary.").unwrap() < doc.find("Body of hosting.").unwrap());
        assert!(doc.contains("## Document Validation Report"));
        assert!(doc.contains("**Coverage Score:** 50.0%"));
        assert!(doc.contains("- ❌ naming.vnets"));
        assert!(doc.contains("| 9.a. Hosting | ✅ | 0.90 | 1 | 0 |"));
        assert!(!doc.contains("### Critical Issues Detected"));
    }

    #[test]
    fn report_lists_critical_issues() {
        let ctx = sample_context();
        let sections = BTreeMap::from([(SectionId::Risks, "### 7. Risks".to_string())]);
        let validations = BTreeMap::from([(
            SectionId::Risks,
            validation(false, 0.4, Some("Required table(s) missing: risks")),
        )]);
        let records = vec![record(SectionId::Risks, 3, SectionOutcome::Failed)];
        let cov = coverage();
        let doc = assemble_document(&AssemblyInput {
            context: &ctx,
            sections: &sections,
            validations: &validations,
            records: &records,
            coverage: &cov,
            generated_at: Utc::now(),
        });
        assert!(doc.contains("| 7. Risks and Mitigations | ❌ | 0.40 | 3 | 1 |"));
        assert!(doc.contains("- ⚠️ risks: Required table(s) missing: risks"));
    }

    #[test]
    fn incomplete_report_lists_missing_fields() {
        let report = incomplete_report(&Completeness {
            is_complete: false,
            score: 0.0,
            missing_fields: vec!["project_name".into(), "cloud_region".into()],
            provided_fields: 0,
            total_fields: 13,
            status: CompletenessStatus::Incomplete,
        });
        assert!(report.starts_with("# Requirements Incomplete"));
        assert!(report.contains("**Status:** INCOMPLETE"));
        assert!(report.contains("- project_name\n- cloud_region"));
    }

    #[test]
    fn writes_and_verifies_run_artifacts() {
        let tmp = temp_dir();
        let ctx = sample_context();
        let result = PipelineResult {
            run_id: RunId::new(),
            status: RunStatus::Complete,
            document: "# Technical Architecture Document\n".into(),
            per_section_validation: BTreeMap::from([(
                SectionId::Assumptions,
                validation(true, 0.88, None),
            )]),
            sections: vec![record(SectionId::Assumptions, 1, SectionOutcome::Accepted)],
            retrieval_coverage: Some(coverage()),
            metadata: RunMetadata {
                duration_seconds: 1.5,
                total_sections: 1,
                valid_sections: 1,
                average_score: 0.88,
                generated_at: Utc::now(),
                completeness_score: 0.85,
            },
        };

        let manifest = write_run_artifacts(&tmp, &result, &ctx).unwrap();
        assert_eq!(manifest.artifacts.len(), 3);
        assert_eq!(manifest.project_name, "Fleet Telemetry");

        let dir = run_dir(&tmp, &result.run_id);
        for f in [DOCUMENT_FILE, VALIDATION_FILE, CONTEXT_FILE, MANIFEST_FILE] {
            assert!(dir.join(f).is_file(), "{f} missing");
        }
        assert!(!dir.join(".document.md.tmp").exists());

        let validation: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join(VALIDATION_FILE)).unwrap()).unwrap();
        assert_eq!(validation["status"], "complete");
        assert_eq!(validation["sections"][0]["outcome"], "accepted");
        assert!(validation["per_section_validation"]["assumptions"]["valid"].as_bool().unwrap());

        let verified = verify_run_dir(&dir).unwrap();
        assert_eq!(verified, manifest);

        std::fs::write(dir.join(DOCUMENT_FILE), "tampered").unwrap();
        let err = verify_run_dir(&dir).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
