//! End-to-end generation pipeline: requirements → context → retrieval →
//! naming → per-section write/review loop → assembled document.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use archdoc_shared::{
    ArchDocError, EnvironmentNaming, IssueCategory, NamingRequest, PipelineConfig, PipelineResult,
    ProjectContext, Result, RunId, RunMetadata, RunStatus, SectionId, SectionOutcome,
    SectionRecord, SectionResult, SectionValidation, Severity, ValidationIssue, ValidationMethod,
};

use crate::assembler::{self, AssemblyInput};
use crate::normalizer::{self, RawRequirements};
use crate::prompts::PromptLibrary;
use crate::retrieval::{RetrievalCoordinator, RetrievalReport};
use crate::reviewer::SectionReviewer;
use crate::schema::{self, SectionSchema};
use crate::services::{Embedder, KnowledgeIndex, NamingResolver, TextGenerator};
use crate::writer::{Feedback, SectionWriter, WriterInput};

/// Issues quoted in a failure placeholder.
const PLACEHOLDER_ISSUES: usize = 5;

// ---------------------------------------------------------------------------
// Section state machine
// ---------------------------------------------------------------------------

/// What to do after validating attempt `n` of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    /// Invalid but free of critical issues on a later attempt.
    AcceptedDegraded,
    Retry,
    Failed,
}

/// `attempt` is 1-based.
pub fn decide(validation: &SectionValidation, attempt: u32, max_attempts: u32) -> Decision {
    if validation.valid {
        Decision::Accepted
    } else if !validation.has_critical() && attempt > 1 {
        Decision::AcceptedDegraded
    } else if attempt < max_attempts {
        Decision::Retry
    } else {
        Decision::Failed
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// `current` is 1-based within `total`.
    fn section_started(&self, id: SectionId, title: &str, current: usize, total: usize);
    fn section_finished(&self, record: &SectionRecord, validation: &SectionValidation);
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn section_started(&self, _id: SectionId, _title: &str, _current: usize, _total: usize) {}
    fn section_finished(&self, _record: &SectionRecord, _validation: &SectionValidation) {}
    fn done(&self, _result: &PipelineResult) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Outcome of one section's correction loop.
#[derive(Debug, Clone)]
pub struct SectionRun {
    pub result: SectionResult,
    pub outcome: SectionOutcome,
}

/// Coordinates every stage of a run. Collaborators are injected by the
/// caller; nothing here is process-global.
pub struct Orchestrator<E, K, G, N> {
    embedder: E,
    index: K,
    generator: G,
    naming: N,
    config: PipelineConfig,
    retrieval: RetrievalCoordinator,
    writer: SectionWriter,
    reviewer: SectionReviewer,
}

impl<E, K, G, N> Orchestrator<E, K, G, N>
where
    E: Embedder,
    K: KnowledgeIndex,
    G: TextGenerator,
    N: NamingResolver,
{
    /// Build an orchestrator, loading instruction templates from
    /// `config.prompts_dir` when set.
    pub fn new(embedder: E, index: K, generator: G, naming: N, config: PipelineConfig) -> Result<Self> {
        let prompts = PromptLibrary::load(config.prompts_dir.as_deref())?;
        Ok(Self {
            retrieval: RetrievalCoordinator::new(config.retrieval_top_k, config.call_timeout),
            writer: SectionWriter::new(
                prompts.clone(),
                config.writer_temperature,
                config.writer_max_tokens,
                config.call_timeout,
            ),
            reviewer: SectionReviewer::new(
                prompts,
                config.reviewer_temperature,
                config.reviewer_max_tokens,
                config.call_timeout,
            ),
            embedder,
            index,
            generator,
            naming,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalize raw requirements, then run the pipeline on the result.
    pub async fn generate_document(
        &self,
        raw: &RawRequirements,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineResult> {
        progress.phase("Normalizing requirements");
        let context = normalizer::normalize(raw, self.config.completeness_threshold)?;
        self.generate_from_context(&context, progress).await
    }

    /// Run the pipeline for an already-normalized context.
    ///
    /// Only an unreachable retrieval service fails the run; section-level
    /// faults end up in that section's record.
    #[instrument(skip_all, fields(project = %context.project.name))]
    pub async fn generate_from_context(
        &self,
        context: &ProjectContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineResult> {
        let start = Instant::now();
        let run_id = RunId::new();

        if !context.completeness.is_complete {
            warn!(
                %run_id,
                score = context.completeness.score,
                missing = ?context.completeness.missing_fields,
                "requirements incomplete, skipping generation"
            );
            let result = incomplete_result(run_id, context, start);
            progress.done(&result);
            return Ok(result);
        }

        info!(%run_id, completeness = context.completeness.score, "starting generation run");

        progress.phase("Retrieving governance knowledge");
        let retrieval = self
            .retrieval
            .retrieve_all(&self.embedder, &self.index, context)
            .await?;
        let coverage = retrieval.coverage();

        progress.phase("Resolving resource names");
        let naming = self.resolve_naming(context).await;

        progress.phase("Generating sections");
        let order = schema::generation_order();
        let total = order.len();
        let mut contents = BTreeMap::new();
        let mut validations = BTreeMap::new();
        let mut records = BTreeMap::new();
        for (i, schema) in order.into_iter().enumerate() {
            progress.section_started(schema.id, schema.title, i + 1, total);
            let run = self.run_section(schema, context, &retrieval, &naming).await;
            let record = SectionRecord {
                id: schema.id,
                title: schema.title.to_string(),
                attempts: run.result.attempts,
                outcome: run.outcome,
            };
            progress.section_finished(&record, &run.result.validation);
            contents.insert(schema.id, run.result.content);
            validations.insert(schema.id, run.result.validation);
            records.insert(schema.id, record);
        }

        progress.phase("Assembling document");
        // BTreeMap iteration follows SectionId order, which is assembly order.
        let sections: Vec<SectionRecord> = records.into_values().collect();
        let generated_at = Utc::now();
        let document = assembler::assemble_document(&AssemblyInput {
            context,
            sections: &contents,
            validations: &validations,
            records: &sections,
            coverage: &coverage,
            generated_at,
        });

        let valid_sections = validations.values().filter(|v| v.valid).count();
        let average_score = if validations.is_empty() {
            0.0
        } else {
            validations.values().map(|v| v.score).sum::<f64>() / validations.len() as f64
        };
        let metadata = RunMetadata {
            duration_seconds: start.elapsed().as_secs_f64(),
            total_sections: validations.len(),
            valid_sections,
            average_score,
            generated_at,
            completeness_score: context.completeness.score,
        };

        info!(
            %run_id,
            sections = metadata.total_sections,
            valid = valid_sections,
            average_score,
            coverage = coverage.coverage_score,
            elapsed_s = metadata.duration_seconds,
            "generation run complete"
        );

        let result = PipelineResult {
            run_id,
            status: RunStatus::Complete,
            document,
            per_section_validation: validations,
            sections,
            retrieval_coverage: Some(coverage),
            metadata,
        };
        progress.done(&result);
        Ok(result)
    }

    /// One naming artifact per environment, keyed `rg_<env>`.
    pub async fn resolve_naming(&self, context: &ProjectContext) -> Vec<EnvironmentNaming> {
        let lookups = context.infrastructure.environments.iter().map(|env| async move {
            let request = NamingRequest {
                project_name: context.project.name.clone(),
                cloud_region: context.infrastructure.primary_region.clone(),
                environment: env.clone(),
                business_line: context.project.business_line.clone(),
                region: context.project.region.clone(),
            };
            let artifact = self.naming.resolve(&request).await;
            if let Some(error) = &artifact.error {
                warn!(environment = %env, error = %error, "resource name unresolved");
            }
            EnvironmentNaming {
                environment: env.clone(),
                key: format!("rg_{}", env.to_lowercase()),
                artifact,
            }
        });
        join_all(lookups).await
    }

    /// Write → review → retry-with-feedback until a terminal decision.
    #[instrument(skip_all, fields(section = %schema.id))]
    pub async fn run_section(
        &self,
        schema: &SectionSchema,
        context: &ProjectContext,
        retrieval: &RetrievalReport,
        naming: &[EnvironmentNaming],
    ) -> SectionRun {
        let max_attempts = self.config.max_attempts().max(1);
        let mut feedback: Option<Feedback> = None;
        let mut attempt = 1;

        loop {
            debug!(attempt, max_attempts, "section attempt");
            let input = WriterInput {
                schema,
                context,
                retrieval,
                naming,
                feedback: feedback.as_ref(),
            };
            let (content, validation) = match self.attempt(input).await {
                Ok(pair) => pair,
                Err(e) if !e.is_transient() => {
                    warn!(attempt, error = %e, "section attempt hit a non-retryable fault");
                    let validation = collaborator_failure(&e);
                    let placeholder = failure_placeholder(schema, &validation, attempt);
                    return finished(placeholder, validation, attempt, SectionOutcome::Failed);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "section attempt failed");
                    (String::new(), collaborator_failure(&e))
                }
            };

            match decide(&validation, attempt, max_attempts) {
                Decision::Accepted => {
                    info!(attempt, score = validation.score, "section accepted");
                    return finished(content, validation, attempt, SectionOutcome::Accepted);
                }
                Decision::AcceptedDegraded => {
                    warn!(
                        attempt,
                        score = validation.score,
                        issues = validation.issues.len(),
                        "section accepted with non-critical issues"
                    );
                    return finished(content, validation, attempt, SectionOutcome::AcceptedDegraded);
                }
                Decision::Retry => {
                    let critical = validation.critical_issues().count();
                    warn!(attempt, critical, score = validation.score, "section invalid, retrying");
                    feedback = Some(Feedback::from_validation(&validation));
                    attempt += 1;
                }
                Decision::Failed => {
                    warn!(attempt, score = validation.score, "section failed after all attempts");
                    let placeholder = failure_placeholder(schema, &validation, attempt);
                    return finished(placeholder, validation, attempt, SectionOutcome::Failed);
                }
            }
        }
    }

    async fn attempt(&self, input: WriterInput<'_>) -> Result<(String, SectionValidation)> {
        let content = self.writer.write(&self.generator, input).await?;
        let validation = self
            .reviewer
            .review(&self.generator, &content, input.schema, input.retrieval)
            .await?;
        Ok((content, validation))
    }
}

fn finished(content: String, validation: SectionValidation, attempts: u32, outcome: SectionOutcome) -> SectionRun {
    SectionRun {
        result: SectionResult {
            content,
            validation,
            attempts,
        },
        outcome,
    }
}

/// Validation recorded for an attempt that hit a collaborator fault.
fn collaborator_failure(error: &ArchDocError) -> SectionValidation {
    SectionValidation {
        valid: false,
        score: 0.0,
        issues: vec![ValidationIssue::new(
            IssueCategory::Content,
            Severity::Critical,
            format!("Section attempt failed: {error}"),
            "generation",
        )],
        recommendations: Vec::new(),
        automated_score: 0.0,
        model_score: None,
        method: ValidationMethod::Error,
    }
}

/// Stand-in content for a section that exhausted its attempts.
pub fn failure_placeholder(schema: &SectionSchema, validation: &SectionValidation, attempts: u32) -> String {
    let mut parts = vec![
        format!("### {}", schema.title),
        "\n**⚠️ Section Generation Failed**\n".to_string(),
        format!("This section could not be generated successfully after {attempts} attempts.\n"),
        "**Issues Detected:**\n".to_string(),
    ];
    for issue in validation.issues.iter().take(PLACEHOLDER_ISSUES) {
        parts.push(format!("- [{}] {}", issue.severity.as_upper(), issue.description));
    }
    parts.push("\n**Action Required:**".to_string());
    parts.push("1. Review the requirements and ensure all necessary information is provided".to_string());
    parts.push("2. Verify that required standards are available in the knowledge base".to_string());
    parts.push("3. Regenerate this section after addressing the issues".to_string());
    parts.join("\n")
}

fn incomplete_result(run_id: RunId, context: &ProjectContext, start: Instant) -> PipelineResult {
    PipelineResult {
        run_id,
        status: RunStatus::IncompleteRequirements,
        document: assembler::incomplete_report(&context.completeness),
        per_section_validation: BTreeMap::new(),
        sections: Vec::new(),
        retrieval_coverage: None,
        metadata: RunMetadata {
            duration_seconds: start.elapsed().as_secs_f64(),
            total_sections: 0,
            valid_sections: 0,
            average_score: 0.0,
            generated_at: Utc::now(),
            completeness_score: context.completeness.score,
        },
    }
}
