//! Requirements qualification: free-text requirements → gap analysis with a
//! READY / NOT READY verdict.
//!
//! The analysis text is what the normalizer consumes as the `analysis`
//! field, so a qualified document can go straight into generation.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use archdoc_shared::{ArchDocError, Result};

use crate::normalizer::RawRequirements;
use crate::prompts::PromptLibrary;
use crate::services::{GenerationRequest, TextGenerator, with_timeout};

const QUALIFY_LABEL: &str = "qualify";
const QUALIFY_TEMPERATURE: f32 = 0.3;

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bstatus\b[\s:*_#-]*(not[\s_-]+ready|ready)\b").expect("valid regex")
});

static MUST_HAVE_GAPS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)must[\s-]*have\s+gaps?[\s:*_-]*(\d+)").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualificationStatus {
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "NOT READY")]
    NotReady,
}

/// Outcome of one qualification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    /// Full markdown analysis returned by the model.
    pub analysis: String,
    pub status: QualificationStatus,
    pub has_gaps: bool,
    /// Count from a `MUST-HAVE gaps: N` line, when the analysis has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_have_gaps: Option<u32>,
}

impl Qualification {
    pub fn is_ready(&self) -> bool {
        self.status == QualificationStatus::Ready
    }

    /// Attach the analysis to `base` as its free-text `analysis` field.
    pub fn into_requirements(self, mut base: RawRequirements) -> RawRequirements {
        base.insert("analysis".into(), Value::String(self.analysis));
        base
    }
}

/// Derive the verdict from analysis text.
///
/// READY when the analysis states `Status: READY` or reports zero
/// must-have gaps; anything else is NOT READY.
pub fn parse_qualification(analysis: String) -> Qualification {
    let stated_ready = STATUS_RE
        .captures(&analysis)
        .is_some_and(|c| c[1].eq_ignore_ascii_case("ready"));
    let must_have_gaps = MUST_HAVE_GAPS_RE
        .captures(&analysis)
        .and_then(|c| c[1].parse::<u32>().ok());

    let ready = stated_ready || must_have_gaps == Some(0);
    Qualification {
        analysis,
        status: if ready {
            QualificationStatus::Ready
        } else {
            QualificationStatus::NotReady
        },
        has_gaps: !ready,
        must_have_gaps,
    }
}

// ---------------------------------------------------------------------------
// Qualifier service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RequirementsQualifier {
    prompts: PromptLibrary,
    max_tokens: u32,
    call_timeout: Duration,
}

impl RequirementsQualifier {
    pub fn new(prompts: PromptLibrary, max_tokens: u32, call_timeout: Duration) -> Self {
        Self {
            prompts,
            max_tokens,
            call_timeout,
        }
    }

    /// Analyze free-text requirements. Blank input is rejected before any
    /// model call.
    #[instrument(skip_all, fields(chars = requirements.len()))]
    pub async fn qualify<G: TextGenerator>(&self, generator: &G, requirements: &str) -> Result<Qualification> {
        if requirements.trim().is_empty() {
            return Err(ArchDocError::validation("requirements cannot be empty"));
        }

        let request = self.build_request(requirements);
        let analysis = with_timeout(QUALIFY_LABEL, self.call_timeout, generator.generate(&request)).await?;
        let qualification = parse_qualification(analysis);

        info!(
            status = ?qualification.status,
            must_have_gaps = ?qualification.must_have_gaps,
            "requirements qualified"
        );
        Ok(qualification)
    }

    pub fn build_request(&self, requirements: &str) -> GenerationRequest {
        GenerationRequest {
            label: QUALIFY_LABEL.into(),
            system: self
                .prompts
                .analyzer()
                .unwrap_or(BUILTIN_ANALYZER_INSTRUCTIONS)
                .to_string(),
            user: format!("Analyze these requirements:\n\n{requirements}"),
            temperature: QUALIFY_TEMPERATURE,
            max_tokens: self.max_tokens,
        }
    }
}

const BUILTIN_ANALYZER_INSTRUCTIONS: &str = "You are a solution architect qualifying project \
requirements before a Technical Architecture Document is written for an Azure deployment.

Assess completeness, clarity, feasibility and consistency. Identify the project name, \
business line, region, Azure region, environments, functional and non-functional \
requirements, constraints, risks and stakeholders.

List every missing item as a gap and classify it as MUST-HAVE or NICE-TO-HAVE.

Begin the answer with `Project: <name>` and end it with these two lines:
MUST-HAVE gaps: <count>
Status: READY or NOT READY";

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replies with fixed text and records requests.
    struct CannedGenerator {
        reply: String,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl CannedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for CannedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn qualifier() -> RequirementsQualifier {
        RequirementsQualifier::new(PromptLibrary::builtin(), 4000, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn stated_ready_status() {
        let generator = CannedGenerator::new(
            "Project: Fleet Telemetry\n\n## Gaps\nNone blocking.\n\n**Status:** READY",
        );
        let q = qualifier()
            .qualify(&generator, "Collect telemetry from 10k vehicles in North Europe.")
            .await
            .unwrap();
        assert_eq!(q.status, QualificationStatus::Ready);
        assert!(!q.has_gaps);
        assert!(q.must_have_gaps.is_none());

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].label, "qualify");
        assert!(requests[0].user.starts_with("Analyze these requirements:\n\n"));
        assert!((requests[0].temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn not_ready_with_open_gaps() {
        let q = parse_qualification(
            "Project: Payroll\nMUST-HAVE gaps: 3\nStatus: NOT READY".into(),
        );
        assert_eq!(q.status, QualificationStatus::NotReady);
        assert!(q.has_gaps);
        assert_eq!(q.must_have_gaps, Some(3));
        assert!(!q.is_ready());
    }

    #[test]
    fn zero_must_have_gaps_is_ready() {
        let q = parse_qualification(
            "Project: Payroll\n**MUST-HAVE gaps:** 0\nNICE-TO-HAVE gaps: 2\nStatus: NOT READY".into(),
        );
        assert_eq!(q.status, QualificationStatus::Ready);
        assert_eq!(q.must_have_gaps, Some(0));
    }

    #[test]
    fn silent_analysis_is_not_ready() {
        let q = parse_qualification("The requirements describe a web portal.".into());
        assert_eq!(q.status, QualificationStatus::NotReady);
        assert!(q.has_gaps);
    }

    #[test]
    fn analysis_feeds_requirements() {
        let q = parse_qualification("Project: Fleet Telemetry\nStatus: READY".into());
        let raw = q.into_requirements(RawRequirements::new());
        assert_eq!(raw["analysis"], "Project: Fleet Telemetry\nStatus: READY");

        let json = serde_json::to_value(parse_qualification("Status: NOT READY".into())).unwrap();
        assert_eq!(json["status"], "NOT READY");
    }

    #[tokio::test]
    async fn blank_requirements_skip_the_model() {
        let generator = CannedGenerator::new("Status: READY");
        let err = qualifier().qualify(&generator, "  \n").await.unwrap_err();
        assert!(matches!(err, ArchDocError::Validation { .. }));
        assert!(generator.requests.lock().unwrap().is_empty());
    }
}
