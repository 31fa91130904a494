//! Context normalization: raw requirement field bag → [`ProjectContext`].
//!
//! Purely structural. Missing optional data is defaulted, never an error;
//! only values whose shape cannot be coerced are rejected.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use archdoc_shared::{
    ArchDocError, Completeness, CompletenessStatus, Infrastructure, ProjectContext, ProjectInfo,
    Requirements, Result, Stakeholder,
};

/// Unordered bag of user-provided requirement fields.
pub type RawRequirements = Map<String, Value>;

/// Optional fields counted towards the completeness score.
const OPTIONAL_FIELDS: [&str; 13] = [
    "project_name",
    "description",
    "cloud_region",
    "business_line",
    "region",
    "environments",
    "functional_requirements",
    "non_functional_requirements",
    "constraints",
    "assumptions",
    "risks",
    "stakeholders",
    "analysis",
];

/// Extra weight of free-text analysis in the completeness score.
const ANALYSIS_BONUS: usize = 5;

const ACRONYM_STOPWORDS: [&str; 4] = ["platform", "system", "service", "application"];

const DEFAULT_PROJECT_NAME: &str = "Project";
const DEFAULT_CODE: &str = "GLB";
const DEFAULT_CLOUD_REGION: &str = "North Europe";
const DEFAULT_ENVIRONMENTS: [&str; 3] = ["DEV", "PRD", "TST"];
const MAX_DESCRIPTION_CHARS: usize = 500;

static PROJECT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Project|Application|System):\s*([^\n]+)").expect("valid regex")
});

static STAKEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\((.+?)\)").expect("valid regex"));

/// Normalize raw requirements into a validated project context.
#[instrument(skip_all, fields(fields = raw.len()))]
pub fn normalize(raw: &RawRequirements, completeness_threshold: f64) -> Result<ProjectContext> {
    let project = normalize_project(raw)?;
    let infrastructure = normalize_infrastructure(raw)?;
    let requirements = Requirements {
        functional: line_list(raw, "functional_requirements")?,
        non_functional: line_list(raw, "non_functional_requirements")?,
        constraints: line_list(raw, "constraints")?,
        assumptions: line_list(raw, "assumptions")?,
        risks: line_list(raw, "risks")?,
    };
    let stakeholders = normalize_stakeholders(raw)?;
    let completeness = assess_completeness(raw, completeness_threshold);

    info!(
        project = %project.full_name,
        acronym = %project.name,
        score = completeness.score,
        status = ?completeness.status,
        "context normalized"
    );

    Ok(ProjectContext {
        project,
        infrastructure,
        requirements,
        stakeholders,
        completeness,
    })
}

/// Derive a short project code from a full project name.
///
/// Stopwords are dropped (unless nothing else remains). A single remaining
/// word is truncated to four characters; several words contribute their
/// initials, up to ten.
pub fn derive_acronym(full_name: &str) -> String {
    let words: Vec<&str> = full_name.split_whitespace().collect();
    let mut kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !ACRONYM_STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if kept.is_empty() {
        kept = words;
    }

    match kept.as_slice() {
        [] => DEFAULT_PROJECT_NAME.to_uppercase(),
        [single] => single.to_uppercase().chars().take(4).collect(),
        many => many
            .iter()
            .filter_map(|w| w.chars().next())
            .flat_map(char::to_uppercase)
            .take(10)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn normalize_project(raw: &RawRequirements) -> Result<ProjectInfo> {
    let analysis = scalar(raw, "analysis")?;

    let full_name = match scalar(raw, "project_name")? {
        Some(name) => name,
        None => analysis
            .as_deref()
            .and_then(|text| PROJECT_LINE_RE.captures(text))
            .map(|c| c[1].trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
    };

    let description = match scalar(raw, "description")? {
        Some(d) => d,
        None => analysis
            .as_deref()
            .and_then(first_paragraph)
            .unwrap_or_default(),
    };

    Ok(ProjectInfo {
        name: derive_acronym(&full_name),
        full_name,
        description,
        business_line: scalar(raw, "business_line")?
            .unwrap_or_else(|| DEFAULT_CODE.into())
            .to_uppercase(),
        region: scalar(raw, "region")?
            .unwrap_or_else(|| DEFAULT_CODE.into())
            .to_uppercase(),
        owner: scalar(raw, "owner")?.unwrap_or_default(),
        cost_center: scalar(raw, "cost_center")?.unwrap_or_default(),
    })
}

fn normalize_infrastructure(raw: &RawRequirements) -> Result<Infrastructure> {
    let environments = match raw.get("environments") {
        None | Some(Value::Null) => DEFAULT_ENVIRONMENTS.iter().map(|e| e.to_string()).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|e| e.trim().to_uppercase())
            .filter(|e| !e.is_empty())
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| scalar_value("environments", v).map(|e| e.trim().to_uppercase()))
            .collect::<Result<Vec<_>>>()?,
        Some(other) => return Err(list_shape_error("environments", other)),
    };

    Ok(Infrastructure {
        cloud_provider: "Azure".into(),
        primary_region: scalar(raw, "cloud_region")?
            .unwrap_or_else(|| DEFAULT_CLOUD_REGION.into()),
        secondary_region: scalar(raw, "secondary_region")?,
        environments,
        high_availability: flag(raw, "high_availability", true)?,
        disaster_recovery: flag(raw, "disaster_recovery", false)?,
        multi_region: flag(raw, "multi_region", false)?,
    })
}

fn normalize_stakeholders(raw: &RawRequirements) -> Result<Vec<Stakeholder>> {
    match raw.get("stakeholders") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_stakeholder)
            .collect()),
        Some(Value::Array(items)) => items.iter().map(stakeholder_entry).collect(),
        Some(other) => Err(list_shape_error("stakeholders", other)),
    }
}

fn stakeholder_entry(item: &Value) -> Result<Stakeholder> {
    match item {
        Value::String(s) => Ok(parse_stakeholder(s.trim())),
        Value::Object(obj) => {
            let name = match obj.get("name") {
                Some(v) => scalar_value("stakeholders.name", v)?,
                None => String::new(),
            };
            let role = match obj.get("role") {
                Some(v) => scalar_value("stakeholders.role", v)?,
                None => "Stakeholder".to_string(),
            };
            Ok(Stakeholder { name, role })
        }
        other => Err(ArchDocError::validation(format!(
            "field 'stakeholders' entries must be strings or {{name, role}} objects, got {}",
            kind(other)
        ))),
    }
}

fn parse_stakeholder(entry: &str) -> Stakeholder {
    match STAKEHOLDER_RE.captures(entry) {
        Some(c) => Stakeholder {
            name: c[1].trim().to_string(),
            role: c[2].trim().to_string(),
        },
        None => Stakeholder {
            name: entry.to_string(),
            role: "Stakeholder".to_string(),
        },
    }
}

fn assess_completeness(raw: &RawRequirements, threshold: f64) -> Completeness {
    let has_analysis = is_provided(raw.get("analysis"));
    let has_content = has_analysis
        || is_provided(raw.get("functional_requirements"))
        || is_provided(raw.get("non_functional_requirements"));

    let mut missing_fields = Vec::new();
    if !has_content {
        for field in ["project_name", "description", "cloud_region"] {
            if !is_provided(raw.get(field)) {
                missing_fields.push(field.to_string());
            }
        }
    }

    let total_fields = OPTIONAL_FIELDS.len();
    let mut provided_fields = OPTIONAL_FIELDS
        .iter()
        .filter(|f| is_provided(raw.get(**f)))
        .count();
    if has_analysis {
        provided_fields += ANALYSIS_BONUS;
    }
    let score = (provided_fields as f64 / total_fields as f64).min(1.0);

    let is_complete = has_content || (missing_fields.is_empty() && score >= threshold);
    debug!(provided_fields, total_fields, has_content, "completeness assessed");

    Completeness {
        is_complete,
        score,
        missing_fields,
        provided_fields,
        total_fields,
        status: if is_complete {
            CompletenessStatus::Ready
        } else {
            CompletenessStatus::Incomplete
        },
    }
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

fn is_provided(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(_)) => true,
    }
}

/// Optional scalar field; empty strings count as absent.
fn scalar(raw: &RawRequirements, field: &str) -> Result<Option<String>> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let s = scalar_value(field, v)?;
            Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty()))
        }
    }
}

fn scalar_value(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ArchDocError::validation(format!(
            "field '{field}' must be a scalar, got {}",
            kind(other)
        ))),
    }
}

/// List field given as an array or a newline-delimited string.
fn line_list(raw: &RawRequirements, field: &str) -> Result<Vec<String>> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()),
        Some(Value::Array(items)) => items.iter().map(|v| scalar_value(field, v)).collect(),
        Some(other) => Err(list_shape_error(field, other)),
    }
}

fn flag(raw: &RawRequirements, field: &str, default: bool) -> Result<bool> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => Ok(matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes"
        )),
        Some(other) => Err(ArchDocError::validation(format!(
            "field '{field}' must be a boolean, got {}",
            kind(other)
        ))),
    }
}

fn first_paragraph(text: &str) -> Option<String> {
    text.split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty() && !p.starts_with('#'))
        .map(|p| p.chars().take(MAX_DESCRIPTION_CHARS).collect())
}

fn list_shape_error(field: &str, value: &Value) -> ArchDocError {
    ArchDocError::validation(format!(
        "field '{field}' must be a list or delimited string, got {}",
        kind(value)
    ))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
