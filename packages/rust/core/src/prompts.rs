//! Optional on-disk instruction templates.
//!
//! Layout under the configured prompts directory:
//! ```text
//! <prompts_dir>/
//! ├── analyzer/requirements_analyzer.txt
//! ├── writer/<section_id>.txt
//! └── reviewer/quality_validator.txt
//! ```
//! Templates are read once at construction; anything missing falls back to
//! the built-in instructions.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use archdoc_shared::{ArchDocError, Result, SectionId};

use crate::schema;

const REVIEWER_FILE: &str = "quality_validator.txt";
const ANALYZER_FILE: &str = "requirements_analyzer.txt";

#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    writer: HashMap<SectionId, String>,
    reviewer: Option<String>,
    analyzer: Option<String>,
}

impl PromptLibrary {
    /// Library with no overrides.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Load every template present under `dir`. A missing directory yields
    /// the built-in library.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let Some(dir) = dir else {
            return Ok(Self::builtin());
        };
        if !dir.is_dir() {
            warn!(path = %dir.display(), "prompts directory not found, using built-in instructions");
            return Ok(Self::builtin());
        }

        let mut writer = HashMap::new();
        for s in schema::section_order() {
            let path = dir.join("writer").join(format!("{}.txt", s.id.as_str()));
            if let Some(text) = read_optional(&path)? {
                writer.insert(s.id, text);
            }
        }
        let reviewer = read_optional(&dir.join("reviewer").join(REVIEWER_FILE))?;
        let analyzer = read_optional(&dir.join("analyzer").join(ANALYZER_FILE))?;

        debug!(
            writer_templates = writer.len(),
            reviewer_template = reviewer.is_some(),
            analyzer_template = analyzer.is_some(),
            "prompt library loaded"
        );
        Ok(Self {
            writer,
            reviewer,
            analyzer,
        })
    }

    pub fn writer(&self, id: SectionId) -> Option<&str> {
        self.writer.get(&id).map(String::as_str)
    }

    pub fn reviewer(&self) -> Option<&str> {
        self.reviewer.as_deref()
    }

    pub fn analyzer(&self) -> Option<&str> {
        self.analyzer.as_deref()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|e| ArchDocError::io(path, e))?;
    Ok(Some(text).filter(|t| !t.trim().is_empty()))
}
