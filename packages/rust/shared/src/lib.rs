//! Shared types, error model, and configuration for archdoc.
//!
//! This crate is the foundation depended on by all other archdoc crates.
//! It provides:
//! - [`ArchDocError`], the unified error type
//! - Domain types ([`ProjectContext`], [`RagDomain`], [`SectionId`], [`NamingArtifact`])
//! - Run records ([`SectionValidation`], [`PipelineResult`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod report;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, OpenAiConfig, PipelineConfig, PipelineSettings, SearchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, read_secret, validate_api_keys,
};
pub use error::{ArchDocError, Result};
pub use report::{
    IssueCategory, PipelineResult, RunMetadata, RunStatus, SectionOutcome, SectionRecord,
    SectionResult, SectionValidation, Severity, ValidationIssue, ValidationMethod,
};
pub use types::{
    CURRENT_SCHEMA_VERSION, Completeness, CompletenessStatus, DomainGroup, EnvironmentNaming,
    Infrastructure, NamingArtifact, NamingComponent, NamingRequest, NamingSource,
    NamingValidation, ProjectContext, ProjectInfo, RagDomain, Requirements, RetrievalCoverage,
    RetrievalDomainResult, RetrievedChunk, RunId, SectionId, Stakeholder,
};
