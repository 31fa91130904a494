//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use archdoc_azure::{AzureOpenAiClient, AzureSearchClient};
use archdoc_core::assembler::{run_dir, verify_run_dir, write_run_artifacts};
use archdoc_core::naming::RagNamingResolver;
use archdoc_core::normalizer::{RawRequirements, normalize};
use archdoc_core::pipeline::{Orchestrator, ProgressReporter};
use archdoc_core::prompts::PromptLibrary;
use archdoc_core::qualifier::RequirementsQualifier;
use archdoc_core::schema::{generation_order, is_priority, section_order};
use archdoc_shared::{
    AppConfig, PipelineConfig, PipelineResult, RunStatus, SectionId, SectionOutcome,
    SectionRecord, SectionValidation, init_config, load_config, read_secret, validate_api_keys,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// archdoc: Technical Architecture Documents from project requirements.
#[derive(Parser)]
#[command(
    name = "archdoc",
    version,
    about = "Generate validated Technical Architecture Documents for Azure projects.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a document from a requirements JSON file.
    Generate {
        /// Path to the requirements JSON object.
        requirements: PathBuf,

        /// Output root for run directories.
        #[arg(short, long, default_value = "var/runs")]
        out: PathBuf,
    },

    /// Run a gap analysis over free-text requirements.
    Qualify {
        /// Path to the requirements text file.
        requirements: PathBuf,

        /// Write `{"analysis": ...}` here for use with `generate`.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Normalize a requirements file and print the resulting context.
    Normalize {
        /// Path to the requirements JSON object.
        requirements: PathBuf,
    },

    /// List document sections in assembly order.
    Sections,

    /// Check a run directory's manifest and artifact checksums.
    Verify {
        /// Run directory (`<out>/<run_id>`).
        run_dir: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "archdoc=info",
        1 => "archdoc=debug",
        _ => "archdoc=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate { requirements, out } => cmd_generate(&requirements, &out).await,
        Command::Qualify { requirements, out } => cmd_qualify(&requirements, out.as_deref()).await,
        Command::Normalize { requirements } => cmd_normalize(&requirements),
        Command::Sections => cmd_sections(),
        Command::Verify { run_dir } => cmd_verify(&run_dir),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Read a requirements file. The top level must be a JSON object.
fn read_requirements(path: &Path) -> Result<RawRequirements> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read requirements file '{}'", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .wrap_err_with(|| format!("'{}' is not valid JSON", path.display()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(eyre!(
            "'{}' must contain a JSON object, found {}",
            path.display(),
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

async fn cmd_generate(requirements: &Path, out: &Path) -> Result<()> {
    // Validate collaborator settings before doing anything
    let config = load_config()?;
    validate_api_keys(&config)?;

    let raw = read_requirements(requirements)?;
    let pipeline_config = PipelineConfig::from(&config);
    let context = normalize(&raw, pipeline_config.completeness_threshold)?;

    let openai = Arc::new(AzureOpenAiClient::new(
        &config.openai,
        read_secret(&config.openai.api_key_env, "Azure OpenAI")?,
    )?);
    let search = Arc::new(AzureSearchClient::new(
        &config.search,
        read_secret(&config.search.api_key_env, "Azure AI Search")?,
    )?);
    let naming = RagNamingResolver::new(
        Arc::clone(&openai),
        Arc::clone(&search),
        pipeline_config.call_timeout,
    );
    let orchestrator = Orchestrator::new(
        Arc::clone(&openai),
        search,
        openai,
        naming,
        pipeline_config,
    )?;

    info!(
        project = %context.project.full_name,
        acronym = %context.project.name,
        environments = ?context.infrastructure.environments,
        "generating architecture document"
    );

    let reporter = CliProgress::new();
    let result = orchestrator.generate_from_context(&context, &reporter).await?;
    let manifest = write_run_artifacts(out, &result, &context)?;
    let path = run_dir(out, &result.run_id);

    println!();
    match result.status {
        RunStatus::Complete => {
            let accepted = result
                .sections
                .iter()
                .filter(|s| s.outcome != SectionOutcome::Failed)
                .count();
            println!("  Architecture document generated!");
            println!("  Run:       {}", result.run_id);
            println!("  Project:   {}", manifest.project_name);
            println!(
                "  Sections:  {accepted}/{} accepted, {} valid",
                result.metadata.total_sections, result.metadata.valid_sections
            );
            println!("  Avg score: {:.2}", result.metadata.average_score);
            if let Some(coverage) = &result.retrieval_coverage {
                println!("  Coverage:  {:.1}%", coverage.coverage_score * 100.0);
            }
        }
        RunStatus::IncompleteRequirements => {
            println!("  Requirements incomplete; no sections were generated.");
            println!(
                "  Completeness: {:.0}%",
                context.completeness.score * 100.0
            );
            println!(
                "  Missing:      {}",
                context.completeness.missing_fields.join(", ")
            );
        }
    }
    println!("  Path:      {}", path.display());
    println!("  Time:      {:.1}s", result.metadata.duration_seconds);
    println!();

    Ok(())
}

async fn cmd_qualify(requirements: &Path, out: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let text = std::fs::read_to_string(requirements)
        .wrap_err_with(|| format!("cannot read requirements file '{}'", requirements.display()))?;

    let pipeline_config = PipelineConfig::from(&config);
    let openai = AzureOpenAiClient::new(
        &config.openai,
        read_secret(&config.openai.api_key_env, "Azure OpenAI")?,
    )?;
    let qualifier = RequirementsQualifier::new(
        PromptLibrary::load(pipeline_config.prompts_dir.as_deref())?,
        pipeline_config.writer_max_tokens,
        pipeline_config.call_timeout,
    );

    let qualification = qualifier.qualify(&openai, &text).await?;

    println!("{}", qualification.analysis);
    println!();
    println!(
        "  Status:    {}",
        if qualification.is_ready() { "READY" } else { "NOT READY" }
    );
    if let Some(gaps) = qualification.must_have_gaps {
        println!("  Must-have gaps: {gaps}");
    }

    if let Some(out) = out {
        let raw = qualification.into_requirements(RawRequirements::new());
        std::fs::write(out, serde_json::to_string_pretty(&raw)?)
            .wrap_err_with(|| format!("cannot write '{}'", out.display()))?;
        println!("  Requirements written to {}", out.display());
    }
    Ok(())
}

fn cmd_normalize(requirements: &Path) -> Result<()> {
    let config = load_config()?;
    let raw = read_requirements(requirements)?;
    let context = normalize(&raw, config.pipeline.completeness_threshold)?;
    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}

fn cmd_sections() -> Result<()> {
    let generation: Vec<SectionId> = generation_order().iter().map(|s| s.id).collect();
    println!("{:<4} {:<34} {:<9} {}", "#", "Section", "Priority", "Generated");
    for (position, schema) in section_order().iter().enumerate() {
        let generated_at = generation
            .iter()
            .position(|id| *id == schema.id)
            .map(|p| p + 1)
            .unwrap_or_default();
        println!(
            "{:<4} {:<34} {:<9} {}",
            position + 1,
            schema.title,
            if is_priority(schema.id) { "yes" } else { "" },
            generated_at
        );
    }
    Ok(())
}

fn cmd_verify(run_dir: &Path) -> Result<()> {
    let manifest = verify_run_dir(run_dir)?;
    println!("  Run {} verified", manifest.run_id);
    println!("  Project:   {}", manifest.project_name);
    println!("  Created:   {}", manifest.created_at.to_rfc3339());
    for artifact in &manifest.artifacts {
        println!(
            "  {:<16} {:>9} bytes  sha256:{}",
            artifact.filename, artifact.size_bytes, artifact.sha256
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn section_started(&self, _id: SectionId, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {title}"));
    }

    fn section_finished(&self, record: &SectionRecord, validation: &SectionValidation) {
        let mark = match record.outcome {
            SectionOutcome::Accepted => "✓",
            SectionOutcome::AcceptedDegraded => "~",
            SectionOutcome::Failed => "✗",
        };
        self.spinner.println(format!(
            "  {mark} {} (score {:.2}, {} attempt{})",
            record.title,
            validation.score,
            record.attempts,
            if record.attempts == 1 { "" } else { "s" }
        ));
    }

    fn done(&self, _result: &PipelineResult) {
        self.spinner.finish_and_clear();
    }
}
