//! a11y-audit - batch accessibility audits from the command line
//!
//! ## Commands
//!
//! - `audit`: scan a batch of URLs and print scored, remediated violations
//! - `score`: compute the confidence score for a single finding
//! - `remediate`: route one violation through the remediation tiers
//! - `templates`: list the built-in remediation templates

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, Level};

use a11y_audit_core::metrics::MetricsSnapshot;
use a11y_audit_core::{
    scoring, AuditResultView, BatchAuditOrchestrator, BuiltinTemplateStore, ConfidenceScore,
    FixtureRenderer, JobProgress, JobStatus, PipelineConfig, ProviderRegistry, RawFinding,
    RemediationRequest, RemediationResponse, RemediationRouter, Severity, TracingDriftSink,
    METRICS,
};

#[derive(Parser)]
#[command(name = "a11y-audit")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch accessibility audits with confidence scoring and remediation", long_about = None)]
struct Cli {
    /// Pipeline config file (TOML)
    #[arg(short, long, global = true, env = "A11Y_AUDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long = "json-logs", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a batch of URLs
    Audit {
        /// JSON file of recorded render outcomes keyed by URL
        #[arg(short, long)]
        fixtures: PathBuf,

        /// Maximum concurrent scans (overrides the config)
        #[arg(long)]
        concurrency: Option<usize>,

        /// URLs to audit (default: every URL in the fixture file)
        urls: Vec<String>,
    },

    /// Score a single finding
    Score {
        /// WCAG success criterion, e.g. 1.4.3
        #[arg(long)]
        criterion: String,

        /// low, medium, high or critical
        #[arg(long)]
        severity: Severity,

        #[arg(long)]
        selector: Option<String>,

        #[arg(long)]
        snippet: Option<String>,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Generate a fix for a single violation
    Remediate {
        #[arg(long)]
        criterion: String,

        /// Machine-readable issue kind, e.g. missing-alt
        #[arg(long)]
        issue_type: String,

        #[arg(long, default_value = "")]
        description: String,

        /// low, medium, high or critical (default: medium)
        #[arg(long)]
        severity: Option<Severity>,

        #[arg(long)]
        selector: Option<String>,

        #[arg(long)]
        snippet: Option<String>,

        /// Language of the snippet (default: html)
        #[arg(long)]
        language: Option<String>,

        /// Violation id echoed in logs
        #[arg(long, default_value = "")]
        id: String,
    },

    /// List built-in remediation templates
    Templates,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    a11y_audit_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Audit {
            fixtures,
            concurrency,
            urls,
        } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_audit(&config, &fixtures, urls, concurrency).await
        }
        Commands::Score {
            criterion,
            severity,
            selector,
            snippet,
            description,
        } => cmd_score(&criterion, severity, selector, snippet, &description),
        Commands::Remediate {
            criterion,
            issue_type,
            description,
            severity,
            selector,
            snippet,
            language,
            id,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let request = RemediationRequest {
                violation_id: id,
                wcag_criterion: criterion,
                issue_type,
                description,
                severity,
                element_selector: selector,
                code_snippet: snippet,
                code_language: language,
            };
            cmd_remediate(&config, request).await
        }
        Commands::Templates => cmd_templates(),
    }
}

/// Defaults, then the config file if given, then environment overrides.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_router(config: &PipelineConfig) -> Result<Arc<RemediationRouter>> {
    let providers = ProviderRegistry::from_configs(&config.providers)
        .context("Failed to initialise model providers")?;
    debug!(providers = providers.len(), "providers configured");
    Ok(Arc::new(RemediationRouter::from_config(
        config,
        Arc::new(BuiltinTemplateStore::new()),
        providers,
        Arc::new(TracingDriftSink),
    )))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditReport {
    job_id: String,
    status: JobStatus,
    progress: JobProgress,
    results: Vec<AuditResultView>,
    metrics: MetricsSnapshot,
}

/// Audit `urls` against recorded fixtures
async fn cmd_audit(
    config: &PipelineConfig,
    fixtures: &Path,
    urls: Vec<String>,
    concurrency: Option<usize>,
) -> Result<()> {
    let renderer = FixtureRenderer::load(fixtures)
        .with_context(|| format!("Failed to load fixtures from {}", fixtures.display()))?;

    let targets = if urls.is_empty() {
        let mut all: Vec<String> = renderer.urls().cloned().collect();
        all.sort();
        all
    } else {
        urls
    };
    if targets.is_empty() {
        bail!("No URLs to audit");
    }

    let orchestrator = BatchAuditOrchestrator::new(
        Arc::new(renderer),
        build_router(config)?,
        config.orchestrator.clone(),
    );

    let job_id = orchestrator
        .submit(targets, concurrency)
        .await
        .context("Failed to submit audit job")?;
    info!(job_id = %job_id, "audit job submitted");

    let status = orchestrator.wait(&job_id).await?;
    let results = orchestrator.get_result_views(&job_id).await?;

    print_json(&AuditReport {
        job_id: job_id.to_string(),
        status: status.status,
        progress: status.progress,
        results,
        metrics: METRICS.snapshot(),
    })
}

fn score_finding(
    criterion: &str,
    severity: Severity,
    selector: Option<String>,
    snippet: Option<String>,
    description: &str,
) -> ConfidenceScore {
    let finding = RawFinding {
        element_selector: selector,
        code_snippet: snippet,
        ..RawFinding::new(criterion, "", severity, description)
    };
    scoring::score(&finding)
}

/// Score a single finding
fn cmd_score(
    criterion: &str,
    severity: Severity,
    selector: Option<String>,
    snippet: Option<String>,
    description: &str,
) -> Result<()> {
    print_json(&score_finding(
        criterion,
        severity,
        selector,
        snippet,
        description,
    ))
}

/// Route one violation through template, model and consensus tiers
async fn cmd_remediate(config: &PipelineConfig, request: RemediationRequest) -> Result<()> {
    let router = build_router(config)?;
    let response: RemediationResponse = router.remediate(request).await;
    print_json(&response)
}

/// List built-in templates
fn cmd_templates() -> Result<()> {
    let store = BuiltinTemplateStore::new();
    for template in store.templates() {
        println!("{:<7} {}", template.wcag_criterion, template.issue_type);
    }
    Ok(())
}
