mod display;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use contrisk_core::{AnalysisConfig, RiskDictionary, RiskReport};
use contrisk_host::{AnalysisError, Analyzer, TracingRecorder, spawn_recorder};
use tracing_subscriber::EnvFilter;

const AUDIT_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "contrisk", version, about = "Contract risk assessment")]
struct Cli {
    /// TOML analysis config; built-in defaults when omitted.
    #[arg(long, global = true, env = "CONTRISK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse plain-text contracts and print a risk report for each.
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Document id; only valid with a single file. Defaults to the file stem.
        #[arg(long)]
        document_id: Option<String>,

        #[arg(long, value_enum, default_value_t = Format::Card)]
        format: Format,

        /// Override `model_timeout_ms` from the config.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the effective risk dictionary.
    Dictionary,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Card,
    Json,
    Table,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze {
            files,
            document_id,
            format,
            timeout_ms,
        } => {
            if document_id.is_some() && files.len() > 1 {
                anyhow::bail!("--document-id can only be used with a single file");
            }
            if let Some(ms) = timeout_ms {
                config.model_timeout_ms = ms;
            }
            analyze(&config, &files, document_id, format).await
        }
        Command::Dictionary => {
            let dictionary =
                RiskDictionary::from_config(&config).context("invalid risk dictionary")?;
            print!("{}", display::render_dictionary(&dictionary));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

async fn analyze(
    config: &AnalysisConfig,
    files: &[PathBuf],
    document_id: Option<String>,
    format: Format,
) -> anyhow::Result<()> {
    let (sink, recorder) = spawn_recorder(TracingRecorder, AUDIT_CAPACITY);
    let analyzer = Analyzer::with_builtin_models(config)
        .context("invalid analysis config")?
        .with_audit_sink(sink);

    let outcome = analyze_files(&analyzer, files, document_id.as_deref(), |report| {
        print_report(report, format)
    })
    .await?;

    drop(analyzer);
    let recorded = recorder.await.context("audit recorder task panicked")?;
    tracing::info!(
        documents = files.len(),
        analyzed = outcome.analyzed,
        failed = outcome.failed,
        recorded,
        "batch complete"
    );

    if outcome.failed > 0 {
        anyhow::bail!("{} of {} documents failed", outcome.failed, files.len());
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BatchOutcome {
    analyzed: usize,
    failed: usize,
}

/// Analyse each file in turn. Unreadable files and failed analyses are
/// logged and counted; only Ctrl-C or an `emit` error stops the batch.
async fn analyze_files(
    analyzer: &Analyzer,
    files: &[PathBuf],
    document_id: Option<&str>,
    mut emit: impl FnMut(&RiskReport) -> anyhow::Result<()>,
) -> anyhow::Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    for path in files {
        let id = match document_id {
            Some(id) => id.to_string(),
            None => file_document_id(path),
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    document_id = %id,
                    path = %path.display(),
                    error = %e,
                    "failed to read document"
                );
                outcome.failed += 1;
                continue;
            }
        };

        match analyzer.analyze_until(&id, &text, interrupted()).await {
            Ok(report) => {
                emit(&report)?;
                outcome.analyzed += 1;
            }
            Err(e) => {
                tracing::error!(document_id = %e.document_id(), error = %e, "analysis failed");
                outcome.failed += 1;
                if matches!(e, AnalysisError::Cancelled { .. }) {
                    break;
                }
            }
        }
    }
    Ok(outcome)
}

fn print_report(report: &RiskReport, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Card => print!("{}", display::render_card(report)),
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Table => {
            println!("{} ({})", report.document_id, report.overall_risk_level);
            println!("{}", display::render_table(report)?);
        }
    }
    Ok(())
}

fn file_document_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
