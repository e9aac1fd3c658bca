use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod gateway;
mod ingest;
mod model;
mod pipeline;
mod telemetry;
#[cfg(test)]
mod testing;

use ingest::{CommentRecord, Fixture};
use model::config::{ProviderKind, RunConfig};
use pipeline::PipelineOrchestrator;

/// Organize free-text comments into a topic taxonomy of quote-grounded
/// claims, emitted as a structured JSON report.
#[derive(Debug, Parser)]
#[command(name = "t3c", version, about)]
struct Cli {
    /// Path to a CSV file containing comments
    #[arg(long, conflicts_with_all = ["test_data", "comments"])]
    csv_file: Option<PathBuf>,

    /// Use a built-in test corpus
    #[arg(long, value_enum, conflicts_with = "comments")]
    test_data: Option<Fixture>,

    /// Comments to analyze, given directly on the command line
    #[arg(long, num_args = 1..)]
    comments: Vec<String>,

    /// Column holding the comments in the CSV file
    #[arg(long, default_value = "comment")]
    csv_column: String,

    /// Model provider
    #[arg(long, value_enum)]
    provider: Option<ProviderKind>,

    /// Model name override (defaults to the provider's standard model)
    #[arg(long)]
    model: Option<String>,

    /// Name for this run (auto-generated if not provided)
    #[arg(long)]
    run_name: Option<String>,

    /// Directory for the structured JSON output
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Token-overlap similarity at which claims merge (0.0-1.0)
    #[arg(long)]
    similarity_threshold: Option<f64>,

    /// Concurrent claim-extraction calls
    #[arg(long)]
    concurrency: Option<usize>,

    /// Cluster duplicates with the heuristic only, skipping model calls
    #[arg(long)]
    no_llm_dedup: bool,

    /// Check every provider's API key and exit
    #[arg(long)]
    validate_env: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Load .env file if present (ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.validate_env {
        return validate_environment();
    }

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!("{}", message);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let records = load_comments(&cli)?;
    let config = resolve_config(&cli);
    let run_name = generate_run_name(&cli, config.provider);

    tracing::info!(
        run_name = %run_name,
        provider = config.provider.name(),
        model = config.resolved_model(),
        comments = records.len(),
        "Starting pipeline run"
    );

    let gateway = gateway::create_gateway(&config).map_err(|e| e.to_string())?;
    let orchestrator = PipelineOrchestrator::new(gateway, config);

    // Ctrl-C aborts between stages; in-flight calls drain on their own
    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run at next stage boundary");
            cancel.cancel();
        }
    });

    let report = orchestrator
        .run(records, &run_name)
        .await
        .map_err(|failure| failure.to_string())?;

    let output_path = write_report(&cli.output_dir, &run_name, &report.document)
        .map_err(|e| format!("failed to write output: {}", e))?;

    tracing::info!(
        output = %output_path.display(),
        topics = report.stats.topics,
        claims = report.stats.claims,
        merged_claims = report.stats.merged_claims,
        warnings = report.warnings.len(),
        cost_usd = format!("{:.4}", report.costs.estimated_cost),
        "Run finished"
    );

    Ok(())
}

fn load_comments(cli: &Cli) -> Result<Vec<CommentRecord>, String> {
    if let Some(path) = &cli.csv_file {
        ingest::load_from_csv(path, &cli.csv_column).map_err(|e| e.to_string())
    } else if let Some(fixture) = cli.test_data {
        Ok(ingest::fixture(fixture))
    } else if !cli.comments.is_empty() {
        ingest::load_from_list(&cli.comments).map_err(|e| e.to_string())
    } else {
        Err("no data source specified: use --csv-file, --test-data or --comments".to_string())
    }
}

fn resolve_config(cli: &Cli) -> RunConfig {
    let mut config = RunConfig::from_env();
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if cli.model.is_some() {
        config.model = cli.model.clone();
    }
    if let Some(threshold) = cli.similarity_threshold {
        config.similarity_threshold = threshold;
    }
    if let Some(concurrency) = cli.concurrency {
        config.claims_concurrency = concurrency.max(1);
    }
    if cli.no_llm_dedup {
        config.use_llm_dedup = false;
    }
    config
}

fn generate_run_name(cli: &Cli, provider: ProviderKind) -> String {
    if let Some(name) = &cli.run_name {
        return name.clone();
    }

    let base = if let Some(path) = &cli.csv_file {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "csv".to_string())
    } else if let Some(fixture) = cli.test_data {
        fixture.name().to_string()
    } else {
        "custom_comments".to_string()
    };

    let suffix = match provider {
        ProviderKind::OpenAi => "openai",
        ProviderKind::OpenRouter => "openrouter",
    };
    format!("{base}_{suffix}")
}

fn write_report(
    output_dir: &Path,
    run_name: &str,
    document: &model::report::OutputDocument,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{run_name}_structured_output.json"));
    let json = document
        .to_json_pretty()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let mut file = std::fs::File::create(&path)?;
    file.write_all(json.as_bytes())?;
    Ok(path)
}

fn validate_environment() -> std::process::ExitCode {
    let mut all_valid = true;
    for provider in [ProviderKind::OpenAi, ProviderKind::OpenRouter] {
        match provider.api_key() {
            Ok(_) => tracing::info!(provider = provider.name(), "API key present"),
            Err(e) => {
                all_valid = false;
                tracing::warn!(provider = provider.name(), error = %e, "API key invalid or missing");
            }
        }
    }
    if all_valid {
        tracing::info!("Environment validation passed");
        std::process::ExitCode::SUCCESS
    } else {
        tracing::error!("Environment validation failed");
        std::process::ExitCode::FAILURE
    }
}
