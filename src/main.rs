use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use weather_energy_pipeline::app::PipelineUseCase;
use weather_energy_pipeline::common::constants::DEFAULT_CONFIG_PATH;
use weather_energy_pipeline::common::{City, DateRange};
use weather_energy_pipeline::observability::init_logging;
use weather_energy_pipeline::pipeline::orchestrator::RunOutput;
use weather_energy_pipeline::pipeline::processing::quality_gate::QualityReport;
use weather_energy_pipeline::pipeline::storage::StoredRun;
use weather_energy_pipeline::pipeline::PipelineState;
use weather_energy_pipeline::PipelineConfig;

#[derive(Parser)]
#[command(name = "weather_energy_pipeline")]
#[command(about = "Fetch, merge and validate daily weather and electricity demand for five US cities")]
#[command(version)]
struct Cli {
    /// Directory for the rolling JSON log file
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fetch-merge-validate pipeline once
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// First day of the window (YYYY-MM-DD); requires --end
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day of the window (YYYY-MM-DD); requires --start
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Comma-separated city codes, e.g. NYC,SEA
        #[arg(long)]
        cities: Option<String>,
        /// Print the full run output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the latest stored run for the configured cities and window
    Report {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        cities: Option<String>,
    },
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    if path.exists() {
        return PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    warn!("Config file {} not found, using defaults", path.display());
    let config = PipelineConfig::default().with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn apply_overrides(
    mut config: PipelineConfig,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    cities: Option<String>,
) -> Result<PipelineConfig> {
    match (start, end) {
        (Some(start), Some(end)) => config.date_range = Some(DateRange::new(start, end)?),
        (None, None) => {}
        _ => bail!("--start and --end must be given together"),
    }
    if let Some(list) = cities {
        config.cities = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<City>())
            .collect::<std::result::Result<_, _>>()?;
    }
    config.validate()?;
    Ok(config)
}

fn print_report(report: &QualityReport) {
    println!(
        "   Slots: {} expected, {} present, {} partial, {} missing",
        report.expected, report.present, report.partial, report.missing
    );
    println!(
        "   Outliers: {} of {} values, conflicts: {}",
        report.outlier_count, report.metric_values, report.conflict_count
    );
    for (city, quality) in &report.cities {
        let latest = quality
            .latest_complete
            .map(|d| d.to_string())
            .unwrap_or_else(|| "none".to_string());
        println!(
            "   {:<4} present {:>3}  partial {:>3}  missing {:>3}  outliers {:>2}  latest {}{}",
            city.code(),
            quality.present,
            quality.partial,
            quality.missing,
            quality.outliers,
            latest,
            if quality.stale { "  (stale)" } else { "" }
        );
    }
}

fn print_run(output: &RunOutput) {
    let icon = match output.final_state {
        PipelineState::Done => "✅",
        PipelineState::Degraded => "⚠️ ",
        _ => "❌",
    };
    println!("\n{} Run {} finished: {}", icon, output.metadata.run_id, output.final_state);
    for reason in &output.reasons {
        println!("   - {}", reason);
    }
    if !output.notes.is_empty() {
        println!("\n📝 Notes:");
        for note in &output.notes {
            println!("   - {}", note);
        }
    }
    if let Some(report) = &output.report {
        println!("\n📊 Quality report:");
        print_report(report);
    }
    println!("\n   Observations: {}", output.dataset.len());
    println!("   Rejected records: {}", output.metadata.rejection_stats.total);
    if let Some(fp) = &output.metadata.fingerprint {
        println!("   Fingerprint: {}", fp);
    }
    println!("   Persisted: {}", output.metadata.persisted);
}

fn print_stored(run: &StoredRun) {
    println!(
        "\n📦 Stored run {} ({}) completed {}",
        run.run_id, run.verdict, run.completed_at
    );
    for reason in &run.reasons {
        println!("   - {}", reason);
    }
    print_report(&run.report);
    println!("   Observations: {}", run.dataset.len());
    println!("   Fingerprint: {}", run.fingerprint);
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli.log_dir);
    let run_date = Utc::now().date_naive();

    match cli.command {
        Commands::Run {
            config,
            start,
            end,
            cities,
            json,
        } => {
            let config = apply_overrides(load_config(&config)?, start, end, cities)?;
            println!("🚀 Running pipeline for {} city(ies)...", config.cities.len());
            let use_case = PipelineUseCase::from_config(config)?;

            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Shutdown signal received, cancelling run");
                    signal_cancel.cancel();
                }
            });

            let output = use_case.run(run_date, &cancel).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_run(&output);
            }
            info!(final_state = %output.final_state, "Exiting");
            Ok(match output.final_state {
                PipelineState::Rejected => ExitCode::from(2),
                _ => ExitCode::SUCCESS,
            })
        }
        Commands::Report {
            config,
            start,
            end,
            cities,
        } => {
            let config = apply_overrides(load_config(&config)?, start, end, cities)?;
            let use_case = PipelineUseCase::from_config(config)?;
            match use_case.latest_run(run_date).await? {
                Some(run) => {
                    print_stored(&run);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    println!("No stored run for {}", use_case.orchestrator().run_key(run_date));
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}
