//! Command line entry point for the sales forecasting pipeline
//!
//! Usage:
//!   sales-forecast prepare --raw-path /data/raw.csv --prepared-path /data/prep.csv
//!   sales-forecast train --model-dir /model
//!   sales-forecast infer --model-dir /model --output-dir /data --horizon 30
//!   sales-forecast run --config pipeline.json
//!
//! Settings are layered: defaults, then `--config`, then flags or their
//! `SALES_FORECAST_*` environment variables.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use sales_forecast::config::{ModelFamily, MonthActivity, MonthBasis, PipelineConfig, ReconcilerKind};
use sales_forecast::logging::init_logging;
use sales_forecast::pipeline;

/// Hierarchical daily sales forecasting
#[derive(Parser, Debug)]
#[command(name = "sales-forecast", version)]
#[command(about = "Prepare sales data, train per-series models and write reconciled forecasts")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,

    /// Emit JSON log lines
    #[arg(long, global = true, env = "SALES_FORECAST_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Complete raw sales into gap-free leaf series
    Prepare,
    /// Fit a model per series and save the bundle
    Train,
    /// Forecast, reconcile and export bottom-level predictions
    Infer,
    /// Prepare, train and infer in one go
    Run,
}

#[derive(Args, Debug, Default)]
struct Settings {
    /// JSON configuration file
    #[arg(long, global = true, env = "SALES_FORECAST_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "SALES_FORECAST_RAW_PATH")]
    raw_path: Option<PathBuf>,

    #[arg(long, global = true, env = "SALES_FORECAST_PREPARED_PATH")]
    prepared_path: Option<PathBuf>,

    #[arg(long, global = true, env = "SALES_FORECAST_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "SALES_FORECAST_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Minimum months with sales for a (store, item) pair
    #[arg(long, global = true, env = "SALES_FORECAST_MIN_MONTHS")]
    min_months: Option<usize>,

    /// Count months by calendar month or by date_block_num
    #[arg(long, global = true, env = "SALES_FORECAST_DATE_BLOCKS")]
    date_blocks: bool,

    /// Only count months with a non-zero daily total
    #[arg(long, global = true, env = "SALES_FORECAST_NON_ZERO_MONTHS")]
    non_zero_months: bool,

    /// chrono format of the raw date column
    #[arg(long, global = true, env = "SALES_FORECAST_DATE_FORMAT")]
    date_format: Option<String>,

    /// Forecast horizon in days
    #[arg(long, global = true, env = "SALES_FORECAST_HORIZON")]
    horizon: Option<usize>,

    /// auto_ets or ses
    #[arg(long, global = true, env = "SALES_FORECAST_MODEL")]
    model: Option<ModelFamily>,

    #[arg(long, global = true, env = "SALES_FORECAST_SEASON_LENGTH")]
    season_length: Option<usize>,

    /// Smoothing parameter of the ses model
    #[arg(long, global = true, env = "SALES_FORECAST_SES_ALPHA")]
    ses_alpha: Option<f64>,

    /// mint_ols, mint_wls_struct or bottom_up
    #[arg(long, global = true, env = "SALES_FORECAST_RECONCILER")]
    reconciler: Option<ReconcilerKind>,

    /// Allow negative reconciled forecasts
    #[arg(long, global = true, env = "SALES_FORECAST_ALLOW_NEGATIVE")]
    allow_negative: bool,

    /// Fit series on a single thread
    #[arg(long, global = true, env = "SALES_FORECAST_SEQUENTIAL")]
    sequential: bool,
}

impl Settings {
    fn resolve(self) -> Result<PipelineConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(v) = self.raw_path {
            config.raw_path = v;
        }
        if let Some(v) = self.prepared_path {
            config.prepared_path = v;
        }
        if let Some(v) = self.model_dir {
            config.model_dir = v;
        }
        if let Some(v) = self.output_dir {
            config.output_dir = v;
        }
        if let Some(v) = self.min_months {
            config.min_months = v;
        }
        if self.date_blocks {
            config.month_basis = MonthBasis::DateBlock;
        }
        if self.non_zero_months {
            config.month_activity = MonthActivity::NonZero;
        }
        if let Some(v) = self.date_format {
            config.date_format = v;
        }
        if let Some(v) = self.horizon {
            config.horizon = v;
        }
        if let Some(v) = self.model {
            config.model = v;
        }
        if let Some(v) = self.season_length {
            config.season_length = v;
        }
        if let Some(v) = self.ses_alpha {
            config.ses_alpha = v;
        }
        if let Some(v) = self.reconciler {
            config.reconciler = v;
        }
        if self.allow_negative {
            config.nonnegative = false;
        }
        if self.sequential {
            config.parallel = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn execute(command: Command, config: &PipelineConfig) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Prepare => {
            let s = pipeline::prepare(config)?;
            println!(
                "Prepared {} series ({} to {}) from {} rows into {}",
                s.leaves,
                s.start,
                s.end,
                s.events,
                s.output.display()
            );
        }
        Command::Train => {
            let s = pipeline::train(config)?;
            println!(
                "Trained {} over {} series ({} leaves, {} fallbacks) into {}",
                s.model_name,
                s.series,
                s.leaves,
                s.failures,
                s.bundle_path.display()
            );
        }
        Command::Infer => {
            let s = pipeline::infer(config)?;
            println!(
                "Wrote {} rows reconciled with {} to {}",
                s.rows,
                s.reconciler,
                s.predictions_path.display()
            );
        }
        Command::Run => {
            let s = pipeline::run(config)?;
            println!(
                "Prepared {} series, trained {} models, wrote {}",
                s.prepare.leaves,
                s.train.series,
                s.infer.predictions_path.display()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let result = cli
        .settings
        .resolve()
        .and_then(|config| {
            info!(command = ?cli.command, "starting");
            execute(cli.command, &config)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pipeline failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
