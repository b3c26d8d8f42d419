//! Prepare, train and infer stages wired together

use crate::artifacts::ModelBundle;
use crate::completer::SeriesCompleter;
use crate::config::{ModelFamily, PipelineConfig};
use crate::data::{CompletedSeries, DataLoader};
use crate::error::Result;
use crate::export::ForecastExporter;
use crate::forecaster::{forecast_all, ForecastTable, LevelForecaster};
use crate::hierarchy::{HierarchicalData, HierarchyBuilder};
use crate::models::{AutoEts, ExponentialSmoothing, ForecastModel};
use crate::reconcile::{check_coherence, reconciler_for, COHERENCE_TOLERANCE};
use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use tracing::info;

/// Result of the prepare stage
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareSummary {
    pub events: usize,
    pub leaves: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub output: PathBuf,
}

/// Result of the train stage
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub model_name: String,
    pub series: usize,
    pub leaves: usize,
    pub failures: usize,
    pub bundle_path: PathBuf,
}

/// Result of the infer stage
#[derive(Debug, Clone, PartialEq)]
pub struct InferSummary {
    pub reconciler: String,
    pub rows: usize,
    pub predictions_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub prepare: PrepareSummary,
    pub train: TrainSummary,
    pub infer: InferSummary,
}

/// Base and reconciled forecasts of every series
#[derive(Debug, Clone)]
pub struct HierarchicalForecast {
    pub base: ForecastTable,
    pub reconciled: ForecastTable,
}

/// Raw sales file to gap-free leaf series file
pub fn prepare(config: &PipelineConfig) -> Result<PrepareSummary> {
    config.validate()?;
    info!(path = %config.raw_path.display(), "preparing sales data");

    let events = DataLoader::load_sales(&config.raw_path, &config.date_format)?;
    let completed = SeriesCompleter::new(config.into()).complete(&events)?;
    DataLoader::write_prepared(&config.prepared_path, &completed)?;

    let summary = PrepareSummary {
        events: events.len(),
        leaves: completed.leaves().len(),
        start: completed.start(),
        end: completed.end(),
        output: config.prepared_path.clone(),
    };
    info!(
        events = summary.events,
        leaves = summary.leaves,
        start = %summary.start,
        end = %summary.end,
        "prepared data"
    );
    Ok(summary)
}

/// Build the hierarchy and fit every series without touching the disk
pub fn train_in_memory(completed: &CompletedSeries, config: &PipelineConfig) -> Result<ModelBundle> {
    config.validate()?;
    let hierarchy = HierarchyBuilder::default().build(completed)?;
    match config.model {
        ModelFamily::AutoEts => fit_bundle(AutoEts::new(config.season_length)?, hierarchy, config),
        ModelFamily::Ses => fit_bundle(ExponentialSmoothing::new(config.ses_alpha)?, hierarchy, config),
    }
}

fn fit_bundle<M: ForecastModel>(
    model: M,
    hierarchy: HierarchicalData,
    config: &PipelineConfig,
) -> Result<ModelBundle> {
    let forecaster = LevelForecaster::new(model).with_parallel(config.parallel);
    let outcome = forecaster.fit_all(&hierarchy);

    ModelBundle::new(
        forecaster.model().name(),
        config.season_length,
        hierarchy,
        outcome.models,
        outcome.failures,
    )
}

/// Prepared file to model bundle on disk
pub fn train(config: &PipelineConfig) -> Result<TrainSummary> {
    info!(path = %config.prepared_path.display(), "training");
    let completed = DataLoader::load_prepared(&config.prepared_path)?;
    let bundle = train_in_memory(&completed, config)?;
    let bundle_path = bundle.save(&config.model_dir)?;

    Ok(TrainSummary {
        model_name: bundle.model_name.clone(),
        series: bundle.hierarchy.series().len(),
        leaves: bundle.hierarchy.leaf_keys().len(),
        failures: bundle.failures.len(),
        bundle_path,
    })
}

/// Base forecasts of a bundle, reconciled and checked for coherence
pub fn forecast_bundle(bundle: &ModelBundle, config: &PipelineConfig) -> Result<HierarchicalForecast> {
    config.validate()?;
    let base = forecast_all(&bundle.models, &bundle.hierarchy, config.horizon)?;
    let reconciler = reconciler_for(config.reconciler, config.nonnegative);
    let reconciled = reconciler.reconcile(&base, &bundle.hierarchy)?;
    check_coherence(&reconciled, &bundle.hierarchy, COHERENCE_TOLERANCE)?;
    Ok(HierarchicalForecast { base, reconciled })
}

/// Model bundle to predictions file
pub fn infer(config: &PipelineConfig) -> Result<InferSummary> {
    info!(path = %config.model_dir.display(), horizon = config.horizon, "running inference");
    let bundle = ModelBundle::load(&config.model_dir)?;
    let forecast = forecast_bundle(&bundle, config)?;
    let rows = ForecastExporter::leaf_rows(&forecast.reconciled, &forecast.base, &bundle.hierarchy)?;
    let predictions_path = ForecastExporter::write(&config.output_dir, &rows, Utc::now())?;

    Ok(InferSummary {
        reconciler: reconciler_for(config.reconciler, config.nonnegative).name(),
        rows: rows.len(),
        predictions_path,
    })
}

/// All three stages in order
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let prepare = prepare(config)?;
    let train = train(config)?;
    let infer = infer(config)?;
    Ok(RunSummary {
        prepare,
        train,
        infer,
    })
}
