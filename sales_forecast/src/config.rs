//! Pipeline configuration
//!
//! Every path and tuning knob of the pipeline lives in [`PipelineConfig`].
//! Values come from defaults, an optional JSON file and then the command line.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How "months with sales" are counted for the history filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthBasis {
    /// Distinct (year, month) of the sale date
    #[default]
    CalendarMonth,
    /// Distinct `date_block_num` values
    DateBlock,
}

/// Which days make a month count towards the history filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthActivity {
    /// Any day with at least one sales record, even one netting to zero
    #[default]
    Recorded,
    /// Only days whose summed count is non-zero
    NonZero,
}

/// Which reconciliation method to apply at inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerKind {
    /// Minimum trace, identity weights
    #[default]
    MintOls,
    /// Minimum trace, structural scaling weights
    MintWlsStruct,
    /// Aggregate bottom-level forecasts
    BottomUp,
}

impl std::str::FromStr for ReconcilerKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mint_ols" | "ols" => Ok(Self::MintOls),
            "mint_wls_struct" | "wls_struct" => Ok(Self::MintWlsStruct),
            "bottom_up" | "bu" => Ok(Self::BottomUp),
            other => Err(ForecastError::InvalidParameter(format!(
                "Unknown reconciler: {}",
                other
            ))),
        }
    }
}

/// Model family fitted to every hierarchy series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Automatic ETS selection
    #[default]
    AutoEts,
    /// Simple exponential smoothing with a fixed alpha
    Ses,
}

impl std::str::FromStr for ModelFamily {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto_ets" | "ets" => Ok(Self::AutoEts),
            "ses" => Ok(Self::Ses),
            other => Err(ForecastError::InvalidParameter(format!(
                "Unknown model family: {}",
                other
            ))),
        }
    }
}

/// Configuration for a full prepare/train/infer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw daily sales CSV
    pub raw_path: PathBuf,
    /// Prepared (gap-filled) leaf series CSV
    pub prepared_path: PathBuf,
    /// Directory holding the model bundle
    pub model_dir: PathBuf,
    /// Directory receiving the predictions file
    pub output_dir: PathBuf,
    /// Minimum number of months with sales for a (store, item) pair
    pub min_months: usize,
    pub month_basis: MonthBasis,
    pub month_activity: MonthActivity,
    /// chrono format of the raw `date` column
    pub date_format: String,
    /// Forecast horizon in days
    pub horizon: usize,
    pub model: ModelFamily,
    /// Seasonal period in days used by AutoETS
    pub season_length: usize,
    /// Smoothing parameter of the `ses` family
    pub ses_alpha: f64,
    pub reconciler: ReconcilerKind,
    /// Force non-negative reconciled forecasts
    pub nonnegative: bool,
    /// Fit series on the rayon thread pool
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_path: PathBuf::from("/data/raw.csv"),
            prepared_path: PathBuf::from("/data/prep.csv"),
            model_dir: PathBuf::from("/model"),
            output_dir: PathBuf::from("/data"),
            min_months: 34,
            month_basis: MonthBasis::CalendarMonth,
            month_activity: MonthActivity::Recorded,
            date_format: "%d.%m.%Y".to_string(),
            horizon: 30,
            model: ModelFamily::AutoEts,
            season_length: 30,
            ses_alpha: 0.3,
            reconciler: ReconcilerKind::MintOls,
            nonnegative: true,
            parallel: true,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file; absent keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ForecastError::InvalidParameter(format!(
                "Cannot read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "horizon must be positive".to_string(),
            ));
        }
        if self.min_months == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_months must be positive".to_string(),
            ));
        }
        if self.season_length == 0 {
            return Err(ForecastError::InvalidParameter(
                "season_length must be positive".to_string(),
            ));
        }
        if !(self.ses_alpha > 0.0 && self.ses_alpha < 1.0) {
            return Err(ForecastError::InvalidParameter(
                "ses_alpha must be between 0 and 1".to_string(),
            ));
        }
        if self.date_format.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "date_format must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
