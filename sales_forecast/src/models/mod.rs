//! Forecasting models for daily sales series

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt::Debug;

pub mod ets;
pub mod exponential_smoothing;

pub use ets::{AutoEts, EtsFit, NON_SEASONAL_SPEC, SEASONAL_SPEC};
pub use exponential_smoothing::ExponentialSmoothing;

/// Variance below which a series is treated as constant
const CONSTANT_VARIANCE: f64 = 1e-10;

/// Minimum observations for a smoothing fit
pub const MIN_OBSERVATIONS: usize = 3;

/// Forecast result containing predicted values
#[derive(Debug, Clone)]
pub struct ForecastResult {
    /// Forecasted values
    pub(crate) values: Vec<f64>,
    /// Number of periods forecasted
    horizons: usize,
}

impl ForecastResult {
    /// Create a new forecast result
    pub fn new(values: Vec<f64>, horizons: usize) -> Result<Self> {
        if values.len() != horizons {
            return Err(ForecastError::ForecastingError(format!(
                "Values length ({}) doesn't match horizons ({})",
                values.len(),
                horizons
            )));
        }

        Ok(Self { values, horizons })
    }

    /// Get the forecasted values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Get the number of periods forecasted
    pub fn horizons(&self) -> usize {
        self.horizons
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// A fitted model with its persisted state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    /// Automatic exponential smoothing, replayed on the series history
    Ets(EtsFit),
    /// Simple exponential smoothing: repeat the final level
    Smoothing { alpha: f64, level: f64 },
    /// Degenerate series: repeat a constant
    Constant { value: f64 },
    /// Fallback: repeat the last observation
    Naive { last: f64 },
}

impl FittedModel {
    /// Model substituted when a fit fails or a forecast is unusable
    pub fn fallback(values: &[f64]) -> Self {
        let last = values
            .iter()
            .rev()
            .copied()
            .find(|v| v.is_finite())
            .unwrap_or(0.0);
        FittedModel::Naive { last }
    }

    /// Check that the persisted state can produce a forecast
    pub fn validate(&self) -> Result<()> {
        let finite = |name: &str, v: f64| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(ForecastError::InvalidParameter(format!("{} is {}", name, v)))
            }
        };
        match self {
            FittedModel::Ets(fit) => fit.validate(),
            FittedModel::Smoothing { alpha, level } => {
                if !(*alpha > 0.0 && *alpha < 1.0) {
                    return Err(ForecastError::InvalidParameter(format!(
                        "alpha {} is outside (0, 1)",
                        alpha
                    )));
                }
                finite("level", *level)
            }
            FittedModel::Constant { value } => finite("constant", *value),
            FittedModel::Naive { last } => finite("last observation", *last),
        }
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug {
    /// Generate forecast for the periods following `history`
    ///
    /// `history` is the series the model was fitted on.
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<ForecastResult>;

    /// Name of the model
    fn name(&self) -> &str;
}

impl TrainedForecastModel for FittedModel {
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<ForecastResult> {
        match self {
            FittedModel::Ets(fit) => fit.forecast(history, horizon),
            FittedModel::Smoothing { level, .. } => ForecastResult::new(vec![*level; horizon], horizon),
            FittedModel::Constant { value } => ForecastResult::new(vec![*value; horizon], horizon),
            FittedModel::Naive { last } => ForecastResult::new(vec![*last; horizon], horizon),
        }
    }

    fn name(&self) -> &str {
        match self {
            FittedModel::Ets(fit) => fit.name(),
            FittedModel::Smoothing { .. } => "SES",
            FittedModel::Constant { .. } => "Constant",
            FittedModel::Naive { .. } => "Naive",
        }
    }
}

/// Output of [`ForecastModel::fit`]
#[derive(Debug, Clone)]
pub struct ModelFit {
    pub model: FittedModel,
    /// One-step-ahead in-sample predictions, aligned with the input
    pub fitted: Vec<f64>,
}

/// Forecast model that can be fitted to one series
pub trait ForecastModel: Debug + Send + Sync {
    /// Fit the model to a series of daily values
    fn fit(&self, values: &[f64]) -> Result<ModelFit>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

/// Models for series a smoothing fit cannot or need not handle
///
/// Returns `None` when the series should go through the regular fit.
pub fn degenerate_fit(values: &[f64]) -> Result<Option<ModelFit>> {
    if values.is_empty() {
        return Err(ForecastError::DataError(
            "Empty time series data".to_string(),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::DataError(
            "Time series contains non-finite values".to_string(),
        ));
    }

    let variance = if values.len() > 1 {
        values.iter().variance()
    } else {
        0.0
    };
    if variance < CONSTANT_VARIANCE {
        let value = values.iter().mean();
        return Ok(Some(ModelFit {
            model: FittedModel::Constant { value },
            fitted: vec![value; values.len()],
        }));
    }

    if values.len() < MIN_OBSERVATIONS {
        let mut fitted = Vec::with_capacity(values.len());
        fitted.push(values[0]);
        fitted.extend_from_slice(&values[..values.len() - 1]);
        return Ok(Some(ModelFit {
            model: FittedModel::fallback(values),
            fitted,
        }));
    }

    Ok(None)
}
