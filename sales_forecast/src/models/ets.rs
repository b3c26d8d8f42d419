//! Automatic exponential smoothing (ETS) backed by `augurs`
//!
//! Component selection and parameter estimation are delegated to
//! [`augurs::ets::AutoETS`]. The persisted [`EtsFit`] records the selection
//! request and the history length; forecasting refits on that history,
//! which is deterministic, so train and inference agree.

use crate::error::{ForecastError, Result};
use crate::models::{degenerate_fit, FittedModel, ForecastModel, ForecastResult, ModelFit, MIN_OBSERVATIONS};
use augurs::ets::{AutoETS, FittedAutoETS};
use augurs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Error, trend and season all chosen automatically
pub const SEASONAL_SPEC: &str = "ZZZ";
/// Error and trend chosen automatically, no seasonal component
pub const NON_SEASONAL_SPEC: &str = "ZZN";

/// AutoETS selection to replay on a series' history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtsFit {
    pub season_length: usize,
    /// `ZZZ` or `ZZN`
    pub spec: String,
    /// Length of the history the selection ran on
    pub nobs: usize,
}

impl EtsFit {
    pub fn is_seasonal(&self) -> bool {
        self.spec == SEASONAL_SPEC
    }

    pub fn name(&self) -> &str {
        if self.is_seasonal() {
            "AutoETS(ZZZ)"
        } else {
            "AutoETS(ZZN)"
        }
    }

    /// Reject states that cannot come out of [`AutoEts::fit`]
    pub fn validate(&self) -> Result<()> {
        if self.spec != SEASONAL_SPEC && self.spec != NON_SEASONAL_SPEC {
            return Err(ForecastError::InvalidParameter(format!(
                "unknown ETS spec '{}'",
                self.spec
            )));
        }
        if self.is_seasonal() && (self.season_length < 2 || self.nobs < 2 * self.season_length) {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonal ETS needs two full seasons of length >= 2, got season_length={} over {} observations",
                self.season_length, self.nobs
            )));
        }
        if self.season_length == 0 || self.nobs < MIN_OBSERVATIONS {
            return Err(ForecastError::InvalidParameter(format!(
                "ETS state has season_length={} and {} observations",
                self.season_length, self.nobs
            )));
        }
        Ok(())
    }

    fn select(&self, history: &[f64]) -> Result<FittedAutoETS> {
        let season_length = if self.is_seasonal() { self.season_length } else { 1 };
        let auto = AutoETS::new(season_length, self.spec.as_str())
            .map_err(|e| ForecastError::ForecastingError(format!("ETS init: {}", e)))?;
        auto.fit(history)
            .map_err(|e| ForecastError::ForecastingError(format!("ETS fit: {}", e)))
    }

    /// Point forecasts for steps `1..=horizon` after `history`
    pub fn forecast(&self, history: &[f64], horizon: usize) -> Result<ForecastResult> {
        self.validate()?;
        if history.len() != self.nobs {
            return Err(ForecastError::ArtifactMismatch(format!(
                "ETS state was selected on {} observations, history has {}",
                self.nobs,
                history.len()
            )));
        }
        let fitted = self.select(history)?;
        predict(&fitted, horizon)
    }
}

fn predict(fitted: &FittedAutoETS, horizon: usize) -> Result<ForecastResult> {
    let forecast = fitted
        .predict(horizon, None)
        .map_err(|e| ForecastError::ForecastingError(format!("ETS predict: {}", e)))?;
    ForecastResult::new(forecast.point, horizon)
}

/// ETS with automatic component selection
#[derive(Debug, Clone)]
pub struct AutoEts {
    name: String,
    season_length: usize,
}

impl AutoEts {
    /// Create a selector for daily series with the given seasonal period
    pub fn new(season_length: usize) -> Result<Self> {
        if season_length == 0 {
            return Err(ForecastError::InvalidParameter(
                "Season length must be positive".to_string(),
            ));
        }

        Ok(Self {
            name: format!("AutoETS (season_length={})", season_length),
            season_length,
        })
    }

    pub fn season_length(&self) -> usize {
        self.season_length
    }

    /// Specs to try in order; seasonal only with two full seasons of data
    fn specs_for(&self, n: usize) -> Vec<&'static str> {
        if self.season_length > 1 && n >= 2 * self.season_length {
            vec![SEASONAL_SPEC, NON_SEASONAL_SPEC]
        } else {
            vec![NON_SEASONAL_SPEC]
        }
    }
}

impl ForecastModel for AutoEts {
    fn fit(&self, values: &[f64]) -> Result<ModelFit> {
        if let Some(fit) = degenerate_fit(values)? {
            return Ok(fit);
        }

        let mut last_error = None;
        for spec in self.specs_for(values.len()) {
            let state = EtsFit {
                season_length: self.season_length,
                spec: spec.to_string(),
                nobs: values.len(),
            };
            let fitted = match state.select(values) {
                Ok(f) => f,
                Err(e) => {
                    debug!(spec, error = %e, "ETS selection failed");
                    last_error = Some(e);
                    continue;
                }
            };

            let next = predict(&fitted, 1)?;
            if !next.is_finite() {
                last_error = Some(ForecastError::ForecastingError(format!(
                    "{} produces non-finite forecasts",
                    state.name()
                )));
                continue;
            }

            let in_sample = fitted
                .predict_in_sample(None)
                .map(|f| f.point)
                .unwrap_or_default();
            return Ok(ModelFit {
                model: FittedModel::Ets(state),
                fitted: in_sample,
            });
        }

        Err(last_error.unwrap_or_else(|| {
            ForecastError::ForecastingError("No ETS spec applies".to_string())
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
