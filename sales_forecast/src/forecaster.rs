//! Per-level forecasting: one independent model per hierarchy series

use crate::error::{ForecastError, Result};
use crate::hierarchy::{HierarchicalData, HierarchySeries};
use crate::metrics::{forecast_accuracy, ForecastAccuracy};
use crate::models::{FittedModel, ForecastModel, TrainedForecastModel};
use crate::utils::future_dates;
use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Forecasts of many series over the same future dates
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTable {
    series_ids: Vec<String>,
    dates: Vec<NaiveDate>,
    /// series × dates
    values: Array2<f64>,
}

impl ForecastTable {
    pub fn new(series_ids: Vec<String>, dates: Vec<NaiveDate>, values: Array2<f64>) -> Result<Self> {
        if values.dim() != (series_ids.len(), dates.len()) {
            return Err(ForecastError::ForecastingError(format!(
                "Forecast values are {:?}, expected {} series x {} dates",
                values.dim(),
                series_ids.len(),
                dates.len()
            )));
        }
        Ok(Self {
            series_ids,
            dates,
            values,
        })
    }

    pub fn series_ids(&self) -> &[String] {
        &self.series_ids
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn horizon(&self) -> usize {
        self.dates.len()
    }

    pub fn index_of(&self, series_id: &str) -> Option<usize> {
        self.series_ids.iter().position(|s| s == series_id)
    }

    /// Forecast row of one series
    pub fn get(&self, series_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.index_of(series_id).map(|i| self.values.row(i))
    }

    /// `(date, value)` pairs of one series
    pub fn points(&self, series_id: &str) -> Option<Vec<(NaiveDate, f64)>> {
        self.get(series_id)
            .map(|row| self.dates.iter().copied().zip(row.iter().copied()).collect())
    }

    /// Same ids and dates with new values
    pub fn with_values(&self, values: Array2<f64>) -> Result<Self> {
        Self::new(self.series_ids.clone(), self.dates.clone(), values)
    }
}

/// Fitted model of one hierarchy series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesModel {
    pub series_id: String,
    pub model: FittedModel,
}

/// A series whose fit failed and got the fallback model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitFailure {
    pub series_id: String,
    pub reason: String,
}

/// Fitted models in hierarchy order plus isolated failures
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub models: Vec<SeriesModel>,
    pub failures: Vec<FitFailure>,
    /// In-sample accuracy per series, where the fit produced fitted values
    pub accuracy: Vec<(String, ForecastAccuracy)>,
}

/// Fits one model of family `M` to every series of a hierarchy
#[derive(Debug, Clone)]
pub struct LevelForecaster<M: ForecastModel> {
    model: M,
    parallel: bool,
}

impl<M: ForecastModel> LevelForecaster<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            parallel: true,
        }
    }

    /// Fit on the calling thread only
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    fn fit_one(&self, series: &HierarchySeries) -> (SeriesModel, Option<FitFailure>, Option<ForecastAccuracy>) {
        let outcome = self
            .model
            .fit(&series.values)
            .and_then(|fit| fit.model.validate().map(|()| fit));

        match outcome {
            Ok(fit) => {
                let accuracy = forecast_accuracy(&fit.fitted, &series.values).ok();
                debug!(
                    series = %series.id,
                    model = fit.model.name(),
                    rmse = accuracy.map(|a| a.rmse),
                    "fitted series"
                );
                (
                    SeriesModel {
                        series_id: series.id.clone(),
                        model: fit.model,
                    },
                    None,
                    accuracy,
                )
            }
            Err(e) => {
                warn!(series = %series.id, error = %e, "fit failed, substituting naive fallback");
                (
                    SeriesModel {
                        series_id: series.id.clone(),
                        model: FittedModel::fallback(&series.values),
                    },
                    Some(FitFailure {
                        series_id: series.id.clone(),
                        reason: e.to_string(),
                    }),
                    None,
                )
            }
        }
    }

    /// Fit every series independently
    ///
    /// A failing series never aborts the batch: it is reported in
    /// [`FitOutcome::failures`] and gets [`FittedModel::fallback`].
    pub fn fit_all(&self, hierarchy: &HierarchicalData) -> FitOutcome {
        let results: Vec<_> = if self.parallel {
            hierarchy
                .series()
                .par_iter()
                .map(|s| self.fit_one(s))
                .collect()
        } else {
            hierarchy.series().iter().map(|s| self.fit_one(s)).collect()
        };

        let mut models = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        let mut accuracy = Vec::new();
        for (model, failure, acc) in results {
            if let Some(acc) = acc {
                accuracy.push((model.series_id.clone(), acc));
            }
            failures.extend(failure);
            models.push(model);
        }

        let mean_rmse = if accuracy.is_empty() {
            None
        } else {
            Some(accuracy.iter().map(|(_, a)| a.rmse).sum::<f64>() / accuracy.len() as f64)
        };
        info!(
            model = self.model.name(),
            series = models.len(),
            failures = failures.len(),
            mean_rmse,
            "fitted all series"
        );

        FitOutcome {
            models,
            failures,
            accuracy,
        }
    }
}

/// Unreconciled forecasts of every series, `horizon` days past the history
pub fn forecast_all(
    models: &[SeriesModel],
    hierarchy: &HierarchicalData,
    horizon: usize,
) -> Result<ForecastTable> {
    if horizon == 0 {
        return Err(ForecastError::InvalidParameter(
            "horizon must be positive".to_string(),
        ));
    }
    if models.len() != hierarchy.series().len() {
        return Err(ForecastError::ArtifactMismatch(format!(
            "{} models for {} series",
            models.len(),
            hierarchy.series().len()
        )));
    }

    let dates = future_dates(hierarchy.last_date(), horizon)?;
    let mut values = Array2::<f64>::zeros((models.len(), horizon));

    for (i, (model, series)) in models.iter().zip(hierarchy.series()).enumerate() {
        if model.series_id != series.id {
            return Err(ForecastError::ArtifactMismatch(format!(
                "model for {} found where {} was expected",
                model.series_id, series.id
            )));
        }

        let forecast = match model.model.forecast(&series.values, horizon) {
            Ok(f) if f.is_finite() => f,
            Ok(_) => {
                warn!(series = %series.id, "non-finite forecast, substituting naive fallback");
                FittedModel::fallback(&series.values).forecast(&series.values, horizon)?
            }
            Err(e) => {
                warn!(series = %series.id, error = %e, "forecast failed, substituting naive fallback");
                FittedModel::fallback(&series.values).forecast(&series.values, horizon)?
            }
        };

        for (slot, v) in values.row_mut(i).iter_mut().zip(forecast.values()) {
            *slot = *v;
        }
    }

    ForecastTable::new(
        hierarchy.series().iter().map(|s| s.id.clone()).collect(),
        dates,
        values,
    )
}
