//! Accuracy metrics for in-sample fit diagnostics

use crate::error::{ForecastError, Result};

/// Forecast accuracy metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Symmetric Mean Absolute Percentage Error, zero-safe
    pub smape: f64,
}

/// Calculate accuracy metrics for a forecast vs actual values
pub fn forecast_accuracy(forecast: &[f64], actual: &[f64]) -> Result<ForecastAccuracy> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(ForecastError::DataError(
            "Forecast and actual values must have the same non-zero length".to_string(),
        ));
    }

    let n = forecast.len() as f64;

    let errors: Vec<f64> = forecast
        .iter()
        .zip(actual.iter())
        .map(|(&f, &a)| a - f)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e.powi(2)).sum::<f64>() / n;
    let rmse = mse.sqrt();

    // Sales series have many zero days, so plain MAPE is undefined
    let smape = actual
        .iter()
        .zip(forecast.iter())
        .map(|(&a, &f)| {
            let denom = a.abs() + f.abs();
            if denom == 0.0 {
                0.0
            } else {
                200.0 * (a - f).abs() / denom
            }
        })
        .sum::<f64>()
        / n;

    Ok(ForecastAccuracy {
        mae,
        mse,
        rmse,
        smape,
    })
}

impl std::fmt::Display for ForecastAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MAE {:.4}, RMSE {:.4}, SMAPE {:.2}%",
            self.mae, self.rmse, self.smape
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_accuracy_values() {
        let acc = forecast_accuracy(&[1.0, 2.0, 3.0], &[2.0, 2.0, 1.0]).unwrap();
        assert_relative_eq!(acc.mae, 1.0);
        assert_relative_eq!(acc.mse, 5.0 / 3.0);
        assert_relative_eq!(acc.rmse, (5.0f64 / 3.0).sqrt());
    }

    #[test]
    fn test_zero_days_are_handled() {
        let acc = forecast_accuracy(&[0.0, 0.0], &[0.0, 0.0]).unwrap();
        assert_eq!(acc.smape, 0.0);
        assert!(forecast_accuracy(&[], &[]).is_err());
        assert!(forecast_accuracy(&[1.0], &[1.0, 2.0]).is_err());
    }
}
