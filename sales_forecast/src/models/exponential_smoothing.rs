//! Simple exponential smoothing with a fixed smoothing parameter

use crate::error::{ForecastError, Result};
use crate::models::{degenerate_fit, FittedModel, ForecastModel, ModelFit};

/// Simple exponential smoothing model
#[derive(Debug, Clone)]
pub struct ExponentialSmoothing {
    /// Name of the model
    name: String,
    /// Smoothing parameter
    alpha: f64,
}

impl ExponentialSmoothing {
    /// Create a new exponential smoothing model
    pub fn new(alpha: f64) -> Result<Self> {
        if alpha <= 0.0 || alpha >= 1.0 {
            return Err(ForecastError::InvalidParameter(
                "Alpha must be between 0 and 1".to_string(),
            ));
        }

        Ok(Self {
            name: format!("Exponential Smoothing (alpha={})", alpha),
            alpha,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl ForecastModel for ExponentialSmoothing {
    fn fit(&self, values: &[f64]) -> Result<ModelFit> {
        if let Some(fit) = degenerate_fit(values)? {
            return Ok(fit);
        }

        // Level starts at the first observation; each prediction is the level before the update
        let mut level = values[0];
        let mut fitted = Vec::with_capacity(values.len());
        for &value in values {
            fitted.push(level);
            level = self.alpha * value + (1.0 - self.alpha) * level;
        }

        Ok(ModelFit {
            model: FittedModel::Smoothing {
                alpha: self.alpha,
                level,
            },
            fitted,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrainedForecastModel;

    #[test]
    fn test_level_follows_smoothing_formula() {
        let model = ExponentialSmoothing::new(0.3).unwrap();
        let values = [10.0, 20.0, 10.0];
        let fit = model.fit(&values).unwrap();

        // 10 -> 0.3*20 + 0.7*10 = 13 -> 0.3*10 + 0.7*13 = 12.1
        let FittedModel::Smoothing { level, .. } = fit.model else {
            panic!("expected a smoothing fit");
        };
        assert!((level - 12.1).abs() < 1e-12);
        assert_eq!(fit.model.forecast(&values, 2).unwrap().values(), &[level, level]);
        assert_eq!(fit.fitted, vec![10.0, 10.0, 13.0]);
    }

    #[test]
    fn test_parameter_validation() {
        assert!(ExponentialSmoothing::new(1.5).is_err());
        assert!(ExponentialSmoothing::new(0.0).is_err());
    }
}
