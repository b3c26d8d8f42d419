//! Persisted training output consumed by inference

use crate::error::{ForecastError, Result};
use crate::forecaster::{FitFailure, SeriesModel};
use crate::hierarchy::HierarchicalData;
use crate::models::FittedModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File written inside the model directory
pub const BUNDLE_FILE_NAME: &str = "hts_bundle.json";

/// Bumped whenever the bundle layout changes
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Hierarchy, summing matrix, tags and fitted models of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    /// Model family used for every series
    pub model_name: String,
    pub season_length: usize,
    pub hierarchy: HierarchicalData,
    /// One model per series, in hierarchy order
    pub models: Vec<SeriesModel>,
    pub failures: Vec<FitFailure>,
}

impl ModelBundle {
    pub fn new(
        model_name: impl Into<String>,
        season_length: usize,
        hierarchy: HierarchicalData,
        models: Vec<SeriesModel>,
        failures: Vec<FitFailure>,
    ) -> Result<Self> {
        let bundle = Self {
            format_version: BUNDLE_FORMAT_VERSION,
            created_at: Utc::now(),
            model_name: model_name.into(),
            season_length,
            hierarchy,
            models,
            failures,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn path_in<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(BUNDLE_FILE_NAME)
    }

    /// Write the bundle to `dir`, creating it if needed
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        self.validate()?;
        fs::create_dir_all(dir.as_ref())?;
        let path = Self::path_in(dir);
        let json = serde_json::to_string(self)?;
        fs::write(&path, json)?;
        info!(path = %path.display(), models = self.models.len(), "saved model bundle");
        Ok(path)
    }

    /// Read and validate the bundle stored in `dir`
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = Self::path_in(dir);
        let json = fs::read_to_string(&path).map_err(|e| {
            ForecastError::ArtifactMismatch(format!("cannot read {}: {}", path.display(), e))
        })?;
        let bundle: Self = serde_json::from_str(&json).map_err(|e| {
            ForecastError::ArtifactMismatch(format!("{} is not a model bundle: {}", path.display(), e))
        })?;
        bundle.validate()?;
        info!(path = %path.display(), models = bundle.models.len(), "loaded model bundle");
        Ok(bundle)
    }

    /// Check that every part of the bundle describes the same hierarchy
    pub fn validate(&self) -> Result<()> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(ForecastError::ArtifactMismatch(format!(
                "bundle format {} is not supported (expected {})",
                self.format_version, BUNDLE_FORMAT_VERSION
            )));
        }

        self.hierarchy
            .validate()
            .map_err(|e| ForecastError::ArtifactMismatch(e.to_string()))?;

        let series_ids: Vec<&str> = self.hierarchy.series().iter().map(|s| s.id.as_str()).collect();

        let matrix = self.hierarchy.matrix();
        if matrix.row_ids().iter().map(String::as_str).ne(series_ids.iter().copied()) {
            return Err(ForecastError::ArtifactMismatch(
                "summing matrix rows do not match the series".to_string(),
            ));
        }
        let first_leaf = self.hierarchy.first_leaf_row();
        if matrix.leaf_ids().iter().map(String::as_str).ne(series_ids[first_leaf..].iter().copied()) {
            return Err(ForecastError::ArtifactMismatch(
                "summing matrix columns do not match the bottom-level series".to_string(),
            ));
        }

        let tagged: BTreeSet<&str> = self
            .hierarchy
            .tags()
            .levels()
            .iter()
            .flat_map(|l| l.series_ids.iter().map(String::as_str))
            .collect();
        let known: BTreeSet<&str> = series_ids.iter().copied().collect();
        if tagged != known || self.hierarchy.tags().series_count() != series_ids.len() {
            return Err(ForecastError::ArtifactMismatch(
                "tag map does not cover exactly the hierarchy series".to_string(),
            ));
        }

        if self.models.len() != series_ids.len() {
            return Err(ForecastError::ArtifactMismatch(format!(
                "{} models for {} series",
                self.models.len(),
                series_ids.len()
            )));
        }
        if let Some((model, id)) = self
            .models
            .iter()
            .zip(series_ids.iter())
            .find(|(m, id)| m.series_id != **id)
        {
            return Err(ForecastError::ArtifactMismatch(format!(
                "model for {} found where {} was expected",
                model.series_id, id
            )));
        }
        for (model, series) in self.models.iter().zip(self.hierarchy.series()) {
            model.model.validate().map_err(|e| {
                ForecastError::ArtifactMismatch(format!("model for {} is unusable: {}", model.series_id, e))
            })?;
            if let FittedModel::Ets(fit) = &model.model {
                if fit.nobs != series.values.len() {
                    return Err(ForecastError::ArtifactMismatch(format!(
                        "model for {} was fitted on {} days, the series has {}",
                        model.series_id,
                        fit.nobs,
                        series.values.len()
                    )));
                }
            }
        }
        if let Some(failure) = self.failures.iter().find(|f| !known.contains(f.series_id.as_str())) {
            return Err(ForecastError::ArtifactMismatch(format!(
                "failure recorded for unknown series {}",
                failure.series_id
            )));
        }

        Ok(())
    }
}
