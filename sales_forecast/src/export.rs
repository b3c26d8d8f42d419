//! Writing reconciled bottom-level forecasts

use crate::error::{ForecastError, Result};
use crate::forecaster::ForecastTable;
use crate::hierarchy::HierarchicalData;
use crate::utils::timestamp_suffix;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// One exported forecast of one (store, item) on one date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    pub shop_id: i64,
    pub item_id: i64,
    #[serde(serialize_with = "serialize_date")]
    pub ds: NaiveDate,
    /// Reconciled forecast
    pub forecast: f64,
    /// Forecast of the series' own model before reconciliation
    pub base_forecast: f64,
}

fn serialize_date<S: serde::Serializer>(date: &NaiveDate, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&date.format(crate::data::PREPARED_DATE_FORMAT))
}

/// Selects and writes the leaf-level forecasts
#[derive(Debug)]
pub struct ForecastExporter;

impl ForecastExporter {
    /// File name of a predictions file generated at `at`
    pub fn file_name(at: DateTime<Utc>) -> String {
        format!("predictions_{}.csv", timestamp_suffix(at))
    }

    /// Rows of every bottom-level series, ordered by series then date
    pub fn leaf_rows(
        reconciled: &ForecastTable,
        base: &ForecastTable,
        hierarchy: &HierarchicalData,
    ) -> Result<Vec<ForecastRow>> {
        if reconciled.dates() != base.dates() {
            return Err(ForecastError::DataError(
                "reconciled and base forecasts cover different dates".to_string(),
            ));
        }

        let leaf_ids = hierarchy
            .tags()
            .leaf_level()
            .map(|tag| tag.series_ids.as_slice())
            .unwrap_or_default();
        let first_leaf = hierarchy.first_leaf_row();

        let mut rows = Vec::with_capacity(leaf_ids.len() * reconciled.horizon());
        for id in leaf_ids {
            let key = hierarchy
                .index_of(id)
                .and_then(|i| i.checked_sub(first_leaf))
                .and_then(|j| hierarchy.leaf_keys().get(j))
                .ok_or_else(|| ForecastError::HierarchyError(format!("{} is not a leaf series", id)))?;
            let (Some(forecast), Some(base_forecast)) = (reconciled.get(id), base.get(id)) else {
                return Err(ForecastError::DataError(format!(
                    "No forecast for series {}",
                    id
                )));
            };

            for ((ds, f), b) in reconciled.dates().iter().zip(forecast.iter()).zip(base_forecast.iter()) {
                rows.push(ForecastRow {
                    shop_id: key.shop_id,
                    item_id: key.item_id,
                    ds: *ds,
                    forecast: *f,
                    base_forecast: *b,
                });
            }
        }

        Ok(rows)
    }

    /// Write rows to `dir/predictions_<YYYYMMDD_HHMMSS>.csv`
    pub fn write<P: AsRef<Path>>(dir: P, rows: &[ForecastRow], generated_at: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(Self::file_name(generated_at));

        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = rows.len(), "wrote predictions");
        Ok(path)
    }
}
