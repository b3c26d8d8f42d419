//! Sales data handling: raw events, leaf series and the prepared artifact

use crate::error::{ForecastError, Result};
use chrono::{Days, NaiveDate};
use polars::prelude::{CsvReader, DataFrame, DataType, SerReader, Series};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::path::Path;

/// Columns the raw sales file must carry
pub const RAW_COLUMNS: [&str; 5] = ["shop_id", "item_id", "date", "date_block_num", "item_cnt_day"];

/// Columns the prepared series file must carry
pub const PREPARED_COLUMNS: [&str; 4] = ["shop_id", "item_id", "ds", "y"];

/// Date format of the `ds` column in the prepared file
pub const PREPARED_DATE_FORMAT: &str = "%Y-%m-%d";

/// One recorded sale (or return) of an item in a store on a day
#[derive(Debug, Clone, PartialEq)]
pub struct SalesEvent {
    pub shop_id: i64,
    pub item_id: i64,
    pub date: NaiveDate,
    /// Consecutive month index as delivered by the source system
    pub date_block_num: i64,
    pub item_cnt_day: f64,
}

/// Identifier of a bottom-level series
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeafKey {
    pub shop_id: i64,
    pub item_id: i64,
}

impl LeafKey {
    pub fn new(shop_id: i64, item_id: i64) -> Self {
        Self { shop_id, item_id }
    }
}

impl fmt::Display for LeafKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shop_id, self.item_id)
    }
}

/// Complete daily series of one (store, item) pair
#[derive(Debug, Clone, PartialEq)]
pub struct LeafSeries {
    pub key: LeafKey,
    /// Daily values starting at the owning [`CompletedSeries::start`]
    pub values: Vec<f64>,
}

/// Gap-filled leaf series sharing one contiguous daily window
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSeries {
    start: NaiveDate,
    end: NaiveDate,
    leaves: Vec<LeafSeries>,
}

impl CompletedSeries {
    /// Build from leaves that all cover `start..=end`
    pub fn new(start: NaiveDate, end: NaiveDate, mut leaves: Vec<LeafSeries>) -> Result<Self> {
        if end < start {
            return Err(ForecastError::DataError(format!(
                "Window end {} precedes start {}",
                end, start
            )));
        }
        if leaves.is_empty() {
            return Err(ForecastError::NoQualifyingSeries(
                "no leaf series supplied".to_string(),
            ));
        }

        let expected = (end - start).num_days() as usize + 1;
        for leaf in &leaves {
            if leaf.values.len() != expected {
                return Err(ForecastError::DataError(format!(
                    "Series {} has {} days, window {}..={} needs {}",
                    leaf.key,
                    leaf.values.len(),
                    start,
                    end,
                    expected
                )));
            }
        }

        leaves.sort_by_key(|l| l.key);
        if leaves.windows(2).any(|w| w[0].key == w[1].key) {
            return Err(ForecastError::DataError(
                "Duplicate leaf series keys".to_string(),
            ));
        }

        Ok(Self { start, end, leaves })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Leaves ordered by (shop_id, item_id)
    pub fn leaves(&self) -> &[LeafSeries] {
        &self.leaves
    }

    /// Number of leaf series
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Number of days in the window
    pub fn days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Every calendar day of the window, in order
    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..self.days() as u64)
            .filter_map(|i| self.start.checked_add_days(Days::new(i)))
            .collect()
    }

    pub fn leaf(&self, key: LeafKey) -> Option<&LeafSeries> {
        self.leaves
            .binary_search_by_key(&key, |l| l.key)
            .ok()
            .map(|i| &self.leaves[i])
    }
}

#[derive(Debug, Serialize)]
struct PreparedRow<'a> {
    total: &'a str,
    shop_id: i64,
    item_id: i64,
    ds: String,
    y: f64,
}

/// Data loader for sales files
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load raw sales events from a CSV file
    ///
    /// Fails before any transformation when a required column is missing.
    pub fn load_sales<P: AsRef<Path>>(path: P, date_format: &str) -> Result<Vec<SalesEvent>> {
        let df = Self::read_csv(path.as_ref())?;
        Self::require_columns(&df, &RAW_COLUMNS, &path.as_ref().display().to_string())?;

        let shop_ids = Self::column_as_i64(&df, "shop_id")?;
        let item_ids = Self::column_as_i64(&df, "item_id")?;
        let blocks = Self::column_as_i64(&df, "date_block_num")?;
        let counts = Self::column_as_f64(&df, "item_cnt_day")?;
        let dates = Self::column_as_dates(&df, "date", date_format)?;

        let events = (0..df.height())
            .map(|i| SalesEvent {
                shop_id: shop_ids[i],
                item_id: item_ids[i],
                date: dates[i],
                date_block_num: blocks[i],
                item_cnt_day: counts[i],
            })
            .collect();

        Ok(events)
    }

    /// Load the prepared leaf series written by [`DataLoader::write_prepared`]
    pub fn load_prepared<P: AsRef<Path>>(path: P) -> Result<CompletedSeries> {
        let df = Self::read_csv(path.as_ref())?;
        Self::require_columns(&df, &PREPARED_COLUMNS, &path.as_ref().display().to_string())?;

        let shop_ids = Self::column_as_i64(&df, "shop_id")?;
        let item_ids = Self::column_as_i64(&df, "item_id")?;
        let dates = Self::column_as_dates(&df, "ds", PREPARED_DATE_FORMAT)?;
        let values = Self::column_as_f64(&df, "y")?;

        let mut by_key: BTreeMap<LeafKey, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        for i in 0..df.height() {
            let key = LeafKey::new(shop_ids[i], item_ids[i]);
            if by_key.entry(key).or_default().insert(dates[i], values[i]).is_some() {
                return Err(ForecastError::DataError(format!(
                    "Duplicate row for series {} on {}",
                    key, dates[i]
                )));
            }
        }

        let start = dates.iter().min().copied().ok_or_else(|| {
            ForecastError::NoQualifyingSeries("prepared file has no rows".to_string())
        })?;
        let end = dates.iter().max().copied().unwrap_or(start);
        let expected = (end - start).num_days() as usize + 1;

        let mut leaves = Vec::with_capacity(by_key.len());
        for (key, days) in by_key {
            if days.len() != expected {
                return Err(ForecastError::DataError(format!(
                    "Series {} covers {} of {} days in {}..={}; prepared series must be gap-free",
                    key,
                    days.len(),
                    expected,
                    start,
                    end
                )));
            }
            leaves.push(LeafSeries {
                key,
                values: days.into_values().collect(),
            });
        }

        CompletedSeries::new(start, end, leaves)
    }

    /// Write completed leaf series as `total,shop_id,item_id,ds,y`
    pub fn write_prepared<P: AsRef<Path>>(path: P, series: &CompletedSeries) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path.as_ref())?;
        let dates: Vec<String> = series
            .dates()
            .iter()
            .map(|d| d.format(PREPARED_DATE_FORMAT).to_string())
            .collect();

        for leaf in series.leaves() {
            for (ds, &y) in dates.iter().zip(leaf.values.iter()) {
                writer.serialize(PreparedRow {
                    total: crate::hierarchy::TOTAL_NAME,
                    shop_id: leaf.key.shop_id,
                    item_id: leaf.key.item_id,
                    ds: ds.clone(),
                    y,
                })?;
            }
        }
        writer.flush()?;

        Ok(())
    }

    fn read_csv(path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(Some(1000))
            .has_header(true)
            .finish()?;
        Ok(df)
    }

    /// Fail fast with every missing column named
    fn require_columns(df: &DataFrame, required: &[&str], source_name: &str) -> Result<()> {
        let present = df.get_column_names();
        let missing: Vec<String> = required
            .iter()
            .filter(|c| !present.contains(c))
            .map(|c| c.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ForecastError::MissingColumns {
                source_name: source_name.to_string(),
                columns: missing,
            })
        }
    }

    fn cast_column(df: &DataFrame, column_name: &str, dtype: &DataType) -> Result<Series> {
        let col = df.column(column_name).map_err(|e| {
            ForecastError::DataError(format!("Column '{}' not found: {}", column_name, e))
        })?;
        Ok(col.cast(dtype)?)
    }

    fn null_error(column_name: &str, row: usize) -> ForecastError {
        ForecastError::DataError(format!(
            "Column '{}' has a missing or malformed value at row {}",
            column_name,
            row + 1
        ))
    }

    fn column_as_i64(df: &DataFrame, column_name: &str) -> Result<Vec<i64>> {
        let series = Self::cast_column(df, column_name, &DataType::Int64)?;
        series
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| v.ok_or_else(|| Self::null_error(column_name, row)))
            .collect()
    }

    fn column_as_f64(df: &DataFrame, column_name: &str) -> Result<Vec<f64>> {
        let series = Self::cast_column(df, column_name, &DataType::Float64)?;
        series
            .f64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| match v {
                Some(v) if v.is_finite() => Ok(v),
                _ => Err(Self::null_error(column_name, row)),
            })
            .collect()
    }

    fn column_as_dates(df: &DataFrame, column_name: &str, format: &str) -> Result<Vec<NaiveDate>> {
        let series = Self::cast_column(df, column_name, &DataType::Utf8)?;
        series
            .utf8()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                let raw = v.ok_or_else(|| Self::null_error(column_name, row))?;
                NaiveDate::parse_from_str(raw.trim(), format).map_err(|e| {
                    ForecastError::ParseError(format!(
                        "Column '{}' row {}: '{}' doesn't match '{}': {}",
                        column_name,
                        row + 1,
                        raw,
                        format,
                        e
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_counts_leaves_and_days_counts_window() {
        let start = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 3, 10).unwrap();
        let completed = CompletedSeries::new(
            start,
            end,
            vec![LeafSeries {
                key: LeafKey::new(1, 1),
                values: vec![1.0; 10],
            }],
        )
        .unwrap();

        assert_eq!(completed.len(), 1);
        assert!(!completed.is_empty());
        assert_eq!(completed.days(), 10);
        assert_eq!(completed.dates().len(), 10);
    }
}
