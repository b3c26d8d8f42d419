//! Utility functions for the sales_forecast crate

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};

/// Daily dates following `last`, one per forecast step
pub fn future_dates(last: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>> {
    (1..=horizon as u64)
        .map(|i| {
            last.checked_add_days(Days::new(i)).ok_or_else(|| {
                ForecastError::DataError(format!("Date overflow {} days after {}", i, last))
            })
        })
        .collect()
}

/// `YYYYMMDD_HHMMSS` stamp embedded in output file names
pub fn timestamp_suffix(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}
