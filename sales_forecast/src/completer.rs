//! Series completion: daily totals, history filter and zero filling

use crate::config::{MonthActivity, MonthBasis, PipelineConfig};
use crate::data::{CompletedSeries, LeafKey, LeafSeries, SalesEvent};
use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Settings for [`SeriesCompleter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleterConfig {
    /// Minimum distinct active months for a pair to be kept
    pub min_months: usize,
    pub month_basis: MonthBasis,
    pub month_activity: MonthActivity,
}

impl Default for CompleterConfig {
    fn default() -> Self {
        Self {
            min_months: 34,
            month_basis: MonthBasis::CalendarMonth,
            month_activity: MonthActivity::Recorded,
        }
    }
}

impl From<&PipelineConfig> for CompleterConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_months: config.min_months,
            month_basis: config.month_basis,
            month_activity: config.month_activity,
        }
    }
}

/// Per-day totals of one pair plus the source blocks of each day
#[derive(Debug, Default)]
struct PairHistory {
    daily: BTreeMap<NaiveDate, f64>,
    blocks_by_day: BTreeMap<NaiveDate, BTreeSet<i64>>,
}

impl PairHistory {
    fn active_months(&self, basis: MonthBasis, activity: MonthActivity) -> usize {
        let active_days = self
            .daily
            .iter()
            .filter(|&(_, &v)| activity == MonthActivity::Recorded || v != 0.0)
            .map(|(d, _)| d);

        match basis {
            MonthBasis::CalendarMonth => active_days
                .map(|d| (d.year(), d.month()))
                .collect::<BTreeSet<_>>()
                .len(),
            MonthBasis::DateBlock => active_days
                .filter_map(|d| self.blocks_by_day.get(d))
                .flatten()
                .collect::<BTreeSet<_>>()
                .len(),
        }
    }
}

/// Turns raw sales events into complete, gap-filled leaf series
#[derive(Debug, Clone, Default)]
pub struct SeriesCompleter {
    config: CompleterConfig,
}

impl SeriesCompleter {
    pub fn new(config: CompleterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompleterConfig {
        &self.config
    }

    /// Complete the series of every pair with enough sales history
    ///
    /// All kept pairs are reindexed over the same window, from the first to
    /// the last day observed among them, so that they can be summed date by
    /// date further up the hierarchy.
    pub fn complete(&self, events: &[SalesEvent]) -> Result<CompletedSeries> {
        if self.config.min_months == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_months must be positive".to_string(),
            ));
        }

        let mut pairs: BTreeMap<LeafKey, PairHistory> = BTreeMap::new();
        for event in events {
            let history = pairs
                .entry(LeafKey::new(event.shop_id, event.item_id))
                .or_default();
            *history.daily.entry(event.date).or_insert(0.0) += event.item_cnt_day;
            history
                .blocks_by_day
                .entry(event.date)
                .or_default()
                .insert(event.date_block_num);
        }

        let total_pairs = pairs.len();
        let kept: Vec<(LeafKey, PairHistory)> = pairs
            .into_iter()
            .filter(|(key, history)| {
                let months = history.active_months(self.config.month_basis, self.config.month_activity);
                let keep = months >= self.config.min_months;
                if !keep {
                    debug!(series = %key, months, "dropping series with short history");
                }
                keep
            })
            .collect();

        if kept.is_empty() {
            return Err(ForecastError::NoQualifyingSeries(format!(
                "none of {} store/item pairs has activity in at least {} months",
                total_pairs, self.config.min_months
            )));
        }

        let start = kept
            .iter()
            .filter_map(|(_, h)| h.daily.keys().next())
            .min()
            .copied()
            .ok_or_else(|| ForecastError::NoQualifyingSeries("no dated events".to_string()))?;
        let end = kept
            .iter()
            .filter_map(|(_, h)| h.daily.keys().next_back())
            .max()
            .copied()
            .unwrap_or(start);
        let days = (end - start).num_days() as usize + 1;

        let leaves = kept
            .into_iter()
            .map(|(key, history)| {
                let mut values = vec![0.0; days];
                for (date, total) in history.daily {
                    values[(date - start).num_days() as usize] = total;
                }
                LeafSeries { key, values }
            })
            .collect::<Vec<_>>();

        info!(
            kept = leaves.len(),
            dropped = total_pairs - leaves.len(),
            start = %start,
            end = %end,
            days,
            "completed leaf series"
        );

        CompletedSeries::new(start, end, leaves)
    }
}
