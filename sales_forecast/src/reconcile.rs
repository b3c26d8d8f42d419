//! Forecast reconciliation
//!
//! Base forecasts produced independently per series rarely add up across
//! the hierarchy. A [`Reconciler`] maps them onto a coherent table where
//! every aggregate equals the sum of its children on every date.
//!
//! [`MinTrace`] solves `ỹ = S (SᵀWS)⁻¹ SᵀW ŷ` for each forecast date,
//! with `W` the identity (`Ols`) or the inverse row sums of `S`
//! (`WlsStruct`). With `nonnegative` set, any date whose solution has a
//! negative leaf is solved again as the same weighted least squares
//! problem constrained to nonnegative leaves. [`BottomUp`] simply
//! aggregates the leaf forecasts.

use crate::config::ReconcilerKind;
use crate::error::{ForecastError, Result};
use crate::forecaster::ForecastTable;
use crate::hierarchy::HierarchicalData;
use hts_math::{cholesky, cholesky_solve, nonnegative_minimize, weighted_gram};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use std::fmt::Debug;
use tracing::{debug, info};

/// Relative tolerance used when checking reconciled output
pub const COHERENCE_TOLERANCE: f64 = 1e-6;

/// Strategy turning base forecasts into coherent forecasts
pub trait Reconciler: Debug + Send + Sync {
    fn name(&self) -> String;

    fn reconcile(&self, base: &ForecastTable, hierarchy: &HierarchicalData) -> Result<ForecastTable>;
}

/// Weighting used by [`MinTrace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinTraceMethod {
    /// `W = I`
    Ols,
    /// `W = diag(1 / rowsum(S))`
    WlsStruct,
}

impl MinTraceMethod {
    fn label(&self) -> &'static str {
        match self {
            MinTraceMethod::Ols => "ols",
            MinTraceMethod::WlsStruct => "wls_struct",
        }
    }
}

/// Minimum trace reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinTrace {
    pub method: MinTraceMethod,
    /// Keep every reconciled value at or above zero
    pub nonnegative: bool,
}

impl Default for MinTrace {
    fn default() -> Self {
        Self {
            method: MinTraceMethod::Ols,
            nonnegative: true,
        }
    }
}

impl MinTrace {
    pub fn new(method: MinTraceMethod, nonnegative: bool) -> Self {
        Self {
            method,
            nonnegative,
        }
    }

    fn weights(&self, s: ArrayView2<f64>) -> Array1<f64> {
        match self.method {
            MinTraceMethod::Ols => Array1::ones(s.nrows()),
            MinTraceMethod::WlsStruct => s.sum_axis(Axis(1)).mapv(|n| if n > 0.0 { 1.0 / n } else { 0.0 }),
        }
    }
}

impl Reconciler for MinTrace {
    fn name(&self) -> String {
        format!(
            "MinTrace(method={}, nonnegative={})",
            self.method.label(),
            self.nonnegative
        )
    }

    fn reconcile(&self, base: &ForecastTable, hierarchy: &HierarchicalData) -> Result<ForecastTable> {
        check_inputs(base, hierarchy)?;

        let s = hierarchy.matrix().view();
        let weights = self.weights(s);
        let system = weighted_gram(s, weights.view())?;
        let factor = cholesky(system.view()).map_err(|e| {
            ForecastError::ReconciliationError(format!("{} has no unique solution: {}", self.name(), e))
        })?;

        // SᵀW for all dates at once, then one triangular solve per date
        let weighted = &base.values() * &weights.view().insert_axis(Axis(1));
        let rhs = s.t().dot(&weighted);

        let (_, n_leaves) = hierarchy.matrix().shape();
        let mut leaves = Array2::<f64>::zeros((n_leaves, base.horizon()));
        let mut constrained = 0usize;
        for (step, column) in rhs.axis_iter(Axis(1)).enumerate() {
            let mut beta = cholesky_solve(factor.view(), column)?;
            if self.nonnegative && beta.iter().any(|v| *v < 0.0) {
                beta = nonnegative_minimize(system.view(), column).map_err(|e| {
                    ForecastError::ReconciliationError(format!(
                        "{} found no nonnegative solution: {}",
                        self.name(),
                        e
                    ))
                })?;
                constrained += 1;
            }
            leaves.column_mut(step).assign(&beta);
        }
        if constrained > 0 {
            debug!(steps = constrained, "solved nonnegativity-constrained steps");
        }

        let reconciled = hierarchy.matrix().aggregate(leaves.view())?;
        if reconciled.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ReconciliationError(
                "reconciled forecasts are not finite".to_string(),
            ));
        }

        info!(reconciler = %self.name(), series = base.series_ids().len(), horizon = base.horizon(), "reconciled forecasts");
        base.with_values(reconciled)
    }
}

/// Aggregates leaf forecasts upwards, ignoring aggregate base forecasts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BottomUp;

impl Reconciler for BottomUp {
    fn name(&self) -> String {
        "BottomUp".to_string()
    }

    fn reconcile(&self, base: &ForecastTable, hierarchy: &HierarchicalData) -> Result<ForecastTable> {
        check_inputs(base, hierarchy)?;
        let first_leaf = hierarchy.first_leaf_row();
        let leaves = base.values().slice(s![first_leaf.., ..]).to_owned();
        let reconciled = hierarchy.matrix().aggregate(leaves.view())?;
        base.with_values(reconciled)
    }
}

/// Reconciler selected by configuration
pub fn reconciler_for(kind: ReconcilerKind, nonnegative: bool) -> Box<dyn Reconciler> {
    match kind {
        ReconcilerKind::MintOls => Box::new(MinTrace::new(MinTraceMethod::Ols, nonnegative)),
        ReconcilerKind::MintWlsStruct => Box::new(MinTrace::new(MinTraceMethod::WlsStruct, nonnegative)),
        ReconcilerKind::BottomUp => Box::new(BottomUp),
    }
}

fn check_inputs(base: &ForecastTable, hierarchy: &HierarchicalData) -> Result<()> {
    let expected = hierarchy.matrix().row_ids();
    if base.series_ids() != expected {
        return Err(ForecastError::ReconciliationError(format!(
            "forecast table has {} series, hierarchy has {} in a different order or set",
            base.series_ids().len(),
            expected.len()
        )));
    }
    if base.horizon() == 0 {
        return Err(ForecastError::ReconciliationError(
            "forecast table has no dates".to_string(),
        ));
    }
    if base.values().iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::ReconciliationError(
            "base forecasts contain non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Verify that every aggregate equals the sum of its children on every date
pub fn check_coherence(table: &ForecastTable, hierarchy: &HierarchicalData, rel_tol: f64) -> Result<()> {
    if table.series_ids() != hierarchy.matrix().row_ids() {
        return Err(ForecastError::ReconciliationError(
            "forecast table does not match the hierarchy".to_string(),
        ));
    }

    let values = table.values();
    for row in 0..hierarchy.first_leaf_row() {
        let children = hierarchy.children_of(row);
        for (step, date) in table.dates().iter().enumerate() {
            let parent = values[[row, step]];
            let sum: f64 = children.iter().map(|&c| values[[c, step]]).sum();
            if (parent - sum).abs() > rel_tol * parent.abs().max(1.0) {
                return Err(ForecastError::ReconciliationError(format!(
                    "{} on {} is {} but its children sum to {}",
                    table.series_ids()[row],
                    date,
                    parent,
                    sum
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CompletedSeries, LeafKey, LeafSeries};
    use crate::hierarchy::HierarchyBuilder;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use ndarray::array;

    fn hierarchy(keys: &[(i64, i64)]) -> HierarchicalData {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        let leaves = keys
            .iter()
            .map(|&(s, i)| LeafSeries {
                key: LeafKey::new(s, i),
                values: vec![1.0, 2.0, 3.0],
            })
            .collect();
        HierarchyBuilder::default()
            .build(&CompletedSeries::new(start, end, leaves).unwrap())
            .unwrap()
    }

    fn table(hierarchy: &HierarchicalData, values: Array2<f64>) -> ForecastTable {
        let dates = vec![NaiveDate::from_ymd_opt(2023, 1, 4).unwrap(); values.ncols()];
        ForecastTable::new(hierarchy.matrix().row_ids().to_vec(), dates, values).unwrap()
    }

    #[test]
    fn test_ols_matches_closed_form() {
        // Total, Total/1, Total/1/1, Total/1/2
        let h = hierarchy(&[(1, 1), (1, 2)]);
        let base = table(&h, array![[10.0], [10.0], [3.0], [4.0]]);

        let out = MinTrace::new(MinTraceMethod::Ols, false).reconcile(&base, &h).unwrap();
        let v = out.values();
        assert_relative_eq!(v[[2, 0]], 4.2, epsilon = 1e-9);
        assert_relative_eq!(v[[3, 0]], 5.2, epsilon = 1e-9);
        assert_relative_eq!(v[[0, 0]], 9.4, epsilon = 1e-9);
        check_coherence(&out, &h, COHERENCE_TOLERANCE).unwrap();
    }

    #[test]
    fn test_nonnegative_reaches_constrained_optimum() {
        let h = hierarchy(&[(1, 1), (1, 2)]);
        let base = table(&h, array![[0.0], [0.0], [-5.0], [1.0]]);

        let out = MinTrace::default().reconcile(&base, &h).unwrap();
        assert!(out.values().iter().all(|v| *v >= 0.0));
        assert_relative_eq!(out.values()[[2, 0]], 0.0);
        assert_relative_eq!(out.values()[[3, 0]], 1.0 / 3.0, epsilon = 1e-9);
        check_coherence(&out, &h, COHERENCE_TOLERANCE).unwrap();

        // No feasible nonnegative table is closer to the base forecasts
        let distortion = |v: ArrayView2<f64>| (&v - &base.values()).mapv(|d| d * d).sum();
        let best = distortion(out.values());
        assert_relative_eq!(best, 25.0 + 2.0 / 3.0, epsilon = 1e-9);
        for candidate in [0.0, 0.2, 0.3, 0.4, 0.6, 1.0] {
            let leaves = array![[0.0], [candidate]];
            let coherent = h.matrix().aggregate(leaves.view()).unwrap();
            assert!(distortion(coherent.view()) >= best - 1e-12);
        }
    }

    #[test]
    fn test_nonnegative_leaves_unconstrained_steps_alone() {
        let h = hierarchy(&[(1, 1), (1, 2)]);
        let base = table(&h, array![[10.0, 0.0], [10.0, 0.0], [3.0, -5.0], [4.0, 1.0]]);

        let free = MinTrace::new(MinTraceMethod::Ols, false).reconcile(&base, &h).unwrap();
        let bounded = MinTrace::default().reconcile(&base, &h).unwrap();
        for row in 0..4 {
            assert_relative_eq!(free.values()[[row, 0]], bounded.values()[[row, 0]], epsilon = 1e-12);
        }
        assert!(free.values()[[2, 1]] < 0.0);
        assert!(bounded.values().column(1).iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_every_reconciler_is_coherent() {
        let h = hierarchy(&[(1, 1), (1, 2), (2, 1), (2, 3)]);
        let base = table(
            &h,
            array![
                [30.0, 31.0],
                [12.0, 11.0],
                [14.0, 19.0],
                [5.0, 4.0],
                [6.0, 8.0],
                [7.0, 9.0],
                [8.0, 9.5]
            ],
        );
        assert!(check_coherence(&base, &h, COHERENCE_TOLERANCE).is_err());

        for kind in [ReconcilerKind::MintOls, ReconcilerKind::MintWlsStruct, ReconcilerKind::BottomUp] {
            let reconciler = reconciler_for(kind, true);
            let out = reconciler.reconcile(&base, &h).unwrap();
            check_coherence(&out, &h, COHERENCE_TOLERANCE).unwrap();
            assert_eq!(out.dates(), base.dates());
        }
    }

    #[test]
    fn test_bottom_up_sums_leaves() {
        let h = hierarchy(&[(1, 1), (2, 1)]);
        let base = table(&h, array![[0.0], [0.0], [0.0], [2.0], [3.0]]);
        let out = BottomUp.reconcile(&base, &h).unwrap();
        assert_eq!(out.values().column(0).to_vec(), vec![5.0, 2.0, 3.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mismatched_table_is_rejected() {
        let h = hierarchy(&[(1, 1), (1, 2)]);
        let other = hierarchy(&[(1, 1), (2, 2)]);
        let base = table(&other, Array2::zeros((5, 1)));
        assert!(matches!(
            MinTrace::default().reconcile(&base, &h),
            Err(ForecastError::ReconciliationError(_))
        ));

        let nan = table(&h, array![[f64::NAN], [1.0], [1.0], [1.0]]);
        assert!(MinTrace::default().reconcile(&nan, &h).is_err());
    }
}
