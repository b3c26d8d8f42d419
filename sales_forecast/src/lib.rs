//! # Sales Forecast
//!
//! Hierarchical forecasting of daily retail sales.
//!
//! ## Features
//!
//! - Completion of sparse daily sales into gap-free (store, item) series
//! - A Total / store / item hierarchy with its summing matrix and level tags
//! - One exponential smoothing model per series, fitted in parallel
//! - MinTrace reconciliation so forecasts add up at every level
//! - Export of bottom-level forecasts to timestamped CSV files
//!
//! ## Quick Start
//!
//! ```no_run
//! use sales_forecast::config::PipelineConfig;
//! use sales_forecast::pipeline;
//!
//! let config = PipelineConfig {
//!     raw_path: "sales.csv".into(),
//!     prepared_path: "work/prep.csv".into(),
//!     model_dir: "work/model".into(),
//!     output_dir: "work".into(),
//!     ..PipelineConfig::default()
//! };
//!
//! let summary = pipeline::run(&config)?;
//! println!("wrote {}", summary.infer.predictions_path.display());
//! # Ok::<(), sales_forecast::ForecastError>(())
//! ```
//!
//! The stages can also be driven one by one with the types re-exported
//! below, e.g. for data that is already in memory:
//!
//! ```no_run
//! use sales_forecast::{HierarchyBuilder, LevelForecaster, MinTrace, Reconciler};
//! use sales_forecast::models::AutoEts;
//! use sales_forecast::forecaster::forecast_all;
//! # fn demo(completed: &sales_forecast::data::CompletedSeries) -> sales_forecast::error::Result<()> {
//! let hierarchy = HierarchyBuilder::default().build(completed)?;
//! let outcome = LevelForecaster::new(AutoEts::new(30)?).fit_all(&hierarchy);
//! let base = forecast_all(&outcome.models, &hierarchy, 30)?;
//! let coherent = MinTrace::default().reconcile(&base, &hierarchy)?;
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod completer;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod forecaster;
pub mod hierarchy;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod utils;

// Re-export commonly used types
pub use crate::artifacts::ModelBundle;
pub use crate::completer::SeriesCompleter;
pub use crate::config::PipelineConfig;
pub use crate::data::{CompletedSeries, DataLoader, LeafKey, SalesEvent};
pub use crate::error::ForecastError;
pub use crate::export::{ForecastExporter, ForecastRow};
pub use crate::forecaster::{ForecastTable, LevelForecaster};
pub use crate::hierarchy::{HierarchicalData, HierarchyBuilder, HierarchySpec};
pub use crate::models::{ForecastModel, ForecastResult};
pub use crate::reconcile::{BottomUp, MinTrace, Reconciler};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
