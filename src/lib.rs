//! # Sales HTS
//!
//! Workspace facade for hierarchical retail sales forecasting.
//!
//! - [`sales_forecast`]: data preparation, hierarchy, models, reconciliation
//!   and export
//! - [`hts_math`]: the linear algebra and optimiser underneath
//!
//! ## Example
//!
//! ```
//! use sales_hts_workspace::sales_forecast::config::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! assert_eq!(config.horizon, 30);
//! assert_eq!(config.min_months, 34);
//! ```

pub use hts_math;
pub use sales_forecast;
