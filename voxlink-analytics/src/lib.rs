//! Call analytics for Voxlink
//!
//! Voice activity and dropout detection over audio level samples,
//! quality-label tracking, and a per-session aggregator producing
//! verified metrics snapshots. Estimated network metrics are a separate
//! type so they can never be mistaken for measurements.

pub mod activity;
pub mod aggregator;
pub mod metrics;

pub use activity::{DropoutConfig, DropoutDetector, VadConfig, VadDetector, VadTransition};
pub use aggregator::{AnalyticsAggregator, AnalyticsConfig, AnalyticsEvent};
pub use metrics::{EstimatedMetrics, QualityLabel, VerifiedMetrics};
