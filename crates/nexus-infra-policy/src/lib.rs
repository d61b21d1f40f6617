//! Nexus infrastructure policy
//!
//! This crate derives observability and cost policy from a built graph:
//! - Alarm catalogue (thresholds, windows, notification actions)
//! - Dashboard layout
//! - Monthly budget
//! - Two-phase synthesis tying the graphs and policy together

pub mod alarms;
pub mod budget;
pub mod dashboard;
pub mod metric;
pub mod synth;

pub use alarms::{AlarmCatalogue, AlarmGroup, AlarmSpec, ComparisonOperator, MissingData};
pub use budget::BudgetPolicy;
pub use dashboard::{Dashboard, DashboardRow, Widget, WidgetBody};
pub use metric::{MetricRef, MetricSource, Statistic};
pub use synth::{SynthError, Synthesis, SynthesisVersion};
