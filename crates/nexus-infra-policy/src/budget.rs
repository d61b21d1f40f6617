//! Monthly cost budget
//!
//! Independent of the resource graph and identical for every stage.

use serde::Serialize;

use nexus_infra_core::BudgetConfig;

use crate::alarms::ComparisonOperator;

/// Monthly ceiling in [`BUDGET_UNIT`]
pub const MONTHLY_LIMIT: u32 = 100;

pub const BUDGET_UNIT: &str = "USD";

/// Forecast percentage of the limit that triggers notification
pub const FORECAST_THRESHOLD_PERCENT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetType {
    Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Actual,
    Forecasted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdType {
    Percentage,
    AbsoluteValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscriber {
    pub subscription_type: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetNotification {
    pub notification_type: NotificationType,
    pub comparison_operator: ComparisonOperator,
    pub threshold: f64,
    pub threshold_type: ThresholdType,
    pub subscribers: Vec<Subscriber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetLimit {
    pub amount: u32,
    pub unit: String,
}

/// Cost ceiling with its notification rules
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetPolicy {
    pub name: String,
    pub budget_type: BudgetType,
    pub time_unit: TimeUnit,
    pub limit: BudgetLimit,
    pub notifications: Vec<BudgetNotification>,
}

impl BudgetPolicy {
    /// The single forecast-based monthly budget
    pub fn monthly(config: &BudgetConfig) -> Self {
        let subscribers = config
            .subscribers
            .iter()
            .map(|address| Subscriber {
                subscription_type: "EMAIL".to_string(),
                address: address.clone(),
            })
            .collect();

        Self {
            name: "NexusMonthlyBudget".to_string(),
            budget_type: BudgetType::Cost,
            time_unit: TimeUnit::Monthly,
            limit: BudgetLimit {
                amount: MONTHLY_LIMIT,
                unit: BUDGET_UNIT.to_string(),
            },
            notifications: vec![BudgetNotification {
                notification_type: NotificationType::Forecasted,
                comparison_operator: ComparisonOperator::GreaterThan,
                threshold: FORECAST_THRESHOLD_PERCENT,
                threshold_type: ThresholdType::Percentage,
                subscribers,
            }],
        }
    }

    /// Notifications that fire for a forecasted spend
    pub fn triggered_by_forecast(&self, forecast: f64) -> Vec<&BudgetNotification> {
        let limit = f64::from(self.limit.amount);
        self.notifications
            .iter()
            .filter(|n| n.notification_type == NotificationType::Forecasted)
            .filter(|n| {
                let value = match n.threshold_type {
                    ThresholdType::Percentage => forecast / limit * 100.0,
                    ThresholdType::AbsoluteValue => forecast,
                };
                n.comparison_operator.breaches(value, n.threshold)
            })
            .collect()
    }
}
