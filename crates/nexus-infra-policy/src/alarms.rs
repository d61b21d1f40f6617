//! Alarm policy engine
//!
//! Derives the fixed alarm catalogue from a completed application graph.
//! Thresholds and windows are contract values, not tunables.
//!
//! Only the delivery-health alarms (bounce, complaint) notify the topic;
//! every other group is monitoring-only.

use serde::Serialize;

use nexus_infra_core::{BuildContext, BuildError, NodeId, ResourceKind};
use nexus_infra_graph::ResourceGraph;

use crate::metric::{
    MetricRef, MetricSource, Statistic, NAMESPACE_API_GATEWAY, NAMESPACE_DYNAMODB, NAMESPACE_LAMBDA,
    NAMESPACE_SES,
};

/// Evaluation window for everything except delivery health
pub const ONE_MINUTE: u32 = 60;

/// Delivery-health evaluation window
pub const THREE_HOURS: u32 = 3 * 60 * 60;

/// Comparison between the evaluated statistic and the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonOperator {
    GreaterThanOrEqual,
    GreaterThan,
    LessThan,
    LessThanOrEqual,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GreaterThanOrEqual => "greater-than-or-equal",
            Self::GreaterThan => "greater-than",
            Self::LessThan => "less-than",
            Self::LessThanOrEqual => "less-than-or-equal",
        }
    }

    pub fn breaches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThanOrEqual => value >= threshold,
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::LessThanOrEqual => value <= threshold,
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How periods without datapoints are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingData {
    Breaching,
    NotBreaching,
    Ignore,
    Missing,
}

/// Resource kind an alarm belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmGroup {
    DeliveryHealth,
    Ingress,
    Table,
    Function,
}

/// One threshold rule over a metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmSpec {
    pub name: String,
    pub description: String,
    pub group: AlarmGroup,
    pub metric: MetricSource,
    pub threshold: f64,
    pub comparison_operator: ComparisonOperator,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: u32,
    pub treat_missing_data: MissingData,

    /// Notification topic, when the alarm pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<NodeId>,
}

impl AlarmSpec {
    /// `>=` alarm that needs every datapoint in the window to breach
    fn at_least(
        name: String,
        description: &str,
        group: AlarmGroup,
        metric: impl Into<MetricSource>,
        threshold: f64,
        periods: u32,
    ) -> Self {
        Self {
            name,
            description: description.to_string(),
            group,
            metric: metric.into(),
            threshold,
            comparison_operator: ComparisonOperator::GreaterThanOrEqual,
            evaluation_periods: periods,
            datapoints_to_alarm: periods,
            treat_missing_data: MissingData::NotBreaching,
            action: None,
        }
    }

    fn with_action(mut self, topic: &str) -> Self {
        self.action = Some(topic.to_string());
        self
    }

    /// Check the alarm's own invariants
    pub fn validate(&self) -> Result<(), BuildError> {
        let reason = if self.evaluation_periods == 0 {
            Some("evaluation periods must be at least 1".to_string())
        } else if self.datapoints_to_alarm == 0 || self.datapoints_to_alarm > self.evaluation_periods {
            Some(format!(
                "datapoints to alarm ({}) must be between 1 and evaluation periods ({})",
                self.datapoints_to_alarm, self.evaluation_periods
            ))
        } else if !self.threshold.is_finite() {
            Some("threshold must be finite".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(BuildError::InvalidAlarm {
                alarm: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Whether a run of datapoints (oldest first) would put the alarm in ALARM.
    ///
    /// `None` is a missing datapoint and counts as not breaching.
    pub fn evaluate(&self, datapoints: &[Option<f64>]) -> bool {
        let window = self.evaluation_periods as usize;
        let start = datapoints.len().saturating_sub(window);
        let breaching = datapoints[start..]
            .iter()
            .filter(|point| match point {
                Some(value) => self.comparison_operator.breaches(*value, self.threshold),
                None => self.treat_missing_data == MissingData::Breaching,
            })
            .count();

        breaching >= self.datapoints_to_alarm as usize
    }
}

/// The full set of alarms for one application graph
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AlarmCatalogue {
    alarms: Vec<AlarmSpec>,
}

impl AlarmCatalogue {
    /// Derive one alarm group per monitored resource kind present in the graph
    pub fn derive(graph: &ResourceGraph, ctx: &BuildContext) -> Result<Self, BuildError> {
        let mut alarms = Vec::new();

        if let Some(identity) = graph.first_of_kind(ResourceKind::EmailIdentity) {
            let topic = graph.require(ResourceKind::Topic)?;
            alarms.extend(delivery_health(ctx, identity.physical_name(), &topic.id));
        }
        if let Some(ingress) = graph.first_of_kind(ResourceKind::HttpIngress) {
            alarms.extend(ingress_alarms(ctx, &api_id(&ingress.id)));
        }
        if let Some(table) = graph.first_of_kind(ResourceKind::Table) {
            alarms.extend(table_alarms(ctx, table.physical_name()));
        }
        if let Some(function) = graph.first_of_kind(ResourceKind::ComputeFunction) {
            alarms.extend(function_alarms(ctx, function.physical_name()));
        }

        for alarm in &alarms {
            alarm.validate()?;
        }

        tracing::info!(alarms = alarms.len(), stage = %ctx.stage.stage, "derived alarm catalogue");

        Ok(Self { alarms })
    }

    pub fn alarms(&self) -> &[AlarmSpec] {
        &self.alarms
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&AlarmSpec> {
        self.alarms.iter().find(|a| a.name == name)
    }

    pub fn group(&self, group: AlarmGroup) -> impl Iterator<Item = &AlarmSpec> {
        self.alarms.iter().filter(move |a| a.group == group)
    }

    /// Alarm names in catalogue order
    pub fn names(&self) -> Vec<String> {
        self.alarms.iter().map(|a| a.name.clone()).collect()
    }

    /// Alarms that notify a topic when they fire
    pub fn paging(&self) -> impl Iterator<Item = &AlarmSpec> {
        self.alarms.iter().filter(|a| a.action.is_some())
    }
}

/// Dimension token for an HTTP API's id
pub(crate) fn api_id(ingress_id: &str) -> String {
    format!("${{{}.ApiId}}", ingress_id)
}

fn delivery_health(ctx: &BuildContext, identity: &str, topic: &str) -> Vec<AlarmSpec> {
    let rate = |name: &str| {
        MetricRef::new(NAMESPACE_SES, name, Statistic::Average, THREE_HOURS)
            .with_dimension("Identity", identity)
    };

    vec![
        AlarmSpec::at_least(
            ctx.name("SESBounce"),
            "Alarm when SES Bounce Rate exceeds threshold",
            AlarmGroup::DeliveryHealth,
            rate("BounceRate"),
            0.05,
            1,
        )
        .with_action(topic),
        AlarmSpec::at_least(
            ctx.name("SESComplaint"),
            "Alarm when SES Complaint Rate exceeds threshold",
            AlarmGroup::DeliveryHealth,
            rate("ComplaintRate"),
            0.01,
            1,
        )
        .with_action(topic),
    ]
}

fn ingress_alarms(ctx: &BuildContext, api_id: &str) -> Vec<AlarmSpec> {
    let metric = |name: &str, statistic| {
        MetricRef::new(NAMESPACE_API_GATEWAY, name, statistic, ONE_MINUTE).with_dimension("ApiId", api_id)
    };

    vec![
        AlarmSpec::at_least(
            ctx.name("APIGateway4XXErrorAlarm"),
            "Alarm when API Gateway has >5% of client errors",
            AlarmGroup::Ingress,
            metric("4xx", Statistic::Average),
            0.05,
            5,
        ),
        AlarmSpec::at_least(
            ctx.name("APIGateway5XXErrorAlarm"),
            "Alarm when API Gateway has >5% of server errors",
            AlarmGroup::Ingress,
            metric("5xx", Statistic::Average),
            0.05,
            3,
        ),
        AlarmSpec::at_least(
            ctx.name("APIGatewayLatencyAlarm"),
            "Alarm when API Gateway has increased latency",
            AlarmGroup::Ingress,
            metric("Latency", Statistic::P90),
            2000.0,
            5,
        ),
    ]
}

fn table_alarms(ctx: &BuildContext, table_name: &str) -> Vec<AlarmSpec> {
    let metric = |name: &str, statistic, operation: &str| {
        MetricRef::new(NAMESPACE_DYNAMODB, name, statistic, ONE_MINUTE)
            .with_dimension("TableName", table_name)
            .with_dimension("Operation", operation)
    };

    let system_errors = MetricSource::Sum {
        label: "SystemErrors".to_string(),
        metrics: vec![
            metric("SystemErrors", Statistic::Sum, "GetItem"),
            metric("SystemErrors", Statistic::Sum, "PutItem"),
        ],
    };

    vec![
        AlarmSpec::at_least(
            ctx.name("DynamoDBSuccessfulRequestLatencyPutItem"),
            "DynamoDB Latency Too High",
            AlarmGroup::Table,
            metric("SuccessfulRequestLatency", Statistic::Average, "PutItem"),
            20.0,
            10,
        ),
        AlarmSpec::at_least(
            ctx.name("DynamoDBSuccessfulRequestLatencyGetItem"),
            "DynamoDB Latency Too High",
            AlarmGroup::Table,
            metric("SuccessfulRequestLatency", Statistic::Average, "GetItem"),
            20.0,
            10,
        ),
        AlarmSpec::at_least(
            ctx.name("DynamoDBSystemErrors"),
            "DynamoDB System Errors",
            AlarmGroup::Table,
            system_errors,
            20.0,
            5,
        ),
        AlarmSpec::at_least(
            ctx.name("DynamoDBTableReadThrottles"),
            "DynamoDB Read Throttles (GetItem)",
            AlarmGroup::Table,
            metric("ThrottledRequests", Statistic::Sum, "GetItem"),
            50.0,
            5,
        ),
        AlarmSpec::at_least(
            ctx.name("DynamoDBTableWriteThrottles"),
            "DynamoDB Write Throttles (PutItem)",
            AlarmGroup::Table,
            metric("ThrottledRequests", Statistic::Sum, "PutItem"),
            50.0,
            5,
        ),
    ]
}

fn function_alarms(ctx: &BuildContext, function_name: &str) -> Vec<AlarmSpec> {
    let metric = |name: &str, statistic| {
        MetricRef::new(NAMESPACE_LAMBDA, name, statistic, ONE_MINUTE).with_dimension("FunctionName", function_name)
    };

    // Account-wide, so no function dimension
    let concurrency = MetricRef::new(NAMESPACE_LAMBDA, "ConcurrentExecutions", Statistic::Maximum, ONE_MINUTE);

    vec![
        AlarmSpec::at_least(
            ctx.name("LambdaConcurrentExecutionsOverAccountMaximum"),
            "Concurrency of Lambda functions is approaching the regional account limit",
            AlarmGroup::Function,
            concurrency,
            500.0,
            10,
        ),
        AlarmSpec::at_least(
            ctx.name("LambdaErrors"),
            "Lambda errors are too high",
            AlarmGroup::Function,
            metric("Errors", Statistic::Sum),
            5.0,
            3,
        ),
        AlarmSpec::at_least(
            ctx.name("LambdaThrottles"),
            "Lambda throttles are too high",
            AlarmGroup::Function,
            metric("Throttles", Statistic::Sum),
            5.0,
            5,
        ),
        AlarmSpec::at_least(
            ctx.name("LambdaDuration"),
            "Lambda p90 duration is too high",
            AlarmGroup::Function,
            metric("Duration", Statistic::P90),
            2000.0,
            15,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(threshold: f64, periods: u32, datapoints: u32) -> AlarmSpec {
        let mut alarm = AlarmSpec::at_least(
            "Test".to_string(),
            "test",
            AlarmGroup::Function,
            MetricRef::new(NAMESPACE_LAMBDA, "Errors", Statistic::Sum, ONE_MINUTE),
            threshold,
            periods,
        );
        alarm.datapoints_to_alarm = datapoints;
        alarm
    }

    #[test]
    fn datapoints_cannot_exceed_periods() {
        assert!(rule(5.0, 3, 3).validate().is_ok());
        assert!(rule(5.0, 3, 1).validate().is_ok());

        let err = rule(5.0, 3, 4).validate().unwrap_err();
        assert!(matches!(err, BuildError::InvalidAlarm { .. }));
        assert!(rule(5.0, 0, 0).validate().is_err());
        assert!(rule(f64::NAN, 3, 3).validate().is_err());
    }

    #[test]
    fn missing_data_never_breaches() {
        let alarm = rule(5.0, 3, 3);
        assert!(alarm.evaluate(&[Some(6.0), Some(5.0), Some(9.0)]));
        assert!(!alarm.evaluate(&[Some(6.0), None, Some(9.0)]));
        assert!(!alarm.evaluate(&[None, None, None]));
        assert!(!alarm.evaluate(&[]));
    }

    #[test]
    fn evaluation_uses_latest_window() {
        let alarm = rule(5.0, 3, 3);
        // Old breach falls outside the window
        assert!(!alarm.evaluate(&[Some(9.0), Some(9.0), Some(9.0), Some(1.0)]));
        assert!(alarm.evaluate(&[Some(1.0), Some(9.0), Some(9.0), Some(9.0)]));
    }

    #[test]
    fn operators() {
        assert!(ComparisonOperator::GreaterThanOrEqual.breaches(0.05, 0.05));
        assert!(!ComparisonOperator::GreaterThan.breaches(0.05, 0.05));
        assert_eq!(ComparisonOperator::GreaterThanOrEqual.as_str(), "greater-than-or-equal");
        assert_eq!(
            serde_json::to_string(&ComparisonOperator::GreaterThanOrEqual).unwrap(),
            "\"greater-than-or-equal\""
        );
    }
}
