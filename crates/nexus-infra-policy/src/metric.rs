//! Metric references shared by alarms and dashboard widgets

use std::collections::BTreeMap;

use serde::Serialize;

pub const NAMESPACE_API_GATEWAY: &str = "AWS/ApiGateway";
pub const NAMESPACE_DYNAMODB: &str = "AWS/DynamoDB";
pub const NAMESPACE_LAMBDA: &str = "AWS/Lambda";
pub const NAMESPACE_SES: &str = "AWS/SES";
pub const NAMESPACE_CLOUDFRONT: &str = "AWS/CloudFront";
pub const NAMESPACE_S3: &str = "AWS/S3";

/// Aggregation applied to datapoints within a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Statistic {
    Average,
    Sum,
    Maximum,
    #[serde(rename = "p90")]
    P90,
}

/// A single named metric with its dimensions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRef {
    pub namespace: String,
    pub name: String,
    pub dimensions: BTreeMap<String, String>,
    pub statistic: Statistic,
    pub period_secs: u32,
}

impl MetricRef {
    pub fn new(namespace: &str, name: &str, statistic: Statistic, period_secs: u32) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            dimensions: BTreeMap::new(),
            statistic,
            period_secs,
        }
    }

    pub fn with_dimension(mut self, key: &str, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.to_string(), value.into());
        self
    }

    pub fn dimension(&self, key: &str) -> Option<&str> {
        self.dimensions.get(key).map(String::as_str)
    }
}

/// What an alarm evaluates: one metric, or the sum of several
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricSource {
    Metric(MetricRef),
    Sum { label: String, metrics: Vec<MetricRef> },
}

impl MetricSource {
    /// All metrics this source reads
    pub fn metrics(&self) -> Vec<&MetricRef> {
        match self {
            Self::Metric(metric) => vec![metric],
            Self::Sum { metrics, .. } => metrics.iter().collect(),
        }
    }
}

impl From<MetricRef> for MetricSource {
    fn from(metric: MetricRef) -> Self {
        Self::Metric(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistic_serialization() {
        assert_eq!(serde_json::to_string(&Statistic::P90).unwrap(), "\"p90\"");
        assert_eq!(serde_json::to_string(&Statistic::Sum).unwrap(), "\"Sum\"");
    }

    #[test]
    fn sum_source_lists_every_metric() {
        let get = MetricRef::new(NAMESPACE_DYNAMODB, "SystemErrors", Statistic::Sum, 60)
            .with_dimension("Operation", "GetItem");
        let put = MetricRef::new(NAMESPACE_DYNAMODB, "SystemErrors", Statistic::Sum, 60)
            .with_dimension("Operation", "PutItem");

        let source = MetricSource::Sum {
            label: "SystemErrors".to_string(),
            metrics: vec![get, put],
        };
        let metrics = source.metrics();
        let operations: Vec<_> = metrics.iter().filter_map(|m| m.dimension("Operation")).collect();
        assert_eq!(operations, vec!["GetItem", "PutItem"]);

        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "sum");
    }
}
