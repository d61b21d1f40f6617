//! Dashboard composer
//!
//! Fixed five-row layout; only metric dimension values vary by stage.

use serde::Serialize;

use nexus_infra_core::{BuildContext, BuildError, ResourceKind};
use nexus_infra_graph::ResourceGraph;

use crate::alarms::{api_id, AlarmCatalogue};
use crate::metric::{
    MetricRef, Statistic, NAMESPACE_API_GATEWAY, NAMESPACE_CLOUDFRONT, NAMESPACE_DYNAMODB, NAMESPACE_LAMBDA,
    NAMESPACE_S3,
};

/// Dashboard grid width in columns
pub const GRID_WIDTH: u32 = 24;

/// Period shared by every graph widget
pub const DASHBOARD_PERIOD_SECS: u32 = 3 * 60 * 60;

const GRAPH_HEIGHT: u32 = 6;

/// Widget content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetBody {
    Text { markdown: String },
    Graph { left: Vec<MetricRef>, period_secs: u32 },
    AlarmStatus { alarms: Vec<String> },
}

/// A placed panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Widget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub width: u32,
    pub height: u32,
    pub body: WidgetBody,
}

impl Widget {
    fn text(markdown: String) -> Self {
        Self {
            title: None,
            width: GRID_WIDTH,
            height: 1,
            body: WidgetBody::Text { markdown },
        }
    }

    fn graph(title: &str, width: u32, metric: MetricRef) -> Self {
        Self {
            title: Some(title.to_string()),
            width,
            height: GRAPH_HEIGHT,
            body: WidgetBody::Graph {
                left: vec![metric],
                period_secs: DASHBOARD_PERIOD_SECS,
            },
        }
    }

    /// Metrics this widget plots
    pub fn metrics(&self) -> &[MetricRef] {
        match &self.body {
            WidgetBody::Graph { left, .. } => left.as_slice(),
            _ => &[],
        }
    }
}

/// Widgets rendered left to right
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRow {
    pub widgets: Vec<Widget>,
}

impl DashboardRow {
    pub fn width(&self) -> u32 {
        self.widgets.iter().map(|w| w.width).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub name: String,
    pub rows: Vec<DashboardRow>,
}

impl Dashboard {
    /// Compose the dashboard from the graph and its alarm catalogue
    pub fn compose(
        graph: &ResourceGraph,
        alarms: &AlarmCatalogue,
        ctx: &BuildContext,
    ) -> Result<Self, BuildError> {
        let ingress = graph.require(ResourceKind::HttpIngress)?;
        let function = graph.require(ResourceKind::ComputeFunction)?;
        let table = graph.require(ResourceKind::Table)?;
        let distribution = graph.require(ResourceKind::Distribution)?;
        let bucket = graph.require(ResourceKind::Bucket)?;

        let period = DASHBOARD_PERIOD_SECS;
        let lambda = |name: &str, statistic| {
            MetricRef::new(NAMESPACE_LAMBDA, name, statistic, period)
                .with_dimension("FunctionName", function.physical_name())
        };
        let dynamo = |name: &str| {
            MetricRef::new(NAMESPACE_DYNAMODB, name, Statistic::Sum, period)
                .with_dimension("TableName", table.physical_name())
        };

        let rows = vec![
            DashboardRow {
                widgets: vec![Widget::text(format!("# Nexus Dashboard {}", ctx.stage.stage))],
            },
            DashboardRow {
                widgets: vec![
                    Widget::graph(
                        "API Gateway Latency",
                        8,
                        MetricRef::new(NAMESPACE_API_GATEWAY, "Latency", Statistic::Average, period)
                            .with_dimension("ApiId", api_id(&ingress.id)),
                    ),
                    Widget::graph("Lambda Invocations", 8, lambda("Invocations", Statistic::Sum)),
                    Widget::graph("Lambda Errors", 8, lambda("Errors", Statistic::Sum)),
                ],
            },
            DashboardRow {
                widgets: vec![
                    Widget::graph("DynamoDB Read Capacity", 12, dynamo("ConsumedReadCapacityUnits")),
                    Widget::graph("DynamoDB Write Capacity", 12, dynamo("ConsumedWriteCapacityUnits")),
                ],
            },
            DashboardRow {
                widgets: vec![
                    Widget::graph(
                        "CloudFront Requests",
                        12,
                        MetricRef::new(NAMESPACE_CLOUDFRONT, "Requests", Statistic::Sum, period)
                            .with_dimension("DistributionId", format!("${{{}.Id}}", distribution.id))
                            .with_dimension("Region", "Global"),
                    ),
                    Widget::graph(
                        "Static Asset S3 Bucket Size",
                        12,
                        MetricRef::new(NAMESPACE_S3, "BucketSizeBytes", Statistic::Average, period)
                            .with_dimension("BucketName", bucket.physical_name())
                            .with_dimension("StorageType", "StandardStorage"),
                    ),
                ],
            },
            DashboardRow {
                widgets: vec![Widget {
                    title: Some("Alarms".to_string()),
                    width: GRID_WIDTH,
                    height: 6,
                    body: WidgetBody::AlarmStatus {
                        alarms: alarms.names(),
                    },
                }],
            },
        ];

        let dashboard = Self {
            name: ctx.name("NexusDashboard"),
            rows,
        };
        dashboard.validate()?;

        tracing::info!(dashboard = %dashboard.name, widgets = dashboard.widget_count(), "composed dashboard");

        Ok(dashboard)
    }

    /// Every row must fill the grid exactly
    pub fn validate(&self) -> Result<(), BuildError> {
        for (row, widgets) in self.rows.iter().enumerate() {
            let width = widgets.width();
            if width != GRID_WIDTH {
                return Err(BuildError::InvalidLayout {
                    row: row + 1,
                    width,
                    expected: GRID_WIDTH,
                });
            }
        }
        Ok(())
    }

    pub fn widget_count(&self) -> usize {
        self.rows.iter().map(|r| r.widgets.len()).sum()
    }

    /// Widgets per row, top to bottom
    pub fn row_shape(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.widgets.len()).collect()
    }

    pub fn widgets(&self) -> impl Iterator<Item = &Widget> {
        self.rows.iter().flat_map(|r| r.widgets.iter())
    }
}
