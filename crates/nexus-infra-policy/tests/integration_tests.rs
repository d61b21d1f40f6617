//! Integration tests for alarm, dashboard and budget derivation

use nexus_infra_core::{BuildContext, BuildError, BuildInputs, Config, Stage, SecretValue, Topology};
use nexus_infra_policy::{
    AlarmGroup, ComparisonOperator, MissingData, Statistic, SynthError, Synthesis, WidgetBody,
};
use pretty_assertions::assert_eq;

fn context(stage: &str, topology: Topology) -> Result<BuildContext, BuildError> {
    BuildContext::resolve(
        Config {
            topology,
            ..Config::default()
        },
        BuildInputs {
            stage: Some(stage.to_string()),
            secret: Some(SecretValue::new("sk_test_policy")),
        },
    )
}

fn synthesize(stage: &str, topology: Topology) -> Synthesis {
    Synthesis::synthesize(&context(stage, topology).unwrap()).unwrap()
}

#[test]
fn alarm_literals() {
    let synthesis = synthesize("dev", Topology::Secured);
    let alarms = &synthesis.alarms;

    // (name, threshold, evaluation periods)
    let expected = [
        ("SESBounce-dev", 0.05, 1),
        ("SESComplaint-dev", 0.01, 1),
        ("APIGateway4XXErrorAlarm-dev", 0.05, 5),
        ("APIGateway5XXErrorAlarm-dev", 0.05, 3),
        ("APIGatewayLatencyAlarm-dev", 2000.0, 5),
        ("DynamoDBSuccessfulRequestLatencyPutItem-dev", 20.0, 10),
        ("DynamoDBSuccessfulRequestLatencyGetItem-dev", 20.0, 10),
        ("DynamoDBSystemErrors-dev", 20.0, 5),
        ("DynamoDBTableReadThrottles-dev", 50.0, 5),
        ("DynamoDBTableWriteThrottles-dev", 50.0, 5),
        ("LambdaConcurrentExecutionsOverAccountMaximum-dev", 500.0, 10),
        ("LambdaErrors-dev", 5.0, 3),
        ("LambdaThrottles-dev", 5.0, 5),
        ("LambdaDuration-dev", 2000.0, 15),
    ];

    assert_eq!(
        alarms.names(),
        expected.iter().map(|(name, _, _)| name.to_string()).collect::<Vec<_>>()
    );

    for (name, threshold, periods) in expected {
        let alarm = alarms.get(name).unwrap();
        assert_eq!(alarm.threshold, threshold, "{}", name);
        assert_eq!(alarm.evaluation_periods, periods, "{}", name);
        assert_eq!(alarm.datapoints_to_alarm, periods, "{}", name);
        assert_eq!(alarm.comparison_operator, ComparisonOperator::GreaterThanOrEqual);
        assert_eq!(alarm.treat_missing_data, MissingData::NotBreaching);
    }
}

#[test]
fn only_delivery_health_pages() {
    let synthesis = synthesize("staging", Topology::Secured);

    let paging: Vec<_> = synthesis.alarms.paging().map(|a| a.name.as_str()).collect();
    assert_eq!(paging, vec!["SESBounce-staging", "SESComplaint-staging"]);

    let topic = synthesis
        .app
        .nodes()
        .iter()
        .find(|n| n.kind == nexus_infra_core::ResourceKind::Topic)
        .unwrap();
    for alarm in synthesis.alarms.paging() {
        assert_eq!(alarm.action.as_deref(), Some(topic.id.as_str()));
        assert_eq!(alarm.group, AlarmGroup::DeliveryHealth);
    }
}

#[test]
fn latency_alarms_use_p90() {
    let synthesis = synthesize("dev", Topology::Observed);

    for name in ["APIGatewayLatencyAlarm-dev", "LambdaDuration-dev"] {
        let alarm = synthesis.alarms.get(name).unwrap();
        let metrics = alarm.metric.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].statistic, Statistic::P90);
    }

    let system_errors = synthesis.alarms.get("DynamoDBSystemErrors-dev").unwrap();
    let operations: Vec<_> = system_errors
        .metric
        .metrics()
        .iter()
        .map(|m| m.dimension("Operation").unwrap().to_string())
        .collect();
    assert_eq!(operations, vec!["GetItem", "PutItem"]);
}

#[test]
fn concurrency_alarm_is_account_wide() {
    let synthesis = synthesize("prod", Topology::Secured);
    let alarm = synthesis
        .alarms
        .get("LambdaConcurrentExecutionsOverAccountMaximum")
        .unwrap();

    let metrics = alarm.metric.metrics();
    assert!(metrics[0].dimensions.is_empty());
    assert_eq!(metrics[0].statistic, Statistic::Maximum);
}

#[test]
fn dashboard_shape_is_stage_invariant() {
    let mut shapes = Vec::new();
    for stage in Stage::ALL {
        let synthesis = synthesize(stage.as_str(), Topology::Secured);
        let dashboard = synthesis.dashboard.unwrap();
        assert_eq!(dashboard.widget_count(), 9);
        assert!(dashboard.validate().is_ok());

        let widths: Vec<Vec<u32>> = dashboard
            .rows
            .iter()
            .map(|row| row.widgets.iter().map(|w| w.width).collect())
            .collect();
        assert_eq!(widths, vec![vec![24], vec![8, 8, 8], vec![12, 12], vec![12, 12], vec![24]]);

        shapes.push(dashboard.row_shape());
    }

    assert_eq!(shapes[0], vec![1, 3, 2, 2, 1]);
    assert!(shapes.iter().all(|s| *s == shapes[0]));
}

#[test]
fn dashboards_differ_only_in_dimensions() {
    let dev = synthesize("dev", Topology::Secured).dashboard.unwrap();
    let prod = synthesize("prod", Topology::Secured).dashboard.unwrap();

    assert_eq!(dev.name, "NexusDashboard-dev");
    assert_eq!(prod.name, "NexusDashboard");

    let titles = |d: &nexus_infra_policy::Dashboard| {
        d.widgets().map(|w| w.title.clone()).collect::<Vec<_>>()
    };
    assert_eq!(titles(&dev), titles(&prod));

    for (left, right) in dev.widgets().zip(prod.widgets()) {
        assert_eq!(left.width, right.width);
        assert_eq!(left.height, right.height);
        let names = |w: &nexus_infra_policy::Widget| {
            w.metrics().iter().map(|m| (m.namespace.clone(), m.name.clone())).collect::<Vec<_>>()
        };
        assert_eq!(names(left), names(right));
    }

    let alarm_widget = dev.widgets().last().unwrap();
    match &alarm_widget.body {
        WidgetBody::AlarmStatus { alarms } => assert_eq!(alarms.len(), 14),
        other => panic!("unexpected widget body {:?}", other),
    }
}

#[test]
fn synthesis_is_deterministic() {
    let first = synthesize("staging", Topology::Secured);
    let second = synthesize("staging", Topology::Secured);

    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.alarms, second.alarms);
    assert_eq!(first.dashboard, second.dashboard);
    assert_eq!(first.budget, second.budget);
}

#[test]
fn stages_fingerprint_differently() {
    let dev = synthesize("dev", Topology::Secured);
    let prod = synthesize("prod", Topology::Secured);
    assert!(dev.fingerprint != prod.fingerprint);
    assert_eq!(dev.budget, prod.budget);
}

#[test]
fn minimal_topology_skips_observability() {
    let synthesis = synthesize("dev", Topology::Minimal);

    assert!(synthesis.edge.is_none());
    assert!(synthesis.alarms.is_empty());
    assert!(synthesis.dashboard.is_none());
    assert_eq!(synthesis.budget.name, "NexusMonthlyBudget");
}

#[test]
fn observed_topology_skips_edge_certificate() {
    let synthesis = synthesize("dev", Topology::Observed);

    assert!(synthesis.outputs.firewall_policy_arn.is_some());
    assert!(synthesis.outputs.certificate_arn.is_none());
    assert_eq!(synthesis.alarms.len(), 14);
}

#[test]
fn bogus_stage_fails_before_synthesis() {
    let err = context("qa", Topology::Secured).unwrap_err();
    assert_eq!(err, BuildError::InvalidStage("qa".to_string()));
}

#[test]
fn missing_secret_surfaces_through_synthesis_error() {
    let err = BuildContext::resolve(Config::default(), BuildInputs::default()).unwrap_err();
    let err = SynthError::from(err);
    assert_eq!(err.to_string(), BuildError::MissingSecret("STRIPE_SECRET_KEY".to_string()).to_string());
}
