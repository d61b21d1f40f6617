//! Application graph (phase 2)
//!
//! Build order is fixed: every node is added after the nodes it references,
//! so ordering mistakes surface as `DependencyOrder` instead of a broken
//! deployment.

use serde_json::json;

use nexus_infra_core::{
    BuildContext, BuildError, CrossStackInput, NodeHandle, ResourceKind, ResourceNode, TableIndex,
};

use crate::graph::{ResourceGraph, PARTITION_KEY_PROPERTY};
use crate::outputs::CrossStackOutputs;

/// Primary key of the users table
pub const TABLE_PRIMARY_KEY: &str = "email";

/// Secondary index attributes every topology carries
pub const TABLE_INDEX_ATTRIBUTES: [&str; 2] = ["session_id", "email_verification_uuid"];

/// Optional index, see `include_user_uuid_index`
pub const USER_UUID_ATTRIBUTE: &str = "user_uuid";

/// Path pattern served straight from the static asset bucket
pub const STATIC_ASSET_PATH: &str = "/pkg/*";

/// Delivery events forwarded to the notification topic
const DELIVERY_EVENTS: [&str; 4] = ["BOUNCE", "COMPLAINT", "REJECT", "RENDERING_FAILURE"];

/// Builder for the main application graph
pub struct AppGraph;

impl AppGraph {
    /// Build the application graph for one stage.
    ///
    /// Required cross-stack inputs are checked before any node is created.
    pub fn build(ctx: &BuildContext, inputs: &CrossStackOutputs) -> Result<ResourceGraph, BuildError> {
        let features = ctx.features();
        inputs.check(&features)?;

        let suffix = ctx.stage.suffix.as_str();
        let stage = ctx.stage.stage;
        let mut graph = ResourceGraph::new(
            ctx.stage.stack_name("NexusCdkStack"),
            format!("Nexus application resources ({})", stage),
            ctx.config.region.clone(),
        );

        // Imported edge values come first so the distribution can reference them
        let certificate = if features.certificate {
            let arn = inputs.require(CrossStackInput::CertificateArn)?;
            Some(graph.add(
                ResourceNode::new(ResourceKind::Certificate, suffix)
                    .with_property("arn", arn)
                    .with_property("imported", true),
            )?)
        } else {
            None
        };

        let firewall = if features.firewall {
            let arn = inputs.require(CrossStackInput::FirewallPolicyArn)?;
            Some(graph.add(
                ResourceNode::new(ResourceKind::FirewallPolicy, suffix)
                    .with_property("arn", arn)
                    .with_property("imported", true),
            )?)
        } else {
            None
        };

        let bucket = graph.add(
            ResourceNode::new(ResourceKind::Bucket, suffix)
                .with_property("name", format!("nexus-static-asset-bucket-{}", stage))
                .with_property("removal_policy", json!(ctx.stage.removal_policy())),
        )?;

        let function = Self::add_compute(&mut graph, ctx)?;
        let (ingress, route) = Self::add_ingress(&mut graph, ctx, &function)?;

        let mut distribution = ResourceNode::new(ResourceKind::Distribution, suffix)
            .with_property("name", ctx.name("NexusDistribution"))
            .with_property(
                "default_behavior",
                json!({
                    "origin": {
                        "http": format!(
                            "${{{}.ApiId}}.execute-api.{}.amazonaws.com",
                            ingress.id(),
                            ctx.config.region
                        ),
                    },
                    "viewer_protocol_policy": "https-only",
                    "allowed_methods": "ALL",
                }),
            )
            .with_property(
                "additional_behaviors",
                json!({
                    STATIC_ASSET_PATH: {
                        "origin": { "bucket": bucket.id() },
                        "viewer_protocol_policy": "https-only",
                    }
                }),
            )
            .with_property("price_class", "PriceClass_All")
            .with_property("comment", stage.as_str())
            .with_reference(&bucket)
            .with_reference(&ingress);

        if let Some(firewall) = &firewall {
            distribution = distribution
                .with_property("web_acl_id", inputs.require(CrossStackInput::FirewallPolicyArn)?)
                .with_reference(firewall);
        }

        if let Some(certificate) = &certificate {
            distribution = distribution
                .with_property("domain_names", json!([ctx.stage.domain_name]))
                .with_property("certificate", inputs.require(CrossStackInput::CertificateArn)?)
                .with_reference(certificate);
        }

        let distribution = graph.add(distribution)?;

        graph.add(
            ResourceNode::new(ResourceKind::InvokePermission, suffix)
                .with_property("action", "execute-api:Invoke")
                .with_property(
                    "principal",
                    format!(
                        "arn:aws:cloudfront::{}:distribution/${{{}.Id}}",
                        ctx.config.account_ref(),
                        distribution.id()
                    ),
                )
                .with_reference(&route)
                .with_reference(&distribution),
        )?;

        Self::add_table(&mut graph, ctx)?;

        if features.notifications {
            Self::add_notifications(&mut graph, ctx, &function)?;
        }

        graph.validate()?;

        tracing::info!(
            stack = %graph.name,
            stage = %stage,
            topology = %ctx.topology(),
            nodes = graph.len(),
            "built application graph"
        );

        Ok(graph)
    }

    fn add_compute(graph: &mut ResourceGraph, ctx: &BuildContext) -> Result<NodeHandle, BuildError> {
        let suffix = ctx.stage.suffix.as_str();

        let log_group = graph.add(
            ResourceNode::new(ResourceKind::LogGroup, suffix)
                .with_property("name", ctx.name("NexusLambdaLogGroup"))
                .with_property("retention_days", 5),
        )?;

        let secret_env = &ctx.config.secret_env;
        graph.add(
            ResourceNode::new(ResourceKind::ComputeFunction, suffix)
                .with_property("name", ctx.name("NexusSSRFunction"))
                .with_property("runtime", "provided.al2023")
                .with_property("handler", "index.main")
                .with_property("architecture", "arm64")
                .with_property("memory_size_mb", 256)
                .with_property("timeout_ms", 3000)
                .with_property("code", json!({ "asset": ctx.config.artifact_path }))
                .with_property("environment", json!({ secret_env.as_str(): ctx.secret }))
                .with_sensitive(["environment", secret_env.as_str()])
                .with_reference(&log_group),
        )
    }

    fn add_ingress(
        graph: &mut ResourceGraph,
        ctx: &BuildContext,
        function: &NodeHandle,
    ) -> Result<(NodeHandle, NodeHandle), BuildError> {
        let suffix = ctx.stage.suffix.as_str();
        let authorization = if ctx.features().authorizer { "AWS_IAM" } else { "NONE" };

        let ingress = graph.add(
            ResourceNode::new(ResourceKind::HttpIngress, suffix)
                .with_property("name", ctx.name("NexusHttpApi"))
                .with_property("protocol", "HTTP")
                .with_property("disable_execute_api_endpoint", false)
                .with_property(
                    "default_integration",
                    json!({ "type": "AWS_PROXY", "target": function.id() }),
                )
                .with_property("default_authorizer", authorization)
                .with_reference(function),
        )?;

        let route = graph.add(
            ResourceNode::new(ResourceKind::Route, suffix)
                .with_property("path", "/")
                .with_property("methods", json!(["ANY"]))
                .with_property("integration", function.id())
                .with_property("authorization_type", authorization)
                .with_reference(&ingress)
                .with_reference(function),
        )?;

        Ok((ingress, route))
    }

    fn add_table(graph: &mut ResourceGraph, ctx: &BuildContext) -> Result<NodeHandle, BuildError> {
        let table = graph.add(
            ResourceNode::new(ResourceKind::Table, &ctx.stage.suffix)
                .with_property("name", ctx.name("Users"))
                .with_property(
                    PARTITION_KEY_PROPERTY,
                    json!({ "name": TABLE_PRIMARY_KEY, "type": "STRING" }),
                )
                .with_property("billing", "PAY_PER_REQUEST")
                .with_property("removal_policy", json!(ctx.stage.removal_policy())),
        )?;

        for attribute in TABLE_INDEX_ATTRIBUTES {
            graph.add_table_index(&table, TableIndex::on(attribute))?;
        }
        if ctx.config.include_user_uuid_index {
            graph.add_table_index(&table, TableIndex::on(USER_UUID_ATTRIBUTE))?;
        }

        Ok(table)
    }

    fn add_notifications(
        graph: &mut ResourceGraph,
        ctx: &BuildContext,
        function: &NodeHandle,
    ) -> Result<(), BuildError> {
        let suffix = ctx.stage.suffix.as_str();
        let notifications = &ctx.config.notifications;

        let subscriptions: Vec<_> = notifications
            .subscribers
            .iter()
            .map(|address| json!({ "protocol": "email", "endpoint": address }))
            .collect();

        let topic = graph.add(
            ResourceNode::new(ResourceKind::Topic, suffix)
                .with_property("name", ctx.name("NexusSESNotificationTopic"))
                .with_property("display_name", format!("SES Notifications {}", ctx.stage.stage))
                .with_property("subscriptions", subscriptions),
        )?;

        let sender = ctx
            .stage
            .sender_address(&notifications.sender_local_part, &ctx.config.root_domain);

        let identity = graph.add(
            ResourceNode::new(ResourceKind::EmailIdentity, suffix)
                .with_property("name", sender)
                .with_property(
                    "configuration_set",
                    json!({
                        "name": ctx.name("NexusTransactionalEmailConfigurationSet"),
                        "reputation_metrics": true,
                        "tls_policy": "REQUIRE",
                    }),
                )
                .with_property(
                    "event_destination",
                    json!({
                        "name": ctx.name("NexusConfigurationSet"),
                        "topic": topic.id(),
                        "events": DELIVERY_EVENTS,
                    }),
                )
                .with_reference(&topic),
        )?;

        graph.add(
            ResourceNode::new(ResourceKind::AccessPolicy, suffix)
                .with_property("name", ctx.name("SesSendEmailPolicy"))
                .with_property(
                    "statements",
                    json!([{
                        "actions": ["ses:SendEmail", "ses:SendRawEmail"],
                        "resources": [format!("${{{}.Arn}}", identity.id())],
                    }]),
                )
                .with_property("attached_to", function.id())
                .with_reference(function)
                .with_reference(&identity),
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_infra_core::{BuildInputs, Config, SecretValue, Topology};

    fn ctx(stage: &str, topology: Topology) -> BuildContext {
        let config = Config {
            topology,
            ..Config::default()
        };
        BuildContext::resolve(
            config,
            BuildInputs {
                stage: Some(stage.to_string()),
                secret: Some(SecretValue::new("sk_test_123")),
            },
        )
        .unwrap()
    }

    fn secured_inputs() -> CrossStackOutputs {
        CrossStackOutputs {
            firewall_policy_arn: Some("arn:aws:wafv2:us-east-1:1:global/webacl/FirewallPolicy-dev".to_string()),
            certificate_arn: Some("arn:aws:acm:us-east-1:1:certificate/Certificate-dev".to_string()),
        }
    }

    #[test]
    fn missing_certificate_fails_before_any_node() {
        let inputs = CrossStackOutputs {
            firewall_policy_arn: Some("arn".to_string()),
            certificate_arn: None,
        };
        let err = AppGraph::build(&ctx("dev", Topology::Secured), &inputs).unwrap_err();
        assert_eq!(err, BuildError::MissingCrossStackInput(CrossStackInput::CertificateArn));
    }

    #[test]
    fn minimal_needs_no_inputs() {
        let graph = AppGraph::build(&ctx("dev", Topology::Minimal), &CrossStackOutputs::default()).unwrap();
        assert!(graph.first_of_kind(ResourceKind::Certificate).is_none());
        assert!(graph.first_of_kind(ResourceKind::FirewallPolicy).is_none());
        assert!(graph.first_of_kind(ResourceKind::Topic).is_none());
        assert!(graph.first_of_kind(ResourceKind::Distribution).is_some());
    }

    #[test]
    fn distribution_wiring() {
        let graph = AppGraph::build(&ctx("dev", Topology::Secured), &secured_inputs()).unwrap();
        let distribution = graph.require(ResourceKind::Distribution).unwrap();

        assert_eq!(distribution.id, "Distribution-dev");
        assert_eq!(
            distribution.references,
            vec![
                "Bucket-dev".to_string(),
                "HttpIngress-dev".to_string(),
                "FirewallPolicy-dev".to_string(),
                "Certificate-dev".to_string(),
            ]
        );
        assert_eq!(distribution.property("domain_names").unwrap()[0], "dev.example.com");
        assert_eq!(
            distribution.property("default_behavior").unwrap()["origin"]["http"],
            "${HttpIngress-dev.ApiId}.execute-api.us-west-2.amazonaws.com"
        );
        assert_eq!(
            distribution.property("additional_behaviors").unwrap()[STATIC_ASSET_PATH]["origin"]["bucket"],
            "Bucket-dev"
        );
    }

    #[test]
    fn authorizer_follows_topology() {
        let secured = AppGraph::build(&ctx("dev", Topology::Secured), &secured_inputs()).unwrap();
        let route = secured.require(ResourceKind::Route).unwrap();
        assert_eq!(route.str_property("authorization_type"), Some("AWS_IAM"));

        let observed = AppGraph::build(&ctx("dev", Topology::Observed), &secured_inputs()).unwrap();
        let route = observed.require(ResourceKind::Route).unwrap();
        assert_eq!(route.str_property("authorization_type"), Some("NONE"));
    }

    #[test]
    fn function_environment_marks_secret() {
        let graph = AppGraph::build(&ctx("prod", Topology::Minimal), &CrossStackOutputs::default()).unwrap();
        let function = graph.require(ResourceKind::ComputeFunction).unwrap();

        assert_eq!(function.id, "ComputeFunction");
        assert_eq!(function.physical_name(), "NexusSSRFunction");
        assert_eq!(function.property("environment").unwrap()["STRIPE_SECRET_KEY"], "sk_test_123");
        assert!(function.is_sensitive(&["environment", "STRIPE_SECRET_KEY"]));

        let redacted = graph.redacted();
        let function = redacted.require(ResourceKind::ComputeFunction).unwrap();
        assert_eq!(function.property("environment").unwrap()["STRIPE_SECRET_KEY"], "***");
    }

    #[test]
    fn removal_policy_only_changes_values() {
        let dev = AppGraph::build(&ctx("dev", Topology::Secured), &secured_inputs()).unwrap();
        let prod = AppGraph::build(&ctx("prod", Topology::Secured), &secured_inputs()).unwrap();

        let kinds = |g: &ResourceGraph| g.nodes().iter().map(|n| n.kind).collect::<Vec<_>>();
        assert_eq!(kinds(&dev), kinds(&prod));

        let bucket = |g: &ResourceGraph| g.require(ResourceKind::Bucket).unwrap().clone();
        assert_eq!(bucket(&dev).str_property("removal_policy"), Some("destroy"));
        assert_eq!(bucket(&prod).str_property("removal_policy"), Some("retain"));
    }
}
