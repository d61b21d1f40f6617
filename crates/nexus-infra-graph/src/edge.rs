//! Firewall/certificate graph (phase 1)
//!
//! Edge resources must live in the edge region, so they are built as an
//! independent stack whose outputs feed the application graph.

use serde_json::json;

use nexus_infra_core::{BuildContext, BuildError, ResourceKind, ResourceNode};

use crate::graph::ResourceGraph;
use crate::outputs::CrossStackOutputs;

/// Managed rule group applied to every request
const COMMON_RULE_SET: &str = "AWSManagedRulesCommonRuleSet";

/// The built edge graph and the values it exports
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeGraph {
    pub graph: ResourceGraph,
    pub outputs: CrossStackOutputs,
}

impl EdgeGraph {
    /// Build the edge graph for one stage.
    ///
    /// Values already supplied through `[cross_stack]` are not re-issued.
    pub fn build(ctx: &BuildContext) -> Result<Self, BuildError> {
        let features = ctx.features();
        let overrides = &ctx.config.cross_stack;
        let region = &ctx.config.edge_region;
        let account = ctx.config.account_ref();

        let mut graph = ResourceGraph::new(
            ctx.stage.stack_name("WafCdkStack"),
            format!("Web ACL for the Nexus application ({})", ctx.stage.stage),
            region.clone(),
        );
        let mut outputs = CrossStackOutputs::default();

        if features.firewall && overrides.firewall_policy_arn.is_none() {
            let id = ResourceKind::FirewallPolicy.node_id(&ctx.stage.suffix);
            let arn = format!("arn:aws:wafv2:{}:{}:global/webacl/{}", region, account, id);

            graph.add(
                ResourceNode::new(ResourceKind::FirewallPolicy, &ctx.stage.suffix)
                    .with_property("name", ctx.name("NexusWebACL"))
                    .with_property("arn", arn.clone())
                    .with_property("scope", "CLOUDFRONT")
                    .with_property("default_action", "allow")
                    .with_property("visibility_config", visibility("webACL"))
                    .with_property(
                        "rules",
                        json!([{
                            "name": format!("AWS-{}", COMMON_RULE_SET),
                            "priority": 1,
                            "override_action": "none",
                            "statement": {
                                "managed_rule_group": {
                                    "vendor_name": "AWS",
                                    "name": COMMON_RULE_SET,
                                }
                            },
                            "visibility_config": visibility(&format!("AWS-{}", COMMON_RULE_SET)),
                        }]),
                    ),
            )?;
            outputs.firewall_policy_arn = Some(arn);
        }

        if features.certificate && overrides.certificate_arn.is_none() {
            let id = ResourceKind::Certificate.node_id(&ctx.stage.suffix);
            let arn = format!("arn:aws:acm:{}:{}:certificate/{}", region, account, id);

            graph.add(
                ResourceNode::new(ResourceKind::Certificate, &ctx.stage.suffix)
                    .with_property("arn", arn.clone())
                    .with_property("domain_name", ctx.stage.domain_name.clone())
                    .with_property("validation", "DNS"),
            )?;
            outputs.certificate_arn = Some(arn);
        }

        let outputs = outputs.with_overrides(overrides);

        tracing::info!(
            stack = %graph.name,
            nodes = graph.len(),
            firewall = outputs.firewall_policy_arn.is_some(),
            certificate = outputs.certificate_arn.is_some(),
            "built edge graph"
        );

        Ok(Self { graph, outputs })
    }
}

fn visibility(metric_name: &str) -> serde_json::Value {
    json!({
        "cloud_watch_metrics_enabled": true,
        "metric_name": metric_name,
        "sampled_requests_enabled": true,
    })
}
