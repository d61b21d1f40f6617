//! Two-phase synthesis (stable v1 output)
//!
//! Phase 1 builds the edge graph and captures its outputs; phase 2 builds the
//! application graph from them. Policy objects are derived only from the
//! completed application graph. Breaking output changes require a new version.

use serde::Serialize;
use sha2::{Digest, Sha256};

use nexus_infra_core::{BuildContext, BuildError, Stage, Topology};
use nexus_infra_graph::{AppGraph, CrossStackOutputs, EdgeGraph, ResourceGraph};

use crate::alarms::AlarmCatalogue;
use crate::budget::BudgetPolicy;
use crate::dashboard::Dashboard;

/// Synthesis output schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SynthesisVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl SynthesisVersion {
    /// Current output schema version
    pub const CURRENT: SynthesisVersion = SynthesisVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for SynthesisVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to serialize synthesis: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything produced for one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synthesis {
    pub version: SynthesisVersion,

    /// Timestamp (RFC 3339); excluded from the fingerprint
    pub generated_at: String,

    pub stage: Stage,

    pub topology: Topology,

    /// Firewall/certificate graph, absent when the topology needs neither
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<ResourceGraph>,

    pub outputs: CrossStackOutputs,

    pub app: ResourceGraph,

    pub alarms: AlarmCatalogue,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<Dashboard>,

    pub budget: BudgetPolicy,

    /// SHA-256 over the redacted graphs and policy objects
    pub fingerprint: String,
}

/// Fields covered by the fingerprint
#[derive(Serialize)]
struct Fingerprinted<'a> {
    stage: Stage,
    topology: Topology,
    edge: Option<&'a ResourceGraph>,
    outputs: &'a CrossStackOutputs,
    app: &'a ResourceGraph,
    alarms: &'a AlarmCatalogue,
    dashboard: Option<&'a Dashboard>,
    budget: &'a BudgetPolicy,
}

impl Synthesis {
    /// Run both phases and derive policy for one stage
    pub fn synthesize(ctx: &BuildContext) -> Result<Self, SynthError> {
        let topology = ctx.topology();
        let features = ctx.features();

        // Phase 1
        let (edge, outputs) = if topology.needs_edge_graph() {
            let edge = EdgeGraph::build(ctx)?;
            let graph = if edge.graph.is_empty() { None } else { Some(edge.graph) };
            (graph, edge.outputs)
        } else {
            (None, CrossStackOutputs::default().with_overrides(&ctx.config.cross_stack))
        };

        // Phase 2
        let app = AppGraph::build(ctx, &outputs)?;

        let (alarms, dashboard) = if features.observability {
            let alarms = AlarmCatalogue::derive(&app, ctx)?;
            let dashboard = Dashboard::compose(&app, &alarms, ctx)?;
            (alarms, Some(dashboard))
        } else {
            (AlarmCatalogue::default(), None)
        };

        let budget = BudgetPolicy::monthly(&ctx.config.budget);

        let mut synthesis = Self {
            version: SynthesisVersion::CURRENT,
            generated_at: chrono::Utc::now().to_rfc3339(),
            stage: ctx.stage.stage,
            topology,
            edge,
            outputs,
            app,
            alarms,
            dashboard,
            budget,
            fingerprint: String::new(),
        };
        synthesis.fingerprint = synthesis.compute_fingerprint()?;

        tracing::info!(
            stage = %synthesis.stage,
            topology = %synthesis.topology,
            nodes = synthesis.node_count(),
            alarms = synthesis.alarms.len(),
            fingerprint = %synthesis.fingerprint,
            "synthesis complete"
        );

        Ok(synthesis)
    }

    fn compute_fingerprint(&self) -> Result<String, serde_json::Error> {
        let edge = self.edge.as_ref().map(ResourceGraph::redacted);
        let app = self.app.redacted();

        let covered = Fingerprinted {
            stage: self.stage,
            topology: self.topology,
            edge: edge.as_ref(),
            outputs: &self.outputs,
            app: &app,
            alarms: &self.alarms,
            dashboard: self.dashboard.as_ref(),
            budget: &self.budget,
        };

        let bytes = serde_json::to_vec(&covered)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Total nodes across both graphs
    pub fn node_count(&self) -> usize {
        self.app.len() + self.edge.as_ref().map_or(0, ResourceGraph::len)
    }

    /// Copy with secret values replaced
    pub fn redacted(&self) -> Self {
        let mut synthesis = self.clone();
        synthesis.app = self.app.redacted();
        synthesis.edge = self.edge.as_ref().map(ResourceGraph::redacted);
        synthesis
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_infra_core::{BuildInputs, Config, SecretValue};

    fn ctx(topology: Topology) -> BuildContext {
        BuildContext::resolve(
            Config {
                topology,
                ..Config::default()
            },
            BuildInputs {
                stage: Some("dev".to_string()),
                secret: Some(SecretValue::new("sk_test_synth")),
            },
        )
        .unwrap()
    }

    #[test]
    fn minimal_has_no_edge_or_observability() {
        let synthesis = Synthesis::synthesize(&ctx(Topology::Minimal)).unwrap();
        assert!(synthesis.edge.is_none());
        assert!(synthesis.alarms.is_empty());
        assert!(synthesis.dashboard.is_none());
        assert_eq!(synthesis.budget.limit.amount, 100);
    }

    #[test]
    fn fingerprint_ignores_timestamp_and_secret() {
        let first = Synthesis::synthesize(&ctx(Topology::Secured)).unwrap();
        let mut other = ctx(Topology::Secured);
        other.secret = SecretValue::new("sk_test_rotated");
        let second = Synthesis::synthesize(&other).unwrap();

        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.fingerprint.len(), 64);
    }

    #[test]
    fn written_json_is_redacted() {
        let synthesis = Synthesis::synthesize(&ctx(Topology::Secured)).unwrap();
        assert!(synthesis.to_json().unwrap().contains("sk_test_synth"));

        let json = synthesis.redacted().to_json().unwrap();
        assert!(!json.contains("sk_test_synth"));
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"fingerprint\""));
    }
}
