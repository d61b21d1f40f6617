//! Values handed from the edge graph to the application graph

use serde::Serialize;

use nexus_infra_core::{BuildError, CrossStackInput, CrossStackOverrides, TopologyFeatures};

/// Identifiers produced by the firewall/certificate graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrossStackOutputs {
    pub firewall_policy_arn: Option<String>,
    pub certificate_arn: Option<String>,
}

impl CrossStackOutputs {
    /// Apply externally managed values; these win over generated ones
    pub fn with_overrides(mut self, overrides: &CrossStackOverrides) -> Self {
        if let Some(arn) = &overrides.firewall_policy_arn {
            tracing::warn!(%arn, "using externally managed firewall policy");
            self.firewall_policy_arn = Some(arn.clone());
        }
        if let Some(arn) = &overrides.certificate_arn {
            tracing::warn!(%arn, "using externally managed certificate");
            self.certificate_arn = Some(arn.clone());
        }
        self
    }

    pub fn get(&self, input: CrossStackInput) -> Option<&str> {
        match input {
            CrossStackInput::FirewallPolicyArn => self.firewall_policy_arn.as_deref(),
            CrossStackInput::CertificateArn => self.certificate_arn.as_deref(),
        }
    }

    /// Value of a required input, or `MissingCrossStackInput`
    pub fn require(&self, input: CrossStackInput) -> Result<&str, BuildError> {
        self.get(input)
            .filter(|arn| !arn.is_empty())
            .ok_or(BuildError::MissingCrossStackInput(input))
    }

    /// Check every input a topology needs is present
    pub fn check(&self, features: &TopologyFeatures) -> Result<(), BuildError> {
        for input in required_inputs(features) {
            self.require(input)?;
        }
        Ok(())
    }
}

/// Cross-stack inputs a topology cannot build without
pub fn required_inputs(features: &TopologyFeatures) -> Vec<CrossStackInput> {
    let mut inputs = Vec::new();
    if features.firewall {
        inputs.push(CrossStackInput::FirewallPolicyArn);
    }
    if features.certificate {
        inputs.push(CrossStackInput::CertificateArn);
    }
    inputs
}
