//! Immutable build context threaded into every component

use serde::{Serialize, Serializer};

use crate::config::Config;
use crate::error::BuildError;
use crate::stage::StageContext;
use crate::topology::{Topology, TopologyFeatures};

/// Stage used when no selector is supplied at all
pub const DEFAULT_STAGE: &str = "dev";

/// Opaque secret value. Never inspected, never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value, for handing to the compute function environment only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretValue(***)")
    }
}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Raw inputs gathered from the process environment by the caller
#[derive(Debug, Clone, Default)]
pub struct BuildInputs {
    /// Stage selector; `None` falls back to [`DEFAULT_STAGE`]
    pub stage: Option<String>,

    /// Payment-provider key
    pub secret: Option<SecretValue>,
}

/// Everything a build step may read. Created once per stage build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub stage: StageContext,
    pub config: Config,
    pub secret: SecretValue,
}

impl BuildContext {
    /// Validate inputs in order: stage first, then the secret.
    ///
    /// Nothing is constructed if either check fails.
    pub fn resolve(config: Config, inputs: BuildInputs) -> Result<Self, BuildError> {
        let raw_stage = inputs.stage.as_deref().unwrap_or(DEFAULT_STAGE);
        let stage = StageContext::resolve(raw_stage, &config.root_domain)?;

        let secret = match inputs.secret {
            Some(secret) if !secret.expose().is_empty() => secret,
            _ => return Err(BuildError::MissingSecret(config.secret_env.clone())),
        };

        Ok(Self {
            stage,
            config,
            secret,
        })
    }

    pub fn topology(&self) -> Topology {
        self.config.topology
    }

    pub fn features(&self) -> TopologyFeatures {
        self.config.topology.features()
    }

    /// Suffix a base name with the stage suffix
    pub fn name(&self, base: &str) -> String {
        self.stage.name(base)
    }
}
