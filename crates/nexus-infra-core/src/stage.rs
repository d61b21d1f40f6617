//! Deployment stage resolution and naming conventions

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Deployment stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Dev,
    Staging,
    Prod,
}

impl Stage {
    /// All stages, in promotion order
    pub const ALL: [Stage; 3] = [Stage::Dev, Stage::Staging, Stage::Prod];

    /// Parse a stage selector. Only the three canonical lowercase values are accepted.
    pub fn parse(raw: &str) -> Result<Self, BuildError> {
        match raw {
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            other => Err(BuildError::InvalidStage(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What happens to stateful resources when the stack is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Retain,
    Destroy,
}

/// Stage plus every name derived from it.
///
/// Production-only differences are limited to property values; callers
/// must never branch on `is_prod` to add or drop nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageContext {
    pub stage: Stage,

    /// `""` for prod, `-<stage>` otherwise
    pub suffix: String,

    /// `<root>` for prod, `<stage>.<root>` otherwise
    pub domain_name: String,

    pub is_prod: bool,
}

impl StageContext {
    pub fn new(stage: Stage, root_domain: &str) -> Self {
        let is_prod = stage.is_prod();
        let (suffix, domain_name) = if is_prod {
            (String::new(), root_domain.to_string())
        } else {
            (format!("-{}", stage), format!("{}.{}", stage, root_domain))
        };

        Self {
            stage,
            suffix,
            domain_name,
            is_prod,
        }
    }

    /// Resolve a raw selector, failing before anything else is derived
    pub fn resolve(raw: &str, root_domain: &str) -> Result<Self, BuildError> {
        Ok(Self::new(Stage::parse(raw)?, root_domain))
    }

    /// Append the stage suffix to a base name
    pub fn name(&self, base: &str) -> String {
        format!("{}{}", base, self.suffix)
    }

    /// Stack names keep the stage even in prod
    pub fn stack_name(&self, base: &str) -> String {
        format!("{}-{}", base, self.stage)
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        if self.is_prod {
            RemovalPolicy::Retain
        } else {
            RemovalPolicy::Destroy
        }
    }

    /// Sender address for transactional mail, plus-addressed outside prod
    pub fn sender_address(&self, local_part: &str, root_domain: &str) -> String {
        if self.is_prod {
            format!("{}@{}", local_part, root_domain)
        } else {
            format!("{}+{}@{}", local_part, self.stage, root_domain)
        }
    }
}
