//! Build error taxonomy
//!
//! IMPORTANT: Error codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

use crate::resource::ResourceKind;

/// Error code registry (v1)
///
/// Every build failure is fatal; the code tells tooling which class of
/// rejection happened without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input validation
    /// Stage selector is not one of dev, staging, prod
    InvalidStage,

    /// A cross-stack value required by the topology was not supplied
    MissingCrossStackInput,

    /// A required secret is absent from the build inputs
    MissingSecret,

    // Graph construction
    /// A node referenced another node that was not constructed yet
    DependencyOrder,

    /// Two nodes resolved to the same identifier
    DuplicateNode,

    /// A table index clashes with an existing index or key
    DuplicateIndex,

    // Policy derivation
    /// An alarm violates its own invariants
    InvalidAlarm,

    /// Policy derivation needs a node kind the graph does not contain
    MissingNode,

    /// Dashboard row does not fill the grid
    InvalidLayout,
}

impl ErrorCode {
    /// Get the error code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidStage => "INVALID_STAGE",
            Self::MissingCrossStackInput => "MISSING_CROSS_STACK_INPUT",
            Self::MissingSecret => "MISSING_SECRET",
            Self::DependencyOrder => "DEPENDENCY_ORDER",
            Self::DuplicateNode => "DUPLICATE_NODE",
            Self::DuplicateIndex => "DUPLICATE_INDEX",
            Self::InvalidAlarm => "INVALID_ALARM",
            Self::MissingNode => "MISSING_NODE",
            Self::InvalidLayout => "INVALID_LAYOUT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Values that cross from the edge graph into the application graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossStackInput {
    FirewallPolicyArn,
    CertificateArn,
}

impl std::fmt::Display for CrossStackInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirewallPolicyArn => write!(f, "firewall_policy_arn"),
            Self::CertificateArn => write!(f, "certificate_arn"),
        }
    }
}

/// Fatal build rejection. None of these are retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("invalid stage '{0}': expected one of dev, staging, prod")]
    InvalidStage(String),

    #[error("topology requires cross-stack input '{0}' but none was supplied")]
    MissingCrossStackInput(CrossStackInput),

    #[error("required secret '{0}' is not set")]
    MissingSecret(String),

    #[error("node '{node}' references '{missing}' which has not been constructed")]
    DependencyOrder { node: String, missing: String },

    #[error("node '{0}' already exists in the graph")]
    DuplicateNode(String),

    #[error("table '{table}' already has an index on '{index}'")]
    DuplicateIndex { table: String, index: String },

    #[error("alarm '{alarm}' is invalid: {reason}")]
    InvalidAlarm { alarm: String, reason: String },

    #[error("graph has no {0} node")]
    MissingNode(ResourceKind),

    #[error("dashboard row {row} spans {width} columns, expected {expected}")]
    InvalidLayout { row: usize, width: u32, expected: u32 },
}

impl BuildError {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidStage(_) => ErrorCode::InvalidStage,
            Self::MissingCrossStackInput(_) => ErrorCode::MissingCrossStackInput,
            Self::MissingSecret(_) => ErrorCode::MissingSecret,
            Self::DependencyOrder { .. } => ErrorCode::DependencyOrder,
            Self::DuplicateNode(_) => ErrorCode::DuplicateNode,
            Self::DuplicateIndex { .. } => ErrorCode::DuplicateIndex,
            Self::InvalidAlarm { .. } => ErrorCode::InvalidAlarm,
            Self::MissingNode(_) => ErrorCode::MissingNode,
            Self::InvalidLayout { .. } => ErrorCode::InvalidLayout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_stability() {
        assert_eq!(ErrorCode::InvalidStage.as_str(), "INVALID_STAGE");
        assert_eq!(ErrorCode::MissingCrossStackInput.as_str(), "MISSING_CROSS_STACK_INPUT");
        assert_eq!(ErrorCode::DependencyOrder.as_str(), "DEPENDENCY_ORDER");
        assert_eq!(ErrorCode::MissingSecret.as_str(), "MISSING_SECRET");
    }

    #[test]
    fn error_code_serialization_matches_as_str() {
        let json = serde_json::to_string(&ErrorCode::DuplicateIndex).unwrap();
        assert_eq!(json, "\"DUPLICATE_INDEX\"");
    }

    #[test]
    fn build_error_maps_to_code() {
        let err = BuildError::MissingCrossStackInput(CrossStackInput::CertificateArn);
        assert_eq!(err.code(), ErrorCode::MissingCrossStackInput);
        assert!(err.to_string().contains("certificate_arn"));

        let err = BuildError::InvalidStage("bogus".to_string());
        assert_eq!(err.code(), ErrorCode::InvalidStage);
        assert!(err.to_string().contains("bogus"));
    }
}
