//! # Audit Status
//!
//! The five lifecycle states and the transition graph between them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an audit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// Created, awaiting payment.
    Pending,
    /// Payment confirmed, awaiting upload.
    Paid,
    /// Dataset stored; analysis and/or delivery outstanding.
    Processing,
    /// Report generated and delivered.
    Complete,
    /// Analysis failed. Recoverable by re-queueing the stored dataset.
    Failed,
}

impl AuditStatus {
    /// All states, in lifecycle order.
    pub const ALL: [AuditStatus; 5] = [
        Self::Pending,
        Self::Paid,
        Self::Processing,
        Self::Complete,
        Self::Failed,
    ];

    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Whether the edge `self → to` exists in the lifecycle graph.
    pub fn can_transition_to(&self, to: AuditStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Paid)
                | (Self::Paid, Self::Processing)
                | (Self::Processing, Self::Complete)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Processing)
        )
    }

    /// Whether a confirmed payment exists for a request in this state.
    pub fn is_post_payment(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the request has finished successfully.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a stored status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audit status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for AuditStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_allowed() {
        use AuditStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Complete));
    }

    #[test]
    fn skipping_and_reversing_are_rejected() {
        use AuditStatus::*;
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Complete));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Complete.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Complete));
    }

    #[test]
    fn failed_is_recoverable() {
        assert!(AuditStatus::Processing.can_transition_to(AuditStatus::Failed));
        assert!(AuditStatus::Failed.can_transition_to(AuditStatus::Processing));
        assert!(!AuditStatus::Failed.is_terminal());
    }

    #[test]
    fn names_roundtrip() {
        for status in AuditStatus::ALL {
            assert_eq!(status.as_str().parse::<AuditStatus>().unwrap(), status);
        }
        assert!("PAID".parse::<AuditStatus>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&AuditStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
