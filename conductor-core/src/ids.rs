//! ABOUTME: Prefixed identifier types shared across Conductor components
//! ABOUTME: Each identifier carries a documented, validated prefix

use crate::error::{ConductorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A string identifier that must carry a fixed, documented prefix.
///
/// Mirrors the "prefixes are part of the contract" rule: constructing one
/// from a string that lacks (or mismatches) the prefix is a validation
/// error, not a panic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixedId<P: IdPrefix>(String, #[serde(skip)] std::marker::PhantomData<P>);

pub trait IdPrefix {
    const PREFIX: &'static str;
}

impl<P: IdPrefix> PrefixedId<P> {
    /// Generate a new random id with this type's prefix.
    pub fn new() -> Self {
        Self(format!("{}{}", P::PREFIX, Uuid::new_v4()), std::marker::PhantomData)
    }

    /// Parse an existing string, verifying it carries the correct prefix.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if !raw.starts_with(P::PREFIX) {
            return Err(ConductorError::validation(
                "id",
                format!("expected prefix '{}', got '{raw}'", P::PREFIX),
            ));
        }
        Ok(Self(raw, std::marker::PhantomData))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<P: IdPrefix> Default for PrefixedId<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: IdPrefix> fmt::Display for PrefixedId<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! prefixed_id {
    ($name:ident, $marker:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $marker;
        impl IdPrefix for $marker {
            const PREFIX: &'static str = $prefix;
        }
        pub type $name = PrefixedId<$marker>;
    };
}

prefixed_id!(AgentId, AgentIdMarker, "agent:");
prefixed_id!(DepartmentId, DepartmentIdMarker, "dept_");
prefixed_id!(LeadAgentId, LeadAgentIdMarker, "lead_");
prefixed_id!(MessageId, MessageIdMarker, "msg_");
prefixed_id!(SessionId, SessionIdMarker, "session_");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_prefix() {
        let id = AgentId::new();
        assert!(id.as_str().starts_with("agent:"));
        let parsed = AgentId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(AgentId::parse("dept_abc").is_err());
        assert!(DepartmentId::parse("agent:abc").is_err());
    }

    #[test]
    fn distinct_prefixes() {
        assert_eq!(AgentId::new().as_str().split(':').next(), Some("agent"));
        assert!(DepartmentId::new().as_str().starts_with("dept_"));
        assert!(LeadAgentId::new().as_str().starts_with("lead_"));
        assert!(MessageId::new().as_str().starts_with("msg_"));
        assert!(SessionId::new().as_str().starts_with("session_"));
    }
}
