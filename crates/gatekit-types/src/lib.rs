//! # gatekit-types: Core types for `Gatekit`
//!
//! This crate contains shared types used across the Gatekit access-control
//! engine:
//! - Data usage modes ([`DataUsage`])
//! - Entity classification ([`EntityKind`])
//! - Policy representation tags ([`PolicyModelKind`])
//!
//! All types are small `Copy` values with deterministic ordering so they can
//! be used as keys in ordered collections and serialize stably.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Data usage modes
// ============================================================================

/// Mode in which a subject may use a protected object.
///
/// Object permissions are granted per mode; a grant is always a non-empty
/// set of modes drawn from this enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataUsage {
    /// Create a new instance of the object.
    Create,

    /// Read the object.
    Read,

    /// Write (modify) the object.
    Write,

    /// Delete the object.
    Delete,
}

impl DataUsage {
    /// All usage modes, in canonical order.
    pub const ALL: [DataUsage; 4] = [
        DataUsage::Create,
        DataUsage::Read,
        DataUsage::Write,
        DataUsage::Delete,
    ];

    /// Returns the full usage mode set.
    ///
    /// This is the default valid-usage-mode set of a freshly constructed
    /// policy model.
    pub fn all() -> BTreeSet<DataUsage> {
        Self::ALL.iter().copied().collect()
    }
}

impl Display for DataUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataUsage::Create => "create",
            DataUsage::Read => "read",
            DataUsage::Write => "write",
            DataUsage::Delete => "delete",
        };
        write!(f, "{label}")
    }
}

// ============================================================================
// Entity classification
// ============================================================================

/// Kind of entity managed by a process context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A principal that can hold permissions.
    Subject,

    /// A resource with per-usage-mode permissions.
    Object,

    /// A process step requiring execution authorization.
    Activity,
}

impl EntityKind {
    /// Returns the default human-readable descriptor label for this kind.
    ///
    /// Contexts and models may override the label (e.g. "Originators"
    /// instead of "Subjects") without changing the underlying namespace.
    pub fn default_descriptor(self) -> &'static str {
        match self {
            EntityKind::Subject => "Subjects",
            EntityKind::Object => "Objects",
            EntityKind::Activity => "Activities",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Subject => "subject",
            EntityKind::Object => "object",
            EntityKind::Activity => "activity",
        };
        write!(f, "{label}")
    }
}

// ============================================================================
// Policy representation tags
// ============================================================================

/// Representation used by a policy model.
///
/// Consumers never need to downcast a model: every consumer-facing operation
/// is part of the model contract, and this tag is the capability marker for
/// the few places that care which representation backs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyModelKind {
    /// Direct access-control-list representation.
    Acl,

    /// Role-based representation layered on a role dominance graph.
    RoleBased,
}

impl PolicyModelKind {
    /// Returns whether this representation carries a role hierarchy.
    pub fn has_role_hierarchy(self) -> bool {
        matches!(self, PolicyModelKind::RoleBased)
    }
}

impl Display for PolicyModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PolicyModelKind::Acl => "acl",
            PolicyModelKind::RoleBased => "role_based",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_usage_modes_are_distinct() {
        let set = DataUsage::all();
        assert_eq!(set.len(), DataUsage::ALL.len());
    }

    #[test]
    fn usage_mode_display() {
        assert_eq!(DataUsage::Create.to_string(), "create");
        assert_eq!(DataUsage::Read.to_string(), "read");
        assert_eq!(DataUsage::Write.to_string(), "write");
        assert_eq!(DataUsage::Delete.to_string(), "delete");
    }

    #[test]
    fn usage_mode_serde_round_trip() {
        for mode in DataUsage::ALL {
            let json = serde_json::to_string(&mode).unwrap();
            let back: DataUsage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, mode);
        }
    }

    #[test]
    fn entity_kind_descriptors() {
        assert_eq!(EntityKind::Subject.default_descriptor(), "Subjects");
        assert_eq!(EntityKind::Object.default_descriptor(), "Objects");
        assert_eq!(EntityKind::Activity.default_descriptor(), "Activities");
    }

    #[test]
    fn model_kind_capabilities() {
        assert!(!PolicyModelKind::Acl.has_role_hierarchy());
        assert!(PolicyModelKind::RoleBased.has_role_hierarchy());
    }
}
