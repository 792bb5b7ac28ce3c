//! Serialization payloads for the properties round-trip.
//!
//! A persistence collaborator owns file formats and I/O; the engine only
//! guarantees that [`ModelProperties`] captures everything needed to rebuild
//! a model against a context with the same name, and that
//! `properties()`/`initialize()` round-trip losslessly.

use std::collections::{BTreeMap, BTreeSet};

use gatekit_types::DataUsage;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lattice::RoleRelation;

/// Forward activity permission map: subject (or role) → activities.
pub type ActivityPermissionMap = BTreeMap<String, BTreeSet<String>>;

/// Forward object permission map: subject (or role) → object → usage modes.
pub type ObjectPermissionMap = BTreeMap<String, BTreeMap<String, BTreeSet<DataUsage>>>;

/// Complete serializable state of a policy model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProperties {
    /// Model name.
    pub name: String,

    /// Name of the context the model was bound to when captured.
    ///
    /// Loading rejects a payload whose context name does not match the
    /// target model's bound context.
    pub context_name: String,

    /// Human-readable label for the model's subjects.
    pub subject_descriptor: String,

    /// The valid-usage-mode set at capture time.
    pub valid_usage_modes: BTreeSet<DataUsage>,

    /// Representation-specific permission state.
    pub permissions: PermissionData,
}

impl ModelProperties {
    /// Serializes the properties to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserializes properties from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Representation-specific permission payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "representation", rename_all = "snake_case")]
pub enum PermissionData {
    /// Direct ACL state: forward permission maps keyed by subject.
    ///
    /// Only the forward direction is captured; the reverse indices are
    /// derived state and are rebuilt on load.
    Acl {
        /// subject → authorized activities.
        activity_permissions: ActivityPermissionMap,
        /// subject → object → granted usage modes.
        object_permissions: ObjectPermissionMap,
    },

    /// Role-based state: the dominance graph, subject→role assignments, and
    /// forward permission maps keyed by role.
    RoleBased {
        /// The role set of the dominance graph.
        roles: BTreeSet<String>,
        /// The dominance edges.
        relations: Vec<RoleRelation>,
        /// subject → assigned roles.
        assignments: BTreeMap<String, BTreeSet<String>>,
        /// role → authorized activities.
        activity_permissions: ActivityPermissionMap,
        /// role → object → granted usage modes.
        object_permissions: ObjectPermissionMap,
    },
}

impl PermissionData {
    /// Returns an empty ACL payload.
    pub fn empty_acl() -> Self {
        PermissionData::Acl {
            activity_permissions: ActivityPermissionMap::new(),
            object_permissions: ObjectPermissionMap::new(),
        }
    }
}
