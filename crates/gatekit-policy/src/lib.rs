//! Access-control policy models over a shared entity context.
//!
//! A [`Context`](gatekit_context::Context) names the subjects, objects,
//! and activities of a domain; this crate layers permission state on top
//! of it. Two representations implement the common [`PolicyModel`]
//! contract:
//!
//! - [`AclModel`] assigns permissions directly to subjects, backed by
//!   mirrored forward/reverse indices for fast queries in both directions.
//! - [`RbacModel`] assigns permissions to roles in a dominance graph
//!   ([`RoleLattice`]) and resolves subjects through their effective roles.
//!
//! Models track context changes: removing an entity from the context
//! cascades into every subscribed model. The complete state of a model
//! round-trips through [`ModelProperties`] as JSON.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use gatekit_context::Context;
//! use gatekit_policy::{AclModel, DataUsage, PolicyModel};
//!
//! let mut context = Context::new("order-processing");
//! context.add_subjects(["alice"]);
//! context.add_objects(["invoice"]);
//! context.add_activities(["approve"]);
//! let context = Rc::new(RefCell::new(context));
//!
//! let model = AclModel::new("front-office", Rc::clone(&context))?;
//! model.borrow_mut().add_activity_permission("alice", "approve")?;
//! model.borrow_mut().add_object_permission(
//!     "alice",
//!     "invoice",
//!     &[DataUsage::Read].into_iter().collect(),
//! )?;
//!
//! assert!(model.borrow().is_authorized_for_activity("alice", "approve")?);
//! assert!(model.borrow().is_valid());
//!
//! // Context removals cascade into the model.
//! context.borrow_mut().remove_subject("alice");
//! assert!(model
//!     .borrow()
//!     .authorized_subjects_for_activity("approve")?
//!     .is_empty());
//! # Ok::<(), gatekit_policy::PolicyError>(())
//! ```

pub mod acl;
pub mod error;
pub mod index;
pub mod lattice;
pub mod model;
pub mod properties;
pub mod rbac;

pub use acl::AclModel;
pub use error::{PolicyError, Result};
pub use index::AclIndex;
pub use lattice::{RoleLattice, RoleLatticeListener, RoleRelation};
pub use model::{ModelBase, PolicyModel, PolicyModelListener};
pub use properties::{
    ActivityPermissionMap, ModelProperties, ObjectPermissionMap, PermissionData,
};
pub use rbac::RbacModel;

// Re-exported so downstream code can name the core vocabulary without a
// direct gatekit-types dependency.
pub use gatekit_types::{DataUsage, EntityKind, PolicyModelKind};

#[cfg(test)]
mod tests;
