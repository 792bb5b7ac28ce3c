//! The role-based model.
//!
//! [`RbacModel`] keeps permissions on roles instead of subjects: a
//! [`RoleLattice`] holds the dominance graph, an assignment map links
//! subjects to roles, and an [`AclIndex`] keyed by role holds the grants.
//! Every subject query resolves through the subject's *effective* roles —
//! the assigned roles plus everything they transitively dominate — so a
//! senior role subsumes the permissions of its juniors without duplicated
//! grants.
//!
//! Invariants maintained across all mutations: assignment values are roles
//! known to the lattice, assignment keys are subjects known to the bound
//! context, and every grant key in the role index is a lattice role.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use gatekit_context::{Context, ContextListener};
use gatekit_types::{DataUsage, PolicyModelKind};
use tracing::{debug, warn};

use crate::error::{PolicyError, Result};
use crate::index::AclIndex;
use crate::lattice::RoleLattice;
use crate::model::{ModelBase, PolicyModel};
use crate::properties::PermissionData;

/// Policy model with role-mediated subject permissions.
pub struct RbacModel {
    base: ModelBase,
    lattice: RoleLattice,
    /// subject → assigned roles.
    assignments: BTreeMap<String, BTreeSet<String>>,
    /// Grants keyed by role.
    role_index: AclIndex,
}

impl RbacModel {
    /// Creates an empty role-based model bound to `context`.
    ///
    /// The model subscribes to the context's removal notifications for its
    /// lifetime; the returned handle is the subscription anchor.
    pub fn new(
        name: impl Into<String>,
        context: Rc<RefCell<Context>>,
    ) -> Result<Rc<RefCell<Self>>> {
        let base = ModelBase::new(name, Rc::clone(&context))?;
        let model = Rc::new(RefCell::new(Self {
            base,
            lattice: RoleLattice::new(),
            assignments: BTreeMap::new(),
            role_index: AclIndex::new(),
        }));
        let weak = Rc::downgrade(&model);
        let listener: Weak<RefCell<dyn ContextListener>> = weak;
        model.borrow_mut().base.set_self_listener(listener.clone());
        context.borrow_mut().add_listener(listener);
        Ok(model)
    }

    /// Creates an empty role-based model bound to a fresh default context.
    pub fn with_default_context(name: impl Into<String>) -> Result<Rc<RefCell<Self>>> {
        Self::new(name, Rc::new(RefCell::new(Context::default())))
    }

    /// Creates a deep copy bound to the same context.
    pub fn duplicate(&self) -> Result<Rc<RefCell<Self>>> {
        let copy = Self::new(self.base.name().to_owned(), Rc::clone(self.base.context()))?;
        copy.borrow_mut().takeover_values(self)?;
        Ok(copy)
    }

    // ------------------------------------------------------------------
    // Roles and relations
    // ------------------------------------------------------------------

    /// Returns the role lattice.
    pub fn lattice(&self) -> &RoleLattice {
        &self.lattice
    }

    /// Adds a role to the lattice. Returns whether it was new.
    pub fn add_role(&mut self, role: impl Into<String>) -> Result<bool> {
        self.lattice.add_role(role)
    }

    /// Adds several roles to the lattice.
    pub fn add_roles<I, S>(&mut self, roles: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lattice.add_roles(roles)
    }

    /// Removes a role, its relations, its assignments, and its grants.
    pub fn remove_role(&mut self, role: &str) -> Result<()> {
        self.lattice.remove_role(role)?;
        self.assignments.retain(|_, roles| {
            roles.remove(role);
            !roles.is_empty()
        });
        if self.role_index.remove_subject(role) {
            warn!(role, model = %self.base.name(), "grants dropped for removed role");
        }
        Ok(())
    }

    /// Adds the edge "`dominating` dominates `dominated`".
    pub fn add_role_relation(&mut self, dominating: &str, dominated: &str) -> Result<bool> {
        self.lattice.add_relation(dominating, dominated)
    }

    /// Removes a dominance edge.
    pub fn remove_role_relation(&mut self, dominating: &str, dominated: &str) -> Result<bool> {
        self.lattice.remove_relation(dominating, dominated)
    }

    /// Replaces the whole role lattice.
    ///
    /// Assignments and grants referencing roles absent from the new
    /// lattice are dropped.
    pub fn set_role_lattice(&mut self, lattice: RoleLattice) {
        self.lattice = lattice;
        self.assignments.retain(|subject, roles| {
            let before = roles.len();
            roles.retain(|role| self.lattice.contains_role(role));
            if roles.len() < before {
                warn!(subject, model = %self.base.name(), "stale role assignments dropped");
            }
            !roles.is_empty()
        });
        let stale: Vec<String> = self
            .granted_roles()
            .into_iter()
            .filter(|role| !self.lattice.contains_role(role))
            .collect();
        for role in &stale {
            self.role_index.remove_subject(role);
            warn!(role, model = %self.base.name(), "grants dropped for removed role");
        }
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    /// Assigns `role` to `subject`. Returns whether it was newly assigned.
    pub fn assign_role(&mut self, subject: &str, role: &str) -> Result<bool> {
        self.base.context().borrow().validate_subject(subject)?;
        if !self.lattice.contains_role(role) {
            return Err(PolicyError::UnknownRole(role.to_owned()));
        }
        let added = self
            .assignments
            .entry(subject.to_owned())
            .or_default()
            .insert(role.to_owned());
        if added {
            debug!(subject, role, model = %self.base.name(), "role assigned");
        }
        Ok(added)
    }

    /// Removes `role` from `subject`'s assignments.
    pub fn deassign_role(&mut self, subject: &str, role: &str) -> Result<bool> {
        self.base.context().borrow().validate_subject(subject)?;
        if !self.lattice.contains_role(role) {
            return Err(PolicyError::UnknownRole(role.to_owned()));
        }
        let Some(roles) = self.assignments.get_mut(subject) else {
            return Ok(false);
        };
        let removed = roles.remove(role);
        if roles.is_empty() {
            self.assignments.remove(subject);
        }
        Ok(removed)
    }

    /// Returns the roles directly assigned to `subject`.
    pub fn assigned_roles(&self, subject: &str) -> Result<BTreeSet<String>> {
        self.base.context().borrow().validate_subject(subject)?;
        Ok(self.assignments.get(subject).cloned().unwrap_or_default())
    }

    /// Returns the roles `subject` acts in: the assigned roles plus every
    /// role they transitively dominate.
    pub fn effective_roles(&self, subject: &str) -> Result<BTreeSet<String>> {
        self.base.context().borrow().validate_subject(subject)?;
        let mut effective = BTreeSet::new();
        if let Some(assigned) = self.assignments.get(subject) {
            for role in assigned {
                effective.extend(self.lattice.dominated_roles_for(role, true)?);
                effective.insert(role.clone());
            }
        }
        Ok(effective)
    }

    // ------------------------------------------------------------------
    // Role-keyed grants
    // ------------------------------------------------------------------

    /// Grants `role` the right to execute `activity`.
    pub fn add_activity_permission(&mut self, role: &str, activity: &str) -> Result<bool> {
        self.check_role(role)?;
        self.base.context().borrow().validate_activity(activity)?;
        let added = self.role_index.add_activity_permission(role, activity);
        if added {
            debug!(role, activity, model = %self.base.name(), "activity permission granted");
        }
        Ok(added)
    }

    /// Revokes one activity grant.
    pub fn remove_activity_permission(&mut self, role: &str, activity: &str) -> Result<bool> {
        self.check_role(role)?;
        self.base.context().borrow().validate_activity(activity)?;
        Ok(self.role_index.remove_activity_permission(role, activity))
    }

    /// Revokes all activity grants of `role`.
    pub fn remove_activity_permissions(&mut self, role: &str) -> Result<bool> {
        self.check_role(role)?;
        Ok(self.role_index.remove_activity_permissions(role))
    }

    /// Replaces the activity grants of `role`.
    pub fn set_activity_permissions(
        &mut self,
        role: &str,
        activities: BTreeSet<String>,
    ) -> Result<bool> {
        self.check_role(role)?;
        self.base
            .context()
            .borrow()
            .validate_activities(activities.iter().map(String::as_str))?;
        Ok(self.role_index.set_activity_permissions(role, activities))
    }

    /// Grants `role` the given usage modes on `object` (union).
    pub fn add_object_permission(
        &mut self,
        role: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        self.check_role(role)?;
        self.base.context().borrow().validate_object(object)?;
        let added = self.role_index.add_object_permission(role, object, modes)?;
        if added {
            debug!(role, object, model = %self.base.name(), "object permission granted");
        }
        Ok(added)
    }

    /// Replaces the usage modes `role` holds on `object`.
    pub fn set_object_permission(
        &mut self,
        role: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        self.check_role(role)?;
        self.base.context().borrow().validate_object(object)?;
        self.role_index.set_object_permission(role, object, modes)
    }

    /// Replaces the full object grant map of `role`.
    pub fn set_object_permissions(
        &mut self,
        role: &str,
        permissions: BTreeMap<String, BTreeSet<DataUsage>>,
    ) -> Result<bool> {
        self.check_role(role)?;
        self.base
            .context()
            .borrow()
            .validate_objects(permissions.keys().map(String::as_str))?;
        self.role_index.set_object_permissions(role, permissions)
    }

    /// Revokes all object grants of `role`.
    pub fn remove_object_permissions(&mut self, role: &str) -> Result<bool> {
        self.check_role(role)?;
        Ok(self.role_index.remove_object_permissions(role))
    }

    /// Revokes every mode `role` holds on `object`.
    pub fn remove_object_permission(&mut self, role: &str, object: &str) -> Result<bool> {
        self.check_role(role)?;
        self.base.context().borrow().validate_object(object)?;
        Ok(self.role_index.remove_object_permission(role, object))
    }

    /// Revokes specific modes `role` holds on `object`.
    pub fn remove_object_permission_modes(
        &mut self,
        role: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        self.check_role(role)?;
        self.base.context().borrow().validate_object(object)?;
        self.role_index
            .remove_object_permission_modes(role, object, modes)
    }

    /// Returns the activities granted directly to `role`.
    pub fn activities_for_role(&self, role: &str) -> Result<BTreeSet<String>> {
        self.check_role(role)?;
        Ok(self.role_index.authorized_activities_for_subject(role))
    }

    /// Returns the per-object modes granted directly to `role`.
    pub fn object_permissions_for_role(
        &self,
        role: &str,
    ) -> Result<BTreeMap<String, BTreeSet<DataUsage>>> {
        self.check_role(role)?;
        Ok(self.role_index.object_permissions_for_subject(role))
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    fn check_role(&self, role: &str) -> Result<()> {
        if self.lattice.contains_role(role) {
            Ok(())
        } else {
            Err(PolicyError::UnknownRole(role.to_owned()))
        }
    }

    /// Roles currently holding any grant in the role index.
    fn granted_roles(&self) -> BTreeSet<String> {
        let mut roles: BTreeSet<String> =
            self.role_index.activity_permissions().into_keys().collect();
        roles.extend(self.role_index.object_permissions().into_keys());
        roles
    }

    fn roles_authorize_activity(&self, subject: &str, activity: &str) -> Result<bool> {
        Ok(self
            .effective_roles(subject)?
            .iter()
            .any(|role| self.role_index.is_authorized_for_activity(role, activity)))
    }

    fn modes_on_object(&self, subject: &str, object: &str) -> Result<BTreeSet<DataUsage>> {
        let mut modes = BTreeSet::new();
        for role in &self.effective_roles(subject)? {
            modes.extend(
                self.role_index
                    .object_permissions_for_subject(role)
                    .remove(object)
                    .unwrap_or_default(),
            );
        }
        Ok(modes)
    }
}

impl PolicyModel for RbacModel {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModelBase {
        &mut self.base
    }

    fn kind(&self) -> PolicyModelKind {
        PolicyModelKind::RoleBased
    }

    fn valid_usage_modes(&self) -> &BTreeSet<DataUsage> {
        self.role_index.valid_usage_modes()
    }

    fn on_context_changed(&mut self) {
        // Roles and their grants outlive the binding; only state referencing
        // identifiers unknown to the replacement context is dropped.
        let (unknown_activities, unknown_objects) = {
            let context = self.base.context().borrow();
            self.assignments
                .retain(|subject, _| context.contains_subject(subject));
            let activities: Vec<String> = self
                .role_index
                .activity_permissions()
                .into_values()
                .flatten()
                .filter(|activity| !context.contains_activity(activity))
                .collect();
            let objects: Vec<String> = self
                .role_index
                .object_permissions()
                .into_values()
                .flat_map(BTreeMap::into_keys)
                .filter(|object| !context.contains_object(object))
                .collect();
            (activities, objects)
        };
        for activity in &unknown_activities {
            self.role_index.remove_activity(activity);
        }
        for object in &unknown_objects {
            self.role_index.remove_object(object);
        }
        debug!(model = %self.base.name(), "context rebound, stale references dropped");
    }

    fn apply_usage_mode_change(&mut self, modes: &BTreeSet<DataUsage>) {
        let trimmed = self.role_index.retain_modes(modes);
        if trimmed > 0 {
            warn!(
                model = %self.base.name(),
                trimmed,
                "object grants trimmed by valid usage mode change"
            );
        }
        self.role_index.replace_valid_usage_modes(modes.clone());
    }

    fn is_authorized_for_activity(&self, subject: &str, activity: &str) -> Result<bool> {
        self.base.context().borrow().validate_activity(activity)?;
        self.roles_authorize_activity(subject, activity)
    }

    fn is_authorized_for_object(&self, subject: &str, object: &str) -> Result<bool> {
        self.base.context().borrow().validate_object(object)?;
        Ok(self
            .effective_roles(subject)?
            .iter()
            .any(|role| self.role_index.is_authorized_for_object(role, object)))
    }

    fn is_authorized_for_object_mode(
        &self,
        subject: &str,
        object: &str,
        mode: DataUsage,
    ) -> Result<bool> {
        self.base.context().borrow().validate_object(object)?;
        if !self.role_index.valid_usage_modes().contains(&mode) {
            return Err(PolicyError::InvalidUsageMode { mode });
        }
        Ok(self
            .effective_roles(subject)?
            .iter()
            .any(|role| self.role_index.is_authorized_for_object_mode(role, object, mode)))
    }

    fn authorized_subjects_for_activity(&self, activity: &str) -> Result<BTreeSet<String>> {
        self.base.context().borrow().validate_activity(activity)?;
        let mut subjects = BTreeSet::new();
        for subject in self.assignments.keys() {
            if self.roles_authorize_activity(subject, activity)? {
                subjects.insert(subject.clone());
            }
        }
        Ok(subjects)
    }

    fn authorized_subjects_for_object(&self, object: &str) -> Result<BTreeSet<String>> {
        self.base.context().borrow().validate_object(object)?;
        let mut subjects = BTreeSet::new();
        for subject in self.assignments.keys() {
            if !self.modes_on_object(subject, object)?.is_empty() {
                subjects.insert(subject.clone());
            }
        }
        Ok(subjects)
    }

    fn subjects_and_permissions_for_object(
        &self,
        object: &str,
    ) -> Result<BTreeMap<String, BTreeSet<DataUsage>>> {
        self.base.context().borrow().validate_object(object)?;
        let mut result = BTreeMap::new();
        for subject in self.assignments.keys() {
            let modes = self.modes_on_object(subject, object)?;
            if !modes.is_empty() {
                result.insert(subject.clone(), modes);
            }
        }
        Ok(result)
    }

    fn authorized_activities_for_subject(&self, subject: &str) -> Result<BTreeSet<String>> {
        let mut activities = BTreeSet::new();
        for role in &self.effective_roles(subject)? {
            activities.extend(self.role_index.authorized_activities_for_subject(role));
        }
        Ok(activities)
    }

    fn authorized_objects_for_subject(&self, subject: &str) -> Result<BTreeSet<String>> {
        let mut objects = BTreeSet::new();
        for role in &self.effective_roles(subject)? {
            objects.extend(self.role_index.authorized_objects_for_subject(role));
        }
        Ok(objects)
    }

    fn object_permissions_for_subject(
        &self,
        subject: &str,
    ) -> Result<BTreeMap<String, BTreeSet<DataUsage>>> {
        let mut merged: BTreeMap<String, BTreeSet<DataUsage>> = BTreeMap::new();
        for role in &self.effective_roles(subject)? {
            for (object, modes) in self.role_index.object_permissions_for_subject(role) {
                merged.entry(object).or_default().extend(modes);
            }
        }
        Ok(merged)
    }

    fn has_activity_permissions(&self, subject: &str) -> Result<bool> {
        Ok(self
            .effective_roles(subject)?
            .iter()
            .any(|role| self.role_index.has_activity_permissions(role)))
    }

    fn has_object_permissions(&self, subject: &str) -> Result<bool> {
        Ok(self
            .effective_roles(subject)?
            .iter()
            .any(|role| self.role_index.has_object_permissions(role)))
    }

    /// Drops every role grant. The lattice and the assignments are kept.
    fn reset_permissions(&mut self) {
        self.role_index.clear();
    }

    fn permission_data(&self) -> PermissionData {
        PermissionData::RoleBased {
            roles: self.lattice.roles(),
            relations: self.lattice.role_relations(),
            assignments: self.assignments.clone(),
            activity_permissions: self.role_index.activity_permissions(),
            object_permissions: self.role_index.object_permissions(),
        }
    }

    fn apply_permission_data(
        &mut self,
        valid_usage_modes: &BTreeSet<DataUsage>,
        data: &PermissionData,
    ) -> Result<()> {
        let PermissionData::RoleBased {
            roles,
            relations,
            assignments,
            activity_permissions,
            object_permissions,
        } = data
        else {
            return Err(PolicyError::Parameter(
                "permission payload belongs to a different representation".to_owned(),
            ));
        };
        let mut lattice = RoleLattice::new();
        lattice.set_roles(roles.clone())?;
        for relation in relations {
            lattice.add_relation(&relation.dominating, &relation.dominated)?;
        }
        {
            let context = self.base.context().borrow();
            for (subject, subject_roles) in assignments {
                context.validate_subject(subject)?;
                for role in subject_roles {
                    if !lattice.contains_role(role) {
                        return Err(PolicyError::UnknownRole(role.clone()));
                    }
                }
            }
            for (role, activities) in activity_permissions {
                if !lattice.contains_role(role) {
                    return Err(PolicyError::UnknownRole(role.clone()));
                }
                context.validate_activities(activities.iter().map(String::as_str))?;
            }
            for (role, objects) in object_permissions {
                if !lattice.contains_role(role) {
                    return Err(PolicyError::UnknownRole(role.clone()));
                }
                context.validate_objects(objects.keys().map(String::as_str))?;
            }
        }
        let role_index = AclIndex::from_forward_maps(
            valid_usage_modes.clone(),
            activity_permissions.clone(),
            object_permissions.clone(),
        )?;
        self.lattice = lattice;
        self.assignments = assignments.clone();
        self.role_index = role_index;
        Ok(())
    }
}

impl ContextListener for RbacModel {
    fn subject_removed(&mut self, subject: &str) {
        if self.assignments.remove(subject).is_some() {
            warn!(subject, model = %self.base.name(), "assignments dropped for removed subject");
        }
    }

    fn object_removed(&mut self, object: &str) {
        if self.role_index.remove_object(object) {
            warn!(object, model = %self.base.name(), "grants dropped for removed object");
        }
    }

    fn activity_removed(&mut self, activity: &str) {
        if self.role_index.remove_activity(activity) {
            warn!(activity, model = %self.base.name(), "grants dropped for removed activity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekit_context::ContextError;

    fn modes(list: &[DataUsage]) -> BTreeSet<DataUsage> {
        list.iter().copied().collect()
    }

    fn order_context() -> Rc<RefCell<Context>> {
        let mut context = Context::new("order-processing");
        context.add_subjects(["alice", "bob"]);
        context.add_objects(["invoice", "ledger"]);
        context.add_activities(["approve", "ship"]);
        Rc::new(RefCell::new(context))
    }

    /// admin dominates manager dominates clerk; alice is admin, bob clerk.
    fn staffed_model() -> Rc<RefCell<RbacModel>> {
        let model = RbacModel::new("back-office", order_context()).unwrap();
        {
            let mut model = model.borrow_mut();
            model.add_roles(["admin", "manager", "clerk"]).unwrap();
            model.add_role_relation("admin", "manager").unwrap();
            model.add_role_relation("manager", "clerk").unwrap();
            model.assign_role("alice", "admin").unwrap();
            model.assign_role("bob", "clerk").unwrap();
        }
        model
    }

    #[test]
    fn grants_flow_to_assigned_subjects() {
        let model = staffed_model();
        let mut model = model.borrow_mut();
        model.add_activity_permission("clerk", "ship").unwrap();
        model
            .add_object_permission("clerk", "invoice", &modes(&[DataUsage::Read]))
            .unwrap();

        assert!(model.is_authorized_for_activity("bob", "ship").unwrap());
        assert!(model.is_authorized_for_object("bob", "invoice").unwrap());
        assert!(model
            .is_authorized_for_object_mode("bob", "invoice", DataUsage::Read)
            .unwrap());
        assert!(!model
            .is_authorized_for_object_mode("bob", "invoice", DataUsage::Write)
            .unwrap());
    }

    #[test]
    fn dominating_role_inherits_subordinate_permissions() {
        let model = staffed_model();
        let mut model = model.borrow_mut();
        model.add_activity_permission("clerk", "ship").unwrap();
        model
            .add_object_permission("clerk", "invoice", &modes(&[DataUsage::Read]))
            .unwrap();

        // alice holds admin, which transitively dominates clerk.
        assert!(model.is_authorized_for_activity("alice", "ship").unwrap());
        assert!(model.is_authorized_for_object("alice", "invoice").unwrap());
        assert_eq!(
            model.effective_roles("alice").unwrap(),
            ["admin", "clerk", "manager"]
                .map(str::to_owned)
                .into_iter()
                .collect()
        );

        // The junior does not inherit upward.
        model.add_activity_permission("admin", "approve").unwrap();
        assert!(!model.is_authorized_for_activity("bob", "approve").unwrap());
    }

    #[test]
    fn reverse_queries_resolve_through_effective_roles() {
        let model = staffed_model();
        let mut model = model.borrow_mut();
        model.add_activity_permission("clerk", "ship").unwrap();
        model
            .add_object_permission("clerk", "invoice", &modes(&[DataUsage::Read]))
            .unwrap();
        model
            .add_object_permission("admin", "invoice", &modes(&[DataUsage::Delete]))
            .unwrap();

        assert_eq!(
            model.authorized_subjects_for_activity("ship").unwrap(),
            ["alice", "bob"].map(str::to_owned).into_iter().collect()
        );
        assert_eq!(
            model.subjects_and_permissions_for_object("invoice").unwrap(),
            [
                ("alice".to_owned(), modes(&[DataUsage::Read, DataUsage::Delete])),
                ("bob".to_owned(), modes(&[DataUsage::Read])),
            ]
            .into_iter()
            .collect()
        );
    }

    #[test]
    fn assignment_requires_known_subject_and_role() {
        let model = staffed_model();
        let mut model = model.borrow_mut();

        assert!(matches!(
            model.assign_role("mallory", "clerk"),
            Err(PolicyError::Context(ContextError::UnknownSubject(_)))
        ));
        assert!(matches!(
            model.assign_role("alice", "intern"),
            Err(PolicyError::UnknownRole(_))
        ));
        assert!(!model.deassign_role("alice", "clerk").unwrap());
        assert!(model.deassign_role("alice", "admin").unwrap());
        assert!(model.effective_roles("alice").unwrap().is_empty());
    }

    #[test]
    fn grants_require_a_known_role() {
        let model = staffed_model();
        let mut model = model.borrow_mut();

        assert!(matches!(
            model.add_activity_permission("intern", "ship"),
            Err(PolicyError::UnknownRole(_))
        ));
        assert!(matches!(
            model.add_object_permission("intern", "invoice", &modes(&[DataUsage::Read])),
            Err(PolicyError::UnknownRole(_))
        ));
    }

    #[test]
    fn removing_a_role_scrubs_assignments_and_grants() {
        let model = staffed_model();
        let mut model = model.borrow_mut();
        model.add_activity_permission("clerk", "ship").unwrap();

        model.remove_role("clerk").unwrap();

        assert!(model.assigned_roles("bob").unwrap().is_empty());
        assert!(!model.is_authorized_for_activity("alice", "ship").unwrap());
        assert!(matches!(
            model.activities_for_role("clerk"),
            Err(PolicyError::UnknownRole(_))
        ));
    }

    #[test]
    fn replacing_the_lattice_drops_stale_state() {
        let model = staffed_model();
        let mut model = model.borrow_mut();
        model.add_activity_permission("clerk", "ship").unwrap();
        model.add_activity_permission("admin", "approve").unwrap();

        let replacement = RoleLattice::with_roles(["admin"]).unwrap();
        model.set_role_lattice(replacement);

        assert_eq!(
            model.assigned_roles("alice").unwrap(),
            ["admin".to_owned()].into_iter().collect()
        );
        assert!(model.assigned_roles("bob").unwrap().is_empty());
        assert!(model.is_authorized_for_activity("alice", "approve").unwrap());
        assert!(!model.is_authorized_for_activity("alice", "ship").unwrap());
    }

    #[test]
    fn subject_removal_drops_assignments() {
        let context = order_context();
        let model = RbacModel::new("back-office", Rc::clone(&context)).unwrap();
        {
            let mut model = model.borrow_mut();
            model.add_role("clerk").unwrap();
            model.assign_role("bob", "clerk").unwrap();
            model.add_activity_permission("clerk", "ship").unwrap();
        }

        context.borrow_mut().remove_subject("bob");

        let model = model.borrow();
        assert!(model
            .authorized_subjects_for_activity("ship")
            .unwrap()
            .is_empty());
        // The grant itself survives on the role.
        assert_eq!(
            model.activities_for_role("clerk").unwrap(),
            ["ship".to_owned()].into_iter().collect()
        );
    }

    #[test]
    fn activity_and_object_removal_cascade_into_grants() {
        let context = order_context();
        let model = RbacModel::new("back-office", Rc::clone(&context)).unwrap();
        {
            let mut model = model.borrow_mut();
            model.add_role("clerk").unwrap();
            model.assign_role("bob", "clerk").unwrap();
            model.add_activity_permission("clerk", "ship").unwrap();
            model
                .add_object_permission("clerk", "invoice", &modes(&[DataUsage::Read]))
                .unwrap();
        }

        context.borrow_mut().remove_activity("ship");
        context.borrow_mut().remove_object("invoice");

        let model = model.borrow();
        assert!(model.activities_for_role("clerk").unwrap().is_empty());
        assert!(model.object_permissions_for_role("clerk").unwrap().is_empty());
    }

    #[test]
    fn usage_mode_shrink_cascades_into_role_grants() {
        let model = staffed_model();
        let mut model = model.borrow_mut();
        model
            .add_object_permission("clerk", "invoice", &modes(&[DataUsage::Read, DataUsage::Write]))
            .unwrap();

        model.set_valid_usage_modes(modes(&[DataUsage::Read])).unwrap();
        assert_eq!(
            model.object_permissions_for_role("clerk").unwrap(),
            [("invoice".to_owned(), modes(&[DataUsage::Read]))]
                .into_iter()
                .collect()
        );

        model.set_valid_usage_modes(modes(&[DataUsage::Create])).unwrap();
        assert!(!model.is_authorized_for_object("bob", "invoice").unwrap());
    }

    #[test]
    fn rebinding_keeps_grants_for_surviving_identifiers() {
        let model = staffed_model();
        {
            let mut model = model.borrow_mut();
            model.add_activity_permission("clerk", "ship").unwrap();
            model.add_activity_permission("clerk", "approve").unwrap();
        }

        // Same name, but without bob and without "approve".
        let mut replacement = Context::new("order-processing");
        replacement.add_subjects(["alice"]);
        replacement.add_objects(["invoice", "ledger"]);
        replacement.add_activities(["ship"]);
        model
            .borrow_mut()
            .set_context(Rc::new(RefCell::new(replacement)))
            .unwrap();

        let model = model.borrow();
        assert_eq!(
            model.activities_for_role("clerk").unwrap(),
            ["ship".to_owned()].into_iter().collect()
        );
        assert!(model.is_authorized_for_activity("alice", "ship").unwrap());
        assert!(matches!(
            model.assigned_roles("bob"),
            Err(PolicyError::Context(ContextError::UnknownSubject(_)))
        ));
    }

    #[test]
    fn properties_round_trip_restores_lattice_assignments_and_grants() {
        let context = order_context();
        let model = RbacModel::new("back-office", Rc::clone(&context)).unwrap();
        {
            let mut model = model.borrow_mut();
            model.add_roles(["admin", "clerk"]).unwrap();
            model.add_role_relation("admin", "clerk").unwrap();
            model.assign_role("alice", "admin").unwrap();
            model.add_activity_permission("clerk", "ship").unwrap();
            model
                .add_object_permission("clerk", "ledger", &modes(&[DataUsage::Write]))
                .unwrap();
        }

        let json = model.borrow().properties().to_json().unwrap();
        let properties = crate::properties::ModelProperties::from_json(&json).unwrap();

        let restored = RbacModel::new("placeholder", Rc::clone(&context)).unwrap();
        restored.borrow_mut().initialize(&properties).unwrap();

        assert_eq!(restored.borrow().properties(), model.borrow().properties());
        assert!(restored
            .borrow()
            .is_authorized_for_activity("alice", "ship")
            .unwrap());
    }

    #[test]
    fn initialize_rejects_unknown_roles_in_the_payload() {
        let model = staffed_model();
        let mut properties = model.borrow().properties();
        if let PermissionData::RoleBased { assignments, .. } = &mut properties.permissions {
            assignments
                .entry("alice".to_owned())
                .or_default()
                .insert("intern".to_owned());
        }

        let result = model.borrow_mut().initialize(&properties);
        assert!(matches!(result, Err(PolicyError::UnknownRole(_))));
    }

    #[test]
    fn initialize_rejects_a_payload_of_the_other_representation() {
        let model = staffed_model();
        let mut properties = model.borrow().properties();
        properties.permissions = PermissionData::empty_acl();

        let result = model.borrow_mut().initialize(&properties);
        assert!(matches!(result, Err(PolicyError::Parameter(_))));
    }

    #[test]
    fn duplicate_has_identical_properties_and_independent_state() {
        let model = staffed_model();
        model
            .borrow_mut()
            .add_activity_permission("clerk", "ship")
            .unwrap();

        let copy = model.borrow().duplicate().unwrap();
        assert_eq!(copy.borrow().properties(), model.borrow().properties());

        copy.borrow_mut()
            .add_activity_permission("admin", "approve")
            .unwrap();
        assert!(!model
            .borrow()
            .is_authorized_for_activity("alice", "approve")
            .unwrap());
        assert!(copy
            .borrow()
            .is_authorized_for_activity("alice", "approve")
            .unwrap());
    }

    #[test]
    fn validity_accounts_for_role_mediated_executability() {
        let model = staffed_model();
        let mut model = model.borrow_mut();
        model.add_activity_permission("clerk", "ship").unwrap();

        // "approve" has no authorized subject yet.
        assert!(!model.is_valid());
        model.add_activity_permission("admin", "approve").unwrap();
        assert!(model.is_valid());

        // A grant on an unassigned role does not make an activity executable.
        model.deassign_role("alice", "admin").unwrap();
        assert!(!model.is_executable("approve").unwrap());
    }
}
