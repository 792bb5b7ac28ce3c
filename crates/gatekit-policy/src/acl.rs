//! The direct access-control-list model.
//!
//! [`AclModel`] wraps an [`AclIndex`] with the policy model contract: every
//! mutating call validates subject/object/activity membership in the bound
//! context (and mode membership in the valid-usage-mode set) before the
//! index is touched, so a rejected call never leaves partial state. The
//! model subscribes to its context's removal notifications and cascades
//! them into the index; those cascades are the only mutations that bypass
//! identifier validation, since they reference identifiers the context just
//! dropped.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use gatekit_context::{Context, ContextListener};
use gatekit_types::{DataUsage, PolicyModelKind};
use tracing::{debug, warn};

use crate::error::{PolicyError, Result};
use crate::index::AclIndex;
use crate::model::{ModelBase, PolicyModel};
use crate::properties::PermissionData;

/// Policy model with directly assigned subject permissions.
pub struct AclModel {
    base: ModelBase,
    index: AclIndex,
}

impl AclModel {
    /// Creates an empty ACL model bound to `context`.
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
            index: AclIndex::new(),
        }));
        let weak = Rc::downgrade(&model);
        let listener: Weak<RefCell<dyn ContextListener>> = weak;
        model.borrow_mut().base.set_self_listener(listener.clone());
        context.borrow_mut().add_listener(listener);
        Ok(model)
    }

    /// Creates an empty ACL model bound to a fresh default context.
    pub fn with_default_context(name: impl Into<String>) -> Result<Rc<RefCell<Self>>> {
        Self::new(name, Rc::new(RefCell::new(Context::default())))
    }

    /// Creates a deep copy bound to the same context.
    ///
    /// The copy is independently subscribed; mutating it does not affect
    /// the original.
    pub fn duplicate(&self) -> Result<Rc<RefCell<Self>>> {
        let copy = Self::new(self.base.name().to_owned(), Rc::clone(self.base.context()))?;
        copy.borrow_mut().takeover_values(self)?;
        Ok(copy)
    }

    // ------------------------------------------------------------------
    // Activity permissions
    // ------------------------------------------------------------------

    /// Grants `subject` the right to execute `activity`.
    ///
    /// Returns whether the permission was newly added.
    pub fn add_activity_permission(&mut self, subject: &str, activity: &str) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_activity(activity)?;
        }
        let added = self.index.add_activity_permission(subject, activity);
        if added {
            debug!(subject, activity, model = %self.base.name(), "activity permission granted");
        }
        Ok(added)
    }

    /// Revokes one activity permission.
    pub fn remove_activity_permission(&mut self, subject: &str, activity: &str) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_activity(activity)?;
        }
        Ok(self.index.remove_activity_permission(subject, activity))
    }

    /// Revokes all activity permissions of `subject`.
    pub fn remove_activity_permissions(&mut self, subject: &str) -> Result<bool> {
        self.base.context().borrow().validate_subject(subject)?;
        Ok(self.index.remove_activity_permissions(subject))
    }

    /// Replaces the activity permissions of `subject`.
    pub fn set_activity_permissions(
        &mut self,
        subject: &str,
        activities: BTreeSet<String>,
    ) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_activities(activities.iter().map(String::as_str))?;
        }
        Ok(self.index.set_activity_permissions(subject, activities))
    }

    // ------------------------------------------------------------------
    // Object permissions
    // ------------------------------------------------------------------

    /// Grants `subject` the given usage modes on `object` (union).
    pub fn add_object_permission(
        &mut self,
        subject: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_object(object)?;
        }
        let added = self.index.add_object_permission(subject, object, modes)?;
        if added {
            debug!(subject, object, model = %self.base.name(), "object permission granted");
        }
        Ok(added)
    }

    /// Replaces the usage modes `subject` holds on `object`.
    pub fn set_object_permission(
        &mut self,
        subject: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_object(object)?;
        }
        self.index.set_object_permission(subject, object, modes)
    }

    /// Replaces the full object permission map of `subject`.
    pub fn set_object_permissions(
        &mut self,
        subject: &str,
        permissions: BTreeMap<String, BTreeSet<DataUsage>>,
    ) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_objects(permissions.keys().map(String::as_str))?;
        }
        self.index.set_object_permissions(subject, permissions)
    }

    /// Revokes all object permissions of `subject`.
    pub fn remove_object_permissions(&mut self, subject: &str) -> Result<bool> {
        self.base.context().borrow().validate_subject(subject)?;
        Ok(self.index.remove_object_permissions(subject))
    }

    /// Revokes every mode `subject` holds on `object`.
    pub fn remove_object_permission(&mut self, subject: &str, object: &str) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_object(object)?;
        }
        Ok(self.index.remove_object_permission(subject, object))
    }

    /// Revokes specific modes `subject` holds on `object`.
    pub fn remove_object_permission_modes(
        &mut self,
        subject: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_object(object)?;
        }
        self.index.remove_object_permission_modes(subject, object, modes)
    }
}

impl PolicyModel for AclModel {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModelBase {
        &mut self.base
    }

    fn kind(&self) -> PolicyModelKind {
        PolicyModelKind::Acl
    }

    fn valid_usage_modes(&self) -> &BTreeSet<DataUsage> {
        self.index.valid_usage_modes()
    }

    fn on_context_changed(&mut self) {
        // Direct permissions cannot be carried across a context swap.
        self.index.clear();
        debug!(model = %self.base.name(), "context rebound, permissions cleared");
    }

    fn apply_usage_mode_change(&mut self, modes: &BTreeSet<DataUsage>) {
        let trimmed = self.index.retain_modes(modes);
        if trimmed > 0 {
            warn!(
                model = %self.base.name(),
                trimmed,
                "object permissions trimmed by valid usage mode change"
            );
        }
        self.index.replace_valid_usage_modes(modes.clone());
    }

    fn is_authorized_for_activity(&self, subject: &str, activity: &str) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_activity(activity)?;
        }
        Ok(self.index.is_authorized_for_activity(subject, activity))
    }

    fn is_authorized_for_object(&self, subject: &str, object: &str) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_object(object)?;
        }
        Ok(self.index.is_authorized_for_object(subject, object))
    }

    fn is_authorized_for_object_mode(
        &self,
        subject: &str,
        object: &str,
        mode: DataUsage,
    ) -> Result<bool> {
        {
            let context = self.base.context().borrow();
            context.validate_subject(subject)?;
            context.validate_object(object)?;
        }
        if !self.index.valid_usage_modes().contains(&mode) {
            return Err(PolicyError::InvalidUsageMode { mode });
        }
        Ok(self.index.is_authorized_for_object_mode(subject, object, mode))
    }

    /// Reverse-index presence check; no subject set is materialized.
    fn is_executable(&self, activity: &str) -> Result<bool> {
        self.base.context().borrow().validate_activity(activity)?;
        Ok(self.index.has_authorized_subjects_for_activity(activity))
    }

    fn authorized_subjects_for_activity(&self, activity: &str) -> Result<BTreeSet<String>> {
        self.base.context().borrow().validate_activity(activity)?;
        Ok(self.index.authorized_subjects_for_activity(activity))
    }

    fn authorized_subjects_for_object(&self, object: &str) -> Result<BTreeSet<String>> {
        self.base.context().borrow().validate_object(object)?;
        Ok(self.index.authorized_subjects_for_object(object))
    }

    fn subjects_and_permissions_for_object(
        &self,
        object: &str,
    ) -> Result<BTreeMap<String, BTreeSet<DataUsage>>> {
        self.base.context().borrow().validate_object(object)?;
        Ok(self.index.subjects_and_permissions_for_object(object))
    }

    fn authorized_activities_for_subject(&self, subject: &str) -> Result<BTreeSet<String>> {
        self.base.context().borrow().validate_subject(subject)?;
        Ok(self.index.authorized_activities_for_subject(subject))
    }

    fn authorized_objects_for_subject(&self, subject: &str) -> Result<BTreeSet<String>> {
        self.base.context().borrow().validate_subject(subject)?;
        Ok(self.index.authorized_objects_for_subject(subject))
    }

    fn object_permissions_for_subject(
        &self,
        subject: &str,
    ) -> Result<BTreeMap<String, BTreeSet<DataUsage>>> {
        self.base.context().borrow().validate_subject(subject)?;
        Ok(self.index.object_permissions_for_subject(subject))
    }

    fn has_activity_permissions(&self, subject: &str) -> Result<bool> {
        self.base.context().borrow().validate_subject(subject)?;
        Ok(self.index.has_activity_permissions(subject))
    }

    fn has_object_permissions(&self, subject: &str) -> Result<bool> {
        self.base.context().borrow().validate_subject(subject)?;
        Ok(self.index.has_object_permissions(subject))
    }

    fn reset_permissions(&mut self) {
        self.index.clear();
    }

    fn permission_data(&self) -> PermissionData {
        PermissionData::Acl {
            activity_permissions: self.index.activity_permissions(),
            object_permissions: self.index.object_permissions(),
        }
    }

    fn apply_permission_data(
        &mut self,
        valid_usage_modes: &BTreeSet<DataUsage>,
        data: &PermissionData,
    ) -> Result<()> {
        let PermissionData::Acl {
            activity_permissions,
            object_permissions,
        } = data
        else {
            return Err(PolicyError::Parameter(
                "permission payload belongs to a different representation".to_owned(),
            ));
        };
        {
            let context = self.base.context().borrow();
            for (subject, activities) in activity_permissions {
                context.validate_subject(subject)?;
                context.validate_activities(activities.iter().map(String::as_str))?;
            }
            for (subject, objects) in object_permissions {
                context.validate_subject(subject)?;
                context.validate_objects(objects.keys().map(String::as_str))?;
            }
        }
        self.index = AclIndex::from_forward_maps(
            valid_usage_modes.clone(),
            activity_permissions.clone(),
            object_permissions.clone(),
        )?;
        Ok(())
    }
}

impl ContextListener for AclModel {
    fn subject_removed(&mut self, subject: &str) {
        if self.index.remove_subject(subject) {
            warn!(subject, model = %self.base.name(), "permissions dropped for removed subject");
        }
    }

    fn object_removed(&mut self, object: &str) {
        if self.index.remove_object(object) {
            warn!(object, model = %self.base.name(), "permissions dropped for removed object");
        }
    }

    fn activity_removed(&mut self, activity: &str) {
        if self.index.remove_activity(activity) {
            warn!(activity, model = %self.base.name(), "permissions dropped for removed activity");
        }
    }
}
