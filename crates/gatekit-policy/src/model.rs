//! The policy model contract shared by both representations.
//!
//! [`ModelBase`] holds the state common to every model (name, bound
//! context, listener registry); [`PolicyModel`] is the contract consumers
//! program against. The provided methods implement the representation-
//! independent lifecycle — context rebinding, valid-usage-mode changes,
//! executability and validity checking, the properties round-trip — on top
//! of a small set of required hooks each representation supplies.
//!
//! A model is always bound to a context; rebinding swaps the binding but
//! never clears it, so an "unbound" model cannot be constructed. On a
//! valid-usage-mode change the representation cascade-cleans its own
//! permission state *before* external listeners are notified, so no
//! observer ever sees a model whose permissions reference an invalid mode.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use gatekit_context::{Context, ContextListener};
use gatekit_types::{DataUsage, EntityKind, PolicyModelKind};

use crate::error::{PolicyError, Result};
use crate::properties::{ModelProperties, PermissionData};

/// Observer of model-level changes.
///
/// Notifications are synchronous and ordered; a listener must not mutate
/// the model it observes from within the callback.
pub trait PolicyModelListener {
    /// Called after the valid-usage-mode set changed from `old` to `new`.
    ///
    /// By the time this fires the model is already consistent with `new`.
    fn valid_usage_modes_changed(&mut self, old: &BTreeSet<DataUsage>, new: &BTreeSet<DataUsage>) {
        let _ = (old, new);
    }
}

/// State shared by every policy model representation.
pub struct ModelBase {
    name: String,
    subject_descriptor: String,
    context: Rc<RefCell<Context>>,
    self_listener: Option<Weak<RefCell<dyn ContextListener>>>,
    listeners: Vec<Weak<RefCell<dyn PolicyModelListener>>>,
}

impl ModelBase {
    /// Creates base state bound to `context`. The name must be non-empty.
    pub(crate) fn new(name: impl Into<String>, context: Rc<RefCell<Context>>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PolicyError::Parameter(
                "model name must not be empty".to_owned(),
            ));
        }
        Ok(Self {
            name,
            subject_descriptor: EntityKind::Subject.default_descriptor().to_owned(),
            context,
            self_listener: None,
            listeners: Vec::new(),
        })
    }

    /// Returns the model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Returns the label used for this model's subjects.
    pub fn subject_descriptor(&self) -> &str {
        &self.subject_descriptor
    }

    /// Overrides the label used for this model's subjects.
    pub fn set_subject_descriptor(&mut self, label: impl Into<String>) {
        self.subject_descriptor = label.into();
    }

    /// Returns the bound context.
    pub fn context(&self) -> &Rc<RefCell<Context>> {
        &self.context
    }

    pub(crate) fn replace_context(&mut self, context: Rc<RefCell<Context>>) {
        self.context = context;
    }

    pub(crate) fn set_self_listener(&mut self, listener: Weak<RefCell<dyn ContextListener>>) {
        self.self_listener = Some(listener);
    }

    pub(crate) fn self_listener(&self) -> Option<&Weak<RefCell<dyn ContextListener>>> {
        self.self_listener.as_ref()
    }

    pub(crate) fn add_listener(&mut self, listener: Weak<RefCell<dyn PolicyModelListener>>) {
        self.listeners.push(listener);
    }

    pub(crate) fn remove_listener(&mut self, listener: &Weak<RefCell<dyn PolicyModelListener>>) {
        self.listeners.retain(|known| !Weak::ptr_eq(known, listener));
    }

    pub(crate) fn notify_usage_modes_changed(
        &mut self,
        old: &BTreeSet<DataUsage>,
        new: &BTreeSet<DataUsage>,
    ) {
        self.listeners.retain(|listener| listener.strong_count() > 0);
        for listener in &self.listeners {
            if let Some(listener) = listener.upgrade() {
                listener.borrow_mut().valid_usage_modes_changed(old, new);
            }
        }
    }
}

/// Contract shared by the ACL and role-based representations.
///
/// Consumers program against this trait (or `dyn PolicyModel`); the
/// [`kind`](PolicyModel::kind) tag identifies the representation where it
/// matters, so no type tests are ever needed at call sites.
pub trait PolicyModel {
    // ------------------------------------------------------------------
    // Required: state access and representation hooks
    // ------------------------------------------------------------------

    /// Returns the shared base state.
    fn base(&self) -> &ModelBase;

    /// Returns the shared base state, mutably.
    fn base_mut(&mut self) -> &mut ModelBase;

    /// Returns the representation tag.
    fn kind(&self) -> PolicyModelKind;

    /// Returns the current valid-usage-mode set.
    fn valid_usage_modes(&self) -> &BTreeSet<DataUsage>;

    /// Compatibility hook consulted before rebinding to `context`.
    ///
    /// The representation-independent name check has already passed when
    /// this is called. The default accepts any context.
    fn check_context_compatibility(&self, context: &Context) -> Result<()> {
        let _ = context;
        Ok(())
    }

    /// Rebuild/reset hook invoked after the context binding changed.
    ///
    /// The ACL representation clears its permission state; the role-based
    /// representation re-derives what remains valid.
    fn on_context_changed(&mut self);

    /// Cascade hook for a valid-usage-mode change.
    ///
    /// The representation must drop permission state referencing modes
    /// outside `modes` and adopt `modes` as its valid set, leaving the
    /// model fully consistent before any listener observes the change.
    fn apply_usage_mode_change(&mut self, modes: &BTreeSet<DataUsage>);

    // ------------------------------------------------------------------
    // Required: authorization queries
    // ------------------------------------------------------------------

    /// Returns whether `subject` may execute `activity`.
    fn is_authorized_for_activity(&self, subject: &str, activity: &str) -> Result<bool>;

    /// Returns whether `subject` holds any usage mode on `object`.
    fn is_authorized_for_object(&self, subject: &str, object: &str) -> Result<bool>;

    /// Returns whether `subject` holds `mode` on `object`.
    fn is_authorized_for_object_mode(
        &self,
        subject: &str,
        object: &str,
        mode: DataUsage,
    ) -> Result<bool>;

    /// Returns the subjects authorized to execute `activity`.
    fn authorized_subjects_for_activity(&self, activity: &str) -> Result<BTreeSet<String>>;

    /// Returns the subjects holding any mode on `object`.
    fn authorized_subjects_for_object(&self, object: &str) -> Result<BTreeSet<String>>;

    /// Returns the subjects holding modes on `object`, with their modes.
    fn subjects_and_permissions_for_object(
        &self,
        object: &str,
    ) -> Result<BTreeMap<String, BTreeSet<DataUsage>>>;

    /// Returns the activities `subject` may execute.
    fn authorized_activities_for_subject(&self, subject: &str) -> Result<BTreeSet<String>>;

    /// Returns the objects `subject` holds any mode on.
    fn authorized_objects_for_subject(&self, subject: &str) -> Result<BTreeSet<String>>;

    /// Returns the per-object modes `subject` holds.
    fn object_permissions_for_subject(
        &self,
        subject: &str,
    ) -> Result<BTreeMap<String, BTreeSet<DataUsage>>>;

    /// Returns whether `subject` holds any activity permission.
    fn has_activity_permissions(&self, subject: &str) -> Result<bool>;

    /// Returns whether `subject` holds any object permission.
    fn has_object_permissions(&self, subject: &str) -> Result<bool>;

    /// Drops all permission state. The valid-usage-mode set is kept.
    fn reset_permissions(&mut self);

    /// Exports the representation-specific permission payload.
    fn permission_data(&self) -> PermissionData;

    /// Validates `data` in full against the bound context and
    /// `valid_usage_modes`, then replaces all permission state with it.
    ///
    /// On error the model is unchanged.
    fn apply_permission_data(
        &mut self,
        valid_usage_modes: &BTreeSet<DataUsage>,
        data: &PermissionData,
    ) -> Result<()>;

    // ------------------------------------------------------------------
    // Provided: representation-independent lifecycle
    // ------------------------------------------------------------------

    /// Returns the model name.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Returns the bound context.
    fn context(&self) -> Rc<RefCell<Context>> {
        Rc::clone(self.base().context())
    }

    /// Rebinds the model to a replacement context.
    ///
    /// The replacement must carry the same name as the bound context and
    /// pass the representation's compatibility hook. The model unsubscribes
    /// from the old context, subscribes to the new one, and then rebuilds
    /// its derived state via [`on_context_changed`](Self::on_context_changed).
    fn set_context(&mut self, context: Rc<RefCell<Context>>) -> Result<()> {
        {
            let current = self.base().context().borrow();
            let next = context.borrow();
            if current.name() != next.name() {
                return Err(PolicyError::ContextMismatch {
                    expected: current.name().to_owned(),
                    found: next.name().to_owned(),
                });
            }
            self.check_context_compatibility(&next)?;
        }
        if let Some(listener) = self.base().self_listener().cloned() {
            self.base().context().borrow_mut().remove_listener(&listener);
            context.borrow_mut().add_listener(listener);
        }
        self.base_mut().replace_context(context);
        self.on_context_changed();
        Ok(())
    }

    /// Replaces the valid-usage-mode set.
    ///
    /// An empty set is rejected; an unchanged set is a no-op. Otherwise the
    /// representation cascade-cleans its permission state first and
    /// listeners are notified with (old, new) only once the model is
    /// consistent again.
    fn set_valid_usage_modes(&mut self, modes: BTreeSet<DataUsage>) -> Result<()> {
        if modes.is_empty() {
            return Err(PolicyError::Parameter(
                "valid usage mode set must not be empty".to_owned(),
            ));
        }
        if &modes == self.valid_usage_modes() {
            return Ok(());
        }
        let old = self.valid_usage_modes().clone();
        self.apply_usage_mode_change(&modes);
        self.base_mut().notify_usage_modes_changed(&old, &modes);
        Ok(())
    }

    /// Returns whether at least one subject is authorized for `activity`.
    ///
    /// Fails if the activity is unknown to the bound context.
    fn is_executable(&self, activity: &str) -> Result<bool> {
        self.base().context().borrow().validate_activity(activity)?;
        Ok(!self.authorized_subjects_for_activity(activity)?.is_empty())
    }

    /// Checks that every activity of the bound context is executable.
    fn check_validity(&self) -> Result<()> {
        let activities = self.base().context().borrow().activities();
        for activity in &activities {
            if !self.is_executable(activity)? {
                return Err(PolicyError::NotExecutable(activity.clone()));
            }
        }
        Ok(())
    }

    /// Boolean form of [`check_validity`](Self::check_validity).
    fn is_valid(&self) -> bool {
        self.check_validity().is_ok()
    }

    /// Captures the complete serializable state of the model.
    fn properties(&self) -> ModelProperties {
        ModelProperties {
            name: self.base().name().to_owned(),
            context_name: self.base().context().borrow().name().to_owned(),
            subject_descriptor: self.base().subject_descriptor().to_owned(),
            valid_usage_modes: self.valid_usage_modes().clone(),
            permissions: self.permission_data(),
        }
    }

    /// Restores the model from captured properties.
    ///
    /// The payload's context name must match the bound context; the whole
    /// payload is validated before any state changes.
    fn initialize(&mut self, properties: &ModelProperties) -> Result<()> {
        let bound = self.base().context().borrow().name().to_owned();
        if properties.context_name != bound {
            return Err(PolicyError::ContextMismatch {
                expected: bound,
                found: properties.context_name.clone(),
            });
        }
        if properties.name.trim().is_empty() {
            return Err(PolicyError::Parameter(
                "model name must not be empty".to_owned(),
            ));
        }
        if properties.valid_usage_modes.is_empty() {
            return Err(PolicyError::Parameter(
                "valid usage mode set must not be empty".to_owned(),
            ));
        }
        self.apply_permission_data(&properties.valid_usage_modes, &properties.permissions)?;
        self.base_mut().set_name(properties.name.clone());
        self.base_mut()
            .set_subject_descriptor(properties.subject_descriptor.clone());
        Ok(())
    }

    /// Takes over another model's values: subject descriptor, valid usage
    /// modes, and all permission state. The model keeps its own name.
    fn takeover_values(&mut self, other: &Self) -> Result<()>
    where
        Self: Sized,
    {
        let name = self.base().name().to_owned();
        self.initialize(&other.properties())?;
        self.base_mut().set_name(name);
        Ok(())
    }

    /// Subscribes an observer to model-level change notifications.
    fn add_model_listener(&mut self, listener: Weak<RefCell<dyn PolicyModelListener>>) {
        self.base_mut().add_listener(listener);
    }

    /// Unsubscribes an observer, matching by pointer identity.
    fn remove_model_listener(&mut self, listener: &Weak<RefCell<dyn PolicyModelListener>>) {
        self.base_mut().remove_listener(listener);
    }
}
