//! gatekit-context: Process context for `Gatekit`
//!
//! A [`Context`] owns the namespaces of valid subject, object, and activity
//! identifiers for one process definition. Policy models are bound to a
//! context for their lifetime: they validate every referenced identifier
//! against it and subscribe to its removal notifications so their permission
//! state never references an identifier the context no longer knows.
//!
//! # Notifications
//!
//! Listener callbacks fire synchronously, in subscription order, on the
//! caller's thread. A listener must not call back into the context from
//! within a callback; the context is borrowed for the duration of the
//! dispatch and a re-entrant call will panic rather than corrupt state.
//!
//! # Example
//!
//! ```
//! use gatekit_context::Context;
//!
//! let mut context = Context::new("order-processing");
//! context.add_subjects(["alice", "bob"]);
//! context.add_activities(["approve-order"]);
//!
//! assert!(context.validate_subject("alice").is_ok());
//! assert!(context.validate_subject("mallory").is_err());
//! ```

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Weak;

use gatekit_types::EntityKind;
use tracing::debug;


/// Errors raised by context identifier validation.
///
/// Every variant marks a reference to an identifier unknown to this context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The referenced subject is not part of this context.
    #[error("unknown subject: {0}")]
    UnknownSubject(String),

    /// The referenced object is not part of this context.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// The referenced activity is not part of this context.
    #[error("unknown activity: {0}")]
    UnknownActivity(String),
}

/// Result type for context validation.
pub type Result<T> = std::result::Result<T, ContextError>;

/// Callbacks a context invokes when it removes an element.
///
/// All callbacks default to no-ops; listeners override only what they need.
/// Callbacks run synchronously while the context is borrowed, so they must
/// not call back into the context.
pub trait ContextListener {
    /// Called after `subject` has been removed from the context.
    fn subject_removed(&mut self, subject: &str) {
        let _ = subject;
    }

    /// Called after `object` has been removed from the context.
    fn object_removed(&mut self, object: &str) {
        let _ = object;
    }

    /// Called after `activity` has been removed from the context.
    fn activity_removed(&mut self, activity: &str) {
        let _ = activity;
    }
}

/// Named namespaces of valid subjects, objects, and activities.
///
/// The context holds only weak back-references to its listeners, so it never
/// keeps a bound model alive; dead references are pruned during dispatch.
pub struct Context {
    name: String,
    subjects: BTreeSet<String>,
    objects: BTreeSet<String>,
    activities: BTreeSet<String>,
    subject_descriptor: String,
    object_descriptor: String,
    activity_descriptor: String,
    listeners: Vec<Weak<RefCell<dyn ContextListener>>>,
}

impl Context {
    /// Creates an empty context with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subjects: BTreeSet::new(),
            objects: BTreeSet::new(),
            activities: BTreeSet::new(),
            subject_descriptor: EntityKind::Subject.default_descriptor().to_owned(),
            object_descriptor: EntityKind::Object.default_descriptor().to_owned(),
            activity_descriptor: EntityKind::Activity.default_descriptor().to_owned(),
            listeners: Vec::new(),
        }
    }

    /// Returns the context name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ------------------------------------------------------------------
    // Namespace mutation
    // ------------------------------------------------------------------

    /// Adds subjects to the context. Returns whether any were new.
    pub fn add_subjects<I, S>(&mut self, subjects: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = false;
        for subject in subjects {
            added |= self.subjects.insert(subject.into());
        }
        added
    }

    /// Adds objects to the context. Returns whether any were new.
    pub fn add_objects<I, S>(&mut self, objects: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = false;
        for object in objects {
            added |= self.objects.insert(object.into());
        }
        added
    }

    /// Adds activities to the context. Returns whether any were new.
    pub fn add_activities<I, S>(&mut self, activities: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = false;
        for activity in activities {
            added |= self.activities.insert(activity.into());
        }
        added
    }

    /// Removes a subject and notifies listeners. Returns whether it existed.
    pub fn remove_subject(&mut self, subject: &str) -> bool {
        let removed = self.subjects.remove(subject);
        if removed {
            debug!(subject, context = %self.name, "subject removed from context");
            self.notify(|listener| listener.subject_removed(subject));
        }
        removed
    }

    /// Removes an object and notifies listeners. Returns whether it existed.
    pub fn remove_object(&mut self, object: &str) -> bool {
        let removed = self.objects.remove(object);
        if removed {
            debug!(object, context = %self.name, "object removed from context");
            self.notify(|listener| listener.object_removed(object));
        }
        removed
    }

    /// Removes an activity and notifies listeners. Returns whether it existed.
    pub fn remove_activity(&mut self, activity: &str) -> bool {
        let removed = self.activities.remove(activity);
        if removed {
            debug!(activity, context = %self.name, "activity removed from context");
            self.notify(|listener| listener.activity_removed(activity));
        }
        removed
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Validates that `subject` belongs to this context.
    pub fn validate_subject(&self, subject: &str) -> Result<()> {
        if self.subjects.contains(subject) {
            Ok(())
        } else {
            Err(ContextError::UnknownSubject(subject.to_owned()))
        }
    }

    /// Validates that `object` belongs to this context.
    pub fn validate_object(&self, object: &str) -> Result<()> {
        if self.objects.contains(object) {
            Ok(())
        } else {
            Err(ContextError::UnknownObject(object.to_owned()))
        }
    }

    /// Validates that `activity` belongs to this context.
    pub fn validate_activity(&self, activity: &str) -> Result<()> {
        if self.activities.contains(activity) {
            Ok(())
        } else {
            Err(ContextError::UnknownActivity(activity.to_owned()))
        }
    }

    /// Validates that every subject in `subjects` belongs to this context.
    pub fn validate_subjects<'a, I>(&self, subjects: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        subjects
            .into_iter()
            .try_for_each(|subject| self.validate_subject(subject))
    }

    /// Validates that every object in `objects` belongs to this context.
    pub fn validate_objects<'a, I>(&self, objects: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        objects
            .into_iter()
            .try_for_each(|object| self.validate_object(object))
    }

    /// Validates that every activity in `activities` belongs to this context.
    pub fn validate_activities<'a, I>(&self, activities: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        activities
            .into_iter()
            .try_for_each(|activity| self.validate_activity(activity))
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Returns a snapshot of the subject namespace.
    pub fn subjects(&self) -> BTreeSet<String> {
        self.subjects.clone()
    }

    /// Returns a snapshot of the object namespace.
    pub fn objects(&self) -> BTreeSet<String> {
        self.objects.clone()
    }

    /// Returns a snapshot of the activity namespace.
    pub fn activities(&self) -> BTreeSet<String> {
        self.activities.clone()
    }

    /// Returns whether `subject` belongs to this context.
    pub fn contains_subject(&self, subject: &str) -> bool {
        self.subjects.contains(subject)
    }

    /// Returns whether `object` belongs to this context.
    pub fn contains_object(&self, object: &str) -> bool {
        self.objects.contains(object)
    }

    /// Returns whether `activity` belongs to this context.
    pub fn contains_activity(&self, activity: &str) -> bool {
        self.activities.contains(activity)
    }

    /// Returns whether the context has any subjects.
    pub fn contains_subjects(&self) -> bool {
        !self.subjects.is_empty()
    }

    /// Returns whether the context has any objects.
    pub fn contains_objects(&self) -> bool {
        !self.objects.is_empty()
    }

    /// Returns whether the context has any activities.
    pub fn contains_activities(&self) -> bool {
        !self.activities.is_empty()
    }

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    /// Returns the human-readable descriptor label for `kind`.
    pub fn descriptor(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Subject => &self.subject_descriptor,
            EntityKind::Object => &self.object_descriptor,
            EntityKind::Activity => &self.activity_descriptor,
        }
    }

    /// Overrides the descriptor label for `kind`.
    pub fn set_descriptor(&mut self, kind: EntityKind, label: impl Into<String>) {
        let label = label.into();
        match kind {
            EntityKind::Subject => self.subject_descriptor = label,
            EntityKind::Object => self.object_descriptor = label,
            EntityKind::Activity => self.activity_descriptor = label,
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Subscribes a listener to removal notifications.
    ///
    /// Listeners are notified in subscription order. The context keeps only
    /// the weak reference; once the listener is dropped it is pruned on the
    /// next dispatch.
    pub fn add_listener(&mut self, listener: Weak<RefCell<dyn ContextListener>>) {
        self.listeners.push(listener);
    }

    /// Unsubscribes a listener, matching by pointer identity.
    pub fn remove_listener(&mut self, listener: &Weak<RefCell<dyn ContextListener>>) {
        self.listeners.retain(|known| !Weak::ptr_eq(known, listener));
    }

    fn notify(&mut self, callback: impl Fn(&mut dyn ContextListener)) {
        self.listeners.retain(|listener| listener.strong_count() > 0);
        for listener in &self.listeners {
            if let Some(listener) = listener.upgrade() {
                callback(&mut *listener.borrow_mut());
            }
        }
    }
}

impl Default for Context {
    /// The default context supplied to models constructed without one.
    fn default() -> Self {
        Self::new("default-context")
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("subjects", &self.subjects)
            .field("objects", &self.objects)
            .field("activities", &self.activities)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
