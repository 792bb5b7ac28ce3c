//! Dual-index permission storage.
//!
//! [`AclIndex`] stores activity and object permissions in mirrored forward
//! and reverse indices so that "what may this subject do" and "who may do
//! this" are both answered without scanning. The price is that every
//! mutation touches both directions; all writes go through paired
//! link/unlink helpers to keep the mirrors consistent.
//!
//! Invariants maintained by every operation:
//! - presence in a forward index implies presence in the reverse index and
//!   vice versa;
//! - no index entry ever holds an empty set — an entry emptied by a removal
//!   is deleted from both directions;
//! - no stored object permission references a mode outside the index's
//!   valid-usage-mode set.
//!
//! The index is context-free: identifier membership is the concern of the
//! model layer wrapping it. Mode membership is enforced here because the
//! valid-usage-mode set lives here.

use std::collections::{BTreeMap, BTreeSet};

use gatekit_types::DataUsage;

use crate::error::{PolicyError, Result};
use crate::properties::{ActivityPermissionMap, ObjectPermissionMap};

/// Mirrored forward/reverse permission indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclIndex {
    valid_usage_modes: BTreeSet<DataUsage>,
    /// subject → activities the subject may execute.
    activities_by_subject: ActivityPermissionMap,
    /// activity → subjects authorized to execute it.
    subjects_by_activity: ActivityPermissionMap,
    /// subject → object → granted usage modes.
    modes_by_subject: ObjectPermissionMap,
    /// object → subject → granted usage modes.
    modes_by_object: ObjectPermissionMap,
}

impl AclIndex {
    /// Creates an empty index accepting all usage modes.
    pub fn new() -> Self {
        Self {
            valid_usage_modes: DataUsage::all(),
            activities_by_subject: ActivityPermissionMap::new(),
            subjects_by_activity: ActivityPermissionMap::new(),
            modes_by_subject: ObjectPermissionMap::new(),
            modes_by_object: ObjectPermissionMap::new(),
        }
    }

    /// Builds an index from forward permission maps, deriving the reverse
    /// indices.
    ///
    /// Entries with empty sets are treated as absent. Fails if any granted
    /// mode falls outside `valid_usage_modes`; nothing is partially built.
    pub(crate) fn from_forward_maps(
        valid_usage_modes: BTreeSet<DataUsage>,
        activity_permissions: ActivityPermissionMap,
        object_permissions: ObjectPermissionMap,
    ) -> Result<Self> {
        if valid_usage_modes.is_empty() {
            return Err(PolicyError::Parameter(
                "valid usage mode set must not be empty".to_owned(),
            ));
        }
        for granted in object_permissions.values().flat_map(BTreeMap::values) {
            if let Some(mode) = granted.difference(&valid_usage_modes).next() {
                return Err(PolicyError::InvalidUsageMode { mode: *mode });
            }
        }
        let mut index = Self {
            valid_usage_modes,
            activities_by_subject: ActivityPermissionMap::new(),
            subjects_by_activity: ActivityPermissionMap::new(),
            modes_by_subject: ObjectPermissionMap::new(),
            modes_by_object: ObjectPermissionMap::new(),
        };
        for (subject, activities) in activity_permissions {
            for activity in &activities {
                index
                    .subjects_by_activity
                    .entry(activity.clone())
                    .or_default()
                    .insert(subject.clone());
            }
            if !activities.is_empty() {
                index.activities_by_subject.insert(subject, activities);
            }
        }
        for (subject, mut objects) in object_permissions {
            objects.retain(|_, granted| !granted.is_empty());
            for (object, granted) in &objects {
                index
                    .modes_by_object
                    .entry(object.clone())
                    .or_default()
                    .insert(subject.clone(), granted.clone());
            }
            if !objects.is_empty() {
                index.modes_by_subject.insert(subject, objects);
            }
        }
        Ok(index)
    }

    // ------------------------------------------------------------------
    // Valid usage modes
    // ------------------------------------------------------------------

    /// Returns the valid-usage-mode set.
    pub fn valid_usage_modes(&self) -> &BTreeSet<DataUsage> {
        &self.valid_usage_modes
    }

    /// Replaces the valid-usage-mode set, rejecting orphaning shrinks.
    ///
    /// This is the direct engine path: unlike the model-level,
    /// notification-driven path (which cascade-cleans affected entries),
    /// a shrink that would leave a stored object permission referencing a
    /// now-invalid mode is rejected with a parameter error and nothing
    /// changes.
    pub fn set_valid_usage_modes(&mut self, modes: BTreeSet<DataUsage>) -> Result<()> {
        if modes.is_empty() {
            return Err(PolicyError::Parameter(
                "valid usage mode set must not be empty".to_owned(),
            ));
        }
        for granted in self.modes_by_subject.values().flat_map(BTreeMap::values) {
            if let Some(mode) = granted.difference(&modes).next() {
                return Err(PolicyError::Parameter(format!(
                    "cannot remove usage mode '{mode}' while object permissions still use it"
                )));
            }
        }
        self.valid_usage_modes = modes;
        Ok(())
    }

    /// Replaces the valid-usage-mode set without checking stored entries.
    ///
    /// Used by the model layer after it has cascade-cleaned the index.
    pub(crate) fn replace_valid_usage_modes(&mut self, modes: BTreeSet<DataUsage>) {
        self.valid_usage_modes = modes;
    }

    fn check_modes(&self, modes: &BTreeSet<DataUsage>) -> Result<()> {
        if modes.is_empty() {
            return Err(PolicyError::Parameter(
                "usage mode set must not be empty".to_owned(),
            ));
        }
        if let Some(mode) = modes.difference(&self.valid_usage_modes).next() {
            return Err(PolicyError::InvalidUsageMode { mode: *mode });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Activity permissions
    // ------------------------------------------------------------------

    /// Grants `subject` the right to execute `activity`.
    ///
    /// Returns whether the permission was newly added; re-adding an
    /// existing permission is a no-op returning `false`.
    pub fn add_activity_permission(&mut self, subject: &str, activity: &str) -> bool {
        let added = self
            .activities_by_subject
            .entry(subject.to_owned())
            .or_default()
            .insert(activity.to_owned());
        if added {
            self.subjects_by_activity
                .entry(activity.to_owned())
                .or_default()
                .insert(subject.to_owned());
        }
        added
    }

    /// Revokes one activity permission. Absent permissions are a no-op.
    pub fn remove_activity_permission(&mut self, subject: &str, activity: &str) -> bool {
        let removed = remove_from_set(&mut self.activities_by_subject, subject, activity);
        if removed {
            remove_from_set(&mut self.subjects_by_activity, activity, subject);
        }
        removed
    }

    /// Revokes all activity permissions of `subject`.
    pub fn remove_activity_permissions(&mut self, subject: &str) -> bool {
        let Some(activities) = self.activities_by_subject.remove(subject) else {
            return false;
        };
        for activity in &activities {
            remove_from_set(&mut self.subjects_by_activity, activity, subject);
        }
        true
    }

    /// Replaces the activity permissions of `subject` with `activities`.
    ///
    /// The reverse index is diff-updated: only activities entering or
    /// leaving the subject's set are touched.
    pub fn set_activity_permissions(&mut self, subject: &str, activities: BTreeSet<String>) -> bool {
        let old = self
            .activities_by_subject
            .get(subject)
            .cloned()
            .unwrap_or_default();
        if old == activities {
            return false;
        }
        for activity in old.difference(&activities) {
            remove_from_set(&mut self.subjects_by_activity, activity, subject);
        }
        for activity in activities.difference(&old) {
            self.subjects_by_activity
                .entry(activity.clone())
                .or_default()
                .insert(subject.to_owned());
        }
        if activities.is_empty() {
            self.activities_by_subject.remove(subject);
        } else {
            self.activities_by_subject
                .insert(subject.to_owned(), activities);
        }
        true
    }

    // ------------------------------------------------------------------
    // Object permissions
    // ------------------------------------------------------------------

    /// Grants `subject` the given usage modes on `object` (union semantics).
    ///
    /// Returns whether any mode was newly granted. Every mode must be in
    /// the valid-usage-mode set.
    pub fn add_object_permission(
        &mut self,
        subject: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        self.check_modes(modes)?;
        let granted = self
            .modes_by_subject
            .entry(subject.to_owned())
            .or_default()
            .entry(object.to_owned())
            .or_default();
        let before = granted.len();
        granted.extend(modes.iter().copied());
        let added = granted.len() > before;
        if added {
            self.modes_by_object
                .entry(object.to_owned())
                .or_default()
                .entry(subject.to_owned())
                .or_default()
                .extend(modes.iter().copied());
        }
        Ok(added)
    }

    /// Replaces the usage modes `subject` holds on `object`.
    ///
    /// An empty mode set removes the entry from both directions.
    pub fn set_object_permission(
        &mut self,
        subject: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        if modes.is_empty() {
            return Ok(self.remove_object_permission(subject, object));
        }
        self.check_modes(modes)?;
        let current = self
            .modes_by_subject
            .get(subject)
            .and_then(|objects| objects.get(object));
        if current == Some(modes) {
            return Ok(false);
        }
        self.modes_by_subject
            .entry(subject.to_owned())
            .or_default()
            .insert(object.to_owned(), modes.clone());
        self.modes_by_object
            .entry(object.to_owned())
            .or_default()
            .insert(subject.to_owned(), modes.clone());
        Ok(true)
    }

    /// Replaces the full object permission map of `subject`.
    ///
    /// The reverse index is diff-updated rather than rebuilt: objects
    /// leaving the subject's map lose their reverse entry, objects entering
    /// or changing get theirs upserted, and entries of other subjects are
    /// never touched.
    pub fn set_object_permissions(
        &mut self,
        subject: &str,
        permissions: BTreeMap<String, BTreeSet<DataUsage>>,
    ) -> Result<bool> {
        for modes in permissions.values() {
            self.check_modes(modes)?;
        }
        let old = self
            .modes_by_subject
            .get(subject)
            .cloned()
            .unwrap_or_default();
        if old == permissions {
            return Ok(false);
        }
        for object in old.keys() {
            if !permissions.contains_key(object) {
                remove_from_map(&mut self.modes_by_object, object, subject);
            }
        }
        for (object, modes) in &permissions {
            if old.get(object) != Some(modes) {
                self.modes_by_object
                    .entry(object.clone())
                    .or_default()
                    .insert(subject.to_owned(), modes.clone());
            }
        }
        if permissions.is_empty() {
            self.modes_by_subject.remove(subject);
        } else {
            self.modes_by_subject
                .insert(subject.to_owned(), permissions);
        }
        Ok(true)
    }

    /// Revokes all object permissions of `subject`.
    pub fn remove_object_permissions(&mut self, subject: &str) -> bool {
        let Some(objects) = self.modes_by_subject.remove(subject) else {
            return false;
        };
        for object in objects.keys() {
            remove_from_map(&mut self.modes_by_object, object, subject);
        }
        true
    }

    /// Revokes every mode `subject` holds on `object`.
    pub fn remove_object_permission(&mut self, subject: &str, object: &str) -> bool {
        let removed = remove_from_map(&mut self.modes_by_subject, subject, object);
        if removed {
            remove_from_map(&mut self.modes_by_object, object, subject);
        }
        removed
    }

    /// Revokes specific modes `subject` holds on `object`.
    ///
    /// An entry left empty is deleted from both directions. Every mode must
    /// be in the valid-usage-mode set; revoking a mode that was never
    /// granted is a no-op.
    pub fn remove_object_permission_modes(
        &mut self,
        subject: &str,
        object: &str,
        modes: &BTreeSet<DataUsage>,
    ) -> Result<bool> {
        self.check_modes(modes)?;
        let Some(objects) = self.modes_by_subject.get_mut(subject) else {
            return Ok(false);
        };
        let Some(granted) = objects.get_mut(object) else {
            return Ok(false);
        };
        let before = granted.len();
        granted.retain(|mode| !modes.contains(mode));
        let removed = granted.len() < before;
        let emptied = granted.is_empty();
        if emptied {
            objects.remove(object);
            if objects.is_empty() {
                self.modes_by_subject.remove(subject);
            }
        }
        if removed {
            if emptied {
                remove_from_map(&mut self.modes_by_object, object, subject);
            } else if let Some(reverse) = self
                .modes_by_object
                .get_mut(object)
                .and_then(|subjects| subjects.get_mut(subject))
            {
                reverse.retain(|mode| !modes.contains(mode));
            }
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Cascade primitives
    // ------------------------------------------------------------------

    /// Drops every permission referencing `subject`, in both directions.
    pub fn remove_subject(&mut self, subject: &str) -> bool {
        let activities = self.remove_activity_permissions(subject);
        let objects = self.remove_object_permissions(subject);
        activities || objects
    }

    /// Drops every permission referencing `object`, in both directions.
    pub fn remove_object(&mut self, object: &str) -> bool {
        let Some(subjects) = self.modes_by_object.remove(object) else {
            return false;
        };
        for subject in subjects.keys() {
            remove_from_map(&mut self.modes_by_subject, subject, object);
        }
        true
    }

    /// Drops every permission referencing `activity`, in both directions.
    pub fn remove_activity(&mut self, activity: &str) -> bool {
        let Some(subjects) = self.subjects_by_activity.remove(activity) else {
            return false;
        };
        for subject in &subjects {
            remove_from_set(&mut self.activities_by_subject, subject, activity);
        }
        true
    }

    /// Intersects every stored object permission with `valid`.
    ///
    /// Entries left empty are deleted from both directions. Returns the
    /// number of (subject, object) entries that were trimmed or dropped.
    pub fn retain_modes(&mut self, valid: &BTreeSet<DataUsage>) -> usize {
        let mut touched = 0;
        let mut emptied: Vec<(String, String)> = Vec::new();
        for (subject, objects) in &mut self.modes_by_subject {
            for (object, granted) in &mut *objects {
                let before = granted.len();
                granted.retain(|mode| valid.contains(mode));
                if granted.len() < before {
                    touched += 1;
                    if granted.is_empty() {
                        emptied.push((subject.clone(), object.clone()));
                    }
                }
            }
            objects.retain(|_, granted| !granted.is_empty());
        }
        self.modes_by_subject.retain(|_, objects| !objects.is_empty());
        for (subject, object) in emptied {
            remove_from_map(&mut self.modes_by_object, &object, &subject);
        }
        for subjects in self.modes_by_object.values_mut() {
            for granted in subjects.values_mut() {
                granted.retain(|mode| valid.contains(mode));
            }
            subjects.retain(|_, granted| !granted.is_empty());
        }
        self.modes_by_object.retain(|_, subjects| !subjects.is_empty());
        touched
    }

    /// Drops all permissions. The valid-usage-mode set is kept.
    pub fn clear(&mut self) {
        self.activities_by_subject.clear();
        self.subjects_by_activity.clear();
        self.modes_by_subject.clear();
        self.modes_by_object.clear();
    }

    // ------------------------------------------------------------------
    // Queries (all return detached copies, never live index references)
    // ------------------------------------------------------------------

    /// Returns whether `subject` may execute `activity`.
    pub fn is_authorized_for_activity(&self, subject: &str, activity: &str) -> bool {
        self.activities_by_subject
            .get(subject)
            .is_some_and(|activities| activities.contains(activity))
    }

    /// Returns whether `subject` holds any mode on `object`.
    pub fn is_authorized_for_object(&self, subject: &str, object: &str) -> bool {
        self.modes_by_subject
            .get(subject)
            .is_some_and(|objects| objects.contains_key(object))
    }

    /// Returns whether `subject` holds `mode` on `object`.
    pub fn is_authorized_for_object_mode(
        &self,
        subject: &str,
        object: &str,
        mode: DataUsage,
    ) -> bool {
        self.modes_by_subject
            .get(subject)
            .and_then(|objects| objects.get(object))
            .is_some_and(|granted| granted.contains(&mode))
    }

    /// Returns whether any subject may execute `activity`.
    ///
    /// Constant-time: the no-empty-entries invariant makes reverse-index
    /// presence equivalent to a non-empty authorized set.
    pub fn has_authorized_subjects_for_activity(&self, activity: &str) -> bool {
        self.subjects_by_activity.contains_key(activity)
    }

    /// Returns the subjects authorized to execute `activity`.
    pub fn authorized_subjects_for_activity(&self, activity: &str) -> BTreeSet<String> {
        self.subjects_by_activity
            .get(activity)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the subjects holding any mode on `object`.
    pub fn authorized_subjects_for_object(&self, object: &str) -> BTreeSet<String> {
        self.modes_by_object
            .get(object)
            .map(|subjects| subjects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the subjects holding modes on `object`, with their modes.
    pub fn subjects_and_permissions_for_object(
        &self,
        object: &str,
    ) -> BTreeMap<String, BTreeSet<DataUsage>> {
        self.modes_by_object.get(object).cloned().unwrap_or_default()
    }

    /// Returns the activities `subject` may execute.
    pub fn authorized_activities_for_subject(&self, subject: &str) -> BTreeSet<String> {
        self.activities_by_subject
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the objects `subject` holds any mode on.
    pub fn authorized_objects_for_subject(&self, subject: &str) -> BTreeSet<String> {
        self.modes_by_subject
            .get(subject)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the per-object modes `subject` holds.
    pub fn object_permissions_for_subject(
        &self,
        subject: &str,
    ) -> BTreeMap<String, BTreeSet<DataUsage>> {
        self.modes_by_subject.get(subject).cloned().unwrap_or_default()
    }

    /// Returns whether `subject` holds any activity permission.
    pub fn has_activity_permissions(&self, subject: &str) -> bool {
        self.activities_by_subject.contains_key(subject)
    }

    /// Returns whether `subject` holds any object permission.
    pub fn has_object_permissions(&self, subject: &str) -> bool {
        self.modes_by_subject.contains_key(subject)
    }

    /// Returns the number of (subject, activity) permission pairs.
    pub fn activity_permission_count(&self) -> usize {
        self.activities_by_subject.values().map(BTreeSet::len).sum()
    }

    /// Returns the number of (subject, object) permission entries.
    pub fn object_permission_count(&self) -> usize {
        self.modes_by_subject.values().map(BTreeMap::len).sum()
    }

    /// Returns whether the index holds no permissions at all.
    pub fn is_empty(&self) -> bool {
        self.activities_by_subject.is_empty() && self.modes_by_subject.is_empty()
    }

    /// Exports the forward activity permission map.
    pub fn activity_permissions(&self) -> ActivityPermissionMap {
        self.activities_by_subject.clone()
    }

    /// Exports the forward object permission map.
    pub fn object_permissions(&self) -> ObjectPermissionMap {
        self.modes_by_subject.clone()
    }

    /// Checks the mirror-consistency invariant, for tests and debugging.
    #[doc(hidden)]
    pub fn mirrors_consistent(&self) -> bool {
        let forward_activity = self.activities_by_subject.iter().all(|(subject, activities)| {
            !activities.is_empty()
                && activities.iter().all(|activity| {
                    self.subjects_by_activity
                        .get(activity)
                        .is_some_and(|subjects| subjects.contains(subject))
                })
        });
        let reverse_activity = self.subjects_by_activity.iter().all(|(activity, subjects)| {
            !subjects.is_empty()
                && subjects.iter().all(|subject| {
                    self.activities_by_subject
                        .get(subject)
                        .is_some_and(|activities| activities.contains(activity))
                })
        });
        let forward_object = self.modes_by_subject.iter().all(|(subject, objects)| {
            !objects.is_empty()
                && objects.iter().all(|(object, granted)| {
                    !granted.is_empty()
                        && self
                            .modes_by_object
                            .get(object)
                            .and_then(|subjects| subjects.get(subject))
                            == Some(granted)
                })
        });
        let reverse_object = self.modes_by_object.iter().all(|(object, subjects)| {
            !subjects.is_empty()
                && subjects.iter().all(|(subject, granted)| {
                    !granted.is_empty()
                        && self
                            .modes_by_subject
                            .get(subject)
                            .and_then(|objects| objects.get(object))
                            == Some(granted)
                })
        });
        forward_activity && reverse_activity && forward_object && reverse_object
    }
}

impl Default for AclIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes `value` from the set at `key`, deleting the entry if emptied.
fn remove_from_set(map: &mut ActivityPermissionMap, key: &str, value: &str) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}

/// Removes the inner entry at `map[key][inner]`, deleting `key` if emptied.
fn remove_from_map(map: &mut ObjectPermissionMap, key: &str, inner: &str) -> bool {
    let Some(entries) = map.get_mut(key) else {
        return false;
    };
    let removed = entries.remove(inner).is_some();
    if entries.is_empty() {
        map.remove(key);
    }
    removed
}
