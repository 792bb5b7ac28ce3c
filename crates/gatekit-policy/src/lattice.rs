//! The role dominance graph.
//!
//! A [`RoleLattice`] is a set of unique role names plus a directed
//! "dominates" relation stored as mirrored adjacency maps (direct
//! dominators and direct subordinates per role). The dominating role
//! subsumes the permissions of the roles it dominates; the role-based
//! model resolves a subject's effective permissions through the transitive
//! closure computed here.
//!
//! The structure does not forbid cycles, so every transitive query runs a
//! visited-set-guarded traversal and terminates regardless of shape.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::rc::Weak;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, Result};

/// Observer of role set changes.
///
/// Notifications are synchronous and ordered; a listener must not mutate
/// the lattice it observes from within the callback.
pub trait RoleLatticeListener {
    /// Called after `role` was added to the role set.
    fn role_added(&mut self, role: &str) {
        let _ = role;
    }

    /// Called after `role` was removed, along with its incident edges.
    fn role_removed(&mut self, role: &str) {
        let _ = role;
    }
}

/// One directed dominance edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleRelation {
    /// The senior role.
    pub dominating: String,
    /// The junior role whose permissions the senior subsumes.
    pub dominated: String,
}

impl RoleRelation {
    /// Creates a dominance edge.
    pub fn new(dominating: impl Into<String>, dominated: impl Into<String>) -> Self {
        Self {
            dominating: dominating.into(),
            dominated: dominated.into(),
        }
    }
}

/// Role hierarchy with transitive dominance queries.
pub struct RoleLattice {
    roles: BTreeSet<String>,
    /// role → roles directly dominating it.
    dominators: BTreeMap<String, BTreeSet<String>>,
    /// role → roles it directly dominates.
    subordinates: BTreeMap<String, BTreeSet<String>>,
    listeners: Vec<Weak<RefCell<dyn RoleLatticeListener>>>,
}

impl RoleLattice {
    /// Creates an empty lattice.
    pub fn new() -> Self {
        Self {
            roles: BTreeSet::new(),
            dominators: BTreeMap::new(),
            subordinates: BTreeMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Creates a lattice with the given roles and no relations.
    pub fn with_roles<I, S>(roles: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lattice = Self::new();
        lattice.add_roles(roles)?;
        Ok(lattice)
    }

    // ------------------------------------------------------------------
    // Role set
    // ------------------------------------------------------------------

    /// Returns a snapshot of the role set.
    pub fn roles(&self) -> BTreeSet<String> {
        self.roles.clone()
    }

    /// Returns whether `role` is part of the role set.
    pub fn contains_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Adds a role. Returns whether it was new.
    pub fn add_role(&mut self, role: impl Into<String>) -> Result<bool> {
        let role = role.into();
        if role.trim().is_empty() {
            return Err(PolicyError::Parameter(
                "role name must not be empty".to_owned(),
            ));
        }
        let added = self.roles.insert(role.clone());
        if added {
            self.notify(|listener| listener.role_added(&role));
        }
        Ok(added)
    }

    /// Adds several roles. Returns whether any was new.
    pub fn add_roles<I, S>(&mut self, roles: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = false;
        for role in roles {
            added |= self.add_role(role)?;
        }
        Ok(added)
    }

    /// Removes a role, stripping its incident edges.
    ///
    /// Removing an unknown role is an error, not a no-op.
    pub fn remove_role(&mut self, role: &str) -> Result<()> {
        if !self.roles.remove(role) {
            return Err(PolicyError::UnknownRole(role.to_owned()));
        }
        if let Some(juniors) = self.subordinates.remove(role) {
            for junior in &juniors {
                remove_edge_end(&mut self.dominators, junior, role);
            }
        }
        if let Some(seniors) = self.dominators.remove(role) {
            for senior in &seniors {
                remove_edge_end(&mut self.subordinates, senior, role);
            }
        }
        debug!(role, "role removed from lattice");
        self.notify(|listener| listener.role_removed(role));
        Ok(())
    }

    /// Removes several roles.
    pub fn remove_roles<'a, I>(&mut self, roles: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for role in roles {
            self.remove_role(role)?;
        }
        Ok(())
    }

    /// Replaces the role set with `roles`.
    ///
    /// Obsolete roles are cascade-removed via [`remove_role`](Self::remove_role)
    /// (listeners see each removal), new roles are added, and the relation
    /// is then rebuilt with exactly the new vertex set: **edges are not
    /// carried over**, even between surviving roles. Callers must re-add
    /// relations explicitly after a bulk role replace.
    pub fn set_roles(&mut self, roles: BTreeSet<String>) -> Result<()> {
        if roles.iter().any(|role| role.trim().is_empty()) {
            return Err(PolicyError::Parameter(
                "role name must not be empty".to_owned(),
            ));
        }
        let obsolete: Vec<String> = self.roles.difference(&roles).cloned().collect();
        for role in &obsolete {
            self.remove_role(role)?;
        }
        let new: Vec<String> = roles.difference(&self.roles).cloned().collect();
        for role in new {
            self.add_role(role)?;
        }
        self.dominators.clear();
        self.subordinates.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    /// Adds the edge "`dominating` dominates `dominated`".
    ///
    /// Both endpoints must already be roles. Re-adding an existing edge is
    /// a no-op returning `false`.
    pub fn add_relation(&mut self, dominating: &str, dominated: &str) -> Result<bool> {
        self.check_role(dominating)?;
        self.check_role(dominated)?;
        let added = self
            .subordinates
            .entry(dominating.to_owned())
            .or_default()
            .insert(dominated.to_owned());
        if added {
            self.dominators
                .entry(dominated.to_owned())
                .or_default()
                .insert(dominating.to_owned());
        }
        Ok(added)
    }

    /// Removes a dominance edge.
    ///
    /// Both endpoints must be roles; removing an absent edge is a no-op
    /// returning `false`.
    pub fn remove_relation(&mut self, dominating: &str, dominated: &str) -> Result<bool> {
        self.check_role(dominating)?;
        self.check_role(dominated)?;
        let removed = remove_edge_end(&mut self.subordinates, dominating, dominated);
        if removed {
            remove_edge_end(&mut self.dominators, dominated, dominating);
        }
        Ok(removed)
    }

    /// Returns a snapshot of all dominance edges.
    pub fn role_relations(&self) -> Vec<RoleRelation> {
        self.subordinates
            .iter()
            .flat_map(|(dominating, dominated)| {
                dominated
                    .iter()
                    .map(|junior| RoleRelation::new(dominating.clone(), junior.clone()))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Dominance queries
    // ------------------------------------------------------------------

    /// Returns the roles dominating `role`.
    ///
    /// With `transitive` set, the full ancestor set is computed via a
    /// cycle-safe reachability traversal; otherwise only direct dominators
    /// are returned.
    pub fn dominating_roles_for(&self, role: &str, transitive: bool) -> Result<BTreeSet<String>> {
        self.check_role(role)?;
        if transitive {
            Ok(closure(role, &self.dominators))
        } else {
            Ok(self.dominators.get(role).cloned().unwrap_or_default())
        }
    }

    /// Returns the roles dominated by `role`; descendant symmetric of
    /// [`dominating_roles_for`](Self::dominating_roles_for).
    pub fn dominated_roles_for(&self, role: &str, transitive: bool) -> Result<BTreeSet<String>> {
        self.check_role(role)?;
        if transitive {
            Ok(closure(role, &self.subordinates))
        } else {
            Ok(self.subordinates.get(role).cloned().unwrap_or_default())
        }
    }

    // ------------------------------------------------------------------
    // Copying
    // ------------------------------------------------------------------

    /// Takes over another lattice's roles and relations.
    ///
    /// Replays `set_roles` and then re-adds every edge — the explicit
    /// re-add is required because `set_roles` drops edges.
    pub fn takeover_values(&mut self, other: &RoleLattice) -> Result<()> {
        self.set_roles(other.roles())?;
        for relation in other.role_relations() {
            self.add_relation(&relation.dominating, &relation.dominated)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Subscribes an observer to role set changes.
    pub fn add_lattice_listener(&mut self, listener: Weak<RefCell<dyn RoleLatticeListener>>) {
        self.listeners.push(listener);
    }

    /// Unsubscribes an observer, matching by pointer identity.
    pub fn remove_lattice_listener(&mut self, listener: &Weak<RefCell<dyn RoleLatticeListener>>) {
        self.listeners.retain(|known| !Weak::ptr_eq(known, listener));
    }

    fn notify(&mut self, callback: impl Fn(&mut dyn RoleLatticeListener)) {
        self.listeners.retain(|listener| listener.strong_count() > 0);
        for listener in &self.listeners {
            if let Some(listener) = listener.upgrade() {
                callback(&mut *listener.borrow_mut());
            }
        }
    }

    fn check_role(&self, role: &str) -> Result<()> {
        if self.roles.contains(role) {
            Ok(())
        } else {
            Err(PolicyError::UnknownRole(role.to_owned()))
        }
    }
}

impl Default for RoleLattice {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RoleLattice {
    /// Deep copy of roles and relations. Listeners are not carried over.
    fn clone(&self) -> Self {
        Self {
            roles: self.roles.clone(),
            dominators: self.dominators.clone(),
            subordinates: self.subordinates.clone(),
            listeners: Vec::new(),
        }
    }
}

impl PartialEq for RoleLattice {
    fn eq(&self, other: &Self) -> bool {
        self.roles == other.roles && self.subordinates == other.subordinates
    }
}

impl Eq for RoleLattice {}

impl fmt::Debug for RoleLattice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleLattice")
            .field("roles", &self.roles)
            .field("relations", &self.role_relations())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Visited-set-guarded reachability closure from `start` over `edges`.
fn closure(start: &str, edges: &BTreeMap<String, BTreeSet<String>>) -> BTreeSet<String> {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut queue: VecDeque<&str> = edges
        .get(start)
        .map(|direct| direct.iter().map(String::as_str).collect())
        .unwrap_or_default();
    while let Some(role) = queue.pop_front() {
        if visited.insert(role.to_owned()) {
            if let Some(next) = edges.get(role) {
                queue.extend(next.iter().map(String::as_str));
            }
        }
    }
    visited
}

/// Removes `value` from the edge set at `key`, deleting empty sets.
fn remove_edge_end(
    edges: &mut BTreeMap<String, BTreeSet<String>>,
    key: &str,
    value: &str,
) -> bool {
    let Some(set) = edges.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        edges.remove(key);
    }
    removed
}
