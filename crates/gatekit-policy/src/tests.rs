//! Scenario tests exercising both representations through the shared
//! contract.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use gatekit_context::Context;
use gatekit_types::{DataUsage, PolicyModelKind};

use crate::{AclModel, PolicyModel, RbacModel};


fn modes(list: &[DataUsage]) -> BTreeSet<DataUsage> {
    list.iter().copied().collect()
}

fn order_context() -> Rc<RefCell<Context>> {
    let mut context = Context::new("order-processing");
    context.add_subjects(["alice", "bob", "carol"]);
    context.add_objects(["invoice", "ledger"]);
    context.add_activities(["approve", "ship"]);
    Rc::new(RefCell::new(context))
}

/// Builds an ACL model and a role-based model granting the same effective
/// permissions: alice approves and reads invoices, bob ships.
fn equivalent_pair(
    context: &Rc<RefCell<Context>>,
) -> (Rc<RefCell<AclModel>>, Rc<RefCell<RbacModel>>) {
    let acl = AclModel::new("direct", Rc::clone(context)).unwrap();
    {
        let mut acl = acl.borrow_mut();
        acl.add_activity_permission("alice", "approve").unwrap();
        acl.add_object_permission("alice", "invoice", &modes(&[DataUsage::Read]))
            .unwrap();
        acl.add_activity_permission("bob", "ship").unwrap();
    }

    let rbac = RbacModel::new("role-mediated", Rc::clone(context)).unwrap();
    {
        let mut rbac = rbac.borrow_mut();
        rbac.add_roles(["approver", "shipper"]).unwrap();
        rbac.assign_role("alice", "approver").unwrap();
        rbac.assign_role("bob", "shipper").unwrap();
        rbac.add_activity_permission("approver", "approve").unwrap();
        rbac.add_object_permission("approver", "invoice", &modes(&[DataUsage::Read]))
            .unwrap();
        rbac.add_activity_permission("shipper", "ship").unwrap();
    }

    (acl, rbac)
}

#[test]
fn both_representations_answer_queries_identically() {
    let context = order_context();
    let (acl, rbac) = equivalent_pair(&context);
    let models: Vec<Rc<RefCell<dyn PolicyModel>>> = vec![acl, rbac];

    for model in &models {
        let model = model.borrow();
        assert!(model.is_authorized_for_activity("alice", "approve").unwrap());
        assert!(!model.is_authorized_for_activity("carol", "approve").unwrap());
        assert!(model
            .is_authorized_for_object_mode("alice", "invoice", DataUsage::Read)
            .unwrap());
        assert_eq!(
            model.authorized_subjects_for_activity("ship").unwrap(),
            ["bob".to_owned()].into_iter().collect()
        );
        assert_eq!(
            model.object_permissions_for_subject("alice").unwrap(),
            [("invoice".to_owned(), modes(&[DataUsage::Read]))]
                .into_iter()
                .collect()
        );
        assert!(model.is_valid());
    }
}

#[test]
fn context_removal_cascades_into_every_subscribed_model() {
    let context = order_context();
    let (acl, rbac) = equivalent_pair(&context);

    context.borrow_mut().remove_subject("alice");

    for subjects in [
        acl.borrow().authorized_subjects_for_activity("approve").unwrap(),
        rbac.borrow().authorized_subjects_for_activity("approve").unwrap(),
    ] {
        assert!(subjects.is_empty());
    }
    assert!(!acl.borrow().is_valid());
    assert!(!rbac.borrow().is_valid());
}

#[test]
fn kind_tags_identify_the_representation() {
    let context = order_context();
    let (acl, rbac) = equivalent_pair(&context);
    let models: Vec<Rc<RefCell<dyn PolicyModel>>> = vec![acl, rbac];

    let kinds: Vec<PolicyModelKind> = models.iter().map(|m| m.borrow().kind()).collect();
    assert_eq!(kinds, vec![PolicyModelKind::Acl, PolicyModelKind::RoleBased]);
    assert!(!PolicyModelKind::Acl.has_role_hierarchy());
    assert!(PolicyModelKind::RoleBased.has_role_hierarchy());
}

#[test]
fn properties_identify_their_representation_in_json() {
    let context = order_context();
    let (acl, rbac) = equivalent_pair(&context);

    let acl_json = acl.borrow().properties().to_json().unwrap();
    let rbac_json = rbac.borrow().properties().to_json().unwrap();
    assert!(acl_json.contains("\"representation\": \"acl\""));
    assert!(rbac_json.contains("\"representation\": \"role_based\""));
}

#[test]
fn payloads_do_not_cross_representations() {
    let context = order_context();
    let (acl, rbac) = equivalent_pair(&context);

    let acl_properties = acl.borrow().properties();
    let rbac_properties = rbac.borrow().properties();

    assert!(rbac.borrow_mut().initialize(&acl_properties).is_err());
    assert!(acl.borrow_mut().initialize(&rbac_properties).is_err());

    // The rejected loads changed nothing.
    assert_eq!(acl.borrow().properties(), acl_properties);
    assert_eq!(rbac.borrow().properties(), rbac_properties);
}

#[test]
fn usage_mode_shrink_behaves_identically_across_representations() {
    let context = order_context();
    let (acl, rbac) = equivalent_pair(&context);
    let models: Vec<Rc<RefCell<dyn PolicyModel>>> = vec![acl, rbac];

    for model in &models {
        let mut model = model.borrow_mut();
        model
            .set_valid_usage_modes(modes(&[DataUsage::Write]))
            .unwrap();
        // The read grant on the invoice referenced no surviving mode.
        assert!(!model.is_authorized_for_object("alice", "invoice").unwrap());
        // Activity permissions are unaffected by mode changes.
        assert!(model.is_authorized_for_activity("alice", "approve").unwrap());
    }
}

#[test]
fn reset_permissions_revokes_all_subject_authorizations() {
    let context = order_context();
    let (acl, rbac) = equivalent_pair(&context);
    let models: Vec<Rc<RefCell<dyn PolicyModel>>> = vec![acl, rbac];

    for model in &models {
        model.borrow_mut().reset_permissions();
        let model = model.borrow();
        assert!(!model.is_authorized_for_activity("alice", "approve").unwrap());
        assert!(!model.has_object_permissions("alice").unwrap());
    }
}
