use super::*;
use crate::model::entity::Entity;
use crate::model::metadata::GraphMetadata;
use crate::model::types::Direction;
use crate::model::value::Value;

fn existing_node(id: i64) -> EntityRef {
    let node = Entity::new_node(None);
    {
        let mut n = node.borrow_mut();
        n.set_is_new(false);
        n.set_entity_id(id);
        n.set_version(1);
    }
    node
}

#[test]
fn buffers_are_idempotent_by_id() {
    let mut txn = TransactionBuffer::new();
    let node = Entity::new_node(None);
    txn.insert_entity(&node);
    txn.insert_entity(&node);
    assert_eq!(txn.added().len(), 1);
    assert_eq!(txn.state(), TxnState::Pending);
}

#[test]
fn changed_edge_pulls_existing_endpoints_into_changed() {
    let mut txn = TransactionBuffer::new();
    let a = existing_node(700);
    let b = existing_node(701);
    let edge = Entity::new_edge(&a, &b, Direction::Directed, None);
    edge.borrow_mut().set_is_new(false);
    edge.borrow_mut().set_entity_id(600);

    txn.update_entity(&edge);
    txn.cascade_endpoints();

    assert!(txn.changed().contains(700), "endpoint A joins changed");
    assert!(txn.changed().contains(701), "endpoint B joins changed");
}

#[test]
fn new_edge_does_not_cascade_new_endpoints() {
    let mut txn = TransactionBuffer::new();
    let a = Entity::new_node(None);
    let b = existing_node(702);
    let edge = Entity::new_edge(&a, &b, Direction::Directed, None);

    txn.insert_entity(&edge);
    txn.insert_entity(&a);
    txn.cascade_endpoints();

    assert!(!txn.changed().contains(a.borrow().key_id()));
    assert!(txn.changed().contains(702));
}

#[test]
fn removed_edge_cascades_unless_endpoint_is_also_removed() {
    let mut txn = TransactionBuffer::new();
    let a = existing_node(703);
    let b = existing_node(704);
    let edge = Entity::new_edge(&a, &b, Direction::Directed, None);
    edge.borrow_mut().set_is_new(false);
    edge.borrow_mut().set_entity_id(601);

    txn.delete_entity(&edge);
    txn.delete_entity(&b);
    txn.cascade_endpoints();

    assert!(txn.changed().contains(703));
    assert!(
        !txn.changed().contains(704),
        "an endpoint scheduled for removal stays out of changed"
    );
}

#[test]
fn fixups_rewrite_descriptor_and_entity_ids_in_place() {
    let mut md = GraphMetadata::new();
    let mut txn = TransactionBuffer::new();

    let node = Entity::new_node(None);
    node.borrow_mut()
        .set_attribute(&mut md, "name", Some(Value::String("ada".into())))
        .unwrap();
    let temp_virtual = node.borrow().virtual_id();
    txn.insert_entity(&node);

    let descriptors = md.new_descriptors();
    let temp_desc_id = descriptors[0].borrow().id();

    let response = CommitResponse {
        descriptor_fixups: vec![(temp_desc_id, 57)],
        added_fixups: vec![(temp_virtual, 1001, 1)],
        updated_fixups: vec![],
        removed_ids: vec![],
    };
    txn.apply_fixups(&response, &descriptors);

    // The attribute's descriptor handle observes the new id
    let n = node.borrow();
    let attr = n.attribute("name").unwrap();
    assert_eq!(attr.descriptor().borrow().id(), 57);
    assert_eq!(n.entity_id(), 1001);
    assert_eq!(n.version(), 1);
    assert!(!n.is_new());
}

#[test]
fn fixups_reset_dirty_state_and_empty_buffers() {
    let mut md = GraphMetadata::new();
    let mut txn = TransactionBuffer::new();

    let added = Entity::new_node(None);
    added
        .borrow_mut()
        .set_attribute(&mut md, "a", Some(Value::Int(1)))
        .unwrap();
    let changed = existing_node(800);
    changed
        .borrow_mut()
        .set_attribute(&mut md, "b", Some(Value::Int(2)))
        .unwrap();
    let removed = existing_node(801);

    txn.insert_entity(&added);
    txn.update_entity(&changed);
    txn.delete_entity(&removed);

    let response = CommitResponse {
        descriptor_fixups: vec![],
        added_fixups: vec![],
        updated_fixups: vec![(800, 2)],
        removed_ids: vec![801],
    };
    txn.apply_fixups(&response, &[]);

    assert!(added.borrow().modified_attributes().is_empty());
    assert!(changed.borrow().modified_attributes().is_empty());
    assert_eq!(changed.borrow().version(), 2);
    assert!(removed.borrow().is_deleted());
    assert!(txn.added().is_empty());
    assert!(txn.changed().is_empty());
    assert!(txn.removed().is_empty());
    assert_eq!(txn.state(), TxnState::Idle);
}

#[test]
fn abort_commit_preserves_buffers() {
    let mut txn = TransactionBuffer::new();
    let node = Entity::new_node(None);
    txn.insert_entity(&node);
    txn.begin_commit();
    assert_eq!(txn.state(), TxnState::Committing);

    txn.abort_commit();
    assert_eq!(txn.state(), TxnState::Pending);
    assert_eq!(txn.added().len(), 1);
}

#[test]
fn rollback_clears_without_touching_entities() {
    let mut md = GraphMetadata::new();
    let mut txn = TransactionBuffer::new();
    let node = Entity::new_node(None);
    node.borrow_mut()
        .set_attribute(&mut md, "a", Some(Value::Int(1)))
        .unwrap();
    txn.insert_entity(&node);

    txn.rollback();

    assert!(txn.added().is_empty());
    assert_eq!(txn.state(), TxnState::Idle);
    // Rollback does not clear entity dirty flags or ids
    assert!(node.borrow().is_new());
}

#[test]
fn values_iterate_in_insertion_order() {
    let mut map = OrderedIdMap::new();
    let a = existing_node(1);
    let b = existing_node(2);
    let c = existing_node(3);
    map.insert(&b);
    map.insert(&a);
    map.insert(&c);
    map.insert(&b);

    let ids: Vec<i64> = map.values().iter().map(|e| e.borrow().key_id()).collect();
    assert_eq!(ids, vec![2, 1, 3]);
}
