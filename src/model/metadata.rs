//! Connection-scoped cache of attribute descriptors and entity types

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::model::descriptor::AttributeDescriptor;
use crate::model::types::{EdgeType, NodeType};
use crate::model::value::Value;
use crate::model::{DescriptorRef, EdgeTypeRef, NodeTypeRef};

/// Cache of graph metadata keyed by name and by numeric id. Server pushes
/// merge additively and update cached entries in place, so references held
/// by live attributes and entities stay valid across a refresh.
#[derive(Default)]
pub struct GraphMetadata {
    initialized: bool,
    descriptors: HashMap<String, DescriptorRef>,
    descriptors_by_id: HashMap<i64, DescriptorRef>,
    node_types: HashMap<String, NodeTypeRef>,
    node_types_by_id: HashMap<i32, NodeTypeRef>,
    edge_types: HashMap<String, EdgeTypeRef>,
    edge_types_by_id: HashMap<i32, EdgeTypeRef>,
}

impl GraphMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a server metadata batch has been merged.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // === Lookups (a miss is "not found", never an error) ===

    pub fn descriptor(&self, name: &str) -> Option<DescriptorRef> {
        self.descriptors.get(name).cloned()
    }

    pub fn descriptor_by_id(&self, id: i64) -> Option<DescriptorRef> {
        self.descriptors_by_id.get(&id).cloned()
    }

    pub fn node_type(&self, name: &str) -> Option<NodeTypeRef> {
        self.node_types.get(name).cloned()
    }

    pub fn node_type_by_id(&self, id: i32) -> Option<NodeTypeRef> {
        self.node_types_by_id.get(&id).cloned()
    }

    pub fn edge_type(&self, name: &str) -> Option<EdgeTypeRef> {
        self.edge_types.get(name).cloned()
    }

    pub fn edge_type_by_id(&self, id: i32) -> Option<EdgeTypeRef> {
        self.edge_types_by_id.get(&id).cloned()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &DescriptorRef> {
        self.descriptors.values()
    }

    /// Descriptors still carrying a temporary id, to be declared in the
    /// next commit request.
    pub fn new_descriptors(&self) -> Vec<DescriptorRef> {
        let mut pending: Vec<DescriptorRef> = self
            .descriptors
            .values()
            .filter(|d| d.borrow().is_temporary())
            .cloned()
            .collect();
        // Deterministic order: most recently allocated last
        pending.sort_by_key(|d| std::cmp::Reverse(d.borrow().id()));
        pending
    }

    // === Local creation ===

    /// Register a locally defined descriptor with a temporary id.
    pub fn create_descriptor(
        &mut self,
        name: &str,
        attr_type: crate::model::descriptor::AttributeType,
        is_array: bool,
    ) -> DescriptorRef {
        let mut desc = AttributeDescriptor::new(name, attr_type);
        desc.set_array(is_array);
        let handle = Rc::new(RefCell::new(desc));
        self.descriptors.insert(name.to_string(), handle.clone());
        handle
    }

    /// Infer a descriptor from a value's runtime type. Used when a caller
    /// writes an attribute the server has no definition for yet.
    pub fn create_descriptor_for_value(&mut self, name: &str, value: &Value) -> DescriptorRef {
        debug!(attribute = name, "creating descriptor for new attribute");
        self.create_descriptor(name, value.attr_type(), false)
    }

    /// Derive a local node type from an optional parent. Local types are
    /// conveniences for building entities; the server remains the source of
    /// truth for type ids, so they are not cached.
    pub fn create_node_type(&self, name: &str, parent: Option<NodeTypeRef>) -> NodeTypeRef {
        let mut node_type = NodeType::new(0, name);
        if let Some(p) = &parent {
            for (attr_name, desc) in &p.borrow().core.attributes {
                node_type
                    .core
                    .attributes
                    .insert(attr_name.clone(), desc.clone());
            }
        }
        node_type.parent = parent;
        Rc::new(RefCell::new(node_type))
    }

    /// Derive a local edge type; the direction comes from the parent.
    pub fn create_edge_type(&self, name: &str, parent: &EdgeTypeRef) -> EdgeTypeRef {
        let direction = parent.borrow().direction;
        let mut edge_type = EdgeType::new(0, name, direction);
        edge_type.parent = Some(parent.clone());
        Rc::new(RefCell::new(edge_type))
    }

    // === Server merge ===

    /// Additive merge of a server metadata batch. Existing entries are
    /// updated in place; nothing is removed. Edge-type endpoint node types
    /// are bound in a second pass since node and edge types may arrive in
    /// either order within one batch.
    pub fn merge_from_server(
        &mut self,
        descriptors: Vec<AttributeDescriptor>,
        node_types: Vec<NodeType>,
        edge_types: Vec<EdgeType>,
    ) {
        for desc in descriptors {
            let name = desc.name().to_string();
            let handle = match self.descriptors.get(&name) {
                Some(existing) => {
                    existing.borrow_mut().update_from(&desc);
                    existing.clone()
                }
                None => {
                    let handle = Rc::new(RefCell::new(desc));
                    self.descriptors.insert(name, handle.clone());
                    handle
                }
            };
            self.descriptors_by_id.insert(handle.borrow().id(), handle.clone());
        }

        for mut node_type in node_types {
            self.reconcile_attributes(&mut node_type.core);
            let name = node_type.core.name.clone();
            let id = node_type.core.id;
            let handle = match self.node_types.get(&name) {
                Some(existing) => {
                    *existing.borrow_mut() = node_type;
                    existing.clone()
                }
                None => {
                    let handle = Rc::new(RefCell::new(node_type));
                    self.node_types.insert(name, handle.clone());
                    handle
                }
            };
            self.node_types_by_id.insert(id, handle);
        }

        for mut edge_type in edge_types {
            self.reconcile_attributes(&mut edge_type.core);
            let name = edge_type.core.name.clone();
            let id = edge_type.core.id;
            let handle = match self.edge_types.get(&name) {
                Some(existing) => {
                    *existing.borrow_mut() = edge_type;
                    existing.clone()
                }
                None => {
                    let handle = Rc::new(RefCell::new(edge_type));
                    self.edge_types.insert(name, handle.clone());
                    handle
                }
            };
            self.edge_types_by_id.insert(id, handle);
        }

        // Second pass: bind edge endpoints now that all node types of this
        // batch are present.
        for edge_type in self.edge_types.values() {
            let (from_id, to_id) = {
                let et = edge_type.borrow();
                (et.from_type_id, et.to_type_id)
            };
            let from = self.node_types_by_id.get(&from_id).cloned();
            let to = self.node_types_by_id.get(&to_id).cloned();
            let mut et = edge_type.borrow_mut();
            if et.from_node_type.is_none() {
                et.from_node_type = from;
            }
            if et.to_node_type.is_none() {
                et.to_node_type = to;
            }
        }

        self.initialized = true;
    }

    /// Replace placeholder descriptors in a type's attribute map with the
    /// cached ones, keyed by name. Unknown attributes are skipped, since
    /// metadata may legitimately lag the server.
    fn reconcile_attributes(&self, core: &mut crate::model::types::TypeCore) {
        let names: Vec<String> = core.attributes.keys().cloned().collect();
        for name in names {
            match self.descriptors.get(&name) {
                Some(desc) => {
                    core.attributes.insert(name, desc.clone());
                }
                None => {
                    warn!(attribute = %name, entity_type = %core.name,
                        "cannot resolve attribute descriptor, skipping");
                    core.attributes.remove(&name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::descriptor::AttributeType;
    use crate::model::types::Direction;

    #[test]
    fn merge_is_additive() {
        let mut md = GraphMetadata::new();
        md.merge_from_server(
            vec![AttributeDescriptor::from_server(
                "age",
                AttributeType::Int,
                5,
                false,
            )],
            vec![],
            vec![],
        );
        md.merge_from_server(
            vec![AttributeDescriptor::from_server(
                "name",
                AttributeType::String,
                6,
                false,
            )],
            vec![],
            vec![],
        );

        let age = md.descriptor("age").expect("age survives second merge");
        assert_eq!(age.borrow().id(), 5);
        assert!(md.descriptor_by_id(6).is_some());
        assert!(md.is_initialized());
    }

    #[test]
    fn merge_updates_existing_descriptor_in_place() {
        let mut md = GraphMetadata::new();
        let local = md.create_descriptor("score", AttributeType::Double, false);
        assert!(local.borrow().is_temporary());

        md.merge_from_server(
            vec![AttributeDescriptor::from_server(
                "score",
                AttributeType::Double,
                42,
                false,
            )],
            vec![],
            vec![],
        );

        // The handle created before the merge observes the server id
        assert_eq!(local.borrow().id(), 42);
        assert!(Rc::ptr_eq(&local, &md.descriptor("score").unwrap()));
    }

    #[test]
    fn edge_endpoints_bind_across_batch_order() {
        let mut md = GraphMetadata::new();
        // Edge type arrives before its endpoint node types
        let mut et = EdgeType::new(30, "knows", Direction::Directed);
        et.from_type_id = 10;
        et.to_type_id = 11;
        md.merge_from_server(
            vec![],
            vec![NodeType::new(10, "person"), NodeType::new(11, "city")],
            vec![et],
        );

        let knows = md.edge_type("knows").unwrap();
        let knows = knows.borrow();
        assert_eq!(
            knows.from_node_type.as_ref().unwrap().borrow().name(),
            "person"
        );
        assert_eq!(knows.to_node_type.as_ref().unwrap().borrow().name(), "city");
    }

    #[test]
    fn unknown_type_attributes_are_skipped_on_merge() {
        let mut md = GraphMetadata::new();
        let mut nt = NodeType::new(10, "person");
        nt.core.attributes.insert(
            "mystery".into(),
            Rc::new(RefCell::new(AttributeDescriptor::from_server(
                "mystery",
                AttributeType::String,
                0,
                false,
            ))),
        );
        md.merge_from_server(vec![], vec![nt], vec![]);

        let person = md.node_type("person").unwrap();
        assert!(person.borrow().attribute("mystery").is_none());
    }

    #[test]
    fn derived_types_inherit_from_their_parent() {
        let mut md = GraphMetadata::new();
        md.merge_from_server(
            vec![AttributeDescriptor::from_server(
                "name",
                AttributeType::String,
                5,
                false,
            )],
            vec![],
            vec![],
        );
        let mut base = NodeType::new(10, "entity");
        base.core
            .attributes
            .insert("name".into(), md.descriptor("name").unwrap());
        let base = Rc::new(RefCell::new(base));

        let person = md.create_node_type("person", Some(base.clone()));
        let p = person.borrow();
        assert!(p.attribute("name").is_some(), "attributes inherited");
        assert!(Rc::ptr_eq(p.parent.as_ref().unwrap(), &base));
    }

    #[test]
    fn new_descriptors_lists_only_temporaries() {
        let mut md = GraphMetadata::new();
        md.create_descriptor("local", AttributeType::Int, false);
        md.merge_from_server(
            vec![AttributeDescriptor::from_server(
                "remote",
                AttributeType::Int,
                9,
                false,
            )],
            vec![],
            vec![],
        );
        let pending = md.new_descriptors();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].borrow().name(), "local");
    }
}
