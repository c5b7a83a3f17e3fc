//! Node, edge and graph entities with dirty-tracked attributes

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::error::{GraphError, Result};
use crate::model::metadata::GraphMetadata;
use crate::model::types::Direction;
use crate::model::value::Value;
use crate::model::{id_gen, DescriptorRef, EdgeTypeRef, EntityRef, NodeTypeRef, WeakEntityRef};

/// Entity kind discriminators, by wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Invalid,
    Entity,
    Node,
    Edge,
    Graph,
    HyperEdge,
}

impl EntityKind {
    pub fn as_byte(self) -> u8 {
        match self {
            EntityKind::Invalid => 0,
            EntityKind::Entity => 1,
            EntityKind::Node => 2,
            EntityKind::Edge => 3,
            EntityKind::Graph => 4,
            EntityKind::HyperEdge => 5,
        }
    }

    pub fn from_byte(b: u8) -> EntityKind {
        match b {
            1 => EntityKind::Entity,
            2 => EntityKind::Node,
            3 => EntityKind::Edge,
            4 => EntityKind::Graph,
            5 => EntityKind::HyperEdge,
            _ => EntityKind::Invalid,
        }
    }
}

/// Reference to the entity's resolved type descriptor.
#[derive(Debug, Clone)]
pub enum TypeRef {
    Node(NodeTypeRef),
    Edge(EdgeTypeRef),
}

impl TypeRef {
    pub fn id(&self) -> i32 {
        match self {
            TypeRef::Node(t) => t.borrow().id(),
            TypeRef::Edge(t) => t.borrow().id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            TypeRef::Node(t) => t.borrow().name().to_string(),
            TypeRef::Edge(t) => t.borrow().name().to_string(),
        }
    }
}

/// A named value attached to an entity. Holds a shared reference to its
/// descriptor so a post-commit id fixup is visible through every attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    descriptor: DescriptorRef,
    value: Option<Value>,
    modified: bool,
}

impl Attribute {
    pub fn new(descriptor: DescriptorRef, value: Option<Value>) -> Self {
        Self {
            descriptor,
            value,
            modified: false,
        }
    }

    pub fn descriptor(&self) -> &DescriptorRef {
        &self.descriptor
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Replace the value; an unchanged value does not dirty the attribute.
    pub fn set_value(&mut self, value: Option<Value>) {
        if self.value == value && !self.value.is_none() {
            return;
        }
        self.value = value;
        self.modified = true;
    }

    pub(crate) fn reset_modified(&mut self) {
        self.modified = false;
    }
}

/// Kind-specific entity state.
#[derive(Debug)]
pub enum EntityBody {
    Node(NodeBody),
    Edge(EdgeBody),
    Graph(GraphBody),
}

/// Edges are held weakly: the edge owns strong references to its endpoint
/// nodes, and the node only backlinks, so the cycle cannot leak.
#[derive(Debug, Default)]
pub struct NodeBody {
    pub edges: Vec<WeakEntityRef>,
}

#[derive(Debug)]
pub struct EdgeBody {
    pub direction: Direction,
    pub from: Option<EntityRef>,
    pub to: Option<EntityRef>,
}

#[derive(Debug)]
pub struct GraphBody {
    pub node: NodeBody,
    pub name: String,
}

impl EntityBody {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityBody::Node(_) => EntityKind::Node,
            EntityBody::Edge(_) => EntityKind::Edge,
            EntityBody::Graph(_) => EntityKind::Graph,
        }
    }
}

/// A node, edge or graph. Identity is the virtual id while `is_new`, the
/// server-assigned entity id afterwards. A decode-time placeholder has
/// `is_initialized == false` until its defining bytes are read.
#[derive(Debug)]
pub struct Entity {
    entity_id: i64,
    virtual_id: i64,
    version: i32,
    is_new: bool,
    is_deleted: bool,
    is_initialized: bool,
    entity_type: Option<TypeRef>,
    attributes: BTreeMap<String, Attribute>,
    modified_order: Vec<String>,
    body: EntityBody,
}

impl Entity {
    fn with_body(entity_type: Option<TypeRef>, body: EntityBody) -> Entity {
        Entity {
            entity_id: -1,
            virtual_id: id_gen::next_virtual_id(),
            version: 0,
            is_new: true,
            is_deleted: false,
            is_initialized: true,
            entity_type,
            attributes: BTreeMap::new(),
            modified_order: Vec::new(),
            body,
        }
    }

    /// Create a new node, optionally typed.
    pub fn new_node(node_type: Option<NodeTypeRef>) -> EntityRef {
        let entity = Entity::with_body(
            node_type.map(TypeRef::Node),
            EntityBody::Node(NodeBody::default()),
        );
        crate::model::new_entity_ref(entity)
    }

    /// Create a new named graph.
    pub fn new_graph(name: impl Into<String>) -> EntityRef {
        let entity = Entity::with_body(
            None,
            EntityBody::Graph(GraphBody {
                node: NodeBody::default(),
                name: name.into(),
            }),
        );
        crate::model::new_entity_ref(entity)
    }

    /// Create a new edge between two nodes and register it on both
    /// endpoints.
    pub fn new_edge(
        from: &EntityRef,
        to: &EntityRef,
        direction: Direction,
        edge_type: Option<EdgeTypeRef>,
    ) -> EntityRef {
        let entity = Entity::with_body(
            edge_type.map(TypeRef::Edge),
            EntityBody::Edge(EdgeBody {
                direction,
                from: Some(from.clone()),
                to: Some(to.clone()),
            }),
        );
        let edge = crate::model::new_entity_ref(entity);
        if let Some(body) = from.borrow_mut().node_body_mut() {
            body.edges.push(std::rc::Rc::downgrade(&edge));
        }
        if !std::rc::Rc::ptr_eq(from, to) {
            if let Some(body) = to.borrow_mut().node_body_mut() {
                body.edges.push(std::rc::Rc::downgrade(&edge));
            }
        }
        edge
    }

    /// Create an uninitialized placeholder for a forward reference in a
    /// response stream. Filled in place once its defining bytes arrive.
    pub(crate) fn shell(kind: EntityKind, id: i64) -> Result<EntityRef> {
        let body = match kind {
            EntityKind::Node => EntityBody::Node(NodeBody::default()),
            EntityKind::Edge => EntityBody::Edge(EdgeBody {
                direction: Direction::BiDirectional,
                from: None,
                to: None,
            }),
            EntityKind::Graph => EntityBody::Graph(GraphBody {
                node: NodeBody::default(),
                name: String::new(),
            }),
            other => {
                return Err(GraphError::Decode(format!(
                    "cannot materialize entity of kind {other:?}"
                )))
            }
        };
        let mut entity = Entity::with_body(None, body);
        entity.virtual_id = 0;
        entity.is_new = false;
        entity.is_initialized = false;
        entity.entity_id = id;
        Ok(crate::model::new_entity_ref(entity))
    }

    // === Identity ===

    pub fn kind(&self) -> EntityKind {
        self.body.kind()
    }

    pub fn entity_id(&self) -> i64 {
        self.entity_id
    }

    pub fn virtual_id(&self) -> i64 {
        self.virtual_id
    }

    /// The externally visible identifier: the virtual id while new, the
    /// server-assigned id afterwards.
    pub fn key_id(&self) -> i64 {
        if self.is_new {
            self.virtual_id
        } else {
            self.entity_id
        }
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn entity_type(&self) -> Option<&TypeRef> {
        self.entity_type.as_ref()
    }

    pub(crate) fn set_entity_id(&mut self, id: i64) {
        self.virtual_id = 0;
        self.entity_id = id;
    }

    pub(crate) fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    pub(crate) fn set_is_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    pub(crate) fn set_initialized(&mut self, initialized: bool) {
        self.is_initialized = initialized;
    }

    pub(crate) fn set_entity_type(&mut self, entity_type: Option<TypeRef>) {
        self.entity_type = entity_type;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    // === Attributes ===

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.attributes.iter()
    }

    /// Set a named attribute, resolving its descriptor through the metadata
    /// cache and synthesizing one from the value's runtime type when the
    /// server does not know the attribute yet.
    pub fn set_attribute(
        &mut self,
        metadata: &mut GraphMetadata,
        name: &str,
        value: Option<Value>,
    ) -> Result<()> {
        let attr = match self.attributes.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let descriptor = match metadata.descriptor(name) {
                    Some(d) => d,
                    None => match &value {
                        Some(v) => metadata.create_descriptor_for_value(name, v),
                        // Without a descriptor a null value has no decodable type
                        None => {
                            return Err(GraphError::MetadataResolution(format!(
                                "null value for undefined attribute '{name}'"
                            )))
                        }
                    },
                };
                entry.insert(Attribute::new(descriptor, None))
            }
        };
        let was_modified = attr.is_modified();
        attr.set_value(value);
        let now_modified = attr.is_modified();
        if now_modified && !was_modified {
            self.modified_order.push(name.to_string());
        }
        Ok(())
    }

    /// Attach a decoded attribute without dirtying it.
    pub(crate) fn attach_attribute(&mut self, name: String, attribute: Attribute) {
        self.attributes.insert(name, attribute);
    }

    /// Modified attributes in the order they were first dirtied.
    pub fn modified_attributes(&self) -> Vec<&Attribute> {
        self.modified_order
            .iter()
            .filter_map(|name| self.attributes.get(name))
            .filter(|a| a.is_modified())
            .collect()
    }

    pub(crate) fn modified_count(&self) -> usize {
        self.attributes.values().filter(|a| a.is_modified()).count()
    }

    /// Clear dirty flags after a successful commit or rollback.
    pub fn reset_modified_attributes(&mut self) {
        for name in self.modified_order.drain(..) {
            if let Some(attr) = self.attributes.get_mut(&name) {
                attr.reset_modified();
            }
        }
    }

    // === Bodies ===

    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut EntityBody {
        &mut self.body
    }

    /// The node-side body, present for nodes and graphs.
    pub fn node_body(&self) -> Option<&NodeBody> {
        match &self.body {
            EntityBody::Node(n) => Some(n),
            EntityBody::Graph(g) => Some(&g.node),
            EntityBody::Edge(_) => None,
        }
    }

    pub(crate) fn node_body_mut(&mut self) -> Option<&mut NodeBody> {
        match &mut self.body {
            EntityBody::Node(n) => Some(n),
            EntityBody::Graph(g) => Some(&mut g.node),
            EntityBody::Edge(_) => None,
        }
    }

    pub fn edge_body(&self) -> Option<&EdgeBody> {
        match &self.body {
            EntityBody::Edge(e) => Some(e),
            _ => None,
        }
    }

    /// Live edges attached to this node, placeholders included.
    pub fn edges(&self) -> Vec<EntityRef> {
        self.node_body()
            .map(|n| n.edges.iter().filter_map(|w| w.upgrade()).collect())
            .unwrap_or_default()
    }

    /// Both endpoints of an edge, once known.
    pub fn endpoints(&self) -> Option<(EntityRef, EntityRef)> {
        let body = self.edge_body()?;
        match (&body.from, &body.to) {
            (Some(f), Some(t)) => Some((f.clone(), t.clone())),
            _ => None,
        }
    }

    pub fn graph_name(&self) -> Option<&str> {
        match &self.body {
            EntityBody::Graph(g) => Some(&g.name),
            _ => None,
        }
    }
}
