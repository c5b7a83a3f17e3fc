//! Entity wire codec with reference-based object-graph reconstruction

use std::collections::HashMap;

use tracing::warn;

use crate::error::{GraphError, Result};
use crate::model::entity::{Attribute, Entity, EntityBody, EntityKind, TypeRef};
use crate::model::metadata::GraphMetadata;
use crate::model::types::Direction;
use crate::model::value::Value;
use crate::model::{AttributeType, EntityRef};
use crate::wire::reader::WireReader;
use crate::wire::writer::WireWriter;

/// Per-response map from entity id to the single shared object representing
/// that entity. Guarantees that a node and its edges, or two edges sharing
/// an endpoint, resolve to one in-memory object regardless of stream order.
#[derive(Default)]
pub struct ReferenceMap {
    entities: HashMap<i64, EntityRef>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<EntityRef> {
        self.entities.get(&id).cloned()
    }

    pub fn insert(&mut self, id: i64, entity: EntityRef) {
        self.entities.insert(id, entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Return the object already registered for `id`, or register a fresh
    /// uninitialized shell of the expected kind. A kind conflict on an
    /// existing object means the stream is corrupt and is fatal.
    pub fn or_create_shell(&mut self, id: i64, expected: EntityKind) -> Result<EntityRef> {
        if let Some(existing) = self.entities.get(&id) {
            let found = existing
                .try_borrow()
                .map_err(|_| {
                    GraphError::Decode(format!("entity {id} references itself in the stream"))
                })?
                .kind();
            // A graph is a node subtype; node references may resolve to it
            let compatible =
                found == expected || (expected == EntityKind::Node && found == EntityKind::Graph);
            if !compatible {
                return Err(GraphError::Decode(format!(
                    "entity {id} already materialized as {found:?}, stream says {expected:?}"
                )));
            }
            return Ok(existing.clone());
        }
        let shell = Entity::shell(expected, id)?;
        self.entities.insert(id, shell.clone());
        Ok(shell)
    }
}

// === Encode ===

/// Serialize one entity: length-prefixed frame, common header, modified
/// attributes only, then the kind-specific trailer.
pub fn write_entity(entity: &Entity, w: &mut WireWriter) -> Result<()> {
    let start = w.reserve_i32();

    w.write_bool(entity.is_new());
    w.write_u8(entity.kind().as_byte());
    w.write_i64(entity.key_id());
    w.write_i32(entity.version());
    w.write_i32(entity.entity_type().map(|t| t.id()).unwrap_or(0));

    w.write_i32(entity.modified_count() as i32);
    for (_, attr) in entity.attributes() {
        if attr.is_modified() {
            write_attribute(attr, w)?;
        }
    }

    match entity.body() {
        EntityBody::Node(node) => write_node_trailer(node, w)?,
        EntityBody::Graph(graph) => {
            write_node_trailer(&graph.node, w)?;
            w.write_string(&graph.name)?;
        }
        EntityBody::Edge(edge) => {
            w.write_u8(edge.direction.as_byte());
            let (from, to) = entity.endpoints().ok_or_else(|| {
                GraphError::Decode(format!(
                    "edge {} has unresolved endpoints and cannot be serialized",
                    entity.key_id()
                ))
            })?;
            w.write_i64(from.borrow().key_id());
            w.write_i64(to.borrow().key_id());
        }
    }

    let len = (w.position() - start) as i32;
    w.patch_i32_at(start, len);
    Ok(())
}

fn write_node_trailer(node: &crate::model::entity::NodeBody, w: &mut WireWriter) -> Result<()> {
    // Only new edges travel with the node; persisted edges are not re-sent
    let new_edges: Vec<EntityRef> = node
        .edges
        .iter()
        .filter_map(|weak| weak.upgrade())
        .filter(|e| e.borrow().is_new())
        .collect();
    w.write_i32(new_edges.len() as i32);
    for edge in new_edges {
        w.write_i64(edge.borrow().key_id());
    }
    Ok(())
}

fn write_attribute(attr: &Attribute, w: &mut WireWriter) -> Result<()> {
    let desc = attr.descriptor().borrow();
    w.write_i32(desc.id() as i32);
    let tag = attr
        .value()
        .map(|v| v.attr_type())
        .unwrap_or_else(|| desc.attr_type());
    w.write_u8(tag.tag());
    w.write_bool(attr.is_null());
    if let Some(value) = attr.value() {
        value.write(w)?;
    }
    Ok(())
}

// === Decode ===

/// Fill an already-registered entity from its defining bytes. The target is
/// mutated in place, never replaced, because other decoded entities may
/// already hold references to it.
pub fn read_entity_into(
    target: &EntityRef,
    r: &mut WireReader,
    metadata: &GraphMetadata,
    refs: &mut ReferenceMap,
) -> Result<()> {
    let frame_len = r.read_i32()?;
    if frame_len < 4 || (frame_len as usize - 4) > r.remaining() {
        return Err(GraphError::Decode(format!(
            "entity frame of {frame_len} bytes exceeds the {} remaining",
            r.remaining()
        )));
    }

    let mut entity = target
        .try_borrow_mut()
        .map_err(|_| GraphError::Decode("entity is already being decoded".into()))?;

    // Responses never carry new entities; the flag is read and discarded
    let _is_new = r.read_bool()?;
    let kind = EntityKind::from_byte(r.read_u8()?);
    // Graphs are node subtypes, so a node placeholder may legitimately turn
    // out to be a graph (and vice versa for plain node references)
    let node_like = |k: EntityKind| k == EntityKind::Node || k == EntityKind::Graph;
    let compatible = kind == entity.kind() || (node_like(kind) && node_like(entity.kind()));
    if !compatible {
        return Err(GraphError::Decode(format!(
            "expected {:?} but stream contains {kind:?}",
            entity.kind()
        )));
    }

    entity.set_entity_id(r.read_i64()?);
    entity.set_is_new(false);
    entity.set_version(r.read_i32()?);

    let type_id = r.read_i32()?;
    if type_id != 0 {
        let type_ref = metadata
            .node_type_by_id(type_id)
            .map(TypeRef::Node)
            .or_else(|| metadata.edge_type_by_id(type_id).map(TypeRef::Edge));
        if type_ref.is_none() {
            warn!(type_id, "cannot resolve entity type from the metadata cache");
        }
        entity.set_entity_type(type_ref);
    }

    let attr_count = r.read_i32()?;
    for _ in 0..attr_count {
        let (name, attr) = read_attribute(r, metadata)?;
        entity.attach_attribute(name, attr);
    }

    match kind {
        EntityKind::Node => {
            read_node_trailer(&mut entity, r, refs)?;
        }
        EntityKind::Graph => {
            read_node_trailer(&mut entity, r, refs)?;
            let name = r.read_string()?;
            // A node placeholder whose defining bytes declare a graph is
            // upgraded in place, keeping the edges gathered so far
            let body = entity.body_mut();
            if let EntityBody::Node(node) = body {
                let node = std::mem::take(node);
                *body = EntityBody::Graph(crate::model::entity::GraphBody { node, name });
            } else if let EntityBody::Graph(graph) = body {
                graph.name = name;
            }
        }
        EntityKind::Edge => {
            let direction = Direction::from_byte(r.read_u8()?);
            let from_id = r.read_i64()?;
            let from = resolve_endpoint(target, from_id, refs)?;
            let to_id = r.read_i64()?;
            let to = resolve_endpoint(target, to_id, refs)?;
            if let EntityBody::Edge(edge) = entity.body_mut() {
                edge.direction = direction;
                edge.from = Some(from);
                edge.to = Some(to);
            }
        }
        other => {
            return Err(GraphError::Decode(format!(
                "cannot decode entity of kind {other:?}"
            )))
        }
    }

    entity.set_initialized(true);
    Ok(())
}

fn read_node_trailer(
    entity: &mut std::cell::RefMut<'_, Entity>,
    r: &mut WireReader,
    refs: &mut ReferenceMap,
) -> Result<()> {
    let edge_count = r.read_i32()?;
    for _ in 0..edge_count {
        let id = r.read_i64()?;
        let edge = refs.or_create_shell(id, EntityKind::Edge)?;
        if let Some(node) = entity.node_body_mut() {
            node.edges.push(std::rc::Rc::downgrade(&edge));
        }
    }
    Ok(())
}

fn resolve_endpoint(
    target: &EntityRef,
    id: i64,
    refs: &mut ReferenceMap,
) -> Result<EntityRef> {
    let endpoint = refs.or_create_shell(id, EntityKind::Node)?;
    if std::rc::Rc::ptr_eq(&endpoint, target) {
        return Err(GraphError::Decode(format!(
            "edge {id} lists itself as an endpoint"
        )));
    }
    Ok(endpoint)
}

fn read_attribute(r: &mut WireReader, metadata: &GraphMetadata) -> Result<(String, Attribute)> {
    let descriptor_id = r.read_i32()? as i64;
    let tag = AttributeType::from_tag(r.read_u8()?);
    if tag == AttributeType::Invalid {
        return Err(GraphError::TypeCoercion(format!(
            "unknown attribute type tag for descriptor {descriptor_id}"
        )));
    }
    let descriptor = metadata.descriptor_by_id(descriptor_id).ok_or_else(|| {
        GraphError::MetadataResolution(format!(
            "attribute descriptor {descriptor_id} is not in the metadata cache"
        ))
    })?;
    let is_null = r.read_bool()?;
    let value = if is_null {
        None
    } else {
        Some(Value::read(tag, r)?)
    };
    let name = descriptor.borrow().name().to_string();
    Ok((name, Attribute::new(descriptor, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::descriptor::AttributeDescriptor;
    use std::rc::Rc;

    fn metadata_with(descs: Vec<AttributeDescriptor>) -> GraphMetadata {
        let mut md = GraphMetadata::new();
        md.merge_from_server(descs, vec![], vec![]);
        md
    }

    fn encode(entity: &EntityRef) -> Vec<u8> {
        let mut w = WireWriter::new();
        write_entity(&entity.borrow(), &mut w).unwrap();
        w.into_bytes()
    }

    #[test]
    fn node_attributes_roundtrip() {
        let mut md = metadata_with(vec![
            AttributeDescriptor::from_server("name", AttributeType::String, 3, false),
            AttributeDescriptor::from_server("age", AttributeType::Int, 4, false),
        ]);

        let node = Entity::new_node(None);
        {
            let mut n = node.borrow_mut();
            n.set_attribute(&mut md, "name", Some(Value::String("ada".into())))
                .unwrap();
            n.set_attribute(&mut md, "age", Some(Value::Int(36))).unwrap();
        }
        let bytes = encode(&node);

        let mut refs = ReferenceMap::new();
        let target = refs.or_create_shell(500, EntityKind::Node).unwrap();
        let mut r = WireReader::new(&bytes);
        read_entity_into(&target, &mut r, &md, &mut refs).unwrap();

        let decoded = target.borrow();
        assert!(decoded.is_initialized());
        assert_eq!(
            decoded.attribute("name").unwrap().value(),
            Some(&Value::String("ada".into()))
        );
        assert_eq!(
            decoded.attribute("age").unwrap().value(),
            Some(&Value::Int(36))
        );
        // Decoded attributes are clean
        assert!(decoded.modified_attributes().is_empty());
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn unmodified_attributes_are_not_serialized() {
        let mut md = metadata_with(vec![AttributeDescriptor::from_server(
            "name",
            AttributeType::String,
            3,
            false,
        )]);
        let node = Entity::new_node(None);
        node.borrow_mut()
            .set_attribute(&mut md, "name", Some(Value::String("x".into())))
            .unwrap();
        node.borrow_mut().reset_modified_attributes();

        let bytes = encode(&node);
        // frame len + isNew + kind + id + version + type + attr count + edge count
        let mut r = WireReader::new(&bytes);
        r.read_i32().unwrap();
        r.read_bool().unwrap();
        r.read_u8().unwrap();
        r.read_i64().unwrap();
        r.read_i32().unwrap();
        r.read_i32().unwrap();
        assert_eq!(r.read_i32().unwrap(), 0, "no modified attributes on the wire");
    }

    #[test]
    fn shared_endpoint_decodes_to_one_object() {
        let md = GraphMetadata::new();

        // Two edges 600 and 601 both referencing node 700
        let a = Entity::new_node(None);
        let b = Entity::new_node(None);
        let c = Entity::new_node(None);
        for n in [&a, &b, &c] {
            n.borrow_mut().set_is_new(false);
        }
        a.borrow_mut().set_entity_id(700);
        b.borrow_mut().set_entity_id(701);
        c.borrow_mut().set_entity_id(702);
        let e1 = Entity::new_edge(&a, &b, Direction::Directed, None);
        let e2 = Entity::new_edge(&a, &c, Direction::Directed, None);
        e1.borrow_mut().set_is_new(false);
        e1.borrow_mut().set_entity_id(600);
        e2.borrow_mut().set_is_new(false);
        e2.borrow_mut().set_entity_id(601);

        let bytes1 = encode(&e1);
        let bytes2 = encode(&e2);

        let mut refs = ReferenceMap::new();
        let t1 = refs.or_create_shell(600, EntityKind::Edge).unwrap();
        let mut r1 = WireReader::new(&bytes1);
        read_entity_into(&t1, &mut r1, &md, &mut refs).unwrap();
        let t2 = refs.or_create_shell(601, EntityKind::Edge).unwrap();
        let mut r2 = WireReader::new(&bytes2);
        read_entity_into(&t2, &mut r2, &md, &mut refs).unwrap();

        let (from1, _) = t1.borrow().endpoints().unwrap();
        let (from2, _) = t2.borrow().endpoints().unwrap();
        assert!(Rc::ptr_eq(&from1, &from2), "node 700 must be one object");
        assert!(!from1.borrow().is_initialized(), "endpoint is still a shell");
    }

    #[test]
    fn shell_is_filled_in_place_when_its_bytes_arrive() {
        let mut md = metadata_with(vec![AttributeDescriptor::from_server(
            "name",
            AttributeType::String,
            3,
            false,
        )]);

        let a = Entity::new_node(None);
        let b = Entity::new_node(None);
        a.borrow_mut().set_is_new(false);
        a.borrow_mut().set_entity_id(700);
        b.borrow_mut().set_is_new(false);
        b.borrow_mut().set_entity_id(701);
        let edge = Entity::new_edge(&a, &b, Direction::Directed, None);
        edge.borrow_mut().set_is_new(false);
        edge.borrow_mut().set_entity_id(600);
        let edge_bytes = encode(&edge);

        let full = Entity::new_node(None);
        full.borrow_mut()
            .set_attribute(&mut md, "name", Some(Value::String("ada".into())))
            .unwrap();
        full.borrow_mut().set_is_new(false);
        full.borrow_mut().set_entity_id(700);
        let node_bytes = encode(&full);

        // Edge first: node 700 becomes a shell held by the edge
        let mut refs = ReferenceMap::new();
        let te = refs.or_create_shell(600, EntityKind::Edge).unwrap();
        read_entity_into(&te, &mut WireReader::new(&edge_bytes), &md, &mut refs).unwrap();
        let (shell, _) = te.borrow().endpoints().unwrap();
        assert!(!shell.borrow().is_initialized());

        // Node bytes arrive later and fill the same object
        let tn = refs.or_create_shell(700, EntityKind::Node).unwrap();
        assert!(Rc::ptr_eq(&tn, &shell));
        read_entity_into(&tn, &mut WireReader::new(&node_bytes), &md, &mut refs).unwrap();

        let via_edge = te.borrow().endpoints().unwrap().0;
        assert!(via_edge.borrow().is_initialized());
        assert_eq!(
            via_edge.borrow().attribute("name").unwrap().value(),
            Some(&Value::String("ada".into()))
        );
    }

    #[test]
    fn kind_mismatch_on_reference_is_fatal() {
        let mut refs = ReferenceMap::new();
        refs.or_create_shell(9, EntityKind::Edge).unwrap();
        match refs.or_create_shell(9, EntityKind::Node) {
            Err(GraphError::Decode(_)) => {}
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_attribute_descriptor_fails_resolution() {
        let md = GraphMetadata::new();
        let mut w = WireWriter::new();
        let start = w.reserve_i32();
        w.write_bool(false);
        w.write_u8(EntityKind::Node.as_byte());
        w.write_i64(800);
        w.write_i32(1);
        w.write_i32(0);
        w.write_i32(1); // one attribute
        w.write_i32(99); // unknown descriptor id
        w.write_u8(AttributeType::Int.tag());
        w.write_bool(false);
        w.write_i32(5);
        w.write_i32(0); // no edges
        let len = (w.position() - start) as i32;
        w.patch_i32_at(start, len);
        let bytes = w.into_bytes();

        let mut refs = ReferenceMap::new();
        let target = refs.or_create_shell(800, EntityKind::Node).unwrap();
        match read_entity_into(&target, &mut WireReader::new(&bytes), &md, &mut refs) {
            Err(GraphError::MetadataResolution(_)) => {}
            other => panic!("expected MetadataResolution, got {other:?}"),
        }
        assert!(!target.borrow().is_initialized(), "partial decode stays uninitialized");
    }

    #[test]
    fn graph_name_roundtrips() {
        let md = GraphMetadata::new();
        let graph = Entity::new_graph("social");
        graph.borrow_mut().set_is_new(false);
        graph.borrow_mut().set_entity_id(900);
        let bytes = encode(&graph);

        let mut refs = ReferenceMap::new();
        let target = refs.or_create_shell(900, EntityKind::Graph).unwrap();
        read_entity_into(&target, &mut WireReader::new(&bytes), &md, &mut refs).unwrap();
        assert_eq!(target.borrow().graph_name(), Some("social"));
    }
}
