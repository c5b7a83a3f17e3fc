//! Wire codec for metadata records: descriptors, node types, edge types

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use crate::error::Result;
use crate::model::descriptor::{AttributeDescriptor, AttributeType};
use crate::model::types::{system_type, Direction, EdgeType, NodeType, TypeCore};
use crate::wire::reader::WireReader;
use crate::wire::writer::WireWriter;

/// Descriptor record: systype, id, name, type tag, array flag, and for
/// `Number` the precision/scale pair.
pub fn write_attribute_descriptor(desc: &AttributeDescriptor, w: &mut WireWriter) -> Result<()> {
    w.write_u8(system_type::ATTRIBUTE_DESCRIPTOR);
    w.write_i32(desc.id() as i32);
    w.write_string(desc.name())?;
    w.write_u8(desc.attr_type().tag());
    w.write_bool(desc.is_array());
    if desc.attr_type() == AttributeType::Number {
        w.write_i16(desc.precision());
        w.write_i16(desc.scale());
    }
    Ok(())
}

pub fn read_attribute_descriptor(r: &mut WireReader) -> Result<AttributeDescriptor> {
    let systype = r.read_u8()?;
    if systype != system_type::ATTRIBUTE_DESCRIPTOR {
        warn!(systype, "descriptor record carries an unexpected system type");
    }
    let id = r.read_i32()? as i64;
    let name = r.read_string()?;
    let attr_type = AttributeType::from_tag(r.read_u8()?);
    if attr_type == AttributeType::Invalid {
        warn!(descriptor = %name, "descriptor has an unrecognized attribute type");
    }
    let is_array = r.read_bool()?;
    let mut desc = AttributeDescriptor::from_server(name, attr_type, id, is_array);
    if attr_type == AttributeType::Number {
        let precision = r.read_i16()?;
        let scale = r.read_i16()?;
        desc.set_precision_and_scale(precision, scale);
    }
    Ok(desc)
}

/// Common entity-type prefix: systype, id, name, reserved page size, and the
/// attribute-name list. The stream only carries names; descriptors are
/// synthesized as string-typed placeholders and reconciled during merge.
fn read_type_core(r: &mut WireReader, expected_systype: u8) -> Result<TypeCore> {
    let systype = r.read_u8()?;
    if systype != expected_systype {
        warn!(systype, expected_systype, "entity type record has unexpected system type");
    }
    let id = r.read_i32()?;
    let name = r.read_string()?;
    let _page_size = r.read_i32()?; // reserved
    let mut core = TypeCore::new(id, name);
    let attr_count = r.read_i16()?;
    for _ in 0..attr_count {
        let attr_name = r.read_string()?;
        let placeholder =
            AttributeDescriptor::from_server(attr_name.clone(), AttributeType::String, 0, false);
        core.attributes
            .insert(attr_name, Rc::new(RefCell::new(placeholder)));
    }
    Ok(core)
}

pub fn read_node_type(r: &mut WireReader) -> Result<NodeType> {
    let core = read_type_core(r, system_type::NODE_TYPE)?;
    let mut node_type = NodeType {
        core,
        ..Default::default()
    };
    let pkey_count = r.read_i16()?;
    for _ in 0..pkey_count {
        node_type.pkey_attr_names.push(r.read_string()?);
    }
    let index_count = r.read_i16()?;
    for _ in 0..index_count {
        node_type.index_ids.push(r.read_i32()?);
    }
    node_type.num_entries = r.read_i64()?;
    Ok(node_type)
}

pub fn read_edge_type(r: &mut WireReader) -> Result<EdgeType> {
    let core = read_type_core(r, system_type::EDGE_TYPE)?;
    let mut edge_type = EdgeType {
        core,
        ..Default::default()
    };
    edge_type.from_type_id = r.read_i32()?;
    edge_type.to_type_id = r.read_i32()?;
    edge_type.direction = Direction::from_byte(r.read_u8()?);
    edge_type.num_entries = r.read_i64()?;
    Ok(edge_type)
}

/// Types are declared through separate administrative commands; the client
/// never round-trips them. Kept as a documented no-op.
pub fn write_entity_type(name: &str, _w: &mut WireWriter) {
    warn!(entity_type = name, "entity type serialization toward the server is not implemented");
}
