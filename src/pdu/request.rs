//! Request frame builders, one per outbound verb

use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{GraphError, Result};
use crate::model::value::Value;
use crate::model::{DescriptorRef, EntityRef};
use crate::pdu::{begin_frame, finish_frame, RequestContext, Verb};
use crate::wire::entity_codec::write_entity;
use crate::wire::type_codec::write_attribute_descriptor;
use crate::wire::writer::WireWriter;

/// Fetch shape for get-entity requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCommand {
    Single,
    Multiple,
}

impl FetchCommand {
    fn as_i16(self) -> i16 {
        match self {
            FetchCommand::Single => 0,
            FetchCommand::Multiple => 2,
        }
    }
}

/// Query sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCommand {
    Create,
    Execute,
    ExecuteId,
    Close,
}

impl QueryCommand {
    fn as_i32(self) -> i32 {
        match self {
            QueryCommand::Create => 1,
            QueryCommand::Execute => 2,
            QueryCommand::ExecuteId => 3,
            QueryCommand::Close => 4,
        }
    }
}

/// Attribute-based lookup key for entity fetches. An empty type name means
/// the search is not constrained to one type.
#[derive(Debug, Clone, Default)]
pub struct EntityKey {
    type_name: Option<String>,
    attributes: Vec<(String, Value)>,
}

impl EntityKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            attributes: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.push((name.into(), value));
        self
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    fn write(&self, w: &mut WireWriter) -> Result<()> {
        w.write_string(self.type_name.as_deref().unwrap_or(""))?;
        w.write_i16(self.attributes.len() as i16);
        for (name, value) in &self.attributes {
            w.write_string(name)?;
            w.write_u8(value.attr_type().tag());
            value.write(w)?;
        }
        Ok(())
    }
}

fn write_prefetch(w: &mut WireWriter, cfg: &ConnectionConfig) {
    w.write_i32(cfg.fetch_size);
    w.write_i16(cfg.batch_size);
    w.write_i16(cfg.traversal_depth);
    w.write_i16(cfg.edge_fetch_size);
}

/// Serialize the pending change set: new descriptors first (the server must
/// learn the metadata before the instance data), then the added, changed and
/// removed sections. Empty sections are omitted entirely.
pub fn commit_request(
    ctx: &RequestContext,
    added: &[EntityRef],
    changed: &[EntityRef],
    removed: &[EntityRef],
    new_descriptors: &[DescriptorRef],
) -> Result<Vec<u8>> {
    let mut w = WireWriter::new();
    begin_frame(&mut w, Verb::CommitTransactionRequest, ctx);

    let start = w.reserve_i32();
    w.write_i32(0); // checksum, reserved
    debug!(
        added = added.len(),
        changed = changed.len(),
        removed = removed.len(),
        descriptors = new_descriptors.len(),
        "building commit request"
    );

    if !new_descriptors.is_empty() {
        w.write_i16(super::OP_ATTR_DESCRIPTORS);
        w.write_i32(new_descriptors.len() as i32);
        for desc in new_descriptors {
            write_attribute_descriptor(&desc.borrow(), &mut w)?;
        }
    }
    for (opcode, entities) in [
        (super::OP_ADDED_ENTITIES, added),
        (super::OP_UPDATED_ENTITIES, changed),
        (super::OP_REMOVED_ENTITIES, removed),
    ] {
        if entities.is_empty() {
            continue;
        }
        w.write_i16(opcode);
        w.write_i32(entities.len() as i32);
        for entity in entities {
            write_entity(&entity.borrow(), &mut w)?;
        }
    }

    let len = (w.position() - start) as i32;
    w.patch_i32_at(start, len);
    Ok(finish_frame(w))
}

pub fn metadata_request(ctx: &RequestContext) -> Vec<u8> {
    let mut w = WireWriter::new();
    begin_frame(&mut w, Verb::MetadataRequest, ctx);
    finish_frame(w)
}

pub fn get_entity_request(
    ctx: &RequestContext,
    key: &EntityKey,
    command: FetchCommand,
    cfg: &ConnectionConfig,
) -> Result<Vec<u8>> {
    let mut w = WireWriter::new();
    begin_frame(&mut w, Verb::GetEntityRequest, ctx);
    w.write_i16(command.as_i16());
    w.write_i32(0); // result id, server-assigned
    write_prefetch(&mut w, cfg);
    key.write(&mut w)?;
    Ok(finish_frame(w))
}

pub fn query_request(
    ctx: &RequestContext,
    cfg: &ConnectionConfig,
    command: QueryCommand,
    expr: Option<&str>,
    query_hash_id: Option<i64>,
) -> Result<Vec<u8>> {
    let mut w = WireWriter::new();
    begin_frame(&mut w, Verb::QueryRequest, ctx);

    let start = w.reserve_i32();
    w.write_i32(0); // checksum, reserved
    w.write_i32(command.as_i32());
    write_prefetch(&mut w, cfg);
    match command {
        QueryCommand::Create | QueryCommand::Execute => {
            let expr = expr.ok_or_else(|| {
                GraphError::Decode("query create/execute requires an expression".into())
            })?;
            w.write_string(expr)?;
        }
        QueryCommand::ExecuteId | QueryCommand::Close => {
            let hash = query_hash_id.ok_or_else(|| {
                GraphError::Decode("query execute-id/close requires a query hash id".into())
            })?;
            w.write_i64(hash);
        }
    }

    let len = (w.position() - start) as i32;
    w.patch_i32_at(start, len);
    Ok(finish_frame(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::Entity;
    use crate::model::metadata::GraphMetadata;
    use crate::pdu::{read_header, HEADER_SIZE};
    use crate::wire::reader::WireReader;

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: 1,
            auth_token: 0,
            session_id: 0,
        }
    }

    #[test]
    fn commit_request_orders_sections_and_patches_length() {
        let mut md = GraphMetadata::new();
        let node = Entity::new_node(None);
        node.borrow_mut()
            .set_attribute(&mut md, "name", Some(Value::String("ada".into())))
            .unwrap();
        let descs = md.new_descriptors();

        let frame =
            commit_request(&ctx(), std::slice::from_ref(&node), &[], &[], &descs).unwrap();
        let mut r = WireReader::new(&frame);
        let header = read_header(&mut r).unwrap();
        assert_eq!(header.verb, Verb::CommitTransactionRequest);

        let payload_len = r.read_i32().unwrap();
        assert_eq!(
            payload_len as usize,
            frame.len() - HEADER_SIZE as usize,
            "payload length covers everything after the header"
        );
        assert_eq!(r.read_i32().unwrap(), 0); // checksum
        assert_eq!(r.read_i16().unwrap(), crate::pdu::OP_ATTR_DESCRIPTORS);
        assert_eq!(r.read_i32().unwrap(), 1);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let frame = commit_request(&ctx(), &[], &[], &[], &[]).unwrap();
        let mut r = WireReader::new(&frame);
        read_header(&mut r).unwrap();
        r.read_i32().unwrap(); // payload length
        r.read_i32().unwrap(); // checksum
        assert_eq!(r.remaining(), 0, "no sections for an empty change set");
    }

    #[test]
    fn get_entity_request_carries_the_key() {
        let key = EntityKey::for_type("person").with("name", Value::String("ada".into()));
        let frame =
            get_entity_request(&ctx(), &key, FetchCommand::Single, &ConnectionConfig::default())
                .unwrap();
        let mut r = WireReader::new(&frame);
        let header = read_header(&mut r).unwrap();
        assert_eq!(header.verb, Verb::GetEntityRequest);
        assert_eq!(r.read_i16().unwrap(), 0); // single fetch
        r.read_i32().unwrap(); // result id
        r.read_i32().unwrap(); // fetch size
        r.read_i16().unwrap();
        r.read_i16().unwrap();
        r.read_i16().unwrap();
        assert_eq!(r.read_string().unwrap(), "person");
        assert_eq!(r.read_i16().unwrap(), 1);
        assert_eq!(r.read_string().unwrap(), "name");
    }

    #[test]
    fn query_request_requires_an_expression() {
        let err = query_request(
            &ctx(),
            &ConnectionConfig::default(),
            QueryCommand::Execute,
            None,
            None,
        );
        assert!(err.is_err());
    }
}
