//! Response payload parsers, one per inbound verb

use tracing::{debug, warn};

use crate::error::{GraphError, Result, TransactionFailure};
use crate::model::descriptor::AttributeDescriptor;
use crate::model::types::{system_type, EdgeType, NodeType};
use crate::wire::reader::WireReader;
use crate::wire::type_codec;

/// Commit fixup deltas reported by the server.
#[derive(Debug, Default)]
pub struct CommitResponse {
    /// (temporary descriptor id, real descriptor id)
    pub descriptor_fixups: Vec<(i64, i64)>,
    /// (temporary entity id, real entity id, version)
    pub added_fixups: Vec<(i64, i64, i64)>,
    /// (entity id, new version)
    pub updated_fixups: Vec<(i64, i64)>,
    /// ids of entities the server confirmed deleted
    pub removed_ids: Vec<i64>,
}

/// Parse a commit response payload. A nonzero status aborts with the mapped
/// transaction failure before any fixups are produced.
pub fn parse_commit_response(r: &mut WireReader) -> Result<CommitResponse> {
    r.read_i32()?; // buf length
    r.read_i32()?; // checksum
    let status = r.read_i32()?;
    if status != 0 {
        return Err(GraphError::Transaction(TransactionFailure::from_status(
            status,
        )));
    }

    let mut response = CommitResponse::default();
    while r.remaining() > 0 {
        let opcode = r.read_i16()?;
        match opcode {
            super::OP_ATTR_DESCRIPTORS => {
                let count = r.read_i32()?;
                for _ in 0..count {
                    let temp_id = r.read_i32()? as i64;
                    let real_id = r.read_i32()? as i64;
                    response.descriptor_fixups.push((temp_id, real_id));
                }
                debug!(count, "received descriptor id fixups");
            }
            super::OP_ADDED_ENTITIES => {
                let count = r.read_i32()?;
                for _ in 0..count {
                    let temp_id = r.read_i64()?;
                    let real_id = r.read_i64()?;
                    let version = r.read_i64()?;
                    response.added_fixups.push((temp_id, real_id, version));
                }
                debug!(count, "received added entity fixups");
            }
            super::OP_UPDATED_ENTITIES => {
                let count = r.read_i32()?;
                for _ in 0..count {
                    let id = r.read_i64()?;
                    let version = r.read_i64()?;
                    response.updated_fixups.push((id, version));
                }
                debug!(count, "received updated entity versions");
            }
            super::OP_REMOVED_ENTITIES => {
                let count = r.read_i32()?;
                for _ in 0..count {
                    response.removed_ids.push(r.read_i64()?);
                }
                debug!(count, "received delete confirmations");
            }
            super::OP_DEBUG_ENTITIES => {
                // Trailing diagnostic entity dump, not part of the fixups
                let skip = r.remaining();
                r.read_bytes(skip)?;
            }
            other => {
                warn!(opcode = other, "unknown commit response section, ignoring remainder");
                let skip = r.remaining();
                r.read_bytes(skip)?;
            }
        }
    }
    Ok(response)
}

/// Decoded metadata batch, ready for a cache merge.
#[derive(Debug, Default)]
pub struct MetadataPayload {
    pub descriptors: Vec<AttributeDescriptor>,
    pub node_types: Vec<NodeType>,
    pub edge_types: Vec<EdgeType>,
}

/// Parse a metadata response: a total record count followed by batches of
/// descriptors, node types and edge types. System types (names starting
/// with `@` or `$`) are skipped.
pub fn parse_metadata_response(r: &mut WireReader) -> Result<MetadataPayload> {
    let mut payload = MetadataPayload::default();
    if r.remaining() == 0 {
        debug!("metadata response has no data");
        return Ok(payload);
    }

    let mut remaining = r.read_i32()?;
    while remaining > 0 {
        let batch_systype = r.read_u8()?;
        let batch_count = r.read_i32()?;
        if batch_count <= 0 || batch_count > remaining {
            return Err(GraphError::Decode(format!(
                "metadata batch of {batch_count} records with {remaining} expected"
            )));
        }
        match batch_systype {
            system_type::ATTRIBUTE_DESCRIPTOR => {
                for _ in 0..batch_count {
                    payload
                        .descriptors
                        .push(type_codec::read_attribute_descriptor(r)?);
                }
            }
            system_type::NODE_TYPE => {
                for _ in 0..batch_count {
                    let node_type = type_codec::read_node_type(r)?;
                    if is_system_name(node_type.name()) {
                        continue;
                    }
                    payload.node_types.push(node_type);
                }
            }
            system_type::EDGE_TYPE => {
                for _ in 0..batch_count {
                    let edge_type = type_codec::read_edge_type(r)?;
                    if is_system_name(edge_type.name()) {
                        continue;
                    }
                    payload.edge_types.push(edge_type);
                }
            }
            other => {
                return Err(GraphError::Decode(format!(
                    "invalid metadata record type {other}"
                )));
            }
        }
        remaining -= batch_count;
    }
    Ok(payload)
}

fn is_system_name(name: &str) -> bool {
    name.starts_with('@') || name.starts_with('$')
}

/// Leading fields of a get-entity response; the entity stream follows.
#[derive(Debug, Clone, Copy)]
pub struct GetEntityHead {
    pub result_id: i32,
    pub has_result: bool,
}

pub fn parse_get_entity_head(r: &mut WireReader) -> Result<GetEntityHead> {
    r.read_i32()?; // buf length
    r.read_i32()?; // checksum
    let result_id = r.read_i32()?;
    let has_result = r.read_bool()?;
    Ok(GetEntityHead {
        result_id,
        has_result,
    })
}

/// Leading fields of a query response; the entity stream follows.
#[derive(Debug, Clone, Copy)]
pub struct QueryHead {
    pub query_hash_id: i64,
    pub result_count: i32,
    pub total_count: i32,
}

pub fn parse_query_head(r: &mut WireReader) -> Result<QueryHead> {
    r.read_i32()?; // buf length
    r.read_i32()?; // checksum
    let status = r.read_i32()?;
    if status != 0 {
        return Err(GraphError::Transaction(TransactionFailure::from_status(
            status,
        )));
    }
    let query_hash_id = r.read_i64()?;
    let result_count = r.read_i32()?;
    let total_count = r.read_i32()?;
    Ok(QueryHead {
        query_hash_id,
        result_count,
        total_count,
    })
}
