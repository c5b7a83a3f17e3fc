//! Result-set materialization from response entity streams

use tracing::debug;

use crate::error::{GraphError, Result};
use crate::model::metadata::GraphMetadata;
use crate::model::{EntityKind, EntityRef};
use crate::wire::entity_codec::{read_entity_into, ReferenceMap};
use crate::wire::reader::WireReader;

/// An ordered collection of fetched entities. Only true results are listed;
/// incidentally fetched related entities stay reachable through them.
pub struct ResultSet {
    result_id: i32,
    entities: Vec<EntityRef>,
}

impl ResultSet {
    pub fn new(result_id: i32) -> Self {
        Self {
            result_id,
            entities: Vec::new(),
        }
    }

    pub fn result_id(&self) -> i32 {
        self.result_id
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&EntityRef> {
        self.entities.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        self.entities.iter()
    }

    pub fn into_vec(self) -> Vec<EntityRef> {
        self.entities
    }

    fn push(&mut self, entity: EntityRef) {
        self.entities.push(entity);
    }
}

/// Materialize a multi-entity stream: `total` entries, each flagged as a
/// true result or a merely-related entity. Server ordering is preserved.
pub fn materialize_entities(
    r: &mut WireReader,
    metadata: &GraphMetadata,
    total: i32,
    result_id: i32,
) -> Result<ResultSet> {
    let mut refs = ReferenceMap::new();
    let mut results = ResultSet::new(result_id);
    for _ in 0..total {
        let is_result = r.read_bool()?;
        let entity = read_stream_entity(r, metadata, &mut refs)?;
        if is_result {
            results.push(entity);
        }
    }
    debug!(
        results = results.len(),
        fetched = refs.len(),
        "materialized result set"
    );
    Ok(results)
}

/// Materialize a single-entity fetch: the first decoded entity is the
/// result; everything else rides along in the reference map.
pub fn materialize_single(
    r: &mut WireReader,
    metadata: &GraphMetadata,
) -> Result<Option<EntityRef>> {
    let count = r.read_i32()?;
    let mut refs = ReferenceMap::new();
    let mut found: Option<EntityRef> = None;
    for _ in 0..count {
        let entity = read_stream_entity(r, metadata, &mut refs)?;
        if found.is_none() {
            found = Some(entity);
        }
    }
    Ok(found)
}

fn read_stream_entity(
    r: &mut WireReader,
    metadata: &GraphMetadata,
    refs: &mut ReferenceMap,
) -> Result<EntityRef> {
    let kind = EntityKind::from_byte(r.read_u8()?);
    if !matches!(kind, EntityKind::Node | EntityKind::Edge | EntityKind::Graph) {
        return Err(GraphError::Decode(format!(
            "invalid entity kind {kind:?} in result stream"
        )));
    }
    let id = r.read_i64()?;
    let entity = refs.or_create_shell(id, kind)?;
    read_entity_into(&entity, r, metadata, refs)?;
    Ok(entity)
}
