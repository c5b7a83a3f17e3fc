//! Logical connection: entity lifecycle, commit, fetch and query

use std::cell::{Ref, RefCell};
use std::sync::Mutex;

use tracing::debug;

use crate::channel::Channel;
use crate::config::ConnectionConfig;
use crate::error::{GraphError, Result};
use crate::model::descriptor::AttributeType;
use crate::model::metadata::GraphMetadata;
use crate::model::value::Value;
use crate::model::{id_gen, EntityRef};
use crate::pdu::request::{self, EntityKey, FetchCommand, QueryCommand};
use crate::pdu::{expect_verb, read_header, response, RequestContext, Verb};
use crate::result::{materialize_entities, materialize_single, ResultSet};
use crate::txn::{TransactionBuffer, TxnState};
use crate::wire::reader::WireReader;

/// Administrative commands. The wire protocol reserves verbs for these but
/// the client-side payloads were never implemented; invoking one reports
/// that honestly instead of sending an empty request.
#[derive(Debug, Clone)]
pub enum AdminCommand {
    CreateUser { name: String },
    CreateAttributeDescriptor { name: String, attr_type: AttributeType },
    CreateIndex { name: String },
}

/// A logical connection to the database. Entity mutations accumulate in the
/// transaction buffer until `commit` ships them as one atomic unit and
/// reconciles the server's ids and versions back into the local objects.
///
/// Whole logical operations, including their request/response round trip,
/// are serialized through a coarse admin lock: one operation at a time per
/// connection, never a half-applied commit.
pub struct Connection {
    channel: RefCell<Box<dyn Channel>>,
    config: ConnectionConfig,
    metadata: RefCell<GraphMetadata>,
    txn: RefCell<TransactionBuffer>,
    admin_lock: Mutex<()>,
}

impl Connection {
    pub fn new(channel: Box<dyn Channel>, config: ConnectionConfig) -> Self {
        Self {
            channel: RefCell::new(channel),
            config,
            metadata: RefCell::new(GraphMetadata::new()),
            txn: RefCell::new(TransactionBuffer::new()),
            admin_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn metadata(&self) -> Ref<'_, GraphMetadata> {
        self.metadata.borrow()
    }

    pub fn txn_state(&self) -> TxnState {
        self.txn.borrow().state()
    }

    fn ctx(&self) -> RequestContext {
        let channel = self.channel.borrow();
        RequestContext {
            request_id: id_gen::next_request_id(),
            auth_token: channel.auth_token(),
            session_id: channel.session_id(),
        }
    }

    fn exchange(&self, frame: Vec<u8>, request_id: i64) -> Result<Vec<u8>> {
        self.channel.borrow_mut().send_request(frame, request_id)
    }

    // === Entity lifecycle ===

    /// Set a named attribute, resolving or synthesizing its descriptor
    /// through this connection's metadata cache.
    pub fn set_attribute(&self, entity: &EntityRef, name: &str, value: Option<Value>) -> Result<()> {
        entity
            .borrow_mut()
            .set_attribute(&mut self.metadata.borrow_mut(), name, value)
    }

    pub fn insert_entity(&self, entity: &EntityRef) {
        debug!(id = entity.borrow().key_id(), "entity inserted");
        self.txn.borrow_mut().insert_entity(entity);
    }

    pub fn update_entity(&self, entity: &EntityRef) {
        debug!(id = entity.borrow().key_id(), "entity updated");
        self.txn.borrow_mut().update_entity(entity);
    }

    pub fn delete_entity(&self, entity: &EntityRef) {
        debug!(id = entity.borrow().key_id(), "entity deleted");
        self.txn.borrow_mut().delete_entity(entity);
    }

    // === Transaction ===

    /// Ship the pending change set and apply the server's fixups. On any
    /// failure, transport or server-reported, the buffers are left exactly
    /// as they were so the caller can retry, adjust or roll back.
    pub fn commit(&self) -> Result<()> {
        let _guard = self.admin_lock.lock().unwrap();
        let mut txn = self.txn.borrow_mut();

        txn.cascade_endpoints();
        let new_descriptors = self.metadata.borrow().new_descriptors();
        let ctx = self.ctx();
        let frame = request::commit_request(
            &ctx,
            &txn.added().values(),
            &txn.changed().values(),
            &txn.removed().values(),
            &new_descriptors,
        )?;

        txn.begin_commit();
        let outcome = (|| {
            let reply = self.exchange(frame, ctx.request_id)?;
            let mut r = WireReader::new(&reply);
            let header = read_header(&mut r)?;
            expect_verb(&header, Verb::CommitTransactionResponse, &mut r)?;
            response::parse_commit_response(&mut r)
        })();

        match outcome {
            Ok(commit_response) => {
                txn.apply_fixups(&commit_response, &new_descriptors);
                debug!("commit completed");
                Ok(())
            }
            Err(err) => {
                txn.abort_commit();
                Err(err)
            }
        }
    }

    /// Discard the pending change set without contacting the server.
    pub fn rollback(&self) {
        let _guard = self.admin_lock.lock().unwrap();
        self.txn.borrow_mut().rollback();
    }

    // === Metadata ===

    /// Fetch the server's metadata catalog and merge it into the cache.
    pub fn refresh_metadata(&self) -> Result<()> {
        let _guard = self.admin_lock.lock().unwrap();
        let ctx = self.ctx();
        let frame = request::metadata_request(&ctx);
        let reply = self.exchange(frame, ctx.request_id)?;
        let mut r = WireReader::new(&reply);
        let header = read_header(&mut r)?;
        expect_verb(&header, Verb::MetadataResponse, &mut r)?;
        let payload = response::parse_metadata_response(&mut r)?;
        self.metadata.borrow_mut().merge_from_server(
            payload.descriptors,
            payload.node_types,
            payload.edge_types,
        );
        Ok(())
    }

    fn ensure_metadata(&self) -> Result<()> {
        if self.metadata.borrow().is_initialized() {
            return Ok(());
        }
        self.refresh_metadata()
    }

    // === Fetch and query ===

    /// Fetch one entity by key, together with whatever related entities the
    /// server chooses to send along.
    pub fn get_entity(&self, key: &EntityKey) -> Result<Option<EntityRef>> {
        self.ensure_metadata()?;
        let _guard = self.admin_lock.lock().unwrap();
        let ctx = self.ctx();
        let frame = request::get_entity_request(&ctx, key, FetchCommand::Single, &self.config)?;
        let reply = self.exchange(frame, ctx.request_id)?;
        let mut r = WireReader::new(&reply);
        let header = read_header(&mut r)?;
        expect_verb(&header, Verb::GetEntityResponse, &mut r)?;
        let head = response::parse_get_entity_head(&mut r)?;
        if !head.has_result {
            return Ok(None);
        }
        materialize_single(&mut r, &self.metadata.borrow())
    }

    /// Fetch every entity matching a key, preserving server ordering.
    pub fn get_entities(&self, key: &EntityKey) -> Result<ResultSet> {
        self.ensure_metadata()?;
        let _guard = self.admin_lock.lock().unwrap();
        let ctx = self.ctx();
        let frame = request::get_entity_request(&ctx, key, FetchCommand::Multiple, &self.config)?;
        let reply = self.exchange(frame, ctx.request_id)?;
        let mut r = WireReader::new(&reply);
        let header = read_header(&mut r)?;
        expect_verb(&header, Verb::GetEntityResponse, &mut r)?;
        let head = response::parse_get_entity_head(&mut r)?;
        if !head.has_result {
            return Ok(ResultSet::new(head.result_id));
        }
        let total = r.read_i32()?;
        let _result_count = r.read_i32()?;
        materialize_entities(&mut r, &self.metadata.borrow(), total, head.result_id)
    }

    /// Execute a query expression server-side. The expression is opaque to
    /// this client; no parsing happens here.
    pub fn execute_query(&self, expr: &str) -> Result<ResultSet> {
        self.ensure_metadata()?;
        let _guard = self.admin_lock.lock().unwrap();
        let ctx = self.ctx();
        let frame =
            request::query_request(&ctx, &self.config, QueryCommand::Execute, Some(expr), None)?;
        let reply = self.exchange(frame, ctx.request_id)?;
        let mut r = WireReader::new(&reply);
        let header = read_header(&mut r)?;
        expect_verb(&header, Verb::QueryResponse, &mut r)?;
        let head = response::parse_query_head(&mut r)?;
        if head.result_count <= 0 {
            return Ok(ResultSet::new(0));
        }
        materialize_entities(&mut r, &self.metadata.borrow(), head.total_count, 0)
    }

    /// Compile a query server-side and return its hash id for later
    /// execution.
    pub fn create_query(&self, expr: &str) -> Result<i64> {
        self.ensure_metadata()?;
        let _guard = self.admin_lock.lock().unwrap();
        let ctx = self.ctx();
        let frame =
            request::query_request(&ctx, &self.config, QueryCommand::Create, Some(expr), None)?;
        let reply = self.exchange(frame, ctx.request_id)?;
        let mut r = WireReader::new(&reply);
        let header = read_header(&mut r)?;
        expect_verb(&header, Verb::QueryResponse, &mut r)?;
        let head = response::parse_query_head(&mut r)?;
        Ok(head.query_hash_id)
    }

    /// Execute a previously compiled query by its hash id.
    pub fn execute_prepared_query(&self, query_hash_id: i64) -> Result<ResultSet> {
        self.ensure_metadata()?;
        let _guard = self.admin_lock.lock().unwrap();
        let ctx = self.ctx();
        let frame = request::query_request(
            &ctx,
            &self.config,
            QueryCommand::ExecuteId,
            None,
            Some(query_hash_id),
        )?;
        let reply = self.exchange(frame, ctx.request_id)?;
        let mut r = WireReader::new(&reply);
        let header = read_header(&mut r)?;
        expect_verb(&header, Verb::QueryResponse, &mut r)?;
        let head = response::parse_query_head(&mut r)?;
        if head.result_count <= 0 {
            return Ok(ResultSet::new(0));
        }
        materialize_entities(&mut r, &self.metadata.borrow(), head.total_count, 0)
    }

    /// Release a compiled query server-side.
    pub fn close_query(&self, query_hash_id: i64) -> Result<()> {
        let _guard = self.admin_lock.lock().unwrap();
        let ctx = self.ctx();
        let frame = request::query_request(
            &ctx,
            &self.config,
            QueryCommand::Close,
            None,
            Some(query_hash_id),
        )?;
        let reply = self.exchange(frame, ctx.request_id)?;
        let mut r = WireReader::new(&reply);
        let header = read_header(&mut r)?;
        expect_verb(&header, Verb::QueryResponse, &mut r)?;
        response::parse_query_head(&mut r)?;
        Ok(())
    }

    // === Administration ===

    /// Admin command payloads are not implemented client-side; surfaced as
    /// an explicit error rather than a silently empty request.
    pub fn execute_admin(&self, command: &AdminCommand) -> Result<()> {
        let name = match command {
            AdminCommand::CreateUser { .. } => "create user",
            AdminCommand::CreateAttributeDescriptor { .. } => "create attribute descriptor",
            AdminCommand::CreateIndex { .. } => "create index",
        };
        Err(GraphError::NotSupported(format!(
            "{name} is not implemented by this client"
        )))
    }

    /// Tear down the underlying transport.
    pub fn disconnect(&self) {
        let mut channel = self.channel.borrow_mut();
        let _ = channel.disconnect();
        channel.stop();
    }
}
