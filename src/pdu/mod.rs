//! Message envelope framing and the verb dispatch table

pub mod request;
pub mod response;

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::error::{GraphError, Result, TransactionFailure};
use crate::wire::reader::WireReader;
use crate::wire::writer::WireWriter;

/// Fixed envelope header size; also the payload data offset.
pub const HEADER_SIZE: i16 = 50;

/// Commit stream section opcodes.
pub const OP_ATTR_DESCRIPTORS: i16 = 0x1010;
pub const OP_ADDED_ENTITIES: i16 = 0x1011;
pub const OP_UPDATED_ENTITIES: i16 = 0x1012;
pub const OP_REMOVED_ENTITIES: i16 = 0x1013;
pub const OP_DEBUG_ENTITIES: i16 = 0x6789;

/// Protocol verbs. The numeric ids are fixed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Ping,
    HandshakeRequest,
    HandshakeResponse,
    AuthenticateRequest,
    AuthenticateResponse,
    BeginTransactionRequest,
    BeginTransactionResponse,
    CommitTransactionRequest,
    CommitTransactionResponse,
    RollbackTransactionRequest,
    RollbackTransactionResponse,
    QueryRequest,
    QueryResponse,
    TraverseRequest,
    TraverseResponse,
    MetadataRequest,
    MetadataResponse,
    GetEntityRequest,
    GetEntityResponse,
    GetLargeObjectRequest,
    GetLargeObjectResponse,
    DisconnectChannelRequest,
    SessionForcefullyTerminated,
    ExceptionMessage,
    Invalid,
}

impl Verb {
    pub fn id(self) -> i32 {
        match self {
            Verb::Ping => 0,
            Verb::HandshakeRequest => 1,
            Verb::HandshakeResponse => 2,
            Verb::AuthenticateRequest => 3,
            Verb::AuthenticateResponse => 4,
            Verb::BeginTransactionRequest => 5,
            Verb::BeginTransactionResponse => 6,
            Verb::CommitTransactionRequest => 7,
            Verb::CommitTransactionResponse => 8,
            Verb::RollbackTransactionRequest => 9,
            Verb::RollbackTransactionResponse => 10,
            Verb::QueryRequest => 11,
            Verb::QueryResponse => 12,
            Verb::TraverseRequest => 13,
            Verb::TraverseResponse => 14,
            Verb::MetadataRequest => 19,
            Verb::MetadataResponse => 20,
            Verb::GetEntityRequest => 21,
            Verb::GetEntityResponse => 22,
            Verb::GetLargeObjectRequest => 23,
            Verb::GetLargeObjectResponse => 24,
            Verb::DisconnectChannelRequest => 40,
            Verb::SessionForcefullyTerminated => 41,
            Verb::ExceptionMessage => 100,
            Verb::Invalid => -1,
        }
    }

    pub fn from_id(id: i32) -> Verb {
        match id {
            0 => Verb::Ping,
            1 => Verb::HandshakeRequest,
            2 => Verb::HandshakeResponse,
            3 => Verb::AuthenticateRequest,
            4 => Verb::AuthenticateResponse,
            5 => Verb::BeginTransactionRequest,
            6 => Verb::BeginTransactionResponse,
            7 => Verb::CommitTransactionRequest,
            8 => Verb::CommitTransactionResponse,
            9 => Verb::RollbackTransactionRequest,
            10 => Verb::RollbackTransactionResponse,
            11 => Verb::QueryRequest,
            12 => Verb::QueryResponse,
            13 => Verb::TraverseRequest,
            14 => Verb::TraverseResponse,
            19 => Verb::MetadataRequest,
            20 => Verb::MetadataResponse,
            21 => Verb::GetEntityRequest,
            22 => Verb::GetEntityResponse,
            23 => Verb::GetLargeObjectRequest,
            24 => Verb::GetLargeObjectResponse,
            40 => Verb::DisconnectChannelRequest,
            41 => Verb::SessionForcefullyTerminated,
            100 => Verb::ExceptionMessage,
            _ => Verb::Invalid,
        }
    }
}

/// Identity fields stamped into every request header.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub request_id: i64,
    pub auth_token: i64,
    pub session_id: i64,
}

/// Decoded envelope header of an inbound message.
#[derive(Debug, Clone, Copy)]
pub struct MessageHeader {
    pub verb: Verb,
    pub sequence_no: i64,
    pub timestamp: i64,
    pub request_id: i64,
    pub data_offset: i16,
    pub auth_token: i64,
    pub session_id: i64,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Write the envelope header with a zero frame-length placeholder. The
/// payload follows; `finish_frame` patches the true length.
pub fn begin_frame(w: &mut WireWriter, verb: Verb, ctx: &RequestContext) {
    w.reserve_i32();
    w.write_i32(verb.id());
    w.write_i64(crate::model::id_gen::next_sequence_no());
    w.write_i64(now_millis());
    w.write_i64(ctx.request_id);
    w.write_i16(HEADER_SIZE);
    w.write_i64(ctx.auth_token);
    w.write_i64(ctx.session_id);
}

/// Patch the self-inclusive frame length and yield the finished frame.
pub fn finish_frame(mut w: WireWriter) -> Vec<u8> {
    let len = w.position() as i32;
    w.patch_i32_at(0, len);
    w.into_bytes()
}

/// Decode and validate the envelope header of a received frame. The reader
/// must cover exactly one frame.
pub fn read_header(r: &mut WireReader) -> Result<MessageHeader> {
    let total = r.remaining();
    let frame_len = r.read_i32()?;
    if frame_len as usize != total {
        return Err(GraphError::Decode(format!(
            "frame length {frame_len} does not match the {total} bytes received"
        )));
    }
    let verb = Verb::from_id(r.read_i32()?);
    let sequence_no = r.read_i64()?;
    let timestamp = r.read_i64()?;
    let request_id = r.read_i64()?;
    let data_offset = r.read_i16()?;
    let auth_token = r.read_i64()?;
    let session_id = r.read_i64()?;
    Ok(MessageHeader {
        verb,
        sequence_no,
        timestamp,
        request_id,
        data_offset,
        auth_token,
        session_id,
    })
}

/// Check that a response carries the expected verb. A server-side
/// `ExceptionMessage` aborts the operation with its reported failure.
pub fn expect_verb(header: &MessageHeader, expected: Verb, r: &mut WireReader) -> Result<()> {
    if header.verb == expected {
        return Ok(());
    }
    if header.verb == Verb::ExceptionMessage {
        let _kind = r.read_u8()?;
        let message = r.read_string().unwrap_or_default();
        warn!(message = %message, "server reported an exception");
        return Err(GraphError::Transaction(TransactionFailure::GeneralError));
    }
    Err(GraphError::Decode(format!(
        "expected {expected:?} but received {:?}",
        header.verb
    )))
}
