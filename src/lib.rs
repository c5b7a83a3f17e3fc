//! graphlink - property-graph database client driver
//!
//! # Architecture
//!
//! - **Entity model**: nodes, edges and graphs with typed, dirty-tracked
//!   attributes; virtual (negative) ids until the server assigns real ones
//! - **Metadata cache**: attribute descriptors and node/edge types by name
//!   and id, merged additively from server pushes
//! - **Binary codec**: big-endian wire format with a per-response reference
//!   map reconstructing shared and cyclic object graphs without duplication
//! - **Transaction buffer**: added/changed/removed sets with cascading
//!   edge-endpoint inclusion and post-commit id/version fixup
//! - **Envelope framing**: fixed header plus verb-specific payloads, frame
//!   lengths patched in after serialization
//!
//! # Usage example
//!
//! ```no_run
//! use graphlink::{Connection, ConnectionConfig, Entity, Value};
//! use graphlink::model::Direction;
//! # fn connect_channel() -> Box<dyn graphlink::Channel> { unimplemented!() }
//!
//! # fn main() -> graphlink::Result<()> {
//! let conn = Connection::new(connect_channel(), ConnectionConfig::default());
//!
//! let alice = Entity::new_node(None);
//! conn.set_attribute(&alice, "name", Some(Value::String("alice".into())))?;
//! let bob = Entity::new_node(None);
//! conn.set_attribute(&bob, "name", Some(Value::String("bob".into())))?;
//! let knows = Entity::new_edge(&alice, &bob, Direction::Directed, None);
//!
//! conn.insert_entity(&alice);
//! conn.insert_entity(&bob);
//! conn.insert_entity(&knows);
//! conn.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod pdu;
pub mod result;
pub mod txn;
pub mod wire;

pub use channel::Channel;
pub use config::ConnectionConfig;
pub use connection::{AdminCommand, Connection};
pub use error::{GraphError, Result, TransactionFailure};
pub use model::{
    AttributeDescriptor, AttributeType, Entity, EntityKind, EntityRef, GraphMetadata, Value,
};
pub use pdu::request::EntityKey;
pub use result::ResultSet;
