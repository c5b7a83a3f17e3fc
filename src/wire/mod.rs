//! Binary wire codec: stream primitives and entity/type encoders

pub mod entity_codec;
pub mod reader;
pub mod type_codec;
pub mod writer;

pub use entity_codec::{read_entity_into, write_entity, ReferenceMap};
pub use reader::WireReader;
pub use writer::WireWriter;
