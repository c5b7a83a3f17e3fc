//! Attribute descriptors: named, typed attribute definitions

use serde::{Deserialize, Serialize};

use crate::model::id_gen;

/// Wire type tags for attribute values. The numeric ids are part of the
/// protocol and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Invalid,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Number,
    String,
    Date,
    Time,
    Timestamp,
    Clob,
    Blob,
}

impl AttributeType {
    pub fn tag(self) -> u8 {
        match self {
            AttributeType::Invalid => 0,
            AttributeType::Boolean => 1,
            AttributeType::Byte => 2,
            AttributeType::Char => 3,
            AttributeType::Short => 4,
            AttributeType::Int => 5,
            AttributeType::Long => 6,
            AttributeType::Float => 7,
            AttributeType::Double => 8,
            AttributeType::Number => 9,
            AttributeType::String => 10,
            AttributeType::Date => 11,
            AttributeType::Time => 12,
            AttributeType::Timestamp => 13,
            AttributeType::Clob => 14,
            AttributeType::Blob => 15,
        }
    }

    /// Unrecognized tags map to `Invalid`; decoding a value with it fails.
    pub fn from_tag(tag: u8) -> AttributeType {
        match tag {
            1 => AttributeType::Boolean,
            2 => AttributeType::Byte,
            3 => AttributeType::Char,
            4 => AttributeType::Short,
            5 => AttributeType::Int,
            6 => AttributeType::Long,
            7 => AttributeType::Float,
            8 => AttributeType::Double,
            9 => AttributeType::Number,
            10 => AttributeType::String,
            11 => AttributeType::Date,
            12 => AttributeType::Time,
            13 => AttributeType::Timestamp,
            14 => AttributeType::Clob,
            15 => AttributeType::Blob,
            _ => AttributeType::Invalid,
        }
    }
}

/// Metadata record describing one named attribute. Owned by the metadata
/// cache; attributes and entity types hold shared references so a commit
/// fixup of the id is observed everywhere at once.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    name: String,
    attr_type: AttributeType,
    /// Negative while the descriptor only exists locally; the commit
    /// response replaces it with the server-assigned id.
    id: i64,
    is_array: bool,
    is_encrypted: bool,
    precision: i16,
    scale: i16,
}

impl AttributeDescriptor {
    /// Create a locally defined descriptor with a fresh temporary id.
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        let (precision, scale) = if attr_type == AttributeType::Number {
            (20, 5)
        } else {
            (0, 0)
        };
        Self {
            name: name.into(),
            attr_type,
            id: id_gen::next_descriptor_id(),
            is_array: false,
            is_encrypted: false,
            precision,
            scale,
        }
    }

    /// Construct a descriptor from server-provided fields.
    pub fn from_server(
        name: impl Into<String>,
        attr_type: AttributeType,
        id: i64,
        is_array: bool,
    ) -> Self {
        Self {
            name: name.into(),
            attr_type,
            id,
            is_array,
            is_encrypted: false,
            precision: 0,
            scale: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr_type(&self) -> AttributeType {
        self.attr_type
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// True until the server has assigned a real id.
    pub fn is_temporary(&self) -> bool {
        self.id < 0
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted
    }

    pub fn precision(&self) -> i16 {
        self.precision
    }

    pub fn scale(&self) -> i16 {
        self.scale
    }

    pub fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    pub fn set_array(&mut self, is_array: bool) {
        self.is_array = is_array;
    }

    pub fn set_precision_and_scale(&mut self, precision: i16, scale: i16) {
        if self.attr_type == AttributeType::Number {
            self.precision = precision;
            self.scale = scale;
        }
    }

    /// Overwrite local fields with a server record of the same name,
    /// keeping the allocation (and thus every outstanding reference) alive.
    pub fn update_from(&mut self, other: &AttributeDescriptor) {
        self.attr_type = other.attr_type;
        self.id = other.id;
        self.is_array = other.is_array;
        self.is_encrypted = other.is_encrypted;
        if other.attr_type == AttributeType::Number {
            self.precision = other.precision;
            self.scale = other.scale;
        }
    }
}
