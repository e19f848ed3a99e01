//! JSON graph definition format.
//!
//! The definition mirrors the parts of an ONNX `ModelProto` that initializer
//! storage touches:
//!
//! ```text
//! ModelDefinition
//! ├── ir_version, producer_name, producer_version, metadata_props
//! └── graph: GraphDefinition
//!     ├── nodes: [NodeDefinition]        (opaque to the save engine)
//!     ├── inputs / outputs: [String]
//!     └── initializers: [TensorDefinition]
//!         ├── name, data_type, dims
//!         ├── data_location: DEFAULT | EXTERNAL
//!         ├── raw_data        (DEFAULT only, base64)
//!         └── external_data   (EXTERNAL only: location / offset / length)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::element::ElementType;
use crate::tensor::TensorRecord;

/// External data key naming the data file, relative to the definition's directory.
pub const KEY_LOCATION: &str = "location";
/// External data key holding the decimal byte offset.
pub const KEY_OFFSET: &str = "offset";
/// External data key holding the decimal byte length.
pub const KEY_LENGTH: &str = "length";

/// Where an initializer's bytes currently reside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataLocation {
    /// Bytes embedded in the definition (`raw_data`).
    #[default]
    Default,
    /// Bytes stored in an external data file.
    External,
}

/// Ordered string key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringStringEntry {
    pub key: String,
    pub value: String,
}

impl StringStringEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Resolved external storage of one tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalReference {
    /// Data file name, relative to the definition's directory.
    pub location: String,
    pub offset: u64,
    pub length: u64,
}

impl ExternalReference {
    /// Metadata entries in `location`, `offset`, `length` order.
    pub fn to_entries(&self) -> Vec<StringStringEntry> {
        vec![
            StringStringEntry::new(KEY_LOCATION, self.location.clone()),
            StringStringEntry::new(KEY_OFFSET, self.offset.to_string()),
            StringStringEntry::new(KEY_LENGTH, self.length.to_string()),
        ]
    }

    /// End of the byte range (exclusive), or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }
}

/// One initializer entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDefinition {
    pub name: String,
    pub data_type: ElementType,
    #[serde(default)]
    pub dims: Vec<i64>,
    #[serde(default)]
    pub data_location: DataLocation,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub raw_data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_data: Vec<StringStringEntry>,
}

impl TensorDefinition {
    /// Entry embedding the record's bytes.
    pub fn inline(record: TensorRecord) -> Self {
        let (name, data_type, dims, raw_data) = record.into_parts();
        Self {
            name,
            data_type,
            dims,
            data_location: DataLocation::Default,
            raw_data,
            external_data: Vec::new(),
        }
    }

    /// Entry pointing at `reference`; the record's bytes are not copied.
    pub fn external(record: &TensorRecord, reference: &ExternalReference) -> Self {
        Self {
            name: record.name().to_string(),
            data_type: record.element_type(),
            dims: record.shape().to_vec(),
            data_location: DataLocation::External,
            raw_data: Vec::new(),
            external_data: reference.to_entries(),
        }
    }

    pub fn is_external(&self) -> bool {
        self.data_location == DataLocation::External
    }

    /// Value of the first external data entry named `key`.
    pub fn external_data_entry(&self, key: &str) -> Option<&str> {
        self.external_data.iter().find(|e| e.key == key).map(|e| e.value.as_str())
    }
}

/// Graph node. The save engine passes nodes through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDefinition {
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphDefinition {
    pub name: String,
    pub nodes: Vec<NodeDefinition>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub initializers: Vec<TensorDefinition>,
}

impl GraphDefinition {
    pub fn initializer(&self, name: &str) -> Option<&TensorDefinition> {
        self.initializers.iter().find(|t| t.name == name)
    }
}

/// Top-level definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDefinition {
    pub ir_version: i64,
    pub producer_name: String,
    pub producer_version: String,
    pub graph: GraphDefinition,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata_props: Vec<StringStringEntry>,
}

impl Default for ModelDefinition {
    fn default() -> Self {
        Self {
            ir_version: 9,
            producer_name: String::new(),
            producer_version: String::new(),
            graph: GraphDefinition::default(),
            metadata_props: Vec::new(),
        }
    }
}

/// Serde adapter storing bytes as a standard base64 string, as the ONNX JSON
/// mapping does for `raw_data`.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(D::Error::custom)
    }
}
