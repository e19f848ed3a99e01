//! Graph definition format and tensor records for extinit.
//!
//! This crate owns everything the save engine treats as a collaborator:
//!
//! - the JSON definition format ([`ModelDefinition`] and friends), modelled on
//!   the subset of an ONNX `ModelProto` that matters for initializer storage
//! - [`TensorRecord`], the owned in-memory form of one initializer
//! - [`Model`], the loader that parses a definition and reconstructs
//!   initializer bytes from inline data or from an external data file
//!
//! # Example
//!
//! ```no_run
//! use extinit_graph::Model;
//!
//! let model = Model::load("model.json").unwrap();
//! for record in model.initializer_records().unwrap() {
//!     println!("{}: {:?} ({} bytes)", record.name(), record.shape(), record.len());
//! }
//! ```

pub mod definition;
pub mod element;
pub mod error;
#[cfg(feature = "fixtures")]
pub mod fixtures;
pub mod model;
pub mod tensor;

pub use definition::{
    DataLocation, ExternalReference, GraphDefinition, ModelDefinition, NodeDefinition,
    StringStringEntry, TensorDefinition, KEY_LENGTH, KEY_LOCATION, KEY_OFFSET,
};
pub use element::ElementType;
pub use error::{GraphLoadError, Result};
pub use model::{Model, unpack_initializer_data};
pub use tensor::TensorRecord;
