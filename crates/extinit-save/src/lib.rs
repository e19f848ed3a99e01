//! Externalized-initializer serialization.
//!
//! Saves a [`Model`](extinit_graph::Model) as a JSON definition plus one
//! external data file. Initializers at or above a byte-size threshold move to
//! the data file (optionally at aligned offsets); smaller ones stay inline.
//! Kernel-specific prepacked variants can replace originals on the way out.
//!
//! # Pipeline
//!
//! ```text
//! Model ──► records ──► PrepackTable::substitute ──► classify ──┬─► inline ─────────────┐
//!            (par)           (par)                    (par)     └─► ExternalDataWriter ─┤
//!                                                                   (sequential)        ▼
//!                                                                           definition + data file
//! ```
//!
//! # Example
//!
//! ```no_run
//! use extinit_graph::Model;
//! use extinit_save::{OffsetAlignmentInfo, SaveOptions, save_with_external_initializers};
//!
//! let model = Model::load("model.json").unwrap();
//! let options = SaveOptions {
//!     size_threshold: 1024,
//!     alignment: OffsetAlignmentInfo::aligned(4096),
//!     save_prepacked_as_constants: false,
//! };
//! let summary =
//!     save_with_external_initializers(&model, "out/model.json", "model.bin", &options, None)
//!         .unwrap();
//! println!("{} external, {} inline", summary.external, summary.inline);
//! ```

pub mod alignment;
pub mod classify;
pub mod config;
pub mod error;
pub mod prepack;
pub mod serializer;
pub mod writer;

pub use alignment::{OffsetAlignmentInfo, next_offset, round_up};
pub use classify::{Placement, StorageReference, classify};
pub use config::{ConfigError, SaveConfig, SaveOptions};
pub use error::{Result, SerializationError};
pub use prepack::{PrepackTable, base_name, composite_name};
pub use serializer::{ModelSerializer, SaveSummary, save_with_external_initializers};
pub use writer::ExternalDataWriter;
