//! Round-trip verification for externalized-initializer saves.
//!
//! Compares an original model with its rewritten copy: initializer counts,
//! storage locations against the size threshold, byte content (or size
//! monotonicity for prepacked constants), and external offset alignment.

pub mod error;
pub mod verifier;

pub use error::{Result, VerifyError};
pub use verifier::{RoundTripVerifier, VerifyReport, load_save_and_compare, remove_outputs};
