//! Owned initializer tensor records.

use crate::element::ElementType;
use crate::error::{GraphLoadError, Result};

/// One initializer's raw bytes, element type, and shape.
///
/// Records are immutable once constructed: the byte length always equals
/// `element_count(shape) * element_type.element_size()`. A record has exactly
/// one owner at a time and moves through the save pipeline by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorRecord {
    name: String,
    element_type: ElementType,
    shape: Vec<i64>,
    bytes: Vec<u8>,
}

impl TensorRecord {
    /// Build a record, validating that `bytes` covers the shape exactly.
    pub fn new(
        name: impl Into<String>,
        element_type: ElementType,
        shape: Vec<i64>,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        let name = name.into();
        let expected = expected_byte_len(&name, element_type, &shape)?;
        if bytes.len() as u64 != expected {
            return Err(GraphLoadError::invalid_tensor(
                &name,
                format!(
                    "{} bytes do not match shape {:?} of {} ({} bytes expected)",
                    bytes.len(),
                    shape,
                    element_type,
                    expected
                ),
            ));
        }
        Ok(Self { name, element_type, shape, bytes })
    }

    /// Build a zero-filled record of the given shape.
    pub fn zeroed(
        name: impl Into<String>,
        element_type: ElementType,
        shape: Vec<i64>,
    ) -> Result<Self> {
        let name = name.into();
        let len = expected_byte_len(&name, element_type, &shape)?;
        let len = usize::try_from(len).map_err(|_| {
            GraphLoadError::invalid_tensor(&name, format!("{len} bytes do not fit in memory"))
        })?;
        Ok(Self { name, element_type, shape, bytes: vec![0u8; len] })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Serialized byte length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Same tensor under a different name.
    #[must_use]
    pub fn renamed(self, name: impl Into<String>) -> Self {
        Self { name: name.into(), ..self }
    }

    /// Split into `(name, element_type, shape, bytes)`.
    pub fn into_parts(self) -> (String, ElementType, Vec<i64>, Vec<u8>) {
        (self.name, self.element_type, self.shape, self.bytes)
    }
}

/// Number of elements described by `shape`, or `None` on a negative
/// dimension or overflow. The empty shape is a scalar with one element.
pub fn element_count(shape: &[i64]) -> Option<u64> {
    shape.iter().try_fold(1u64, |acc, &d| {
        let d = u64::try_from(d).ok()?;
        acc.checked_mul(d)
    })
}

fn expected_byte_len(name: &str, element_type: ElementType, shape: &[i64]) -> Result<u64> {
    element_count(shape)
        .and_then(|n| n.checked_mul(element_type.element_size() as u64))
        .ok_or_else(|| {
            GraphLoadError::invalid_tensor(name, format!("invalid or overflowing shape {shape:?}"))
        })
}
