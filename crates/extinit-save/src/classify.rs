//! Inline-versus-external classification.

use std::fmt;

use extinit_graph::{DataLocation, ExternalReference};

/// Where a tensor's bytes will be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Inline,
    External,
}

impl Placement {
    pub const fn data_location(self) -> DataLocation {
        match self {
            Self::Inline => DataLocation::Default,
            Self::External => DataLocation::External,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Classify a tensor of `len` bytes against `threshold`.
///
/// `len < threshold` stays inline; everything else is externalized. A zero
/// threshold therefore externalizes empty tensors too.
#[inline]
pub const fn classify(len: u64, threshold: u64) -> Placement {
    if len < threshold { Placement::Inline } else { Placement::External }
}

/// Storage decided for one output initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageReference {
    Inline,
    External(ExternalReference),
}

impl StorageReference {
    pub fn placement(&self) -> Placement {
        match self {
            Self::Inline => Placement::Inline,
            Self::External(_) => Placement::External,
        }
    }

    pub fn external(&self) -> Option<&ExternalReference> {
        match self {
            Self::External(r) => Some(r),
            Self::Inline => None,
        }
    }
}
