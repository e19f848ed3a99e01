//! Sequential writer for the external data file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use extinit_graph::{ExternalReference, TensorRecord};
use tracing::{debug, trace};

use crate::alignment::{OffsetAlignmentInfo, next_offset};
use crate::error::{Result, SerializationError};

const ZEROS: [u8; 4096] = [0; 4096];

/// Appends tensor bytes to one external data file.
///
/// The writer owns the offset cursor: every reference it returns was reserved
/// and written in the same `&mut self` call, so offsets never overlap and
/// never decrease. Padding inserted for alignment is zero-filled.
#[derive(Debug)]
pub struct ExternalDataWriter<W: Write> {
    sink: W,
    path: PathBuf,
    location: String,
    cursor: u64,
    padding: u64,
    tensors: usize,
}

impl ExternalDataWriter<BufWriter<File>> {
    /// Create (or truncate) the file at `path`. `location` is the name
    /// recorded in references, relative to the definition file.
    pub fn create(path: impl AsRef<Path>, location: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SerializationError::io(path, e))?;
        Ok(Self::new(BufWriter::new(file), path, location))
    }

    /// Flush and sync the file to disk. Returns the file length.
    pub fn finish(self) -> Result<u64> {
        let Self { sink, path, cursor, padding, tensors, .. } = self;
        let file = sink.into_inner().map_err(|e| SerializationError::io(&path, e.into_error()))?;
        file.sync_all().map_err(|e| SerializationError::io(&path, e))?;
        debug!(
            "Closed {} ({} tensors, {} bytes, {} padding)",
            path.display(),
            tensors,
            cursor,
            padding
        );
        Ok(cursor)
    }
}

impl<W: Write> ExternalDataWriter<W> {
    /// Wrap an arbitrary sink. `path` is only used in error messages.
    pub fn new(sink: W, path: impl Into<PathBuf>, location: impl Into<String>) -> Self {
        Self { sink, path: path.into(), location: location.into(), cursor: 0, padding: 0, tensors: 0 }
    }

    /// Append `record`, padding first if `policy` requires an aligned offset.
    pub fn write(
        &mut self,
        record: &TensorRecord,
        policy: &OffsetAlignmentInfo,
    ) -> Result<ExternalReference> {
        let length = record.byte_len();
        let (offset, end) = next_offset(self.cursor, length, policy).ok_or_else(|| {
            SerializationError::OffsetOverflow {
                name: record.name().to_string(),
                offset: self.cursor,
                length,
            }
        })?;

        let gap = offset - self.cursor;
        self.write_padding(gap)?;
        self.sink.write_all(record.bytes()).map_err(|e| SerializationError::io(&self.path, e))?;

        self.cursor = end;
        self.padding += gap;
        self.tensors += 1;
        trace!("{} -> {}@{}+{} (pad {})", record.name(), self.location, offset, length, gap);

        Ok(ExternalReference { location: self.location.clone(), offset, length })
    }

    fn write_padding(&mut self, mut remaining: u64) -> Result<()> {
        while remaining > 0 {
            let chunk = remaining.min(ZEROS.len() as u64) as usize;
            self.sink
                .write_all(&ZEROS[..chunk])
                .map_err(|e| SerializationError::io(&self.path, e))?;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Bytes written so far, padding included.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn padding_written(&self) -> u64 {
        self.padding
    }

    pub fn tensors_written(&self) -> usize {
        self.tensors
    }

    /// Flush and return the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.sink.flush().map_err(|e| SerializationError::io(&self.path, e))?;
        Ok(self.sink)
    }
}
