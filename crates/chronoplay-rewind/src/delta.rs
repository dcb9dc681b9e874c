//! XOR patches between two equally sized frames, compressed with LZ4.
//!
//! For two frames `a` and `b`, the patch is `lz4(a ^ b)`. Applying it to
//! either frame yields the other one, so a single patch serves both rewinding
//! and advancing. Consecutive engine states usually differ in a handful of
//! bytes, which leaves the XOR mostly zero and makes it compress very well.
//!
//! The codec owns its scratch buffers. After construction, encoding and
//! applying a patch only allocate when a destination `Vec` has to grow.

use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    #[error("frame is {actual} bytes, codec expects {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("failed to compress patch: {0}")]
    Compress(String),

    #[error("failed to decompress patch: {0}")]
    Decompress(String),

    #[error("patch expands to {actual} bytes, frame is {expected}")]
    PatchSize { expected: usize, actual: usize },
}

pub(crate) struct DeltaCodec {
    frame_size: usize,
    /// Uncompressed XOR of the two frames.
    xor: Vec<u8>,
    /// Worst-case LZ4 output for one frame.
    compressed: Vec<u8>,
}

impl DeltaCodec {
    pub(crate) fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            xor: vec![0; frame_size],
            compressed: vec![0; get_maximum_output_size(frame_size)],
        }
    }

    /// Writes the patch linking `a` and `b` into `out`, replacing its contents.
    pub(crate) fn encode(&mut self, a: &[u8], b: &[u8], out: &mut Vec<u8>) -> Result<(), DeltaError> {
        self.check_len(a.len())?;
        self.check_len(b.len())?;

        for ((x, a), b) in self.xor.iter_mut().zip(a).zip(b) {
            *x = a ^ b;
        }

        let written = compress_into(&self.xor, &mut self.compressed)
            .map_err(|e| DeltaError::Compress(e.to_string()))?;

        out.clear();
        out.extend_from_slice(&self.compressed[..written]);
        Ok(())
    }

    /// Applies `patch` to `frame` in place, turning one end of the patch into
    /// the other.
    pub(crate) fn apply(&mut self, patch: &[u8], frame: &mut [u8]) -> Result<(), DeltaError> {
        self.check_len(frame.len())?;

        let written = decompress_into(patch, &mut self.xor)
            .map_err(|e| DeltaError::Decompress(e.to_string()))?;
        if written != self.frame_size {
            return Err(DeltaError::PatchSize {
                expected: self.frame_size,
                actual: written,
            });
        }

        for (b, x) in frame.iter_mut().zip(&self.xor) {
            *b ^= *x;
        }
        Ok(())
    }

    fn check_len(&self, actual: usize) -> Result<(), DeltaError> {
        if actual != self.frame_size {
            return Err(DeltaError::FrameSize {
                expected: self.frame_size,
                actual,
            });
        }
        Ok(())
    }
}
