//! Incremental request body buffering.

use bytes::{Bytes, BytesMut};

use crate::error::HookError;

/// Buffers body chunks as they stream in.
///
/// Chunks are kept as received and concatenated once in [`finish`]. Once the
/// accumulator has failed, further chunks are dropped silently.
///
/// [`finish`]: BodyAccumulator::finish
#[derive(Debug, Default)]
pub struct BodyAccumulator {
    chunks: Vec<Bytes>,
    len: usize,
    limit: Option<usize>,
    failed: bool,
}

impl BodyAccumulator {
    /// Create an accumulator; `None` means no size limit.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Append a chunk.
    ///
    /// Fails with [`HookError::PayloadTooLarge`] when the chunk pushes the body
    /// past the limit; the accumulator is then marked failed.
    pub fn push(&mut self, chunk: Bytes) -> Result<(), HookError> {
        if self.failed {
            return Ok(());
        }

        let len = self.len + chunk.len();
        if let Some(limit) = self.limit {
            if len > limit {
                self.fail();
                return Err(HookError::PayloadTooLarge { limit });
            }
        }

        self.len = len;
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
        Ok(())
    }

    /// Stop buffering and release anything collected so far.
    pub fn fail(&mut self) {
        self.failed = true;
        self.chunks.clear();
        self.len = 0;
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Concatenate the chunks and decode them as UTF-8, replacing invalid sequences.
    pub fn finish(self) -> String {
        match self.chunks.as_slice() {
            [] => String::new(),
            [single] => String::from_utf8_lossy(single).into_owned(),
            chunks => {
                let mut buffer = BytesMut::with_capacity(self.len);
                for chunk in chunks {
                    buffer.extend_from_slice(chunk);
                }
                String::from_utf8_lossy(&buffer).into_owned()
            }
        }
    }
}
