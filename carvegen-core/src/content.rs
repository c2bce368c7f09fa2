use crate::error::{CarveError, Result};
use sha2::{Digest, Sha256};
use std::io::Write;

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One persisted piece of a source file, the unit of placement in scatter
/// mode. `offset` stays unset until the sampler places the chunk in the
/// carving image.
#[derive(Clone, Debug)]
pub struct Chunk {
    content: Vec<u8>,
    index: usize,
    filename: String,
    sha256: String,
    offset: Option<u64>,
}

impl Chunk {
    pub fn new(
        content: Vec<u8>,
        index: usize,
        filename: impl Into<String>,
        sha256: impl Into<String>,
    ) -> Self {
        Self {
            content,
            index,
            filename: filename.into(),
            sha256: sha256.into(),
            offset: None,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// 1-based position of this chunk within its file's chunk list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }

    /// Append this chunk's truth-map record. Recording an unplaced chunk
    /// is an error.
    pub fn write_record(&self, w: &mut impl Write) -> Result<()> {
        let offset = self.offset.ok_or_else(|| {
            CarveError::Format(format!(
                "chunk {}_{} has not been placed",
                self.filename, self.index
            ))
        })?;
        writeln!(
            w,
            "{},\t{} B,\t{},\t{},\t{}",
            self.index,
            self.len(),
            offset,
            self.filename,
            self.sha256
        )?;
        Ok(())
    }
}

/// All chunks of one source file, ordered by index. In merge mode this is
/// the unit of placement; its chunks then occupy contiguous offsets.
#[derive(Clone, Debug)]
pub struct ChunksOfFile {
    filename: String,
    chunks: Vec<Chunk>,
}

impl ChunksOfFile {
    pub fn new(filename: impl Into<String>, chunks: Vec<Chunk>) -> Result<Self> {
        let filename = filename.into();
        if chunks.is_empty() {
            return Err(CarveError::Format(format!(
                "file `{filename}` has no chunks"
            )));
        }
        Ok(Self { filename, chunks })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Total size of all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Chunk::is_empty)
    }

    /// Ordered concatenation of all chunk bytes.
    pub fn content(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk.content());
        }
        out
    }

    /// Offset of the first chunk; unset until placement.
    pub fn offset(&self) -> Option<u64> {
        self.chunks.first().and_then(Chunk::offset)
    }

    /// Cascade contiguous offsets through all chunks, starting at `start`.
    pub fn set_offsets(&mut self, start: u64) {
        let mut position = start;
        for chunk in &mut self.chunks {
            chunk.set_offset(position);
            position += chunk.len() as u64;
        }
    }
}
