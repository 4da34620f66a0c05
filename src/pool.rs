use crate::error::{CliError, Phase};

/// A readable or writable window into pool memory, returned by the
/// `*_window` accessors below. The slice's lifetime is tied to the pool's
/// own borrow, so a scan or read/write must finish before the next pool
/// mutation — there is no raw pointer escaping the pool as there is in the
/// reference implementation's `sink_pointer`.
pub type Window<'a> = &'a [u8];
pub type WindowMut<'a> = &'a mut [u8];

/// A growable ring of fixed-size chunks addressed by absolute stream offset.
///
/// Chunk `i` covers byte range `[i*chunk_size, (i+1)*chunk_size)`. A chunk
/// exists (`Some`) iff it has been allocated and not yet reclaimed; the
/// index array itself grows by doubling, since a slow sink can force the
/// pool to lag the reader by an unbounded number of chunks.
pub struct BufferPool {
    chunk_size: usize,
    chunks: Vec<Option<Box<[u8]>>>,
    /// Index of the first chunk not yet reclaimed; `reclaim` only ever
    /// moves this forward, making repeated calls with a stale watermark
    /// cheap no-ops.
    pool_begin: usize,
}

impl BufferPool {
    pub fn new(chunk_size: usize) -> Self {
        BufferPool { chunk_size, chunks: Vec::new(), pool_begin: 0 }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn chunk_index(&self, pos: u64) -> usize {
        (pos / self.chunk_size as u64) as usize
    }

    fn chunk_offset(&self, pos: u64) -> usize {
        (pos % self.chunk_size as u64) as usize
    }

    /// Ensure chunks `[pool_begin.., index]` exist, growing the index array
    /// by doubling as needed. Mirrors `memory_allocate` in the reference:
    /// one doubling iteration suffices for any single call since offsets
    /// advance by at most one chunk per read.
    fn ensure_allocated(&mut self, index: usize) -> Result<(), CliError> {
        if index < self.chunks.len() && self.chunks[index].is_some() {
            return Ok(());
        }
        let mut capacity = self.chunks.len().max(1);
        while index >= capacity {
            capacity *= 2;
        }
        if capacity > self.chunks.len() {
            self.chunks
                .try_reserve(capacity - self.chunks.len())
                .map_err(|e| CliError::new(Phase::Alloc, format!("growing buffer pool index: {e}")))?;
            self.chunks.resize_with(capacity, || None);
        }
        for slot in &mut self.chunks[self.pool_begin..=index] {
            if slot.is_none() {
                let mut buf = Vec::new();
                buf.try_reserve_exact(self.chunk_size)
                    .map_err(|e| CliError::new(Phase::Alloc, format!("allocating {} byte chunk: {e}", self.chunk_size)))?;
                buf.resize(self.chunk_size, 0);
                *slot = Some(buf.into_boxed_slice());
            }
        }
        Ok(())
    }

    /// Writable window starting at `pos`, ending at the next chunk boundary.
    /// Allocates the enclosing chunk (and any missing predecessors) if
    /// needed.
    pub fn source_window(&mut self, pos: u64) -> Result<WindowMut<'_>, CliError> {
        let index = self.chunk_index(pos);
        self.ensure_allocated(index)
            .map_err(|_| CliError::new(Phase::Alloc, "unable to allocate buffer pool chunk"))?;
        let offset = self.chunk_offset(pos);
        let chunk = self.chunks[index]
            .as_mut()
            .expect("just allocated")
            .as_mut();
        Ok(&mut chunk[offset..])
    }

    /// Readable window `[pos, min(chunk boundary, upper))`. The enclosing
    /// chunk must already exist (it was allocated by a prior
    /// `source_window` call at or before `pos`).
    pub fn sink_window(&self, pos: u64, upper: u64) -> Window<'_> {
        debug_assert!(pos <= upper);
        let index = self.chunk_index(pos);
        let offset = self.chunk_offset(pos);
        let chunk = self.chunks[index]
            .as_ref()
            .expect("sink_window called on unallocated chunk")
            .as_ref();
        let avail_in_chunk = self.chunk_size - offset;
        let avail_in_window = (upper - pos) as usize;
        let len = avail_in_chunk.min(avail_in_window);
        &chunk[offset..offset + len]
    }

    /// Single byte at `pos`, used by the line scanner.
    pub fn sink_byte(&self, pos: u64) -> u8 {
        let index = self.chunk_index(pos);
        let offset = self.chunk_offset(pos);
        self.chunks[index]
            .as_ref()
            .expect("sink_byte called on unallocated chunk")
            .as_ref()[offset]
    }

    /// Release chunks strictly below `watermark`'s enclosing chunk index.
    /// Idempotent: only ever releases chunks at or after `pool_begin`.
    pub fn reclaim(&mut self, watermark: u64) {
        let target = self.chunk_index(watermark).min(self.chunks.len());
        for slot in &mut self.chunks[self.pool_begin..target] {
            *slot = None;
        }
        self.pool_begin = target;
    }

    /// Number of chunks currently resident (for memory-bound tests).
    #[cfg(test)]
    pub fn resident_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }
}
