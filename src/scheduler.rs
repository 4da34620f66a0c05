use crate::error::{CliError, Phase};
use crate::pool::BufferPool;
use crate::sink::Sink;

/// Configuration the allocator needs that doesn't change per pass.
pub struct ScatterOpts {
    pub line: bool,
}

/// Replicate mode: every sink's upper bound tracks the read frontier. No
/// fairness bookkeeping needed — this is the trivial half of §4.3.
pub fn replicate(sinks: &mut [Sink], source_pos_read: u64) {
    for sink in sinks.iter_mut() {
        if sink.active {
            sink.pos_to_write = source_pos_read;
        }
    }
}

/// Scatter allocator plus the one piece of state it carries across passes:
/// the assignment frontier it left sinks at, independent of whatever the
/// sinks' own `pos_to_write` fields say now. §4.3/§9 assume the allocator's
/// own notion of "everything below `pos_assigned` is already spoken for" and
/// the recomputed `max(pos_to_write)` agree; this type is what lets that
/// assumption actually be checked rather than merely asserted of itself.
pub struct ScatterState {
    opts: ScatterOpts,
    /// Frontier this allocator left sinks at by the end of the last pass
    /// that touched one. `None` before the first pass.
    frontier: Option<u64>,
}

impl ScatterState {
    pub fn new(opts: ScatterOpts) -> Self {
        ScatterState { opts, frontier: None }
    }

    /// Carve newly-read bytes among idle, write-ready sinks.
    ///
    /// `write_ready[i]` reports whether the readiness multiplexer found sink
    /// `i`'s fd writable this pass — a sink can be idle (nothing outstanding)
    /// without being write-ready yet, and the reference only assigns to
    /// sinks that are both.
    pub fn pass(
        &mut self,
        sinks: &mut [Sink],
        source_pos_read: u64,
        at_eof: bool,
        pool: &BufferPool,
        write_ready: &[bool],
    ) -> Result<(), CliError> {
        let mut pos_assigned = 0u64;
        let mut available_sinks = 0usize;
        for sink in sinks.iter() {
            if !sink.active {
                continue;
            }
            pos_assigned = pos_assigned.max(sink.pos_to_write);
        }
        self.check_contiguous(pos_assigned)?;
        self.frontier = Some(pos_assigned);

        for (i, sink) in sinks.iter().enumerate() {
            if sink.active && sink.is_idle() && write_ready[i] {
                available_sinks += 1;
            }
        }
        if available_sinks == 0 {
            return Ok(());
        }

        let available_data = source_pos_read - pos_assigned;
        let data_per_sink = available_data / available_sinks as u64;
        let mut first = true;

        for (i, sink) in sinks.iter_mut().enumerate() {
            if !(sink.active && sink.is_idle() && write_ready[i]) {
                continue;
            }
            let data_to_assign = if first {
                first = false;
                data_per_sink + available_data % available_sinks as u64
            } else {
                data_per_sink
            };

            sink.pos_written = pos_assigned;

            let end = if self.opts.line {
                match align_end(pool, pos_assigned, data_to_assign, available_data, source_pos_read, data_per_sink, at_eof)? {
                    Some(end) => end,
                    None => {
                        // Deferred: no newline available yet and not at EOF.
                        // Leave this sink with a zero-length assignment and
                        // stop — later sinks in registration order must not
                        // receive bytes out of turn.
                        sink.pos_to_write = pos_assigned;
                        self.frontier = Some(pos_assigned);
                        return Ok(());
                    }
                }
            } else {
                pos_assigned + data_to_assign
            };

            sink.pos_to_write = end;
            pos_assigned = end;
            self.frontier = Some(pos_assigned);
        }

        Ok(())
    }

    /// §9's contiguity open question: the allocator reads `pos_assigned` as
    /// the max of existing `pos_to_write` values and assumes nothing below
    /// it is an unassigned hole. Check that assumption against the frontier
    /// this same allocator left things at after its last pass, rather than
    /// merely re-deriving the same number and comparing it to itself — a
    /// sink whose `pos_to_write` was mutated outside this allocator (reset,
    /// corrupted, or rolled back) makes the two diverge and is caught here
    /// instead of silently mis-scattering.
    fn check_contiguous(&self, pos_assigned: u64) -> Result<(), CliError> {
        match self.frontier {
            Some(expected) if expected != pos_assigned => Err(CliError::new(
                Phase::Alloc,
                format!(
                    "scatter assignment frontier diverged: allocator left sinks at {expected}, \
                     but recomputed max(pos_to_write) over active sinks is {pos_assigned} — \
                     a sink's assignment was mutated outside the allocator",
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// Snap a nominal assignment end to the byte after a newline, per §4.3's
/// two sub-algorithms. Returns `None` when the reliable scanner must defer
/// (no newline seen yet, and we are not at EOF so more data may still
/// arrive).
fn align_end(
    pool: &BufferPool,
    pos_assigned: u64,
    data_to_assign: u64,
    available_data: u64,
    source_pos_read: u64,
    data_per_sink: u64,
    at_eof: bool,
) -> Result<Option<u64>, CliError> {
    let chunk_size = pool.chunk_size() as u64;

    if available_data > chunk_size / 2 {
        // Efficient: scan backward from the nominal boundary.
        let mut data_end = pos_assigned + data_to_assign - 1;
        loop {
            if pool.sink_byte(data_end) == b'\n' {
                return Ok(Some(data_end + 1));
            }
            if data_end == pos_assigned {
                return Err(CliError::new(
                    Phase::Alloc,
                    format!(
                        "no newline found in a region of {} bytes; increase buffer size",
                        data_to_assign
                    ),
                ));
            }
            data_end -= 1;
        }
    }

    // Reliable: scan forward, remembering the last newline seen.
    let mut data_end = pos_assigned;
    let mut last_newline: Option<u64> = None;
    loop {
        if data_end >= source_pos_read {
            return match last_newline {
                Some(nl) => Ok(Some(nl + 1)),
                None if at_eof => {
                    log::warn!(
                        "flushing unaligned tail of {} bytes at EOF: no newline available",
                        source_pos_read - pos_assigned
                    );
                    Ok(Some(source_pos_read))
                }
                None => Ok(None),
            };
        }
        if pool.sink_byte(data_end) == b'\n' {
            last_newline = Some(data_end);
            if data_end - pos_assigned > data_per_sink {
                return Ok(Some(data_end + 1));
            }
        }
        data_end += 1;
    }
}

/// Run one write pass: for every sink with outstanding assigned bytes and
/// reported write-readiness, issue one write. Returns the total bytes
/// written this pass, used by the event loop to decide whether to skip the
/// next read.
pub fn write_pass(
    sinks: &mut [Sink],
    pool: &BufferPool,
    write_ready: &[bool],
) -> Result<u64, CliError> {
    let mut written = 0u64;
    for (i, sink) in sinks.iter_mut().enumerate() {
        if sink.active && sink.pos_written < sink.pos_to_write && write_ready[i] {
            written += sink.write_once(pool)? as u64;
        }
    }
    Ok(written)
}

/// Compute the reclamation watermark (min `pos_written` over active sinks,
/// capped at the read frontier) and release pool chunks below it. An
/// inactive sink contributes nothing, so a closed sink's frozen offset
/// cannot pin memory forever.
pub fn reclaim(sinks: &[Sink], source_pos_read: u64, pool: &mut BufferPool) {
    let min_pos = sinks
        .iter()
        .filter(|s| s.active)
        .map(|s| s.pos_written)
        .min()
        .unwrap_or(source_pos_read)
        .min(source_pos_read);
    pool.reclaim(min_pos);
}
