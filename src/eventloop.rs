use std::os::fd::AsFd;

use rustix::event::{poll, PollFd, PollFlags};

use crate::cli::Config;
use crate::error::{CliError, Phase};
use crate::pool::BufferPool;
use crate::reader::SourceReader;
use crate::scheduler::{self, ScatterOpts, ScatterState};
use crate::sink::Sink;

/// Drive stdin -> sinks until EOF and every sink has drained, or a fatal
/// error occurs. This generalizes the teacher's `splice_fd_to_stdinout`
/// (one sink) to N sinks, and folds in the scatter allocator from
/// `scheduler` as the thing that decides *which* bytes each sink's next
/// write pulls from the pool.
pub fn run(config: &Config, sinks: &mut [Sink]) -> Result<(), CliError> {
    let mut pool = BufferPool::new(config.buffer_size);
    let mut reader = SourceReader::new();
    let mut scatter = ScatterState::new(ScatterOpts { line: config.line });

    let stdin = std::io::stdin();
    crate::sink::set_nonblocking(stdin.as_fd())
        .map_err(|e| CliError::with_source(Phase::SourceRead, "setting stdin non-blocking", e.into()))?;

    loop {
        // Readiness multiplexing is confined to this block so its borrows
        // of `stdin`/`sinks` end before we need `&mut sinks` below — the
        // block's only lasting output is plain bool data.
        let (stdin_readable, write_ready) = {
            let mut pollfds: Vec<PollFd> = Vec::with_capacity(1 + sinks.len());
            let stdin_slot = if !reader.reached_eof {
                pollfds.push(PollFd::new(&stdin, PollFlags::IN));
                Some(pollfds.len() - 1)
            } else {
                None
            };

            let mut sink_slot = vec![None; sinks.len()];
            for (i, sink) in sinks.iter().enumerate() {
                if sink.has_pending(reader.pos_read) {
                    pollfds.push(PollFd::new(sink, PollFlags::OUT));
                    sink_slot[i] = Some(pollfds.len() - 1);
                }
            }
            let active_fds = sink_slot.iter().filter(|s| s.is_some()).count();

            if reader.reached_eof && active_fds == 0 {
                return Ok(());
            }

            poll(&mut pollfds, -1)
                .map_err(|e| CliError::with_source(Phase::Poll, "polling for readiness", e.into()))?;

            let stdin_readable = stdin_slot
                .map(|i| pollfds[i].revents().contains(PollFlags::IN))
                .unwrap_or(false);
            let write_ready: Vec<bool> = sink_slot
                .iter()
                .map(|slot| slot.map(|i| pollfds[i].revents().contains(PollFlags::OUT)).unwrap_or(false))
                .collect();

            (stdin_readable, write_ready)
        };

        if config.scatter {
            scatter.pass(sinks, reader.pos_read, reader.reached_eof, &pool, &write_ready)?;
        } else {
            scheduler::replicate(sinks, reader.pos_read);
        }

        let written = scheduler::write_pass(sinks, &pool, &write_ready)?;
        scheduler::reclaim(sinks, reader.pos_read, &mut pool);

        if written > 0 {
            // A write made progress: self-throttle by skipping the read
            // this iteration rather than ballooning pool memory.
            continue;
        }

        if stdin_readable {
            reader.read_once(stdin.as_fd(), &mut pool)?;
        }
    }
}
