use std::os::fd::BorrowedFd;

use crate::error::{CliError, Phase};
use crate::pool::BufferPool;

/// Owns the read offset into the source stream and the terminal EOF latch.
pub struct SourceReader {
    pub pos_read: u64,
    pub reached_eof: bool,
}

impl SourceReader {
    pub fn new() -> Self {
        SourceReader { pos_read: 0, reached_eof: false }
    }

    /// Issue exactly one non-blocking read into the pool-backed window at
    /// `pos_read`. Returns the byte count read (zero means EOF, which also
    /// sets `reached_eof`). `EAGAIN` is treated as "no data yet" and
    /// reported as zero bytes without advancing or latching EOF; the event
    /// loop only calls this after the multiplexer reports readability, so
    /// in practice this is rare (a spurious wakeup), not a protocol error.
    pub fn read_once(&mut self, stdin: BorrowedFd, pool: &mut BufferPool) -> Result<u64, CliError> {
        let window = pool.source_window(self.pos_read)?;
        match rustix::io::read(stdin, window) {
            Ok(0) => {
                self.reached_eof = true;
                Ok(0)
            }
            Ok(n) => {
                self.pos_read += n as u64;
                Ok(n as u64)
            }
            Err(rustix::io::Errno::AGAIN) => Ok(0),
            Err(e) => Err(CliError::with_source(Phase::SourceRead, "reading stdin", e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn read_once_advances_offset_and_latches_eof() {
        let (rx, tx) = rustix::pipe::pipe().unwrap();
        let mut pool = BufferPool::new(64);
        let mut reader = SourceReader::new();

        rustix::io::write(&tx, b"hello").unwrap();
        let n = reader.read_once(rx.as_fd(), &mut pool).unwrap();
        assert_eq!(n, 5);
        assert_eq!(reader.pos_read, 5);
        assert!(!reader.reached_eof);

        drop(tx);
        let n = reader.read_once(rx.as_fd(), &mut pool).unwrap();
        assert_eq!(n, 0);
        assert!(reader.reached_eof);
    }
}
