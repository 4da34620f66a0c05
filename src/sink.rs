use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use rustix::fs::{self, Mode, OFlags};

use crate::error::{CliError, Phase};
use crate::pool::BufferPool;

/// One output destination: an open, non-blocking file descriptor plus the
/// two offsets that track how much of the source stream it has been
/// assigned and how much it has actually gotten out the kernel door.
pub struct Sink {
    pub name: String,
    pub(crate) fd: OwnedFd,
    /// Bytes successfully handed to the kernel.
    pub pos_written: u64,
    /// Upper bound this sink is currently permitted to write up to.
    pub pos_to_write: u64,
    /// False once this sink's reader has closed (broken pipe); an inactive
    /// sink is excluded from future assignments and from reclamation.
    pub active: bool,
}

impl Sink {
    pub fn is_idle(&self) -> bool {
        self.pos_written == self.pos_to_write
    }

    pub fn has_pending(&self, source_pos_read: u64) -> bool {
        self.active && self.pos_written < source_pos_read
    }

    #[cfg(test)]
    pub(crate) fn for_test(name: &str, fd: OwnedFd) -> Self {
        Sink { name: name.to_string(), fd, pos_written: 0, pos_to_write: 0, active: true }
    }

    /// Write one window of already-assigned bytes. Returns the byte count
    /// written, or `Ok(0)` with `active` cleared on a broken pipe (the
    /// caller must not treat that as a zero-progress write error).
    pub fn write_once(&mut self, pool: &BufferPool) -> Result<usize, CliError> {
        let window = pool.sink_window(self.pos_written, self.pos_to_write);
        match rustix::io::write(&self.fd, window) {
            Ok(n) => {
                self.pos_written += n as u64;
                Ok(n)
            }
            Err(rustix::io::Errno::PIPE) => {
                log::debug!("sink {} closed (broken pipe)", self.name);
                self.active = false;
                Ok(0)
            }
            Err(rustix::io::Errno::AGAIN) => Ok(0),
            Err(e) => Err(CliError::with_source(
                Phase::SinkWrite,
                format!("writing to {}", self.name),
                e.into(),
            )),
        }
    }
}

/// Open every output path write-only, creating it if absent and truncating
/// it if present, and switch it to non-blocking mode. Order matches the
/// caller's argument order and is preserved as sink registration order,
/// which governs scatter assignment order.
pub fn open_sinks(paths: &[String]) -> Result<Vec<Sink>, CliError> {
    paths
        .iter()
        .map(|path| {
            let fd = fs::open(
                path.as_str(),
                OFlags::WRONLY | OFlags::CREATE | OFlags::TRUNC,
                Mode::from_bits_truncate(0o644),
            )
            .map_err(|e| {
                CliError::with_source(Phase::SinkOpen, format!("opening {path}"), e.into())
            })?;
            set_nonblocking(fd.as_fd()).map_err(|e| {
                CliError::with_source(Phase::SinkOpen, format!("setting {path} non-blocking"), e.into())
            })?;
            Ok(Sink {
                name: path.clone(),
                fd,
                pos_written: 0,
                pos_to_write: 0,
                active: true,
            })
        })
        .collect()
}

impl AsFd for Sink {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

pub fn set_nonblocking(fd: BorrowedFd) -> rustix::io::Result<()> {
    let flags = fs::fcntl_getfl(fd)?;
    fs::fcntl_setfl(fd, flags | OFlags::NONBLOCK)
}

/// Mask SIGPIPE process-wide so a sink's reader closing early surfaces as
/// an `EPIPE` write error instead of terminating the process. Neither
/// `rustix` nor `clap` expose a safe wrapper for signal disposition, so
/// this is the one spot this binary drops to raw `libc`, the same way the
/// teacher's wrappers occasionally fall back to `libc::pthread_mutex_*`.
pub fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}
