//! Output accumulator
//!
//! The child's stdout and stderr are both the write end of one pipe, so
//! the read end sees bytes in exactly the order the process emitted them.
//! The read end is non-blocking: a drain takes whatever is buffered and
//! returns as soon as the pipe is empty.

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use tracing::{debug, warn};

/// Read size for a single `read(2)` call
const CHUNK_SIZE: usize = 8 * 1024;

/// Create the combined output pipe as `(read_end, write_end)`.
///
/// Both ends are close-on-exec from creation, so a process spawned
/// concurrently elsewhere never inherits them. The launcher dups the write
/// end onto the child's fds 1 and 2, which clears the flag for the child only.
#[cfg(not(target_vendor = "apple"))]
pub fn combined_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(io::Error::from)
}

/// Create the combined output pipe as `(read_end, write_end)`.
///
/// No `pipe2` here; close-on-exec is set right after creation.
#[cfg(target_vendor = "apple")]
pub fn combined_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::FdFlag;

    let (read_end, write_end) = nix::unistd::pipe().map_err(io::Error::from)?;
    for fd in [&read_end, &write_end] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(io::Error::from)?;
    }
    Ok((read_end, write_end))
}

/// Read end of a task's combined output stream
#[derive(Debug)]
pub struct OutputStream {
    /// `None` once EOF or a hard read error was seen
    reader: Option<File>,

    /// Bytes read so far, for diagnostics
    total: u64,
}

impl OutputStream {
    /// Wrap the read end, switching it to non-blocking mode
    pub fn new(read_end: OwnedFd) -> io::Result<Self> {
        let raw = read_end.as_raw_fd();
        let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL).map_err(io::Error::from)?);
        fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io::Error::from)?;

        Ok(Self {
            reader: Some(File::from(read_end)),
            total: 0,
        })
    }

    /// True once every writer has closed the pipe
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Append currently available output to `buffer` without blocking.
    ///
    /// `limit` caps the bytes taken by this call; `None` reads until the
    /// pipe is empty. Returns the number of bytes appended. A closed
    /// stream is a no-op.
    pub fn drain(&mut self, buffer: &mut Vec<u8>, limit: Option<usize>) -> usize {
        let Some(reader) = self.reader.as_mut() else {
            return 0;
        };

        let mut chunk = [0u8; CHUNK_SIZE];
        let mut appended = 0usize;

        loop {
            let want = match limit {
                Some(limit) => limit.saturating_sub(appended).min(CHUNK_SIZE),
                None => CHUNK_SIZE,
            };
            if want == 0 {
                break;
            }

            match reader.read(&mut chunk[..want]) {
                Ok(0) => {
                    debug!("Output stream reached EOF after {} bytes", self.total);
                    self.reader = None;
                    break;
                }
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    appended += n;
                    self.total += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Closing output stream after read error: {}", e);
                    self.reader = None;
                    break;
                }
            }
        }

        appended
    }
}
