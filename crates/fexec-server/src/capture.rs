//! Output Capture
//!
//! Collects everything a handler writes to the process's standard output and
//! standard error while it runs.
//!
//! Capture works at the file-descriptor level: descriptors 1 and 2 are
//! pointed at anonymous temporary files for the duration of the call and
//! restored afterwards, so output from any writer (Rust's `std::io`, C
//! `printf`, child processes inheriting the descriptors) is collected.
//!
//! The standard streams are process-wide, so captured calls are serialized
//! against every other handler call through [`STREAMS`]: a capturing call
//! holds it exclusively, a non-capturing call holds it shared. This keeps
//! one call's output out of another's capture at the cost of running
//! captured calls one at a time.
//!
//! Anything else the process writes to the standard streams can still land
//! in a capture window. Server logs should go to [`console`] instead, a
//! duplicate of standard output taken before any capture starts.

use fexec_common::protocol::error::Result;
use parking_lot::RwLock;
use std::io;

/// Guards the process's standard streams.
static STREAMS: RwLock<()> = parking_lot::const_rwlock(());

/// Output collected from one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }
}

/// Runs `call` with both standard streams redirected and returns what it
/// wrote.
///
/// The streams are restored even if `call` panics.
pub fn capture<R>(call: impl FnOnce() -> R) -> Result<(R, CapturedOutput)> {
    let _exclusive = STREAMS.write();

    let stdout = redirect::Redirect::begin(redirect::Stream::Stdout)?;
    let stderr = redirect::Redirect::begin(redirect::Stream::Stderr)?;

    let result = call();

    let stderr = stderr.finish()?;
    let stdout = stdout.finish()?;
    Ok((result, CapturedOutput { stdout, stderr }))
}

/// Runs `call` without capturing, excluded from any running capture.
pub fn passthrough<R>(call: impl FnOnce() -> R) -> R {
    let _shared = STREAMS.read();
    call()
}

/// Standard output as it was when [`console`] was called.
pub struct Console(redirect::Console);

impl io::Write for Console {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Returns a writer on the current standard output that later captures do
/// not redirect.
///
/// Call it before the first capture, typically when installing the logger.
pub fn console() -> io::Result<Console> {
    redirect::console().map(Console)
}

#[cfg(unix)]
mod redirect {
    use std::fs::File;
    use std::io::{self, Read, Seek, SeekFrom, Write};
    use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

    pub(super) type Console = File;

    pub(super) fn console() -> io::Result<File> {
        Stream::Stdout.flush();
        // SAFETY: duplicating a standard descriptor; the copy is owned by
        // the returned file.
        let fd = unsafe { libc::dup(libc::STDOUT_FILENO) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe { File::from_raw_fd(fd) })
    }

    #[derive(Debug, Clone, Copy)]
    pub(super) enum Stream {
        Stdout,
        Stderr,
    }

    impl Stream {
        fn fd(self) -> RawFd {
            match self {
                Stream::Stdout => libc::STDOUT_FILENO,
                Stream::Stderr => libc::STDERR_FILENO,
            }
        }

        /// Pushes Rust-side buffered output to the current descriptor.
        fn flush(self) {
            let _ = match self {
                Stream::Stdout => io::stdout().flush(),
                Stream::Stderr => io::stderr().flush(),
            };
        }
    }

    /// One redirected descriptor. Restores the original on drop.
    pub(super) struct Redirect {
        stream: Stream,
        saved: RawFd,
        sink: File,
        restored: bool,
    }

    impl Redirect {
        pub(super) fn begin(stream: Stream) -> io::Result<Self> {
            stream.flush();
            let sink = tempfile::tempfile()?;

            // SAFETY: plain descriptor calls on descriptors we own or on the
            // process's standard descriptors.
            let saved = unsafe { libc::dup(stream.fd()) };
            if saved < 0 {
                return Err(io::Error::last_os_error());
            }
            if unsafe { libc::dup2(sink.as_raw_fd(), stream.fd()) } < 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(saved) };
                return Err(err);
            }

            Ok(Self {
                stream,
                saved,
                sink,
                restored: false,
            })
        }

        fn restore(&mut self) -> io::Result<()> {
            if self.restored {
                return Ok(());
            }
            self.restored = true;
            self.stream.flush();

            // SAFETY: `saved` is a descriptor this guard duplicated and owns.
            let status = unsafe { libc::dup2(self.saved, self.stream.fd()) };
            let err = (status < 0).then(io::Error::last_os_error);
            unsafe { libc::close(self.saved) };
            err.map_or(Ok(()), Err)
        }

        /// Restores the stream and returns what was written to it.
        pub(super) fn finish(mut self) -> io::Result<String> {
            self.restore()?;
            let mut bytes = Vec::new();
            self.sink.seek(SeekFrom::Start(0))?;
            self.sink.read_to_end(&mut bytes)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    impl Drop for Redirect {
        fn drop(&mut self) {
            if let Err(e) = self.restore() {
                tracing::error!("Failed to restore {:?}: {}", self.stream, e);
            }
        }
    }
}

#[cfg(not(unix))]
mod redirect {
    use std::io;

    pub(super) type Console = io::Stdout;

    pub(super) fn console() -> io::Result<io::Stdout> {
        Ok(io::stdout())
    }

    #[derive(Debug, Clone, Copy)]
    pub(super) enum Stream {
        Stdout,
        Stderr,
    }

    /// Descriptor redirection is unix-only; elsewhere nothing is collected.
    pub(super) struct Redirect;

    impl Redirect {
        pub(super) fn begin(_stream: Stream) -> io::Result<Self> {
            Ok(Self)
        }

        pub(super) fn finish(self) -> io::Result<String> {
            Ok(String::new())
        }
    }
}
