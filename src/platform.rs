//! The capability interface the engine performs all of its IO through.
//!
//! The engine never touches the file system, allocator or thread spawning
//! directly, everything goes through a [Platform]. [OsPlatform] is the real
//! implementation, [MemoryPlatform](crate::memory::MemoryPlatform) is an
//! in-memory double used for deterministic tests.

use std::fmt::Debug;
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::buffer::{AlignedBuffer, AllocError};
use crate::tester::{TestCompletion, TestResult};

#[cfg(not(unix))]
compile_error!("framebench only supports unix based operating systems");

/// The permission bits used when a file is created.
pub const CREATE_MODE: u32 = 0o666;

/// A task executed by a worker thread.
pub type WorkerTask<'scope> = Box<dyn FnOnce() -> TestResult + Send + 'scope>;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
/// How a file should be opened.
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    /// Bypass the page cache, `O_DIRECT` on Linux.
    pub direct: bool,
}

impl OpenFlags {
    /// Open an existing file for reading.
    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            create: false,
            truncate: false,
            direct: false,
        }
    }

    /// Open a file for writing, creating it if it does not exist.
    pub const fn write_create() -> Self {
        Self {
            read: false,
            write: true,
            create: true,
            truncate: false,
            direct: false,
        }
    }

    pub const fn with_truncate(mut self, enable: bool) -> Self {
        self.truncate = enable;
        self
    }

    pub const fn with_direct(mut self, enable: bool) -> Self {
        self.direct = enable;
        self
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
/// The subset of file metadata the engine cares about.
pub struct FileStat {
    pub size: u64,
}

/// An open file produced by [Platform::open].
pub trait PlatformFile: Send + Debug {
    /// Read into `buf`, returning the number of bytes read, `0` signals EOF.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write from `buf`, returning the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Move the file cursor.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Close the file, surfacing any error the close reports.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// The capabilities the engine consumes.
///
/// Implementations must be shareable across the worker threads of a run.
pub trait Platform: Send + Sync {
    /// Open the file at `path`.
    fn open(&self, path: &Path, flags: OpenFlags) -> io::Result<Box<dyn PlatformFile>>;

    /// Query the metadata of the file at `path`.
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    /// Allocate a zeroed buffer of `size` bytes aligned to `align`.
    fn alloc_aligned(&self, align: usize, size: usize) -> Result<AlignedBuffer, AllocError> {
        AlignedBuffer::zeroed(align, size)
    }

    /// Allocate an empty completion timeline with room for `frames` entries.
    fn alloc_completions(&self, frames: usize) -> Result<Vec<TestCompletion>, AllocError> {
        let mut completions = Vec::new();
        completions
            .try_reserve_exact(frames)
            .map_err(|_| AllocError::OutOfMemory {
                size: frames.saturating_mul(size_of::<TestCompletion>()),
            })?;
        Ok(completions)
    }

    /// Spawn a worker thread within `scope`.
    fn spawn_worker<'scope, 'env>(
        &self,
        scope: &'scope thread::Scope<'scope, 'env>,
        name: String,
        task: WorkerTask<'scope>,
    ) -> io::Result<thread::ScopedJoinHandle<'scope, TestResult>> {
        thread::Builder::new().name(name).spawn_scoped(scope, task)
    }

    /// The current monotonic time in nanoseconds.
    fn now_ns(&self) -> u64 {
        crate::timing::now_ns()
    }
}

#[derive(Debug, Default)]
/// The [Platform] backed by the operating system.
pub struct OsPlatform {
    warned_buffered_fallback: AtomicBool,
}

impl OsPlatform {
    pub const fn new() -> Self {
        Self {
            warned_buffered_fallback: AtomicBool::new(false),
        }
    }

    fn open_with(path: &Path, flags: OpenFlags, direct: bool) -> io::Result<std::fs::File> {
        use std::os::unix::fs::OpenOptionsExt;

        let mut options = std::fs::File::options();
        options
            .read(flags.read)
            .write(flags.write)
            .create(flags.create)
            .truncate(flags.truncate)
            .mode(CREATE_MODE);

        #[cfg(target_os = "linux")]
        if direct {
            options.custom_flags(libc::O_DIRECT);
        }

        let file = options.open(path)?;

        #[cfg(target_os = "macos")]
        if direct {
            use std::os::fd::AsRawFd;

            // SAFETY: The descriptor is valid for the lifetime of `file`.
            if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) } == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(file)
    }
}

impl Platform for OsPlatform {
    fn open(&self, path: &Path, flags: OpenFlags) -> io::Result<Box<dyn PlatformFile>> {
        let file = match Self::open_with(path, flags, flags.direct) {
            // Some file systems, notably tmpfs, reject direct IO outright.
            Err(ref err) if flags.direct && err.raw_os_error() == Some(libc::EINVAL) => {
                if !self.warned_buffered_fallback.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        path = %path.display(),
                        "file system does not support direct IO, falling back to buffered IO"
                    );
                }
                Self::open_with(path, flags, false)?
            },
            other => other?,
        };

        Ok(Box::new(OsFile { file }))
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = std::fs::metadata(path)?;
        Ok(FileStat {
            size: metadata.len(),
        })
    }
}

#[derive(Debug)]
struct OsFile {
    file: std::fs::File,
}

impl PlatformFile for OsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        use std::os::fd::IntoRawFd;

        let fd = self.file.into_raw_fd();
        // SAFETY: `into_raw_fd` hands us sole ownership of the descriptor.
        if unsafe { libc::close(fd) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
