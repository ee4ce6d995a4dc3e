//! An in-memory [Platform] for deterministic, non-destructive tests.
//!
//! Every instance owns its own file table so tests can run in parallel
//! without interfering with each other. The platform can also be configured
//! to fail allocations, opens or thread spawns at a chosen point.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::buffer::{AlignedBuffer, AllocError};
use crate::platform::{FileStat, OpenFlags, Platform, PlatformFile, WorkerTask};
use crate::tester::{TestCompletion, TestResult};

type FileData = Arc<Mutex<Vec<u8>>>;

#[derive(Default)]
/// A [Platform] keeping all files in memory.
pub struct MemoryPlatform {
    files: Mutex<HashMap<PathBuf, FileData>>,
    /// Cloned into every buffer handed out, the strong count tracks live allocations.
    alloc_token: Arc<()>,
    alloc_limit: Option<usize>,
    allocations: AtomicUsize,
    open_limit: Option<usize>,
    opens: AtomicUsize,
    spawn_failure_at: Option<usize>,
    spawns: AtomicUsize,
    fail_completions: bool,
}

impl Debug for MemoryPlatform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MemoryPlatform(files={}, live_allocations={})",
            self.files.lock().len(),
            self.live_allocations()
        )
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every buffer allocation after the first `limit` succeed.
    pub fn with_alloc_limit(mut self, limit: usize) -> Self {
        self.alloc_limit = Some(limit);
        self
    }

    /// Fail every file open after the first `limit` succeed.
    pub fn with_open_limit(mut self, limit: usize) -> Self {
        self.open_limit = Some(limit);
        self
    }

    /// Fail the spawn of the worker thread with the given (zero based) spawn index.
    pub fn with_spawn_failure_at(mut self, worker: usize) -> Self {
        self.spawn_failure_at = Some(worker);
        self
    }

    /// Fail every completion timeline allocation.
    pub fn with_completion_alloc_failure(mut self, enable: bool) -> Self {
        self.fail_completions = enable;
        self
    }

    /// Create or replace a file with the given contents.
    pub fn insert_file(&self, path: impl AsRef<Path>, data: Vec<u8>) {
        self.files
            .lock()
            .insert(path.as_ref().to_path_buf(), Arc::new(Mutex::new(data)));
    }

    /// A copy of the contents of the file at `path`.
    pub fn file_contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let files = self.files.lock();
        files.get(path.as_ref()).map(|data| data.lock().clone())
    }

    /// The paths of all files, sorted.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// The number of buffers handed out by [Platform::alloc_aligned] which are
    /// still alive.
    pub fn live_allocations(&self) -> usize {
        Arc::strong_count(&self.alloc_token) - 1
    }

    /// The number of worker spawns attempted so far.
    pub fn spawn_attempts(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    fn lookup(&self, path: &Path) -> Option<FileData> {
        self.files.lock().get(path).cloned()
    }
}

impl Platform for MemoryPlatform {
    fn open(&self, path: &Path, flags: OpenFlags) -> io::Result<Box<dyn PlatformFile>> {
        if !flags.read && !flags.write {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "file must be opened for reading or writing",
            ));
        }

        let opened = self.opens.fetch_add(1, Ordering::SeqCst);
        if self.open_limit.is_some_and(|limit| opened >= limit) {
            return Err(io::Error::other("open failure injected by memory platform"));
        }

        let data = {
            let mut files = self.files.lock();
            let existing = files.get(path).cloned();
            match existing {
                Some(data) => data,
                None if flags.create => {
                    let data = FileData::default();
                    files.insert(path.to_path_buf(), data.clone());
                    data
                },
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no such file: {}", path.display()),
                    ));
                },
            }
        };

        if flags.truncate && flags.write {
            data.lock().clear();
        }

        Ok(Box::new(MemoryFile {
            data,
            pos: 0,
            readable: flags.read,
            writable: flags.write,
        }))
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let data = self.lookup(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })?;

        let size = data.lock().len() as u64;
        Ok(FileStat { size })
    }

    fn alloc_aligned(&self, align: usize, size: usize) -> Result<AlignedBuffer, AllocError> {
        let allocated = self.allocations.fetch_add(1, Ordering::SeqCst);
        if self.alloc_limit.is_some_and(|limit| allocated >= limit) {
            return Err(AllocError::OutOfMemory { size });
        }

        let buffer = AlignedBuffer::zeroed(align, size)?;
        Ok(buffer.with_guard(Box::new(self.alloc_token.clone())))
    }

    fn alloc_completions(&self, frames: usize) -> Result<Vec<TestCompletion>, AllocError> {
        if self.fail_completions {
            return Err(AllocError::OutOfMemory {
                size: frames.saturating_mul(size_of::<TestCompletion>()),
            });
        }
        Ok(Vec::with_capacity(frames))
    }

    fn spawn_worker<'scope, 'env>(
        &self,
        scope: &'scope thread::Scope<'scope, 'env>,
        name: String,
        task: WorkerTask<'scope>,
    ) -> io::Result<thread::ScopedJoinHandle<'scope, TestResult>> {
        let spawned = self.spawns.fetch_add(1, Ordering::SeqCst);
        if self.spawn_failure_at == Some(spawned) {
            return Err(io::Error::other("spawn failure injected by memory platform"));
        }
        thread::Builder::new().name(name).spawn_scoped(scope, task)
    }
}

struct MemoryFile {
    data: FileData,
    pos: u64,
    readable: bool,
    writable: bool,
}

impl Debug for MemoryFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryFile(pos={}, len={})", self.pos, self.data.lock().len())
    }
}

impl PlatformFile for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.readable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not opened for reading",
            ));
        }

        let data = self.data.lock();
        let Ok(pos) = usize::try_from(self.pos) else {
            return Ok(0);
        };
        if pos >= data.len() {
            return Ok(0);
        }

        let n = buf.len().min(data.len() - pos);
        buf[..n].copy_from_slice(&data[pos..pos + n]);
        self.pos += n as u64;

        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not opened for writing",
            ));
        }

        let pos = usize::try_from(self.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
        let end = pos + buf.len();

        let mut data = self.data.lock();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[pos..end].copy_from_slice(buf);
        self.pos = end as u64;

        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.lock().len() as u64;
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => len.checked_add_signed(delta),
        };

        let new_pos = new_pos.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.pos = new_pos;

        Ok(new_pos)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}
