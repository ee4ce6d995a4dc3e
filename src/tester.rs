//! The per-worker test engine.
//!
//! A worker walks its assigned range of frames in the order dictated by the
//! [AccessMode], performing `open -> timed IO -> close -> record` for each one.
//! Any failure stops the worker immediately and the partial result collected
//! so far is returned, there are no retries since they would skew the latency
//! measurements.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::frame::{Frame, FrameError};
use crate::mode::{AccessMode, FileLayout, TestKind};
use crate::platform::{OpenFlags, Platform, PlatformFile};

/// The sleep increment used while waiting out a frame rate budget.
const THROTTLE_POLL_INTERVAL: Duration = Duration::from_micros(100);

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
/// Monotonic nanosecond timestamps for the phases of one frame operation.
pub struct TestCompletion {
    pub start: u64,
    pub open: u64,
    pub io: u64,
    pub close: u64,
    pub frame: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// A phase of a frame operation derived from two adjacent timestamps.
pub enum Phase {
    /// The whole frame, `start -> frame`.
    Frame,
    /// `start -> open`.
    Open,
    /// `open -> io`.
    Io,
    /// `io -> close`.
    Close,
}

impl TestCompletion {
    /// The duration of `phase` in nanoseconds.
    pub fn duration(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Frame => self.frame.saturating_sub(self.start),
            Phase::Open => self.open.saturating_sub(self.start),
            Phase::Io => self.io.saturating_sub(self.open),
            Phase::Close => self.close.saturating_sub(self.io),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// The outcome of a test run, either of a single worker or aggregated.
pub struct TestResult {
    pub frames_completed: u64,
    pub bytes_transferred: u64,
    /// Time spent inside the read/write calls.
    pub io_time_ns: u64,
    /// Wall time of the run.
    pub elapsed_ns: u64,
    /// One entry per completed frame in completion order, not frame index order.
    pub completions: Vec<TestCompletion>,
}

impl TestResult {
    /// Merge `other` into `self`.
    ///
    /// The counters are summed and the completion timeline of `other` is moved
    /// onto the end of this one, preserving the existing prefix.
    pub fn aggregate(&mut self, other: TestResult) {
        let TestResult {
            frames_completed,
            bytes_transferred,
            io_time_ns,
            elapsed_ns,
            mut completions,
        } = other;

        completions.truncate(frames_completed as usize);
        if self.completions.is_empty() {
            self.completions = completions;
        } else {
            self.completions.append(&mut completions);
        }

        self.frames_completed += frames_completed;
        self.bytes_transferred += bytes_transferred;
        self.io_time_ns += io_time_ns;
        self.elapsed_ns += elapsed_ns;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// The slice of the workload assigned to a single worker.
pub struct WorkerPlan {
    /// The index of the worker, used for naming and seeding.
    pub worker: usize,
    /// The first physical frame index of the range.
    pub start_frame: usize,
    /// The number of frames in the range.
    pub frames: usize,
    /// The minimum time spent on each frame, `None` for unlimited.
    pub frame_budget: Option<Duration>,
}

impl WorkerPlan {
    /// One past the last physical frame index of the range.
    pub fn end_frame(&self) -> usize {
        self.start_frame + self.frames
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
/// Settings shared by every worker of a run.
pub struct WorkerOptions {
    pub access: AccessMode,
    pub layout: FileLayout,
    /// Open files with direct (uncached) IO.
    pub direct: bool,
    /// A fixed seed for [AccessMode::Random], otherwise the process wide source is used.
    pub shuffle_seed: Option<u64>,
}

/// The frame a worker operates on.
pub enum FrameIo<'f> {
    /// Write the shared, read only frame.
    Write(&'f Frame),
    /// Read into a frame owned by this worker.
    Read(&'f mut Frame),
}

impl FrameIo<'_> {
    fn kind(&self) -> TestKind {
        match self {
            FrameIo::Write(_) => TestKind::Write,
            FrameIo::Read(_) => TestKind::Read,
        }
    }

    fn size(&self) -> usize {
        match self {
            FrameIo::Write(frame) => frame.size(),
            FrameIo::Read(frame) => frame.size(),
        }
    }

    fn transfer(&mut self, file: &mut dyn PlatformFile) -> std::io::Result<usize> {
        match self {
            FrameIo::Write(frame) => frame.write(file),
            FrameIo::Read(frame) => frame.read(file),
        }
    }
}

/// Maps a logical position within a worker's range to a physical frame index.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FrameOrder {
    Sequential { start: usize },
    Reverse { end: usize },
    Shuffled(Vec<usize>),
}

impl FrameOrder {
    /// Build the order for `plan`.
    ///
    /// Returns `None` if the permutation for [AccessMode::Random] cannot be allocated.
    pub fn new(access: AccessMode, plan: &WorkerPlan, rng: &mut fastrand::Rng) -> Option<Self> {
        let order = match access {
            AccessMode::Sequential => FrameOrder::Sequential {
                start: plan.start_frame,
            },
            AccessMode::Reverse => FrameOrder::Reverse {
                end: plan.end_frame(),
            },
            AccessMode::Random => {
                let mut sequence = Vec::new();
                sequence.try_reserve_exact(plan.frames).ok()?;
                sequence.extend(plan.start_frame..plan.end_frame());
                shuffle(&mut sequence, rng);
                FrameOrder::Shuffled(sequence)
            },
        };
        Some(order)
    }

    /// The physical frame index for logical position `i`.
    pub fn physical(&self, i: usize) -> usize {
        match self {
            FrameOrder::Sequential { start } => start + i,
            FrameOrder::Reverse { end } => end - i - 1,
            FrameOrder::Shuffled(sequence) => sequence[i],
        }
    }
}

/// An unbiased in place Fisher-Yates shuffle.
pub fn shuffle<T>(values: &mut [T], rng: &mut fastrand::Rng) {
    for i in (1..values.len()).rev() {
        let j = rng.usize(..=i);
        values.swap(i, j);
    }
}

/// Run a write workload for `plan`, writing `frame` to every frame of the range.
pub fn run_write(
    platform: &dyn Platform,
    target: &Path,
    frame: &Frame,
    plan: &WorkerPlan,
    options: &WorkerOptions,
) -> TestResult {
    let cancelled = AtomicBool::new(false);
    run(platform, target, FrameIo::Write(frame), plan, options, &cancelled)
}

/// Run a read workload for `plan`, reading every frame of the range into `frame`.
pub fn run_read(
    platform: &dyn Platform,
    target: &Path,
    frame: &mut Frame,
    plan: &WorkerPlan,
    options: &WorkerOptions,
) -> TestResult {
    let cancelled = AtomicBool::new(false);
    run(platform, target, FrameIo::Read(frame), plan, options, &cancelled)
}

/// Run the workload for `plan`.
///
/// `cancelled` is checked before every frame, once set the worker stops
/// and returns what it has completed so far.
pub fn run(
    platform: &dyn Platform,
    target: &Path,
    mut io: FrameIo<'_>,
    plan: &WorkerPlan,
    options: &WorkerOptions,
    cancelled: &AtomicBool,
) -> TestResult {
    let mut result = TestResult::default();
    let kind = io.kind();

    result.completions = match platform.alloc_completions(plan.frames) {
        Ok(completions) => completions,
        Err(error) => {
            tracing::warn!(
                worker = plan.worker,
                error = %error,
                "failed to allocate completion timeline, aborting worker"
            );
            return result;
        },
    };

    let mut rng = match options.shuffle_seed {
        Some(seed) => fastrand::Rng::with_seed(seed.wrapping_add(plan.worker as u64)),
        None => fastrand::Rng::new(),
    };
    let Some(order) = FrameOrder::new(options.access, plan, &mut rng) else {
        tracing::warn!(
            worker = plan.worker,
            "failed to allocate frame permutation, aborting worker"
        );
        result.completions = Vec::new();
        return result;
    };

    let frame_size = io.size();

    tracing::debug!(
        worker = plan.worker,
        kind = %kind,
        access = %options.access,
        start_frame = plan.start_frame,
        frames = plan.frames,
        frame_budget = ?plan.frame_budget,
        "worker starting"
    );

    let run_start = platform.now_ns();
    for i in 0..plan.frames {
        if cancelled.load(Ordering::Relaxed) {
            tracing::debug!(worker = plan.worker, "worker cancelled");
            break;
        }

        let frame_start = platform.now_ns();
        let frame_idx = order.physical(i);

        #[cfg(feature = "trace-hotpath")]
        tracing::trace!(worker = plan.worker, frame = frame_idx, "frame starting");

        let mut completion = TestCompletion {
            start: frame_start,
            ..TestCompletion::default()
        };

        let Some(transferred) = frame_op(
            platform,
            target,
            &mut io,
            frame_idx,
            frame_size,
            options,
            &mut completion,
            &mut result,
        ) else {
            break;
        };

        completion.frame = platform.now_ns();
        result.completions.push(completion);
        result.frames_completed += 1;
        result.bytes_transferred += transferred as u64;

        if let Some(budget) = plan.frame_budget {
            throttle(platform, frame_start, budget);
        }
    }
    result.elapsed_ns = platform.now_ns().saturating_sub(run_start);

    tracing::debug!(
        worker = plan.worker,
        frames_completed = result.frames_completed,
        bytes = result.bytes_transferred,
        elapsed_ns = result.elapsed_ns,
        "worker finished"
    );

    result
}

#[allow(clippy::too_many_arguments)]
/// Perform `open -> IO -> close` for a single frame.
///
/// Returns the number of bytes transferred, or `None` if the frame failed.
fn frame_op(
    platform: &dyn Platform,
    target: &Path,
    io: &mut FrameIo<'_>,
    frame_idx: usize,
    frame_size: usize,
    options: &WorkerOptions,
    completion: &mut TestCompletion,
    result: &mut TestResult,
) -> Option<usize> {
    let path = options.layout.frame_path(target, frame_idx);
    let flags = match io.kind() {
        TestKind::Write => OpenFlags::write_create(),
        TestKind::Read => OpenFlags::read_only(),
    }
    .with_direct(options.direct);

    let mut file = match platform.open(&path, flags) {
        Ok(file) => file,
        Err(error) => {
            tracing::warn!(
                frame = frame_idx,
                path = %path.display(),
                error = %error,
                "failed to open frame"
            );
            return None;
        },
    };

    if options.layout == FileLayout::Single {
        let offset = options.layout.frame_offset(frame_idx, frame_size);
        if let Err(error) = file.seek(SeekFrom::Start(offset)) {
            tracing::warn!(
                frame = frame_idx,
                path = %path.display(),
                offset = offset,
                error = %error,
                "failed to seek to frame"
            );
            let _ = file.close();
            return None;
        }
    }
    completion.open = platform.now_ns();

    let io_start = platform.now_ns();
    let transferred = io.transfer(file.as_mut());
    result.io_time_ns += platform.now_ns().saturating_sub(io_start);
    completion.io = platform.now_ns();

    if let Err(error) = file.close() {
        tracing::warn!(
            frame = frame_idx,
            path = %path.display(),
            error = %error,
            "failed to close frame"
        );
    }
    completion.close = platform.now_ns();

    match transferred {
        Ok(n) if n == frame_size => Some(n),
        Ok(n) => {
            tracing::warn!(
                frame = frame_idx,
                path = %path.display(),
                transferred = n,
                expected = frame_size,
                "short frame transfer"
            );
            None
        },
        Err(error) => {
            tracing::warn!(
                frame = frame_idx,
                path = %path.display(),
                error = %error,
                "frame transfer failed"
            );
            None
        },
    }
}

/// Sleep in short increments until `budget` has elapsed since `frame_start`.
fn throttle(platform: &dyn Platform, frame_start: u64, budget: Duration) {
    let budget_ns = budget.as_nanos() as u64;
    while platform.now_ns().saturating_sub(frame_start) < budget_ns {
        platform.sleep(THROTTLE_POLL_INTERVAL);
    }
}

/// Create the frame used for a read run against a [FileLayout::Multiple] target
/// directory, sized after its first frame file.
pub fn frame_for_read(
    platform: &dyn Platform,
    target_dir: &Path,
    header_size: usize,
) -> Result<Frame, FrameError> {
    let path = FileLayout::Multiple.frame_path(target_dir, 0);
    Frame::load_from_existing(platform, &path, header_size)
}
