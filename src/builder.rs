use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::frame::Frame;
use crate::mode::{AccessMode, FileLayout, TestKind};
use crate::partition;
use crate::platform::{Platform, WorkerTask};
use crate::tester::{self, FrameIo, TestResult, WorkerOptions, WorkerPlan};

#[derive(Debug, thiserror::Error)]
/// A test run could not be carried out.
pub enum RunError {
    #[error("failed to spawn worker {worker}: {source}")]
    /// Spawning a worker thread failed, every worker spawned before it was
    /// cancelled and joined.
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },
    #[error("worker {worker} panicked")]
    /// A worker thread panicked before producing a result.
    WorkerPanicked { worker: usize },
}

#[derive(Debug, Clone)]
/// A set of configuration options for a frame benchmark run.
///
/// ## Example
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::path::Path;
///
/// use framebench::memory::MemoryPlatform;
/// use framebench::{AccessMode, Frame, profile};
///
/// let platform = MemoryPlatform::new();
/// let frame = Frame::generate(&platform, profile::get_by_name("SD-24bit"))?;
///
/// let result = framebench::builder()
///     .with_threads(2)
///     .with_frames(16)
///     .with_access_mode(AccessMode::Random)
///     .try_run_write(&platform, &frame, Path::new("/bench"))?;
///
/// assert_eq!(result.frames_completed, 16);
/// # Ok(())
/// # }
/// ```
pub struct TestBuilder {
    threads: usize,
    frames: usize,
    fps: u64,
    start_frame: usize,
    access_mode: AccessMode,
    layout: FileLayout,
    direct_io: bool,
    shuffle_seed: Option<u64>,
}

impl Default for TestBuilder {
    fn default() -> Self {
        Self::const_default()
    }
}

impl TestBuilder {
    pub(super) const fn const_default() -> Self {
        Self {
            threads: 1,
            frames: 1800,
            fps: 0,
            start_frame: 0,
            access_mode: AccessMode::Sequential,
            layout: FileLayout::Multiple,
            direct_io: true,
            shuffle_seed: None,
        }
    }

    /// Set the number of worker threads the frames are split across.
    ///
    /// By default, this is `1`.
    pub const fn with_threads(mut self, threads: usize) -> Self {
        assert!(threads > 0, "provided `threads` value must be at least 1");
        self.threads = threads;
        self
    }

    /// Set the total number of frames to transfer.
    ///
    /// By default, this is `1800`.
    pub const fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Limit the run to `fps` frames per second across all workers.
    ///
    /// By default, this is `0` which leaves the run unthrottled.
    pub const fn with_fps(mut self, fps: u64) -> Self {
        self.fps = fps;
        self
    }

    /// Set the first physical frame index of the run.
    ///
    /// By default, this is `0`.
    pub const fn with_start_frame(mut self, start_frame: usize) -> Self {
        self.start_frame = start_frame;
        self
    }

    /// Set the order workers visit their frames in.
    ///
    /// By default, this is [AccessMode::Sequential].
    pub const fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Set how frames are laid out on disk.
    ///
    /// By default, this is [FileLayout::Multiple].
    pub const fn with_layout(mut self, layout: FileLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Enable/disable direct IO.
    ///
    /// **WARNING: Disabling this measures the page cache rather than the device**
    ///
    /// By default, this is `enabled`.
    pub const fn with_direct_io(mut self, enable: bool) -> Self {
        self.direct_io = enable;
        self
    }

    /// Use a fixed seed for [AccessMode::Random] so the visit order is reproducible.
    ///
    /// Each worker derives its own generator from the seed.
    pub const fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub const fn threads(&self) -> usize {
        self.threads
    }

    pub const fn frames(&self) -> usize {
        self.frames
    }

    pub const fn fps(&self) -> u64 {
        self.fps
    }

    pub const fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub const fn layout(&self) -> FileLayout {
        self.layout
    }

    /// The work assigned to each worker by the current configuration.
    pub fn plans(&self) -> Vec<WorkerPlan> {
        partition::partition(self.threads, self.start_frame, self.frames, self.fps)
    }

    fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            access: self.access_mode,
            layout: self.layout,
            direct: self.direct_io,
            shuffle_seed: self.shuffle_seed,
        }
    }

    /// Write `frame` to every frame of the run under `target`.
    pub fn try_run_write(
        &self,
        platform: &dyn Platform,
        frame: &Frame,
        target: &Path,
    ) -> Result<TestResult, RunError> {
        self.try_run(platform, frame, target, TestKind::Write)
    }

    /// Read every frame of the run under `target`.
    ///
    /// `frame` acts as a template, each worker reads into its own buffer of
    /// the same size.
    pub fn try_run_read(
        &self,
        platform: &dyn Platform,
        frame: &Frame,
        target: &Path,
    ) -> Result<TestResult, RunError> {
        self.try_run(platform, frame, target, TestKind::Read)
    }

    /// Attempt to run the test using the current configuration.
    ///
    /// Spawns one worker thread per configured thread and blocks until all
    /// of them have finished. The aggregate's `elapsed_ns` is the wall time
    /// of the whole run.
    pub fn try_run(
        &self,
        platform: &dyn Platform,
        frame: &Frame,
        target: &Path,
        kind: TestKind,
    ) -> Result<TestResult, RunError> {
        let plans = self.plans();
        let options = self.worker_options();
        let cancelled = AtomicBool::new(false);

        tracing::info!(
            kind = %kind,
            threads = self.threads,
            frames = self.frames,
            fps = self.fps,
            access = %self.access_mode,
            profile = frame.profile().name,
            frame_size = frame.size(),
            target = %target.display(),
            "starting test run"
        );

        let start = platform.now_ns();
        let mut result = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(plans.len());

            for plan in &plans {
                let options = &options;
                let cancelled = &cancelled;
                let task: WorkerTask<'_> = Box::new(move || {
                    worker_task(platform, frame, target, kind, plan, options, cancelled)
                });

                let name = format!("framebench-worker-{}", plan.worker);
                match platform.spawn_worker(scope, name, task) {
                    Ok(handle) => handles.push((plan.worker, handle)),
                    Err(source) => {
                        tracing::warn!(
                            worker = plan.worker,
                            error = %source,
                            "failed to spawn worker, cancelling run"
                        );
                        cancelled.store(true, Ordering::Relaxed);
                        for (_, handle) in handles {
                            let _ = handle.join();
                        }
                        return Err(RunError::Spawn {
                            worker: plan.worker,
                            source,
                        });
                    },
                }
            }

            let mut total = TestResult::default();
            let mut panicked = None;
            for (worker, handle) in handles {
                match handle.join() {
                    Ok(result) => total.aggregate(result),
                    Err(_) => {
                        tracing::warn!(worker = worker, "worker panicked");
                        panicked.get_or_insert(worker);
                    },
                }
            }

            match panicked {
                Some(worker) => Err(RunError::WorkerPanicked { worker }),
                None => Ok(total),
            }
        })?;
        result.elapsed_ns = platform.now_ns().saturating_sub(start);

        tracing::info!(
            kind = %kind,
            frames_completed = result.frames_completed,
            bytes = result.bytes_transferred,
            elapsed_ns = result.elapsed_ns,
            "test run finished"
        );

        Ok(result)
    }
}

fn worker_task(
    platform: &dyn Platform,
    frame: &Frame,
    target: &Path,
    kind: TestKind,
    plan: &WorkerPlan,
    options: &WorkerOptions,
    cancelled: &AtomicBool,
) -> TestResult {
    match kind {
        TestKind::Write => tester::run(
            platform,
            target,
            FrameIo::Write(frame),
            plan,
            options,
            cancelled,
        ),
        TestKind::Read => {
            let mut destination = match Frame::zeroed_like(platform, frame) {
                Ok(destination) => destination,
                Err(error) => {
                    tracing::warn!(
                        worker = plan.worker,
                        error = %error,
                        "failed to allocate read buffer, aborting worker"
                    );
                    return TestResult::default();
                },
            };
            tester::run(
                platform,
                target,
                FrameIo::Read(&mut destination),
                plan,
                options,
                cancelled,
            )
        },
    }
}
