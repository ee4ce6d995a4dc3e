//! Splitting a run's workload across its worker threads.

use crate::tester::WorkerPlan;
use crate::timing;

/// Split `value` into `parts` shares differing by at most one.
///
/// The first `value % parts` shares receive the extra unit.
pub fn share(value: u64, parts: usize, index: usize) -> u64 {
    debug_assert!(index < parts, "share index out of range");
    let parts = parts as u64;
    let base = value / parts;
    let remainder = value % parts;
    base + u64::from((index as u64) < remainder)
}

/// Partition `frames` frames and a frame rate of `fps` across `threads` workers.
///
/// Worker `k` receives a contiguous logical range starting at
/// `start_frame + sum(frames of workers 0..k)`. The ranges are disjoint and
/// together cover `start_frame..start_frame + frames` exactly. Every worker
/// is throttled to `fps / threads`, so no worker runs unlimited while `fps > 0`.
pub fn partition(threads: usize, start_frame: usize, frames: usize, fps: u64) -> Vec<WorkerPlan> {
    assert!(threads > 0, "at least one worker is required");

    let frame_budget = timing::frame_budget(fps, threads);
    let mut plans = Vec::with_capacity(threads);
    let mut offset = start_frame;
    for worker in 0..threads {
        let frames = share(frames as u64, threads, worker) as usize;
        plans.push(WorkerPlan {
            worker,
            start_frame: offset,
            frames,
            frame_budget,
        });
        offset += frames;
    }

    plans
}
