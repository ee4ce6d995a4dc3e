use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub const SEC_IN_NS: u64 = 1_000_000_000;
pub const MS_IN_NS: u64 = 1_000_000;

fn anchor() -> Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    *ANCHOR.get_or_init(Instant::now)
}

/// Monotonic nanoseconds since the first call in this process.
///
/// Never returns `0` so a zeroed timestamp can be told apart from a recorded one.
pub fn now_ns() -> u64 {
    let elapsed = anchor().elapsed().as_nanos() as u64;
    elapsed.max(1)
}

/// Nanoseconds elapsed since `start`, saturating at zero.
pub fn elapsed_ns(start: u64) -> u64 {
    now_ns().saturating_sub(start)
}

/// The per frame time budget of one of `workers` workers sharing a frame rate
/// limit of `fps`, `None` when unlimited.
///
/// Every worker gets the same budget so the limit holds even when `fps` is
/// lower than the number of workers.
pub fn frame_budget(fps: u64, workers: usize) -> Option<Duration> {
    if fps == 0 {
        return None;
    }
    let budget = SEC_IN_NS as u128 * workers.max(1) as u128 / fps as u128;
    Some(Duration::from_nanos(budget.min(u64::MAX as u128) as u64))
}
