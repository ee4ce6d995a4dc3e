//! Latency histogram of frame completion times.
//!
//! Every completion is classified into a bucket by its total frame time and
//! then into one of [SUB_BUCKET_COUNT] equal width sub-buckets within it.
//! A time exactly equal to a threshold lands in the bucket below it.

use std::io;
use std::io::Write;

use crate::tester::{Phase, TestResult};

/// Bucket thresholds in nanoseconds.
pub const BUCKETS: [u64; 13] = [
    0,
    200_000,
    500_000,
    1_000_000,
    2_000_000,
    5_000_000,
    10_000_000,
    20_000_000,
    50_000_000,
    100_000_000,
    200_000_000,
    500_000_000,
    1_000_000_000,
];

/// The axis label printed under each bucket.
pub const LABELS: [&str; 14] = [
    " 0 ", ".2 ", ".5 ", " 1 ", " 2 ", " 5 ", "10 ", "20 ", "50 ", "100", "200", "500", ">1s",
    "ovf",
];

pub const SUB_BUCKET_COUNT: usize = 5;
/// The number of rows of the rendered chart.
pub const HISTOGRAM_HEIGHT: u64 = 10;
/// The number of cells rendered, one per sub-bucket of every bucket.
pub const CELL_COUNT: usize = SUB_BUCKET_COUNT * BUCKETS.len();

/// The bucket index of a frame time `time_ns`.
///
/// Times beyond the last threshold land in the last, overflow, bucket.
pub fn time_bucket(time_ns: u64) -> usize {
    match BUCKETS.iter().position(|threshold| time_ns <= *threshold) {
        Some(0) => 0,
        Some(i) => i - 1,
        None => BUCKETS.len() - 1,
    }
}

/// The sub-bucket index of `time_ns` within `bucket`, clamped into `0..SUB_BUCKET_COUNT`.
///
/// The last bucket has no upper bound and always yields `0`.
pub fn time_sub_bucket(bucket: usize, time_ns: u64) -> usize {
    let Some(&min) = BUCKETS.get(bucket) else {
        return 0;
    };
    let max = BUCKETS.get(bucket + 1).copied().unwrap_or(min);

    if max == min || time_ns < min {
        return 0;
    }
    if time_ns > max {
        return SUB_BUCKET_COUNT - 1;
    }

    let offset = (time_ns - min) as u128;
    let sub_bucket = offset * SUB_BUCKET_COUNT as u128 / (max - min + 1) as u128;
    (sub_bucket as usize).min(SUB_BUCKET_COUNT - 1)
}

#[derive(Debug, Clone, Eq, PartialEq)]
/// Completion counts per (bucket, sub-bucket) cell.
pub struct Histogram {
    counts: [u64; CELL_COUNT],
}

impl Histogram {
    /// Classify the total frame time of every completion in `result`.
    pub fn from_result(result: &TestResult) -> Self {
        let mut counts = [0; CELL_COUNT];
        for completion in &result.completions {
            let time = completion.duration(Phase::Frame);
            let bucket = time_bucket(time);
            let sub_bucket = time_sub_bucket(bucket, time);
            counts[bucket * SUB_BUCKET_COUNT + sub_bucket] += 1;
        }
        Self { counts }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// The total number of classified completions.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// The largest cell count, used to scale the chart.
    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Render the chart, axis and bucket labels.
    pub fn render(&self, w: &mut dyn Write) -> io::Result<()> {
        let max = self.max_count();

        for row in 0..HISTOGRAM_HEIGHT {
            let mut line = String::with_capacity(CELL_COUNT + 1);
            line.push('|');
            for count in &self.counts {
                let height = count * HISTOGRAM_HEIGHT / (max + 1);
                let top = HISTOGRAM_HEIGHT - 1 - height;
                let filled = row > top || (*count > 0 && row == HISTOGRAM_HEIGHT - 1);
                line.push(if filled { '*' } else { ' ' });
            }
            writeln!(w, "{line}")?;
        }

        let mut axis = String::with_capacity(CELL_COUNT + 1);
        axis.push('|');
        for cell in 0..CELL_COUNT {
            axis.push(if cell % SUB_BUCKET_COUNT == 0 { '|' } else { '-' });
        }
        writeln!(w, "{axis}")?;

        let mut labels = String::new();
        for cell in 0..CELL_COUNT {
            match cell % SUB_BUCKET_COUNT {
                0 => labels.push_str(LABELS[cell / SUB_BUCKET_COUNT]),
                3.. => labels.push(' '),
                _ => {},
            }
        }
        writeln!(w, "{labels}")
    }
}

/// Write the completion time histogram of `result`.
///
/// Nothing is written when the result has no completions.
pub fn write_histogram(w: &mut dyn Write, result: &TestResult) -> io::Result<()> {
    if result.completions.is_empty() {
        return Ok(());
    }

    writeln!(w, "\nCompletion times:")?;
    Histogram::from_result(result).render(w)
}
