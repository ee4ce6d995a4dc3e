use std::io;

use framebench::histogram::{self, Histogram};
use framebench::{TestCompletion, TestResult};

#[cfg_attr(test, test)]
fn main() -> io::Result<()> {
    // Synthesize a spread of frame times from a few microseconds to ~100ms.
    let mut rng = fastrand::Rng::with_seed(42);
    let completions: Vec<TestCompletion> = (0..2_000u64)
        .map(|i| {
            let start = i * 1_000;
            let frame_time = rng.u64(1..10_000).pow(2);
            TestCompletion {
                start,
                open: start,
                io: start,
                close: start + frame_time,
                frame: start + frame_time,
            }
        })
        .collect();

    let result = TestResult {
        frames_completed: completions.len() as u64,
        completions,
        ..TestResult::default()
    };

    let histogram = Histogram::from_result(&result);
    println!(
        "classified {} completions, tallest cell holds {}",
        histogram.total(),
        histogram.max_count()
    );
    assert_eq!(histogram.total(), 2_000);

    histogram::write_histogram(&mut io::stdout().lock(), &result)?;

    Ok(())
}
