//! Human readable and CSV reports of a [TestResult].
//!
//! Every writer is a read only consumer of the result and writes nothing
//! when the result has no elapsed time.

use std::io;
use std::io::Write;

use crate::tester::{Phase, TestResult};
use crate::timing::{MS_IN_NS, SEC_IN_NS};

const MIB: f64 = (1024 * 1024) as f64;

/// The per phase statistics reported after the frame totals.
const EXTRA_PHASES: [(Phase, &str); 3] = [
    (Phase::Open, "Open times"),
    (Phase::Io, "I/O times"),
    (Phase::Close, "Close times"),
];

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
/// Controls which optional sections a report contains.
pub struct ReportOptions {
    /// Include open, IO and close statistics in addition to whole frame times.
    pub times: bool,
    /// Dump the timestamps of every completed frame.
    pub frame_times: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
/// Min, average and max of a phase's durations in nanoseconds.
pub struct PhaseStats {
    pub min: u64,
    pub avg: f64,
    pub max: u64,
}

/// Compute the statistics of `phase` across every completion of `result`.
///
/// Returns `None` if there are no completions.
pub fn phase_stats(result: &TestResult, phase: Phase) -> Option<PhaseStats> {
    if result.completions.is_empty() {
        return None;
    }

    let mut min = u64::MAX;
    let mut max = 0;
    let mut total: u128 = 0;
    for completion in &result.completions {
        let duration = completion.duration(phase);
        min = min.min(duration);
        max = max.max(duration);
        total += duration as u128;
    }

    Some(PhaseStats {
        min,
        avg: total as f64 / result.completions.len() as f64,
        max,
    })
}

fn per_second(count: u64, elapsed_ns: u64) -> f64 {
    count as f64 * SEC_IN_NS as f64 / elapsed_ns as f64
}

/// Write the human readable summary of `result` for the test case `case`.
pub fn write_results(
    w: &mut dyn Write,
    case: &str,
    options: &ReportOptions,
    result: &TestResult,
) -> io::Result<()> {
    if result.elapsed_ns == 0 {
        return Ok(());
    }

    let fps = per_second(result.frames_completed, result.elapsed_ns);
    let bps = per_second(result.bytes_transferred, result.elapsed_ns);

    writeln!(w, "Results {case}:")?;
    writeln!(w, " frames: {}", result.frames_completed)?;
    writeln!(w, " bytes : {}", result.bytes_transferred)?;
    writeln!(w, " time  : {}", result.elapsed_ns)?;
    writeln!(w, " fps   : {fps:.6}")?;
    writeln!(w, " B/s   : {bps:.6}")?;
    writeln!(w, " MiB/s : {:.6}", bps / MIB)?;

    if let Some(stats) = phase_stats(result, Phase::Frame) {
        write_stats(w, "Completion times", &stats)?;
        if options.times {
            for (phase, label) in EXTRA_PHASES {
                if let Some(stats) = phase_stats(result, phase) {
                    write_stats(w, label, &stats)?;
                }
            }
        }
    }

    if options.frame_times {
        write_frame_times(w, result)?;
    }

    Ok(())
}

fn write_stats(w: &mut dyn Write, label: &str, stats: &PhaseStats) -> io::Result<()> {
    let ms = MS_IN_NS as f64;
    writeln!(w, "{label}:")?;
    writeln!(w, " min   : {:.6} ms", stats.min as f64 / ms)?;
    writeln!(w, " avg   : {:.6} ms", stats.avg / ms)?;
    writeln!(w, " max   : {:.6} ms", stats.max as f64 / ms)
}

/// Write the CSV header matching [write_results_csv].
pub fn write_csv_header(w: &mut dyn Write, options: &ReportOptions) -> io::Result<()> {
    let extra = if options.times {
        ",omin,oavg,omax,iomin,ioavg,iomax,cmin,cavg,cmax"
    } else {
        ""
    };
    writeln!(
        w,
        "case,profile,threads,frames,bytes,time,fps,bps,mibps,fmin,favg,fmax{extra}"
    )
}

/// Write `result` as a single CSV row.
///
/// The statistics cells are left empty when there are no completions.
pub fn write_results_csv(
    w: &mut dyn Write,
    case: &str,
    profile: &str,
    threads: usize,
    options: &ReportOptions,
    result: &TestResult,
) -> io::Result<()> {
    if result.elapsed_ns == 0 {
        return Ok(());
    }

    let bps = per_second(result.bytes_transferred, result.elapsed_ns);
    let mut row = format!(
        "\"{case}\",\"{profile}\",{threads},{},{},{},{:.6},{bps:.6},{:.6}",
        result.frames_completed,
        result.bytes_transferred,
        result.elapsed_ns,
        per_second(result.frames_completed, result.elapsed_ns),
        bps / MIB,
    );

    let mut phases = vec![Phase::Frame];
    if options.times {
        phases.extend(EXTRA_PHASES.iter().map(|(phase, _)| *phase));
    }
    for phase in phases {
        match phase_stats(result, phase) {
            Some(stats) => {
                row.push_str(&format!(",{},{:.6},{}", stats.min, stats.avg, stats.max));
            },
            None => row.push_str(",,,"),
        }
    }
    writeln!(w, "{row}")?;

    if options.frame_times {
        write_frame_times(w, result)?;
    }

    Ok(())
}

/// Dump the raw timestamps of every completion as CSV.
pub fn write_frame_times(w: &mut dyn Write, result: &TestResult) -> io::Result<()> {
    writeln!(w, "frame,start,open,io,close,frame")?;
    for (i, completion) in result.completions.iter().enumerate() {
        writeln!(
            w,
            "{i},{},{},{},{},{}",
            completion.start, completion.open, completion.io, completion.close, completion.frame
        )?;
    }
    Ok(())
}
